//! Query expansion: a deterministic, bounded static synonym table (spec
//! §4.9 step 1). Purely additive — when disabled, keywords are just the
//! original tokens.

const MAX_VARIANTS: usize = 3;

/// `{original, variants[], keywords[]}` produced by [`expand`].
#[derive(Debug, Clone)]
pub struct ExpandedQuery {
    pub original: String,
    pub variants: Vec<String>,
    pub keywords: Vec<String>,
}

/// Small synonym table covering common note-taking vocabulary. Each entry
/// is bidirectional: if either side appears in the query, the other is
/// offered as a phrase substitution.
const SYNONYMS: &[(&str, &str)] = &[
    ("note", "document"),
    ("notes", "documents"),
    ("link", "reference"),
    ("links", "references"),
    ("idea", "concept"),
    ("ideas", "concepts"),
    ("todo", "task"),
    ("todos", "tasks"),
    ("project", "initiative"),
    ("meeting", "discussion"),
    ("summary", "overview"),
    ("draft", "outline"),
];

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|s| !s.is_empty())
        .map(|s| s.to_lowercase())
        .collect()
}

/// Produce `{original, variants, keywords}` for `query`. `enabled = false`
/// short-circuits to keywords-only, matching the "when disabled" clause of
/// spec §4.9 step 1.
pub fn expand(query: &str, enabled: bool, max_variants: usize) -> ExpandedQuery {
    let keywords = tokenize(query);

    if !enabled {
        return ExpandedQuery {
            original: query.to_string(),
            variants: Vec::new(),
            keywords,
        };
    }

    let cap = max_variants.min(MAX_VARIANTS);
    let lower = query.to_lowercase();
    let mut variants = Vec::new();

    for (a, b) in SYNONYMS {
        if variants.len() >= cap {
            break;
        }
        if lower.contains(a) {
            variants.push(replace_word(&lower, a, b));
        } else if lower.contains(b) {
            variants.push(replace_word(&lower, b, a));
        }
    }
    variants.dedup();
    variants.retain(|v| v != &lower);
    variants.truncate(cap);

    let mut all_keywords = keywords.clone();
    for variant in &variants {
        all_keywords.extend(tokenize(variant));
    }
    all_keywords.sort();
    all_keywords.dedup();

    ExpandedQuery {
        original: query.to_string(),
        variants,
        keywords: all_keywords,
    }
}

fn replace_word(text: &str, from: &str, to: &str) -> String {
    text.split_whitespace()
        .map(|word| if word == from { to } else { word })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_expansion_returns_original_tokens_only() {
        let expanded = expand("find my notes", false, 3);
        assert!(expanded.variants.is_empty());
        assert_eq!(expanded.keywords, vec!["find", "my", "notes"]);
    }

    #[test]
    fn expansion_is_bounded_to_max_variants() {
        let expanded = expand("note link idea todo", true, 3);
        assert!(expanded.variants.len() <= 3);
    }

    #[test]
    fn expansion_substitutes_known_synonym() {
        let expanded = expand("show my notes", true, 3);
        assert!(expanded.variants.iter().any(|v| v.contains("documents")));
    }

    #[test]
    fn expansion_is_deterministic() {
        let a = expand("project todo", true, 3);
        let b = expand("project todo", true, 3);
        assert_eq!(a.variants, b.variants);
    }
}
