//! Wikilink syntax parsing: `[[target]]`, `[[target#section]]`, `[[target|alias]]`.
//!
//! The grammar is total — any input can be scanned for links without
//! producing a parse error; malformed brackets simply yield no match.

use std::sync::LazyLock;

static WIKILINK_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"\[\[([^\[\]|#]+)(?:#([^\[\]|]+))?(?:\|([^\[\]]+))?\]\]")
        .expect("wikilink regex is valid")
});

static NORMALIZE_COLLAPSE_RE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"[-_\s]+").expect("normalize regex is valid"));

/// Byte offset and line number of a parsed link within its source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkPosition {
    pub start: usize,
    pub end: usize,
    pub line: usize,
}

/// A single `[[...]]` occurrence parsed out of note content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wikilink {
    pub raw: String,
    pub target: String,
    pub section: Option<String>,
    pub alias: Option<String>,
    pub position: LinkPosition,
}

/// Lowercase, strip a trailing `.md`, collapse runs of `-`, `_`, and
/// whitespace to a single space, and trim. Two targets "refer to the same
/// note" iff their normalized forms are equal.
pub fn normalize(target: &str) -> String {
    let lower = target.to_lowercase();
    let stripped = lower.strip_suffix(".md").unwrap_or(&lower);
    let collapsed = NORMALIZE_COLLAPSE_RE.replace_all(stripped, " ");
    collapsed.trim().to_string()
}

/// Parse every wikilink occurrence in `content`, in source order.
pub fn parse_wikilinks(content: &str) -> Vec<Wikilink> {
    let line_starts = line_start_offsets(content);
    WIKILINK_RE
        .captures_iter(content)
        .map(|caps| {
            let whole = caps.get(0).expect("capture group 0 always matches");
            let start = whole.start();
            let end = whole.end();
            Wikilink {
                raw: whole.as_str().to_string(),
                target: caps
                    .get(1)
                    .map(|m| m.as_str().trim().to_string())
                    .unwrap_or_default(),
                section: caps.get(2).map(|m| m.as_str().trim().to_string()),
                alias: caps.get(3).map(|m| m.as_str().trim().to_string()),
                position: LinkPosition {
                    start,
                    end,
                    line: line_number(&line_starts, start),
                },
            }
        })
        .collect()
}

fn line_start_offsets(content: &str) -> Vec<usize> {
    let mut starts = vec![0];
    starts.extend(content.match_indices('\n').map(|(i, _)| i + 1));
    starts
}

/// 1-based line number containing byte offset `pos`.
fn line_number(line_starts: &[usize], pos: usize) -> usize {
    match line_starts.binary_search(&pos) {
        Ok(idx) => idx + 1,
        Err(idx) => idx,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_link() {
        let links = parse_wikilinks("See [[Other Note]] for details.");
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].target, "Other Note");
        assert_eq!(links[0].section, None);
        assert_eq!(links[0].alias, None);
    }

    #[test]
    fn parses_section_and_alias() {
        let links = parse_wikilinks("[[Target#Heading|display text]]");
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].target, "Target");
        assert_eq!(links[0].section.as_deref(), Some("Heading"));
        assert_eq!(links[0].alias.as_deref(), Some("display text"));
    }

    #[test]
    fn raw_round_trips_to_source_span() {
        let content = "prefix [[A]] middle [[B#s|a]] suffix";
        for link in parse_wikilinks(content) {
            assert_eq!(&content[link.position.start..link.position.end], link.raw);
        }
    }

    #[test]
    fn tracks_line_numbers() {
        let content = "line one\nline two [[Link]]\nline three";
        let links = parse_wikilinks(content);
        assert_eq!(links[0].position.line, 2);
    }

    #[test]
    fn normalize_strips_extension_and_collapses() {
        assert_eq!(normalize("My_Note-Name.md"), "my note name");
        assert_eq!(normalize("  Spaced   Out  "), "spaced out");
    }

    #[test]
    fn normalize_is_idempotent() {
        let samples = ["My_Note-Name.md", "  Spaced   Out  ", "already normal"];
        for s in samples {
            let once = normalize(s);
            let twice = normalize(&once);
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn no_match_on_unbalanced_brackets() {
        assert!(parse_wikilinks("[[unterminated").is_empty());
    }
}
