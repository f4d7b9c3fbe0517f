//! Minimal front-matter extraction: a `---` delimited block of simple
//! `key: value` pairs at the top of a note, with `tags`/`aliases` as
//! bracketed lists. Not a full YAML parser — the vault format only ever
//! needs this subset.

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrontMatter {
    pub id: Option<String>,
    pub title: Option<String>,
    pub tags: Vec<String>,
    pub aliases: Vec<String>,
}

/// Split `content` into `(front_matter, body, body_offset)`. `body_offset`
/// is the byte offset where `body` begins within the original `content`,
/// so callers can translate body-relative offsets back to the source.
pub fn split_front_matter(content: &str) -> (FrontMatter, &str, usize) {
    let Some(rest) = content.strip_prefix("---\n") else {
        return (FrontMatter::default(), content, 0);
    };

    let Some(end) = find_closing_delimiter(rest) else {
        return (FrontMatter::default(), content, 0);
    };

    let block = &rest[..end];
    let body_offset = 4 + end + 4; // "---\n" + block + "---\n"
    let body = content.get(body_offset..).unwrap_or("");

    (parse_front_matter_block(block), body, body_offset)
}

fn find_closing_delimiter(s: &str) -> Option<usize> {
    let mut offset = 0;
    for line in s.split_inclusive('\n') {
        let trimmed = line.trim_end_matches(['\n', '\r']);
        if trimmed == "---" {
            return Some(offset);
        }
        offset += line.len();
    }
    None
}

fn parse_front_matter_block(block: &str) -> FrontMatter {
    let mut fm = FrontMatter::default();
    for line in block.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();
        match key {
            "id" => fm.id = Some(strip_quotes(value).to_string()),
            "title" => fm.title = Some(strip_quotes(value).to_string()),
            "tags" => fm.tags = parse_list(value),
            "aliases" => fm.aliases = parse_list(value),
            _ => {}
        }
    }
    fm
}

fn strip_quotes(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
        .unwrap_or(value)
}

fn parse_list(value: &str) -> Vec<String> {
    let inner = value
        .strip_prefix('[')
        .and_then(|v| v.strip_suffix(']'))
        .unwrap_or(value);
    if inner.trim().is_empty() {
        return Vec::new();
    }
    inner
        .split(',')
        .map(|item| strip_quotes(item.trim()).to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_front_matter_returns_full_body() {
        let (fm, body, offset) = split_front_matter("# Just a note\nbody text");
        assert_eq!(fm, FrontMatter::default());
        assert_eq!(body, "# Just a note\nbody text");
        assert_eq!(offset, 0);
    }

    #[test]
    fn parses_basic_fields() {
        let content = "---\nid: abc123\ntitle: My Note\ntags: [a, b, c]\naliases: [\"Alt Name\"]\n---\n# Body\ntext";
        let (fm, body, offset) = split_front_matter(content);
        assert_eq!(fm.id.as_deref(), Some("abc123"));
        assert_eq!(fm.title.as_deref(), Some("My Note"));
        assert_eq!(fm.tags, vec!["a", "b", "c"]);
        assert_eq!(fm.aliases, vec!["Alt Name"]);
        assert_eq!(&content[offset..], body);
        assert_eq!(body, "# Body\ntext");
    }

    #[test]
    fn unterminated_front_matter_is_treated_as_body() {
        let content = "---\nid: abc\nno closing delimiter";
        let (fm, body, offset) = split_front_matter(content);
        assert_eq!(fm, FrontMatter::default());
        assert_eq!(body, content);
        assert_eq!(offset, 0);
    }
}
