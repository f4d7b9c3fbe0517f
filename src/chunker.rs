//! Markdown-aware note chunking: strips front-matter, then splits the body
//! into overlapping passages preferring heading, then paragraph, then
//! sentence, then hard-character breaks.

use uuid::Uuid;

use crate::config::ChunkingConfig;
use crate::graph::front_matter::split_front_matter;

#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: Uuid,
    pub index: usize,
    pub text: String,
    /// Offsets are relative to the original note content (front-matter included).
    pub start_offset: usize,
    pub end_offset: usize,
    pub has_header: bool,
}

pub struct NoteChunker {
    chunk_size: usize,
    chunk_overlap: usize,
    min_chunk_size: usize,
}

impl NoteChunker {
    pub fn new(config: &ChunkingConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
            min_chunk_size: config.min_chunk_size,
        }
    }

    /// Chunk full note content (front-matter included). Offsets in the
    /// returned chunks are relative to `content`, not the stripped body.
    pub fn chunk_note(&self, content: &str) -> Vec<Chunk> {
        let (_front_matter, body, body_offset) = split_front_matter(content);
        self.chunk_body(body)
            .into_iter()
            .map(|mut c| {
                c.start_offset += body_offset;
                c.end_offset += body_offset;
                c
            })
            .collect()
    }

    fn chunk_body(&self, text: &str) -> Vec<Chunk> {
        if text.is_empty() {
            return Vec::new();
        }
        if text.len() <= self.chunk_size {
            // Only a truly empty note yields zero chunks (spec §4.5); a
            // short non-empty note still gets one chunk covering it, even
            // below `min_chunk_size` — that floor governs splitting
            // decisions further down, not whether content is kept at all.
            return vec![Chunk {
                id: Uuid::new_v4(),
                index: 0,
                has_header: starts_with_heading(text),
                text: text.to_string(),
                start_offset: 0,
                end_offset: text.len(),
            }];
        }

        let mut chunks = Vec::new();
        let mut start = 0;
        let mut index = 0;

        while start < text.len() {
            let raw_end = (start + self.chunk_size).min(text.len());
            let end = snap_to_char_boundary(text, raw_end);

            let actual_end = if end < text.len() {
                self.find_break_point(text, start, end)
            } else {
                end
            };

            let chunk_text = &text[start..actual_end];
            // A segment under `min_chunk_size` is folded into the previous
            // chunk rather than dropped, so the chunk sequence always fully
            // covers the note (spec §4.5) — it only ever governs whether a
            // short tail stands alone, never whether content survives.
            if chunk_text.len() < self.min_chunk_size && !chunks.is_empty() {
                let prev: &mut Chunk = chunks.last_mut().expect("checked non-empty above");
                prev.end_offset = actual_end;
                prev.text = text[prev.start_offset..actual_end].to_string();
            } else {
                chunks.push(Chunk {
                    id: Uuid::new_v4(),
                    index,
                    has_header: starts_with_heading(chunk_text),
                    text: chunk_text.to_string(),
                    start_offset: start,
                    end_offset: actual_end,
                });
                index += 1;
            }

            let step = if actual_end - start > self.chunk_overlap {
                actual_end - start - self.chunk_overlap
            } else {
                actual_end - start
            };
            let raw_next = start + step;
            start = snap_to_char_boundary(text, raw_next);
            if start >= text.len() {
                break;
            }
        }

        chunks
    }

    /// Priority: heading boundary > paragraph break > sentence end > line
    /// break > word break > hard cut.
    fn find_break_point(&self, text: &str, start: usize, preferred_end: usize) -> usize {
        let raw_search_start = preferred_end.saturating_sub(200).max(start);
        let search_start = snap_to_char_boundary(text, raw_search_start);
        let safe_end = snap_to_char_boundary(text, preferred_end);

        if search_start >= safe_end {
            return safe_end;
        }

        let search_region = &text[search_start..safe_end];

        if let Some(pos) = find_last_heading_start(search_region) {
            if pos > 0 {
                return search_start + pos;
            }
        }
        if let Some(pos) = search_region.rfind("\n\n") {
            return search_start + pos + 2;
        }
        if let Some(pos) = search_region.rfind(". ") {
            return search_start + pos + 2;
        }
        if let Some(pos) = search_region.rfind(".\n") {
            return search_start + pos + 2;
        }
        if let Some(pos) = search_region.rfind('\n') {
            return search_start + pos + 1;
        }
        if let Some(pos) = search_region.rfind(' ') {
            return search_start + pos + 1;
        }

        safe_end
    }
}

fn find_last_heading_start(region: &str) -> Option<usize> {
    let mut best = None;
    let mut offset = 0;
    for line in region.split_inclusive('\n') {
        if is_heading_line(line) {
            best = Some(offset);
        }
        offset += line.len();
    }
    best
}

fn is_heading_line(line: &str) -> bool {
    let trimmed = line.trim_start();
    let hashes = trimmed.chars().take_while(|&c| c == '#').count();
    (1..=6).contains(&hashes) && trimmed.as_bytes().get(hashes) == Some(&b' ')
}

fn starts_with_heading(text: &str) -> bool {
    text.lines().next().map(is_heading_line).unwrap_or(false)
}

fn snap_to_char_boundary(text: &str, pos: usize) -> usize {
    if pos >= text.len() {
        return text.len();
    }
    let mut p = pos;
    while p > 0 && !text.is_char_boundary(p) {
        p -= 1;
    }
    p
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_chunker() -> NoteChunker {
        NoteChunker::new(&ChunkingConfig {
            chunk_size: 100,
            chunk_overlap: 20,
            min_chunk_size: 10,
        })
    }

    #[test]
    fn empty_note_yields_no_chunks() {
        assert!(default_chunker().chunk_note("").is_empty());
    }

    #[test]
    fn short_note_below_min_chunk_size_still_yields_one_chunk() {
        // spec §8 scenario 1: a.md = "# Tesla Robotaxi\nSF ride." (25 chars),
        // well under min_chunk_size — it must still be indexable.
        let content = "# Tesla Robotaxi\nSF ride.";
        let chunker = default_chunker();
        let chunks = chunker.chunk_note(content);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, content);
        assert!(chunks[0].has_header);
    }

    #[test]
    fn strips_front_matter_before_chunking() {
        let content = "---\ntitle: Test\n---\n# Heading\nshort body text here";
        let chunker = default_chunker();
        let chunks = chunker.chunk_note(content);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].has_header);
        assert_eq!(&content[chunks[0].start_offset..chunks[0].end_offset], chunks[0].text);
    }

    #[test]
    fn offsets_are_relative_to_original_content_with_front_matter() {
        let content = "---\ntitle: Test\n---\nbody text that is long enough to keep";
        let chunker = default_chunker();
        let chunks = chunker.chunk_note(content);
        assert_eq!(chunks.len(), 1);
        // start_offset should point past the front-matter block, not 0.
        assert!(chunks[0].start_offset > 0);
        assert_eq!(&content[chunks[0].start_offset..chunks[0].end_offset], "body text that is long enough to keep");
    }

    #[test]
    fn splits_long_text_with_overlap() {
        let body = "word ".repeat(60); // 300 chars, exceeds chunk_size of 100
        let chunker = default_chunker();
        let chunks = chunker.chunk_note(&body);
        assert!(chunks.len() > 1);
        for w in chunks.windows(2) {
            assert!(w[1].start_offset < w[0].end_offset, "expected overlap between consecutive chunks");
        }
    }

    #[test]
    fn chunk_offsets_are_within_bounds() {
        let body = "Some content. ".repeat(30);
        let chunker = default_chunker();
        for chunk in chunker.chunk_note(&body) {
            assert!(chunk.start_offset < chunk.end_offset);
            assert!(chunk.end_offset <= body.len());
        }
    }
}
