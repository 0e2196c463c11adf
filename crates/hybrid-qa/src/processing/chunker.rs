use crate::config::ChunkingConfig;

/// A trimmed chunk and the byte span of its window in the trimmed source.
#[derive(Debug, Clone)]
pub struct ChunkResult {
    pub text: String,
    pub start_offset: usize,
    pub end_offset: usize,
}

/// Fixed-size windows with overlap, cut at the nearest natural boundary.
pub struct TextChunker {
    chunk_size: usize,
    chunk_overlap: usize,
    min_chunk_size: usize,
}

/// How far back from a window's end to look for a break.
const BREAK_SEARCH_WINDOW: usize = 200;

impl TextChunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize, min_chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            chunk_overlap,
            min_chunk_size,
        }
    }

    pub fn from_config(config: &ChunkingConfig) -> Self {
        Self::new(config.chunk_size, config.chunk_overlap, config.min_chunk_size)
    }

    pub fn chunk(&self, text: &str) -> Vec<ChunkResult> {
        let text = text.trim();
        if text.len() <= self.chunk_size {
            if text.is_empty() || text.len() < self.min_chunk_size {
                return Vec::new();
            }
            return vec![ChunkResult {
                text: text.to_string(),
                start_offset: 0,
                end_offset: text.len(),
            }];
        }

        let mut chunks = Vec::new();
        let mut start = 0;

        while start < text.len() {
            let raw_end = (start + self.chunk_size).min(text.len());
            let mut end = snap_to_char_boundary(text, raw_end);
            if end <= start {
                // window narrower than one character
                end = next_char_boundary(text, start);
            }

            let actual_end = if end < text.len() {
                self.find_break_point(text, start, end)
            } else {
                end
            };

            let chunk_text = text[start..actual_end].trim();
            if !chunk_text.is_empty() && chunk_text.len() >= self.min_chunk_size {
                chunks.push(ChunkResult {
                    text: chunk_text.to_string(),
                    start_offset: start,
                    end_offset: actual_end,
                });
            }

            if actual_end >= text.len() {
                break;
            }

            let step = if actual_end - start > self.chunk_overlap {
                actual_end - start - self.chunk_overlap
            } else {
                actual_end - start
            };
            start = snap_to_char_boundary(text, start + step).max(start + 1);
            start = snap_up_to_char_boundary(text, start);
        }

        chunks
    }

    /// Priority: paragraph break > sentence end > line break > word break.
    fn find_break_point(&self, text: &str, start: usize, preferred_end: usize) -> usize {
        let raw_search_start = preferred_end.saturating_sub(BREAK_SEARCH_WINDOW).max(start + 1);
        let search_start = snap_up_to_char_boundary(text, raw_search_start);
        let safe_end = snap_to_char_boundary(text, preferred_end);

        if search_start >= safe_end {
            return safe_end;
        }

        let search_region = &text[search_start..safe_end];

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

impl Default for TextChunker {
    fn default() -> Self {
        Self::new(1000, 200, 1)
    }
}

/// Round a byte offset down to a UTF-8 char boundary.
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

/// Round a byte offset up to a UTF-8 char boundary.
fn snap_up_to_char_boundary(text: &str, pos: usize) -> usize {
    let mut p = pos.min(text.len());
    while p < text.len() && !text.is_char_boundary(p) {
        p += 1;
    }
    p
}

fn next_char_boundary(text: &str, pos: usize) -> usize {
    snap_up_to_char_boundary(text, pos + 1)
}
