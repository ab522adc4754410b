//! Overlapping chunker.
//!
//! Every chunk is an exact substring of the input: boundaries move, text never
//! changes. A cut prefers the last paragraph break in the window, then the last
//! line break, then the last space; only a window with none of these is hard-cut.
//! Offsets are in characters.

/// Chunk sizing, in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSettings {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkSettings {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSpan<'a> {
    /// Character offset of `text` within the source.
    pub start_index: usize,
    pub text: &'a str,
}

const SEPARATORS: [&[char]; 3] = [&['\n', '\n'], &['\n'], &[' ']];

pub fn split_text(text: &str, settings: ChunkSettings) -> Vec<TextSpan<'_>> {
    let size = settings.chunk_size.max(1);
    let overlap = settings.chunk_overlap.min(size - 1);

    let chars: Vec<char> = text.chars().collect();
    // Byte offset of every char index, plus one past the end.
    let bytes: Vec<usize> = text
        .char_indices()
        .map(|(b, _)| b)
        .chain(std::iter::once(text.len()))
        .collect();
    let total = chars.len();

    let mut spans = Vec::new();
    let mut start = 0usize;

    while start < total {
        let window_end = (start + size).min(total);
        let end = if window_end == total {
            total
        } else {
            find_break(&chars, start + size / 2, window_end).unwrap_or(window_end)
        };

        if let Some(span) = trimmed_span(text, &chars, &bytes, start, end) {
            spans.push(span);
        }
        if end == total {
            break;
        }

        let mut next = end.saturating_sub(overlap);
        if next <= start {
            next = end;
        }
        // Start the overlap on a word boundary when one is available.
        if next > 0 && next < end && !chars[next - 1].is_whitespace() {
            if let Some(offset) = chars[next..end].iter().position(|c| c.is_whitespace()) {
                next += offset + 1;
            }
        }
        start = next;
    }

    spans
}

/// Char index just past the best separator in `(lo, hi]`.
fn find_break(chars: &[char], lo: usize, hi: usize) -> Option<usize> {
    for sep in SEPARATORS {
        let len = sep.len();
        let mut pos = hi;
        while pos >= lo + len {
            if &chars[pos - len..pos] == sep {
                return Some(pos);
            }
            pos -= 1;
        }
    }
    None
}

fn trimmed_span<'a>(
    text: &'a str,
    chars: &[char],
    bytes: &[usize],
    mut start: usize,
    mut end: usize,
) -> Option<TextSpan<'a>> {
    while start < end && chars[start].is_whitespace() {
        start += 1;
    }
    while end > start && chars[end - 1].is_whitespace() {
        end -= 1;
    }
    if start == end {
        return None;
    }
    Some(TextSpan {
        start_index: start,
        text: &text[bytes[start]..bytes[end]],
    })
}
