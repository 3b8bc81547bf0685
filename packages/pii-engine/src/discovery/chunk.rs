//! Character-budgeted text chunking.

/// A slice of the input sent to the oracle in one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub index: usize,
    /// Byte offset of the chunk in the original text
    pub offset: usize,
    pub text: String,
}

/// Split text into chunks of at most `max_chars` characters.
///
/// Neighbours share `overlap` characters. A chunk end moves back to the last
/// whitespace within the final tenth of the budget so words stay whole.
pub fn chunk_text(text: &str, max_chars: usize, overlap: usize) -> Vec<Chunk> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let max_chars = max_chars.max(1);
    let overlap = overlap.min(max_chars / 2);

    let chars: Vec<char> = text.chars().collect();
    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let total = chars.len();

    let mut chunks = Vec::new();
    let mut start = 0;

    loop {
        let mut end = (start + max_chars).min(total);

        if end < total {
            let floor = start + max_chars - max_chars / 10;
            if let Some(ws) = (floor..end).rev().find(|&i| chars[i].is_whitespace()) {
                end = ws + 1;
            }
        }

        chunks.push(Chunk {
            index: chunks.len(),
            offset: bounds[start],
            text: text[bounds[start]..bounds[end]].to_string(),
        });

        if end >= total {
            break;
        }
        start = end.saturating_sub(overlap).max(start + 1);
    }

    chunks
}
