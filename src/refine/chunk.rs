//! Chunking for the refinement call.
//!
//! `split_chunks` never drops or duplicates a byte: concatenating its output
//! reproduces the input exactly. Cuts prefer a paragraph break, then a line
//! break, then any whitespace, and fall back to a hard cut on a character
//! boundary when a window contains none in its second half.

/// Split `text` into ordered chunks of at most `max_chars` characters.
///
/// Returns an empty vector for empty input. `max_chars` of 0 is treated as 1.
pub fn split_chunks(text: &str, max_chars: usize) -> Vec<&str> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut rest = text;

    while !rest.is_empty() {
        let limit = match rest.char_indices().nth(max_chars) {
            Some((byte_idx, _)) => byte_idx,
            None => {
                chunks.push(rest);
                break;
            }
        };

        let cut = preferred_cut(&rest[..limit]).unwrap_or(limit);
        let (head, tail) = rest.split_at(cut);
        chunks.push(head);
        rest = tail;
    }

    chunks
}

/// Byte offset just past the best break point in the second half of `window`.
fn preferred_cut(window: &str) -> Option<usize> {
    let floor = window.len() / 2;
    let past_floor = |cut: &usize| *cut > floor;

    window
        .rfind("\n\n")
        .map(|i| i + 2)
        .filter(past_floor)
        .or_else(|| window.rfind('\n').map(|i| i + 1).filter(past_floor))
        .or_else(|| {
            window
                .char_indices()
                .rev()
                .find(|(_, c)| c.is_whitespace())
                .map(|(i, c)| i + c.len_utf8())
                .filter(past_floor)
        })
}

/// Split a chunk into leading whitespace, content, and trailing whitespace.
///
/// A whitespace-only chunk is returned entirely as the leading part.
pub(crate) fn split_edges(chunk: &str) -> (&str, &str, &str) {
    let start = chunk.len() - chunk.trim_start().len();
    let end = chunk.trim_end().len();
    if start >= end {
        return (chunk, "", "");
    }
    (&chunk[..start], &chunk[start..end], &chunk[end..])
}
