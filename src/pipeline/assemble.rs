//! Document assembly: join per-page results into the persisted artifact text.

use crate::output::RecognitionResult;

/// Text written in place of a page that could not be recognised.
pub fn failed_page_marker(page_num: usize) -> String {
    format!("[page {page_num}: text could not be recognized]")
}

/// Concatenate page texts in page order, separated by `page_break`.
///
/// Failed pages keep their position as a visible marker so the page count
/// of the artifact matches the document. Page texts arrive already trimmed;
/// nothing is trimmed here, so splitting the result on `page_break` always
/// yields one segment per page, blank pages included.
pub fn assemble_text(pages: &[RecognitionResult], page_break: &str) -> String {
    let mut ordered: Vec<&RecognitionResult> = pages.iter().collect();
    ordered.sort_by_key(|r| r.ordinal);

    let mut out = String::new();
    for (i, page) in ordered.iter().enumerate() {
        if i > 0 {
            out.push_str(page_break);
        }
        if page.is_success() {
            out.push_str(&page.text);
        } else {
            out.push_str(&failed_page_marker(page.page_num()));
        }
    }
    out
}

/// First `max_chars` characters of `text`, with `...` appended when cut.
pub fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
        None => text.to_string(),
    }
}
