//! Attachment naming and content checks.

use uuid::Uuid;

use crate::defaults::{ATTACHMENT_PREFIX, MAX_FILENAME_LEN};

/// Whether the payload's magic bytes identify an image.
///
/// Only the leading bytes are inspected; the file name plays no part.
pub fn is_image(data: &[u8]) -> bool {
    infer::is_image(data)
}

/// MIME type sniffed from the payload, if recognized.
pub fn detect_mime(data: &[u8]) -> Option<&'static str> {
    infer::get(data).map(|kind| kind.mime_type())
}

/// Sanitize a user-supplied file name for use as a blob path segment.
pub fn sanitize_filename(filename: &str) -> String {
    // Drop any directory part supplied by the client
    let name = filename.rsplit(['/', '\\']).next().unwrap_or(filename);

    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '|' | '?' | '*' | '#' | '%' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let sanitized = sanitized.trim().trim_start_matches('.');
    if sanitized.is_empty() {
        return "attachment".to_string();
    }

    if sanitized.len() <= MAX_FILENAME_LEN {
        return sanitized.to_string();
    }

    // Keep the extension when truncating
    let ext = sanitized
        .rfind('.')
        .map(|pos| &sanitized[pos..])
        .filter(|ext| ext.len() < 16)
        .unwrap_or("");
    let stem = truncate_on_char_boundary(sanitized, MAX_FILENAME_LEN - ext.len());
    format!("{}{}", stem, ext)
}

fn truncate_on_char_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Deterministic blob path for a note's attachment:
/// `notes/{owner_id}/{note_id}/{file_name}`.
///
/// Uploading the same file name again for the same note targets the same
/// path, so the later upload overwrites the earlier one.
pub fn attachment_path(owner_id: &str, note_id: Uuid, file_name: &str) -> String {
    format!(
        "{}/{}/{}/{}",
        ATTACHMENT_PREFIX,
        sanitize_owner_segment(owner_id),
        note_id,
        sanitize_filename(file_name)
    )
}

fn sanitize_owner_segment(owner_id: &str) -> String {
    owner_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
