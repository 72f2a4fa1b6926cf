//! UTF-16 code-unit helpers over Rust (UTF-8) strings.
//!
//! The collection service addresses `artifact` text in UTF-16 code units,
//! so slicing has to translate those positions into byte offsets.

use crate::error::{EnrichError, Result};
use crate::types::Location;

/// Length of `text` in UTF-16 code units.
pub fn utf16_len(text: &str) -> usize {
    text.chars().map(char::len_utf16).sum()
}

/// Byte offset of the given UTF-16 code-unit position, or `None` when the
/// position is past the end or falls inside a surrogate pair.
fn byte_offset(text: &str, code_unit: usize) -> Option<usize> {
    let mut units = 0;
    for (byte, ch) in text.char_indices() {
        if units == code_unit {
            return Some(byte);
        }
        units += ch.len_utf16();
        if units > code_unit {
            return None;
        }
    }
    (units == code_unit).then_some(text.len())
}

/// Slice `text` by a UTF-16 code-unit range.
pub fn slice_utf16(text: &str, location: Location) -> Result<&str> {
    let Location { begin, end } = location;
    if begin > end {
        return Err(EnrichError::validation(format!(
            "location begin {begin} is after end {end}"
        )));
    }

    let start = byte_offset(text, begin).ok_or_else(|| {
        EnrichError::validation(format!("location begin {begin} is not a valid UTF-16 boundary"))
    })?;
    let stop = byte_offset(text, end).ok_or_else(|| {
        EnrichError::validation(format!("location end {end} is not a valid UTF-16 boundary"))
    })?;

    Ok(&text[start..stop])
}
