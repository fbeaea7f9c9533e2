use std::ops::Range;

use crate::error::{EditError, EditResult};

/// A single text edit computed against one snapshot of a document. The caller
/// applies it to its own buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Splice {
    pub range_start: usize,
    pub range_len: usize,
    pub replacement: String,
    /// Where a cursor should sit once the splice is applied.
    pub new_cursor_offset: usize,
}

impl Splice {
    pub fn new(range: Range<usize>, replacement: impl Into<String>) -> Self {
        let replacement = replacement.into();
        Self {
            range_start: range.start,
            range_len: range.len(),
            new_cursor_offset: range.start + replacement.len(),
            replacement,
        }
    }

    /// Zero-length splice inserting `text` at `offset`.
    pub fn insert(offset: usize, text: impl Into<String>) -> Self {
        Self::new(offset..offset, text)
    }

    pub fn range(&self) -> Range<usize> {
        self.range_start..self.range_start + self.range_len
    }

    /// Text the splice replaces, if the range is valid for `text`.
    pub fn original<'a>(&self, text: &'a str) -> Option<&'a str> {
        text.get(self.range())
    }

    pub fn apply(&self, text: &str) -> EditResult<String> {
        let range = self.range();
        if range.end > text.len() {
            return Err(EditError::Validation(format!(
                "splice {}..{} is outside a document of {} bytes",
                range.start,
                range.end,
                text.len()
            )));
        }
        if !text.is_char_boundary(range.start) || !text.is_char_boundary(range.end) {
            return Err(EditError::Validation(format!(
                "splice {}..{} does not fall on character boundaries",
                range.start, range.end
            )));
        }

        let mut rebuilt =
            String::with_capacity(text.len() - self.range_len + self.replacement.len());
        rebuilt.push_str(&text[..range.start]);
        rebuilt.push_str(&self.replacement);
        rebuilt.push_str(&text[range.end..]);
        Ok(rebuilt)
    }
}
