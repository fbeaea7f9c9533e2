/// One physical line of a document, without its terminator.
///
/// `start..end` covers the line including its `\n` / `\r\n` terminator, so
/// consecutive records tile the whole input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineRecord<'a> {
    pub text: &'a str,
    pub start: usize,
    pub end: usize,
}

pub fn split_lines(content: &str) -> Vec<LineRecord<'_>> {
    let mut lines = Vec::new();
    let mut offset = 0usize;

    for raw in content.split_inclusive('\n') {
        let mut text = raw;
        if let Some(stripped) = text.strip_suffix('\n') {
            text = stripped.strip_suffix('\r').unwrap_or(stripped);
        }

        lines.push(LineRecord {
            text,
            start: offset,
            end: offset + raw.len(),
        });

        offset += raw.len();
    }

    lines
}

/// Maps byte offsets back to 1-based line/column positions.
#[derive(Debug, Clone)]
pub struct LineIndex {
    offsets: Vec<usize>,
}

impl LineIndex {
    pub fn new(contents: &str) -> Self {
        let mut offsets = vec![0];
        for (idx, ch) in contents.char_indices() {
            if ch == '\n' {
                offsets.push(idx + 1);
            }
        }
        Self { offsets }
    }

    pub fn line_count(&self) -> usize {
        self.offsets.len()
    }

    /// Returns `(line, column)`, both 1-based. Columns count characters, not bytes.
    pub fn position(&self, contents: &str, byte: usize) -> (usize, usize) {
        let line = match self.offsets.binary_search(&byte) {
            Ok(idx) => idx + 1,
            Err(idx) => idx,
        };
        let line_start = self.offsets[line - 1];
        let end = byte.min(contents.len());
        let column = contents
            .get(line_start..end)
            .map(|prefix| prefix.chars().count())
            .unwrap_or(0);
        (line, column + 1)
    }
}
