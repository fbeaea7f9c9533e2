use std::io::{self, Read};
use std::path::PathBuf;

use crate::error::{EditError, EditResult};

/// Where the value for a merge-insert comes from. Pickers and scripts hand
/// over a single line, either inline, in a file or on stdin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueSource {
    Inline(String),
    File(PathBuf),
    Stdin,
}

pub fn load_value(source: ValueSource) -> EditResult<String> {
    let raw = match source {
        ValueSource::Inline(raw) => raw,
        ValueSource::File(path) => std::fs::read_to_string(&path).map_err(|err| {
            EditError::InvalidContent(format!(
                "failed to read value file '{}': {err}",
                path.display()
            ))
        })?,
        ValueSource::Stdin => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer).map_err(|err| {
                EditError::InvalidContent(format!("failed to read value from stdin: {err}"))
            })?;
            buffer
        }
    };

    single_line(&raw)
}

fn single_line(raw: &str) -> EditResult<String> {
    let value = raw.trim_end_matches(['\r', '\n']).trim();
    if value.is_empty() {
        return Err(EditError::InvalidContent("value is empty".to_string()));
    }
    if value.contains(['\r', '\n']) {
        return Err(EditError::InvalidContent(
            "value must fit on a single line".to_string(),
        ));
    }
    Ok(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn trims_the_trailing_newline() {
        assert_eq!(single_line("chrome.exe\n").unwrap(), "chrome.exe");
        assert_eq!(single_line("  10.0.0.0/8 \r\n").unwrap(), "10.0.0.0/8");
    }

    #[test]
    fn rejects_empty_and_multi_line_values() {
        assert!(matches!(single_line(" \n"), Err(EditError::InvalidContent(_))));
        assert!(matches!(single_line("a\nb"), Err(EditError::InvalidContent(_))));
    }

    #[test]
    fn reads_values_from_files() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "C:\\Games\\game.exe\n").unwrap();
        assert_eq!(
            load_value(ValueSource::File(file.path().to_path_buf())).unwrap(),
            "C:\\Games\\game.exe"
        );
        assert!(matches!(
            load_value(ValueSource::File(file.path().join("missing"))),
            Err(EditError::InvalidContent(_))
        ));
    }
}
