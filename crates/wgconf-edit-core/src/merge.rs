use regex::{Captures, Regex};
use tracing::debug;

use crate::error::{EditError, EditResult};
use crate::splice::Splice;

/// Computes the splice that adds `value` to the first live occurrence of
/// `key` in `text`.
///
/// Key names match case-insensitively and commented-out lines never match.
/// Later duplicates of the key are left alone. The value is inserted as given;
/// the next scan is what validates it.
pub fn merge_insert(text: &str, key: &str, value: &str) -> EditResult<Splice> {
    let pattern = key_pattern(key)?;

    let Some(caps) = pattern
        .captures_iter(text)
        .find(|caps| caps.name("comment").is_none())
    else {
        debug!(key, "key absent, appending a new line");
        return Ok(Splice::insert(text.len(), format!("\n{key} = {value}")));
    };

    let splice = existing_line_splice(&caps, value);
    debug!(
        key,
        start = splice.range_start,
        len = splice.range_len,
        "merging into existing line"
    );
    Ok(splice)
}

fn key_pattern(key: &str) -> EditResult<Regex> {
    if key.is_empty() || !key.chars().all(|ch| ch.is_ascii_alphanumeric()) {
        return Err(EditError::InvalidArguments(format!(
            "key '{key}' must be a non-empty run of ASCII letters and digits"
        )));
    }

    let source = format!(
        r"(?mR)^[ \t]*(?P<comment>[;#].*?)?(?i:{})(?:(?P<bare>[ \t]*)$|[ \t]*=(?P<assigned>.*?)$|[ \t]+(?P<loose>.*?)$)",
        regex::escape(key)
    );
    Regex::new(&source).map_err(|err| EditError::InvalidArguments(err.to_string()))
}

fn existing_line_splice(caps: &Captures<'_>, value: &str) -> Splice {
    if let Some(assigned) = caps.name("assigned") {
        let existing = assigned.as_str().trim();
        let replacement = if existing.is_empty() {
            format!(" {value}")
        } else {
            format!(" {}", joined(existing, value))
        };
        return Splice::new(assigned.range(), replacement);
    }

    if let Some(loose) = caps.name("loose") {
        let replacement = format!("= {}", joined(loose.as_str().trim(), value));
        return Splice::new(loose.range(), replacement);
    }

    // Only the bare alternative is left: trailing blanks after the key.
    let bare_range = caps
        .name("bare")
        .map(|bare| bare.range())
        .unwrap_or_else(|| caps.get(0).map_or(0..0, |whole| whole.end()..whole.end()));
    Splice::new(bare_range, format!(" = {value}"))
}

fn joined(existing: &str, value: &str) -> String {
    if existing.ends_with(',') {
        format!("{existing}{value}")
    } else {
        format!("{existing},{value}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn merged(text: &str, key: &str, value: &str) -> String {
        merge_insert(text, key, value)
            .unwrap()
            .apply(text)
            .unwrap()
    }

    #[test]
    fn appends_to_existing_value() {
        assert_eq!(
            merged("[Peer]\nAllowedApps = app1", "AllowedApps", "app2"),
            "[Peer]\nAllowedApps = app1,app2"
        );
    }

    #[test]
    fn adds_line_when_key_is_absent() {
        let text = "[Peer]\n";
        let splice = merge_insert(text, "AllowedApps", "app1").unwrap();
        assert_eq!(splice.range(), text.len()..text.len());
        assert!(splice
            .apply(text)
            .unwrap()
            .ends_with("\nAllowedApps = app1"));
    }

    #[test]
    fn commented_occurrence_counts_as_absent() {
        assert_eq!(
            merged("[Peer]\n; AllowedApps = x", "AllowedApps", "y"),
            "[Peer]\n; AllowedApps = x\nAllowedApps = y"
        );
        assert_eq!(
            merged("#AllowedApps = x\nAllowedApps = a\n", "AllowedApps", "b"),
            "#AllowedApps = x\nAllowedApps = a,b\n"
        );
    }

    #[test]
    fn bare_key_gains_an_assignment() {
        assert_eq!(
            merged("[Peer]\nAllowedApps  \n", "AllowedApps", "app1"),
            "[Peer]\nAllowedApps = app1\n"
        );
        assert_eq!(merged("AllowedApps", "AllowedApps", "a"), "AllowedApps = a");
    }

    #[test]
    fn trailing_comma_is_not_doubled() {
        assert_eq!(
            merged("AllowedApps = app1,\n", "AllowedApps", "app2"),
            "AllowedApps = app1,app2\n"
        );
    }

    #[test]
    fn blank_value_is_set() {
        assert_eq!(merged("AllowedApps =   \n", "AllowedApps", "app1"), "AllowedApps = app1\n");
        assert_eq!(merged("AllowedApps=", "AllowedApps", "app1"), "AllowedApps= app1");
    }

    #[test]
    fn only_the_first_live_match_changes() {
        assert_eq!(
            merged("AllowedApps = a\nAllowedApps = b\n", "AllowedApps", "c"),
            "AllowedApps = a,c\nAllowedApps = b\n"
        );
    }

    #[test]
    fn key_name_is_case_insensitive() {
        assert_eq!(
            merged("allowedapps = a", "AllowedApps", "b"),
            "allowedapps = a,b"
        );
    }

    #[test]
    fn loose_value_without_equals_is_kept() {
        assert_eq!(
            merged("AllowedApps app1\n", "AllowedApps", "app2"),
            "AllowedApps = app1,app2\n"
        );
    }

    #[test]
    fn does_not_match_longer_key_names() {
        assert_eq!(
            merged("AllowedAppsExtra = a", "AllowedApps", "b"),
            "AllowedAppsExtra = a\nAllowedApps = b"
        );
    }

    #[test]
    fn keeps_crlf_line_endings() {
        assert_eq!(
            merged("AllowedApps = a\r\nMTU = 1\r\n", "AllowedApps", "b"),
            "AllowedApps = a,b\r\nMTU = 1\r\n"
        );
    }

    #[test]
    fn cursor_lands_after_the_replacement() {
        let text = "AllowedApps = app1";
        let splice = merge_insert(text, "AllowedApps", "app2").unwrap();
        let merged = splice.apply(text).unwrap();
        assert_eq!(splice.new_cursor_offset, merged.len());
    }

    #[test]
    fn rejects_keys_that_cannot_name_a_line() {
        for key in ["", "Allowed Apps", "a=b", "line\nbreak"] {
            assert!(matches!(
                merge_insert("", key, "x"),
                Err(EditError::InvalidArguments(_))
            ));
        }
    }
}
