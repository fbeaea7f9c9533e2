use std::ops::Range;
use std::sync::LazyLock;

use regex::{Captures, Regex};

// Keys may be typed without `=value` yet; the value group only participates
// once the equals sign is present.
static LINE_GRAMMAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?mR)^[ \t]*(?:",
        r"(?P<comment>[;#].*)",
        r"|(?P<section>\[\w+\])",
        r"|(?P<key>[A-Za-z0-9]+)(?:[ \t]*=[ \t]*(?P<value>.*?))?",
        r")[ \t]*$",
    ))
    .expect("line grammar pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Comment,
    Section,
    Key,
    Value,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Comment => "comment",
            Role::Section => "section",
            Role::Key => "key",
            Role::Value => "value",
        }
    }
}

/// Byte range into the text a scan was computed from, tagged with its role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
    pub start: usize,
    pub len: usize,
    pub role: Role,
}

impl Span {
    pub fn new(start: usize, len: usize, role: Role) -> Self {
        Self { start, len, role }
    }

    pub fn end(&self) -> usize {
        self.start + self.len
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end()
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn slice<'a>(&self, text: &'a str) -> &'a str {
        &text[self.range()]
    }

    /// Narrows to a sub-range given relative to this span's start.
    pub fn sub_span(&self, relative: Range<usize>) -> Span {
        Span::new(self.start + relative.start, relative.len(), self.role)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentMarker {
    Hash,
    Semicolon,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyValueMatch {
    pub key: Span,
    /// `None` for a bare key that has not been followed by `=` yet.
    pub value: Option<Span>,
}

impl KeyValueMatch {
    pub fn has_equals(&self) -> bool {
        self.value.is_some()
    }

    /// Key name lower-cased for validator lookup.
    pub fn normalized_key(&self, text: &str) -> String {
        self.key.slice(text).to_ascii_lowercase()
    }

    pub fn value_text<'a>(&self, text: &'a str) -> &'a str {
        self.value.map(|span| span.slice(text)).unwrap_or("")
    }

    /// Value span, or an empty span right after the key for bare keys.
    pub fn value_or_empty(&self) -> Span {
        self.value
            .unwrap_or_else(|| Span::new(self.key.end(), 0, Role::Value))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineMatch {
    Comment { span: Span, marker: CommentMarker },
    Section { span: Span },
    KeyValue(KeyValueMatch),
}

impl LineMatch {
    /// Byte offset of the first captured group on the line.
    pub fn start(&self) -> usize {
        match self {
            LineMatch::Comment { span, .. } | LineMatch::Section { span } => span.start,
            LineMatch::KeyValue(pair) => pair.key.start,
        }
    }

    /// Section name without the brackets.
    pub fn section_name<'a>(&self, text: &'a str) -> Option<&'a str> {
        match self {
            LineMatch::Section { span } => {
                let raw = span.slice(text);
                Some(&raw[1..raw.len() - 1])
            }
            _ => None,
        }
    }
}

/// Classifies every recognisable line of `text` in a single pass.
///
/// Lines that are neither comments, section headers nor key/value pairs are
/// skipped; the scanner never fails.
pub fn scan_lines(text: &str) -> Vec<LineMatch> {
    LINE_GRAMMAR
        .captures_iter(text)
        .filter_map(|caps| classify(&caps))
        .collect()
}

fn classify(caps: &Captures<'_>) -> Option<LineMatch> {
    if let Some(comment) = caps.name("comment") {
        let marker = if comment.as_str().starts_with('#') {
            CommentMarker::Hash
        } else {
            CommentMarker::Semicolon
        };
        return Some(LineMatch::Comment {
            span: Span::new(comment.start(), comment.len(), Role::Comment),
            marker,
        });
    }

    if let Some(section) = caps.name("section") {
        return Some(LineMatch::Section {
            span: Span::new(section.start(), section.len(), Role::Section),
        });
    }

    let key = caps.name("key")?;
    let value = caps
        .name("value")
        .map(|value| Span::new(value.start(), value.len(), Role::Value));

    Some(LineMatch::KeyValue(KeyValueMatch {
        key: Span::new(key.start(), key.len(), Role::Key),
        value,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn key_value(matches: &[LineMatch], idx: usize) -> KeyValueMatch {
        match matches[idx] {
            LineMatch::KeyValue(pair) => pair,
            other => panic!("expected key/value, got {other:?}"),
        }
    }

    #[test]
    fn classifies_each_line_kind() {
        let text = "# note\n[Interface]\nPrivateKey = abc\n; other\n";
        let matches = scan_lines(text);
        assert_eq!(matches.len(), 4);

        assert!(matches!(
            matches[0],
            LineMatch::Comment {
                marker: CommentMarker::Hash,
                ..
            }
        ));
        assert_eq!(matches[1].section_name(text), Some("Interface"));
        let pair = key_value(&matches, 2);
        assert_eq!(pair.key.slice(text), "PrivateKey");
        assert_eq!(pair.value_text(text), "abc");
        assert!(matches!(
            matches[3],
            LineMatch::Comment {
                marker: CommentMarker::Semicolon,
                ..
            }
        ));
    }

    #[test]
    fn keeps_offsets_with_leading_whitespace() {
        let text = "  \t# indented\n   [Peer]  \n";
        let matches = scan_lines(text);
        match matches[0] {
            LineMatch::Comment { span, .. } => {
                assert_eq!(span.start, 3);
                assert_eq!(span.slice(text), "# indented");
            }
            other => panic!("unexpected {other:?}"),
        }
        match matches[1] {
            LineMatch::Section { span } => assert_eq!(span.slice(text), "[Peer]"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn accepts_bare_key_and_empty_value() {
        let text = "[Peer]\nAllowedApps   \nPrivateKey =\nMTU=1280\n";
        let matches = scan_lines(text);
        assert_eq!(matches.len(), 4);

        let bare = key_value(&matches, 1);
        assert_eq!(bare.key.slice(text), "AllowedApps");
        assert!(!bare.has_equals());
        assert_eq!(bare.value_or_empty().start, bare.key.end());

        let empty = key_value(&matches, 2);
        assert!(empty.has_equals());
        assert_eq!(empty.value_text(text), "");

        let tight = key_value(&matches, 3);
        assert_eq!(tight.normalized_key(text), "mtu");
        assert_eq!(tight.value_text(text), "1280");
    }

    #[test]
    fn trailing_whitespace_is_not_part_of_value() {
        let text = "Endpoint = host:51820 \t\r\nDNS = 1.1.1.1\r\n";
        let matches = scan_lines(text);
        assert_eq!(matches.len(), 2);
        assert_eq!(key_value(&matches, 0).value_text(text), "host:51820");
        assert_eq!(key_value(&matches, 1).value_text(text), "1.1.1.1");
    }

    #[test]
    fn skips_unrecognized_lines() {
        let text = "[Peer\nnot a pair\n[bad name]\n= value\n\n";
        assert!(scan_lines(text).is_empty());
    }

    #[test]
    fn value_may_contain_equals() {
        let text = "PostUp = iptables -A FORWARD -j MARK --set-mark=1";
        let matches = scan_lines(text);
        assert_eq!(
            key_value(&matches, 0).value_text(text),
            "iptables -A FORWARD -j MARK --set-mark=1"
        );
    }
}
