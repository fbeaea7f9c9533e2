use std::fmt;
use std::str::FromStr;

use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use tracing::debug;
use wgconf_syntax::{scan_lines, KeyValueMatch, LineMatch, Span};

use crate::keys::KeyPair;
use crate::rules::{is_known_section, rule_for, FieldReport, Rule};
use crate::splice::Splice;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Info,
    Error,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "info" => Ok(Severity::Info),
            "error" => Ok(Severity::Error),
            _ => Err(()),
        }
    }
}

/// Why a span was flagged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Finding {
    UnrecognizedSection,
    UnrecognizedKey,
    MalformedKeyMaterial,
    InvalidAddressOrSubnet,
    InvalidDnsAddress,
    InvalidEndpoint,
    InvalidNumericRange,
    InvalidPathPattern,
}

impl Finding {
    pub const ALL: [Finding; 8] = [
        Finding::UnrecognizedSection,
        Finding::UnrecognizedKey,
        Finding::MalformedKeyMaterial,
        Finding::InvalidAddressOrSubnet,
        Finding::InvalidDnsAddress,
        Finding::InvalidEndpoint,
        Finding::InvalidNumericRange,
        Finding::InvalidPathPattern,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Finding::UnrecognizedSection => "unrecognized-section",
            Finding::UnrecognizedKey => "unrecognized-key",
            Finding::MalformedKeyMaterial => "malformed-key-material",
            Finding::InvalidAddressOrSubnet => "invalid-address-or-subnet",
            Finding::InvalidDnsAddress => "invalid-dns-address",
            Finding::InvalidEndpoint => "invalid-endpoint",
            Finding::InvalidNumericRange => "invalid-numeric-range",
            Finding::InvalidPathPattern => "invalid-path-pattern",
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Finding::UnrecognizedSection => "section must be [Interface] or [Peer]",
            Finding::UnrecognizedKey => "unknown configuration key",
            Finding::MalformedKeyMaterial => "key must be base64 encoding 32 bytes",
            Finding::InvalidAddressOrSubnet => "expected an IP address or CIDR subnet",
            Finding::InvalidDnsAddress => "expected an IP address",
            Finding::InvalidEndpoint => "expected an IP address or host name with optional port",
            Finding::InvalidNumericRange => "expected an integer between 0 and 65535",
            Finding::InvalidPathPattern => "expected a file or directory path",
        }
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Finding {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Finding::ALL
            .into_iter()
            .find(|finding| finding.as_str() == value)
            .ok_or(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Annotation {
    pub span: Span,
    pub severity: Severity,
    pub note: Option<Finding>,
}

impl Annotation {
    pub fn info(span: Span) -> Self {
        Self {
            span,
            severity: Severity::Info,
            note: None,
        }
    }

    pub fn error(span: Span, finding: Finding) -> Self {
        Self {
            span,
            severity: Severity::Error,
            note: Some(finding),
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// Everything one scan learned about a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanResult {
    annotations: Vec<Annotation>,
    has_errors: bool,
    derived_private_key: Option<String>,
    derived_public_key: Option<String>,
    autofill: Option<Splice>,
}

impl ScanResult {
    fn new(
        annotations: Vec<Annotation>,
        derived_private_key: Option<String>,
        derived_public_key: Option<String>,
        autofill: Option<Splice>,
    ) -> Self {
        let has_errors = annotations.iter().any(Annotation::is_error);
        Self {
            annotations,
            has_errors,
            derived_private_key,
            derived_public_key,
            autofill,
        }
    }

    /// Annotations in document order.
    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    pub fn errors(&self) -> impl Iterator<Item = &Annotation> {
        self.annotations.iter().filter(|annotation| annotation.is_error())
    }

    pub fn has_errors(&self) -> bool {
        self.has_errors
    }

    /// Base64 private key generated for an empty `PrivateKey` value.
    pub fn derived_private_key(&self) -> Option<&str> {
        self.derived_private_key.as_deref()
    }

    /// Public key of the first `PrivateKey` that is valid or was generated.
    pub fn derived_public_key(&self) -> Option<&str> {
        self.derived_public_key.as_deref()
    }

    /// Edit that writes the generated private key into the document.
    pub fn autofill(&self) -> Option<&Splice> {
        self.autofill.as_ref()
    }

    /// Copy of this result with the severity of each noted finding replaced
    /// by `grade`. Findings for which `grade` returns `None` keep theirs.
    pub fn regraded(&self, grade: impl Fn(Finding) -> Option<Severity>) -> ScanResult {
        let annotations = self
            .annotations
            .iter()
            .map(|annotation| match annotation.note.and_then(&grade) {
                Some(severity) => Annotation {
                    severity,
                    ..*annotation
                },
                None => *annotation,
            })
            .collect();

        ScanResult::new(
            annotations,
            self.derived_private_key.clone(),
            self.derived_public_key.clone(),
            self.autofill.clone(),
        )
    }
}

/// Scans `text` with keys generated from the operating system's RNG.
///
/// Annotations depend only on `text`. When an empty `PrivateKey =` is
/// present the generated key and its autofill differ from call to call, so
/// two results for the same text compare unequal; use [`scan_document_with`]
/// and a seeded RNG when results must be reproducible.
pub fn scan_document(text: &str) -> ScanResult {
    scan_document_with(text, &mut OsRng)
}

/// Scans `text` and validates every key/value pair, drawing any generated
/// private key from `rng`.
///
/// At most one empty `PrivateKey =` is filled per scan; the caller applies
/// [`ScanResult::autofill`] and scans again so offsets match the edited text.
pub fn scan_document_with<R: RngCore + CryptoRng>(text: &str, rng: &mut R) -> ScanResult {
    let mut annotations = Vec::new();
    let mut derived_private_key = None;
    let mut derived_public_key = None;
    let mut autofill = None;

    for matched in scan_lines(text) {
        match matched {
            LineMatch::Comment { span, .. } => annotations.push(Annotation::info(span)),
            LineMatch::Section { span } => {
                let name = matched.section_name(text).unwrap_or_default();
                if is_known_section(name) {
                    annotations.push(Annotation::info(span));
                } else {
                    annotations.push(Annotation::error(span, Finding::UnrecognizedSection));
                }
            }
            LineMatch::KeyValue(pair) => {
                let Some(rule) = rule_for(pair.key.slice(text)) else {
                    annotations.push(Annotation::error(pair.key, Finding::UnrecognizedKey));
                    annotations.extend(pair.value.map(Annotation::info));
                    continue;
                };

                annotations.push(Annotation::info(pair.key));
                let report = push_value(&mut annotations, text, &pair, rule);

                if report.wants_generated_key {
                    if autofill.is_none() {
                        let generated = KeyPair::generate_with(rng);
                        let value_span = pair.value_or_empty();
                        debug!(offset = value_span.start, "generated private key for empty value");
                        let replacement = if text[..value_span.start].ends_with('=') {
                            format!(" {}", generated.private_base64())
                        } else {
                            generated.private_base64()
                        };
                        autofill = Some(Splice::new(value_span.range(), replacement));
                        derived_private_key = Some(generated.private_base64());
                        derived_public_key.get_or_insert_with(|| generated.public_base64());
                    }
                } else if derived_public_key.is_none() {
                    derived_public_key = report.public_key;
                }
            }
        }
    }

    let result = ScanResult::new(annotations, derived_private_key, derived_public_key, autofill);
    debug!(
        annotations = result.annotations.len(),
        has_errors = result.has_errors,
        autofill = result.autofill.is_some(),
        "scanned document"
    );
    result
}

// A whole-value error replaces the value's info span; token errors sit
// after it. Bare keys are still being typed and are not validated.
fn push_value(
    annotations: &mut Vec<Annotation>,
    text: &str,
    pair: &KeyValueMatch,
    rule: Rule,
) -> FieldReport {
    let Some(value_span) = pair.value else {
        return FieldReport::default();
    };
    let mut report = rule.validate(pair.value_text(text), value_span);

    let covers_value = report
        .errors
        .iter()
        .any(|annotation| annotation.span == value_span);
    if !covers_value {
        annotations.push(Annotation::info(value_span));
    }
    annotations.append(&mut report.errors);
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{decode_key, encode_key};
    use pretty_assertions::assert_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn scan(text: &str) -> ScanResult {
        scan_document_with(text, &mut StdRng::seed_from_u64(1))
    }

    fn errors(text: &str) -> Vec<(&str, Finding)> {
        scan(text)
            .errors()
            .map(|annotation| {
                (
                    annotation.span.slice(text),
                    annotation.note.expect("errors carry a finding"),
                )
            })
            .collect()
    }

    #[test]
    fn clean_profile_has_only_info_spans() {
        let key = encode_key(&[5u8; 32]);
        let text = format!(
            "# profile\n[Interface]\nPrivateKey = {key}\nMTU = 1280\n\n[Peer]\nEndpoint = vpn.example.com:51820\n"
        );
        let result = scan(&text);
        assert!(!result.has_errors());
        let painted: Vec<_> = result
            .annotations()
            .iter()
            .map(|annotation| annotation.span.slice(&text))
            .collect();
        assert_eq!(
            painted,
            vec![
                "# profile",
                "[Interface]",
                "PrivateKey",
                key.as_str(),
                "MTU",
                "1280",
                "[Peer]",
                "Endpoint",
                "vpn.example.com:51820",
            ]
        );
        assert!(result.derived_public_key().is_some());
        assert!(result.autofill().is_none());
    }

    #[test]
    fn subnet_errors_cover_the_bad_token_only() {
        assert_eq!(
            errors("[Peer]\nAllowedIPs = 10.0.0.1/33"),
            vec![("10.0.0.1/33", Finding::InvalidAddressOrSubnet)]
        );
        assert!(errors("[Peer]\nAllowedIPs = 10.0.0.1/24").is_empty());
        assert_eq!(
            errors("[Peer]\nAllowedIPs = 10.0.0.0/8,  999.1.1.1"),
            vec![("999.1.1.1", Finding::InvalidAddressOrSubnet)]
        );
    }

    #[test]
    fn numeric_values_are_range_checked() {
        assert_eq!(
            errors("[Interface]\nMtu = 70000"),
            vec![("70000", Finding::InvalidNumericRange)]
        );
        assert_eq!(
            errors("[Interface]\nMtu = -1"),
            vec![("-1", Finding::InvalidNumericRange)]
        );
        assert!(errors("[Interface]\nMtu = 1280").is_empty());
    }

    #[test]
    fn whole_value_error_replaces_the_value_span() {
        let text = "[Interface]\nMTU = big\n";
        let result = scan(text);
        let on_value: Vec<_> = result
            .annotations()
            .iter()
            .filter(|annotation| annotation.span.slice(text) == "big")
            .collect();
        assert_eq!(on_value.len(), 1);
        assert!(on_value[0].is_error());
    }

    #[test]
    fn unknown_sections_do_not_stop_scanning() {
        assert_eq!(
            errors("[Peers]\nDNS = 1.1.1.0/24\n"),
            vec![
                ("[Peers]", Finding::UnrecognizedSection),
                ("1.1.1.0/24", Finding::InvalidDnsAddress),
            ]
        );
    }

    #[test]
    fn unknown_keys_flag_the_key_only() {
        let text = "[Interface]\nTable = off\n";
        let result = scan(text);
        assert_eq!(errors(text), vec![("Table", Finding::UnrecognizedKey)]);
        assert!(result
            .annotations()
            .iter()
            .any(|annotation| !annotation.is_error() && annotation.span.slice(text) == "off"));
    }

    #[test]
    fn malformed_private_key_is_reported_not_raised() {
        assert_eq!(
            errors("[Interface]\nPrivateKey = AAAA\n"),
            vec![("AAAA", Finding::MalformedKeyMaterial)]
        );
        assert!(scan("[Interface]\nPrivateKey = AAAA\n")
            .derived_public_key()
            .is_none());
    }

    #[test]
    fn empty_private_key_is_generated_and_then_validates() {
        let text = "[Interface]\nPrivateKey =\nMTU = 1280\n";
        let result = scan(text);
        assert!(!result.has_errors());

        let splice = result.autofill().unwrap();
        assert_eq!(splice.range(), 24..24);

        let filled = splice.apply(text).unwrap();
        let generated = result.derived_private_key().unwrap();
        assert!(filled.contains(&format!("PrivateKey = {generated}\n")));
        assert!(decode_key(generated).is_ok());

        let rescanned = scan(&filled);
        assert!(!rescanned.has_errors());
        assert!(rescanned.autofill().is_none());
        assert_eq!(rescanned.derived_public_key(), result.derived_public_key());
    }

    #[test]
    fn only_one_private_key_is_generated_per_scan() {
        let text = "[Interface]\nPrivateKey =\n[Interface]\nPrivateKey = \n";
        let first = scan(text).autofill().cloned().unwrap();
        assert_eq!(first.range_start, 24);

        let filled = first.apply(text).unwrap();
        let second = scan(&filled).autofill().cloned().unwrap();
        assert_eq!(second.range_start, filled.len() - 1);
    }

    #[test]
    fn bare_private_key_is_left_alone() {
        let result = scan("[Interface]\nPrivateKey\n");
        assert!(!result.has_errors());
        assert!(result.autofill().is_none());
        assert_eq!(result.annotations().len(), 2);
        assert!(!scan("[Peer]\nEndpoint   \nMTU\n").has_errors());
    }

    #[test]
    fn scanning_is_idempotent() {
        let text = "[Peer]\nAllowedApps = chrome.exe, bad|app\nEndpoint = :\n";
        assert_eq!(scan(text), scan(text));
    }

    #[test]
    fn rescan_after_merge_only_moves_the_edited_line() {
        let text = "[Peer]\nAllowedApps = a\nMTU = 1\n";
        let before = scan(text);
        let splice = crate::merge::merge_insert(text, "AllowedApps", "b").unwrap();
        let edited = splice.apply(text).unwrap();
        let after = scan(&edited);

        assert_eq!(before.annotations().len(), after.annotations().len());
        let shift = edited.len() - text.len();
        for (old, new) in before.annotations().iter().zip(after.annotations()) {
            if old.span.start >= splice.range().end {
                assert_eq!(new.span.start, old.span.start + shift);
            } else if old.span.end() <= splice.range_start {
                assert_eq!(new.span, old.span);
            }
        }
    }

    #[test]
    fn regrading_can_silence_a_finding() {
        let result = scan("[Interface]\nTable = off\n");
        assert!(result.has_errors());
        let relaxed = result.regraded(|finding| {
            (finding == Finding::UnrecognizedKey).then_some(Severity::Info)
        });
        assert!(!relaxed.has_errors());
        assert_eq!(relaxed.annotations().len(), result.annotations().len());
    }

    #[test]
    fn finding_slugs_round_trip() {
        for finding in Finding::ALL {
            assert_eq!(finding.as_str().parse::<Finding>(), Ok(finding));
        }
        assert!("nope".parse::<Finding>().is_err());
    }

    #[test]
    fn os_rng_scans_agree_on_annotations_only() {
        let text = "[Interface]\nPrivateKey =\n";
        let first = scan_document(text);
        let second = scan_document(text);

        assert_eq!(first.annotations(), second.annotations());
        assert_eq!(first.has_errors(), second.has_errors());
        assert_ne!(first.derived_private_key(), second.derived_private_key());
    }
}
