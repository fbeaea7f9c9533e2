use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::ops::Range;
use std::sync::LazyLock;

use ipnet::IpNet;
use regex::Regex;
use wgconf_syntax::Span;

use crate::annotate::{Annotation, Finding};
use crate::keys::{decode_key, encode_key, KeyPair};

/// Validation applied to the value of a recognised key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    /// Base64 32-byte key that also yields a derived public key. An empty
    /// value asks the engine to generate a fresh pair.
    PrivateKey,
    /// Optional base64 32-byte key.
    Base64Key,
    /// Delimited list of addresses or CIDR subnets.
    AddressList,
    /// Delimited list of plain IP addresses.
    DnsList,
    /// Address or host name with an optional port.
    Endpoint,
    /// Integer in `0..=65535`.
    Numeric,
    /// Delimited list of Windows-style file or directory paths.
    PathList,
    /// Accepted as typed.
    FreeText,
}

const SECTIONS: &[&str] = &["interface", "peer"];

const KEY_RULES: &[(&[&str], Rule)] = &[
    (&["privatekey"], Rule::PrivateKey),
    (&["publickey", "presharedkey"], Rule::Base64Key),
    (&["address", "allowedips", "disallowedips"], Rule::AddressList),
    (&["dns"], Rule::DnsList),
    (&["endpoint", "socks5proxy"], Rule::Endpoint),
    (
        &["mtu", "listenport", "persistentkeepalive", "scriptexectimeout"],
        Rule::Numeric,
    ),
    (&["allowedapps", "disallowedapps"], Rule::PathList),
    (
        &[
            "socks5proxyusername",
            "socks5proxypassword",
            "preup",
            "postup",
            "predown",
            "postdown",
        ],
        Rule::FreeText,
    ),
];

static REGISTRY: LazyLock<HashMap<&'static str, Rule>> = LazyLock::new(|| {
    KEY_RULES
        .iter()
        .flat_map(|(keys, rule)| keys.iter().map(move |key| (*key, *rule)))
        .collect()
});

static PATH_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^(?:[a-zA-Z]:\\)?(?:[^<>:"/\\|?*\n\r]+\\)*[^<>:"/\\|?*\n\r]*$"#)
        .expect("path pattern is valid")
});

/// Looks up the rule for a key name, ignoring ASCII case.
pub fn rule_for(key: &str) -> Option<Rule> {
    REGISTRY.get(key.to_ascii_lowercase().as_str()).copied()
}

pub fn is_known_section(name: &str) -> bool {
    SECTIONS.iter().any(|known| known.eq_ignore_ascii_case(name))
}

/// Findings and side outputs for a single value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldReport {
    pub errors: Vec<Annotation>,
    /// Base64 public key derived from a valid private key.
    pub public_key: Option<String>,
    /// Set when an empty private key should be filled with a generated one.
    pub wants_generated_key: bool,
}

impl FieldReport {
    fn error(span: Span, finding: Finding) -> Self {
        Self {
            errors: vec![Annotation::error(span, finding)],
            ..Self::default()
        }
    }
}

impl Rule {
    /// Checks `value`, whose position in the document is `span`. Never fails;
    /// problems come back as error annotations.
    pub fn validate(self, value: &str, span: Span) -> FieldReport {
        match self {
            Rule::PrivateKey => validate_private_key(value, span),
            Rule::Base64Key => {
                if value.is_empty() || decode_key(value).is_ok() {
                    FieldReport::default()
                } else {
                    FieldReport::error(span, Finding::MalformedKeyMaterial)
                }
            }
            Rule::AddressList => {
                validate_tokens(value, span, Finding::InvalidAddressOrSubnet, is_address_or_subnet)
            }
            Rule::DnsList => {
                validate_tokens(value, span, Finding::InvalidDnsAddress, |token| {
                    token.parse::<IpAddr>().is_ok()
                })
            }
            Rule::Endpoint => {
                if is_valid_endpoint(value) {
                    FieldReport::default()
                } else {
                    FieldReport::error(span, Finding::InvalidEndpoint)
                }
            }
            Rule::Numeric => match value.parse::<i64>() {
                Ok(number) if (0..=65535).contains(&number) => FieldReport::default(),
                _ => FieldReport::error(span, Finding::InvalidNumericRange),
            },
            Rule::PathList => validate_tokens(value, span, Finding::InvalidPathPattern, |token| {
                PATH_PATTERN.is_match(token)
            }),
            Rule::FreeText => FieldReport::default(),
        }
    }
}

fn validate_private_key(value: &str, span: Span) -> FieldReport {
    if value.is_empty() {
        return FieldReport {
            wants_generated_key: true,
            ..FieldReport::default()
        };
    }

    match decode_key(value) {
        Ok(bytes) => FieldReport {
            public_key: Some(encode_key(KeyPair::from_private(bytes).public_key())),
            ..FieldReport::default()
        },
        Err(_) => FieldReport::error(span, Finding::MalformedKeyMaterial),
    }
}

fn validate_tokens(
    value: &str,
    span: Span,
    finding: Finding,
    is_valid: impl Fn(&str) -> bool,
) -> FieldReport {
    let errors = tokens(value)
        .filter(|(_, token)| !is_valid(token))
        .map(|(range, _)| Annotation::error(span.sub_span(range), finding))
        .collect();

    FieldReport {
        errors,
        ..FieldReport::default()
    }
}

/// Splits a multi-value field on runs of commas and blanks, yielding each
/// token with its byte range inside `value`.
pub fn tokens(value: &str) -> impl Iterator<Item = (Range<usize>, &str)> {
    let mut tokens = Vec::new();
    let mut start: Option<usize> = None;

    for (idx, ch) in value.char_indices() {
        let is_delimiter = matches!(ch, ',' | ' ' | '\t');
        match (is_delimiter, start) {
            (true, Some(token_start)) => {
                tokens.push((token_start..idx, &value[token_start..idx]));
                start = None;
            }
            (false, None) => start = Some(idx),
            _ => {}
        }
    }

    if let Some(token_start) = start {
        tokens.push((token_start..value.len(), &value[token_start..]));
    }

    tokens.into_iter()
}

fn is_address_or_subnet(token: &str) -> bool {
    token.parse::<IpNet>().is_ok() || token.parse::<IpAddr>().is_ok()
}

fn is_valid_endpoint(value: &str) -> bool {
    if value.is_empty() {
        return false;
    }

    if value.parse::<SocketAddr>().is_ok() || value.parse::<IpAddr>().is_ok() {
        return true;
    }

    match value.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') => {
            port.parse::<u16>().is_ok() && is_valid_host_name(host)
        }
        Some(_) => false,
        None => is_valid_host_name(value),
    }
}

fn is_valid_host_name(host: &str) -> bool {
    let host = host.strip_suffix('.').unwrap_or(host);
    if host.is_empty() || host.len() > 253 {
        return false;
    }

    host.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
    })
}
