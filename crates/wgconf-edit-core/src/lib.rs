//! Authoring engine for WireGuard-style tunnel configuration files.
//!
//! [`scan_document`] validates a possibly incomplete document and reports
//! every span it recognised as an [`Annotation`]. [`merge_insert`] computes the
//! [`Splice`] that adds a value to a key. [`ScanSession`] drives the
//! scan/autofill/re-scan loop for a caller-owned buffer. The file-level
//! functions in [`engine`] wrap all of this for command-line use.

pub mod annotate;
pub mod diff;
pub mod engine;
pub mod error;
pub mod fs;
pub mod keys;
pub mod merge;
pub mod rules;
pub mod session;
pub mod splice;
pub mod value;

pub use annotate::{scan_document, scan_document_with, Annotation, Finding, ScanResult, Severity};
pub use engine::{
    add_value, check_file, fill_keys, load_structure, AddRequest, CheckReport, EditOptions,
    EditOutcome, LocatedFinding,
};
pub use error::{EditError, EditResult, ExitCode};
pub use keys::{KeyError, KeyPair};
pub use merge::merge_insert;
pub use rules::{rule_for, Rule};
pub use session::{Refreshed, ScanOutcome, ScanSession, ScanState, TextBuffer};
pub use splice::Splice;
pub use value::ValueSource;
pub use wgconf_syntax::{Role, Span};
