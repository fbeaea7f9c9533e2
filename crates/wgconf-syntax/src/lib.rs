//! Line grammar for WireGuard-style tunnel configuration files.
//!
//! Two views of the same text are offered. [`scan_lines`] classifies every
//! line of a possibly incomplete document into structural spans that keep
//! their original byte offsets, which is what live editing needs. [`parse`]
//! turns a finished file into a section → key → values model for lookups.

mod grammar;
mod line;
mod structure;

pub use grammar::{scan_lines, CommentMarker, KeyValueMatch, LineMatch, Role, Span};
pub use line::{split_lines, LineIndex, LineRecord};
pub use structure::{parse, Section, StructuralDocument};
