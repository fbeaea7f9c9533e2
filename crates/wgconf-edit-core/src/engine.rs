use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument};
use wgconf_syntax::{parse, LineIndex, Span, StructuralDocument};

use crate::annotate::{scan_document, Annotation, Finding, ScanResult, Severity};
use crate::diff::{unified_diff, DiffSummary};
use crate::error::{EditError, EditResult, ExitCode};
use crate::fs::write_atomic;
use crate::merge::merge_insert;
use crate::session::{ScanOutcome, ScanSession};
use crate::splice::Splice;
use crate::value::{load_value, ValueSource};

#[derive(Debug, Clone)]
pub struct EditOptions {
    pub dry_run: bool,
    pub backup: bool,
}

impl Default for EditOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            backup: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AddRequest {
    pub path: PathBuf,
    pub key: String,
    pub value: ValueSource,
    pub options: EditOptions,
}

#[derive(Debug)]
pub struct EditOutcome {
    pub changed: bool,
    pub diff: Option<DiffSummary>,
    pub splice: Option<Splice>,
    pub result: String,
    /// Scan of `result`.
    pub scan: ScanResult,
}

impl EditOutcome {
    /// Errors whose span touches the text written by the splice. Findings
    /// elsewhere in the document were there before the edit.
    pub fn introduced_errors(&self) -> impl Iterator<Item = &Annotation> {
        let inserted = self
            .splice
            .as_ref()
            .map(|splice| splice.range_start..splice.range_start + splice.replacement.len());
        self.scan.errors().filter(move |annotation| match &inserted {
            Some(range) => {
                let span = annotation.span;
                range.contains(&span.start) || (span.start < range.start && span.end() > range.start)
            }
            None => false,
        })
    }
}

/// Merge-inserts a value into a configuration file.
#[instrument(skip_all, fields(path = %request.path.display(), key = %request.key))]
pub fn add_value(request: AddRequest) -> EditResult<EditOutcome> {
    let content = std::fs::read_to_string(&request.path)?;
    let value = load_value(request.value)?;

    let splice = merge_insert(&content, &request.key, &value)?;
    let result = splice.apply(&content)?;
    let scan = scan_document(&result);
    if scan.has_errors() {
        debug!(errors = scan.errors().count(), "edited document has findings");
    }

    finish_edit(&request.path, content, result, Some(splice), scan, &request.options)
}

/// Fills the first empty `PrivateKey =` of a file with a generated key.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn fill_keys(path: &Path, options: &EditOptions) -> EditResult<EditOutcome> {
    let content = std::fs::read_to_string(path)?;
    let mut buffer = content.clone();

    let session = ScanSession::new();
    let refreshed = match session.refresh(&mut buffer)? {
        ScanOutcome::Completed(refreshed) => refreshed,
        ScanOutcome::Skipped => {
            return Err(EditError::Validation(
                "scan session is already running".to_string(),
            ))
        }
    };

    if refreshed.changed() {
        info!("generated private key");
    }
    finish_edit(
        path,
        content,
        buffer,
        refreshed.autofill,
        refreshed.result,
        options,
    )
}

fn finish_edit(
    path: &Path,
    original: String,
    result: String,
    splice: Option<Splice>,
    scan: ScanResult,
    options: &EditOptions,
) -> EditResult<EditOutcome> {
    if original == result {
        return Ok(EditOutcome {
            changed: false,
            diff: None,
            splice,
            result,
            scan,
        });
    }

    let diff = unified_diff(&original, &result, path.to_string_lossy().as_ref());

    if !options.dry_run {
        write_atomic(path, &result, options.backup)?;
    }

    Ok(EditOutcome {
        changed: true,
        diff,
        splice,
        result,
        scan,
    })
}

/// An annotation resolved to a 1-based line and column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocatedFinding {
    pub line: usize,
    pub column: usize,
    pub span: Span,
    pub severity: Severity,
    pub finding: Finding,
}

#[derive(Debug, Clone)]
pub struct CheckReport {
    pub path: PathBuf,
    pub text: String,
    pub result: ScanResult,
}

impl CheckReport {
    /// Every annotation that carries a finding, in document order.
    pub fn located(&self) -> Vec<LocatedFinding> {
        let index = LineIndex::new(&self.text);
        self.result
            .annotations()
            .iter()
            .filter_map(|annotation| {
                let finding = annotation.note?;
                let (line, column) = index.position(&self.text, annotation.span.start);
                Some(LocatedFinding {
                    line,
                    column,
                    span: annotation.span,
                    severity: annotation.severity,
                    finding,
                })
            })
            .collect()
    }

    pub fn exit_code(&self) -> ExitCode {
        if self.result.has_errors() {
            ExitCode::Validation
        } else {
            ExitCode::Success
        }
    }
}

#[instrument(skip_all, fields(path = %path.display()))]
pub fn check_file(path: &Path) -> EditResult<CheckReport> {
    let text = std::fs::read_to_string(path)?;
    let result = scan_document(&text);
    debug!(
        errors = result.errors().count(),
        "checked configuration"
    );
    Ok(CheckReport {
        path: path.to_path_buf(),
        text,
        result,
    })
}

/// Structural view of a file, optionally narrowed to one section.
pub fn load_structure(path: &Path, section: Option<&str>) -> EditResult<StructuralDocument> {
    let text = std::fs::read_to_string(path)?;
    let document = parse(&text);
    match section {
        Some(name) if document.section(name).is_none() => Err(EditError::NotFound(format!(
            "section [{name}] in {}",
            path.display()
        ))),
        _ => Ok(document),
    }
}
