//! Configuration loader for the `wgconf` command-line tool.
//!
//! Settings resolve through the stack
//! override flag → working directory → git root → built-in defaults,
//! merging field by field and remembering which layer supplied each value.

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use wgconf_edit_core::{Finding, Severity};

const CONFIG_FILE_NAME: &str = ".wgconf.toml";
const LOG_LEVELS: &[&str] = &["off", "error", "warn", "info", "debug", "trace"];

/// Complete configuration resolved from defaults and on-disk overrides.
#[derive(Clone, Debug)]
pub struct Config {
    pub edit: EditSettings,
    pub check: CheckSettings,
    pub log: LogSettings,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EditSettings {
    /// Keep `<file>.bak` when a file is rewritten.
    pub backup: bool,
}

/// Severity re-grading applied to `wgconf check` output.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CheckSettings {
    pub severity: HashMap<Finding, Severity>,
}

impl CheckSettings {
    /// Configured severity for `finding`, or `None` to keep the engine's.
    pub fn severity_for(&self, finding: Finding) -> Option<Severity> {
        self.severity.get(&finding).copied()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogSettings {
    pub level: String,
}

/// Where a setting came from; carried into validation messages.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConfigSource {
    pub kind: ConfigSourceKind,
    pub path: Option<PathBuf>,
}

impl ConfigSource {
    fn default() -> Self {
        ConfigSource {
            kind: ConfigSourceKind::Default,
            path: None,
        }
    }

    fn for_file(kind: ConfigSourceKind, path: PathBuf) -> Self {
        ConfigSource {
            kind,
            path: Some(path),
        }
    }

    fn describe(&self) -> String {
        match (&self.kind, &self.path) {
            (ConfigSourceKind::Default, _) => "built-in defaults".to_owned(),
            (kind, Some(path)) => format!("{} at {}", kind, path.display()),
            (kind, None) => kind.to_string(),
        }
    }
}

/// Kinds of configuration sources, ordered from lowest to highest precedence.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConfigSourceKind {
    Default,
    GitRoot,
    Local,
    Override,
}

impl fmt::Display for ConfigSourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConfigSourceKind::Default => "defaults",
            ConfigSourceKind::GitRoot => "git-root config",
            ConfigSourceKind::Local => "local config",
            ConfigSourceKind::Override => "override config",
        };
        f.write_str(label)
    }
}

/// Loader options, typically supplied by the CLI layer.
#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub override_path: Option<PathBuf>,
    pub working_dir: Option<PathBuf>,
}

impl LoadOptions {
    pub fn with_override_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.override_path = Some(path.into());
        self
    }

    pub fn with_working_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(path.into());
        self
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to resolve working directory {attempted}: {source}")]
    WorkingDirectory {
        attempted: PathBuf,
        source: io::Error,
    },
    #[error("override config {path} not found")]
    OverrideNotFound { path: PathBuf },
    #[error("failed to read config {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("configuration validation failed:\n{0}")]
    Validation(ConfigValidationErrors),
}

impl Config {
    /// Loads configuration using the precedence rules and returns typed settings.
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let working_dir = match options.working_dir {
            Some(dir) => fs::canonicalize(&dir)
                .map_err(|source| ConfigError::WorkingDirectory { attempted: dir, source })?,
            None => env::current_dir().map_err(|source| ConfigError::WorkingDirectory {
                attempted: PathBuf::from("."),
                source,
            })?,
        };

        let mut merged = defaults_layer();
        for source in discover_layers(&working_dir, options.override_path)? {
            if let Some(path) = &source.path {
                merged.merge(load_layer(path, source.clone())?);
            }
        }

        let resolved = merged.finalize().map_err(ConfigError::Validation)?;
        Ok(Config {
            edit: resolved.edit,
            check: resolved.check,
            log: resolved.log,
        })
    }

    /// Re-grades findings the way `[check.severity]` asks.
    pub fn grade(&self, finding: Finding) -> Option<Severity> {
        self.check.severity_for(finding)
    }
}

// File layers in ascending precedence. A path is read once, at its highest
// precedence.
fn discover_layers(
    working_dir: &Path,
    override_path: Option<PathBuf>,
) -> Result<Vec<ConfigSource>, ConfigError> {
    let override_path = override_path.map(|path| working_dir.join(path));
    if let Some(path) = &override_path {
        if !path.exists() {
            return Err(ConfigError::OverrideNotFound { path: path.clone() });
        }
    }

    let git_root = working_dir
        .ancestors()
        .find(|dir| dir.join(".git").exists())
        .map(|root| root.join(CONFIG_FILE_NAME));
    let candidates = [
        (ConfigSourceKind::GitRoot, git_root),
        (ConfigSourceKind::Local, Some(working_dir.join(CONFIG_FILE_NAME))),
        (ConfigSourceKind::Override, override_path),
    ];

    let mut layers: Vec<ConfigSource> = Vec::new();
    for (kind, path) in candidates {
        let Some(path) = path else { continue };
        if kind != ConfigSourceKind::Override && !path.exists() {
            continue;
        }
        layers.retain(|layer| layer.path.as_ref() != Some(&path));
        layers.push(ConfigSource::for_file(kind, path));
    }
    Ok(layers)
}

fn load_layer(path: &Path, source: ConfigSource) -> Result<PartialConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|err| ConfigError::Io {
        path: path.into(),
        source: err,
    })?;
    let raw: RawConfig = toml::from_str(&contents).map_err(|err| ConfigError::Parse {
        path: path.into(),
        source: err,
    })?;
    Ok(raw.into_partial(source))
}

fn defaults_layer() -> PartialConfig {
    let source = ConfigSource::default();
    PartialConfig {
        backup: Some(Located::new(true, source.clone())),
        log_level: Some(Located::new("warn".to_string(), source)),
        severity: HashMap::new(),
    }
}

#[derive(Clone, Debug, Default)]
struct PartialConfig {
    backup: Option<Located<bool>>,
    log_level: Option<Located<String>>,
    severity: HashMap<String, Located<String>>,
}

impl PartialConfig {
    fn merge(&mut self, other: PartialConfig) {
        if other.backup.is_some() {
            self.backup = other.backup;
        }
        if other.log_level.is_some() {
            self.log_level = other.log_level;
        }
        self.severity.extend(other.severity);
    }

    fn finalize(self) -> Result<ResolvedConfig, ConfigValidationErrors> {
        let mut errors = Vec::new();

        let backup = self.backup.map_or(true, |located| located.value);

        let level = self
            .log_level
            .unwrap_or_else(|| Located::new("warn".to_string(), ConfigSource::default()));
        let normalized_level = level.value.trim().to_ascii_lowercase();
        if !LOG_LEVELS.contains(&normalized_level.as_str()) {
            errors.push(
                ConfigValidationError::new(
                    Some(level.source.clone()),
                    format!(
                        "unknown level '{}' (expected one of {})",
                        level.value,
                        LOG_LEVELS.join(", ")
                    ),
                )
                .with_context("log.level"),
            );
        }

        let severity = parse_severity_map(self.severity, &mut errors);

        if !errors.is_empty() {
            return Err(ConfigValidationErrors(errors));
        }

        Ok(ResolvedConfig {
            edit: EditSettings { backup },
            check: CheckSettings { severity },
            log: LogSettings {
                level: normalized_level,
            },
        })
    }
}

#[derive(Clone, Debug)]
struct Located<T> {
    value: T,
    source: ConfigSource,
}

impl<T> Located<T> {
    fn new(value: T, source: ConfigSource) -> Self {
        Located { value, source }
    }
}

fn parse_severity_map(
    raw: HashMap<String, Located<String>>,
    errors: &mut Vec<ConfigValidationError>,
) -> HashMap<Finding, Severity> {
    let mut result = HashMap::new();
    // Sorted so validation messages come out in a stable order.
    let mut entries: Vec<_> = raw.into_iter().collect();
    entries.sort_by(|(left, _), (right, _)| left.cmp(right));

    for (slug, located_value) in entries {
        let Ok(finding) = slug.parse::<Finding>() else {
            errors.push(
                ConfigValidationError::new(
                    Some(located_value.source.clone()),
                    format!("unknown finding '{slug}'"),
                )
                .with_context("check.severity"),
            );
            continue;
        };

        match located_value.value.parse::<Severity>() {
            Ok(level) => {
                result.insert(finding, level);
            }
            Err(_) => errors.push(
                ConfigValidationError::new(
                    Some(located_value.source.clone()),
                    format!(
                        "invalid severity '{}' for finding '{}' (expected error or info)",
                        located_value.value, finding
                    ),
                )
                .with_context("check.severity"),
            ),
        }
    }
    result
}

#[derive(Clone, Debug)]
struct ResolvedConfig {
    edit: EditSettings,
    check: CheckSettings,
    log: LogSettings,
}

/// Container for validation failures, formatted as a bullet list.
#[derive(Debug)]
pub struct ConfigValidationErrors(pub Vec<ConfigValidationError>);

impl fmt::Display for ConfigValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, err) in self.0.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "- {err}")?;
        }
        Ok(())
    }
}

impl ConfigValidationErrors {
    pub fn iter(&self) -> impl Iterator<Item = &ConfigValidationError> {
        self.0.iter()
    }
}

/// Validation failure with optional provenance.
#[derive(Clone, Debug)]
pub struct ConfigValidationError {
    pub source: Option<ConfigSource>,
    pub message: String,
    pub context: Option<String>,
}

impl ConfigValidationError {
    fn new(source: Option<ConfigSource>, message: String) -> Self {
        ConfigValidationError {
            source,
            message,
            context: None,
        }
    }

    fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

impl fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(context) = &self.context {
            write!(f, "{}: {}", context, self.message)?;
        } else {
            write!(f, "{}", self.message)?;
        }
        if let Some(source) = &self.source {
            write!(f, " ({})", source.describe())?;
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    edit: Option<RawEdit>,
    #[serde(default)]
    check: Option<RawCheck>,
    #[serde(default)]
    log: Option<RawLog>,
}

impl RawConfig {
    fn into_partial(self, source: ConfigSource) -> PartialConfig {
        let backup = self
            .edit
            .and_then(|edit| edit.backup)
            .map(|value| Located::new(value, source.clone()));
        let log_level = self
            .log
            .and_then(|log| log.level)
            .map(|value| Located::new(value, source.clone()));
        let severity = self
            .check
            .map(|check| check.severity)
            .unwrap_or_default()
            .into_iter()
            .map(|(slug, level)| (slug, Located::new(level, source.clone())))
            .collect();

        PartialConfig {
            backup,
            log_level,
            severity,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawEdit {
    #[serde(default)]
    backup: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawCheck {
    #[serde(default)]
    severity: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawLog {
    #[serde(default)]
    level: Option<String>,
}
