use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use serde_json::json;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use wgconf_config::{Config, LoadOptions};
use wgconf_edit_core::{
    add_value, check_file, fill_keys, load_structure, AddRequest, CheckReport, EditError,
    EditOptions, EditOutcome, ExitCode, KeyPair, LocatedFinding, Severity, ValueSource,
};
use wgconf_syntax::StructuralDocument;

/// Entry point for CLI execution. Returns the desired exit code.
pub fn run() -> Result<i32> {
    let cli = Cli::parse();

    let mut options = LoadOptions::default();
    if let Some(path) = cli.config.clone() {
        options = options.with_override_path(path);
    }
    let config = match Config::load(options) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("wgconf: {err}");
            return Ok(ExitCode::InvalidArguments as i32);
        }
    };

    init_logging(cli.verbose, &config.log.level);
    debug!(level = %config.log.level, backup = config.edit.backup, "loaded configuration");

    match cli.command {
        Command::Check(args) => handle_check(&config, args),
        Command::Add(args) => handle_add(&config, args),
        Command::FillKeys(args) => handle_fill_keys(&config, args),
        Command::Show(args) => handle_show(args),
        Command::Genkey => handle_genkey(),
        Command::Pubkey => handle_pubkey(),
    }
}

// RUST_LOG wins; otherwise the more verbose of -v and the configured level.
fn init_logging(verbose: u8, configured: &str) {
    let fallback = effective_level(verbose, configured);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

const LEVELS: [&str; 6] = ["off", "error", "warn", "info", "debug", "trace"];

fn effective_level(verbose: u8, configured: &str) -> &str {
    let requested = match verbose {
        0 => return configured,
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let rank = |level: &str| LEVELS.iter().position(|known| *known == level);
    match (rank(configured), rank(requested)) {
        (Some(have), Some(want)) if have >= want => configured,
        _ => requested,
    }
}

fn handle_check(config: &Config, args: CheckArgs) -> Result<i32> {
    let CheckArgs { files, format } = args;

    let mut reports = Vec::new();
    for path in &files {
        match check_file(path) {
            Ok(report) => {
                let result = report.result.regraded(|finding| config.grade(finding));
                reports.push(CheckReport { result, ..report });
            }
            Err(err) => return Ok(report_error(path, &err)),
        }
    }

    match format.unwrap_or(CheckFormatValue::Plain) {
        CheckFormatValue::Plain => {
            for report in &reports {
                for found in report.located() {
                    if found.severity == Severity::Error {
                        println!("{}", describe(&report.path, &found));
                    }
                }
            }
        }
        CheckFormatValue::Json => {
            let payload = json!({
                "files": reports.iter().map(|report| {
                    json!({
                        "path": report.path,
                        "has_errors": report.result.has_errors(),
                        "derived_public_key": report.result.derived_public_key(),
                        "findings": report.located().iter().map(|found| {
                            json!({
                                "line": found.line,
                                "column": found.column,
                                "offset": found.span.start,
                                "length": found.span.len,
                                "severity": found.severity.as_str(),
                                "finding": found.finding.as_str(),
                                "message": found.finding.message(),
                            })
                        }).collect::<Vec<_>>(),
                    })
                }).collect::<Vec<_>>()
            });
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
    }

    let failed = reports
        .iter()
        .any(|report| report.exit_code() != ExitCode::Success);
    Ok(if failed {
        ExitCode::Validation as i32
    } else {
        ExitCode::Success as i32
    })
}

fn describe(path: &Path, found: &LocatedFinding) -> String {
    format!(
        "{}:{}:{}: {}: {}",
        path.display(),
        found.line,
        found.column,
        found.finding,
        found.finding.message()
    )
}

fn handle_add(config: &Config, args: AddArgs) -> Result<i32> {
    let value = match (args.value, args.value_file) {
        (Some(_), Some(_)) => {
            eprintln!("VALUE and --value-file cannot be used together");
            return Ok(ExitCode::InvalidArguments as i32);
        }
        (Some(value), None) => ValueSource::Inline(value),
        (None, Some(path)) if path == Path::new("-") => ValueSource::Stdin,
        (None, Some(path)) => ValueSource::File(path),
        (None, None) => {
            eprintln!("'add' requires VALUE or --value-file");
            return Ok(ExitCode::InvalidArguments as i32);
        }
    };

    let request = AddRequest {
        path: args.file.clone(),
        key: args.key,
        value,
        options: edit_options(config, &args.edit),
    };

    match add_value(request) {
        Ok(outcome) => {
            report_edit(&args.file, &args.edit, &outcome, true);
            for annotation in outcome.introduced_errors() {
                if let Some(finding) = annotation.note {
                    eprintln!(
                        "warning: {} now has {}: '{}'",
                        args.file.display(),
                        finding,
                        annotation.span.slice(&outcome.result)
                    );
                }
            }
            Ok(ExitCode::Success as i32)
        }
        Err(err) => Ok(report_error(&args.file, &err)),
    }
}

fn handle_fill_keys(config: &Config, args: FillKeysArgs) -> Result<i32> {
    let options = edit_options(config, &args.edit);
    match fill_keys(&args.file, &options) {
        Ok(outcome) => {
            // The diff would echo the new private key, so it is never printed.
            report_edit(&args.file, &args.edit, &outcome, false);
            if let Some(public_key) = outcome.scan.derived_public_key() {
                println!("PublicKey = {public_key}");
            }
            Ok(ExitCode::Success as i32)
        }
        Err(err) => Ok(report_error(&args.file, &err)),
    }
}

fn edit_options(config: &Config, args: &EditArgs) -> EditOptions {
    let backup = match (args.backup, args.no_backup) {
        (_, true) => false,
        (true, false) => true,
        (false, false) => config.edit.backup,
    };
    EditOptions {
        dry_run: args.dry_run,
        backup,
    }
}

fn report_edit(path: &Path, args: &EditArgs, outcome: &EditOutcome, show_diff: bool) {
    if args.quiet {
        return;
    }

    if show_diff {
        if let Some(diff) = &outcome.diff {
            print!("{}", diff.text);
            io::stdout().flush().ok();
        }
    }

    match (outcome.changed, args.dry_run) {
        (true, true) => println!("Would update {} (dry run)", path.display()),
        (true, false) => println!("Updated {}", path.display()),
        (false, _) => println!("No changes for {}", path.display()),
    }
}

fn report_error(path: &Path, err: &EditError) -> i32 {
    match err {
        EditError::Io(io_err) => eprintln!("I/O error on {}: {io_err}", path.display()),
        EditError::NotFound(message)
        | EditError::InvalidArguments(message)
        | EditError::InvalidContent(message)
        | EditError::Validation(message) => eprintln!("{message}"),
        EditError::MalformedKey(key_err) => eprintln!("malformed key: {key_err}"),
    }
    err.exit_code() as i32
}

fn handle_show(args: ShowArgs) -> Result<i32> {
    let document = match load_structure(&args.file, args.section.as_deref()) {
        Ok(document) => document,
        Err(err) => return Ok(report_error(&args.file, &err)),
    };

    let sections: Vec<_> = document
        .iter()
        .filter(|(name, _)| args.section.as_deref().map_or(true, |wanted| wanted == *name))
        .collect();

    if args.json {
        let payload = json!({
            "sections": sections.iter().map(|(name, section)| {
                json!({
                    "name": name,
                    "entries": section.iter().map(|(key, values)| {
                        json!({ "key": key, "values": values })
                    }).collect::<Vec<_>>(),
                })
            }).collect::<Vec<_>>()
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        emit(&render_sections(&document, &sections))?;
    }

    Ok(ExitCode::Success as i32)
}

fn render_sections(
    document: &StructuralDocument,
    sections: &[(&str, &wgconf_syntax::Section)],
) -> String {
    if document.is_empty() {
        return "(no sections)".to_string();
    }

    let mut output = String::new();
    for (idx, (name, section)) in sections.iter().enumerate() {
        if idx > 0 {
            output.push('\n');
        }
        output.push_str(&format!("[{name}]\n"));
        for (key, value) in section.flattened() {
            output.push_str(&format!("{key} = {value}\n"));
        }
    }
    output
}

fn handle_genkey() -> Result<i32> {
    let pair = KeyPair::generate();
    println!("PrivateKey = {}", pair.private_base64());
    println!("PublicKey = {}", pair.public_base64());
    Ok(ExitCode::Success as i32)
}

fn handle_pubkey() -> Result<i32> {
    let mut input = String::new();
    io::stdin().read_to_string(&mut input)?;

    match KeyPair::from_base64(&input) {
        Ok(pair) => {
            println!("{}", pair.public_base64());
            Ok(ExitCode::Success as i32)
        }
        Err(err) => {
            let err = EditError::from(err);
            eprintln!("{err}");
            Ok(err.exit_code() as i32)
        }
    }
}

fn emit(content: &str) -> Result<()> {
    print!("{}", content);
    if !content.ends_with('\n') {
        println!();
    }
    Ok(())
}

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Check and edit WireGuard-style tunnel configuration files",
    propagate_version = true
)]
struct Cli {
    /// Configuration file that overrides every discovered .wgconf.toml
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Raise log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate files and report findings
    Check(CheckArgs),
    /// Add a value to a key, creating the key when absent
    Add(AddArgs),
    /// Generate a private key for an empty PrivateKey entry
    FillKeys(FillKeysArgs),
    /// Print the sections and values of a file
    Show(ShowArgs),
    /// Generate a new key pair
    Genkey,
    /// Read a private key from stdin and print its public key
    Pubkey,
}

#[derive(Args)]
struct CheckArgs {
    /// Configuration files to check
    #[arg(value_name = "FILE", required = true)]
    files: Vec<PathBuf>,
    /// Select output format
    #[arg(long, value_enum)]
    format: Option<CheckFormatValue>,
}

#[derive(Args)]
struct EditArgs {
    /// Print what would change without writing
    #[arg(long = "dry-run")]
    dry_run: bool,
    /// Force creation of a .bak backup
    #[arg(long = "backup")]
    backup: bool,
    /// Disable backup creation
    #[arg(long = "no-backup", conflicts_with = "backup")]
    no_backup: bool,
    /// Suppress informational output
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,
}

#[derive(Args)]
struct AddArgs {
    #[arg(value_name = "FILE")]
    file: PathBuf,
    /// Key to add to, e.g. AllowedApps
    #[arg(value_name = "KEY")]
    key: String,
    /// Value to add
    #[arg(value_name = "VALUE")]
    value: Option<String>,
    /// Read the value from a file (use '-' for stdin)
    #[arg(long = "value-file", value_name = "PATH", allow_hyphen_values = true)]
    value_file: Option<PathBuf>,
    #[command(flatten)]
    edit: EditArgs,
}

#[derive(Args)]
struct FillKeysArgs {
    #[arg(value_name = "FILE")]
    file: PathBuf,
    #[command(flatten)]
    edit: EditArgs,
}

#[derive(Args)]
struct ShowArgs {
    #[arg(value_name = "FILE")]
    file: PathBuf,
    /// Only print this section
    #[arg(long, value_name = "NAME")]
    section: Option<String>,
    /// Emit JSON instead of text
    #[arg(long)]
    json: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum CheckFormatValue {
    Plain,
    Json,
}
