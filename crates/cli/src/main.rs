// fq - ask questions of financial spreadsheets from the command line

mod exit_codes;
mod render;

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{ArgAction, Parser, Subcommand};
use finquery_engine::{EngineConfig, QueryError, Session};
use finquery_io::{ImportOptions, DEFAULT_MAX_SHEETS};
use log::{debug, info};

use exit_codes::{
    load_exit_code, query_error_kind, query_exit_code, EXIT_ERROR, EXIT_NO_TABLES, EXIT_SUCCESS,
    EXIT_UNRECOGNIZED,
};

#[derive(Parser)]
#[command(name = "fq")]
#[command(about = "Query irregular financial spreadsheets")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Engine config (TOML). Defaults to <config dir>/finquery/config.toml when present
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// More log output on stderr (-v info, -vv debug). RUST_LOG overrides
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer one query against a workbook
    #[command(after_help = "\
Examples:
  fq query book.xlsx 'P/E for ALLI'
  fq query book.xlsx 'ALLI vs sector BANKS by Revenue 3M'
  fq query book.xlsx 'Show Div Yield where P/E between 5 and 10' --json
  fq query sheets/ 'Best sector by ROE'")]
    Query {
        /// Workbook, CSV/TSV file, or directory of CSV/TSV files
        file: PathBuf,

        /// The question
        text: String,

        /// Emit the result as one JSON value
        #[arg(long)]
        json: bool,

        /// Read at most N sheets
        #[arg(long, value_name = "N", default_value_t = DEFAULT_MAX_SHEETS)]
        sheets: usize,
    },

    /// Answer queries from stdin, one per line, until `exit` or EOF
    Repl {
        file: PathBuf,

        /// Emit each result as one JSON line
        #[arg(long)]
        json: bool,

        #[arg(long, value_name = "N", default_value_t = DEFAULT_MAX_SHEETS)]
        sheets: usize,
    },

    /// Show how each sheet's headers were understood
    Inspect {
        file: PathBuf,

        #[arg(long)]
        json: bool,

        #[arg(long, value_name = "N", default_value_t = DEFAULT_MAX_SHEETS)]
        sheets: usize,
    },

    /// List the metrics the catalog knows, with aliases
    Metrics {
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = load_config(cli.config.as_deref()).and_then(|config| match cli.command {
        Commands::Query {
            file,
            text,
            json,
            sheets,
        } => cmd_query(&config, &file, &text, json, sheets),
        Commands::Repl { file, json, sheets } => cmd_repl(&config, &file, json, sheets),
        Commands::Inspect { file, json, sheets } => cmd_inspect(&config, &file, json, sheets),
        Commands::Metrics { json } => cmd_metrics(&config, json),
    });

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError {
            code,
            message,
            hint,
        }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn new(code: u8, msg: impl Into<String>) -> Self {
        Self {
            code,
            message: msg.into(),
            hint: None,
        }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self::new(EXIT_ERROR, msg)
    }

    /// Error already reported on stdout; exit with `code` and print nothing more.
    pub fn silent(code: u8) -> Self {
        Self::new(code, "")
    }

    pub fn query(err: &QueryError) -> Self {
        let hint = match err {
            QueryError::AmbiguousEntity { .. } | QueryError::AmbiguousSector { .. } => {
                Some("use the exact stock code or full sector name".to_string())
            }
            QueryError::AmbiguousAlias { .. } => {
                Some("run `fq metrics` to see each metric's aliases".to_string())
            }
            _ => None,
        };
        Self {
            code: query_exit_code(err),
            message: err.to_string(),
            hint,
        }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

// ============================================================================
// config + loading
// ============================================================================

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("finquery").join("config.toml"))
}

fn load_config(explicit: Option<&Path>) -> Result<EngineConfig, CliError> {
    let path = match explicit {
        Some(p) => p.to_path_buf(),
        None => match default_config_path() {
            Some(p) if p.is_file() => p,
            _ => {
                debug!("no config file, using defaults");
                return Ok(EngineConfig::default());
            }
        },
    };

    let text = std::fs::read_to_string(&path)
        .map_err(|e| CliError::io(format!("cannot read config {}: {e}", path.display())))?;
    let config = EngineConfig::from_toml(&text).map_err(|e| {
        CliError::new(EXIT_ERROR, format!("{}: {e}", path.display()))
            .with_hint("every key is optional; remove the offending entry to use its default")
    })?;
    info!("config: {}", path.display());
    Ok(config)
}

fn open_session(config: &EngineConfig, file: &Path, sheets: usize) -> Result<Session, CliError> {
    let options = ImportOptions {
        max_sheets: sheets.max(1),
        placeholders: config.inference.placeholders.clone(),
    };
    let (grids, import) = finquery_io::import(file, &options)
        .map_err(|e| CliError::new(load_exit_code(&e), e.to_string()))?;
    for warning in &import.warnings {
        log::warn!("{warning}");
    }

    let session = Session::ingest(&grids, config)
        .map_err(|e| CliError::new(EXIT_ERROR, e.to_string()))?;
    Ok(session)
}

fn no_tables_error(session: &Session) -> CliError {
    let reasons: Vec<String> = session.schema_errors().iter().map(|e| e.to_string()).collect();
    CliError::new(
        EXIT_NO_TABLES,
        format!("no sheet has a recognizable header row: {}", reasons.join("; ")),
    )
    .with_hint("run `fq inspect` to see what each sheet looks like to the engine")
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), CliError> {
    let text = serde_json::to_string_pretty(value).map_err(|e| CliError::io(e.to_string()))?;
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    writeln!(handle, "{}", text).map_err(|e| CliError::io(e.to_string()))
}

#[derive(serde::Serialize)]
struct JsonError<'a> {
    error: &'a str,
    message: String,
    exit_code: u8,
}

// ============================================================================
// query
// ============================================================================

fn cmd_query(config: &EngineConfig, file: &Path, text: &str, json: bool, sheets: usize) -> Result<(), CliError> {
    let session = open_session(config, file, sheets)?;
    if session.is_unusable() {
        return Err(no_tables_error(&session));
    }

    let result = match session.handle_query(text) {
        Ok(result) => result,
        Err(err) => {
            if json {
                print_json(
                    &JsonError {
                        error: query_error_kind(&err),
                        message: err.to_string(),
                        exit_code: query_exit_code(&err),
                    }
                )?;
                return Err(CliError::silent(query_exit_code(&err)));
            }
            return Err(CliError::query(&err));
        }
    };

    if json {
        print_json(&result)?;
    } else {
        print!("{}", render::render_result(&result));
    }

    if result.is_unrecognized() {
        return Err(CliError::silent(EXIT_UNRECOGNIZED));
    }
    Ok(())
}

// ============================================================================
// repl
// ============================================================================

fn cmd_repl(config: &EngineConfig, file: &Path, json: bool, sheets: usize) -> Result<(), CliError> {
    let session = open_session(config, file, sheets)?;
    if session.is_unusable() {
        return Err(no_tables_error(&session));
    }

    let stdin = io::stdin();
    let mut out = io::stdout();
    for line in stdin.lock().lines() {
        let line = line.map_err(|e| CliError::io(e.to_string()))?;
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if matches!(text, "exit" | "quit") {
            break;
        }

        let rendered = match (session.handle_query(text), json) {
            (Ok(result), true) => serde_json::to_string(&result).map_err(|e| CliError::io(e.to_string()))?,
            (Ok(result), false) => render::render_result(&result).trim_end().to_string(),
            (Err(err), true) => serde_json::to_string(&JsonError {
                error: query_error_kind(&err),
                message: err.to_string(),
                exit_code: query_exit_code(&err),
            })
            .map_err(|e| CliError::io(e.to_string()))?,
            (Err(err), false) => format!("error: {err}"),
        };
        writeln!(out, "{rendered}").map_err(|e| CliError::io(e.to_string()))?;
        out.flush().map_err(|e| CliError::io(e.to_string()))?;
    }
    Ok(())
}

// ============================================================================
// inspect
// ============================================================================

fn cmd_inspect(config: &EngineConfig, file: &Path, json: bool, sheets: usize) -> Result<(), CliError> {
    let session = open_session(config, file, sheets)?;
    let report = render::inspect_report(&session);
    if json {
        print_json(&report)?;
    } else {
        print!("{}", render::render_inspect(&report));
    }
    if session.is_unusable() {
        return Err(CliError::silent(EXIT_NO_TABLES));
    }
    Ok(())
}

// ============================================================================
// metrics
// ============================================================================

fn cmd_metrics(config: &EngineConfig, json: bool) -> Result<(), CliError> {
    let catalog = config
        .build_catalog()
        .map_err(|e| CliError::new(EXIT_ERROR, e.to_string()))?;
    if json {
        let metrics: Vec<_> = catalog
            .definitions()
            .iter()
            .filter(|d| !d.is_identity())
            .collect();
        print_json(&metrics)
    } else {
        print!("{}", render::render_metrics(catalog.definitions()));
        Ok(())
    }
}
