//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract; scripts rely on them.
//!
//! | Code | Meaning                                                     |
//! |------|-------------------------------------------------------------|
//! | 0    | Success, including answers with missing values              |
//! | 1    | General error (config file, output failure)                 |
//! | 2    | CLI usage error (bad args)                                  |
//! | 3    | No sheet produced a usable table                            |
//! | 4    | Ambiguous company, sector, or metric term                   |
//! | 5    | Invalid query input: inverted range, repeated target, k = 0 |
//! | 6    | Query not recognized; route it to a fallback                |
//! | 7    | Input file unreadable                                       |

use finquery_engine::QueryError;
use finquery_io::LoadError;

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
/// Avoid using this; prefer a specific error code.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, missing required options.
pub const EXIT_USAGE: u8 = 2;

/// Every sheet failed header inference.
pub const EXIT_NO_TABLES: u8 = 3;

/// A term matched more than one company, sector, or metric.
pub const EXIT_AMBIGUOUS: u8 = 4;

/// Range with low > high, a target named twice, or a zero count.
pub const EXIT_INVALID_INPUT: u8 = 5;

/// No query shape fits the text. Not a failure of the tool.
pub const EXIT_UNRECOGNIZED: u8 = 6;

/// The input file could not be opened or read.
pub const EXIT_INPUT_UNREADABLE: u8 = 7;

pub fn query_exit_code(err: &QueryError) -> u8 {
    match err {
        QueryError::AmbiguousEntity { .. }
        | QueryError::AmbiguousSector { .. }
        | QueryError::AmbiguousAlias { .. } => EXIT_AMBIGUOUS,
        QueryError::InvalidRange { .. }
        | QueryError::DuplicateTarget(_)
        | QueryError::InvalidCount(_) => EXIT_INVALID_INPUT,
        QueryError::NoTables => EXIT_NO_TABLES,
    }
}

pub fn load_exit_code(err: &LoadError) -> u8 {
    match err {
        LoadError::UnsupportedFormat(_) => EXIT_USAGE,
        LoadError::Open { .. } | LoadError::Read { .. } | LoadError::Empty(_) => {
            EXIT_INPUT_UNREADABLE
        }
    }
}

/// Stable machine name for an error, used in `--json` error output.
pub fn query_error_kind(err: &QueryError) -> &'static str {
    match err {
        QueryError::AmbiguousEntity { .. } => "ambiguous_entity",
        QueryError::AmbiguousSector { .. } => "ambiguous_sector",
        QueryError::AmbiguousAlias { .. } => "ambiguous_alias",
        QueryError::InvalidRange { .. } => "invalid_range",
        QueryError::DuplicateTarget(_) => "duplicate_target",
        QueryError::InvalidCount(_) => "invalid_count",
        QueryError::NoTables => "no_tables",
    }
}
