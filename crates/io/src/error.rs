use std::fmt;
use std::path::{Path, PathBuf};

/// Failure to turn a file into grids. Per-sheet header problems are not load
/// errors; they surface later as `SchemaError`s.
#[derive(Debug)]
pub enum LoadError {
    /// The path could not be opened or is not a workbook the reader accepts.
    Open { path: PathBuf, message: String },
    /// A sheet or record could not be read.
    Read { path: PathBuf, message: String },
    /// Nothing to load: no sheets, or a directory without CSV/TSV files.
    Empty(PathBuf),
    UnsupportedFormat(PathBuf),
}

impl LoadError {
    pub(crate) fn open(path: &Path, err: impl fmt::Display) -> Self {
        LoadError::Open {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }

    pub(crate) fn read(path: &Path, err: impl fmt::Display) -> Self {
        LoadError::Read {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::Open { path, message } => {
                write!(f, "cannot open {}: {message}", path.display())
            }
            LoadError::Read { path, message } => {
                write!(f, "cannot read {}: {message}", path.display())
            }
            LoadError::Empty(path) => write!(f, "{} contains no sheets", path.display()),
            LoadError::UnsupportedFormat(path) => write!(
                f,
                "unsupported file type: {} (expected .xlsx, .xls, .xlsb, .ods, .csv, .tsv or a directory)",
                path.display()
            ),
        }
    }
}

impl std::error::Error for LoadError {}
