//! `finquery-io`: turns spreadsheet files into engine grids.
//!
//! Accepts workbooks (`.xlsx`, `.xlsm`, `.xls`, `.xlsb`, `.ods`), single
//! `.csv`/`.tsv` files, and directories of CSV/TSV files (one sheet per file,
//! in file-name order).

pub mod csv;
mod error;
pub mod xlsx;

use std::path::{Path, PathBuf};

use finquery_engine::grid::DEFAULT_PLACEHOLDERS;
use finquery_engine::RawGrid;
use log::{info, warn};

pub use error::LoadError;

/// Sheets read from a workbook unless told otherwise: the source data is two
/// simple sheets plus one sector sheet.
pub const DEFAULT_MAX_SHEETS: usize = 3;

const WORKBOOK_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xls", "xlsb", "ods"];

#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Read at most this many sheets (workbook order, or file-name order for a
    /// directory). Extra sheets are skipped with a warning.
    pub max_sheets: usize,
    /// Cell texts that mean "value not yet available".
    pub placeholders: Vec<String>,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            max_sheets: DEFAULT_MAX_SHEETS,
            placeholders: DEFAULT_PLACEHOLDERS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Per-sheet import statistics
#[derive(Debug, Default, Clone)]
pub struct SheetStats {
    pub name: String,
    pub cells_imported: usize,
    pub truncated: bool,
}

/// Result of an import operation
#[derive(Debug, Default)]
pub struct ImportResult {
    pub sheet_stats: Vec<SheetStats>,
    pub sheets_imported: usize,
    /// Names of sheets beyond the cap, in order.
    pub sheets_skipped: Vec<String>,
    pub cells_imported: usize,
    /// Actionable warnings (not boilerplate)
    pub warnings: Vec<String>,
}

impl ImportResult {
    /// Returns a summary message suitable for display
    pub fn summary(&self) -> String {
        let mut parts = vec![
            format!(
                "{} sheet{}",
                self.sheets_imported,
                if self.sheets_imported == 1 { "" } else { "s" }
            ),
            format!("{} cells", self.cells_imported),
        ];
        if !self.sheets_skipped.is_empty() {
            parts.push(format!("{} skipped", self.sheets_skipped.len()));
        }
        parts.join(" · ")
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty() || !self.sheets_skipped.is_empty()
    }
}

/// Load every sheet `path` holds, up to `options.max_sheets`.
pub fn import(path: &Path, options: &ImportOptions) -> Result<(Vec<RawGrid>, ImportResult), LoadError> {
    let loaded = if path.is_dir() {
        import_dir(path, options)?
    } else if csv::has_extension(path, "csv") || csv::has_extension(path, "tsv") {
        let grid = csv::import(path, &options.placeholders)?;
        let result = single_sheet_result(&grid);
        (vec![grid], result)
    } else if WORKBOOK_EXTENSIONS.iter().any(|ext| csv::has_extension(path, ext)) {
        xlsx::import(path, options)?
    } else if !path.exists() {
        return Err(LoadError::open(path, "no such file or directory"));
    } else {
        return Err(LoadError::UnsupportedFormat(path.to_path_buf()));
    };

    info!("{}: {}", path.display(), loaded.1.summary());
    Ok(loaded)
}

fn single_sheet_result(grid: &RawGrid) -> ImportResult {
    let cells = grid.rows().flatten().filter(|c| c.is_occupied()).count();
    ImportResult {
        sheet_stats: vec![SheetStats {
            name: grid.name.clone(),
            cells_imported: cells,
            truncated: false,
        }],
        sheets_imported: 1,
        cells_imported: cells,
        ..Default::default()
    }
}

fn import_dir(dir: &Path, options: &ImportOptions) -> Result<(Vec<RawGrid>, ImportResult), LoadError> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|e| LoadError::open(dir, e))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && (csv::has_extension(p, "csv") || csv::has_extension(p, "tsv")))
        .collect();
    files.sort();

    if files.is_empty() {
        return Err(LoadError::Empty(dir.to_path_buf()));
    }

    let mut result = ImportResult::default();
    if files.len() > options.max_sheets {
        let skipped: Vec<String> = files[options.max_sheets..]
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        warn!(
            "{}: reading the first {} of {} files, skipping {}",
            dir.display(),
            options.max_sheets,
            files.len(),
            skipped.join(", ")
        );
        result.sheets_skipped = skipped;
    }

    let mut grids = Vec::new();
    for file in files.iter().take(options.max_sheets) {
        let grid = csv::import(file, &options.placeholders)?;
        let single = single_sheet_result(&grid);
        result.sheets_imported += 1;
        result.cells_imported += single.cells_imported;
        result.sheet_stats.extend(single.sheet_stats);
        grids.push(grid);
    }
    Ok((grids, result))
}
