// Workbook import (xlsx, xls, xlsb, ods) through calamine
//
// Import is one-way: each worksheet's cached values become a RawGrid. Formulas
// are not evaluated; the value Excel last stored is what the engine sees.

use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader, Sheets};
use finquery_engine::{Cell, RawGrid};
use log::{debug, warn};

use crate::error::LoadError;
use crate::{ImportOptions, ImportResult, SheetStats};

/// Maximum dimensions for a sheet
const MAX_ROWS: usize = 65536;
const MAX_COLS: usize = 256;

pub fn import(path: &Path, options: &ImportOptions) -> Result<(Vec<RawGrid>, ImportResult), LoadError> {
    let mut workbook: Sheets<_> = open_workbook_auto(path).map_err(|e| LoadError::open(path, e))?;

    let sheet_names: Vec<String> = workbook.sheet_names().to_vec();
    if sheet_names.is_empty() {
        return Err(LoadError::Empty(path.to_path_buf()));
    }

    let mut result = ImportResult::default();
    let mut grids = Vec::new();

    if sheet_names.len() > options.max_sheets {
        let skipped = &sheet_names[options.max_sheets..];
        warn!(
            "{}: reading the first {} of {} sheets, skipping {}",
            path.display(),
            options.max_sheets,
            sheet_names.len(),
            skipped.join(", ")
        );
        result.sheets_skipped = skipped.to_vec();
    }

    for sheet_name in sheet_names.iter().take(options.max_sheets) {
        let range = workbook
            .worksheet_range(sheet_name)
            .map_err(|e| LoadError::read(path, format!("sheet '{sheet_name}': {e}")))?;

        let (height, width) = range.get_size();
        let mut stats = SheetStats {
            name: sheet_name.clone(),
            ..Default::default()
        };

        // Range start offset (data may not begin at A1)
        let (start_row, start_col) = range
            .start()
            .map(|(r, c)| (r as usize, c as usize))
            .unwrap_or((0, 0));

        let effective_rows = (start_row + height).min(MAX_ROWS);
        let effective_cols = (start_col + width).min(MAX_COLS);
        if start_row + height > MAX_ROWS || start_col + width > MAX_COLS {
            stats.truncated = true;
            result.warnings.push(format!(
                "Sheet '{}' truncated from {}x{} to {}x{}",
                sheet_name,
                start_row + height,
                start_col + width,
                effective_rows,
                effective_cols
            ));
        }

        let mut rows: Vec<Vec<Cell>> = vec![vec![Cell::Empty; effective_cols]; effective_rows];
        for (row_idx, row) in range.rows().enumerate() {
            let target_row = start_row + row_idx;
            if target_row >= effective_rows {
                break;
            }
            for (col_idx, data) in row.iter().enumerate() {
                let target_col = start_col + col_idx;
                if target_col >= effective_cols {
                    break;
                }
                let cell = to_cell(data, &options.placeholders);
                if cell.is_occupied() {
                    stats.cells_imported += 1;
                }
                rows[target_row][target_col] = cell;
            }
        }

        debug!(
            "{}: sheet '{}' {}x{}, {} cells",
            path.display(),
            sheet_name,
            effective_rows,
            effective_cols,
            stats.cells_imported
        );
        result.cells_imported += stats.cells_imported;
        result.sheets_imported += 1;
        result.sheet_stats.push(stats);
        grids.push(RawGrid::new(sheet_name.clone(), rows));
    }

    Ok((grids, result))
}

fn to_cell(data: &Data, placeholders: &[String]) -> Cell {
    match data {
        Data::Empty => Cell::Empty,
        Data::String(s) => Cell::from_input_with(s, placeholders),
        Data::Float(n) => Cell::Number(*n),
        Data::Int(n) => Cell::Number(*n as f64),
        Data::Bool(b) => Cell::Text(if *b { "TRUE" } else { "FALSE" }.to_string()),
        // Store error as text representation
        Data::Error(e) => Cell::Text(format!("#{e:?}")),
        // Dates appear as sub-header periods; keep them readable
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(when) => Cell::Text(when.format("%Y-%m-%d").to_string()),
            None => Cell::Number(dt.as_f64()),
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::from_input_with(s, placeholders),
    }
}
