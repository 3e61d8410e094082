// CSV/TSV import: one file becomes one grid

use std::io::Read;
use std::path::Path;

use finquery_engine::RawGrid;

use crate::error::LoadError;

/// Read one delimited file. The delimiter is sniffed unless the extension is
/// `.tsv`. The grid is named after the file stem.
pub fn import<P: AsRef<str>>(path: &Path, placeholders: &[P]) -> Result<RawGrid, LoadError> {
    let content = read_file_as_utf8(path)?;
    let delimiter = if has_extension(path, "tsv") {
        b'\t'
    } else {
        sniff_delimiter(&content)
    };
    let rows = parse_rows(&content, delimiter).map_err(|e| LoadError::read(path, e))?;
    Ok(RawGrid::from_strings(sheet_name(path), &rows, placeholders))
}

pub(crate) fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

fn sheet_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "Sheet1".to_string())
}

/// Detect the most likely field delimiter by checking consistency across the first few lines.
///
/// For each candidate (tab, semicolon, comma, pipe), count fields per line. The delimiter
/// that produces the most consistent field count (>1 field) wins.
pub(crate) fn sniff_delimiter(content: &str) -> u8 {
    let candidates: &[u8] = &[b'\t', b';', b',', b'|'];
    let sample_lines: Vec<&str> = content.lines().take(10).collect();

    if sample_lines.is_empty() {
        return b',';
    }

    let mut best = b',';
    let mut best_score = 0u64;

    for &delim in candidates {
        let counts: Vec<usize> = sample_lines
            .iter()
            .map(|line| {
                csv::ReaderBuilder::new()
                    .delimiter(delim)
                    .has_headers(false)
                    .flexible(true)
                    .from_reader(line.as_bytes())
                    .records()
                    .next()
                    .and_then(|r| r.ok())
                    .map(|r| r.len())
                    .unwrap_or(1)
            })
            .collect();

        // Must produce >1 field on the first line to be viable
        if counts.first().copied().unwrap_or(0) <= 1 {
            continue;
        }

        // Title rows ("Sector Performance Report,,,") share the field count of
        // the table below, so consistency still favours the real delimiter
        let target = counts[0];
        let consistent = counts.iter().filter(|&&c| c == target).count() as u64;
        let score = consistent * target as u64;

        if score > best_score {
            best_score = score;
            best = delim;
        }
    }

    best
}

/// Read file and convert to UTF-8 if needed (handles Windows-1252, Latin-1, etc.)
pub fn read_file_as_utf8(path: &Path) -> Result<String, LoadError> {
    let mut file = std::fs::File::open(path).map_err(|e| LoadError::open(path, e))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)
        .map_err(|e| LoadError::read(path, e))?;

    // Try UTF-8 first; on failure, recover the buffer from the error
    match String::from_utf8(bytes) {
        Ok(s) => Ok(s),
        Err(e) => {
            let bytes = e.into_bytes();
            // Fall back to Windows-1252 (common for Excel-exported CSVs)
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(&bytes);
            Ok(decoded.into_owned())
        }
    }
}

fn parse_rows(content: &str, delimiter: u8) -> Result<Vec<Vec<String>>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    reader
        .records()
        .map(|record| Ok(record?.iter().map(str::to_string).collect()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use finquery_engine::grid::DEFAULT_PLACEHOLDERS;
    use finquery_engine::Cell;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_sniff_semicolon_delimiter() {
        let content = "Code;P/E;ROE\nCOMB;5,2;16,5\nHNB;7,0;18,1\n";
        assert_eq!(sniff_delimiter(content), b';');
    }

    #[test]
    fn test_sniff_comma_delimiter() {
        let content = "Code,P/E,ROE\nCOMB,5.2,16.5\nHNB,7.0,18.1\n";
        assert_eq!(sniff_delimiter(content), b',');
    }

    #[test]
    fn test_sniff_tab_delimiter() {
        let content = "Code\tP/E\tROE\nCOMB\t5.2\t16.5\n";
        assert_eq!(sniff_delimiter(content), b'\t');
    }

    #[test]
    fn test_sniff_pipe_delimiter() {
        let content = "Code|P/E|ROE\nCOMB|5.2|16.5\n";
        assert_eq!(sniff_delimiter(content), b'|');
    }

    #[test]
    fn test_sniff_semicolon_with_commas_in_values() {
        // Thousands separators inside quoted fields must not win
        let content = "Code;Market Cap;Company\nCOMB;\"158,000\";\"Commercial Bank, PLC\"\nHNB;\"120,000\";Hatton\n";
        assert_eq!(sniff_delimiter(content), b';');
    }

    #[test]
    fn test_semicolon_csv_import() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Market.csv");
        fs::write(&path, "Code;C.Price\nCOMB;120.50\nHNB;Results Pending\n").unwrap();

        let grid = import(&path, DEFAULT_PLACEHOLDERS).unwrap();
        assert_eq!(grid.name, "Market");
        assert_eq!(grid.height(), 3);
        assert_eq!(grid.cell(0, 1), &Cell::Text("C.Price".into()));
        assert_eq!(grid.cell(1, 1), &Cell::Number(120.5));
        assert_eq!(grid.cell(2, 1), &Cell::Placeholder("Results Pending".into()));
    }

    #[test]
    fn test_tsv_extension_forces_tab() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("prices.tsv");
        // a comma inside a field would fool the sniffer on a one-column file
        fs::write(&path, "Company\nCommercial Bank, PLC\n").unwrap();

        let grid = import(&path, DEFAULT_PLACEHOLDERS).unwrap();
        assert_eq!(grid.width(), 1);
        assert_eq!(grid.cell(1, 0), &Cell::Text("Commercial Bank, PLC".into()));
    }

    #[test]
    fn test_windows_1252_fallback() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("latin.csv");
        // "Caf\xe9" is not valid UTF-8
        fs::write(&path, b"Code,Company\nCAFE,Caf\xe9 Holdings\n").unwrap();

        let grid = import(&path, DEFAULT_PLACEHOLDERS).unwrap();
        assert_eq!(grid.cell(1, 1), &Cell::Text("Café Holdings".into()));
    }

    #[test]
    fn test_missing_file_is_open_error() {
        let dir = tempdir().unwrap();
        let err = import(&dir.path().join("absent.csv"), DEFAULT_PLACEHOLDERS).unwrap_err();
        assert!(matches!(err, LoadError::Open { .. }));
    }
}
