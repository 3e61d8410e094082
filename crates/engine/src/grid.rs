//! Raw cell grids as handed over by the ingestion boundary.
//!
//! A `RawGrid` is one sheet, exactly as loaded: no header knowledge, no typing
//! beyond "text, number, blank, or placeholder". It is immutable once built.

use serde::Serialize;

/// Placeholder texts recognised when no configuration overrides them.
pub const DEFAULT_PLACEHOLDERS: &[&str] = &["Results Pending", "N/A", "n/a", "-", "--"];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Cell {
    Empty,
    /// Marker text such as "Results Pending". Never a value, never zero.
    Placeholder(String),
    Text(String),
    Number(f64),
}

impl Default for Cell {
    fn default() -> Self {
        Cell::Empty
    }
}

impl Cell {
    /// Classify raw input text using the default placeholder list.
    pub fn from_input(input: &str) -> Self {
        Self::from_input_with(input, DEFAULT_PLACEHOLDERS)
    }

    pub fn from_input_with<S: AsRef<str>>(input: &str, placeholders: &[S]) -> Self {
        let trimmed = input.trim();

        if trimmed.is_empty() {
            return Cell::Empty;
        }

        if placeholders
            .iter()
            .any(|p| p.as_ref().trim().eq_ignore_ascii_case(trimmed))
        {
            return Cell::Placeholder(trimmed.to_string());
        }

        if let Some(n) = parse_financial_number(trimmed) {
            return Cell::Number(n);
        }

        Cell::Text(trimmed.to_string())
    }

    /// True for anything other than a truly blank cell. Placeholders count:
    /// they mark a slot that belongs to a real record.
    pub fn is_occupied(&self) -> bool {
        !matches!(self, Cell::Empty)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Display text for labels: text as-is, numbers without a trailing `.0`.
    pub fn label(&self) -> Option<String> {
        match self {
            Cell::Empty | Cell::Placeholder(_) => None,
            Cell::Text(s) => Some(s.clone()),
            Cell::Number(n) => Some(if n.fract() == 0.0 && n.abs() < 1e15 {
                format!("{}", *n as i64)
            } else {
                format!("{n}")
            }),
        }
    }
}

/// Parse a financial number string:
/// - Strip `$`, commas, whitespace, and one trailing `%`
/// - Handle `(123.45)` → `-123.45`
/// - Returns None if non-numeric characters remain after stripping
pub fn parse_financial_number(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    let trimmed = trimmed.strip_suffix('%').unwrap_or(trimmed).trim_end();
    if trimmed.is_empty() {
        return None;
    }

    let (is_negative, inner) = if trimmed.starts_with('(') && trimmed.ends_with(')') {
        (true, &trimmed[1..trimmed.len() - 1])
    } else {
        (false, trimmed)
    };

    let cleaned: String = inner
        .chars()
        .filter(|c| *c != '$' && *c != ',' && !c.is_whitespace())
        .collect();

    if cleaned.is_empty() || cleaned == "." {
        return None;
    }

    let mut digits = 0;
    for (i, c) in cleaned.chars().enumerate() {
        match c {
            '0'..='9' => digits += 1,
            '.' => {}
            '-' | '+' if i == 0 && !is_negative => {}
            _ => return None,
        }
    }
    if digits == 0 {
        return None;
    }

    let value: f64 = cleaned.parse().ok()?;
    Some(if is_negative { -value } else { value })
}

/// One sheet's cells, padded to a rectangle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawGrid {
    pub name: String,
    rows: Vec<Vec<Cell>>,
    width: usize,
}

impl RawGrid {
    pub fn new(name: impl Into<String>, mut rows: Vec<Vec<Cell>>) -> Self {
        let width = rows.iter().map(|r| r.len()).max().unwrap_or(0);
        for row in &mut rows {
            row.resize(width, Cell::Empty);
        }
        Self {
            name: name.into(),
            rows,
            width,
        }
    }

    /// Build from raw strings, classifying each with `Cell::from_input_with`.
    pub fn from_strings<S: AsRef<str>, P: AsRef<str>>(
        name: impl Into<String>,
        rows: &[Vec<S>],
        placeholders: &[P],
    ) -> Self {
        let cells = rows
            .iter()
            .map(|r| {
                r.iter()
                    .map(|s| Cell::from_input_with(s.as_ref(), placeholders))
                    .collect()
            })
            .collect();
        Self::new(name, cells)
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() || self.width == 0
    }

    pub fn row(&self, r: usize) -> Option<&[Cell]> {
        self.rows.get(r).map(|v| v.as_slice())
    }

    pub fn cell(&self, r: usize, c: usize) -> &Cell {
        static EMPTY: Cell = Cell::Empty;
        self.rows.get(r).and_then(|row| row.get(c)).unwrap_or(&EMPTY)
    }

    pub fn rows(&self) -> impl Iterator<Item = &[Cell]> {
        self.rows.iter().map(|v| v.as_slice())
    }
}
