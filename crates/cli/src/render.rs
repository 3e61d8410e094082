// Plain-text rendering of query results, sheet inspection, and the catalog.
// JSON output never goes through here; it serializes the engine types directly.

use std::fmt::Write;

use finquery_engine::catalog::MetricDefinition;
use finquery_engine::intent::{EntityClass, RankOrder};
use finquery_engine::result::{MetricLabel, RankEntry, Source, TableRow};
use finquery_engine::table::{Binding, Table};
use finquery_engine::{Datum, QueryResult, Reading, SchemaError, Session};
use serde::Serialize;

/// Integers print without decimals; everything else with two.
pub fn format_number(n: f64) -> String {
    let raw = if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{:.2}", n)
    };
    group_thousands(&raw)
}

fn group_thousands(raw: &str) -> String {
    let (sign, rest) = raw.strip_prefix('-').map_or(("", raw), |r| ("-", r));
    let (int, frac) = rest.split_once('.').map_or((rest, None), |(i, f)| (i, Some(f)));
    let mut grouped = String::new();
    for (i, ch) in int.chars().enumerate() {
        if i > 0 && (int.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    match frac {
        Some(f) => format!("{sign}{grouped}.{f}"),
        None => format!("{sign}{grouped}"),
    }
}

fn with_unit(value: String, metric: &MetricLabel) -> String {
    match metric.unit.as_deref() {
        Some("%") => format!("{value}%"),
        Some(unit) => format!("{value} {unit}"),
        None => value,
    }
}

fn format_reading(reading: &Reading, metric: &MetricLabel) -> String {
    let mut out = match &reading.value {
        Datum::Number(n) => with_unit(format_number(*n), metric),
        Datum::Text(s) => s.clone(),
        Datum::Missing(reason) => format!("n/a ({reason})"),
    };
    if reading.implausible {
        out.push_str(" [outside expected range]");
    }
    out
}

fn format_source(source: &Source) -> String {
    match source {
        Source::Cell { sheet, row, column } => format!("{sheet} row {row}, {column}"),
        Source::CategoryRow { sheet, row } => format!("{sheet} row {row}, sector row"),
        Source::Computed { sheet, members } => {
            format!("{sheet}, mean of {members} compan{}", if *members == 1 { "y" } else { "ies" })
        }
    }
}

fn subject(label: &str, name: Option<&str>) -> String {
    match name {
        Some(name) => format!("{label} ({name})"),
        None => label.to_string(),
    }
}

fn class_word(class: EntityClass, plural: bool) -> &'static str {
    match (class, plural) {
        (EntityClass::Stock, false) => "company",
        (EntityClass::Stock, true) => "companies",
        (EntityClass::Sector, false) => "sector",
        (EntityClass::Sector, true) => "sectors",
    }
}

pub fn render_result(result: &QueryResult) -> String {
    let mut out = String::new();
    match result {
        QueryResult::Scalar {
            subject: who,
            metric,
            reading,
        } => {
            let _ = write!(out, "{} for {}: {}", metric.name, who, format_reading(reading, metric));
            if let Some(source) = &reading.source {
                let _ = write!(out, "  [{}]", format_source(source));
            }
            out.push('\n');
        }
        QueryResult::Table {
            title,
            columns,
            rows,
        } => {
            let _ = writeln!(out, "{title}");
            out.push_str(&render_grid(columns, rows));
            if rows.is_empty() {
                out.push_str("(no rows)\n");
            }
        }
        QueryResult::Ranking {
            metric,
            class,
            order,
            tie_break,
            entries,
            excluded,
        } => {
            let direction = match order {
                RankOrder::Descending => "highest",
                RankOrder::Ascending => "lowest",
            };
            let _ = writeln!(
                out,
                "{} by {} ({} first; ties by {})",
                class_word(*class, true),
                metric.name,
                direction,
                tie_break
            );
            render_entries(&mut out, entries, metric);
            if entries.is_empty() {
                out.push_str("(nothing to rank)\n");
            }
            if *excluded > 0 {
                let _ = writeln!(
                    out,
                    "{} {} without a value excluded",
                    excluded,
                    class_word(*class, *excluded != 1)
                );
            }
        }
        QueryResult::CompositeRanking {
            components,
            sheet,
            tie_break,
            entries,
            excluded,
        } => {
            let formula: Vec<String> = components
                .iter()
                .map(|c| format!("{:+} x {}", c.weight, c.metric.name))
                .collect();
            let _ = writeln!(
                out,
                "companies by score {} ({}; highest first; ties by {})",
                formula.join(" "),
                sheet,
                tie_break
            );
            for e in entries {
                let _ = writeln!(
                    out,
                    "  {:>2}. {}  {}",
                    e.rank,
                    subject(&e.label, e.name.as_deref()),
                    format_number(e.value)
                );
            }
            if entries.is_empty() {
                out.push_str("(nothing to rank)\n");
            }
            if *excluded > 0 {
                let _ = writeln!(
                    out,
                    "{} {} missing a score component excluded",
                    excluded,
                    class_word(EntityClass::Stock, *excluded != 1)
                );
            }
        }
        QueryResult::Comparison { metric, entries } => {
            let _ = writeln!(out, "{}", metric.name);
            for entry in entries {
                let _ = writeln!(
                    out,
                    "  {}: {}",
                    subject(&entry.label, entry.name.as_deref()),
                    format_reading(&entry.reading, metric)
                );
            }
        }
        QueryResult::Definition { text, .. } => {
            let _ = writeln!(out, "{text}");
        }
        QueryResult::Statistics {
            metric,
            sheet,
            count,
            mean,
            min,
            max,
            top,
        } => {
            let _ = writeln!(out, "{} across {} companies ({})", metric.name, count, sheet);
            let stat = |v: &Option<f64>| match v {
                Some(n) => with_unit(format_number(*n), metric),
                None => "n/a".to_string(),
            };
            let _ = writeln!(out, "  mean {}  min {}  max {}", stat(mean), stat(min), stat(max));
            if !top.is_empty() {
                out.push_str("top:\n");
                render_entries(&mut out, top, metric);
            }
        }
        QueryResult::NotFound { subject, message } => {
            let _ = writeln!(out, "no data for {subject}: {message}");
        }
        QueryResult::Unrecognized { reason } => {
            let _ = writeln!(out, "query not recognized: {reason}");
        }
    }
    out
}

fn render_entries(out: &mut String, entries: &[RankEntry], metric: &MetricLabel) {
    for e in entries {
        let mut value = with_unit(format_number(e.value), metric);
        if e.implausible {
            value.push_str(" [outside expected range]");
        }
        let _ = writeln!(out, "  {:>2}. {}  {}", e.rank, subject(&e.label, e.name.as_deref()), value);
    }
}

/// Left-aligned label column, right-aligned values.
fn render_grid(columns: &[MetricLabel], rows: &[TableRow]) -> String {
    let mut cells: Vec<Vec<String>> = Vec::with_capacity(rows.len() + 1);
    let mut header = vec![String::new()];
    header.extend(columns.iter().map(|c| c.name.clone()));
    cells.push(header);
    for row in rows {
        let mut line = vec![subject(&row.label, row.name.as_deref())];
        line.extend(
            row.cells
                .iter()
                .zip(columns)
                .map(|(reading, metric)| format_reading(reading, metric)),
        );
        cells.push(line);
    }

    let widths: Vec<usize> = (0..=columns.len())
        .map(|c| cells.iter().map(|l| l.get(c).map_or(0, |s| s.chars().count())).max().unwrap_or(0))
        .collect();

    let mut out = String::new();
    for line in &cells {
        for (c, text) in line.iter().enumerate() {
            if c == 0 {
                let _ = write!(out, "{:<width$}", text, width = widths[0]);
            } else {
                let _ = write!(out, "  {:>width$}", text, width = widths[c]);
            }
        }
        out.push('\n');
    }
    out
}

// ----------------------------------------------------------------------------
// inspect
// ----------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct InspectReport<'a> {
    pub engine_version: &'a str,
    pub loaded_at: &'a str,
    pub sheets: Vec<SheetReport<'a>>,
    pub failed: Vec<FailedSheet<'a>>,
}

#[derive(Debug, Serialize)]
pub struct SheetReport<'a> {
    pub sheet: &'a str,
    pub primary: bool,
    /// 1-based, as a spreadsheet shows them.
    pub header_rows: Vec<usize>,
    pub columns: Vec<ColumnReport<'a>>,
    pub entities: usize,
    pub categories: Vec<&'a str>,
}

#[derive(Debug, Serialize)]
pub struct ColumnReport<'a> {
    pub column: String,
    pub label: &'a str,
    pub binding: &'a Binding,
}

#[derive(Debug, Serialize)]
pub struct FailedSheet<'a> {
    pub sheet: &'a str,
    pub reason: &'a str,
}

/// Spreadsheet column letters for a zero-based index.
pub fn column_letter(mut col: usize) -> String {
    let mut letters = Vec::new();
    loop {
        letters.push((b'A' + (col % 26) as u8) as char);
        if col < 26 {
            break;
        }
        col = col / 26 - 1;
    }
    letters.iter().rev().collect()
}

pub fn inspect_report(session: &Session) -> InspectReport<'_> {
    let sheets = session
        .tables()
        .enumerate()
        .map(|(i, t)| sheet_report(t, i == 0))
        .collect();
    InspectReport {
        engine_version: &session.meta().engine_version,
        loaded_at: &session.meta().loaded_at,
        sheets,
        failed: session.schema_errors().iter().map(failed_sheet).collect(),
    }
}

fn sheet_report(table: &Table, primary: bool) -> SheetReport<'_> {
    SheetReport {
        sheet: &table.sheet,
        primary,
        header_rows: table.header_rows.iter().map(|r| r + 1).collect(),
        columns: table
            .columns
            .iter()
            .map(|c| ColumnReport {
                column: column_letter(c.position),
                label: &c.label,
                binding: &c.binding,
            })
            .collect(),
        entities: table.entity_count(),
        categories: table.categories.iter().map(|c| c.label.as_str()).collect(),
    }
}

fn failed_sheet(err: &SchemaError) -> FailedSheet<'_> {
    FailedSheet {
        sheet: &err.sheet,
        reason: &err.reason,
    }
}

fn describe_binding(binding: &Binding) -> String {
    match binding {
        Binding::Identity { field } => format!("identity: {}", format!("{field:?}").to_lowercase()),
        Binding::Metric {
            metric,
            sub_period,
            share_of_parent,
            ..
        } => {
            let mut s = format!("metric: {metric}");
            if let Some(p) = sub_period {
                let _ = write!(s, " ({p})");
            }
            if *share_of_parent {
                s.push_str(" % of parent");
            }
            s
        }
        Binding::Opaque => "unresolved".to_string(),
    }
}

pub fn render_inspect(report: &InspectReport<'_>) -> String {
    let mut out = String::new();
    for sheet in &report.sheets {
        let rows: Vec<String> = sheet.header_rows.iter().map(|r| r.to_string()).collect();
        let _ = writeln!(
            out,
            "Sheet '{}'{}: header row{} {}",
            sheet.sheet,
            if sheet.primary { " (primary)" } else { "" },
            if rows.len() == 1 { "" } else { "s" },
            rows.join(", ")
        );
        let width = sheet.columns.iter().map(|c| c.label.chars().count()).max().unwrap_or(0);
        for col in &sheet.columns {
            let _ = writeln!(
                out,
                "  {:>3}  {:<width$}  {}",
                col.column,
                col.label,
                describe_binding(col.binding),
                width = width
            );
        }
        let _ = writeln!(out, "  companies: {}", sheet.entities);
        if !sheet.categories.is_empty() {
            let _ = writeln!(out, "  sectors:   {}", sheet.categories.join(", "));
        }
    }
    for failed in &report.failed {
        let _ = writeln!(out, "Sheet '{}': no usable header ({})", failed.sheet, failed.reason);
    }
    out
}

// ----------------------------------------------------------------------------
// metrics
// ----------------------------------------------------------------------------

pub fn render_metrics(defs: &[MetricDefinition]) -> String {
    let mut out = String::new();
    for def in defs.iter().filter(|d| !d.is_identity()) {
        let _ = write!(out, "{:<12} {}", def.id, def.display_name);
        if let Some(unit) = &def.unit {
            let _ = write!(out, " [{unit}]");
        }
        if def.category_level {
            out.push_str(" (sector rows)");
        }
        out.push('\n');
        let _ = writeln!(out, "             aliases: {}", def.aliases.join(", "));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use finquery_engine::result::ScoreComponent;
    use finquery_engine::{Missing, MetricId};

    fn label(unit: Option<&str>) -> MetricLabel {
        MetricLabel {
            id: MetricId::new("pe"),
            name: "P/E".into(),
            unit: unit.map(str::to_string),
        }
    }

    #[test]
    fn numbers() {
        assert_eq!(format_number(1200.0), "1,200");
        assert_eq!(format_number(4166.666), "4,166.67");
        assert_eq!(format_number(-350.0), "-350");
        assert_eq!(format_number(6.1), "6.10");
        assert_eq!(format_number(0.0), "0");
    }

    #[test]
    fn column_letters() {
        assert_eq!(column_letter(0), "A");
        assert_eq!(column_letter(25), "Z");
        assert_eq!(column_letter(26), "AA");
        assert_eq!(column_letter(27), "AB");
    }

    #[test]
    fn missing_and_implausible_readings() {
        let pending = Reading::missing(Missing::Pending {
            text: "Results Pending".into(),
        });
        assert_eq!(format_reading(&pending, &label(None)), "n/a (Results Pending)");

        let high = Reading {
            value: Datum::Number(250.0),
            implausible: true,
            source: None,
        };
        assert_eq!(
            format_reading(&high, &label(Some("x"))),
            "250 x [outside expected range]"
        );
    }

    #[test]
    fn composite_heading_names_weights() {
        let result = QueryResult::CompositeRanking {
            components: vec![
                ScoreComponent {
                    metric: label(None),
                    weight: 0.4,
                },
                ScoreComponent {
                    metric: label(None),
                    weight: -0.2,
                },
            ],
            sheet: "sectors".into(),
            tie_break: "original row order".into(),
            entries: vec![RankEntry {
                rank: 1,
                label: "AINS".into(),
                name: Some("Amana Insurance".into()),
                value: 5.6,
                implausible: false,
            }],
            excluded: 1,
        };
        let text = render_result(&result);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "companies by score +0.4 x P/E -0.2 x P/E (sectors; highest first; ties by original row order)"
        );
        assert_eq!(lines[1], "   1. AINS (Amana Insurance)  5.60");
        assert_eq!(lines[2], "1 company missing a score component excluded");
    }

    #[test]
    fn unrecognized_line() {
        let text = render_result(&QueryResult::Unrecognized {
            reason: "unknown metric 'zyx'".into(),
        });
        assert_eq!(text, "query not recognized: unknown metric 'zyx'\n");
    }
}
