//! Header inference: raw grid → canonical `Table`.
//!
//! Order of work:
//! 1. locate the header row within the first `header_scan_rows` rows
//! 2. fill blank header cells rightward (merged-cell semantics)
//! 3. detect and merge a sub-header row
//! 4. bind each column label through the catalog (unresolved → opaque)
//! 5. classify data rows as entity or category break, assigning categories
//!    in one forward pass
//!
//! Only step 1 can fail. Everything after it degrades instead.

use log::{debug, warn};

use crate::catalog::{normalize_tokens, Catalog, IdentityField, MetricDefinition, ValueKind};
use crate::config::InferenceConfig;
use crate::error::{CatalogError, SchemaError};
use crate::grid::{Cell, RawGrid};
use crate::table::{Binding, Category, Column, Row, RowKind, Table};

/// A header slot after rightward fill.
#[derive(Debug, Clone)]
struct HeaderSlot {
    label: String,
    /// Inherited from a cell to the left rather than written in this column.
    filled: bool,
    span_start: usize,
}

pub fn infer_table(
    grid: &RawGrid,
    catalog: &Catalog,
    config: &InferenceConfig,
) -> Result<Table, SchemaError> {
    if grid.is_empty() {
        return Err(SchemaError::new(&grid.name, "sheet is empty"));
    }

    let header_row = locate_header(grid, catalog, config).ok_or_else(|| {
        SchemaError::new(
            &grid.name,
            format!(
                "no header row found in the first {} rows",
                config.header_scan_rows.min(grid.height())
            ),
        )
    })?;
    debug!("sheet '{}': header row {}", grid.name, header_row);

    let slots = fill_header(grid, header_row);
    let sub_header = detect_sub_header(grid, header_row, &slots, catalog);
    let mut header_rows = vec![header_row];
    if sub_header {
        debug!("sheet '{}': sub-header row {}", grid.name, header_row + 1);
        header_rows.push(header_row + 1);
    }
    let data_start = header_row + header_rows.len();

    let columns = build_columns(grid, &slots, sub_header, data_start, catalog);
    if columns.is_empty() {
        return Err(SchemaError::new(&grid.name, "header row produced no columns"));
    }

    let layout = Layout::new(&columns, catalog);
    let (rows, categories) = classify_rows(grid, &columns, &layout, &header_rows, config);

    debug!(
        "sheet '{}': {} columns, {} rows, {} categories",
        grid.name,
        columns.len(),
        rows.len(),
        categories.len()
    );

    Ok(Table {
        sheet: grid.name.clone(),
        header_rows,
        columns,
        rows,
        categories,
        key_column: layout.key,
        label_column: layout.label,
        name_column: layout.name,
    })
}

// ---------------------------------------------------------------------------
// Header localization
// ---------------------------------------------------------------------------

fn locate_header(grid: &RawGrid, catalog: &Catalog, config: &InferenceConfig) -> Option<usize> {
    let limit = config.header_scan_rows.min(grid.height());
    (0..limit).find(|&r| {
        grid.row(r)
            .is_some_and(|row| is_header_like(row, catalog, config))
    })
}

fn is_header_like(row: &[Cell], catalog: &Catalog, config: &InferenceConfig) -> bool {
    let labels: Vec<String> = row.iter().filter_map(Cell::label).collect();
    if labels.len() < config.min_header_cells {
        return false;
    }
    // An ambiguous label still reads as a header term.
    let resolved = labels
        .iter()
        .filter(|l| !matches!(catalog.resolve_alias(l), Ok(None)))
        .count();
    resolved as f64 / labels.len() as f64 >= config.header_match_ratio
}

// ---------------------------------------------------------------------------
// Merged headers
// ---------------------------------------------------------------------------

fn fill_header(grid: &RawGrid, header_row: usize) -> Vec<Option<HeaderSlot>> {
    let mut slots = Vec::with_capacity(grid.width());
    let mut current: Option<HeaderSlot> = None;

    for c in 0..grid.width() {
        match grid.cell(header_row, c).label() {
            Some(label) => {
                let slot = HeaderSlot {
                    label,
                    filled: false,
                    span_start: c,
                };
                current = Some(slot.clone());
                slots.push(Some(slot));
            }
            None => slots.push(current.as_ref().map(|s| HeaderSlot {
                filled: true,
                ..s.clone()
            })),
        }
    }
    slots
}

fn span_width(slots: &[Option<HeaderSlot>], start: usize) -> usize {
    slots
        .iter()
        .filter(|s| s.as_ref().is_some_and(|s| s.span_start == start))
        .count()
}

/// The row below the header is a sub-header when every filled cell is text
/// sitting under a parent label, and either one sits under a merged span or
/// every one sits under a metric parent (a period row such as "Dec 24" under
/// single-column labels, with the key column left blank).
fn detect_sub_header(
    grid: &RawGrid,
    header_row: usize,
    slots: &[Option<HeaderSlot>],
    catalog: &Catalog,
) -> bool {
    let Some(row) = grid.row(header_row + 1) else {
        return false;
    };

    let mut any = false;
    let mut under_span = false;
    let mut outside_metric = false;
    for (c, cell) in row.iter().enumerate() {
        if !cell.is_occupied() {
            continue;
        }
        if cell.as_text().is_none() {
            return false;
        }
        let Some(slot) = slots.get(c).and_then(|s| s.as_ref()) else {
            return false;
        };
        any = true;
        if span_width(slots, slot.span_start) >= 2 {
            under_span = true;
        }
        if !matches!(catalog.resolve_alias(&slot.label), Ok(Some(def)) if def.identity.is_none()) {
            outside_metric = true;
        }
    }
    any && (under_span || !outside_metric)
}

// ---------------------------------------------------------------------------
// Column binding
// ---------------------------------------------------------------------------

fn build_columns(
    grid: &RawGrid,
    slots: &[Option<HeaderSlot>],
    sub_header: bool,
    data_start: usize,
    catalog: &Catalog,
) -> Vec<Column> {
    let mut columns = Vec::new();

    for (c, slot) in slots.iter().enumerate() {
        let Some(slot) = slot else { continue };
        let sub = if sub_header {
            grid.cell(data_start - 1, c).label()
        } else {
            None
        };

        if slot.filled && sub.is_none() && !column_has_data(grid, c, data_start) {
            continue;
        }

        let binding = bind_column(&grid.name, &slot.label, sub.as_deref(), catalog);
        let label = match &sub {
            Some(s) => format!("{} > {}", slot.label, s),
            None => slot.label.clone(),
        };
        columns.push(Column {
            position: c,
            label,
            parent_label: slot.label.clone(),
            sub_label: sub,
            binding,
        });
    }
    columns
}

fn column_has_data(grid: &RawGrid, c: usize, data_start: usize) -> bool {
    (data_start..grid.height()).any(|r| grid.cell(r, c).is_occupied())
}

fn bind_column(sheet: &str, parent: &str, sub: Option<&str>, catalog: &Catalog) -> Binding {
    let share = sub.is_some_and(|s| normalize_tokens(s) == ["%"]);

    let mut resolved = catalog.resolve_alias(parent);
    let mut sub_is_name = false;
    if !matches!(resolved, Ok(Some(_))) && !share {
        // "Cumulative" over "Revenue %": the metric name spans both rows.
        if let Some(sub) = sub {
            let composite = catalog.resolve_alias(&format!("{parent} {sub}"));
            if matches!(composite, Ok(Some(_))) {
                resolved = composite;
                sub_is_name = true;
            }
        }
    }

    match resolved {
        Ok(Some(def)) => binding_for(def, sub, share, sub_is_name),
        Ok(None) => {
            warn!("sheet '{sheet}': header '{parent}' matches no metric, kept as opaque");
            Binding::Opaque
        }
        Err(CatalogError::AmbiguousAlias { candidates, .. }) => {
            warn!(
                "sheet '{sheet}': header '{parent}' is ambiguous ({}), kept as opaque",
                candidates.join(", ")
            );
            Binding::Opaque
        }
        Err(e) => {
            warn!("sheet '{sheet}': header '{parent}': {e}");
            Binding::Opaque
        }
    }
}

fn binding_for(def: &MetricDefinition, sub: Option<&str>, share: bool, sub_is_name: bool) -> Binding {
    if let Some(field) = def.identity {
        return Binding::Identity { field };
    }
    Binding::Metric {
        metric: def.id.clone(),
        sub_period: if share || sub_is_name {
            None
        } else {
            sub.map(str::to_string)
        },
        value_kind: if share { ValueKind::Percentage } else { def.kind },
        share_of_parent: share,
    }
}

// ---------------------------------------------------------------------------
// Row classification
// ---------------------------------------------------------------------------

/// Which columns name rows, and which may be filled on a category break.
struct Layout {
    key: usize,
    label: usize,
    name: Option<usize>,
    /// Per column: may be populated on a category break row.
    marker: Vec<bool>,
    /// Per column: bound to an identity field or a metric.
    bound: Vec<bool>,
    /// At least one bound, non-marker column exists; without one every row
    /// would look like a break.
    detect_categories: bool,
}

impl Layout {
    fn new(columns: &[Column], catalog: &Catalog) -> Self {
        let identity = |field: IdentityField| {
            columns
                .iter()
                .enumerate()
                .filter(move |(_, c)| c.binding == Binding::Identity { field })
                .map(|(i, _)| i)
        };

        let codes: Vec<usize> = identity(IdentityField::Code).collect();
        let name = identity(IdentityField::Name).next();
        // Two code columns: the first labels categories, the last keys entities.
        let key = codes.last().copied().or(name).unwrap_or(0);
        let label = codes.first().copied().unwrap_or(key);

        let marker: Vec<bool> = columns
            .iter()
            .enumerate()
            .map(|(i, c)| match &c.binding {
                Binding::Identity { field } => i == label || *field == IdentityField::Sector,
                Binding::Metric { metric, .. } => {
                    catalog.get(metric).is_some_and(|d| d.category_level)
                }
                Binding::Opaque => false,
            })
            .collect();

        let bound: Vec<bool> = columns.iter().map(|c| c.binding != Binding::Opaque).collect();
        let detect_categories = marker.iter().zip(&bound).any(|(&m, &b)| !m && b);

        Self {
            key,
            label,
            name,
            marker,
            bound,
            detect_categories,
        }
    }

    fn is_bound(&self, column: usize) -> bool {
        self.bound.get(column).copied().unwrap_or(false)
    }
}

fn classify_rows(
    grid: &RawGrid,
    columns: &[Column],
    layout: &Layout,
    header_rows: &[usize],
    config: &InferenceConfig,
) -> (Vec<Row>, Vec<Category>) {
    let data_start = header_rows.last().map_or(0, |h| h + 1);
    let mut rows = Vec::new();
    let mut categories = Vec::new();
    let mut current: Option<usize> = None;

    for r in data_start..grid.height() {
        let Some(raw) = grid.row(r) else { break };

        if let Some(marker) = stop_marker(raw, &config.stop_markers) {
            debug!("sheet '{}': row {} starts '{}', end of table", grid.name, r, marker);
            break;
        }

        let values: Vec<Cell> = columns.iter().map(|c| raw[c.position].clone()).collect();
        if !values.iter().any(Cell::is_occupied) {
            continue;
        }

        if header_rows
            .iter()
            .any(|&h| repeats_header(grid, h, raw, config))
        {
            debug!("sheet '{}': row {} repeats the header, skipped", grid.name, r);
            continue;
        }

        if layout.detect_categories && is_category_break(&values, layout, config) {
            let label = values[layout.label].label().unwrap_or_default();
            debug!("sheet '{}': row {} opens category '{}'", grid.name, r, label);
            let idx = categories.len();
            categories.push(Category {
                label,
                row: rows.len(),
            });
            current = Some(idx);
            rows.push(Row {
                source_row: r,
                kind: RowKind::CategoryBreak { category: idx },
                values,
            });
            continue;
        }

        let Some(code) = values[layout.key].label() else {
            debug!("sheet '{}': row {} has no entity key, skipped", grid.name, r);
            continue;
        };
        let name = layout.name.and_then(|n| values[n].label());
        rows.push(Row {
            source_row: r,
            kind: RowKind::Entity {
                code,
                name,
                category: current,
            },
            values,
        });
    }

    (rows, categories)
}

fn stop_marker<'a>(row: &[Cell], markers: &'a [String]) -> Option<&'a str> {
    let first = row.iter().find(|c| c.is_occupied())?.label()?;
    let first = first.to_lowercase();
    markers
        .iter()
        .find(|m| !m.is_empty() && first.starts_with(&m.to_lowercase()))
        .map(|m| m.as_str())
}

fn repeats_header(grid: &RawGrid, header_row: usize, row: &[Cell], config: &InferenceConfig) -> bool {
    let mut header_cells = 0;
    let mut matches = 0;
    for (c, cell) in row.iter().enumerate() {
        let Some(h) = grid.cell(header_row, c).label() else {
            continue;
        };
        header_cells += 1;
        if cell.label().is_some_and(|l| l.eq_ignore_ascii_case(&h)) {
            matches += 1;
        }
    }
    let occupied = row.iter().filter(|c| c.is_occupied()).count();
    matches > 0
        && matches >= config.min_header_cells.min(header_cells)
        && matches as f64 >= occupied as f64 * config.header_match_ratio
}

fn is_category_break(values: &[Cell], layout: &Layout, config: &InferenceConfig) -> bool {
    if values[layout.label].as_text().is_none() {
        return false;
    }

    let mut non_marker = 0usize;
    let mut empty = 0usize;
    for (i, cell) in values.iter().enumerate() {
        if layout.marker[i] {
            continue;
        }
        non_marker += 1;
        if !cell.is_occupied() {
            empty += 1;
        }
    }
    if non_marker == 0 {
        return false;
    }

    // Bound columns outside the marker set must be empty; opaque columns only
    // count toward the empty ratio.
    let bound_outside = values
        .iter()
        .zip(&layout.marker)
        .enumerate()
        .any(|(i, (cell, &m))| !m && cell.is_occupied() && layout.is_bound(i));
    if bound_outside {
        return false;
    }

    empty as f64 / non_marker as f64 >= config.category_empty_ratio
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MetricId;
    use crate::grid::DEFAULT_PLACEHOLDERS;
    use crate::table::UNCATEGORIZED;

    fn grid(name: &str, rows: &[&[&str]]) -> RawGrid {
        let rows: Vec<Vec<&str>> = rows.iter().map(|r| r.to_vec()).collect();
        RawGrid::from_strings(name, &rows, DEFAULT_PLACEHOLDERS)
    }

    fn infer(g: &RawGrid) -> Result<Table, SchemaError> {
        infer_table(g, &Catalog::builtin(), &InferenceConfig::default())
    }

    fn sector_sheet() -> RawGrid {
        grid(
            "Sectors",
            &[
                &["Market Statistics", "", "", "", "", "", "", "", "", "", "", ""],
                &[
                    "CODE", "CODE", "Company", "Revenue 3M", "", "Profit 3M", "", "Cumulative Revenue %",
                    "P/E", "PBV", "Div Yield", "ROE",
                ],
                &["", "", "", "Dec 24", "%", "Dec 24", "%", "", "", "", "", ""],
                &["", "LOOSE", "Loose Co", "100", "5", "10", "2", "", "8", "1", "2", "11"],
                &["BANKS", "", "", "", "", "", "", "12.5", "6.1", "0.9", "5.5", ""],
                &["", "COMB", "Commercial Bank", "5,000", "10", "900", "12", "", "5.2", "0.8", "6", "18.2"],
                &["", "HNB", "Hatton National Bank", "4000", "8", "Results Pending", "", "", "7", "1.1", "4", "16"],
                &["CODE", "CODE", "Company", "Revenue 3M", "", "Profit 3M", "", "Cumulative Revenue %",
                  "P/E", "PBV", "Div Yield", "ROE"],
                &["INSURANCE", "", "", "", "", "", "", "3.2", "", "", "", ""],
                &["", "ALLI", "Alliance Insurance", "300", "2", "40", "1", "", "9", "1.4", "3", "12"],
                &["", "", "", "", "", "", "", "", "", "", "", ""],
                &["Glossary", "P/E is price over earnings", "", "", "", "", "", "", "", "", "", ""],
                &["", "JUNK", "After glossary", "1", "", "", "", "", "", "", "", ""],
            ],
        )
    }

    #[test]
    fn simple_header_binds_metrics_and_identity() {
        let g = grid(
            "Prices",
            &[
                &["Code", "Company", "C.Price", "P/E", "Remarks"],
                &["ALLI", "Alliance", "45.5", "9.1", "watch"],
                &["COMB", "Commercial Bank", "120", "N/A", ""],
            ],
        );
        let t = infer(&g).unwrap();
        assert_eq!(t.header_rows, vec![0]);
        assert_eq!(t.columns.len(), 5);
        assert_eq!(t.columns[0].binding, Binding::Identity { field: IdentityField::Code });
        assert_eq!(t.columns[2].metric(), Some(&MetricId::new("price")));
        assert_eq!(t.columns[4].binding, Binding::Opaque);
        assert_eq!(t.entity_count(), 2);
        assert!(!t.has_categories());
        let comb = &t.rows[t.find_entity("comb").unwrap()];
        assert_eq!(comb.display_name(), Some("Commercial Bank"));
        // placeholder kept as a marker, never zero
        assert_eq!(comb.value(3), &Cell::Placeholder("N/A".into()));
    }

    #[test]
    fn missing_header_is_schema_error() {
        let g = grid("Notes", &[&["hello", "world"], &["1", "2"]]);
        let err = infer(&g).unwrap_err();
        assert_eq!(err.sheet, "Notes");

        let empty = RawGrid::new("Blank", vec![]);
        assert!(infer(&empty).is_err());
    }

    #[test]
    fn header_must_appear_within_lookahead() {
        let mut rows: Vec<Vec<&str>> = vec![vec!["", ""]; 12];
        rows.push(vec!["Code", "P/E"]);
        rows.push(vec!["ALLI", "9"]);
        let g = RawGrid::from_strings("Late", &rows, DEFAULT_PLACEHOLDERS);
        assert!(infer(&g).is_err());

        let config = InferenceConfig {
            header_scan_rows: 20,
            ..InferenceConfig::default()
        };
        assert!(infer_table(&g, &Catalog::builtin(), &config).is_ok());
    }

    #[test]
    fn sub_header_yields_one_column_per_leaf() {
        let t = infer(&sector_sheet()).unwrap();
        assert_eq!(t.header_rows, vec![1, 2]);

        let revenue: Vec<&Column> = t
            .columns
            .iter()
            .filter(|c| c.metric() == Some(&MetricId::new("revenue_3m")))
            .collect();
        assert_eq!(revenue.len(), 2);
        assert_eq!(revenue[0].label, "Revenue 3M > Dec 24");
        assert_eq!(
            revenue[0].binding,
            Binding::Metric {
                metric: MetricId::new("revenue_3m"),
                sub_period: Some("Dec 24".into()),
                value_kind: ValueKind::Currency,
                share_of_parent: false,
            }
        );
        assert_eq!(revenue[1].label, "Revenue 3M > %");
        assert!(revenue[1].is_share());
        assert_eq!(revenue[1].parent_label, "Revenue 3M");
    }

    #[test]
    fn period_row_under_single_column_labels() {
        let g = grid(
            "Quarterly",
            &[
                &["Code", "Revenue 3M", "Profit 3M"],
                &["", "Dec 24", "Dec 24"],
                &["ALLI", "100", "10"],
            ],
        );
        let t = infer(&g).unwrap();
        assert_eq!(t.header_rows, vec![0, 1]);
        assert_eq!(t.columns[1].label, "Revenue 3M > Dec 24");
        for col in &t.columns[1..] {
            match &col.binding {
                Binding::Metric { sub_period, .. } => {
                    assert_eq!(sub_period.as_deref(), Some("Dec 24"))
                }
                other => panic!("{other:?}"),
            }
        }
        assert_eq!(t.entity_count(), 1);

        // text under an unbound column is data, not a period row
        let g = grid(
            "Notes",
            &[
                &["Code", "P/E", "Remarks"],
                &["", "", "watch"],
                &["ALLI", "9", ""],
            ],
        );
        assert_eq!(infer(&g).unwrap().header_rows, vec![0]);
    }

    #[test]
    fn category_breaks_and_forward_assignment() {
        let t = infer(&sector_sheet()).unwrap();
        let labels: Vec<&str> = t.categories.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, vec!["BANKS", "INSURANCE"]);
        assert_eq!(t.key_column, 1);
        assert_eq!(t.label_column, 0);

        let loose = t.find_entity("LOOSE").unwrap();
        assert_eq!(t.category_label(t.category_of(loose)), UNCATEGORIZED);
        let hnb = t.find_entity("HNB").unwrap();
        assert_eq!(t.category_label(t.category_of(hnb)), "BANKS");
        let alli = t.find_entity("ALLI").unwrap();
        assert_eq!(t.category_label(t.category_of(alli)), "INSURANCE");

        let banks: Vec<_> = t.members(0).map(|(_, r)| r.code().unwrap()).collect();
        assert_eq!(banks, vec!["COMB", "HNB"]);
    }

    #[test]
    fn repeated_header_and_glossary_tail_are_excluded() {
        let t = infer(&sector_sheet()).unwrap();
        assert!(t.find_entity("CODE").is_none());
        assert!(t.find_entity("JUNK").is_none());
        assert_eq!(t.entity_count(), 4);
        assert_eq!(t.rows.iter().filter(|r| !r.is_entity()).count(), 2);
    }

    #[test]
    fn numbers_are_parsed_and_pending_kept() {
        let t = infer(&sector_sheet()).unwrap();
        let comb = &t.rows[t.find_entity("COMB").unwrap()];
        let col = t.primary_column(&MetricId::new("revenue_3m")).unwrap();
        assert_eq!(comb.value(col), &Cell::Number(5000.0));

        let hnb = &t.rows[t.find_entity("HNB").unwrap()];
        let profit = t.primary_column(&MetricId::new("profit_3m")).unwrap();
        assert_eq!(hnb.value(profit), &Cell::Placeholder("Results Pending".into()));
    }

    #[test]
    fn trailing_fill_without_data_is_dropped() {
        let g = grid(
            "Wide",
            &[
                &["Code", "P/E", "", ""],
                &["ALLI", "9", "", ""],
            ],
        );
        let t = infer(&g).unwrap();
        assert_eq!(t.columns.len(), 2);
    }

    #[test]
    fn composite_header_name_across_rows() {
        let g = grid(
            "Growth",
            &[
                &["Code", "Company", "Cumulative", ""],
                &["", "", "Revenue %", "Profit %"],
                &["ALLI", "Alliance", "12", "8"],
            ],
        );
        let t = infer(&g).unwrap();
        assert!(t.has_sub_header());
        assert_eq!(t.columns[2].metric(), Some(&MetricId::new("cum_revenue")));
        assert_eq!(t.columns[3].metric(), Some(&MetricId::new("cum_profit")));
    }

    #[test]
    fn no_break_detection_without_entity_specific_columns() {
        // Every bound column is category-level: rows cannot be told apart.
        let g = grid(
            "Ratios",
            &[
                &["Code", "P/E", "PBV"],
                &["BANKS", "6", "0.9"],
                &["COMB", "5.2", "0.8"],
            ],
        );
        let t = infer(&g).unwrap();
        assert!(!t.has_categories());
        assert_eq!(t.entity_count(), 2);
    }
}
