//! Canonical table: the output of header inference for one sheet.
//!
//! A `Table` is built once and never mutated. Category membership is stored as
//! an index into `categories`, assigned by a single forward pass during
//! inference; `None` is the uncategorized sentinel.

use serde::Serialize;

use crate::catalog::{IdentityField, MetricId, ValueKind};
use crate::grid::Cell;

/// Label reported for entity rows that precede the first category break.
pub const UNCATEGORIZED: &str = "Uncategorized";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Binding {
    Identity { field: IdentityField },
    Metric {
        metric: MetricId,
        #[serde(skip_serializing_if = "Option::is_none")]
        sub_period: Option<String>,
        value_kind: ValueKind,
        /// Percentage-of-parent sibling of another column with the same metric.
        share_of_parent: bool,
    },
    /// Header text that did not resolve to a catalog metric. Carried, never queried.
    Opaque,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    /// Zero-based column in the source grid.
    pub position: usize,
    /// `Parent > Sub` when a sub-header applies, else the parent label.
    pub label: String,
    pub parent_label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_label: Option<String>,
    pub binding: Binding,
}

impl Column {
    pub fn metric(&self) -> Option<&MetricId> {
        match &self.binding {
            Binding::Metric { metric, .. } => Some(metric),
            _ => None,
        }
    }

    pub fn is_share(&self) -> bool {
        matches!(self.binding, Binding::Metric { share_of_parent: true, .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RowKind {
    Entity {
        code: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        category: Option<usize>,
    },
    CategoryBreak { category: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row {
    /// Zero-based row in the source grid.
    pub source_row: usize,
    pub kind: RowKind,
    /// One cell per table column, in column order.
    pub values: Vec<Cell>,
}

impl Row {
    pub fn value(&self, column: usize) -> &Cell {
        static EMPTY: Cell = Cell::Empty;
        self.values.get(column).unwrap_or(&EMPTY)
    }

    pub fn code(&self) -> Option<&str> {
        match &self.kind {
            RowKind::Entity { code, .. } => Some(code),
            RowKind::CategoryBreak { .. } => None,
        }
    }

    pub fn display_name(&self) -> Option<&str> {
        match &self.kind {
            RowKind::Entity { name, .. } => name.as_deref(),
            RowKind::CategoryBreak { .. } => None,
        }
    }

    pub fn is_entity(&self) -> bool {
        matches!(self.kind, RowKind::Entity { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Category {
    pub label: String,
    /// Index of the category break in `Table::rows`.
    pub row: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Table {
    pub sheet: String,
    /// Grid rows that formed the header block (one, or two with a sub-header).
    pub header_rows: Vec<usize>,
    pub columns: Vec<Column>,
    pub rows: Vec<Row>,
    pub categories: Vec<Category>,
    /// Column holding entity codes.
    pub key_column: usize,
    /// Column holding category labels on break rows.
    pub label_column: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_column: Option<usize>,
}

impl Table {
    pub fn has_sub_header(&self) -> bool {
        self.header_rows.len() > 1
    }

    pub fn has_categories(&self) -> bool {
        !self.categories.is_empty()
    }

    pub fn has_metric(&self, metric: &MetricId) -> bool {
        self.columns.iter().any(|c| c.metric() == Some(metric))
    }

    /// The column answering plain lookups of `metric`: the earliest column
    /// bound to it that is not a percentage-of-parent sibling.
    pub fn primary_column(&self, metric: &MetricId) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.metric() == Some(metric) && !c.is_share())
            .or_else(|| self.columns.iter().position(|c| c.metric() == Some(metric)))
    }

    pub fn entities(&self) -> impl Iterator<Item = (usize, &Row)> {
        self.rows.iter().enumerate().filter(|(_, r)| r.is_entity())
    }

    pub fn entity_count(&self) -> usize {
        self.entities().count()
    }

    /// Entity row whose code equals `code`, ignoring case.
    pub fn find_entity(&self, code: &str) -> Option<usize> {
        self.entities()
            .find(|(_, r)| r.code().is_some_and(|c| c.eq_ignore_ascii_case(code)))
            .map(|(i, _)| i)
    }

    /// Entity rows assigned to category `category`, in sheet order.
    pub fn members(&self, category: usize) -> impl Iterator<Item = (usize, &Row)> {
        self.entities().filter(move |(_, r)| {
            matches!(r.kind, RowKind::Entity { category: Some(c), .. } if c == category)
        })
    }

    pub fn category_label(&self, category: Option<usize>) -> &str {
        category
            .and_then(|c| self.categories.get(c))
            .map(|c| c.label.as_str())
            .unwrap_or(UNCATEGORIZED)
    }

    /// Category of an entity row, or `None` for uncategorized and break rows.
    pub fn category_of(&self, row: usize) -> Option<usize> {
        match self.rows.get(row).map(|r| &r.kind) {
            Some(RowKind::Entity { category, .. }) => *category,
            _ => None,
        }
    }

    pub fn find_category(&self, label: &str) -> Option<usize> {
        self.categories
            .iter()
            .position(|c| c.label.eq_ignore_ascii_case(label))
    }
}
