//! Query results, shaped for a renderer.
//!
//! Missing data is a value here, not an error: a comparison with one target
//! lacking data still returns every target, in order, with the gap marked.

use serde::Serialize;

use crate::catalog::{MetricDefinition, MetricId};
use crate::intent::{EntityClass, RankOrder};

/// Why a value is absent.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Missing {
    /// No table has a column for the metric.
    NotAvailable,
    /// The cell is blank, or a sector has no member values.
    NoData,
    /// The cell holds placeholder text such as "Results Pending".
    Pending { text: String },
    /// Tables carry the metric but none lists the entity or sector.
    NotListed,
}

impl std::fmt::Display for Missing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Missing::NotAvailable => write!(f, "not available"),
            Missing::NoData => write!(f, "no data"),
            Missing::Pending { text } => write!(f, "{text}"),
            Missing::NotListed => write!(f, "not listed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Datum {
    Number(f64),
    /// Text found where a number was expected.
    Text(String),
    Missing(Missing),
}

impl Datum {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Datum::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Datum::Missing(_))
    }
}

/// Where a value came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Source {
    /// `row` is the 1-based spreadsheet row.
    Cell { sheet: String, row: usize, column: String },
    CategoryRow { sheet: String, row: usize },
    /// Mean over `members` present member values.
    Computed { sheet: String, members: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    pub value: Datum,
    /// Outside the metric's plausible range. Reported, never filtered.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub implausible: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
}

impl Reading {
    pub fn missing(reason: Missing) -> Self {
        Self {
            value: Datum::Missing(reason),
            implausible: false,
            source: None,
        }
    }
}

/// Metric identity plus what a renderer needs to label it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricLabel {
    pub id: MetricId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl MetricLabel {
    pub fn of(def: &MetricDefinition) -> Self {
        Self {
            id: def.id.clone(),
            name: def.display_name.clone(),
            unit: def.unit.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabeledReading {
    /// Entity code or sector label.
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub class: EntityClass,
    #[serde(flatten)]
    pub reading: Reading,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableRow {
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// One reading per result column.
    pub cells: Vec<Reading>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankEntry {
    pub rank: usize,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub value: f64,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub implausible: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreComponent {
    pub metric: MetricLabel,
    pub weight: f64,
}

/// Ties keep the order rows appear in the sheet.
pub const TIE_BREAK: &str = "original row order";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueryResult {
    Scalar {
        subject: String,
        metric: MetricLabel,
        reading: Reading,
    },
    Table {
        title: String,
        columns: Vec<MetricLabel>,
        rows: Vec<TableRow>,
    },
    Ranking {
        metric: MetricLabel,
        class: EntityClass,
        order: RankOrder,
        tie_break: String,
        entries: Vec<RankEntry>,
        /// Candidates left out for lacking a value.
        excluded: usize,
    },
    /// Companies of `sheet` ranked by the weighted sum of `components`.
    CompositeRanking {
        components: Vec<ScoreComponent>,
        sheet: String,
        tie_break: String,
        entries: Vec<RankEntry>,
        /// Companies lacking any component value.
        excluded: usize,
    },
    /// Entries keep the order targets were given in.
    Comparison {
        metric: MetricLabel,
        entries: Vec<LabeledReading>,
    },
    Definition {
        metric: MetricLabel,
        text: String,
    },
    Statistics {
        metric: MetricLabel,
        sheet: String,
        count: usize,
        mean: Option<f64>,
        min: Option<f64>,
        max: Option<f64>,
        top: Vec<RankEntry>,
    },
    NotFound {
        subject: String,
        message: String,
    },
    /// Routing signal: nothing in the grammar fits this text.
    Unrecognized {
        reason: String,
    },
}

impl QueryResult {
    pub fn kind(&self) -> &'static str {
        match self {
            QueryResult::Scalar { .. } => "scalar",
            QueryResult::Table { .. } => "table",
            QueryResult::Ranking { .. } => "ranking",
            QueryResult::CompositeRanking { .. } => "composite_ranking",
            QueryResult::Comparison { .. } => "comparison",
            QueryResult::Definition { .. } => "definition",
            QueryResult::Statistics { .. } => "statistics",
            QueryResult::NotFound { .. } => "not_found",
            QueryResult::Unrecognized { .. } => "unrecognized",
        }
    }

    pub fn is_unrecognized(&self) -> bool {
        matches!(self, QueryResult::Unrecognized { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_values_serialize_with_reason() {
        let reading = Reading::missing(Missing::Pending {
            text: "Results Pending".into(),
        });
        let json = serde_json::to_value(&reading).unwrap();
        assert_eq!(json["value"]["type"], "missing");
        assert_eq!(json["value"]["value"]["reason"], "pending");
        assert_eq!(json["value"]["value"]["text"], "Results Pending");
        assert!(json.get("implausible").is_none());
    }

    #[test]
    fn result_tagged_by_type() {
        let result = QueryResult::Unrecognized {
            reason: "no query shape matched".into(),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["type"], "unrecognized");
        assert_eq!(result.kind(), "unrecognized");
    }
}
