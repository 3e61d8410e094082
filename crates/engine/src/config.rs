use std::collections::BTreeMap;

use serde::Deserialize;

use crate::catalog::{Catalog, ValueKind};
use crate::error::ConfigError;
use crate::grid::DEFAULT_PLACEHOLDERS;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Engine settings. Every field has a default, so an empty document (or no
/// config file at all) yields a working configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub inference: InferenceConfig,
    pub aggregation: AggregationConfig,
    pub query: QueryConfig,
    pub catalog: CatalogOverrides,
}

// ---------------------------------------------------------------------------
// Inference
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InferenceConfig {
    /// Lookahead window for the header row.
    pub header_scan_rows: usize,
    /// Fraction of a row's non-empty cells that must resolve as metrics.
    pub header_match_ratio: f64,
    pub min_header_cells: usize,
    /// Fraction of non-marker columns that must be empty on a category row.
    pub category_empty_ratio: f64,
    pub placeholders: Vec<String>,
    /// A data row whose first non-empty cell starts with one of these ends
    /// the table.
    pub stop_markers: Vec<String>,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            header_scan_rows: 10,
            header_match_ratio: 0.5,
            min_header_cells: 2,
            category_empty_ratio: 0.75,
            placeholders: DEFAULT_PLACEHOLDERS.iter().map(|s| s.to_string()).collect(),
            stop_markers: vec!["glossary".into(), "notes".into(), "definitions".into()],
        }
    }
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AggregationConfig {
    pub sector_metric: SectorMetricPolicy,
}

/// How a sector-level value is obtained. Fixed for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SectorMetricPolicy {
    /// Use the category row's own value when the metric is carried on category
    /// rows and the cell is filled; otherwise average the members.
    #[default]
    PreferCategoryRow,
    /// Always average the members.
    AlwaysCompute,
}

impl std::fmt::Display for SectorMetricPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PreferCategoryRow => write!(f, "prefer_category_row"),
            Self::AlwaysCompute => write!(f, "always_compute"),
        }
    }
}

// ---------------------------------------------------------------------------
// Query
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QueryConfig {
    /// Metric used by `compare stocks A, B` when no `by` clause is given.
    pub default_compare_metric: String,
    pub best_of_default_k: usize,
    /// Number of leaders listed by the summary shape.
    pub summary_top: usize,
    /// Entries listed by `lowest <metric>`, `highest <metric>`,
    /// `best <metric>` and `best stock`.
    pub leaderboard_size: usize,
    /// Weighted metrics behind `best stock` when no metric is named. A
    /// negative weight counts against the score.
    pub composite: Vec<CompositeWeight>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, serde::Serialize)]
#[serde(deny_unknown_fields)]
pub struct CompositeWeight {
    pub metric: String,
    pub weight: f64,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_compare_metric: "pe".into(),
            best_of_default_k: 1,
            summary_top: 5,
            leaderboard_size: 3,
            composite: [("pe", 0.4), ("div_yield", 0.3), ("pbv", -0.2)]
                .into_iter()
                .map(|(metric, weight)| CompositeWeight {
                    metric: metric.into(),
                    weight,
                })
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Catalog overrides
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CatalogOverrides {
    /// Extra aliases keyed by an existing canonical id.
    pub aliases: BTreeMap<String, Vec<String>>,
    pub metrics: Vec<MetricSpec>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricSpec {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    pub kind: ValueKind,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub range: Option<[f64; 2]>,
    #[serde(default)]
    pub definition: Option<String>,
    #[serde(default)]
    pub category_level: bool,
    #[serde(default)]
    pub lower_is_better: bool,
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl EngineConfig {
    pub fn from_toml(input: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig =
            toml::from_str(input).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// The metric catalog this configuration describes.
    pub fn build_catalog(&self) -> Result<Catalog, ConfigError> {
        Ok(Catalog::with_overrides(&self.catalog)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let inf = &self.inference;

        if inf.header_scan_rows == 0 {
            return Err(ConfigError::Validation(
                "inference.header_scan_rows must be at least 1".into(),
            ));
        }

        for (name, value) in [
            ("header_match_ratio", inf.header_match_ratio),
            ("category_empty_ratio", inf.category_empty_ratio),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(ConfigError::Validation(format!(
                    "inference.{name} must be in (0, 1], got {value}"
                )));
            }
        }

        if inf.min_header_cells == 0 {
            return Err(ConfigError::Validation(
                "inference.min_header_cells must be at least 1".into(),
            ));
        }

        if self.query.best_of_default_k == 0 {
            return Err(ConfigError::Validation(
                "query.best_of_default_k must be at least 1".into(),
            ));
        }

        if self.query.leaderboard_size == 0 {
            return Err(ConfigError::Validation(
                "query.leaderboard_size must be at least 1".into(),
            ));
        }

        if self.query.composite.is_empty() {
            return Err(ConfigError::Validation(
                "query.composite needs at least one weighted metric".into(),
            ));
        }

        for spec in &self.catalog.metrics {
            if let Some([lo, hi]) = spec.range {
                if lo > hi {
                    return Err(ConfigError::Validation(format!(
                        "catalog metric '{}': range low {lo} exceeds high {hi}",
                        spec.id
                    )));
                }
            }
        }

        // Overrides must keep aliases unique, and the compare default and
        // composite weights must name real metrics.
        let catalog = self.build_catalog()?;
        let is_metric = |term: &str| {
            matches!(catalog.resolve_term(term), Ok(Some(def)) if !def.is_identity())
        };
        if !is_metric(&self.query.default_compare_metric) {
            return Err(ConfigError::Validation(format!(
                "query.default_compare_metric '{}' is not a known metric",
                self.query.default_compare_metric
            )));
        }
        for w in &self.query.composite {
            if !is_metric(&w.metric) {
                return Err(ConfigError::Validation(format!(
                    "query.composite metric '{}' is not a known metric",
                    w.metric
                )));
            }
            if !w.weight.is_finite() {
                return Err(ConfigError::Validation(format!(
                    "query.composite weight for '{}' must be a finite number",
                    w.metric
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
