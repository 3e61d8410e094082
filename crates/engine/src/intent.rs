//! Parsed query intents. One variant per query shape, each carrying only the
//! fields its shape needs. Terms are already resolved to canonical ids.

use serde::Serialize;

use crate::catalog::MetricId;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityRef {
    /// The text as written in the query.
    pub token: String,
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectorRef {
    pub token: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Target {
    Entity(EntityRef),
    Sector(SectorRef),
}

impl Target {
    /// Canonical name: the entity code or the sector label.
    pub fn label(&self) -> &str {
        match self {
            Target::Entity(e) => &e.code,
            Target::Sector(s) => &s.label,
        }
    }

    fn same_as(&self, other: &Target) -> bool {
        match (self, other) {
            (Target::Entity(a), Target::Entity(b)) => a.code.eq_ignore_ascii_case(&b.code),
            (Target::Sector(a), Target::Sector(b)) => a.label.eq_ignore_ascii_case(&b.label),
            _ => false,
        }
    }

    /// First target that repeats an earlier one.
    pub fn find_duplicate(targets: &[Target]) -> Option<&Target> {
        targets
            .iter()
            .enumerate()
            .find(|(i, t)| targets[..*i].iter().any(|p| p.same_as(t)))
            .map(|(_, t)| t)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityClass {
    Stock,
    Sector,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RankOrder {
    Descending,
    Ascending,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum Intent {
    SingleMetric {
        metric: MetricId,
        entity: EntityRef,
    },
    DualMetric {
        metrics: [MetricId; 2],
        entity: EntityRef,
    },
    SectorMetric {
        metric: MetricId,
        sector: SectorRef,
    },
    /// Targets keep query order.
    Compare {
        metric: MetricId,
        targets: Vec<Target>,
    },
    RangeFilter {
        display: MetricId,
        filter: MetricId,
        low: f64,
        high: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        sector: Option<SectorRef>,
    },
    BestOf {
        class: EntityClass,
        metric: MetricId,
        k: usize,
        order: RankOrder,
    },
    Define {
        term: String,
        metric: MetricId,
    },
    /// Several metrics for one company, each optionally pinned to a sheet.
    MetricList {
        items: Vec<MetricRequest>,
        entity: EntityRef,
    },
    AllSectors {
        metric: MetricId,
    },
    /// Companies ranked by a weighted score over the configured metrics.
    Composite {
        weights: Vec<WeightedMetric>,
        k: usize,
    },
    Summary {
        metric: MetricId,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeightedMetric {
    pub metric: MetricId,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricRequest {
    pub metric: MetricId,
    /// Sheet name as loaded; `None` searches every table.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sheet: Option<String>,
}

impl Intent {
    pub fn shape_name(&self) -> &'static str {
        match self {
            Intent::SingleMetric { .. } => "single_metric",
            Intent::DualMetric { .. } => "dual_metric",
            Intent::SectorMetric { .. } => "sector_metric",
            Intent::Compare { .. } => "compare",
            Intent::RangeFilter { .. } => "range_filter",
            Intent::BestOf { .. } => "best_of",
            Intent::Define { .. } => "define",
            Intent::MetricList { .. } => "metric_list",
            Intent::AllSectors { .. } => "all_sectors",
            Intent::Composite { .. } => "composite",
            Intent::Summary { .. } => "summary",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(code: &str) -> Target {
        Target::Entity(EntityRef {
            token: code.to_lowercase(),
            code: code.into(),
        })
    }

    #[test]
    fn duplicates_compare_canonical_names() {
        let targets = vec![entity("ALLI"), entity("COMB"), entity("alli")];
        assert_eq!(Target::find_duplicate(&targets).map(Target::label), Some("alli"));

        let sector = Target::Sector(SectorRef {
            token: "alli".into(),
            label: "ALLI".into(),
        });
        assert!(Target::find_duplicate(&[entity("ALLI"), sector]).is_none());
    }

    #[test]
    fn intents_serialize_with_shape_tag() {
        let intent = Intent::BestOf {
            class: EntityClass::Sector,
            metric: MetricId::new("roe"),
            k: 1,
            order: RankOrder::Descending,
        };
        let json = serde_json::to_value(&intent).unwrap();
        assert_eq!(json["shape"], "best_of");
        assert_eq!(json["class"], "sector");
        assert_eq!(json["metric"], "roe");
    }
}
