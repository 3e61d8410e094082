//! Query executor: evaluates an `Intent` against the session's tables.
//!
//! Absent values are never zero. They are excluded from means, filters, and
//! rankings, and reported in place where a caller asked for them by name.

use std::cmp::Ordering;

use log::debug;
use ordered_float::OrderedFloat;

use crate::catalog::MetricId;
use crate::config::SectorMetricPolicy;
use crate::error::QueryError;
use crate::grid::Cell;
use crate::intent::{
    EntityClass, EntityRef, Intent, MetricRequest, RankOrder, SectorRef, Target, WeightedMetric,
};
use crate::registry::TableRegistry;
use crate::result::{
    Datum, LabeledReading, MetricLabel, Missing, QueryResult, RankEntry, Reading, ScoreComponent,
    Source, TableRow, TIE_BREAK,
};
use crate::table::Table;

pub fn execute(intent: &Intent, registry: &TableRegistry) -> Result<QueryResult, QueryError> {
    if registry.is_empty() {
        return Err(QueryError::NoTables);
    }
    let exec = Executor { registry };
    debug!("executing {}", intent.shape_name());

    Ok(match intent {
        Intent::SingleMetric { metric, entity } => exec.single(metric, entity),
        Intent::DualMetric { metrics, entity } => exec.dual(metrics, entity),
        Intent::SectorMetric { metric, sector } => exec.sector_scalar(metric, sector),
        Intent::Compare { metric, targets } => exec.compare(metric, targets),
        Intent::RangeFilter {
            display,
            filter,
            low,
            high,
            sector,
        } => {
            if low > high {
                return Err(QueryError::InvalidRange {
                    low: *low,
                    high: *high,
                });
            }
            exec.range_filter(display, filter, *low, *high, sector.as_ref())
        }
        Intent::BestOf {
            class,
            metric,
            k,
            order,
        } => {
            if *k == 0 {
                return Err(QueryError::InvalidCount(0));
            }
            exec.best_of(*class, metric, *k, *order)
        }
        Intent::Define { term, metric } => exec.define(term, metric),
        Intent::MetricList { items, entity } => exec.metric_list(items, entity),
        Intent::AllSectors { metric } => exec.all_sectors(metric),
        Intent::Composite { weights, k } => {
            if *k == 0 {
                return Err(QueryError::InvalidCount(0));
            }
            exec.composite(weights, *k)
        }
        Intent::Summary { metric } => exec.summary(metric),
    })
}

/// Sort key for rankings: value, then original position so ties stay stable.
#[derive(Debug, Clone, Copy)]
struct RankKey {
    value: OrderedFloat<f64>,
    original_index: usize,
}

fn rank(candidates: &mut [(RankKey, RankEntry)], order: RankOrder) {
    candidates.sort_by(|(a, _), (b, _)| {
        let by_value = match order {
            RankOrder::Descending => b.value.cmp(&a.value),
            RankOrder::Ascending => a.value.cmp(&b.value),
        };
        match by_value {
            Ordering::Equal => a.original_index.cmp(&b.original_index),
            other => other,
        }
    });
}

struct Executor<'a> {
    registry: &'a TableRegistry,
}

impl<'a> Executor<'a> {
    fn label(&self, metric: &MetricId) -> MetricLabel {
        match self.registry.catalog().get(metric) {
            Some(def) => MetricLabel::of(def),
            None => MetricLabel {
                id: metric.clone(),
                name: metric.to_string(),
                unit: None,
            },
        }
    }

    fn tables(&self) -> impl Iterator<Item = &'a Table> {
        self.registry.tables().iter().map(|t| t.as_ref())
    }

    /// First table, in registry order, carrying the metric.
    fn table_with(&self, metric: &MetricId) -> Option<&'a Table> {
        self.tables().find(|t| t.has_metric(metric))
    }

    fn reading_from_cell(&self, metric: &MetricId, cell: &Cell, source: Source) -> Reading {
        let value = match cell {
            Cell::Number(n) => Datum::Number(*n),
            Cell::Text(s) => Datum::Text(s.clone()),
            Cell::Placeholder(text) => Datum::Missing(Missing::Pending { text: text.clone() }),
            Cell::Empty => Datum::Missing(Missing::NoData),
        };
        self.reading(metric, value, Some(source))
    }

    fn reading(&self, metric: &MetricId, value: Datum, source: Option<Source>) -> Reading {
        let implausible = value
            .as_number()
            .is_some_and(|v| self.registry.catalog().is_implausible(metric, v));
        Reading {
            value,
            implausible,
            source,
        }
    }

    // -----------------------------------------------------------------------
    // Point lookups
    // -----------------------------------------------------------------------

    /// Value of `metric` for entity `code`: the first table that has the
    /// metric and lists the entity answers.
    fn lookup(&self, code: &str, metric: &MetricId) -> (Reading, Option<String>) {
        self.lookup_in(code, metric, None)
    }

    /// As `lookup`, limited to the named sheet when one is given.
    fn lookup_in(&self, code: &str, metric: &MetricId, sheet: Option<&str>) -> (Reading, Option<String>) {
        let mut has_metric = false;
        let scoped = self
            .tables()
            .filter(|t| sheet.map_or(true, |s| t.sheet.eq_ignore_ascii_case(s)));
        for table in scoped {
            let Some(col) = table.primary_column(metric) else {
                continue;
            };
            has_metric = true;
            let Some(row) = table.find_entity(code) else {
                continue;
            };
            let row = &table.rows[row];
            let source = Source::Cell {
                sheet: table.sheet.clone(),
                row: row.source_row + 1,
                column: table.columns[col].label.clone(),
            };
            let name = row.display_name().map(str::to_string);
            return (self.reading_from_cell(metric, row.value(col), source), name);
        }
        let reason = if has_metric {
            Missing::NotListed
        } else {
            Missing::NotAvailable
        };
        (Reading::missing(reason), self.entity_name(code))
    }

    fn entity_name(&self, code: &str) -> Option<String> {
        self.tables().find_map(|t| {
            t.find_entity(code)
                .and_then(|r| t.rows[r].display_name().map(str::to_string))
        })
    }

    fn single(&self, metric: &MetricId, entity: &EntityRef) -> QueryResult {
        let (reading, _) = self.lookup(&entity.code, metric);
        QueryResult::Scalar {
            subject: entity.code.clone(),
            metric: self.label(metric),
            reading,
        }
    }

    fn dual(&self, metrics: &[MetricId; 2], entity: &EntityRef) -> QueryResult {
        let cells = metrics.iter().map(|m| self.lookup(&entity.code, m).0).collect();
        QueryResult::Table {
            title: entity.code.clone(),
            columns: metrics.iter().map(|m| self.label(m)).collect(),
            rows: vec![TableRow {
                label: entity.code.clone(),
                name: self.entity_name(&entity.code),
                cells,
            }],
        }
    }

    fn metric_list(&self, items: &[MetricRequest], entity: &EntityRef) -> QueryResult {
        let cells = items
            .iter()
            .map(|i| self.lookup_in(&entity.code, &i.metric, i.sheet.as_deref()).0)
            .collect();
        QueryResult::Table {
            title: entity.code.clone(),
            columns: items.iter().map(|i| self.label(&i.metric)).collect(),
            rows: vec![TableRow {
                label: entity.code.clone(),
                name: self.entity_name(&entity.code),
                cells,
            }],
        }
    }

    // -----------------------------------------------------------------------
    // Sector aggregation
    // -----------------------------------------------------------------------

    /// Sector value within one table. The category row's own value is used
    /// when the policy allows it, the metric is carried on category rows, and
    /// the cell holds a number; otherwise the mean of member values.
    fn sector_in(&self, table: &Table, category: usize, metric: &MetricId, col: usize) -> Reading {
        let carried = self
            .registry
            .catalog()
            .get(metric)
            .is_some_and(|d| d.category_level);

        if self.registry.policy() == SectorMetricPolicy::PreferCategoryRow && carried {
            if let Some(cat) = table.categories.get(category) {
                let row = &table.rows[cat.row];
                if let Cell::Number(n) = row.value(col) {
                    return self.reading(
                        metric,
                        Datum::Number(*n),
                        Some(Source::CategoryRow {
                            sheet: table.sheet.clone(),
                            row: row.source_row + 1,
                        }),
                    );
                }
            }
        }

        let values: Vec<f64> = table
            .members(category)
            .filter_map(|(_, r)| r.value(col).as_number())
            .collect();
        if values.is_empty() {
            return Reading::missing(Missing::NoData);
        }
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        self.reading(
            metric,
            Datum::Number(mean),
            Some(Source::Computed {
                sheet: table.sheet.clone(),
                members: values.len(),
            }),
        )
    }

    fn sector_reading(&self, label: &str, metric: &MetricId) -> Reading {
        let mut has_metric = false;
        for table in self.tables() {
            let Some(col) = table.primary_column(metric) else {
                continue;
            };
            has_metric = true;
            if let Some(cat) = table.find_category(label) {
                return self.sector_in(table, cat, metric, col);
            }
        }
        Reading::missing(if has_metric {
            Missing::NotListed
        } else {
            Missing::NotAvailable
        })
    }

    fn sector_scalar(&self, metric: &MetricId, sector: &SectorRef) -> QueryResult {
        QueryResult::Scalar {
            subject: sector.label.clone(),
            metric: self.label(metric),
            reading: self.sector_reading(&sector.label, metric),
        }
    }

    fn all_sectors(&self, metric: &MetricId) -> QueryResult {
        let Some(table) = self.tables().find(|t| t.has_categories()) else {
            return QueryResult::NotFound {
                subject: "sectors".into(),
                message: "no sheet has sector breaks".into(),
            };
        };
        let col = table.primary_column(metric);
        let rows = table
            .categories
            .iter()
            .enumerate()
            .map(|(i, cat)| TableRow {
                label: cat.label.clone(),
                name: None,
                cells: vec![match col {
                    Some(col) => self.sector_in(table, i, metric, col),
                    None => Reading::missing(Missing::NotAvailable),
                }],
            })
            .collect();
        QueryResult::Table {
            title: format!("{} by sector", self.label(metric).name),
            columns: vec![self.label(metric)],
            rows,
        }
    }

    // -----------------------------------------------------------------------
    // Comparison, filtering, ranking
    // -----------------------------------------------------------------------

    fn compare(&self, metric: &MetricId, targets: &[Target]) -> QueryResult {
        let entries = targets
            .iter()
            .map(|t| match t {
                Target::Entity(e) => {
                    let (reading, name) = self.lookup(&e.code, metric);
                    LabeledReading {
                        label: e.code.clone(),
                        name,
                        class: EntityClass::Stock,
                        reading,
                    }
                }
                Target::Sector(s) => LabeledReading {
                    label: s.label.clone(),
                    name: None,
                    class: EntityClass::Sector,
                    reading: self.sector_reading(&s.label, metric),
                },
            })
            .collect();
        QueryResult::Comparison {
            metric: self.label(metric),
            entries,
        }
    }

    fn range_filter(
        &self,
        display: &MetricId,
        filter: &MetricId,
        low: f64,
        high: f64,
        sector: Option<&SectorRef>,
    ) -> QueryResult {
        // Scan the first table carrying the filter metric (and the sector, when
        // scoped); display values may come from any sheet.
        let scope = self.tables().find_map(|t| {
            let col = t.primary_column(filter)?;
            match sector {
                Some(s) => t.find_category(&s.label).map(|c| (t, col, Some(c))),
                None => Some((t, col, None)),
            }
        });

        let title = format!(
            "{} where {} between {} and {}",
            self.label(display).name,
            self.label(filter).name,
            low,
            high
        );
        let Some((table, col, category)) = scope else {
            return QueryResult::NotFound {
                subject: self.label(filter).name,
                message: match sector {
                    Some(s) => format!("no sheet has this metric for sector {}", s.label),
                    None => "no sheet has this metric".into(),
                },
            };
        };

        let rows = table
            .entities()
            .filter(|(i, _)| category.is_none() || table.category_of(*i) == category)
            .filter_map(|(_, row)| {
                let v = row.value(col).as_number()?;
                if v < low || v > high {
                    return None;
                }
                let code = row.code()?;
                let filter_reading = self.reading(
                    filter,
                    Datum::Number(v),
                    Some(Source::Cell {
                        sheet: table.sheet.clone(),
                        row: row.source_row + 1,
                        column: table.columns[col].label.clone(),
                    }),
                );
                Some(TableRow {
                    label: code.to_string(),
                    name: row.display_name().map(str::to_string),
                    cells: vec![self.lookup(code, display).0, filter_reading],
                })
            })
            .collect();

        QueryResult::Table {
            title,
            columns: vec![self.label(display), self.label(filter)],
            rows,
        }
    }

    fn best_of(&self, class: EntityClass, metric: &MetricId, k: usize, order: RankOrder) -> QueryResult {
        let mut candidates: Vec<(RankKey, RankEntry)> = Vec::new();
        let mut excluded = 0;

        match class {
            EntityClass::Stock => {
                if let Some(table) = self.table_with(metric) {
                    let col = table.primary_column(metric).unwrap_or_default();
                    for (i, row) in table.entities() {
                        let (Some(v), Some(code)) = (row.value(col).as_number(), row.code()) else {
                            excluded += 1;
                            continue;
                        };
                        candidates.push(self.candidate(metric, i, code, row.display_name(), v));
                    }
                }
            }
            EntityClass::Sector => {
                let table = self
                    .tables()
                    .find(|t| t.has_categories() && t.has_metric(metric));
                if let Some(table) = table {
                    let col = table.primary_column(metric).unwrap_or_default();
                    for (i, cat) in table.categories.iter().enumerate() {
                        match self.sector_in(table, i, metric, col).value.as_number() {
                            Some(v) => candidates.push(self.candidate(metric, i, &cat.label, None, v)),
                            None => excluded += 1,
                        }
                    }
                }
            }
        }

        rank(&mut candidates, order);
        let entries = candidates
            .into_iter()
            .take(k)
            .enumerate()
            .map(|(i, (_, mut e))| {
                e.rank = i + 1;
                e
            })
            .collect();

        QueryResult::Ranking {
            metric: self.label(metric),
            class,
            order,
            tie_break: TIE_BREAK.to_string(),
            entries,
            excluded,
        }
    }

    /// Companies of the primary table scored by `weights`. A company missing
    /// any component is left out and counted, never scored as zero.
    fn composite(&self, weights: &[WeightedMetric], k: usize) -> QueryResult {
        let Some(table) = self.registry.primary() else {
            return QueryResult::NotFound {
                subject: "stocks".into(),
                message: "no sheet lists companies".into(),
            };
        };

        let mut candidates: Vec<(RankKey, RankEntry)> = Vec::new();
        let mut excluded = 0;
        for (i, row) in table.entities() {
            let Some(code) = row.code() else {
                excluded += 1;
                continue;
            };
            let score = weights.iter().try_fold(0.0, |acc, w| {
                let value = self.lookup(code, &w.metric).0.value.as_number()?;
                Some(acc + w.weight * value)
            });
            let Some(score) = score else {
                debug!("composite: {code} lacks a component value");
                excluded += 1;
                continue;
            };
            candidates.push((
                RankKey {
                    value: OrderedFloat(score),
                    original_index: i,
                },
                RankEntry {
                    rank: 0,
                    label: code.to_string(),
                    name: row.display_name().map(str::to_string),
                    value: score,
                    implausible: false,
                },
            ));
        }

        rank(&mut candidates, RankOrder::Descending);
        let entries = candidates
            .into_iter()
            .take(k)
            .enumerate()
            .map(|(i, (_, mut e))| {
                e.rank = i + 1;
                e
            })
            .collect();

        QueryResult::CompositeRanking {
            components: weights
                .iter()
                .map(|w| ScoreComponent {
                    metric: self.label(&w.metric),
                    weight: w.weight,
                })
                .collect(),
            sheet: table.sheet.clone(),
            tie_break: TIE_BREAK.to_string(),
            entries,
            excluded,
        }
    }

    fn candidate(
        &self,
        metric: &MetricId,
        index: usize,
        label: &str,
        name: Option<&str>,
        value: f64,
    ) -> (RankKey, RankEntry) {
        (
            RankKey {
                value: OrderedFloat(value),
                original_index: index,
            },
            RankEntry {
                rank: 0,
                label: label.to_string(),
                name: name.map(str::to_string),
                value,
                implausible: self.registry.catalog().is_implausible(metric, value),
            },
        )
    }

    // -----------------------------------------------------------------------
    // Definitions and summaries
    // -----------------------------------------------------------------------

    fn define(&self, term: &str, metric: &MetricId) -> QueryResult {
        match self.registry.catalog().definition_of(metric) {
            Ok(text) => QueryResult::Definition {
                metric: self.label(metric),
                text: text.to_string(),
            },
            Err(_) => QueryResult::NotFound {
                subject: term.to_string(),
                message: format!("no definition for '{term}'"),
            },
        }
    }

    fn summary(&self, metric: &MetricId) -> QueryResult {
        let Some(table) = self.table_with(metric) else {
            return QueryResult::NotFound {
                subject: self.label(metric).name,
                message: "no sheet has this metric".into(),
            };
        };
        let col = table.primary_column(metric).unwrap_or_default();

        let mut candidates: Vec<(RankKey, RankEntry)> = table
            .entities()
            .filter_map(|(i, row)| {
                let v = row.value(col).as_number()?;
                Some(self.candidate(metric, i, row.code()?, row.display_name(), v))
            })
            .collect();

        let values: Vec<f64> = candidates.iter().map(|(_, e)| e.value).collect();
        let count = values.len();
        let mean = (count > 0).then(|| values.iter().sum::<f64>() / count as f64);
        let min = values.iter().copied().map(OrderedFloat).min().map(|v| v.0);
        let max = values.iter().copied().map(OrderedFloat).max().map(|v| v.0);

        rank(&mut candidates, RankOrder::Descending);
        let top = candidates
            .into_iter()
            .take(self.registry.query_config().summary_top)
            .enumerate()
            .map(|(i, (_, mut e))| {
                e.rank = i + 1;
                e
            })
            .collect();

        QueryResult::Statistics {
            metric: self.label(metric),
            sheet: table.sheet.clone(),
            count,
            mean,
            min,
            max,
            top,
        }
    }
}
