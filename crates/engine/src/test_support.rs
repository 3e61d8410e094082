//! Sample workbook shared by unit tests: two simple sheets and one
//! multi-header sheet with sector breaks, read from `tests/fixtures`.

use std::sync::Arc;

use crate::catalog::Catalog;
use crate::config::{EngineConfig, SectorMetricPolicy};
use crate::grid::{RawGrid, DEFAULT_PLACEHOLDERS};
use crate::infer::infer_table;
use crate::registry::TableRegistry;

const MARKET: &str = include_str!("../tests/fixtures/market.csv");
const FUNDAMENTALS: &str = include_str!("../tests/fixtures/fundamentals.csv");
const SECTORS: &str = include_str!("../tests/fixtures/sectors.csv");

pub(crate) fn grid_from_csv(name: &str, text: &str) -> RawGrid {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());
    let rows: Vec<Vec<String>> = reader
        .records()
        .map(|r| r.unwrap().iter().map(str::to_string).collect())
        .collect();
    RawGrid::from_strings(name, &rows, DEFAULT_PLACEHOLDERS)
}

pub(crate) fn sample_grids() -> Vec<RawGrid> {
    vec![
        grid_from_csv("Market", MARKET),
        grid_from_csv("Fundamentals", FUNDAMENTALS),
        grid_from_csv("Sectors", SECTORS),
    ]
}

pub(crate) fn registry_with(policy: SectorMetricPolicy) -> TableRegistry {
    let config = EngineConfig::default();
    let catalog = Catalog::builtin();
    let tables = sample_grids()
        .iter()
        .map(|g| infer_table(g, &catalog, &config.inference).unwrap())
        .collect();
    TableRegistry::new(tables, Arc::new(catalog), config.query, policy)
}

pub(crate) fn sample_registry() -> TableRegistry {
    registry_with(SectorMetricPolicy::PreferCategoryRow)
}
