//! `finquery-engine`: schema inference and query evaluation over irregular
//! financial spreadsheets.
//!
//! Pure engine crate: receives pre-loaded cell grids, returns typed results.
//! No CLI or IO dependencies.

pub mod catalog;
pub mod config;
pub mod error;
pub mod executor;
pub mod grid;
pub mod infer;
pub mod intent;
pub mod parser;
pub mod registry;
pub mod resolve;
pub mod result;
pub mod session;
pub mod table;

#[cfg(test)]
mod test_support;

pub use catalog::{Catalog, MetricDefinition, MetricId, ValueKind};
pub use config::{EngineConfig, SectorMetricPolicy};
pub use error::{CatalogError, ConfigError, QueryError, SchemaError};
pub use executor::execute;
pub use grid::{Cell, RawGrid};
pub use infer::infer_table;
pub use intent::Intent;
pub use parser::{parse, ParseOutcome};
pub use registry::TableRegistry;
pub use result::{Datum, Missing, QueryResult, Reading};
pub use session::Session;
pub use table::Table;
