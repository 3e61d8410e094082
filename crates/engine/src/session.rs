//! One loaded workbook and everything derived from it.
//!
//! Ingestion is the only write phase: every sheet's table is inferred before
//! the session exists, and nothing is mutated afterwards. Queries take `&self`
//! and can run concurrently against a shared session.

use std::sync::Arc;

use log::{info, warn};
use serde::Serialize;

use crate::catalog::Catalog;
use crate::config::EngineConfig;
use crate::error::{ConfigError, QueryError, SchemaError};
use crate::executor::execute;
use crate::grid::RawGrid;
use crate::infer::infer_table;
use crate::parser::{parse, ParseOutcome};
use crate::registry::TableRegistry;
use crate::result::QueryResult;
use crate::table::Table;

#[derive(Debug, Clone, Serialize)]
pub struct SessionMeta {
    pub engine_version: String,
    pub loaded_at: String,
    pub sheets_seen: usize,
}

#[derive(Debug, Clone)]
pub struct Session {
    registry: TableRegistry,
    schema_errors: Vec<SchemaError>,
    meta: SessionMeta,
}

impl Session {
    /// Infer a table for every grid. Sheets without a usable header are
    /// recorded and skipped; the session keeps the rest.
    pub fn ingest(grids: &[RawGrid], config: &EngineConfig) -> Result<Self, ConfigError> {
        let catalog = config.build_catalog()?;
        Ok(Self::with_catalog(grids, config, catalog))
    }

    pub fn with_catalog(grids: &[RawGrid], config: &EngineConfig, catalog: Catalog) -> Self {
        let mut tables = Vec::new();
        let mut schema_errors = Vec::new();

        for grid in grids {
            match infer_table(grid, &catalog, &config.inference) {
                Ok(table) => tables.push(table),
                Err(err) => {
                    warn!("{err}");
                    schema_errors.push(err);
                }
            }
        }

        info!(
            "session: {} of {} sheet(s) usable, sector policy {}",
            tables.len(),
            grids.len(),
            config.aggregation.sector_metric
        );

        let registry = TableRegistry::new(
            tables,
            Arc::new(catalog),
            config.query.clone(),
            config.aggregation.sector_metric,
        );

        Self {
            registry,
            schema_errors,
            meta: SessionMeta {
                engine_version: env!("CARGO_PKG_VERSION").to_string(),
                loaded_at: chrono::Utc::now().to_rfc3339(),
                sheets_seen: grids.len(),
            },
        }
    }

    /// Parse and execute one query. Text no shape recognizes comes back as
    /// `QueryResult::Unrecognized`, not as an error.
    pub fn handle_query(&self, text: &str) -> Result<QueryResult, QueryError> {
        if self.registry.is_empty() {
            return Err(QueryError::NoTables);
        }
        match parse(text, &self.registry)? {
            ParseOutcome::Recognized(intent) => execute(&intent, &self.registry),
            ParseOutcome::Unrecognized { reason } => Ok(QueryResult::Unrecognized { reason }),
        }
    }

    pub fn registry(&self) -> &TableRegistry {
        &self.registry
    }

    /// Tables in query order: primary first.
    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.registry.tables().iter().map(|t| t.as_ref())
    }

    pub fn catalog(&self) -> &Catalog {
        self.registry.catalog()
    }

    pub fn schema_errors(&self) -> &[SchemaError] {
        &self.schema_errors
    }

    /// Every sheet failed header inference.
    pub fn is_unusable(&self) -> bool {
        self.registry.is_empty()
    }

    pub fn meta(&self) -> &SessionMeta {
        &self.meta
    }
}
