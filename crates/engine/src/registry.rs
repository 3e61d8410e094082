use std::sync::Arc;

use crate::catalog::Catalog;
use crate::config::{QueryConfig, SectorMetricPolicy};
use crate::table::Table;

/// The tables of one session plus everything needed to query them.
///
/// Tables are ordered primary first, then the rest in sheet order. They are
/// shared read-only; nothing here is mutated after construction.
#[derive(Debug, Clone)]
pub struct TableRegistry {
    tables: Vec<Arc<Table>>,
    catalog: Arc<Catalog>,
    query: QueryConfig,
    policy: SectorMetricPolicy,
}

impl TableRegistry {
    pub fn new(
        mut tables: Vec<Table>,
        catalog: Arc<Catalog>,
        query: QueryConfig,
        policy: SectorMetricPolicy,
    ) -> Self {
        if let Some(p) = primary_index(&tables) {
            let primary = tables.remove(p);
            tables.insert(0, primary);
        }
        Self {
            tables: tables.into_iter().map(Arc::new).collect(),
            catalog,
            query,
            policy,
        }
    }

    pub fn tables(&self) -> &[Arc<Table>] {
        &self.tables
    }

    /// Default scope for sector, ranking, range, and summary queries.
    pub fn primary(&self) -> Option<&Table> {
        self.tables.first().map(|t| t.as_ref())
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn query_config(&self) -> &QueryConfig {
        &self.query
    }

    pub fn policy(&self) -> SectorMetricPolicy {
        self.policy
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// First table with category breaks, else the first with a sub-header, else
/// the first table.
fn primary_index(tables: &[Table]) -> Option<usize> {
    tables
        .iter()
        .position(Table::has_categories)
        .or_else(|| tables.iter().position(Table::has_sub_header))
        .or_else(|| (!tables.is_empty()).then_some(0))
}
