use std::fmt;

/// Header inference failed for one sheet. Fatal for that sheet only.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaError {
    pub sheet: String,
    pub reason: String,
}

impl SchemaError {
    pub fn new(sheet: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            sheet: sheet.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sheet '{}': {}", self.sheet, self.reason)
    }
}

impl std::error::Error for SchemaError {}

#[derive(Debug, Clone, PartialEq)]
pub enum CatalogError {
    /// No definition for a term or canonical id.
    NotFound(String),
    /// Two metrics claim the same normalized alias.
    DuplicateAlias {
        alias: String,
        first: String,
        second: String,
    },
    /// Canonical id registered twice.
    DuplicateId(String),
    /// A term matched aliases of more than one metric at the same tier.
    AmbiguousAlias { term: String, candidates: Vec<String> },
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(term) => write!(f, "no metric definition for '{term}'"),
            Self::DuplicateAlias { alias, first, second } => {
                write!(f, "alias '{alias}' claimed by both '{first}' and '{second}'")
            }
            Self::DuplicateId(id) => write!(f, "metric id '{id}' defined twice"),
            Self::AmbiguousAlias { term, candidates } => {
                write!(f, "'{term}' matches several metrics: {}", candidates.join(", "))
            }
        }
    }
}

impl std::error::Error for CatalogError {}

/// Structural and input errors surfaced to the caller as distinct outcomes.
///
/// Missing data is not an error: it travels inside a successful result.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryError {
    AmbiguousEntity { token: String, candidates: Vec<String> },
    AmbiguousSector { token: String, candidates: Vec<String> },
    AmbiguousAlias { term: String, candidates: Vec<String> },
    /// Range filter with low > high. Never silently swapped.
    InvalidRange { low: f64, high: f64 },
    /// The same target named twice in one comparison.
    DuplicateTarget(String),
    /// A ranking asked for zero entries.
    InvalidCount(usize),
    /// The session holds no usable table.
    NoTables,
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AmbiguousEntity { token, candidates } => {
                write!(f, "'{token}' matches several companies: {}", candidates.join(", "))
            }
            Self::AmbiguousSector { token, candidates } => {
                write!(f, "'{token}' matches several sectors: {}", candidates.join(", "))
            }
            Self::AmbiguousAlias { term, candidates } => {
                write!(f, "'{term}' matches several metrics: {}", candidates.join(", "))
            }
            Self::InvalidRange { low, high } => {
                write!(f, "invalid range: low {low} is greater than high {high}")
            }
            Self::DuplicateTarget(token) => write!(f, "'{token}' appears more than once"),
            Self::InvalidCount(k) => write!(f, "cannot rank {k} entries"),
            Self::NoTables => write!(f, "no sheet produced a usable table"),
        }
    }
}

impl std::error::Error for QueryError {}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// TOML parse / deserialization error.
    Parse(String),
    /// Config validation error.
    Validation(String),
    /// Catalog overrides broke alias uniqueness.
    Catalog(CatalogError),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(msg) => write!(f, "config parse error: {msg}"),
            Self::Validation(msg) => write!(f, "config validation error: {msg}"),
            Self::Catalog(err) => write!(f, "catalog override error: {err}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<CatalogError> for ConfigError {
    fn from(err: CatalogError) -> Self {
        ConfigError::Catalog(err)
    }
}
