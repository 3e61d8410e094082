//! Metric Catalog: canonical metric names, aliases, value kinds, plausible
//! ranges, and definitions.
//!
//! Alias resolution is tiered. An exact match on the normalized form wins;
//! otherwise the longest alias found as a whole-token run inside the text wins.
//! Two different metrics tying for the longest run is an `AmbiguousAlias`.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::config::CatalogOverrides;
use crate::error::CatalogError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricId(String);

impl MetricId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MetricId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Ratio,
    Currency,
    Percentage,
    Count,
    Text,
}

/// Identity fields are catalog entries too, so header binding treats them
/// uniformly; they mark which columns name a row rather than measure it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityField {
    Code,
    Name,
    Sector,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricDefinition {
    pub id: MetricId,
    pub display_name: String,
    pub aliases: Vec<String>,
    pub kind: ValueKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<(f64, f64)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<IdentityField>,
    /// Carried by category (sector) break rows as well as company rows.
    pub category_level: bool,
    /// A low value is the good end: valuation multiples, share counts.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub lower_is_better: bool,
}

impl MetricDefinition {
    pub fn is_identity(&self) -> bool {
        self.identity.is_some()
    }
}

/// Built-in metrics ranked ascending when a query asks for the "best" value.
const LOWER_IS_BETTER: &[&str] = &["pe", "pbv", "issued_qty"];

struct Builtin {
    id: &'static str,
    name: &'static str,
    kind: ValueKind,
    unit: Option<&'static str>,
    range: Option<(f64, f64)>,
    category_level: bool,
    identity: Option<IdentityField>,
    aliases: &'static [&'static str],
    definition: Option<&'static str>,
}

const BUILTIN: &[Builtin] = &[
    Builtin {
        id: "code",
        name: "Code",
        kind: ValueKind::Text,
        unit: None,
        range: None,
        category_level: true,
        identity: Some(IdentityField::Code),
        aliases: &["code", "stock code", "company code", "ticker", "symbol"],
        definition: None,
    },
    Builtin {
        id: "company",
        name: "Company",
        kind: ValueKind::Text,
        unit: None,
        range: None,
        category_level: false,
        identity: Some(IdentityField::Name),
        aliases: &["company", "company name", "name", "entity"],
        definition: None,
    },
    Builtin {
        id: "sector",
        name: "Sector",
        kind: ValueKind::Text,
        unit: None,
        range: None,
        category_level: true,
        identity: Some(IdentityField::Sector),
        aliases: &["sector", "sector name", "category", "industry"],
        definition: None,
    },
    Builtin {
        id: "price",
        name: "C.Price",
        kind: ValueKind::Currency,
        unit: Some("LKR"),
        range: Some((0.0, 100_000.0)),
        category_level: false,
        identity: None,
        aliases: &["c.price", "closing price", "close price", "price", "market price"],
        definition: Some(
            "Closing price: the last traded price of one share at the end of the trading session.",
        ),
    },
    Builtin {
        id: "pe",
        name: "P/E",
        kind: ValueKind::Ratio,
        unit: Some("x"),
        range: Some((0.0, 100.0)),
        category_level: true,
        identity: None,
        aliases: &["p/e", "pe ratio", "p/e ratio", "price earnings", "price to earnings", "per"],
        definition: Some(
            "Price-to-Earnings ratio: share price divided by earnings per share. Shows how many \
             years of current earnings the market is paying for; lower values are usually cheaper.",
        ),
    },
    Builtin {
        id: "pbv",
        name: "PBV",
        kind: ValueKind::Ratio,
        unit: Some("x"),
        range: Some((0.0, 20.0)),
        category_level: true,
        identity: None,
        aliases: &["pbv", "p/bv", "price to book", "price/book", "p/b", "price to book value"],
        definition: Some(
            "Price-to-Book Value: share price divided by net asset value per share. Below 1 means \
             the market values the company under its book equity.",
        ),
    },
    Builtin {
        id: "div_yield",
        name: "Div Yield",
        kind: ValueKind::Percentage,
        unit: Some("%"),
        range: Some((0.0, 30.0)),
        category_level: true,
        identity: None,
        aliases: &["div yield", "dividend yield", "dy", "dy %", "div yield %", "yield"],
        definition: Some(
            "Dividend Yield: dividends per share over the last twelve months divided by the share \
             price, as a percentage.",
        ),
    },
    Builtin {
        id: "revenue_3m",
        name: "Revenue 3M",
        kind: ValueKind::Currency,
        unit: Some("LKR Mn"),
        range: None,
        category_level: false,
        identity: None,
        aliases: &["revenue 3m", "3m revenue", "quarterly revenue", "revenue", "turnover"],
        definition: Some(
            "Revenue for the latest three-month (quarterly) reporting period.",
        ),
    },
    Builtin {
        id: "profit_3m",
        name: "Profit 3M",
        kind: ValueKind::Currency,
        unit: Some("LKR Mn"),
        range: None,
        category_level: false,
        identity: None,
        aliases: &["profit 3m", "3m profit", "quarterly profit", "profit", "earnings 3m"],
        definition: Some(
            "Profit attributable to shareholders for the latest three-month reporting period.",
        ),
    },
    Builtin {
        id: "cum_revenue",
        name: "Cumulative Revenue",
        kind: ValueKind::Percentage,
        unit: Some("%"),
        range: Some((-100.0, 1_000.0)),
        category_level: true,
        identity: None,
        aliases: &[
            "cumulative revenue",
            "cumulative revenue %",
            "cum revenue",
            "cum revenue %",
            "cumulative revenue growth",
        ],
        definition: Some(
            "Cumulative Revenue: year-to-date revenue growth against the same period of the \
             previous year, as a percentage.",
        ),
    },
    Builtin {
        id: "cum_profit",
        name: "Cumulative Profit",
        kind: ValueKind::Percentage,
        unit: Some("%"),
        range: Some((-1_000.0, 1_000.0)),
        category_level: true,
        identity: None,
        aliases: &[
            "cumulative profit",
            "cumulative profit %",
            "cum profit",
            "cum profit %",
            "cumulative profit growth",
        ],
        definition: Some(
            "Cumulative Profit: year-to-date profit growth against the same period of the \
             previous year, as a percentage.",
        ),
    },
    Builtin {
        id: "eps",
        name: "EPS",
        kind: ValueKind::Currency,
        unit: Some("LKR"),
        range: None,
        category_level: false,
        identity: None,
        aliases: &["eps", "earnings per share"],
        definition: Some(
            "Earnings Per Share: profit attributable to ordinary shareholders divided by the \
             number of shares in issue.",
        ),
    },
    Builtin {
        id: "navps",
        name: "NAVPS",
        kind: ValueKind::Currency,
        unit: Some("LKR"),
        range: None,
        category_level: false,
        identity: None,
        aliases: &["navps", "nav per share", "net asset value per share", "book value per share", "bvps"],
        definition: Some(
            "Net Asset Value Per Share: shareholders' equity divided by the number of shares in issue.",
        ),
    },
    Builtin {
        id: "roe",
        name: "ROE",
        kind: ValueKind::Percentage,
        unit: Some("%"),
        range: Some((-100.0, 100.0)),
        category_level: false,
        identity: None,
        aliases: &["roe", "return on equity"],
        definition: Some(
            "Return on Equity: annualised profit attributable to shareholders divided by average \
             shareholders' equity.",
        ),
    },
    Builtin {
        id: "roa",
        name: "ROA",
        kind: ValueKind::Percentage,
        unit: Some("%"),
        range: Some((-100.0, 100.0)),
        category_level: false,
        identity: None,
        aliases: &["roa", "return on assets"],
        definition: Some("Return on Assets: annualised profit divided by average total assets."),
    },
    Builtin {
        id: "dps",
        name: "DPS",
        kind: ValueKind::Currency,
        unit: Some("LKR"),
        range: None,
        category_level: false,
        identity: None,
        aliases: &["dps", "dividend per share", "dividends per share"],
        definition: Some("Dividend Per Share: total dividends declared for the year per ordinary share."),
    },
    Builtin {
        id: "market_cap",
        name: "Market Cap",
        kind: ValueKind::Currency,
        unit: Some("LKR Mn"),
        range: None,
        category_level: false,
        identity: None,
        aliases: &["market cap", "mkt cap", "market capitalisation", "market capitalization"],
        definition: Some("Market Capitalisation: share price multiplied by the number of shares in issue."),
    },
    Builtin {
        id: "issued_qty",
        name: "Issued Qty Mn",
        kind: ValueKind::Count,
        unit: Some("Mn"),
        range: None,
        category_level: false,
        identity: None,
        aliases: &["issued qty mn", "issued qty", "issued quantity", "issued shares", "shares in issue"],
        definition: Some("Issued Quantity: number of ordinary shares in issue, in millions."),
    },
    Builtin {
        id: "fcf",
        name: "Free Cash Flow",
        kind: ValueKind::Currency,
        unit: Some("LKR Mn"),
        range: None,
        category_level: false,
        identity: None,
        aliases: &["free cash flow", "fcf"],
        definition: Some(
            "Free Cash Flow: cash generated from operations after capital expenditure; the cash \
             available to repay debt or return to shareholders.",
        ),
    },
    Builtin {
        id: "debt_equity",
        name: "Debt/Equity",
        kind: ValueKind::Ratio,
        unit: Some("x"),
        range: Some((0.0, 50.0)),
        category_level: false,
        identity: None,
        aliases: &["debt/equity", "debt to equity", "d/e", "gearing"],
        definition: Some("Debt to Equity: total borrowings divided by shareholders' equity."),
    },
    Builtin {
        id: "np_margin",
        name: "NP Margin",
        kind: ValueKind::Percentage,
        unit: Some("%"),
        range: Some((-100.0, 100.0)),
        category_level: false,
        identity: None,
        aliases: &["np margin", "net profit margin", "npm", "net margin"],
        definition: Some("Net Profit Margin: profit after tax divided by revenue, as a percentage."),
    },
];

/// Split text into normalized tokens.
///
/// Lowercases; `.`, `/` and apostrophes join their neighbours ("P/E" → "pe",
/// "C.Price" → "cprice"); `%` and `&` are tokens of their own; every other
/// non-alphanumeric character separates tokens.
pub fn normalize_tokens(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();

    for ch in text.chars() {
        if ch.is_alphanumeric() {
            current.extend(ch.to_lowercase());
        } else if matches!(ch, '.' | '/' | '\'' | '\u{2019}') {
            continue;
        } else {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            if ch == '%' || ch == '&' {
                tokens.push(ch.to_string());
            }
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Spacing-insensitive key: the normalized tokens concatenated.
pub fn normalize_key(text: &str) -> String {
    normalize_tokens(text).concat()
}

struct Phrase {
    tokens: Vec<String>,
    weight: usize,
    def: usize,
}

pub struct Catalog {
    defs: Vec<MetricDefinition>,
    by_id: FxHashMap<MetricId, usize>,
    exact: FxHashMap<String, usize>,
    /// Longest first.
    phrases: Vec<Phrase>,
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog").field("metrics", &self.defs.len()).finish()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl Catalog {
    /// The built-in financial metric set.
    pub fn builtin() -> Self {
        Self::from_definitions(builtin_definitions())
            .unwrap_or_else(|e| panic!("built-in metric catalog is inconsistent: {e}"))
    }

    pub fn from_definitions(defs: Vec<MetricDefinition>) -> Result<Self, CatalogError> {
        let mut by_id = FxHashMap::default();
        let mut exact: FxHashMap<String, usize> = FxHashMap::default();
        let mut phrases = Vec::new();

        for (idx, def) in defs.iter().enumerate() {
            if by_id.insert(def.id.clone(), idx).is_some() {
                return Err(CatalogError::DuplicateId(def.id.to_string()));
            }

            let names = std::iter::once(def.id.as_str())
                .chain(std::iter::once(def.display_name.as_str()))
                .chain(def.aliases.iter().map(|a| a.as_str()));

            for name in names {
                let key = normalize_key(name);
                if key.is_empty() {
                    continue;
                }
                match exact.get(&key) {
                    Some(&other) if other != idx => {
                        return Err(CatalogError::DuplicateAlias {
                            alias: name.to_string(),
                            first: defs[other].id.to_string(),
                            second: def.id.to_string(),
                        });
                    }
                    Some(_) => continue,
                    None => {
                        exact.insert(key.clone(), idx);
                    }
                }
                phrases.push(Phrase {
                    tokens: normalize_tokens(name),
                    weight: key.len(),
                    def: idx,
                });
            }
        }

        phrases.sort_by(|a, b| b.weight.cmp(&a.weight));

        Ok(Self {
            defs,
            by_id,
            exact,
            phrases,
        })
    }

    /// Built-in set plus configured aliases and metrics.
    pub fn with_overrides(overrides: &CatalogOverrides) -> Result<Self, CatalogError> {
        let mut defs = builtin_definitions();

        for (id, aliases) in &overrides.aliases {
            let def = defs
                .iter_mut()
                .find(|d| d.id.as_str() == id)
                .ok_or_else(|| CatalogError::NotFound(id.clone()))?;
            def.aliases.extend(aliases.iter().cloned());
        }

        for spec in &overrides.metrics {
            defs.push(MetricDefinition {
                id: MetricId::new(spec.id.clone()),
                display_name: spec.display_name.clone(),
                aliases: spec.aliases.clone(),
                kind: spec.kind,
                unit: spec.unit.clone(),
                range: spec.range.map(|[lo, hi]| (lo, hi)),
                definition: spec.definition.clone(),
                identity: None,
                category_level: spec.category_level,
                lower_is_better: spec.lower_is_better,
            });
        }

        Self::from_definitions(defs)
    }

    pub fn definitions(&self) -> &[MetricDefinition] {
        &self.defs
    }

    pub fn get(&self, id: &MetricId) -> Option<&MetricDefinition> {
        self.by_id.get(id).map(|&i| &self.defs[i])
    }

    /// Resolve a header label to a metric. Labels often wrap the metric name
    /// in extra words ("Revenue 3M Dec 24"), so the longest alias found
    /// anywhere in the text wins.
    ///
    /// `Ok(None)` means nothing matched; an error means the text is ambiguous.
    pub fn resolve_alias(&self, text: &str) -> Result<Option<&MetricDefinition>, CatalogError> {
        let tokens = normalize_tokens(text);
        if tokens.is_empty() {
            return Ok(None);
        }

        if let Some(&idx) = self.exact.get(&tokens.concat()) {
            return Ok(Some(&self.defs[idx]));
        }

        let mut best: Option<usize> = None;
        let mut hits: Vec<usize> = Vec::new();
        for phrase in &self.phrases {
            if let Some(w) = best {
                if phrase.weight < w {
                    break;
                }
            }
            if contains_run(&tokens, &phrase.tokens) {
                best = Some(phrase.weight);
                if !hits.contains(&phrase.def) {
                    hits.push(phrase.def);
                }
            }
        }

        match hits.len() {
            0 => Ok(None),
            1 => Ok(Some(&self.defs[hits[0]])),
            _ => Err(CatalogError::AmbiguousAlias {
                term: text.to_string(),
                candidates: hits.iter().map(|&i| self.defs[i].id.to_string()).collect(),
            }),
        }
    }

    /// Resolve a query term to a metric. Unlike header labels, every token of
    /// the term must belong to an alias: "pe ratio" resolves, "zyx revenue"
    /// does not. A term made of aliases of two metrics ("pe roe") is ambiguous.
    pub fn resolve_term(&self, text: &str) -> Result<Option<&MetricDefinition>, CatalogError> {
        let tokens = normalize_tokens(text);
        if tokens.is_empty() {
            return Ok(None);
        }
        if let Some(&idx) = self.exact.get(&tokens.concat()) {
            return Ok(Some(&self.defs[idx]));
        }

        // Cover the term left to right, longest alias first at each step.
        let mut hits: Vec<usize> = Vec::new();
        let mut at = 0;
        while at < tokens.len() {
            let Some(phrase) = self
                .phrases
                .iter()
                .filter(|p| tokens[at..].starts_with(&p.tokens))
                .max_by_key(|p| p.tokens.len())
            else {
                return Ok(None);
            };
            if !hits.contains(&phrase.def) {
                hits.push(phrase.def);
            }
            at += phrase.tokens.len();
        }

        match hits.as_slice() {
            [] => Ok(None),
            [only] => Ok(Some(&self.defs[*only])),
            _ => Err(CatalogError::AmbiguousAlias {
                term: text.to_string(),
                candidates: hits.iter().map(|&i| self.defs[i].id.to_string()).collect(),
            }),
        }
    }

    pub fn definition_of(&self, id: &MetricId) -> Result<&str, CatalogError> {
        self.get(id)
            .and_then(|d| d.definition.as_deref())
            .ok_or_else(|| CatalogError::NotFound(id.to_string()))
    }

    pub fn range_of(&self, id: &MetricId) -> Option<(f64, f64)> {
        self.get(id).and_then(|d| d.range)
    }

    /// Outside the plausible range. Reported, never used to discard a value.
    pub fn is_implausible(&self, id: &MetricId, value: f64) -> bool {
        match self.range_of(id) {
            Some((lo, hi)) => value < lo || value > hi,
            None => false,
        }
    }
}

fn contains_run(haystack: &[String], needle: &[String]) -> bool {
    !needle.is_empty()
        && needle.len() <= haystack.len()
        && haystack.windows(needle.len()).any(|w| w == needle)
}

fn builtin_definitions() -> Vec<MetricDefinition> {
    BUILTIN
        .iter()
        .map(|b| MetricDefinition {
            id: MetricId::new(b.id),
            display_name: b.name.to_string(),
            aliases: b.aliases.iter().map(|a| a.to_string()).collect(),
            kind: b.kind,
            unit: b.unit.map(str::to_string),
            range: b.range,
            definition: b.definition.map(str::to_string),
            identity: b.identity,
            category_level: b.category_level,
            lower_is_better: LOWER_IS_BETTER.contains(&b.id),
        })
        .collect()
}
