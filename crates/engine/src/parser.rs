//! Query parser: an ordered grammar of shape matchers.
//!
//! Each shape is one anchored pattern over the normalized query text. Shapes
//! are tried in `QueryShape::PRIORITY` order. A shape that matches but whose
//! terms do not resolve hands over to the next shape; if none succeeds the
//! query is `Unrecognized`. Ambiguity and bad input (inverted range, repeated
//! target, zero count) are errors and stop parsing at once.

use std::sync::OnceLock;

use log::debug;
use regex::{Captures, Regex};
use serde::Serialize;

use crate::catalog::MetricId;
use crate::error::{CatalogError, QueryError};
use crate::grid::parse_financial_number;
use crate::intent::{
    EntityClass, EntityRef, Intent, MetricRequest, RankOrder, SectorRef, Target, WeightedMetric,
};
use crate::registry::TableRegistry;
use crate::resolve::{resolve_entity_code, resolve_sector_label};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryShape {
    Define,
    CompareList,
    Versus,
    RangeFilter,
    BestOf,
    Composite,
    Extreme,
    DualMetric,
    MetricList,
    AllSectors,
    SectorMetric,
    SingleMetric,
    Summary,
}

/// Optional conversational lead-in accepted before lookup shapes.
const LEAD: &str = r"(?:(?:what(?:'s|\s+is|\s+are)|show(?:\s+me)?|get|give\s+me|tell\s+me)\s+)?(?:the\s+)?";

impl QueryShape {
    /// Most specific first.
    pub const PRIORITY: [QueryShape; 13] = [
        QueryShape::Define,
        QueryShape::CompareList,
        QueryShape::Versus,
        QueryShape::RangeFilter,
        QueryShape::BestOf,
        QueryShape::Composite,
        QueryShape::Extreme,
        QueryShape::DualMetric,
        QueryShape::MetricList,
        QueryShape::AllSectors,
        QueryShape::SectorMetric,
        QueryShape::SingleMetric,
        QueryShape::Summary,
    ];

    fn pattern(self) -> String {
        match self {
            QueryShape::Define => {
                r"^(define|definition\s+of|meaning\s+of|explain|what\s+is|what\s+are|what\s+does|what's)\s+(?:the\s+|an?\s+)?(.+?)(?:\s+mean)?$".to_string()
            }
            QueryShape::CompareList => {
                r"^compare\s+(?:the\s+)?(?:(stocks?|companies|company|shares?|sectors?)\s+)?(.+?)(?:\s+by\s+(.+))?$".to_string()
            }
            QueryShape::Versus => {
                r"^(?:compare\s+)?(.+?\s+(?:vs\.?|versus)\s+.+?)\s+by\s+(.+)$".to_string()
            }
            QueryShape::RangeFilter => {
                r"^(?:show|list|find|get|display|which)(?:\s+me)?\s+(?:the\s+|all\s+)?(.+?)\s+(?:where|when|with|whose)\s+(?:the\s+)?(.+?)\s+(?:is\s+|are\s+)?between\s+(\S+)\s+and\s+(\S+?)(?:\s+in\s+(?:the\s+)?sector\s+(.+))?$".to_string()
            }
            QueryShape::BestOf => {
                r"^(?:(?:which|what)\s+(?:is|are)\s+the\s+|show(?:\s+me)?\s+(?:the\s+)?|list\s+(?:the\s+)?)?(best|top|highest|lowest|bottom|worst)\s+(?:(\d+)\s+)?(stocks?|companies|company|shares?|sectors?)\s+(?:by|on|for|in\s+terms\s+of)\s+(.+)$".to_string()
            }
            QueryShape::Composite => {
                r"^(?:(?:which|what)\s+(?:is|are)\s+the\s+|show(?:\s+me)?\s+(?:the\s+)?|list\s+(?:the\s+)?)?(?:best|top)\s+(?:(\d+)\s+)?(?:stocks?|companies|company|shares?)(?:\s+overall)?$|^which\s+(?:stocks?|company|companies|shares?)\s+(?:is|are)\s+(?:the\s+)?best(?:\s+overall)?$".to_string()
            }
            QueryShape::Extreme => {
                r"^(?:(?:which|what)(?:\s+(?:stock|company|share))?\s+(?:is|are|has)\s+the\s+|show(?:\s+me)?\s+(?:the\s+)?)?(lowest|highest|best)\s+(.+)$".to_string()
            }
            QueryShape::DualMetric => format!(r"^{LEAD}(.+?)\s+and\s+(.+?)\s+(?:for|of)\s+(.+)$"),
            QueryShape::MetricList => format!(r"^{LEAD}(.+?)\s+(?:for|of)\s+(.+)$"),
            QueryShape::AllSectors => format!(
                r"^{LEAD}(?:(?:average|avg|mean)\s+)?(.+?)\s+(?:for|of|across|by|in)\s+(?:all|every|each)\s+sectors?$"
            ),
            QueryShape::SectorMetric => format!(
                r"^{LEAD}(?:(?:average|avg|mean)\s+)?(.+?)\s+(?:for|of|in)\s+(?:the\s+)?sector\s+(.+)$"
            ),
            QueryShape::SingleMetric => format!(r"^{LEAD}(.+?)\s+(?:for|of)\s+(.+)$"),
            QueryShape::Summary => format!(r"^{LEAD}(?:average|avg|mean)\s+(?:of\s+)?(?:the\s+)?(.+)$"),
        }
    }
}

fn grammar() -> &'static [(QueryShape, Regex)] {
    static GRAMMAR: OnceLock<Vec<(QueryShape, Regex)>> = OnceLock::new();
    GRAMMAR.get_or_init(|| {
        QueryShape::PRIORITY
            .iter()
            .map(|&shape| {
                let re = Regex::new(&shape.pattern())
                    .unwrap_or_else(|e| panic!("query grammar pattern {shape:?}: {e}"));
                (shape, re)
            })
            .collect()
    })
}

fn list_separator() -> &'static Regex {
    static SEP: OnceLock<Regex> = OnceLock::new();
    SEP.get_or_init(|| {
        Regex::new(r"\s*,\s*|\s+and\s+|\s+(?:vs\.?|versus)\s+|\s+with\s+")
            .unwrap_or_else(|e| panic!("list separator pattern: {e}"))
    })
}

fn item_separator() -> &'static Regex {
    static SEP: OnceLock<Regex> = OnceLock::new();
    SEP.get_or_init(|| {
        Regex::new(r"\s*,\s*(?:and\s+)?|\s+and\s+").unwrap_or_else(|e| panic!("item separator pattern: {e}"))
    })
}

/// `<metric> from [the] <sheet> [sheet|tab]`
fn sheet_qualifier() -> &'static Regex {
    static QUALIFIER: OnceLock<Regex> = OnceLock::new();
    QUALIFIER.get_or_init(|| {
        Regex::new(r"^(.+?)\s+from\s+(?:the\s+)?(.+?)(?:\s+(?:sheet|tab))?$")
            .unwrap_or_else(|e| panic!("sheet qualifier pattern: {e}"))
    })
}

fn versus_separator() -> &'static Regex {
    static SEP: OnceLock<Regex> = OnceLock::new();
    SEP.get_or_init(|| {
        Regex::new(r"\s+(?:vs\.?|versus)\s+").unwrap_or_else(|e| panic!("versus pattern: {e}"))
    })
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    Recognized(Intent),
    /// No shape matched with all terms resolved. The caller's cue to route the
    /// text elsewhere.
    Unrecognized { reason: String },
}

/// What one shape made of the text.
enum Attempt {
    Skip,
    Unresolved(String),
    Parsed(Intent),
}

/// Lowercase, collapse whitespace, drop trailing `?`, `!`, `.`.
pub fn normalize_query(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .trim_end_matches(['?', '!', '.', ' '])
        .to_lowercase()
}

pub fn parse(text: &str, registry: &TableRegistry) -> Result<ParseOutcome, QueryError> {
    let normalized = normalize_query(text);
    if normalized.is_empty() {
        return Ok(ParseOutcome::Unrecognized {
            reason: "empty query".into(),
        });
    }

    let mut first_reason: Option<String> = None;
    for (shape, re) in grammar() {
        let Some(caps) = re.captures(&normalized) else {
            continue;
        };
        match build(*shape, &caps, registry)? {
            Attempt::Skip => {}
            Attempt::Unresolved(reason) => {
                debug!("query '{normalized}': {shape:?} matched but {reason}");
                if first_reason.is_none() {
                    first_reason = Some(reason);
                }
            }
            Attempt::Parsed(intent) => {
                debug!("query '{normalized}' parsed as {shape:?}");
                return Ok(ParseOutcome::Recognized(intent));
            }
        }
    }

    Ok(ParseOutcome::Unrecognized {
        reason: first_reason.unwrap_or_else(|| "no query shape matched".into()),
    })
}

fn build(shape: QueryShape, caps: &Captures<'_>, reg: &TableRegistry) -> Result<Attempt, QueryError> {
    let cap = |i: usize| caps.get(i).map(|m| m.as_str().trim());
    match shape {
        QueryShape::Define => define(cap(1).unwrap_or(""), cap(2).unwrap_or(""), reg),
        QueryShape::CompareList => compare_list(cap(1), cap(2).unwrap_or(""), cap(3), reg),
        QueryShape::Versus => versus(cap(1).unwrap_or(""), cap(2).unwrap_or(""), reg),
        QueryShape::RangeFilter => range_filter(
            cap(1).unwrap_or(""),
            cap(2).unwrap_or(""),
            cap(3).unwrap_or(""),
            cap(4).unwrap_or(""),
            cap(5),
            reg,
        ),
        QueryShape::BestOf => best_of(
            cap(1).unwrap_or(""),
            cap(2),
            cap(3).unwrap_or(""),
            cap(4).unwrap_or(""),
            reg,
        ),
        QueryShape::Composite => composite(cap(1), reg),
        QueryShape::Extreme => extreme(cap(1).unwrap_or(""), cap(2).unwrap_or(""), reg),
        QueryShape::DualMetric => dual_metric(
            cap(1).unwrap_or(""),
            cap(2).unwrap_or(""),
            cap(3).unwrap_or(""),
            reg,
        ),
        QueryShape::MetricList => metric_list(cap(1).unwrap_or(""), cap(2).unwrap_or(""), reg),
        QueryShape::AllSectors => {
            let Some(metric) = metric(cap(1).unwrap_or(""), reg)? else {
                return Ok(unresolved_metric(cap(1)));
            };
            Ok(Attempt::Parsed(Intent::AllSectors { metric }))
        }
        QueryShape::SectorMetric => sector_metric(cap(1).unwrap_or(""), cap(2).unwrap_or(""), reg),
        QueryShape::SingleMetric => single_metric(cap(1).unwrap_or(""), cap(2).unwrap_or(""), reg),
        QueryShape::Summary => {
            let Some(metric) = metric(cap(1).unwrap_or(""), reg)? else {
                return Ok(unresolved_metric(cap(1)));
            };
            Ok(Attempt::Parsed(Intent::Summary { metric }))
        }
    }
}

// ---------------------------------------------------------------------------
// Term resolution
// ---------------------------------------------------------------------------

/// Exact or fully covered term. Identity fields are never metrics here.
fn metric(term: &str, reg: &TableRegistry) -> Result<Option<MetricId>, QueryError> {
    match reg.catalog().resolve_term(term) {
        Ok(Some(def)) if !def.is_identity() => Ok(Some(def.id.clone())),
        Ok(_) => Ok(None),
        Err(CatalogError::AmbiguousAlias { term, candidates }) => {
            Err(QueryError::AmbiguousAlias { term, candidates })
        }
        Err(_) => Ok(None),
    }
}

fn unresolved_metric(term: Option<&str>) -> Attempt {
    Attempt::Unresolved(format!("unknown metric '{}'", term.unwrap_or("")))
}

fn clean_token(token: &str) -> &str {
    token.trim().trim_matches(['"', '\'']).trim()
}

fn entity(token: &str, reg: &TableRegistry) -> Result<Option<EntityRef>, QueryError> {
    let token = clean_token(token);
    Ok(resolve_entity_code(token, reg.tables())?.map(|code| EntityRef {
        token: token.to_string(),
        code,
    }))
}

fn sector(token: &str, reg: &TableRegistry) -> Result<Option<SectorRef>, QueryError> {
    let token = clean_token(token);
    Ok(resolve_sector_label(token, reg.tables())?.map(|label| SectorRef {
        token: token.to_string(),
        label,
    }))
}

fn sector_token(token: &str) -> Option<&str> {
    token.strip_prefix("sector ").map(str::trim)
}

fn is_sector_target(token: &str) -> bool {
    sector_token(token).is_some() || token.ends_with("sectors")
}

fn count(digits: Option<&str>, default: usize) -> Result<Result<usize, String>, QueryError> {
    match digits {
        Some(digits) => match digits.parse::<usize>() {
            Ok(0) => Err(QueryError::InvalidCount(0)),
            Ok(k) => Ok(Ok(k)),
            Err(_) => Ok(Err(format!("count '{digits}' is out of range"))),
        },
        None => Ok(Ok(default)),
    }
}

fn target(token: &str, sectors_only: bool, reg: &TableRegistry) -> Result<Option<Target>, QueryError> {
    match sector_token(token) {
        Some(name) => Ok(sector(name, reg)?.map(Target::Sector)),
        None if sectors_only => Ok(sector(token, reg)?.map(Target::Sector)),
        None => Ok(entity(token, reg)?.map(Target::Entity)),
    }
}

/// Resolve every target, rejecting repeats before and after resolution.
fn targets(tokens: &[&str], sectors_only: bool, reg: &TableRegistry) -> Result<Result<Vec<Target>, String>, QueryError> {
    for (i, t) in tokens.iter().enumerate() {
        if tokens[..i].iter().any(|p| p.eq_ignore_ascii_case(t)) {
            return Err(QueryError::DuplicateTarget(t.to_string()));
        }
    }

    let mut out = Vec::with_capacity(tokens.len());
    for token in tokens {
        match target(token, sectors_only, reg)? {
            Some(t) => out.push(t),
            None => return Ok(Err(format!("unknown target '{token}'"))),
        }
    }

    if let Some(dup) = Target::find_duplicate(&out) {
        return Err(QueryError::DuplicateTarget(dup.label().to_string()));
    }
    Ok(Ok(out))
}

// ---------------------------------------------------------------------------
// Shapes
// ---------------------------------------------------------------------------

const RANKING_WORDS: [&str; 6] = ["best", "top", "lowest", "highest", "worst", "bottom"];

/// "best sector by roe", "top 3 stocks on p/e", "lowest pbv".
fn is_ranking_request(term: &str) -> bool {
    let first = term.split_whitespace().next().unwrap_or("");
    RANKING_WORDS.contains(&first) || term.contains(" by ") || term.contains(" on ")
}

fn define(lead: &str, term: &str, reg: &TableRegistry) -> Result<Attempt, QueryError> {
    // "what is the p/e for alli" is a lookup, not a definition
    if lead.starts_with("what") && (term.contains(" for ") || term.contains(" of ")) {
        return Ok(Attempt::Skip);
    }
    if term.is_empty() || is_ranking_request(term) {
        return Ok(Attempt::Skip);
    }
    let Some(metric) = metric(term, reg)? else {
        return Ok(unresolved_metric(Some(term)));
    };
    Ok(Attempt::Parsed(Intent::Define {
        term: term.to_string(),
        metric,
    }))
}

fn compare_list(
    class: Option<&str>,
    list: &str,
    by: Option<&str>,
    reg: &TableRegistry,
) -> Result<Attempt, QueryError> {
    let sectors_only = class.is_some_and(|c| c.starts_with("sector"));
    let tokens: Vec<&str> = list_separator()
        .split(list)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect();
    if tokens.len() < 2 {
        return Ok(Attempt::Unresolved("compare needs at least two targets".into()));
    }

    let metric_term = by.unwrap_or(reg.query_config().default_compare_metric.as_str());
    let Some(metric) = metric(metric_term, reg)? else {
        return Ok(unresolved_metric(Some(metric_term)));
    };

    match targets(&tokens, sectors_only, reg)? {
        Ok(targets) => Ok(Attempt::Parsed(Intent::Compare { metric, targets })),
        Err(reason) => Ok(Attempt::Unresolved(reason)),
    }
}

fn versus(chain: &str, by: &str, reg: &TableRegistry) -> Result<Attempt, QueryError> {
    let tokens: Vec<&str> = versus_separator()
        .split(chain)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect();
    if tokens.len() < 2 {
        return Ok(Attempt::Skip);
    }
    let Some(metric) = metric(by, reg)? else {
        return Ok(unresolved_metric(Some(by)));
    };
    match targets(&tokens, false, reg)? {
        Ok(targets) => Ok(Attempt::Parsed(Intent::Compare { metric, targets })),
        Err(reason) => Ok(Attempt::Unresolved(reason)),
    }
}

fn range_filter(
    display: &str,
    filter: &str,
    low: &str,
    high: &str,
    sector_name: Option<&str>,
    reg: &TableRegistry,
) -> Result<Attempt, QueryError> {
    let (Some(low), Some(high)) = (parse_financial_number(low), parse_financial_number(high)) else {
        return Ok(Attempt::Unresolved(format!("bounds '{low}' and '{high}' are not numbers")));
    };

    let Some(display) = metric(display, reg)? else {
        return Ok(unresolved_metric(Some(display)));
    };
    let Some(filter) = metric(filter, reg)? else {
        return Ok(unresolved_metric(Some(filter)));
    };
    let sector = match sector_name {
        Some(name) => match sector(name, reg)? {
            Some(s) => Some(s),
            None => return Ok(Attempt::Unresolved(format!("unknown sector '{name}'"))),
        },
        None => None,
    };
    // Only a query whose terms all resolve can be bad input.
    if low > high {
        return Err(QueryError::InvalidRange { low, high });
    }

    Ok(Attempt::Parsed(Intent::RangeFilter {
        display,
        filter,
        low,
        high,
        sector,
    }))
}

fn best_of(
    word: &str,
    k: Option<&str>,
    class: &str,
    term: &str,
    reg: &TableRegistry,
) -> Result<Attempt, QueryError> {
    let k = match count(k, reg.query_config().best_of_default_k)? {
        Ok(k) => k,
        Err(reason) => return Ok(Attempt::Unresolved(reason)),
    };
    let class = if class.starts_with("sector") {
        EntityClass::Sector
    } else {
        EntityClass::Stock
    };
    let order = match word {
        "lowest" | "bottom" | "worst" => RankOrder::Ascending,
        _ => RankOrder::Descending,
    };
    let Some(metric) = metric(term, reg)? else {
        return Ok(unresolved_metric(Some(term)));
    };
    Ok(Attempt::Parsed(Intent::BestOf {
        class,
        metric,
        k,
        order,
    }))
}

/// Weighted score over the configured metrics; `k` defaults to the
/// leaderboard size.
fn composite(k: Option<&str>, reg: &TableRegistry) -> Result<Attempt, QueryError> {
    let config = reg.query_config();
    let k = match count(k, config.leaderboard_size)? {
        Ok(k) => k,
        Err(reason) => return Ok(Attempt::Unresolved(reason)),
    };
    let mut weights = Vec::with_capacity(config.composite.len());
    for w in &config.composite {
        let Some(metric) = metric(&w.metric, reg)? else {
            return Ok(unresolved_metric(Some(w.metric.as_str())));
        };
        weights.push(WeightedMetric {
            metric,
            weight: w.weight,
        });
    }
    Ok(Attempt::Parsed(Intent::Composite { weights, k }))
}

/// `lowest <metric>`, `highest <metric>`, `best <metric>` over stocks. "Best"
/// follows the metric's direction.
fn extreme(word: &str, term: &str, reg: &TableRegistry) -> Result<Attempt, QueryError> {
    let Some(metric) = metric(term, reg)? else {
        return Ok(unresolved_metric(Some(term)));
    };
    let lower_is_better = reg.catalog().get(&metric).is_some_and(|d| d.lower_is_better);
    let order = match word {
        "lowest" => RankOrder::Ascending,
        "best" if lower_is_better => RankOrder::Ascending,
        _ => RankOrder::Descending,
    };
    Ok(Attempt::Parsed(Intent::BestOf {
        class: EntityClass::Stock,
        metric,
        k: reg.query_config().leaderboard_size,
        order,
    }))
}

fn dual_metric(first: &str, second: &str, who: &str, reg: &TableRegistry) -> Result<Attempt, QueryError> {
    if is_sector_target(who) {
        return Ok(Attempt::Skip);
    }
    // longer lists and sheet-qualified items belong to the metric list
    if [first, second]
        .iter()
        .any(|t| t.contains(" and ") || t.contains(" from ") || t.contains(','))
    {
        return Ok(Attempt::Skip);
    }
    let Some(a) = metric(first, reg)? else {
        return Ok(unresolved_metric(Some(first)));
    };
    let Some(b) = metric(second, reg)? else {
        return Ok(unresolved_metric(Some(second)));
    };
    let Some(entity) = entity(who, reg)? else {
        return Ok(Attempt::Unresolved(format!("unknown company '{who}'")));
    };
    Ok(Attempt::Parsed(Intent::DualMetric {
        metrics: [a, b],
        entity,
    }))
}

/// Sheet name as loaded, matched without regard to case.
fn sheet_named(name: &str, reg: &TableRegistry) -> Option<String> {
    let name = clean_token(name);
    reg.tables()
        .iter()
        .find(|t| t.sheet.eq_ignore_ascii_case(name))
        .map(|t| t.sheet.clone())
}

/// Three or more metrics, or any metric pinned to a sheet, for one company.
fn metric_list(list: &str, who: &str, reg: &TableRegistry) -> Result<Attempt, QueryError> {
    if is_sector_target(who) {
        return Ok(Attempt::Skip);
    }
    let items: Vec<&str> = item_separator()
        .split(list)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect();
    let qualified: Vec<Option<Captures<'_>>> =
        items.iter().map(|item| sheet_qualifier().captures(item)).collect();
    if items.len() <= 2 && qualified.iter().all(Option::is_none) {
        return Ok(Attempt::Skip);
    }

    let mut requests = Vec::with_capacity(items.len());
    for (item, qualifier) in items.iter().zip(&qualified) {
        let (term, sheet_name) = match qualifier {
            Some(caps) => (
                caps.get(1).map_or("", |m| m.as_str()),
                caps.get(2).map(|m| m.as_str()),
            ),
            None => (*item, None),
        };
        let Some(metric) = metric(term, reg)? else {
            return Ok(unresolved_metric(Some(term)));
        };
        let sheet = match sheet_name {
            Some(name) => match sheet_named(name, reg) {
                Some(s) => Some(s),
                None => return Ok(Attempt::Unresolved(format!("unknown sheet '{name}'"))),
            },
            None => None,
        };
        requests.push(MetricRequest { metric, sheet });
    }

    let Some(entity) = entity(who, reg)? else {
        return Ok(Attempt::Unresolved(format!("unknown company '{who}'")));
    };
    Ok(Attempt::Parsed(Intent::MetricList {
        items: requests,
        entity,
    }))
}

fn sector_metric(term: &str, name: &str, reg: &TableRegistry) -> Result<Attempt, QueryError> {
    let Some(metric) = metric(term, reg)? else {
        return Ok(unresolved_metric(Some(term)));
    };
    let Some(sector) = sector(name, reg)? else {
        return Ok(Attempt::Unresolved(format!("unknown sector '{name}'")));
    };
    Ok(Attempt::Parsed(Intent::SectorMetric { metric, sector }))
}

fn single_metric(term: &str, who: &str, reg: &TableRegistry) -> Result<Attempt, QueryError> {
    if sector_token(who).is_some() {
        return Ok(Attempt::Skip);
    }
    let Some(metric) = metric(term, reg)? else {
        return Ok(unresolved_metric(Some(term)));
    };
    let Some(entity) = entity(who, reg)? else {
        return Ok(Attempt::Unresolved(format!("unknown company '{who}'")));
    };
    Ok(Attempt::Parsed(Intent::SingleMetric { metric, entity }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sample_registry;

    fn parsed(text: &str) -> Intent {
        match parse(text, &sample_registry()).unwrap() {
            ParseOutcome::Recognized(intent) => intent,
            other => panic!("'{text}' was not recognized: {other:?}"),
        }
    }

    fn unrecognized(text: &str) -> bool {
        matches!(
            parse(text, &sample_registry()),
            Ok(ParseOutcome::Unrecognized { .. })
        )
    }

    fn id(s: &str) -> MetricId {
        MetricId::new(s)
    }

    #[test]
    fn grammar_compiles_in_priority_order() {
        let shapes: Vec<QueryShape> = grammar().iter().map(|(s, _)| *s).collect();
        assert_eq!(shapes, QueryShape::PRIORITY.to_vec());
    }

    #[test]
    fn normalization() {
        assert_eq!(normalize_query("  P/E   for ALLI?? "), "p/e for alli");
        assert_eq!(normalize_query("Define FCF."), "define fcf");
    }

    #[test]
    fn single_metric_lookup() {
        match parsed("P/E for ALLI") {
            Intent::SingleMetric { metric, entity } => {
                assert_eq!(metric, id("pe"));
                assert_eq!(entity.code, "ALLI");
            }
            other => panic!("{other:?}"),
        }
        assert!(matches!(parsed("What is the C.Price of JKH?"), Intent::SingleMetric { .. }));
    }

    #[test]
    fn entity_vs_sector_beats_single_metric() {
        match parsed("ALLI vs sector BANKS by Revenue 3M") {
            Intent::Compare { metric, targets } => {
                assert_eq!(metric, id("revenue_3m"));
                assert_eq!(targets.len(), 2);
                assert!(matches!(&targets[0], Target::Entity(e) if e.code == "ALLI"));
                assert!(matches!(&targets[1], Target::Sector(s) if s.label == "BANKS"));
            }
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn versus_chain_and_sector_pairs() {
        match parsed("COMB vs HNB vs SAMP by ROE") {
            Intent::Compare { targets, .. } => {
                let labels: Vec<&str> = targets.iter().map(Target::label).collect();
                assert_eq!(labels, vec!["COMB", "HNB", "SAMP"]);
            }
            other => panic!("{other:?}"),
        }
        match parsed("sector banks vs sector finance by P/E") {
            Intent::Compare { targets, .. } => {
                assert!(targets.iter().all(|t| matches!(t, Target::Sector(_))));
            }
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn compare_list_keeps_order_and_defaults_metric() {
        match parsed("Compare stocks LOLC, ALLI and COMB by Div Yield") {
            Intent::Compare { metric, targets } => {
                assert_eq!(metric, id("div_yield"));
                let labels: Vec<&str> = targets.iter().map(Target::label).collect();
                assert_eq!(labels, vec!["LOLC", "ALLI", "COMB"]);
            }
            other => panic!("{other:?}"),
        }
        match parsed("compare stocks ALLI, COMB") {
            Intent::Compare { metric, .. } => assert_eq!(metric, id("pe")),
            other => panic!("{other:?}"),
        }
        match parsed("compare sectors banks, insurance by pbv") {
            Intent::Compare { targets, .. } => {
                assert!(matches!(&targets[1], Target::Sector(s) if s.label == "INSURANCE"));
            }
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn duplicate_targets_are_errors() {
        let reg = sample_registry();
        assert_eq!(
            parse("compare stocks ALLI, COMB, alli by pe", &reg),
            Err(QueryError::DuplicateTarget("alli".into()))
        );
        // same company under two spellings
        assert_eq!(
            parse("compare stocks ALLI, Alliance Finance by pe", &reg),
            Err(QueryError::DuplicateTarget("ALLI".into()))
        );
    }

    #[test]
    fn range_filter_and_inverted_bounds() {
        match parsed("Show Div Yield where P/E between 5 and 10") {
            Intent::RangeFilter {
                display,
                filter,
                low,
                high,
                sector,
            } => {
                assert_eq!(display, id("div_yield"));
                assert_eq!(filter, id("pe"));
                assert_eq!((low, high), (5.0, 10.0));
                assert!(sector.is_none());
            }
            other => panic!("{other:?}"),
        }
        assert_eq!(
            parse("Show Div Yield where P/E between 20 and 10", &sample_registry()),
            Err(QueryError::InvalidRange {
                low: 20.0,
                high: 10.0
            })
        );
        match parsed("show pbv where roe between 10 and 20 in sector banks") {
            Intent::RangeFilter { sector, .. } => {
                assert_eq!(sector.map(|s| s.label).as_deref(), Some("BANKS"));
            }
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn best_of_counts_and_order() {
        assert_eq!(
            parsed("Best sector by ROE"),
            Intent::BestOf {
                class: EntityClass::Sector,
                metric: id("roe"),
                k: 1,
                order: RankOrder::Descending,
            }
        );
        assert_eq!(
            parsed("top 3 stocks by dividend yield"),
            Intent::BestOf {
                class: EntityClass::Stock,
                metric: id("div_yield"),
                k: 3,
                order: RankOrder::Descending,
            }
        );
        assert!(matches!(
            parsed("lowest 2 stocks by P/E"),
            Intent::BestOf { order: RankOrder::Ascending, k: 2, .. }
        ));
        assert_eq!(
            parse("top 0 stocks by roe", &sample_registry()),
            Err(QueryError::InvalidCount(0))
        );
    }

    #[test]
    fn dual_metric() {
        match parsed("P/E and PBV for COMB") {
            Intent::DualMetric { metrics, entity } => {
                assert_eq!(metrics, [id("pe"), id("pbv")]);
                assert_eq!(entity.code, "COMB");
            }
            other => panic!("{other:?}"),
        }
        // a pair of metrics has no sector form
        assert!(unrecognized("P/E and PBV for sector BANKS"));
    }

    #[test]
    fn metric_list_takes_three_or_more() {
        match parsed("P/E and PBV and ROE for COMB") {
            Intent::MetricList { items, entity } => {
                let ids: Vec<&MetricId> = items.iter().map(|i| &i.metric).collect();
                assert_eq!(ids, vec![&id("pe"), &id("pbv"), &id("roe")]);
                assert!(items.iter().all(|i| i.sheet.is_none()));
                assert_eq!(entity.code, "COMB");
            }
            other => panic!("{other:?}"),
        }
        assert!(matches!(
            parsed("show eps, navps and fcf for HNB"),
            Intent::MetricList { ref items, .. } if items.len() == 3
        ));
    }

    #[test]
    fn metric_list_sheet_qualifiers() {
        match parsed("price from market and eps from fundamentals for comb") {
            Intent::MetricList { items, entity } => {
                assert_eq!(
                    items,
                    vec![
                        MetricRequest {
                            metric: id("price"),
                            sheet: Some("Market".into()),
                        },
                        MetricRequest {
                            metric: id("eps"),
                            sheet: Some("Fundamentals".into()),
                        },
                    ]
                );
                assert_eq!(entity.code, "COMB");
            }
            other => panic!("{other:?}"),
        }
        // one qualified item is still a list
        assert!(matches!(
            parsed("P/E from the Sectors sheet for ALLI"),
            Intent::MetricList { ref items, .. } if items[0].sheet.as_deref() == Some("Sectors")
        ));
        assert!(unrecognized("price from ledger for comb"));
    }

    #[test]
    fn extremes_rank_stocks_by_direction() {
        let k = sample_registry().query_config().leaderboard_size;
        assert_eq!(
            parsed("What is the lowest P/E?"),
            Intent::BestOf {
                class: EntityClass::Stock,
                metric: id("pe"),
                k,
                order: RankOrder::Ascending,
            }
        );
        assert!(matches!(
            parsed("highest ROE"),
            Intent::BestOf { order: RankOrder::Descending, .. }
        ));
        // valuation multiples are better when low
        assert!(matches!(
            parsed("best p/e"),
            Intent::BestOf { order: RankOrder::Ascending, .. }
        ));
        assert!(matches!(
            parsed("which stock has the best dividend yield"),
            Intent::BestOf { order: RankOrder::Descending, .. }
        ));
    }

    #[test]
    fn best_stock_without_metric_is_composite() {
        let reg = sample_registry();
        let config = reg.query_config();
        for text in ["best stock", "Which stock is best?", "What are the top stocks?"] {
            match parsed(text) {
                Intent::Composite { weights, k } => {
                    assert_eq!(k, config.leaderboard_size);
                    let ids: Vec<&str> = weights.iter().map(|w| w.metric.as_str()).collect();
                    assert_eq!(ids, vec!["pe", "div_yield", "pbv"]);
                    assert_eq!(weights[2].weight, -0.2);
                }
                other => panic!("'{text}': {other:?}"),
            }
        }
        assert!(matches!(parsed("top 5 companies"), Intent::Composite { k: 5, .. }));
        assert_eq!(parse("top 0 stocks", &reg), Err(QueryError::InvalidCount(0)));
    }

    #[test]
    fn sector_shapes() {
        assert!(matches!(
            parsed("Average P/E for sector Banks"),
            Intent::SectorMetric { ref sector, .. } if sector.label == "BANKS"
        ));
        assert!(matches!(
            parsed("P/E for all sectors"),
            Intent::AllSectors { .. }
        ));
        assert!(matches!(parsed("average ROE"), Intent::Summary { .. }));
    }

    #[test]
    fn define_round_trips_any_case() {
        for text in ["Define Free Cash Flow", "define   FREE cash FLOW", "what is free cash flow?"] {
            assert_eq!(
                parsed(text),
                Intent::Define {
                    term: "free cash flow".into(),
                    metric: id("fcf"),
                }
            );
        }
        assert!(unrecognized("define zyx"));
        assert!(unrecognized("what is the meaning of life"));
    }

    #[test]
    fn ranking_questions_are_not_definitions() {
        assert_eq!(
            parsed("What is the best sector by ROE?"),
            Intent::BestOf {
                class: EntityClass::Sector,
                metric: id("roe"),
                k: 1,
                order: RankOrder::Descending,
            }
        );
        assert_eq!(
            parsed("What are the top 3 stocks by P/E?"),
            Intent::BestOf {
                class: EntityClass::Stock,
                metric: id("pe"),
                k: 3,
                order: RankOrder::Descending,
            }
        );
    }

    #[test]
    fn unknown_terms_are_unrecognized() {
        assert!(unrecognized("Zyx for ALLI"));
        assert!(unrecognized("P/E for NOPE"));
        assert!(unrecognized("hello there"));
        assert!(unrecognized(""));
        assert!(unrecognized("Average P/E for sector Plantations"));
        // every word of a metric term must belong to an alias
        assert!(unrecognized("Zyx revenue for ALLI"));
    }

    #[test]
    fn unresolved_range_is_unrecognized_before_bounds_check() {
        assert!(unrecognized("show pe where zyx between 5 and 1"));
        assert!(unrecognized("show zyx where pe between 5 and 1"));
        assert!(unrecognized("show pe where roe between 5 and 1 in sector plantations"));
    }

    #[test]
    fn ambiguity_is_surfaced() {
        let reg = sample_registry();
        // "c" prefixes both COMB and CINS
        assert!(matches!(
            parse("P/E for c", &reg),
            Err(QueryError::AmbiguousEntity { .. })
        ));
        assert!(matches!(
            parse("roe roa for COMB", &reg),
            Err(QueryError::AmbiguousAlias { .. })
        ));
        match parse("pe roe for COMB", &reg) {
            Err(QueryError::AmbiguousAlias { candidates, .. }) => {
                assert_eq!(candidates, vec!["pe".to_string(), "roe".to_string()]);
            }
            other => panic!("{other:?}"),
        }
    }
}
