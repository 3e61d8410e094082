//! Entity and sector resolution.
//!
//! Tiers, tried in order, first non-empty tier wins:
//! 1. exact code (case-insensitive)
//! 2. exact display name (normalized)
//! 3. listing base: text before the first `.` (`ALLI.N0000` → `ALLI`)
//! 4. prefix of code or name
//!
//! More than one distinct match in tiers 3 or 4 is an error, never a pick.

use std::sync::Arc;

use crate::catalog::normalize_key;
use crate::error::QueryError;
use crate::table::Table;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Tier {
    Code,
    Name,
    Base,
    Prefix,
}

impl Tier {
    fn is_exact(self) -> bool {
        matches!(self, Tier::Code | Tier::Name)
    }
}

fn base(code: &str) -> &str {
    code.split('.').next().unwrap_or(code)
}

fn tier_matches(tier: Tier, token: &str, key: &str, code: &str, name: Option<&str>) -> bool {
    match tier {
        Tier::Code => code.eq_ignore_ascii_case(token),
        Tier::Name => name.is_some_and(|n| normalize_key(n) == key),
        Tier::Base => base(code).eq_ignore_ascii_case(base(token)),
        Tier::Prefix => {
            normalize_key(code).starts_with(key)
                || name.is_some_and(|n| normalize_key(n).starts_with(key))
        }
    }
}

fn match_entity(token: &str, table: &Table) -> Option<(Tier, Vec<usize>)> {
    let token = token.trim();
    let key = normalize_key(token);
    if key.is_empty() {
        return None;
    }

    for tier in [Tier::Code, Tier::Name, Tier::Base, Tier::Prefix] {
        let rows: Vec<usize> = table
            .entities()
            .filter(|(_, r)| {
                r.code()
                    .is_some_and(|c| tier_matches(tier, token, &key, c, r.display_name()))
            })
            .map(|(i, _)| i)
            .collect();
        if !rows.is_empty() {
            return Some((tier, rows));
        }
    }
    None
}

/// Entity rows in `table` matching `token`. Empty when nothing matches.
pub fn resolve_entity(token: &str, table: &Table) -> Result<Vec<usize>, QueryError> {
    match match_entity(token, table) {
        None => Ok(Vec::new()),
        Some((tier, rows)) if rows.len() > 1 && !tier.is_exact() => {
            Err(QueryError::AmbiguousEntity {
                token: token.to_string(),
                candidates: codes_of(table, &rows),
            })
        }
        Some((_, rows)) => Ok(rows),
    }
}

fn codes_of(table: &Table, rows: &[usize]) -> Vec<String> {
    let mut codes: Vec<String> = Vec::new();
    for &r in rows {
        if let Some(code) = table.rows[r].code() {
            if !codes.iter().any(|c| c.eq_ignore_ascii_case(code)) {
                codes.push(code.to_string());
            }
        }
    }
    codes
}

/// Canonical code for `token` across every table, best tier first.
///
/// Tables listing the same company agree on its code, so duplicates across
/// sheets collapse; two different codes at the winning tier are ambiguous.
pub fn resolve_entity_code(token: &str, tables: &[Arc<Table>]) -> Result<Option<String>, QueryError> {
    let mut best: Option<Tier> = None;
    let mut codes: Vec<String> = Vec::new();

    for table in tables {
        let Some((tier, rows)) = match_entity(token, table) else {
            continue;
        };
        if best.is_some_and(|b| tier > b) {
            continue;
        }
        if best.is_some_and(|b| tier < b) {
            codes.clear();
        }
        best = Some(tier);
        for code in codes_of(table, &rows) {
            if !codes.iter().any(|c| c.eq_ignore_ascii_case(&code)) {
                codes.push(code);
            }
        }
    }

    match codes.len() {
        0 => Ok(None),
        1 => Ok(codes.pop()),
        _ => Err(QueryError::AmbiguousEntity {
            token: token.to_string(),
            candidates: codes,
        }),
    }
}

fn match_sector(token: &str, table: &Table) -> Option<(Tier, Vec<usize>)> {
    let key = normalize_key(token);
    if key.is_empty() {
        return None;
    }
    let keys: Vec<String> = table.categories.iter().map(|c| normalize_key(&c.label)).collect();

    let exact: Vec<usize> = (0..keys.len()).filter(|&i| keys[i] == key).collect();
    if !exact.is_empty() {
        return Some((Tier::Name, exact));
    }
    let prefix: Vec<usize> = (0..keys.len()).filter(|&i| keys[i].starts_with(&key)).collect();
    if !prefix.is_empty() {
        return Some((Tier::Prefix, prefix));
    }
    None
}

/// Category index in `table` matching `token`.
pub fn resolve_sector(token: &str, table: &Table) -> Result<Option<usize>, QueryError> {
    match match_sector(token, table) {
        None => Ok(None),
        Some((tier, found)) if found.len() > 1 && !tier.is_exact() => {
            Err(QueryError::AmbiguousSector {
                token: token.to_string(),
                candidates: found
                    .iter()
                    .map(|&i| table.categories[i].label.clone())
                    .collect(),
            })
        }
        Some((_, found)) => Ok(found.first().copied()),
    }
}

/// Canonical sector label for `token` across every table.
pub fn resolve_sector_label(token: &str, tables: &[Arc<Table>]) -> Result<Option<String>, QueryError> {
    let mut best: Option<Tier> = None;
    let mut labels: Vec<String> = Vec::new();

    for table in tables {
        let Some((tier, found)) = match_sector(token, table) else {
            continue;
        };
        if best.is_some_and(|b| tier > b) {
            continue;
        }
        if best.is_some_and(|b| tier < b) {
            labels.clear();
        }
        best = Some(tier);
        for i in found {
            let label = &table.categories[i].label;
            if !labels.iter().any(|l| l.eq_ignore_ascii_case(label)) {
                labels.push(label.clone());
            }
        }
    }

    match labels.len() {
        0 => Ok(None),
        1 => Ok(labels.pop()),
        _ => Err(QueryError::AmbiguousSector {
            token: token.to_string(),
            candidates: labels,
        }),
    }
}
