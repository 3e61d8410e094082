use std::path::PathBuf;

use finquery_engine::grid::DEFAULT_PLACEHOLDERS;
use finquery_engine::intent::EntityClass;
use finquery_engine::table::{Binding, RowKind};
use finquery_engine::{
    Datum, EngineConfig, Missing, MetricId, QueryError, QueryResult, RawGrid, Session,
};

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn load_grid(name: &str, file: &str) -> RawGrid {
    let path = fixtures_dir().join(file);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(&path)
        .unwrap_or_else(|e| panic!("cannot read {}: {e}", path.display()));
    let rows: Vec<Vec<String>> = reader
        .records()
        .map(|r| r.unwrap().iter().map(str::to_string).collect())
        .collect();
    RawGrid::from_strings(name, &rows, DEFAULT_PLACEHOLDERS)
}

fn workbook() -> Vec<RawGrid> {
    vec![
        load_grid("Market", "market.csv"),
        load_grid("Fundamentals", "fundamentals.csv"),
        load_grid("Sectors", "sectors.csv"),
    ]
}

fn session() -> Session {
    Session::ingest(&workbook(), &EngineConfig::default()).unwrap()
}

// -------------------------------------------------------------------------
// Header inference
// -------------------------------------------------------------------------

#[test]
fn sub_header_leaves_become_columns() {
    let s = session();
    let sectors = s.tables().find(|t| t.sheet == "Sectors").unwrap();
    assert!(sectors.has_sub_header());

    let revenue: Vec<_> = sectors
        .columns
        .iter()
        .filter(|c| c.metric() == Some(&MetricId::new("revenue_3m")))
        .collect();
    assert_eq!(revenue.len(), 2);
    assert_eq!(revenue[0].label, "Revenue 3M > Dec 24");
    match &revenue[0].binding {
        Binding::Metric {
            sub_period,
            share_of_parent,
            ..
        } => {
            assert_eq!(sub_period.as_deref(), Some("Dec 24"));
            assert!(!share_of_parent);
        }
        other => panic!("{other:?}"),
    }
    assert!(revenue[1].is_share());
}

#[test]
fn category_membership_follows_breaks() {
    let s = session();
    let sectors = s.tables().find(|t| t.sheet == "Sectors").unwrap();
    let labels: Vec<&str> = sectors.categories.iter().map(|c| c.label.as_str()).collect();
    assert_eq!(labels, vec!["BANKS", "INSURANCE", "FINANCE"]);

    let assigned: Vec<(&str, &str)> = sectors
        .rows
        .iter()
        .enumerate()
        .filter_map(|(i, row)| match &row.kind {
            RowKind::Entity { code, .. } => {
                Some((code.as_str(), sectors.category_label(sectors.category_of(i))))
            }
            RowKind::CategoryBreak { .. } => None,
        })
        .collect();
    assert_eq!(
        assigned,
        vec![
            ("COMB", "BANKS"),
            ("HNB", "BANKS"),
            ("SAMP", "BANKS"),
            ("CINS", "INSURANCE"),
            ("AINS", "INSURANCE"),
            ("ALLI", "FINANCE"),
            ("LOLC", "FINANCE"),
        ]
    );
}

#[test]
fn simple_sheets_have_no_categories() {
    let s = session();
    for name in ["Market", "Fundamentals"] {
        let t = s.tables().find(|t| t.sheet == name).unwrap();
        assert!(!t.has_categories(), "{name}");
        assert!(!t.has_sub_header(), "{name}");
    }
}

// -------------------------------------------------------------------------
// Queries
// -------------------------------------------------------------------------

#[test]
fn inverted_range_is_rejected() {
    let err = session()
        .handle_query("Show Div Yield where P/E between 20 and 10")
        .unwrap_err();
    assert_eq!(err, QueryError::InvalidRange { low: 20.0, high: 10.0 });
}

#[test]
fn best_sector_by_roe() {
    match session().handle_query("Best sector by ROE").unwrap() {
        QueryResult::Ranking {
            class, entries, ..
        } => {
            assert_eq!(class, EntityClass::Sector);
            assert_eq!(entries.len(), 1);
            assert_eq!(entries[0].label, "BANKS");
        }
        other => panic!("{other:?}"),
    }
}

#[test]
fn ranking_questions_phrased_as_what_is() {
    let s = session();
    match s.handle_query("What is the best sector by ROE?").unwrap() {
        QueryResult::Ranking { class, entries, .. } => {
            assert_eq!(class, EntityClass::Sector);
            assert_eq!(entries[0].label, "BANKS");
        }
        other => panic!("{other:?}"),
    }
    match s.handle_query("What are the top 3 stocks by P/E?").unwrap() {
        QueryResult::Ranking { class, entries, .. } => {
            assert_eq!(class, EntityClass::Stock);
            let labels: Vec<&str> = entries.iter().map(|e| e.label.as_str()).collect();
            assert_eq!(labels, vec!["AINS", "LOLC", "CINS"]);
        }
        other => panic!("{other:?}"),
    }
}

#[test]
fn best_stock_uses_composite_score() {
    match session().handle_query("Which stock is best?").unwrap() {
        QueryResult::CompositeRanking { entries, sheet, .. } => {
            assert_eq!(sheet, "Sectors");
            let labels: Vec<&str> = entries.iter().map(|e| e.label.as_str()).collect();
            assert_eq!(labels, vec!["AINS", "LOLC", "ALLI"]);
        }
        other => panic!("{other:?}"),
    }
}

#[test]
fn lookup_of_several_metrics_with_sheets() {
    let s = session();
    match s
        .handle_query("price from market and eps from fundamentals for comb")
        .unwrap()
    {
        QueryResult::Table { columns, rows, .. } => {
            assert_eq!(columns[0].id, MetricId::new("price"));
            assert_eq!(rows[0].cells[0].value, Datum::Number(120.5));
            assert_eq!(rows[0].cells[1].value, Datum::Number(22.4));
        }
        other => panic!("{other:?}"),
    }
    assert!(s
        .handle_query("P/E and PBV for sector BANKS")
        .unwrap()
        .is_unrecognized());
}

#[test]
fn entity_versus_sector() {
    match session()
        .handle_query("ALLI vs sector BANKS by Revenue 3M")
        .unwrap()
    {
        QueryResult::Comparison { entries, .. } => {
            let labels: Vec<&str> = entries.iter().map(|e| e.label.as_str()).collect();
            assert_eq!(labels, vec!["ALLI", "BANKS"]);
        }
        other => panic!("{other:?}"),
    }
}

#[test]
fn define_matches_catalog_text() {
    let s = session();
    let stored = s
        .catalog()
        .definition_of(&MetricId::new("fcf"))
        .unwrap()
        .to_string();
    for text in ["Define Free Cash Flow", "define   free CASH flow", "DEFINE FCF"] {
        match s.handle_query(text).unwrap() {
            QueryResult::Definition { text, .. } => assert_eq!(text, stored),
            other => panic!("{text}: {other:?}"),
        }
    }
}

#[test]
fn unknown_term_is_unrecognized() {
    let s = session();
    assert!(s.handle_query("Zyx for ALLI").unwrap().is_unrecognized());
    assert!(s.handle_query("P/E for NOSUCH").unwrap().is_unrecognized());
    assert!(s.handle_query("Zyx revenue for ALLI").unwrap().is_unrecognized());
    assert!(s.handle_query("define zyx").unwrap().is_unrecognized());
    // an unknown term wins over the inverted bounds
    assert!(s
        .handle_query("show pe where zyx between 5 and 1")
        .unwrap()
        .is_unrecognized());
}

#[test]
fn partial_comparison_keeps_every_target() {
    match session()
        .handle_query("Compare stocks COMB, JKH by P/E")
        .unwrap()
    {
        QueryResult::Comparison { entries, .. } => {
            assert_eq!(entries.len(), 2);
            assert_eq!(entries[0].reading.value, Datum::Number(5.2));
            assert_eq!(
                entries[1].reading.value,
                Datum::Missing(Missing::NotListed)
            );
        }
        other => panic!("{other:?}"),
    }
}

#[test]
fn bracketed_negatives_are_numbers() {
    match session().handle_query("Free cash flow for SAMP").unwrap() {
        QueryResult::Scalar { reading, .. } => {
            assert_eq!(reading.value, Datum::Number(-1200.0));
        }
        other => panic!("{other:?}"),
    }
}

#[test]
fn results_serialize_for_renderers() {
    let result = session().handle_query("ROE for HNB").unwrap();
    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["type"], "scalar");
    assert_eq!(json["metric"]["id"], "roe");
    assert_eq!(json["reading"]["value"]["type"], "missing");
    assert_eq!(json["reading"]["value"]["value"]["reason"], "pending");
}

// -------------------------------------------------------------------------
// Configuration
// -------------------------------------------------------------------------

#[test]
fn alias_override_reaches_parser() {
    let config = EngineConfig::from_toml(
        "[catalog.aliases]\npe = [\"valuation multiple\"]\n",
    )
    .unwrap();
    let s = Session::ingest(&workbook(), &config).unwrap();
    match s.handle_query("valuation multiple for LOLC").unwrap() {
        QueryResult::Scalar { reading, .. } => assert_eq!(reading.value, Datum::Number(11.0)),
        other => panic!("{other:?}"),
    }
}

#[test]
fn composite_weights_from_config() {
    let config = EngineConfig::from_toml(
        "[query]\nleaderboard_size = 2\n\n[[query.composite]]\nmetric = \"ROE\"\nweight = 1.0\n",
    )
    .unwrap();
    let s = Session::ingest(&workbook(), &config).unwrap();
    match s.handle_query("best stock").unwrap() {
        QueryResult::CompositeRanking {
            components,
            entries,
            excluded,
            ..
        } => {
            assert_eq!(components.len(), 1);
            assert_eq!(components[0].metric.id, MetricId::new("roe"));
            let labels: Vec<&str> = entries.iter().map(|e| e.label.as_str()).collect();
            assert_eq!(labels, vec!["SAMP", "LOLC"]);
            assert_eq!(excluded, 3);
        }
        other => panic!("{other:?}"),
    }
}

#[test]
fn compare_default_metric_from_config() {
    let config = EngineConfig::from_toml("[query]\ndefault_compare_metric = \"PBV\"\n").unwrap();
    let s = Session::ingest(&workbook(), &config).unwrap();
    match s.handle_query("Compare COMB, HNB").unwrap() {
        QueryResult::Comparison { metric, .. } => assert_eq!(metric.id, MetricId::new("pbv")),
        other => panic!("{other:?}"),
    }
}
