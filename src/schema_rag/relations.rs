//! Static knowledge about the served dataset: which tables must never be
//! mixed in, and which tables need a join partner present.

use crate::schema::TableContext;
use std::collections::{BTreeSet, HashSet};

/// Tables from an unrelated dataset sharing the catalog; no keys are shared
/// with the served tables.
pub const EXCLUDED_TABLES: &[&str] = &["SUPERSTORE_SALES"];

/// One-hop foreign-key partners: (table, tables it joins through)
pub const FK_PARTNERS: &[(&str, &[&str])] = &[
    ("ORDER_ITEMS", &["ORDERS"]),
    ("ORDER_REVIEWS", &["ORDERS"]),
    ("ORDER_PAYMENTS", &["ORDERS"]),
    ("ORDERS", &["CUSTOMERS"]),
];

pub fn is_excluded(table_name: &str) -> bool {
    EXCLUDED_TABLES
        .iter()
        .any(|t| t.eq_ignore_ascii_case(table_name))
}

/// Drop tables belonging to the excluded dataset
pub fn filter_dataset_mixing(tables: Vec<TableContext>) -> Vec<TableContext> {
    tables
        .into_iter()
        .filter(|t| !is_excluded(&t.table_name))
        .collect()
}

pub fn partners_of(table_name: &str) -> &'static [&'static str] {
    FK_PARTNERS
        .iter()
        .find(|(table, _)| table.eq_ignore_ascii_case(table_name))
        .map(|(_, partners)| *partners)
        .unwrap_or(&[])
}

/// Declared partners of the given tables that are not among them, sorted
pub fn missing_partners(tables: &[TableContext]) -> Vec<String> {
    let present: HashSet<String> = tables
        .iter()
        .map(|t| t.table_name.to_uppercase())
        .collect();

    tables
        .iter()
        .flat_map(|t| partners_of(&t.table_name).iter())
        .filter(|p| !present.contains(**p))
        .map(|p| p.to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
