//! Synonym extraction.
//!
//! Every node with a non-empty `synonyms` attribute contributes rows for its
//! synonyms plus its name and any configured short-name/accession properties.
//! Values that are a single character or carry no letter are useless for text
//! search and are dropped.

use crate::graph::{Node, MULTI_VALUE_SEPARATOR, PROP_NAME, PROP_SYNONYMS};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SynonymRow {
    pub id: String,
    pub name: String,
}

/// True when `value` is worth indexing as a synonym.
pub fn is_searchable_synonym(value: &str) -> bool {
    value.chars().count() > 1 && value.chars().any(char::is_alphabetic)
}

/// Split a pipe-delimited field and keep the searchable parts.
pub fn split_synonyms(field: &str) -> Vec<String> {
    field
        .split(MULTI_VALUE_SEPARATOR)
        .map(str::trim)
        .filter(|v| is_searchable_synonym(v))
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct SynonymExtractor {
    extra_properties: Vec<String>,
}

impl SynonymExtractor {
    /// `extra_properties` are read after `name`, e.g. `abbrev_name`, `accession`.
    pub fn new(extra_properties: &[String]) -> Self {
        Self {
            extra_properties: extra_properties.to_vec(),
        }
    }

    /// Rows in node order, then name, extra properties, synonyms. Exact
    /// duplicates within one call are dropped.
    pub fn extract<'a>(&self, nodes: impl IntoIterator<Item = &'a Node>) -> Vec<SynonymRow> {
        let mut seen = HashSet::new();
        let mut rows = Vec::new();
        for node in nodes {
            for name in self.node_synonyms(node) {
                let row = SynonymRow {
                    id: node.id().to_string(),
                    name,
                };
                if seen.insert(row.clone()) {
                    rows.push(row);
                }
            }
        }
        rows
    }

    fn node_synonyms(&self, node: &Node) -> Vec<String> {
        let raw = node.values(PROP_SYNONYMS);
        if raw.iter().all(|v| v.trim().is_empty()) {
            return Vec::new();
        }
        let mut out = Vec::new();
        let primary = std::iter::once(PROP_NAME)
            .chain(self.extra_properties.iter().map(String::as_str));
        for property in primary {
            for value in node.values(property) {
                out.extend(split_synonyms(&value));
            }
        }
        out.extend(raw.iter().flat_map(|v| split_synonyms(v)));
        out
    }
}
