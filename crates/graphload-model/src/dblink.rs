//! Cross-database references.
//!
//! A db-link property may hold several pipe-delimited references, possibly to
//! different external databases. The resolver turns each accepted token into a
//! `DbLink` edge pointing at a `db_<DB>` placeholder keyed by `id`, or at the
//! existing node type a database is declared to link into.

use crate::graph::{Edge, EdgeKind, Graph, Node, PendingRef, MULTI_VALUE_SEPARATOR, PROP_ID};
use crate::mapping::{DbLinkField, DbLinkSource, MappingTable};
use std::collections::HashSet;
use tracing::debug;

/// Edge label for links into `db_name`: `NCBI-GENE` → `NCBI_GENE_LINK`.
pub fn dblink_label(db_name: &str) -> String {
    format!("{}_LINK", db_name.to_uppercase().replace('-', "_"))
}

/// Placeholder node type for `db_name`.
pub fn dblink_target_type(db_name: &str) -> String {
    format!("db_{}", db_name)
}

/// Database name of a db-link edge.
pub fn dblink_db_name(edge: &Edge) -> Option<&str> {
    if edge.kind != EdgeKind::DbLink {
        return None;
    }
    edge.db_name()
}

pub struct DbLinkResolver<'a> {
    mapping: &'a MappingTable,
}

impl<'a> DbLinkResolver<'a> {
    pub fn new(mapping: &'a MappingTable) -> Self {
        Self { mapping }
    }

    /// Add db-link edges to every node; returns the number of edges added.
    pub fn resolve(&self, graph: &mut Graph) -> usize {
        if self.mapping.dblink_fields.is_empty() {
            return 0;
        }
        let added = graph.nodes_mut().map(|n| self.resolve_node(n)).sum();
        debug!(entity = %self.mapping.entity_type, added, "resolved db links");
        added
    }

    pub fn resolve_node(&self, node: &mut Node) -> usize {
        let mut seen: HashSet<(String, String)> = node
            .edges()
            .filter_map(|e| {
                let db = dblink_db_name(e)?;
                Some((db.to_string(), e.pending_target()?.raw_id.clone()))
            })
            .collect();
        let mut added = 0;
        for (property, kind) in &self.mapping.dblink_fields {
            for field in node.values(property) {
                for (source, id) in self.links(kind, &field) {
                    if !seen.insert((source.db_name.clone(), id.clone())) {
                        continue;
                    }
                    let target = PendingRef::new(&source.target_type(), PROP_ID, &id);
                    node.add_edge(Edge::dblink(&source.edge_label(), &source.db_name, target));
                    added += 1;
                }
            }
        }
        added
    }

    /// Accepted `(database, id)` pairs in one raw field.
    fn links(&self, kind: &DbLinkField, field: &str) -> Vec<(&'a DbLinkSource, String)> {
        let mut out = Vec::new();
        for token in split_top_level(field).into_iter().map(str::trim) {
            if token.is_empty() {
                continue;
            }
            let parsed = match kind {
                DbLinkField::Single(db) => self
                    .mapping
                    .find_dblink_source(db)
                    .map(|source| (source, token.to_string())),
                DbLinkField::Mixed => split_mixed_token(token).and_then(|(db, id)| {
                    self.mapping
                        .find_dblink_source(&db)
                        .map(|source| (source, id))
                }),
            };
            match parsed {
                Some((source, id)) => {
                    let id = strip_db_prefix(source, &id);
                    if !id.is_empty() {
                        out.push((source, id));
                    }
                }
                None => debug!(token, "db link from undeclared database ignored"),
            }
        }
        out
    }
}

/// Split on the multi-value separator outside parentheses and quotes, so the
/// `|curator|` symbol inside a `(DB "ID" ...)` tuple stays in its token.
fn split_top_level(field: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut depth = 0usize;
    let mut quoted = false;
    let mut start = 0;
    for (i, c) in field.char_indices() {
        match c {
            '"' => quoted = !quoted,
            '(' if !quoted => depth += 1,
            ')' if !quoted => depth = depth.saturating_sub(1),
            _ if depth == 0 && !quoted && field[i..].starts_with(MULTI_VALUE_SEPARATOR) => {
                tokens.push(&field[start..i]);
                start = i + MULTI_VALUE_SEPARATOR.len();
            }
            _ => {}
        }
    }
    tokens.push(&field[start..]);
    tokens
}

/// `(UNIPROT "P0A6F5" NIL |x| 33 NIL NIL)` or `UNIPROT:P0A6F5` → (db, id).
fn split_mixed_token(token: &str) -> Option<(String, String)> {
    if let Some(inner) = token.strip_prefix('(') {
        let mut parts = inner.split_whitespace();
        let db = parts.next()?.trim_end_matches(')');
        let id = parts.next()?.trim_end_matches(')').trim_matches('"');
        return Some((db.to_string(), id.to_string()));
    }
    let (db, id) = token.split_once(':')?;
    Some((db.trim().to_string(), id.trim().to_string()))
}

fn strip_db_prefix(source: &DbLinkSource, id: &str) -> String {
    if !source.id_has_prefix {
        return id.to_string();
    }
    match id.split_once(':') {
        Some((db, rest)) if db.eq_ignore_ascii_case(&source.db_name) => rest.to_string(),
        _ => id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::ValueType;

    fn go_table(prefixed: bool) -> MappingTable {
        MappingTable::new("Protein", "UNIQUE-ID", "biocyc_id")
            .attr("GO-TERMS", "go", ValueType::Str)
            .dblink_field("go", DbLinkField::Single("GO".to_string()))
            .dblink_source("GO", prefixed)
    }

    fn targets(node: &Node) -> Vec<String> {
        node.edges()
            .filter_map(|e| e.pending_target().map(PendingRef::composite_key))
            .collect()
    }

    #[test]
    fn single_database_field_without_prefix() {
        let table = go_table(false);
        let mut node = Node::new("Protein", "P1");
        node.push_value("go", "1234|5678", ValueType::Str);
        node.push_value("go", "1234", ValueType::Str);
        let added = DbLinkResolver::new(&table).resolve_node(&mut node);
        assert_eq!(added, 2);
        assert_eq!(targets(&node), vec!["GO:1234", "GO:5678"]);
        let edge = node.edges().next().expect("edge");
        assert_eq!(edge.label, "GO_LINK");
        assert_eq!(dblink_db_name(edge), Some("GO"));
    }

    #[test]
    fn prefixed_ids_lose_their_prefix() {
        let table = go_table(true);
        let mut node = Node::new("Protein", "P1");
        node.push_value("go", "GO:0005829", ValueType::Str);
        DbLinkResolver::new(&table).resolve_node(&mut node);
        assert_eq!(targets(&node), vec!["GO:0005829"]);
        assert_eq!(node.edges().next().and_then(|e| e.pending_target()).map(|p| p.raw_id.as_str()), Some("0005829"));
    }

    #[test]
    fn mixed_field_keeps_declared_databases_only() {
        let table = MappingTable::new("Compound", "UNIQUE-ID", "biocyc_id")
            .attr("DBLINKS", "dblinks", ValueType::Str)
            .dblink_field("dblinks", DbLinkField::Mixed)
            .dblink_source("CHEBI", true)
            .dblink_source("PUBCHEM", false);
        let mut node = Node::new("Compound", "C1");
        node.push_value("dblinks", "(CHEBI \"CHEBI:15377\" NIL |kr| 3387 NIL NIL)", ValueType::Str);
        node.push_value("dblinks", "(PUBCHEM \"962\" NIL |kr| 3387 NIL NIL)", ValueType::Str);
        node.push_value("dblinks", "(LIGAND-CPD \"C00001\" NIL |kr| 3387 NIL NIL)", ValueType::Str);
        node.push_value("dblinks", "PUBCHEM:962", ValueType::Str);
        let added = DbLinkResolver::new(&table).resolve_node(&mut node);
        assert_eq!(added, 2);
        assert_eq!(targets(&node), vec!["CHEBI:15377", "PUBCHEM:962"]);
    }

    #[test]
    fn curator_symbol_inside_tuple_is_not_a_separator() {
        let table = MappingTable::new("Gene", "UNIQUE-ID", "biocyc_id")
            .attr("DBLINKS", "dblinks", ValueType::Str)
            .dblink_field("dblinks", DbLinkField::Mixed)
            .dblink_source("UNIPROT", false);
        let mut node = Node::new("Gene", "EG10001");
        node.push_value("dblinks", "(UNIPROT \"P0A6F5\" NIL |x| 33 NIL NIL)", ValueType::Str);
        let added = DbLinkResolver::new(&table).resolve_node(&mut node);
        assert_eq!(added, 1);
        assert_eq!(targets(&node), vec!["UNIPROT:P0A6F5"]);
        assert_eq!(
            split_top_level("(A \"1\" |x|)|B:2|(C \"a|b\")"),
            vec!["(A \"1\" |x|)", "B:2", "(C \"a|b\")"]
        );
    }

    #[test]
    fn linked_database_edges_keep_their_database() {
        let table = MappingTable::new("Gene", "UNIQUE-ID", "biocyc_id")
            .attr("DBLINKS", "dblinks", ValueType::Str)
            .dblink_field("dblinks", DbLinkField::Mixed)
            .dblink_target("NCBI-GENE", false, "IS", "db_NCBI");
        let mut node = Node::new("Gene", "EG10001");
        node.push_value("dblinks", "(NCBI-GENE \"944742\" NIL |kr| 33 NIL NIL)", ValueType::Str);
        node.push_value("dblinks", "NCBI-GENE:944742", ValueType::Str);
        assert_eq!(DbLinkResolver::new(&table).resolve_node(&mut node), 1);
        let edge = node.edges().next().expect("edge");
        assert_eq!(edge.label, "IS");
        assert_eq!(dblink_db_name(edge), Some("NCBI-GENE"));
        let target = edge.pending_target().expect("pending");
        assert_eq!(target.entity_type, "db_NCBI");
        assert_eq!(target.raw_id, "944742");
    }

    #[test]
    fn labels_are_upper_snake() {
        assert_eq!(dblink_label("NCBI-GENE"), "NCBI_GENE_LINK");
        assert_eq!(dblink_target_type("NCBI-GENE"), "db_NCBI-GENE");
    }
}
