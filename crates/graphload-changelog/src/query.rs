//! Cypher templates for the changesets.
//!
//! Every data-file query starts with `UNWIND $rows AS row`: the loader binds
//! each file row to `row`, keyed by the header columns. All writes are
//! `MERGE`-based so a changeset can be re-applied to a partially loaded
//! database.

use graphload_model::ValueType;
use std::collections::BTreeMap;

pub const SYNONYM_LABEL: &str = "Synonym";
pub const HAS_SYNONYM: &str = "HAS_SYNONYM";

/// Label or relationship type, backquoted unless it is a plain identifier.
pub fn ident(name: &str) -> String {
    let plain = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if plain {
        name.to_string()
    } else {
        format!("`{}`", name.replace('`', "``"))
    }
}

/// Single-quoted Cypher string literal.
pub fn literal(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

fn row_value(column: &str, value_type: ValueType) -> String {
    let access = format!("row.{}", ident(column));
    match value_type {
        ValueType::Str => access,
        ValueType::Int => format!("toInteger({})", access),
        ValueType::Number => format!("toFloat({})", access),
    }
}

pub fn create_constraint(label: &str, property: &str) -> String {
    format!(
        "CREATE CONSTRAINT IF NOT EXISTS ON (n:{}) ASSERT n.{} IS UNIQUE",
        ident(label),
        ident(property)
    )
}

pub fn create_index(label: &str, property: &str) -> String {
    format!(
        "CREATE INDEX IF NOT EXISTS FOR (n:{}) ON (n.{})",
        ident(label),
        ident(property)
    )
}

/// `WITH row WHERE row.<column> = '<value>'`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowFilter {
    pub column: String,
    pub value: String,
}

impl RowFilter {
    pub fn new(column: &str, value: &str) -> Self {
        Self {
            column: column.to_string(),
            value: value.to_string(),
        }
    }

    fn condition(&self) -> String {
        format!("row.{} = {}", ident(&self.column), literal(&self.value))
    }
}

// ============================================================================
// Nodes
// ============================================================================

#[derive(Debug, Clone)]
pub struct NodeUpsert {
    label: String,
    id_property: String,
    extra_labels: Vec<String>,
    properties: Vec<String>,
    value_types: BTreeMap<String, ValueType>,
    filter: Option<RowFilter>,
}

impl NodeUpsert {
    pub fn new(label: &str, id_property: &str) -> Self {
        Self {
            label: label.to_string(),
            id_property: id_property.to_string(),
            extra_labels: Vec::new(),
            properties: Vec::new(),
            value_types: BTreeMap::new(),
            filter: None,
        }
    }

    pub fn labels(mut self, labels: &[String]) -> Self {
        self.extra_labels = labels
            .iter()
            .filter(|l| **l != self.label)
            .cloned()
            .collect();
        self
    }

    pub fn properties(mut self, properties: &[String]) -> Self {
        self.properties = properties.to_vec();
        self
    }

    pub fn typed(mut self, value_types: BTreeMap<String, ValueType>) -> Self {
        self.value_types = value_types;
        self
    }

    pub fn filter(mut self, filter: RowFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn to_cypher(&self) -> String {
        let mut lines = vec!["UNWIND $rows AS row".to_string()];
        if let Some(filter) = &self.filter {
            lines.push(format!("WITH row WHERE {}", filter.condition()));
        }
        lines.push(format!(
            "MERGE (n:{} {{{}: row.{}}})",
            ident(&self.label),
            ident(&self.id_property),
            ident(&self.id_property)
        ));
        let mut sets = Vec::new();
        if !self.extra_labels.is_empty() {
            let labels: Vec<String> = self.extra_labels.iter().map(|l| ident(l)).collect();
            sets.push(format!("n:{}", labels.join(":")));
        }
        for property in self.properties.iter().filter(|p| **p != self.id_property) {
            let value_type = self.value_types.get(property).copied().unwrap_or_default();
            sets.push(format!("n.{} = {}", ident(property), row_value(property, value_type)));
        }
        if !sets.is_empty() {
            lines.push(format!("SET {}", sets.join(", ")));
        }
        lines.join("\n")
    }
}

/// Add `label` to the nodes listed (by id) in a label file.
pub fn set_label(entity_label: &str, id_property: &str, label: &str) -> String {
    [
        "UNWIND $rows AS row".to_string(),
        format!(
            "MATCH (n:{} {{{}: row.id}})",
            ident(entity_label),
            ident(id_property)
        ),
        format!("SET n:{}", ident(label)),
    ]
    .join("\n")
}

// ============================================================================
// Synonyms
// ============================================================================

/// Merge `Synonym` nodes by name and link them from the entity.
pub fn upsert_synonyms(entity_label: &str, id_property: &str) -> String {
    [
        "UNWIND $rows AS row".to_string(),
        format!(
            "MERGE (a:{} {{name: row.name}}) SET a.lowercase_name = toLower(row.name)",
            SYNONYM_LABEL
        ),
        format!(
            "WITH row, a MATCH (b:{} {{{}: row.id}})",
            ident(entity_label),
            ident(id_property)
        ),
        format!("MERGE (b)-[:{}]->(a)", HAS_SYNONYM),
    ]
    .join("\n")
}

// ============================================================================
// Relationships
// ============================================================================

/// One end of a relationship: node label, key property, file column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub label: String,
    pub key: String,
    pub column: String,
}

impl Endpoint {
    pub fn new(label: &str, key: &str, column: &str) -> Self {
        Self {
            label: label.to_string(),
            key: key.to_string(),
            column: column.to_string(),
        }
    }

    fn pattern(&self, var: &str) -> String {
        format!(
            "({}:{} {{{}: row.{}}})",
            var,
            ident(&self.label),
            ident(&self.key),
            ident(&self.column)
        )
    }
}

#[derive(Debug, Clone)]
pub struct RelationshipUpsert {
    from: Endpoint,
    to: Endpoint,
    label: String,
    properties: Vec<String>,
    foreach: Option<RowFilter>,
}

impl RelationshipUpsert {
    pub fn new(from: Endpoint, label: &str, to: Endpoint) -> Self {
        Self {
            from,
            to,
            label: label.to_string(),
            properties: Vec::new(),
            foreach: None,
        }
    }

    pub fn properties(mut self, properties: &[String]) -> Self {
        self.properties = properties.to_vec();
        self
    }

    /// Only rows matching `filter` create the relationship.
    pub fn foreach(mut self, filter: RowFilter) -> Self {
        self.foreach = Some(filter);
        self
    }

    pub fn to_cypher(&self) -> String {
        let mut lines = vec![
            "UNWIND $rows AS row".to_string(),
            format!("MATCH {}, {}", self.from.pattern("a"), self.to.pattern("b")),
        ];
        let mut merge = format!("MERGE (a)-[r:{}]->(b)", ident(&self.label));
        if !self.properties.is_empty() {
            let sets: Vec<String> = self
                .properties
                .iter()
                .map(|p| format!("r.{} = row.{}", ident(p), ident(p)))
                .collect();
            merge = format!("{} SET {}", merge, sets.join(", "));
        }
        match &self.foreach {
            Some(filter) => lines.push(format!(
                "FOREACH (item IN CASE WHEN {} THEN [1] ELSE [] END | {})",
                filter.condition(),
                merge
            )),
            None => lines.push(merge),
        }
        lines.push("RETURN COUNT(*)".to_string());
        lines.join("\n")
    }
}

/// Link entities to the targets named in a db-links file. Placeholder
/// targets (`db_<DB>`) are merged; targets another source loads are matched.
pub fn upsert_dblinks(
    entity_label: &str,
    id_property: &str,
    db_name: &str,
    target_label: &str,
    relationship: &str,
    create_target: bool,
) -> String {
    let target_clause = if create_target { "MERGE" } else { "MATCH" };
    [
        "UNWIND $rows AS row".to_string(),
        format!("WITH row WHERE row.db_name = {}", literal(db_name)),
        format!(
            "MATCH (a:{} {{{}: row.from_id}})",
            ident(entity_label),
            ident(id_property)
        ),
        format!(
            "{} (b:{} {{id: row.to_id}})",
            target_clause,
            ident(target_label)
        ),
        format!("MERGE (a)-[:{}]->(b)", ident(relationship)),
        "RETURN COUNT(*)".to_string(),
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_are_quoted_when_needed() {
        assert_eq!(ident("db_BioCyc"), "db_BioCyc");
        assert_eq!(ident("NCBI-GENE"), "`NCBI-GENE`");
        assert_eq!(ident("1abc"), "`1abc`");
        assert_eq!(literal("O'Brien"), "'O\\'Brien'");
    }

    #[test]
    fn node_upsert_sets_labels_and_typed_properties() {
        let mut types = BTreeMap::new();
        types.insert("pi".to_string(), ValueType::Number);
        let query = NodeUpsert::new("Protein", "biocyc_id")
            .labels(&["Protein".to_string(), "db_BioCyc".to_string()])
            .properties(&["biocyc_id".to_string(), "name".to_string(), "pi".to_string()])
            .typed(types)
            .to_cypher();
        assert_eq!(
            query,
            "UNWIND $rows AS row\n\
MERGE (n:Protein {biocyc_id: row.biocyc_id})\n\
SET n:db_BioCyc, n.name = row.name, n.pi = toFloat(row.pi)"
        );
    }

    #[test]
    fn node_upsert_filters_rows() {
        let query = NodeUpsert::new("db_GO", "id")
            .filter(RowFilter::new("namespace", "biological_process"))
            .to_cypher();
        assert!(query.contains("WITH row WHERE row.namespace = 'biological_process'"));
        assert!(!query.contains("SET"));
    }

    #[test]
    fn relationship_upsert_uses_foreach_filter() {
        let query = RelationshipUpsert::new(
            Endpoint::new("Compound", "biocyc_id", "from_id"),
            "CONSUMED_BY",
            Endpoint::new("Reaction", "biocyc_id", "to_id"),
        )
        .properties(&["compartment".to_string()])
        .foreach(RowFilter::new("relationship", "CONSUMED_BY"))
        .to_cypher();
        assert_eq!(
            query,
            "UNWIND $rows AS row\n\
MATCH (a:Compound {biocyc_id: row.from_id}), (b:Reaction {biocyc_id: row.to_id})\n\
FOREACH (item IN CASE WHEN row.relationship = 'CONSUMED_BY' THEN [1] ELSE [] END | \
MERGE (a)-[r:CONSUMED_BY]->(b) SET r.compartment = row.compartment)\n\
RETURN COUNT(*)"
        );
    }

    #[test]
    fn synonym_and_dblink_queries_merge() {
        let synonyms = upsert_synonyms("Gene", "biocyc_id");
        assert!(synonyms.contains("MERGE (a:Synonym {name: row.name})"));
        assert!(synonyms.contains("MATCH (b:Gene {biocyc_id: row.id})"));
        assert!(synonyms.contains("MERGE (b)-[:HAS_SYNONYM]->(a)"));

        let links = upsert_dblinks("Protein", "biocyc_id", "GO", "db_GO", "GO_LINK", true);
        assert!(links.contains("WITH row WHERE row.db_name = 'GO'"));
        assert!(links.contains("MERGE (b:db_GO {id: row.to_id})"));

        let genes = upsert_dblinks("Gene", "biocyc_id", "NCBI-GENE", "db_NCBI", "IS", false);
        assert!(genes.contains("WITH row WHERE row.db_name = 'NCBI-GENE'"));
        assert!(genes.contains("MATCH (b:db_NCBI {id: row.to_id})"));
        assert!(genes.contains("MERGE (a)-[:IS]->(b)"));
        assert!(!genes.contains("MERGE (b:"));
    }

    #[test]
    fn schema_queries_are_idempotent() {
        assert_eq!(
            create_constraint("Gene", "biocyc_id"),
            "CREATE CONSTRAINT IF NOT EXISTS ON (n:Gene) ASSERT n.biocyc_id IS UNIQUE"
        );
        assert_eq!(
            create_index("Synonym", "lowercase_name"),
            "CREATE INDEX IF NOT EXISTS FOR (n:Synonym) ON (n.lowercase_name)"
        );
    }
}
