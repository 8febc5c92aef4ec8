//! Gene Ontology profile.

use graphload_model::{
    Direction, Graph, MappingTable, RelationshipType, SourceFormat, SourceProfile, ValueType,
    PROP_NAME, PROP_SYNONYMS,
};

pub const DATA_SOURCE: &str = "GO";
/// GO terms are the `db_GO` nodes that protein db links point at.
pub const NODE_GO: &str = "db_GO";
pub const ID_PREFIX: &str = "GO:";
pub const PROP_NAMESPACE: &str = "namespace";

/// The three GO namespaces.
pub const NAMESPACES: [&str; 3] = ["biological_process", "molecular_function", "cellular_component"];

/// Labels `relationship:` lines produce in go.obo.
pub const RELATIONSHIP_LABELS: [&str; 8] = [
    "ENDS_DURING",
    "HAPPENS_DURING",
    "HAS_PART",
    "NEGATIVELY_REGULATES",
    "OCCURS_IN",
    "PART_OF",
    "POSITIVELY_REGULATES",
    "REGULATES",
];

pub fn profile() -> SourceProfile {
    let namespace_labels: Vec<String> = NAMESPACES.iter().map(|ns| namespace_label(ns)).collect();
    let namespace_labels: Vec<&str> = namespace_labels.iter().map(String::as_str).collect();
    let term = |label: &str| RelationshipType::new(label, Direction::To, NODE_GO);
    let mapping = MappingTable::new(NODE_GO, "id", "id")
        .attr("id", "id", ValueType::Str)
        .attr("name", PROP_NAME, ValueType::Str)
        .attr("namespace", PROP_NAMESPACE, ValueType::Str)
        .attr("def", "description", ValueType::Str)
        .attr("synonym", PROP_SYNONYMS, ValueType::Str)
        .attr("is_obsolete", "obsolete", ValueType::Str)
        .attr("alt_id", "alt_id", ValueType::Str)
        .relationship("is_a", term("IS_A"))
        .relationship("replaced_by", term("REPLACED_BY"))
        // label comes from the line itself
        .relationship(
            "relationship",
            term("RELATIONSHIP").with_known_labels(&RELATIONSHIP_LABELS),
        )
        .columns(&[
            "id",
            PROP_NAME,
            "description",
            "alt_id",
            "obsolete",
            PROP_NAMESPACE,
            "data_source",
        ]);
    SourceProfile::new("go", DATA_SOURCE, SourceFormat::Stanza, mapping)
        .with_file_stem("go")
        .with_files(&["go.obo"])
        .with_id_prefix(ID_PREFIX)
        .with_synonyms(&[])
        .with_partitions(PROP_NAMESPACE, &NAMESPACES)
        .with_dynamic_labels(&namespace_labels)
        .with_hook(add_namespace_labels)
}

/// `biological_process` → `BiologicalProcess`.
pub fn namespace_label(namespace: &str) -> String {
    namespace
        .split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

/// Tag every term with its namespace label.
pub fn add_namespace_labels(graph: &mut Graph) -> usize {
    let mut labelled = 0;
    for node in graph.nodes_mut() {
        let namespace = node.field(PROP_NAMESPACE);
        if namespace.is_empty() {
            continue;
        }
        node.add_label(&namespace_label(&namespace));
        labelled += 1;
    }
    labelled
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphload_model::Node;

    #[test]
    fn namespace_labels_are_title_case() {
        let labels: Vec<_> = NAMESPACES.iter().map(|ns| namespace_label(ns)).collect();
        assert_eq!(labels, vec!["BiologicalProcess", "MolecularFunction", "CellularComponent"]);
    }

    #[test]
    fn hook_labels_terms_with_namespace() {
        let mut term = Node::new(NODE_GO, "0005575");
        term.push_value(PROP_NAMESPACE, "cellular_component", ValueType::Str);
        let bare = Node::new(NODE_GO, "0000000");
        let mut graph: Graph = vec![term, bare].into_iter().collect();

        assert_eq!(add_namespace_labels(&mut graph), 1);
        let term = graph.node(graph.find(NODE_GO, "0005575").expect("term"));
        assert!(term.has_label("CellularComponent"));
    }

    #[test]
    fn profile_validates() {
        profile().validate().expect("valid");
    }

    #[test]
    fn profile_declares_every_namespace_and_relation() {
        let profile = profile();
        assert_eq!(profile.partition_values, NAMESPACES.to_vec());
        assert_eq!(
            profile.dynamic_labels,
            vec!["BiologicalProcess", "MolecularFunction", "CellularComponent"]
        );
        let relationship = profile.mapping.relationships.get("relationship").expect("declared");
        assert!(relationship.labels().contains(&"PART_OF"));
        assert!(!relationship.labels().contains(&"RELATIONSHIP"));
    }
}
