//! BioCyc flat-file profiles.
//!
//! Every BioCyc entity shares the `UNIQUE-ID` key, the `biocyc_id` property
//! and the `db_BioCyc` label. Proteins and reactions carry hooks that drop
//! `TYPE_OF` edges to generic classes which add nothing to the graph.

use super::ncbi_gene;
use graphload_model::{
    DbLinkField, Direction, Edge, Graph, MappingTable, RelationshipType, SourceFormat,
    SourceProfile, ValueType, PROP_COMMENT, PROP_NAME, PROP_SYNONYMS,
};

pub const DATA_SOURCE: &str = "BioCyc";
pub const DB_LABEL: &str = "db_BioCyc";
pub const UNIQUE_ID: &str = "UNIQUE-ID";
pub const PROP_BIOCYC_ID: &str = "biocyc_id";

pub const NODE_GENE: &str = "Gene";
pub const NODE_PROTEIN: &str = "Protein";
pub const NODE_REACTION: &str = "Reaction";
pub const NODE_COMPOUND: &str = "Compound";
pub const NODE_PATHWAY: &str = "Pathway";
pub const NODE_CLASS: &str = "Class";
pub const NODE_COMPLEX: &str = "Complex";
pub const NODE_ENZ_REACTION: &str = "EnzReaction";
pub const NODE_TRANS_UNIT: &str = "TranscriptionUnit";

pub const REL_TYPE_OF: &str = "TYPE_OF";
pub const REL_ENCODES: &str = "ENCODES";
pub const REL_COMPONENT_OF: &str = "COMPONENT_OF";
pub const REL_MODIFIED_TO: &str = "MODIFIED_TO";
pub const REL_CONSUMED_BY: &str = "CONSUMED_BY";
pub const REL_PRODUCES: &str = "PRODUCES";
pub const REL_IN_PATHWAY: &str = "IN_PATHWAY";
pub const REL_CATALYZES: &str = "CATALYZES";
pub const REL_ELEMENT_OF: &str = "ELEMENT_OF";
/// BioCyc gene to the NCBI gene loaded from `gene_info`.
pub const REL_IS: &str = "IS";

const POLYPEPTIDES: &str = "Polypeptides";
const MODIFIED_PROTEINS: &str = "Modified-Proteins";
const COMPLEXES: &str = "Complexes";
const CHEMICAL_REACTIONS: &str = "Chemical-Reactions";
const SMALL_MOLECULE_REACTIONS: &str = "Small-Molecule-Reactions";

fn base_mapping(entity: &str) -> MappingTable {
    MappingTable::new(entity, UNIQUE_ID, PROP_BIOCYC_ID)
        .attr(UNIQUE_ID, PROP_BIOCYC_ID, ValueType::Str)
        .attr("COMMON-NAME", PROP_NAME, ValueType::Str)
        .attr("SYNONYMS", PROP_SYNONYMS, ValueType::Str)
        .attr("COMMENT", PROP_COMMENT, ValueType::Str)
}

fn type_of() -> RelationshipType {
    RelationshipType::new(REL_TYPE_OF, Direction::To, NODE_CLASS)
}

fn profile(name: &str, mapping: MappingTable, files: &[&str]) -> SourceProfile {
    SourceProfile::new(name, DATA_SOURCE, SourceFormat::AttributeValue, mapping)
        .with_labels(&[DB_LABEL])
        .with_files(files)
}

pub fn gene() -> SourceProfile {
    let mapping = base_mapping(NODE_GENE)
        .attr("ACCESSION-1", "accession", ValueType::Str)
        .attr("LEFT-END-POSITION", "", ValueType::Int)
        .attr("RIGHT-END-POSITION", "", ValueType::Int)
        .attr("TRANSCRIPTION-DIRECTION", "strand", ValueType::Str)
        .attr("DBLINKS", "dblinks", ValueType::Str)
        .dblink_field("dblinks", DbLinkField::Mixed)
        .dblink_target("NCBI-GENE", false, REL_IS, ncbi_gene::DB_LABEL)
        .columns(&[
            "id",
            PROP_BIOCYC_ID,
            PROP_NAME,
            "accession",
            "left_end_position",
            "right_end_position",
            "strand",
            "data_source",
        ]);
    profile("biocyc-gene", mapping, &["genes.dat"]).with_synonyms(&["accession"])
}

pub fn protein() -> SourceProfile {
    let mapping = base_mapping(NODE_PROTEIN)
        .attr("ABBREV-NAME", "abbrev_name", ValueType::Str)
        .attr("MOLECULAR-WEIGHT-KD", "molecular_weight_kd", ValueType::Number)
        .attr("PI", "pi", ValueType::Number)
        .attr("LOCATIONS", "location", ValueType::Str)
        .attr("GO-TERMS", "go_terms", ValueType::Str)
        .relationship("TYPES", type_of())
        .relationship(
            "COMPONENTS",
            RelationshipType::new(REL_COMPONENT_OF, Direction::From, NODE_PROTEIN),
        )
        .relationship(
            "GENE",
            RelationshipType::new(REL_ENCODES, Direction::From, NODE_GENE),
        )
        .relationship(
            "MODIFIED-FORM",
            RelationshipType::new(REL_MODIFIED_TO, Direction::To, NODE_PROTEIN),
        )
        .dblink_field("go_terms", DbLinkField::Single("GO".to_string()))
        .dblink_source("GO", false)
        .columns(&[
            "id",
            PROP_BIOCYC_ID,
            PROP_NAME,
            "abbrev_name",
            "molecular_weight_kd",
            "pi",
            "location",
            "data_source",
        ]);
    profile("biocyc-protein", mapping, &["proteins.dat", "protligandcplxes.dat"])
        .with_synonyms(&["abbrev_name"])
        .with_dynamic_labels(&[NODE_COMPLEX])
        .with_hook(prune_protein_types)
}

pub fn reaction() -> SourceProfile {
    let compartment = |rel: RelationshipType| rel.with_edge_attribute("^COMPARTMENT", "compartment");
    let mapping = base_mapping(NODE_REACTION)
        .attr("EC-NUMBER", "ec_number", ValueType::Str)
        .attr("SYSTEMATIC-NAME", "other_name", ValueType::Str)
        .attr("REACTION-DIRECTION", "direction", ValueType::Str)
        .attr("RXN-LOCATIONS", "location", ValueType::Str)
        .attr("GIBBS-0", "", ValueType::Number)
        .relationship("TYPES", type_of())
        .relationship(
            "LEFT",
            compartment(RelationshipType::new(REL_CONSUMED_BY, Direction::From, NODE_COMPOUND)),
        )
        .relationship(
            "RIGHT",
            compartment(RelationshipType::new(REL_PRODUCES, Direction::To, NODE_COMPOUND)),
        )
        .dblink_field("ec_number", DbLinkField::Single("ENZYME".to_string()))
        .dblink_source("ENZYME", false)
        .columns(&[
            "id",
            PROP_BIOCYC_ID,
            PROP_NAME,
            "ec_number",
            "direction",
            "location",
            "gibbs_0",
            "data_source",
        ]);
    profile("biocyc-reaction", mapping, &["reactions.dat"])
        .with_synonyms(&["other_name"])
        .with_hook(prune_reaction_types)
}

pub fn compound() -> SourceProfile {
    let mapping = base_mapping(NODE_COMPOUND)
        .attr("ABBREV-NAME", "abbrev_name", ValueType::Str)
        .attr("INCHI-KEY", "inchi_key", ValueType::Str)
        .attr("INCHI", "inchi", ValueType::Str)
        .attr("SMILES", "smiles", ValueType::Str)
        .attr("MOLECULAR-WEIGHT", "molecular_weight", ValueType::Number)
        .attr("DBLINKS", "dblinks", ValueType::Str)
        .relationship("TYPES", type_of())
        .dblink_field("dblinks", DbLinkField::Mixed)
        .dblink_source("CHEBI", true)
        .dblink_source("PUBCHEM", false)
        .dblink_source("HMDB", false)
        .columns(&[
            "id",
            PROP_BIOCYC_ID,
            PROP_NAME,
            "abbrev_name",
            "inchi_key",
            "inchi",
            "smiles",
            "molecular_weight",
            "data_source",
        ]);
    profile("biocyc-compound", mapping, &["compounds.dat"]).with_synonyms(&["abbrev_name"])
}

pub fn pathway() -> SourceProfile {
    let mapping = base_mapping(NODE_PATHWAY)
        .relationship("TYPES", type_of())
        .relationship(
            "REACTION-LIST",
            RelationshipType::new(REL_IN_PATHWAY, Direction::From, NODE_REACTION),
        )
        .relationship(
            "SUPER-PATHWAYS",
            RelationshipType::new(REL_IN_PATHWAY, Direction::To, NODE_PATHWAY),
        )
        .columns(&["id", PROP_BIOCYC_ID, PROP_NAME, "data_source"]);
    profile("biocyc-pathway", mapping, &["pathways.dat"]).with_synonyms(&[])
}

pub fn class() -> SourceProfile {
    let mapping = base_mapping(NODE_CLASS)
        .relationship("TYPES", type_of())
        .columns(&["id", PROP_BIOCYC_ID, PROP_NAME, "data_source"]);
    profile("biocyc-class", mapping, &["classes.dat"]).with_synonyms(&[])
}

/// Enzymatic reactions tie a catalysing protein to the reaction it runs.
pub fn enzyme_reaction() -> SourceProfile {
    let mapping = base_mapping(NODE_ENZ_REACTION)
        .attr("REACTION-DIRECTION", "direction", ValueType::Str)
        .relationship(
            "ENZYME",
            RelationshipType::new(REL_CATALYZES, Direction::From, NODE_PROTEIN),
        )
        .relationship(
            "REACTION",
            RelationshipType::new(REL_CATALYZES, Direction::To, NODE_REACTION),
        )
        .columns(&["id", PROP_BIOCYC_ID, PROP_NAME, "direction", "data_source"]);
    profile("biocyc-enzreaction", mapping, &["enzrxns.dat"]).with_synonyms(&[])
}

/// Transcription unit components are genes, promoters, terminators and
/// binding sites; every one of them carries the `db_BioCyc` label.
pub fn transcription_unit() -> SourceProfile {
    let mapping = base_mapping(NODE_TRANS_UNIT)
        .relationship(
            "COMPONENTS",
            RelationshipType::new(REL_ELEMENT_OF, Direction::From, DB_LABEL),
        )
        .columns(&["id", PROP_BIOCYC_ID, PROP_NAME, "data_source"]);
    profile("biocyc-transunit", mapping, &["transunits.dat"])
        .with_file_stem("transunit")
        .with_synonyms(&[])
}

pub fn profiles() -> Vec<SourceProfile> {
    vec![
        class(),
        compound(),
        gene(),
        protein(),
        reaction(),
        pathway(),
        enzyme_reaction(),
        transcription_unit(),
    ]
}

// ============================================================================
// Post-process hooks
// ============================================================================

fn type_target(edge: &Edge) -> Option<&str> {
    if edge.label != REL_TYPE_OF {
        return None;
    }
    edge.pending_target().map(|p| p.raw_id.as_str())
}

/// Drop generic protein classes.
///
/// - `Polypeptides`: the `TYPE_OF` edge goes
/// - `Modified-Proteins`: the edge goes along with the node's `ENCODES`
///   edges, so encoding points at the unmodified polypeptide only
/// - `*Complexes`: the node gains a `Complex` label and the edge goes
pub fn prune_protein_types(graph: &mut Graph) -> usize {
    let mut changed = 0;
    for node in graph.nodes_mut() {
        let types: Vec<String> = node
            .edges()
            .filter_map(type_target)
            .map(str::to_string)
            .collect();
        for class in types {
            let is_class = |e: &Edge| type_target(e) == Some(class.as_str());
            if class == POLYPEPTIDES {
                changed += node.remove_edges_where(is_class);
            } else if class == MODIFIED_PROTEINS {
                changed += node.remove_edges_where(is_class);
                changed += node.remove_edges_where(|e| e.label == REL_ENCODES);
            } else if class.ends_with(COMPLEXES) {
                node.add_label(NODE_COMPLEX);
                changed += node.remove_edges_where(is_class);
            }
        }
    }
    changed
}

/// Drop `TYPE_OF` edges to the catch-all reaction classes.
pub fn prune_reaction_types(graph: &mut Graph) -> usize {
    graph
        .nodes_mut()
        .map(|node| {
            node.remove_edges_where(|e| {
                matches!(type_target(e), Some(CHEMICAL_REACTIONS | SMALL_MOLECULE_REACTIONS))
            })
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphload_model::{Node, PendingRef};

    fn edge(label: &str, target_type: &str, id: &str) -> Edge {
        Edge::pending(label, Direction::To, PendingRef::new(target_type, PROP_BIOCYC_ID, id))
    }

    fn labels(node: &Node) -> Vec<String> {
        node.edges()
            .map(|e| format!("{}:{}", e.label, e.pending_target().map(|p| p.raw_id.as_str()).unwrap_or("")))
            .collect()
    }

    #[test]
    fn builtin_profiles_validate() {
        for profile in profiles() {
            profile.validate().expect("valid profile");
        }
    }

    #[test]
    fn polypeptide_type_is_removed_alone() {
        let mut node = Node::new(NODE_PROTEIN, "P1");
        node.add_edge(edge(REL_TYPE_OF, NODE_CLASS, POLYPEPTIDES));
        node.add_edge(edge(REL_TYPE_OF, NODE_CLASS, "Enzymes"));
        node.add_edge(edge(REL_ENCODES, NODE_GENE, "G1"));
        let mut graph: Graph = std::iter::once(node).collect();

        assert_eq!(prune_protein_types(&mut graph), 1);
        let node = graph.nodes().next().expect("node");
        assert_eq!(labels(node), vec!["TYPE_OF:Enzymes", "ENCODES:G1"]);
    }

    #[test]
    fn modified_proteins_lose_encodes_edges() {
        let mut node = Node::new(NODE_PROTEIN, "P1-phospho");
        node.add_edge(edge(REL_TYPE_OF, NODE_CLASS, MODIFIED_PROTEINS));
        node.add_edge(edge(REL_ENCODES, NODE_GENE, "G1"));
        node.add_edge(edge(REL_MODIFIED_TO, NODE_PROTEIN, "P2"));
        let mut graph: Graph = std::iter::once(node).collect();

        assert_eq!(prune_protein_types(&mut graph), 2);
        let node = graph.nodes().next().expect("node");
        assert_eq!(labels(node), vec!["MODIFIED_TO:P2"]);
    }

    #[test]
    fn complexes_become_a_label() {
        let mut node = Node::new(NODE_PROTEIN, "CPLX-1");
        node.add_edge(edge(REL_TYPE_OF, NODE_CLASS, "Protein-Complexes"));
        let mut graph: Graph = std::iter::once(node).collect();

        prune_protein_types(&mut graph);
        let node = graph.nodes().next().expect("node");
        assert!(node.has_label(NODE_COMPLEX));
        assert_eq!(node.edges().count(), 0);
    }

    #[test]
    fn generic_reaction_types_are_pruned() {
        let mut node = Node::new(NODE_REACTION, "RXN-1");
        node.add_edge(edge(REL_TYPE_OF, NODE_CLASS, CHEMICAL_REACTIONS));
        node.add_edge(edge(REL_TYPE_OF, NODE_CLASS, SMALL_MOLECULE_REACTIONS));
        node.add_edge(edge(REL_TYPE_OF, NODE_CLASS, "Redox-Reactions"));
        node.add_edge(edge(REL_CONSUMED_BY, NODE_COMPOUND, "WATER"));
        let mut graph: Graph = std::iter::once(node).collect();

        assert_eq!(prune_reaction_types(&mut graph), 2);
        let node = graph.nodes().next().expect("node");
        assert_eq!(labels(node), vec!["TYPE_OF:Redox-Reactions", "CONSUMED_BY:WATER"]);
    }
}
