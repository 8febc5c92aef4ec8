//! Source ingestion for graphload.
//!
//! Turns raw source files into a `Graph` according to a `SourceProfile`:
//! - `records`: tokenizers for attribute-value and stanza files
//! - `dat`: attribute-value parser (BioCyc `.dat`)
//! - `obo`: stanza parser (OBO ontologies)
//! - `table`: chunked delimited-table reader
//! - `sources`: built-in profiles and their post-processing hooks

pub mod dat;
pub mod error;
pub mod obo;
pub mod records;
pub mod sources;
pub mod table;

pub use dat::AttributeValueParser;
pub use error::{IngestError, Result};
pub use obo::OboParser;
pub use records::{AttributeValueRecords, RawRecord, StanzaRecords};
pub use sources::SourceRegistry;
pub use table::{open_table, TableChunks, DEFAULT_CHUNK_SIZE};

use flate2::read::GzDecoder;
use graphload_model::{
    AttrValue, Edge, Graph, Node, PendingRef, RelationshipType, SourceFormat, SourceProfile,
    PROP_DATA_SOURCE, PROP_ID,
};
use serde::Serialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::info;

/// Counters reported by every parser.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParseStats {
    pub records: usize,
    pub nodes: usize,
    /// Records dropped because they carry no id.
    pub missing_id: usize,
    /// Records skipped by kind or row filter.
    pub skipped: usize,
    pub edges: usize,
}

impl ParseStats {
    pub fn absorb(&mut self, other: &ParseStats) {
        self.records += other.records;
        self.nodes += other.nodes;
        self.missing_id += other.missing_id;
        self.skipped += other.skipped;
        self.edges += other.edges;
    }
}

/// A parser that consumes whole files into a shared graph.
pub trait RecordParser {
    fn parse_reader(&mut self, reader: &mut dyn BufRead, graph: &mut Graph) -> Result<()>;

    /// Runs once after every file has been parsed.
    fn finish(&mut self, _graph: &mut Graph) {}

    fn stats(&self) -> &ParseStats;
}

/// Open a source file, transparently decompressing `.gz`.
pub fn open_source(path: &Path) -> Result<Box<dyn BufRead + Send>> {
    let file = File::open(path).map_err(|source| IngestError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    if path.extension().is_some_and(|ext| ext == "gz") {
        Ok(Box::new(BufReader::new(GzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Parse every file of a record-oriented profile into one graph.
///
/// Files are parsed in declared order and nodes with the same identity merge.
/// The profile's post-process hook runs once at the end, then the graph is
/// put in canonical order.
pub fn parse_profile(profile: &SourceProfile, input_dir: &Path) -> Result<(Graph, ParseStats)> {
    profile.validate()?;
    let mut parser: Box<dyn RecordParser + '_> = match profile.format {
        SourceFormat::AttributeValue => Box::new(AttributeValueParser::new(profile)?),
        SourceFormat::Stanza => Box::new(OboParser::new(profile)?),
        SourceFormat::DelimitedTable => {
            return Err(IngestError::WrongFormat {
                profile: profile.name.clone(),
                expected: "record",
            })
        }
    };

    let mut graph = Graph::new();
    for file in &profile.files {
        let path = input_dir.join(file);
        info!(source = %profile.name, file = %path.display(), "parsing");
        let mut reader = open_source(&path)?;
        parser.parse_reader(&mut reader, &mut graph)?;
    }
    parser.finish(&mut graph);

    if let Some(hook) = profile.post_process {
        let changed = hook(&mut graph);
        info!(source = %profile.name, changed, "post-process hook applied");
    }
    graph.canonicalize();

    let stats = parser.stats().clone();
    info!(
        source = %profile.name,
        records = stats.records,
        nodes = graph.len(),
        edges = graph.edge_count(),
        missing_id = stats.missing_id,
        "parsed"
    );
    Ok((graph, stats))
}

// ============================================================================
// Shared node construction
// ============================================================================

pub(crate) fn new_node(profile: &SourceProfile, id: &str) -> Node {
    let mut node = Node::new(profile.entity_type(), id);
    for label in &profile.extra_labels {
        node.add_label(label);
    }
    node.set_attribute(PROP_DATA_SOURCE, AttrValue::Text(profile.data_source.clone()));
    if profile.mapping.id_property != PROP_ID {
        node.set_attribute(&profile.mapping.id_property, AttrValue::Text(id.to_string()));
    }
    node
}

pub(crate) fn relationship_edge(
    profile: &SourceProfile,
    rel: &RelationshipType,
    label: &str,
    target_id: &str,
) -> Edge {
    let lookup_key = rel.lookup_key(&profile.mapping.id_property);
    Edge::pending(
        label,
        rel.direction,
        PendingRef::new(&rel.target_type, lookup_key, target_id),
    )
}
