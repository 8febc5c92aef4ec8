//! Tab-separated projection of a graph.
//!
//! One source run writes:
//! - node files, one per partition group (`<prefix><stem>[-<group>].tsv`)
//! - `<prefix><stem>-synonyms.tsv` (`id`, `name`)
//! - `<prefix><stem>-rels.tsv` (`relationship`, `from_id`, `to_id`, edge properties)
//! - `<prefix><stem>-dblinks.tsv` (`from_id`, `to_id`, `db_name`)
//! - `<prefix><stem>-label-<Label>.tsv` (`id`) for labels only some nodes carry
//!
//! Every file starts with its header, even when no rows follow, so the file
//! set of a source never depends on data volume. Writers accept graphs in
//! chunks; the header is written once when the file is opened and rows are
//! appended per chunk.

use crate::error::{ExportError, Result};
use graphload_model::{
    dblink_db_name, Direction, Edge, EdgeKind, EdgeTarget, Graph, Node,
    SourceProfile, SynonymRow,
};
use serde::{Deserialize, Serialize};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const SYNONYM_COLUMNS: [&str; 2] = ["id", "name"];
pub const RELATIONSHIP_COLUMNS: [&str; 3] = ["relationship", "from_id", "to_id"];
pub const DBLINK_COLUMNS: [&str; 3] = ["from_id", "to_id", "db_name"];
pub const LABEL_COLUMNS: [&str; 1] = ["id"];

// ============================================================================
// Report types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Nodes,
    Labels,
    Synonyms,
    Relationships,
    DbLinks,
}

/// One file written for a source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataFile {
    pub kind: FileKind,
    pub file_name: String,
    pub columns: Vec<String>,
    pub rows: usize,
    /// Partition value for node files, label name for label files.
    pub group: Option<String>,
}

/// Endpoints of one relationship label as they appear in the rels file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipSummary {
    pub label: String,
    pub from_type: String,
    pub from_key: String,
    pub to_type: String,
    pub to_key: String,
    /// Edge property columns carried by at least one row.
    pub properties: Vec<String>,
    pub rows: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbLinkSummary {
    pub db_name: String,
    pub label: String,
    pub target_type: String,
    pub rows: usize,
}

/// Everything the changelog generator needs to know about a source's output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteReport {
    pub source: String,
    pub entity_type: String,
    pub id_property: String,
    /// Labels every node of the source carries.
    pub labels: Vec<String>,
    pub files: Vec<DataFile>,
    pub relationships: Vec<RelationshipSummary>,
    pub dblinks: Vec<DbLinkSummary>,
}

impl WriteReport {
    pub fn files_of(&self, kind: FileKind) -> impl Iterator<Item = &DataFile> {
        self.files.iter().filter(move |f| f.kind == kind)
    }

    pub fn file_of(&self, kind: FileKind) -> Option<&DataFile> {
        self.files_of(kind).next()
    }

    pub fn file_names(&self) -> Vec<String> {
        self.files.iter().map(|f| f.file_name.clone()).collect()
    }

    pub fn total_rows(&self, kind: FileKind) -> usize {
        self.files_of(kind).map(|f| f.rows).sum()
    }
}

// ============================================================================
// Single TSV file
// ============================================================================

/// Tabs and line breaks inside a value become single spaces.
pub fn sanitize_field(value: &str) -> String {
    value.replace(['\t', '\n', '\r'], " ")
}

/// File-name-safe form of a partition value or label.
pub fn file_safe(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// An open TSV file. The header is written on creation; rows append.
pub struct TsvFile {
    kind: FileKind,
    file_name: String,
    path: PathBuf,
    columns: Vec<String>,
    group: Option<String>,
    writer: csv::Writer<BufWriter<File>>,
    rows: usize,
}

impl TsvFile {
    pub fn create(
        dir: &Path,
        kind: FileKind,
        file_name: &str,
        columns: &[String],
        group: Option<String>,
    ) -> Result<Self> {
        let path = dir.join(file_name);
        let file = File::create(&path).map_err(ExportError::io(&path))?;
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .quote_style(csv::QuoteStyle::Never)
            .from_writer(BufWriter::new(file));
        writer.write_record(columns)?;
        debug!(file = %file_name, "opened");
        Ok(Self {
            kind,
            file_name: file_name.to_string(),
            path,
            columns: columns.to_vec(),
            group,
            writer,
            rows: 0,
        })
    }

    pub fn write_row<I, S>(&mut self, fields: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let row: Vec<String> = fields
            .into_iter()
            .map(|f| sanitize_field(f.as_ref()))
            .collect();
        self.writer.write_record(&row)?;
        self.rows += 1;
        Ok(())
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn finish(mut self) -> Result<DataFile> {
        self.writer.flush().map_err(ExportError::io(&self.path))?;
        Ok(DataFile {
            kind: self.kind,
            file_name: self.file_name,
            columns: self.columns,
            rows: self.rows,
            group: self.group,
        })
    }
}

// ============================================================================
// Per-source writer
// ============================================================================

/// Output column order for a source's node files.
pub fn node_columns(profile: &SourceProfile) -> Vec<String> {
    let mapping = &profile.mapping;
    if !mapping.node_columns.is_empty() {
        return mapping.node_columns.clone();
    }
    let mut columns = vec![mapping.id_property.clone()];
    for property in mapping.produced_properties() {
        if !columns.contains(&property) {
            columns.push(property);
        }
    }
    columns
}

fn edge_property_columns(profile: &SourceProfile) -> Vec<String> {
    let properties: BTreeSet<String> = profile
        .mapping
        .relationships
        .values()
        .flat_map(|rel| rel.edge_attributes.values().cloned())
        .collect();
    properties.into_iter().collect()
}

/// Writes every file of one source, accepting the graph in one or more chunks.
pub struct SourceWriter<'a> {
    profile: &'a SourceProfile,
    dir: PathBuf,
    prefix: String,
    node_columns: Vec<String>,
    edge_properties: Vec<String>,
    static_labels: BTreeSet<String>,
    nodes: BTreeMap<Option<String>, TsvFile>,
    labels: BTreeMap<String, TsvFile>,
    synonyms: Option<TsvFile>,
    rels: TsvFile,
    dblinks: TsvFile,
    relationships: BTreeMap<(String, String, String), RelationshipSummary>,
    dblink_summaries: BTreeMap<String, DbLinkSummary>,
}

impl<'a> SourceWriter<'a> {
    pub fn create(profile: &'a SourceProfile, dir: &Path, prefix: &str) -> Result<Self> {
        std::fs::create_dir_all(dir).map_err(ExportError::io(dir))?;
        let stem = format!("{}{}", prefix, profile.file_stem);
        let node_columns = node_columns(profile);
        let edge_properties = edge_property_columns(profile);

        let mut nodes = BTreeMap::new();
        if profile.partition_by.is_none() {
            let file = TsvFile::create(
                dir,
                FileKind::Nodes,
                &format!("{}.tsv", stem),
                &node_columns,
                None,
            )?;
            nodes.insert(None, file);
        }

        let synonyms = if profile.supports_synonyms {
            Some(TsvFile::create(
                dir,
                FileKind::Synonyms,
                &format!("{}-synonyms.tsv", stem),
                &to_strings(&SYNONYM_COLUMNS),
                None,
            )?)
        } else {
            None
        };

        let mut rel_columns = to_strings(&RELATIONSHIP_COLUMNS);
        rel_columns.extend(edge_properties.iter().cloned());
        let rels = TsvFile::create(
            dir,
            FileKind::Relationships,
            &format!("{}-rels.tsv", stem),
            &rel_columns,
            None,
        )?;
        let dblinks = TsvFile::create(
            dir,
            FileKind::DbLinks,
            &format!("{}-dblinks.tsv", stem),
            &to_strings(&DBLINK_COLUMNS),
            None,
        )?;

        let mut static_labels: BTreeSet<String> = profile.extra_labels.iter().cloned().collect();
        static_labels.insert(profile.entity_type().to_string());

        let mut writer = Self {
            profile,
            dir: dir.to_path_buf(),
            prefix: prefix.to_string(),
            node_columns,
            edge_properties,
            static_labels,
            nodes,
            labels: BTreeMap::new(),
            synonyms,
            rels,
            dblinks,
            relationships: BTreeMap::new(),
            dblink_summaries: BTreeMap::new(),
        };
        // declared groups and labels get their files even when no node has them
        for group in &profile.partition_values {
            writer.node_file(Some(group.clone()))?;
        }
        for label in &profile.dynamic_labels {
            if !writer.static_labels.contains(label) {
                writer.label_file(label)?;
            }
        }
        Ok(writer)
    }

    fn stem(&self) -> String {
        format!("{}{}", self.prefix, self.profile.file_stem)
    }

    /// Append one chunk: its nodes, their edges, and the chunk's synonym rows.
    pub fn write_chunk(&mut self, graph: &Graph, synonyms: &[SynonymRow]) -> Result<()> {
        for node in graph.nodes() {
            self.write_node(node)?;
            for edge in node.edges() {
                match edge.kind {
                    EdgeKind::Relationship => self.write_relationship(graph, node, edge)?,
                    EdgeKind::DbLink => self.write_dblink(graph, node, edge)?,
                }
            }
        }
        if let Some(file) = self.synonyms.as_mut() {
            for row in synonyms {
                file.write_row([row.id.as_str(), row.name.as_str()])?;
            }
        }
        Ok(())
    }

    fn node_file(&mut self, group: Option<String>) -> Result<&mut TsvFile> {
        let stem = self.stem();
        match self.nodes.entry(group) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let file_name = match entry.key() {
                    Some(g) => format!("{}-{}.tsv", stem, file_safe(g)),
                    None => format!("{}.tsv", stem),
                };
                let group = entry.key().clone();
                let file = TsvFile::create(
                    &self.dir,
                    FileKind::Nodes,
                    &file_name,
                    &self.node_columns,
                    group,
                )?;
                Ok(entry.insert(file))
            }
        }
    }

    fn label_file(&mut self, label: &str) -> Result<&mut TsvFile> {
        let stem = self.stem();
        match self.labels.entry(label.to_string()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let file_name = format!("{}-label-{}.tsv", stem, file_safe(label));
                let file = TsvFile::create(
                    &self.dir,
                    FileKind::Labels,
                    &file_name,
                    &to_strings(&LABEL_COLUMNS),
                    Some(label.to_string()),
                )?;
                Ok(entry.insert(file))
            }
        }
    }

    fn write_node(&mut self, node: &Node) -> Result<()> {
        let group = self.profile.partition_by.as_ref().map(|property| {
            node.values(property)
                .into_iter()
                .next()
                .unwrap_or_default()
        });
        let group = group.filter(|g| !g.is_empty());
        let row: Vec<String> = self.node_columns.iter().map(|c| node.field(c)).collect();
        self.node_file(group)?.write_row(row)?;

        let dynamic: Vec<String> = node
            .labels()
            .filter(|l| !self.static_labels.contains(*l))
            .map(str::to_string)
            .collect();
        for label in dynamic {
            self.label_file(&label)?.write_row([node.id()])?;
        }
        Ok(())
    }

    fn write_relationship(&mut self, graph: &Graph, node: &Node, edge: &Edge) -> Result<()> {
        let id_property = &self.profile.mapping.id_property;
        let target_key = match &edge.target {
            EdgeTarget::Pending(p) => p.lookup_key.clone(),
            EdgeTarget::Resolved(_) => id_property.clone(),
        };
        let owner = (node.entity_type().to_string(), id_property.clone(), node.id());
        let target = (graph.target_type(edge).to_string(), target_key, graph.target_id(edge));
        let ((from_type, from_key, from_id), (to_type, to_key, to_id)) = match edge.direction {
            Direction::To => (owner, target),
            Direction::From => (target, owner),
        };

        let mut row = vec![edge.label.clone(), from_id.to_string(), to_id.to_string()];
        for property in &self.edge_properties {
            row.push(edge.attributes.get(property).cloned().unwrap_or_default());
        }
        self.rels.write_row(row)?;

        let summary = self
            .relationships
            .entry((edge.label.clone(), from_type.clone(), to_type.clone()))
            .or_insert_with(|| RelationshipSummary {
                label: edge.label.clone(),
                from_type,
                from_key,
                to_type,
                to_key,
                properties: Vec::new(),
                rows: 0,
            });
        summary.rows += 1;
        for property in edge.attributes.keys() {
            if !summary.properties.contains(property) {
                summary.properties.push(property.clone());
                summary.properties.sort();
            }
        }
        Ok(())
    }

    fn write_dblink(&mut self, graph: &Graph, node: &Node, edge: &Edge) -> Result<()> {
        let Some(db_name) = dblink_db_name(edge) else {
            return Ok(());
        };
        self.dblinks
            .write_row([node.id(), graph.target_id(edge), db_name])?;
        let summary = self
            .dblink_summaries
            .entry(db_name.to_string())
            .or_insert_with(|| DbLinkSummary {
                db_name: db_name.to_string(),
                label: edge.label.clone(),
                target_type: graph.target_type(edge).to_string(),
                rows: 0,
            });
        summary.rows += 1;
        Ok(())
    }

    /// Flush every file and describe what was written.
    pub fn finish(self) -> Result<WriteReport> {
        let mut files = Vec::new();
        if self.nodes.is_empty() {
            // partitioned source without nodes still gets its base node file
            let file = TsvFile::create(
                &self.dir,
                FileKind::Nodes,
                &format!("{}.tsv", self.stem()),
                &self.node_columns,
                None,
            )?;
            files.push(file.finish()?);
        }
        for (_, file) in self.nodes {
            files.push(file.finish()?);
        }
        for (_, file) in self.labels {
            files.push(file.finish()?);
        }
        if let Some(file) = self.synonyms {
            files.push(file.finish()?);
        }
        files.push(self.rels.finish()?);
        files.push(self.dblinks.finish()?);

        let mut labels: Vec<String> = self.static_labels.into_iter().collect();
        labels.sort();
        let report = WriteReport {
            source: self.profile.name.clone(),
            entity_type: self.profile.entity_type().to_string(),
            id_property: self.profile.mapping.id_property.clone(),
            labels,
            files,
            relationships: self.relationships.into_values().collect(),
            dblinks: self.dblink_summaries.into_values().collect(),
        };
        info!(
            source = %report.source,
            files = report.files.len(),
            nodes = report.total_rows(FileKind::Nodes),
            rels = report.total_rows(FileKind::Relationships),
            synonyms = report.total_rows(FileKind::Synonyms),
            "wrote data files"
        );
        Ok(report)
    }
}

/// Write a whole graph in one pass.
pub fn write_graph(
    profile: &SourceProfile,
    graph: &Graph,
    synonyms: &[SynonymRow],
    dir: &Path,
    prefix: &str,
) -> Result<WriteReport> {
    let mut writer = SourceWriter::create(profile, dir, prefix)?;
    writer.write_chunk(graph, synonyms)?;
    writer.finish()
}

fn to_strings(columns: &[&str]) -> Vec<String> {
    columns.iter().map(|c| c.to_string()).collect()
}

/// Header plus rows of a written file, for checks and tests.
pub fn read_tsv(path: &Path) -> Result<Vec<Vec<String>>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .quoting(false)
        .flexible(true)
        .from_path(path)?;
    let mut rows = Vec::new();
    for record in reader.records() {
        rows.push(record?.iter().map(str::to_string).collect());
    }
    Ok(rows)
}
