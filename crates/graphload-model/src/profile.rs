//! Source profiles: a mapping table plus the handful of behaviors that differ
//! between sources.

use crate::graph::Graph;
use crate::mapping::{MappingError, MappingTable};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFormat {
    /// `KEY - VALUE` records terminated by `//`.
    AttributeValue,
    /// OBO-style `[Term]` stanzas.
    Stanza,
    /// Delimited identifier table with a header row.
    DelimitedTable,
}

/// Runs once after every file of a profile has been parsed.
pub type PostProcessHook = fn(&mut Graph) -> usize;

/// Column layout of a delimited table source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableLayout {
    pub delimiter: u8,
    /// Cell text meaning "no value".
    pub null_marker: Option<String>,
    /// (column, value) pairs whose rows are skipped.
    pub skip_rows: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct SourceProfile {
    pub name: String,
    /// Value of the `data_source` property and of the node labels' db tag.
    pub data_source: String,
    pub format: SourceFormat,
    pub mapping: MappingTable,
    /// Output file names start with this stem.
    pub file_stem: String,
    /// Physical files that together describe one entity type, parsed in order.
    pub files: Vec<String>,
    pub supports_synonyms: bool,
    /// Properties besides `name` whose values count as synonyms.
    pub synonym_properties: Vec<String>,
    /// Prefix stripped from the node id and every referenced id.
    pub id_prefix: Option<String>,
    /// Property whose values split node files into groups.
    pub partition_by: Option<String>,
    /// Partition groups whose files exist even when no node falls in them.
    pub partition_values: Vec<String>,
    /// Extra labels carried by every node of this profile.
    pub extra_labels: Vec<String>,
    /// Labels only some nodes carry, added by the post-process hook.
    pub dynamic_labels: Vec<String>,
    pub table: Option<TableLayout>,
    pub post_process: Option<PostProcessHook>,
}

impl SourceProfile {
    pub fn new(name: &str, data_source: &str, format: SourceFormat, mapping: MappingTable) -> Self {
        Self {
            name: name.to_string(),
            data_source: data_source.to_string(),
            format,
            file_stem: mapping.entity_type.to_lowercase(),
            mapping,
            files: Vec::new(),
            supports_synonyms: false,
            synonym_properties: Vec::new(),
            id_prefix: None,
            partition_by: None,
            partition_values: Vec::new(),
            extra_labels: Vec::new(),
            dynamic_labels: Vec::new(),
            table: None,
            post_process: None,
        }
    }

    pub fn with_file_stem(mut self, stem: &str) -> Self {
        self.file_stem = stem.to_string();
        self
    }

    pub fn with_files(mut self, files: &[&str]) -> Self {
        self.files = files.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn with_synonyms(mut self, extra_properties: &[&str]) -> Self {
        self.supports_synonyms = true;
        self.synonym_properties = extra_properties.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn with_id_prefix(mut self, prefix: &str) -> Self {
        self.id_prefix = Some(prefix.to_string());
        self
    }

    pub fn partitioned_by(mut self, property: &str) -> Self {
        self.partition_by = Some(property.to_string());
        self
    }

    /// Partition on `property`, always writing a file for each of `values`.
    pub fn with_partitions(mut self, property: &str, values: &[&str]) -> Self {
        self.partition_by = Some(property.to_string());
        self.partition_values = values.iter().map(|v| v.to_string()).collect();
        self
    }

    pub fn with_labels(mut self, labels: &[&str]) -> Self {
        self.extra_labels = labels.iter().map(|l| l.to_string()).collect();
        self
    }

    pub fn with_dynamic_labels(mut self, labels: &[&str]) -> Self {
        self.dynamic_labels = labels.iter().map(|l| l.to_string()).collect();
        self
    }

    pub fn with_table(mut self, layout: TableLayout) -> Self {
        self.table = Some(layout);
        self
    }

    pub fn with_hook(mut self, hook: PostProcessHook) -> Self {
        self.post_process = Some(hook);
        self
    }

    pub fn entity_type(&self) -> &str {
        &self.mapping.entity_type
    }

    /// Strip the configured id prefix, if the value carries it.
    pub fn strip_prefix<'a>(&self, raw: &'a str) -> &'a str {
        match &self.id_prefix {
            Some(prefix) => raw.strip_prefix(prefix.as_str()).unwrap_or(raw),
            None => raw,
        }
    }

    pub fn validate(&self) -> Result<(), MappingError> {
        if self.format == SourceFormat::DelimitedTable && self.table.is_none() {
            return Err(MappingError::MissingTableLayout(self.name.clone()));
        }
        self.mapping.validate()
    }
}
