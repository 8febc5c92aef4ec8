//! Changesets and the changelog that orders them.

use serde::{Deserialize, Serialize};

/// Connection parameters passed through to the loader, resolved by the
/// migration tool from its own properties.
pub const LOADER_PARAMETERS: [&str; 4] = [
    "neo4jHost",
    "neo4jCredentials",
    "neo4jDatabase",
    "localSaveFileDir",
];

pub const DEFAULT_FILE_TYPE: &str = "TSV";

/// A bulk data file consumed by a custom loader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataFileRef {
    pub file_name: String,
    /// Archive the file travels in, if any.
    pub archive: Option<String>,
    /// First row handed to the query; 1 skips the header.
    pub start_at: usize,
    pub file_type: String,
    pub handler_class: String,
}

impl DataFileRef {
    pub fn new(file_name: &str, handler_class: &str) -> Self {
        Self {
            file_name: file_name.to_string(),
            archive: None,
            start_at: 1,
            file_type: DEFAULT_FILE_TYPE.to_string(),
            handler_class: handler_class.to_string(),
        }
    }

    pub fn in_archive(mut self, archive: Option<&str>) -> Self {
        self.archive = archive.map(str::to_string);
        self
    }
}

/// One idempotent unit of migration work. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub id: String,
    pub author: String,
    pub comment: String,
    pub query: String,
    pub data: Option<DataFileRef>,
}

impl ChangeSet {
    /// A plain query changeset.
    pub fn sql(id: String, author: &str, comment: String, query: String) -> Self {
        Self {
            id,
            author: author.to_string(),
            comment,
            query,
            data: None,
        }
    }

    /// A changeset whose query runs once per row of `data`.
    pub fn custom(id: String, author: &str, comment: String, query: String, data: DataFileRef) -> Self {
        Self {
            data: Some(data),
            ..Self::sql(id, author, comment, query)
        }
    }

    pub fn is_custom(&self) -> bool {
        self.data.is_some()
    }
}

/// Ordered changesets rendered into one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeLog {
    pub file_name: String,
    pub changesets: Vec<ChangeSet>,
}

impl ChangeLog {
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.changesets.iter().map(|c| c.id.as_str())
    }

    pub fn len(&self) -> usize {
        self.changesets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changesets.is_empty()
    }
}
