//! Chunked delimited-table reader.
//!
//! Large identifier tables are never held in memory whole: rows are read in
//! fixed-size chunks and each chunk is converted to nodes independently.
//! Chunk boundaries count raw rows, so the same input always splits the same
//! way regardless of how many rows the filters drop.

use crate::error::{IngestError, Result};
use crate::{new_node, open_source, ParseStats};
use graphload_model::{Node, SourceProfile, TableLayout, ValueType};
use std::io::{BufRead, Read};
use std::path::Path;
use tracing::debug;

pub const DEFAULT_CHUNK_SIZE: usize = 10_000;

struct Column {
    index: usize,
    property: String,
    value_type: ValueType,
}

pub struct TableChunks<'a, R: Read> {
    profile: &'a SourceProfile,
    layout: &'a TableLayout,
    records: csv::StringRecordsIntoIter<R>,
    id_column: usize,
    columns: Vec<Column>,
    skip: Vec<(usize, &'a str)>,
    chunk_size: usize,
    stats: ParseStats,
    done: bool,
}

impl<'a, R: Read> TableChunks<'a, R> {
    pub fn new(profile: &'a SourceProfile, reader: R, chunk_size: usize) -> Result<Self> {
        let layout = profile.table.as_ref().ok_or_else(|| IngestError::WrongFormat {
            profile: profile.name.clone(),
            expected: "delimited table",
        })?;
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(layout.delimiter)
            .has_headers(true)
            .flexible(true)
            .quoting(false)
            .from_reader(reader);
        let headers = reader.headers()?.clone();
        let position = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim() == name)
                .ok_or_else(|| IngestError::MissingColumn {
                    column: name.to_string(),
                })
        };

        let mapping = &profile.mapping;
        let id_column = position(&mapping.id_key)?;
        let mut columns = Vec::new();
        for (raw, spec) in &mapping.attributes {
            if raw == &mapping.id_key {
                continue;
            }
            columns.push(Column {
                index: position(raw)?,
                property: spec.property_for(raw),
                value_type: spec.value_type,
            });
        }
        let mut skip = Vec::new();
        for (column, value) in &layout.skip_rows {
            skip.push((position(column)?, value.as_str()));
        }

        Ok(Self {
            profile,
            layout,
            records: reader.into_records(),
            id_column,
            columns,
            skip,
            chunk_size: chunk_size.max(1),
            stats: ParseStats::default(),
            done: false,
        })
    }

    pub fn stats(&self) -> &ParseStats {
        &self.stats
    }

    fn row_to_node(&mut self, row: &csv::StringRecord) -> Option<Node> {
        let null = self.layout.null_marker.as_deref();
        if self
            .skip
            .iter()
            .any(|(index, value)| row.get(*index).map(str::trim) == Some(*value))
        {
            self.stats.skipped += 1;
            return None;
        }
        let id = cell(row, self.id_column, null);
        if id.is_empty() {
            self.stats.missing_id += 1;
            debug!(source = %self.profile.name, row = self.stats.records, "row without id dropped");
            return None;
        }
        let mut node = new_node(self.profile, self.profile.strip_prefix(id));
        for column in &self.columns {
            let value = cell(row, column.index, null);
            if !value.is_empty() {
                node.push_value(&column.property, value, column.value_type);
            }
        }
        self.stats.nodes += 1;
        Some(node)
    }
}

fn cell<'r>(row: &'r csv::StringRecord, index: usize, null: Option<&str>) -> &'r str {
    let value = row.get(index).unwrap_or("").trim();
    if Some(value) == null {
        ""
    } else {
        value
    }
}

impl<R: Read> Iterator for TableChunks<'_, R> {
    type Item = Result<Vec<Node>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut chunk = Vec::new();
        let mut rows = 0;
        while rows < self.chunk_size {
            match self.records.next() {
                None => {
                    self.done = true;
                    break;
                }
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e.into()));
                }
                Some(Ok(row)) => {
                    rows += 1;
                    self.stats.records += 1;
                    if let Some(node) = self.row_to_node(&row) {
                        chunk.push(node);
                    }
                }
            }
        }
        if rows == 0 {
            return None;
        }
        Some(Ok(chunk))
    }
}

/// Open a table source file (`.gz` allowed) for chunked reading.
pub fn open_table<'a>(
    profile: &'a SourceProfile,
    path: &Path,
    chunk_size: usize,
) -> Result<TableChunks<'a, Box<dyn BufRead + Send>>> {
    TableChunks::new(profile, open_source(path)?, chunk_size)
}
