//! Serialization of parsed graphs.
//!
//! - `tsv`: node, label, synonym, relationship and db-link files
//! - `archive`: deterministic tar.gz bundles with a checksum manifest

pub mod archive;
pub mod error;
pub mod tsv;

pub use archive::{bundle, read_manifest, sha256_file, sha256_hex, verify, ArchiveManifest, ManifestEntry};
pub use error::{ExportError, Result};
pub use tsv::{
    node_columns, read_tsv, write_graph, DataFile, DbLinkSummary, FileKind, RelationshipSummary,
    SourceWriter, TsvFile, WriteReport,
};
