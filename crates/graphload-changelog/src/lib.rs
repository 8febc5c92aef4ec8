//! Liquibase changelog generation for graphload data files.
//!
//! Given the files a source wrote (a `WriteReport`) and that source's profile,
//! the generator emits an ordered, reproducible list of changesets:
//! constraints and indexes (initial loads only), node upserts, synonym
//! upserts, then relationship and db-link upserts. Rendering produces the XML
//! document the migration tool applies.

pub mod changeset;
pub mod error;
pub mod generator;
pub mod query;
pub mod render;

pub use changeset::{ChangeLog, ChangeSet, DataFileRef};
pub use error::{ChangelogError, Result};
pub use generator::{
    generate, ChangesetGenerator, GeneratorConfig, LoadMode, Stage, DEFAULT_HANDLER_CLASS,
};
pub use render::{render, write_changelog};
