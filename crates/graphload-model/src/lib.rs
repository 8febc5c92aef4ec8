//! Graph model for the graphload ETL.
//!
//! - `mapping`: declarative per-source mapping tables
//! - `profile`: a mapping table plus source capabilities
//! - `graph`: node arena, edges with placeholder targets
//! - `synonyms`: synonym row extraction
//! - `dblink`: cross-database reference edges

pub mod dblink;
pub mod graph;
pub mod mapping;
pub mod profile;
pub mod synonyms;

pub use dblink::{dblink_db_name, dblink_label, dblink_target_type, DbLinkResolver};
pub use graph::{
    AttrValue, Edge, EdgeKind, EdgeTarget, Graph, Node, NodeRef, PendingRef, PROP_COMMENT,
    PROP_DATA_SOURCE, PROP_ID, PROP_NAME, PROP_SYNONYMS,
};
pub use mapping::{
    AttrSpec, DbLinkField, DbLinkSource, Direction, LinkTarget, MappingError, MappingTable,
    RelationshipType, ValueType,
};
pub use profile::{PostProcessHook, SourceFormat, SourceProfile, TableLayout};
pub use synonyms::{SynonymExtractor, SynonymRow};
