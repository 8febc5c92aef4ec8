//! Declarative mapping tables.
//!
//! A mapping table is authored once per source format and entity type. It says
//! which raw record keys become node properties, which become relationships to
//! other entities, and which properties carry cross-database references. The
//! parsers interpret it; nothing here reads files.

use crate::dblink::{dblink_label, dblink_target_type};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Scalar type a raw value is coerced to at parse time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    #[default]
    Str,
    Int,
    Number,
}

/// Which side of a declared relationship the parsed node plays.
///
/// `To`: the parsed node is the subject (`parsed -[label]-> referenced`).
/// `From`: the referenced node is the subject (`referenced -[label]-> parsed`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    To,
    From,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttrSpec {
    /// Target property name. Empty means "derive from the raw key".
    pub property: String,
    pub value_type: ValueType,
}

impl AttrSpec {
    pub fn new(property: &str, value_type: ValueType) -> Self {
        Self {
            property: property.to_string(),
            value_type,
        }
    }

    /// Property name for `raw_key`, deriving `lower_snake` when none was declared.
    pub fn property_for(&self, raw_key: &str) -> String {
        if self.property.is_empty() {
            derive_property_name(raw_key)
        } else {
            self.property.clone()
        }
    }
}

/// `LEFT-END-POSITION` → `left_end_position`.
pub fn derive_property_name(raw_key: &str) -> String {
    raw_key
        .trim()
        .to_lowercase()
        .replace(['-', ' '], "_")
        .trim_end_matches('?')
        .to_string()
}

/// How a raw relationship attribute maps to an edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipType {
    pub label: String,
    pub direction: Direction,
    pub target_type: String,
    /// Property of the target used to find it later. `None` means the
    /// target's id property.
    pub match_attr: Option<String>,
    /// Annotation key (e.g. `^COMPARTMENT`) → edge property name.
    #[serde(default)]
    pub edge_attributes: BTreeMap<String, String>,
    /// Labels a raw key can produce when the label comes from the value
    /// itself (OBO `relationship: part_of ...`).
    #[serde(default)]
    pub known_labels: Vec<String>,
}

impl RelationshipType {
    pub fn new(label: &str, direction: Direction, target_type: &str) -> Self {
        Self {
            label: label.to_string(),
            direction,
            target_type: target_type.to_string(),
            match_attr: None,
            edge_attributes: BTreeMap::new(),
            known_labels: Vec::new(),
        }
    }

    pub fn matching(mut self, attr: &str) -> Self {
        self.match_attr = Some(attr.to_string());
        self
    }

    pub fn with_edge_attribute(mut self, annotation_key: &str, property: &str) -> Self {
        self.edge_attributes
            .insert(annotation_key.to_string(), property.to_string());
        self
    }

    pub fn with_known_labels(mut self, labels: &[&str]) -> Self {
        self.known_labels = labels.iter().map(|l| l.to_string()).collect();
        self
    }

    pub fn lookup_key<'a>(&'a self, default_key: &'a str) -> &'a str {
        self.match_attr.as_deref().unwrap_or(default_key)
    }

    /// Every label an edge of this type can carry.
    pub fn labels(&self) -> Vec<&str> {
        if self.known_labels.is_empty() {
            vec![self.label.as_str()]
        } else {
            self.known_labels.iter().map(String::as_str).collect()
        }
    }
}

/// An external reference database accepted by a source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbLinkSource {
    pub db_name: String,
    /// When true, raw ids look like `GO:0005829` and the `GO:` prefix is
    /// stripped before use; when false the raw id is used verbatim.
    pub id_has_prefix: bool,
    /// Set when links point at nodes another source loads rather than at
    /// `db_<DB>` placeholders.
    #[serde(default)]
    pub target: Option<LinkTarget>,
}

/// Existing node type a db link attaches to, matched on its `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkTarget {
    pub label: String,
    pub target_type: String,
}

impl DbLinkSource {
    pub fn new(db_name: &str, id_has_prefix: bool) -> Self {
        Self {
            db_name: db_name.to_string(),
            id_has_prefix,
            target: None,
        }
    }

    pub fn edge_label(&self) -> String {
        match &self.target {
            Some(target) => target.label.clone(),
            None => dblink_label(&self.db_name),
        }
    }

    pub fn target_type(&self) -> String {
        match &self.target {
            Some(target) => target.target_type.clone(),
            None => dblink_target_type(&self.db_name),
        }
    }

    /// True when the link target is a placeholder this source may create.
    pub fn creates_placeholder(&self) -> bool {
        self.target.is_none()
    }
}

/// Shape of a db-link property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DbLinkField {
    /// Every token belongs to the named database.
    Single(String),
    /// Tokens name their own database, either as `(DB "ID" ...)` tuples or
    /// as `DB:ID`.
    Mixed,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MappingError {
    #[error("mapping has no entity type")]
    MissingEntityType,
    #[error("{entity}: relationship key `{key}` has an empty label or target type")]
    IncompleteRelationship { entity: String, key: String },
    #[error("{entity}: db-link property `{property}` is not produced by any attribute")]
    UnknownDbLinkProperty { entity: String, property: String },
    #[error("{entity}: db-link property `{property}` names undeclared database `{db}`")]
    UndeclaredDatabase {
        entity: String,
        property: String,
        db: String,
    },
    #[error("{entity}: node columns must include the id property `{id_property}`")]
    MissingIdColumn { entity: String, id_property: String },
    #[error("source `{0}` reads a delimited table but declares no table layout")]
    MissingTableLayout(String),
}

/// Static per-source configuration consumed by the parsers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingTable {
    pub entity_type: String,
    /// Raw key whose value is the record's unique id.
    pub id_key: String,
    /// Property that stores the source id (`id`, `biocyc_id`, ...).
    pub id_property: String,
    pub attributes: BTreeMap<String, AttrSpec>,
    pub relationships: BTreeMap<String, RelationshipType>,
    /// Property name → db-link field shape.
    pub dblink_fields: BTreeMap<String, DbLinkField>,
    pub dblink_sources: Vec<DbLinkSource>,
    /// Declared output column order for node files.
    pub node_columns: Vec<String>,
}

impl MappingTable {
    pub fn new(entity_type: &str, id_key: &str, id_property: &str) -> Self {
        Self {
            entity_type: entity_type.to_string(),
            id_key: id_key.to_string(),
            id_property: id_property.to_string(),
            attributes: BTreeMap::new(),
            relationships: BTreeMap::new(),
            dblink_fields: BTreeMap::new(),
            dblink_sources: Vec::new(),
            node_columns: Vec::new(),
        }
    }

    pub fn attr(mut self, raw_key: &str, property: &str, value_type: ValueType) -> Self {
        self.attributes
            .insert(raw_key.to_string(), AttrSpec::new(property, value_type));
        self
    }

    pub fn relationship(mut self, raw_key: &str, rel: RelationshipType) -> Self {
        self.relationships.insert(raw_key.to_string(), rel);
        self
    }

    pub fn dblink_field(mut self, property: &str, kind: DbLinkField) -> Self {
        self.dblink_fields.insert(property.to_string(), kind);
        self
    }

    pub fn dblink_source(mut self, db_name: &str, id_has_prefix: bool) -> Self {
        self.dblink_sources.push(DbLinkSource::new(db_name, id_has_prefix));
        self
    }

    /// Accept `db_name` links but attach them to existing `target_type`
    /// nodes under `label`.
    pub fn dblink_target(
        mut self,
        db_name: &str,
        id_has_prefix: bool,
        label: &str,
        target_type: &str,
    ) -> Self {
        let mut source = DbLinkSource::new(db_name, id_has_prefix);
        source.target = Some(LinkTarget {
            label: label.to_string(),
            target_type: target_type.to_string(),
        });
        self.dblink_sources.push(source);
        self
    }

    pub fn columns(mut self, columns: &[&str]) -> Self {
        self.node_columns = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    /// Case-insensitive lookup of a declared external database.
    pub fn find_dblink_source(&self, db_name: &str) -> Option<&DbLinkSource> {
        self.dblink_sources
            .iter()
            .find(|s| s.db_name.eq_ignore_ascii_case(db_name))
    }

    /// Every property name the attribute table can produce.
    pub fn produced_properties(&self) -> Vec<String> {
        self.attributes
            .iter()
            .map(|(raw, spec)| spec.property_for(raw))
            .collect()
    }

    /// Check the table is internally consistent before any file is touched.
    pub fn validate(&self) -> Result<(), MappingError> {
        if self.entity_type.trim().is_empty() {
            return Err(MappingError::MissingEntityType);
        }
        for (key, rel) in &self.relationships {
            if rel.label.trim().is_empty() || rel.target_type.trim().is_empty() {
                return Err(MappingError::IncompleteRelationship {
                    entity: self.entity_type.clone(),
                    key: key.clone(),
                });
            }
        }
        let produced = self.produced_properties();
        for (property, kind) in &self.dblink_fields {
            if !produced.iter().any(|p| p == property) {
                return Err(MappingError::UnknownDbLinkProperty {
                    entity: self.entity_type.clone(),
                    property: property.clone(),
                });
            }
            if let DbLinkField::Single(db) = kind {
                if self.find_dblink_source(db).is_none() {
                    return Err(MappingError::UndeclaredDatabase {
                        entity: self.entity_type.clone(),
                        property: property.clone(),
                        db: db.clone(),
                    });
                }
            }
        }
        if !self.node_columns.is_empty()
            && !self.node_columns.iter().any(|c| c == &self.id_property)
        {
            return Err(MappingError::MissingIdColumn {
                entity: self.entity_type.clone(),
                id_property: self.id_property.clone(),
            });
        }
        Ok(())
    }
}
