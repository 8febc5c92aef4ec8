//! Changeset generation.
//!
//! A generator walks a fixed sequence of stages:
//!
//! ```text
//! Uninitialized -> IndexesAdded (optional) -> NodesLoaded -> SynonymsLoaded
//!               -> RelationshipsLoaded -> Finalized
//! ```
//!
//! Each `add_*` call appends the changesets of one stage; a stage may be
//! re-entered to append more of the same kind but never revisited after a
//! later one. `finalize` consumes the generator and yields the changelog.
//!
//! Changeset ids are `[<ticket> ]<description> on date <MMDDYYYY>`: the same
//! configuration and data files always reproduce the same ids, which is what
//! the migration tool keys idempotence on.

use crate::changeset::{ChangeLog, ChangeSet, DataFileRef};
use crate::error::{ChangelogError, Result};
use crate::query::{
    create_constraint, create_index, set_label, upsert_dblinks, upsert_synonyms, Endpoint,
    NodeUpsert, RelationshipUpsert, RowFilter, SYNONYM_LABEL,
};
use chrono::NaiveDate;
use graphload_export::{DataFile, FileKind, RelationshipSummary, WriteReport};
use graphload_model::{Direction, SourceProfile, ValueType, PROP_NAME};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info};

pub const DEFAULT_HANDLER_CLASS: &str = "edu.ucsd.sbrg.FileQueryHandler";

/// Tracker keys such as `LL-1234`.
pub const TICKET_PATTERN: &str = r"^[A-Za-z][A-Za-z0-9]*-\d+$";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Stage {
    Uninitialized,
    IndexesAdded,
    NodesLoaded,
    SynonymsLoaded,
    RelationshipsLoaded,
    Finalized,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadMode {
    /// First load into an empty database: constraints and indexes first.
    #[default]
    Initial,
    /// Update of an already loaded database.
    Incremental,
}

impl LoadMode {
    pub fn as_str(self) -> &'static str {
        match self {
            LoadMode::Initial => "initial",
            LoadMode::Incremental => "incremental",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorConfig {
    pub author: String,
    pub ticket: Option<String>,
    pub run_date: NaiveDate,
    pub load_mode: LoadMode,
    pub handler_class: String,
}

impl GeneratorConfig {
    pub fn new(author: &str, run_date: NaiveDate) -> Self {
        Self {
            author: author.to_string(),
            ticket: None,
            run_date,
            load_mode: LoadMode::default(),
            handler_class: DEFAULT_HANDLER_CLASS.to_string(),
        }
    }

    pub fn with_ticket(mut self, ticket: &str) -> Self {
        self.ticket = Some(ticket.to_string());
        self
    }

    pub fn with_mode(mut self, mode: LoadMode) -> Self {
        self.load_mode = mode;
        self
    }

    pub fn with_handler(mut self, handler_class: &str) -> Self {
        self.handler_class = handler_class.to_string();
        self
    }

    /// Reject configuration the generator cannot honor.
    pub fn validate(&self) -> Result<()> {
        if self.author.trim().is_empty() {
            return Err(ChangelogError::MissingAuthor);
        }
        if self.handler_class.trim().is_empty() {
            return Err(ChangelogError::MissingHandler);
        }
        if let Some(ticket) = &self.ticket {
            let pattern = Regex::new(TICKET_PATTERN)?;
            if !pattern.is_match(ticket) {
                return Err(ChangelogError::InvalidTicket(ticket.clone()));
            }
        }
        Ok(())
    }

    /// `MMDDYYYY`
    pub fn date_tag(&self) -> String {
        self.run_date.format("%m%d%Y").to_string()
    }
}

pub struct ChangesetGenerator<'a> {
    config: GeneratorConfig,
    profile: &'a SourceProfile,
    stage: Stage,
    changesets: Vec<ChangeSet>,
    ids: HashSet<String>,
}

impl<'a> ChangesetGenerator<'a> {
    /// Fails on bad configuration before anything is generated.
    pub fn new(config: GeneratorConfig, profile: &'a SourceProfile) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            profile,
            stage: Stage::Uninitialized,
            changesets: Vec::new(),
            ids: HashSet::new(),
        })
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn changeset_id(&self, description: &str) -> String {
        match &self.config.ticket {
            Some(ticket) => format!("{} {} on date {}", ticket, description, self.config.date_tag()),
            None => format!("{} on date {}", description, self.config.date_tag()),
        }
    }

    /// `<source>-<mode>-changelog-<MMDDYYYY>.xml`
    pub fn changelog_file_name(&self) -> String {
        format!(
            "{}-{}-changelog-{}.xml",
            self.profile.name,
            self.config.load_mode.as_str(),
            self.config.date_tag()
        )
    }

    fn advance(&mut self, target: Stage) -> Result<()> {
        if self.stage > target {
            return Err(ChangelogError::OutOfOrder {
                current: self.stage,
                attempted: target,
            });
        }
        self.stage = target;
        Ok(())
    }

    fn push(&mut self, changeset: ChangeSet) -> Result<()> {
        if !self.ids.insert(changeset.id.clone()) {
            return Err(ChangelogError::DuplicateId(changeset.id));
        }
        debug!(id = %changeset.id, "changeset");
        self.changesets.push(changeset);
        Ok(())
    }

    fn schema_changeset(&mut self, description: String, query: String) -> Result<()> {
        let id = self.changeset_id(&description);
        let comment = format!(
            "{} for {}, created on {}",
            description,
            self.profile.data_source,
            self.config.run_date.format("%m/%d/%Y")
        );
        let changeset = ChangeSet::sql(id, &self.config.author, comment, query);
        self.push(changeset)
    }

    fn data_changeset(
        &mut self,
        description: String,
        file: &DataFile,
        archive: Option<&str>,
        query: String,
    ) -> Result<()> {
        let id = self.changeset_id(&description);
        let mut comment = format!("Load {} {}", self.profile.data_source, file.file_name);
        if let Some(archive) = archive {
            comment.push_str(&format!(" from {}", archive));
        }
        comment.push_str(&format!(", {} rows", file.rows));
        let data = DataFileRef::new(&file.file_name, &self.config.handler_class).in_archive(archive);
        let changeset = ChangeSet::custom(id, &self.config.author, comment, query, data);
        self.push(changeset)
    }

    /// Uniqueness constraints and lookup indexes.
    pub fn add_indexes(&mut self) -> Result<()> {
        self.advance(Stage::IndexesAdded)?;
        let entity = self.profile.entity_type().to_string();
        let id_property = self.profile.mapping.id_property.clone();

        self.schema_changeset(
            format!("create {} {} constraint", entity, id_property),
            create_constraint(&entity, &id_property),
        )?;
        self.schema_changeset(
            format!("create {} {} index", entity, PROP_NAME),
            create_index(&entity, PROP_NAME),
        )?;
        if self.profile.supports_synonyms {
            self.schema_changeset(
                format!("create {} name constraint", SYNONYM_LABEL),
                create_constraint(SYNONYM_LABEL, "name"),
            )?;
            self.schema_changeset(
                format!("create {} lowercase_name index", SYNONYM_LABEL),
                create_index(SYNONYM_LABEL, "lowercase_name"),
            )?;
        }
        // linked targets belong to the source that loads them
        let targets: Vec<String> = self
            .profile
            .mapping
            .dblink_sources
            .iter()
            .filter(|s| s.creates_placeholder())
            .map(|s| s.target_type())
            .collect();
        for target in targets {
            self.schema_changeset(
                format!("create {} id constraint", target),
                create_constraint(&target, "id"),
            )?;
        }
        Ok(())
    }

    fn value_types(&self) -> BTreeMap<String, ValueType> {
        self.profile
            .mapping
            .attributes
            .iter()
            .filter(|(_, spec)| spec.value_type != ValueType::Str)
            .map(|(raw, spec)| (spec.property_for(raw), spec.value_type))
            .collect()
    }

    /// One node changeset per node file, then one per label file.
    pub fn add_nodes(&mut self, report: &WriteReport, archive: Option<&str>) -> Result<()> {
        self.advance(Stage::NodesLoaded)?;
        let entity = report.entity_type.clone();
        let id_property = report.id_property.clone();
        let value_types = self.value_types();

        for file in report.files_of(FileKind::Nodes) {
            let mut upsert = NodeUpsert::new(&entity, &id_property)
                .labels(&report.labels)
                .properties(&file.columns)
                .typed(value_types.clone());
            if let (Some(property), Some(group)) = (&self.profile.partition_by, &file.group) {
                upsert = upsert.filter(RowFilter::new(property, group));
            }
            self.data_changeset(
                format!("load {} nodes from {}", entity, file.file_name),
                file,
                archive,
                upsert.to_cypher(),
            )?;
        }
        for file in report.files_of(FileKind::Labels) {
            let Some(label) = &file.group else {
                continue;
            };
            self.data_changeset(
                format!("set {} label from {}", label, file.file_name),
                file,
                archive,
                set_label(&entity, &id_property, label),
            )?;
        }
        Ok(())
    }

    pub fn add_synonyms(&mut self, report: &WriteReport, archive: Option<&str>) -> Result<()> {
        self.advance(Stage::SynonymsLoaded)?;
        for file in report.files_of(FileKind::Synonyms) {
            self.data_changeset(
                format!("load {} synonyms from {}", report.entity_type, file.file_name),
                file,
                archive,
                upsert_synonyms(&report.entity_type, &report.id_property),
            )?;
        }
        Ok(())
    }

    /// Relationship loads the mapping table declares, keyed by label and
    /// endpoint types, merged with whatever else the written rows carry.
    fn relationship_loads(&self, report: &WriteReport) -> Vec<RelationshipSummary> {
        let mapping = &self.profile.mapping;
        let mut loads: BTreeMap<(String, String, String), RelationshipSummary> = BTreeMap::new();
        for rel in mapping.relationships.values() {
            let owner = (mapping.entity_type.clone(), mapping.id_property.clone());
            let target = (
                rel.target_type.clone(),
                rel.lookup_key(&mapping.id_property).to_string(),
            );
            let ((from_type, from_key), (to_type, to_key)) = match rel.direction {
                Direction::To => (owner, target),
                Direction::From => (target, owner),
            };
            let mut properties: Vec<String> = rel.edge_attributes.values().cloned().collect();
            properties.sort();
            properties.dedup();
            for label in rel.labels() {
                loads.insert(
                    (label.to_string(), from_type.clone(), to_type.clone()),
                    RelationshipSummary {
                        label: label.to_string(),
                        from_type: from_type.clone(),
                        from_key: from_key.clone(),
                        to_type: to_type.clone(),
                        to_key: to_key.clone(),
                        properties: properties.clone(),
                        rows: 0,
                    },
                );
            }
        }
        for rel in &report.relationships {
            let key = (rel.label.clone(), rel.from_type.clone(), rel.to_type.clone());
            match loads.get_mut(&key) {
                Some(load) => {
                    load.rows = rel.rows;
                    for property in &rel.properties {
                        if !load.properties.contains(property) {
                            load.properties.push(property.clone());
                        }
                    }
                    load.properties.sort();
                }
                None => {
                    debug!(label = %rel.label, "relationship label not declared by the mapping");
                    loads.insert(key, rel.clone());
                }
            }
        }
        loads.into_values().collect()
    }

    /// One changeset per relationship label and endpoint pair, one per
    /// declared db-link database. Declared relationships get their changeset
    /// even when no row carries them, so a later incremental run finds the
    /// same ids.
    pub fn add_relationships(&mut self, report: &WriteReport, archive: Option<&str>) -> Result<()> {
        self.advance(Stage::RelationshipsLoaded)?;
        if let Some(file) = report.file_of(FileKind::Relationships) {
            for rel in self.relationship_loads(report) {
                let query = RelationshipUpsert::new(
                    Endpoint::new(&rel.from_type, &rel.from_key, "from_id"),
                    &rel.label,
                    Endpoint::new(&rel.to_type, &rel.to_key, "to_id"),
                )
                .properties(&rel.properties)
                .foreach(RowFilter::new("relationship", &rel.label))
                .to_cypher();
                self.data_changeset(
                    format!(
                        "load {} relationships from {} to {} in {}",
                        rel.label, rel.from_type, rel.to_type, file.file_name
                    ),
                    file,
                    archive,
                    query,
                )?;
            }
        }
        if let Some(file) = report.file_of(FileKind::DbLinks) {
            let sources = self.profile.mapping.dblink_sources.clone();
            for source in sources {
                let query = upsert_dblinks(
                    &report.entity_type,
                    &report.id_property,
                    &source.db_name,
                    &source.target_type(),
                    &source.edge_label(),
                    source.creates_placeholder(),
                );
                self.data_changeset(
                    format!("load {} db links from {}", source.db_name, file.file_name),
                    file,
                    archive,
                    query,
                )?;
            }
        }
        Ok(())
    }

    /// Close the changelog. Nodes must have been loaded.
    pub fn finalize(mut self) -> Result<ChangeLog> {
        if self.stage < Stage::NodesLoaded {
            return Err(ChangelogError::OutOfOrder {
                current: self.stage,
                attempted: Stage::Finalized,
            });
        }
        let file_name = self.changelog_file_name();
        self.stage = Stage::Finalized;
        info!(
            source = %self.profile.name,
            changesets = self.changesets.len(),
            file = %file_name,
            "changelog generated"
        );
        Ok(ChangeLog {
            file_name,
            changesets: self.changesets,
        })
    }
}

/// Every stage for one source's output, in order.
pub fn generate(
    config: GeneratorConfig,
    profile: &SourceProfile,
    report: &WriteReport,
    archive: Option<&str>,
) -> Result<ChangeLog> {
    let initial = config.load_mode == LoadMode::Initial;
    let mut generator = ChangesetGenerator::new(config, profile)?;
    if initial {
        generator.add_indexes()?;
    }
    generator.add_nodes(report, archive)?;
    generator.add_synonyms(report, archive)?;
    generator.add_relationships(report, archive)?;
    generator.finalize()
}
