//! Run configuration.
//!
//! Loaded from JSON. Mapping tables are not configured here: sources name a
//! built-in profile and may only override which files it reads.

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use graphload_changelog::{GeneratorConfig, LoadMode, DEFAULT_HANDLER_CLASS};
use graphload_ingest::{SourceRegistry, DEFAULT_CHUNK_SIZE};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_parallel() -> bool {
    true
}

fn default_handler_class() -> String {
    DEFAULT_HANDLER_CLASS.to_string()
}

/// One source to process in a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Name of a registered profile, e.g. `biocyc-gene`.
    pub profile: String,
    /// Replaces the profile's file list when non-empty.
    #[serde(default)]
    pub files: Vec<String>,
    /// Overrides the run's input directory for this source.
    #[serde(default)]
    pub input_dir: Option<PathBuf>,
    /// Archive base name; defaults to `<prefix><file stem>`.
    #[serde(default)]
    pub archive: Option<String>,
}

impl SourceConfig {
    pub fn new(profile: &str) -> Self {
        Self {
            profile: profile.to_string(),
            files: Vec::new(),
            input_dir: None,
            archive: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub author: String,
    /// Tracker key prefixed to every changeset id, e.g. `LL-1234`.
    #[serde(default)]
    pub ticket: Option<String>,
    /// Date stamped into changeset ids; today when absent.
    #[serde(default)]
    pub run_date: Option<NaiveDate>,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Prepended to every output file name.
    #[serde(default)]
    pub file_prefix: String,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default)]
    pub load_mode: LoadMode,
    #[serde(default = "default_parallel")]
    pub parallel: bool,
    #[serde(default = "default_handler_class")]
    pub handler_class: String,
    pub sources: Vec<SourceConfig>,
}

impl PipelineConfig {
    pub fn new(author: &str, input_dir: &Path, output_dir: &Path) -> Self {
        Self {
            author: author.to_string(),
            ticket: None,
            run_date: None,
            input_dir: input_dir.to_path_buf(),
            output_dir: output_dir.to_path_buf(),
            file_prefix: String::new(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            load_mode: LoadMode::default(),
            parallel: true,
            handler_class: DEFAULT_HANDLER_CLASS.to_string(),
            sources: Vec::new(),
        }
    }

    pub fn with_source(mut self, source: SourceConfig) -> Self {
        self.sources.push(source);
        self
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("invalid pipeline configuration")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read configuration {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("in {}", path.display()))
    }

    pub fn run_date(&self) -> NaiveDate {
        self.run_date
            .unwrap_or_else(|| chrono::Local::now().date_naive())
    }

    pub fn generator_config(&self) -> GeneratorConfig {
        let mut config = GeneratorConfig::new(&self.author, self.run_date())
            .with_mode(self.load_mode)
            .with_handler(&self.handler_class);
        if let Some(ticket) = &self.ticket {
            config = config.with_ticket(ticket);
        }
        config
    }

    /// Reject anything that would fail later, before any file is read.
    pub fn validate(&self, registry: &SourceRegistry) -> Result<()> {
        if self.chunk_size == 0 {
            bail!("chunk_size must be positive");
        }
        if self.sources.is_empty() {
            bail!("no sources configured");
        }
        self.generator_config()
            .validate()
            .context("invalid changeset settings")?;

        let mut stems = HashSet::new();
        for source in &self.sources {
            let Some(profile) = registry.get(&source.profile) else {
                bail!("unknown source profile `{}`", source.profile);
            };
            if !stems.insert(profile.file_stem.as_str()) {
                bail!(
                    "source `{}` would overwrite the output files of another source (stem `{}`)",
                    source.profile,
                    profile.file_stem
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> SourceRegistry {
        SourceRegistry::builtin().expect("builtin profiles")
    }

    #[test]
    fn json_defaults_apply() {
        let config = PipelineConfig::from_json(
            r#"{
                "author": "loader",
                "input_dir": "/data/in",
                "output_dir": "/data/out",
                "run_date": "2024-03-07",
                "sources": [{ "profile": "go" }]
            }"#,
        )
        .expect("parse");
        assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE);
        assert!(config.parallel);
        assert_eq!(config.load_mode, LoadMode::Initial);
        assert_eq!(config.handler_class, DEFAULT_HANDLER_CLASS);
        assert_eq!(config.run_date(), NaiveDate::from_ymd_opt(2024, 3, 7).expect("date"));
        assert_eq!(config.sources[0], SourceConfig::new("go"));
        config.validate(&registry()).expect("valid");
    }

    #[test]
    fn incremental_mode_parses() {
        let config = PipelineConfig::from_json(
            r#"{"author": "a", "input_dir": ".", "output_dir": ".", "load_mode": "incremental",
                "ticket": "LL-42", "sources": [{"profile": "ncbi-gene", "files": ["small.tsv"]}]}"#,
        )
        .expect("parse");
        assert_eq!(config.load_mode, LoadMode::Incremental);
        assert_eq!(config.sources[0].files, vec!["small.tsv"]);
        config.validate(&registry()).expect("valid");
    }

    #[test]
    fn rejects_bad_settings() {
        let registry = registry();
        let base = PipelineConfig::new("loader", Path::new("."), Path::new("."))
            .with_source(SourceConfig::new("go"));

        let mut config = base.clone();
        config.chunk_size = 0;
        assert!(config.validate(&registry).is_err());

        let mut config = base.clone();
        config.author = String::new();
        assert!(config.validate(&registry).is_err());

        let mut config = base.clone();
        config.ticket = Some("not a ticket".to_string());
        assert!(config.validate(&registry).is_err());

        let config = base.clone().with_source(SourceConfig::new("uniprot"));
        let err = config.validate(&registry).expect_err("unknown profile");
        assert!(err.to_string().contains("uniprot"));

        let config = base.with_source(SourceConfig::new("go"));
        assert!(config.validate(&registry).is_err());
    }
}
