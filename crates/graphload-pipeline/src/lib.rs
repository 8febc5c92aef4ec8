//! Batch orchestration.
//!
//! Each configured source runs as an independent worker that owns its graph
//! and its output files:
//!
//! 1. parse (record sources whole, table sources in chunks)
//! 2. resolve db links and link targets parsed in the same batch
//! 3. extract synonyms when the profile supports them
//! 4. write TSVs, bundle them with a checksum manifest
//! 5. generate and write the source's changelog
//!
//! A failing source leaves no changelog; other sources are unaffected.

pub mod config;
pub mod logging;

pub use config::{PipelineConfig, SourceConfig};

use anyhow::{Context, Result};
use graphload_changelog::{generate, write_changelog};
use graphload_export::{bundle, write_graph, ArchiveManifest, SourceWriter, WriteReport};
use graphload_ingest::{open_table, parse_profile, ParseStats, SourceRegistry};
use graphload_model::{
    DbLinkResolver, Graph, SourceFormat, SourceProfile, SynonymExtractor, SynonymRow,
};
use rayon::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// Outcome of one successful source.
#[derive(Debug, Clone, Serialize)]
pub struct SourceReport {
    pub source: String,
    pub parse: ParseStats,
    pub dblinks: usize,
    /// Edges whose target was found in the same batch.
    pub linked_locally: usize,
    pub synonyms: usize,
    pub files: WriteReport,
    pub manifest: ArchiveManifest,
    pub changelog: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceFailure {
    pub source: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub completed: Vec<SourceReport>,
    pub failed: Vec<SourceFailure>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn source(&self, name: &str) -> Option<&SourceReport> {
        self.completed.iter().find(|r| r.source == name)
    }
}

/// What the parse stage hands to the writer stage.
struct Parsed {
    stats: ParseStats,
    dblinks: usize,
    linked_locally: usize,
    synonyms: usize,
    files: WriteReport,
}

pub struct Pipeline<'a> {
    config: &'a PipelineConfig,
    registry: &'a SourceRegistry,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: &'a PipelineConfig, registry: &'a SourceRegistry) -> Result<Self> {
        config.validate(registry)?;
        Ok(Self { config, registry })
    }

    pub fn run(&self) -> RunReport {
        let outcomes: Vec<(String, Result<SourceReport>)> = if self.config.parallel {
            self.config
                .sources
                .par_iter()
                .map(|source| (source.profile.clone(), self.run_source(source)))
                .collect()
        } else {
            self.config
                .sources
                .iter()
                .map(|source| (source.profile.clone(), self.run_source(source)))
                .collect()
        };

        let mut report = RunReport::default();
        for (source, outcome) in outcomes {
            match outcome {
                Ok(done) => report.completed.push(done),
                Err(e) => {
                    error!(source = %source, error = %format!("{:#}", e), "source failed");
                    report.failed.push(SourceFailure {
                        source,
                        error: format!("{:#}", e),
                    });
                }
            }
        }
        info!(
            completed = report.completed.len(),
            failed = report.failed.len(),
            "run finished"
        );
        report
    }

    fn profile_for(&self, source: &SourceConfig) -> Result<SourceProfile> {
        let mut profile = self
            .registry
            .get(&source.profile)
            .cloned()
            .with_context(|| format!("unknown source profile `{}`", source.profile))?;
        if !source.files.is_empty() {
            profile.files = source.files.clone();
        }
        Ok(profile)
    }

    pub fn run_source(&self, source: &SourceConfig) -> Result<SourceReport> {
        let profile = self.profile_for(source)?;
        let input_dir = source
            .input_dir
            .as_deref()
            .unwrap_or(self.config.input_dir.as_path());
        let output_dir = &self.config.output_dir;
        info!(source = %profile.name, input = %input_dir.display(), "source started");

        let parsed = match profile.format {
            SourceFormat::DelimitedTable => self.run_chunked(&profile, input_dir, output_dir)?,
            SourceFormat::AttributeValue | SourceFormat::Stanza => {
                self.run_records(&profile, input_dir, output_dir)?
            }
        };

        let archive = source
            .archive
            .clone()
            .unwrap_or_else(|| format!("{}{}", self.config.file_prefix, profile.file_stem));
        let manifest = bundle(output_dir, &parsed.files.file_names(), &archive)
            .with_context(|| format!("bundling {}", profile.name))?;

        let changelog = generate(
            self.config.generator_config(),
            &profile,
            &parsed.files,
            Some(&manifest.archive),
        )
        .with_context(|| format!("generating changelog for {}", profile.name))?;
        let changelog_path = write_changelog(&changelog, output_dir)
            .with_context(|| format!("writing changelog for {}", profile.name))?;

        Ok(SourceReport {
            source: profile.name.clone(),
            parse: parsed.stats,
            dblinks: parsed.dblinks,
            linked_locally: parsed.linked_locally,
            synonyms: parsed.synonyms,
            files: parsed.files,
            manifest,
            changelog: changelog_path,
        })
    }

    fn run_records(&self, profile: &SourceProfile, input_dir: &Path, output_dir: &Path) -> Result<Parsed> {
        let (mut graph, stats) = parse_profile(profile, input_dir)
            .with_context(|| format!("parsing {}", profile.name))?;
        let dblinks = DbLinkResolver::new(&profile.mapping).resolve(&mut graph);
        let linked_locally = graph.link_local_targets();
        graph.canonicalize();
        info!(source = %profile.name, dblinks, linked_locally, "references resolved");

        let synonyms = extract_synonyms(profile, &graph);
        let files = write_graph(profile, &graph, &synonyms, output_dir, &self.config.file_prefix)
            .with_context(|| format!("writing {}", profile.name))?;
        Ok(Parsed {
            stats,
            dblinks,
            linked_locally,
            synonyms: synonyms.len(),
            files,
        })
    }

    /// Rows are read, converted, and written one chunk at a time; file order
    /// is preserved so the output does not depend on the chunk size.
    fn run_chunked(&self, profile: &SourceProfile, input_dir: &Path, output_dir: &Path) -> Result<Parsed> {
        let resolver = DbLinkResolver::new(&profile.mapping);
        let mut writer = SourceWriter::create(profile, output_dir, &self.config.file_prefix)
            .with_context(|| format!("opening output for {}", profile.name))?;
        let mut stats = ParseStats::default();
        let mut dblinks = 0;
        let mut synonyms = 0;

        for file in &profile.files {
            let path = input_dir.join(file);
            let mut chunks = open_table(profile, &path, self.config.chunk_size)
                .with_context(|| format!("opening {}", path.display()))?;
            for (index, chunk) in chunks.by_ref().enumerate() {
                let nodes = chunk.with_context(|| format!("reading {}", path.display()))?;
                let mut graph: Graph = nodes.into_iter().collect();
                if let Some(hook) = profile.post_process {
                    hook(&mut graph);
                }
                dblinks += resolver.resolve(&mut graph);
                let rows = extract_synonyms(profile, &graph);
                synonyms += rows.len();
                writer
                    .write_chunk(&graph, &rows)
                    .with_context(|| format!("writing {}", profile.name))?;
                debug!(source = %profile.name, chunk = index, nodes = graph.len(), "chunk written");
            }
            stats.absorb(chunks.stats());
        }
        let files = writer
            .finish()
            .with_context(|| format!("finishing {}", profile.name))?;
        info!(source = %profile.name, records = stats.records, nodes = stats.nodes, "table loaded");
        Ok(Parsed {
            stats,
            dblinks,
            linked_locally: 0,
            synonyms,
            files,
        })
    }
}

fn extract_synonyms(profile: &SourceProfile, graph: &Graph) -> Vec<SynonymRow> {
    if !profile.supports_synonyms {
        return Vec::new();
    }
    SynonymExtractor::new(&profile.synonym_properties).extract(graph.nodes())
}

/// Validate `config` and process every source in it.
pub fn run(config: &PipelineConfig, registry: &SourceRegistry) -> Result<RunReport> {
    Ok(Pipeline::new(config, registry)?.run())
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphload_export::FileKind;

    fn write(dir: &Path, name: &str, text: &str) {
        std::fs::write(dir.join(name), text).expect("write input");
    }

    const PATHWAYS: &str = "# BioCyc pathways\n\
UNIQUE-ID - PWY-1\nTYPES - Super-Pathways\nCOMMON-NAME - superpathway\n//\n\
UNIQUE-ID - PWY-2\nCOMMON-NAME - glycolysis\nSYNONYMS - Embden-Meyerhof\nSUPER-PATHWAYS - PWY-1\n//\n";

    fn config(input: &Path, output: &Path) -> PipelineConfig {
        let mut config = PipelineConfig::new("loader", input, output)
            .with_source(SourceConfig::new("biocyc-pathway"));
        config.run_date = chrono::NaiveDate::from_ymd_opt(2024, 3, 7);
        config
    }

    #[test]
    fn record_source_runs_end_to_end() {
        let input = tempfile::tempdir().expect("input");
        let output = tempfile::tempdir().expect("output");
        write(input.path(), "pathways.dat", PATHWAYS);
        let registry = SourceRegistry::builtin().expect("registry");

        let report = run(&config(input.path(), output.path()), &registry).expect("run");
        assert!(report.is_success());
        let source = report.source("biocyc-pathway").expect("pathway report");
        assert_eq!(source.parse.records, 2);
        assert_eq!(source.linked_locally, 1);
        assert_eq!(source.files.total_rows(FileKind::Nodes), 2);
        assert_eq!(source.manifest.archive, "pathway.tar.gz");
        assert!(output.path().join("pathway.manifest.json").exists());
        assert_eq!(
            source.changelog.file_name().and_then(|n| n.to_str()),
            Some("biocyc-pathway-initial-changelog-03072024.xml")
        );
    }

    #[test]
    fn failed_source_writes_no_changelog() {
        let input = tempfile::tempdir().expect("input");
        let output = tempfile::tempdir().expect("output");
        let registry = SourceRegistry::builtin().expect("registry");

        let report = run(&config(input.path(), output.path()), &registry).expect("run");
        assert!(!report.is_success());
        assert_eq!(report.failed[0].source, "biocyc-pathway");
        assert!(report.failed[0].error.contains("pathways.dat"));
        let changelogs = std::fs::read_dir(output.path())
            .expect("list")
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".xml"))
            .count();
        assert_eq!(changelogs, 0);
    }

    #[test]
    fn invalid_configuration_fails_before_io() {
        let registry = SourceRegistry::builtin().expect("registry");
        let mut config = config(Path::new("/nonexistent/in"), Path::new("/nonexistent/out"));
        config.ticket = Some("LL1234".to_string());
        assert!(run(&config, &registry).is_err());
    }
}
