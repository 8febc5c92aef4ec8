//! Integration tests for the complete graphload pipeline
//!
//! These exercise the full flow across crates:
//! - source files → graph (ingest)
//! - graph → TSV files and archive (export)
//! - written files → changelog (changelog)
//! - configuration → per-source runs (pipeline)
//!
//! Run with: cargo test --test integration_tests

use graphload_export::{read_manifest, read_tsv, verify, write_graph, FileKind};
use graphload_ingest::{parse_profile, sources, SourceRegistry};
use graphload_model::{DbLinkResolver, EdgeKind, SynonymExtractor};
use graphload_pipeline::{run, PipelineConfig, RunReport, SourceConfig};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use tempfile::tempdir;

fn write_input(dir: &Path, name: &str, text: &str) {
    fs::write(dir.join(name), text).expect("write input file");
}

fn config(input: &Path, output: &Path, source: SourceConfig) -> PipelineConfig {
    let mut config = PipelineConfig::new("loader", input, output).with_source(source);
    config.run_date = chrono::NaiveDate::from_ymd_opt(2024, 3, 7);
    config
}

fn run_ok(config: &PipelineConfig) -> RunReport {
    let registry = SourceRegistry::builtin().expect("builtin profiles");
    let report = run(config, &registry).expect("valid configuration");
    assert!(report.is_success(), "failed sources: {:?}", report.failed);
    report
}

fn rows(dir: &Path, name: &str) -> Vec<Vec<String>> {
    read_tsv(&dir.join(name)).expect("read tsv")
}

// ============================================================================
// Attribute-value records
// ============================================================================

const THREE_PATHWAYS: &str = "# pathways\n\
UNIQUE-ID - PWY-1\n\
COMMON-NAME - serine biosynthesis\n\
//\n\
UNIQUE-ID - PWY-2\n\
COMMON-NAME - glycolysis\n\
SYNONYMS - Embden-Meyerhof pathway|EMP pathway\n\
SUPER-PATHWAYS - PWY-3\n\
//\n\
UNIQUE-ID - PWY-3\n\
COMMON-NAME - central carbon metabolism\n\
SYNONYMS - \n\
//\n";

#[test]
fn test_three_record_file_to_tsv() {
    let input = tempdir().expect("input dir");
    let output = tempdir().expect("output dir");
    write_input(input.path(), "pathways.dat", THREE_PATHWAYS);

    let profile = sources::biocyc::pathway();
    let (mut graph, stats) = parse_profile(&profile, input.path()).expect("parse");
    assert_eq!(stats.records, 3);
    assert_eq!(graph.len(), 3);
    assert_eq!(DbLinkResolver::new(&profile.mapping).resolve(&mut graph), 0);
    assert_eq!(graph.link_local_targets(), 1);

    let edges: Vec<_> = graph
        .nodes()
        .flat_map(|n| n.edges().map(move |e| (n.id().to_string(), e)))
        .collect();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].0, "PWY-2");
    assert_eq!(edges[0].1.label, "IN_PATHWAY");
    assert_eq!(edges[0].1.kind, EdgeKind::Relationship);
    assert_eq!(graph.target_id(edges[0].1), "PWY-3");

    let synonyms = SynonymExtractor::new(&profile.synonym_properties).extract(graph.nodes());
    let report = write_graph(&profile, &graph, &synonyms, output.path(), "").expect("write");

    let nodes = rows(output.path(), "pathway.tsv");
    assert_eq!(nodes.len(), 4);
    assert_eq!(nodes[0][0], "id");

    let rels = rows(output.path(), "pathway-rels.tsv");
    assert_eq!(rels[1..], [vec!["IN_PATHWAY", "PWY-2", "PWY-3"]]);

    let synonyms = rows(output.path(), "pathway-synonyms.tsv");
    assert_eq!(synonyms[0], vec!["id", "name"]);
    assert_eq!(
        synonyms[1..],
        [
            vec!["PWY-2", "glycolysis"],
            vec!["PWY-2", "Embden-Meyerhof pathway"],
            vec!["PWY-2", "EMP pathway"],
        ]
    );
    assert_eq!(report.total_rows(FileKind::Synonyms), 3);
}

#[test]
fn test_protein_types_are_pruned() {
    let input = tempdir().expect("input dir");
    let output = tempdir().expect("output dir");
    write_input(
        input.path(),
        "proteins.dat",
        "UNIQUE-ID - MONOMER-1\n\
TYPES - Polypeptides\n\
COMMON-NAME - thioredoxin\n\
GENE - G-1\n\
//\n\
UNIQUE-ID - MONOMER-1-P\n\
TYPES - Modified-Proteins\n\
TYPES - Phosphoproteins\n\
COMMON-NAME - phospho-thioredoxin\n\
GENE - G-1\n\
//\n\
UNIQUE-ID - CPLX-1\n\
TYPES - Protein-Complexes\n\
COMPONENTS - MONOMER-1\n\
//\n",
    );
    let mut source = SourceConfig::new("biocyc-protein");
    source.files = vec!["proteins.dat".to_string()];
    let report = run_ok(&config(input.path(), output.path(), source));
    assert_eq!(report.source("biocyc-protein").expect("report").parse.nodes, 3);

    let rels = rows(output.path(), "protein-rels.tsv");
    let rels = &rels[1..];
    assert_eq!(rels.len(), 3);
    assert!(rels.contains(&vec!["ENCODES".to_string(), "G-1".into(), "MONOMER-1".into()]));
    assert!(rels.contains(&vec!["TYPE_OF".to_string(), "MONOMER-1-P".into(), "Phosphoproteins".into()]));
    assert!(rels.contains(&vec!["COMPONENT_OF".to_string(), "MONOMER-1".into(), "CPLX-1".into()]));
    assert!(!rels.iter().any(|r| r[2] == "Polypeptides" || r[2] == "Modified-Proteins"));

    let complexes = rows(output.path(), "protein-label-Complex.tsv");
    assert_eq!(complexes[1..], [vec!["CPLX-1"]]);
    let changelog = fs::read_to_string(output.path().join("biocyc-protein-initial-changelog-03072024.xml"))
        .expect("changelog");
    assert!(changelog.contains("set Complex label from protein-label-Complex.tsv"));
}

#[test]
fn test_unprefixed_go_links() {
    let input = tempdir().expect("input dir");
    let output = tempdir().expect("output dir");
    write_input(
        input.path(),
        "proteins.dat",
        "UNIQUE-ID - MONOMER-7\n\
COMMON-NAME - kinase\n\
GO-TERMS - 1234|5678\n\
GO-TERMS - 1234|5678\n\
//\n",
    );
    let mut source = SourceConfig::new("biocyc-protein");
    source.files = vec!["proteins.dat".to_string()];
    let report = run_ok(&config(input.path(), output.path(), source));
    assert_eq!(report.source("biocyc-protein").expect("report").dblinks, 2);

    let links = rows(output.path(), "protein-dblinks.tsv");
    assert_eq!(links[0], vec!["from_id", "to_id", "db_name"]);
    assert_eq!(
        links[1..],
        [vec!["MONOMER-7", "1234", "GO"], vec!["MONOMER-7", "5678", "GO"]]
    );

    let changelog = fs::read_to_string(output.path().join("biocyc-protein-initial-changelog-03072024.xml"))
        .expect("changelog");
    assert!(changelog.contains("load GO db links from protein-dblinks.tsv"));
    assert!(changelog.contains("GO_LINK"));
}

// ============================================================================
// OBO stanzas
// ============================================================================

const GO_OBO: &str = "format-version: 1.2\n\
ontology: go\n\
\n\
[Term]\n\
id: GO:0000001\n\
name: mitochondrion inheritance\n\
namespace: biological_process\n\
synonym: \"mitochondrial inheritance\" EXACT []\n\
is_a: GO:0048308 ! organelle inheritance\n\
\n\
[Term]\n\
id: GO:0048308\n\
name: organelle inheritance\n\
namespace: biological_process\n\
alt_id: GO:0000002\n\
\n\
[Term]\n\
id: GO:0005575\n\
name: cellular_component\n\
namespace: cellular_component\n\
relationship: part_of GO:0000002 ! organelle inheritance\n\
\n\
[Typedef]\n\
id: part_of\n\
name: part of\n";

#[test]
fn test_go_terms_partitioned_by_namespace() {
    let input = tempdir().expect("input dir");
    let output = tempdir().expect("output dir");
    write_input(input.path(), "go.obo", GO_OBO);

    let report = run_ok(&config(input.path(), output.path(), SourceConfig::new("go")));
    let go = report.source("go").expect("go report");
    assert_eq!(go.parse.nodes, 3);

    assert_eq!(rows(output.path(), "go-biological_process.tsv").len(), 3);
    assert_eq!(rows(output.path(), "go-cellular_component.tsv").len(), 2);
    assert_eq!(rows(output.path(), "go-label-BiologicalProcess.tsv").len(), 3);

    let rels = rows(output.path(), "go-rels.tsv");
    let rels = &rels[1..];
    assert!(rels.contains(&vec!["IS_A".to_string(), "0000001".into(), "0048308".into()]));
    // the alternate id resolves to the owning term
    assert!(rels.contains(&vec!["PART_OF".to_string(), "0005575".into(), "0048308".into()]));

    let synonyms = rows(output.path(), "go-synonyms.tsv");
    assert_eq!(
        synonyms[1..],
        [
            vec!["0000001", "mitochondrion inheritance"],
            vec!["0000001", "mitochondrial inheritance"],
        ]
    );

    let changelog = fs::read_to_string(&go.changelog).expect("changelog");
    assert!(changelog.contains("WITH row WHERE"));
    assert!(changelog.contains("load PART_OF relationships"));
}

#[test]
fn test_file_set_and_changesets_do_not_depend_on_data() {
    let input = tempdir().expect("input dir");
    let output = tempdir().expect("output dir");
    write_input(
        input.path(),
        "proteins.dat",
        "UNIQUE-ID - MONOMER-9\nCOMMON-NAME - lone monomer\n//\n",
    );
    write_input(input.path(), "go.obo", GO_OBO);
    let mut protein = SourceConfig::new("biocyc-protein");
    protein.files = vec!["proteins.dat".to_string()];
    let config = config(input.path(), output.path(), protein).with_source(SourceConfig::new("go"));
    let report = run_ok(&config);

    // no complex and no molecular_function term in the input
    assert_eq!(rows(output.path(), "protein-label-Complex.tsv"), vec![vec!["id".to_string()]]);
    assert_eq!(rows(output.path(), "go-molecular_function.tsv").len(), 1);
    assert_eq!(rows(output.path(), "go-label-MolecularFunction.tsv").len(), 1);
    assert_eq!(rows(output.path(), "protein-rels.tsv").len(), 1);

    let protein = fs::read_to_string(&report.source("biocyc-protein").expect("protein").changelog)
        .expect("protein changelog");
    assert!(protein.contains("set Complex label from protein-label-Complex.tsv"));
    assert!(protein.contains("load ENCODES relationships from Gene to Protein in protein-rels.tsv"));
    assert!(protein.contains("load COMPONENT_OF relationships from Protein to Protein in protein-rels.tsv"));

    let go = fs::read_to_string(&report.source("go").expect("go").changelog).expect("go changelog");
    assert!(go.contains("load db_GO nodes from go-molecular_function.tsv"));
    assert!(go.contains("set MolecularFunction label from go-label-MolecularFunction.tsv"));
    assert!(go.contains("load HAS_PART relationships from db_GO to db_GO in go-rels.tsv"));
    assert!(go.contains("load REPLACED_BY relationships from db_GO to db_GO in go-rels.tsv"));
}

// ============================================================================
// Chunked tables
// ============================================================================

const GENE_ROWS: usize = 250_000;

fn write_gene_table(path: &Path) {
    let file = fs::File::create(path).expect("create table");
    let mut out = BufWriter::new(file);
    writeln!(out, "#tax_id\tGeneID\tSymbol\tLocusTag\tSynonyms\tdescription").expect("header");
    for i in 0..GENE_ROWS {
        if i % 1000 == 999 {
            writeln!(out, "9606\t{}\tNEWENTRY\t-\t-\tplaceholder", i).expect("row");
        } else if i % 5000 == 2500 {
            writeln!(out, "9606\t-\tORPHAN{}\t-\t-\tno id", i).expect("row");
        } else {
            writeln!(out, "9606\t{}\tSYM{}\tLT{}\tS{}A|S{}B\tgene number {}", i, i, i, i, i, i)
                .expect("row");
        }
    }
    out.flush().expect("flush table");
}

fn table_config(input: &Path, output: &Path, chunk_size: usize) -> PipelineConfig {
    let mut source = SourceConfig::new("ncbi-gene");
    source.files = vec!["gene_info.tsv".to_string()];
    let mut config = config(input, output, source);
    config.chunk_size = chunk_size;
    config
}

#[test]
fn test_chunked_table_matches_single_chunk() {
    let input = tempdir().expect("input dir");
    let chunked = tempdir().expect("chunked output");
    let whole = tempdir().expect("whole output");
    write_gene_table(&input.path().join("gene_info.tsv"));

    let small = run_ok(&table_config(input.path(), chunked.path(), 10_000));
    let large = run_ok(&table_config(input.path(), whole.path(), GENE_ROWS));
    let small = small.source("ncbi-gene").expect("chunked report");
    let large = large.source("ncbi-gene").expect("whole report");

    assert_eq!(small.parse.records, GENE_ROWS);
    assert_eq!(small.parse.skipped, 250);
    assert_eq!(small.parse.missing_id, 50);
    assert_eq!(
        small.files.total_rows(FileKind::Nodes),
        small.parse.records - small.parse.skipped - small.parse.missing_id
    );
    assert_eq!(small.parse, large.parse);
    assert_eq!(small.synonyms, large.synonyms);

    let names = small.files.file_names();
    assert_eq!(names, large.files.file_names());
    for name in &names {
        let a = fs::read(chunked.path().join(name)).expect("chunked file");
        let b = fs::read(whole.path().join(name)).expect("whole file");
        assert!(a == b, "{} differs between chunk sizes", name);
    }
    assert_eq!(small.manifest.sha256, large.manifest.sha256);

    let a = fs::read_to_string(&small.changelog).expect("chunked changelog");
    let b = fs::read_to_string(&large.changelog).expect("whole changelog");
    assert_eq!(a, b);
}

// ============================================================================
// Archive and changelog
// ============================================================================

#[test]
fn test_archive_manifest_verifies() {
    let input = tempdir().expect("input dir");
    let output = tempdir().expect("output dir");
    write_input(input.path(), "pathways.dat", THREE_PATHWAYS);

    let report = run_ok(&config(input.path(), output.path(), SourceConfig::new("biocyc-pathway")));
    let pathway = report.source("biocyc-pathway").expect("report");
    let manifest = read_manifest(&output.path().join("pathway.manifest.json")).expect("manifest");
    assert_eq!(manifest, pathway.manifest);
    assert_eq!(manifest.entries.len(), pathway.files.files.len());
    assert!(verify(output.path(), &manifest).expect("verify").is_empty());

    fs::write(output.path().join("pathway.tsv"), "tampered\n").expect("tamper");
    assert_eq!(verify(output.path(), &manifest).expect("verify"), vec!["pathway.tsv"]);
}

#[test]
fn test_changelog_ids_are_deterministic() {
    let input = tempdir().expect("input dir");
    write_input(input.path(), "pathways.dat", THREE_PATHWAYS);

    let generate = |date: (i32, u32, u32)| {
        let output = tempdir().expect("output dir");
        let mut config = config(input.path(), output.path(), SourceConfig::new("biocyc-pathway"));
        config.ticket = Some("LL-1234".to_string());
        config.run_date = chrono::NaiveDate::from_ymd_opt(date.0, date.1, date.2);
        let report = run_ok(&config);
        let changelog = &report.source("biocyc-pathway").expect("report").changelog;
        fs::read_to_string(changelog).expect("changelog")
    };

    let first = generate((2024, 3, 7));
    let again = generate((2024, 3, 7));
    assert_eq!(first, again);
    assert!(first.contains("id=\"LL-1234 create Pathway biocyc_id constraint on date 03072024\""));

    let later = generate((2024, 3, 8));
    assert_ne!(first, later);
    let shifted = first
        .replace("on date 03072024", "on date 03082024")
        .replace("created on 03/07/2024", "created on 03/08/2024");
    assert_eq!(shifted, later);
}

#[test]
fn test_failed_source_does_not_stop_others() {
    let input = tempdir().expect("input dir");
    let output = tempdir().expect("output dir");
    write_input(input.path(), "pathways.dat", THREE_PATHWAYS);

    let config = config(input.path(), output.path(), SourceConfig::new("biocyc-pathway"))
        .with_source(SourceConfig::new("biocyc-compound"));
    let registry = SourceRegistry::builtin().expect("builtin profiles");
    let report = run(&config, &registry).expect("valid configuration");

    assert!(report.source("biocyc-pathway").is_some());
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].source, "biocyc-compound");
    assert!(!output
        .path()
        .join("biocyc-compound-initial-changelog-03072024.xml")
        .exists());
}
