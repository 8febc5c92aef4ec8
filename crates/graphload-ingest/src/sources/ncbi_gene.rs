//! NCBI `gene_info` identifier table.

use graphload_model::{
    MappingTable, SourceFormat, SourceProfile, TableLayout, ValueType, PROP_NAME, PROP_SYNONYMS,
};

pub const DATA_SOURCE: &str = "NCBI Gene";
pub const DB_LABEL: &str = "db_NCBI";

pub fn profile() -> SourceProfile {
    let mapping = MappingTable::new("Gene", "GeneID", "id")
        .attr("GeneID", "id", ValueType::Str)
        .attr("#tax_id", "tax_id", ValueType::Str)
        .attr("Symbol", PROP_NAME, ValueType::Str)
        .attr("LocusTag", "locus_tag", ValueType::Str)
        .attr("Synonyms", PROP_SYNONYMS, ValueType::Str)
        .attr("description", "full_name", ValueType::Str)
        .columns(&["id", PROP_NAME, "locus_tag", "full_name", "tax_id", "data_source"]);
    SourceProfile::new("ncbi-gene", DATA_SOURCE, SourceFormat::DelimitedTable, mapping)
        .with_file_stem("ncbi-gene")
        .with_files(&["gene_info.gz"])
        .with_labels(&[DB_LABEL])
        .with_synonyms(&["locus_tag"])
        .with_table(TableLayout {
            delimiter: b'\t',
            null_marker: Some("-".to_string()),
            skip_rows: vec![("Symbol".to_string(), "NEWENTRY".to_string())],
        })
}
