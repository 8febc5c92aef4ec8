use graphload_model::MappingError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("cannot open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("read error: {0}")]
    Io(#[from] std::io::Error),

    #[error("delimited table: {0}")]
    Csv(#[from] csv::Error),

    #[error("column `{column}` missing from table header")]
    MissingColumn { column: String },

    #[error("invalid pattern: {0}")]
    Regex(#[from] regex::Error),

    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error("source `{profile}` is not a {expected} source")]
    WrongFormat {
        profile: String,
        expected: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, IngestError>;
