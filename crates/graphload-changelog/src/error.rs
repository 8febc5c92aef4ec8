use crate::generator::Stage;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChangelogError {
    #[error("ticket `{0}` is not a tracker key such as LL-1234")]
    InvalidTicket(String),

    #[error("changeset author must not be empty")]
    MissingAuthor,

    #[error("changeset handler class must not be empty")]
    MissingHandler,

    #[error("cannot move from {current:?} to {attempted:?}")]
    OutOfOrder { current: Stage, attempted: Stage },

    #[error("duplicate changeset id `{0}`")]
    DuplicateId(String),

    #[error("xml rendering failed: {0}")]
    Xml(String),

    #[error("cannot write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid pattern: {0}")]
    Regex(#[from] regex::Error),
}

pub type Result<T> = std::result::Result<T, ChangelogError>;
