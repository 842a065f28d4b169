use std::path::PathBuf;
use thiserror::Error;

pub type CorpusResult<T> = std::result::Result<T, CorpusError>;

#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("download of {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The server did not say how large the file is.
    #[error("no content-length in response for {0}")]
    MissingContentLength(String),

    #[error("cannot derive a file name from {0}")]
    InvalidUrl(String),

    #[error("failed to unpack {}: {source}", path.display())]
    Archive {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
