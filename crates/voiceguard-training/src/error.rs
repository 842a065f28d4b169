use thiserror::Error;

pub type TrainingResult<T> = std::result::Result<T, TrainingError>;

/// A single file that did not reach the hub during `upload_directory`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFailure {
    pub path_in_repo: String,
    pub cause: String,
}

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Missing or rejected hub credentials.
    #[error("hub authentication failed: {0}")]
    Auth(String),

    /// Hub create/upload/visibility failure.
    #[error("hub request failed: {0}")]
    Remote(String),

    #[error("upload to {repo_id} failed for {} file(s): {}", failures.len(), format_failures(failures))]
    PartialUpload { repo_id: String, failures: Vec<UploadFailure> },

    #[error("ledger announcement gave up after {attempts} attempt(s): {last_error}")]
    LedgerExhausted { attempts: u32, last_error: String },

    #[error("trainer error: {0}")]
    Trainer(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Corpus(#[from] voiceguard_corpus::CorpusError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn format_failures(failures: &[UploadFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{} ({})", f.path_in_repo, f.cause))
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<config::ConfigError> for TrainingError {
    fn from(err: config::ConfigError) -> Self {
        Self::InvalidConfig(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_upload_lists_every_failed_file() {
        let err = TrainingError::PartialUpload {
            repo_id: "alice/model".to_string(),
            failures: vec![
                UploadFailure { path_in_repo: "a.bin".to_string(), cause: "500".to_string() },
                UploadFailure { path_in_repo: "nested/b.json".to_string(), cause: "timeout".to_string() },
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("2 file(s)"));
        assert!(msg.contains("a.bin (500)"));
        assert!(msg.contains("nested/b.json (timeout)"));
    }
}
