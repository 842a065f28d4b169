//! Publishing a checkpoint directory to the model hub.

use crate::artifacts::list_files;
use crate::error::{TrainingError, TrainingResult, UploadFailure};
use crate::hub::{HubClient, Visibility};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Where a published checkpoint lives: repository and content revision.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicationReference {
    pub repository_id: String,
    pub revision: String,
}

impl fmt::Display for PublicationReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.repository_id, self.revision)
    }
}

pub struct ArtifactPublisher {
    client: Arc<dyn HubClient>,
}

impl ArtifactPublisher {
    #[must_use]
    pub fn new(client: Arc<dyn HubClient>) -> Self {
        Self { client }
    }

    /// Create `owner/name` if it does not exist and return its id.
    ///
    /// Without an explicit owner the account behind the credentials is used.
    pub async fn ensure_repository(&self, owner: Option<&str>, name: &str) -> TrainingResult<String> {
        let name = name.trim();
        if name.is_empty() || name.contains('/') {
            return Err(TrainingError::InvalidConfig(format!(
                "repository name must be a single path segment: {name:?}"
            )));
        }

        let owner = match owner.map(str::trim).filter(|o| !o.is_empty()) {
            Some(owner) => owner.to_string(),
            None => self.client.whoami().await?,
        };
        let repo_id = format!("{owner}/{name}");
        self.client.create_repo(&repo_id, true).await?;
        debug!(repo_id = %repo_id, "Repository ready");
        Ok(repo_id)
    }

    pub async fn set_visibility(&self, repository_id: &str, state: Visibility) -> TrainingResult<()> {
        self.client.update_repo_visibility(repository_id, state).await?;
        info!(repo_id = %repository_id, visibility = %state, "Repository visibility updated");
        Ok(())
    }

    /// Upload every file under `local_dir`, keeping relative paths, and return
    /// the revision the repository ends up at.
    ///
    /// Every file is attempted; if any fails the call returns a single
    /// [`TrainingError::PartialUpload`] naming each failed path and no revision.
    /// A credential failure stops the upload immediately.
    pub async fn upload_directory(&self, local_dir: &Path, repository_id: &str) -> TrainingResult<String> {
        let files = list_files(local_dir)?;
        if files.is_empty() {
            return Err(TrainingError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("nothing to upload in {}", local_dir.display()),
            )));
        }

        let mut failures = Vec::new();
        for (path, path_in_repo) in &files {
            let content = match tokio::fs::read(path).await {
                Ok(content) => content,
                Err(e) => {
                    failures.push(UploadFailure { path_in_repo: path_in_repo.clone(), cause: e.to_string() });
                    continue;
                }
            };

            match self.client.upload_file(repository_id, path_in_repo, content).await {
                Ok(()) => debug!(repo_id = %repository_id, path = %path_in_repo, "Uploaded"),
                Err(e @ TrainingError::Auth(_)) => return Err(e),
                Err(e) => {
                    warn!(repo_id = %repository_id, path = %path_in_repo, error = %e, "Upload failed");
                    failures.push(UploadFailure { path_in_repo: path_in_repo.clone(), cause: e.to_string() });
                }
            }
        }

        if !failures.is_empty() {
            return Err(TrainingError::PartialUpload { repo_id: repository_id.to_string(), failures });
        }

        let info = self.client.repo_info(repository_id).await?;
        info!(
            repo_id = %repository_id,
            revision = %info.sha,
            files = files.len(),
            "Checkpoint uploaded"
        );
        Ok(info.sha)
    }

    /// Upload `local_dir` and return the resulting reference.
    pub async fn publish(&self, local_dir: &Path, repository_id: &str) -> TrainingResult<PublicationReference> {
        let revision = self.upload_directory(local_dir, repository_id).await?;
        Ok(PublicationReference { repository_id: repository_id.to_string(), revision })
    }
}
