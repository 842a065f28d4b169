//! In-process hub used for `--dry-run` and for exercising the publish cycle.

use super::{HubClient, RepoInfo, Visibility};
use crate::error::{TrainingError, TrainingResult};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct MemoryRepo {
    visibility: Option<Visibility>,
    files: BTreeMap<String, Vec<u8>>,
    sha: String,
}

impl MemoryRepo {
    fn new() -> Self {
        let mut repo = Self { visibility: Some(Visibility::Public), ..Self::default() };
        repo.sha = repo.content_hash();
        repo
    }

    /// Revision derived from the full file set, so equal content yields equal revisions.
    fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        for (path, content) in &self.files {
            hasher.update(path.as_bytes());
            hasher.update([0]);
            hasher.update(Sha256::digest(content));
        }
        hex::encode(hasher.finalize())[..40].to_string()
    }
}

#[derive(Debug, Default)]
struct HubState {
    repos: HashMap<String, MemoryRepo>,
    visibility_log: HashMap<String, Vec<Visibility>>,
    failing_uploads: HashSet<String>,
    fail_visibility_to: Option<Visibility>,
    fail_repo_info: bool,
    reject_credentials: bool,
}

/// Hub that keeps repositories in memory.
#[derive(Debug)]
pub struct MemoryHub {
    owner: String,
    state: Mutex<HubState>,
}

impl MemoryHub {
    #[must_use]
    pub fn new(owner: impl Into<String>) -> Self {
        Self { owner: owner.into(), state: Mutex::new(HubState::default()) }
    }

    fn state(&self) -> MutexGuard<'_, HubState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_credentials(&self) -> TrainingResult<()> {
        if self.state().reject_credentials {
            return Err(TrainingError::Auth("memory hub rejected credentials".to_string()));
        }
        Ok(())
    }

    /// Uploads of `path_in_repo` fail until cleared.
    pub fn fail_upload_of(&self, path_in_repo: impl Into<String>) {
        self.state().failing_uploads.insert(path_in_repo.into());
    }

    pub fn clear_failures(&self) {
        let mut state = self.state();
        state.failing_uploads.clear();
        state.fail_visibility_to = None;
        state.fail_repo_info = false;
        state.reject_credentials = false;
    }

    /// Visibility changes to `target` fail until cleared.
    pub fn fail_visibility_changes_to(&self, target: Visibility) {
        self.state().fail_visibility_to = Some(target);
    }

    pub fn fail_repo_info(&self) {
        self.state().fail_repo_info = true;
    }

    pub fn reject_credentials(&self) {
        self.state().reject_credentials = true;
    }

    #[must_use]
    pub fn repo_exists(&self, repo_id: &str) -> bool {
        self.state().repos.contains_key(repo_id)
    }

    /// Current file set of `repo_id`.
    #[must_use]
    pub fn files(&self, repo_id: &str) -> Option<BTreeMap<String, Vec<u8>>> {
        self.state().repos.get(repo_id).map(|r| r.files.clone())
    }

    #[must_use]
    pub fn visibility(&self, repo_id: &str) -> Option<Visibility> {
        self.state().repos.get(repo_id).and_then(|r| r.visibility)
    }

    /// Every successful visibility change applied to `repo_id`, oldest first.
    #[must_use]
    pub fn visibility_history(&self, repo_id: &str) -> Vec<Visibility> {
        self.state().visibility_log.get(repo_id).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl HubClient for MemoryHub {
    async fn whoami(&self) -> TrainingResult<String> {
        self.check_credentials()?;
        Ok(self.owner.clone())
    }

    async fn create_repo(&self, repo_id: &str, exist_ok: bool) -> TrainingResult<()> {
        self.check_credentials()?;
        let mut state = self.state();
        if state.repos.contains_key(repo_id) {
            if exist_ok {
                return Ok(());
            }
            return Err(TrainingError::Remote(format!("repository already exists: {repo_id}")));
        }
        state.repos.insert(repo_id.to_string(), MemoryRepo::new());
        Ok(())
    }

    async fn update_repo_visibility(&self, repo_id: &str, visibility: Visibility) -> TrainingResult<()> {
        self.check_credentials()?;
        let mut state = self.state();
        if state.fail_visibility_to == Some(visibility) {
            return Err(TrainingError::Remote(format!("visibility change to {visibility} failed")));
        }
        let repo = state
            .repos
            .get_mut(repo_id)
            .ok_or_else(|| TrainingError::Remote(format!("repository not found: {repo_id}")))?;
        repo.visibility = Some(visibility);
        state.visibility_log.entry(repo_id.to_string()).or_default().push(visibility);
        Ok(())
    }

    async fn upload_file(&self, repo_id: &str, path_in_repo: &str, content: Vec<u8>) -> TrainingResult<()> {
        self.check_credentials()?;
        let mut state = self.state();
        if state.failing_uploads.contains(path_in_repo) {
            return Err(TrainingError::Remote(format!("upload of {path_in_repo} failed")));
        }
        let repo = state
            .repos
            .get_mut(repo_id)
            .ok_or_else(|| TrainingError::Remote(format!("repository not found: {repo_id}")))?;
        repo.files.insert(path_in_repo.to_string(), content);
        repo.sha = repo.content_hash();
        Ok(())
    }

    async fn repo_info(&self, repo_id: &str) -> TrainingResult<RepoInfo> {
        self.check_credentials()?;
        let state = self.state();
        if state.fail_repo_info {
            return Err(TrainingError::Remote("repo info unavailable".to_string()));
        }
        let repo = state
            .repos
            .get(repo_id)
            .ok_or_else(|| TrainingError::Remote(format!("repository not found: {repo_id}")))?;
        Ok(RepoInfo {
            id: repo_id.to_string(),
            sha: repo.sha.clone(),
            private: repo.visibility.is_some_and(Visibility::is_private),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_revision_tracks_content() {
        let hub = MemoryHub::new("alice");
        hub.create_repo("alice/m", true).await.unwrap();
        let empty = hub.repo_info("alice/m").await.unwrap().sha;

        hub.upload_file("alice/m", "a.bin", vec![1, 2, 3]).await.unwrap();
        let first = hub.repo_info("alice/m").await.unwrap().sha;
        assert_ne!(empty, first);
        assert_eq!(first.len(), 40);

        hub.upload_file("alice/m", "a.bin", vec![1, 2, 3]).await.unwrap();
        assert_eq!(hub.repo_info("alice/m").await.unwrap().sha, first);
    }

    #[tokio::test]
    async fn test_create_repo_exist_ok() {
        let hub = MemoryHub::new("alice");
        hub.create_repo("alice/m", false).await.unwrap();
        hub.create_repo("alice/m", true).await.unwrap();
        assert!(hub.create_repo("alice/m", false).await.is_err());
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let hub = MemoryHub::new("alice");
        hub.create_repo("alice/m", true).await.unwrap();

        hub.fail_visibility_changes_to(Visibility::Public);
        hub.update_repo_visibility("alice/m", Visibility::Private).await.unwrap();
        assert!(hub.update_repo_visibility("alice/m", Visibility::Public).await.is_err());
        assert_eq!(hub.visibility("alice/m"), Some(Visibility::Private));
        assert_eq!(hub.visibility_history("alice/m"), vec![Visibility::Private]);

        hub.reject_credentials();
        assert!(matches!(hub.whoami().await, Err(TrainingError::Auth(_))));
        hub.clear_failures();
        assert_eq!(hub.whoami().await.unwrap(), "alice");
    }
}
