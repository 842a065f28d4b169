//! Model hub access.
//!
//! [`HubClient`] is the seam between the publisher and a concrete hub:
//! [`HttpHubClient`] talks to a Hugging-Face-compatible HTTP API,
//! [`MemoryHub`] keeps repositories in process for dry runs and tests.

pub mod http;
pub mod memory;

use crate::error::TrainingResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use http::HttpHubClient;
pub use memory::MemoryHub;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Private,
    Public,
}

impl Visibility {
    #[must_use]
    pub fn is_private(self) -> bool {
        self == Self::Private
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Private => f.write_str("private"),
            Self::Public => f.write_str("public"),
        }
    }
}

/// Repository metadata as reported by the hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoInfo {
    pub id: String,
    /// Content revision of the repository head.
    pub sha: String,
    #[serde(default)]
    pub private: bool,
}

#[async_trait]
pub trait HubClient: Send + Sync {
    /// Account name the credentials belong to.
    async fn whoami(&self) -> TrainingResult<String>;

    /// Create `repo_id` (`owner/name`); an existing repository is accepted when `exist_ok`.
    async fn create_repo(&self, repo_id: &str, exist_ok: bool) -> TrainingResult<()>;

    async fn update_repo_visibility(&self, repo_id: &str, visibility: Visibility) -> TrainingResult<()>;

    async fn upload_file(&self, repo_id: &str, path_in_repo: &str, content: Vec<u8>) -> TrainingResult<()>;

    async fn repo_info(&self, repo_id: &str) -> TrainingResult<RepoInfo>;
}
