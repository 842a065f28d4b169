use crate::error::{TrainingError, TrainingResult};
use std::path::{Path, PathBuf};

pub const WEIGHTS_FILE: &str = "current_checkpoint.pt";
pub const MANIFEST_FILE: &str = "checkpoint_manifest.json";
pub const PREPROCESSOR_CONFIG_FILE: &str = "preprocessor_config.json";
pub const PENDING_PUBLISH_FILE: &str = "pending_publish.json";

/// Filesystem layout of the miner's local state.
///
/// `save_path` is the canonical checkpoint directory and is uploaded verbatim,
/// so bookkeeping lives under `state_dir` instead.
#[derive(Debug, Clone)]
pub struct CheckpointLayout {
    save_path: PathBuf,
    state_dir: PathBuf,
}

impl CheckpointLayout {
    #[must_use]
    pub fn new(save_path: PathBuf, state_dir: PathBuf) -> Self {
        Self { save_path, state_dir }
    }

    #[must_use]
    pub fn save_path(&self) -> &Path {
        &self.save_path
    }

    #[must_use]
    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    /// Selection record for the canonical checkpoint. Kept out of `save_path`
    /// so it is never published.
    #[must_use]
    pub fn manifest_path(&self) -> PathBuf {
        self.state_dir.join(MANIFEST_FILE)
    }

    /// Marker present while a repository has been made private but not yet
    /// restored to public.
    #[must_use]
    pub fn pending_publish_path(&self) -> PathBuf {
        self.state_dir.join(PENDING_PUBLISH_FILE)
    }

    pub fn ensure_dirs(&self) -> TrainingResult<()> {
        std::fs::create_dir_all(&self.state_dir)?;
        if let Some(parent) = self.save_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

/// Sibling directory a new checkpoint is written into before it replaces `destination`.
pub fn staging_dir(destination: &Path) -> TrainingResult<PathBuf> {
    let name = destination
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            TrainingError::InvalidConfig(format!(
                "checkpoint destination has no directory name: {}",
                destination.display()
            ))
        })?;
    Ok(destination.with_file_name(format!(".{name}.staging")))
}
