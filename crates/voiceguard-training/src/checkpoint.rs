//! Local persistence of the canonical checkpoint.
//!
//! A checkpoint directory holds the serialized weights (`current_checkpoint.pt`),
//! and whatever the preprocessor writes (`preprocessor_config.json` for the
//! feature extractor). The manifest recording the loss it was selected on stays
//! in the local state directory, outside what gets uploaded. At most one
//! checkpoint is canonical; saving a new one replaces the directory wholesale.

use crate::artifacts::{describe_files, CheckpointManifest};
use crate::error::{TrainingError, TrainingResult};
use crate::layout::{staging_dir, CheckpointLayout, PREPROCESSOR_CONFIG_FILE, WEIGHTS_FILE};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Model parameters as produced by the training framework.
pub trait ModelState: Send + Sync {
    /// Serialized parameters, written verbatim to `current_checkpoint.pt`.
    fn state_dict(&self) -> TrainingResult<Vec<u8>>;
}

/// Preprocessing configuration shipped next to the weights.
pub trait Preprocessor: Send + Sync {
    fn save_pretrained(&self, dir: &Path) -> TrainingResult<()>;
}

/// Raw serialized weights held in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawWeights(pub Vec<u8>);

impl ModelState for RawWeights {
    fn state_dict(&self) -> TrainingResult<Vec<u8>> {
        Ok(self.0.clone())
    }
}

/// Wav2Vec2-style feature extractor configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureExtractorConfig {
    pub feature_extractor_type: String,
    pub feature_size: u32,
    pub sampling_rate: u32,
    pub padding_value: f32,
    pub padding_side: String,
    pub do_normalize: bool,
    pub return_attention_mask: bool,
}

impl Default for FeatureExtractorConfig {
    fn default() -> Self {
        Self {
            feature_extractor_type: "Wav2Vec2FeatureExtractor".to_string(),
            feature_size: 1,
            sampling_rate: 16_000,
            padding_value: 0.0,
            padding_side: "right".to_string(),
            do_normalize: true,
            return_attention_mask: true,
        }
    }
}

impl FeatureExtractorConfig {
    /// Read `preprocessor_config.json` from `dir`, if present.
    pub fn load(dir: &Path) -> TrainingResult<Option<Self>> {
        let path = dir.join(PREPROCESSOR_CONFIG_FILE);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl Preprocessor for FeatureExtractorConfig {
    fn save_pretrained(&self, dir: &Path) -> TrainingResult<()> {
        std::fs::write(dir.join(PREPROCESSOR_CONFIG_FILE), serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// Selection policy: an improvement is any strictly lower loss, or any loss
/// when nothing has been recorded yet. NaN never improves.
#[must_use]
pub fn current_is_better(new_loss: f64, previous_loss: Option<f64>) -> bool {
    previous_loss.is_none_or(|previous| new_loss < previous)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Checkpoint {
    pub path: PathBuf,
    pub manifest: CheckpointManifest,
}

impl Checkpoint {
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.manifest.created_at
    }

    #[must_use]
    pub fn loss(&self) -> Option<f64> {
        self.manifest.loss
    }
}

/// Owner of the canonical checkpoint directory.
#[derive(Debug)]
pub struct CheckpointStore {
    destination: PathBuf,
    manifest_path: PathBuf,
    current: Option<Checkpoint>,
}

impl CheckpointStore {
    /// Open the store, picking up a checkpoint left by a previous run.
    pub fn open(layout: &CheckpointLayout) -> TrainingResult<Self> {
        let destination = layout.save_path().to_path_buf();
        let manifest_path = layout.manifest_path();
        let current = if manifest_path.is_file() {
            let bytes = std::fs::read(&manifest_path)?;
            match serde_json::from_slice::<CheckpointManifest>(&bytes) {
                Ok(manifest) => Some(Checkpoint { path: destination.clone(), manifest }),
                Err(e) => {
                    warn!(path = %manifest_path.display(), error = %e, "Ignoring unreadable checkpoint manifest");
                    None
                }
            }
        } else {
            None
        };

        Ok(Self { destination, manifest_path, current })
    }

    #[must_use]
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    #[must_use]
    pub fn current(&self) -> Option<&Checkpoint> {
        self.current.as_ref()
    }

    /// Loss of the canonical checkpoint, if one exists and recorded a loss.
    #[must_use]
    pub fn best_loss(&self) -> Option<f64> {
        self.current.as_ref().and_then(Checkpoint::loss)
    }

    /// Serialize `model` and `preprocessor` and make the result canonical,
    /// replacing whatever was at the destination.
    ///
    /// The new checkpoint is assembled in a sibling staging directory first,
    /// so a failed save leaves the previous checkpoint untouched.
    pub fn save(
        &mut self,
        model: &dyn ModelState,
        preprocessor: &dyn Preprocessor,
        loss: Option<f64>,
    ) -> TrainingResult<&Checkpoint> {
        let staging = staging_dir(&self.destination)?;
        if staging.exists() {
            std::fs::remove_dir_all(&staging)?;
        }
        std::fs::create_dir_all(&staging)?;

        let weights = model.state_dict()?;
        std::fs::write(staging.join(WEIGHTS_FILE), &weights)?;
        preprocessor.save_pretrained(&staging)?;

        let manifest = CheckpointManifest {
            created_at: Utc::now(),
            loss,
            files: describe_files(&staging)?,
        };
        if !manifest.files.iter().any(|f| f.path_in_repo == WEIGHTS_FILE) {
            return Err(TrainingError::Trainer("checkpoint is missing its weights file".to_string()));
        }

        if self.destination.exists() {
            std::fs::remove_dir_all(&self.destination)?;
        }
        std::fs::rename(&staging, &self.destination)?;
        self.write_manifest(&manifest)?;

        info!(
            path = %self.destination.display(),
            loss = ?loss,
            weights_bytes = weights.len(),
            "Checkpoint saved"
        );

        Ok(&*self.current.insert(Checkpoint { path: self.destination.clone(), manifest }))
    }

    fn write_manifest(&self, manifest: &CheckpointManifest) -> TrainingResult<()> {
        if let Some(parent) = self.manifest_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.manifest_path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(manifest)?)?;
        std::fs::rename(&tmp, &self.manifest_path)?;
        Ok(())
    }
}
