use crate::checkpoint::{FeatureExtractorConfig, ModelState, Preprocessor, RawWeights};
use crate::config::TrainingConfig;
use crate::error::{TrainingError, TrainingResult};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use voiceguard_corpus::{load_audio_dataset, AudioExample};

pub const PRETRAINED_MODEL_ID: &str = "facebook/wav2vec2-xls-r-300m";
pub const BASE_WEIGHTS_FILE: &str = "pytorch_model.bin";
pub const BASE_CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochReport {
    pub epoch: u64,
    /// Mean loss over the epoch; `None` when the trainer does not track it.
    pub loss: Option<f64>,
    pub batches: u64,
}

/// Training backend driven by the coordinator, one epoch at a time.
#[async_trait]
pub trait Trainer: Send + Sync {
    fn id(&self) -> &'static str;

    async fn prepare(&self) -> TrainingResult<()>;

    async fn train_epoch(&self, epoch: u64) -> TrainingResult<EpochReport>;

    fn model_state(&self) -> &dyn ModelState;

    fn preprocessor(&self) -> &dyn Preprocessor;
}

/// Where the starting weights come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BaseModelSource {
    /// A local checkpoint directory with `pytorch_model.bin` and `config.json`.
    Local(PathBuf),
    /// Nothing local; the named pretrained model has to be fetched.
    Pretrained(String),
}

#[must_use]
pub fn locate_base_model(path: &Path) -> BaseModelSource {
    if path.join(BASE_WEIGHTS_FILE).is_file() && path.join(BASE_CONFIG_FILE).is_file() {
        BaseModelSource::Local(path.to_path_buf())
    } else {
        BaseModelSource::Pretrained(PRETRAINED_MODEL_ID.to_string())
    }
}

/// Trainer that carries the base weights forward unchanged.
///
/// The forward/backward pass is not wired up yet: every epoch walks the
/// dataset's batches and reports no loss, so with loss tracking off each epoch
/// counts as an improvement and is published.
pub struct BaselineTrainer {
    weights: RawWeights,
    preprocessor: FeatureExtractorConfig,
    examples: Vec<AudioExample>,
    batch_size: u32,
}

impl BaselineTrainer {
    pub fn load(config: &TrainingConfig) -> TrainingResult<Self> {
        let base = match locate_base_model(&config.base_model_path) {
            BaseModelSource::Local(dir) => dir,
            BaseModelSource::Pretrained(model_id) => {
                return Err(TrainingError::Trainer(format!(
                    "no local base model in {}; place {model_id} ({BASE_WEIGHTS_FILE}, {BASE_CONFIG_FILE}) there first",
                    config.base_model_path.display()
                )));
            }
        };

        let weights = RawWeights(std::fs::read(base.join(BASE_WEIGHTS_FILE))?);
        let preprocessor = FeatureExtractorConfig::load(&base)?.unwrap_or_default();
        info!(path = %base.display(), bytes = weights.0.len(), "Loaded model and processor from checkpoint");

        let examples = load_audio_dataset(&config.dataset_dir)?;
        Ok(Self::new(weights, preprocessor, examples, config.batch_size))
    }

    #[must_use]
    pub fn new(
        weights: RawWeights,
        preprocessor: FeatureExtractorConfig,
        examples: Vec<AudioExample>,
        batch_size: u32,
    ) -> Self {
        Self { weights, preprocessor, examples, batch_size: batch_size.max(1) }
    }

    #[must_use]
    pub fn examples(&self) -> &[AudioExample] {
        &self.examples
    }

    fn batches_per_epoch(&self) -> u64 {
        (self.examples.len() as u64).div_ceil(u64::from(self.batch_size))
    }
}

#[async_trait]
impl Trainer for BaselineTrainer {
    fn id(&self) -> &'static str {
        "baseline"
    }

    async fn prepare(&self) -> TrainingResult<()> {
        if self.examples.is_empty() {
            return Err(TrainingError::Trainer(
                "the dataset is empty; check data loading and processing".to_string(),
            ));
        }
        info!(
            examples = self.examples.len(),
            batch_size = self.batch_size,
            batches = self.batches_per_epoch(),
            "Dataset ready"
        );
        Ok(())
    }

    async fn train_epoch(&self, epoch: u64) -> TrainingResult<EpochReport> {
        let batches = self.batches_per_epoch();
        debug!(epoch, batches, "Epoch pass complete");
        Ok(EpochReport { epoch, loss: None, batches })
    }

    fn model_state(&self) -> &dyn ModelState {
        &self.weights
    }

    fn preprocessor(&self) -> &dyn Preprocessor {
        &self.preprocessor
    }
}
