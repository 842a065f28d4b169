//! VoiceGuard Training
//!
//! Miner-side training loop and publication pipeline:
//! - Persisting the best checkpoint (`CheckpointStore`)
//! - Publishing checkpoint directories to a model hub (`ArtifactPublisher`)
//! - Announcing published revisions on the ledger (`LedgerAnnouncer`)
//! - Driving epochs and publish cycles (`TrainingCoordinator`)

pub mod artifacts;
pub mod checkpoint;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod hub;
pub mod layout;
pub mod ledger;
pub mod progress;
pub mod publisher;
pub mod trainer;

pub use artifacts::{ArtifactFile, CheckpointManifest};
pub use checkpoint::{current_is_better, Checkpoint, CheckpointStore, FeatureExtractorConfig, ModelState, Preprocessor, RawWeights};
pub use config::{DeviceSpec, EpochLimit, HubSettings, LedgerSettings, RetrySettings, TrainingConfig, VisibilityRestore};
pub use coordinator::{recover_visibility, CycleFailure, PublishStep, RunSummary, TrainingCoordinator};
pub use error::{TrainingError, TrainingResult, UploadFailure};
pub use hub::{HttpHubClient, HubClient, MemoryHub, RepoInfo, Visibility};
pub use layout::CheckpointLayout;
pub use ledger::{AnnounceError, AnnounceReceipt, LedgerAnnouncer, LedgerClient, LedgerMessage, LedgerSubmitError, MemoryLedger, RetryPolicy, RpcLedgerClient};
pub use progress::{ProgressEvent, ProgressSink, StdoutProgressSink};
pub use publisher::{ArtifactPublisher, PublicationReference};
pub use trainer::{locate_base_model, BaseModelSource, BaselineTrainer, EpochReport, Trainer};
