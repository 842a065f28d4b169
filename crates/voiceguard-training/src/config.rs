//! Miner configuration.
//!
//! Everything the training loop and the publish cycle need is carried in one
//! [`TrainingConfig`] handed to the coordinator at construction. Sources, later
//! overriding earlier:
//! 1. `voiceguard.toml` (or the path given on the command line)
//! 2. `VOICEGUARD__*` environment variables (e.g. `VOICEGUARD__HUB__REPO_NAME`)
//! 3. the legacy `HF_ACCESS_TOKEN` / `REPO_ID` variables, for fields still unset

use crate::error::{TrainingError, TrainingResult};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "voiceguard.toml";

/// Compute device requested for training, e.g. `cpu`, `cpu:4`, `gpu`, `gpu:0,1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DeviceSpec {
    Cpu { threads: Option<usize> },
    Gpu { indices: Vec<usize> },
}

impl DeviceSpec {
    /// Number of CPU threads to use, capped at the host's parallelism.
    #[must_use]
    pub fn effective_threads(&self) -> usize {
        let available = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
        match self {
            Self::Cpu { threads: Some(n) } => (*n).clamp(1, available),
            _ => available,
        }
    }

    /// GPU ordinal the model is placed on; the first listed index, or 0.
    #[must_use]
    pub fn primary_gpu(&self) -> Option<usize> {
        match self {
            Self::Gpu { indices } => Some(indices.first().copied().unwrap_or(0)),
            Self::Cpu { .. } => None,
        }
    }
}

impl Default for DeviceSpec {
    fn default() -> Self {
        Self::Cpu { threads: None }
    }
}

impl FromStr for DeviceSpec {
    type Err = TrainingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        let (kind, rest) = s.split_once(':').unwrap_or((s.as_str(), ""));

        match kind {
            "cpu" => Ok(Self::Cpu { threads: rest.trim().parse().ok().filter(|n| *n > 0) }),
            "gpu" | "cuda" => {
                let indices = rest
                    .split(|c: char| !c.is_ascii_digit())
                    .filter(|part| !part.is_empty())
                    .filter_map(|part| part.parse().ok())
                    .collect();
                Ok(Self::Gpu { indices })
            }
            _ => Err(TrainingError::InvalidConfig(format!("unknown device: {s}"))),
        }
    }
}

impl TryFrom<String> for DeviceSpec {
    type Error = TrainingError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DeviceSpec> for String {
    fn from(value: DeviceSpec) -> Self {
        value.to_string()
    }
}

impl fmt::Display for DeviceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu { threads: None } => f.write_str("cpu"),
            Self::Cpu { threads: Some(n) } => write!(f, "cpu:{n}"),
            Self::Gpu { indices } if indices.is_empty() => f.write_str("gpu"),
            Self::Gpu { indices } => {
                let list: Vec<String> = indices.iter().map(ToString::to_string).collect();
                write!(f, "gpu:{}", list.join(","))
            }
        }
    }
}

/// `-1` trains forever and publishes on every improvement; a positive count
/// trains that many epochs and only persists locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(try_from = "i64", into = "i64")]
pub enum EpochLimit {
    #[default]
    Continuous,
    Finite(u64),
}

impl TryFrom<i64> for EpochLimit {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(Self::Continuous),
            n if n >= 1 => Ok(Self::Finite(n.unsigned_abs())),
            n => Err(format!("num_epochs must be -1 or >= 1, got {n}")),
        }
    }
}

impl From<EpochLimit> for i64 {
    fn from(value: EpochLimit) -> Self {
        match value {
            EpochLimit::Continuous => -1,
            EpochLimit::Finite(n) => i64::try_from(n).unwrap_or(i64::MAX),
        }
    }
}

/// What happens to repository visibility when a publish cycle fails after
/// the repository was made private.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VisibilityRestore {
    /// Only a fully announced cycle makes the repository public again.
    #[default]
    OnSuccess,
    /// Restore public visibility whatever the outcome of the cycle.
    Always,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct HubSettings {
    #[serde(default = "default_hub_endpoint")]
    pub endpoint: String,
    /// Repository owner; resolved from the token when unset.
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub repo_name: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
}

fn default_hub_endpoint() -> String {
    "https://huggingface.co".to_string()
}

impl Default for HubSettings {
    fn default() -> Self {
        Self { endpoint: default_hub_endpoint(), owner: None, repo_name: None, token: None }
    }
}

impl fmt::Debug for HubSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HubSettings")
            .field("endpoint", &self.endpoint)
            .field("owner", &self.owner)
            .field("repo_name", &self.repo_name)
            .field("token", &self.token.as_ref().map(|_| "***"))
            .finish()
    }
}

impl HubSettings {
    pub fn require_token(&self) -> TrainingResult<&str> {
        self.token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| TrainingError::Auth("hub access token is not set (HF_ACCESS_TOKEN)".to_string()))
    }

    pub fn require_repo_name(&self) -> TrainingResult<&str> {
        self.repo_name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| TrainingError::Auth("target repository name is not set (REPO_ID)".to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSettings {
    #[serde(default = "default_ledger_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub netuid: u16,
    /// Account the metadata is stored under.
    #[serde(default)]
    pub hotkey: Option<String>,
}

fn default_ledger_endpoint() -> String {
    "http://127.0.0.1:9944".to_string()
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self { endpoint: default_ledger_endpoint(), netuid: 0, hotkey: None }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_retry_interval_secs")]
    pub interval_secs: u64,
    /// Unbounded when unset.
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

fn default_retry_interval_secs() -> u64 {
    12
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self { interval_secs: default_retry_interval_secs(), max_attempts: None }
    }
}

impl RetrySettings {
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    #[serde(default)]
    pub device: DeviceSpec,
    #[serde(default)]
    pub num_epochs: EpochLimit,
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    /// Directory holding the canonical checkpoint; uploaded as-is.
    #[serde(default = "default_save_path")]
    pub save_path: PathBuf,
    /// Local bookkeeping that must never be uploaded.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    #[serde(default = "default_base_model_path")]
    pub base_model_path: PathBuf,
    #[serde(default = "default_dataset_dir")]
    pub dataset_dir: PathBuf,
    /// When false every epoch counts as an improvement.
    #[serde(default)]
    pub track_loss: bool,
    #[serde(default)]
    pub hub: HubSettings,
    #[serde(default)]
    pub ledger: LedgerSettings,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub visibility_restore: VisibilityRestore,
}

fn default_batch_size() -> u32 {
    8
}

fn default_save_path() -> PathBuf {
    PathBuf::from("voiceguard/miner/model_checkpoints/XLS")
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("voiceguard/miner/state")
}

fn default_base_model_path() -> PathBuf {
    PathBuf::from("voiceguard/miner/model_checkpoints/base")
}

fn default_dataset_dir() -> PathBuf {
    PathBuf::from("datasets")
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            device: DeviceSpec::default(),
            num_epochs: EpochLimit::default(),
            batch_size: default_batch_size(),
            save_path: default_save_path(),
            state_dir: default_state_dir(),
            base_model_path: default_base_model_path(),
            dataset_dir: default_dataset_dir(),
            track_loss: false,
            hub: HubSettings::default(),
            ledger: LedgerSettings::default(),
            retry: RetrySettings::default(),
            visibility_restore: VisibilityRestore::default(),
        }
    }
}

impl TrainingConfig {
    /// Load from the config file and environment.
    ///
    /// An explicitly given `path` must exist; the default file is optional.
    pub fn load(path: Option<&Path>) -> TrainingResult<Self> {
        let (file, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };

        let mut config: Self = Config::builder()
            .add_source(File::from(file).required(required))
            .add_source(Environment::with_prefix("VOICEGUARD").separator("__").try_parsing(true))
            .build()?
            .try_deserialize()?;

        config.apply_legacy_vars(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Fill hub credentials from `HF_ACCESS_TOKEN` / `REPO_ID` where unset.
    pub fn apply_legacy_vars(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.hub.token.is_none() {
            self.hub.token = lookup("HF_ACCESS_TOKEN");
        }
        if self.hub.repo_name.is_none() {
            self.hub.repo_name = lookup("REPO_ID");
        }
    }

    pub fn validate(&self) -> TrainingResult<()> {
        if self.batch_size == 0 {
            return Err(TrainingError::InvalidConfig("batch_size must be >= 1".to_string()));
        }
        if self.save_path.as_os_str().is_empty() {
            return Err(TrainingError::InvalidConfig("save_path is required".to_string()));
        }
        if self.save_path.starts_with(&self.state_dir) || self.state_dir.starts_with(&self.save_path) {
            return Err(TrainingError::InvalidConfig(
                "state_dir and save_path must not contain one another".to_string(),
            ));
        }
        Ok(())
    }
}
