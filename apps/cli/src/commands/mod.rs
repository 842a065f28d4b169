//! Command implementations for the VoiceGuard CLI.

pub mod fetch;
pub mod recover;
pub mod train;

use anyhow::Context;
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use voiceguard_training::{HttpHubClient, HubClient, LedgerClient, MemoryHub, MemoryLedger, RpcLedgerClient, TrainingConfig};

const DRY_RUN_OWNER: &str = "dry-run";

pub(crate) fn load_config(path: Option<&Path>) -> anyhow::Result<TrainingConfig> {
    TrainingConfig::load(path).context("failed to load configuration")
}

/// Hub and ledger clients for `config`, or in-memory stand-ins for a dry run.
pub(crate) fn backends(config: &TrainingConfig, dry_run: bool) -> (Arc<dyn HubClient>, Arc<dyn LedgerClient>) {
    if dry_run {
        let owner = config.hub.owner.clone().unwrap_or_else(|| DRY_RUN_OWNER.to_string());
        info!(owner = %owner, "Dry run: hub and ledger are kept in memory");
        return (Arc::new(MemoryHub::new(owner)), Arc::new(MemoryLedger::new()));
    }

    (Arc::new(HttpHubClient::new(&config.hub)), Arc::new(RpcLedgerClient::new(&config.ledger)))
}
