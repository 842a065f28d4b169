//! Train command implementation.

use super::{backends, load_config};
use anyhow::Context;
use colored::Colorize;
use std::path::Path;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use voiceguard_training::{
    BaselineTrainer, DeviceSpec, EpochLimit, RunSummary, StdoutProgressSink, TrainingConfig, TrainingCoordinator,
};

/// Command-line values that take precedence over the loaded configuration.
#[derive(Debug, Default)]
pub struct TrainOverrides {
    pub epochs: Option<i64>,
    pub device: Option<String>,
}

impl TrainOverrides {
    fn apply(self, config: &mut TrainingConfig) -> anyhow::Result<()> {
        if let Some(epochs) = self.epochs {
            config.num_epochs = EpochLimit::try_from(epochs).map_err(anyhow::Error::msg)?;
        }
        if let Some(device) = self.device {
            config.device = device.parse::<DeviceSpec>()?;
        }
        config.validate()?;
        Ok(())
    }
}

/// Execute the train command.
pub async fn execute(
    config_path: Option<&Path>,
    overrides: TrainOverrides,
    dry_run: bool,
    recover: bool,
) -> anyhow::Result<()> {
    let mut config = load_config(config_path)?;
    overrides.apply(&mut config)?;

    let trainer = Arc::new(BaselineTrainer::load(&config).context("failed to load base model and dataset")?);
    let (hub, ledger) = backends(&config, dry_run);
    let mut coordinator = TrainingCoordinator::new(config, trainer, hub, ledger, Arc::new(StdoutProgressSink))?;

    if recover {
        if dry_run {
            warn!("Skipping visibility recovery in a dry run");
        } else if let Some(repo_id) = coordinator.recover_visibility().await.context("visibility recovery failed")? {
            println!("{}", format!("✓ {repo_id} is public again").green());
        }
    }

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if let Ok(()) = signal::ctrl_c().await {
            trigger.cancel();
        }
    });

    let summary = coordinator.run(&cancel).await.context("training failed")?;
    print_summary(&summary);
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!();
    println!("{}", "Training summary".bold().cyan());
    println!("  epochs:      {}", summary.epochs);
    println!("  checkpoints: {}", summary.checkpoints_saved);
    println!("  published:   {}", summary.published.len());
    for reference in &summary.published {
        println!("    {}", reference.to_string().dimmed());
    }
    if summary.aborted_cycles > 0 {
        println!("  {}", format!("aborted:     {}", summary.aborted_cycles).yellow());
    }
    if summary.cancelled {
        println!("  {}", "stopped by interrupt".dimmed());
    }
}
