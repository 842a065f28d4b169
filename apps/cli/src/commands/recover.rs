//! Recover command implementation.

use super::{backends, load_config};
use anyhow::Context;
use colored::Colorize;
use std::path::Path;
use voiceguard_training::{recover_visibility, ArtifactPublisher, CheckpointLayout};

/// Execute the recover command.
pub async fn execute(config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let layout = CheckpointLayout::new(config.save_path.clone(), config.state_dir.clone());
    let (hub, _) = backends(&config, false);

    match recover_visibility(&layout, &ArtifactPublisher::new(hub))
        .await
        .context("failed to restore repository visibility")?
    {
        Some(repo_id) => println!("{}", format!("✓ {repo_id} is public again").green().bold()),
        None => println!("{}", "Nothing to recover".dimmed()),
    }
    Ok(())
}
