//! Fetch command implementation.

use anyhow::{bail, Context};
use colored::Colorize;
use std::path::Path;
use voiceguard_corpus::{CorpusFetcher, Extraction, SubsetOutcome, SUBSETS};

/// Execute the fetch command.
///
/// With no subsets named, every LibriSpeech subset is fetched in catalogue order.
pub async fn execute(base_url: &str, dest: &Path, subsets: &[String], progress: bool) -> anyhow::Result<()> {
    for subset in subsets {
        if !SUBSETS.contains(&subset.as_str()) {
            bail!("unknown subset '{}'; expected one of: {}", subset, SUBSETS.join(", "));
        }
    }

    println!("{}", format!("Fetching LibriSpeech into {}", dest.display()).bold().cyan());
    let fetcher = CorpusFetcher::new().with_progress(progress);

    let outcomes = if subsets.is_empty() {
        fetcher.download_all(base_url, dest).await.context("corpus download failed")?
    } else {
        let mut outcomes = Vec::with_capacity(subsets.len());
        for subset in subsets {
            let outcome = fetcher
                .download_subset(subset, base_url, dest)
                .await
                .with_context(|| format!("failed to fetch subset {subset}"))?;
            outcomes.push(outcome);
        }
        outcomes
    };

    for outcome in &outcomes {
        print_outcome(outcome);
    }
    println!("{}", format!("✓ {} subset(s) ready", outcomes.len()).green().bold());
    Ok(())
}

fn print_outcome(outcome: &SubsetOutcome) {
    let status = match &outcome.extraction {
        Extraction::Extracted { .. } => "extracted".green(),
        Extraction::AlreadyExtracted { .. } => "already extracted".dimmed(),
        Extraction::NotAnArchive => "not an archive".yellow(),
    };
    println!("  {} {}", outcome.subset.bold(), status);
}
