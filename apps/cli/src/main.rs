//! VoiceGuard CLI
//!
//! The `voiceguard` command fetches the speech corpus, runs the miner's
//! training loop and repairs repositories left private by a failed publish.

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};
use voiceguard_corpus::{DEFAULT_DEST, LIBRISPEECH_BASE_URL};

#[derive(Parser, Debug)]
#[command(
    name = "voiceguard",
    author,
    version,
    about = "VoiceGuard miner - corpus fetching, training and model publication"
)]
struct Args {
    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Configuration file (defaults to ./voiceguard.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download and extract LibriSpeech subsets
    ///
    /// Archives already on disk are not downloaded again, and subsets whose
    /// folder already exists are not extracted again.
    Fetch {
        /// Mirror to download from
        #[arg(long, default_value = LIBRISPEECH_BASE_URL)]
        base_url: String,

        /// Destination folder
        #[arg(long, default_value = DEFAULT_DEST)]
        dest: PathBuf,

        /// Subset to fetch; repeat for several (defaults to all seven)
        #[arg(long = "subset")]
        subsets: Vec<String>,

        /// Hide download progress bars
        #[arg(long)]
        no_progress: bool,
    },

    /// Train, then publish and announce every improved checkpoint
    ///
    /// Runs until interrupted with Ctrl-C when the epoch limit is -1.
    Train {
        /// Epoch limit; -1 trains continuously and publishes
        #[arg(long, allow_hyphen_values = true)]
        epochs: Option<i64>,

        /// Device: cpu, cpu:N, gpu or gpu:0,1
        #[arg(long)]
        device: Option<String>,

        /// Keep the hub and ledger in memory instead of contacting them
        #[arg(long)]
        dry_run: bool,

        /// Restore a repository left private by an earlier run before training
        #[arg(long)]
        recover: bool,
    },

    /// Make public a repository left private by an interrupted publish
    Recover,
}

fn init_tracing(log_level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(log_level))?;
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init()?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_tracing(&args.log_level)?;

    let config = args.config.as_deref();
    match args.command {
        Command::Fetch { base_url, dest, subsets, no_progress } => {
            commands::fetch::execute(&base_url, &dest, &subsets, !no_progress).await
        }
        Command::Train { epochs, device, dry_run, recover } => {
            let overrides = commands::train::TrainOverrides { epochs, device };
            commands::train::execute(config, overrides, dry_run, recover).await
        }
        Command::Recover => commands::recover::execute(config).await,
    }
}
