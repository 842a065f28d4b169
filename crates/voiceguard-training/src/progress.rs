use crate::coordinator::PublishStep;
use crate::publisher::PublicationReference;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    Started { trainer: String, device: String },
    EpochFinished { epoch: u64, loss: Option<f64>, improved: bool },
    CheckpointSaved { epoch: u64, path: PathBuf },
    Published { epoch: u64, reference: PublicationReference },
    Announced { epoch: u64, reference: PublicationReference, attempts: u32 },
    CycleAborted { epoch: u64, step: PublishStep, error: String },
    Stopped { epochs: u64 },
}

pub trait ProgressSink: Send + Sync {
    fn on_event(&self, event: ProgressEvent);
}

#[derive(Debug, Default)]
pub struct StdoutProgressSink;

impl ProgressSink for StdoutProgressSink {
    fn on_event(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Started { trainer, device } => println!("[train:{trainer}] started on {device}"),
            ProgressEvent::EpochFinished { epoch, loss, improved } => match loss {
                Some(loss) => println!("[train] epoch {epoch} loss {loss:.4}{}", if improved { " (best)" } else { "" }),
                None => println!("[train] epoch {epoch} finished"),
            },
            ProgressEvent::CheckpointSaved { epoch, path } => {
                println!("[train] epoch {epoch} checkpoint saved to {}", path.display());
            }
            ProgressEvent::Published { reference, .. } => println!("[publish] uploaded {reference}"),
            ProgressEvent::Announced { reference, attempts, .. } => {
                println!("[publish] announced {reference} on the ledger after {attempts} attempt(s)");
            }
            ProgressEvent::CycleAborted { epoch, step, error } => {
                println!("[publish] epoch {epoch} publish aborted at {step}: {error}");
            }
            ProgressEvent::Stopped { epochs } => println!("[train] stopped after {epochs} epoch(s)"),
        }
    }
}
