//! VoiceGuard Corpus
//!
//! Speech corpus acquisition and loading:
//! - Streaming downloads with progress (`CorpusFetcher`)
//! - Tar archive extraction with an already-extracted check
//! - The LibriSpeech subset catalogue
//! - The on-disk `<language>/<clip>/` audio dataset

pub mod dataset;
pub mod download;
pub mod error;
pub mod extract;
pub mod librispeech;

pub use dataset::{load_audio_dataset, AudioExample};
pub use download::CorpusFetcher;
pub use error::{CorpusError, CorpusResult};
pub use extract::{extract_tarfile, Extraction};
pub use librispeech::{subset_url, SubsetOutcome, DEFAULT_DEST, LIBRISPEECH_BASE_URL, SUBSETS};
