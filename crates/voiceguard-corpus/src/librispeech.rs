//! The LibriSpeech subset catalogue.

use crate::download::CorpusFetcher;
use crate::error::CorpusResult;
use crate::extract::{extract_tarfile, Extraction};
use std::path::{Path, PathBuf};
use tracing::info;

pub const LIBRISPEECH_BASE_URL: &str = "http://www.openslr.org/resources/12/";
pub const DEFAULT_DEST: &str = "librispeech_dataset";

pub const SUBSETS: [&str; 7] = [
    "train-clean-100",
    "train-clean-360",
    "train-other-500",
    "dev-clean",
    "dev-other",
    "test-clean",
    "test-other",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubsetOutcome {
    pub subset: String,
    pub archive: PathBuf,
    pub extraction: Extraction,
}

/// `base_url` joined with `<subset>.tar.gz`; a missing trailing slash is added.
#[must_use]
pub fn subset_url(base_url: &str, subset: &str) -> String {
    if base_url.ends_with('/') {
        format!("{base_url}{subset}.tar.gz")
    } else {
        format!("{base_url}/{subset}.tar.gz")
    }
}

impl CorpusFetcher {
    /// Download and unpack one subset into `dest`.
    pub async fn download_subset(&self, subset: &str, base_url: &str, dest: &Path) -> CorpusResult<SubsetOutcome> {
        let archive = self.download_file(&subset_url(base_url, subset), dest).await?;

        let (to_extract, into) = (archive.clone(), dest.to_path_buf());
        let extraction = tokio::task::spawn_blocking(move || extract_tarfile(&to_extract, &into))
            .await
            .map_err(std::io::Error::other)??;

        info!(subset, "Downloaded and extracted subset");
        Ok(SubsetOutcome { subset: subset.to_string(), archive, extraction })
    }

    /// Every subset in [`SUBSETS`], in order. Stops at the first failure.
    pub async fn download_all(&self, base_url: &str, dest: &Path) -> CorpusResult<Vec<SubsetOutcome>> {
        let mut outcomes = Vec::with_capacity(SUBSETS.len());
        for subset in SUBSETS {
            outcomes.push(self.download_subset(subset, base_url, dest).await?);
        }
        Ok(outcomes)
    }
}
