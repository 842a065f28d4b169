//! Streaming HTTP downloads with a byte progress bar.

use crate::error::{CorpusError, CorpusResult};
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

const BAR_TEMPLATE: &str = "{msg} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})";

/// Downloads corpus archives into a local folder.
#[derive(Debug, Clone)]
pub struct CorpusFetcher {
    client: Client,
    show_progress: bool,
}

impl Default for CorpusFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl CorpusFetcher {
    #[must_use]
    pub fn new() -> Self {
        Self { client: Client::new(), show_progress: true }
    }

    #[must_use]
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Fetch `url` into `dest_folder`, named after the last URL segment.
    ///
    /// An existing file of that name is taken as already downloaded. The body
    /// is streamed into `<name>.part` and renamed once complete.
    pub async fn download_file(&self, url: &str, dest_folder: &Path) -> CorpusResult<PathBuf> {
        let file_name = file_name_from_url(url)?;
        tokio::fs::create_dir_all(dest_folder).await?;

        let target = dest_folder.join(file_name);
        if tokio::fs::try_exists(&target).await? {
            info!(file = %file_name, "File already exists, skipping download");
            return Ok(target);
        }

        let http_error = |source: reqwest::Error| CorpusError::Http { url: url.to_string(), source };
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(http_error)?;
        let total = response
            .content_length()
            .ok_or_else(|| CorpusError::MissingContentLength(url.to_string()))?;

        let partial = dest_folder.join(format!("{file_name}.part"));
        let mut file = tokio::fs::File::create(&partial).await?;
        let bar = self.progress_bar(total, file_name);

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(http_error)?;
            file.write_all(&chunk).await?;
            bar.inc(chunk.len() as u64);
        }
        file.flush().await?;
        drop(file);
        bar.finish();

        tokio::fs::rename(&partial, &target).await?;
        debug!(path = %target.display(), bytes = total, "Download complete");
        Ok(target)
    }

    fn progress_bar(&self, total: u64, name: &str) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(total);
        bar.set_style(
            ProgressStyle::with_template(BAR_TEMPLATE)
                .map(|style| style.progress_chars("#>-"))
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar.set_message(name.to_string());
        bar
    }
}

fn file_name_from_url(url: &str) -> CorpusResult<&str> {
    url.split(['?', '#'])
        .next()
        .and_then(|path| path.rsplit('/').next())
        .filter(|name| !name.is_empty())
        .ok_or_else(|| CorpusError::InvalidUrl(url.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fetcher() -> CorpusFetcher {
        CorpusFetcher::new().with_progress(false)
    }

    #[test]
    fn test_file_name_from_url() {
        assert_eq!(file_name_from_url("http://host/resources/12/dev-clean.tar.gz").unwrap(), "dev-clean.tar.gz");
        assert_eq!(file_name_from_url("http://host/a.tar?token=1").unwrap(), "a.tar");
        assert!(matches!(file_name_from_url("http://host/dir/"), Err(CorpusError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn test_download_writes_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/files/sample.bin")
            .with_status(200)
            .with_body(vec![5u8; 4096])
            .create_async()
            .await;

        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("nested/dest");
        let path = fetcher()
            .download_file(&format!("{}/files/sample.bin", server.url()), &dest)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(path, dest.join("sample.bin"));
        assert_eq!(std::fs::read(&path).unwrap(), vec![5u8; 4096]);
        assert!(!dest.join("sample.bin.part").exists());
    }

    #[tokio::test]
    async fn test_existing_file_is_not_downloaded_again() {
        let mut server = mockito::Server::new_async().await;
        let mock = server.mock("GET", "/sample.bin").expect(0).create_async().await;

        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("sample.bin"), b"cached").unwrap();

        let path = fetcher()
            .download_file(&format!("{}/sample.bin", server.url()), temp.path())
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(std::fs::read(path).unwrap(), b"cached");
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let mut server = mockito::Server::new_async().await;
        server.mock("GET", "/missing.tar.gz").with_status(404).create_async().await;

        let temp = TempDir::new().unwrap();
        let result = fetcher()
            .download_file(&format!("{}/missing.tar.gz", server.url()), temp.path())
            .await;

        assert!(matches!(result, Err(CorpusError::Http { .. })));
        assert!(!temp.path().join("missing.tar.gz").exists());
    }

    #[tokio::test]
    async fn test_missing_content_length() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/stream.bin")
            .with_status(200)
            .with_chunked_body(|w| {
                use std::io::Write;
                w.write_all(b"chunked")
            })
            .create_async()
            .await;

        let temp = TempDir::new().unwrap();
        let result = fetcher()
            .download_file(&format!("{}/stream.bin", server.url()), temp.path())
            .await;

        assert!(matches!(result, Err(CorpusError::MissingContentLength(_))));
    }
}
