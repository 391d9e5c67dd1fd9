use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{self, StreamExt};
use reqwest::Client;
use sha1::{Digest, Sha1};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::progress::{CancelToken, ProgressSender, TransferStats};
use crate::core::storage::{sha1_of_file, temp_sibling};

/// A single file to download with optional SHA-1 for validation.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadEntry {
    pub url: String,
    pub dest: PathBuf,
    pub sha1: Option<String>,
    pub size: Option<u64>,
}

impl DownloadEntry {
    pub fn new(url: &str, dest: PathBuf, sha1: Option<&str>) -> Self {
        Self {
            url: url.to_string(),
            dest,
            sha1: sha1.map(str::to_string),
            size: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    Downloaded,
    /// Already on disk with the expected content.
    Verified,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1`, doubling each time, capped at 30s.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay
            .saturating_mul(factor)
            .min(Duration::from_secs(30))
    }
}

/// Outcome of a batch: counts plus every entry that still failed.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub downloaded: usize,
    pub verified: usize,
    pub failed: Vec<(DownloadEntry, LauncherError)>,
}

/// Bounded, SHA-1 validating download pool.
#[derive(Clone)]
pub struct Downloader {
    client: Client,
    /// Maximum number of parallel downloads.
    concurrency: usize,
    retry: RetryPolicy,
    progress: ProgressSender,
    cancel: CancelToken,
    stats: Arc<TransferStats>,
}

impl Downloader {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            concurrency: 6,
            retry: RetryPolicy::default(),
            progress: ProgressSender::default(),
            cancel: CancelToken::new(),
            stats: Arc::new(TransferStats::default()),
        }
    }

    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_progress(mut self, progress: ProgressSender) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn progress(&self) -> &ProgressSender {
        &self.progress
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn stats(&self) -> &TransferStats {
        &self.stats
    }

    // ── Single file download ────────────────────────────

    /// One attempt: fetch `url`, validate, then rename into `dest`.
    ///
    /// The body is written under a temporary sibling name first, so `dest`
    /// only ever holds complete, verified content.
    pub async fn download_file(
        &self,
        url: &str,
        dest: &Path,
        sha1_expected: Option<&str>,
    ) -> LauncherResult<u64> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| LauncherError::io(parent, e))?;
        }

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(LauncherError::DownloadFailed {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let bytes = response.bytes().await?;

        // Validate SHA-1 on the in-memory buffer before anything touches disk.
        if let Some(expected) = sha1_expected {
            let actual = hex::encode(Sha1::digest(&bytes));
            if !actual.eq_ignore_ascii_case(expected) {
                return Err(LauncherError::Integrity {
                    path: dest.to_path_buf(),
                    expected: expected.to_string(),
                    actual,
                });
            }
        }

        let tmp = temp_sibling(dest);
        let written = async {
            // Scoped so the handle is closed before the rename.
            {
                let mut file = tokio::fs::File::create(&tmp)
                    .await
                    .map_err(|e| LauncherError::io(&tmp, e))?;
                file.write_all(&bytes)
                    .await
                    .map_err(|e| LauncherError::io(&tmp, e))?;
                file.flush().await.map_err(|e| LauncherError::io(&tmp, e))?;
            }
            tokio::fs::rename(&tmp, dest)
                .await
                .map_err(|e| LauncherError::io(dest, e))
        }
        .await;
        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e);
        }

        self.stats.record(bytes.len() as u64);
        debug!("Downloaded: {} -> {:?}", url, dest);
        Ok(bytes.len() as u64)
    }

    /// Download with retries and exponential backoff on transient failures.
    pub async fn download_with_retry(&self, entry: &DownloadEntry) -> LauncherResult<()> {
        let mut attempt = 1;
        loop {
            match self
                .download_file(&entry.url, &entry.dest, entry.sha1.as_deref())
                .await
            {
                Ok(_) => return Ok(()),
                Err(e) if e.is_transient() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.backoff(attempt);
                    warn!(
                        "Attempt {}/{} for {} failed: {} (retrying in {:?})",
                        attempt, self.retry.max_attempts, entry.url, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e @ LauncherError::Integrity { .. }) => return Err(e),
                Err(e) if e.is_transient() => {
                    return Err(LauncherError::DownloadExhausted {
                        url: entry.url.clone(),
                        attempts: attempt,
                        reason: e.to_string(),
                    })
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Skip the transfer when `dest` already holds the expected content.
    ///
    /// Entries without a hash are trusted when present (and of the declared
    /// size, if one is given).
    pub async fn ensure_file(&self, entry: &DownloadEntry) -> LauncherResult<FileOutcome> {
        if is_valid(entry).await? {
            return Ok(FileOutcome::Verified);
        }
        self.download_with_retry(entry).await?;
        Ok(FileOutcome::Downloaded)
    }

    // ── Batch concurrent downloads ──────────────────────

    /// Run every entry through `ensure_file` on a pool of `concurrency`
    /// workers. Cancellation is checked before each queued entry starts;
    /// entries already in flight run to completion.
    pub async fn download_batch(&self, label: &str, entries: Vec<DownloadEntry>) -> BatchReport {
        let total = entries.len();
        info!(
            "Starting batch '{}': {} files, concurrency={}",
            label, total, self.concurrency
        );

        let mut results = stream::iter(entries)
            .map(|entry| async move {
                if self.cancel.is_cancelled() {
                    return (entry, Err(LauncherError::Cancelled));
                }
                let result = self.ensure_file(&entry).await;
                (entry, result)
            })
            .buffer_unordered(self.concurrency);

        let mut report = BatchReport::default();
        let mut done = 0usize;
        while let Some((entry, result)) = results.next().await {
            done += 1;
            match result {
                Ok(FileOutcome::Downloaded) => report.downloaded += 1,
                Ok(FileOutcome::Verified) => report.verified += 1,
                Err(e) => {
                    warn!("Failed {}: {}", entry.url, e);
                    report.failed.push((entry, e));
                }
            }
            self.progress.report(
                format!("{}: {}/{}", label, done, total),
                Some(done as f32 / total.max(1) as f32),
            );
        }

        info!(
            "Batch '{}' finished: {} downloaded, {} already valid, {} failed",
            label,
            report.downloaded,
            report.verified,
            report.failed.len()
        );
        report
    }

    /// Validate an existing file's SHA-1.
    pub async fn validate_sha1(path: &Path, expected: &str) -> LauncherResult<bool> {
        Ok(sha1_of_file(path)
            .await?
            .is_some_and(|actual| actual.eq_ignore_ascii_case(expected)))
    }
}

async fn is_valid(entry: &DownloadEntry) -> LauncherResult<bool> {
    match &entry.sha1 {
        Some(expected) => Downloader::validate_sha1(&entry.dest, expected).await,
        None => match tokio::fs::metadata(&entry.dest).await {
            Ok(meta) => Ok(meta.is_file() && entry.size.map_or(true, |s| s == meta.len())),
            Err(_) => Ok(false),
        },
    }
}
