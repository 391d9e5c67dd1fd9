use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::downloader::RetryPolicy;
use crate::core::error::LauncherResult;
use crate::core::storage::write_json_atomic;

pub const DEFAULT_PROFILE_ENDPOINT: &str = "https://{host}/profiles.json";

/// Persisted launcher preferences. Every field has a default so older or
/// partial files keep loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LauncherSettings {
    pub download_concurrency: usize,
    pub max_download_attempts: u32,
    pub retry_base_delay_ms: u64,
    /// `{host}` is replaced by the server host the profile is installed from.
    pub profile_endpoint: String,
    /// Sent as `X-API-Key` when fetching profile descriptors.
    pub profile_api_key: Option<String>,
    /// Delete local files whose entries disappeared from a profile.
    pub remove_orphaned_files: bool,
    pub launcher_name: String,
    pub launcher_version: String,
    pub min_memory_mb: u32,
    pub max_memory_mb: u32,
    pub window_width: Option<u32>,
    pub window_height: Option<u32>,
    /// Asset virtual-path prefixes whose failure blocks launching.
    pub required_asset_prefixes: Vec<String>,
    pub java_path: Option<PathBuf>,
}

impl Default for LauncherSettings {
    fn default() -> Self {
        Self {
            download_concurrency: 6,
            max_download_attempts: 4,
            retry_base_delay_ms: 500,
            profile_endpoint: DEFAULT_PROFILE_ENDPOINT.into(),
            profile_api_key: None,
            remove_orphaned_files: false,
            launcher_name: "ProfileLauncher".into(),
            launcher_version: env!("CARGO_PKG_VERSION").into(),
            min_memory_mb: 512,
            max_memory_mb: 4096,
            window_width: None,
            window_height: None,
            required_asset_prefixes: Vec::new(),
            java_path: None,
        }
    }
}

impl LauncherSettings {
    /// Defaults when the file is missing or unreadable.
    pub fn load(path: &Path) -> Self {
        let Ok(raw) = std::fs::read_to_string(path) else {
            return Self::default();
        };
        match serde_json::from_str(&raw) {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Ignoring unreadable settings {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    pub async fn save(&self, path: &Path) -> LauncherResult<()> {
        write_json_atomic(path, self).await
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_download_attempts.max(1),
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
        }
    }

    pub fn window_size(&self) -> Option<(u32, u32)> {
        Some((self.window_width?, self.window_height?))
    }

    pub fn profile_url(&self, host: &str) -> String {
        self.profile_endpoint.replace("{host}", host)
    }
}
