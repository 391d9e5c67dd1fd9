// ─── Version Manifest ───
// The remote version catalog: one `{id, type, url, sha1}` entry per version.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::error::{LauncherError, LauncherResult};

pub const VERSION_MANIFEST_URL: &str =
    "https://piston-meta.mojang.com/mc/game/version_manifest_v2.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionManifest {
    #[serde(default)]
    pub latest: Option<LatestVersions>,
    pub versions: Vec<VersionEntry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LatestVersions {
    pub release: String,
    pub snapshot: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub version_type: String,
    #[serde(rename = "releaseTime", default)]
    pub release_time: Option<String>,
    pub url: String,
    #[serde(default)]
    pub sha1: Option<String>,
}

impl VersionManifest {
    /// Fetch the catalog, returning the parsed value and the raw body for caching.
    pub async fn fetch(client: &reqwest::Client, url: &str) -> LauncherResult<(Self, String)> {
        info!("Fetching version catalog from {}", url);

        let response = client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(LauncherError::DownloadFailed {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }
        let raw = response.text().await?;
        let manifest: VersionManifest = serde_json::from_str(&raw)?;

        info!("Loaded {} versions from catalog", manifest.versions.len());
        Ok((manifest, raw))
    }

    /// Find a specific version entry by ID (e.g. "1.20.4").
    pub fn find_version(&self, id: &str) -> Option<&VersionEntry> {
        self.versions.iter().find(|v| v.id == id)
    }

    pub fn releases(&self) -> Vec<&VersionEntry> {
        self.versions
            .iter()
            .filter(|v| v.version_type == "release")
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_catalog() {
        let json = r#"{
            "latest": {"release": "1.20.4"},
            "versions": [
                {"id": "24w03a", "type": "snapshot", "url": "https://example.com/s.json", "sha1": "aa"},
                {"id": "1.20.4", "type": "release", "releaseTime": "2023-12-07T08:00:00+00:00",
                 "url": "https://example.com/1.20.4.json", "sha1": "abc123"}
            ]
        }"#;
        let manifest: VersionManifest = serde_json::from_str(json).unwrap();
        let entry = manifest.find_version("1.20.4").unwrap();
        assert_eq!(entry.sha1.as_deref(), Some("abc123"));
        assert_eq!(entry.release_time.as_deref(), Some("2023-12-07T08:00:00+00:00"));
        assert_eq!(manifest.releases().len(), 1);
        assert!(manifest.find_version("1.0").is_none());
    }
}
