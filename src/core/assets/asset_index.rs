use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::downloader::{DownloadEntry, Downloader};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::version::AssetIndexRef;

pub const RESOURCES_URL: &str = "https://resources.download.minecraft.net";

/// Asset index JSON: virtual path → content hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetIndex {
    pub objects: BTreeMap<String, AssetObject>,
    /// Pre-1.7 indexes expect the objects copied out under their virtual names.
    #[serde(rename = "virtual", default)]
    pub is_virtual: bool,
    #[serde(default)]
    pub map_to_resources: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetObject {
    pub hash: String,
    pub size: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssetReport {
    pub downloaded: usize,
    pub verified: usize,
    /// Virtual paths still missing or corrupt after retries.
    pub failed: Vec<String>,
}

/// Content-addressed asset store under `<assets>/objects/<hash[0:2]>/<hash>`.
pub struct AssetManager {
    downloader: Downloader,
    resources_url: String,
    /// Virtual-path prefixes whose failure blocks a launch.
    required_prefixes: Vec<String>,
}

impl AssetManager {
    pub fn new(downloader: Downloader) -> Self {
        Self {
            downloader,
            resources_url: RESOURCES_URL.to_string(),
            required_prefixes: Vec::new(),
        }
    }

    pub fn with_resources_url(mut self, url: &str) -> Self {
        self.resources_url = url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_required_prefixes(mut self, prefixes: Vec<String>) -> Self {
        self.required_prefixes = prefixes;
        self
    }

    pub fn object_path(assets_dir: &Path, hash: &str) -> PathBuf {
        assets_dir.join("objects").join(&hash[..2]).join(hash)
    }

    fn is_required(&self, name: &str) -> bool {
        self.required_prefixes.iter().any(|p| name.starts_with(p))
    }

    /// The index is itself cached by hash under `indexes/<id>.json`.
    async fn load_index(
        &self,
        index_ref: &AssetIndexRef,
        assets_dir: &Path,
    ) -> LauncherResult<AssetIndex> {
        let index_path = assets_dir
            .join("indexes")
            .join(format!("{}.json", index_ref.id));
        let entry = DownloadEntry {
            url: index_ref.url.clone(),
            dest: index_path.clone(),
            sha1: index_ref.sha1.clone(),
            size: index_ref.size,
        };
        self.downloader.ensure_file(&entry).await?;

        let raw = tokio::fs::read(&index_path)
            .await
            .map_err(|e| LauncherError::io(&index_path, e))?;
        Ok(serde_json::from_slice(&raw)?)
    }

    /// Verify every object of the index and download the missing or corrupt ones.
    ///
    /// Fails only when the index itself is unavailable or a required object
    /// could not be repaired; other failures are listed in the report.
    pub async fn ensure_assets(
        &self,
        index_ref: &AssetIndexRef,
        assets_dir: &Path,
    ) -> LauncherResult<AssetReport> {
        let index = self.load_index(index_ref, assets_dir).await?;
        let mut report = AssetReport::default();

        // Several virtual paths may share one object.
        let mut by_hash: BTreeMap<String, (u64, Vec<String>)> = BTreeMap::new();
        for (name, object) in &index.objects {
            let hash = object.hash.to_ascii_lowercase();
            if hash.len() != 40 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
                warn!("Asset {} has an invalid hash {:?}", name, object.hash);
                report.failed.push(name.clone());
                continue;
            }
            by_hash
                .entry(hash)
                .or_insert_with(|| (object.size, Vec::new()))
                .1
                .push(name.clone());
        }

        let entries: Vec<DownloadEntry> = by_hash
            .iter()
            .map(|(hash, (size, _))| DownloadEntry {
                url: format!("{}/{}/{}", self.resources_url, &hash[..2], hash),
                dest: Self::object_path(assets_dir, hash),
                sha1: Some(hash.clone()),
                size: Some(*size),
            })
            .collect();

        info!(
            "Checking {} asset objects of index {}",
            entries.len(),
            index_ref.id
        );
        let batch = self.downloader.download_batch("assets", entries).await;
        report.downloaded = batch.downloaded;
        report.verified = batch.verified;

        let mut fatal = None;
        for (entry, error) in batch.failed {
            let hash = entry.sha1.unwrap_or_default();
            let names = by_hash.remove(&hash).map(|(_, n)| n).unwrap_or_default();
            let required = names.iter().find(|name| self.is_required(name)).cloned();
            report.failed.extend(names);
            if let Some(name) = required {
                warn!("Required asset {} failed: {}", name, error);
                if fatal.is_none() {
                    fatal = Some(error);
                }
            }
        }
        if let Some(error) = fatal {
            return Err(error);
        }
        if !report.failed.is_empty() {
            warn!("{} assets could not be repaired", report.failed.len());
        }

        if index.is_virtual || index.map_to_resources {
            materialize_virtual(&index, &index_ref.id, assets_dir, &report.failed).await?;
        }

        Ok(report)
    }
}

/// Copy objects out under their virtual names for legacy indexes.
async fn materialize_virtual(
    index: &AssetIndex,
    index_id: &str,
    assets_dir: &Path,
    failed: &[String],
) -> LauncherResult<()> {
    let root = assets_dir.join("virtual").join(index_id);
    for (name, object) in &index.objects {
        if failed.contains(name) {
            continue;
        }
        if !is_plain_relative(name) {
            warn!("Skipping virtual asset with unsafe name {:?}", name);
            continue;
        }
        let target = root.join(name);
        let up_to_date = tokio::fs::metadata(&target)
            .await
            .is_ok_and(|m| m.len() == object.size);
        if up_to_date {
            continue;
        }
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| LauncherError::io(parent, e))?;
        }
        let source = AssetManager::object_path(assets_dir, &object.hash.to_ascii_lowercase());
        tokio::fs::copy(&source, &target)
            .await
            .map_err(|e| LauncherError::io(&target, e))?;
    }
    debug!("Materialized virtual assets under {:?}", root);
    Ok(())
}

/// Only plain components: no root, prefix, `.` or `..`.
fn is_plain_relative(name: &str) -> bool {
    let path = Path::new(name);
    path.components().next().is_some()
        && path.components().all(|c| matches!(c, Component::Normal(_)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::downloader::RetryPolicy;
    use crate::core::test_support::{scratch_dir, sha1_hex, test_client, TestServer};
    use std::time::Duration;

    fn downloader() -> Downloader {
        Downloader::new(test_client()).with_retry(RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(5),
        })
    }

    /// Writes an index (and optionally its objects) and returns its reference.
    fn seed(
        assets: &Path,
        server: &TestServer,
        objects: &[(&str, &[u8])],
        write_objects: bool,
        is_virtual: bool,
    ) -> AssetIndexRef {
        let mut map = serde_json::Map::new();
        for (name, body) in objects {
            map.insert(
                name.to_string(),
                serde_json::json!({"hash": sha1_hex(body), "size": body.len()}),
            );
            server.serve(
                &format!("/res/{}/{}", &sha1_hex(body)[..2], sha1_hex(body)),
                body.to_vec(),
            );
            if write_objects {
                let path = AssetManager::object_path(assets, &sha1_hex(body));
                std::fs::create_dir_all(path.parent().unwrap()).unwrap();
                std::fs::write(path, body).unwrap();
            }
        }
        let index = serde_json::to_vec(&serde_json::json!({"objects": map, "virtual": is_virtual})).unwrap();
        let index_path = assets.join("indexes").join("test.json");
        std::fs::create_dir_all(index_path.parent().unwrap()).unwrap();
        std::fs::write(&index_path, &index).unwrap();
        server.serve("/index.json", index.clone());

        AssetIndexRef {
            id: "test".into(),
            url: server.url("/index.json"),
            sha1: Some(sha1_hex(&index)),
            size: None,
            total_size: None,
        }
    }

    #[tokio::test]
    async fn fully_valid_assets_need_no_network() {
        let server = TestServer::start().await;
        let assets = scratch_dir("assets-valid");
        let index_ref = seed(
            &assets,
            &server,
            &[("a/one.ogg", b"one"), ("b/two.png", b"two"), ("c/dup.png", b"two")],
            true,
            false,
        );
        let manager = AssetManager::new(downloader()).with_resources_url(&server.url("/res"));

        let report = manager.ensure_assets(&index_ref, &assets).await.unwrap();
        assert_eq!(report.downloaded, 0);
        assert_eq!(report.verified, 2);
        assert!(report.failed.is_empty());
        assert_eq!(server.total_hits(), 0);

        let _ = std::fs::remove_dir_all(&assets);
    }

    #[tokio::test]
    async fn missing_and_corrupt_objects_are_repaired() {
        let server = TestServer::start().await;
        let assets = scratch_dir("assets-repair");
        let index_ref = seed(&assets, &server, &[("x.txt", b"x"), ("y.txt", b"y")], true, false);
        std::fs::write(AssetManager::object_path(&assets, &sha1_hex(b"x")), b"garbage").unwrap();
        std::fs::remove_file(AssetManager::object_path(&assets, &sha1_hex(b"y"))).unwrap();

        let manager = AssetManager::new(downloader()).with_resources_url(&server.url("/res"));
        let report = manager.ensure_assets(&index_ref, &assets).await.unwrap();
        assert_eq!(report.downloaded, 2);
        assert_eq!(
            std::fs::read(AssetManager::object_path(&assets, &sha1_hex(b"x"))).unwrap(),
            b"x"
        );

        let again = manager.ensure_assets(&index_ref, &assets).await.unwrap();
        assert_eq!(again.downloaded, 0);
        assert_eq!(again.verified, 2);

        let _ = std::fs::remove_dir_all(&assets);
    }

    #[tokio::test]
    async fn only_required_failures_are_fatal() {
        let server = TestServer::start().await;
        let assets = scratch_dir("assets-required");
        let index_ref = seed(&assets, &server, &[("sounds/a.ogg", b"a")], false, false);
        let hash = sha1_hex(b"a");
        server.serve_status(&format!("/res/{}/{}", &hash[..2], hash), 404);

        let lenient = AssetManager::new(downloader()).with_resources_url(&server.url("/res"));
        let report = lenient.ensure_assets(&index_ref, &assets).await.unwrap();
        assert_eq!(report.failed, vec!["sounds/a.ogg".to_string()]);

        let strict = AssetManager::new(downloader())
            .with_resources_url(&server.url("/res"))
            .with_required_prefixes(vec!["sounds/".into()]);
        let err = strict.ensure_assets(&index_ref, &assets).await.unwrap_err();
        assert!(matches!(err, LauncherError::DownloadFailed { status: 404, .. }));

        let _ = std::fs::remove_dir_all(&assets);
    }

    #[tokio::test]
    async fn required_hash_mismatch_surfaces_as_integrity() {
        let server = TestServer::start().await;
        let assets = scratch_dir("assets-integrity");
        let index_ref = seed(&assets, &server, &[("sounds/b.ogg", b"b")], false, false);
        let hash = sha1_hex(b"b");
        server.serve(&format!("/res/{}/{}", &hash[..2], hash), b"tampered".to_vec());

        let strict = AssetManager::new(downloader())
            .with_resources_url(&server.url("/res"))
            .with_required_prefixes(vec!["sounds/".into()]);
        let err = strict.ensure_assets(&index_ref, &assets).await.unwrap_err();
        assert!(matches!(err, LauncherError::Integrity { .. }));

        let _ = std::fs::remove_dir_all(&assets);
    }

    #[test]
    fn virtual_names_must_stay_relative() {
        assert!(is_plain_relative("lang/en_US.lang"));
        assert!(!is_plain_relative("/etc/passwd"));
        assert!(!is_plain_relative("../escape.txt"));
        assert!(!is_plain_relative("sounds/../../escape.txt"));
        assert!(!is_plain_relative("./sounds/a.ogg"));
        assert!(!is_plain_relative(""));
    }

    #[tokio::test]
    async fn unsafe_virtual_names_are_not_copied_out() {
        let server = TestServer::start().await;
        let assets = scratch_dir("assets-virtual-unsafe");
        let outside = assets.join("outside.txt");
        let absolute = outside.to_string_lossy().to_string();
        let index_ref = seed(
            &assets,
            &server,
            &[(absolute.as_str(), b"evil"), ("lang/en_US.lang", b"lang")],
            true,
            true,
        );

        let manager = AssetManager::new(downloader()).with_resources_url(&server.url("/res"));
        manager.ensure_assets(&index_ref, &assets).await.unwrap();
        assert!(!outside.exists());
        assert!(assets.join("virtual/test/lang/en_US.lang").is_file());

        let _ = std::fs::remove_dir_all(&assets);
    }

    #[tokio::test]
    async fn virtual_indexes_are_copied_out() {
        let server = TestServer::start().await;
        let assets = scratch_dir("assets-virtual");
        let index_ref = seed(&assets, &server, &[("lang/en_US.lang", b"lang")], true, true);

        let manager = AssetManager::new(downloader()).with_resources_url(&server.url("/res"));
        manager.ensure_assets(&index_ref, &assets).await.unwrap();
        assert_eq!(
            std::fs::read(assets.join("virtual/test/lang/en_US.lang")).unwrap(),
            b"lang"
        );

        let _ = std::fs::remove_dir_all(&assets);
    }
}
