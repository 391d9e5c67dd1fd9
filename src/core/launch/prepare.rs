// ─── Version Preparation ───
// resolve → libraries → assets → natives. Stages run in order; work inside a
// stage runs on the downloader pool.

use std::path::PathBuf;

use tracing::{info, warn};

use crate::core::assets::{AssetManager, AssetReport};
use crate::core::downloader::Downloader;
use crate::core::error::LauncherResult;
use crate::core::libraries::{LibraryResolver, ResolvedLibraries};
use crate::core::natives::{NativeExtractor, STALE_TEMP_AGE};
use crate::core::platform::Platform;
use crate::core::version::{ManifestResolver, MergedDescriptor};

/// A version whose files are all present and verified.
#[derive(Debug, Clone)]
pub struct PreparedVersion {
    pub merged: MergedDescriptor,
    pub libraries: ResolvedLibraries,
    pub natives_dir: PathBuf,
    pub assets: Option<AssetReport>,
    pub classpath: String,
    pub module_path: String,
}

pub struct VersionPreparer {
    pub manifests: ManifestResolver,
    pub libraries: LibraryResolver,
    pub assets: AssetManager,
    pub natives: NativeExtractor,
    pub downloader: Downloader,
    pub assets_dir: PathBuf,
}

impl VersionPreparer {
    pub async fn prepare(
        &self,
        version_id: &str,
        platform: &Platform,
    ) -> LauncherResult<PreparedVersion> {
        let progress = self.downloader.progress();
        let cancel = self.downloader.cancel_token();

        progress.report(format!("Resolving {}", version_id), Some(0.0));
        let merged = self.manifests.resolve(version_id).await?;
        let libraries = self.libraries.resolve(&merged, platform)?;
        cancel.check()?;

        progress.report("Downloading libraries", Some(0.2));
        let batch = self
            .downloader
            .download_batch("libraries", libraries.download_entries())
            .await;
        cancel.check()?;
        // Libraries are never optional at this point.
        if let Some((_, error)) = batch.failed.into_iter().next() {
            return Err(error);
        }

        let assets = match &merged.asset_index {
            Some(index) => {
                progress.report("Verifying assets", Some(0.5));
                let report = self.assets.ensure_assets(index, &self.assets_dir).await?;
                if !report.failed.is_empty() {
                    warn!(
                        "{} assets of {} missing; continuing",
                        report.failed.len(),
                        merged.id
                    );
                }
                Some(report)
            }
            None => None,
        };
        cancel.check()?;

        progress.report("Extracting natives", Some(0.9));
        self.natives.prune_temp_dirs(STALE_TEMP_AGE).await;
        let natives_dir = self.natives.extract(&libraries.natives, platform).await?;

        let separator = platform.classpath_separator();
        let classpath = libraries.classpath_string(separator);
        let module_path = libraries.module_path_string(separator);
        progress.report(format!("{} ready", merged.id), Some(1.0));
        info!(
            "Prepared {} ({} classpath entries, natives at {:?})",
            merged.id,
            libraries.classpath.len(),
            natives_dir
        );

        Ok(PreparedVersion {
            merged,
            libraries,
            natives_dir,
            assets,
            classpath,
            module_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::downloader::RetryPolicy;
    use crate::core::error::LauncherError;
    use crate::core::test_support::{scratch_dir, sha1_hex, test_client, TestServer};
    use std::io::Write;
    use std::time::Duration;

    fn native_jar() -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        writer
            .start_file("liblwjgl.so", zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"native").unwrap();
        writer.finish().unwrap().into_inner()
    }

    fn preparer(root: &std::path::Path, server: &TestServer) -> VersionPreparer {
        let downloader = Downloader::new(test_client()).with_retry(RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(5),
        });
        VersionPreparer {
            manifests: ManifestResolver::new(test_client(), root.join("versions"))
                .with_catalog_url(&server.url("/catalog.json")),
            libraries: LibraryResolver::new(root.join("libraries"), root.join("versions")),
            assets: AssetManager::new(downloader.clone())
                .with_resources_url(&server.url("/res")),
            natives: NativeExtractor::new(root.join("natives")),
            downloader,
            assets_dir: root.join("assets"),
        }
    }

    fn seed(root: &std::path::Path, server: &TestServer) {
        let lib = b"library".to_vec();
        let client = b"client".to_vec();
        let native = native_jar();
        let object = b"sound".to_vec();
        let index = serde_json::to_vec(&serde_json::json!({
            "objects": {"a.ogg": {"hash": sha1_hex(&object), "size": object.len()}}
        }))
        .unwrap();
        let hash = sha1_hex(&object);

        server.serve("/lib.jar", lib.clone());
        server.serve("/native.jar", native.clone());
        server.serve("/client.jar", client.clone());
        server.serve("/index.json", index.clone());
        server.serve(&format!("/res/{}/{}", &hash[..2], hash), object);

        let descriptor = serde_json::json!({
            "id": "1.0", "mainClass": "Main",
            "assetIndex": {"id": "1", "url": server.url("/index.json"), "sha1": sha1_hex(&index)},
            "downloads": {"client": {"url": server.url("/client.jar"), "sha1": sha1_hex(&client)}},
            "libraries": [
                {"name": "g:lib:1", "downloads": {"artifact": {
                    "path": "g/lib/1/lib-1.jar", "url": server.url("/lib.jar"), "sha1": sha1_hex(&lib)}}},
                {"name": "g:native:1:natives-linux", "downloads": {"artifact": {
                    "path": "g/native/1/native-1-natives-linux.jar", "url": server.url("/native.jar"),
                    "sha1": sha1_hex(&native)}}}
            ]
        });
        let path = root.join("versions/1.0/1.0.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, serde_json::to_vec(&descriptor).unwrap()).unwrap();
    }

    #[tokio::test]
    async fn prepares_every_stage_and_is_idempotent() {
        let server = TestServer::start().await;
        let root = scratch_dir("prepare-stages");
        seed(&root, &server);
        let linux = Platform::new("linux", "x86_64");

        let prepared = preparer(&root, &server).prepare("1.0", &linux).await.unwrap();
        assert!(root.join("libraries/g/lib/1/lib-1.jar").is_file());
        assert!(root.join("versions/1.0/1.0.jar").is_file());
        assert!(prepared.natives_dir.join("liblwjgl.so").is_file());
        assert_eq!(prepared.assets.as_ref().unwrap().downloaded, 1);
        assert!(prepared.classpath.ends_with("1.0.jar"));

        let hits = server.total_hits();
        let again = preparer(&root, &server).prepare("1.0", &linux).await.unwrap();
        assert_eq!(server.total_hits(), hits);
        assert_eq!(again.natives_dir, prepared.natives_dir);

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn library_failures_abort_preparation() {
        let server = TestServer::start().await;
        let root = scratch_dir("prepare-failure");
        seed(&root, &server);
        server.serve_status("/lib.jar", 404);

        let result = preparer(&root, &server)
            .prepare("1.0", &Platform::new("linux", "x86_64"))
            .await;
        assert!(matches!(result, Err(LauncherError::DownloadFailed { .. })));

        let _ = std::fs::remove_dir_all(&root);
    }
}
