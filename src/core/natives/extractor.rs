// ─── Native Extractor ───
// Unpacks native bundles into a shared cache directory keyed by the exact set
// of bundles and the platform. A finished directory carries a sentinel file;
// unfinished work only ever lives in a temporary sibling.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::libraries::NativeBundle;
use crate::core::locks::KeyedLocks;
use crate::core::platform::Platform;

const SENTINEL: &str = ".extracted";
const ALWAYS_EXCLUDED: &str = "META-INF/";
/// Temp directories older than this were left behind by a crashed run.
pub const STALE_TEMP_AGE: Duration = Duration::from_secs(60 * 60);

pub struct NativeExtractor {
    natives_root: PathBuf,
    locks: KeyedLocks,
}

impl NativeExtractor {
    pub fn new(natives_root: PathBuf) -> Self {
        Self {
            natives_root,
            locks: KeyedLocks::new(),
        }
    }

    /// Share key locks with other extractors of the same process.
    pub fn with_locks(mut self, locks: KeyedLocks) -> Self {
        self.locks = locks;
        self
    }

    /// SHA-256 over the sorted bundle identities and the platform identity.
    pub fn extraction_key(natives: &[NativeBundle], platform: &Platform) -> String {
        let mut identities: Vec<&str> = natives.iter().map(|n| n.identity()).collect();
        identities.sort_unstable();
        identities.dedup();

        let mut hasher = Sha256::new();
        for identity in identities {
            hasher.update(identity.as_bytes());
            hasher.update(b"\n");
        }
        hasher.update(platform.identity().as_bytes());
        hex::encode(hasher.finalize())
    }

    pub async fn extract(
        &self,
        natives: &[NativeBundle],
        platform: &Platform,
    ) -> LauncherResult<PathBuf> {
        let key = Self::extraction_key(natives, platform);
        let target = self.natives_root.join(&key);
        if is_complete(&target) {
            debug!("Reusing natives {:?}", target);
            return Ok(target);
        }

        let _guard = self.locks.lock(&key).await;
        if is_complete(&target) {
            return Ok(target);
        }

        tokio::fs::create_dir_all(&self.natives_root)
            .await
            .map_err(|e| LauncherError::io(&self.natives_root, e))?;
        let staging = self.natives_root.join(format!(
            ".{}.tmp-{}",
            key,
            uuid::Uuid::new_v4().simple()
        ));

        let bundles = natives.to_vec();
        let dir = staging.clone();
        let sentinel_body = key.clone();
        let unpacked = tokio::task::spawn_blocking(move || {
            unpack_all(&bundles, &dir)?;
            std::fs::write(dir.join(SENTINEL), sentinel_body)
                .map_err(|e| LauncherError::io(dir.join(SENTINEL), e))
        })
        .await
        .map_err(|e| LauncherError::Other(format!("Task join error: {}", e)));

        if let Err(e) = unpacked.and_then(|r| r) {
            let _ = tokio::fs::remove_dir_all(&staging).await;
            return Err(e);
        }

        self.publish(&staging, &target).await?;
        info!("Extracted {} native bundles into {:?}", natives.len(), target);
        Ok(target)
    }

    /// Rename the staging directory into place. Losing the race to another
    /// process that already published the same key is not an error.
    async fn publish(&self, staging: &Path, target: &Path) -> LauncherResult<()> {
        match tokio::fs::rename(staging, target).await {
            Ok(()) => Ok(()),
            Err(_) if is_complete(target) => {
                debug!("Natives {:?} published concurrently", target);
                let _ = tokio::fs::remove_dir_all(staging).await;
                Ok(())
            }
            Err(first) => {
                // An incomplete directory under the final name is a leftover.
                if target.exists() {
                    warn!("Replacing incomplete natives directory {:?}", target);
                    let _ = tokio::fs::remove_dir_all(target).await;
                    if tokio::fs::rename(staging, target).await.is_ok() {
                        return Ok(());
                    }
                }
                let _ = tokio::fs::remove_dir_all(staging).await;
                Err(LauncherError::io(target, first))
            }
        }
    }

    /// Remove temporary extraction directories older than `max_age`.
    pub async fn prune_temp_dirs(&self, max_age: Duration) -> usize {
        let mut removed = 0;
        let Ok(mut entries) = tokio::fs::read_dir(&self.natives_root).await else {
            return 0;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name().to_string_lossy().to_string();
            if !(name.starts_with('.') && name.contains(".tmp-")) {
                continue;
            }
            let age = entry
                .metadata()
                .await
                .ok()
                .and_then(|m| m.modified().ok())
                .and_then(|t| t.elapsed().ok())
                .unwrap_or_default();
            if age >= max_age && tokio::fs::remove_dir_all(entry.path()).await.is_ok() {
                removed += 1;
            }
        }
        if removed > 0 {
            info!("Pruned {} stale native staging directories", removed);
        }
        removed
    }
}

fn is_complete(dir: &Path) -> bool {
    dir.join(SENTINEL).is_file()
}

fn unpack_all(bundles: &[NativeBundle], dir: &Path) -> LauncherResult<()> {
    std::fs::create_dir_all(dir).map_err(|e| LauncherError::io(dir, e))?;
    for bundle in bundles {
        let path = &bundle.artifact.path;
        let file = std::fs::File::open(path).map_err(|e| LauncherError::io(path, e))?;
        let mut archive = zip::ZipArchive::new(file)?;

        for i in 0..archive.len() {
            let mut entry = archive.by_index(i)?;
            if entry.is_dir() {
                continue;
            }
            let name = entry.name().replace('\\', "/");
            if name.starts_with(ALWAYS_EXCLUDED)
                || bundle.exclude.iter().any(|prefix| name.starts_with(prefix.as_str()))
            {
                continue;
            }

            // Bundle-internal directories are flattened.
            let flat = name.rsplit('/').next().unwrap_or_default();
            if flat.is_empty() || flat == ".." || flat == "." || flat == SENTINEL {
                continue;
            }

            let mut bytes = Vec::with_capacity(entry.size() as usize);
            entry
                .read_to_end(&mut bytes)
                .map_err(|e| LauncherError::io(path, e))?;
            let dest = dir.join(flat);
            std::fs::write(&dest, bytes).map_err(|e| LauncherError::io(&dest, e))?;
            debug!("Extracted native: {}", flat);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::libraries::ResolvedArtifact;
    use crate::core::test_support::scratch_dir;
    use std::io::Write;

    fn jar(path: &Path, entries: &[(&str, &[u8])]) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut writer = zip::ZipWriter::new(std::fs::File::create(path).unwrap());
        let options = zip::write::SimpleFileOptions::default();
        for (name, body) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(body).unwrap();
        }
        writer.finish().unwrap();
    }

    fn bundle(coordinate: &str, path: PathBuf, exclude: &[&str]) -> NativeBundle {
        NativeBundle {
            artifact: ResolvedArtifact {
                key: coordinate.to_string(),
                coordinate: coordinate.to_string(),
                path,
                download: None,
            },
            exclude: exclude.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn linux() -> Platform {
        Platform::new("linux", "x86_64")
    }

    #[tokio::test]
    async fn entries_are_flattened_and_exclusions_honoured() {
        let root = scratch_dir("natives-flatten");
        let jar_path = root.join("lwjgl-natives.jar");
        jar(
            &jar_path,
            &[
                ("META-INF/MANIFEST.MF", b"manifest"),
                ("linux/x64/org/lwjgl/liblwjgl.so", b"so"),
                ("libglfw.so", b"glfw"),
                ("docs/readme.txt", b"skip"),
            ],
        );

        let extractor = NativeExtractor::new(root.join("natives"));
        let natives = vec![bundle("org.lwjgl:lwjgl:3:natives-linux", jar_path, &["docs/"])];
        let dir = extractor.extract(&natives, &linux()).await.unwrap();

        assert_eq!(std::fs::read(dir.join("liblwjgl.so")).unwrap(), b"so");
        assert_eq!(std::fs::read(dir.join("libglfw.so")).unwrap(), b"glfw");
        assert!(!dir.join("MANIFEST.MF").exists());
        assert!(!dir.join("readme.txt").exists());
        assert!(dir.join(SENTINEL).is_file());

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn second_extraction_reuses_the_directory() {
        let root = scratch_dir("natives-reuse");
        let jar_path = root.join("a.jar");
        jar(&jar_path, &[("liba.so", b"a")]);
        let natives = vec![bundle("g:a:1:natives-linux", jar_path.clone(), &[])];
        let extractor = NativeExtractor::new(root.join("natives"));

        let first = extractor.extract(&natives, &linux()).await.unwrap();
        // Without the archive a real re-extraction would fail.
        std::fs::remove_file(&jar_path).unwrap();
        let second = extractor.extract(&natives, &linux()).await.unwrap();
        assert_eq!(first, second);

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn key_ignores_order_but_not_platform() {
        let a = bundle("g:a:1", PathBuf::from("a.jar"), &[]);
        let b = bundle("g:b:1", PathBuf::from("b.jar"), &[]);
        let forward = NativeExtractor::extraction_key(&[a.clone(), b.clone()], &linux());
        let reverse = NativeExtractor::extraction_key(&[b.clone(), a.clone()], &linux());
        assert_eq!(forward, reverse);
        assert_ne!(
            forward,
            NativeExtractor::extraction_key(&[a, b], &Platform::new("windows", "x86_64"))
        );
    }

    #[tokio::test]
    async fn concurrent_extractors_agree_on_one_directory() {
        let root = scratch_dir("natives-race");
        let jar_path = root.join("race.jar");
        jar(&jar_path, &[("librace.so", b"race")]);
        let natives = vec![bundle("g:race:1:natives-linux", jar_path, &[])];

        // Separate lock tables behave like separate processes.
        let left = NativeExtractor::new(root.join("natives"));
        let right = NativeExtractor::new(root.join("natives"));
        let platform = linux();
        let (a, b) = tokio::join!(
            left.extract(&natives, &platform),
            right.extract(&natives, &platform)
        );
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(a, b);
        assert_eq!(std::fs::read(a.join("librace.so")).unwrap(), b"race");

        let leftovers = std::fs::read_dir(root.join("natives"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp-"))
            .count();
        assert_eq!(leftovers, 0);

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn broken_archives_leave_nothing_behind() {
        let root = scratch_dir("natives-broken");
        let jar_path = root.join("broken.jar");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(&jar_path, b"not a zip").unwrap();
        let extractor = NativeExtractor::new(root.join("natives"));

        let result = extractor
            .extract(&[bundle("g:broken:1", jar_path, &[])], &linux())
            .await;
        assert!(matches!(result, Err(LauncherError::Zip(_))));
        assert_eq!(std::fs::read_dir(root.join("natives")).unwrap().count(), 0);

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn stale_staging_directories_are_pruned() {
        let root = scratch_dir("natives-prune");
        let natives_root = root.join("natives");
        std::fs::create_dir_all(natives_root.join(".abc.tmp-123")).unwrap();
        std::fs::create_dir_all(natives_root.join("abc")).unwrap();

        let extractor = NativeExtractor::new(natives_root.clone());
        assert_eq!(extractor.prune_temp_dirs(STALE_TEMP_AGE).await, 0);
        assert_eq!(extractor.prune_temp_dirs(Duration::ZERO).await, 1);
        assert!(natives_root.join("abc").exists());

        let _ = std::fs::remove_dir_all(&root);
    }
}
