// ─── Storage helpers ───
// Every durable file is written under a temporary name and renamed into
// place, so readers never observe a half-written file under its final name.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::core::error::{LauncherError, LauncherResult};

pub async fn create_dir_safe(path: &Path) -> LauncherResult<()> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| LauncherError::io(path, e))
}

/// Sibling temp path: `<dir>/.<name>.<uuid>.part`.
pub fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "file".into());
    path.with_file_name(format!(".{}.{}.part", name, uuid::Uuid::new_v4().simple()))
}

pub async fn write_atomic(path: &Path, bytes: &[u8]) -> LauncherResult<()> {
    if let Some(parent) = path.parent() {
        create_dir_safe(parent).await?;
    }

    let tmp = temp_sibling(path);
    if let Err(e) = tokio::fs::write(&tmp, bytes).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(LauncherError::io(&tmp, e));
    }
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(LauncherError::io(path, e));
    }
    Ok(())
}

pub async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> LauncherResult<()> {
    let json = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &json).await
}

/// `Ok(None)` when the file does not exist.
pub async fn read_json<T: DeserializeOwned>(path: &Path) -> LauncherResult<Option<T>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(LauncherError::io(path, e)),
    }
}

/// Hex SHA-1 of a file's content, `None` if the file is missing.
pub async fn sha1_of_file(path: &Path) -> LauncherResult<Option<String>> {
    use sha1::{Digest, Sha1};

    match tokio::fs::read(path).await {
        Ok(bytes) => {
            let digest = tokio::task::spawn_blocking(move || hex::encode(Sha1::digest(&bytes)))
                .await
                .map_err(|e| LauncherError::Other(format!("hash task failed: {}", e)))?;
            Ok(Some(digest))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(LauncherError::io(path, e)),
    }
}
