// ─── Locks ───
// Per-key serialization inside one process, plus an advisory lock file for
// cooperation between launcher processes sharing a data directory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use tokio::io::AsyncWriteExt;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, warn};

use crate::core::error::{LauncherError, LauncherResult};

/// Async mutexes created on demand, one per key.
#[derive(Debug, Clone, Default)]
pub struct KeyedLocks {
    inner: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let slot = {
            let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            map.entry(key.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        slot.lock_owned().await
    }
}

const POLL_INTERVAL: Duration = Duration::from_millis(200);
/// How often a held lock file is rewritten to keep its mtime fresh.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(20);
/// A lock file without a heartbeat for this long belongs to a crashed process.
const STALE_AFTER: Duration = Duration::from_secs(2 * 60);

/// Exclusive lock file holding an owner token, refreshed while held and
/// removed when dropped, unless another process has taken it over.
#[derive(Debug)]
pub struct LockFile {
    path: PathBuf,
    token: String,
    heartbeat: tokio::task::JoinHandle<()>,
}

impl LockFile {
    pub async fn acquire(path: &Path, timeout: Duration) -> LauncherResult<Self> {
        Self::acquire_with(path, timeout, STALE_AFTER, HEARTBEAT_INTERVAL).await
    }

    pub(crate) async fn acquire_with(
        path: &Path,
        timeout: Duration,
        stale_after: Duration,
        heartbeat: Duration,
    ) -> LauncherResult<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| LauncherError::io(parent, e))?;
        }

        let token = format!("{}:{}", std::process::id(), uuid::Uuid::new_v4());
        let started = std::time::Instant::now();
        loop {
            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(path)
                .await
            {
                Ok(mut file) => {
                    file.write_all(token.as_bytes())
                        .await
                        .map_err(|e| LauncherError::io(path, e))?;
                    debug!("Acquired lock {:?}", path);
                    return Ok(Self {
                        path: path.to_path_buf(),
                        heartbeat: tokio::spawn(keep_fresh(
                            path.to_path_buf(),
                            token.clone(),
                            heartbeat,
                        )),
                        token,
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if is_stale(path, stale_after).await {
                        warn!("Breaking stale lock {:?}", path);
                        let _ = tokio::fs::remove_file(path).await;
                        continue;
                    }
                    if started.elapsed() >= timeout {
                        return Err(LauncherError::Other(format!(
                            "timed out waiting for lock {:?}",
                            path
                        )));
                    }
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
                Err(e) => return Err(LauncherError::io(path, e)),
            }
        }
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        self.heartbeat.abort();
        match std::fs::read_to_string(&self.path) {
            Ok(owner) if owner == self.token => {
                let _ = std::fs::remove_file(&self.path);
            }
            Ok(_) => warn!("Lock {:?} was taken over, leaving it in place", self.path),
            Err(_) => {}
        }
    }
}

/// Rewrite the token periodically so waiters never see a live lock as stale.
async fn keep_fresh(path: PathBuf, token: String, interval: Duration) {
    loop {
        tokio::time::sleep(interval).await;
        match tokio::fs::read_to_string(&path).await {
            Ok(owner) if owner == token => {
                if let Err(e) = tokio::fs::write(&path, &token).await {
                    warn!("Failed to refresh lock {:?}: {}", path, e);
                }
            }
            _ => {
                warn!("Lock {:?} is no longer ours", path);
                return;
            }
        }
    }
}

async fn is_stale(path: &Path, stale_after: Duration) -> bool {
    let Ok(meta) = tokio::fs::metadata(path).await else {
        return false;
    };
    meta.modified()
        .ok()
        .and_then(|m| SystemTime::now().duration_since(m).ok())
        .is_some_and(|age| age > stale_after)
}
