// ─── Java Runtime ───
// Runtime provisioning is out of scope; launching asks a resolver for an
// executable that satisfies the descriptor's required major version.

mod probe;

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::core::error::{LauncherError, LauncherResult};

pub use probe::{is_java_compatible_major, parse_major_version, probe_java, JavaInstallation};

#[async_trait]
pub trait JavaResolver: Send + Sync {
    async fn resolve_java_executable(&self, required_major: u32) -> LauncherResult<PathBuf>;
}

/// Looks at an explicit override, then `JAVA_HOME`, then `PATH`.
#[derive(Debug, Clone, Default)]
pub struct SystemJava {
    override_path: Option<PathBuf>,
}

impl SystemJava {
    pub fn new(override_path: Option<PathBuf>) -> Self {
        Self { override_path }
    }

    fn candidates(&self) -> Vec<PathBuf> {
        let mut candidates = Vec::new();
        if let Some(path) = &self.override_path {
            candidates.push(path.clone());
        }
        if let Some(home) = std::env::var_os("JAVA_HOME") {
            candidates.push(PathBuf::from(home).join("bin").join(java_exe()));
        }
        if let Some(path) = std::env::var_os("PATH") {
            candidates.extend(std::env::split_paths(&path).map(|dir| dir.join(java_exe())));
        }
        candidates
    }
}

#[async_trait]
impl JavaResolver for SystemJava {
    async fn resolve_java_executable(&self, required_major: u32) -> LauncherResult<PathBuf> {
        for candidate in self.candidates() {
            if !candidate.is_file() {
                continue;
            }
            let Some(installation) = probe_java(&candidate).await else {
                continue;
            };
            // An explicit override is trusted even if its major looks off.
            let forced = self.override_path.as_ref() == Some(&candidate);
            if forced || is_java_compatible_major(installation.major, required_major) {
                info!(
                    "Using Java {} at {:?}",
                    installation.version, installation.path
                );
                return Ok(installation.path);
            }
            debug!(
                "Skipping Java {} at {:?} (need {})",
                installation.version, candidate, required_major
            );
        }
        Err(LauncherError::JavaNotFound(required_major))
    }
}

/// Fixed executable, e.g. a runtime managed by the embedding application.
#[derive(Debug, Clone)]
pub struct FixedJava(pub PathBuf);

#[async_trait]
impl JavaResolver for FixedJava {
    async fn resolve_java_executable(&self, _required_major: u32) -> LauncherResult<PathBuf> {
        Ok(self.0.clone())
    }
}

fn java_exe() -> &'static str {
    if cfg!(windows) {
        "java.exe"
    } else {
        "java"
    }
}
