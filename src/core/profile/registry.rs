use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::model::Profile;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::storage::{read_json, write_json_atomic};

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    profiles: Vec<Profile>,
}

/// Local list of installed profiles (`profile_registry.json`).
#[derive(Debug, Clone)]
pub struct ProfileRegistry {
    path: PathBuf,
}

impl ProfileRegistry {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub async fn list(&self) -> LauncherResult<Vec<Profile>> {
        match read_json::<RegistryFile>(&self.path).await {
            Ok(file) => Ok(file.unwrap_or_default().profiles),
            Err(LauncherError::Json(e)) => {
                warn!("Corrupt profile registry at {:?}: {}", self.path, e);
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    pub async fn get(&self, id: &str) -> LauncherResult<Profile> {
        self.list()
            .await?
            .into_iter()
            .find(|p| p.id == id)
            .ok_or_else(|| LauncherError::NotFound(format!("profile '{}'", id)))
    }

    /// Insert or replace by id.
    ///
    /// Callers hold the profile's install lock; the registry itself is
    /// rewritten atomically so concurrent readers see either version.
    pub async fn register(&self, profile: &Profile) -> LauncherResult<()> {
        let mut profiles = self.list().await?;
        match profiles.iter_mut().find(|p| p.id == profile.id) {
            Some(existing) => *existing = profile.clone(),
            None => profiles.push(profile.clone()),
        }
        profiles.sort_by(|a, b| a.id.cmp(&b.id));
        write_json_atomic(&self.path, &RegistryFile { profiles }).await?;
        debug!("Registered profile {}", profile.id);
        Ok(())
    }

    pub async fn remove(&self, id: &str) -> LauncherResult<bool> {
        let mut profiles = self.list().await?;
        let before = profiles.len();
        profiles.retain(|p| p.id != id);
        if profiles.len() == before {
            return Ok(false);
        }
        write_json_atomic(&self.path, &RegistryFile { profiles }).await?;
        Ok(true)
    }
}
