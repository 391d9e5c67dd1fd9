// ─── Profile Update Check ───
// Before each launch the remote descriptor is diffed against the snapshot
// taken at install time and only the difference is applied.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::installer::{ProfileInstaller, INSTALL_LOCK_TIMEOUT};
use super::model::{lock_path, FileCategory, Profile, ProfileDescriptor, ProfileFile};
use super::options::{apply_options, option_overrides};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::locks::LockFile;
use crate::core::servers::upsert_server;
use crate::core::state::AppState;
use crate::core::storage::{read_json, write_json_atomic};

/// Entry-level difference between two descriptors, keyed by destination.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ProfileDiff {
    pub added: Vec<(FileCategory, ProfileFile)>,
    pub changed: Vec<(FileCategory, ProfileFile)>,
    pub removed: Vec<(FileCategory, ProfileFile)>,
    /// Option keys whose rendered value is new or different.
    pub options: BTreeMap<String, String>,
    pub version_changed: bool,
    pub server_changed: bool,
}

impl ProfileDiff {
    pub fn between(old: &ProfileDescriptor, new: &ProfileDescriptor) -> LauncherResult<Self> {
        let old_files = keyed_files(old)?;
        let new_files = keyed_files(new)?;

        let mut diff = ProfileDiff::default();
        for (dest, (category, file)) in &new_files {
            match old_files.get(dest) {
                None => diff.added.push((*category, file.clone())),
                Some((_, previous)) if previous.url != file.url || previous.sha1 != file.sha1 => {
                    diff.changed.push((*category, file.clone()))
                }
                Some(_) => {}
            }
        }
        for (dest, (category, file)) in &old_files {
            if !new_files.contains_key(dest) {
                diff.removed.push((*category, file.clone()));
            }
        }

        let old_options = option_overrides(old);
        diff.options = option_overrides(new)
            .into_iter()
            .filter(|(key, value)| old_options.get(key) != Some(value))
            .collect();

        diff.version_changed = old.version_base != new.version_base || old.loader != new.loader;
        diff.server_changed = old.server != new.server;
        Ok(diff)
    }
}

fn keyed_files(
    descriptor: &ProfileDescriptor,
) -> LauncherResult<BTreeMap<PathBuf, (FileCategory, ProfileFile)>> {
    let mut files = BTreeMap::new();
    for category in FileCategory::ALL {
        for file in descriptor.files(category) {
            files.insert(file.destination(category)?, (category, file.clone()));
        }
    }
    Ok(files)
}

/// What an update check actually did.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct AppliedChanges {
    pub downloaded: Vec<PathBuf>,
    /// Entries gone from the remote profile; their files may still exist.
    pub removed: Vec<PathBuf>,
    pub deleted: Vec<PathBuf>,
    pub options: Vec<String>,
    pub reinstalled_version: Option<String>,
    pub server_updated: bool,
}

impl AppliedChanges {
    pub fn is_empty(&self) -> bool {
        *self == AppliedChanges::default()
    }
}

pub struct ProfileUpdateChecker {
    state: Arc<AppState>,
    installer: ProfileInstaller,
}

impl ProfileUpdateChecker {
    pub fn new(state: Arc<AppState>) -> Self {
        Self {
            installer: ProfileInstaller::new(state.clone()),
            state,
        }
    }

    /// Bring `profile` up to date with its remote descriptor.
    ///
    /// `profile` is only modified once every step succeeded.
    pub async fn check_and_apply(&self, profile: &mut Profile) -> LauncherResult<AppliedChanges> {
        let _guard = self.state.install_locks().lock(&profile.id).await;
        let _lock = LockFile::acquire(&lock_path(&profile.root), INSTALL_LOCK_TIMEOUT).await?;

        let remote = self
            .installer
            .fetch_descriptor(&profile.host, Some(&profile.id))
            .await?;
        let snapshot_path = profile.snapshot_path();
        let previous = match read_json::<ProfileDescriptor>(&snapshot_path).await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) | Err(LauncherError::Json(_)) => {
                warn!("No usable snapshot for {}, treating every file as new", profile.id);
                bare_descriptor(profile)
            }
            Err(e) => return Err(e),
        };
        if previous == remote {
            debug!("Profile {} is current", profile.id);
            return Ok(AppliedChanges::default());
        }

        let diff = ProfileDiff::between(&previous, &remote)?;
        let mut applied = AppliedChanges::default();
        let mut updated = profile.clone();

        if diff.version_changed {
            info!(
                "Profile {} moved to {} ({:?})",
                profile.id, remote.version_base, remote.loader
            );
            let prepared = self
                .installer
                .install_version_stack(&profile.root, &remote)
                .await?;
            updated.version_base = remote.version_base.clone();
            updated.version_id = prepared.merged.id.clone();
            updated.loader = remote.loader.clone();
            applied.reinstalled_version = Some(prepared.merged.id);
        }

        let mut fetch = Vec::new();
        for (category, file) in diff.added.iter().chain(&diff.changed) {
            let dest = profile.root.join(file.destination(*category)?);
            // Unhashed files are trusted when present, so a changed URL needs
            // the old copy gone first.
            if file.sha1.is_none() {
                match tokio::fs::remove_file(&dest).await {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(LauncherError::io(&dest, e)),
                }
            }
            applied.downloaded.push(dest);
            fetch.push((*category, file.clone()));
        }
        self.installer.sync_files(&profile.root, fetch).await?;

        for (category, file) in &diff.removed {
            let dest = profile.root.join(file.destination(*category)?);
            if self.state.settings.remove_orphaned_files {
                match tokio::fs::remove_file(&dest).await {
                    Ok(()) => applied.deleted.push(dest.clone()),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(LauncherError::io(&dest, e)),
                }
            }
            applied.removed.push(dest);
        }

        if !diff.options.is_empty() {
            apply_options(&profile.options_path(), &diff.options).await?;
            applied.options = diff.options.keys().cloned().collect();
        }

        if let Some(name) = &remote.name {
            updated.name = name.clone();
        }
        if diff.server_changed {
            if let Some(server) = &remote.server {
                upsert_server(
                    &profile.servers_file(),
                    &server.host,
                    server.display_name(&updated.name),
                    server.auto_connect,
                )
                .await?;
                applied.server_updated = true;
            }
            updated.server = remote.server.clone();
        }

        write_json_atomic(&snapshot_path, &remote).await?;
        updated.updated_at = Some(Utc::now());
        self.installer.registry().register(&updated).await?;
        *profile = updated;

        info!(
            "Profile {} updated: {} downloaded, {} removed, {} option(s)",
            profile.id,
            applied.downloaded.len(),
            applied.removed.len(),
            applied.options.len()
        );
        Ok(applied)
    }

    /// Pre-launch variant: any failure becomes a warning and the installed
    /// state is launched as-is.
    pub async fn check_before_launch(&self, profile: &mut Profile) -> Option<AppliedChanges> {
        match self.check_and_apply(profile).await {
            Ok(applied) => Some(applied),
            Err(e) => {
                warn!(
                    "Update check for profile {} failed, launching installed state: {}",
                    profile.id, e
                );
                None
            }
        }
    }
}

/// Stand-in for a lost snapshot: what the registry still knows.
fn bare_descriptor(profile: &Profile) -> ProfileDescriptor {
    ProfileDescriptor {
        id: Some(profile.id.clone()),
        name: Some(profile.name.clone()),
        description: None,
        version_base: profile.version_base.clone(),
        loader: profile.loader.clone(),
        mods: Vec::new(),
        shaders: Vec::new(),
        resourcepacks: Vec::new(),
        options: BTreeMap::new(),
        server: profile.server.clone(),
    }
}
