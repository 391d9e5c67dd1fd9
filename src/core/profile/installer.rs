use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use super::model::{lock_path, snapshot_path, FileCategory, Profile, ProfileDescriptor, ProfileFile};
use super::options::{apply_options, option_overrides};
use super::registry::ProfileRegistry;
use crate::core::downloader::DownloadEntry;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::launch::PreparedVersion;
use crate::core::loaders::{InstallContext, Installer};
use crate::core::locks::LockFile;
use crate::core::servers::upsert_server;
use crate::core::state::AppState;
use crate::core::storage::{create_dir_safe, read_json, write_json_atomic};

/// Loader installers can take a while; a second launcher waits this long.
pub const INSTALL_LOCK_TIMEOUT: Duration = Duration::from_secs(20 * 60);

const API_KEY_HEADER: &str = "X-API-Key";

/// Fallback Java major when a base version doesn't declare one.
const DEFAULT_JAVA_MAJOR: u32 = 8;

/// Materializes remote profiles: base version, optional loader, content
/// files, options and server entry.
#[derive(Clone)]
pub struct ProfileInstaller {
    state: Arc<AppState>,
}

impl ProfileInstaller {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    pub fn registry(&self) -> ProfileRegistry {
        ProfileRegistry::new(self.state.paths.registry_file())
    }

    pub fn profile_root(&self, profile_id: &str) -> PathBuf {
        self.state.paths.profiles_dir().join(profile_id)
    }

    /// Every profile `host` publishes.
    pub async fn fetch_descriptors(&self, host: &str) -> LauncherResult<Vec<ProfileDescriptor>> {
        let url = self.state.settings.profile_url(host);
        info!("Fetching profiles from {}", url);
        let mut request = self.state.http_client.get(&url);
        if let Some(key) = self.state.settings.profile_api_key.as_deref() {
            request = request.header(API_KEY_HEADER, key);
        }
        let resp = request.send().await?;
        if !resp.status().is_success() {
            return Err(LauncherError::DownloadFailed {
                url,
                status: resp.status().as_u16(),
            });
        }
        let body = resp.text().await?;
        ProfileDescriptor::parse_document(&body)
    }

    /// The profile with id `profile_id`, or the first one published.
    pub async fn fetch_descriptor(
        &self,
        host: &str,
        profile_id: Option<&str>,
    ) -> LauncherResult<ProfileDescriptor> {
        let profiles = self.fetch_descriptors(host).await?;
        let found = match profile_id {
            Some(id) => profiles.into_iter().find(|p| p.profile_id(host) == id),
            None => profiles.into_iter().next(),
        };
        found.ok_or_else(|| {
            LauncherError::NotFound(format!(
                "profile '{}' on {}",
                profile_id.unwrap_or_default(),
                host
            ))
        })
    }

    /// Install the first profile `host` publishes.
    pub async fn install(&self, host: &str) -> LauncherResult<Profile> {
        self.install_profile(host, None).await
    }

    pub async fn install_profile(
        &self,
        host: &str,
        profile_id: Option<&str>,
    ) -> LauncherResult<Profile> {
        let descriptor = self.fetch_descriptor(host, profile_id).await?;
        let id = descriptor.profile_id(host);
        let root = self.profile_root(&id);

        let _guard = self.state.install_locks().lock(&id).await;
        let _lock = LockFile::acquire(&lock_path(&root), INSTALL_LOCK_TIMEOUT).await?;

        if let Some(profile) = self.completed_install(&id, &descriptor).await? {
            info!("Profile {} is already installed and current", id);
            return Ok(profile);
        }

        self.install_locked(host, &id, &root, descriptor).await
    }

    /// A registered profile whose snapshot equals `descriptor`, e.g. one a
    /// concurrent caller finished while we waited for the lock.
    async fn completed_install(
        &self,
        id: &str,
        descriptor: &ProfileDescriptor,
    ) -> LauncherResult<Option<Profile>> {
        let Ok(profile) = self.registry().get(id).await else {
            return Ok(None);
        };
        let snapshot: Option<ProfileDescriptor> = read_json(&profile.snapshot_path()).await.unwrap_or(None);
        Ok(snapshot.filter(|s| s == descriptor).map(|_| profile))
    }

    async fn install_locked(
        &self,
        host: &str,
        id: &str,
        root: &Path,
        descriptor: ProfileDescriptor,
    ) -> LauncherResult<Profile> {
        let progress = self.state.downloader.progress();
        info!("Installing profile {} from {}", id, host);

        let (mods, shaders, packs, config) = (
            root.join(FileCategory::Mod.dir_name()),
            root.join(FileCategory::Shader.dir_name()),
            root.join(FileCategory::ResourcePack.dir_name()),
            root.join("config"),
        );
        tokio::try_join!(
            create_dir_safe(&mods),
            create_dir_safe(&shaders),
            create_dir_safe(&packs),
            create_dir_safe(&config),
        )?;

        progress.report(format!("Installing {}", descriptor.version_base), Some(0.0));
        let prepared = self.install_version_stack(root, &descriptor).await?;

        progress.report("Downloading profile files", Some(0.7));
        let files = FileCategory::ALL
            .into_iter()
            .flat_map(|c| descriptor.files(c).iter().map(move |f| (c, f.clone())))
            .collect();
        self.sync_files(root, files).await?;

        apply_options(&root.join("options.txt"), &option_overrides(&descriptor)).await?;
        let name = descriptor.name.clone().unwrap_or_else(|| id.to_string());
        if let Some(server) = &descriptor.server {
            upsert_server(
                &root.join("servers.dat"),
                &server.host,
                server.display_name(&name),
                server.auto_connect,
            )
            .await?;
        }

        write_json_atomic(&snapshot_path(root), &descriptor).await?;
        let profile = Profile {
            id: id.to_string(),
            name,
            host: host.to_string(),
            root: root.to_path_buf(),
            version_base: descriptor.version_base.clone(),
            version_id: prepared.merged.id.clone(),
            loader: descriptor.loader.clone(),
            server: descriptor.server.clone(),
            installed_at: Utc::now(),
            updated_at: None,
        };
        self.registry().register(&profile).await?;

        progress.report(format!("{} installed", profile.name), Some(1.0));
        info!("Profile {} installed (launches {})", id, profile.version_id);
        Ok(profile)
    }

    /// Base version into the shared roots, then the loader (if any) into the
    /// profile, then the loader's child version. Returns the version to launch.
    pub(crate) async fn install_version_stack(
        &self,
        root: &Path,
        descriptor: &ProfileDescriptor,
    ) -> LauncherResult<PreparedVersion> {
        let state = &self.state;
        let base = state
            .preparer(None)
            .prepare(&descriptor.version_base, &state.platform)
            .await?;

        let Some(loader) = &descriptor.loader else {
            return Ok(base);
        };

        let shared_versions = state.paths.versions_dir();
        let ctx = InstallContext {
            minecraft_version: &descriptor.version_base,
            loader_version: &loader.version,
            profile_dir: root,
            shared_versions_dir: &shared_versions,
            downloader: &state.downloader,
            java: state.java.as_ref(),
            java_major: base.merged.java_major.unwrap_or(DEFAULT_JAVA_MAJOR),
        };
        let installed = Installer::new(loader.loader_type, state.http_client.clone())
            .install(ctx)
            .await?;

        state
            .preparer(Some(root))
            .prepare(&installed.version_id, &state.platform)
            .await
    }

    /// Download `files` under `root`. Returns how many were transferred.
    ///
    /// A failed mod, or any entry marked `required`, aborts; other failures
    /// are logged and skipped.
    pub(crate) async fn sync_files(
        &self,
        root: &Path,
        files: Vec<(FileCategory, ProfileFile)>,
    ) -> LauncherResult<usize> {
        let mut entries = Vec::with_capacity(files.len());
        let mut blocking = Vec::new();
        for (category, file) in &files {
            let dest = root.join(file.destination(*category)?);
            if *category == FileCategory::Mod || file.required {
                blocking.push(dest.clone());
            }
            entries.push(DownloadEntry::new(&file.url, dest, file.sha1.as_deref()));
        }

        let report = self.state.downloader.download_batch("profile files", entries).await;
        let mut fatal = None;
        for (entry, error) in report.failed {
            if fatal.is_none() && blocking.contains(&entry.dest) {
                fatal = Some(error);
            } else {
                warn!("Skipping optional file {:?}: {}", entry.dest, error);
            }
        }
        match fatal {
            Some(error) => Err(error),
            None => Ok(report.downloaded),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::auth::{Session, StaticSession};
    use crate::core::platform::Platform;
    use crate::core::servers::list_servers;
    use crate::core::state::{LauncherPaths, LauncherSettings};
    use crate::core::test_support::{scratch_dir, sha1_hex, test_client, TestServer};

    /// State rooted at `root` that fetches profiles from `server`.
    pub(crate) fn test_state(root: &Path, server: &TestServer) -> Arc<AppState> {
        let settings = LauncherSettings {
            profile_endpoint: "http://{host}/profiles.json".into(),
            profile_api_key: Some("secret".into()),
            max_download_attempts: 1,
            ..LauncherSettings::default()
        };
        Arc::new(
            AppState::new(LauncherPaths::new(root.to_path_buf()), settings, test_client())
                .with_platform(Platform::new("linux", "x86_64"))
                .with_session(Arc::new(StaticSession(Session::offline("Steve"))))
                .with_catalog_url(&server.url("/catalog.json")),
        )
    }

    /// A locally cached base version `1.0` whose client jar `server` serves.
    pub(crate) fn seed_base_version(root: &Path, server: &TestServer) {
        let client = b"client".to_vec();
        server.serve("/client.jar", client.clone());
        let descriptor = serde_json::json!({
            "id": "1.0", "mainClass": "net.minecraft.client.main.Main",
            "downloads": {"client": {"url": server.url("/client.jar"), "sha1": sha1_hex(&client)}}
        });
        let path = root.join("versions/1.0/1.0.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, serde_json::to_vec(&descriptor).unwrap()).unwrap();
    }

    pub(crate) fn profile_json(server: &TestServer, extra_mod: Option<&str>) -> serde_json::Value {
        let mut mods = vec![serde_json::json!({
            "url": server.url("/files/sodium.jar"),
            "name": "sodium.jar",
            "sha1": sha1_hex(b"sodium"),
            "required": true
        })];
        if let Some(name) = extra_mod {
            mods.push(serde_json::json!({"url": server.url(&format!("/files/{}", name)), "name": name}));
        }
        serde_json::json!({
            "id": "smp",
            "name": "Example SMP",
            "version_base": "1.0",
            "mods": mods,
            "shaders": [{"url": server.url("/files/bsl.zip"), "name": "bsl.zip"}],
            "resourcepacks": [{"url": server.url("/files/faithful.zip"), "name": "faithful.zip"}],
            "options": {"renderDistance": 12, "lang": "en_us"},
            "server": {"host": "play.example.net", "auto_connect": true}
        })
    }

    pub(crate) fn serve_files(server: &TestServer) {
        server.serve("/files/sodium.jar", b"sodium".to_vec());
        server.serve("/files/bsl.zip", b"bsl".to_vec());
        server.serve("/files/faithful.zip", b"faithful".to_vec());
        server.serve("/files/lithium.jar", b"lithium".to_vec());
    }

    #[tokio::test]
    async fn installs_every_part_of_a_profile() {
        let server = TestServer::start().await;
        let root = scratch_dir("profile-install");
        seed_base_version(&root, &server);
        serve_files(&server);
        server.serve("/profiles.json", serde_json::to_vec(&profile_json(&server, None)).unwrap());
        let state = test_state(&root, &server);

        let profile = ProfileInstaller::new(state.clone())
            .install(&server.host())
            .await
            .unwrap();

        assert_eq!(profile.id, "smp");
        assert_eq!(profile.version_id, "1.0");
        assert_eq!(profile.root, root.join("profiles/smp"));
        assert_eq!(std::fs::read(profile.root.join("mods/sodium.jar")).unwrap(), b"sodium");
        assert!(profile.root.join("shaderpacks/bsl.zip").is_file());
        assert!(profile.root.join("resourcepacks/faithful.zip").is_file());
        assert!(profile.root.join("config").is_dir());
        assert!(root.join("versions/1.0/1.0.jar").is_file());

        let options = std::fs::read_to_string(profile.options_path()).unwrap();
        assert!(options.contains("renderDistance:12\n"));
        assert!(options.contains("resourcePacks:[\"vanilla\",\"file/faithful.zip\"]\n"));

        let servers = list_servers(&profile.servers_file()).await.unwrap();
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].ip, "play.example.net");
        assert_eq!(servers[0].name, "Example SMP");

        let registered = ProfileInstaller::new(state).registry().get("smp").await.unwrap();
        assert_eq!(registered, profile);
        assert!(!root.join("profiles/smp/.profile/install.lock").exists());

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn concurrent_installs_of_one_profile_run_once() {
        let server = TestServer::start().await;
        let root = scratch_dir("profile-concurrent");
        seed_base_version(&root, &server);
        serve_files(&server);
        server.serve("/profiles.json", serde_json::to_vec(&profile_json(&server, None)).unwrap());
        let state = test_state(&root, &server);

        let host = server.host();
        let a = tokio::spawn({
            let installer = ProfileInstaller::new(state.clone());
            let host = host.clone();
            async move { installer.install(&host).await }
        });
        let b = tokio::spawn({
            let installer = ProfileInstaller::new(state.clone());
            let host = host.clone();
            async move { installer.install(&host).await }
        });
        let (a, b) = (a.await.unwrap().unwrap(), b.await.unwrap().unwrap());

        assert_eq!(a, b);
        assert_eq!(server.hits("/files/sodium.jar"), 1);
        assert_eq!(server.hits("/profiles.json"), 2);

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn bad_profiles_abort_before_touching_disk() {
        let server = TestServer::start().await;
        let root = scratch_dir("profile-malformed");
        server.serve("/profiles.json", br#"{"id":"smp","mods":[]}"#.to_vec());
        let state = test_state(&root, &server);

        let result = ProfileInstaller::new(state).install(&server.host()).await;
        assert!(matches!(result, Err(LauncherError::MalformedProfile(_))));
        assert!(!root.join("profiles").exists());

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn missing_required_mod_fails_the_install() {
        let server = TestServer::start().await;
        let root = scratch_dir("profile-missing-mod");
        seed_base_version(&root, &server);
        serve_files(&server);
        server.serve_status("/files/sodium.jar", 404);
        server.serve_status("/files/bsl.zip", 404);
        server.serve("/profiles.json", serde_json::to_vec(&profile_json(&server, None)).unwrap());
        let state = test_state(&root, &server);

        let result = ProfileInstaller::new(state.clone()).install(&server.host()).await;
        assert!(matches!(result, Err(LauncherError::DownloadFailed { status: 404, .. })));
        assert!(ProfileInstaller::new(state).registry().get("smp").await.is_err());

        let _ = std::fs::remove_dir_all(&root);
    }
}
