use std::path::{Path, PathBuf};
use std::sync::Arc;

use reqwest::Client;
use tracing::info;

use super::paths::LauncherPaths;
use super::settings::LauncherSettings;
use crate::core::assets::AssetManager;
use crate::core::auth::{Session, SessionProvider, StaticSession};
use crate::core::downloader::Downloader;
use crate::core::error::LauncherResult;
use crate::core::http::build_http_client;
use crate::core::java::{JavaResolver, SystemJava};
use crate::core::launch::{
    spawn_game, LaunchCommandBuilder, LaunchContext, PreparedVersion, ServerTarget,
    VersionPreparer,
};
use crate::core::libraries::LibraryResolver;
use crate::core::locks::KeyedLocks;
use crate::core::natives::NativeExtractor;
use crate::core::platform::Platform;
use crate::core::progress::{CancelToken, ProgressSender};
use crate::core::version::ManifestResolver;

/// Java 8 is the floor for descriptors that don't declare a runtime.
const FALLBACK_JAVA_MAJOR: u32 = 8;

/// Wiring shared by every install and launch: paths, settings, the HTTP
/// client and download pool, and the collaborators supplied by the embedder.
pub struct AppState {
    pub paths: LauncherPaths,
    pub settings: LauncherSettings,
    pub http_client: Client,
    pub downloader: Downloader,
    pub platform: Platform,
    pub java: Arc<dyn JavaResolver>,
    pub session: Arc<dyn SessionProvider>,
    catalog_url: Option<String>,
    resources_url: Option<String>,
    natives_locks: KeyedLocks,
    install_locks: KeyedLocks,
}

impl AppState {
    pub fn new(paths: LauncherPaths, settings: LauncherSettings, http_client: Client) -> Self {
        let downloader = Downloader::new(http_client.clone())
            .with_concurrency(settings.download_concurrency)
            .with_retry(settings.retry_policy());
        let java: Arc<dyn JavaResolver> = Arc::new(SystemJava::new(settings.java_path.clone()));
        Self {
            paths,
            settings,
            http_client,
            downloader,
            platform: Platform::current(),
            java,
            session: Arc::new(StaticSession(Session::offline("Player"))),
            catalog_url: None,
            resources_url: None,
            natives_locks: KeyedLocks::new(),
            install_locks: KeyedLocks::new(),
        }
    }

    /// Settings from `launcher_settings.json` (defaults when absent).
    pub fn load(paths: LauncherPaths) -> LauncherResult<Self> {
        let settings = LauncherSettings::load(&paths.settings_file());
        let client = build_http_client()?;
        info!("Launcher data directory: {:?}", paths.data_dir());
        Ok(Self::new(paths, settings, client))
    }

    pub fn with_java(mut self, java: Arc<dyn JavaResolver>) -> Self {
        self.java = java;
        self
    }

    pub fn with_session(mut self, session: Arc<dyn SessionProvider>) -> Self {
        self.session = session;
        self
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn with_catalog_url(mut self, url: &str) -> Self {
        self.catalog_url = Some(url.to_string());
        self
    }

    pub fn with_resources_url(mut self, url: &str) -> Self {
        self.resources_url = Some(url.to_string());
        self
    }

    pub fn with_progress(mut self, progress: ProgressSender) -> Self {
        self.downloader = self.downloader.with_progress(progress);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.downloader = self.downloader.with_cancel(cancel);
        self
    }

    /// Per-profile install serialization inside this process.
    pub fn install_locks(&self) -> &KeyedLocks {
        &self.install_locks
    }

    /// A version preparer over the shared roots. With `profile_root`, that
    /// profile's loader output (`versions/`, `libraries/`) is searched too,
    /// ahead of the shared versions.
    pub fn preparer(&self, profile_root: Option<&Path>) -> VersionPreparer {
        let mut manifests =
            ManifestResolver::new(self.http_client.clone(), self.paths.versions_dir());
        if let Some(url) = &self.catalog_url {
            manifests = manifests.with_catalog_url(url);
        }
        let mut libraries =
            LibraryResolver::new(self.paths.libraries_dir(), self.paths.versions_dir());
        let mut assets = AssetManager::new(self.downloader.clone())
            .with_required_prefixes(self.settings.required_asset_prefixes.clone());
        if let Some(url) = &self.resources_url {
            assets = assets.with_resources_url(url);
        }
        if let Some(root) = profile_root {
            manifests = manifests.with_priority_root(root.join("versions"));
            libraries = libraries.with_extra_roots(root.join("libraries"), root.join("versions"));
        }

        VersionPreparer {
            manifests,
            libraries,
            assets,
            natives: NativeExtractor::new(self.paths.natives_dir())
                .with_locks(self.natives_locks.clone()),
            downloader: self.downloader.clone(),
            assets_dir: self.paths.assets_dir(),
        }
    }

    /// Launch context for a prepared version, filled from settings and the
    /// current session.
    pub async fn launch_context(
        &self,
        prepared: &PreparedVersion,
        game_dir: PathBuf,
        server: Option<ServerTarget>,
        auto_connect: bool,
    ) -> LauncherResult<LaunchContext> {
        let session = self.session.current_session().await?;
        let mut ctx = LaunchContext::new(self.platform.clone(), session);
        ctx.classpath = prepared.classpath.clone();
        ctx.module_path = prepared.module_path.clone();
        ctx.natives_dir = prepared.natives_dir.clone();
        ctx.game_dir = game_dir;
        ctx.assets_root = self.paths.assets_dir();
        ctx.libraries_dir = self.paths.libraries_dir();
        ctx.launcher_name = self.settings.launcher_name.clone();
        ctx.launcher_version = self.settings.launcher_version.clone();
        ctx.window = self.settings.window_size();
        ctx.min_memory_mb = self.settings.min_memory_mb;
        ctx.max_memory_mb = self.settings.max_memory_mb.max(self.settings.min_memory_mb);
        ctx.server = server;
        ctx.auto_connect = auto_connect;
        Ok(ctx)
    }

    /// Build the argument vector and start the game.
    pub async fn spawn(
        &self,
        prepared: &PreparedVersion,
        ctx: LaunchContext,
    ) -> LauncherResult<tokio::process::Child> {
        let java_major = prepared.merged.java_major.unwrap_or(FALLBACK_JAVA_MAJOR);
        let java_bin = self.java.resolve_java_executable(java_major).await?;
        let game_dir = ctx.game_dir.clone();
        let args = LaunchCommandBuilder::new(ctx).build(&prepared.merged)?;
        spawn_game(&java_bin, &args, &game_dir, &prepared.natives_dir)
    }

    /// Prepare and launch a plain version in the default game directory.
    pub async fn launch_version(
        &self,
        version_id: &str,
        server: Option<ServerTarget>,
    ) -> LauncherResult<tokio::process::Child> {
        let prepared = self.preparer(None).prepare(version_id, &self.platform).await?;
        let auto_connect = server.is_some();
        let ctx = self
            .launch_context(&prepared, self.paths.default_game_dir(), server, auto_connect)
            .await?;
        self.spawn(&prepared, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_support::{scratch_dir, sha1_hex, test_client, TestServer};

    #[tokio::test]
    async fn launch_context_carries_settings_and_session() {
        let server = TestServer::start().await;
        let root = scratch_dir("app-state");
        let client = b"client".to_vec();
        server.serve("/client.jar", client.clone());
        let descriptor = serde_json::json!({
            "id": "1.0", "mainClass": "net.minecraft.client.main.Main",
            "downloads": {"client": {"url": server.url("/client.jar"), "sha1": sha1_hex(&client)}},
            "arguments": {"game": ["--username", "${auth_player_name}", "--width", "${resolution_width}"]}
        });
        let path = root.join("versions/1.0/1.0.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, serde_json::to_vec(&descriptor).unwrap()).unwrap();

        let settings = LauncherSettings {
            launcher_name: "TestLauncher".into(),
            max_memory_mb: 3072,
            ..LauncherSettings::default()
        };
        let state = AppState::new(LauncherPaths::new(root.clone()), settings, test_client())
            .with_platform(Platform::new("linux", "x86_64"))
            .with_session(Arc::new(StaticSession(Session::offline("Alex"))));

        let prepared = state
            .preparer(None)
            .prepare("1.0", &state.platform)
            .await
            .unwrap();
        let ctx = state
            .launch_context(&prepared, root.join("game"), None, false)
            .await
            .unwrap();
        assert_eq!(ctx.launcher_name, "TestLauncher");
        assert_eq!(ctx.max_memory_mb, 3072);
        assert_eq!(ctx.session.player_name, "Alex");

        let args = LaunchCommandBuilder::new(ctx).build(&prepared.merged).unwrap();
        assert!(args.contains(&"-Xmx3072M".to_string()));
        let user = args.iter().position(|a| a == "--username").unwrap();
        assert_eq!(args[user + 1], "Alex");
        assert!(!args.contains(&"--width".to_string()));

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn profile_roots_shadow_shared_versions() {
        let server = TestServer::start().await;
        server.serve_status("/catalog.json", 404);
        let root = scratch_dir("app-state-roots");
        let profile = root.join("profiles/smp");
        let write = |dir: &Path, id: &str, json: serde_json::Value| {
            let path = ManifestResolver::descriptor_path(dir, id);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, serde_json::to_vec(&json).unwrap()).unwrap();
        };
        write(&root.join("versions"), "1.0", serde_json::json!({"id": "1.0", "mainClass": "Vanilla"}));
        write(
            &profile.join("versions"),
            "1.0-loader",
            serde_json::json!({"id": "1.0-loader", "inheritsFrom": "1.0", "mainClass": "Loader"}),
        );

        let state = AppState::new(
            LauncherPaths::new(root.clone()),
            LauncherSettings::default(),
            test_client(),
        )
        .with_catalog_url(&server.url("/catalog.json"));

        let merged = state
            .preparer(Some(&profile))
            .manifests
            .resolve("1.0-loader")
            .await
            .unwrap();
        assert_eq!(merged.chain, ["1.0", "1.0-loader"]);
        assert_eq!(merged.main_class, "Loader");
        assert!(state.preparer(None).manifests.resolve("1.0-loader").await.is_err());

        let _ = std::fs::remove_dir_all(&root);
    }
}
