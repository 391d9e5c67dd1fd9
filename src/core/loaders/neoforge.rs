use async_trait::async_trait;
use tracing::info;

use super::context::InstallContext;
use super::forge::run_installer_jar;
use super::installer::{LoaderInstallResult, LoaderInstaller};
use crate::core::error::LauncherResult;
use crate::core::maven::NEOFORGE_MAVEN;

/// NeoForge ships the same installer contract as Forge, under its own
/// coordinates. Its versions already encode the Minecraft release.
pub struct NeoForgeInstaller {
    maven_base: String,
}

impl NeoForgeInstaller {
    pub fn new() -> Self {
        Self {
            maven_base: NEOFORGE_MAVEN.to_string(),
        }
    }

    pub fn with_maven(mut self, base: &str) -> Self {
        self.maven_base = base.trim_end_matches('/').to_string();
        self
    }

    pub fn installer_url(&self, loader_version: &str) -> String {
        format!(
            "{}/net/neoforged/neoforge/{}/neoforge-{}-installer.jar",
            self.maven_base, loader_version, loader_version
        )
    }
}

impl Default for NeoForgeInstaller {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LoaderInstaller for NeoForgeInstaller {
    async fn install(&self, ctx: InstallContext<'_>) -> LauncherResult<LoaderInstallResult> {
        info!(
            "Installing NeoForge {} for MC {}",
            ctx.loader_version, ctx.minecraft_version
        );
        let url = self.installer_url(ctx.loader_version);
        let candidates = vec![format!("neoforge-{}", ctx.loader_version)];
        run_installer_jar(&ctx, "neoforge", &url, &candidates).await
    }
}
