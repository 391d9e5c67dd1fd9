use async_trait::async_trait;
use tracing::info;

use super::context::InstallContext;
use super::fabric::{install_meta_profile, meta_profile_url};
use super::installer::{LoaderInstallResult, LoaderInstaller};
use crate::core::error::LauncherResult;

pub const QUILT_META_BASE: &str = "https://meta.quiltmc.org/v3";

/// Quilt Meta serves the same profile format as Fabric Meta.
pub struct QuiltInstaller {
    client: reqwest::Client,
    meta_base: String,
}

impl QuiltInstaller {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            meta_base: QUILT_META_BASE.to_string(),
        }
    }

    pub fn with_meta_base(mut self, base: &str) -> Self {
        self.meta_base = base.trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl LoaderInstaller for QuiltInstaller {
    async fn install(&self, ctx: InstallContext<'_>) -> LauncherResult<LoaderInstallResult> {
        info!(
            "Installing Quilt loader {} for MC {}",
            ctx.loader_version, ctx.minecraft_version
        );
        let url = meta_profile_url(&self.meta_base, ctx.minecraft_version, ctx.loader_version);
        install_meta_profile(&self.client, &url, &ctx, "quilt").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_url_uses_the_quilt_meta_layout() {
        assert_eq!(
            meta_profile_url(QUILT_META_BASE, "1.20.1", "0.21.0"),
            "https://meta.quiltmc.org/v3/versions/loader/1.20.1/0.21.0/profile/json"
        );
    }
}
