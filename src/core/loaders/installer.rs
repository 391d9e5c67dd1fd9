use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::error::LauncherResult;

use super::{
    context::InstallContext, fabric::FabricInstaller, forge::ForgeInstaller,
    neoforge::NeoForgeInstaller, quilt::QuiltInstaller,
};

/// Supported mod loaders.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LoaderType {
    Forge,
    #[serde(alias = "neo_forge")]
    NeoForge,
    Fabric,
    Quilt,
}

impl fmt::Display for LoaderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoaderType::Forge => write!(f, "forge"),
            LoaderType::NeoForge => write!(f, "neoforge"),
            LoaderType::Fabric => write!(f, "fabric"),
            LoaderType::Quilt => write!(f, "quilt"),
        }
    }
}

/// Loader output is a new version descriptor whose parent is the base version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderInstallResult {
    pub version_id: String,
}

#[async_trait]
pub trait LoaderInstaller: Send + Sync {
    async fn install(&self, ctx: InstallContext<'_>) -> LauncherResult<LoaderInstallResult>;
}

/// Static dispatch over the known loaders.
pub enum Installer {
    Forge(ForgeInstaller),
    NeoForge(NeoForgeInstaller),
    Fabric(FabricInstaller),
    Quilt(QuiltInstaller),
}

impl Installer {
    pub fn new(loader: LoaderType, client: reqwest::Client) -> Self {
        match loader {
            LoaderType::Forge => Self::Forge(ForgeInstaller::new()),
            LoaderType::NeoForge => Self::NeoForge(NeoForgeInstaller::new()),
            LoaderType::Fabric => Self::Fabric(FabricInstaller::new(client)),
            LoaderType::Quilt => Self::Quilt(QuiltInstaller::new(client)),
        }
    }

    pub async fn install(&self, ctx: InstallContext<'_>) -> LauncherResult<LoaderInstallResult> {
        match self {
            Installer::Forge(i) => i.install(ctx).await,
            Installer::NeoForge(i) => i.install(ctx).await,
            Installer::Fabric(i) => i.install(ctx).await,
            Installer::Quilt(i) => i.install(ctx).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loader_names_round_trip_through_serde() {
        let parsed: LoaderType = serde_json::from_str("\"neoforge\"").unwrap();
        assert_eq!(parsed, LoaderType::NeoForge);
        let alias: LoaderType = serde_json::from_str("\"neo_forge\"").unwrap();
        assert_eq!(alias, LoaderType::NeoForge);
        assert_eq!(LoaderType::Quilt.to_string(), "quilt");
        assert!(serde_json::from_str::<LoaderType>("\"rift\"").is_err());
    }
}
