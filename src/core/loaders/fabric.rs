use async_trait::async_trait;
use tracing::info;

use super::context::InstallContext;
use super::installer::{LoaderInstallResult, LoaderInstaller};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::storage::write_atomic;
use crate::core::version::{ManifestResolver, VersionDescriptor};

pub const FABRIC_META_BASE: &str = "https://meta.fabricmc.net/v2";

/// Installs Fabric by storing the launcher profile served by Fabric Meta as a
/// child version of the base game version.
pub struct FabricInstaller {
    client: reqwest::Client,
    meta_base: String,
}

impl FabricInstaller {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            meta_base: FABRIC_META_BASE.to_string(),
        }
    }

    pub fn with_meta_base(mut self, base: &str) -> Self {
        self.meta_base = base.trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl LoaderInstaller for FabricInstaller {
    async fn install(&self, ctx: InstallContext<'_>) -> LauncherResult<LoaderInstallResult> {
        info!(
            "Installing Fabric {} for Minecraft {}",
            ctx.loader_version, ctx.minecraft_version
        );
        let url = meta_profile_url(&self.meta_base, ctx.minecraft_version, ctx.loader_version);
        install_meta_profile(&self.client, &url, &ctx, "fabric").await
    }
}

pub(crate) fn meta_profile_url(base: &str, minecraft_version: &str, loader_version: &str) -> String {
    format!(
        "{}/versions/loader/{}/{}/profile/json",
        base, minecraft_version, loader_version
    )
}

/// Fetch a meta-service launcher profile and write it under the profile's
/// versions root.
pub(crate) async fn install_meta_profile(
    client: &reqwest::Client,
    url: &str,
    ctx: &InstallContext<'_>,
    loader: &str,
) -> LauncherResult<LoaderInstallResult> {
    let resp = client.get(url).send().await?;
    if !resp.status().is_success() {
        return Err(LauncherError::LoaderApi(format!(
            "{} meta returned {} for {}",
            loader,
            resp.status(),
            url
        )));
    }

    let mut profile: serde_json::Value = resp.json().await?;
    let object = profile
        .as_object_mut()
        .ok_or_else(|| LauncherError::LoaderApi(format!("{} profile is not an object", loader)))?;
    if !object.get("mainClass").is_some_and(|v| v.is_string()) {
        return Err(LauncherError::LoaderApi(format!(
            "{} profile missing mainClass",
            loader
        )));
    }
    object
        .entry("inheritsFrom")
        .or_insert_with(|| serde_json::Value::String(ctx.minecraft_version.to_string()));

    let descriptor: VersionDescriptor = serde_json::from_value(profile.clone())?;
    if descriptor.id.trim().is_empty() {
        return Err(LauncherError::LoaderApi(format!("{} profile without id", loader)));
    }

    let path = ManifestResolver::descriptor_path(&ctx.versions_dir(), &descriptor.id);
    write_atomic(&path, &serde_json::to_vec_pretty(&profile)?).await?;
    info!("{} profile {} written to {:?}", loader, descriptor.id, path);

    Ok(LoaderInstallResult {
        version_id: descriptor.id,
    })
}
