use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::context::InstallContext;
use super::installer::{LoaderInstallResult, LoaderInstaller};
use crate::core::downloader::DownloadEntry;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::maven::FORGE_MAVEN;
use crate::core::storage::create_dir_safe;
use crate::core::version::{ManifestResolver, VersionDescriptor};

/// Installs Forge by downloading and executing the official installer JAR
/// against the profile directory.
pub struct ForgeInstaller {
    maven_base: String,
}

impl ForgeInstaller {
    pub fn new() -> Self {
        Self {
            maven_base: FORGE_MAVEN.to_string(),
        }
    }

    pub fn with_maven(mut self, base: &str) -> Self {
        self.maven_base = base.trim_end_matches('/').to_string();
        self
    }

    /// Forge versions are published as `<mc>-<forge>`.
    fn full_version(minecraft_version: &str, loader_version: &str) -> String {
        if loader_version.starts_with(&format!("{}-", minecraft_version)) {
            loader_version.to_string()
        } else {
            format!("{}-{}", minecraft_version, loader_version)
        }
    }

    pub fn installer_url(&self, minecraft_version: &str, loader_version: &str) -> String {
        let full = Self::full_version(minecraft_version, loader_version);
        format!(
            "{}/net/minecraftforge/forge/{}/forge-{}-installer.jar",
            self.maven_base, full, full
        )
    }

    fn candidate_ids(minecraft_version: &str, loader_version: &str) -> Vec<String> {
        let full = Self::full_version(minecraft_version, loader_version);
        let short = full
            .strip_prefix(&format!("{}-", minecraft_version))
            .unwrap_or(&full)
            .to_string();
        vec![
            format!("{}-forge-{}", minecraft_version, short),
            format!("{}-forge{}-{}", minecraft_version, minecraft_version, short),
            format!("forge-{}", full),
        ]
    }
}

impl Default for ForgeInstaller {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LoaderInstaller for ForgeInstaller {
    async fn install(&self, ctx: InstallContext<'_>) -> LauncherResult<LoaderInstallResult> {
        info!(
            "Installing Forge {} for MC {}",
            ctx.loader_version, ctx.minecraft_version
        );
        let url = self.installer_url(ctx.minecraft_version, ctx.loader_version);
        let candidates = Self::candidate_ids(ctx.minecraft_version, ctx.loader_version);
        run_installer_jar(&ctx, "forge", &url, &candidates).await
    }
}

/// Download an installer jar, run it with `--installClient <profile dir>`,
/// and report the version it produced.
pub(crate) async fn run_installer_jar(
    ctx: &InstallContext<'_>,
    loader: &str,
    installer_url: &str,
    candidate_ids: &[String],
) -> LauncherResult<LoaderInstallResult> {
    let profile_dir = ctx.profile_dir;
    create_dir_safe(profile_dir).await?;

    let installer_name = installer_url
        .rsplit('/')
        .next()
        .filter(|n| !n.is_empty())
        .unwrap_or("installer.jar");
    let installer_path = profile_dir.join(".installers").join(installer_name);
    ctx.downloader
        .ensure_file(&DownloadEntry::new(installer_url, installer_path.clone(), None))
        .await?;

    stage_base_version(ctx).await?;
    ensure_launcher_profiles(profile_dir).await?;

    let java_bin = ctx.java.resolve_java_executable(ctx.java_major).await?;
    info!("Running {} installer {:?}", loader, installer_path);
    let output = tokio::process::Command::new(&java_bin)
        .arg("-jar")
        .arg(&installer_path)
        .arg("--installClient")
        .arg(profile_dir)
        .current_dir(profile_dir)
        .stdin(std::process::Stdio::null())
        .output()
        .await
        .map_err(|e| LauncherError::JavaExecution(e.to_string()))?;

    let captured = format!(
        "STDOUT:\n{}\nSTDERR:\n{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    if !output.status.success() {
        return Err(LauncherError::LoaderInstall {
            loader: loader.to_string(),
            code: output.status.code(),
            output: captured,
        });
    }
    debug!("{} installer output:\n{}", loader, captured);

    let versions_dir = ctx.versions_dir();
    let version_id = find_installed_version(&versions_dir, ctx.minecraft_version, candidate_ids)
        .await
        .ok_or_else(|| LauncherError::LoaderInstall {
            loader: loader.to_string(),
            code: output.status.code(),
            output: format!("installer produced no version descriptor\n{}", captured),
        })?;

    info!("{} installed as version {}", loader, version_id);
    Ok(LoaderInstallResult { version_id })
}

/// Installers expect the base version inside their target directory; copy it
/// from the shared root rather than letting them download it again.
async fn stage_base_version(ctx: &InstallContext<'_>) -> LauncherResult<()> {
    let id = ctx.minecraft_version;
    let target_dir = ctx.versions_dir().join(id);
    for file in [format!("{}.json", id), format!("{}.jar", id)] {
        let source = ctx.shared_versions_dir.join(id).join(&file);
        let target = target_dir.join(&file);
        if target.exists() || !source.is_file() {
            continue;
        }
        create_dir_safe(&target_dir).await?;
        tokio::fs::copy(&source, &target)
            .await
            .map_err(|e| LauncherError::io(&target, e))?;
    }
    Ok(())
}

/// The official installers refuse to run without this file.
async fn ensure_launcher_profiles(profile_dir: &Path) -> LauncherResult<()> {
    let path = profile_dir.join("launcher_profiles.json");
    if path.exists() {
        return Ok(());
    }
    tokio::fs::write(&path, br#"{"profiles":{},"selectedProfile":null}"#)
        .await
        .map_err(|e| LauncherError::io(&path, e))
}

/// Known id patterns first, then any descriptor inheriting from the base
/// version (newest first).
async fn find_installed_version(
    versions_dir: &Path,
    base_version: &str,
    candidate_ids: &[String],
) -> Option<String> {
    for id in candidate_ids {
        if ManifestResolver::descriptor_path(versions_dir, id).is_file() {
            return Some(id.clone());
        }
    }

    let mut found: Vec<(std::time::SystemTime, String)> = Vec::new();
    let mut entries = tokio::fs::read_dir(versions_dir).await.ok()?;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let id = entry.file_name().to_string_lossy().to_string();
        let path: PathBuf = ManifestResolver::descriptor_path(versions_dir, &id);
        let Ok(raw) = tokio::fs::read_to_string(&path).await else {
            continue;
        };
        match VersionDescriptor::parse(&raw) {
            Ok(d) if d.inherits_from.as_deref() == Some(base_version) => {
                let modified = tokio::fs::metadata(&path)
                    .await
                    .and_then(|m| m.modified())
                    .unwrap_or(std::time::UNIX_EPOCH);
                found.push((modified, d.id));
            }
            Ok(_) => {}
            Err(e) => warn!("Ignoring unreadable descriptor {:?}: {}", path, e),
        }
    }
    found.sort();
    found.pop().map(|(_, id)| id)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::downloader::Downloader;
    use crate::core::java::FixedJava;
    use crate::core::test_support::{scratch_dir, test_client, TestServer};

    #[test]
    fn installer_urls_and_version_ids() {
        let forge = ForgeInstaller::new();
        assert_eq!(
            forge.installer_url("1.20.1", "47.2.0"),
            "https://maven.minecraftforge.net/net/minecraftforge/forge/1.20.1-47.2.0/forge-1.20.1-47.2.0-installer.jar"
        );
        assert_eq!(
            forge.installer_url("1.20.1", "1.20.1-47.2.0"),
            forge.installer_url("1.20.1", "47.2.0")
        );
        assert_eq!(
            ForgeInstaller::candidate_ids("1.20.1", "47.2.0")[0],
            "1.20.1-forge-47.2.0"
        );
    }

    #[tokio::test]
    async fn scanning_finds_descriptors_inheriting_from_the_base() {
        let dir = scratch_dir("forge-scan");
        let versions = dir.join("versions");
        for (id, parent) in [("1.20.1", None), ("custom-forge", Some("1.20.1"))] {
            let mut json = serde_json::json!({"id": id, "mainClass": "M"});
            if let Some(parent) = parent {
                json["inheritsFrom"] = serde_json::json!(parent);
            }
            let path = versions.join(id).join(format!("{}.json", id));
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, serde_json::to_vec(&json).unwrap()).unwrap();
        }

        let found = find_installed_version(&versions, "1.20.1", &["nope".into()]).await;
        assert_eq!(found.as_deref(), Some("custom-forge"));
        assert_eq!(find_installed_version(&versions, "1.19.4", &[]).await, None);

        let _ = std::fs::remove_dir_all(&dir);
    }

    /// Writes an executable stand-in for `java` that runs `body`.
    #[cfg(unix)]
    pub(crate) fn fake_java(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        std::fs::create_dir_all(dir).unwrap();
        let path = dir.join("fake-java.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn installer_subprocess_output_is_captured_on_failure() {
        let server = TestServer::start().await;
        let dir = scratch_dir("forge-fail");
        let forge = ForgeInstaller::new().with_maven(&server.url("/maven"));
        let url = forge.installer_url("1.20.1", "47.2.0");
        server.serve(&url[server.url("").len()..], b"installer".to_vec());

        let java = FixedJava(fake_java(&dir.join("bin"), "echo broken patcher; echo oops >&2; exit 3"));
        let downloader = Downloader::new(test_client());
        let profile_dir = dir.join("profile");
        let ctx = InstallContext {
            minecraft_version: "1.20.1",
            loader_version: "47.2.0",
            profile_dir: &profile_dir,
            shared_versions_dir: &dir.join("shared"),
            downloader: &downloader,
            java: &java,
            java_major: 17,
        };

        match forge.install(ctx).await {
            Err(LauncherError::LoaderInstall { loader, code, output }) => {
                assert_eq!(loader, "forge");
                assert_eq!(code, Some(3));
                assert!(output.contains("broken patcher"));
                assert!(output.contains("oops"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(profile_dir.join("launcher_profiles.json").is_file());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn successful_installer_reports_the_new_version() {
        let server = TestServer::start().await;
        let dir = scratch_dir("forge-ok");
        let forge = ForgeInstaller::new().with_maven(&server.url("/maven"));
        let url = forge.installer_url("1.20.1", "47.2.0");
        server.serve(&url[server.url("").len()..], b"installer".to_vec());

        // `$4` is the --installClient target.
        let script = r#"mkdir -p "$4/versions/1.20.1-forge-47.2.0"
echo '{"id":"1.20.1-forge-47.2.0","inheritsFrom":"1.20.1","mainClass":"cpw.mods.bootstraplauncher.BootstrapLauncher"}' > "$4/versions/1.20.1-forge-47.2.0/1.20.1-forge-47.2.0.json""#;
        let java = FixedJava(fake_java(&dir.join("bin"), script));

        let shared = dir.join("shared");
        std::fs::create_dir_all(shared.join("1.20.1")).unwrap();
        std::fs::write(shared.join("1.20.1/1.20.1.json"), br#"{"id":"1.20.1","mainClass":"M"}"#).unwrap();

        let downloader = Downloader::new(test_client());
        let profile_dir = dir.join("profile");
        let ctx = InstallContext {
            minecraft_version: "1.20.1",
            loader_version: "47.2.0",
            profile_dir: &profile_dir,
            shared_versions_dir: &shared,
            downloader: &downloader,
            java: &java,
            java_major: 17,
        };

        let result = forge.install(ctx).await.unwrap();
        assert_eq!(result.version_id, "1.20.1-forge-47.2.0");
        assert!(profile_dir.join("versions/1.20.1/1.20.1.json").is_file());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
