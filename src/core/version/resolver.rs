// ─── Manifest Resolver ───
// Loads version descriptors (local roots first, then the remote catalog) and
// folds an inheritance chain into one merged descriptor.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use reqwest::Client;
use sha1::{Digest, Sha1};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use super::manifest::{VersionManifest, VERSION_MANIFEST_URL};
use super::version_file::{
    ArgumentToken, AssetIndexRef, DownloadArtifact, LibraryEntry, VersionDescriptor,
};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::storage::write_atomic;

pub const MAX_INHERITANCE_DEPTH: usize = 16;
const CATALOG_CACHE_FILE: &str = "version_manifest_v2.json";

/// Client jar contributed by the most-descendant descriptor that declares one.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientJar {
    pub version_id: String,
    pub download: DownloadArtifact,
}

/// Result of folding an inheritance chain. Built once per launch.
#[derive(Debug, Clone)]
pub struct MergedDescriptor {
    pub id: String,
    /// Chain ids, root first.
    pub chain: Vec<String>,
    pub version_type: String,
    pub main_class: String,
    pub jvm_arguments: Vec<ArgumentToken>,
    pub game_arguments: Vec<ArgumentToken>,
    /// Raw library list, ancestors first, duplicates kept.
    pub libraries: Vec<LibraryEntry>,
    pub asset_index: Option<AssetIndexRef>,
    pub client: Option<ClientJar>,
    pub java_major: Option<u32>,
}

impl MergedDescriptor {
    /// Merge a root-first chain. List fields concatenate, scalars take the
    /// most-descendant value present.
    pub fn merge(chain: Vec<VersionDescriptor>) -> LauncherResult<Self> {
        let leaf_id = chain
            .last()
            .map(|d| d.id.clone())
            .ok_or_else(|| LauncherError::Other("empty inheritance chain".into()))?;

        let mut merged = MergedDescriptor {
            id: leaf_id,
            chain: chain.iter().map(|d| d.id.clone()).collect(),
            version_type: "release".into(),
            main_class: String::new(),
            jvm_arguments: Vec::new(),
            game_arguments: Vec::new(),
            libraries: Vec::new(),
            asset_index: None,
            client: None,
            java_major: None,
        };
        let mut legacy_game: Option<Vec<ArgumentToken>> = None;

        for descriptor in chain {
            if let Some(kind) = &descriptor.version_type {
                merged.version_type = kind.clone();
            }
            if let Some(main_class) = &descriptor.main_class {
                merged.main_class = main_class.clone();
            }
            if let Some(tokens) = descriptor.legacy_game_tokens() {
                legacy_game = Some(tokens);
            }
            if let Some(download) = descriptor.client_download() {
                merged.client = Some(ClientJar {
                    version_id: descriptor.id.clone(),
                    download: download.clone(),
                });
            }
            if let Some(java) = &descriptor.java_version {
                merged.java_major = Some(java.major_version);
            }
            if descriptor.asset_index.is_some() {
                merged.asset_index = descriptor.asset_index;
            }
            if let Some(arguments) = descriptor.arguments {
                merged.jvm_arguments.extend(arguments.jvm);
                merged.game_arguments.extend(arguments.game);
            }
            merged.libraries.extend(descriptor.libraries);
        }

        // The legacy string is a scalar: only the most-descendant one counts.
        if let Some(mut legacy) = legacy_game {
            legacy.append(&mut merged.game_arguments);
            merged.game_arguments = legacy;
        }

        if merged.main_class.is_empty() {
            return Err(LauncherError::Other(format!(
                "no descriptor in the chain of {} declares a main class",
                merged.id
            )));
        }

        Ok(merged)
    }
}

pub struct ManifestResolver {
    client: Client,
    /// Searched in order for `<root>/<id>/<id>.json`.
    version_roots: Vec<PathBuf>,
    /// Where remotely fetched descriptors and the catalog are cached.
    cache_root: PathBuf,
    catalog_url: String,
    catalog: OnceCell<VersionManifest>,
}

impl ManifestResolver {
    pub fn new(client: Client, versions_dir: PathBuf) -> Self {
        Self {
            client,
            version_roots: vec![versions_dir.clone()],
            cache_root: versions_dir,
            catalog_url: VERSION_MANIFEST_URL.to_string(),
            catalog: OnceCell::new(),
        }
    }

    /// Search `root` before every root registered so far (profile-local
    /// loader output shadows the shared cache).
    pub fn with_priority_root(mut self, root: PathBuf) -> Self {
        self.version_roots.insert(0, root);
        self
    }

    pub fn with_catalog_url(mut self, url: &str) -> Self {
        self.catalog_url = url.to_string();
        self
    }

    pub fn descriptor_path(root: &Path, id: &str) -> PathBuf {
        root.join(id).join(format!("{}.json", id))
    }

    /// The remote catalog, cached on disk and reused when offline.
    pub async fn catalog(&self) -> LauncherResult<&VersionManifest> {
        self.catalog
            .get_or_try_init(|| async {
                let cache = self.cache_root.join(CATALOG_CACHE_FILE);
                match VersionManifest::fetch(&self.client, &self.catalog_url).await {
                    Ok((manifest, raw)) => {
                        write_atomic(&cache, raw.as_bytes()).await?;
                        Ok(manifest)
                    }
                    Err(e) => match tokio::fs::read(&cache).await {
                        Ok(bytes) => {
                            warn!("Catalog fetch failed ({}), using cached copy", e);
                            Ok(serde_json::from_slice(&bytes)?)
                        }
                        Err(_) => Err(e),
                    },
                }
            })
            .await
    }

    /// Load one descriptor without following its parent.
    pub async fn load(&self, id: &str) -> LauncherResult<VersionDescriptor> {
        if id.is_empty() || id.contains(['/', '\\']) || id.contains("..") {
            return Err(LauncherError::NotFound(format!("version '{}'", id)));
        }

        for root in &self.version_roots {
            let path = Self::descriptor_path(root, id);
            match tokio::fs::read_to_string(&path).await {
                Ok(raw) => {
                    debug!("Loaded descriptor {} from {:?}", id, path);
                    return VersionDescriptor::parse(&raw);
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(LauncherError::io(path, e)),
            }
        }

        let entry = self
            .catalog()
            .await?
            .find_version(id)
            .cloned()
            .ok_or_else(|| LauncherError::NotFound(format!("version '{}'", id)))?;

        info!("Fetching descriptor {} from {}", id, entry.url);
        let response = self.client.get(&entry.url).send().await?;
        if !response.status().is_success() {
            return Err(LauncherError::DownloadFailed {
                url: entry.url.clone(),
                status: response.status().as_u16(),
            });
        }
        let bytes = response.bytes().await?;

        let target = Self::descriptor_path(&self.cache_root, id);
        if let Some(expected) = &entry.sha1 {
            let actual = hex::encode(Sha1::digest(&bytes));
            if !actual.eq_ignore_ascii_case(expected) {
                return Err(LauncherError::Integrity {
                    path: target,
                    expected: expected.clone(),
                    actual,
                });
            }
        }

        let raw = String::from_utf8_lossy(&bytes).to_string();
        let descriptor = VersionDescriptor::parse(&raw)?;
        write_atomic(&target, &bytes).await?;
        Ok(descriptor)
    }

    /// Resolve `id` and all its ancestors into one merged descriptor.
    pub async fn resolve(&self, id: &str) -> LauncherResult<MergedDescriptor> {
        let mut chain = Vec::new();
        let mut visited = HashSet::new();
        let mut next = Some(id.to_string());

        while let Some(current) = next {
            if !visited.insert(current.clone()) {
                let mut ids: Vec<String> = chain.iter().map(|d: &VersionDescriptor| d.id.clone()).collect();
                ids.push(current);
                return Err(LauncherError::CyclicInheritance { chain: ids });
            }
            if chain.len() >= MAX_INHERITANCE_DEPTH {
                return Err(LauncherError::InheritanceTooDeep(
                    id.to_string(),
                    MAX_INHERITANCE_DEPTH,
                ));
            }

            let descriptor = self.load(&current).await?;
            next = descriptor.inherits_from.clone();
            chain.push(descriptor);
        }

        chain.reverse();
        let merged = MergedDescriptor::merge(chain)?;
        info!(
            "Resolved {} (chain: {})",
            merged.id,
            merged.chain.join(" <- ")
        );
        Ok(merged)
    }
}
