use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::loaders::LoaderType;

/// Mod loader requested by a profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoaderSpec {
    #[serde(rename = "type", alias = "name")]
    pub loader_type: LoaderType,
    pub version: String,
}

/// The three kinds of downloadable content a profile ships.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FileCategory {
    Mod,
    Shader,
    ResourcePack,
}

impl FileCategory {
    pub const ALL: [FileCategory; 3] = [
        FileCategory::Mod,
        FileCategory::Shader,
        FileCategory::ResourcePack,
    ];

    /// Directory (relative to the profile root) that bare file names land in.
    pub fn dir_name(self) -> &'static str {
        match self {
            FileCategory::Mod => "mods",
            FileCategory::Shader => "shaderpacks",
            FileCategory::ResourcePack => "resourcepacks",
        }
    }
}

impl std::fmt::Display for FileCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileCategory::Mod => write!(f, "mod"),
            FileCategory::Shader => write!(f, "shader"),
            FileCategory::ResourcePack => write!(f, "resourcepack"),
        }
    }
}

/// A mod, shader or resource pack entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileFile {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha1: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl ProfileFile {
    /// Destination relative to the profile root.
    ///
    /// `path` wins over `name`, which wins over the URL's last segment. A bare
    /// file name is placed in the category directory.
    pub fn destination(&self, category: FileCategory) -> LauncherResult<PathBuf> {
        let raw = self
            .path
            .as_deref()
            .or(self.name.as_deref())
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
            .or_else(|| {
                self.url
                    .split(['?', '#'])
                    .next()
                    .and_then(|u| u.rsplit('/').next())
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
            })
            .ok_or_else(|| {
                LauncherError::MalformedProfile(format!("{} entry without a file name", category))
            })?;

        let relative = checked_relative(&raw)?;
        if relative.components().count() == 1 {
            Ok(Path::new(category.dir_name()).join(relative))
        } else {
            Ok(relative)
        }
    }

    /// File name used when referring to the entry from `options.txt`.
    pub fn file_name(&self, category: FileCategory) -> Option<String> {
        self.destination(category)
            .ok()?
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
    }
}

/// Rejects absolute paths and anything that climbs out of the profile root.
fn checked_relative(raw: &str) -> LauncherResult<PathBuf> {
    let normalized = raw.replace('\\', "/");
    let path = PathBuf::from(normalized.trim_start_matches("./"));
    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            _ => {
                return Err(LauncherError::MalformedProfile(format!(
                    "destination '{}' escapes the profile directory",
                    raw
                )))
            }
        }
    }
    if clean.as_os_str().is_empty() {
        return Err(LauncherError::MalformedProfile(format!(
            "empty destination '{}'",
            raw
        )));
    }
    Ok(clean)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerBlock {
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub auto_connect: bool,
}

impl ServerBlock {
    /// Server-list entry name: the block's own name, else the profile's.
    pub fn display_name<'a>(&'a self, profile_name: &'a str) -> &'a str {
        self.name.as_deref().unwrap_or(profile_name)
    }
}

/// One remotely published profile, as served by `profiles.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub version_base: String,
    #[serde(default, alias = "modloader", skip_serializing_if = "Option::is_none")]
    pub loader: Option<LoaderSpec>,
    #[serde(default)]
    pub mods: Vec<ProfileFile>,
    #[serde(default)]
    pub shaders: Vec<ProfileFile>,
    #[serde(default)]
    pub resourcepacks: Vec<ProfileFile>,
    #[serde(default)]
    pub options: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<ServerBlock>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ProfilesDocument {
    Many { profiles: Vec<ProfileDescriptor> },
    One(Box<ProfileDescriptor>),
}

impl ProfileDescriptor {
    /// Parse a `profiles.json` body: a single profile or `{ "profiles": [...] }`.
    /// Every profile is validated.
    pub fn parse_document(raw: &str) -> LauncherResult<Vec<ProfileDescriptor>> {
        let document: ProfilesDocument = serde_json::from_str(raw)
            .map_err(|e| LauncherError::MalformedProfile(e.to_string()))?;
        let profiles = match document {
            ProfilesDocument::Many { profiles } => profiles,
            ProfilesDocument::One(profile) => vec![*profile],
        };
        if profiles.is_empty() {
            return Err(LauncherError::MalformedProfile(
                "document lists no profiles".into(),
            ));
        }
        for profile in &profiles {
            profile.validate()?;
        }
        Ok(profiles)
    }

    pub fn validate(&self) -> LauncherResult<()> {
        if self.version_base.trim().is_empty() {
            return Err(LauncherError::MalformedProfile(
                "missing version_base".into(),
            ));
        }
        if let Some(loader) = &self.loader {
            if loader.version.trim().is_empty() {
                return Err(LauncherError::MalformedProfile(format!(
                    "{} loader without a version",
                    loader.loader_type
                )));
            }
        }
        if let Some(server) = &self.server {
            if server.host.trim().is_empty() {
                return Err(LauncherError::MalformedProfile(
                    "server block without host".into(),
                ));
            }
        }
        for category in FileCategory::ALL {
            for file in self.files(category) {
                if file.url.trim().is_empty() {
                    return Err(LauncherError::MalformedProfile(format!(
                        "{} entry without url",
                        category
                    )));
                }
                file.destination(category)?;
            }
        }
        Ok(())
    }

    pub fn files(&self, category: FileCategory) -> &[ProfileFile] {
        match category {
            FileCategory::Mod => &self.mods,
            FileCategory::Shader => &self.shaders,
            FileCategory::ResourcePack => &self.resourcepacks,
        }
    }

    /// Profile id: the declared one, else derived from the host.
    pub fn profile_id(&self, host: &str) -> String {
        let raw = self
            .id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or(host);
        sanitize_id(raw)
    }
}

/// Keeps ids usable as a single directory name.
pub fn sanitize_id(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches('.').to_string();
    if cleaned.is_empty() {
        "profile".to_string()
    } else {
        cleaned
    }
}

/// An installed profile, as listed in the registry.
///
/// Layout under `root`:
/// - `mods/`, `shaderpacks/`, `resourcepacks/`, `config/`
/// - `versions/`, `libraries/` for loader output
/// - `options.txt`, `servers.dat`
/// - `.profile/` for the snapshot and install lock
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub name: String,
    pub host: String,
    pub root: PathBuf,
    pub version_base: String,
    /// Version to launch: the loader's child version, or the base.
    pub version_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loader: Option<LoaderSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<ServerBlock>,
    pub installed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Profile {
    pub fn game_dir(&self) -> PathBuf {
        self.root.clone()
    }

    pub fn category_dir(&self, category: FileCategory) -> PathBuf {
        self.root.join(category.dir_name())
    }

    pub fn config_dir(&self) -> PathBuf {
        self.root.join("config")
    }

    pub fn versions_dir(&self) -> PathBuf {
        self.root.join("versions")
    }

    pub fn libraries_dir(&self) -> PathBuf {
        self.root.join("libraries")
    }

    pub fn options_path(&self) -> PathBuf {
        self.root.join("options.txt")
    }

    pub fn servers_file(&self) -> PathBuf {
        self.root.join("servers.dat")
    }

    pub fn snapshot_path(&self) -> PathBuf {
        snapshot_path(&self.root)
    }
}

pub(crate) fn state_dir(root: &Path) -> PathBuf {
    root.join(".profile")
}

pub(crate) fn snapshot_path(root: &Path) -> PathBuf {
    state_dir(root).join("snapshot.json")
}

pub(crate) fn lock_path(root: &Path) -> PathBuf {
    state_dir(root).join("install.lock")
}
