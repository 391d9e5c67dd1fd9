// ─── Version File ───
// Typed model of a version descriptor JSON and its library entries.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::rules::{rules_allow, Rule};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::maven::MavenArtifact;
use crate::core::platform::Platform;

/// One version descriptor as stored on disk or served remotely.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionDescriptor {
    pub id: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub version_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inherits_from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Arguments>,
    /// Legacy `minecraftArguments` field (pre-1.13), a whitespace separated string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minecraft_arguments: Option<String>,
    #[serde(default)]
    pub libraries: Vec<LibraryEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_index: Option<AssetIndexRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downloads: Option<VersionDownloads>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub java_version: Option<JavaVersionInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JavaVersionInfo {
    pub major_version: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionDownloads {
    #[serde(default)]
    pub client: Option<DownloadArtifact>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadArtifact {
    #[serde(default)]
    pub sha1: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetIndexRef {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub sha1: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub total_size: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Arguments {
    #[serde(default)]
    pub game: Vec<ArgumentToken>,
    #[serde(default)]
    pub jvm: Vec<ArgumentToken>,
}

/// Element of an argument template list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgumentToken {
    Literal(String),
    Conditional {
        #[serde(default)]
        rules: Vec<Rule>,
        value: ArgumentValue,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgumentValue {
    One(String),
    Many(Vec<String>),
}

impl ArgumentToken {
    pub fn literal(value: &str) -> Self {
        ArgumentToken::Literal(value.to_string())
    }

    /// Tokens this entry contributes on `platform`.
    pub fn expand(&self, platform: &Platform) -> Vec<String> {
        match self {
            ArgumentToken::Literal(s) => vec![s.clone()],
            ArgumentToken::Conditional { rules, value } => {
                if !rules_allow(rules, platform) {
                    return Vec::new();
                }
                match value {
                    ArgumentValue::One(s) => vec![s.clone()],
                    ArgumentValue::Many(values) => values.clone(),
                }
            }
        }
    }

    /// Whether any value of this entry mentions `needle`, regardless of rules.
    pub fn mentions(&self, needle: &str) -> bool {
        match self {
            ArgumentToken::Literal(s) => s.contains(needle),
            ArgumentToken::Conditional { value, .. } => match value {
                ArgumentValue::One(s) => s.contains(needle),
                ArgumentValue::Many(values) => values.iter().any(|v| v.contains(needle)),
            },
        }
    }
}

// ─── Library Entry ───

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downloads: Option<LibraryDownloads>,
    /// Maven repository base for descriptors that only carry a coordinate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha1: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<Rule>,
    /// OS name → classifier, e.g. `"windows": "natives-windows-${arch}"`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub natives: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extract: Option<ExtractRules>,
    /// Placed on the module path as well as the classpath.
    #[serde(default, skip_serializing_if = "is_false")]
    pub module: bool,
    /// A missing artifact is skipped instead of failing resolution.
    #[serde(default, skip_serializing_if = "is_false")]
    pub optional: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryDownloads {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<LibraryArtifact>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub classifiers: BTreeMap<String, LibraryArtifact>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryArtifact {
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub sha1: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractRules {
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl LibraryEntry {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            downloads: None,
            url: None,
            sha1: None,
            rules: Vec::new(),
            natives: BTreeMap::new(),
            extract: None,
            module: false,
            optional: false,
        }
    }

    pub fn coordinate(&self) -> LauncherResult<MavenArtifact> {
        MavenArtifact::parse(&self.name)
    }

    pub fn is_allowed(&self, platform: &Platform) -> bool {
        rules_allow(&self.rules, platform)
    }

    /// Classifier of the native bundle for `platform`, if this library has one.
    ///
    /// Covers both the legacy `natives` map and coordinates that name a
    /// `natives-*` classifier directly.
    pub fn native_classifier(&self, platform: &Platform) -> Option<String> {
        if let Some(raw) = self.natives.get(&platform.os) {
            return Some(raw.replace("${arch}", platform.arch_bits()));
        }
        let classifier = self.coordinate().ok()?.classifier?;
        classifier.starts_with("natives-").then_some(classifier)
    }

    pub fn extract_excludes(&self) -> Vec<String> {
        self.extract
            .as_ref()
            .map(|e| e.exclude.clone())
            .unwrap_or_default()
    }
}

impl VersionDescriptor {
    pub fn parse(raw: &str) -> LauncherResult<Self> {
        let descriptor: VersionDescriptor = serde_json::from_str(raw)?;
        if descriptor.id.trim().is_empty() {
            return Err(LauncherError::Other("version descriptor without id".into()));
        }
        Ok(descriptor)
    }

    /// Game argument templates, splitting the legacy string form into literals.
    pub fn legacy_game_tokens(&self) -> Option<Vec<ArgumentToken>> {
        self.minecraft_arguments.as_ref().map(|s| {
            s.split_whitespace()
                .map(ArgumentToken::literal)
                .collect::<Vec<_>>()
        })
    }

    pub fn client_download(&self) -> Option<&DownloadArtifact> {
        self.downloads.as_ref().and_then(|d| d.client.as_ref())
    }
}
