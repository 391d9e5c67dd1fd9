// ─── options.txt ───
// `key:value` lines. Overrides are applied key by key; every other line,
// including ones we can't parse, is kept in its original position.

use std::collections::BTreeMap;
use std::path::Path;

use serde_json::Value;
use tracing::debug;

use super::model::{FileCategory, ProfileDescriptor};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::storage::write_atomic;

/// Profile option keys that steer the launcher instead of the game.
const CONTROL_KEYS: &[&str] = &[
    "enable_shaders",
    "enable_resourcepacks",
    "shader_pack",
    "resource_packs",
];

/// Render one option value the way the game writes it.
pub fn render_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(_) | Value::Object(_) => Some(value.to_string()),
    }
}

/// Game options a profile wants in its `options.txt`.
///
/// Enabled resource packs become `resourcePacks` unless the profile sets
/// that key itself or turns resource packs off.
pub fn option_overrides(descriptor: &ProfileDescriptor) -> BTreeMap<String, String> {
    let mut overrides: BTreeMap<String, String> = descriptor
        .options
        .iter()
        .filter(|(key, _)| !CONTROL_KEYS.contains(&key.as_str()))
        .filter_map(|(key, value)| render_value(value).map(|v| (key.clone(), v)))
        .collect();

    let packs_enabled = descriptor
        .options
        .get("enable_resourcepacks")
        .and_then(Value::as_bool)
        .unwrap_or(true);
    let packs: Vec<String> = descriptor
        .resourcepacks
        .iter()
        .filter(|p| p.enabled)
        .filter_map(|p| p.file_name(FileCategory::ResourcePack))
        .map(|name| format!("file/{}", name))
        .collect();
    if packs_enabled && !packs.is_empty() && !overrides.contains_key("resourcePacks") {
        let mut list = vec![Value::String("vanilla".into())];
        list.extend(packs.into_iter().map(Value::String));
        overrides.insert("resourcePacks".into(), Value::Array(list).to_string());
    }

    overrides
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Line {
    Entry(String, String),
    Raw(String),
}

/// Parsed `options.txt` that remembers line order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionsFile {
    lines: Vec<Line>,
}

impl OptionsFile {
    pub fn parse(raw: &str) -> Self {
        let lines = raw
            .lines()
            .map(|line| match line.split_once(':') {
                Some((key, value)) if !key.trim().is_empty() => {
                    Line::Entry(key.to_string(), value.to_string())
                }
                _ => Line::Raw(line.to_string()),
            })
            .collect();
        Self { lines }
    }

    pub async fn load(path: &Path) -> LauncherResult<Self> {
        match tokio::fs::read_to_string(path).await {
            Ok(raw) => Ok(Self::parse(&raw)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(LauncherError::io(path, e)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.lines.iter().find_map(|line| match line {
            Line::Entry(k, v) if k == key => Some(v.as_str()),
            _ => None,
        })
    }

    /// Returns whether the file changed.
    pub fn set(&mut self, key: &str, value: &str) -> bool {
        for line in &mut self.lines {
            if let Line::Entry(k, v) = line {
                if k == key {
                    if v == value {
                        return false;
                    }
                    *v = value.to_string();
                    return true;
                }
            }
        }
        self.lines
            .push(Line::Entry(key.to_string(), value.to_string()));
        true
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            match line {
                Line::Entry(k, v) => {
                    out.push_str(k);
                    out.push(':');
                    out.push_str(v);
                }
                Line::Raw(raw) => out.push_str(raw),
            }
            out.push('\n');
        }
        out
    }
}

/// Merge `overrides` into the file at `path`. Returns how many keys changed;
/// the file is only rewritten when that is non-zero.
pub async fn apply_options(path: &Path, overrides: &BTreeMap<String, String>) -> LauncherResult<usize> {
    let mut file = OptionsFile::load(path).await?;
    let changed = overrides
        .iter()
        .filter(|(key, value)| file.set(key, value))
        .count();
    if changed > 0 {
        write_atomic(path, file.render().as_bytes()).await?;
        debug!("Updated {} option(s) in {:?}", changed, path);
    }
    Ok(changed)
}
