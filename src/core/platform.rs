// ─── Platform ───
// Explicit description of the machine a version is resolved for. Rule
// evaluation never inspects the host directly, only this struct.

use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    /// Mojang OS name: `windows`, `osx` or `linux`.
    pub os: String,
    /// `x86_64`, `x86` or `arm64`.
    pub arch: String,
    pub os_version: Option<String>,
    /// Launcher feature flags (`is_demo_user`, `has_custom_resolution`, ...).
    pub features: BTreeMap<String, bool>,
}

impl Platform {
    pub fn new(os: &str, arch: &str) -> Self {
        Self {
            os: os.to_string(),
            arch: arch.to_string(),
            os_version: None,
            features: BTreeMap::new(),
        }
    }

    /// The platform this binary was compiled for.
    pub fn current() -> Self {
        Self::new(current_os_name(), current_arch_name())
    }

    pub fn with_feature(mut self, name: &str, enabled: bool) -> Self {
        self.features.insert(name.to_string(), enabled);
        self
    }

    pub fn with_os_version(mut self, version: &str) -> Self {
        self.os_version = Some(version.to_string());
        self
    }

    /// Missing flags read as `false`.
    pub fn feature(&self, name: &str) -> bool {
        self.features.get(name).copied().unwrap_or(false)
    }

    /// Value substituted for `${arch}` in legacy native classifiers.
    pub fn arch_bits(&self) -> &'static str {
        if self.arch == "x86" {
            "32"
        } else {
            "64"
        }
    }

    pub fn classpath_separator(&self) -> &'static str {
        if self.os == "windows" {
            ";"
        } else {
            ":"
        }
    }

    /// Platform part of the native extraction key. Feature flags are not part
    /// of it: they never change which archives are unpacked.
    pub fn identity(&self) -> String {
        format!("{}-{}", self.os, self.arch)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os, self.arch)
    }
}

/// Get the Mojang OS name for the current platform.
pub fn current_os_name() -> &'static str {
    if cfg!(target_os = "windows") {
        "windows"
    } else if cfg!(target_os = "macos") {
        "osx"
    } else {
        "linux"
    }
}

fn current_arch_name() -> &'static str {
    if cfg!(target_arch = "aarch64") {
        "arm64"
    } else if cfg!(target_arch = "x86") {
        "x86"
    } else {
        "x86_64"
    }
}
