use std::path::{Path, PathBuf};

use crate::core::error::LauncherResult;
use crate::core::storage::create_dir_safe;

const APP_DIR_NAME: &str = "ProfileLauncher";
pub const HOME_ENV: &str = "PROFILE_LAUNCHER_HOME";

/// Every durable location derives from one data directory.
#[derive(Debug, Clone, PartialEq)]
pub struct LauncherPaths {
    data_dir: PathBuf,
}

impl LauncherPaths {
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    /// `$PROFILE_LAUNCHER_HOME`, else the platform data directory.
    pub fn from_env() -> Self {
        match std::env::var_os(HOME_ENV) {
            Some(home) if !home.is_empty() => Self::new(PathBuf::from(home)),
            _ => Self::new(default_data_dir()),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn versions_dir(&self) -> PathBuf {
        self.data_dir.join("versions")
    }

    pub fn libraries_dir(&self) -> PathBuf {
        self.data_dir.join("libraries")
    }

    pub fn assets_dir(&self) -> PathBuf {
        self.data_dir.join("assets")
    }

    pub fn natives_dir(&self) -> PathBuf {
        self.data_dir.join("natives")
    }

    pub fn profiles_dir(&self) -> PathBuf {
        self.data_dir.join("profiles")
    }

    /// Game directory used when launching a plain version.
    pub fn default_game_dir(&self) -> PathBuf {
        self.data_dir.join("game")
    }

    pub fn registry_file(&self) -> PathBuf {
        self.data_dir.join("profile_registry.json")
    }

    pub fn settings_file(&self) -> PathBuf {
        self.data_dir.join("launcher_settings.json")
    }

    pub async fn ensure(&self) -> LauncherResult<()> {
        let (versions, libraries, assets, natives, profiles) = (
            self.versions_dir(),
            self.libraries_dir(),
            self.assets_dir(),
            self.natives_dir(),
            self.profiles_dir(),
        );
        tokio::try_join!(
            create_dir_safe(&versions),
            create_dir_safe(&libraries),
            create_dir_safe(&assets),
            create_dir_safe(&natives),
            create_dir_safe(&profiles),
        )?;
        Ok(())
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}
