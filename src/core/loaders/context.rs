use std::path::Path;

use crate::core::downloader::Downloader;
use crate::core::java::JavaResolver;

/// Everything a loader installer may touch.
pub struct InstallContext<'a> {
    pub minecraft_version: &'a str,
    pub loader_version: &'a str,
    /// Installer target: loader output lands in `<profile_dir>/versions` and
    /// `<profile_dir>/libraries`.
    pub profile_dir: &'a Path,
    /// Shared versions root holding the already-installed base version.
    pub shared_versions_dir: &'a Path,
    pub downloader: &'a Downloader,
    pub java: &'a dyn JavaResolver,
    /// Java major the base version asks for.
    pub java_major: u32,
}

impl InstallContext<'_> {
    pub fn versions_dir(&self) -> std::path::PathBuf {
        self.profile_dir.join("versions")
    }
}
