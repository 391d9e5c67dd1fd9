// Parsing of `java -version` output.

use std::path::{Path, PathBuf};

use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct JavaInstallation {
    pub path: PathBuf,
    pub version: String,
    pub major: u32,
}

pub async fn probe_java(path: &Path) -> Option<JavaInstallation> {
    let output = tokio::process::Command::new(path)
        .arg("-version")
        .output()
        .await
        .ok()?;

    // The version banner goes to stderr on every vendor build we know of.
    let banner = format!(
        "{}\n{}",
        String::from_utf8_lossy(&output.stderr),
        String::from_utf8_lossy(&output.stdout)
    );
    debug!("Probing {:?}: {}", path, banner.lines().next().unwrap_or(""));

    let version = parse_version_string(&banner)?;
    Some(JavaInstallation {
        path: path.to_path_buf(),
        major: parse_major_version(&version),
        version,
    })
}

/// First quoted token, e.g. `openjdk version "17.0.9" 2023-10-17`.
pub fn parse_version_string(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let start = line.find('"')?;
        let end = line[start + 1..].find('"')?;
        Some(line[start + 1..start + 1 + end].to_string())
    })
}

/// `1.8.0_392` → 8, `17.0.9` → 17, `21` → 21.
pub fn parse_major_version(version: &str) -> u32 {
    let mut parts = version.split(|c: char| c == '.' || c == '_' || c == '-' || c == '+');
    let first: u32 = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    if first == 1 {
        parts.next().and_then(|p| p.parse().ok()).unwrap_or(first)
    } else {
        first
    }
}

fn runtime_track(major: u32) -> u32 {
    if major <= 8 {
        8
    } else if major >= 21 {
        21
    } else {
        17
    }
}

/// Old game versions break on newer runtimes, so majors must share a track.
pub fn is_java_compatible_major(installed: u32, required: u32) -> bool {
    installed >= required && runtime_track(installed) == runtime_track(required)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_banners_of_common_vendors() {
        let temurin = "openjdk version \"17.0.9\" 2023-10-17\nOpenJDK Runtime Environment Temurin-17.0.9+9";
        assert_eq!(parse_version_string(temurin).as_deref(), Some("17.0.9"));
        assert_eq!(parse_major_version("17.0.9"), 17);
        assert_eq!(parse_major_version("1.8.0_392"), 8);
        assert_eq!(parse_major_version("21"), 21);
        assert_eq!(parse_version_string("no version here"), None);
    }

    #[test]
    fn compatibility_stays_within_a_track() {
        assert!(is_java_compatible_major(17, 17));
        assert!(is_java_compatible_major(18, 17));
        assert!(!is_java_compatible_major(21, 17));
        assert!(!is_java_compatible_major(17, 8));
        assert!(is_java_compatible_major(21, 21));
    }
}
