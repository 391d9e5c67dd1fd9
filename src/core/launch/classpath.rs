use std::path::Path;

/// Convert path to string, using the canonical form when the path exists.
pub fn safe_path_str(path: &Path) -> String {
    let resolved = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    let text = resolved.to_string_lossy().to_string();

    #[cfg(target_os = "windows")]
    {
        // Java classpath handling can fail for Windows extended-length paths
        // (e.g. `\\?\C:\...`) and report `ClassNotFoundException` even when
        // jars exist. Strip the prefix before building launch arguments.
        if let Some(stripped) = text.strip_prefix(r"\\?\") {
            return stripped.to_string();
        }
    }

    text
}

/// Join entries with the platform separator, skipping duplicates of the
/// same file.
pub fn join_classpath<'a>(paths: impl IntoIterator<Item = &'a Path>, separator: &str) -> String {
    let mut seen = std::collections::HashSet::new();
    paths
        .into_iter()
        .map(safe_path_str)
        .filter(|entry| !entry.is_empty() && seen.insert(entry.clone()))
        .collect::<Vec<_>>()
        .join(separator)
}
