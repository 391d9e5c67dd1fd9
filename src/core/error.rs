use std::path::PathBuf;
use thiserror::Error;

/// Central error type for the launcher engine.
/// Every module returns `Result<T, LauncherError>`.
#[derive(Debug, Error)]
pub enum LauncherError {
    // ── IO ──────────────────────────────────────────────
    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    // ── Network ─────────────────────────────────────────
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Download failed for {url}: HTTP {status}")]
    DownloadFailed { url: String, status: u16 },

    #[error("Download failed for {url} after {attempts} attempts: {reason}")]
    DownloadExhausted {
        url: String,
        attempts: u32,
        reason: String,
    },

    // ── Integrity ───────────────────────────────────────
    #[error("SHA-1 mismatch for {path:?}: expected {expected}, got {actual}")]
    Integrity {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    // ── Lookup ──────────────────────────────────────────
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Cyclic inheritance: {}", chain.join(" -> "))]
    CyclicInheritance { chain: Vec<String> },

    #[error("Inheritance chain of {0} exceeds {1} levels")]
    InheritanceTooDeep(String, usize),

    // ── Libraries ───────────────────────────────────────
    #[error("Library {name} has no usable artifact for {platform}")]
    UnresolvedLibrary { name: String, platform: String },

    #[error("Invalid Maven coordinate: {0}")]
    InvalidMavenCoordinate(String),

    // ── JSON ────────────────────────────────────────────
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ── Profiles ────────────────────────────────────────
    #[error("Malformed profile: {0}")]
    MalformedProfile(String),

    // ── Java ────────────────────────────────────────────
    #[error("Java not found for major version {0}")]
    JavaNotFound(u32),

    #[error("Java execution failed: {0}")]
    JavaExecution(String),

    // ── Loader ──────────────────────────────────────────
    #[error("{loader} installer failed (code {code:?})\n{output}")]
    LoaderInstall {
        loader: String,
        code: Option<i32>,
        output: String,
    },

    #[error("Loader API unreachable: {0}")]
    LoaderApi(String),

    // ── Archive ─────────────────────────────────────────
    #[error("Zip extraction error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("NBT error: {0}")]
    Nbt(String),

    // ── Control ─────────────────────────────────────────
    #[error("Operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

/// Convenience alias used throughout the crate.
pub type LauncherResult<T> = Result<T, LauncherError>;

impl LauncherError {
    /// Failures worth another attempt: connection problems, 5xx/429 replies
    /// and corrupted transfers.
    pub fn is_transient(&self) -> bool {
        match self {
            LauncherError::Http(_) | LauncherError::Integrity { .. } => true,
            LauncherError::DownloadFailed { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LauncherError::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<std::io::Error> for LauncherError {
    fn from(source: std::io::Error) -> Self {
        LauncherError::Io {
            path: PathBuf::new(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_retried_but_client_errors_are_not() {
        let server = LauncherError::DownloadFailed {
            url: "https://example.com/a".into(),
            status: 503,
        };
        let missing = LauncherError::DownloadFailed {
            url: "https://example.com/a".into(),
            status: 404,
        };
        assert!(server.is_transient());
        assert!(!missing.is_transient());
        assert!(!LauncherError::Cancelled.is_transient());
    }

    #[test]
    fn cycle_message_lists_the_chain() {
        let err = LauncherError::CyclicInheritance {
            chain: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "Cyclic inheritance: a -> b -> a");
    }
}
