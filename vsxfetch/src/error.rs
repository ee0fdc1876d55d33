//! Error types for the plugin fetch engine.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for fetch operations.
pub type FetchResult<T> = Result<T, FetchError>;

/// Errors that can occur while resolving and downloading plugins.
///
/// Per-reference errors are converted into
/// [`DownloadOutcome::Failure`](crate::types::DownloadOutcome) by the worker
/// that hit them; only run-level problems (unreadable root manifest, failure
/// to flush the lockfile) propagate out of the engine entry point.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The plugin spec string could not be interpreted.
    #[error("malformed plugin spec '{spec}': {reason}")]
    MalformedSpec { spec: String, reason: String },

    /// The registry has no version compatible with the requested API
    /// version and target platform.
    #[error("no version of '{id}' compatible with API {api_version} on {target_platform}")]
    NoCompatibleVersion {
        id: String,
        api_version: String,
        target_platform: String,
    },

    /// The registry request itself failed.
    #[error("registry lookup failed for '{id}': {reason}")]
    Registry { id: String, reason: String },

    /// Transport-level failure (DNS, TLS, connection reset, timeout).
    #[error("transport error fetching {url}: {reason}")]
    Transport { url: String, reason: String },

    /// A non-retryable HTTP status terminated the download.
    #[error("download of {url} failed with status {status}")]
    HttpStatus { status: u16, url: String },

    /// The retry budget was exhausted without a successful response.
    #[error("download of {url} failed after {attempts} attempts: {reason}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        reason: String,
    },

    /// Computed digest does not match the pinned lockfile integrity value.
    ///
    /// Never retried: a mismatch means a different artifact than the one
    /// previously trusted, not a transient condition.
    #[error("checksum verification failed for '{id}': expected {expected}, got {actual}")]
    IntegrityMismatch {
        id: String,
        expected: String,
        actual: String,
    },

    /// The download URL suffix is not a recognized artifact type.
    #[error("'{id}' has an unsupported file type: '{url}'")]
    UnsupportedArtifact { id: String, url: String },

    /// Failed to read a file or directory.
    #[error("failed to read {}: {source}", path.display())]
    ReadFailed { path: PathBuf, source: io::Error },

    /// Failed to write a file.
    #[error("failed to write {}: {source}", path.display())]
    WriteFailed { path: PathBuf, source: io::Error },

    /// Failed to create a directory.
    #[error("failed to create directory {}: {source}", path.display())]
    CreateDirFailed { path: PathBuf, source: io::Error },

    /// Archive extraction failed.
    #[error("failed to extract {}: {reason}", path.display())]
    ExtractionFailed { path: PathBuf, reason: String },

    /// The root manifest could not be parsed.
    #[error("invalid manifest at {}: {reason}", path.display())]
    ManifestInvalid { path: PathBuf, reason: String },

    /// The run was cancelled before this reference could be fetched.
    #[error("cancelled before '{id}' was downloaded")]
    Cancelled { id: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_artifact_display() {
        let err = FetchError::UnsupportedArtifact {
            id: "vscode.typescript".to_string(),
            url: "https://example.com/ext.zip".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "'vscode.typescript' has an unsupported file type: 'https://example.com/ext.zip'"
        );
    }

    #[test]
    fn test_integrity_mismatch_display() {
        let err = FetchError::IntegrityMismatch {
            id: "redhat.java".to_string(),
            expected: "sha512-abc".to_string(),
            actual: "sha512-def".to_string(),
        };
        assert!(err.to_string().contains("checksum verification failed"));
        assert!(err.to_string().contains("sha512-abc"));
        assert!(err.to_string().contains("sha512-def"));
    }

    #[test]
    fn test_read_failed_has_source() {
        use std::error::Error;

        let err = FetchError::ReadFailed {
            path: PathBuf::from("/tmp/x"),
            source: io::Error::new(io::ErrorKind::NotFound, "gone"),
        };
        assert!(err.source().is_some());
    }
}
