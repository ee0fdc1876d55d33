//! Core data model for the fetch engine.
//!
//! References flow through the engine in one direction:
//!
//! ```text
//! PluginReference ──resolver──► ResolvedDownload ──downloader──► DownloadOutcome
//! ```
//!
//! `PluginReference` values are derived once from the root manifest and from
//! scanner output; they are never mutated afterwards.

use crate::error::FetchError;

/// One entry of the root manifest: a stable short name plus a spec that is
/// either a literal URL or a registry-style `name@versionOrTag` string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginReference {
    /// Destination folder/file name under the plugins directory.
    pub id: String,
    /// Literal URL or registry reference.
    pub spec: String,
}

impl PluginReference {
    /// Create a reference from an id and spec.
    pub fn new(id: impl Into<String>, spec: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            spec: spec.into(),
        }
    }

    /// Create a reference for an identifier discovered inside a downloaded
    /// plugin (extension pack member or extension dependency).
    ///
    /// Derived references carry no version information; the registry picks
    /// the compatible version during resolution.
    pub fn derived(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            spec: id.clone(),
            id,
        }
    }
}

/// A reference resolved to a concrete, fully qualified download URL.
///
/// Target-platform placeholders are substituted before this stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDownload {
    pub id: String,
    pub download_url: String,
    /// Version reported by the registry, if the reference went through it.
    pub version: Option<String>,
}

/// Terminal result for one plugin reference.
///
/// Failures are never thrown away; every worker converts its error into a
/// `Failure` and the orchestrator aggregates them for the final report.
#[derive(Debug)]
pub enum DownloadOutcome {
    Success {
        id: String,
        version: Option<String>,
        /// Number of HTTP attempts made. Zero means the artifact was
        /// already present and no network call was issued.
        attempts: u32,
    },
    Failure {
        id: String,
        reason: FetchError,
    },
}

impl DownloadOutcome {
    /// The plugin id this outcome belongs to.
    pub fn id(&self) -> &str {
        match self {
            Self::Success { id, .. } | Self::Failure { id, .. } => id,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}
