//! Registry client for resolving extension ids to download URLs.
//!
//! The engine treats the registry as a collaborator with one operation:
//! given an extension id, hand back the version and download URL of the
//! best compatible build, or nothing. [`OvsxClient`] implements it against
//! an open-vsx style REST API through the shared [`HttpTransport`], so the
//! same rate limiter and timeout apply as for artifact downloads.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Deserialize;

use crate::error::{FetchError, FetchResult};
use crate::http::HttpTransport;

/// What the engine asks the registry for.
#[derive(Debug, Clone)]
pub struct ExtensionQuery {
    /// Extension id in `namespace.name` form.
    pub id: String,
    /// Explicit version or tag from the spec; `None` requests the latest
    /// compatible version.
    pub version: Option<String>,
    /// Target platform tag (`linux-x64`, `darwin-arm64`, ...).
    pub target_platform: String,
    /// Supported vscode API version used for compatibility selection.
    pub api_version: String,
}

/// A successful registry resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedExtension {
    pub version: String,
    pub download_url: String,
}

/// Trait for registry lookups.
///
/// `Ok(None)` means the registry answered but has no compatible build;
/// `Err` means the lookup itself failed after the transport's own timeout
/// policy; this layer adds no retries of its own.
pub trait RegistryClient: Send + Sync {
    fn resolve_extension<'a>(
        &'a self,
        query: &'a ExtensionQuery,
    ) -> Pin<Box<dyn Future<Output = FetchResult<Option<ResolvedExtension>>> + Send + 'a>>;
}

#[derive(Debug, Default, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    extensions: Vec<QueryExtension>,
}

#[derive(Debug, Deserialize)]
struct QueryExtension {
    version: String,
    #[serde(default)]
    files: ExtensionFiles,
}

#[derive(Debug, Default, Deserialize)]
struct ExtensionFiles {
    download: Option<String>,
}

/// Registry client for open-vsx style APIs.
///
/// Uses the `/-/query` endpoint, which serves the newest version matching
/// the requested target platform; API-version compatibility is the
/// registry's call, not re-checked locally.
pub struct OvsxClient {
    transport: Arc<dyn HttpTransport>,
    api_url: String,
}

impl OvsxClient {
    /// Create a client for the registry at `api_url` (e.g.
    /// `https://open-vsx.org/api`).
    pub fn new(transport: Arc<dyn HttpTransport>, api_url: impl Into<String>) -> Self {
        let api_url = api_url.into();
        Self {
            transport,
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }

    fn query_url(&self, query: &ExtensionQuery) -> String {
        let mut url = format!(
            "{}/-/query?extensionId={}&targetPlatform={}",
            self.api_url, query.id, query.target_platform
        );
        if let Some(version) = &query.version {
            url.push_str("&extensionVersion=");
            url.push_str(version);
        }
        url
    }
}

impl RegistryClient for OvsxClient {
    fn resolve_extension<'a>(
        &'a self,
        query: &'a ExtensionQuery,
    ) -> Pin<Box<dyn Future<Output = FetchResult<Option<ResolvedExtension>>> + Send + 'a>> {
        Box::pin(async move {
            let url = self.query_url(query);
            let response = self.transport.get(&url).await.map_err(|e| {
                FetchError::Registry {
                    id: query.id.clone(),
                    reason: e.to_string(),
                }
            })?;

            if response.status == 404 {
                return Ok(None);
            }
            if !response.is_ok() {
                return Err(FetchError::Registry {
                    id: query.id.clone(),
                    reason: format!("registry returned status {}", response.status),
                });
            }

            let parsed: QueryResponse =
                serde_json::from_slice(&response.body).map_err(|e| FetchError::Registry {
                    id: query.id.clone(),
                    reason: format!("unparsable registry response: {e}"),
                })?;

            let resolved = parsed
                .extensions
                .into_iter()
                .find_map(|ext| {
                    ext.files.download.map(|download_url| ResolvedExtension {
                        version: ext.version,
                        download_url,
                    })
                });

            if resolved.is_none() {
                tracing::debug!(id = %query.id, "registry has no compatible build");
            }
            Ok(resolved)
        })
    }
}
