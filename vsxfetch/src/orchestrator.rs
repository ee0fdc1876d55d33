//! The fetch engine: wires the pipeline together and drives the waves.
//!
//! ```text
//!                        ┌────────────┐
//!   root manifest ─────► │  resolver  │ ◄──── lockfile / registry
//!                        └─────┬──────┘
//!                              ▼
//!                        ┌────────────┐
//!                        │ downloader │ ◄──── rate limiter / transport
//!                        └─────┬──────┘
//!                              ▼
//!                     plugins directory
//!                              │
//!                 scanner (extensionPack, then
//!                 extensionDependencies) feeds
//!                 derived references back in
//! ```
//!
//! A run is three waves at most: the root manifest's references, then ids
//! discovered via `extensionPack`, then ids discovered via
//! `extensionDependencies`. Each id is downloaded at most once per run; the
//! scan waves only see ids no earlier wave claimed. Failures never abort
//! the run, they are aggregated into the final [`FetchReport`], and the
//! lockfile is flushed exactly once on the way out so successful downloads
//! stay pinned even when siblings failed.

use std::collections::HashSet;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::FetchConfig;
use crate::download::Downloader;
use crate::error::{FetchError, FetchResult};
use crate::http::{HttpTransport, ReqwestTransport};
use crate::lockfile::{lockfile_path, Lockfile};
use crate::manifest::RootManifest;
use crate::ratelimit::RateLimiter;
use crate::registry::{OvsxClient, RegistryClient};
use crate::resolver::{detect_target_platform, ReferenceResolver};
use crate::scanner::{ManifestField, ManifestScanner};
use crate::store::{ArchiveExtractor, ArtifactStore, ShellExtractor};
use crate::types::{DownloadOutcome, PluginReference};

/// Which wave a batch of references belongs to, for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Wave {
    Root,
    ExtensionPacks,
    ExtensionDependencies,
}

impl Wave {
    fn name(&self) -> &'static str {
        match self {
            Self::Root => "root",
            Self::ExtensionPacks => "extensionPack",
            Self::ExtensionDependencies => "extensionDependencies",
        }
    }
}

/// Aggregated result of a full run.
#[derive(Debug)]
pub struct FetchReport {
    outcomes: Vec<DownloadOutcome>,
    ignore_errors: bool,
}

impl FetchReport {
    /// Every per-plugin outcome, in wave order.
    pub fn outcomes(&self) -> &[DownloadOutcome] {
        &self.outcomes
    }

    /// The failed outcomes only.
    pub fn failures(&self) -> Vec<&DownloadOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success()).collect()
    }

    /// Whether the run counts as successful.
    ///
    /// With `ignore_errors` set, failures are reported but do not fail
    /// the run.
    pub fn succeeded(&self) -> bool {
        self.ignore_errors || self.failures().is_empty()
    }
}

/// Orchestrates a full plugin fetch run.
pub struct FetchEngine {
    config: FetchConfig,
    transport: Arc<dyn HttpTransport>,
    registry: Arc<dyn RegistryClient>,
    extractor: Arc<dyn ArchiveExtractor>,
}

impl FetchEngine {
    /// Create an engine from configuration, with the real HTTP transport
    /// and registry client.
    pub fn new(config: FetchConfig) -> FetchResult<Self> {
        let transport: Arc<dyn HttpTransport> =
            Arc::new(ReqwestTransport::new(config.request_timeout)?);
        let registry: Arc<dyn RegistryClient> =
            Arc::new(OvsxClient::new(transport.clone(), config.api_url.clone()));
        Ok(Self {
            config,
            transport,
            registry,
            extractor: Arc::new(ShellExtractor::new()),
        })
    }

    /// Replace the HTTP transport. The registry client is rebuilt on top
    /// of the new transport; inject a registry afterwards to override it.
    pub fn with_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.registry = Arc::new(OvsxClient::new(
            transport.clone(),
            self.config.api_url.clone(),
        ));
        self.transport = transport;
        self
    }

    /// Replace the registry client.
    pub fn with_registry(mut self, registry: Arc<dyn RegistryClient>) -> Self {
        self.registry = registry;
        self
    }

    /// Replace the archive extractor.
    pub fn with_extractor(mut self, extractor: Arc<dyn ArchiveExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Run the full pipeline: root wave, extension-pack wave, dependency
    /// wave, report.
    ///
    /// Returns `Err` only when the run cannot start at all (unreadable
    /// root manifest, plugins directory cannot be created); everything
    /// after that is collected per plugin into the report. Cancellation
    /// stops new work and falls through to reporting.
    pub async fn run(&self, cancel: CancellationToken) -> FetchResult<FetchReport> {
        let manifest = RootManifest::load(&self.config.manifest_path)?;
        let references = manifest.plugin_references();
        let plugins_dir = manifest.plugins_dir(&self.config.manifest_path);

        let lockfile = Arc::new(Lockfile::load(lockfile_path(&self.config.manifest_path)));
        let store = Arc::new(ArtifactStore::with_extractor(
            &plugins_dir,
            self.extractor.clone(),
        ));
        store.ensure_root()?;

        let limiter = Arc::new(RateLimiter::new(self.config.rate_limit));
        let target_platform = self
            .config
            .target_platform
            .clone()
            .unwrap_or_else(detect_target_platform);

        tracing::info!(
            manifest = %self.config.manifest_path.display(),
            plugins_dir = %plugins_dir.display(),
            target_platform = %target_platform,
            declared = references.len(),
            "starting plugin fetch"
        );

        let resolver = ReferenceResolver::new(
            self.registry.clone(),
            lockfile.clone(),
            limiter.clone(),
            self.config.api_version.clone(),
            target_platform,
        );
        let downloader = Downloader::new(
            self.transport.clone(),
            limiter,
            lockfile.clone(),
            store,
            self.config.packed,
            self.config.max_attempts,
            self.config.retry_delay,
            cancel.clone(),
        );
        let excluded: HashSet<String> = manifest
            .theia_plugins_exclude_ids
            .iter()
            .cloned()
            .collect();
        let scanner = ManifestScanner::new(&plugins_dir, excluded);

        let mut seen: HashSet<String> = references.iter().map(|r| r.id.clone()).collect();
        let mut outcomes = self
            .run_wave(Wave::Root, references, &resolver, &downloader, &cancel)
            .await;

        // Scan what just landed; each wave only downloads ids no earlier
        // wave claimed.
        let scan_waves = [
            (ManifestField::ExtensionPack, Wave::ExtensionPacks),
            (
                ManifestField::ExtensionDependencies,
                Wave::ExtensionDependencies,
            ),
        ];
        for (field, wave) in scan_waves {
            if cancel.is_cancelled() {
                tracing::info!("cancelled, skipping remaining waves");
                break;
            }
            let fresh: Vec<PluginReference> = scanner
                .collect(field)?
                .into_iter()
                .filter(|id| seen.insert(id.clone()))
                .map(PluginReference::derived)
                .collect();
            outcomes.extend(
                self.run_wave(wave, fresh, &resolver, &downloader, &cancel)
                    .await,
            );
        }

        let failed = outcomes.iter().filter(|o| !o.is_success()).count();
        for outcome in &outcomes {
            if let DownloadOutcome::Failure { id, reason } = outcome {
                tracing::error!(id = %id, error = %reason, "plugin could not be downloaded");
            }
        }
        tracing::info!(total = outcomes.len(), failed, "plugin fetch finished");

        lockfile.flush()?;
        Ok(FetchReport {
            outcomes,
            ignore_errors: self.config.ignore_errors,
        })
    }

    async fn run_wave(
        &self,
        wave: Wave,
        references: Vec<PluginReference>,
        resolver: &ReferenceResolver,
        downloader: &Downloader,
        cancel: &CancellationToken,
    ) -> Vec<DownloadOutcome> {
        if references.is_empty() {
            return Vec::new();
        }
        tracing::info!(wave = wave.name(), count = references.len(), "download wave");

        if self.config.parallel {
            let futures = references
                .iter()
                .map(|reference| self.process(reference, resolver, downloader, cancel));
            futures::future::join_all(futures).await
        } else {
            let mut outcomes = Vec::with_capacity(references.len());
            for reference in &references {
                outcomes
                    .push(self.process(reference, resolver, downloader, cancel).await);
            }
            outcomes
        }
    }

    async fn process(
        &self,
        reference: &PluginReference,
        resolver: &ReferenceResolver,
        downloader: &Downloader,
        cancel: &CancellationToken,
    ) -> DownloadOutcome {
        if cancel.is_cancelled() {
            return DownloadOutcome::Failure {
                id: reference.id.clone(),
                reason: FetchError::Cancelled {
                    id: reference.id.clone(),
                },
            };
        }
        match resolver.resolve(reference).await {
            Ok(resolved) => downloader.download(&resolved, &reference.spec).await,
            Err(reason) => DownloadOutcome::Failure {
                id: reference.id.clone(),
                reason,
            },
        }
    }
}
