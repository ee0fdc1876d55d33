//! Retrying downloader for resolved plugin artifacts.
//!
//! One call fetches, verifies and persists a single [`ResolvedDownload`]:
//!
//! 1. Suffix dispatch: unsupported artifact types fail before any network
//!    call.
//! 2. Idempotency: a destination that already exists is a success with
//!    zero attempts, so re-runs over a satisfied manifest are no-ops.
//! 3. Retry loop: one rate-limiter token per attempt; transport errors
//!    and retryable statuses (429/439/5xx) wait out a fixed delay, other
//!    non-200 statuses are terminal.
//! 4. Integrity: the body digest must match a pinned lock entry exactly;
//!    with no pin, the computed digest is accepted and staged
//!    (trust-on-first-use).
//! 5. Persistence: raw archive in packed mode, extracted directory
//!    otherwise.
//!
//! Every failure is caught here and handed back as a
//! [`DownloadOutcome::Failure`]; nothing a single reference does can abort
//! its siblings.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::error::{FetchError, FetchResult};
use crate::http::HttpTransport;
use crate::integrity;
use crate::lockfile::{LockEntry, Lockfile};
use crate::ratelimit::RateLimiter;
use crate::store::{ArtifactKind, ArtifactStore};
use crate::types::{DownloadOutcome, ResolvedDownload};

/// Downloads one resolved reference: fetch, verify, persist.
pub struct Downloader {
    transport: Arc<dyn HttpTransport>,
    limiter: Arc<RateLimiter>,
    lockfile: Arc<Lockfile>,
    store: Arc<ArtifactStore>,
    packed: bool,
    max_attempts: u32,
    retry_delay: Duration,
    cancel: CancellationToken,
}

impl Downloader {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        limiter: Arc<RateLimiter>,
        lockfile: Arc<Lockfile>,
        store: Arc<ArtifactStore>,
        packed: bool,
        max_attempts: u32,
        retry_delay: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            transport,
            limiter,
            lockfile,
            store,
            packed,
            max_attempts: max_attempts.max(1),
            retry_delay,
            cancel,
        }
    }

    /// Download one resolved reference. Never errors; failures come back
    /// as outcomes.
    ///
    /// `spec` is the original spec string the reference was declared with;
    /// it keys the lockfile.
    pub async fn download(&self, resolved: &ResolvedDownload, spec: &str) -> DownloadOutcome {
        match self.try_download(resolved, spec).await {
            Ok(outcome) => outcome,
            Err(reason) => DownloadOutcome::Failure {
                id: resolved.id.clone(),
                reason,
            },
        }
    }

    async fn try_download(
        &self,
        resolved: &ResolvedDownload,
        spec: &str,
    ) -> FetchResult<DownloadOutcome> {
        let url = &resolved.download_url;
        let kind =
            ArtifactKind::from_url(url).ok_or_else(|| FetchError::UnsupportedArtifact {
                id: resolved.id.clone(),
                url: url.clone(),
            })?;

        let dest = self.store.destination(&resolved.id, kind, self.packed);
        if self.store.is_present(&dest) {
            tracing::info!(id = %resolved.id, "already downloaded - skipping");
            return Ok(DownloadOutcome::Success {
                id: resolved.id.clone(),
                version: resolved.version.clone(),
                attempts: 0,
            });
        }

        let (body, attempts) = self.fetch_with_retry(&resolved.id, url).await?;

        // Verify against the pinned integrity, or pin on first download.
        let actual = integrity::digest(&body);
        match self.lockfile.get(spec) {
            Some(entry) if entry.integrity != actual => {
                return Err(FetchError::IntegrityMismatch {
                    id: resolved.id.clone(),
                    expected: entry.integrity,
                    actual,
                });
            }
            Some(_) => {}
            None => {
                self.lockfile.put(
                    spec,
                    LockEntry {
                        resolved: url.clone(),
                        integrity: actual,
                    },
                );
            }
        }

        if self.packed {
            self.store.write_packed(&dest, &body)?;
        } else {
            self.store.write_unpacked(&dest, kind, &body)?;
        }

        if attempts > 1 {
            tracing::info!(id = %resolved.id, attempts, "downloaded successfully (after retries)");
        } else {
            tracing::info!(id = %resolved.id, "downloaded successfully");
        }

        Ok(DownloadOutcome::Success {
            id: resolved.id.clone(),
            version: resolved.version.clone(),
            attempts,
        })
    }

    /// The retry state machine: returns the body and the number of
    /// attempts it took, or the terminal error.
    async fn fetch_with_retry(&self, id: &str, url: &str) -> FetchResult<(Bytes, u32)> {
        let mut last_reason = String::new();

        for attempt in 1..=self.max_attempts {
            if attempt > 1 {
                tokio::time::sleep(self.retry_delay).await;
            }
            if self.cancel.is_cancelled() {
                return Err(FetchError::Cancelled { id: id.to_string() });
            }

            // One token per attempt, taken right before the request so the
            // token is never held across the retry delay.
            self.limiter.acquire(1).await;

            match self.transport.get(url).await {
                Err(e) => {
                    tracing::debug!(id = %id, attempt, error = %e, "transport error, will retry");
                    last_reason = e.to_string();
                }
                Ok(response) if response.is_ok() => {
                    return Ok((response.body, attempt));
                }
                Ok(response) if response.is_retryable() => {
                    tracing::debug!(
                        id = %id,
                        attempt,
                        status = response.status,
                        "retryable status"
                    );
                    last_reason = format!("status {}", response.status);
                }
                Ok(response) => {
                    return Err(FetchError::HttpStatus {
                        status: response.status,
                        url: url.to_string(),
                    });
                }
            }
        }

        Err(FetchError::RetriesExhausted {
            url: url.to_string(),
            attempts: self.max_attempts,
            reason: last_reason,
        })
    }
}
