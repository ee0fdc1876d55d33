//! HTTP transport abstraction for testability.
//!
//! Wire-level HTTP is out of the engine's hands; the transport returns the
//! status code and body and the callers drive the status-code-based retry
//! policy. The trait uses `Pin<Box<dyn Future>>` so it stays dyn-compatible
//! and can be injected as `Arc<dyn HttpTransport>`.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;

use crate::error::{FetchError, FetchResult};

/// A raw HTTP response: status code plus the full body.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }

    /// Statuses the downloader treats as transient (worth retrying).
    pub fn is_retryable(&self) -> bool {
        self.status == 429 || self.status == 439 || self.status >= 500
    }
}

/// Trait for HTTP GET operations.
///
/// Production code uses [`ReqwestTransport`]; tests inject a scripted mock.
pub trait HttpTransport: Send + Sync {
    /// Perform an HTTP GET request, returning status and body.
    ///
    /// Errors only on transport-level failure (DNS, TLS, timeout); any
    /// status code that made it back is returned as a response.
    fn get<'a>(
        &'a self,
        url: &'a str,
    ) -> Pin<Box<dyn Future<Output = FetchResult<HttpResponse>> + Send + 'a>>;
}

/// Real HTTP transport backed by reqwest.
#[derive(Debug)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Create a transport with the given request timeout.
    pub fn new(timeout: Duration) -> FetchResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Transport {
                url: String::new(),
                reason: format!("failed to create HTTP client: {e}"),
            })?;
        Ok(Self { client })
    }
}

impl HttpTransport for ReqwestTransport {
    fn get<'a>(
        &'a self,
        url: &'a str,
    ) -> Pin<Box<dyn Future<Output = FetchResult<HttpResponse>> + Send + 'a>> {
        Box::pin(async move {
            let response =
                self.client
                    .get(url)
                    .send()
                    .await
                    .map_err(|e| FetchError::Transport {
                        url: url.to_string(),
                        reason: e.to_string(),
                    })?;

            let status = response.status().as_u16();
            let body = response.bytes().await.map_err(|e| FetchError::Transport {
                url: url.to_string(),
                reason: format!("failed to read response body: {e}"),
            })?;

            Ok(HttpResponse { status, body })
        })
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;

    /// Scripted HTTP transport for tests.
    ///
    /// Responses are queued per URL and consumed in order; a request for a
    /// URL with an empty queue fails the test-visible way (transport error)
    /// so unexpected network calls show up in assertions.
    #[derive(Default)]
    pub struct MockTransport {
        responses: Mutex<HashMap<String, VecDeque<FetchResult<HttpResponse>>>>,
        requests: AtomicUsize,
        log: Mutex<Vec<String>>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue a response for a URL.
        pub fn enqueue(&self, url: &str, result: FetchResult<HttpResponse>) {
            self.responses
                .lock()
                .entry(url.to_string())
                .or_default()
                .push_back(result);
        }

        /// Queue a 200 response with the given body.
        pub fn enqueue_ok(&self, url: &str, body: &[u8]) {
            self.enqueue(
                url,
                Ok(HttpResponse {
                    status: 200,
                    body: Bytes::copy_from_slice(body),
                }),
            );
        }

        /// Queue an empty-bodied response with the given status.
        pub fn enqueue_status(&self, url: &str, status: u16) {
            self.enqueue(
                url,
                Ok(HttpResponse {
                    status,
                    body: Bytes::new(),
                }),
            );
        }

        /// Total number of requests issued so far.
        pub fn request_count(&self) -> usize {
            self.requests.load(Ordering::SeqCst)
        }

        /// URLs requested, in order.
        pub fn requested_urls(&self) -> Vec<String> {
            self.log.lock().clone()
        }
    }

    impl HttpTransport for MockTransport {
        fn get<'a>(
            &'a self,
            url: &'a str,
        ) -> Pin<Box<dyn Future<Output = FetchResult<HttpResponse>> + Send + 'a>> {
            Box::pin(async move {
                self.requests.fetch_add(1, Ordering::SeqCst);
                self.log.lock().push(url.to_string());

                let next = self.responses.lock().get_mut(url).and_then(|q| q.pop_front());
                match next {
                    Some(result) => result,
                    None => Err(FetchError::Transport {
                        url: url.to_string(),
                        reason: "unexpected request (no scripted response)".to_string(),
                    }),
                }
            })
        }
    }

    #[tokio::test]
    async fn test_mock_transport_scripted_responses() {
        let mock = MockTransport::new();
        mock.enqueue_status("http://example.com/a", 500);
        mock.enqueue_ok("http://example.com/a", b"payload");

        let first = mock.get("http://example.com/a").await.unwrap();
        assert_eq!(first.status, 500);
        assert!(first.is_retryable());

        let second = mock.get("http://example.com/a").await.unwrap();
        assert!(second.is_ok());
        assert_eq!(&second.body[..], b"payload");

        assert_eq!(mock.request_count(), 2);
    }

    #[tokio::test]
    async fn test_mock_transport_unscripted_is_error() {
        let mock = MockTransport::new();
        let result = mock.get("http://example.com/unknown").await;
        assert!(result.is_err());
        assert_eq!(mock.request_count(), 1);
    }

    #[test]
    fn test_retryable_statuses() {
        for status in [429, 439, 500, 502, 503] {
            let response = HttpResponse {
                status,
                body: Bytes::new(),
            };
            assert!(response.is_retryable(), "{status} should be retryable");
        }
        for status in [200, 301, 401, 403, 404] {
            let response = HttpResponse {
                status,
                body: Bytes::new(),
            };
            assert!(!response.is_retryable(), "{status} should be terminal");
        }
    }
}
