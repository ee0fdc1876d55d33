//! Configuration for the fetch engine.

use std::path::PathBuf;
use std::time::Duration;

/// Default open-vsx registry API url.
pub const DEFAULT_API_URL: &str = "https://open-vsx.org/api";

/// Default supported vscode API version, used for extension compatibility.
pub const DEFAULT_API_VERSION: &str = "1.50.0";

/// Default registry rate limit in requests per second.
///
/// Matches the published open-vsx limit; one shared bucket gates every
/// resolution and download attempt.
pub const DEFAULT_RATE_LIMIT: u32 = 15;

/// Configuration for the fetch engine.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Path to the root manifest (`package.json` style file declaring
    /// `theiaPlugins`). The plugins directory and the lockfile path are
    /// derived from it.
    pub manifest_path: PathBuf,

    /// Keep `.vsix`/`.theia` artifacts as files instead of extracting them.
    pub packed: bool,

    /// Report failures but still signal overall success.
    pub ignore_errors: bool,

    /// The open-vsx registry API url.
    pub api_url: String,

    /// The supported vscode API version.
    pub api_version: String,

    /// Registry/download operations allowed per second.
    pub rate_limit: u32,

    /// Maximum HTTP attempts per download.
    pub max_attempts: u32,

    /// Fixed delay between download attempts.
    pub retry_delay: Duration,

    /// Download references within a wave concurrently.
    ///
    /// Disable for deterministic test runs or registries that forbid
    /// concurrent access.
    pub parallel: bool,

    /// HTTP request timeout.
    pub request_timeout: Duration,

    /// Registry target-platform tag (`linux-x64`, `darwin-arm64`, ...).
    ///
    /// `None` detects the current OS/architecture.
    pub target_platform: Option<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            manifest_path: PathBuf::from("package.json"),
            packed: false,
            ignore_errors: false,
            api_url: DEFAULT_API_URL.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            rate_limit: DEFAULT_RATE_LIMIT,
            max_attempts: 5,
            retry_delay: Duration::from_secs(2),
            parallel: true,
            request_timeout: Duration::from_secs(30),
            target_platform: None,
        }
    }
}

impl FetchConfig {
    /// Create a configuration for the given root manifest.
    pub fn new(manifest_path: impl Into<PathBuf>) -> Self {
        Self {
            manifest_path: manifest_path.into(),
            ..Default::default()
        }
    }

    /// Keep archives packed instead of extracting them.
    pub fn with_packed(mut self, packed: bool) -> Self {
        self.packed = packed;
        self
    }

    /// Make download failures non-fatal to the run.
    pub fn with_ignore_errors(mut self, ignore: bool) -> Self {
        self.ignore_errors = ignore;
        self
    }

    /// Set the registry API url.
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    /// Set the supported vscode API version.
    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }

    /// Set the shared rate limit in operations per second.
    pub fn with_rate_limit(mut self, per_second: u32) -> Self {
        self.rate_limit = per_second.max(1);
        self
    }

    /// Set the retry policy for downloads.
    pub fn with_retry_policy(mut self, max_attempts: u32, delay: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.retry_delay = delay;
        self
    }

    /// Enable or disable concurrent downloads within a wave.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Set the HTTP request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Override the detected target platform tag.
    pub fn with_target_platform(mut self, tag: impl Into<String>) -> Self {
        self.target_platform = Some(tag.into());
        self
    }
}
