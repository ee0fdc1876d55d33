//! Resolution of raw plugin references to concrete downloads.
//!
//! Three paths, tried in order:
//!
//! 1. Literal URL specs bypass both the registry and the lockfile's
//!    `resolved` field entirely (integrity is still recorded on download).
//! 2. Registry specs with a lockfile entry reuse the pinned URL with no
//!    registry call; pinning transitive resolution across runs is the
//!    lockfile's main job.
//! 3. Everything else goes to the registry, under the shared rate limiter.
//!
//! `${targetPlatform}` placeholders are substituted before a URL leaves
//! this module.

use std::sync::Arc;

use crate::error::{FetchError, FetchResult};
use crate::lockfile::Lockfile;
use crate::ratelimit::RateLimiter;
use crate::registry::{ExtensionQuery, RegistryClient};
use crate::types::{PluginReference, ResolvedDownload};

/// Placeholder substituted with the `<os>-<arch>` tag in literal URLs.
pub const TARGET_PLATFORM_PLACEHOLDER: &str = "${targetPlatform}";

/// Detect the registry target-platform tag for the current host.
///
/// Falls back to `universal` for platforms the registry has no tag for.
pub fn detect_target_platform() -> String {
    let os = match std::env::consts::OS {
        "windows" => "win32",
        "macos" => "darwin",
        "linux" => "linux",
        _ => return "universal".to_string(),
    };
    let arch = match std::env::consts::ARCH {
        "x86_64" => "x64",
        "aarch64" => "arm64",
        "arm" => "armhf",
        _ => return "universal".to_string(),
    };
    format!("{os}-{arch}")
}

/// Maps a [`PluginReference`] to a [`ResolvedDownload`].
pub struct ReferenceResolver {
    registry: Arc<dyn RegistryClient>,
    lockfile: Arc<Lockfile>,
    limiter: Arc<RateLimiter>,
    api_version: String,
    target_platform: String,
}

impl ReferenceResolver {
    pub fn new(
        registry: Arc<dyn RegistryClient>,
        lockfile: Arc<Lockfile>,
        limiter: Arc<RateLimiter>,
        api_version: impl Into<String>,
        target_platform: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            lockfile,
            limiter,
            api_version: api_version.into(),
            target_platform: target_platform.into(),
        }
    }

    /// Resolve one reference to a concrete download.
    ///
    /// Resolution failures are per-reference and non-fatal to the batch;
    /// the caller converts them into failure outcomes.
    pub async fn resolve(&self, reference: &PluginReference) -> FetchResult<ResolvedDownload> {
        // Path 1: literal URL.
        if is_literal_url(&reference.spec) {
            return Ok(ResolvedDownload {
                id: reference.id.clone(),
                download_url: self.substitute(&reference.spec),
                version: None,
            });
        }

        let (name, version) = parse_registry_spec(&reference.spec)?;

        // Path 2: pinned by the lockfile.
        if let Some(entry) = self.lockfile.get(&reference.spec) {
            tracing::debug!(
                id = %reference.id,
                spec = %reference.spec,
                "resolved from lockfile"
            );
            return Ok(ResolvedDownload {
                id: reference.id.clone(),
                download_url: self.substitute(&entry.resolved),
                version: version.map(String::from),
            });
        }

        // Path 3: ask the registry.
        let query = ExtensionQuery {
            id: name.to_string(),
            version: version.map(String::from),
            target_platform: self.target_platform.clone(),
            api_version: self.api_version.clone(),
        };
        self.limiter.acquire(1).await;
        let resolved = self.registry.resolve_extension(&query).await?;

        match resolved {
            Some(extension) => Ok(ResolvedDownload {
                id: reference.id.clone(),
                download_url: self.substitute(&extension.download_url),
                version: Some(extension.version),
            }),
            None => Err(FetchError::NoCompatibleVersion {
                id: name.to_string(),
                api_version: self.api_version.clone(),
                target_platform: self.target_platform.clone(),
            }),
        }
    }

    fn substitute(&self, url: &str) -> String {
        url.replace(TARGET_PLATFORM_PLACEHOLDER, &self.target_platform)
    }
}

/// A spec with a URL scheme is a literal reference.
fn is_literal_url(spec: &str) -> bool {
    spec.contains("://")
}

/// Split a registry spec into `name` and optional `versionOrTag`.
///
/// The separator is the last `@`: extension names contain dots but never
/// `@`, so `ns.name@1.2.3` and plain `ns.name` both parse.
fn parse_registry_spec(spec: &str) -> FetchResult<(&str, Option<&str>)> {
    let malformed = |reason: &str| FetchError::MalformedSpec {
        spec: spec.to_string(),
        reason: reason.to_string(),
    };

    if spec.trim().is_empty() {
        return Err(malformed("empty spec"));
    }
    if spec.chars().any(char::is_whitespace) {
        return Err(malformed("spec contains whitespace"));
    }

    let (name, version) = match spec.rsplit_once('@') {
        Some((name, version)) => {
            if version.is_empty() {
                return Err(malformed("empty version after '@'"));
            }
            (name, Some(version))
        }
        None => (spec, None),
    };

    if name.is_empty() {
        return Err(malformed("empty extension name"));
    }
    if !name.contains('.') {
        return Err(malformed("expected 'namespace.name'"));
    }

    Ok((name, version))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lockfile::LockEntry;
    use crate::registry::tests::MockRegistry;
    use tempfile::TempDir;

    fn resolver_with(
        registry: Arc<MockRegistry>,
        lockfile: Arc<Lockfile>,
    ) -> ReferenceResolver {
        ReferenceResolver::new(
            registry,
            lockfile,
            Arc::new(RateLimiter::new(1000)),
            "1.50.0",
            "linux-x64",
        )
    }

    fn empty_lockfile(temp: &TempDir) -> Arc<Lockfile> {
        Arc::new(Lockfile::load(temp.path().join("lock.json")))
    }

    #[tokio::test]
    async fn test_literal_url_bypasses_registry_and_lockfile() {
        let temp = TempDir::new().unwrap();
        let registry = Arc::new(MockRegistry::new());
        let resolver = resolver_with(registry.clone(), empty_lockfile(&temp));

        let reference =
            PluginReference::new("vscode.json", "https://example.com/json-1.0.0.vsix");
        let resolved = resolver.resolve(&reference).await.unwrap();

        assert_eq!(resolved.download_url, "https://example.com/json-1.0.0.vsix");
        assert_eq!(resolved.version, None);
        assert_eq!(registry.lookup_count(), 0);
    }

    #[tokio::test]
    async fn test_literal_url_placeholder_substitution() {
        let temp = TempDir::new().unwrap();
        let resolver = resolver_with(Arc::new(MockRegistry::new()), empty_lockfile(&temp));

        let reference = PluginReference::new(
            "tool.native",
            "https://example.com/native-${targetPlatform}.vsix",
        );
        let resolved = resolver.resolve(&reference).await.unwrap();
        assert_eq!(
            resolved.download_url,
            "https://example.com/native-linux-x64.vsix"
        );
    }

    #[tokio::test]
    async fn test_lockfile_hit_skips_registry() {
        let temp = TempDir::new().unwrap();
        let registry = Arc::new(MockRegistry::new());
        let lockfile = empty_lockfile(&temp);
        lockfile.put(
            "redhat.java@1.2.3",
            LockEntry {
                resolved: "https://pinned.example.com/java.vsix".to_string(),
                integrity: "sha512-abc".to_string(),
            },
        );

        let resolver = resolver_with(registry.clone(), lockfile);
        let reference = PluginReference::new("redhat.java", "redhat.java@1.2.3");
        let resolved = resolver.resolve(&reference).await.unwrap();

        assert_eq!(
            resolved.download_url,
            "https://pinned.example.com/java.vsix"
        );
        assert_eq!(resolved.version.as_deref(), Some("1.2.3"));
        assert_eq!(registry.lookup_count(), 0);
    }

    #[tokio::test]
    async fn test_lockfile_miss_goes_to_registry() {
        let temp = TempDir::new().unwrap();
        let registry = Arc::new(MockRegistry::new());
        registry.insert(
            "redhat.java",
            "1.9.0",
            "https://registry.test/dl/java-1.9.0.vsix",
        );

        let resolver = resolver_with(registry.clone(), empty_lockfile(&temp));
        let reference = PluginReference::new("redhat.java", "redhat.java");
        let resolved = resolver.resolve(&reference).await.unwrap();

        assert_eq!(resolved.version.as_deref(), Some("1.9.0"));
        assert_eq!(
            resolved.download_url,
            "https://registry.test/dl/java-1.9.0.vsix"
        );
        assert_eq!(registry.lookup_count(), 1);
    }

    #[tokio::test]
    async fn test_no_compatible_version_is_failure() {
        let temp = TempDir::new().unwrap();
        let resolver = resolver_with(Arc::new(MockRegistry::new()), empty_lockfile(&temp));

        let reference = PluginReference::new("no.such", "no.such@latest");
        let result = resolver.resolve(&reference).await;
        match result {
            Err(FetchError::NoCompatibleVersion { id, .. }) => assert_eq!(id, "no.such"),
            other => panic!("expected NoCompatibleVersion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_specs() {
        let temp = TempDir::new().unwrap();
        let resolver = resolver_with(Arc::new(MockRegistry::new()), empty_lockfile(&temp));

        for spec in ["", "   ", "no-namespace", "ns.name@", "has space.name"] {
            let reference = PluginReference::new("x", spec);
            let result = resolver.resolve(&reference).await;
            assert!(
                matches!(result, Err(FetchError::MalformedSpec { .. })),
                "spec {spec:?} should be malformed"
            );
        }
    }

    #[test]
    fn test_parse_registry_spec() {
        assert_eq!(
            parse_registry_spec("redhat.java").unwrap(),
            ("redhat.java", None)
        );
        assert_eq!(
            parse_registry_spec("redhat.java@1.2.3").unwrap(),
            ("redhat.java", Some("1.2.3"))
        );
        assert_eq!(
            parse_registry_spec("redhat.java@latest").unwrap(),
            ("redhat.java", Some("latest"))
        );
    }

    #[test]
    fn test_detect_target_platform_shape() {
        let tag = detect_target_platform();
        assert!(tag == "universal" || tag.contains('-'));
    }
}
