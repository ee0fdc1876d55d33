//! Discovery of transitive plugin references on the filesystem.
//!
//! After a download wave the scanner walks the plugins directory, reads the
//! `package.json` each downloaded plugin carries and collects the ids it
//! pulls in: extension-pack members in one pass, extension dependencies in
//! another. Output is a flat deduplicated set; no version information
//! exists at this stage, so the next wave resolves every id through the
//! registry.

use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{FetchError, FetchResult};
use crate::manifest::ExtensionManifest;

/// Which identifier list a scan pass collects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestField {
    /// `extensionPack`: plugins that should be installed alongside.
    ExtensionPack,
    /// `extensionDependencies`: plugins required to function.
    ExtensionDependencies,
}

impl ManifestField {
    fn name(&self) -> &'static str {
        match self {
            Self::ExtensionPack => "extensionPack",
            Self::ExtensionDependencies => "extensionDependencies",
        }
    }
}

/// Walks downloaded plugin directories and extracts declared plugin ids.
pub struct ManifestScanner {
    plugins_dir: PathBuf,
    excluded: HashSet<String>,
}

impl ManifestScanner {
    pub fn new(plugins_dir: impl Into<PathBuf>, excluded: HashSet<String>) -> Self {
        Self {
            plugins_dir: plugins_dir.into(),
            excluded,
        }
    }

    /// Collect the deduplicated ids declared under `field` across every
    /// plugin manifest below the plugins directory.
    ///
    /// Excluded ids are reported once, naming the excluding manifest, then
    /// dropped. The report is an advisory, not an error.
    pub fn collect(&self, field: ManifestField) -> FetchResult<BTreeSet<String>> {
        let mut ids = BTreeSet::new();
        if !self.plugins_dir.exists() {
            return Ok(ids);
        }

        for manifest_path in self.manifest_paths(&self.plugins_dir)? {
            let manifest = match ExtensionManifest::load(&manifest_path) {
                Ok(manifest) => manifest,
                Err(e) => {
                    // A plugin shipping a broken package.json should not
                    // sink the whole scan.
                    tracing::warn!(
                        path = %manifest_path.display(),
                        error = %e,
                        "skipping unreadable plugin manifest"
                    );
                    continue;
                }
            };

            let declared = match field {
                ManifestField::ExtensionPack => &manifest.extension_pack,
                ManifestField::ExtensionDependencies => &manifest.extension_dependencies,
            };

            for id in declared {
                if self.excluded.contains(id) {
                    tracing::warn!(
                        id = %id,
                        declared_by = %manifest.display_name(&manifest_path),
                        field = field.name(),
                        "excluded by theiaPluginsExcludeIds"
                    );
                    continue;
                }
                ids.insert(id.clone());
            }
        }

        Ok(ids)
    }

    /// Recursively gather `package.json` paths, skipping `node_modules`.
    fn manifest_paths(&self, dir: &Path) -> FetchResult<Vec<PathBuf>> {
        let mut paths = Vec::new();
        let entries = fs::read_dir(dir).map_err(|e| FetchError::ReadFailed {
            path: dir.to_path_buf(),
            source: e,
        })?;

        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                if path.file_name().is_some_and(|n| n == "node_modules") {
                    continue;
                }
                paths.extend(self.manifest_paths(&path)?);
            } else if path.file_name().is_some_and(|n| n == "package.json") {
                paths.push(path);
            }
        }

        Ok(paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn plugin_with_manifest(plugins_dir: &Path, id: &str, json: &str) {
        let dir = plugins_dir.join(id);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("package.json"), json).unwrap();
    }

    #[test]
    fn test_collect_extension_pack_ids() {
        let temp = TempDir::new().unwrap();
        plugin_with_manifest(
            temp.path(),
            "pack.one",
            r#"{"name": "one", "extensionPack": ["a.x", "b.y"]}"#,
        );
        plugin_with_manifest(
            temp.path(),
            "pack.two",
            r#"{"name": "two", "extensionPack": ["b.y", "c.z"]}"#,
        );

        let scanner = ManifestScanner::new(temp.path(), HashSet::new());
        let ids = scanner.collect(ManifestField::ExtensionPack).unwrap();

        let expected: BTreeSet<String> =
            ["a.x", "b.y", "c.z"].iter().map(|s| s.to_string()).collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn test_collect_dependencies_separately_from_packs() {
        let temp = TempDir::new().unwrap();
        plugin_with_manifest(
            temp.path(),
            "plugin.a",
            r#"{"extensionPack": ["p.one"], "extensionDependencies": ["d.one"]}"#,
        );

        let scanner = ManifestScanner::new(temp.path(), HashSet::new());
        let packs = scanner.collect(ManifestField::ExtensionPack).unwrap();
        let deps = scanner
            .collect(ManifestField::ExtensionDependencies)
            .unwrap();

        assert!(packs.contains("p.one") && !packs.contains("d.one"));
        assert!(deps.contains("d.one") && !deps.contains("p.one"));
    }

    #[test]
    fn test_excluded_ids_are_dropped() {
        let temp = TempDir::new().unwrap();
        plugin_with_manifest(
            temp.path(),
            "pack.one",
            r#"{"name": "one", "extensionPack": ["keep.me", "drop.me"]}"#,
        );

        let excluded: HashSet<String> = ["drop.me".to_string()].into_iter().collect();
        let scanner = ManifestScanner::new(temp.path(), excluded);
        let ids = scanner.collect(ManifestField::ExtensionPack).unwrap();

        assert!(ids.contains("keep.me"));
        assert!(!ids.contains("drop.me"));
    }

    #[test]
    fn test_node_modules_is_skipped() {
        let temp = TempDir::new().unwrap();
        plugin_with_manifest(temp.path(), "plugin.a", r#"{"extensionPack": ["real.id"]}"#);
        plugin_with_manifest(
            &temp.path().join("plugin.a"),
            "node_modules/dep",
            r#"{"extensionPack": ["phantom.id"]}"#,
        );

        let scanner = ManifestScanner::new(temp.path(), HashSet::new());
        let ids = scanner.collect(ManifestField::ExtensionPack).unwrap();

        assert!(ids.contains("real.id"));
        assert!(!ids.contains("phantom.id"));
    }

    #[test]
    fn test_nested_manifests_are_found() {
        let temp = TempDir::new().unwrap();
        plugin_with_manifest(
            temp.path(),
            "plugin.a/extension/sub",
            r#"{"extensionDependencies": ["deep.id"]}"#,
        );

        let scanner = ManifestScanner::new(temp.path(), HashSet::new());
        let ids = scanner
            .collect(ManifestField::ExtensionDependencies)
            .unwrap();
        assert!(ids.contains("deep.id"));
    }

    #[test]
    fn test_broken_manifest_is_skipped() {
        let temp = TempDir::new().unwrap();
        plugin_with_manifest(temp.path(), "plugin.good", r#"{"extensionPack": ["ok.id"]}"#);
        plugin_with_manifest(temp.path(), "plugin.bad", "{ not json");

        let scanner = ManifestScanner::new(temp.path(), HashSet::new());
        let ids = scanner.collect(ManifestField::ExtensionPack).unwrap();
        assert_eq!(ids.len(), 1);
        assert!(ids.contains("ok.id"));
    }

    #[test]
    fn test_missing_plugins_dir_is_empty() {
        let scanner = ManifestScanner::new("/nonexistent/plugins", HashSet::new());
        let ids = scanner.collect(ManifestField::ExtensionPack).unwrap();
        assert!(ids.is_empty());
    }
}
