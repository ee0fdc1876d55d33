//! Root and plugin-local manifest parsing.
//!
//! Two JSON shapes flow into the engine:
//!
//! - The root manifest (a `package.json` style file) declaring the plugins
//!   directory, the plugin references to download and the excluded ids.
//! - The manifest each downloaded plugin carries (`package.json` inside the
//!   extracted artifact), which may pull in further ids via `extensionPack`
//!   and `extensionDependencies`. Read fresh on every scan, never persisted.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;

use crate::error::{FetchError, FetchResult};
use crate::types::PluginReference;

fn default_plugins_dir() -> String {
    "plugins".to_string()
}

/// The root manifest declaring which plugins to download.
#[derive(Debug, Clone, Deserialize)]
pub struct RootManifest {
    /// Directory the plugins are downloaded into, relative to the manifest.
    #[serde(rename = "pluginsDir", default = "default_plugins_dir")]
    pub plugins_dir: String,

    /// Map from plugin id to spec (literal URL or registry reference).
    #[serde(rename = "theiaPlugins", default)]
    pub theia_plugins: BTreeMap<String, Value>,

    /// Ids never downloaded, even when pulled in transitively.
    #[serde(rename = "theiaPluginsExcludeIds", default)]
    pub theia_plugins_exclude_ids: Vec<String>,
}

impl RootManifest {
    /// Read and parse the root manifest at `path`.
    pub fn load(path: &Path) -> FetchResult<Self> {
        let raw = fs::read_to_string(path).map_err(|e| FetchError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
        serde_json::from_str(&raw).map_err(|e| FetchError::ManifestInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// The plugin references declared by `theiaPlugins`.
    ///
    /// Non-string values in the map are ignored with a warning.
    pub fn plugin_references(&self) -> Vec<PluginReference> {
        self.theia_plugins
            .iter()
            .filter_map(|(id, value)| match value {
                Value::String(spec) => Some(PluginReference::new(id, spec)),
                _ => {
                    tracing::warn!(id = %id, "ignoring non-string theiaPlugins entry");
                    None
                }
            })
            .collect()
    }

    /// Resolve the plugins directory relative to the manifest's location.
    pub fn plugins_dir(&self, manifest_path: &Path) -> PathBuf {
        manifest_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(&self.plugins_dir)
    }
}

/// The manifest a downloaded plugin carries in its own `package.json`.
///
/// Only the fields the scanner cares about; everything else is ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExtensionManifest {
    #[serde(default)]
    pub name: Option<String>,

    /// Ids of plugins that should be installed alongside this one.
    #[serde(rename = "extensionPack", default)]
    pub extension_pack: Vec<String>,

    /// Ids of plugins this one requires to function.
    #[serde(rename = "extensionDependencies", default)]
    pub extension_dependencies: Vec<String>,
}

impl ExtensionManifest {
    /// Parse a plugin-local manifest.
    pub fn load(path: &Path) -> FetchResult<Self> {
        let raw = fs::read_to_string(path).map_err(|e| FetchError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
        serde_json::from_str(&raw).map_err(|e| FetchError::ManifestInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Name to report in exclusion advisories; falls back to the path.
    pub fn display_name(&self, path: &Path) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| path.display().to_string())
    }
}
