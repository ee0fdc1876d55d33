//! vsxfetch - Plugin acquisition and dependency resolution for Theia apps
//!
//! This library reads a `package.json` style manifest declaring plugin
//! references (`theiaPlugins`), resolves them against an open-vsx style
//! registry, downloads the artifacts with rate limiting and retries,
//! verifies them against a lockfile, installs them into the plugins
//! directory, and then discovers transitive references (`extensionPack`,
//! `extensionDependencies`) declared by what was just installed.
//!
//! [`FetchEngine`] is the entry point; [`FetchConfig`] configures it.

pub mod config;
pub mod download;
pub mod error;
pub mod http;
pub mod integrity;
pub mod lockfile;
pub mod manifest;
pub mod orchestrator;
pub mod ratelimit;
pub mod registry;
pub mod resolver;
pub mod scanner;
pub mod store;
pub mod types;

pub use config::FetchConfig;
pub use error::{FetchError, FetchResult};
pub use orchestrator::{FetchEngine, FetchReport};
pub use types::{DownloadOutcome, PluginReference, ResolvedDownload};
