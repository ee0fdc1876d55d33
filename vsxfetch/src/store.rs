//! Filesystem persistence for downloaded artifacts.
//!
//! The store owns the plugins directory: destination paths, the existence
//! check that makes re-runs idempotent, and the two write modes (raw
//! archive file for packed mode, extracted directory otherwise). Writes go
//! to a temporary sibling first and are persisted by rename, so an
//! interrupted write is simply absent on the next run.
//!
//! Extraction sits behind the [`ArchiveExtractor`] trait; the production
//! [`ShellExtractor`] shells out to `tar` and `unzip`, which matches how
//! the archives were produced.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use crate::error::{FetchError, FetchResult};

/// Recognized artifact types, dispatched on the download URL suffix.
///
/// Anything else fails before a single network request is made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    TarGz,
    Vsix,
    Theia,
}

impl ArtifactKind {
    /// Classify a download URL by suffix.
    pub fn from_url(url: &str) -> Option<Self> {
        if url.ends_with(".tar.gz") {
            Some(Self::TarGz)
        } else if url.ends_with(".vsix") {
            Some(Self::Vsix)
        } else if url.ends_with(".theia") {
            Some(Self::Theia)
        } else {
            None
        }
    }

    /// File extension used for packed destinations.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::TarGz => ".tar.gz",
            Self::Vsix => ".vsix",
            Self::Theia => ".theia",
        }
    }
}

/// Trait for archive extraction.
pub trait ArchiveExtractor: Send + Sync {
    /// Extract `archive` into `dest_dir`, creating it if needed.
    fn extract(&self, archive: &Path, dest_dir: &Path) -> FetchResult<()>;
}

/// Shell-based extractor using system `tar` and `unzip`.
///
/// `.vsix` and `.theia` artifacts are zip containers; `.tar.gz` speaks for
/// itself.
#[derive(Debug, Default)]
pub struct ShellExtractor;

impl ShellExtractor {
    pub fn new() -> Self {
        Self
    }

    fn run(&self, mut command: Command, archive: &Path) -> FetchResult<()> {
        let output = command.output().map_err(|e| FetchError::ExtractionFailed {
            path: archive.to_path_buf(),
            reason: format!("failed to run extractor: {e}"),
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FetchError::ExtractionFailed {
                path: archive.to_path_buf(),
                reason: format!("extractor failed: {}", stderr.trim()),
            });
        }
        Ok(())
    }
}

impl ArchiveExtractor for ShellExtractor {
    fn extract(&self, archive: &Path, dest_dir: &Path) -> FetchResult<()> {
        fs::create_dir_all(dest_dir).map_err(|e| FetchError::CreateDirFailed {
            path: dest_dir.to_path_buf(),
            source: e,
        })?;

        let archive_str = archive.to_str().unwrap_or("");
        let dest_str = dest_dir.to_str().unwrap_or("");

        let mut command;
        if archive_str.ends_with(".tar.gz") {
            command = Command::new("tar");
            command.args(["-xzf", archive_str, "-C", dest_str]);
        } else {
            // .vsix / .theia are zip containers.
            command = Command::new("unzip");
            command.args(["-o", "-q", archive_str, "-d", dest_str]);
        }
        self.run(command, archive)
    }
}

/// Filesystem operations under the plugins directory.
pub struct ArtifactStore {
    plugins_dir: PathBuf,
    extractor: Arc<dyn ArchiveExtractor>,
}

impl ArtifactStore {
    /// Create a store rooted at `plugins_dir`, extracting with the shell
    /// extractor.
    pub fn new(plugins_dir: impl Into<PathBuf>) -> Self {
        Self::with_extractor(plugins_dir, Arc::new(ShellExtractor::new()))
    }

    /// Create a store with a custom extractor (tests inject a fake here).
    pub fn with_extractor(
        plugins_dir: impl Into<PathBuf>,
        extractor: Arc<dyn ArchiveExtractor>,
    ) -> Self {
        Self {
            plugins_dir: plugins_dir.into(),
            extractor,
        }
    }

    pub fn plugins_dir(&self) -> &Path {
        &self.plugins_dir
    }

    /// Create the plugins directory if it does not exist yet.
    pub fn ensure_root(&self) -> FetchResult<()> {
        fs::create_dir_all(&self.plugins_dir).map_err(|e| FetchError::CreateDirFailed {
            path: self.plugins_dir.clone(),
            source: e,
        })
    }

    /// Destination path for a plugin id: `<id><ext>` file in packed mode,
    /// `<id>/` directory otherwise.
    pub fn destination(&self, id: &str, kind: ArtifactKind, packed: bool) -> PathBuf {
        if packed {
            self.plugins_dir.join(format!("{id}{}", kind.extension()))
        } else {
            self.plugins_dir.join(id)
        }
    }

    /// Idempotency check: is the destination already populated?
    pub fn is_present(&self, dest: &Path) -> bool {
        dest.exists()
    }

    /// Write raw archive bytes to the destination (packed mode).
    pub fn write_packed(&self, dest: &Path, bytes: &[u8]) -> FetchResult<()> {
        let partial = partial_path(dest);
        fs::write(&partial, bytes).map_err(|e| FetchError::WriteFailed {
            path: partial.clone(),
            source: e,
        })?;
        fs::rename(&partial, dest).map_err(|e| FetchError::WriteFailed {
            path: dest.to_path_buf(),
            source: e,
        })
    }

    /// Write archive bytes to a temporary file, extract into the
    /// destination directory (unpacked mode).
    pub fn write_unpacked(
        &self,
        dest_dir: &Path,
        kind: ArtifactKind,
        bytes: &[u8],
    ) -> FetchResult<()> {
        // The extractor dispatches on the archive suffix, so the temp file
        // keeps the kind's extension at the end.
        let name = dest_dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "artifact".to_string());
        let archive = dest_dir.with_file_name(format!(".{name}.part{}", kind.extension()));
        fs::write(&archive, bytes).map_err(|e| FetchError::WriteFailed {
            path: archive.clone(),
            source: e,
        })?;

        let partial_dir = partial_path(dest_dir);
        let result = self
            .extractor
            .extract(&archive, &partial_dir)
            .and_then(|()| {
                fs::rename(&partial_dir, dest_dir).map_err(|e| FetchError::WriteFailed {
                    path: dest_dir.to_path_buf(),
                    source: e,
                })
            });

        // The temp archive and a leftover partial dir are garbage either way.
        fs::remove_file(&archive).ok();
        if result.is_err() {
            fs::remove_dir_all(&partial_dir).ok();
        }
        result
    }
}

/// Temporary sibling path used before the final rename.
fn partial_path(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "artifact".to_string());
    dest.with_file_name(format!(".{name}.part"))
}
