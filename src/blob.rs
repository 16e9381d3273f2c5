//! Durable blob storage for renditions.
//!
//! # Layout
//!
//! ```text
//! <root>/
//! ├── sources/                    # read-only inputs
//! │   ├── users/<name>.jpg
//! │   └── imagePosts/<name>.jpg
//! └── generated/                  # written by the upload stage
//!     ├── users/<digest>.jpg
//!     └── imagePosts/
//!         ├── <digest>.jpg
//!         └── orig.<digest>.jpg
//! ```
//!
//! # Write contract
//!
//! A write streams the rendition through a buffered writer into a temporary
//! file next to the target, flushes and syncs it, then renames it over the
//! target. The target therefore either does not exist, holds the previous
//! complete blob, or holds the new complete blob. Failures and cancellation
//! drop the temporary file; nothing half-written is ever visible under a
//! blob name.

use crate::imaging::BackendError;
use crate::types::{CacheKey, Scope};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tempfile::NamedTempFile;
use thiserror::Error;

pub const SOURCES_DIR: &str = "sources";
pub const GENERATED_DIR: &str = "generated";
pub const BLOB_EXTENSION: &str = "jpg";

/// Prefix for the untouched original rendition's blob name.
pub const ORIGINAL_PREFIX: &str = "orig.";

#[derive(Error, Debug)]
pub enum BlobError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("render failed: {0}")]
    Render(#[from] BackendError),
    #[error("could not move blob into place: {0}")]
    Persist(#[from] tempfile::PersistError),
    #[error("write to {0} was cancelled")]
    Cancelled(PathBuf),
}

/// Shared cancellation flag checked on every chunk a blob writer receives.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Rejects writes once the token is cancelled.
struct CancellableWriter<W> {
    inner: W,
    token: CancelToken,
}

impl<W: Write> Write for CancellableWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.token.is_cancelled() {
            return Err(io::Error::other("blob write cancelled"));
        }
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.token.is_cancelled() {
            return Err(io::Error::other("blob write cancelled"));
        }
        self.inner.flush()
    }
}

/// Filesystem blob store rooted at the migration's source directory.
#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
    cancel: CancelToken,
}

impl BlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Where the source image for a derivation lives.
    ///
    /// Callers check [`is_valid_source_name`] first; the name is joined as is.
    pub fn source_path(&self, key: &CacheKey) -> PathBuf {
        self.root
            .join(SOURCES_DIR)
            .join(key.scope.as_str())
            .join(format!("{}.{}", key.original_filename, BLOB_EXTENSION))
    }

    /// Where a blob named `name` in `scope` lives.
    pub fn blob_path(&self, scope: Scope, name: &str) -> PathBuf {
        self.root
            .join(GENERATED_DIR)
            .join(scope.as_str())
            .join(format!("{}.{}", name, BLOB_EXTENSION))
    }

    /// Stream a blob into place.
    ///
    /// `render` receives the writer and must write the complete blob. The
    /// blob becomes visible only after `render` succeeded and every byte
    /// reached the disk.
    pub fn write<F>(&self, scope: Scope, name: &str, render: F) -> Result<PathBuf, BlobError>
    where
        F: FnOnce(&mut dyn Write) -> Result<(), BackendError>,
    {
        let (staged, ()) = self.stage(scope, render)?;
        self.persist(staged, name)
    }

    /// Write a complete blob to disk without giving it a name yet.
    ///
    /// Whatever `render` returns is handed back with the staged blob, so a
    /// caller can derive the name from the bytes as they stream past.
    /// Dropping the [`StagedBlob`] deletes it.
    pub fn stage<T, F>(&self, scope: Scope, render: F) -> Result<(StagedBlob, T), BlobError>
    where
        F: FnOnce(&mut dyn Write) -> Result<T, BackendError>,
    {
        let dir = self.root.join(GENERATED_DIR).join(scope.as_str());
        std::fs::create_dir_all(&dir)?;

        let tmp = NamedTempFile::new_in(&dir)?;
        let value = {
            let mut writer = CancellableWriter {
                inner: BufWriter::new(tmp.as_file()),
                token: self.cancel.clone(),
            };
            let rendered = render(&mut writer);
            if self.cancel.is_cancelled() {
                return Err(BlobError::Cancelled(dir));
            }
            let value = rendered?;
            writer.flush()?;
            value
        };
        tmp.as_file().sync_all()?;
        Ok((StagedBlob { tmp, scope }, value))
    }

    /// Move a staged blob into place under `name`.
    pub fn persist(&self, staged: StagedBlob, name: &str) -> Result<PathBuf, BlobError> {
        let target = self.blob_path(staged.scope, name);
        if self.cancel.is_cancelled() {
            return Err(BlobError::Cancelled(target));
        }
        staged.tmp.persist(&target)?;

        tracing::debug!(path = %target.display(), "blob written");
        Ok(target)
    }
}

/// A fully written, synced blob that no name points to yet.
#[derive(Debug)]
pub struct StagedBlob {
    tmp: NamedTempFile,
    scope: Scope,
}

/// Whether `name` is usable as a source file stem.
///
/// Names come from the feed and are joined under `sources/<scope>/`, so
/// only a single plain path component is accepted.
pub fn is_valid_source_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\', '\0'])
}
