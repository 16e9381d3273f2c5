//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the three operations the upload stage
//! needs: decode a source, render one encoded [`Rendition`] into a writer,
//! and produce the raw-subpixel buffer for fingerprinting.
//!
//! Renditions are always re-derived from the shared decoded source, so
//! rendering one never disturbs another and rendering the same one twice
//! yields identical bytes.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend).

use super::params::Rendition;
use image::DynamicImage;
use std::io::Write;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
}

/// Raw RGBA buffer fit within the subpixel bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subpixel {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Trait for image processing backends.
///
/// `Sync` so one backend can be shared by every worker in the pool.
pub trait ImageBackend: Sync {
    /// Decode a source image from disk.
    fn decode(&self, path: &Path) -> Result<DynamicImage, BackendError>;

    /// Encode one rendition of `source` into `out`.
    fn render(
        &self,
        source: &DynamicImage,
        rendition: Rendition,
        out: &mut dyn Write,
    ) -> Result<(), BackendError>;

    /// Produce the raw-subpixel buffer used as fingerprint input.
    fn subpixel(&self, source: &DynamicImage) -> Result<Subpixel, BackendError>;
}
