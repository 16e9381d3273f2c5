//! Perceptual fingerprints for placeholder rendering.
//!
//! A fingerprint is a [BlurHash](https://blurha.sh) of the raw-subpixel
//! rendition with a fixed 4×4 component grid, stored together with the
//! buffer's own width and height so clients can size the placeholder with
//! the right aspect ratio before the real image arrives.

use super::backend::{BackendError, Subpixel};

/// Horizontal and vertical BlurHash components.
pub const COMPONENTS: (u32, u32) = (4, 4);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub blurhash: String,
    /// Width of the subpixel buffer the hash was computed from.
    pub width: u32,
    /// Height of the subpixel buffer the hash was computed from.
    pub height: u32,
}

pub fn fingerprint(subpixel: &Subpixel) -> Result<Fingerprint, BackendError> {
    let expected = subpixel.width as usize * subpixel.height as usize * 4;
    if subpixel.rgba.len() != expected {
        return Err(BackendError::ProcessingFailed(format!(
            "subpixel buffer is {} bytes, expected {} for {}x{} RGBA",
            subpixel.rgba.len(),
            expected,
            subpixel.width,
            subpixel.height
        )));
    }

    let blurhash = blurhash::encode(
        COMPONENTS.0,
        COMPONENTS.1,
        subpixel.width,
        subpixel.height,
        &subpixel.rgba,
    )
    .map_err(|e| BackendError::ProcessingFailed(format!("BlurHash encode failed: {}", e)))?;

    Ok(Fingerprint {
        blurhash,
        width: subpixel.width,
        height: subpixel.height,
    })
}
