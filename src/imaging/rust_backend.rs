//! Pure Rust image processing backend built on the `image` crate.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, TIFF, WebP) | `image::ImageReader` with content sniffing |
//! | Resize | `image::DynamicImage::resize_exact` with `Lanczos3` |
//! | Avatar crop | entropy scoring on a bounded `Triangle` thumbnail, `crop_imm` on the source, `Lanczos3` to 200×200 |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder` (no chroma subsampling, i.e. 4:4:4) |
//! | Raw subpixel | `resize_exact` with `Triangle` + `to_rgba8` |

use super::backend::{BackendError, ImageBackend, Subpixel};
use super::calculations::{
    calculate_compressed_dimensions, calculate_fit_within, calculate_score_dimensions,
    entropy_window_offset, map_window_offset,
};
use super::params::{
    AVATAR_SCORE_MAX_LINES, AVATAR_SIZE, COMPRESSED_MAX_HEIGHT, Quality, Rendition,
    SUBPIXEL_BOUND,
};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ExtendedColorType, GenericImageView, GrayImage, ImageEncoder, ImageReader};
use std::io::Write;
use std::path::Path;

/// Pure Rust backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Encode as baseline JPEG.
///
/// Alpha is dropped; JPEG has no transparency.
fn encode_jpeg(img: &DynamicImage, quality: Quality, out: &mut dyn Write) -> Result<(), BackendError> {
    let rgb = img.to_rgb8();
    JpegEncoder::new_with_quality(out, quality.value() as u8)
        .write_image(rgb.as_raw(), rgb.width(), rgb.height(), ExtendedColorType::Rgb8)
        .map_err(|e| BackendError::ProcessingFailed(format!("JPEG encode failed: {}", e)))
}

fn compressed(img: &DynamicImage) -> Option<DynamicImage> {
    let dims = img.dimensions();
    let (w, h) = calculate_compressed_dimensions(dims, COMPRESSED_MAX_HEIGHT);
    if (w, h) == dims {
        None
    } else {
        Some(img.resize_exact(w, h, FilterType::Lanczos3))
    }
}

/// Square crop of the source around its densest window, resized to the avatar.
///
/// The window is scored on a thumbnail whose long side never exceeds
/// [`AVATAR_SCORE_MAX_LINES`], so memory stays bounded for any aspect ratio.
/// Only the chosen square of the source is resampled.
fn avatar(img: &DynamicImage) -> DynamicImage {
    let (src_w, src_h) = img.dimensions();
    let side = src_w.min(src_h);

    let (x, y) = if src_w == src_h {
        (0, 0)
    } else {
        let (score_w, score_h) =
            calculate_score_dimensions((src_w, src_h), AVATAR_SIZE, AVATAR_SCORE_MAX_LINES);
        let luma = img.resize_exact(score_w, score_h, FilterType::Triangle).to_luma8();
        if src_w > src_h {
            let offset = entropy_window_offset(&column_histograms(&luma), score_h as usize);
            let x = map_window_offset(offset, score_w.saturating_sub(score_h), src_w - side);
            (x, 0)
        } else {
            let offset = entropy_window_offset(&row_histograms(&luma), score_w as usize);
            let y = map_window_offset(offset, score_h.saturating_sub(score_w), src_h - side);
            (0, y)
        }
    };

    img.crop_imm(x, y, side, side)
        .resize_exact(AVATAR_SIZE, AVATAR_SIZE, FilterType::Lanczos3)
}

fn row_histograms(luma: &GrayImage) -> Vec<[u32; 256]> {
    luma.rows()
        .map(|row| {
            let mut hist = [0u32; 256];
            for px in row {
                hist[px.0[0] as usize] += 1;
            }
            hist
        })
        .collect()
}

fn column_histograms(luma: &GrayImage) -> Vec<[u32; 256]> {
    let mut columns = vec![[0u32; 256]; luma.width() as usize];
    for (x, _, px) in luma.enumerate_pixels() {
        columns[x as usize][px.0[0] as usize] += 1;
    }
    columns
}

impl ImageBackend for RustBackend {
    fn decode(&self, path: &Path) -> Result<DynamicImage, BackendError> {
        ImageReader::open(path)
            .map_err(BackendError::Io)?
            .with_guessed_format()
            .map_err(BackendError::Io)?
            .decode()
            .map_err(|e| {
                BackendError::ProcessingFailed(format!("Failed to decode {}: {}", path.display(), e))
            })
    }

    fn render(
        &self,
        source: &DynamicImage,
        rendition: Rendition,
        out: &mut dyn Write,
    ) -> Result<(), BackendError> {
        let quality = rendition.quality();
        match rendition {
            Rendition::Compressed => match compressed(source) {
                Some(resized) => encode_jpeg(&resized, quality, out),
                None => encode_jpeg(source, quality, out),
            },
            Rendition::Avatar => encode_jpeg(&avatar(source), quality, out),
            Rendition::Original => encode_jpeg(source, quality, out),
        }
    }

    fn subpixel(&self, source: &DynamicImage) -> Result<Subpixel, BackendError> {
        let (w, h) = calculate_fit_within(source.dimensions(), SUBPIXEL_BOUND);
        let rgba = source.resize_exact(w, h, FilterType::Triangle).to_rgba8();
        Ok(Subpixel {
            width: rgba.width(),
            height: rgba.height(),
            rgba: rgba.into_raw(),
        })
    }
}
