//! Shared test utilities.
//!
//! Synthetic images and source files for tests that need real pixels or a
//! populated `sources/` tree.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = TempDir::new().unwrap();
//! let store = BlobStore::new(tmp.path());
//! let key = CacheKey::new(Scope::Users, "userA");
//! create_test_jpeg(&store.source_path(&key), 300, 200);
//! ```

use image::{DynamicImage, ImageEncoder, RgbImage};
use std::fs;
use std::path::Path;

// =========================================================================
// Pixels
// =========================================================================

/// Smooth gradient with a diagonal stripe, so crops and resizes are
/// distinguishable from one another.
pub fn gradient_image(width: u32, height: u32) -> DynamicImage {
    let img = RgbImage::from_fn(width, height, |x, y| {
        let stripe = if (x + y) % 16 < 2 { 255 } else { 0 };
        image::Rgb([(x % 256) as u8, (y % 256) as u8, stripe])
    });
    DynamicImage::ImageRgb8(img)
}

// =========================================================================
// Files
// =========================================================================

/// Create a valid JPEG file with the given dimensions, parents included.
pub fn create_test_jpeg(path: &Path, width: u32, height: u32) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let img = RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    let file = fs::File::create(path).unwrap();
    let writer = std::io::BufWriter::new(file);
    image::codecs::jpeg::JpegEncoder::new(writer)
        .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
        .unwrap();
}

/// Create a source file that exists but holds no image.
///
/// Enough for tests running against the mock backend, which never reads
/// file contents.
pub fn create_dummy_source(path: &Path) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, b"not really a jpeg").unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GenericImageView;
    use tempfile::TempDir;

    #[test]
    fn test_jpeg_decodes_to_requested_size() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a/b/c.jpg");
        create_test_jpeg(&path, 33, 17);
        assert_eq!(image::open(&path).unwrap().dimensions(), (33, 17));
    }

    #[test]
    fn gradient_is_not_flat() {
        let img = gradient_image(20, 20).to_rgb8();
        assert_ne!(img.get_pixel(0, 0), img.get_pixel(19, 19));
    }
}
