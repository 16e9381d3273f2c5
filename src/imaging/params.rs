//! Fixed rendition policy.
//!
//! Every derived image is one of a small set of [`Rendition`]s. Sizes and
//! encoder settings are constants, not configuration: all migrated content
//! must look the same regardless of who runs the migration.
//!
//! | Rendition | Geometry | Encoding |
//! |---|---|---|
//! | [`Rendition::Compressed`] | height ≤ [`COMPRESSED_MAX_HEIGHT`], never upscaled | JPEG q80, 4:4:4 |
//! | [`Rendition::Avatar`] | exactly [`AVATAR_SIZE`]² via entropy crop | JPEG q80, 4:4:4 |
//! | [`Rendition::Original`] | untouched | JPEG q100 |
//!
//! The raw-subpixel rendition (RGBA fit within [`SUBPIXEL_BOUND`]²) only
//! feeds the fingerprinter and is never encoded; see
//! [`Subpixel`](super::backend::Subpixel).

/// Maximum height of the compressed rendition.
pub const COMPRESSED_MAX_HEIGHT: u32 = 1000;

/// Edge length of the square avatar rendition.
pub const AVATAR_SIZE: u32 = 200;

/// Longest side of the luminance image scored when picking the avatar crop.
pub const AVATAR_SCORE_MAX_LINES: u32 = 2048;

/// Bounding box for the raw RGBA buffer handed to the fingerprinter.
pub const SUBPIXEL_BOUND: u32 = 32;

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(80)
    }
}

/// An encoded output derived from a source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rendition {
    Compressed,
    Avatar,
    Original,
}

impl Rendition {
    pub fn quality(self) -> Quality {
        match self {
            Rendition::Compressed | Rendition::Avatar => Quality::new(80),
            Rendition::Original => Quality::new(100),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Rendition::Compressed => "compressed",
            Rendition::Avatar => "avatar",
            Rendition::Original => "original",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_clamps_to_valid_range() {
        assert_eq!(Quality::new(0).value(), 1);
        assert_eq!(Quality::new(50).value(), 50);
        assert_eq!(Quality::new(150).value(), 100);
    }

    #[test]
    fn lossy_renditions_share_quality() {
        assert_eq!(Rendition::Compressed.quality(), Quality::default());
        assert_eq!(Rendition::Avatar.quality().value(), 80);
        assert_eq!(Rendition::Original.quality().value(), 100);
    }
}
