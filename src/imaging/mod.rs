//! Image processing in pure Rust, with no system libraries.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Decode** | `image::ImageReader` |
//! | **Compressed / Original** | Lanczos3 resize + JPEG encoder |
//! | **Avatar** | entropy-scored square crop of the source, then Lanczos3 resize |
//! | **Fingerprint** | `blurhash::encode` over a ≤32px RGBA buffer |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for rendition geometry and crop entropy (unit testable)
//! - **Parameters**: The fixed rendition policy
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **Fingerprint**: BlurHash over the raw-subpixel rendition

pub mod backend;
mod calculations;
pub mod fingerprint;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, ImageBackend, Subpixel};
pub use calculations::{
    calculate_compressed_dimensions, calculate_fit_within, calculate_score_dimensions,
    map_window_offset,
};
pub use fingerprint::{Fingerprint, fingerprint};
pub use params::{
    AVATAR_SIZE, COMPRESSED_MAX_HEIGHT, Quality, Rendition, SUBPIXEL_BOUND,
};
pub use rust_backend::RustBackend;
