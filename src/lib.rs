//! # Media Migrate
//!
//! Moves profile and post images from a paged record feed into a
//! content-addressed blob store, then publishes one post per record to a
//! downstream API.
//!
//! # Architecture: Page-at-a-Time Pipeline
//!
//! ```text
//! feed ──page──▶ batch fan-out ──▶ publisher ──▶ next page
//!                   │  (per distinct image, in parallel)
//!                   ▼
//!               upload: decode → {digest ∥ blurhash} → blob writes → cache
//! ```
//!
//! Pages are processed strictly one after another. Within a page every
//! distinct image is derived concurrently on the rayon pool, and all of them
//! settle before any post of that page is built.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`feed`] | Cursor-paged ingestion, stops on `hasMore == false` |
//! | [`batch`] | Per-page fan-out over distinct `(scope, name)` keys |
//! | [`upload`] | One derivation: renditions, digest, fingerprint, writes, id |
//! | [`cache`] | Per-run memo of derivations, including in-flight ones |
//! | [`imaging`] | Decoding, rendition rules, JPEG encoding, blurhash |
//! | [`digest`] | Streaming SHA-256 used to name blobs |
//! | [`blob`] | Atomic, cancellable blob writes under `generated/` |
//! | [`publish`] | Post payload assembly and the create-post call |
//! | [`migrate`] | The run loop and its progress events |
//! | [`scan`] | Offline inventory of the source tree |
//! | [`config`] | `config.toml` loading, merging and validation |
//! | [`types`] | Records, pages, scopes and derivation results |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Content Addressing by the Compressed Rendition
//!
//! Every blob of a source image is named after the SHA-256 of its compressed
//! rendition. Post images hash that rendition while it is staged on disk, so
//! the bytes that are hashed are the bytes that are stored, and identical
//! sources land on identical names. Compressed post blobs can be re-verified
//! from disk at any time (see [`scan`]).
//!
//! ## Memoizing Computations, Not Results
//!
//! Two records on the same page may reference the same image. The
//! [`cache`] stores a once-cell per key and every caller blocks on it, so
//! the image is decoded once and all records receive the same id.
//!
//! ## Pure-Rust Imaging
//!
//! The [`imaging`] module uses the `image` crate for decoding, Lanczos3
//! resampling and JPEG encoding, and the `blurhash` crate for fingerprints.
//! No system libraries are needed.

pub mod batch;
pub mod blob;
pub mod cache;
pub mod config;
pub mod digest;
pub mod feed;
pub mod imaging;
pub mod migrate;
pub mod output;
pub mod publish;
pub mod scan;
pub mod types;
pub mod upload;

#[cfg(test)]
pub(crate) mod test_helpers;
