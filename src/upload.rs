//! Image upload orchestration.
//!
//! One call to [`Uploader::derive`] turns one source image into its stored
//! renditions plus a [`DerivationResult`]:
//!
//! ```text
//! sources/<scope>/<name>.jpg
//!        │ decode
//!        ▼
//!   ┌─────────┴──────────┐           (joined)
//!   ▼                    ▼
//! digest(compressed)   blurhash(subpixel)
//!   └─────────┬──────────┘
//!             ▼  scope policy
//!   users/restaurants: avatar     → generated/<scope>/<digest>.jpg
//!   imagePosts:        original   → generated/imagePosts/orig.<digest>.jpg
//!                      compressed → generated/imagePosts/<digest>.jpg
//!             ▼
//!   mint id → cache entry
//! ```
//!
//! When a scope stores the compressed rendition, it is staged and hashed in
//! the same pass and only renamed to `<digest>.jpg` once every other blob of
//! the scope's policy has landed. The cache entry is published after that,
//! so a visible entry always has complete blobs behind it. Failures abort
//! only the image at hand and never leave a cache entry.

use crate::blob::{BlobError, BlobStore, ORIGINAL_PREFIX, StagedBlob, is_valid_source_name};
use crate::cache::{DerivationCache, Lookup};
use crate::digest::{HashingTee, content_digest};
use crate::imaging::{BackendError, ImageBackend, Rendition, fingerprint};
use crate::types::{CacheKey, DerivationResult, Scope};
use image::DynamicImage;
use rayon::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Why a single derivation failed.
#[derive(Error, Debug)]
pub enum DeriveFailure {
    #[error("source name {0:?} is not a plain file name")]
    InvalidName(String),
    #[error("source image not found: {0}")]
    SourceNotFound(PathBuf),
    #[error("decode failed: {0}")]
    Decode(#[source] BackendError),
    #[error("content hashing failed: {0}")]
    Hash(#[source] BackendError),
    #[error("fingerprinting failed: {0}")]
    Fingerprint(#[source] BackendError),
    #[error("writing {name} failed: {source}")]
    Write {
        name: String,
        #[source]
        source: BlobError,
    },
}

/// A failed derivation, tagged with the key that failed.
///
/// Cloneable so every caller waiting on the same derivation receives it.
#[derive(Error, Debug, Clone)]
#[error("derivation of {key} failed: {cause}")]
pub struct DerivationError {
    pub key: CacheKey,
    #[source]
    pub cause: Arc<DeriveFailure>,
}

impl DerivationError {
    pub fn new(key: CacheKey, cause: DeriveFailure) -> Self {
        Self {
            key,
            cause: Arc::new(cause),
        }
    }
}

/// One blob a scope requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlobTarget {
    pub rendition: Rendition,
    /// Prepended to the digest to form the blob name.
    pub prefix: &'static str,
}

impl BlobTarget {
    pub fn blob_name(&self, digest: &str) -> String {
        format!("{}{}", self.prefix, digest)
    }
}

/// Renditions a scope stores, written concurrently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopePolicy {
    pub targets: &'static [BlobTarget],
}

const AVATAR_TARGETS: &[BlobTarget] = &[BlobTarget {
    rendition: Rendition::Avatar,
    prefix: "",
}];

const POST_TARGETS: &[BlobTarget] = &[
    BlobTarget {
        rendition: Rendition::Original,
        prefix: ORIGINAL_PREFIX,
    },
    BlobTarget {
        rendition: Rendition::Compressed,
        prefix: "",
    },
];

impl ScopePolicy {
    pub fn for_scope(scope: Scope) -> ScopePolicy {
        match scope {
            Scope::Users | Scope::Restaurants => ScopePolicy {
                targets: AVATAR_TARGETS,
            },
            Scope::ImagePosts => ScopePolicy {
                targets: POST_TARGETS,
            },
        }
    }

    /// The target storing `rendition`, if the scope keeps it.
    pub fn target(&self, rendition: Rendition) -> Option<BlobTarget> {
        self.targets.iter().copied().find(|t| t.rendition == rendition)
    }
}

/// The compressed rendition, staged under no name yet.
type StagedCompressed = (StagedBlob, BlobTarget);

/// Derives and stores renditions, deduplicated through a shared cache.
pub struct Uploader<'a, B: ImageBackend> {
    backend: &'a B,
    store: &'a BlobStore,
    cache: &'a DerivationCache,
}

impl<'a, B: ImageBackend> Uploader<'a, B> {
    pub fn new(backend: &'a B, store: &'a BlobStore, cache: &'a DerivationCache) -> Self {
        Self {
            backend,
            store,
            cache,
        }
    }

    pub fn cache(&self) -> &'a DerivationCache {
        self.cache
    }

    /// Derive `key`, or return its existing result.
    pub fn derive(&self, key: &CacheKey) -> Result<Arc<DerivationResult>, DerivationError> {
        self.resolve(key).1
    }

    /// Like [`derive`](Self::derive), also reporting how the cache answered.
    pub fn resolve(
        &self,
        key: &CacheKey,
    ) -> (Lookup, Result<Arc<DerivationResult>, DerivationError>) {
        self.cache.get_or_derive(key, || {
            self.derive_uncached(key)
                .map_err(|cause| DerivationError::new(key.clone(), cause))
        })
    }

    fn derive_uncached(&self, key: &CacheKey) -> Result<DerivationResult, DeriveFailure> {
        if !is_valid_source_name(&key.original_filename) {
            return Err(DeriveFailure::InvalidName(key.original_filename.clone()));
        }
        let source_path = self.store.source_path(key);
        if !source_path.exists() {
            return Err(DeriveFailure::SourceNotFound(source_path));
        }

        tracing::debug!(%key, "deriving");
        let source = self
            .backend
            .decode(&source_path)
            .map_err(DeriveFailure::Decode)?;

        let policy = ScopePolicy::for_scope(key.scope);
        let (named, fingerprint) = rayon::join(
            || self.name_by_content(key.scope, &source, policy),
            || {
                self.backend
                    .subpixel(&source)
                    .and_then(|subpixel| fingerprint(&subpixel))
            },
        );
        let (digest, staged) = named?;
        let fingerprint = fingerprint.map_err(DeriveFailure::Fingerprint)?;

        let written: Vec<Result<PathBuf, DeriveFailure>> = policy
            .targets
            .par_iter()
            .filter(|target| target.rendition != Rendition::Compressed)
            .map(|target| {
                let name = target.blob_name(&digest);
                self.store
                    .write(key.scope, &name, |out| {
                        self.backend.render(&source, target.rendition, out)
                    })
                    .map_err(|source| DeriveFailure::Write { name, source })
            })
            .collect();
        for write in written {
            write?;
        }

        if let Some((staged, target)) = staged {
            let name = target.blob_name(&digest);
            self.store
                .persist(staged, &name)
                .map_err(|source| DeriveFailure::Write { name, source })?;
        }

        Ok(DerivationResult {
            original_filename: key.original_filename.clone(),
            hashed_filename: digest,
            blurhash_fingerprint: fingerprint.blurhash,
            id: Uuid::new_v4().to_string(),
            width: fingerprint.width,
            height: fingerprint.height,
        })
    }

    /// Digest of the compressed rendition.
    ///
    /// Scopes that store the compressed rendition get it staged in the same
    /// pass; the others only hash it.
    fn name_by_content(
        &self,
        scope: Scope,
        source: &DynamicImage,
        policy: ScopePolicy,
    ) -> Result<(String, Option<StagedCompressed>), DeriveFailure> {
        let Some(target) = policy.target(Rendition::Compressed) else {
            let digest = content_digest(self.backend, source).map_err(DeriveFailure::Hash)?;
            return Ok((digest, None));
        };

        let (staged, digest) = self
            .store
            .stage(scope, |out| {
                let mut tee = HashingTee::new(out);
                self.backend.render(source, Rendition::Compressed, &mut tee)?;
                Ok(tee.finish())
            })
            .map_err(|err| match err {
                BlobError::Render(e) => DeriveFailure::Hash(e),
                source => DeriveFailure::Write {
                    name: Rendition::Compressed.label().to_string(),
                    source,
                },
            })?;
        Ok((digest, Some((staged, target))))
    }
}
