//! Shared types used across all pipeline stages.
//!
//! Pages and records arrive as JSON from the feed; scopes and derivation
//! results flow from the upload stage into the publish stage.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Namespace for a stored rendition.
///
/// The serialized name doubles as the storage directory under both
/// `sources/` and `generated/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Scope {
    Users,
    Restaurants,
    ImagePosts,
}

impl Scope {
    pub const ALL: [Scope; 3] = [Scope::Users, Scope::Restaurants, Scope::ImagePosts];

    /// Directory name under `sources/` and `generated/`.
    pub fn as_str(self) -> &'static str {
        match self {
            Scope::Users => "users",
            Scope::Restaurants => "restaurants",
            Scope::ImagePosts => "imagePosts",
        }
    }

    /// Path segment used for public CDN URLs.
    pub fn cdn_segment(self) -> &'static str {
        match self {
            Scope::Users => "creators",
            Scope::Restaurants => "restaurants",
            Scope::ImagePosts => "image-posts",
        }
    }

    pub fn from_dir_name(name: &str) -> Option<Scope> {
        Scope::ALL.into_iter().find(|s| s.as_str() == name)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of one derivation: a source image within a scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    pub scope: Scope,
    pub original_filename: String,
}

impl CacheKey {
    pub fn new(scope: Scope, original_filename: impl Into<String>) -> Self {
        Self {
            scope,
            original_filename: original_filename.into(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.scope, self.original_filename)
    }
}

/// One ingested unit.
///
/// Two shapes arrive from the feed depending on the migration stage:
/// - minimal: `id` plus a single image reference (historically `vin`)
/// - extended: `id`, post image, creator profile, description, store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    #[serde(default, alias = "vin", skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, alias = "creator", skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restaurant: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, alias = "storeid", skip_serializing_if = "Option::is_none")]
    pub store: Option<String>,
}

impl Record {
    /// Extended records carry a creator and can be published as posts.
    pub fn is_extended(&self) -> bool {
        non_empty(&self.image).is_some() && non_empty(&self.profile).is_some()
    }

    /// Image references of this record, each paired with its scope.
    ///
    /// Empty references are skipped.
    pub fn image_keys(&self) -> Vec<CacheKey> {
        [
            (Scope::Users, &self.profile),
            (Scope::ImagePosts, &self.image),
            (Scope::Restaurants, &self.restaurant),
        ]
        .into_iter()
        .filter_map(|(scope, name)| non_empty(name).map(|n| CacheKey::new(scope, n)))
        .collect()
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

/// One cursor-addressed batch of records.
///
/// `has_more == false` is the only termination signal; `cursor` and `total`
/// are informational.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub cursor: String,
    pub has_more: bool,
    #[serde(default)]
    pub nodes: Vec<Record>,
    #[serde(default)]
    pub total: u64,
}

/// Terminal artifact of processing one source image in one scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivationResult {
    pub original_filename: String,
    pub hashed_filename: String,
    pub blurhash_fingerprint: String,
    pub id: String,
    /// Width of the fingerprint buffer, not of the source image.
    pub width: u32,
    /// Height of the fingerprint buffer, not of the source image.
    pub height: u32,
}
