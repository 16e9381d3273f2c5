//! Post publishing.
//!
//! After a page's images have settled, every extended record becomes one
//! create-post request assembled from two cache entries: the post image
//! (`imagePosts`) and the creator's profile image (`users`).
//!
//! ```text
//! Record { image: "img1", profile: "userA", description, store }
//!    │                 │
//!    ▼                 ▼
//! cache[imagePosts/img1]   cache[users/userA]
//!    └────────┬────────┘
//!             ▼
//! PostPayload → POST <url>  (x-api-key)
//! ```
//!
//! Records are independent: a missing derivation, a rejected request or a
//! transport error fails that record only. Minimal records have no creator
//! and are skipped.

use crate::cache::DerivationCache;
use crate::migrate::MigrateEvent;
use crate::types::{CacheKey, Record, Scope};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::mpsc::Sender;
use std::time::Duration;
use thiserror::Error;

/// Placeholder tint shown while a post image loads.
pub const PLACEHOLDER_COLOR: &str = "#d9d9d9";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("record has no {0}")]
    MissingField(&'static str),
    #[error("no derivation for {key}")]
    MissingDerivation { key: CacheKey },
    #[error("post rejected with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("post request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Creator {
    pub creatorid: String,
    pub name: String,
    pub username: String,
    pub profile_image: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Urls {
    pub blur_hash: String,
    pub download: String,
    pub regular: String,
    pub small_s3: String,
}

/// Body of one create-post request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostPayload {
    pub id: String,
    pub alt_description: String,
    pub color: String,
    pub description: String,
    pub height: u32,
    pub width: u32,
    pub likes: u32,
    pub storeid: String,
    pub creator: Creator,
    pub urls: Urls,
}

/// URL bases and defaults for building payloads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostSettings {
    /// Public CDN base used for every URL except `small_s3`.
    pub cdn_base_url: String,
    /// Origin (non-CDN) bucket base used for `small_s3`.
    pub origin_url: String,
    /// Store used when a record names none.
    pub default_store_id: String,
}

impl PostSettings {
    fn cdn(&self, scope: Scope, blob: &str) -> String {
        blob_url(&self.cdn_base_url, scope, blob)
    }

    fn origin(&self, scope: Scope, blob: &str) -> String {
        blob_url(&self.origin_url, scope, blob)
    }
}

fn blob_url(base: &str, scope: Scope, blob: &str) -> String {
    format!(
        "{}/{}/{}.{}",
        base.trim_end_matches('/'),
        scope.cdn_segment(),
        blob,
        crate::blob::BLOB_EXTENSION
    )
}

fn required<'r>(value: &'r Option<String>, field: &'static str) -> Result<&'r str, PublishError> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or(PublishError::MissingField(field))
}

/// Assemble the payload for an extended record from the cache.
pub fn build_post(
    record: &Record,
    cache: &DerivationCache,
    settings: &PostSettings,
) -> Result<PostPayload, PublishError> {
    let image = required(&record.image, "image")?;
    let profile = required(&record.profile, "profile")?;
    let store = match required(&record.store, "store") {
        Ok(store) => store.to_string(),
        Err(_) if !settings.default_store_id.is_empty() => settings.default_store_id.clone(),
        Err(err) => return Err(err),
    };

    let lookup = |key: CacheKey| {
        cache
            .get(&key)
            .ok_or(PublishError::MissingDerivation { key })
    };
    let post = lookup(CacheKey::new(Scope::ImagePosts, image))?;
    let creator = lookup(CacheKey::new(Scope::Users, profile))?;

    let digest = &post.hashed_filename;
    let description = record.description.clone().unwrap_or_default();

    Ok(PostPayload {
        id: post.id.clone(),
        alt_description: description.clone(),
        color: PLACEHOLDER_COLOR.to_string(),
        description,
        height: post.height,
        width: post.width,
        likes: 0,
        storeid: store,
        creator: Creator {
            creatorid: creator.id.clone(),
            name: profile.to_string(),
            username: profile.to_string(),
            profile_image: settings.cdn(Scope::Users, &creator.hashed_filename),
        },
        urls: Urls {
            blur_hash: post.blurhash_fingerprint.clone(),
            download: settings.cdn(
                Scope::ImagePosts,
                &format!("{}{}", crate::blob::ORIGINAL_PREFIX, digest),
            ),
            regular: settings.cdn(Scope::ImagePosts, digest),
            small_s3: settings.origin(Scope::ImagePosts, digest),
        },
    })
}

/// Destination for create-post requests.
pub trait PostSink: Sync {
    fn create(&self, post: &PostPayload) -> Result<(), PublishError>;
}

/// Sends posts to the downstream API.
pub struct HttpPublisher {
    client: reqwest::blocking::Client,
    url: String,
    api_key: String,
}

impl HttpPublisher {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, PublishError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
            api_key: api_key.into(),
        })
    }
}

impl PostSink for HttpPublisher {
    fn create(&self, post: &PostPayload) -> Result<(), PublishError> {
        let response = self
            .client
            .post(&self.url)
            .header("x-api-key", &self.api_key)
            .json(post)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(PublishError::Rejected {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }
        Ok(())
    }
}

/// Outcome of publishing one page.
#[derive(Debug, Default)]
pub struct PublishReport {
    /// Record ids that were published.
    pub published: Vec<String>,
    /// Record ids without a creator.
    pub skipped: Vec<String>,
    pub failures: Vec<(String, PublishError)>,
}

enum Outcome {
    Published(String),
    Skipped,
    Failed(PublishError),
}

/// Publish every extended record of a page, isolating failures per record.
pub fn publish_page(
    sink: &dyn PostSink,
    cache: &DerivationCache,
    settings: &PostSettings,
    records: &[Record],
    events: Option<&Sender<MigrateEvent>>,
) -> PublishReport {
    let outcomes: Vec<(&Record, Outcome)> = records
        .par_iter()
        .map(|record| {
            if !record.is_extended() {
                return (record, Outcome::Skipped);
            }
            let outcome = build_post(record, cache, settings)
                .and_then(|post| sink.create(&post).map(|()| post.id));
            match outcome {
                Ok(post_id) => (record, Outcome::Published(post_id)),
                Err(err) => (record, Outcome::Failed(err)),
            }
        })
        .collect();

    let mut report = PublishReport::default();
    for (record, outcome) in outcomes {
        let record_id = record.id.clone();
        let event = match outcome {
            Outcome::Published(post_id) => {
                report.published.push(record_id.clone());
                MigrateEvent::PostPublished { record_id, post_id }
            }
            Outcome::Skipped => {
                tracing::debug!(record = %record_id, "minimal record, not published");
                report.skipped.push(record_id.clone());
                MigrateEvent::PostSkipped { record_id }
            }
            Outcome::Failed(err) => {
                tracing::warn!(record = %record_id, error = %err, "post failed");
                let error = err.to_string();
                report.failures.push((record_id.clone(), err));
                MigrateEvent::PostFailed { record_id, error }
            }
        };
        if let Some(tx) = events {
            tx.send(event).ok();
        }
    }
    report
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::types::DerivationResult;
    use std::sync::Mutex;

    /// Records payloads; rejects posts whose id is listed.
    #[derive(Default)]
    pub struct RecordingSink {
        pub posts: Mutex<Vec<PostPayload>>,
        pub rejected_ids: Vec<String>,
    }

    impl RecordingSink {
        pub fn posts(&self) -> Vec<PostPayload> {
            self.posts.lock().unwrap().clone()
        }
    }

    impl PostSink for RecordingSink {
        fn create(&self, post: &PostPayload) -> Result<(), PublishError> {
            if self.rejected_ids.contains(&post.id) {
                return Err(PublishError::Rejected {
                    status: 422,
                    body: "duplicate".into(),
                });
            }
            self.posts.lock().unwrap().push(post.clone());
            Ok(())
        }
    }

    fn settings() -> PostSettings {
        PostSettings {
            cdn_base_url: "https://cdn.example.com/".into(),
            origin_url: "https://origin.example.com".into(),
            default_store_id: "default-store".into(),
        }
    }

    fn seed(cache: &DerivationCache, scope: Scope, name: &str, id: &str) {
        let key = CacheKey::new(scope, name);
        cache
            .get_or_derive(&key, || {
                Ok(DerivationResult {
                    original_filename: name.into(),
                    hashed_filename: format!("{name}-digest"),
                    blurhash_fingerprint: format!("{name}-hash"),
                    id: id.into(),
                    width: 24,
                    height: 32,
                })
            })
            .1
            .unwrap();
    }

    fn record(id: &str, image: &str, profile: &str) -> Record {
        Record {
            id: id.into(),
            image: Some(image.into()),
            profile: Some(profile.into()),
            description: Some("Paneer tikka".into()),
            store: Some("store-9".into()),
            ..Record::default()
        }
    }

    // =========================================================================
    // build_post
    // =========================================================================

    #[test]
    fn payload_shape() {
        let cache = DerivationCache::new();
        seed(&cache, Scope::ImagePosts, "img1", "post-id");
        seed(&cache, Scope::Users, "userA", "creator-id");

        let post = build_post(&record("r1", "img1", "userA"), &cache, &settings()).unwrap();
        let json = serde_json::to_value(&post).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "id": "post-id",
                "alt_description": "Paneer tikka",
                "color": "#d9d9d9",
                "description": "Paneer tikka",
                "height": 32,
                "width": 24,
                "likes": 0,
                "storeid": "store-9",
                "creator": {
                    "creatorid": "creator-id",
                    "name": "userA",
                    "username": "userA",
                    "profile_image": "https://cdn.example.com/creators/userA-digest.jpg"
                },
                "urls": {
                    "blur_hash": "img1-hash",
                    "download": "https://cdn.example.com/image-posts/orig.img1-digest.jpg",
                    "regular": "https://cdn.example.com/image-posts/img1-digest.jpg",
                    "small_s3": "https://origin.example.com/image-posts/img1-digest.jpg"
                }
            })
        );
    }

    #[test]
    fn default_store_fills_in() {
        let cache = DerivationCache::new();
        seed(&cache, Scope::ImagePosts, "img1", "p");
        seed(&cache, Scope::Users, "userA", "c");
        let rec = Record {
            store: None,
            ..record("r1", "img1", "userA")
        };

        let post = build_post(&rec, &cache, &settings()).unwrap();
        assert_eq!(post.storeid, "default-store");

        let no_default = PostSettings {
            default_store_id: String::new(),
            ..settings()
        };
        assert!(matches!(
            build_post(&rec, &cache, &no_default),
            Err(PublishError::MissingField("store"))
        ));
    }

    #[test]
    fn missing_creator_derivation() {
        let cache = DerivationCache::new();
        seed(&cache, Scope::ImagePosts, "img1", "p");

        let err = build_post(&record("r1", "img1", "userA"), &cache, &settings()).unwrap_err();
        assert!(matches!(
            err,
            PublishError::MissingDerivation { key } if key == CacheKey::new(Scope::Users, "userA")
        ));
    }

    // =========================================================================
    // publish_page
    // =========================================================================

    #[test]
    fn shared_image_publishes_same_post_id_twice() {
        let cache = DerivationCache::new();
        seed(&cache, Scope::ImagePosts, "img1", "post-id");
        seed(&cache, Scope::Users, "userA", "a");
        seed(&cache, Scope::Users, "userB", "b");
        let sink = RecordingSink::default();
        let records = vec![record("r1", "img1", "userA"), record("r2", "img1", "userB")];

        let report = publish_page(&sink, &cache, &settings(), &records, None);

        assert_eq!(report.published, vec!["r1", "r2"]);
        let posts = sink.posts();
        assert_eq!(posts.len(), 2);
        assert!(posts.iter().all(|p| p.id == "post-id"));
        let mut creators: Vec<_> = posts.iter().map(|p| p.creator.creatorid.clone()).collect();
        creators.sort();
        assert_eq!(creators, vec!["a", "b"]);
    }

    #[test]
    fn failures_are_isolated_per_record() {
        let cache = DerivationCache::new();
        seed(&cache, Scope::ImagePosts, "good", "good-id");
        seed(&cache, Scope::ImagePosts, "dupe", "dupe-id");
        seed(&cache, Scope::Users, "userA", "a");
        let sink = RecordingSink {
            rejected_ids: vec!["dupe-id".into()],
            ..RecordingSink::default()
        };
        let records = vec![
            record("r1", "missing", "userA"),
            record("r2", "dupe", "userA"),
            record("r3", "good", "userA"),
            Record {
                id: "m1".into(),
                image: Some("good".into()),
                ..Record::default()
            },
        ];
        let (tx, rx) = std::sync::mpsc::channel();

        let report = publish_page(&sink, &cache, &settings(), &records, Some(&tx));
        drop(tx);

        assert_eq!(report.published, vec!["r3"]);
        assert_eq!(report.skipped, vec!["m1"]);
        let failed: Vec<&str> = report.failures.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(failed, vec!["r1", "r2"]);
        assert!(matches!(
            report.failures[1].1,
            PublishError::Rejected { status: 422, .. }
        ));
        assert_eq!(rx.into_iter().count(), 4);
    }
}
