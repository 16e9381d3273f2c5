//! The migration run.
//!
//! ```text
//! for page in feed:                 (strictly one page at a time)
//!     upload_batch(page.nodes)      ─ every image derived or failed
//!     publish_page(page.nodes)      ─ skipped on dry runs
//! summary(cache)
//! ```
//!
//! Image and post failures are collected and reported; the run carries on.
//! A failed page fetch ends the run with [`MigrateError::Fetch`].

use crate::batch::upload_batch;
use crate::cache::{CacheStats, Lookup};
use crate::feed::{FetchError, PageSource, Pages};
use crate::imaging::ImageBackend;
use crate::publish::{PostSettings, PostSink, PublishError, publish_page};
use crate::types::{CacheKey, DerivationResult};
use crate::upload::{DerivationError, Uploader};
use std::sync::Arc;
use std::sync::mpsc::Sender;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MigrateError {
    #[error("fetching page {page} failed: {source}")]
    Fetch {
        page: usize,
        #[source]
        source: FetchError,
    },
}

/// Progress reported while a run is underway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrateEvent {
    PageStarted {
        page: usize,
        records: usize,
        images: usize,
    },
    ImageResolved {
        key: CacheKey,
        lookup: Lookup,
        hashed_filename: String,
    },
    ImageFailed {
        key: CacheKey,
        error: String,
    },
    PostPublished {
        record_id: String,
        post_id: String,
    },
    PostSkipped {
        record_id: String,
    },
    PostFailed {
        record_id: String,
        error: String,
    },
    PageFinished {
        page: usize,
        failed_images: usize,
        failed_posts: usize,
    },
}

/// Where and how posts are published. Absent on dry runs.
#[derive(Clone, Copy)]
pub struct PublishStage<'a> {
    pub sink: &'a dyn PostSink,
    pub settings: &'a PostSettings,
}

/// What a completed run did.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub pages: usize,
    pub records: usize,
    pub published: usize,
    pub skipped: usize,
    pub image_failures: Vec<DerivationError>,
    pub post_failures: Vec<(String, PublishError)>,
    pub cache: CacheStats,
    /// Every successful derivation, sorted by key.
    pub entries: Vec<(CacheKey, Arc<DerivationResult>)>,
}

impl RunSummary {
    pub fn is_clean(&self) -> bool {
        self.image_failures.is_empty() && self.post_failures.is_empty()
    }
}

/// Migrate every page of `feed`.
pub fn run<S: PageSource, B: ImageBackend>(
    feed: S,
    uploader: &Uploader<'_, B>,
    publish: Option<PublishStage<'_>>,
    events: Option<Sender<MigrateEvent>>,
) -> Result<RunSummary, MigrateError> {
    let mut summary = RunSummary::default();
    let events = events.as_ref();

    for (index, page) in Pages::new(feed).enumerate() {
        let number = index + 1;
        let page = page.map_err(|source| MigrateError::Fetch {
            page: number,
            source,
        })?;
        summary.pages = number;
        summary.records += page.nodes.len();

        let images = crate::batch::distinct_keys(&page.nodes).len();
        tracing::info!(page = number, records = page.nodes.len(), images, "page");
        if let Some(tx) = events {
            tx.send(MigrateEvent::PageStarted {
                page: number,
                records: page.nodes.len(),
                images,
            })
            .ok();
        }
        if page.nodes.is_empty() {
            continue;
        }

        let batch = upload_batch(uploader, &page.nodes, events);
        let failed_images = batch.failures.len();
        summary.image_failures.extend(batch.failures);

        let mut failed_posts = 0;
        if let Some(stage) = publish {
            let report = publish_page(
                stage.sink,
                uploader.cache(),
                stage.settings,
                &page.nodes,
                events,
            );
            summary.published += report.published.len();
            summary.skipped += report.skipped.len();
            failed_posts = report.failures.len();
            summary.post_failures.extend(report.failures);
        }

        if let Some(tx) = events {
            tx.send(MigrateEvent::PageFinished {
                page: number,
                failed_images,
                failed_posts,
            })
            .ok();
        }
    }

    summary.cache = uploader.cache().stats();
    summary.entries = uploader.cache().entries();
    Ok(summary)
}
