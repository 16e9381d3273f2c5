//! Per-page fan-out of image derivations.
//!
//! Every record of a page references up to three images (profile, post
//! image, restaurant). The distinct keys of the whole page are derived in
//! parallel on the rayon pool; [`upload_batch`] returns only after every
//! derivation has settled, successful or not.
//!
//! Keys are deduplicated before fan-out, so no two tasks of one batch ever
//! request the same key. Records that share an image across pages hit the
//! cache instead.

use crate::cache::Lookup;
use crate::imaging::ImageBackend;
use crate::migrate::MigrateEvent;
use crate::types::{CacheKey, Record};
use crate::upload::{DerivationError, Uploader};
use rayon::prelude::*;
use std::collections::HashSet;
use std::sync::mpsc::Sender;

/// Outcome of one page's fan-out.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Keys that have a cache entry, with how the cache answered.
    pub resolved: Vec<(CacheKey, Lookup)>,
    pub failures: Vec<DerivationError>,
}

impl BatchReport {
    pub fn derived(&self) -> usize {
        self.resolved
            .iter()
            .filter(|(_, lookup)| *lookup == Lookup::Derived)
            .count()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Distinct image keys referenced by `records`, in first-seen order.
pub fn distinct_keys(records: &[Record]) -> Vec<CacheKey> {
    let mut seen = HashSet::new();
    records
        .iter()
        .flat_map(Record::image_keys)
        .filter(|key| seen.insert(key.clone()))
        .collect()
}

/// Derive every image referenced by `records` and wait for all of them.
pub fn upload_batch<B: ImageBackend>(
    uploader: &Uploader<'_, B>,
    records: &[Record],
    events: Option<&Sender<MigrateEvent>>,
) -> BatchReport {
    let keys = distinct_keys(records);

    let outcomes: Vec<_> = keys
        .par_iter()
        .map(|key| {
            let (lookup, outcome) = uploader.resolve(key);
            match &outcome {
                Ok(result) => {
                    if lookup == Lookup::Hit {
                        tracing::debug!(%key, "cache hit");
                    }
                    if let Some(tx) = events {
                        tx.send(MigrateEvent::ImageResolved {
                            key: key.clone(),
                            lookup,
                            hashed_filename: result.hashed_filename.clone(),
                        })
                        .ok();
                    }
                }
                Err(err) => {
                    tracing::warn!(%key, error = %err.cause, "image derivation failed");
                    if let Some(tx) = events {
                        tx.send(MigrateEvent::ImageFailed {
                            key: key.clone(),
                            error: err.cause.to_string(),
                        })
                        .ok();
                    }
                }
            }
            (key.clone(), lookup, outcome)
        })
        .collect();

    let mut report = BatchReport::default();
    for (key, lookup, outcome) in outcomes {
        match outcome {
            Ok(_) => report.resolved.push((key, lookup)),
            Err(err) => report.failures.push(err),
        }
    }
    report
}
