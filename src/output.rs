//! CLI output formatting for the `upload` and `check` commands.
//!
//! # Information-First Display
//!
//! Every entity leads with its identity (`scope/name` for images, the record
//! id for posts). Digests are shortened to their first 12 characters; the
//! full value is in the stored filename.
//!
//! # Output Format
//!
//! ## Upload
//!
//! ```text
//! 001 Page (2 records, 3 images)
//!     users/userA → 3f2a9c01b7de (derived)
//!     imagePosts/img1 → 9bc04e11aa70 (derived)
//!     imagePosts/broken FAILED: decode failed: ...
//!     Post r1 → 0b1c4a52-...
//!     Post m7 skipped (no creator)
//!
//! Migrated 1 page, 2 records
//! Posts: 1 published, 1 skipped
//! Cache: 3 derived, 1 failed
//! ```
//!
//! ## Check
//!
//! ```text
//! Sources
//! users: 2 sources, 2 blobs
//! restaurants: 0 sources
//! imagePosts: 1 source, 2 blobs
//!     Mismatched: deadbeef
//! Unknown scope directories
//!     thumbnails
//! ```
//!
//! # Architecture
//!
//! Each output has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::cache::Lookup;
use crate::migrate::{MigrateEvent, RunSummary};
use crate::scan::Inventory;

// ============================================================================
// Shared helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn short_digest(digest: &str) -> &str {
    digest.get(..12).unwrap_or(digest)
}

fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        format!("{} {}", n, word)
    } else {
        format!("{} {}s", n, word)
    }
}

fn lookup_label(lookup: Lookup) -> &'static str {
    match lookup {
        Lookup::Hit => "cached",
        Lookup::Joined => "joined",
        Lookup::Derived => "derived",
    }
}

// ============================================================================
// Upload progress
// ============================================================================

/// Format a single migration progress event as display lines.
pub fn format_event(event: &MigrateEvent) -> Vec<String> {
    match event {
        MigrateEvent::PageStarted {
            page,
            records,
            images,
        } => vec![format!(
            "{} Page ({}, {})",
            format_index(*page),
            plural(*records, "record"),
            plural(*images, "image")
        )],
        MigrateEvent::ImageResolved {
            key,
            lookup,
            hashed_filename,
        } => vec![format!(
            "{}{} → {} ({})",
            indent(1),
            key,
            short_digest(hashed_filename),
            lookup_label(*lookup)
        )],
        MigrateEvent::ImageFailed { key, error } => {
            vec![format!("{}{} FAILED: {}", indent(1), key, error)]
        }
        MigrateEvent::PostPublished { record_id, post_id } => {
            vec![format!("{}Post {} → {}", indent(1), record_id, post_id)]
        }
        MigrateEvent::PostSkipped { record_id } => {
            vec![format!("{}Post {} skipped (no creator)", indent(1), record_id)]
        }
        MigrateEvent::PostFailed { record_id, error } => {
            vec![format!("{}Post {} FAILED: {}", indent(1), record_id, error)]
        }
        MigrateEvent::PageFinished {
            failed_images,
            failed_posts,
            ..
        } => {
            if *failed_images == 0 && *failed_posts == 0 {
                Vec::new()
            } else {
                vec![format!(
                    "{}{} failed, {} failed",
                    indent(1),
                    plural(*failed_images, "image"),
                    plural(*failed_posts, "post")
                )]
            }
        }
    }
}

/// Format the end-of-run summary: totals, cache contents and failures.
pub fn format_summary(summary: &RunSummary) -> Vec<String> {
    let mut lines = vec![format!(
        "Migrated {}, {}",
        plural(summary.pages, "page"),
        plural(summary.records, "record")
    )];

    let mut posts = format!(
        "Posts: {} published, {} skipped",
        summary.published, summary.skipped
    );
    if !summary.post_failures.is_empty() {
        posts.push_str(&format!(", {} failed", summary.post_failures.len()));
    }
    lines.push(posts);
    lines.push(format!("Cache: {}", summary.cache));

    if !summary.entries.is_empty() {
        lines.push("Entries".to_string());
        for (key, result) in &summary.entries {
            lines.push(format!(
                "{}{} → {} ({})",
                indent(1),
                key,
                short_digest(&result.hashed_filename),
                result.id
            ));
        }
    }

    if !summary.is_clean() {
        lines.push("Failures".to_string());
        for err in &summary.image_failures {
            lines.push(format!("{}{}: {}", indent(1), err.key, err.cause));
        }
        for (record_id, err) in &summary.post_failures {
            lines.push(format!("{}Post {}: {}", indent(1), record_id, err));
        }
    }
    lines
}

/// Print the run summary to stdout.
pub fn print_summary(summary: &RunSummary) {
    for line in format_summary(summary) {
        println!("{}", line);
    }
}

// ============================================================================
// Check
// ============================================================================

/// Format the source inventory produced by [`crate::scan::scan`].
pub fn format_inventory(inventory: &Inventory) -> Vec<String> {
    let mut lines = vec!["Sources".to_string()];

    for scope in &inventory.scopes {
        let mut header = format!("{}: {}", scope.scope, plural(scope.sources.len(), "source"));
        if scope.blobs > 0 {
            header.push_str(&format!(", {}", plural(scope.blobs, "blob")));
        }
        lines.push(header);
        if !scope.unreadable.is_empty() {
            lines.push(format!("{}Unreadable: {}", indent(1), scope.unreadable.join(", ")));
        }
        if !scope.mismatched.is_empty() {
            lines.push(format!("{}Mismatched: {}", indent(1), scope.mismatched.join(", ")));
        }
    }

    if !inventory.unknown_dirs.is_empty() {
        lines.push("Unknown scope directories".to_string());
        for dir in &inventory.unknown_dirs {
            lines.push(format!("{}{}", indent(1), dir));
        }
    }

    if !inventory.ignored_files.is_empty() {
        lines.push("Ignored files".to_string());
        for file in &inventory.ignored_files {
            lines.push(format!("{}{}", indent(1), file.display()));
        }
    }
    lines
}

/// Print the source inventory to stdout.
pub fn print_inventory(inventory: &Inventory) {
    for line in format_inventory(inventory) {
        println!("{}", line);
    }
}
