//! Source tree inventory for the `check` command.
//!
//! Walks the storage root without touching the network:
//!
//! ```text
//! content/
//! ├── config.toml
//! ├── sources/
//! │   ├── users/*.jpg          # counted, headers probed
//! │   ├── restaurants/*.jpg
//! │   ├── imagePosts/*.jpg
//! │   └── thumbnails/          # unknown scope: reported
//! └── generated/
//!     ├── users/<digest>.jpg
//!     └── imagePosts/
//!         ├── <digest>.jpg     # re-hashed: name must match content
//!         └── orig.<digest>.jpg
//! ```
//!
//! Compressed post blobs are named after the hash of their own bytes, so
//! each one can be verified in place. Avatars and originals are named after
//! the compressed rendition and are only counted.

use crate::blob::{BLOB_EXTENSION, GENERATED_DIR, ORIGINAL_PREFIX, SOURCES_DIR};
use crate::digest::hash_file;
use crate::types::Scope;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("no sources/ directory under {0}")]
    NoSources(PathBuf),
}

/// What one scope holds on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeInventory {
    pub scope: Scope,
    /// Source names (file stems), sorted.
    pub sources: Vec<String>,
    /// Sources whose header could not be read as an image.
    pub unreadable: Vec<String>,
    /// Stored blobs, originals included.
    pub blobs: usize,
    /// Compressed blobs whose content no longer matches their name.
    pub mismatched: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inventory {
    pub scopes: Vec<ScopeInventory>,
    /// Directories under `sources/` that name no known scope.
    pub unknown_dirs: Vec<String>,
    /// Non-jpg files found among the sources, relative to the root.
    pub ignored_files: Vec<PathBuf>,
}

impl Inventory {
    pub fn source_count(&self) -> usize {
        self.scopes.iter().map(|s| s.sources.len()).sum()
    }

    pub fn is_healthy(&self) -> bool {
        self.scopes
            .iter()
            .all(|s| s.unreadable.is_empty() && s.mismatched.is_empty())
    }
}

fn is_blob(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .is_some_and(|e| e.to_string_lossy().eq_ignore_ascii_case(BLOB_EXTENSION))
}

fn stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn header_readable(path: &Path) -> bool {
    image::ImageReader::open(path)
        .and_then(|r| r.with_guessed_format())
        .map(|r| r.into_dimensions().is_ok())
        .unwrap_or(false)
}

/// Inventory the source and generated trees under `root`.
pub fn scan(root: &Path) -> Result<Inventory, ScanError> {
    let sources_root = root.join(SOURCES_DIR);
    if !sources_root.is_dir() {
        return Err(ScanError::NoSources(root.to_path_buf()));
    }

    let mut unknown_dirs = Vec::new();
    let mut ignored_files = Vec::new();
    for entry in WalkDir::new(&sources_root).min_depth(1).max_depth(2) {
        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy();
        if name.starts_with('.') {
            continue;
        }
        if entry.depth() == 1 {
            if entry.file_type().is_dir() && Scope::from_dir_name(&name).is_none() {
                unknown_dirs.push(name.to_string());
            }
            continue;
        }
        let in_known_scope = path
            .parent()
            .and_then(Path::file_name)
            .and_then(|n| Scope::from_dir_name(&n.to_string_lossy()))
            .is_some();
        if in_known_scope && !is_blob(path) {
            let rel = path.strip_prefix(root).unwrap_or(path);
            ignored_files.push(rel.to_path_buf());
        }
    }
    unknown_dirs.sort();
    ignored_files.sort();

    let mut scopes = Vec::new();
    for scope in Scope::ALL {
        scopes.push(scan_scope(root, scope)?);
    }

    Ok(Inventory {
        scopes,
        unknown_dirs,
        ignored_files,
    })
}

fn jpg_files(dir: &Path) -> Result<Vec<PathBuf>, ScanError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry?;
        if is_blob(entry.path()) && !entry.file_name().to_string_lossy().starts_with('.') {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

fn scan_scope(root: &Path, scope: Scope) -> Result<ScopeInventory, ScanError> {
    let mut inventory = ScopeInventory {
        scope,
        sources: Vec::new(),
        unreadable: Vec::new(),
        blobs: 0,
        mismatched: Vec::new(),
    };

    for path in jpg_files(&root.join(SOURCES_DIR).join(scope.as_str()))? {
        let name = stem(&path);
        if !header_readable(&path) {
            inventory.unreadable.push(name.clone());
        }
        inventory.sources.push(name);
    }

    for path in jpg_files(&root.join(GENERATED_DIR).join(scope.as_str()))? {
        inventory.blobs += 1;
        let name = stem(&path);
        let verifiable = scope == Scope::ImagePosts && !name.starts_with(ORIGINAL_PREFIX);
        if verifiable && hash_file(&path)? != name {
            tracing::warn!(path = %path.display(), "blob content does not match its name");
            inventory.mismatched.push(name);
        }
    }

    Ok(inventory)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{create_dummy_source, create_test_jpeg};
    use sha2::{Digest, Sha256};
    use std::fs;
    use tempfile::TempDir;

    fn find(inv: &Inventory, scope: Scope) -> &ScopeInventory {
        inv.scopes.iter().find(|s| s.scope == scope).unwrap()
    }

    #[test]
    fn missing_sources_dir_is_error() {
        let tmp = TempDir::new().unwrap();
        assert!(matches!(scan(tmp.path()), Err(ScanError::NoSources(_))));
    }

    #[test]
    fn counts_sources_per_scope() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("sources");
        create_test_jpeg(&src.join("users/userB.jpg"), 10, 10);
        create_test_jpeg(&src.join("users/userA.jpg"), 10, 10);
        create_test_jpeg(&src.join("imagePosts/img1.jpg"), 20, 10);

        let inv = scan(tmp.path()).unwrap();

        assert_eq!(find(&inv, Scope::Users).sources, vec!["userA", "userB"]);
        assert_eq!(find(&inv, Scope::ImagePosts).sources, vec!["img1"]);
        assert!(find(&inv, Scope::Restaurants).sources.is_empty());
        assert_eq!(inv.source_count(), 3);
        assert!(inv.is_healthy());
    }

    #[test]
    fn reports_unreadable_sources() {
        let tmp = TempDir::new().unwrap();
        create_dummy_source(&tmp.path().join("sources/users/junk.jpg"));

        let inv = scan(tmp.path()).unwrap();

        assert_eq!(find(&inv, Scope::Users).unreadable, vec!["junk"]);
        assert!(!inv.is_healthy());
    }

    #[test]
    fn reports_unknown_dirs_and_ignored_files() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("sources");
        fs::create_dir_all(src.join("thumbnails")).unwrap();
        fs::create_dir_all(src.join("users")).unwrap();
        fs::write(src.join("users/notes.txt"), "x").unwrap();
        fs::write(src.join("users/.DS_Store"), "x").unwrap();

        let inv = scan(tmp.path()).unwrap();

        assert_eq!(inv.unknown_dirs, vec!["thumbnails"]);
        assert_eq!(
            inv.ignored_files,
            vec![PathBuf::from("sources/users/notes.txt")]
        );
    }

    #[test]
    fn verifies_compressed_post_blobs() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("sources")).unwrap();
        let generated = tmp.path().join("generated/imagePosts");
        fs::create_dir_all(&generated).unwrap();

        let good = b"compressed bytes";
        let digest = format!("{:x}", Sha256::digest(good));
        fs::write(generated.join(format!("{digest}.jpg")), good).unwrap();
        fs::write(generated.join(format!("orig.{digest}.jpg")), b"original").unwrap();
        fs::write(generated.join("deadbeef.jpg"), b"tampered").unwrap();

        let inv = scan(tmp.path()).unwrap();
        let posts = find(&inv, Scope::ImagePosts);

        assert_eq!(posts.blobs, 3);
        assert_eq!(posts.mismatched, vec!["deadbeef"]);
    }
}
