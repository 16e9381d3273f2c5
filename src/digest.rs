//! Content hashing for rendition filenames.
//!
//! Every stored rendition is named after the SHA-256 of the *compressed*
//! rendition's bytes, exactly as they land on disk. The hasher is an
//! [`io::Write`] sink, so the encoder streams straight into it and memory
//! use stays flat no matter how large the source is.
//!
//! Scopes that store the compressed rendition hash it with a [`HashingTee`]
//! while it is staged, so it is encoded once. Scopes that only need its name
//! render it into a bare [`HashingWriter`] via [`content_digest`].

use crate::imaging::{BackendError, ImageBackend, Rendition};
use image::DynamicImage;
use sha2::{Digest, Sha256};
use std::io::{self, Read, Write};
use std::path::Path;

/// A write sink that feeds everything into a SHA-256 hasher.
#[derive(Default)]
pub struct HashingWriter {
    hasher: Sha256,
}

impl HashingWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume the writer and return the lowercase hex digest.
    pub fn finish(self) -> String {
        format!("{:x}", self.hasher.finalize())
    }
}

impl Write for HashingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.hasher.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Passes writes through to `inner`, hashing exactly the bytes it accepted.
pub struct HashingTee<W> {
    inner: W,
    hasher: Sha256,
}

impl<W: Write> HashingTee<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
        }
    }

    /// Hex digest of everything written so far.
    pub fn finish(self) -> String {
        format!("{:x}", self.hasher.finalize())
    }
}

impl<W: Write> Write for HashingTee<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Digest of the compressed rendition of `source`.
pub fn content_digest(
    backend: &impl ImageBackend,
    source: &DynamicImage,
) -> Result<String, BackendError> {
    let mut sink = HashingWriter::new();
    backend.render(source, Rendition::Compressed, &mut sink)?;
    Ok(sink.finish())
}

/// SHA-256 of a file's contents, streamed, returned as a hex string.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut sink = HashingWriter::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        sink.write_all(&buf[..n])?;
    }
    Ok(sink.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::RustBackend;
    use crate::imaging::backend::tests::{MockBackend, RecordedOp};
    use crate::test_helpers::gradient_image;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn hashing_writer_matches_one_shot_digest() {
        let mut sink = HashingWriter::new();
        sink.write_all(b"hello ").unwrap();
        sink.write_all(b"world").unwrap();
        assert_eq!(sink.finish(), format!("{:x}", Sha256::digest(b"hello world")));
    }

    #[test]
    fn empty_input_has_well_known_digest() {
        assert_eq!(
            HashingWriter::new().finish(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn content_digest_hashes_compressed_rendition() {
        let backend = MockBackend::new();
        let source = backend.decode(Path::new("/src/imagePosts/a.jpg")).unwrap();
        let digest = content_digest(&backend, &source).unwrap();

        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(
            backend.count(&RecordedOp::Render(Rendition::Compressed)),
            1
        );
    }

    #[test]
    fn content_digest_is_deterministic_for_real_images() {
        let backend = RustBackend::new();
        let source = gradient_image(300, 1400);
        let a = content_digest(&backend, &source).unwrap();
        let b = content_digest(&backend, &source).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn content_digest_matches_written_bytes() {
        let backend = RustBackend::new();
        let source = gradient_image(120, 90);
        let mut written = Vec::new();
        backend
            .render(&source, Rendition::Compressed, &mut written)
            .unwrap();
        assert_eq!(
            content_digest(&backend, &source).unwrap(),
            format!("{:x}", Sha256::digest(&written))
        );
    }

    #[test]
    fn hash_file_changes_with_content() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("test.bin");

        fs::write(&path, b"version 1").unwrap();
        let h1 = hash_file(&path).unwrap();

        fs::write(&path, b"version 2").unwrap();
        let h2 = hash_file(&path).unwrap();

        assert_ne!(h1, h2);
        assert_eq!(h2, format!("{:x}", Sha256::digest(b"version 2")));
    }

    /// Accepts at most `limit` bytes per call, to exercise short writes.
    struct Trickle {
        bytes: Vec<u8>,
        limit: usize,
    }

    impl Write for Trickle {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let n = buf.len().min(self.limit);
            self.bytes.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn tee_hashes_exactly_what_reached_the_inner_writer() {
        let mut tee = HashingTee::new(Trickle {
            bytes: Vec::new(),
            limit: 3,
        });
        tee.write_all(b"hello world").unwrap();
        let digest = tee.finish();
        assert_eq!(digest, format!("{:x}", Sha256::digest(b"hello world")));
    }

    #[test]
    fn tee_digest_matches_content_digest() {
        let backend = RustBackend::new();
        let source = gradient_image(140, 1100);
        let mut bytes = Vec::new();
        let mut tee = HashingTee::new(&mut bytes);
        backend
            .render(&source, Rendition::Compressed, &mut tee)
            .unwrap();
        let digest = tee.finish();

        assert_eq!(digest, content_digest(&backend, &source).unwrap());
        assert_eq!(digest, format!("{:x}", Sha256::digest(&bytes)));
    }
}
