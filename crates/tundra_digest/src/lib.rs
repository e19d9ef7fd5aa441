#![deny(missing_docs)]

//! Utility functions for computing file and byte digests using the
//! [RustCrypto/hashes](https://github.com/RustCrypto/hashes) crates.
//!
//! The download and verification paths deal with digests in two shapes:
//! statically typed (a [`Sha256Hash`] cookie over `repomd.xml`) and
//! dynamically typed (whatever [`ChecksumKind`] the repo metadata or a
//! metalink document declares). Both are covered here:
//!
//! - [`compute_file_digest`] / [`compute_bytes_digest`] for a concrete
//!   algorithm chosen at compile time,
//! - [`hex_file_digest`] / [`verify_file_checksum`] keyed by a
//!   [`ChecksumKind`] value,
//! - [`HashingWriter`], which wraps a writer and hashes everything passing
//!   through it, so downloads digest on the fly.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

pub use digest;
use digest::{Digest, Output};
pub use md5::Md5;
pub use sha1::Sha1;
pub use sha2::{Sha256, Sha384, Sha512};

use tundra_types::{Checksum, ChecksumKind};

/// A type alias for the output of a SHA256 hash.
pub type Sha256Hash = sha2::digest::Output<Sha256>;

/// Compute a hash of the file at the specified location.
pub fn compute_file_digest<D: Digest + Default + Write>(
    path: impl AsRef<Path>,
) -> Result<Output<D>, std::io::Error> {
    let mut file = File::open(path)?;
    let mut hasher = D::default();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(hasher.finalize())
}

/// Compute a hash of the specified bytes.
pub fn compute_bytes_digest<D: Digest + Default + Write>(bytes: impl AsRef<[u8]>) -> Output<D> {
    let mut hasher = D::default();
    hasher.update(bytes);
    hasher.finalize()
}

/// Parses a hash hex string to a digest.
pub fn parse_digest_from_hex<D: Digest>(str: &str) -> Option<Output<D>> {
    let mut hash = <Output<D>>::default();
    match hex::decode_to_slice(str, &mut hash) {
        Ok(_) => Some(hash),
        Err(_) => None,
    }
}

/// Compute the lowercase hex digest of a file with the algorithm selected
/// at runtime.
pub fn hex_file_digest(
    kind: ChecksumKind,
    path: impl AsRef<Path>,
) -> Result<String, std::io::Error> {
    let path = path.as_ref();
    let digest = match kind {
        ChecksumKind::Md5 => format!("{:x}", compute_file_digest::<Md5>(path)?),
        ChecksumKind::Sha1 => format!("{:x}", compute_file_digest::<Sha1>(path)?),
        ChecksumKind::Sha256 => format!("{:x}", compute_file_digest::<Sha256>(path)?),
        ChecksumKind::Sha384 => format!("{:x}", compute_file_digest::<Sha384>(path)?),
        ChecksumKind::Sha512 => format!("{:x}", compute_file_digest::<Sha512>(path)?),
    };
    Ok(digest)
}

/// Compare a file against an expected checksum. Returns `Ok(true)` when
/// the digest matches.
pub fn verify_file_checksum(
    expected: &Checksum,
    path: impl AsRef<Path>,
) -> Result<bool, std::io::Error> {
    let actual = hex_file_digest(expected.kind, path)?;
    Ok(actual == expected.hex)
}

/// A writer adapter that hashes all bytes written through it.
///
/// Call [`HashingWriter::finalize`] to retrieve both the wrapped writer
/// and the digest.
pub struct HashingWriter<W, D: Digest> {
    writer: W,
    hasher: D,
}

impl<W, D: Digest + Default> HashingWriter<W, D> {
    /// Constructs a new instance from a writer and a new (empty) hasher.
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            hasher: Default::default(),
        }
    }
}

impl<W, D: Digest> HashingWriter<W, D> {
    /// Consumes this instance and returns the original writer and the hash
    /// of all bytes written to this instance.
    pub fn finalize(self) -> (W, Output<D>) {
        (self.writer, self.hasher.finalize())
    }
}

impl<W: Write, D: Digest> Write for HashingWriter<W, D> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let bytes = self.writer.write(buf)?;
        self.hasher.update(&buf[..bytes]);
        Ok(bytes)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

/// A reader adapter that hashes all bytes read through it.
pub struct HashingReader<R, D: Digest> {
    reader: R,
    hasher: D,
}

impl<R, D: Digest + Default> HashingReader<R, D> {
    /// Constructs a new instance from a reader and a new (empty) hasher.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            hasher: Default::default(),
        }
    }
}

impl<R, D: Digest> HashingReader<R, D> {
    /// Consumes this instance and returns the original reader and the hash
    /// of all bytes read from this instance.
    pub fn finalize(self) -> (R, Output<D>) {
        (self.reader, self.hasher.finalize())
    }
}

impl<R: Read, D: Digest> Read for HashingReader<R, D> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let bytes_read = self.reader.read(buf)?;
        self.hasher.update(&buf[..bytes_read]);
        Ok(bytes_read)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Read;

    #[rstest]
    #[case(
        "1234567890",
        "c775e7b757ede630cd0aa1113bd102661ab38829ca52a6422ab782862f268646"
    )]
    #[case(
        "Hello, world!",
        "315f5bdb76d078c43b8ac0064e4a0164612b1fce77c869345bfc94c75894edd3"
    )]
    fn file_sha256(#[case] input: &str, #[case] expected: &str) {
        let temp_dir = tempfile::tempdir().unwrap();
        let file_path = temp_dir.path().join("test");
        std::fs::write(&file_path, input).unwrap();
        let hash = compute_file_digest::<Sha256>(&file_path).unwrap();
        assert_eq!(format!("{hash:x}"), expected);
        assert_eq!(
            hex_file_digest(ChecksumKind::Sha256, &file_path).unwrap(),
            expected
        );
    }

    #[test]
    fn dynamic_verification() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file_path = temp_dir.path().join("pkg.rpm");
        std::fs::write(&file_path, "payload").unwrap();

        let good = Checksum::new(
            ChecksumKind::Sha256,
            hex_file_digest(ChecksumKind::Sha256, &file_path).unwrap(),
        );
        assert!(verify_file_checksum(&good, &file_path).unwrap());

        let bad = Checksum::new(ChecksumKind::Sha256, "ab".repeat(32));
        assert!(!verify_file_checksum(&bad, &file_path).unwrap());
    }

    #[test]
    fn hashing_reader_sha256() {
        let input = "Hello, world!";
        let mut cursor = HashingReader::<_, Sha256>::new(std::io::Cursor::new(input));
        let mut out = String::new();
        cursor.read_to_string(&mut out).unwrap();
        assert_eq!(&out, input);
        let (_, hash) = cursor.finalize();
        assert_eq!(
            format!("{hash:x}"),
            "315f5bdb76d078c43b8ac0064e4a0164612b1fce77c869345bfc94c75894edd3"
        );
    }

    #[test]
    fn hashing_writer_matches_bytes_digest() {
        let mut writer = HashingWriter::<_, Sha256>::new(Vec::new());
        writer.write_all(b"abc").unwrap();
        writer.write_all(b"def").unwrap();
        let (bytes, hash) = writer.finalize();
        assert_eq!(bytes, b"abcdef");
        assert_eq!(hash, compute_bytes_digest::<Sha256>(b"abcdef"));
    }
}
