//! SHA-256 hash computation utilities.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use sha2::{Digest, Sha256};

/// Buffer size for reading files during hashing (64KB).
const BUFFER_SIZE: usize = 64 * 1024;

/// Compute the SHA-256 of a byte slice.
///
/// # Returns
/// 64-character lowercase hex string.
pub fn hash_bytes(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Digest of one part of a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartDigest {
    /// Byte offset of the part within the file.
    pub offset: u64,
    /// Part length in bytes.
    pub size: u64,
    /// Lowercase hex SHA-256 of the part.
    pub sha256: String,
}

/// Digest of a whole file, optionally with per-part digests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDigest {
    /// Lowercase hex SHA-256 of the whole file.
    pub sha256: String,
    /// File size in bytes.
    pub size: u64,
    /// Per-part digests, in file order. Empty unless requested.
    pub parts: Vec<PartDigest>,
}

/// Compute the SHA-256 and size of a file.
///
/// Reads the file in chunks to avoid loading it into memory.
///
/// # Errors
/// Returns error if the file cannot be read.
pub fn hash_file(path: &Path) -> io::Result<FileDigest> {
    hash_file_parts(path, 0)
}

/// Compute the SHA-256 of a file and of each `part_size` range of it.
///
/// Both digests are computed in a single pass. A `part_size` of 0 skips the
/// per-part digests. The last part may be shorter than `part_size`.
///
/// # Arguments
/// * `path` - File to hash
/// * `part_size` - Length of each part in bytes, or 0 for no parts
pub fn hash_file_parts(path: &Path, part_size: u64) -> io::Result<FileDigest> {
    let mut file: File = File::open(path)?;
    let mut whole: Sha256 = Sha256::new();
    let mut part: Sha256 = Sha256::new();
    let mut parts: Vec<PartDigest> = Vec::new();
    let mut part_offset: u64 = 0;
    let mut part_len: u64 = 0;
    let mut size: u64 = 0;
    let mut buffer: Vec<u8> = vec![0u8; BUFFER_SIZE];

    loop {
        let bytes_read: usize = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        let mut chunk: &[u8] = &buffer[..bytes_read];
        whole.update(chunk);
        size += bytes_read as u64;

        if part_size == 0 {
            continue;
        }

        // Split the chunk across part boundaries
        while !chunk.is_empty() {
            let room: usize = (part_size - part_len).min(chunk.len() as u64) as usize;
            part.update(&chunk[..room]);
            part_len += room as u64;
            chunk = &chunk[room..];

            if part_len == part_size {
                parts.push(PartDigest {
                    offset: part_offset,
                    size: part_len,
                    sha256: hex::encode(part.finalize_reset()),
                });
                part_offset += part_len;
                part_len = 0;
            }
        }
    }

    // Trailing short part, or the single empty part of an empty file
    if part_size > 0 && (part_len > 0 || parts.is_empty()) {
        parts.push(PartDigest {
            offset: part_offset,
            size: part_len,
            sha256: hex::encode(part.finalize()),
        });
    }

    Ok(FileDigest {
        sha256: hex::encode(whole.finalize()),
        size,
        parts,
    })
}

/// Read `length` bytes starting at `offset` from a file.
pub fn read_file_range(path: &Path, offset: u64, length: u64) -> io::Result<Vec<u8>> {
    let mut file: File = File::open(path)?;
    file.seek(SeekFrom::Start(offset))?;
    let mut buffer: Vec<u8> = vec![0u8; length as usize];
    file.read_exact(&mut buffer)?;
    Ok(buffer)
}

/// Streaming hasher for incremental SHA-256 hashing.
///
/// Tracks the number of bytes seen alongside the digest, which is what the
/// transfer fields of an upload need.
#[derive(Clone, Default)]
pub struct Sha256Hasher {
    inner: Sha256,
    len: u64,
}

impl Sha256Hasher {
    /// Create a new streaming hasher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Update the hasher with additional data.
    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
        self.len += data.len() as u64;
    }

    /// Number of bytes hashed so far.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Whether no bytes have been hashed.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Return the digest so far as a 64-char hex string.
    pub fn finish_hex(&self) -> String {
        hex::encode(self.inner.clone().finalize())
    }
}

/// Reader adapter that hashes everything read through it.
pub struct HashingReader<R> {
    inner: R,
    hasher: Sha256Hasher,
}

impl<R: Read> HashingReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            hasher: Sha256Hasher::new(),
        }
    }

    /// The hasher state for the bytes read so far.
    pub fn hasher(&self) -> &Sha256Hasher {
        &self.hasher
    }
}

impl<R: Read> Read for HashingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n: usize = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }
}

/// Writer adapter that hashes everything written through it.
pub struct HashingWriter<W> {
    inner: W,
    hasher: Sha256Hasher,
}

impl<W: Write> HashingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256Hasher::new(),
        }
    }

    /// The hasher state for the bytes written so far.
    pub fn hasher(&self) -> &Sha256Hasher {
        &self.hasher
    }

    /// Unwrap into the inner writer and the final hasher state.
    pub fn into_parts(self) -> (W, Sha256Hasher) {
        (self.inner, self.hasher)
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n: usize = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
