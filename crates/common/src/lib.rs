//! Shared types and utilities for blob-artifacts.
//!
//! This crate provides functionality used by both the transfer core and the
//! HTTP collaborators:
//! - Part-size and redirect constants
//! - SHA-256 hash computation over whole files and part ranges

pub mod constants;
pub mod hash;

// Re-export commonly used items at crate root
pub use constants::*;
pub use hash::{
    hash_bytes, hash_file, hash_file_parts, read_file_range, FileDigest, HashingReader,
    HashingWriter, PartDigest, Sha256Hasher,
};
