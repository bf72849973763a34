//! Shared constants used across blob-artifacts crates.

/// Storage type requested from the metadata service for every upload.
pub const BLOB_STORAGE_TYPE: &str = "blob";

/// The only compression format accepted by `put`.
pub const GZIP_ENCODING: &str = "gzip";

/// Content encoding meaning "bytes are sent as-is".
pub const IDENTITY_ENCODING: &str = "identity";

/// Default part size for multipart uploads (5MB, the storage minimum).
pub const DEFAULT_PART_SIZE: u64 = 5 * 1024 * 1024;

/// Files larger than this are uploaded in parts unless told otherwise (100MB).
pub const DEFAULT_MULTIPART_THRESHOLD: u64 = 100 * 1024 * 1024;

/// Upper bound on the number of parts in one multipart upload.
pub const MAX_PARTS: usize = 10_000;

/// Largest object accepted in a single PUT (5GB).
pub const MAX_SINGLE_PART_SIZE: u64 = 5 * 1024 * 1024 * 1024;

/// HTTP status codes accepted as a redirect to artifact content.
pub const REDIRECT_STATUS_CODES: [u16; 5] = [301, 302, 303, 307, 308];

/// Metadata header carrying the SHA-256 of the original content.
pub const HEADER_CONTENT_SHA256: &str = "x-amz-meta-content-sha256";

/// Metadata header carrying the length of the original content.
pub const HEADER_CONTENT_LENGTH: &str = "x-amz-meta-content-length";

/// Metadata header carrying the SHA-256 of the bytes on the wire.
pub const HEADER_TRANSFER_SHA256: &str = "x-amz-meta-transfer-sha256";

/// Metadata header carrying the length of the bytes on the wire.
pub const HEADER_TRANSFER_LENGTH: &str = "x-amz-meta-transfer-length";
