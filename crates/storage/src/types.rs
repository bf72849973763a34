//! Shared data structures for artifact transfers.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use blob_artifacts_common::{read_file_range, GZIP_ENCODING, IDENTITY_ENCODING};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::TempPath;

use crate::error::{ArtifactError, ServiceError};

/// One artifact within one run of one task.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactIdentity {
    pub task_id: String,
    pub run_id: String,
    pub name: String,
}

impl ArtifactIdentity {
    pub fn new(
        task_id: impl Into<String>,
        run_id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            run_id: run_id.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ArtifactIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.task_id, self.run_id, self.name)
    }
}

/// Compression applied to the bytes before transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Gzip,
}

impl Compression {
    /// The `Content-Encoding` value for this compression.
    pub fn as_str(&self) -> &'static str {
        match self {
            Compression::Gzip => GZIP_ENCODING,
        }
    }
}

impl FromStr for Compression {
    type Err = ArtifactError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == GZIP_ENCODING {
            Ok(Compression::Gzip)
        } else {
            Err(ArtifactError::invalid_input(format!(
                "unsupported compression format {:?}, only gzip is supported",
                s
            )))
        }
    }
}

/// Parameters of one `put` call.
#[derive(Debug, Clone)]
pub struct PutRequest {
    /// Where the artifact is recorded.
    pub artifact: ArtifactIdentity,
    /// MIME type stored alongside the artifact.
    pub content_type: String,
    /// Local file to upload.
    pub filename: PathBuf,
    /// Requested compression; `None` sends the bytes as-is.
    pub compression: Option<String>,
    /// Absolute expiry of the artifact.
    pub expires: DateTime<Utc>,
    /// Ask the preparer for a multipart upload.
    pub force_multipart: bool,
    /// Ask the preparer for a single-part upload.
    pub force_singlepart: bool,
}

impl PutRequest {
    /// Create a request with no compression and no part hints.
    pub fn new(
        artifact: ArtifactIdentity,
        content_type: impl Into<String>,
        filename: impl Into<PathBuf>,
        expires: DateTime<Utc>,
    ) -> Self {
        Self {
            artifact,
            content_type: content_type.into(),
            filename: filename.into(),
            compression: None,
            expires,
            force_multipart: false,
            force_singlepart: false,
        }
    }

    /// Request compression before transfer (only `"gzip"` is accepted).
    pub fn with_compression(mut self, compression: impl Into<String>) -> Self {
        self.compression = Some(compression.into());
        self
    }

    /// Hint that the upload should be split into parts.
    pub fn with_force_multipart(mut self, force: bool) -> Self {
        self.force_multipart = force;
        self
    }

    /// Hint that the upload should be sent in one request.
    pub fn with_force_singlepart(mut self, force: bool) -> Self {
        self.force_singlepart = force;
        self
    }
}

/// Parameters of one `get` call. A missing `run_id` means the latest run.
#[derive(Debug, Clone)]
pub struct GetRequest {
    pub task_id: String,
    pub run_id: Option<String>,
    pub name: String,
    /// Destination file.
    pub filename: PathBuf,
}

impl GetRequest {
    /// Fetch the artifact of a specific run.
    pub fn for_run(artifact: ArtifactIdentity, filename: impl Into<PathBuf>) -> Self {
        Self {
            task_id: artifact.task_id,
            run_id: Some(artifact.run_id),
            name: artifact.name,
            filename: filename.into(),
        }
    }

    /// Fetch the artifact of the latest run of a task.
    pub fn latest(
        task_id: impl Into<String>,
        name: impl Into<String>,
        filename: impl Into<PathBuf>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            run_id: None,
            name: name.into(),
            filename: filename.into(),
        }
    }
}

/// Which metadata-service address to build for a download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactUrl<'a> {
    /// Artifact of the most recent run of a task.
    Latest { task_id: &'a str, name: &'a str },
    /// Artifact of a specific run.
    Run {
        task_id: &'a str,
        run_id: &'a str,
        name: &'a str,
    },
}

impl fmt::Display for ArtifactUrl<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactUrl::Latest { task_id, name } => write!(f, "{}/latest/{}", task_id, name),
            ArtifactUrl::Run {
                task_id,
                run_id,
                name,
            } => write!(f, "{}/{}/{}", task_id, run_id, name),
        }
    }
}

/// Input to the upload preparer.
#[derive(Debug, Clone)]
pub struct PrepareOptions {
    pub filename: PathBuf,
    pub compression: Option<Compression>,
    pub force_multipart: bool,
    pub force_singlepart: bool,
}

/// Where the bytes to transfer live.
#[derive(Debug, Clone)]
pub enum DataSource {
    /// The caller's file, sent unmodified.
    File(PathBuf),
    /// A scratch file (e.g. compressed output), removed when the last
    /// reference is dropped.
    Scratch(Arc<TempPath>),
    /// In-memory bytes.
    Memory(Arc<Vec<u8>>),
}

impl DataSource {
    /// Read a byte range of the source.
    pub async fn read_range(&self, offset: u64, length: u64) -> Result<Vec<u8>, ServiceError> {
        match self {
            DataSource::Memory(bytes) => {
                let start: usize = offset as usize;
                let end: usize = start.saturating_add(length as usize);
                bytes
                    .get(start..end)
                    .map(|slice| slice.to_vec())
                    .ok_or_else(|| ServiceError::InvalidRequest {
                        message: format!(
                            "range {}..{} outside of {} in-memory bytes",
                            start,
                            end,
                            bytes.len()
                        ),
                    })
            }
            DataSource::File(_) | DataSource::Scratch(_) => {
                let path: PathBuf = self.path().map(Path::to_path_buf).unwrap_or_default();
                tokio::task::spawn_blocking(move || {
                    read_file_range(&path, offset, length)
                        .map_err(|e| ServiceError::io(path.display().to_string(), e))
                })
                .await
                .map_err(|e| ServiceError::Other {
                    message: format!("read task failed: {}", e),
                })?
            }
        }
    }

    /// Filesystem path of the source, if it has one.
    pub fn path(&self) -> Option<&Path> {
        match self {
            DataSource::File(path) => Some(path.as_path()),
            DataSource::Scratch(path) => Some(&***path),
            DataSource::Memory(_) => None,
        }
    }
}

/// Hash and size of one part of a multipart upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartDescriptor {
    pub sha256: String,
    pub size: u64,
}

/// Descriptor of content ready to be transferred.
///
/// `sha256`/`size` always describe the original content. The transfer
/// fields are only meaningful when `content_encoding` is set to something
/// other than identity.
#[derive(Debug, Clone)]
pub struct PreparedUpload {
    pub sha256: String,
    pub size: u64,
    pub transfer_sha256: Option<String>,
    pub transfer_size: Option<u64>,
    pub content_encoding: Option<String>,
    /// Ordered part layout of the transfer bytes; `None` for single part.
    pub parts: Option<Vec<PartDescriptor>>,
    /// The bytes to send.
    pub source: DataSource,
}

impl PreparedUpload {
    /// Whether the bytes on the wire differ from the original content.
    pub fn is_encoded(&self) -> bool {
        matches!(self.content_encoding.as_deref(), Some(enc) if enc != IDENTITY_ENCODING)
    }

    /// Number of bytes actually sent.
    pub fn transfer_len(&self) -> u64 {
        if self.is_encoded() {
            self.transfer_size.unwrap_or(self.size)
        } else {
            self.size
        }
    }

    /// Number of signed requests the upload needs.
    pub fn request_count(&self) -> usize {
        self.parts.as_ref().map_or(1, Vec::len)
    }

    /// `(offset, length)` of each request body, in plan order.
    pub fn part_ranges(&self) -> Vec<(u64, u64)> {
        match self.parts {
            Some(ref parts) => {
                let mut offset: u64 = 0;
                parts
                    .iter()
                    .map(|p| {
                        let range: (u64, u64) = (offset, p.size);
                        offset += p.size;
                        range
                    })
                    .collect()
            }
            None => vec![(0, self.transfer_len())],
        }
    }
}

/// Payload of the metadata service's create-artifact call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateArtifactRequest {
    pub storage_type: String,
    pub expires: DateTime<Utc>,
    pub content_type: String,
    pub content_sha256: String,
    pub content_length: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer_sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer_length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_encoding: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parts: Option<Vec<PartDescriptor>>,
}

/// A pre-signed storage request handed out by the metadata service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedRequest {
    pub url: String,
    pub method: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

/// Response of the create-artifact call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateArtifactResponse {
    #[serde(default)]
    pub storage_type: Option<String>,
    #[serde(default)]
    pub expires: Option<String>,
    /// The transfer plan: one request per part, in part order.
    #[serde(default)]
    pub requests: Option<Vec<SignedRequest>>,
}

/// What the transfer engine reports after every part was stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadOutcome {
    /// One etag per signed request, in plan order.
    pub etags: Vec<String>,
}

/// Payload of the metadata service's complete-artifact call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionRecord {
    pub etags: Vec<String>,
}

/// Low-level request issued through a [`RequestRunner`](crate::RequestRunner).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerRequest {
    pub url: String,
    pub method: String,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl RunnerRequest {
    /// A bodiless GET with no extra headers.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: "GET".to_string(),
            headers: BTreeMap::new(),
            body: Vec::new(),
        }
    }
}

/// Raw response of a [`RequestRunner`](crate::RequestRunner).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunnerResponse {
    pub status: u16,
    pub status_message: String,
    /// Header names are lower-case.
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl RunnerResponse {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}
