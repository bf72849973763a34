//! HTTP transfer engine.
//!
//! Uploads send byte ranges of a prepared file to pre-signed URLs; downloads
//! stream a signed URL to a scratch file next to the destination and only
//! move it into place once every advertised digest matched.

use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use futures::stream::{self, StreamExt, TryStreamExt};
use log::debug;
use reqwest::header::{HeaderMap, CONTENT_ENCODING, ETAG};
use reqwest::{Client, Method};
use tempfile::{NamedTempFile, TempPath};
use tokio::io::AsyncWriteExt;

use blob_artifacts::{
    choose_layout, Compression, ConfigurableEngine, DataSource, PartDescriptor, PartPolicy,
    PrepareOptions, PreparedUpload, RequestRunner, ServiceError, SignedRequest, TransferEngine,
    UploadLayout, UploadOutcome,
};
use blob_artifacts_common::{
    hash_file_parts, FileDigest, HashingReader, HashingWriter, Sha256Hasher, GZIP_ENCODING,
    HEADER_CONTENT_LENGTH, HEADER_CONTENT_SHA256, HEADER_TRANSFER_LENGTH, HEADER_TRANSFER_SHA256,
};

use crate::error::HttpError;
use crate::runner::{parse_method, ReqwestRunner};

/// Default number of part uploads in flight at once.
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// Default timeout for one HTTP request (5 minutes).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Options for [`HttpTransferEngine`].
#[derive(Debug, Clone)]
pub struct HttpEngineOptions {
    /// Part sizing used when preparing uploads.
    pub part_policy: PartPolicy,
    /// Maximum concurrent part uploads.
    pub max_concurrency: usize,
    /// Per-request timeout; `None` disables it.
    pub timeout: Option<Duration>,
    /// `User-Agent` sent with every request.
    pub user_agent: String,
}

impl Default for HttpEngineOptions {
    fn default() -> Self {
        Self {
            part_policy: PartPolicy::default(),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            timeout: Some(DEFAULT_TIMEOUT),
            user_agent: concat!("blob-artifacts/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl HttpEngineOptions {
    /// Set the part policy.
    pub fn with_part_policy(mut self, policy: PartPolicy) -> Self {
        self.part_policy = policy;
        self
    }

    /// Set the maximum number of concurrent part uploads.
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max;
        self
    }

    /// Set or clear the per-request timeout.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the user agent.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

/// TransferEngine implementation over reqwest.
pub struct HttpTransferEngine {
    /// Client for signed storage requests.
    client: Client,
    /// Redirect-free runner for metadata-service resolution.
    runner: ReqwestRunner,
    options: HttpEngineOptions,
}

impl HttpTransferEngine {
    /// Create an engine.
    ///
    /// # Errors
    /// `ConfigError` for a zero concurrency limit or when the HTTP client
    /// cannot be built.
    pub fn new(options: HttpEngineOptions) -> Result<Self, HttpError> {
        if options.max_concurrency == 0 {
            return Err(HttpError::ConfigError(
                "max_concurrency must be at least 1".to_string(),
            ));
        }

        let mut builder = Client::builder().user_agent(options.user_agent.as_str());
        if let Some(timeout) = options.timeout {
            builder = builder.timeout(timeout);
        }
        let client: Client = builder
            .build()
            .map_err(|e| HttpError::ConfigError(e.to_string()))?;
        let runner = ReqwestRunner::new(options.timeout, &options.user_agent)?;

        Ok(Self {
            client,
            runner,
            options,
        })
    }

    /// The options this engine was built with.
    pub fn options(&self) -> &HttpEngineOptions {
        &self.options
    }

    /// Send one part and return its etag.
    async fn upload_part(
        &self,
        index: usize,
        request: &SignedRequest,
        source: &DataSource,
        offset: u64,
        length: u64,
    ) -> Result<String, ServiceError> {
        let body: Vec<u8> = source.read_range(offset, length).await?;
        let method: Method = parse_method(&request.method)?;

        let mut builder = self.client.request(method, request.url.as_str()).body(body);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await.map_err(HttpError::from)?;
        let status = response.status();
        if !status.is_success() {
            let body: String = response.text().await.unwrap_or_default();
            return Err(HttpError::Status {
                status: status.as_u16(),
                url: without_query(&request.url).to_string(),
                body,
            }
            .into());
        }

        let etag: String = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| HttpError::InvalidResponse {
                url: without_query(&request.url).to_string(),
                message: format!("part {} response has no ETag", index + 1),
            })?;

        debug!("Stored part {} ({} bytes)", index + 1, length);
        Ok(etag)
    }
}

#[async_trait]
impl TransferEngine for HttpTransferEngine {
    async fn prepare_upload(
        &self,
        options: &PrepareOptions,
    ) -> Result<PreparedUpload, ServiceError> {
        let options: PrepareOptions = options.clone();
        let policy: PartPolicy = self.options.part_policy.clone();

        tokio::task::spawn_blocking(move || prepare_blocking(&options, &policy))
            .await
            .map_err(|e| ServiceError::Other {
                message: format!("preparation task failed: {}", e),
            })?
    }

    async fn run_upload(
        &self,
        requests: &[SignedRequest],
        upload: &PreparedUpload,
    ) -> Result<UploadOutcome, ServiceError> {
        let ranges: Vec<(u64, u64)> = upload.part_ranges();
        if requests.len() != ranges.len() {
            return Err(ServiceError::InvalidRequest {
                message: format!(
                    "{} signed requests for {} parts",
                    requests.len(),
                    ranges.len()
                ),
            });
        }

        let uploads: Vec<_> = requests
            .iter()
            .zip(ranges)
            .enumerate()
            .map(|(index, (request, (offset, length)))| {
                self.upload_part(index, request, &upload.source, offset, length)
            })
            .collect();

        // buffered() yields in submission order, so etags line up with parts
        let etags: Vec<String> = stream::iter(uploads)
            .buffered(self.options.max_concurrency)
            .try_collect()
            .await?;

        Ok(UploadOutcome { etags })
    }

    async fn download_url(&self, url: &str, output: &Path) -> Result<(), ServiceError> {
        let response = self.client.get(url).send().await.map_err(HttpError::from)?;
        let status = response.status();
        if !status.is_success() {
            let body: String = response.text().await.unwrap_or_default();
            return Err(HttpError::Status {
                status: status.as_u16(),
                url: without_query(url).to_string(),
                body,
            }
            .into());
        }

        let headers: &HeaderMap = response.headers();
        let content = ExpectedDigest::from_headers(
            headers,
            HEADER_CONTENT_SHA256,
            HEADER_CONTENT_LENGTH,
        )?;
        let transfer = ExpectedDigest::from_headers(
            headers,
            HEADER_TRANSFER_SHA256,
            HEADER_TRANSFER_LENGTH,
        )?;
        let gzipped: bool = headers
            .get(CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.eq_ignore_ascii_case(GZIP_ENCODING));
        content.require("content")?;
        if gzipped {
            transfer.require("transfer")?;
        }

        let dir: PathBuf = match output.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| ServiceError::io(dir.display().to_string(), e))?;

        let raw: TempPath = NamedTempFile::new_in(&dir)
            .map_err(|e| ServiceError::io(dir.display().to_string(), e))?
            .into_temp_path();
        let mut file = tokio::fs::File::create(&raw).await?;
        let mut hasher = Sha256Hasher::new();
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk: Bytes = chunk.map_err(HttpError::from)?;
            hasher.update(&chunk);
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        drop(file);

        let verified: TempPath = if gzipped {
            transfer.verify("transfer", &hasher)?;
            let (decoded_hasher, decoded): (Sha256Hasher, TempPath) =
                tokio::task::spawn_blocking(move || gunzip_to_scratch(&raw, &dir))
                    .await
                    .map_err(|e| ServiceError::Other {
                        message: format!("decode task failed: {}", e),
                    })??;
            content.verify("content", &decoded_hasher)?;
            decoded
        } else {
            // Identity transfer: the wire bytes are the content
            transfer.verify("transfer", &hasher)?;
            content.verify("content", &hasher)?;
            raw
        };

        verified
            .persist(output)
            .map_err(|e| ServiceError::io(output.display().to_string(), e.error))?;
        debug!("Verified {} into {}", without_query(url), output.display());
        Ok(())
    }

    fn runner(&self) -> &dyn RequestRunner {
        &self.runner
    }
}

impl ConfigurableEngine for HttpTransferEngine {
    type Options = HttpEngineOptions;

    fn from_options(options: Self::Options) -> Result<Self, ServiceError> {
        Ok(Self::new(options)?)
    }
}

/// Hash, optionally compress, and lay out a file. Runs on a blocking thread.
fn prepare_blocking(
    options: &PrepareOptions,
    policy: &PartPolicy,
) -> Result<PreparedUpload, ServiceError> {
    let path: &Path = &options.filename;
    let io_err = |e: io::Error| ServiceError::io(path.display().to_string(), e);

    match options.compression {
        None => {
            let size: u64 = std::fs::metadata(path).map_err(io_err)?.len();
            let layout: UploadLayout =
                choose_layout(size, policy, options.force_singlepart, options.force_multipart)?;
            let digest: FileDigest =
                hash_file_parts(path, layout_part_size(layout)).map_err(io_err)?;

            Ok(PreparedUpload {
                sha256: digest.sha256.clone(),
                size: digest.size,
                transfer_sha256: None,
                transfer_size: None,
                content_encoding: None,
                parts: part_descriptors(layout, &digest),
                source: DataSource::File(path.to_path_buf()),
            })
        }
        Some(Compression::Gzip) => {
            let (content, scratch): (Sha256Hasher, TempPath) =
                gzip_to_scratch(path).map_err(io_err)?;
            let size: u64 = std::fs::metadata(&scratch)
                .map_err(|e| ServiceError::io(scratch.display().to_string(), e))?
                .len();
            let layout: UploadLayout =
                choose_layout(size, policy, options.force_singlepart, options.force_multipart)?;
            let digest: FileDigest = hash_file_parts(&scratch, layout_part_size(layout))
                .map_err(|e| ServiceError::io(scratch.display().to_string(), e))?;

            Ok(PreparedUpload {
                sha256: content.finish_hex(),
                size: content.len(),
                transfer_sha256: Some(digest.sha256.clone()),
                transfer_size: Some(digest.size),
                content_encoding: Some(GZIP_ENCODING.to_string()),
                parts: part_descriptors(layout, &digest),
                source: DataSource::Scratch(Arc::new(scratch)),
            })
        }
    }
}

/// Gzip a file into a scratch file, hashing the original bytes on the way.
fn gzip_to_scratch(path: &Path) -> io::Result<(Sha256Hasher, TempPath)> {
    let mut reader = HashingReader::new(BufReader::new(File::open(path)?));
    let scratch: NamedTempFile = NamedTempFile::new()?;
    let mut encoder = GzEncoder::new(BufWriter::new(scratch), flate2::Compression::default());
    io::copy(&mut reader, &mut encoder)?;

    let scratch: NamedTempFile = encoder
        .finish()?
        .into_inner()
        .map_err(|e| e.into_error())?;
    Ok((reader.hasher().clone(), scratch.into_temp_path()))
}

/// Decode a gzip file into a scratch file in `dir`, hashing the output.
fn gunzip_to_scratch(source: &Path, dir: &Path) -> Result<(Sha256Hasher, TempPath), ServiceError> {
    let mut decoder = GzDecoder::new(BufReader::new(File::open(source)?));
    let scratch: NamedTempFile =
        NamedTempFile::new_in(dir).map_err(|e| ServiceError::io(dir.display().to_string(), e))?;
    let mut writer = HashingWriter::new(BufWriter::new(scratch));
    io::copy(&mut decoder, &mut writer).map_err(|e| ServiceError::InvalidResponse {
        message: format!("gzip body could not be decoded: {}", e),
    })?;

    let (buffered, hasher): (BufWriter<NamedTempFile>, Sha256Hasher) = writer.into_parts();
    let scratch: NamedTempFile = buffered.into_inner().map_err(|e| e.into_error())?;
    Ok((hasher, scratch.into_temp_path()))
}

fn layout_part_size(layout: UploadLayout) -> u64 {
    match layout {
        UploadLayout::SinglePart => 0,
        UploadLayout::Multipart { part_size } => part_size,
    }
}

fn part_descriptors(layout: UploadLayout, digest: &FileDigest) -> Option<Vec<PartDescriptor>> {
    match layout {
        UploadLayout::SinglePart => None,
        UploadLayout::Multipart { .. } => Some(
            digest
                .parts
                .iter()
                .map(|part| PartDescriptor {
                    sha256: part.sha256.clone(),
                    size: part.size,
                })
                .collect(),
        ),
    }
}

/// Signed URLs carry credentials in the query; keep them out of errors and logs.
fn without_query(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}

/// Digest advertised by storage metadata headers.
#[derive(Debug, Default, PartialEq, Eq)]
struct ExpectedDigest {
    sha256: Option<String>,
    length: Option<u64>,
}

impl ExpectedDigest {
    fn from_headers(
        headers: &HeaderMap,
        sha256_header: &str,
        length_header: &str,
    ) -> Result<Self, ServiceError> {
        let value = |name: &str| -> Option<String> {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.trim().to_string())
        };

        let length: Option<u64> = match value(length_header) {
            Some(raw) => Some(raw.parse().map_err(|_| ServiceError::InvalidResponse {
                message: format!("{} is not a length: {:?}", length_header, raw),
            })?),
            None => None,
        };

        Ok(Self {
            sha256: value(sha256_header).map(|v| v.to_ascii_lowercase()),
            length,
        })
    }

    /// Refuse a response that does not advertise both digest values.
    fn require(&self, what: &str) -> Result<(), ServiceError> {
        let missing: Vec<&str> = [
            ("sha256", self.sha256.is_none()),
            ("length", self.length.is_none()),
        ]
        .into_iter()
        .filter_map(|(name, absent)| absent.then_some(name))
        .collect();
        if missing.is_empty() {
            return Ok(());
        }
        Err(ServiceError::InvalidResponse {
            message: format!(
                "storage response does not advertise the {} {}",
                what,
                missing.join(" and ")
            ),
        })
    }

    /// Compare against what was actually hashed. Absent values are not checked;
    /// callers `require` the ones that must be present.
    fn verify(&self, what: &str, actual: &Sha256Hasher) -> Result<(), ServiceError> {
        if let Some(expected) = self.length {
            if expected != actual.len() {
                return Err(ServiceError::IntegrityMismatch {
                    what: format!("{} length", what),
                    expected: expected.to_string(),
                    actual: actual.len().to_string(),
                });
            }
        }
        if let Some(ref expected) = self.sha256 {
            let digest: String = actual.finish_hex();
            if *expected != digest {
                return Err(ServiceError::IntegrityMismatch {
                    what: format!("{} sha256", what),
                    expected: expected.clone(),
                    actual: digest,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blob_artifacts_common::hash_bytes;
    use reqwest::header::HeaderValue;
    use std::io::Read;

    fn options(path: &Path) -> PrepareOptions {
        PrepareOptions {
            filename: path.to_path_buf(),
            compression: None,
            force_multipart: false,
            force_singlepart: false,
        }
    }

    fn engine(policy: PartPolicy) -> HttpTransferEngine {
        HttpTransferEngine::new(HttpEngineOptions::default().with_part_policy(policy)).unwrap()
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let result = HttpTransferEngine::new(HttpEngineOptions::default().with_max_concurrency(0));
        assert!(matches!(result, Err(HttpError::ConfigError(_))));
    }

    #[tokio::test]
    async fn test_prepare_identity_single_part() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.txt");
        std::fs::write(&path, b"hello artifacts").unwrap();

        let upload = engine(PartPolicy::default())
            .prepare_upload(&options(&path))
            .await
            .unwrap();

        assert_eq!(upload.sha256, hash_bytes(b"hello artifacts"));
        assert_eq!(upload.size, 15);
        assert!(upload.parts.is_none());
        assert!(!upload.is_encoded());
        assert_eq!(upload.source.path(), Some(path.as_path()));
    }

    #[tokio::test]
    async fn test_prepare_multipart_parts_cover_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.bin");
        let data: Vec<u8> = (0..2500u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &data).unwrap();

        let mut opts = options(&path);
        opts.force_multipart = true;
        let upload = engine(PartPolicy::default().with_part_size(1000))
            .prepare_upload(&opts)
            .await
            .unwrap();

        let parts: Vec<PartDescriptor> = upload.parts.clone().unwrap();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].sha256, hash_bytes(&data[..1000]));
        assert_eq!(parts[2].size, 500);
        assert_eq!(upload.part_ranges(), vec![(0, 1000), (1000, 1000), (2000, 500)]);
    }

    #[tokio::test]
    async fn test_prepare_gzip_describes_both_streams() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.txt");
        let data: Vec<u8> = b"line of build output\n".repeat(2000);
        std::fs::write(&path, &data).unwrap();

        let mut opts = options(&path);
        opts.compression = Some(Compression::Gzip);
        let upload = engine(PartPolicy::default())
            .prepare_upload(&opts)
            .await
            .unwrap();

        assert_eq!(upload.sha256, hash_bytes(&data));
        assert_eq!(upload.size, data.len() as u64);
        assert_eq!(upload.content_encoding.as_deref(), Some("gzip"));
        assert!(upload.transfer_size.unwrap() < upload.size);

        let scratch: &Path = upload.source.path().unwrap();
        let compressed: Vec<u8> = std::fs::read(scratch).unwrap();
        assert_eq!(upload.transfer_sha256.as_deref(), Some(hash_bytes(&compressed).as_str()));

        let mut decoded: Vec<u8> = Vec::new();
        GzDecoder::new(&compressed[..]).read_to_end(&mut decoded).unwrap();
        assert_eq!(decoded, data);
    }

    #[tokio::test]
    async fn test_prepare_conflicting_hints() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.txt");
        std::fs::write(&path, b"x").unwrap();

        let mut opts = options(&path);
        opts.force_multipart = true;
        opts.force_singlepart = true;
        let result = engine(PartPolicy::default()).prepare_upload(&opts).await;
        assert!(matches!(result, Err(ServiceError::InvalidRequest { .. })));
    }

    #[tokio::test]
    async fn test_prepare_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = engine(PartPolicy::default())
            .prepare_upload(&options(&dir.path().join("missing")))
            .await;
        assert!(matches!(result, Err(ServiceError::Io { .. })));
    }

    #[test]
    fn test_expected_digest_verify() {
        let mut headers = HeaderMap::new();
        headers.insert(
            HEADER_CONTENT_SHA256,
            HeaderValue::from_str(&hash_bytes(b"abc").to_uppercase()).unwrap(),
        );
        headers.insert(HEADER_CONTENT_LENGTH, HeaderValue::from_static("3"));
        let expected =
            ExpectedDigest::from_headers(&headers, HEADER_CONTENT_SHA256, HEADER_CONTENT_LENGTH)
                .unwrap();

        assert!(expected.require("content").is_ok());

        let mut good = Sha256Hasher::new();
        good.update(b"abc");
        assert!(expected.verify("content", &good).is_ok());

        let mut bad = Sha256Hasher::new();
        bad.update(b"abd");
        assert!(matches!(
            expected.verify("content", &bad),
            Err(ServiceError::IntegrityMismatch { .. })
        ));

        let mut short = Sha256Hasher::new();
        short.update(b"ab");
        match expected.verify("content", &short) {
            Err(ServiceError::IntegrityMismatch { what, .. }) => assert_eq!(what, "content length"),
            other => panic!("expected length mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_expected_digest_missing_and_malformed() {
        let headers = HeaderMap::new();
        let expected =
            ExpectedDigest::from_headers(&headers, HEADER_TRANSFER_SHA256, HEADER_TRANSFER_LENGTH)
                .unwrap();
        assert_eq!(expected, ExpectedDigest::default());
        match expected.require("transfer") {
            Err(ServiceError::InvalidResponse { message }) => {
                assert!(message.contains("transfer sha256 and length"), "{}", message)
            }
            other => panic!("expected missing digest to be refused, got {:?}", other),
        }

        let mut headers = HeaderMap::new();
        headers.insert(HEADER_CONTENT_SHA256, HeaderValue::from_static("abc"));
        let partial =
            ExpectedDigest::from_headers(&headers, HEADER_CONTENT_SHA256, HEADER_CONTENT_LENGTH)
                .unwrap();
        assert!(matches!(
            partial.require("content"),
            Err(ServiceError::InvalidResponse { .. })
        ));

        let mut headers = HeaderMap::new();
        headers.insert(HEADER_TRANSFER_LENGTH, HeaderValue::from_static("ten"));
        assert!(matches!(
            ExpectedDigest::from_headers(&headers, HEADER_TRANSFER_SHA256, HEADER_TRANSFER_LENGTH),
            Err(ServiceError::InvalidResponse { .. })
        ));
    }

    #[test]
    fn test_without_query() {
        assert_eq!(
            without_query("https://bucket.example/k?X-Amz-Signature=abc"),
            "https://bucket.example/k"
        );
        assert_eq!(without_query("https://bucket.example/k"), "https://bucket.example/k");
    }
}
