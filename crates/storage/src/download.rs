//! Download resolution for blob artifacts.
//!
//! An artifact is fetched in two hops: the metadata service answers its
//! artifact address with a redirect, and the redirect target is handed to
//! the transfer engine's verified download. Between the two hops the
//! redirect is checked:
//!
//! - the status must be one of 301, 302, 303, 307, 308
//! - a `Location` header must be present
//! - the location must parse as a URL with the `https` scheme
//!
//! The location string is passed on byte-for-byte; it is parsed only to
//! inspect the scheme, since re-serializing could alter signed query
//! parameters.
//!
//! # Example
//!
//! ```ignore
//! use blob_artifacts::{DownloadResolver, GetRequest};
//!
//! let resolver = DownloadResolver::new(&queue, &engine);
//! resolver.get(&GetRequest::latest(task_id, "public/build.tar", "/tmp/build.tar")).await?;
//! ```

use std::path::Path;

use blob_artifacts_common::REDIRECT_STATUS_CODES;
use log::{debug, warn};
use url::Url;

use crate::error::ArtifactError;
use crate::traits::{MetadataService, TransferEngine};
use crate::types::{ArtifactUrl, GetRequest, RunnerRequest, RunnerResponse};

/// High-level download operations over a metadata service and transfer engine.
pub struct DownloadResolver<'a, Q: MetadataService, E: TransferEngine> {
    /// Metadata service resolving artifact addresses.
    queue: &'a Q,
    /// Engine performing the verified download.
    engine: &'a E,
}

impl<'a, Q: MetadataService, E: TransferEngine> DownloadResolver<'a, Q, E> {
    /// Create a new download resolver.
    ///
    /// # Arguments
    /// * `queue` - Metadata service client
    /// * `engine` - Transfer engine
    pub fn new(queue: &'a Q, engine: &'a E) -> Self {
        Self { queue, engine }
    }

    /// Download an artifact by task, optional run, and name.
    ///
    /// Without a run id the latest run of the task is used.
    pub async fn get(&self, request: &GetRequest) -> Result<(), ArtifactError> {
        validate_get(request)?;

        let target: ArtifactUrl<'_> = match request.run_id.as_deref() {
            None => ArtifactUrl::Latest {
                task_id: &request.task_id,
                name: &request.name,
            },
            Some(run_id) => ArtifactUrl::Run {
                task_id: &request.task_id,
                run_id,
                name: &request.name,
            },
        };
        let url: String =
            self.queue
                .build_url(&target)
                .map_err(|source| ArtifactError::Resolve {
                    url: target.to_string(),
                    source,
                })?;

        let response: RunnerResponse = self
            .engine
            .runner()
            .run(RunnerRequest::get(url.as_str()))
            .await
            .map_err(|source| ArtifactError::Resolve {
                url: url.clone(),
                source,
            })?;

        let location: &str = redirect_location(&response).inspect_err(|e| {
            warn!("Rejected redirect from {}: {}", url, e);
        })?;
        debug!("Resolved {} to {}", target, without_query(location));

        self.fetch(location, &request.filename).await
    }

    /// Download from a URL obtained elsewhere (e.g. an index service).
    ///
    /// No redirect validation happens here; the caller vouches for the URL.
    pub async fn get_url(&self, url: &str, filename: &Path) -> Result<(), ArtifactError> {
        if url.is_empty() {
            return Err(ArtifactError::invalid_input("must provide a url"));
        }
        if filename.as_os_str().is_empty() {
            return Err(ArtifactError::invalid_input(
                "must provide a filename for download",
            ));
        }
        self.fetch(url, filename).await
    }

    async fn fetch(&self, url: &str, filename: &Path) -> Result<(), ArtifactError> {
        self.engine
            .download_url(url, filename)
            .await
            .map_err(|source| ArtifactError::Download {
                url: without_query(url).to_string(),
                source,
            })?;
        debug!("Downloaded {} to {}", without_query(url), filename.display());
        Ok(())
    }
}

fn validate_get(request: &GetRequest) -> Result<(), ArtifactError> {
    if request.task_id.is_empty() {
        return Err(ArtifactError::invalid_input("must provide a taskId"));
    }
    if request.run_id.as_deref() == Some("") {
        return Err(ArtifactError::invalid_input(
            "runId must be omitted or non-empty",
        ));
    }
    if request.name.is_empty() {
        return Err(ArtifactError::invalid_input("must provide a name"));
    }
    if request.filename.as_os_str().is_empty() {
        return Err(ArtifactError::invalid_input(
            "must provide a filename for download",
        ));
    }
    Ok(())
}

/// Validate a metadata-service response as a secure redirect.
///
/// # Returns
/// The untouched `Location` value.
///
/// # Errors
/// - `RedirectProtocol` for a non-redirect status, a missing `Location`,
///   or a `Location` that is not an absolute URL
/// - `InsecureRedirect` when the scheme is not `https`
pub fn redirect_location(response: &RunnerResponse) -> Result<&str, ArtifactError> {
    if !REDIRECT_STATUS_CODES.contains(&response.status) {
        return Err(ArtifactError::RedirectProtocol {
            message: format!(
                "redirect was not a valid status code ({} {})",
                response.status, response.status_message
            ),
        });
    }

    let location: &str =
        response
            .header("location")
            .ok_or_else(|| ArtifactError::RedirectProtocol {
                message: "redirect has missing Location header".to_string(),
            })?;

    let parsed: Url = Url::parse(location).map_err(|e| ArtifactError::RedirectProtocol {
        message: format!(
            "Location {:?} is not a valid URL: {}",
            without_query(location),
            e
        ),
    })?;
    if parsed.scheme() != "https" {
        return Err(ArtifactError::InsecureRedirect {
            url: without_query(location).to_string(),
        });
    }

    Ok(location)
}

/// Signed URLs carry credentials in the query; keep them out of errors and logs.
fn without_query(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn response(status: u16, location: Option<&str>) -> RunnerResponse {
        let mut headers: BTreeMap<String, String> = BTreeMap::new();
        if let Some(loc) = location {
            headers.insert("location".to_string(), loc.to_string());
        }
        RunnerResponse {
            status,
            status_message: String::new(),
            headers,
            body: Vec::new(),
        }
    }

    #[test]
    fn test_accepts_every_redirect_status() {
        for status in [301, 302, 303, 307, 308] {
            let r = response(status, Some("https://bucket.example/key"));
            assert_eq!(redirect_location(&r).unwrap(), "https://bucket.example/key");
        }
    }

    #[test]
    fn test_rejects_non_redirect_status() {
        for status in [200, 204, 300, 304, 400, 404, 500] {
            let r = response(status, Some("https://bucket.example/key"));
            assert!(
                matches!(redirect_location(&r), Err(ArtifactError::RedirectProtocol { .. })),
                "{}",
                status
            );
        }
    }

    #[test]
    fn test_rejects_missing_location() {
        let r = response(303, None);
        assert!(matches!(
            redirect_location(&r),
            Err(ArtifactError::RedirectProtocol { .. })
        ));
    }

    #[test]
    fn test_rejects_relative_location() {
        let r = response(302, Some("/task/abc/artifacts/name"));
        assert!(matches!(
            redirect_location(&r),
            Err(ArtifactError::RedirectProtocol { .. })
        ));
    }

    #[test]
    fn test_rejects_insecure_schemes() {
        for loc in ["http://bucket.example/key", "ftp://bucket.example/key", "file:///etc/passwd"] {
            let r = response(303, Some(loc));
            match redirect_location(&r) {
                Err(ArtifactError::InsecureRedirect { url }) => assert_eq!(url, loc),
                other => panic!("expected InsecureRedirect for {}, got {:?}", loc, other),
            }
        }
    }

    #[test]
    fn test_insecure_redirect_hides_signature() {
        let r = response(302, Some("http://bucket.example/key?X-Amz-Signature=secret"));
        match redirect_location(&r) {
            Err(ArtifactError::InsecureRedirect { url }) => {
                assert_eq!(url, "http://bucket.example/key")
            }
            other => panic!("expected InsecureRedirect, got {:?}", other),
        }
    }

    #[test]
    fn test_location_is_not_reserialized() {
        // Url would normalize the host case, the dot segment and the space
        let raw = "https://Bucket.Example/a/../task%2Frun/name?X-Amz-Signature=a%2Bb&x=1 2";
        let r = response(307, Some(raw));
        assert_eq!(redirect_location(&r).unwrap(), raw);
    }

    #[test]
    fn test_validate_get() {
        let ok = GetRequest::latest("task", "name", "out.dat");
        assert!(validate_get(&ok).is_ok());

        let mut bad = ok.clone();
        bad.run_id = Some(String::new());
        assert!(matches!(validate_get(&bad), Err(ArtifactError::InvalidInput { .. })));

        let mut bad = ok.clone();
        bad.name.clear();
        assert!(matches!(validate_get(&bad), Err(ArtifactError::InvalidInput { .. })));

        let mut bad = ok;
        bad.filename = Default::default();
        assert!(matches!(validate_get(&bad), Err(ArtifactError::InvalidInput { .. })));
    }
}
