//! Metadata-service client over the queue's artifact REST endpoints.
//!
//! | Operation | Request |
//! |-----------|---------|
//! | create    | `POST {root}/task/{taskId}/runs/{runId}/artifacts/{name}` |
//! | complete  | `PUT {root}/task/{taskId}/runs/{runId}/artifacts/{name}` |
//! | resolve   | `GET {root}/task/{taskId}/runs/{runId}/artifacts/{name}` |
//! | latest    | `GET {root}/task/{taskId}/artifacts/{name}` |
//!
//! Artifact names keep their `/` separators as path segments; every
//! segment is percent-encoded.

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::{Client, RequestBuilder, Response};
use url::Url;

use blob_artifacts::{
    ArtifactIdentity, ArtifactUrl, CompletionRecord, CreateArtifactRequest,
    CreateArtifactResponse, MetadataService, ServiceError,
};

use crate::error::HttpError;

/// Options for [`HttpQueueClient`].
#[derive(Debug, Clone)]
pub struct HttpQueueOptions {
    /// Base URL of the metadata service, e.g. `https://queue.example/api/queue/v1`.
    pub root_url: String,
    /// Per-request timeout; `None` disables it.
    pub timeout: Option<Duration>,
    /// Bearer token for create and complete calls.
    pub access_token: Option<String>,
}

impl HttpQueueOptions {
    pub fn new(root_url: impl Into<String>) -> Self {
        Self {
            root_url: root_url.into(),
            timeout: Some(Duration::from_secs(60)),
            access_token: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }
}

/// MetadataService implementation over HTTP.
pub struct HttpQueueClient {
    client: Client,
    root: Url,
    access_token: Option<String>,
}

impl HttpQueueClient {
    /// Create a client.
    ///
    /// # Errors
    /// `ConfigError` when `root_url` is not an absolute URL with a path.
    pub fn new(options: HttpQueueOptions) -> Result<Self, HttpError> {
        let root: Url = Url::parse(&options.root_url).map_err(|e| {
            HttpError::ConfigError(format!("invalid root url {:?}: {}", options.root_url, e))
        })?;
        if root.cannot_be_a_base() {
            return Err(HttpError::ConfigError(format!(
                "root url {:?} cannot carry a path",
                options.root_url
            )));
        }

        let mut builder = Client::builder();
        if let Some(timeout) = options.timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder
                .build()
                .map_err(|e| HttpError::ConfigError(e.to_string()))?,
            root,
            access_token: options.access_token,
        })
    }

    /// Address of an artifact on the metadata service.
    pub fn artifact_url(&self, target: &ArtifactUrl<'_>) -> Result<Url, HttpError> {
        let mut url: Url = self.root.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                HttpError::ConfigError(format!("root url {} cannot carry a path", self.root))
            })?;
            segments.pop_if_empty();
            match target {
                ArtifactUrl::Latest { task_id, name } => {
                    segments.push("task").push(task_id).push("artifacts");
                    segments.extend(name.split('/'));
                }
                ArtifactUrl::Run {
                    task_id,
                    run_id,
                    name,
                } => {
                    segments
                        .push("task")
                        .push(task_id)
                        .push("runs")
                        .push(run_id)
                        .push("artifacts");
                    segments.extend(name.split('/'));
                }
            }
        }
        Ok(url)
    }

    fn run_url(&self, artifact: &ArtifactIdentity) -> Result<Url, HttpError> {
        self.artifact_url(&ArtifactUrl::Run {
            task_id: &artifact.task_id,
            run_id: &artifact.run_id,
            name: &artifact.name,
        })
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.access_token {
            Some(ref token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

/// Turn a non-2xx response into a `Status` error carrying the body.
async fn check_status(url: &Url, response: Response) -> Result<Response, HttpError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body: String = response.text().await.unwrap_or_default();
    Err(HttpError::Status {
        status: status.as_u16(),
        url: url.to_string(),
        body,
    })
}

#[async_trait]
impl MetadataService for HttpQueueClient {
    async fn create_artifact(
        &self,
        artifact: &ArtifactIdentity,
        request: &CreateArtifactRequest,
    ) -> Result<CreateArtifactResponse, ServiceError> {
        let url: Url = self.run_url(artifact)?;
        let response: Response = self
            .authorize(self.client.post(url.clone()).json(request))
            .send()
            .await
            .map_err(HttpError::from)?;
        let body = check_status(&url, response)
            .await?
            .bytes()
            .await
            .map_err(HttpError::from)?;

        let parsed: CreateArtifactResponse =
            serde_json::from_slice(&body).map_err(|e| HttpError::InvalidResponse {
                url: url.to_string(),
                message: format!("create-artifact response is not valid JSON: {}", e),
            })?;
        debug!(
            "Created {} with {} signed request(s)",
            artifact,
            parsed.requests.as_ref().map_or(0, Vec::len)
        );
        Ok(parsed)
    }

    async fn complete_artifact(
        &self,
        artifact: &ArtifactIdentity,
        record: &CompletionRecord,
    ) -> Result<(), ServiceError> {
        let url: Url = self.run_url(artifact)?;
        let response: Response = self
            .authorize(self.client.put(url.clone()).json(record))
            .send()
            .await
            .map_err(HttpError::from)?;
        check_status(&url, response).await?;
        debug!("Completed {} with {} etag(s)", artifact, record.etags.len());
        Ok(())
    }

    fn build_url(&self, target: &ArtifactUrl<'_>) -> Result<String, ServiceError> {
        Ok(self.artifact_url(target)?.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(root: &str) -> HttpQueueClient {
        HttpQueueClient::new(HttpQueueOptions::new(root)).unwrap()
    }

    #[test]
    fn test_run_url() {
        let url = client("https://queue.example/api/queue/v1")
            .build_url(&ArtifactUrl::Run {
                task_id: "abc",
                run_id: "0",
                name: "public/logs/live.log",
            })
            .unwrap();
        assert_eq!(
            url,
            "https://queue.example/api/queue/v1/task/abc/runs/0/artifacts/public/logs/live.log"
        );
    }

    #[test]
    fn test_latest_url_with_trailing_slash_root() {
        let url = client("https://queue.example/v1/")
            .build_url(&ArtifactUrl::Latest {
                task_id: "abc",
                name: "build.tar",
            })
            .unwrap();
        assert_eq!(url, "https://queue.example/v1/task/abc/artifacts/build.tar");
    }

    #[test]
    fn test_segments_are_encoded() {
        let url = client("https://queue.example")
            .build_url(&ArtifactUrl::Run {
                task_id: "a b",
                run_id: "0",
                name: "dir/file?.txt",
            })
            .unwrap();
        assert_eq!(
            url,
            "https://queue.example/task/a%20b/runs/0/artifacts/dir/file%3F.txt"
        );
    }

    #[test]
    fn test_invalid_root() {
        assert!(matches!(
            HttpQueueClient::new(HttpQueueOptions::new("not a url")),
            Err(HttpError::ConfigError(_))
        ));
        assert!(matches!(
            HttpQueueClient::new(HttpQueueOptions::new("mailto:queue@example.com")),
            Err(HttpError::ConfigError(_))
        ));
    }
}
