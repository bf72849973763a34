//! HTTP collaborators for blob-artifacts.
//!
//! This crate provides the `TransferEngine` and `MetadataService`
//! implementations used against a real artifact service: signed storage
//! URLs are driven with reqwest, and the metadata service is reached over
//! its artifact REST endpoints.
//!
//! # Example
//!
//! ```ignore
//! use blob_artifacts::{ArtifactClient, ArtifactIdentity, GetRequest, PutRequest};
//! use blob_artifacts_http::{HttpEngineOptions, HttpQueueClient, HttpQueueOptions, HttpTransferEngine};
//!
//! let queue = HttpQueueClient::new(HttpQueueOptions::new(root_url).with_access_token(token))?;
//! let client = ArtifactClient::<_, HttpTransferEngine>::builder(queue)
//!     .with_engine_options(HttpEngineOptions::default().with_max_concurrency(8))
//!     .build()?;
//!
//! let artifact = ArtifactIdentity::new(task_id, run_id, "public/build.tar.gz");
//! client.put(&PutRequest::new(artifact.clone(), "application/gzip", "build.tar.gz", expires)).await?;
//! client.get(&GetRequest::for_run(artifact, "/tmp/build.tar.gz")).await?;
//! ```

mod engine;
mod error;
mod queue;
mod runner;

pub use engine::{HttpEngineOptions, HttpTransferEngine, DEFAULT_MAX_CONCURRENCY, DEFAULT_TIMEOUT};
pub use error::HttpError;
pub use queue::{HttpQueueClient, HttpQueueOptions};
pub use runner::ReqwestRunner;
