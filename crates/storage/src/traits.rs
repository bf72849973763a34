//! Collaborator interfaces: metadata service, transfer engine, request runner.

use std::path::Path;

use async_trait::async_trait;

use crate::error::ServiceError;
use crate::types::{
    ArtifactIdentity, ArtifactUrl, CompletionRecord, CreateArtifactRequest,
    CreateArtifactResponse, PrepareOptions, PreparedUpload, RunnerRequest, RunnerResponse,
    SignedRequest, UploadOutcome,
};

/// The system of record for artifacts.
#[async_trait]
pub trait MetadataService: Send + Sync {
    /// Register an artifact and obtain its transfer plan.
    async fn create_artifact(
        &self,
        artifact: &ArtifactIdentity,
        request: &CreateArtifactRequest,
    ) -> Result<CreateArtifactResponse, ServiceError>;

    /// Seal an artifact with the per-part etags of its upload.
    async fn complete_artifact(
        &self,
        artifact: &ArtifactIdentity,
        record: &CompletionRecord,
    ) -> Result<(), ServiceError>;

    /// Build the address that redirects to an artifact's content.
    fn build_url(&self, target: &ArtifactUrl<'_>) -> Result<String, ServiceError>;
}

/// Issues one raw HTTP request without following redirects.
#[async_trait]
pub trait RequestRunner: Send + Sync {
    async fn run(&self, request: RunnerRequest) -> Result<RunnerResponse, ServiceError>;
}

/// Hashes, compresses, sends and verifies bytes against signed storage.
#[async_trait]
pub trait TransferEngine: Send + Sync {
    /// Hash (and optionally compress) a file and decide its part layout.
    async fn prepare_upload(&self, options: &PrepareOptions)
        -> Result<PreparedUpload, ServiceError>;

    /// Execute a transfer plan. Etags come back in plan order.
    async fn run_upload(
        &self,
        requests: &[SignedRequest],
        upload: &PreparedUpload,
    ) -> Result<UploadOutcome, ServiceError>;

    /// Fetch `url` into `output`, verifying integrity on the way.
    async fn download_url(&self, url: &str, output: &Path) -> Result<(), ServiceError>;

    /// Runner used for redirect resolution.
    fn runner(&self) -> &dyn RequestRunner;
}

/// A transfer engine that can be built from an options value.
pub trait ConfigurableEngine: TransferEngine + Sized {
    type Options: Default + Send;

    fn from_options(options: Self::Options) -> Result<Self, ServiceError>;
}
