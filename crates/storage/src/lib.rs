//! Artifact transfer client for blob-storage-backed task artifacts.
//!
//! This crate moves a local file to and from a blob-storage artifact service.
//! It is engine-agnostic: the metadata service and the transfer engine are
//! traits, implemented over HTTP by `blob-artifacts-http` and by in-memory
//! doubles in tests.
//!
//! # Upload
//!
//! `put` validates its input, has the engine prepare the file (hashes,
//! optional gzip, part layout), asks the metadata service for a signed
//! transfer plan shaped by that preparation, runs the plan and seals the
//! artifact with the ordered etags.
//!
//! # Download
//!
//! `get` resolves the artifact address through the metadata service,
//! accepts only an https redirect, and hands the untouched location to the
//! engine's verified download. `get_url` skips resolution.

mod client;
mod download;
mod error;
pub mod parts;
mod traits;
mod types;
mod upload;

pub use client::{ArtifactClient, ArtifactClientBuilder, EngineConfig};
pub use download::{redirect_location, DownloadResolver};
pub use error::{ArtifactError, ServiceError};
pub use parts::{choose_layout, PartPolicy, UploadLayout};
pub use traits::{ConfigurableEngine, MetadataService, RequestRunner, TransferEngine};
pub use types::{
    ArtifactIdentity, ArtifactUrl, CompletionRecord, Compression, CreateArtifactRequest,
    CreateArtifactResponse, DataSource, GetRequest, PartDescriptor, PrepareOptions,
    PreparedUpload, PutRequest, RunnerRequest, RunnerResponse, SignedRequest, UploadOutcome,
};
pub use upload::{storage_request, UploadOrchestrator};
