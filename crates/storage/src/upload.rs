//! Upload orchestration for blob artifacts.
//!
//! This module drives one `put` from a local file to a sealed artifact,
//! using any `MetadataService` and `TransferEngine` implementation:
//!
//! 1. Validate the caller's parameters (no I/O happens before this passes)
//! 2. Prepare the upload (hashes, optional gzip, part layout)
//! 3. Register the artifact and obtain the signed transfer plan
//! 4. Run the plan against the transfer engine
//! 5. Complete the artifact with the ordered etags
//!
//! Part boundaries are chosen by the preparer; the orchestrator only shapes
//! the plan request from what the preparer returned.
//!
//! # Example
//!
//! ```ignore
//! use blob_artifacts::{ArtifactIdentity, PutRequest, UploadOrchestrator};
//!
//! let orchestrator = UploadOrchestrator::new(&queue, &engine);
//! let request = PutRequest::new(
//!     ArtifactIdentity::new(task_id, "0", "public/logs/live.log"),
//!     "text/plain",
//!     "/tmp/live.log",
//!     expires,
//! )
//! .with_compression("gzip");
//! orchestrator.put(&request).await?;
//! ```

use blob_artifacts_common::BLOB_STORAGE_TYPE;
use chrono::{DateTime, Utc};
use log::{debug, warn};

use crate::error::{ArtifactError, ServiceError};
use crate::traits::{MetadataService, TransferEngine};
use crate::types::{
    CompletionRecord, Compression, CreateArtifactRequest, CreateArtifactResponse,
    PrepareOptions, PreparedUpload, PutRequest, SignedRequest, UploadOutcome,
};

/// High-level upload operations over a metadata service and transfer engine.
pub struct UploadOrchestrator<'a, Q: MetadataService, E: TransferEngine> {
    /// Metadata service issuing plans and sealing artifacts.
    queue: &'a Q,
    /// Engine preparing and sending the bytes.
    engine: &'a E,
}

impl<'a, Q: MetadataService, E: TransferEngine> UploadOrchestrator<'a, Q, E> {
    /// Create a new upload orchestrator.
    ///
    /// # Arguments
    /// * `queue` - Metadata service client
    /// * `engine` - Transfer engine
    pub fn new(queue: &'a Q, engine: &'a E) -> Self {
        Self { queue, engine }
    }

    /// Upload a file as an artifact, optionally with gzip compression.
    ///
    /// No abort is issued when a multipart upload fails part-way; the
    /// storage lifecycle policy expires unfinished multipart uploads.
    ///
    /// # Errors
    /// - `InvalidInput` before any I/O for bad parameters
    /// - `UploadPreparation` when the file cannot be read or compressed
    /// - `CreateArtifact` when the metadata service call itself fails
    /// - `TransferPlan` when the metadata service yields no usable plan
    /// - `PartUpload` when the engine fails to store a part
    /// - `Completion` when the parts are stored but sealing fails
    pub async fn put(&self, request: &PutRequest) -> Result<(), ArtifactError> {
        let compression: Option<Compression> = validate_put(request)?;
        let artifact: String = request.artifact.to_string();

        let options = PrepareOptions {
            filename: request.filename.clone(),
            compression,
            force_multipart: request.force_multipart,
            force_singlepart: request.force_singlepart,
        };
        let upload: PreparedUpload = self
            .engine
            .prepare_upload(&options)
            .await
            .map_err(|source| ArtifactError::UploadPreparation {
                path: request.filename.display().to_string(),
                source,
            })?;
        debug!(
            "Prepared {}: {} bytes, {} on the wire, {} request(s)",
            artifact,
            upload.size,
            upload.transfer_len(),
            upload.request_count()
        );

        let payload: CreateArtifactRequest =
            storage_request(&upload, &request.content_type, request.expires);
        let response: CreateArtifactResponse = self
            .queue
            .create_artifact(&request.artifact, &payload)
            .await
            .map_err(|source| ArtifactError::CreateArtifact {
                artifact: artifact.clone(),
                source,
            })?;
        let plan: Vec<SignedRequest> = transfer_plan(response, &upload, &artifact)?;

        let outcome: UploadOutcome = self
            .engine
            .run_upload(&plan, &upload)
            .await
            .map_err(|source| ArtifactError::PartUpload {
                artifact: artifact.clone(),
                source,
            })?;
        if outcome.etags.len() != plan.len() {
            return Err(ArtifactError::PartUpload {
                artifact,
                source: ServiceError::InvalidResponse {
                    message: format!(
                        "expected {} etags, transfer engine returned {}",
                        plan.len(),
                        outcome.etags.len()
                    ),
                },
            });
        }
        debug!("Uploaded {} part(s) of {}", plan.len(), artifact);

        let record = CompletionRecord {
            etags: outcome.etags,
        };
        if let Err(source) = self
            .queue
            .complete_artifact(&request.artifact, &record)
            .await
        {
            warn!("Artifact {} uploaded but not completed: {}", artifact, source);
            return Err(ArtifactError::Completion {
                artifact,
                etags: record.etags,
                source,
            });
        }

        debug!("Completed {}", artifact);
        Ok(())
    }
}

/// Check a `put` request and parse its compression.
fn validate_put(request: &PutRequest) -> Result<Option<Compression>, ArtifactError> {
    let required: [(&str, &str); 4] = [
        ("taskId", request.artifact.task_id.as_str()),
        ("runId", request.artifact.run_id.as_str()),
        ("name", request.artifact.name.as_str()),
        ("contentType", request.content_type.as_str()),
    ];
    for (field, value) in required {
        if value.is_empty() {
            return Err(ArtifactError::invalid_input(format!(
                "must provide a {} for upload",
                field
            )));
        }
    }
    if request.filename.as_os_str().is_empty() {
        return Err(ArtifactError::invalid_input(
            "must provide a filename for upload",
        ));
    }

    request
        .compression
        .as_deref()
        .map(str::parse::<Compression>)
        .transpose()
}

/// Build the create-artifact payload for a prepared upload.
///
/// Transfer fields are only sent when the bytes on the wire differ from the
/// original content, so identity uploads carry no encoding metadata.
pub fn storage_request(
    upload: &PreparedUpload,
    content_type: &str,
    expires: DateTime<Utc>,
) -> CreateArtifactRequest {
    let mut request = CreateArtifactRequest {
        storage_type: BLOB_STORAGE_TYPE.to_string(),
        expires,
        content_type: content_type.to_string(),
        content_sha256: upload.sha256.clone(),
        content_length: upload.size,
        transfer_sha256: None,
        transfer_length: None,
        content_encoding: None,
        parts: upload.parts.clone(),
    };

    if upload.is_encoded() {
        request.transfer_sha256 = upload.transfer_sha256.clone();
        request.transfer_length = upload.transfer_size;
        request.content_encoding = upload.content_encoding.clone();
    }

    request
}

/// Extract the transfer plan and check it matches the prepared layout.
fn transfer_plan(
    response: CreateArtifactResponse,
    upload: &PreparedUpload,
    artifact: &str,
) -> Result<Vec<SignedRequest>, ArtifactError> {
    let plan: Vec<SignedRequest> = match response.requests {
        Some(requests) if !requests.is_empty() => requests,
        _ => {
            return Err(ArtifactError::TransferPlan {
                artifact: artifact.to_string(),
                reason: "response carried no signed requests".to_string(),
            })
        }
    };

    let expected: usize = upload.request_count();
    if plan.len() != expected {
        return Err(ArtifactError::TransferPlan {
            artifact: artifact.to_string(),
            reason: format!(
                "expected {} signed request(s), got {}",
                expected,
                plan.len()
            ),
        });
    }

    Ok(plan)
}
