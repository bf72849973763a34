//! Error types for artifact transfers.

use thiserror::Error;

/// Errors reported by the collaborators: metadata service, transfer engine
/// and request runner.
#[derive(Error, Debug, Clone)]
pub enum ServiceError {
    /// The remote answered with a non-success HTTP status.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// Network error.
    #[error("Network error: {message}")]
    Network { message: String, retryable: bool },

    /// Local I/O error.
    #[error("I/O error for {path}: {message}")]
    Io { path: String, message: String },

    /// Transferred bytes do not match the advertised hash or length.
    #[error("Integrity check failed for {what}: expected {expected}, got {actual}")]
    IntegrityMismatch {
        what: String,
        expected: String,
        actual: String,
    },

    /// The remote answered, but not with something we can use.
    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    /// The request cannot be served as asked (e.g. conflicting part hints).
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    /// Other error.
    #[error("{message}")]
    Other { message: String },
}

impl ServiceError {
    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            ServiceError::Network { retryable, .. } => *retryable,
            ServiceError::Http { status, .. } => *status == 429 || *status >= 500,
            ServiceError::Io { .. } => false,
            ServiceError::IntegrityMismatch { .. } => false,
            ServiceError::InvalidResponse { .. } => false,
            ServiceError::InvalidRequest { .. } => false,
            ServiceError::Other { .. } => false,
        }
    }

    /// Create an I/O error tagged with the path it happened on.
    pub fn io(path: impl Into<String>, err: std::io::Error) -> Self {
        ServiceError::Io {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for ServiceError {
    fn from(err: std::io::Error) -> Self {
        ServiceError::Io {
            path: String::new(),
            message: err.to_string(),
        }
    }
}

/// Errors surfaced to callers of `put`, `get` and `get_url`.
///
/// Every failure is terminal for the call that produced it; nothing is
/// retried internally.
#[derive(Error, Debug, Clone)]
pub enum ArtifactError {
    /// Missing or malformed caller parameters. Raised before any I/O.
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    /// The source file could not be read, hashed or compressed.
    #[error("Upload preparation failed for {path}: {source}")]
    UploadPreparation { path: String, source: ServiceError },

    /// The metadata service could not be asked for a transfer plan.
    #[error("Creating {artifact} failed: {source}")]
    CreateArtifact {
        artifact: String,
        source: ServiceError,
    },

    /// The metadata service did not hand back a usable set of signed requests.
    #[error("No usable transfer plan for {artifact}: {reason}")]
    TransferPlan { artifact: String, reason: String },

    /// A part failed against the transfer engine.
    #[error("Part upload failed for {artifact}: {source}")]
    PartUpload {
        artifact: String,
        source: ServiceError,
    },

    /// All parts were stored, but the metadata service refused to seal the
    /// artifact. Completion alone may be retried.
    #[error("Completion failed for {artifact} after a successful upload: {source}")]
    Completion {
        artifact: String,
        etags: Vec<String>,
        source: ServiceError,
    },

    /// The request to the metadata-service artifact URL failed outright.
    #[error("Could not resolve {url}: {source}")]
    Resolve { url: String, source: ServiceError },

    /// The metadata service answered without a usable redirect.
    #[error("Redirect protocol error: {message}")]
    RedirectProtocol { message: String },

    /// The redirect points somewhere other than an https resource.
    #[error("Redirect must be to an https resource, but got {url}")]
    InsecureRedirect { url: String },

    /// The verified download failed.
    #[error("Download of {url} failed: {source}")]
    Download { url: String, source: ServiceError },

    /// Invalid client configuration.
    #[error("Invalid configuration: {message}")]
    Configuration { message: String },
}

impl ArtifactError {
    pub(crate) fn invalid_input(message: impl Into<String>) -> Self {
        ArtifactError::InvalidInput {
            message: message.into(),
        }
    }

    /// True when the bytes are already stored and only the completion call
    /// needs repeating.
    pub fn is_completion_retryable(&self) -> bool {
        matches!(self, ArtifactError::Completion { .. })
    }

    /// The etags of a stored-but-unsealed upload, for retrying completion.
    pub fn pending_etags(&self) -> Option<&[String]> {
        match self {
            ArtifactError::Completion { etags, .. } => Some(etags),
            _ => None,
        }
    }
}
