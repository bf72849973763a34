//! Caller-facing artifact client.
//!
//! `ArtifactClient` owns one metadata service and exactly one transfer
//! engine. The engine is either injected or built from options, never both;
//! `ArtifactClientBuilder` turns the caller's choices into an
//! [`EngineConfig`] and rejects the ambiguous combination.

use std::path::Path;

use crate::download::DownloadResolver;
use crate::error::ArtifactError;
use crate::traits::{ConfigurableEngine, MetadataService, TransferEngine};
use crate::types::{GetRequest, PutRequest};
use crate::upload::UploadOrchestrator;

/// Where the client's transfer engine comes from.
pub enum EngineConfig<E: ConfigurableEngine> {
    /// Use an engine the caller already built.
    Provided(E),
    /// Build an engine from these options.
    Options(E::Options),
    /// Build an engine from default options.
    Default,
}

impl<E: ConfigurableEngine> EngineConfig<E> {
    /// Combine an optional engine and optional options into one choice.
    ///
    /// # Errors
    /// `Configuration` when both are supplied.
    pub fn from_parts(
        engine: Option<E>,
        options: Option<E::Options>,
    ) -> Result<Self, ArtifactError> {
        match (engine, options) {
            (Some(_), Some(_)) => Err(ArtifactError::Configuration {
                message: "provide either a transfer engine or options to build one, not both"
                    .to_string(),
            }),
            (Some(engine), None) => Ok(EngineConfig::Provided(engine)),
            (None, Some(options)) => Ok(EngineConfig::Options(options)),
            (None, None) => Ok(EngineConfig::Default),
        }
    }

    /// Produce the engine.
    pub fn into_engine(self) -> Result<E, ArtifactError> {
        let options: E::Options = match self {
            EngineConfig::Provided(engine) => return Ok(engine),
            EngineConfig::Options(options) => options,
            EngineConfig::Default => E::Options::default(),
        };
        E::from_options(options).map_err(|e| ArtifactError::Configuration {
            message: format!("could not build transfer engine: {}", e),
        })
    }
}

/// Uploads and downloads artifacts. Holds no per-call state, so concurrent
/// calls on distinct artifacts do not interfere.
pub struct ArtifactClient<Q: MetadataService, E: TransferEngine> {
    queue: Q,
    engine: E,
}

impl<Q: MetadataService, E: TransferEngine> ArtifactClient<Q, E> {
    /// Create a client around an existing engine.
    pub fn new(queue: Q, engine: E) -> Self {
        Self { queue, engine }
    }

    /// Upload a file as an artifact. See [`UploadOrchestrator::put`].
    pub async fn put(&self, request: &PutRequest) -> Result<(), ArtifactError> {
        UploadOrchestrator::new(&self.queue, &self.engine)
            .put(request)
            .await
    }

    /// Download an artifact by identity. See [`DownloadResolver::get`].
    pub async fn get(&self, request: &GetRequest) -> Result<(), ArtifactError> {
        DownloadResolver::new(&self.queue, &self.engine)
            .get(request)
            .await
    }

    /// Download from a URL obtained elsewhere. See [`DownloadResolver::get_url`].
    pub async fn get_url(&self, url: &str, filename: &Path) -> Result<(), ArtifactError> {
        DownloadResolver::new(&self.queue, &self.engine)
            .get_url(url, filename)
            .await
    }

    /// The metadata service client.
    pub fn queue(&self) -> &Q {
        &self.queue
    }

    /// The transfer engine.
    pub fn engine(&self) -> &E {
        &self.engine
    }
}

impl<Q: MetadataService, E: ConfigurableEngine> ArtifactClient<Q, E> {
    /// Start building a client whose engine may be built from options.
    pub fn builder(queue: Q) -> ArtifactClientBuilder<Q, E> {
        ArtifactClientBuilder {
            queue,
            engine: None,
            engine_options: None,
        }
    }
}

/// Builder for [`ArtifactClient`].
pub struct ArtifactClientBuilder<Q: MetadataService, E: ConfigurableEngine> {
    queue: Q,
    engine: Option<E>,
    engine_options: Option<E::Options>,
}

impl<Q: MetadataService, E: ConfigurableEngine> ArtifactClientBuilder<Q, E> {
    /// Use this engine.
    pub fn with_engine(mut self, engine: E) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Build the engine from these options.
    pub fn with_engine_options(mut self, options: E::Options) -> Self {
        self.engine_options = Some(options);
        self
    }

    /// Validate the engine choice and build the client.
    pub fn build(self) -> Result<ArtifactClient<Q, E>, ArtifactError> {
        let engine: E = EngineConfig::from_parts(self.engine, self.engine_options)?.into_engine()?;
        Ok(ArtifactClient::new(self.queue, engine))
    }
}
