//! Error taxonomy for collection and reconstruction.
//!
//! Adapter failures (`Transport`, `Parse`) skip the entity and the run goes
//! on. `Reconstruction` and persistence failures abort only the entity's own
//! pipeline. Nothing here retries.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("transport error fetching '{entity}': {source}")]
    Transport {
        entity: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("transport error fetching '{entity}': HTTP {status}")]
    HttpStatus { entity: String, status: u16 },

    #[error("malformed payload for '{entity}': {message}")]
    Parse { entity: String, message: String },

    #[error("reconstruction error: {0}")]
    Reconstruction(String),

    #[error("database error: {0}")]
    Persistence(#[from] postgres::Error),

    #[error("persistence error: {0}")]
    PersistenceMessage(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("CSV error writing '{path}': {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error("I/O error writing '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    /// True for failures raised at the source adapter boundary.
    pub fn is_adapter_failure(&self) -> bool {
        matches!(
            self,
            PipelineError::Transport { .. } | PipelineError::HttpStatus { .. } | PipelineError::Parse { .. }
        )
    }

    pub fn parse(entity: &str, message: impl Into<String>) -> Self {
        PipelineError::Parse { entity: entity.to_string(), message: message.into() }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
