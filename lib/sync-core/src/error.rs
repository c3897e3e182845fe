use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

/// Failure reported by a registry client
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Registry request failed: {0}")]
    Request(String),

    #[error("Registry rejected request: HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Invalid registry response: {0}")]
    InvalidResponse(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// A prune failure for a single service
#[derive(Error, Debug)]
#[error("{service}: {source}")]
pub struct PruneFailure {
    pub service: String,
    #[source]
    pub source: RegistryError,
}

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Error updating endpoints {object}: {source}")]
    Registration {
        object: String,
        #[source]
        source: RegistryError,
    },

    #[error("Error removing possible deleted endpoints: {}", join_failures(.0))]
    Prune(Vec<PruneFailure>),

    #[error("Error removing endpoints of deleted object {object}: {source}")]
    Removal {
        object: String,
        #[source]
        source: RegistryError,
    },
}

impl CoreError {
    /// Service names whose pruning failed, empty for other kinds
    pub fn failed_services(&self) -> Vec<&str> {
        match self {
            CoreError::Prune(failures) => failures.iter().map(|f| f.service.as_str()).collect(),
            _ => Vec::new(),
        }
    }
}

fn join_failures(failures: &[PruneFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
