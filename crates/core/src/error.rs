use crate::types::RunId;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Shorthand for a missing analysis run.
    pub fn run_not_found(run_id: RunId) -> Self {
        Self::NotFound {
            entity: "AnalysisRun",
            id: run_id.to_string(),
        }
    }
}

/// Failure reported by an external collaborator (provider gateway,
/// dispatcher, mail relay, directory).
#[derive(Debug, thiserror::Error)]
pub enum ExternalError {
    /// The request never produced a usable response (network, DNS,
    /// timeout, undecodable body).
    #[error("{service} request failed: {message}")]
    Request {
        service: &'static str,
        message: String,
    },

    /// The remote side answered with a non-2xx status code.
    #[error("{service} returned HTTP {status}")]
    HttpStatus { service: &'static str, status: u16 },

    /// The collaborator has no configuration in this deployment.
    #[error("{service} is not configured")]
    NotConfigured { service: &'static str },
}

impl ExternalError {
    pub fn request(service: &'static str, message: impl Into<String>) -> Self {
        Self::Request {
            service,
            message: message.into(),
        }
    }
}
