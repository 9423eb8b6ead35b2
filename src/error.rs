//! # Structured Error Handling
//!
//! Crate-wide error taxonomy. Domain rejections carry a 4xx-style response
//! code so the service layer can hand clients a tagged error without
//! inspecting error internals.

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum RundownError {
    /// A referenced aggregate or entity is absent; always fatal to the call
    #[error("Not found: {0}")]
    NotFound(String),

    /// A domain precondition was not met; the operation aborted before any mutation
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    /// Another playlist is already on air in the same studio
    #[error("Conflict: another rundown playlist is active in studio {studio_id}")]
    Conflict {
        studio_id: String,
        /// Names of the rundowns in the conflicting active playlist, so the
        /// caller can offer a forced override
        active_rundowns: Vec<String>,
    },

    /// Document store operation failed
    #[error("Store error: {0}")]
    Store(String),

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Device gateway did not reply within the command timeout
    #[error("Device command timed out: {0}")]
    DeviceTimeout(String),

    /// Invariant violation inside the engine
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RundownError {
    /// HTTP-equivalent response code for the service layer
    pub fn code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::PreconditionFailed(_) => 412,
            Self::Conflict { .. } => 409,
            Self::DeviceTimeout(_) => 504,
            Self::Store(_) | Self::Internal(_) | Self::Configuration(_) => 500,
        }
    }

    /// Whether the error is a domain-level rejection rather than a fault
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_) | Self::PreconditionFailed(_) | Self::Conflict { .. }
        )
    }
}

/// Convenience constructor for not-found errors
pub fn not_found(what: impl std::fmt::Display) -> RundownError {
    RundownError::NotFound(what.to_string())
}

/// Convenience constructor for precondition failures
pub fn precondition(reason: impl std::fmt::Display) -> RundownError {
    RundownError::PreconditionFailed(reason.to_string())
}

pub type Result<T> = std::result::Result<T, RundownError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_codes() {
        assert_eq!(not_found("playlist xyz").code(), 404);
        assert_eq!(precondition("no next part").code(), 412);
        let conflict = RundownError::Conflict {
            studio_id: "studio0".into(),
            active_rundowns: vec!["Evening News".into()],
        };
        assert_eq!(conflict.code(), 409);
        assert!(conflict.is_client_error());
        assert!(!RundownError::Store("boom".into()).is_client_error());
    }

    #[test]
    fn test_error_messages() {
        let err = not_found("rundown abcde");
        assert_eq!(err.to_string(), "Not found: rundown abcde");
        let err = RundownError::DeviceTimeout("fn=stop".into());
        assert!(err.to_string().contains("timed out"));
    }
}
