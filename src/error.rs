//! Error types for swe-validate operations.
//!
//! Defines error types for the major subsystems:
//! - Run setup (credentials, instance files, model selection)
//! - LLM API interactions
//! - Docker sandbox availability
//!
//! Per-command sandbox faults have no variant here: a failed command is
//! reported to the conversation as a diagnostic line, not as an error value.

use thiserror::Error;

use crate::conversation::ConversationError;

/// Errors that abort a validation run before or during setup.
#[derive(Debug, Error)]
pub enum ValidateError {
    #[error("Missing credential: {0}")]
    MissingCredential(String),

    #[error("Invalid instance '{path}': {reason}")]
    InvalidInstance { path: String, reason: String },

    #[error("No model available: all {tried} candidate(s) failed the preflight probe")]
    ExhaustedCandidates { tried: usize },

    #[error("Conversation setup failed: {0}")]
    Conversation(#[from] ConversationError),

    #[error("Sandbox unavailable: {0}")]
    SandboxUnavailable(#[from] SandboxError),
}

/// Errors that can occur during LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },

    #[error("Stream ended without any response fragment")]
    EmptyStream,
}

/// Errors raised while checking that the Docker sandbox can run at all.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("Docker daemon not available: {0}")]
    DaemonUnavailable(String),

    #[error("Docker image '{image}' not found locally: {reason}")]
    ImageMissing { image: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exhausted_candidates_message() {
        let err = ValidateError::ExhaustedCandidates { tried: 3 };
        assert_eq!(
            err.to_string(),
            "No model available: all 3 candidate(s) failed the preflight probe"
        );
    }

    #[test]
    fn test_sandbox_error_converts() {
        let err: ValidateError = SandboxError::DaemonUnavailable("socket missing".into()).into();
        assert!(matches!(err, ValidateError::SandboxUnavailable(_)));
        assert!(err.to_string().contains("socket missing"));
    }
}
