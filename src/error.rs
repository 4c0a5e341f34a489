//! Error types for the onboarding wizard.

use std::time::Duration;

use crate::onboarding::steps::{FieldIssue, Step};

/// Top-level error type for the wizard engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Verification error: {0}")]
    Verification(#[from] VerificationError),

    #[error("Step error: {0}")]
    Step(#[from] StepError),

    #[error("Submission error: {0}")]
    Submission(#[from] SubmissionError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Snapshot store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Failures talking to the onboarding backend.
///
/// All of these are retryable from the user's point of view.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("{operation} transport failed: {reason}")]
    Transport { operation: String, reason: String },

    #[error("{operation} timed out after {timeout:?}")]
    Timeout { operation: String, timeout: Duration },

    #[error("{operation} returned HTTP {status}: {body}")]
    Status {
        operation: String,
        status: u16,
        body: String,
    },

    #[error("{operation} returned an unreadable response: {reason}")]
    Decode { operation: String, reason: String },
}

impl BackendError {
    /// Message suitable for showing to the user.
    ///
    /// Server-provided bodies are passed through only for HTTP status
    /// errors; transport details stay in the logs.
    pub fn user_message(&self) -> String {
        match self {
            Self::Timeout { .. } => "The request timed out. Please try again.".to_string(),
            Self::Status { body, .. } if !body.trim().is_empty() => body.trim().to_string(),
            _ => "Something went wrong. Please try again.".to_string(),
        }
    }
}

/// Errors from starting or completing a verification flow.
#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    #[error("{flow} verification is already in progress")]
    InFlight { flow: &'static str },

    #[error("Invalid {field}: {reason}")]
    InvalidInput { field: &'static str, reason: String },

    #[error("OTP can be resent in {remaining_secs}s")]
    CooldownActive { remaining_secs: u32 },

    #[error("No OTP has been requested for this email")]
    OtpNotRequested,

    #[error("OTP request failed: {0}")]
    OtpRequestFailed(String),

    #[error("OTP verification failed: {0}")]
    OtpRejected(String),

    #[error("This onboarding has already been submitted: {0}")]
    AlreadySubmitted(String),
}

/// Step navigation errors.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("Step {step} is incomplete: {}", format_issues(.issues))]
    Incomplete { step: Step, issues: Vec<FieldIssue> },

    #[error("Step index {0} is out of range")]
    OutOfRange(usize),

    #[error("The wizard has reached a terminal state")]
    Terminal,
}

/// Submission errors.
#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    #[error("Both confirmations must be accepted before submitting")]
    NotAcknowledged,

    #[error("A submission is already in progress")]
    InFlight,

    #[error("The onboarding was already submitted")]
    AlreadyTerminal,

    #[error("Nothing has been submitted yet")]
    NotSubmitted,

    #[error("{0}")]
    Rejected(String),
}

fn format_issues(issues: &[FieldIssue]) -> String {
    issues
        .iter()
        .map(|i| format!("{} ({})", i.field, i.message))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type alias for the wizard engine.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_error_surfaces_server_body() {
        let err = BackendError::Status {
            operation: "submit_onboarding".into(),
            status: 422,
            body: " PAN already registered ".into(),
        };
        assert_eq!(err.user_message(), "PAN already registered");
    }

    #[test]
    fn transport_error_is_generic_for_users() {
        let err = BackendError::Transport {
            operation: "validate_gst".into(),
            reason: "connection refused (os error 111)".into(),
        };
        assert!(!err.user_message().contains("os error"));
    }

    #[test]
    fn incomplete_step_lists_fields() {
        let err = StepError::Incomplete {
            step: Step::CompanyDetails,
            issues: vec![
                FieldIssue::missing("city"),
                FieldIssue::new("pincode", "must be 6 digits"),
            ],
        };
        let text = err.to_string();
        assert!(text.contains("company_details"));
        assert!(text.contains("city (required)"));
        assert!(text.contains("pincode (must be 6 digits)"));
    }
}
