//! Onboarding backend contract.
//!
//! The wizard talks to identity/business registries and the onboarding API
//! only through [`OnboardingBackend`]. `HttpBackend` is the production
//! implementation; tests supply their own.

pub mod http;

pub use http::HttpBackend;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::BackendError;
use crate::onboarding::model::FormPatch;
use crate::onboarding::submission::SubmissionPayload;

/// Result of the "has this email already submitted?" lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DuplicateCheck {
    pub is_submitted: bool,
    pub message: String,
}

/// Generic `{ok, message}` acknowledgement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Ack {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Ack {
    pub fn ok() -> Self {
        Self {
            ok: true,
            message: None,
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: Some(message.into()),
        }
    }
}

/// Response to an OTP confirmation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OtpConfirmation {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub is_submitted: bool,
    /// Step index the user had reached in an earlier session.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_step: Option<usize>,
    /// Form data saved by an earlier session.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prior_form_data: Option<FormPatch>,
}

/// Registry verdict on a PAN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PanStatus {
    Valid,
    Invalid,
    #[serde(other)]
    Unknown,
}

/// PAN registry response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PanValidation {
    pub status: PanStatus,
    #[serde(default)]
    pub matched_name: String,
    /// Similarity between submitted and registered names, 0-100.
    #[serde(default)]
    pub name_match_score: f64,
}

/// Registered address of a GSTIN.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GstAddress {
    pub full: String,
    pub city: String,
    pub district: String,
    pub state_code: String,
    pub pincode: String,
}

/// GST registry response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GstValidation {
    pub trade_name: String,
    pub legal_name: String,
    pub address: GstAddress,
}

/// Everything the wizard needs from the outside world.
#[async_trait]
pub trait OnboardingBackend: Send + Sync {
    /// Asked before any OTP is sent.
    async fn check_duplicate_submission(&self, email: &str)
    -> Result<DuplicateCheck, BackendError>;

    async fn request_email_otp(&self, email: &str) -> Result<Ack, BackendError>;

    async fn confirm_email_otp(
        &self,
        email: &str,
        code: &str,
    ) -> Result<OtpConfirmation, BackendError>;

    async fn validate_pan(&self, pan: &str, name: &str) -> Result<PanValidation, BackendError>;

    async fn validate_gst(&self, gst_number: &str) -> Result<GstValidation, BackendError>;

    async fn submit_onboarding(&self, payload: &SubmissionPayload) -> Result<Ack, BackendError>;
}
