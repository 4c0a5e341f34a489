//! HTTP implementation of [`OnboardingBackend`] over reqwest.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::config::WizardConfig;
use crate::error::BackendError;
use crate::onboarding::submission::SubmissionPayload;

use super::{Ack, DuplicateCheck, GstValidation, OnboardingBackend, OtpConfirmation, PanValidation};

/// JSON-over-HTTP onboarding backend.
pub struct HttpBackend {
    base_url: String,
    api_token: Option<SecretString>,
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new(config: &WizardConfig) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| BackendError::Transport {
                operation: "client_init".into(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            base_url: config.backend_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn post<B, R>(&self, operation: &str, path: &str, body: &B) -> Result<R, BackendError>
    where
        B: Serialize + ?Sized + Sync,
        R: DeserializeOwned,
    {
        let mut request = self.client.post(self.url(path)).json(body);
        if let Some(ref token) = self.api_token {
            request = request.bearer_auth(token.expose_secret());
        }

        let resp = request.send().await.map_err(|e| {
            if e.is_timeout() {
                BackendError::Timeout {
                    operation: operation.to_string(),
                    timeout: std::time::Duration::ZERO,
                }
            } else {
                BackendError::Transport {
                    operation: operation.to_string(),
                    reason: e.to_string(),
                }
            }
        })?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| BackendError::Transport {
            operation: operation.to_string(),
            reason: e.to_string(),
        })?;

        if !status.is_success() {
            tracing::warn!(operation, status = status.as_u16(), "Backend call failed");
            return Err(BackendError::Status {
                operation: operation.to_string(),
                status: status.as_u16(),
                body: extract_message(&text),
            });
        }

        serde_json::from_str(&text).map_err(|e| BackendError::Decode {
            operation: operation.to_string(),
            reason: e.to_string(),
        })
    }
}

/// Pull a human message out of an error body: `{"message": ...}` or
/// `{"error": ...}` if it is JSON, the raw text otherwise.
fn extract_message(body: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(json) => json
            .get("message")
            .or_else(|| json.get("error"))
            .and_then(|v| v.as_str())
            .map(String::from)
            .unwrap_or_default(),
        Err(_) => body.trim().to_string(),
    }
}

#[async_trait]
impl OnboardingBackend for HttpBackend {
    async fn check_duplicate_submission(
        &self,
        email: &str,
    ) -> Result<DuplicateCheck, BackendError> {
        self.post(
            "check_duplicate_submission",
            "onboarding/check-submission",
            &serde_json::json!({ "email": email }),
        )
        .await
    }

    async fn request_email_otp(&self, email: &str) -> Result<Ack, BackendError> {
        self.post(
            "request_email_otp",
            "auth/email/send-otp",
            &serde_json::json!({ "email": email }),
        )
        .await
    }

    async fn confirm_email_otp(
        &self,
        email: &str,
        code: &str,
    ) -> Result<OtpConfirmation, BackendError> {
        self.post(
            "confirm_email_otp",
            "auth/email/verify-otp",
            &serde_json::json!({ "email": email, "otp": code }),
        )
        .await
    }

    async fn validate_pan(&self, pan: &str, name: &str) -> Result<PanValidation, BackendError> {
        self.post(
            "validate_pan",
            "kyc/pan/verify",
            &serde_json::json!({ "pan": pan, "name": name }),
        )
        .await
    }

    async fn validate_gst(&self, gst_number: &str) -> Result<GstValidation, BackendError> {
        self.post(
            "validate_gst",
            "kyc/gst/verify",
            &serde_json::json!({ "gstNumber": gst_number }),
        )
        .await
    }

    async fn submit_onboarding(&self, payload: &SubmissionPayload) -> Result<Ack, BackendError> {
        self.post("submit_onboarding", "onboarding/submit", payload)
            .await
    }
}
