//! Final submission of the onboarding record.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::backend::OnboardingBackend;
use crate::error::{BackendError, SubmissionError};

use super::autosave::Autosave;
use super::form::FormModel;
use super::model::FormRecord;

/// Shown when the backend gives no reason of its own.
pub const GENERIC_FAILURE: &str = "Submission failed. Please try again.";

/// The two confirmations on the last step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Acknowledgements {
    pub director_details_confirmed: bool,
    pub terms_accepted: bool,
}

impl Acknowledgements {
    pub fn both() -> Self {
        Self {
            director_details_confirmed: true,
            terms_accepted: true,
        }
    }

    pub fn can_submit(&self) -> bool {
        self.director_details_confirmed && self.terms_accepted
    }
}

/// What is sent to the backend on submit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionPayload {
    pub email: String,
    pub company_name: String,
    pub director_name: String,
    pub pan_number: String,
    pub gst_number: String,
    pub aadhar_number: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub pincode: String,
    pub designation: String,
    pub director_address: String,
}

impl From<&FormRecord> for SubmissionPayload {
    fn from(r: &FormRecord) -> Self {
        Self {
            email: r.email.clone(),
            company_name: r.company_name.clone(),
            director_name: r.director_name.clone(),
            pan_number: r.pan_number.clone(),
            gst_number: r.gst_number.clone(),
            aadhar_number: r.aadhar_number.clone(),
            address: r.address.clone(),
            city: r.city.clone(),
            state: r.state.clone(),
            pincode: r.pincode.clone(),
            designation: r.designation.clone(),
            director_address: r.director_address.clone(),
        }
    }
}

/// Submission lifecycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubmissionStatus {
    #[default]
    Editing,
    Submitting,
    Submitted,
    AlreadySubmitted {
        message: String,
    },
    /// Retryable.
    Failed {
        message: String,
    },
}

impl SubmissionStatus {
    /// No further submission is possible in this session.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Submitted | Self::AlreadySubmitted { .. })
    }
}

/// Sends the record exactly once per attempt and owns the terminal states.
pub struct SubmissionCoordinator {
    backend: Arc<dyn OnboardingBackend>,
    form: Arc<FormModel>,
    autosave: Arc<Autosave>,
    status: watch::Sender<SubmissionStatus>,
    request_timeout: Duration,
}

impl SubmissionCoordinator {
    pub fn new(
        backend: Arc<dyn OnboardingBackend>,
        form: Arc<FormModel>,
        autosave: Arc<Autosave>,
        request_timeout: Duration,
    ) -> Self {
        let (status, _rx) = watch::channel(SubmissionStatus::Editing);
        Self {
            backend,
            form,
            autosave,
            status,
            request_timeout,
        }
    }

    pub fn status(&self) -> SubmissionStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SubmissionStatus> {
        self.status.subscribe()
    }

    /// Send the current record.
    ///
    /// On success the stored snapshot is removed, but the form keeps its
    /// data until [`acknowledge_success`](Self::acknowledge_success) so the
    /// success screen can still show it.
    pub async fn submit(&self, acks: Acknowledgements) -> Result<(), SubmissionError> {
        if !acks.can_submit() {
            return Err(SubmissionError::NotAcknowledged);
        }

        let mut rejection = None;
        let started = self.status.send_if_modified(|status| {
            if *status == SubmissionStatus::Submitting {
                rejection = Some(SubmissionError::InFlight);
                false
            } else if status.is_terminal() {
                rejection = Some(SubmissionError::AlreadyTerminal);
                false
            } else {
                *status = SubmissionStatus::Submitting;
                true
            }
        });
        if !started {
            return Err(rejection.unwrap_or(SubmissionError::InFlight));
        }

        let payload = self.form.with(|r| SubmissionPayload::from(r));
        info!(email = %payload.email, "Submitting onboarding");

        let result = match tokio::time::timeout(
            self.request_timeout,
            self.backend.submit_onboarding(&payload),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(BackendError::Timeout {
                operation: "submit_onboarding".into(),
                timeout: self.request_timeout,
            }),
        };

        match result {
            Ok(ack) if ack.ok => {
                if let Err(e) = self.autosave.discard().await {
                    warn!("Submitted, but failed to clear saved session: {}", e);
                }
                self.status.send_replace(SubmissionStatus::Submitted);
                info!(email = %payload.email, "Onboarding submitted");
                Ok(())
            }
            Ok(ack) => {
                let message = ack
                    .message
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| GENERIC_FAILURE.to_string());
                Err(self.fail(message))
            }
            Err(e) => {
                warn!("Submission failed: {}", e);
                let message = match e {
                    BackendError::Status { ref body, .. } if !body.trim().is_empty() => {
                        body.trim().to_string()
                    }
                    _ => GENERIC_FAILURE.to_string(),
                };
                Err(self.fail(message))
            }
        }
    }

    /// The success screen has been shown; start over with a blank form.
    pub fn acknowledge_success(&self) {
        if self.status() == SubmissionStatus::Submitted {
            self.form.reset();
        }
    }

    /// Divert to the terminal "already submitted" state.
    pub fn mark_already_submitted(&self, message: impl Into<String>) {
        let message = message.into();
        info!(%message, "Onboarding already submitted for this account");
        self.status
            .send_replace(SubmissionStatus::AlreadySubmitted { message });
    }

    /// Back to `Editing` (session reset).
    pub(crate) fn reset(&self) {
        self.status.send_replace(SubmissionStatus::Editing);
    }

    fn fail(&self, message: String) -> SubmissionError {
        self.status.send_replace(SubmissionStatus::Failed {
            message: message.clone(),
        });
        SubmissionError::Rejected(message)
    }
}
