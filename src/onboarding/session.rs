//! One onboarding session: the context object that owns and wires the form,
//! persistence, step sequencer, verification flows and submission.

use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::info;
use uuid::Uuid;

use crate::backend::OnboardingBackend;
use crate::clock::Clock;
use crate::config::WizardConfig;
use crate::error::{Result, StepError, StoreError, SubmissionError};
use crate::store::SnapshotStore;

use super::autosave::Autosave;
use super::form::FormModel;
use super::model::{FieldValue, FormRecord};
use super::persist::PersistenceStore;
use super::steps::{FieldIssue, Step, StepSequencer, is_step_complete, resume_point, validate_step};
use super::submission::{Acknowledgements, SubmissionCoordinator, SubmissionStatus};
use super::verification::{
    EmailState, GstDetails, PanMatch, VerificationOrchestrator, VerificationState,
};

/// Result of a user field edit.
#[derive(Debug)]
pub struct FieldUpdate {
    pub changed: bool,
    /// A PAN or GST check started because the edit completed its inputs.
    pub check: Option<JoinHandle<()>>,
}

/// Progress of one step, for a stepper.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepStatus {
    pub index: usize,
    pub title: &'static str,
    pub complete: bool,
}

/// Everything a UI needs to render the wizard.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WizardStatus {
    pub attempt_id: Uuid,
    pub current_step: Step,
    pub steps: Vec<StepStatus>,
    /// What still blocks leaving the current step.
    pub blocking: Vec<FieldIssue>,
    pub email: EmailState,
    pub otp_resend_in: u32,
    pub pan: VerificationState<PanMatch>,
    pub gst: VerificationState<GstDetails>,
    pub pan_document_required: bool,
    pub gst_document_required: bool,
    pub submission: SubmissionStatus,
}

pub struct WizardSession {
    attempt_id: Mutex<Uuid>,
    persistence: PersistenceStore,
    autosave: Arc<Autosave>,
    form: Arc<FormModel>,
    sequencer: Arc<StepSequencer>,
    submission: Arc<SubmissionCoordinator>,
    verification: Arc<VerificationOrchestrator>,
}

impl WizardSession {
    /// Build a fresh session. Must be called inside a tokio runtime; call
    /// [`mount`](Self::mount) to pick up a saved session.
    pub fn new(
        config: &WizardConfig,
        backend: Arc<dyn OnboardingBackend>,
        store: Arc<dyn SnapshotStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let attempt_id = Uuid::new_v4();
        let persistence = PersistenceStore::new(store, clock, config.snapshot_ttl);
        let autosave = Arc::new(Autosave::spawn(
            persistence.clone(),
            config.autosave_delay,
            attempt_id,
            FormRecord::default(),
            Step::AccountVerification,
        ));
        let form = Arc::new(FormModel::new(FormRecord::default(), autosave.clone()));
        let sequencer = Arc::new(StepSequencer::new(
            Step::AccountVerification,
            autosave.clone(),
        ));
        let submission = Arc::new(SubmissionCoordinator::new(
            backend.clone(),
            form.clone(),
            autosave.clone(),
            config.request_timeout,
        ));
        let verification = Arc::new(VerificationOrchestrator::new(
            config,
            backend,
            form.clone(),
            sequencer.clone(),
            submission.clone(),
        ));

        Self {
            attempt_id: Mutex::new(attempt_id),
            persistence,
            autosave,
            form,
            sequencer,
            submission,
            verification,
        }
    }

    /// Restore a saved session, if one is worth resuming.
    ///
    /// Lands on the saved step, skipped forward past any steps that are
    /// already complete. Returns the step resumed at.
    pub async fn mount(&self) -> Option<Step> {
        let snapshot = self.persistence.load().await?;
        let step = resume_point(&snapshot.record, snapshot.current_step);

        self.form.replace(snapshot.record.clone());
        self.autosave
            .seed(snapshot.attempt_id, snapshot.record.clone(), step);
        self.sequencer.restore(step);
        self.verification.sync_from_record(&snapshot.record);
        *self
            .attempt_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = snapshot.attempt_id;

        info!(
            attempt_id = %snapshot.attempt_id,
            saved_step = %snapshot.current_step,
            step = %step,
            "Resumed onboarding session"
        );
        Some(step)
    }

    pub fn attempt_id(&self) -> Uuid {
        *self.attempt_id.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn form(&self) -> &Arc<FormModel> {
        &self.form
    }

    pub fn sequencer(&self) -> &Arc<StepSequencer> {
        &self.sequencer
    }

    pub fn verification(&self) -> &Arc<VerificationOrchestrator> {
        &self.verification
    }

    pub fn submission(&self) -> &Arc<SubmissionCoordinator> {
        &self.submission
    }

    /// Apply a user edit. Completing the PAN or GST inputs starts the
    /// matching check in the background.
    ///
    /// Refused once the submission reached a terminal status.
    pub fn set_field(&self, value: FieldValue) -> Result<FieldUpdate> {
        self.ensure_editable()?;
        let triggers_pan = matches!(
            value,
            FieldValue::PanNumber(_) | FieldValue::DirectorName(_)
        );
        let triggers_gst = matches!(value, FieldValue::GstNumber(_));

        let changed = self.verification.edit_field(value);
        let check = if !changed {
            None
        } else if triggers_pan {
            self.verification.spawn_pan_check()
        } else if triggers_gst {
            self.verification.spawn_gst_check()
        } else {
            None
        };
        Ok(FieldUpdate { changed, check })
    }

    /// Validate the current step and move to the next one.
    pub fn next(&self) -> Result<Step> {
        self.ensure_editable()?;
        let record = self.form.get();
        Ok(self.sequencer.advance(&record)?)
    }

    pub fn back(&self) -> Result<Step> {
        self.ensure_editable()?;
        Ok(self.sequencer.retreat())
    }

    /// Jump to a section from the confirmation screen.
    pub fn edit_section(&self, index: usize) -> Result<Step> {
        self.ensure_editable()?;
        Ok(self.sequencer.jump_to_index(index)?)
    }

    pub async fn submit(&self, acks: Acknowledgements) -> Result<()> {
        if self.sequencer.current() != Step::Confirmation {
            return Err(StepError::Incomplete {
                step: self.sequencer.current(),
                issues: vec![FieldIssue::new("step", "submit from the confirmation step")],
            }
            .into());
        }
        self.submission.submit(acks).await?;
        Ok(())
    }

    /// The success screen was shown; start a new, empty attempt.
    pub async fn acknowledge_success(&self) -> Result<()> {
        if self.submission.status() != SubmissionStatus::Submitted {
            return Err(SubmissionError::NotSubmitted.into());
        }
        self.submission.acknowledge_success();
        self.reset().await?;
        Ok(())
    }

    /// Throw away all progress, saved and in memory, and start over.
    pub async fn reset(&self) -> std::result::Result<(), StoreError> {
        let cleared = self.autosave.discard().await;

        let attempt_id = Uuid::new_v4();
        self.form.reset();
        self.sequencer.restore(Step::AccountVerification);
        self.verification.sync_from_record(&FormRecord::default());
        self.submission.reset();
        self.autosave.seed(
            attempt_id,
            FormRecord::default(),
            Step::AccountVerification,
        );
        *self.attempt_id.lock().unwrap_or_else(PoisonError::into_inner) = attempt_id;

        info!(attempt_id = %attempt_id, "Onboarding session reset");
        cleared
    }

    /// Write any pending autosave now.
    pub async fn flush(&self) {
        self.autosave.flush().await;
    }

    pub fn status(&self) -> WizardStatus {
        let record = self.form.get();
        let current_step = self.sequencer.current();
        WizardStatus {
            attempt_id: self.attempt_id(),
            current_step,
            steps: Step::ALL
                .iter()
                .map(|step| StepStatus {
                    index: step.index(),
                    title: step.title(),
                    complete: is_step_complete(*step, &record),
                })
                .collect(),
            blocking: validate_step(current_step, &record),
            email: self.verification.email_state(),
            otp_resend_in: self.verification.resend_cooldown(),
            pan: self.verification.pan_state(),
            gst: self.verification.gst_state(),
            pan_document_required: record.requires_pan_document(),
            gst_document_required: record.requires_gst_document(),
            submission: self.submission.status(),
        }
    }

    fn ensure_editable(&self) -> Result<()> {
        if self.submission.status().is_terminal() {
            return Err(StepError::Terminal.into());
        }
        Ok(())
    }
}
