//! Runs the email, PAN and GST checks against the backend and merges
//! their outcomes into the form.
//!
//! Each flow keeps its state in a `watch` channel guarded by a ticket. Any
//! edit to a flow's source field bumps the ticket, so a response to a
//! request made before the edit is dropped instead of overwriting newer
//! input. Navigation does not bump tickets: a response that arrives after
//! the user moved to another step is still applied.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backend::OnboardingBackend;
use crate::config::WizardConfig;
use crate::error::{BackendError, VerificationError};
use crate::onboarding::form::FormModel;
use crate::onboarding::model::{FieldValue, FormRecord};
use crate::onboarding::steps::{Step, StepSequencer, looks_like_email};
use crate::onboarding::submission::SubmissionCoordinator;

use super::email::{self, EmailEvent, EmailState, ResendCooldown};
use super::gst::{self, GstDetails};
use super::pan::{self, PanMatch};
use super::state::{self, VerificationEvent, VerificationState};

const DEFAULT_ALREADY_SUBMITTED: &str = "An onboarding for this email has already been submitted.";
const DEFAULT_OTP_SEND_FAILURE: &str = "Could not send the OTP. Please try again.";
const DEFAULT_OTP_REJECTED: &str = "Invalid OTP. Please try again.";

/// Outcome of trying to start a flow.
enum Start<R> {
    Go(R),
    /// Already settled; nothing to do.
    Done,
    Refused(VerificationError),
}

/// A flow's state plus the ticket that invalidates stale responses.
struct Tracked<S> {
    state: watch::Sender<S>,
    ticket: Mutex<u64>,
}

fn lock(ticket: &Mutex<u64>) -> MutexGuard<'_, u64> {
    ticket.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<S: Clone + Default> Tracked<S> {
    fn new() -> Self {
        let (state, _rx) = watch::channel(S::default());
        Self {
            state,
            ticket: Mutex::new(0),
        }
    }

    fn get(&self) -> S {
        self.state.borrow().clone()
    }

    /// Move into a pending state. `f` decides from the current state and
    /// only a `Go` result counts as a change.
    fn begin<R>(&self, f: impl FnOnce(&mut S) -> Start<R>) -> Start<(u64, R)> {
        let ticket = lock(&self.ticket);
        let mut outcome = None;
        self.state.send_if_modified(|s| {
            let start = f(s);
            let modified = matches!(start, Start::Go(_));
            outcome = Some(start);
            modified
        });
        match outcome {
            Some(Start::Go(r)) => Start::Go((*ticket, r)),
            Some(Start::Refused(e)) => Start::Refused(e),
            Some(Start::Done) | None => Start::Done,
        }
    }

    /// Apply a response if no edit happened since `ticket` was issued.
    fn settle(&self, ticket: u64, f: impl FnOnce(&mut S)) -> bool {
        let current = lock(&self.ticket);
        if *current != ticket {
            return false;
        }
        self.state.send_modify(f);
        true
    }

    /// Invalidate outstanding requests and update state and form together.
    fn invalidate(&self, f: impl FnOnce(&mut S)) {
        let mut ticket = lock(&self.ticket);
        *ticket += 1;
        self.state.send_modify(f);
    }
}

fn step_flow<T>(event: VerificationEvent<T>) -> impl FnOnce(&mut VerificationState<T>) {
    move |s| *s = state::reduce(std::mem::take(s), event)
}

fn step_email(event: EmailEvent) -> impl FnOnce(&mut EmailState) {
    move |s| *s = email::reduce(std::mem::take(s), event)
}

/// Coordinates the three verification flows of one session.
pub struct VerificationOrchestrator {
    backend: Arc<dyn OnboardingBackend>,
    form: Arc<FormModel>,
    sequencer: Arc<StepSequencer>,
    submission: Arc<SubmissionCoordinator>,
    request_timeout: Duration,
    otp_cooldown: Duration,
    pan_threshold: u8,
    email: Tracked<EmailState>,
    cooldown: Arc<ResendCooldown>,
    pan: Tracked<VerificationState<PanMatch>>,
    gst: Tracked<VerificationState<GstDetails>>,
    step_watcher: JoinHandle<()>,
}

impl VerificationOrchestrator {
    /// Must be called inside a tokio runtime.
    pub fn new(
        config: &WizardConfig,
        backend: Arc<dyn OnboardingBackend>,
        form: Arc<FormModel>,
        sequencer: Arc<StepSequencer>,
        submission: Arc<SubmissionCoordinator>,
    ) -> Self {
        let cooldown = Arc::new(ResendCooldown::new());
        let step_watcher = spawn_step_watcher(&sequencer, &cooldown);
        Self {
            backend,
            form,
            sequencer,
            submission,
            request_timeout: config.request_timeout,
            otp_cooldown: config.otp_resend_cooldown,
            pan_threshold: config.pan_match_threshold,
            email: Tracked::new(),
            cooldown,
            pan: Tracked::new(),
            gst: Tracked::new(),
            step_watcher,
        }
    }

    pub fn email_state(&self) -> EmailState {
        self.email.get()
    }

    pub fn pan_state(&self) -> VerificationState<PanMatch> {
        self.pan.get()
    }

    pub fn gst_state(&self) -> VerificationState<GstDetails> {
        self.gst.get()
    }

    pub fn subscribe_email(&self) -> watch::Receiver<EmailState> {
        self.email.state.subscribe()
    }

    pub fn subscribe_pan(&self) -> watch::Receiver<VerificationState<PanMatch>> {
        self.pan.state.subscribe()
    }

    pub fn subscribe_gst(&self) -> watch::Receiver<VerificationState<GstDetails>> {
        self.gst.state.subscribe()
    }

    /// Seconds until another OTP may be requested.
    pub fn resend_cooldown(&self) -> u32 {
        self.cooldown.remaining()
    }

    pub fn subscribe_cooldown(&self) -> watch::Receiver<u32> {
        self.cooldown.subscribe()
    }

    /// Align flow states with a record loaded from elsewhere (resume or
    /// reset). Outstanding requests are invalidated.
    pub fn sync_from_record(&self, record: &FormRecord) {
        let email_state = if record.is_email_verified && !record.email.is_empty() {
            EmailState::Verified {
                email: record.email.clone(),
            }
        } else {
            EmailState::Idle
        };
        self.email.invalidate(|s| *s = email_state);

        let pan_state = if record.is_pan_verified {
            VerificationState::Verified(PanMatch {
                pan: record.pan_number.clone(),
                registered_name: record.director_name.clone(),
                score: None,
            })
        } else {
            VerificationState::Idle
        };
        self.pan.invalidate(|s| *s = pan_state);

        let gst_state = if record.is_gst_verified {
            VerificationState::Verified(GstDetails {
                gst_number: record.gst_number.clone(),
                trade_name: record.trade_name.clone(),
                legal_name: String::new(),
            })
        } else {
            VerificationState::Idle
        };
        self.gst.invalidate(|s| *s = gst_state);

        self.cooldown.cancel();
    }

    /// Write a field the user edited.
    ///
    /// Edits to a flow's source field (email, PAN number, director name,
    /// GST number) reset that flow and clear its verified flag in the same
    /// form write. Returns `false` if the value did not change.
    pub fn edit_field(&self, value: FieldValue) -> bool {
        let value = match value {
            FieldValue::PanNumber(v) => FieldValue::PanNumber(pan::normalize(&v)),
            FieldValue::GstNumber(v) => FieldValue::GstNumber(gst::normalize(&v)),
            other => other,
        };

        let changed = self.form.with(|record| {
            let mut after = record.clone();
            after.apply(value.clone());
            after != *record
        });
        if !changed {
            return false;
        }

        match value {
            FieldValue::Email(_) => self.email.invalidate(|s| {
                *s = email::reduce(std::mem::take(s), EmailEvent::EmailEdited);
                self.form.merge_with(|r| {
                    r.apply(value);
                    r.is_email_verified = false;
                });
            }),
            FieldValue::PanNumber(_) | FieldValue::DirectorName(_) => self.pan.invalidate(|s| {
                *s = state::reduce(std::mem::take(s), VerificationEvent::SourceEdited);
                self.form.merge_with(|r| {
                    r.apply(value);
                    pan::merge_reset(r);
                });
            }),
            FieldValue::GstNumber(_) => self.gst.invalidate(|s| {
                *s = state::reduce(std::mem::take(s), VerificationEvent::SourceEdited);
                self.form.merge_with(|r| {
                    r.apply(value);
                    gst::merge_reset(r);
                });
            }),
            other => {
                self.form.set(other);
            }
        }
        true
    }

    /// Start a PAN check in the background if the record is ready for one.
    pub fn spawn_pan_check(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        if self.form.with(pan::inputs).is_none() || self.pan_state().is_resolved() {
            return None;
        }
        let this = Arc::clone(self);
        Some(tokio::spawn(async move {
            if let Err(e) = this.verify_pan().await {
                debug!(flow = "pan", "Background check not started: {}", e);
            }
        }))
    }

    /// Start a GST check in the background if the record is ready for one.
    pub fn spawn_gst_check(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        if self.form.with(gst::input).is_none() || self.gst_state().is_resolved() {
            return None;
        }
        let this = Arc::clone(self);
        Some(tokio::spawn(async move {
            if let Err(e) = this.verify_gst().await {
                debug!(flow = "gst", "Background check not started: {}", e);
            }
        }))
    }

    // ---- Email / OTP ----

    /// Check for an earlier submission, then send an OTP to `address`.
    ///
    /// Requesting again for the address a code is already out for is a
    /// resend and skips the duplicate check.
    pub async fn request_otp(&self, address: &str) -> Result<EmailState, VerificationError> {
        let address = address.trim().to_string();
        if !looks_like_email(&address) {
            return Err(VerificationError::InvalidInput {
                field: "email",
                reason: "invalid format".into(),
            });
        }

        match self.email_state() {
            EmailState::AlreadySubmitted { message } => {
                return Err(VerificationError::AlreadySubmitted(message));
            }
            s if s.in_flight() => return Err(VerificationError::InFlight { flow: "email" }),
            EmailState::Verified { email } if email == address => {
                return Ok(self.email_state());
            }
            _ => {}
        }

        // Refused requests leave the form untouched.
        if !self.cooldown.can_resend() {
            return Err(VerificationError::CooldownActive {
                remaining_secs: self.cooldown.remaining(),
            });
        }

        self.edit_field(FieldValue::Email(address.clone()));

        let started = self.email.begin(|s| match s {
            EmailState::Idle | EmailState::CodeSent { .. } => {
                let resend = matches!(s, EmailState::CodeSent { email } if *email == address);
                *s = email::reduce(
                    std::mem::take(s),
                    EmailEvent::RequestStarted {
                        email: address.clone(),
                    },
                );
                Start::Go(resend)
            }
            EmailState::AlreadySubmitted { message } => {
                Start::Refused(VerificationError::AlreadySubmitted(message.clone()))
            }
            EmailState::Verified { .. } => Start::Done,
            _ => Start::Refused(VerificationError::InFlight { flow: "email" }),
        });
        let (ticket, resend) = match started {
            Start::Go(go) => go,
            Start::Done => return Ok(self.email_state()),
            Start::Refused(e) => return Err(e),
        };

        if !resend {
            let check = self
                .call(
                    "check_duplicate_submission",
                    self.backend.check_duplicate_submission(&address),
                )
                .await;
            match check {
                Ok(check) if check.is_submitted => {
                    let message = non_empty(Some(check.message))
                        .unwrap_or_else(|| DEFAULT_ALREADY_SUBMITTED.to_string());
                    self.divert_already_submitted(ticket, &message);
                    return Err(VerificationError::AlreadySubmitted(message));
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(flow = "email", "Duplicate check failed: {}", e);
                    self.email.settle(ticket, step_email(EmailEvent::RequestFailed));
                    return Err(VerificationError::OtpRequestFailed(e.user_message()));
                }
            }
        }

        let sent = self
            .call("request_email_otp", self.backend.request_email_otp(&address))
            .await;
        match sent {
            Ok(ack) if ack.ok => {
                if self.email.settle(ticket, step_email(EmailEvent::CodeSent)) {
                    self.cooldown.start(self.otp_cooldown);
                    info!(flow = "email", resend, "OTP sent");
                }
                Ok(self.email_state())
            }
            Ok(ack) => {
                self.email.settle(ticket, step_email(EmailEvent::RequestFailed));
                Err(VerificationError::OtpRequestFailed(
                    non_empty(ack.message).unwrap_or_else(|| DEFAULT_OTP_SEND_FAILURE.to_string()),
                ))
            }
            Err(e) => {
                warn!(flow = "email", "OTP request failed: {}", e);
                self.email.settle(ticket, step_email(EmailEvent::RequestFailed));
                Err(VerificationError::OtpRequestFailed(e.user_message()))
            }
        }
    }

    /// Send the code again to the address it is already out for.
    pub async fn resend_otp(&self) -> Result<EmailState, VerificationError> {
        let address = match self.email_state() {
            EmailState::CodeSent { email } => email,
            s if s.in_flight() => return Err(VerificationError::InFlight { flow: "email" }),
            EmailState::AlreadySubmitted { message } => {
                return Err(VerificationError::AlreadySubmitted(message));
            }
            _ => return Err(VerificationError::OtpNotRequested),
        };
        self.request_otp(&address).await
    }

    /// Confirm the OTP. On success the email is marked verified, and any
    /// progress the backend remembers for it is merged and resumed.
    pub async fn verify_otp(&self, code: &str) -> Result<EmailState, VerificationError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(VerificationError::InvalidInput {
                field: "otp",
                reason: "required".into(),
            });
        }

        let started = self.email.begin(|s| match s {
            EmailState::CodeSent { email } => {
                let address = email.clone();
                *s = email::reduce(std::mem::take(s), EmailEvent::ConfirmStarted);
                Start::Go(address)
            }
            EmailState::Verified { .. } => Start::Done,
            EmailState::AlreadySubmitted { message } => {
                Start::Refused(VerificationError::AlreadySubmitted(message.clone()))
            }
            s if s.in_flight() => Start::Refused(VerificationError::InFlight { flow: "email" }),
            _ => Start::Refused(VerificationError::OtpNotRequested),
        });
        let (ticket, address) = match started {
            Start::Go(go) => go,
            Start::Done => return Ok(self.email_state()),
            Start::Refused(e) => return Err(e),
        };

        let confirmed = self
            .call(
                "confirm_email_otp",
                self.backend.confirm_email_otp(&address, code),
            )
            .await;
        let confirmation = match confirmed {
            Ok(c) if c.ok => c,
            Ok(c) => {
                self.email.settle(ticket, step_email(EmailEvent::ConfirmRejected));
                return Err(VerificationError::OtpRejected(
                    non_empty(c.message).unwrap_or_else(|| DEFAULT_OTP_REJECTED.to_string()),
                ));
            }
            Err(e) => {
                warn!(flow = "email", "OTP confirmation failed: {}", e);
                self.email.settle(ticket, step_email(EmailEvent::ConfirmRejected));
                return Err(VerificationError::OtpRejected(e.user_message()));
            }
        };

        if confirmation.is_submitted {
            let message = non_empty(confirmation.message)
                .unwrap_or_else(|| DEFAULT_ALREADY_SUBMITTED.to_string());
            self.divert_already_submitted(ticket, &message);
            return Err(VerificationError::AlreadySubmitted(message));
        }

        let prior = confirmation.prior_form_data;
        let applied = self.email.settle(ticket, |s| {
            *s = email::reduce(std::mem::take(s), EmailEvent::Confirmed);
            self.form.merge_with(|r| {
                if let Some(prior) = prior {
                    r.apply_patch(prior);
                }
                r.email = address.clone();
                r.is_email_verified = true;
            });
        });
        if !applied {
            debug!(flow = "email", "Dropping stale OTP confirmation");
            return Ok(self.email_state());
        }

        self.cooldown.cancel();
        info!(flow = "email", email = %address, "Email verified");

        if let Some(index) = confirmation.current_step {
            match Step::from_index(index) {
                Some(step) => {
                    self.sequencer.resume_to(step);
                }
                None => warn!(index, "Backend reported an unknown step; not resuming"),
            }
        }

        Ok(self.email_state())
    }

    fn divert_already_submitted(&self, ticket: u64, message: &str) {
        let diverted = self.email.settle(
            ticket,
            step_email(EmailEvent::DuplicateFound {
                message: message.to_string(),
            }),
        );
        if diverted {
            self.cooldown.cancel();
            self.submission.mark_already_submitted(message);
        }
    }

    // ---- PAN ----

    /// Verify the director's PAN against the registry.
    pub async fn verify_pan(&self) -> Result<VerificationState<PanMatch>, VerificationError> {
        let Some((pan_number, name)) = self.form.with(pan::inputs) else {
            return Err(VerificationError::InvalidInput {
                field: "panNumber",
                reason: format!(
                    "PAN must look like ABCDE1234F and the director name needs at least {} characters",
                    pan::MIN_NAME_LEN
                ),
            });
        };

        let ticket = match self.pan.begin(begin_flow("pan")) {
            Start::Go((ticket, ())) => ticket,
            Start::Done => return Ok(self.pan_state()),
            Start::Refused(e) => return Err(e),
        };
        info!(flow = "pan", "Verification started");

        let outcome = match self
            .call("validate_pan", self.backend.validate_pan(&pan_number, &name))
            .await
        {
            Ok(response) => pan::evaluate(&pan_number, &response, self.pan_threshold),
            Err(e) => {
                warn!(flow = "pan", "PAN lookup failed: {}", e);
                Err(e.user_message())
            }
        };

        let applied = match outcome {
            Ok(matched) => self.pan.settle(ticket, |s| {
                self.form.merge_with(|r| pan::merge_verified(r, &matched));
                step_flow(VerificationEvent::Succeeded(matched))(s);
            }),
            Err(reason) => self.pan.settle(ticket, |s| {
                self.form.merge_with(pan::merge_failed);
                step_flow(VerificationEvent::Rejected(reason))(s);
            }),
        };

        let state = self.pan_state();
        if applied {
            info!(flow = "pan", outcome = state.label(), "Verification finished");
        } else {
            debug!(flow = "pan", "Dropping stale PAN response");
        }
        Ok(state)
    }

    // ---- GST ----

    /// Look up the GSTIN and pre-fill company details from the registry.
    pub async fn verify_gst(&self) -> Result<VerificationState<GstDetails>, VerificationError> {
        let Some(gst_number) = self.form.with(gst::input) else {
            return Err(VerificationError::InvalidInput {
                field: "gstNumber",
                reason: "not a valid GSTIN".into(),
            });
        };

        let ticket = match self.gst.begin(begin_flow("gst")) {
            Start::Go((ticket, ())) => ticket,
            Start::Done => return Ok(self.gst_state()),
            Start::Refused(e) => return Err(e),
        };
        info!(flow = "gst", gst = %gst_number, "Verification started");

        let outcome = match self
            .call("validate_gst", self.backend.validate_gst(&gst_number))
            .await
        {
            Ok(response) => gst::evaluate(&gst_number, &response).map(|d| (d, response)),
            Err(e) => {
                warn!(flow = "gst", "GST lookup failed: {}", e);
                Err(e.user_message())
            }
        };

        let applied = match outcome {
            Ok((details, response)) => self.gst.settle(ticket, |s| {
                self.form
                    .merge_with(|r| gst::merge_verified(r, &details, &response));
                step_flow(VerificationEvent::Succeeded(details))(s);
            }),
            Err(reason) => self.gst.settle(ticket, |s| {
                self.form.merge_with(gst::merge_failed);
                step_flow(VerificationEvent::Rejected(reason))(s);
            }),
        };

        let state = self.gst_state();
        if applied {
            info!(flow = "gst", outcome = state.label(), "Verification finished");
        } else {
            debug!(flow = "gst", "Dropping stale GST response");
        }
        Ok(state)
    }

    async fn call<T>(
        &self,
        operation: &'static str,
        request: impl Future<Output = Result<T, BackendError>>,
    ) -> Result<T, BackendError> {
        match tokio::time::timeout(self.request_timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(BackendError::Timeout {
                operation: operation.to_string(),
                timeout: self.request_timeout,
            }),
        }
    }
}

impl Drop for VerificationOrchestrator {
    fn drop(&mut self) {
        self.step_watcher.abort();
    }
}

/// Shared start rule for PAN and GST: refuse while pending, do nothing once
/// verified, otherwise go pending.
fn begin_flow<T>(flow: &'static str) -> impl FnOnce(&mut VerificationState<T>) -> Start<()> {
    move |s| match s {
        VerificationState::Pending => Start::Refused(VerificationError::InFlight { flow }),
        VerificationState::Verified(_) => Start::Done,
        _ => {
            step_flow(VerificationEvent::Started)(s);
            Start::Go(())
        }
    }
}

/// Cancel the OTP cooldown as soon as the wizard leaves the first step.
fn spawn_step_watcher(sequencer: &StepSequencer, cooldown: &Arc<ResendCooldown>) -> JoinHandle<()> {
    let mut steps = sequencer.subscribe();
    let cooldown = Arc::downgrade(cooldown);
    tokio::spawn(async move {
        while steps.changed().await.is_ok() {
            let step = *steps.borrow_and_update();
            if step == Step::AccountVerification {
                continue;
            }
            match cooldown.upgrade() {
                Some(cooldown) => cooldown.cancel(),
                None => break,
            }
        }
    })
}

fn non_empty(message: Option<String>) -> Option<String> {
    message
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty())
}
