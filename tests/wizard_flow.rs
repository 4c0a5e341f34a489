//! End-to-end tests for the onboarding wizard.
//!
//! Each test drives a full `WizardSession` against a stub backend and a
//! real snapshot store, the way a UI would.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Notify;

use kyc_wizard::backend::{
    Ack, DuplicateCheck, GstAddress, GstValidation, OnboardingBackend, OtpConfirmation,
    PanStatus, PanValidation,
};
use kyc_wizard::clock::ManualClock;
use kyc_wizard::config::WizardConfig;
use kyc_wizard::error::{BackendError, Error, StepError};
use kyc_wizard::onboarding::model::storage_keys;
use kyc_wizard::onboarding::{
    Acknowledgements, FieldValue, FormRecord, Step, SubmissionPayload, SubmissionStatus,
    WizardSession,
};
use kyc_wizard::store::{LibSqlStore, MemoryStore, SnapshotStore};

/// Stub backend: every registry lookup succeeds, with an optional gate that
/// holds PAN responses until released.
#[derive(Default)]
struct StubBackend {
    already_submitted: bool,
    pan_gate: Option<Arc<Notify>>,
    submissions: AtomicUsize,
}

#[async_trait]
impl OnboardingBackend for StubBackend {
    async fn check_duplicate_submission(&self, _email: &str) -> Result<DuplicateCheck, BackendError> {
        Ok(DuplicateCheck {
            is_submitted: self.already_submitted,
            message: if self.already_submitted {
                "This company is already onboarded".into()
            } else {
                String::new()
            },
        })
    }

    async fn request_email_otp(&self, _email: &str) -> Result<Ack, BackendError> {
        Ok(Ack::ok())
    }

    async fn confirm_email_otp(&self, _email: &str, code: &str) -> Result<OtpConfirmation, BackendError> {
        Ok(OtpConfirmation {
            ok: code == "123456",
            message: (code != "123456").then(|| "Incorrect code".to_string()),
            ..Default::default()
        })
    }

    async fn validate_pan(&self, _pan: &str, _name: &str) -> Result<PanValidation, BackendError> {
        if let Some(gate) = &self.pan_gate {
            gate.notified().await;
        }
        Ok(PanValidation {
            status: PanStatus::Valid,
            matched_name: "RAVI KUMAR".into(),
            name_match_score: 91.0,
        })
    }

    async fn validate_gst(&self, _gst: &str) -> Result<GstValidation, BackendError> {
        Ok(GstValidation {
            trade_name: "Acme Traders".into(),
            legal_name: "Acme Traders Private Limited".into(),
            address: GstAddress {
                full: "12 MG Road, Bengaluru".into(),
                city: "Bengaluru".into(),
                district: "Bengaluru Urban".into(),
                state_code: "29".into(),
                pincode: "560001".into(),
            },
        })
    }

    async fn submit_onboarding(&self, _payload: &SubmissionPayload) -> Result<Ack, BackendError> {
        self.submissions.fetch_add(1, Ordering::SeqCst);
        Ok(Ack::ok())
    }
}

fn new_session(backend: Arc<StubBackend>, store: Arc<dyn SnapshotStore>) -> WizardSession {
    WizardSession::new(
        &WizardConfig::default(),
        backend,
        store,
        Arc::new(ManualClock::new(Utc::now())),
    )
}

async fn verify_email(session: &WizardSession) {
    session
        .verification()
        .request_otp("a@b.com")
        .await
        .unwrap();
    session.verification().verify_otp("123456").await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn email_gst_submit_end_to_end() {
    let backend = Arc::new(StubBackend::default());
    let store = Arc::new(MemoryStore::new());
    let session = new_session(backend.clone(), store.clone());

    // Step 0: a wrong code is retryable, the right one verifies.
    session
        .verification()
        .request_otp("a@b.com")
        .await
        .unwrap();
    assert!(session.verification().verify_otp("000000").await.is_err());
    session.verification().verify_otp("123456").await.unwrap();
    assert!(session.form().get().is_email_verified);
    assert_eq!(session.next().unwrap(), Step::Ekyc);

    // Step 1: entering a well-formed GSTIN looks it up and pre-fills.
    let update = session
        .set_field(FieldValue::GstNumber("29ABCDE1234F1Z5".into()))
        .unwrap();
    update.check.expect("GST check should start").await.unwrap();
    let record = session.form().get();
    assert!(record.is_gst_verified);
    assert_eq!(record.trade_name, "Acme Traders");
    assert_eq!(record.company_name, "Acme Traders");
    assert_eq!(record.state, "Karnataka");
    assert_eq!(session.next().unwrap(), Step::CompanyDetails);

    // Step 2 was filled by the lookup.
    assert_eq!(session.next().unwrap(), Step::DirectorDetails);

    // Step 3
    for value in [
        FieldValue::DirectorName("Ravi Kumar".into()),
        FieldValue::AadharNumber("123412341234".into()),
        FieldValue::Designation("Managing Director".into()),
        FieldValue::DirectorAddress("4 Residency Road, Bengaluru".into()),
    ] {
        session.set_field(value).unwrap();
    }
    assert_eq!(session.next().unwrap(), Step::Confirmation);

    session.flush().await;
    assert!(
        store
            .get(storage_keys::SESSION_SNAPSHOT)
            .await
            .unwrap()
            .is_some()
    );

    // Step 4
    session.submit(Acknowledgements::both()).await.unwrap();
    assert_eq!(backend.submissions.load(Ordering::SeqCst), 1);
    assert_eq!(session.submission().status(), SubmissionStatus::Submitted);
    assert!(
        store
            .get(storage_keys::SESSION_SNAPSHOT)
            .await
            .unwrap()
            .is_none()
    );
    // Data stays visible until the success screen is acknowledged.
    assert_eq!(session.form().get().company_name, "Acme Traders");
    assert!(matches!(session.back(), Err(Error::Step(StepError::Terminal))));

    session.acknowledge_success().await.unwrap();
    assert_eq!(session.form().get(), FormRecord::default());
    assert_eq!(session.sequencer().current(), Step::AccountVerification);
    assert_eq!(session.submission().status(), SubmissionStatus::Editing);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(
        store
            .get(storage_keys::SESSION_SNAPSHOT)
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test(start_paused = true)]
async fn late_pan_response_after_navigation_is_applied() {
    let gate = Arc::new(Notify::new());
    let backend = Arc::new(StubBackend {
        pan_gate: Some(gate.clone()),
        ..Default::default()
    });
    let session = new_session(backend, Arc::new(MemoryStore::new()));

    verify_email(&session).await;
    session.edit_section(3).unwrap();

    session
        .set_field(FieldValue::DirectorName("Ravi Kumar".into()))
        .unwrap();
    let check = session
        .set_field(FieldValue::PanNumber("ABCDE1234F".into()))
        .unwrap()
        .check
        .expect("PAN check should start");
    while !session.verification().pan_state().is_pending() {
        tokio::task::yield_now().await;
    }

    // Navigate away and back while the lookup is outstanding.
    assert_eq!(session.edit_section(2).unwrap(), Step::CompanyDetails);
    assert_eq!(session.edit_section(3).unwrap(), Step::DirectorDetails);

    gate.notify_one();
    check.await.unwrap();

    assert!(session.verification().pan_state().is_verified());
    let record = session.form().get();
    assert!(record.is_pan_verified);
    assert!(!record.requires_pan_document());
    assert_eq!(record.director_name, "RAVI KUMAR");
    assert_eq!(session.sequencer().current(), Step::DirectorDetails);
}

#[tokio::test]
async fn progress_survives_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("wizard.db");

    {
        let store = Arc::new(LibSqlStore::new_local(&path).await.unwrap());
        let session = new_session(Arc::new(StubBackend::default()), store);
        verify_email(&session).await;
        session.next().unwrap();
        session
            .set_field(FieldValue::CompanyName("Typed By Hand".into()))
            .unwrap();
        session.flush().await;
    }

    let store = Arc::new(LibSqlStore::new_local(&path).await.unwrap());
    let session = new_session(Arc::new(StubBackend::default()), store);
    assert_eq!(session.mount().await, Some(Step::Ekyc));
    let record = session.form().get();
    assert_eq!(record.email, "a@b.com");
    assert_eq!(record.company_name, "Typed By Hand");
    assert!(session.status().email.view().is_verified());
}

#[tokio::test(start_paused = true)]
async fn earlier_submission_ends_the_wizard() {
    let backend = Arc::new(StubBackend {
        already_submitted: true,
        ..Default::default()
    });
    let session = new_session(backend.clone(), Arc::new(MemoryStore::new()));

    let err = session
        .verification()
        .request_otp("a@b.com")
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "This onboarding has already been submitted: This company is already onboarded"
    );
    assert!(session.submission().status().is_terminal());
    assert!(matches!(session.next(), Err(Error::Step(StepError::Terminal))));
    assert!(session.submit(Acknowledgements::both()).await.is_err());
    assert_eq!(backend.submissions.load(Ordering::SeqCst), 0);

    // A reset starts a clean attempt.
    session.reset().await.unwrap();
    assert_eq!(session.submission().status(), SubmissionStatus::Editing);
}

#[tokio::test(start_paused = true)]
async fn submitted_session_is_not_saved_again() {
    let gate = Arc::new(Notify::new());
    let backend = Arc::new(StubBackend {
        pan_gate: Some(gate.clone()),
        ..Default::default()
    });
    let store = Arc::new(MemoryStore::new());
    let session = new_session(backend.clone(), store.clone());

    verify_email(&session).await;
    session.edit_section(3).unwrap();
    for value in [
        FieldValue::AadharNumber("123412341234".into()),
        FieldValue::Designation("Director".into()),
        FieldValue::DirectorAddress("4 Residency Road".into()),
    ] {
        session.set_field(value).unwrap();
    }
    session
        .set_field(FieldValue::DirectorName("Ravi Kumar".into()))
        .unwrap();
    let check = session
        .set_field(FieldValue::PanNumber("ABCDE1234F".into()))
        .unwrap()
        .check
        .expect("PAN check should start");
    while !session.verification().pan_state().is_pending() {
        tokio::task::yield_now().await;
    }

    assert_eq!(session.next().unwrap(), Step::Confirmation);
    session.submit(Acknowledgements::both()).await.unwrap();
    assert!(
        store
            .get(storage_keys::SESSION_SNAPSHOT)
            .await
            .unwrap()
            .is_none()
    );

    // The late PAN result still lands in memory but is not persisted.
    gate.notify_one();
    check.await.unwrap();
    assert!(session.form().get().is_pan_verified);

    assert!(matches!(
        session.set_field(FieldValue::City("Mysuru".into())),
        Err(Error::Step(StepError::Terminal))
    ));
    session.flush().await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(
        store
            .get(storage_keys::SESSION_SNAPSHOT)
            .await
            .unwrap()
            .is_none()
    );

    let fresh = new_session(backend, store);
    assert_eq!(fresh.mount().await, None);
}
