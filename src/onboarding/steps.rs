//! Wizard steps and the step sequencer.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::info;

use crate::error::StepError;

use super::autosave::Autosave;
use super::model::FormRecord;

/// The five wizard stages, in order.
///
/// Serialized as the step index (0-4) so snapshots stay compact and an
/// out-of-range index fails to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Step {
    AccountVerification,
    Ekyc,
    CompanyDetails,
    DirectorDetails,
    Confirmation,
}

impl Step {
    pub const ALL: [Step; 5] = [
        Step::AccountVerification,
        Step::Ekyc,
        Step::CompanyDetails,
        Step::DirectorDetails,
        Step::Confirmation,
    ];

    /// The last step.
    pub const LAST: Step = Step::Confirmation;

    pub fn index(self) -> usize {
        match self {
            Self::AccountVerification => 0,
            Self::Ekyc => 1,
            Self::CompanyDetails => 2,
            Self::DirectorDetails => 3,
            Self::Confirmation => 4,
        }
    }

    pub fn from_index(index: usize) -> Option<Step> {
        Self::ALL.get(index).copied()
    }

    /// The following step, saturating at the last one.
    pub fn next(self) -> Step {
        Self::from_index(self.index() + 1).unwrap_or(Self::LAST)
    }

    /// The preceding step, saturating at the first one.
    pub fn prev(self) -> Step {
        Self::from_index(self.index().saturating_sub(1)).unwrap_or(Step::AccountVerification)
    }

    /// Human-readable title shown in the stepper.
    pub fn title(self) -> &'static str {
        match self {
            Self::AccountVerification => "Account Verification",
            Self::Ekyc => "e-KYC",
            Self::CompanyDetails => "Company Details",
            Self::DirectorDetails => "Director Details",
            Self::Confirmation => "Confirmation",
        }
    }
}

impl Default for Step {
    fn default() -> Self {
        Self::AccountVerification
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::AccountVerification => "account_verification",
            Self::Ekyc => "ekyc",
            Self::CompanyDetails => "company_details",
            Self::DirectorDetails => "director_details",
            Self::Confirmation => "confirmation",
        };
        write!(f, "{s}")
    }
}

impl TryFrom<u8> for Step {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_index(value as usize).ok_or_else(|| format!("step index {value} out of range"))
    }
}

impl From<Step> for u8 {
    fn from(step: Step) -> u8 {
        step.index() as u8
    }
}

/// A field-level validation problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldIssue {
    pub field: &'static str,
    pub message: String,
}

impl FieldIssue {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }

    pub fn missing(field: &'static str) -> Self {
        Self::new(field, "required")
    }
}

fn filled(value: &str) -> bool {
    !value.trim().is_empty()
}

fn require(issues: &mut Vec<FieldIssue>, field: &'static str, value: &str) {
    if !filled(value) {
        issues.push(FieldIssue::missing(field));
    }
}

/// `local@domain.tld`, no whitespace. Deliverability is the OTP's job.
pub fn looks_like_email(value: &str) -> bool {
    let v = value.trim();
    match v.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !v.chars().any(char::is_whitespace)
                && !domain.contains('@')
                && domain
                    .split_once('.')
                    .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty())
        }
        None => false,
    }
}

fn all_digits(value: &str, len: usize) -> bool {
    let v = value.trim();
    v.len() == len && v.chars().all(|c| c.is_ascii_digit())
}

/// Whether `step`'s required data is present.
///
/// Advisory only: used to decide how far a resumed session may skip ahead.
/// For e-KYC a successful GST lookup and an uploaded certificate are
/// alternatives; either one completes the step.
pub fn is_step_complete(step: Step, record: &FormRecord) -> bool {
    match step {
        Step::AccountVerification => filled(&record.email) && record.is_email_verified,
        Step::Ekyc => {
            filled(&record.gst_number) && (record.is_gst_verified || record.gst_document.is_some())
        }
        Step::CompanyDetails => [
            &record.company_name,
            &record.address,
            &record.city,
            &record.state,
            &record.pincode,
        ]
        .iter()
        .all(|v| filled(v)),
        Step::DirectorDetails => [
            &record.director_name,
            &record.aadhar_number,
            &record.designation,
            &record.director_address,
        ]
        .iter()
        .all(|v| filled(v)),
        Step::Confirmation => true,
    }
}

/// Blocking checks for leaving `step` forward. Never touches the network.
pub fn validate_step(step: Step, record: &FormRecord) -> Vec<FieldIssue> {
    let mut issues = Vec::new();

    match step {
        Step::AccountVerification => {
            require(&mut issues, "email", &record.email);
            if filled(&record.email) && !looks_like_email(&record.email) {
                issues.push(FieldIssue::new("email", "invalid format"));
            }
            if !record.is_email_verified {
                issues.push(FieldIssue::new("email", "must be verified"));
            }
        }
        Step::Ekyc => {
            require(&mut issues, "gstNumber", &record.gst_number);
            if record.requires_gst_document() && record.gst_document.is_none() {
                issues.push(FieldIssue::new(
                    "gstDocument",
                    "GST certificate upload required",
                ));
            }
        }
        Step::CompanyDetails => {
            require(&mut issues, "companyName", &record.company_name);
            require(&mut issues, "address", &record.address);
            require(&mut issues, "city", &record.city);
            require(&mut issues, "state", &record.state);
            require(&mut issues, "pincode", &record.pincode);
            if filled(&record.pincode) && !all_digits(&record.pincode, 6) {
                issues.push(FieldIssue::new("pincode", "must be 6 digits"));
            }
        }
        Step::DirectorDetails => {
            require(&mut issues, "directorName", &record.director_name);
            require(&mut issues, "aadharNumber", &record.aadhar_number);
            require(&mut issues, "designation", &record.designation);
            require(&mut issues, "directorAddress", &record.director_address);
            if filled(&record.aadhar_number) && !all_digits(&record.aadhar_number, 12) {
                issues.push(FieldIssue::new("aadharNumber", "must be 12 digits"));
            }
            if record.requires_pan_document() && record.pan_document.is_none() {
                issues.push(FieldIssue::new("panDocument", "PAN card upload required"));
            }
        }
        Step::Confirmation => {}
    }

    issues
}

/// Where a resumed session should land: the saved step, skipped forward
/// over any steps that are already complete.
pub fn resume_point(record: &FormRecord, saved: Step) -> Step {
    let mut step = saved;
    while step != Step::LAST && is_step_complete(step, record) {
        step = step.next();
    }
    step
}

/// Owns the current step index.
pub struct StepSequencer {
    current: watch::Sender<Step>,
    autosave: Arc<Autosave>,
}

impl StepSequencer {
    pub fn new(initial: Step, autosave: Arc<Autosave>) -> Self {
        let (current, _rx) = watch::channel(initial);
        Self { current, autosave }
    }

    pub fn current(&self) -> Step {
        *self.current.borrow()
    }

    /// Observe step changes.
    pub fn subscribe(&self) -> watch::Receiver<Step> {
        self.current.subscribe()
    }

    /// Move forward one step if the current step validates.
    pub fn advance(&self, record: &FormRecord) -> Result<Step, StepError> {
        let from = self.current();
        let issues = validate_step(from, record);
        if !issues.is_empty() {
            return Err(StepError::Incomplete { step: from, issues });
        }
        let to = from.next();
        self.move_to(to, "advance");
        Ok(to)
    }

    /// Move back one step.
    pub fn retreat(&self) -> Step {
        let to = self.current().prev();
        self.move_to(to, "retreat");
        to
    }

    /// User-driven jump ("edit section" on the confirmation screen).
    ///
    /// No completeness check: the caller decides.
    pub fn jump_to(&self, step: Step) -> Step {
        self.move_to(step, "jump");
        step
    }

    /// Progress-driven jump (snapshot or backend-reported step).
    pub fn resume_to(&self, step: Step) -> Step {
        self.move_to(step, "resume");
        step
    }

    /// Jump by raw index, as received from a UI or the backend.
    pub fn jump_to_index(&self, index: usize) -> Result<Step, StepError> {
        let step = Step::from_index(index).ok_or(StepError::OutOfRange(index))?;
        Ok(self.jump_to(step))
    }

    /// Set the step without persisting (mount/reset).
    pub(crate) fn restore(&self, step: Step) {
        self.current.send_replace(step);
    }

    fn move_to(&self, to: Step, reason: &'static str) {
        self.current.send_modify(|current| {
            if *current != to {
                info!(from = %current, to = %to, reason, "Step changed");
            }
            *current = to;
            self.autosave.step_changed(to);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete_record() -> FormRecord {
        FormRecord {
            email: "a@b.com".into(),
            is_email_verified: true,
            gst_number: "29ABCDE1234F1Z5".into(),
            is_gst_verified: true,
            company_name: "Acme".into(),
            address: "1 MG Road".into(),
            city: "Bengaluru".into(),
            state: "Karnataka".into(),
            pincode: "560001".into(),
            director_name: "Ravi Kumar".into(),
            aadhar_number: "123412341234".into(),
            designation: "Director".into(),
            director_address: "2 MG Road".into(),
            ..Default::default()
        }
    }

    #[test]
    fn next_and_prev_saturate() {
        assert_eq!(Step::Confirmation.next(), Step::Confirmation);
        assert_eq!(Step::AccountVerification.prev(), Step::AccountVerification);
        assert_eq!(Step::Ekyc.next(), Step::CompanyDetails);
        assert_eq!(Step::Ekyc.prev(), Step::AccountVerification);
    }

    #[test]
    fn index_roundtrip() {
        for (i, step) in Step::ALL.iter().enumerate() {
            assert_eq!(step.index(), i);
            assert_eq!(Step::from_index(i), Some(*step));
        }
        assert!(Step::from_index(5).is_none());
    }

    #[test]
    fn step_serializes_as_index() {
        assert_eq!(serde_json::to_string(&Step::DirectorDetails).unwrap(), "3");
        let step: Step = serde_json::from_str("2").unwrap();
        assert_eq!(step, Step::CompanyDetails);
        assert!(serde_json::from_str::<Step>("5").is_err());
    }

    #[test]
    fn step_zero_requires_verified_email() {
        let mut record = complete_record();
        record.is_email_verified = false;
        assert!(!is_step_complete(Step::AccountVerification, &record));

        // No combination of other fields makes up for it.
        record.company_name = "Other".into();
        record.is_pan_verified = true;
        assert!(!is_step_complete(Step::AccountVerification, &record));

        record.is_email_verified = true;
        assert!(is_step_complete(Step::AccountVerification, &record));
    }

    #[test]
    fn ekyc_accepts_verification_or_document() {
        let mut record = complete_record();
        assert!(is_step_complete(Step::Ekyc, &record));

        record.is_gst_verified = false;
        assert!(!is_step_complete(Step::Ekyc, &record));

        record.gst_document = Some(crate::onboarding::model::FileRef::new(
            "gst.pdf",
            "application/pdf",
            1024,
        ));
        assert!(is_step_complete(Step::Ekyc, &record));

        record.gst_number.clear();
        assert!(!is_step_complete(Step::Ekyc, &record));
    }

    #[test]
    fn company_and_director_steps() {
        let mut record = complete_record();
        assert!(is_step_complete(Step::CompanyDetails, &record));
        assert!(is_step_complete(Step::DirectorDetails, &record));

        record.pincode = "  ".into();
        assert!(!is_step_complete(Step::CompanyDetails, &record));

        record.designation.clear();
        assert!(!is_step_complete(Step::DirectorDetails, &record));

        assert!(is_step_complete(Step::Confirmation, &FormRecord::default()));
    }

    #[test]
    fn validation_reports_document_requirements() {
        let mut record = complete_record();
        record.is_pan_verified = false;
        record.pan_document_required = true;
        let issues = validate_step(Step::DirectorDetails, &record);
        assert_eq!(issues, vec![FieldIssue::new("panDocument", "PAN card upload required")]);

        record.is_gst_verified = false;
        record.gst_document_required = true;
        let issues = validate_step(Step::Ekyc, &record);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].field, "gstDocument");
    }

    #[test]
    fn validation_checks_formats() {
        let mut record = complete_record();
        record.pincode = "5600".into();
        record.aadhar_number = "1234-1234".into();
        assert_eq!(validate_step(Step::CompanyDetails, &record)[0].field, "pincode");
        assert_eq!(validate_step(Step::DirectorDetails, &record)[0].field, "aadharNumber");
    }

    #[test]
    fn email_format() {
        assert!(looks_like_email("a@b.com"));
        assert!(looks_like_email(" ops@acme.co.in "));
        assert!(!looks_like_email("a@b"));
        assert!(!looks_like_email("@b.com"));
        assert!(!looks_like_email("a b@c.com"));
        assert!(!looks_like_email("a@@b.com"));
    }

    #[test]
    fn resume_point_skips_complete_steps() {
        let mut record = complete_record();
        assert_eq!(resume_point(&record, Step::AccountVerification), Step::Confirmation);

        record.city.clear();
        assert_eq!(resume_point(&record, Step::AccountVerification), Step::CompanyDetails);
        // Never moves backwards from the saved step.
        assert_eq!(resume_point(&record, Step::DirectorDetails), Step::Confirmation);
    }
}
