//! Company onboarding wizard.
//!
//! The wizard walks a user through five steps (account verification,
//! e-KYC, company details, director details, confirmation). A
//! [`WizardSession`] owns the form data, persists it as the user types so
//! the session can be resumed for up to a week, runs the email/PAN/GST
//! checks whose results fill in the form, and makes the final submission.

pub mod autosave;
pub mod form;
pub mod model;
pub mod persist;
pub mod session;
pub mod steps;
pub mod submission;
pub mod verification;

pub use form::FormModel;
pub use model::{FieldValue, FileRef, FormPatch, FormRecord};
pub use persist::{PersistenceStore, Snapshot};
pub use session::{FieldUpdate, WizardSession, WizardStatus};
pub use steps::{FieldIssue, Step, StepSequencer};
pub use submission::{Acknowledgements, SubmissionPayload, SubmissionStatus};
