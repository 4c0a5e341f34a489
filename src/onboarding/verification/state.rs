//! Generic verification state machine.

use serde::Serialize;

/// Where one verification flow stands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum VerificationState<T> {
    Idle,
    Pending,
    Verified(T),
    Failed(String),
}

impl<T> Default for VerificationState<T> {
    fn default() -> Self {
        Self::Idle
    }
}

impl<T> VerificationState<T> {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    pub fn is_verified(&self) -> bool {
        matches!(self, Self::Verified(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// Verified or failed.
    pub fn is_resolved(&self) -> bool {
        self.is_verified() || self.is_failed()
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Pending => "pending",
            Self::Verified(_) => "verified",
            Self::Failed(_) => "failed",
        }
    }
}

/// Inputs to a flow's reducer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationEvent<T> {
    /// The user (or a field edit) started a check.
    Started,
    /// The registry accepted the input.
    Succeeded(T),
    /// The registry rejected the input, or the call failed.
    Rejected(String),
    /// The field the check was based on was edited.
    SourceEdited,
}

/// Pure transition function shared by the PAN and GST flows.
///
/// - `Started` moves `Idle`/`Failed` to `Pending`; a verified value stays
///   verified until its source is edited.
/// - Outcomes only land on `Pending`.
/// - `SourceEdited` always returns to `Idle`.
pub fn reduce<T>(state: VerificationState<T>, event: VerificationEvent<T>) -> VerificationState<T> {
    use VerificationEvent as E;
    use VerificationState as S;

    match (state, event) {
        (_, E::SourceEdited) => S::Idle,
        (S::Idle | S::Failed(_), E::Started) => S::Pending,
        (S::Pending, E::Succeeded(value)) => S::Verified(value),
        (S::Pending, E::Rejected(reason)) => S::Failed(reason),
        (state, _) => state,
    }
}
