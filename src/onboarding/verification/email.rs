//! Email/OTP flow: state machine and resend cooldown.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};

use super::state::VerificationState;

/// Where the email flow stands.
///
/// `Requesting`, `CodeSent` and `Confirming` are the pending sub-states.
/// `AlreadySubmitted` is terminal for the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EmailState {
    Idle,
    Requesting {
        email: String,
        /// A code was already out before this request (resend).
        resend: bool,
    },
    CodeSent {
        email: String,
    },
    Confirming {
        email: String,
    },
    Verified {
        email: String,
    },
    AlreadySubmitted {
        message: String,
    },
}

impl Default for EmailState {
    fn default() -> Self {
        Self::Idle
    }
}

impl EmailState {
    /// A backend call is outstanding.
    pub fn in_flight(&self) -> bool {
        matches!(self, Self::Requesting { .. } | Self::Confirming { .. })
    }

    /// The email a code is out for, if any.
    pub fn pending_email(&self) -> Option<&str> {
        match self {
            Self::Requesting { email, .. } | Self::CodeSent { email } | Self::Confirming { email } => {
                Some(email)
            }
            _ => None,
        }
    }

    /// Collapse to the generic four-way view.
    pub fn view(&self) -> VerificationState<String> {
        match self {
            Self::Idle => VerificationState::Idle,
            Self::Requesting { .. } | Self::CodeSent { .. } | Self::Confirming { .. } => {
                VerificationState::Pending
            }
            Self::Verified { email } => VerificationState::Verified(email.clone()),
            Self::AlreadySubmitted { message } => VerificationState::Failed(message.clone()),
        }
    }
}

/// Inputs to [`reduce`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmailEvent {
    RequestStarted { email: String },
    CodeSent,
    RequestFailed,
    /// Backend says this email already completed onboarding.
    DuplicateFound { message: String },
    ConfirmStarted,
    Confirmed,
    ConfirmRejected,
    EmailEdited,
}

/// Pure transition function for the email flow.
pub fn reduce(state: EmailState, event: EmailEvent) -> EmailState {
    use EmailEvent as E;
    use EmailState as S;

    match (state, event) {
        (S::AlreadySubmitted { message }, _) => S::AlreadySubmitted { message },
        (_, E::EmailEdited) => S::Idle,
        (_, E::DuplicateFound { message }) => S::AlreadySubmitted { message },

        (S::Idle, E::RequestStarted { email }) => S::Requesting {
            email,
            resend: false,
        },
        (S::CodeSent { .. }, E::RequestStarted { email }) => S::Requesting {
            email,
            resend: true,
        },
        (S::Requesting { email, .. }, E::CodeSent) => S::CodeSent { email },
        (S::Requesting { email, resend }, E::RequestFailed) => {
            if resend {
                S::CodeSent { email }
            } else {
                S::Idle
            }
        }

        (S::CodeSent { email }, E::ConfirmStarted) => S::Confirming { email },
        (S::Confirming { email }, E::Confirmed) => S::Verified { email },
        (S::Confirming { email }, E::ConfirmRejected) => S::CodeSent { email },

        (state, _) => state,
    }
}

/// Counts down the seconds until another OTP may be requested.
///
/// Ticks once per second on a background task. Cancelling or dropping the
/// cooldown aborts the task and makes resending possible again.
pub struct ResendCooldown {
    remaining: Arc<watch::Sender<u32>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ResendCooldown {
    pub fn new() -> Self {
        let (remaining, _rx) = watch::channel(0);
        Self {
            remaining: Arc::new(remaining),
            task: Mutex::new(None),
        }
    }

    /// Restart the countdown from `duration` (rounded up to whole seconds).
    pub fn start(&self, duration: Duration) {
        self.abort_task();

        let secs = duration.as_secs() + u64::from(duration.subsec_nanos() > 0);
        let secs = u32::try_from(secs).unwrap_or(u32::MAX);
        self.remaining.send_replace(secs);
        if secs == 0 {
            return;
        }

        let remaining = Arc::clone(&self.remaining);
        let handle = tokio::spawn(async move {
            let period = Duration::from_secs(1);
            let mut ticker = interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                let mut finished = false;
                remaining.send_modify(|r| {
                    *r = r.saturating_sub(1);
                    finished = *r == 0;
                });
                if finished {
                    break;
                }
            }
        });

        if let Ok(mut task) = self.task.lock() {
            *task = Some(handle);
        }
    }

    /// Stop counting and allow an immediate resend.
    pub fn cancel(&self) {
        self.abort_task();
        self.remaining.send_replace(0);
    }

    pub fn remaining(&self) -> u32 {
        *self.remaining.borrow()
    }

    pub fn can_resend(&self) -> bool {
        self.remaining() == 0
    }

    /// Observe the countdown, e.g. to render "Resend in 12s".
    pub fn subscribe(&self) -> watch::Receiver<u32> {
        self.remaining.subscribe()
    }

    fn abort_task(&self) {
        if let Ok(mut task) = self.task.lock() {
            if let Some(handle) = task.take() {
                handle.abort();
            }
        }
    }
}

impl Default for ResendCooldown {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ResendCooldown {
    fn drop(&mut self) {
        self.abort_task();
    }
}
