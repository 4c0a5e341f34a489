//! Debounced snapshot writer.
//!
//! A single background task owns the latest `(record, step)` pair. Every
//! change pushes the write deadline back by `delay`; when the deadline
//! passes the latest pair is written once. There is never more than one
//! pending write, and since the task processes changes in the order they
//! were made, an older state can never overwrite a newer one.
//!
//! All store writes go through this task, including the final delete on
//! submission or reset. After a discard the writer is closed: changes are
//! ignored until the next seed, so a late edit or verification merge
//! cannot resurrect a cleared snapshot.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::StoreError;

use super::model::FormRecord;
use super::persist::PersistenceStore;
use super::steps::Step;

enum Command {
    Record(FormRecord),
    Step(Step),
    Seed {
        attempt_id: Uuid,
        record: FormRecord,
        step: Step,
    },
    Flush(oneshot::Sender<()>),
    Discard(oneshot::Sender<Result<(), StoreError>>),
}

/// The latest state the writer knows about.
struct Latest {
    attempt_id: Uuid,
    record: FormRecord,
    step: Step,
}

/// Handle to the single-slot, last-write-wins snapshot writer.
///
/// Dropping the handle lets the task write whatever is pending and exit.
pub struct Autosave {
    tx: mpsc::UnboundedSender<Command>,
}

impl Autosave {
    /// Spawn the writer task. Must be called inside a tokio runtime.
    pub fn spawn(
        persistence: PersistenceStore,
        delay: Duration,
        attempt_id: Uuid,
        record: FormRecord,
        step: Step,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let latest = Latest {
            attempt_id,
            record,
            step,
        };
        tokio::spawn(run(rx, persistence, delay, latest));
        Self { tx }
    }

    /// Schedule a write of `record`.
    pub fn record_changed(&self, record: FormRecord) {
        self.send(Command::Record(record));
    }

    /// Schedule a write of `step`.
    pub fn step_changed(&self, step: Step) {
        self.send(Command::Step(step));
    }

    /// Replace the known state without scheduling a write.
    pub fn seed(&self, attempt_id: Uuid, record: FormRecord, step: Step) {
        self.send(Command::Seed {
            attempt_id,
            record,
            step,
        });
    }

    /// Write any pending change now and wait for it.
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        self.send(Command::Flush(ack));
        let _ = done.await;
    }

    /// Drop any pending change, delete the stored snapshot and ignore
    /// further changes until the next [`seed`](Self::seed).
    pub async fn discard(&self) -> Result<(), StoreError> {
        let (ack, done) = oneshot::channel();
        self.send(Command::Discard(ack));
        done.await
            .unwrap_or_else(|_| Err(StoreError::Connection("autosave task stopped".into())))
    }

    fn send(&self, cmd: Command) {
        if self.tx.send(cmd).is_err() {
            warn!("Autosave task is not running; change not persisted");
        }
    }
}

async fn run(
    mut rx: mpsc::UnboundedReceiver<Command>,
    persistence: PersistenceStore,
    delay: Duration,
    mut latest: Latest,
) {
    let mut dirty = false;
    let mut closed = false;

    loop {
        let cmd = if dirty {
            tokio::select! {
                cmd = rx.recv() => cmd,
                _ = tokio::time::sleep(delay) => {
                    write(&persistence, &latest).await;
                    dirty = false;
                    continue;
                }
            }
        } else {
            rx.recv().await
        };

        match cmd {
            Some(Command::Record(_) | Command::Step(_)) if closed => {
                debug!(attempt_id = %latest.attempt_id, "Autosave closed; change ignored");
            }
            Some(Command::Record(record)) => {
                latest.record = record;
                dirty = true;
            }
            Some(Command::Step(step)) => {
                latest.step = step;
                dirty = true;
            }
            Some(Command::Seed {
                attempt_id,
                record,
                step,
            }) => {
                latest = Latest {
                    attempt_id,
                    record,
                    step,
                };
                dirty = false;
                closed = false;
            }
            Some(Command::Flush(ack)) => {
                if dirty {
                    write(&persistence, &latest).await;
                    dirty = false;
                }
                let _ = ack.send(());
            }
            Some(Command::Discard(ack)) => {
                dirty = false;
                closed = true;
                let _ = ack.send(persistence.clear().await);
            }
            None => {
                if dirty {
                    write(&persistence, &latest).await;
                }
                debug!("Autosave task exiting");
                break;
            }
        }
    }
}

async fn write(persistence: &PersistenceStore, latest: &Latest) {
    if let Err(e) = persistence
        .save(latest.attempt_id, &latest.record, latest.step)
        .await
    {
        // Losing an autosave only costs resumability; the session goes on.
        warn!(attempt_id = %latest.attempt_id, "Failed to autosave session: {}", e);
    }
}
