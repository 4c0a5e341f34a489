//! The form model — single source of truth for the wizard's data.

use std::sync::Arc;

use tokio::sync::watch;

use super::autosave::Autosave;
use super::model::{FieldValue, FormPatch, FormRecord};

/// Holds the [`FormRecord`] and schedules an autosave after every write.
///
/// No validation happens here; steps validate their own fields.
pub struct FormModel {
    record: watch::Sender<FormRecord>,
    autosave: Arc<Autosave>,
}

impl FormModel {
    pub fn new(initial: FormRecord, autosave: Arc<Autosave>) -> Self {
        let (record, _rx) = watch::channel(initial);
        Self { record, autosave }
    }

    /// A copy of the current record.
    pub fn get(&self) -> FormRecord {
        self.record.borrow().clone()
    }

    /// Read the record without cloning it.
    pub fn with<R>(&self, f: impl FnOnce(&FormRecord) -> R) -> R {
        f(&self.record.borrow())
    }

    /// Observe changes to the record.
    pub fn subscribe(&self) -> watch::Receiver<FormRecord> {
        self.record.subscribe()
    }

    /// Write one field.
    pub fn set(&self, value: FieldValue) -> FormRecord {
        self.merge_with(|record| record.apply(value))
    }

    /// Write several fields at once.
    pub fn set_many(&self, patch: FormPatch) -> FormRecord {
        self.merge_with(|record| record.apply_patch(patch))
    }

    /// Apply an arbitrary update and schedule an autosave of the result.
    ///
    /// The autosave is queued while the record is still locked, so the
    /// writer sees updates in exactly the order they were made.
    pub fn merge_with(&self, f: impl FnOnce(&mut FormRecord)) -> FormRecord {
        let mut after = None;
        self.record.send_modify(|record| {
            f(record);
            self.autosave.record_changed(record.clone());
            after = Some(record.clone());
        });
        after.unwrap_or_default()
    }

    /// Restore initial values without persisting anything.
    pub fn reset(&self) {
        self.replace(FormRecord::default());
    }

    /// Replace the whole record without persisting (used when resuming).
    pub(crate) fn replace(&self, record: FormRecord) {
        self.record.send_replace(record);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;
    use uuid::Uuid;

    use super::*;
    use crate::clock::ManualClock;
    use crate::onboarding::model::storage_keys;
    use crate::onboarding::persist::PersistenceStore;
    use crate::onboarding::steps::Step;
    use crate::store::{MemoryStore, SnapshotStore};

    fn fixture() -> (Arc<MemoryStore>, Arc<Autosave>, FormModel) {
        let store = Arc::new(MemoryStore::new());
        let persistence = PersistenceStore::new(
            store.clone(),
            Arc::new(ManualClock::new(Utc::now())),
            Duration::from_secs(3600),
        );
        let autosave = Arc::new(Autosave::spawn(
            persistence,
            Duration::from_millis(50),
            Uuid::new_v4(),
            FormRecord::default(),
            Step::AccountVerification,
        ));
        let form = FormModel::new(FormRecord::default(), autosave.clone());
        (store, autosave, form)
    }

    #[tokio::test(start_paused = true)]
    async fn set_and_set_many_merge_last_write_wins() {
        let (store, autosave, form) = fixture();

        form.set(FieldValue::CompanyName("Acme".into()));
        form.set_many(FormPatch {
            company_name: Some("Acme Traders".into()),
            city: Some("Pune".into()),
            ..Default::default()
        });
        form.set(FieldValue::City("Mumbai".into()));
        form.set(FieldValue::Pincode("400001".into()));

        let record = form.get();
        assert_eq!(record.company_name, "Acme Traders");
        assert_eq!(record.city, "Mumbai");
        assert_eq!(record.pincode, "400001");

        autosave.flush().await;
        let raw = store
            .get(storage_keys::SESSION_SNAPSHOT)
            .await
            .unwrap()
            .unwrap();
        let saved: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(saved["record"]["companyName"], "Acme Traders");
        assert_eq!(saved["record"]["city"], "Mumbai");
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_does_not_schedule_a_write() {
        let (store, autosave, form) = fixture();
        form.set(FieldValue::Email("a@b.com".into()));
        autosave.flush().await;

        form.reset();
        autosave.flush().await;
        assert_eq!(store.write_count(), 1);
        assert_eq!(form.get(), FormRecord::default());
    }

    #[tokio::test]
    async fn subscribers_see_updates() {
        let (_store, _autosave, form) = fixture();
        let mut rx = form.subscribe();
        form.set(FieldValue::State("Goa".into()));
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().state, "Goa");
    }
}
