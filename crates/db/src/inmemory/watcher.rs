use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::trace;
use watchtower_primitives::{
    appointment::{Appointment, AppointmentId},
    locator::Locator,
    types::BitcoinBlockHeight,
};

use crate::{errors::DbResult, watcher::WatcherDb};

/// In-memory database for the watcher.
///
/// Everything is lost when the process exits, so this is only suitable for tests and towers that
/// do not need to survive a restart.
#[derive(Debug, Default, Clone)]
pub struct WatcherInMemory {
    /// id -> appointment
    appointments: Arc<RwLock<HashMap<AppointmentId, Appointment>>>,

    /// locator -> ids of the appointments registered under it
    locator_index: Arc<RwLock<HashMap<Locator, BTreeSet<AppointmentId>>>>,

    last_known_block_height: Arc<RwLock<Option<BitcoinBlockHeight>>>,
}

#[async_trait]
impl WatcherDb for WatcherInMemory {
    async fn store_appointment(
        &self,
        id: AppointmentId,
        appointment: &Appointment,
    ) -> DbResult<()> {
        trace!(action = "trying to acquire wlock on appointments", %id);
        let mut appointments = self.appointments.write().await;
        trace!(event = "acquired wlock on appointments", %id);

        appointments.insert(id, appointment.clone());

        Ok(())
    }

    async fn delete_appointment(&self, id: AppointmentId) -> DbResult<()> {
        self.appointments.write().await.remove(&id);

        Ok(())
    }

    async fn load_appointment(&self, id: AppointmentId) -> DbResult<Option<Appointment>> {
        Ok(self.appointments.read().await.get(&id).cloned())
    }

    async fn load_all_appointments(&self) -> DbResult<Vec<(AppointmentId, Appointment)>> {
        let appointments = self.appointments.read().await;

        Ok(appointments
            .iter()
            .map(|(id, appointment)| (*id, appointment.clone()))
            .collect())
    }

    async fn store_locator_index_entry(
        &self,
        locator: Locator,
        id: AppointmentId,
    ) -> DbResult<()> {
        trace!(action = "trying to acquire wlock on locator index", %locator, %id);
        let mut index = self.locator_index.write().await;
        trace!(event = "acquired wlock on locator index", %locator, %id);

        index.entry(locator).or_default().insert(id);

        Ok(())
    }

    async fn delete_locator_index_entry(
        &self,
        locator: Locator,
        id: AppointmentId,
    ) -> DbResult<()> {
        let mut index = self.locator_index.write().await;

        if let Some(ids) = index.get_mut(&locator) {
            ids.remove(&id);

            if ids.is_empty() {
                index.remove(&locator);
            }
        }

        Ok(())
    }

    async fn load_locator_index_entry(&self, locator: Locator) -> DbResult<Vec<AppointmentId>> {
        Ok(self
            .locator_index
            .read()
            .await
            .get(&locator)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default())
    }

    async fn get_last_known_block_height(&self) -> DbResult<Option<BitcoinBlockHeight>> {
        Ok(*self.last_known_block_height.read().await)
    }

    async fn set_last_known_block_height(&self, height: BitcoinBlockHeight) -> DbResult<()> {
        *self.last_known_block_height.write().await = Some(height);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use watchtower_test_utils::prelude::*;

    use super::*;

    #[tokio::test]
    async fn test_appointments_round_trip() {
        let db = WatcherInMemory::default();
        let id = AppointmentId::new_random();
        let appointment = generate_appointment();

        assert!(
            db.load_appointment(id).await.is_ok_and(|v| v.is_none()),
            "appointment must not exist initially"
        );

        db.store_appointment(id, &appointment)
            .await
            .expect("must be able to store appointment");
        assert!(
            db.load_appointment(id)
                .await
                .is_ok_and(|v| v == Some(appointment.clone())),
            "appointment must exist after storing"
        );
        assert!(
            db.load_all_appointments()
                .await
                .is_ok_and(|v| v == vec![(id, appointment)]),
            "appointment must be listed"
        );

        db.delete_appointment(id)
            .await
            .expect("must be able to delete appointment");
        db.delete_appointment(id)
            .await
            .expect("deleting twice must not fail");
        assert!(
            db.load_appointment(id).await.is_ok_and(|v| v.is_none()),
            "appointment must be gone after deleting"
        );
    }

    #[tokio::test]
    async fn test_locator_index_drops_empty_sets() {
        let db = WatcherInMemory::default();
        let locator = generate_locator();
        let first = AppointmentId::new_random();
        let second = AppointmentId::new_random();

        db.store_locator_index_entry(locator, first)
            .await
            .expect("must be able to store index entry");
        db.store_locator_index_entry(locator, second)
            .await
            .expect("must be able to store index entry");
        assert!(
            db.load_locator_index_entry(locator)
                .await
                .is_ok_and(|v| v.len() == 2),
            "both ids must be indexed"
        );

        db.delete_locator_index_entry(locator, first)
            .await
            .expect("must be able to delete index entry");
        db.delete_locator_index_entry(locator, second)
            .await
            .expect("must be able to delete index entry");

        assert!(
            db.load_locator_index_entry(locator)
                .await
                .is_ok_and(|v| v.is_empty()),
            "index must be empty"
        );
        assert!(db.locator_index.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_last_known_block_height() {
        let db = WatcherInMemory::default();

        assert!(db
            .get_last_known_block_height()
            .await
            .is_ok_and(|v| v.is_none()));

        db.set_last_known_block_height(42)
            .await
            .expect("must be able to set height");

        assert!(db
            .get_last_known_block_height()
            .await
            .is_ok_and(|v| v == Some(42)));
    }
}
