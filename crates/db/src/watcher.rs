use async_trait::async_trait;
use watchtower_primitives::{
    appointment::{Appointment, AppointmentId},
    locator::Locator,
    types::BitcoinBlockHeight,
};

use crate::errors::DbResult;

/// Storage for everything the watcher needs to survive a restart.
///
/// Every method only fails on infrastructure errors. Deleting something that does not exist is
/// not an error.
#[async_trait]
pub trait WatcherDb: Send + Sync {
    async fn store_appointment(&self, id: AppointmentId, appointment: &Appointment)
        -> DbResult<()>;

    async fn delete_appointment(&self, id: AppointmentId) -> DbResult<()>;

    async fn load_appointment(&self, id: AppointmentId) -> DbResult<Option<Appointment>>;

    async fn load_all_appointments(&self) -> DbResult<Vec<(AppointmentId, Appointment)>>;

    async fn store_locator_index_entry(&self, locator: Locator, id: AppointmentId)
        -> DbResult<()>;

    async fn delete_locator_index_entry(
        &self,
        locator: Locator,
        id: AppointmentId,
    ) -> DbResult<()>;

    async fn load_locator_index_entry(&self, locator: Locator) -> DbResult<Vec<AppointmentId>>;

    async fn get_last_known_block_height(&self) -> DbResult<Option<BitcoinBlockHeight>>;

    async fn set_last_known_block_height(&self, height: BitcoinBlockHeight) -> DbResult<()>;
}
