//! SQLite implementation of the persistent storage layer.

use std::future::Future;

use async_trait::async_trait;
use sqlx::SqlitePool;
use tokio::time::sleep;
use tracing::warn;
use watchtower_primitives::{
    appointment::{Appointment, AppointmentId},
    locator::Locator,
    types::BitcoinBlockHeight,
};

use super::{
    config::DbConfig,
    errors::StorageError,
    types::{AppointmentRow, DbAppointmentId, DbHeight, DbLocator},
};
use crate::{errors::DbResult, watcher::WatcherDb};

/// Runs `operation` until it succeeds, fails with a non-transient error or exhausts the retry
/// budget in `config`.
pub async fn execute_with_retries<F, Fut, T>(config: &DbConfig, mut operation: F) -> DbResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StorageError>>,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < config.max_retry_count() => {
                attempt += 1;
                warn!(
                    %err,
                    %attempt,
                    max_retries = %config.max_retry_count(),
                    "retrying database operation"
                );

                sleep(config.backoff_period()).await;
            }
            Err(err) => return Err(err.into()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SqliteDb {
    pool: SqlitePool,

    config: DbConfig,
}

impl SqliteDb {
    /// Creates a database handle with the default retry policy.
    ///
    /// The pool must already have the workspace migrations applied.
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_config(pool, DbConfig::default())
    }

    pub const fn with_config(pool: SqlitePool, config: DbConfig) -> Self {
        Self { pool, config }
    }
}

#[async_trait]
impl WatcherDb for SqliteDb {
    async fn store_appointment(
        &self,
        id: AppointmentId,
        appointment: &Appointment,
    ) -> DbResult<()> {
        let id = DbAppointmentId::from(id);
        let locator = DbLocator::from(appointment.locator);
        let encrypted_blob: &[u8] = &appointment.encrypted_blob;
        let start_time = DbHeight::try_from(appointment.start_time)?;
        let end_time = DbHeight::try_from(appointment.end_time)?;

        execute_with_retries(&self.config, || async move {
            let mut tx = self.pool.begin().await?;

            sqlx::query(
                "INSERT OR REPLACE INTO appointments
                    (id, locator, encrypted_blob, start_time, end_time)
                    VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(id)
            .bind(locator)
            .bind(encrypted_blob)
            .bind(start_time)
            .bind(end_time)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;

            Ok::<_, StorageError>(())
        })
        .await
    }

    async fn delete_appointment(&self, id: AppointmentId) -> DbResult<()> {
        let id = DbAppointmentId::from(id);

        execute_with_retries(&self.config, || async move {
            let mut tx = self.pool.begin().await?;

            sqlx::query("DELETE FROM appointments WHERE id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;

            Ok::<_, StorageError>(())
        })
        .await
    }

    async fn load_appointment(&self, id: AppointmentId) -> DbResult<Option<Appointment>> {
        let id = DbAppointmentId::from(id);

        let row = execute_with_retries(&self.config, || async move {
            let row = sqlx::query_as::<_, AppointmentRow>(
                "SELECT id, locator, encrypted_blob, start_time, end_time
                    FROM appointments
                    WHERE id = $1",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

            Ok::<_, StorageError>(row)
        })
        .await?;

        let appointment = row
            .map(<(AppointmentId, Appointment)>::try_from)
            .transpose()?
            .map(|(_, appointment)| appointment);

        Ok(appointment)
    }

    async fn load_all_appointments(&self) -> DbResult<Vec<(AppointmentId, Appointment)>> {
        let rows = execute_with_retries(&self.config, || async move {
            let rows = sqlx::query_as::<_, AppointmentRow>(
                "SELECT id, locator, encrypted_blob, start_time, end_time FROM appointments",
            )
            .fetch_all(&self.pool)
            .await?;

            Ok::<_, StorageError>(rows)
        })
        .await?;

        let appointments = rows
            .into_iter()
            .map(<(AppointmentId, Appointment)>::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(appointments)
    }

    async fn store_locator_index_entry(
        &self,
        locator: Locator,
        id: AppointmentId,
    ) -> DbResult<()> {
        let locator = DbLocator::from(locator);
        let id = DbAppointmentId::from(id);

        execute_with_retries(&self.config, || async move {
            let mut tx = self.pool.begin().await?;

            sqlx::query(
                "INSERT OR IGNORE INTO locator_index (locator, appointment_id) VALUES ($1, $2)",
            )
            .bind(locator)
            .bind(id)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;

            Ok::<_, StorageError>(())
        })
        .await
    }

    async fn delete_locator_index_entry(
        &self,
        locator: Locator,
        id: AppointmentId,
    ) -> DbResult<()> {
        let locator = DbLocator::from(locator);
        let id = DbAppointmentId::from(id);

        execute_with_retries(&self.config, || async move {
            let mut tx = self.pool.begin().await?;

            sqlx::query("DELETE FROM locator_index WHERE locator = $1 AND appointment_id = $2")
                .bind(locator)
                .bind(id)
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;

            Ok::<_, StorageError>(())
        })
        .await
    }

    async fn load_locator_index_entry(&self, locator: Locator) -> DbResult<Vec<AppointmentId>> {
        let locator = DbLocator::from(locator);

        let ids = execute_with_retries(&self.config, || async move {
            let ids = sqlx::query_scalar::<_, DbAppointmentId>(
                "SELECT appointment_id FROM locator_index
                    WHERE locator = $1
                    ORDER BY appointment_id",
            )
            .bind(locator)
            .fetch_all(&self.pool)
            .await?;

            Ok::<_, StorageError>(ids)
        })
        .await?;

        Ok(ids.into_iter().map(|id| *id).collect())
    }

    async fn get_last_known_block_height(&self) -> DbResult<Option<BitcoinBlockHeight>> {
        let height = execute_with_retries(&self.config, || async move {
            let height = sqlx::query_scalar::<_, DbHeight>(
                "SELECT height FROM last_known_block WHERE id = 0",
            )
            .fetch_optional(&self.pool)
            .await?;

            Ok::<_, StorageError>(height)
        })
        .await?;

        Ok(height.map(BitcoinBlockHeight::try_from).transpose()?)
    }

    async fn set_last_known_block_height(&self, height: BitcoinBlockHeight) -> DbResult<()> {
        let height = DbHeight::try_from(height)?;

        execute_with_retries(&self.config, || async move {
            let mut tx = self.pool.begin().await?;

            sqlx::query(
                "INSERT INTO last_known_block (id, height) VALUES (0, $1)
                    ON CONFLICT(id) DO UPDATE SET height = excluded.height",
            )
            .bind(height)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;

            Ok::<_, StorageError>(())
        })
        .await
    }
}
