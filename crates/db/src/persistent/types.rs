//! Column-level types mapping the watcher's domain types onto SQLite.

use std::ops::Deref;

use sqlx::Sqlite;
use watchtower_primitives::{
    appointment::{Appointment, AppointmentId, EncryptedBlob},
    locator::Locator,
    types::BitcoinBlockHeight,
};

use super::errors::StorageError;

/// A [`Locator`] stored as hex `TEXT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct DbLocator(Locator);

impl Deref for DbLocator {
    type Target = Locator;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Locator> for DbLocator {
    fn from(value: Locator) -> Self {
        Self(value)
    }
}

impl sqlx::Type<Sqlite> for DbLocator {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <String as sqlx::Type<Sqlite>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, Sqlite> for DbLocator {
    fn decode(
        value: <Sqlite as sqlx::Database>::ValueRef<'r>,
    ) -> Result<Self, sqlx::error::BoxDynError> {
        let locator_hex: String = sqlx::decode::Decode::<'r, Sqlite>::decode(value)?;
        let locator = locator_hex
            .parse()
            .map_err(|_| sqlx::Error::Decode("Failed to decode Locator".into()))?;

        Ok(Self(locator))
    }
}

impl<'q> sqlx::Encode<'q, Sqlite> for DbLocator {
    fn encode_by_ref(
        &self,
        buf: &mut <Sqlite as sqlx::Database>::ArgumentBuffer<'q>,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        let locator_hex = self.0.to_string();

        sqlx::Encode::<'q, Sqlite>::encode_by_ref(&locator_hex, buf)
    }
}

/// An [`AppointmentId`] stored as `TEXT` in the simple uuid format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct DbAppointmentId(AppointmentId);

impl Deref for DbAppointmentId {
    type Target = AppointmentId;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<AppointmentId> for DbAppointmentId {
    fn from(value: AppointmentId) -> Self {
        Self(value)
    }
}

impl sqlx::Type<Sqlite> for DbAppointmentId {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <String as sqlx::Type<Sqlite>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, Sqlite> for DbAppointmentId {
    fn decode(
        value: <Sqlite as sqlx::Database>::ValueRef<'r>,
    ) -> Result<Self, sqlx::error::BoxDynError> {
        let id: String = sqlx::decode::Decode::<'r, Sqlite>::decode(value)?;
        let id = id
            .parse()
            .map_err(|_| sqlx::Error::Decode("Failed to decode AppointmentId".into()))?;

        Ok(Self(id))
    }
}

impl<'q> sqlx::Encode<'q, Sqlite> for DbAppointmentId {
    fn encode_by_ref(
        &self,
        buf: &mut <Sqlite as sqlx::Database>::ArgumentBuffer<'q>,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        let id = self.0.to_string();

        sqlx::Encode::<'q, Sqlite>::encode_by_ref(&id, buf)
    }
}

/// A block height. SQLite only has signed 64-bit integers, so heights above `i64::MAX` are
/// rejected instead of wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(transparent)]
pub(super) struct DbHeight(i64);

impl TryFrom<BitcoinBlockHeight> for DbHeight {
    type Error = StorageError;

    fn try_from(value: BitcoinBlockHeight) -> Result<Self, Self::Error> {
        i64::try_from(value)
            .map(Self)
            .map_err(|_| StorageError::MismatchedTypes(format!("height {value} exceeds i64")))
    }
}

impl TryFrom<DbHeight> for BitcoinBlockHeight {
    type Error = StorageError;

    fn try_from(value: DbHeight) -> Result<Self, Self::Error> {
        u64::try_from(value.0)
            .map_err(|_| StorageError::MismatchedTypes(format!("negative height {}", value.0)))
    }
}

/// A row of the `appointments` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub(super) struct AppointmentRow {
    pub(super) id: DbAppointmentId,
    pub(super) locator: DbLocator,
    pub(super) encrypted_blob: Vec<u8>,
    pub(super) start_time: DbHeight,
    pub(super) end_time: DbHeight,
}

impl TryFrom<AppointmentRow> for (AppointmentId, Appointment) {
    type Error = StorageError;

    fn try_from(row: AppointmentRow) -> Result<Self, Self::Error> {
        let appointment = Appointment::new(
            *row.locator,
            EncryptedBlob::new(row.encrypted_blob),
            row.start_time.try_into()?,
            row.end_time.try_into()?,
        );

        Ok((*row.id, appointment))
    }
}
