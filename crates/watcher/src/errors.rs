use thiserror::Error;
use watchtower_db::errors::DbError;

/// Errors surfaced by the [`Watcher`](crate::Watcher).
///
/// Capacity rejections and invalid breaches are regular outcomes, not errors.
#[derive(Debug, Error)]
pub enum WatcherError {
    #[error("persistence failed: {0}")]
    Db(#[from] DbError),
}

pub type WatcherResult<T> = Result<T, WatcherError>;
