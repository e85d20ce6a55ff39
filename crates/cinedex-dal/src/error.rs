use std::time::Duration;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Database unavailable: {0}")]
    Unavailable(sqlx::Error),

    #[error("Record not found: {0}")]
    RecordNotFound(String),

    #[error("Edit conflict on record {id}, version {version} is no longer current")]
    EditConflict { id: i64, version: i32 },

    #[error("Database operation exceeded its deadline of {0:?}")]
    DeadlineExceeded(Duration),

    #[error("Timed out waiting for a database connection")]
    AcquireTimeout,

    #[error("Validation failed: {0}")]
    Validation(#[from] garde::Report),

    #[error("Invalid order by field: {0}")]
    InvalidOrderByField(String),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl Error {
    /// Errors a caller may reasonably retry after backing off.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::DeadlineExceeded(_) | Error::AcquireTimeout | Error::Unavailable(_)
        )
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut => Error::AcquireTimeout,
            sqlx::Error::PoolClosed | sqlx::Error::WorkerCrashed | sqlx::Error::Io(_) => {
                Error::Unavailable(err)
            }
            err => Error::Database(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlx_error_mapping() {
        assert!(matches!(
            Error::from(sqlx::Error::PoolTimedOut),
            Error::AcquireTimeout
        ));
        assert_eq!(
            Error::from(sqlx::Error::PoolTimedOut).to_string(),
            "Timed out waiting for a database connection"
        );
        assert!(Error::AcquireTimeout.is_transient());
        assert!(matches!(
            Error::from(sqlx::Error::PoolClosed),
            Error::Unavailable(_)
        ));
        assert!(matches!(
            Error::from(sqlx::Error::RowNotFound),
            Error::Database(_)
        ));
        assert!(Error::from(sqlx::Error::PoolClosed).is_transient());
        assert!(!Error::RecordNotFound("Movie".into()).is_transient());
    }
}
