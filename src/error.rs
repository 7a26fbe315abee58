use thiserror::Error;

/// Failures raised by the participant store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("a participant with email {0} already exists")]
    DuplicateEmail(String),

    #[error("no participant with email {0}")]
    NotFound(String),

    #[error("CSV must contain columns: name, email, age (missing: {})", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("invalid stored value: {0}")]
    Corrupt(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("database error: {0}")]
    Database(sqlx::Error),

    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Database(err)
    }
}

/// Maps a unique-constraint violation on insert to [`StoreError::DuplicateEmail`].
pub(crate) fn classify_insert(err: sqlx::Error, email: &str) -> StoreError {
    match err {
        sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
            StoreError::DuplicateEmail(email.to_string())
        }
        other => StoreError::Database(other),
    }
}
