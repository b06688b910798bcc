use rusqlite::ErrorCode;
use rusqlite::ffi;
use tracing::error;

use mozho_chat::StoreError;

/// Translate a SQLite failure into the store error the chat core understands.
pub fn store_error(e: rusqlite::Error) -> StoreError {
    if let Some(err) = e.sqlite_error() {
        match err.code {
            ErrorCode::ConstraintViolation => match err.extended_code {
                ffi::SQLITE_CONSTRAINT_FOREIGNKEY => return StoreError::MissingReference,
                ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                    return StoreError::Conflict;
                }
                _ => {}
            },
            ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => return StoreError::Timeout,
            _ => {}
        }
    }
    error!("SQLite error: {}", e);
    StoreError::Unavailable(e.to_string())
}

/// Wrap a column that failed to parse into our own types.
pub(crate) fn bad_column(column: usize, e: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_sqlite_errors_are_unavailable() {
        assert!(matches!(
            store_error(rusqlite::Error::QueryReturnedNoRows),
            StoreError::Unavailable(_)
        ));
    }
}
