use chrono::{DateTime, Utc};
use sqlx::Row;

use super::DatabaseError;

/// Reads an INTEGER column holding milliseconds since the Unix epoch.
pub(crate) fn parse_timestamp<'r, R>(
    row: &'r R,
    column_name: &'r str,
) -> Result<DateTime<Utc>, sqlx::Error>
where
    R: Row,
    &'r str: sqlx::ColumnIndex<R>,
    i64: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
{
    let timestamp_ms: i64 = row.try_get(column_name)?;
    DateTime::from_timestamp_millis(timestamp_ms)
        .ok_or_else(|| create_column_decode_error(column_name, timestamp_ms))
}

/// Nullable variant of [`parse_timestamp`].
pub(crate) fn parse_optional_timestamp<'r, R>(
    row: &'r R,
    column_name: &'r str,
) -> Result<Option<DateTime<Utc>>, sqlx::Error>
where
    R: Row,
    &'r str: sqlx::ColumnIndex<R>,
    i64: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
{
    match row.try_get::<Option<i64>, _>(column_name)? {
        Some(timestamp_ms) => DateTime::from_timestamp_millis(timestamp_ms)
            .map(Some)
            .ok_or_else(|| create_column_decode_error(column_name, timestamp_ms)),
        None => Ok(None),
    }
}

pub(crate) fn datetime_from_millis(timestamp: i64) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::from_timestamp_millis(timestamp).ok_or(DatabaseError::InvalidTimestamp { timestamp })
}

fn create_column_decode_error(column_name: &str, timestamp: i64) -> sqlx::Error {
    sqlx::Error::ColumnDecode {
        index: column_name.to_string(),
        source: Box::new(DatabaseError::InvalidTimestamp { timestamp }),
    }
}
