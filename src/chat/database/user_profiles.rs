use chrono::{DateTime, Utc};

use super::{Database, DatabaseError};
use crate::chat::types::{UserId, UserProfileSummary};

type Result<T> = std::result::Result<T, DatabaseError>;

#[derive(Debug)]
struct UserProfileRow {
    display_name: Option<String>,
    email: Option<String>,
    avatar_url: Option<String>,
}

impl<'r, R> sqlx::FromRow<'r, R> for UserProfileRow
where
    R: sqlx::Row,
    &'r str: sqlx::ColumnIndex<R>,
    String: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
{
    fn from_row(row: &'r R) -> std::result::Result<Self, sqlx::Error> {
        Ok(Self {
            display_name: row.try_get::<Option<String>, _>("display_name")?,
            email: row.try_get::<Option<String>, _>("email")?,
            avatar_url: row.try_get::<Option<String>, _>("avatar_url")?,
        })
    }
}

impl UserProfileSummary {
    pub(crate) async fn find_by_user_id(
        user_id: &UserId,
        database: &Database,
    ) -> Result<Option<UserProfileSummary>> {
        let row: Option<UserProfileRow> = sqlx::query_as(
            "SELECT display_name, email, avatar_url FROM user_profiles WHERE user_id = ?",
        )
        .bind(user_id.as_str())
        .fetch_optional(&database.pool)
        .await?;

        Ok(row.map(|row| UserProfileSummary::new(row.display_name, row.email, row.avatar_url)))
    }

    pub(crate) async fn save(
        &self,
        user_id: &UserId,
        updated_at: DateTime<Utc>,
        database: &Database,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO user_profiles (user_id, display_name, email, avatar_url, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(user_id) DO UPDATE SET
                 display_name = excluded.display_name,
                 email = excluded.email,
                 avatar_url = excluded.avatar_url,
                 updated_at = excluded.updated_at",
        )
        .bind(user_id.as_str())
        .bind(self.display_name.as_deref())
        .bind(self.email.as_deref())
        .bind(self.avatar_url.as_deref())
        .bind(updated_at.timestamp_millis())
        .execute(&database.pool)
        .await?;
        Ok(())
    }
}
