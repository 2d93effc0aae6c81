use chrono::Utc;
use sqlx::SqliteConnection;

use crate::db_types::ConfigEntry;

pub async fn fetch_value(key: &str, conn: &mut SqliteConnection) -> Result<Option<String>, sqlx::Error> {
    sqlx::query_scalar("SELECT value FROM config WHERE key = $1").bind(key).fetch_optional(conn).await
}

pub async fn fetch_all(conn: &mut SqliteConnection) -> Result<Vec<ConfigEntry>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM config ORDER BY key").fetch_all(conn).await
}

pub async fn upsert(key: &str, value: &str, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
            INSERT INTO config (key, value, updated_at) VALUES ($1, $2, $3)
            ON CONFLICT (key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at;
        "#,
    )
    .bind(key)
    .bind(value)
    .bind(Utc::now())
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn insert_if_absent(key: &str, value: &str, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO config (key, value, updated_at) VALUES ($1, $2, $3) ON CONFLICT (key) DO NOTHING",
    )
    .bind(key)
    .bind(value)
    .bind(Utc::now())
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}
