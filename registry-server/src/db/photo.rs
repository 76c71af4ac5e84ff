//! business_photos lookups (read-only; photos are owned by the upload service)

use shared::models::PhotoGuardEntry;
use sqlx::Executor;
use sqlx::sqlite::Sqlite;
use std::collections::HashMap;

pub async fn count_for_business<'e, E>(exec: E, business_id: i64) -> Result<i64, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_scalar("SELECT COUNT(*) FROM business_photos WHERE business_id = ?")
        .bind(business_id)
        .fetch_one(exec)
        .await
}

/// Non-deleted businesses that have at least one registered photo
pub async fn guard_entries<'e, E>(exec: E) -> Result<Vec<PhotoGuardEntry>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as(
        "SELECT b.business_name, COUNT(p.id) AS photo_count FROM business_info b JOIN business_photos p ON p.business_id = b.id WHERE b.is_deleted = 0 GROUP BY b.id, b.business_name ORDER BY b.business_name",
    )
    .fetch_all(exec)
    .await
}

/// business id → photo count for every business with photos
pub async fn counts_by_business<'e, E>(exec: E) -> Result<HashMap<i64, i64>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows: Vec<(i64, i64)> =
        sqlx::query_as("SELECT business_id, COUNT(*) FROM business_photos GROUP BY business_id")
            .fetch_all(exec)
            .await?;
    Ok(rows.into_iter().collect())
}
