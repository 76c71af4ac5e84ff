//! backup_snapshots persistence

use shared::models::BackupSnapshotMeta;
use sqlx::Executor;
use sqlx::sqlite::Sqlite;

pub async fn insert<'e, E>(
    exec: E,
    snapshot_type: &str,
    payload: &str,
    record_count: i64,
    created_by: &str,
    now: i64,
) -> Result<i64, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_scalar(
        "INSERT INTO backup_snapshots (snapshot_type, payload, record_count, created_at, created_by) VALUES (?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(snapshot_type)
    .bind(payload)
    .bind(record_count)
    .bind(now)
    .bind(created_by)
    .fetch_one(exec)
    .await
}

/// Newest first, payloads omitted
pub async fn list<'e, E>(exec: E) -> Result<Vec<BackupSnapshotMeta>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as(
        "SELECT id, snapshot_type, record_count, created_at, created_by FROM backup_snapshots ORDER BY id DESC",
    )
    .fetch_all(exec)
    .await
}

pub async fn find_meta<'e, E>(exec: E, id: i64) -> Result<Option<BackupSnapshotMeta>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as(
        "SELECT id, snapshot_type, record_count, created_at, created_by FROM backup_snapshots WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(exec)
    .await
}

/// Raw JSON payload of a snapshot
pub async fn find_payload<'e, E>(exec: E, id: i64) -> Result<Option<String>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_scalar("SELECT payload FROM backup_snapshots WHERE id = ?")
        .bind(id)
        .fetch_optional(exec)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::test_pool;

    #[tokio::test]
    async fn insert_then_read_back() {
        let pool = test_pool().await;
        let first = insert(&pool, "replace_all", "[]", 0, "ops", 1).await.unwrap();
        let second = insert(&pool, "replace_all", r#"[{"business_name":"A"}]"#, 1, "ops", 2)
            .await
            .unwrap();

        let metas = list(&pool).await.unwrap();
        assert_eq!(metas.iter().map(|m| m.id).collect::<Vec<_>>(), vec![second, first]);
        assert_eq!(find_meta(&pool, second).await.unwrap().unwrap().record_count, 1);
        assert_eq!(
            find_payload(&pool, second).await.unwrap().as_deref(),
            Some(r#"[{"business_name":"A"}]"#)
        );
        assert!(find_payload(&pool, 999).await.unwrap().is_none());
    }
}
