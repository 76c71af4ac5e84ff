//! Pre-flight checks for destructive registry operations

use crate::db::photo;
use crate::error::ServiceResult;
use shared::error::{AppError, ErrorCode};
use sqlx::SqlitePool;

/// Refuse a replace-all while any non-deleted business has photos
pub async fn check_replace_all(pool: &SqlitePool) -> ServiceResult<()> {
    let entries = photo::guard_entries(pool).await?;
    if entries.is_empty() {
        return Ok(());
    }

    let total: i64 = entries.iter().map(|e| e.photo_count).sum();
    tracing::warn!(
        businesses = entries.len(),
        photo_count = total,
        "Replace-all blocked by photo guard"
    );
    Err(AppError::with_message(
        ErrorCode::PhotoGuardViolation,
        format!(
            "{} businesses have {total} registered photos; resend with force_replace to proceed",
            entries.len()
        ),
    )
    .with_detail("affected", serde_json::to_value(&entries)?)
    .with_detail("photo_count", total)
    .into())
}

/// Refuse a soft delete of a business that has photos
pub async fn check_delete(pool: &SqlitePool, business_id: i64, business_name: &str) -> ServiceResult<()> {
    let photo_count = photo::count_for_business(pool, business_id).await?;
    if photo_count == 0 {
        return Ok(());
    }

    Err(AppError::with_message(
        ErrorCode::PhotoGuardViolation,
        format!("{business_name} has {photo_count} registered photos; retry with force=true"),
    )
    .with_detail("business_name", business_name)
    .with_detail("photo_count", photo_count)
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{seed_business, seed_photos, test_pool};
    use crate::error::ServiceError;

    #[tokio::test]
    async fn replace_all_guard_lists_affected_businesses() {
        let pool = test_pool().await;
        let a = seed_business(&pool, "A").await;
        seed_business(&pool, "B").await;
        check_replace_all(&pool).await.unwrap();

        seed_photos(&pool, a, 2).await;
        let Err(ServiceError::App(err)) = check_replace_all(&pool).await else {
            panic!("guard should block");
        };
        assert_eq!(err.code, ErrorCode::PhotoGuardViolation);
        assert_eq!(err.detail("photo_count"), Some(&serde_json::json!(2)));
        assert_eq!(
            err.detail("affected"),
            Some(&serde_json::json!([{ "business_name": "A", "photo_count": 2 }]))
        );
    }

    #[tokio::test]
    async fn delete_guard_reports_photo_count() {
        let pool = test_pool().await;
        let a = seed_business(&pool, "A").await;
        check_delete(&pool, a, "A").await.unwrap();

        seed_photos(&pool, a, 1).await;
        let Err(ServiceError::App(err)) = check_delete(&pool, a, "A").await else {
            panic!("guard should block");
        };
        assert_eq!(err.detail("photo_count"), Some(&serde_json::json!(1)));
    }
}
