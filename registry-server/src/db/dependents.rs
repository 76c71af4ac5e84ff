//! Tables owned by other services that reference `business_info`
//!
//! Only the replace-all detach phase touches these.

use sqlx::SqliteConnection;

/// Referrers with a NOT NULL foreign key: their rows go with the business
const HARD_REFERRERS: &[&str] = &["estimate_history", "cost_adjustments"];

/// Referrers with a nullable foreign key: the reference is cleared
const SOFT_REFERRERS: &[&str] = &["calendar_events", "survey_cost_adjustments"];

const ACTIVE_IDS: &str = "SELECT id FROM business_info WHERE is_deleted = 0";

pub async fn delete_hard_referrers(conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
    let mut deleted = 0;
    for table in HARD_REFERRERS {
        let result = sqlx::query(&format!(
            "DELETE FROM {table} WHERE business_id IN ({ACTIVE_IDS})"
        ))
        .execute(&mut *conn)
        .await?;
        deleted += result.rows_affected();
    }
    Ok(deleted)
}

pub async fn unlink_soft_referrers(conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
    let mut unlinked = 0;
    for table in SOFT_REFERRERS {
        let result = sqlx::query(&format!(
            "UPDATE {table} SET business_id = NULL WHERE business_id IN ({ACTIVE_IDS})"
        ))
        .execute(&mut *conn)
        .await?;
        unlinked += result.rows_affected();
    }
    Ok(unlinked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{count, seed_business, test_pool};

    #[tokio::test]
    async fn hard_rows_deleted_soft_rows_unlinked() {
        let pool = test_pool().await;
        let id = seed_business(&pool, "A").await;
        for sql in [
            "INSERT INTO estimate_history (business_id, created_at) VALUES (?, 0)",
            "INSERT INTO cost_adjustments (business_id, created_at) VALUES (?, 0)",
            "INSERT INTO calendar_events (business_id, title, created_at) VALUES (?, 'visit', 0)",
            "INSERT INTO survey_cost_adjustments (business_id, created_at) VALUES (?, 0)",
        ] {
            sqlx::query(sql).bind(id).execute(&pool).await.unwrap();
        }

        let mut conn = pool.acquire().await.unwrap();
        assert_eq!(delete_hard_referrers(&mut conn).await.unwrap(), 2);
        assert_eq!(unlink_soft_referrers(&mut conn).await.unwrap(), 2);
        drop(conn);

        assert_eq!(count(&pool, "SELECT COUNT(*) FROM estimate_history").await, 0);
        assert_eq!(
            count(&pool, "SELECT COUNT(*) FROM calendar_events WHERE business_id IS NULL").await,
            1
        );
    }
}
