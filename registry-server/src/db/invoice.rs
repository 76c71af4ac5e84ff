//! invoice_records persistence

use super::placeholders;
use shared::models::{InvoiceCreate, InvoiceRecord, InvoiceStage};
use shared::util::format_date;
use sqlx::sqlite::Sqlite;
use sqlx::{Executor, SqliteConnection};

const COLUMNS: &str = "id, business_id, stage, record_type, extra_title, issue_date, document_number, supply_amount, tax_amount, total_amount, payment_date, payment_amount, payment_memo, parent_record_id, revised_reason, created_at, updated_at, created_by, updated_by";

pub async fn find_by_id<'e, E>(exec: E, id: i64) -> Result<Option<InvoiceRecord>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as(&format!("SELECT {COLUMNS} FROM invoice_records WHERE id = ?"))
        .bind(id)
        .fetch_optional(exec)
        .await
}

pub async fn list_for_business<'e, E>(
    exec: E,
    business_id: i64,
) -> Result<Vec<InvoiceRecord>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as(&format!(
        "SELECT {COLUMNS} FROM invoice_records WHERE business_id = ? ORDER BY id"
    ))
    .bind(business_id)
    .fetch_all(exec)
    .await
}

pub async fn list_for_business_stage<'e, E>(
    exec: E,
    business_id: i64,
    stage: InvoiceStage,
) -> Result<Vec<InvoiceRecord>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as(&format!(
        "SELECT {COLUMNS} FROM invoice_records WHERE business_id = ? AND stage = ? ORDER BY id"
    ))
    .bind(business_id)
    .bind(stage)
    .fetch_all(exec)
    .await
}

/// Records of every non-deleted business
pub async fn list_for_active<'e, E>(exec: E) -> Result<Vec<InvoiceRecord>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as(&format!(
        "SELECT {COLUMNS} FROM invoice_records WHERE business_id IN (SELECT id FROM business_info WHERE is_deleted = 0) ORDER BY business_id, id"
    ))
    .fetch_all(exec)
    .await
}

/// The active original of a canonical stage, or of an extra title
pub async fn find_active_original<'e, E>(
    exec: E,
    business_id: i64,
    stage: InvoiceStage,
    extra_title: Option<&str>,
) -> Result<Option<i64>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    match extra_title {
        Some(title) if stage == InvoiceStage::Extra => {
            sqlx::query_scalar(
                "SELECT id FROM invoice_records WHERE business_id = ? AND stage = 'extra' AND record_type = 'original' AND extra_title = ?",
            )
            .bind(business_id)
            .bind(title)
            .fetch_optional(exec)
            .await
        }
        _ => {
            sqlx::query_scalar(
                "SELECT id FROM invoice_records WHERE business_id = ? AND stage = ? AND record_type = 'original'",
            )
            .bind(business_id)
            .bind(stage)
            .fetch_optional(exec)
            .await
        }
    }
}

pub async fn insert<'e, E>(
    exec: E,
    business_id: i64,
    payload: &InvoiceCreate,
    total_amount: i64,
    actor: &str,
    now: i64,
) -> Result<i64, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_scalar(
        "INSERT INTO invoice_records (business_id, stage, record_type, extra_title, issue_date, document_number, supply_amount, tax_amount, total_amount, payment_date, payment_amount, payment_memo, parent_record_id, revised_reason, created_at, updated_at, created_by, updated_by) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(business_id)
    .bind(payload.stage)
    .bind(payload.record_type)
    .bind(&payload.extra_title)
    .bind(payload.issue_date.map(format_date))
    .bind(&payload.document_number)
    .bind(payload.supply_amount)
    .bind(payload.tax_amount)
    .bind(total_amount)
    .bind(payload.payment_date.map(format_date))
    .bind(payload.payment_amount)
    .bind(&payload.payment_memo)
    .bind(payload.parent_record_id)
    .bind(&payload.revised_reason)
    .bind(now)
    .bind(now)
    .bind(actor)
    .bind(actor)
    .fetch_one(exec)
    .await
}

/// Write back the mutable columns of `record`.
///
/// With `expected_updated_at` the write only lands if the stored row still
/// carries that timestamp; zero affected rows then means a stale write.
pub async fn update<'e, E>(
    exec: E,
    record: &InvoiceRecord,
    expected_updated_at: Option<i64>,
) -> Result<u64, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        "UPDATE invoice_records SET extra_title = ?, issue_date = ?, document_number = ?, supply_amount = ?, tax_amount = ?, total_amount = ?, \
         payment_date = ?, payment_amount = ?, payment_memo = ?, revised_reason = ?, updated_at = ?, updated_by = ? \
         WHERE id = ? AND (? IS NULL OR updated_at = ?)",
    )
    .bind(&record.extra_title)
    .bind(&record.issue_date)
    .bind(&record.document_number)
    .bind(record.supply_amount)
    .bind(record.tax_amount)
    .bind(record.total_amount)
    .bind(&record.payment_date)
    .bind(record.payment_amount)
    .bind(&record.payment_memo)
    .bind(&record.revised_reason)
    .bind(record.updated_at)
    .bind(&record.updated_by)
    .bind(record.id)
    .bind(expected_updated_at)
    .bind(expected_updated_at)
    .execute(exec)
    .await?;
    Ok(result.rows_affected())
}

/// Mark one record cancelled; returns 0 if it already was
pub async fn set_cancelled<'e, E>(exec: E, id: i64, actor: &str, now: i64) -> Result<u64, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        "UPDATE invoice_records SET record_type = 'cancelled', updated_at = ?, updated_by = ? WHERE id = ? AND record_type <> 'cancelled'",
    )
    .bind(now)
    .bind(actor)
    .bind(id)
    .execute(exec)
    .await?;
    Ok(result.rows_affected())
}

/// Hard-delete a set of records in one statement (parent links included)
pub async fn delete_ids(conn: &mut SqliteConnection, ids: &[i64]) -> Result<u64, sqlx::Error> {
    if ids.is_empty() {
        return Ok(0);
    }
    let sql = format!(
        "DELETE FROM invoice_records WHERE id IN ({})",
        placeholders(ids.len())
    );
    let mut query = sqlx::query(&sql);
    for id in ids {
        query = query.bind(*id);
    }
    Ok(query.execute(&mut *conn).await?.rows_affected())
}

/// Replace-all detach: every record of a non-deleted business
pub async fn delete_for_active(conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "DELETE FROM invoice_records WHERE business_id IN (SELECT id FROM business_info WHERE is_deleted = 0)",
    )
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}
