//! Invoice-stage ledger
//!
//! Issuance/payment records per business and stage. Canonical stages allow
//! one active original; revisions chain off it and supersede its total.
//! Every canonical-stage write mirrors the stage's effective values into the
//! business row in the same transaction.

pub mod receivable;

use crate::db::{business, invoice};
use crate::error::{ServiceResult, is_unique_violation};
use receivable::{chains, root_of, stage_effective};
use shared::error::{AppError, ErrorCode};
use shared::models::{
    BusinessReceivables, FieldValue, InvoiceCreate, InvoiceRecord, InvoiceStage, InvoiceUpdate,
    ReceivableSummary, RecordType,
};
use shared::util::{format_date, now_millis, parse_stored_date};
use sqlx::{Connection, SqliteConnection, SqlitePool};
use std::collections::HashMap;
use validator::Validate;

/// Minimum permission level for deleting extra records
pub const DELETE_PERMISSION_LEVEL: i32 = 3;

fn validate<T: Validate>(payload: &T) -> Result<(), AppError> {
    payload
        .validate()
        .map_err(|e| AppError::validation(e.to_string()))
}

/// `supply + tax`, refusing totals that leave `i64`
fn total_of(supply: i64, tax: i64) -> Result<i64, AppError> {
    supply.checked_add(tax).ok_or_else(|| {
        AppError::with_message(ErrorCode::ValueOutOfRange, "Invoice total exceeds the supported range")
    })
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|s| !s.is_empty()).map(String::from)
}

async fn require_business(pool: &SqlitePool, business_id: i64) -> ServiceResult<()> {
    business::find_by_id(pool, business_id)
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::BusinessNotFound))?;
    Ok(())
}

async fn require_record(pool: &SqlitePool, id: i64) -> ServiceResult<InvoiceRecord> {
    Ok(invoice::find_by_id(pool, id)
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::InvoiceNotFound))?)
}

/// Write the stage's effective values into the business row's mirror columns
async fn mirror_stage(
    conn: &mut SqliteConnection,
    business_id: i64,
    stage: InvoiceStage,
    actor: &str,
    now: i64,
) -> ServiceResult<()> {
    let Some(cols) = stage.business_columns() else {
        return Ok(());
    };
    let records = invoice::list_for_business_stage(&mut *conn, business_id, stage).await?;
    let values = stage_effective(&records)?.unwrap_or_default();

    let fields = [
        (
            cols.invoice_date,
            FieldValue::Date(values.issue_date.as_deref().and_then(parse_stored_date)),
        ),
        (cols.invoice_amount, FieldValue::Int(Some(values.total_amount))),
        (
            cols.payment_date,
            FieldValue::Date(values.payment_date.as_deref().and_then(parse_stored_date)),
        ),
        (
            cols.payment_amount,
            FieldValue::Int(Some(values.payment_amount.unwrap_or(0))),
        ),
    ];
    business::update_fields(&mut *conn, business_id, None, &fields, None, actor, now).await?;
    tracing::debug!(business_id, stage = %stage, total = values.total_amount, "Stage mirrored to business row");
    Ok(())
}

pub async fn list(pool: &SqlitePool, business_id: i64) -> ServiceResult<Vec<InvoiceRecord>> {
    require_business(pool, business_id).await?;
    Ok(invoice::list_for_business(pool, business_id).await?)
}

/// Record an original or a revision
pub async fn create(
    pool: &SqlitePool,
    business_id: i64,
    mut payload: InvoiceCreate,
    actor: &str,
) -> ServiceResult<InvoiceRecord> {
    validate(&payload)?;
    require_business(pool, business_id).await?;

    payload.extra_title = non_empty(payload.extra_title.as_deref());
    match payload.record_type {
        RecordType::Original => check_new_original(pool, business_id, &payload).await?,
        RecordType::Revised => check_revision(pool, business_id, &mut payload).await?,
        RecordType::Cancelled => {
            return Err(AppError::with_message(
                ErrorCode::InvalidRecordType,
                "Use the cancel endpoint to cancel a record",
            )
            .into());
        }
    }

    let now = now_millis();
    let total = total_of(payload.supply_amount, payload.tax_amount)?;
    let mut conn = pool.acquire().await?;
    let mut tx = conn.begin().await?;
    let id = match invoice::insert(&mut *tx, business_id, &payload, total, actor, now).await {
        Ok(id) => id,
        Err(e) if is_unique_violation(&e) => {
            return Err(AppError::new(ErrorCode::InvoiceStageExists).into());
        }
        Err(e) => return Err(e.into()),
    };
    mirror_stage(&mut tx, business_id, payload.stage, actor, now).await?;
    let record = invoice::find_by_id(&mut *tx, id)
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::InvoiceNotFound))?;
    tx.commit().await?;

    tracing::info!(
        business_id,
        invoice_id = id,
        stage = %payload.stage,
        record_type = ?payload.record_type,
        total_amount = total,
        actor = %actor,
        "Invoice record created"
    );
    Ok(record)
}

async fn check_new_original(
    pool: &SqlitePool,
    business_id: i64,
    payload: &InvoiceCreate,
) -> ServiceResult<()> {
    if payload.stage == InvoiceStage::Extra && payload.extra_title.is_none() {
        return Err(AppError::new(ErrorCode::ExtraTitleRequired).into());
    }
    let existing = invoice::find_active_original(
        pool,
        business_id,
        payload.stage,
        payload.extra_title.as_deref(),
    )
    .await?;
    if let Some(existing_id) = existing {
        return Err(AppError::new(ErrorCode::InvoiceStageExists)
            .with_detail("existing_id", existing_id)
            .into());
    }
    Ok(())
}

/// A revision needs a live parent in a live chain of the same business and
/// stage, and a reason. Extra revisions inherit the chain's title.
async fn check_revision(
    pool: &SqlitePool,
    business_id: i64,
    payload: &mut InvoiceCreate,
) -> ServiceResult<()> {
    if non_empty(payload.revised_reason.as_deref()).is_none() {
        return Err(AppError::new(ErrorCode::RevisedReasonRequired).into());
    }
    let parent_id = payload
        .parent_record_id
        .ok_or_else(|| AppError::with_message(ErrorCode::InvoiceParentInvalid, "parent_record_id is required"))?;

    let stage_records = invoice::list_for_business_stage(pool, business_id, payload.stage).await?;
    let by_id: HashMap<i64, &InvoiceRecord> = stage_records.iter().map(|r| (r.id, r)).collect();
    let parent = by_id
        .get(&parent_id)
        .ok_or_else(|| AppError::new(ErrorCode::InvoiceParentInvalid).with_detail("parent_record_id", parent_id))?;
    if parent.record_type == RecordType::Cancelled {
        return Err(AppError::with_message(ErrorCode::InvoiceParentInvalid, "Parent record is cancelled").into());
    }
    let root_id = root_of(&by_id, parent_id);
    if by_id
        .get(&root_id)
        .is_some_and(|root| root.record_type == RecordType::Cancelled)
    {
        return Err(AppError::with_message(ErrorCode::InvoiceParentInvalid, "Invoice chain is cancelled").into());
    }

    if payload.stage == InvoiceStage::Extra && payload.extra_title.is_none() {
        payload.extra_title = by_id.get(&root_id).and_then(|r| r.extra_title.clone());
    }
    Ok(())
}

/// Amend issuance/payment fields of a live record
pub async fn update(
    pool: &SqlitePool,
    id: i64,
    payload: InvoiceUpdate,
    actor: &str,
) -> ServiceResult<InvoiceRecord> {
    validate(&payload)?;
    let mut record = require_record(pool, id).await?;
    if record.record_type == RecordType::Cancelled {
        return Err(AppError::new(ErrorCode::InvoiceAlreadyCancelled).into());
    }

    if let Some(title) = payload.extra_title.as_deref()
        && record.stage == InvoiceStage::Extra
    {
        record.extra_title =
            Some(non_empty(Some(title)).ok_or_else(|| AppError::new(ErrorCode::ExtraTitleRequired))?);
    }
    if let Some(reason) = payload.revised_reason.as_deref() {
        let reason = non_empty(Some(reason));
        if record.record_type == RecordType::Revised && reason.is_none() {
            return Err(AppError::new(ErrorCode::RevisedReasonRequired).into());
        }
        record.revised_reason = reason;
    }
    if let Some(date) = payload.issue_date {
        record.issue_date = Some(format_date(date));
    }
    if let Some(doc) = payload.document_number {
        record.document_number = Some(doc);
    }
    if let Some(supply) = payload.supply_amount {
        record.supply_amount = supply;
    }
    if let Some(tax) = payload.tax_amount {
        record.tax_amount = tax;
    }
    if let Some(date) = payload.payment_date {
        record.payment_date = Some(format_date(date));
    }
    if let Some(amount) = payload.payment_amount {
        record.payment_amount = Some(amount);
    }
    if let Some(memo) = payload.payment_memo {
        record.payment_memo = Some(memo);
    }
    record.total_amount = total_of(record.supply_amount, record.tax_amount)?;
    let now = now_millis();
    record.updated_at = now;
    record.updated_by = Some(actor.to_string());

    let mut conn = pool.acquire().await?;
    let mut tx = conn.begin().await?;
    let affected = match invoice::update(&mut *tx, &record, payload.expected_updated_at).await {
        Ok(n) => n,
        Err(e) if is_unique_violation(&e) => {
            return Err(AppError::new(ErrorCode::InvoiceStageExists).into());
        }
        Err(e) => return Err(e.into()),
    };
    if affected == 0 {
        tracing::warn!(invoice_id = id, expected = ?payload.expected_updated_at, "Stale invoice write rejected");
        return Err(AppError::new(ErrorCode::InvoiceStaleWrite).into());
    }
    mirror_stage(&mut tx, record.business_id, record.stage, actor, now).await?;
    tx.commit().await?;

    tracing::info!(invoice_id = id, total_amount = record.total_amount, actor = %actor, "Invoice record updated");
    Ok(record)
}

/// Take a record out of the totals without deleting it
pub async fn cancel(pool: &SqlitePool, id: i64, actor: &str) -> ServiceResult<InvoiceRecord> {
    let record = require_record(pool, id).await?;
    if record.record_type == RecordType::Cancelled {
        return Err(AppError::new(ErrorCode::InvoiceAlreadyCancelled).into());
    }

    let now = now_millis();
    let mut conn = pool.acquire().await?;
    let mut tx = conn.begin().await?;
    if invoice::set_cancelled(&mut *tx, id, actor, now).await? == 0 {
        return Err(AppError::new(ErrorCode::InvoiceAlreadyCancelled).into());
    }
    mirror_stage(&mut tx, record.business_id, record.stage, actor, now).await?;
    let cancelled = invoice::find_by_id(&mut *tx, id)
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::InvoiceNotFound))?;
    tx.commit().await?;

    tracing::info!(
        target: "audit",
        invoice_id = id,
        business_id = record.business_id,
        stage = %record.stage,
        actor = %actor,
        "Invoice record cancelled"
    );
    Ok(cancelled)
}

/// Hard-delete an extra record together with its whole chain
pub async fn delete(
    pool: &SqlitePool,
    id: i64,
    actor: &str,
    permission_level: i32,
) -> ServiceResult<u64> {
    if permission_level < DELETE_PERMISSION_LEVEL {
        return Err(AppError::permission_denied(format!(
            "Deleting invoice records requires permission level {DELETE_PERMISSION_LEVEL}"
        ))
        .into());
    }
    let record = require_record(pool, id).await?;
    if record.stage != InvoiceStage::Extra {
        return Err(AppError::new(ErrorCode::InvoiceDeleteNotAllowed).into());
    }

    let stage_records =
        invoice::list_for_business_stage(pool, record.business_id, InvoiceStage::Extra).await?;
    let by_id: HashMap<i64, &InvoiceRecord> = stage_records.iter().map(|r| (r.id, r)).collect();
    let root_id = root_of(&by_id, id);
    let ids: Vec<i64> = chains(&stage_records)
        .into_iter()
        .find(|c| c.root.id == root_id)
        .map(|c| c.members.iter().map(|r| r.id).collect())
        .unwrap_or_else(|| vec![id]);

    let mut conn = pool.acquire().await?;
    let mut tx = conn.begin().await?;
    let deleted = invoice::delete_ids(&mut tx, &ids).await?;
    tx.commit().await?;

    tracing::info!(
        target: "audit",
        invoice_id = id,
        business_id = record.business_id,
        deleted,
        actor = %actor,
        "Extra invoice chain deleted"
    );
    Ok(deleted)
}

pub async fn business_receivables(
    pool: &SqlitePool,
    business_id: i64,
) -> ServiceResult<BusinessReceivables> {
    let record = business::find_by_id(pool, business_id)
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::BusinessNotFound))?;
    let records = invoice::list_for_business(pool, business_id).await?;
    Ok(receivable::business_receivables(&record, &records)?)
}

pub async fn summary(pool: &SqlitePool) -> ServiceResult<ReceivableSummary> {
    let businesses = business::all_active(pool).await?;
    let records = invoice::list_for_active(pool).await?;
    Ok(receivable::summarize(&businesses, &records)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{count, seed_business, test_pool};
    use crate::error::ServiceError;
    use chrono::NaiveDate;

    fn payload(stage: InvoiceStage, supply: i64, tax: i64) -> InvoiceCreate {
        InvoiceCreate {
            stage,
            record_type: RecordType::Original,
            extra_title: None,
            issue_date: NaiveDate::from_ymd_opt(2024, 4, 1),
            document_number: Some("2024-0001".into()),
            supply_amount: supply,
            tax_amount: tax,
            payment_date: None,
            payment_amount: None,
            payment_memo: None,
            parent_record_id: None,
            revised_reason: None,
        }
    }

    fn code(err: ServiceError) -> ErrorCode {
        match err {
            ServiceError::App(e) => e.code,
            ServiceError::Db(e) => panic!("unexpected db error: {e}"),
        }
    }

    #[tokio::test]
    async fn revision_flow_updates_receivable_and_mirror() {
        let pool = test_pool().await;
        let biz = seed_business(&pool, "A").await;

        let mut first = payload(InvoiceStage::Subsidy1st, 100_000, 10_000);
        first.payment_amount = Some(60_000);
        first.payment_date = NaiveDate::from_ymd_opt(2024, 4, 20);
        let original = create(&pool, biz, first, "kim").await.unwrap();
        assert_eq!(original.total_amount, 110_000);

        let r = business_receivables(&pool, biz).await.unwrap();
        assert_eq!(r.subsidy_subtotal, 50_000);

        let mut rev = payload(InvoiceStage::Subsidy1st, 150_000, 15_000);
        rev.record_type = RecordType::Revised;
        rev.parent_record_id = Some(original.id);
        rev.revised_reason = Some("단가 변경".into());
        create(&pool, biz, rev, "kim").await.unwrap();

        let r = business_receivables(&pool, biz).await.unwrap();
        assert_eq!(r.subsidy_subtotal, 105_000);

        let row = business::find_by_id(&pool, biz).await.unwrap().unwrap();
        assert_eq!(row.int("invoice_1st_amount"), Some(165_000));
        assert_eq!(row.int("payment_1st_amount"), Some(60_000));
        assert_eq!(row.date("payment_1st_date"), NaiveDate::from_ymd_opt(2024, 4, 20));
    }

    #[tokio::test]
    async fn duplicate_original_and_missing_title_are_rejected() {
        let pool = test_pool().await;
        let biz = seed_business(&pool, "A").await;
        create(&pool, biz, payload(InvoiceStage::SelfAdvance, 10, 1), "u")
            .await
            .unwrap();
        let err = create(&pool, biz, payload(InvoiceStage::SelfAdvance, 20, 2), "u")
            .await
            .unwrap_err();
        assert_eq!(code(err), ErrorCode::InvoiceStageExists);

        let err = create(&pool, biz, payload(InvoiceStage::Extra, 20, 2), "u")
            .await
            .unwrap_err();
        assert_eq!(code(err), ErrorCode::ExtraTitleRequired);

        let mut extra = payload(InvoiceStage::Extra, 20, 2);
        extra.extra_title = Some("배관".into());
        create(&pool, biz, extra.clone(), "u").await.unwrap();
        let err = create(&pool, biz, extra, "u").await.unwrap_err();
        assert_eq!(code(err), ErrorCode::InvoiceStageExists);
    }

    #[tokio::test]
    async fn revision_rules() {
        let pool = test_pool().await;
        let biz = seed_business(&pool, "A").await;
        let original = create(&pool, biz, payload(InvoiceStage::SelfBalance, 100, 10), "u")
            .await
            .unwrap();

        let mut rev = payload(InvoiceStage::SelfBalance, 200, 20);
        rev.record_type = RecordType::Revised;
        rev.parent_record_id = Some(original.id);
        let err = create(&pool, biz, rev.clone(), "u").await.unwrap_err();
        assert_eq!(code(err), ErrorCode::RevisedReasonRequired);

        rev.revised_reason = Some("정정".into());
        rev.stage = InvoiceStage::SelfAdvance;
        let err = create(&pool, biz, rev.clone(), "u").await.unwrap_err();
        assert_eq!(code(err), ErrorCode::InvoiceParentInvalid);

        rev.stage = InvoiceStage::SelfBalance;
        cancel(&pool, original.id, "u").await.unwrap();
        let err = create(&pool, biz, rev, "u").await.unwrap_err();
        assert_eq!(code(err), ErrorCode::InvoiceParentInvalid);
    }

    #[tokio::test]
    async fn cancel_zeroes_mirror_and_twice_conflicts() {
        let pool = test_pool().await;
        let biz = seed_business(&pool, "A").await;
        let original = create(&pool, biz, payload(InvoiceStage::Subsidy2nd, 1000, 100), "u")
            .await
            .unwrap();

        let cancelled = cancel(&pool, original.id, "u").await.unwrap();
        assert_eq!(cancelled.record_type, RecordType::Cancelled);
        let row = business::find_by_id(&pool, biz).await.unwrap().unwrap();
        assert_eq!(row.int("invoice_2nd_amount"), Some(0));
        assert_eq!(row.date("invoice_2nd_date"), None);

        let err = cancel(&pool, original.id, "u").await.unwrap_err();
        assert_eq!(code(err), ErrorCode::InvoiceAlreadyCancelled);

        // The stage is free for a new original
        create(&pool, biz, payload(InvoiceStage::Subsidy2nd, 500, 50), "u")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn update_recomputes_total_and_honors_expected_timestamp() {
        let pool = test_pool().await;
        let biz = seed_business(&pool, "A").await;
        let original = create(&pool, biz, payload(InvoiceStage::SubsidyAdditional, 1000, 100), "u")
            .await
            .unwrap();

        let stale = InvoiceUpdate {
            supply_amount: Some(2000),
            expected_updated_at: Some(original.updated_at - 1),
            ..Default::default()
        };
        let err = update(&pool, original.id, stale, "u").await.unwrap_err();
        assert_eq!(code(err), ErrorCode::InvoiceStaleWrite);

        let fresh = InvoiceUpdate {
            supply_amount: Some(2000),
            tax_amount: Some(200),
            payment_amount: Some(500),
            expected_updated_at: Some(original.updated_at),
            ..Default::default()
        };
        let updated = update(&pool, original.id, fresh, "u").await.unwrap();
        assert_eq!(updated.total_amount, 2200);

        let row = business::find_by_id(&pool, biz).await.unwrap().unwrap();
        assert_eq!(row.int("invoice_additional_amount"), Some(2200));
        assert_eq!(row.int("payment_additional_amount"), Some(500));
    }

    #[tokio::test]
    async fn amounts_past_the_ceiling_are_rejected_not_summed() {
        let pool = test_pool().await;
        let biz = seed_business(&pool, "A").await;

        let err = create(&pool, biz, payload(InvoiceStage::Subsidy1st, i64::MAX, 1), "u")
            .await
            .unwrap_err();
        assert_eq!(code(err), ErrorCode::ValidationFailed);
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM invoice_records").await, 0);

        // Oversized figures already in the mirror columns surface as an error
        sqlx::query(
            "UPDATE business_info SET invoice_1st_amount = ?, invoice_advance_amount = 1 WHERE id = ?",
        )
        .bind(i64::MAX)
        .bind(biz)
        .execute(&pool)
        .await
        .unwrap();
        let err = business_receivables(&pool, biz).await.unwrap_err();
        assert_eq!(code(err), ErrorCode::ValueOutOfRange);
        let err = summary(&pool).await.unwrap_err();
        assert_eq!(code(err), ErrorCode::ValueOutOfRange);
    }

    #[tokio::test]
    async fn delete_is_extra_only_and_permission_gated() {
        let pool = test_pool().await;
        let biz = seed_business(&pool, "A").await;
        let canonical = create(&pool, biz, payload(InvoiceStage::Subsidy1st, 10, 1), "u")
            .await
            .unwrap();
        let mut extra = payload(InvoiceStage::Extra, 100, 10);
        extra.extra_title = Some("크레인".into());
        let root = create(&pool, biz, extra.clone(), "u").await.unwrap();
        let mut rev = extra;
        rev.record_type = RecordType::Revised;
        rev.extra_title = None;
        rev.parent_record_id = Some(root.id);
        rev.revised_reason = Some("추가".into());
        let child = create(&pool, biz, rev, "u").await.unwrap();
        assert_eq!(child.extra_title.as_deref(), Some("크레인"));

        let err = delete(&pool, root.id, "u", 2).await.unwrap_err();
        assert_eq!(code(err), ErrorCode::PermissionDenied);
        let err = delete(&pool, canonical.id, "u", 3).await.unwrap_err();
        assert_eq!(code(err), ErrorCode::InvoiceDeleteNotAllowed);

        assert_eq!(delete(&pool, child.id, "u", 3).await.unwrap(), 2);
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM invoice_records").await, 1);
    }
}
