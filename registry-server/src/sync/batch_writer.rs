//! Conflict-resolution batch writer
//!
//! Writes normalized rows in fixed-size batches, one transaction per batch.
//! New names go in as a multi-row INSERT; names that already exist (in the
//! store, or earlier in the same batch) are resolved per [`UploadMode`].
//! A failing batch is rolled back and reported row by row; later batches
//! still run.

use crate::db::business;
use shared::models::{BusinessInput, FieldValue, RowError, UploadMode};
use sqlx::{Connection, SqliteConnection};
use std::collections::HashSet;

/// SQLite's bound-parameter ceiling (SQLITE_MAX_VARIABLE_NUMBER)
pub const SQLITE_MAX_PARAMS: usize = 32_766;

/// Share of the ceiling a single statement may use
const SAFE_PARAM_BUDGET: usize = SQLITE_MAX_PARAMS * 60 / 100;

/// Rows per batch: the configured size, capped so one multi-row INSERT
/// stays inside the parameter budget
pub fn effective_batch_size(configured: usize) -> usize {
    let cap = SAFE_PARAM_BUDGET / business::insert_columns_per_row();
    configured.clamp(1, cap.max(1))
}

/// Counters of one writer run
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WriteOutcome {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    /// Rows of failed batches, in input order
    pub errors: Vec<RowError>,
    pub failed_batches: usize,
}

#[derive(Default)]
struct BatchCounts {
    created: usize,
    updated: usize,
    skipped: usize,
}

enum Plan<'a> {
    Create(&'a BusinessInput),
    /// Existing row id, or `None` when the name is first created in this batch
    Conflict(&'a BusinessInput, Option<i64>),
}

pub struct BatchWriter<'a> {
    mode: UploadMode,
    batch_size: usize,
    actor: &'a str,
}

impl<'a> BatchWriter<'a> {
    pub fn new(mode: UploadMode, configured_batch_size: usize, actor: &'a str) -> Self {
        Self {
            mode,
            batch_size: effective_batch_size(configured_batch_size),
            actor,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Run every batch on `conn`.
    ///
    /// When `conn` is already inside a transaction each batch becomes a
    /// savepoint of it.
    pub async fn write(&self, conn: &mut SqliteConnection, rows: &[BusinessInput]) -> WriteOutcome {
        let mut outcome = WriteOutcome::default();

        for (index, batch) in rows.chunks(self.batch_size).enumerate() {
            match self.write_batch(conn, batch).await {
                Ok(counts) => {
                    outcome.created += counts.created;
                    outcome.updated += counts.updated;
                    outcome.skipped += counts.skipped;
                    tracing::debug!(
                        batch = index,
                        rows = batch.len(),
                        created = counts.created,
                        updated = counts.updated,
                        skipped = counts.skipped,
                        "Batch committed"
                    );
                }
                Err(e) => {
                    tracing::warn!(batch = index, rows = batch.len(), error = %e, "Batch rolled back");
                    outcome.failed_batches += 1;
                    let message = format!("batch {} failed: {e}", index + 1);
                    outcome.errors.extend(batch.iter().map(|row| RowError {
                        business_name: row.business_name.clone(),
                        error: message.clone(),
                    }));
                }
            }
        }

        outcome
    }

    async fn write_batch(
        &self,
        conn: &mut SqliteConnection,
        batch: &[BusinessInput],
    ) -> Result<BatchCounts, sqlx::Error> {
        let mut tx = conn.begin().await?;
        let now = shared::util::now_millis();

        let names: Vec<&str> = batch.iter().map(|r| r.business_name.as_str()).collect();
        let existing = business::ids_by_names(&mut tx, &names).await?;

        let mut seen_in_batch: HashSet<&str> = HashSet::new();
        let mut plans = Vec::with_capacity(batch.len());
        for row in batch {
            let name = row.business_name.as_str();
            if let Some(id) = existing.get(name) {
                plans.push(Plan::Conflict(row, Some(*id)));
            } else if !seen_in_batch.insert(name) {
                plans.push(Plan::Conflict(row, None));
            } else {
                plans.push(Plan::Create(row));
            }
        }

        let creates: Vec<&BusinessInput> = plans
            .iter()
            .filter_map(|p| match p {
                Plan::Create(row) => Some(*row),
                Plan::Conflict(..) => None,
            })
            .collect();
        let mut counts = BatchCounts {
            created: business::insert_many(&mut tx, &creates, self.actor, now).await? as usize,
            ..Default::default()
        };

        let needs_lookup = plans
            .iter()
            .any(|p| matches!(p, Plan::Conflict(_, None)));
        let created_ids = if needs_lookup && self.mode != UploadMode::Skip {
            let created_names: Vec<&str> = creates.iter().map(|r| r.business_name.as_str()).collect();
            business::ids_by_names(&mut tx, &created_names).await?
        } else {
            Default::default()
        };

        for plan in &plans {
            let Plan::Conflict(row, id) = plan else {
                continue;
            };
            if self.mode == UploadMode::Skip {
                counts.skipped += 1;
                continue;
            }
            let Some(id) = id.or_else(|| created_ids.get(&row.business_name).copied()) else {
                return Err(sqlx::Error::RowNotFound);
            };

            let fields: Vec<(&'static str, FieldValue)> = match self.mode {
                UploadMode::Merge => row
                    .fields
                    .iter()
                    .filter(|(_, v)| v.is_meaningful())
                    .map(|(k, v)| (*k, v.clone()))
                    .collect(),
                _ => row.fields.iter().map(|(k, v)| (*k, v.clone())).collect(),
            };
            business::update_fields(&mut *tx, id, None, &fields, None, self.actor, now).await?;
            counts.updated += 1;
        }

        tx.commit().await?;
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{count, test_pool};
    use crate::sync::normalize::normalize_row;
    use serde_json::json;

    fn rows(values: &[serde_json::Value]) -> Vec<BusinessInput> {
        values.iter().map(|v| normalize_row(v).unwrap()).collect()
    }

    #[test]
    fn batch_size_respects_parameter_budget() {
        assert_eq!(business::insert_columns_per_row(), 82);
        assert_eq!(effective_batch_size(500), 239);
        assert_eq!(effective_batch_size(200), 200);
        assert_eq!(effective_batch_size(0), 1);
    }

    #[tokio::test]
    async fn skip_mode_is_idempotent() {
        let pool = test_pool().await;
        let input = rows(&[
            json!({ "business_name": "A", "ph_meter": 1 }),
            json!({ "business_name": "B" }),
        ]);
        let writer = BatchWriter::new(UploadMode::Skip, 500, "tester");
        let mut conn = pool.acquire().await.unwrap();

        let first = writer.write(&mut conn, &input).await;
        assert_eq!((first.created, first.skipped), (2, 0));
        let second = writer.write(&mut conn, &input).await;
        assert_eq!((second.created, second.updated, second.skipped), (0, 0, 2));
        drop(conn);

        assert_eq!(count(&pool, "SELECT COUNT(*) FROM business_info").await, 2);
    }

    #[tokio::test]
    async fn merge_keeps_existing_values_for_blank_input() {
        let pool = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        BatchWriter::new(UploadMode::Overwrite, 500, "a")
            .write(
                &mut conn,
                &rows(&[json!({ "business_name": "A", "ph_meter": 2, "address": "부산", "order_date": "2024-01-01" })]),
            )
            .await;

        let outcome = BatchWriter::new(UploadMode::Merge, 500, "b")
            .write(
                &mut conn,
                &rows(&[json!({ "business_name": "A", "ph_meter": 0, "address": "", "order_date": null, "gateway": 4 })]),
            )
            .await;
        assert_eq!(outcome.updated, 1);
        drop(conn);

        let row = business::all_active(&pool).await.unwrap().remove(0);
        assert_eq!(row.int("ph_meter"), Some(2));
        assert_eq!(row.text("address"), "부산");
        assert!(row.date("order_date").is_some());
        assert_eq!(row.int("gateway"), Some(4));
        assert_eq!(row.updated_by.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn overwrite_replaces_every_field() {
        let pool = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let writer = BatchWriter::new(UploadMode::Overwrite, 500, "a");
        writer
            .write(&mut conn, &rows(&[json!({ "business_name": "A", "ph_meter": 2, "address": "부산" })]))
            .await;
        let outcome = writer
            .write(&mut conn, &rows(&[json!({ "business_name": "A" })]))
            .await;
        assert_eq!(outcome.updated, 1);
        drop(conn);

        let row = business::all_active(&pool).await.unwrap().remove(0);
        assert_eq!(row.int("ph_meter"), Some(0));
        assert_eq!(row.text("address"), "");
    }

    #[tokio::test]
    async fn duplicate_name_within_run_conflicts_with_first() {
        let pool = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let outcome = BatchWriter::new(UploadMode::Overwrite, 500, "a")
            .write(
                &mut conn,
                &rows(&[
                    json!({ "business_name": "A", "ph_meter": 1 }),
                    json!({ "business_name": "A", "ph_meter": 5 }),
                ]),
            )
            .await;
        drop(conn);

        assert_eq!((outcome.created, outcome.updated), (1, 1));
        let all = business::all_active(&pool).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].int("ph_meter"), Some(5));
    }

    #[tokio::test]
    async fn failed_batch_is_isolated() {
        let pool = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        // Batch size 2: the second batch carries a negative equipment count
        // which the store rejects.
        let outcome = BatchWriter::new(UploadMode::Overwrite, 2, "a")
            .write(
                &mut conn,
                &rows(&[
                    json!({ "business_name": "A" }),
                    json!({ "business_name": "B" }),
                    json!({ "business_name": "C" }),
                    json!({ "business_name": "D", "ph_meter": -1 }),
                    json!({ "business_name": "E" }),
                ]),
            )
            .await;
        drop(conn);

        assert_eq!(outcome.created, 3);
        assert_eq!(outcome.failed_batches, 1);
        assert_eq!(
            outcome.errors.iter().map(|e| e.business_name.as_str()).collect::<Vec<_>>(),
            vec!["C", "D"]
        );
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM business_info").await, 3);
    }
}
