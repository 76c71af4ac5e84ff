//! business_info queries
//!
//! Column lists are generated from the shared field catalog, so every
//! statement here stays in step with the migration.

use super::placeholders;
use shared::models::{
    BUSINESS_FIELDS, BusinessInput, BusinessQuery, BusinessRecord, FieldKind, FieldValue,
};
use shared::util::{format_date, parse_stored_date};
use sqlx::query_builder::Separated;
use sqlx::sqlite::{Sqlite, SqliteRow};
use sqlx::{Executor, QueryBuilder, Row, SqliteConnection};
use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

const DEFAULT_LIST_LIMIT: i64 = 1000;
const NAME_LOOKUP_CHUNK: usize = 500;

static CATALOG_COLUMNS: LazyLock<String> = LazyLock::new(|| {
    BUSINESS_FIELDS
        .iter()
        .map(|f| f.name)
        .collect::<Vec<_>>()
        .join(", ")
});

static SELECT_SQL: LazyLock<String> = LazyLock::new(|| {
    format!(
        "SELECT id, business_name, {}, is_active, is_deleted, created_at, updated_at, updated_by FROM business_info",
        *CATALOG_COLUMNS
    )
});

/// Bound parameters per inserted row
pub fn insert_columns_per_row() -> usize {
    // business_name + catalog + created_at, updated_at, updated_by
    BUSINESS_FIELDS.len() + 4
}

fn from_row(row: &SqliteRow) -> Result<BusinessRecord, sqlx::Error> {
    let mut fields = BTreeMap::new();
    for spec in BUSINESS_FIELDS {
        let value = match spec.kind {
            FieldKind::Text => {
                FieldValue::Text(row.try_get::<Option<String>, _>(spec.name)?.unwrap_or_default())
            }
            FieldKind::Int => FieldValue::Int(row.try_get(spec.name)?),
            FieldKind::Date => FieldValue::Date(
                row.try_get::<Option<String>, _>(spec.name)?
                    .as_deref()
                    .and_then(parse_stored_date),
            ),
        };
        fields.insert(spec.name, value);
    }

    Ok(BusinessRecord {
        id: row.try_get("id")?,
        business_name: row.try_get("business_name")?,
        fields,
        is_active: row.try_get("is_active")?,
        is_deleted: row.try_get("is_deleted")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        updated_by: row.try_get("updated_by")?,
    })
}

fn bind_separated(b: &mut Separated<'_, '_, Sqlite, &'static str>, value: &FieldValue) {
    match value {
        FieldValue::Text(s) => b.push_bind(s.clone()),
        FieldValue::Int(v) => b.push_bind(*v),
        FieldValue::Date(d) => b.push_bind(d.map(format_date)),
    };
}

fn bind_unseparated(b: &mut Separated<'_, '_, Sqlite, &'static str>, value: &FieldValue) {
    match value {
        FieldValue::Text(s) => b.push_bind_unseparated(s.clone()),
        FieldValue::Int(v) => b.push_bind_unseparated(*v),
        FieldValue::Date(d) => b.push_bind_unseparated(d.map(format_date)),
    };
}

// ── reads ──

pub async fn find_by_id<'e, E>(exec: E, id: i64) -> Result<Option<BusinessRecord>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!("{} WHERE id = ? AND is_deleted = 0", *SELECT_SQL);
    let row = sqlx::query(&sql).bind(id).fetch_optional(exec).await?;
    row.as_ref().map(from_row).transpose()
}

/// Non-deleted businesses matching the optional id / free-text filter
pub async fn list<'e, E>(exec: E, query: &BusinessQuery) -> Result<Vec<BusinessRecord>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let mut qb = QueryBuilder::<Sqlite>::new(SELECT_SQL.as_str());
    qb.push(" WHERE is_deleted = 0");

    if let Some(id) = query.id {
        qb.push(" AND id = ").push_bind(id);
    }
    if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = format!("%{search}%");
        qb.push(" AND (business_name LIKE ")
            .push_bind(pattern.clone())
            .push(" OR address LIKE ")
            .push_bind(pattern.clone())
            .push(" OR representative_name LIKE ")
            .push_bind(pattern.clone())
            .push(" OR manager_name LIKE ")
            .push_bind(pattern)
            .push(")");
    }

    qb.push(" ORDER BY id LIMIT ")
        .push_bind(query.limit.unwrap_or(DEFAULT_LIST_LIMIT).max(0))
        .push(" OFFSET ")
        .push_bind(query.offset.unwrap_or(0).max(0));

    let rows = qb.build().fetch_all(exec).await?;
    rows.iter().map(from_row).collect()
}

/// Every non-deleted business, ordered by id
pub async fn all_active<'e, E>(exec: E) -> Result<Vec<BusinessRecord>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!("{} WHERE is_deleted = 0 ORDER BY id", *SELECT_SQL);
    let rows = sqlx::query(&sql).fetch_all(exec).await?;
    rows.iter().map(from_row).collect()
}

pub async fn find_active_id_by_name<'e, E>(exec: E, name: &str) -> Result<Option<i64>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_scalar("SELECT id FROM business_info WHERE business_name = ? AND is_deleted = 0")
        .bind(name)
        .fetch_optional(exec)
        .await
}

/// name → id for the non-deleted rows among `names`
pub async fn ids_by_names(
    conn: &mut SqliteConnection,
    names: &[&str],
) -> Result<HashMap<String, i64>, sqlx::Error> {
    let mut map = HashMap::with_capacity(names.len());
    for chunk in names.chunks(NAME_LOOKUP_CHUNK) {
        let sql = format!(
            "SELECT business_name, id FROM business_info WHERE is_deleted = 0 AND business_name IN ({})",
            placeholders(chunk.len())
        );
        let mut query = sqlx::query_as::<_, (String, i64)>(&sql);
        for name in chunk {
            query = query.bind(*name);
        }
        map.extend(query.fetch_all(&mut *conn).await?);
    }
    Ok(map)
}

/// name → id for every non-deleted row
pub async fn active_name_ids<'e, E>(exec: E) -> Result<HashMap<String, i64>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows: Vec<(String, i64)> =
        sqlx::query_as("SELECT business_name, id FROM business_info WHERE is_deleted = 0")
            .fetch_all(exec)
            .await?;
    Ok(rows.into_iter().collect())
}

// ── writes ──

fn push_insert_head(qb: &mut QueryBuilder<'_, Sqlite>) {
    qb.push("INSERT INTO business_info (business_name, ");
    qb.push(CATALOG_COLUMNS.as_str());
    qb.push(", created_at, updated_at, updated_by) ");
}

fn push_insert_row(
    b: &mut Separated<'_, '_, Sqlite, &'static str>,
    row: &BusinessInput,
    actor: &str,
    now: i64,
) {
    b.push_bind(row.business_name.clone());
    for spec in BUSINESS_FIELDS {
        match row.fields.get(spec.name) {
            Some(value) => bind_separated(b, value),
            None => bind_separated(b, &FieldValue::default_for(spec.kind)),
        }
    }
    b.push_bind(now);
    b.push_bind(now);
    b.push_bind(actor.to_string());
}

/// Multi-row INSERT; callers keep `rows.len() * insert_columns_per_row()`
/// under the bound-parameter ceiling.
pub async fn insert_many(
    conn: &mut SqliteConnection,
    rows: &[&BusinessInput],
    actor: &str,
    now: i64,
) -> Result<u64, sqlx::Error> {
    if rows.is_empty() {
        return Ok(0);
    }
    let mut qb = QueryBuilder::<Sqlite>::new("");
    push_insert_head(&mut qb);
    qb.push_values(rows.iter(), |mut b, row| push_insert_row(&mut b, row, actor, now));
    let result = qb.build().execute(&mut *conn).await?;
    Ok(result.rows_affected())
}

pub async fn insert_one<'e, E>(
    exec: E,
    row: &BusinessInput,
    actor: &str,
    now: i64,
) -> Result<i64, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let mut qb = QueryBuilder::<Sqlite>::new("");
    push_insert_head(&mut qb);
    qb.push_values(std::iter::once(row), |mut b, row| {
        push_insert_row(&mut b, row, actor, now)
    });
    qb.push(" RETURNING id");
    qb.build_query_scalar::<i64>().fetch_one(exec).await
}

/// Assign the given columns on a non-deleted row; `updated_at`/`updated_by`
/// are always written. Returns affected rows.
pub async fn update_fields<'e, E>(
    exec: E,
    id: i64,
    business_name: Option<&str>,
    fields: &[(&'static str, FieldValue)],
    is_active: Option<bool>,
    actor: &str,
    now: i64,
) -> Result<u64, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let mut qb = QueryBuilder::<Sqlite>::new("UPDATE business_info SET ");
    {
        let mut set = qb.separated(", ");
        if let Some(name) = business_name {
            set.push("business_name = ");
            set.push_bind_unseparated(name.to_string());
        }
        for (column, value) in fields {
            set.push(format!("{column} = "));
            bind_unseparated(&mut set, value);
        }
        if let Some(active) = is_active {
            set.push("is_active = ");
            set.push_bind_unseparated(active);
        }
        set.push("updated_at = ");
        set.push_bind_unseparated(now);
        set.push("updated_by = ");
        set.push_bind_unseparated(actor.to_string());
    }
    qb.push(" WHERE id = ")
        .push_bind(id)
        .push(" AND is_deleted = 0");

    let result = qb.build().execute(exec).await?;
    Ok(result.rows_affected())
}

pub async fn soft_delete<'e, E>(exec: E, id: i64, actor: &str, now: i64) -> Result<u64, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        "UPDATE business_info SET is_deleted = 1, updated_at = ?, updated_by = ? WHERE id = ? AND is_deleted = 0",
    )
    .bind(now)
    .bind(actor)
    .bind(id)
    .execute(exec)
    .await?;
    Ok(result.rows_affected())
}

/// Hard-delete every non-deleted row (replace-all only)
pub async fn delete_active(conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM business_info WHERE is_deleted = 0")
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::test_pool;
    use chrono::NaiveDate;

    fn input(name: &str, ph: i64) -> BusinessInput {
        let mut fields = BTreeMap::new();
        fields.insert("ph_meter", FieldValue::Int(Some(ph)));
        fields.insert("address", FieldValue::Text("서울".into()));
        fields.insert(
            "order_date",
            FieldValue::Date(NaiveDate::from_ymd_opt(2024, 1, 5)),
        );
        BusinessInput {
            business_name: name.into(),
            fields,
        }
    }

    #[tokio::test]
    async fn insert_many_fills_catalog_defaults() {
        let pool = test_pool().await;
        let a = input("A", 2);
        let b = input("B", 0);
        let mut conn = pool.acquire().await.unwrap();
        let n = insert_many(&mut conn, &[&a, &b], "tester", 10).await.unwrap();
        drop(conn);
        assert_eq!(n, 2);

        let rows = all_active(&pool).await.unwrap();
        assert_eq!(rows.len(), 2);
        let a = &rows[0];
        assert_eq!(a.business_name, "A");
        assert_eq!(a.int("ph_meter"), Some(2));
        assert_eq!(a.int("gateway"), Some(0));
        assert_eq!(a.text("email"), "");
        assert_eq!(a.date("order_date"), NaiveDate::from_ymd_opt(2024, 1, 5));
        assert_eq!(a.date("shipment_date"), None);
        assert_eq!(a.updated_by.as_deref(), Some("tester"));
        assert!(a.is_active);
    }

    #[tokio::test]
    async fn update_fields_touches_only_given_columns() {
        let pool = test_pool().await;
        let id = insert_one(&pool, &input("A", 2), "x", 1).await.unwrap();

        let n = update_fields(
            &pool,
            id,
            None,
            &[("ph_meter", FieldValue::Int(None))],
            Some(false),
            "y",
            2,
        )
        .await
        .unwrap();
        assert_eq!(n, 1);

        let row = find_by_id(&pool, id).await.unwrap().unwrap();
        assert_eq!(row.int("ph_meter"), None);
        assert_eq!(row.text("address"), "서울");
        assert!(!row.is_active);
        assert_eq!(row.updated_at, 2);
    }

    #[tokio::test]
    async fn list_filters_and_hides_deleted() {
        let pool = test_pool().await;
        let a = insert_one(&pool, &input("Alpha Plant", 1), "x", 1).await.unwrap();
        insert_one(&pool, &input("Beta Works", 1), "x", 1).await.unwrap();
        let c = insert_one(&pool, &input("Alpha Annex", 1), "x", 1).await.unwrap();
        soft_delete(&pool, c, "x", 2).await.unwrap();

        let found = list(
            &pool,
            &BusinessQuery {
                search: Some("alpha".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, a);
        assert!(find_by_id(&pool, c).await.unwrap().is_none());

        // Deleted names are free again
        insert_one(&pool, &input("Alpha Annex", 1), "x", 3).await.unwrap();
    }

    #[tokio::test]
    async fn negative_equipment_count_is_rejected_by_store() {
        let pool = test_pool().await;
        let err = insert_one(&pool, &input("Bad", -1), "x", 1).await.unwrap_err();
        assert!(matches!(err, sqlx::Error::Database(_)));
    }
}
