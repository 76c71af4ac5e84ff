//! Single-record business operations

use crate::db::{air_permit, business, photo};
use crate::error::{ServiceResult, is_unique_violation};
use crate::sync::guard;
use crate::sync::normalize::{NormalizeError, normalize_patch, normalize_row};
use serde_json::{Map, Value};
use shared::error::{AppError, ErrorCode};
use shared::models::{AirPermitTree, BusinessListItem, BusinessQuery, BusinessRecord};
use shared::util::now_millis;
use sqlx::{Connection, SqlitePool};
use std::collections::HashSet;

impl From<NormalizeError> for AppError {
    fn from(e: NormalizeError) -> Self {
        match e {
            NormalizeError::EmptyName => AppError::new(ErrorCode::BusinessNameRequired),
            NormalizeError::NotAnObject => AppError::invalid_request(e.to_string()),
            NormalizeError::InvalidDate { field, .. } => {
                AppError::with_message(ErrorCode::InvalidFormat, e.to_string())
                    .with_detail("field", field)
            }
        }
    }
}

/// Listing with best-effort photo counts; a failed count lookup only
/// drops the enrichment.
pub async fn list(pool: &SqlitePool, query: &BusinessQuery) -> ServiceResult<Vec<BusinessListItem>> {
    let records = business::list(pool, query).await?;
    let counts = match photo::counts_by_business(pool).await {
        Ok(counts) => Some(counts),
        Err(e) => {
            tracing::warn!(error = %e, "Photo counts unavailable, listing without them");
            None
        }
    };

    Ok(records
        .into_iter()
        .map(|record| BusinessListItem {
            photo_count: counts
                .as_ref()
                .map(|c| c.get(&record.id).copied().unwrap_or(0)),
            record,
        })
        .collect())
}

pub async fn get(pool: &SqlitePool, id: i64) -> ServiceResult<BusinessRecord> {
    Ok(business::find_by_id(pool, id)
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::BusinessNotFound))?)
}

fn name_taken(name: &str) -> AppError {
    AppError::new(ErrorCode::BusinessNameExists).with_detail("business_name", name)
}

pub async fn create(pool: &SqlitePool, body: &Value, actor: &str) -> ServiceResult<BusinessRecord> {
    let input = normalize_row(body).map_err(AppError::from)?;
    if business::find_active_id_by_name(pool, &input.business_name)
        .await?
        .is_some()
    {
        return Err(name_taken(&input.business_name).into());
    }

    let id = match business::insert_one(pool, &input, actor, now_millis()).await {
        Ok(id) => id,
        Err(e) if is_unique_violation(&e) => return Err(name_taken(&input.business_name).into()),
        Err(e) => return Err(e.into()),
    };
    tracing::info!(business_id = id, business_name = %input.business_name, actor = %actor, "Business created");
    get(pool, id).await
}

/// Partial update. A rename onto another live business's name is refused
/// before anything is written; renaming to the current name is a no-op.
pub async fn update(
    pool: &SqlitePool,
    id: i64,
    body: &Map<String, Value>,
    actor: &str,
) -> ServiceResult<BusinessRecord> {
    let mut patch = normalize_patch(body)?;
    let current = get(pool, id).await?;

    if patch.business_name.as_deref() == Some(current.business_name.as_str()) {
        patch.business_name = None;
    }
    if let Some(name) = patch.business_name.as_deref()
        && let Some(other) = business::find_active_id_by_name(pool, name).await?
        && other != id
    {
        return Err(name_taken(name).into());
    }
    if patch.is_empty() {
        return Ok(current);
    }

    let fields: Vec<_> = patch.fields.into_iter().collect();
    let result = business::update_fields(
        pool,
        id,
        patch.business_name.as_deref(),
        &fields,
        patch.is_active,
        actor,
        now_millis(),
    )
    .await;
    match result {
        Ok(0) => return Err(AppError::new(ErrorCode::BusinessNotFound).into()),
        Ok(_) => {}
        Err(e) if is_unique_violation(&e) => {
            let name = patch.business_name.as_deref().unwrap_or_default();
            return Err(name_taken(name).into());
        }
        Err(e) => return Err(e.into()),
    }

    tracing::info!(business_id = id, fields = fields.len(), actor = %actor, "Business updated");
    get(pool, id).await
}

/// Soft delete, refused while photos are registered unless `force`
pub async fn delete(pool: &SqlitePool, id: i64, force: bool, actor: &str) -> ServiceResult<()> {
    let current = get(pool, id).await?;
    if force {
        tracing::warn!(target: "audit", business_id = id, actor = %actor, "Photo guard overridden for delete");
    } else {
        guard::check_delete(pool, id, &current.business_name).await?;
    }

    if business::soft_delete(pool, id, actor, now_millis()).await? == 0 {
        return Err(AppError::new(ErrorCode::BusinessNotFound).into());
    }
    tracing::info!(target: "audit", business_id = id, business_name = %current.business_name, actor = %actor, "Business deleted");
    Ok(())
}

/// Permit trees of one business
pub async fn air_permits(pool: &SqlitePool, business_id: i64) -> ServiceResult<Vec<AirPermitTree>> {
    get(pool, business_id).await?;
    let mut conn = pool.acquire().await?;
    let mut trees = air_permit::load_trees(&mut conn, Some(business_id)).await?;
    Ok(trees.remove(&business_id).unwrap_or_default())
}

fn check_tree(tree: &AirPermitTree) -> Result<(), AppError> {
    let mut numbers = HashSet::new();
    for outlet in &tree.outlets {
        if outlet.outlet_number < 1 {
            return Err(AppError::with_message(
                ErrorCode::ValueOutOfRange,
                format!("outlet_number must be positive, got {}", outlet.outlet_number),
            ));
        }
        if !numbers.insert(outlet.outlet_number) {
            return Err(AppError::validation(format!(
                "duplicate outlet_number {}",
                outlet.outlet_number
            )));
        }
        let facilities = outlet
            .discharge_facilities
            .iter()
            .chain(&outlet.prevention_facilities);
        for facility in facilities {
            if facility.facility_name.trim().is_empty() {
                return Err(AppError::with_message(
                    ErrorCode::RequiredField,
                    "facility_name is required",
                ));
            }
            if facility.quantity < 0 {
                return Err(AppError::with_message(
                    ErrorCode::ValueOutOfRange,
                    "facility quantity must not be negative",
                ));
            }
        }
    }
    Ok(())
}

/// Insert a permit tree under a business; the whole tree or nothing
pub async fn create_air_permit(
    pool: &SqlitePool,
    business_id: i64,
    tree: &AirPermitTree,
    actor: &str,
) -> ServiceResult<AirPermitTree> {
    check_tree(tree)?;
    get(pool, business_id).await?;

    let mut conn = pool.acquire().await?;
    let mut tx = conn.begin().await?;
    let permit_id = air_permit::insert_tree(&mut tx, business_id, tree, now_millis()).await?;
    tx.commit().await?;

    tracing::info!(
        business_id,
        permit_id,
        outlets = tree.outlet_count(),
        facilities = tree.facility_count(),
        actor = %actor,
        "Air permit created"
    );

    let mut trees = air_permit::load_trees(&mut conn, Some(business_id)).await?;
    trees
        .remove(&business_id)
        .and_then(|list| list.into_iter().find(|t| t.id == Some(permit_id)))
        .ok_or_else(|| AppError::internal("Created air permit not readable").into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{seed_business, seed_photos, test_pool};
    use crate::error::ServiceError;
    use serde_json::json;

    fn code(err: ServiceError) -> ErrorCode {
        match err {
            ServiceError::App(e) => e.code,
            ServiceError::Db(e) => panic!("unexpected db error: {e}"),
        }
    }

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn create_rejects_duplicate_and_empty_names() {
        let pool = test_pool().await;
        let created = create(&pool, &json!({ "business_name": "A", "ph_meter": "2" }), "u")
            .await
            .unwrap();
        assert_eq!(created.int("ph_meter"), Some(2));

        let err = create(&pool, &json!({ "business_name": "A" }), "u").await.unwrap_err();
        assert_eq!(code(err), ErrorCode::BusinessNameExists);
        let err = create(&pool, &json!({ "business_name": "" }), "u").await.unwrap_err();
        assert_eq!(code(err), ErrorCode::BusinessNameRequired);
    }

    #[tokio::test]
    async fn rename_conflict_applies_nothing() {
        let pool = test_pool().await;
        let a = seed_business(&pool, "A").await;
        seed_business(&pool, "B").await;

        let err = update(&pool, a, &obj(json!({ "business_name": "B", "ph_meter": 9 })), "u")
            .await
            .unwrap_err();
        assert_eq!(code(err), ErrorCode::BusinessNameExists);
        let row = get(&pool, a).await.unwrap();
        assert_eq!(row.business_name, "A");
        assert_eq!(row.int("ph_meter"), Some(0));

        // Renaming to itself is fine and still applies the other fields
        let row = update(&pool, a, &obj(json!({ "business_name": "A", "ph_meter": 9 })), "u")
            .await
            .unwrap();
        assert_eq!(row.int("ph_meter"), Some(9));
    }

    #[tokio::test]
    async fn null_clears_integer_fields() {
        let pool = test_pool().await;
        let a = seed_business(&pool, "A").await;
        let row = update(&pool, a, &obj(json!({ "ph_meter": null, "manager_name": " 이 " })), "u")
            .await
            .unwrap();
        assert_eq!(row.int("ph_meter"), None);
        assert_eq!(row.text("manager_name"), "이");
        assert_eq!(row.updated_by.as_deref(), Some("u"));
    }

    #[tokio::test]
    async fn delete_is_guarded_by_photos() {
        let pool = test_pool().await;
        let a = seed_business(&pool, "A").await;
        seed_photos(&pool, a, 1).await;

        let err = delete(&pool, a, false, "u").await.unwrap_err();
        assert_eq!(code(err), ErrorCode::PhotoGuardViolation);
        delete(&pool, a, true, "u").await.unwrap();
        assert_eq!(code(get(&pool, a).await.unwrap_err()), ErrorCode::BusinessNotFound);
    }

    #[tokio::test]
    async fn list_enriches_photo_counts() {
        let pool = test_pool().await;
        let a = seed_business(&pool, "A").await;
        seed_business(&pool, "B").await;
        seed_photos(&pool, a, 2).await;

        let items = list(&pool, &BusinessQuery::default()).await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].photo_count, Some(2));
        assert_eq!(items[1].photo_count, Some(0));
    }

    #[tokio::test]
    async fn air_permit_tree_round_trips_with_fresh_ids() {
        let pool = test_pool().await;
        let a = seed_business(&pool, "A").await;
        let tree: AirPermitTree = serde_json::from_value(json!({
            "business_type": "4종",
            "pollutants": [{ "name": "먼지", "amount": 1.5 }],
            "outlets": [
                { "outlet_number": 1, "discharge_facilities": [{ "facility_name": "도장부스" }] },
                { "outlet_number": 2, "prevention_facilities": [{ "facility_name": "여과집진", "quantity": 2 }] }
            ]
        }))
        .unwrap();

        let created = create_air_permit(&pool, a, &tree, "u").await.unwrap();
        assert!(created.id.is_some());
        assert_eq!(created.outlet_count(), 2);
        assert_eq!(created.facility_count(), 2);
        assert_eq!(created.outlets[1].prevention_facilities[0].quantity, 2);

        let listed = air_permits(&pool, a).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].pollutants, tree.pollutants);
    }

    #[tokio::test]
    async fn air_permit_rejects_duplicate_outlets_and_missing_business() {
        let pool = test_pool().await;
        let a = seed_business(&pool, "A").await;
        let tree: AirPermitTree = serde_json::from_value(json!({
            "outlets": [{ "outlet_number": 1 }, { "outlet_number": 1 }]
        }))
        .unwrap();
        let err = create_air_permit(&pool, a, &tree, "u").await.unwrap_err();
        assert_eq!(code(err), ErrorCode::ValidationFailed);
        assert!(air_permits(&pool, a).await.unwrap().is_empty());

        let err = air_permits(&pool, 999).await.unwrap_err();
        assert_eq!(code(err), ErrorCode::BusinessNotFound);
    }
}
