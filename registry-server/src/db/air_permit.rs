//! Air permit tree persistence (permit → outlets → facilities)

use super::placeholders;
use shared::models::{AirPermitTree, FacilityNode, OutletTree, Pollutant};
use shared::util::{format_date, parse_stored_date};
use sqlx::{FromRow, SqliteConnection};
use std::collections::HashMap;

#[derive(FromRow)]
struct PermitRow {
    id: i64,
    business_id: i64,
    business_type: String,
    category: String,
    annual_emission_amount: Option<f64>,
    first_report_date: Option<String>,
    operation_start_date: Option<String>,
    pollutants: String,
}

#[derive(FromRow)]
struct OutletRow {
    id: i64,
    air_permit_id: i64,
    outlet_number: i64,
    outlet_name: Option<String>,
}

#[derive(FromRow)]
struct FacilityRow {
    id: i64,
    outlet_id: i64,
    facility_name: String,
    capacity: String,
    quantity: i64,
}

impl From<FacilityRow> for FacilityNode {
    fn from(row: FacilityRow) -> Self {
        FacilityNode {
            id: Some(row.id),
            facility_name: row.facility_name,
            capacity: row.capacity,
            quantity: row.quantity,
        }
    }
}

/// Insert a whole tree with fresh ids; returns the new permit id
pub async fn insert_tree(
    conn: &mut SqliteConnection,
    business_id: i64,
    tree: &AirPermitTree,
    now: i64,
) -> Result<i64, sqlx::Error> {
    let pollutants = serde_json::to_string(&tree.pollutants)
        .map_err(|e| sqlx::Error::Encode(Box::new(e)))?;

    let permit_id: i64 = sqlx::query_scalar(
        "INSERT INTO air_permits (business_id, business_type, category, annual_emission_amount, first_report_date, operation_start_date, pollutants, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(business_id)
    .bind(&tree.business_type)
    .bind(&tree.category)
    .bind(tree.annual_emission_amount)
    .bind(tree.first_report_date.map(format_date))
    .bind(tree.operation_start_date.map(format_date))
    .bind(pollutants)
    .bind(now)
    .bind(now)
    .fetch_one(&mut *conn)
    .await?;

    for outlet in &tree.outlets {
        let outlet_id: i64 = sqlx::query_scalar(
            "INSERT INTO discharge_outlets (air_permit_id, outlet_number, outlet_name, created_at) VALUES (?, ?, ?, ?) RETURNING id",
        )
        .bind(permit_id)
        .bind(outlet.outlet_number)
        .bind(&outlet.outlet_name)
        .bind(now)
        .fetch_one(&mut *conn)
        .await?;

        insert_facilities(conn, "discharge_facilities", outlet_id, &outlet.discharge_facilities)
            .await?;
        insert_facilities(conn, "prevention_facilities", outlet_id, &outlet.prevention_facilities)
            .await?;
    }

    Ok(permit_id)
}

async fn insert_facilities(
    conn: &mut SqliteConnection,
    table: &'static str,
    outlet_id: i64,
    facilities: &[FacilityNode],
) -> Result<(), sqlx::Error> {
    let sql = format!(
        "INSERT INTO {table} (outlet_id, facility_name, capacity, quantity) VALUES (?, ?, ?, ?)"
    );
    for facility in facilities {
        sqlx::query(&sql)
            .bind(outlet_id)
            .bind(&facility.facility_name)
            .bind(&facility.capacity)
            .bind(facility.quantity)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

/// Load permit trees grouped by business id.
///
/// `business_id = None` loads the trees of every non-deleted business.
pub async fn load_trees(
    conn: &mut SqliteConnection,
    business_id: Option<i64>,
) -> Result<HashMap<i64, Vec<AirPermitTree>>, sqlx::Error> {
    let permits: Vec<PermitRow> = match business_id {
        Some(id) => {
            sqlx::query_as(
                "SELECT id, business_id, business_type, category, annual_emission_amount, first_report_date, operation_start_date, pollutants FROM air_permits WHERE business_id = ? ORDER BY id",
            )
            .bind(id)
            .fetch_all(&mut *conn)
            .await?
        }
        None => {
            sqlx::query_as(
                "SELECT p.id, p.business_id, p.business_type, p.category, p.annual_emission_amount, p.first_report_date, p.operation_start_date, p.pollutants FROM air_permits p JOIN business_info b ON b.id = p.business_id WHERE b.is_deleted = 0 ORDER BY p.id",
            )
            .fetch_all(&mut *conn)
            .await?
        }
    };
    if permits.is_empty() {
        return Ok(HashMap::new());
    }

    let permit_ids: Vec<i64> = permits.iter().map(|p| p.id).collect();
    let mut outlets_by_permit: HashMap<i64, Vec<OutletRow>> = HashMap::new();
    for chunk in permit_ids.chunks(500) {
        let sql = format!(
            "SELECT id, air_permit_id, outlet_number, outlet_name FROM discharge_outlets WHERE air_permit_id IN ({}) ORDER BY outlet_number, id",
            placeholders(chunk.len())
        );
        let mut query = sqlx::query_as::<_, OutletRow>(&sql);
        for id in chunk {
            query = query.bind(*id);
        }
        for outlet in query.fetch_all(&mut *conn).await? {
            outlets_by_permit
                .entry(outlet.air_permit_id)
                .or_default()
                .push(outlet);
        }
    }

    let outlet_ids: Vec<i64> = outlets_by_permit
        .values()
        .flat_map(|v| v.iter().map(|o| o.id))
        .collect();
    let mut discharge = load_facilities(conn, "discharge_facilities", &outlet_ids).await?;
    let mut prevention = load_facilities(conn, "prevention_facilities", &outlet_ids).await?;

    let mut trees: HashMap<i64, Vec<AirPermitTree>> = HashMap::new();
    for permit in permits {
        let outlets = outlets_by_permit
            .remove(&permit.id)
            .unwrap_or_default()
            .into_iter()
            .map(|o| OutletTree {
                id: Some(o.id),
                outlet_number: o.outlet_number,
                outlet_name: o.outlet_name,
                discharge_facilities: discharge.remove(&o.id).unwrap_or_default(),
                prevention_facilities: prevention.remove(&o.id).unwrap_or_default(),
            })
            .collect();

        let pollutants: Vec<Pollutant> = match serde_json::from_str(&permit.pollutants) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(permit_id = permit.id, error = %e, "Unreadable pollutant list, treating as empty");
                Vec::new()
            }
        };

        trees.entry(permit.business_id).or_default().push(AirPermitTree {
            id: Some(permit.id),
            business_type: permit.business_type,
            category: permit.category,
            annual_emission_amount: permit.annual_emission_amount,
            first_report_date: permit.first_report_date.as_deref().and_then(parse_stored_date),
            operation_start_date: permit
                .operation_start_date
                .as_deref()
                .and_then(parse_stored_date),
            pollutants,
            outlets,
        });
    }
    Ok(trees)
}

async fn load_facilities(
    conn: &mut SqliteConnection,
    table: &'static str,
    outlet_ids: &[i64],
) -> Result<HashMap<i64, Vec<FacilityNode>>, sqlx::Error> {
    let mut map: HashMap<i64, Vec<FacilityNode>> = HashMap::new();
    for chunk in outlet_ids.chunks(500) {
        let sql = format!(
            "SELECT id, outlet_id, facility_name, capacity, quantity FROM {table} WHERE outlet_id IN ({}) ORDER BY id",
            placeholders(chunk.len())
        );
        let mut query = sqlx::query_as::<_, FacilityRow>(&sql);
        for id in chunk {
            query = query.bind(*id);
        }
        for row in query.fetch_all(&mut *conn).await? {
            map.entry(row.outlet_id).or_default().push(row.into());
        }
    }
    Ok(map)
}

/// Remove the permit trees of every non-deleted business, bottom-up
pub async fn delete_trees_for_active(conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
    const ACTIVE_OUTLETS: &str = "SELECT o.id FROM discharge_outlets o JOIN air_permits p ON p.id = o.air_permit_id JOIN business_info b ON b.id = p.business_id WHERE b.is_deleted = 0";

    for table in ["discharge_facilities", "prevention_facilities"] {
        sqlx::query(&format!(
            "DELETE FROM {table} WHERE outlet_id IN ({ACTIVE_OUTLETS})"
        ))
        .execute(&mut *conn)
        .await?;
    }

    sqlx::query(
        "DELETE FROM discharge_outlets WHERE air_permit_id IN (SELECT p.id FROM air_permits p JOIN business_info b ON b.id = p.business_id WHERE b.is_deleted = 0)",
    )
    .execute(&mut *conn)
    .await?;

    let result = sqlx::query(
        "DELETE FROM air_permits WHERE business_id IN (SELECT id FROM business_info WHERE is_deleted = 0)",
    )
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{count, seed_business, test_pool};

    fn sample_tree() -> AirPermitTree {
        let facility = |name: &str| FacilityNode {
            id: None,
            facility_name: name.into(),
            capacity: "10m3".into(),
            quantity: 2,
        };
        AirPermitTree {
            id: None,
            business_type: "1종".into(),
            category: "도장".into(),
            annual_emission_amount: Some(12.5),
            first_report_date: chrono::NaiveDate::from_ymd_opt(2023, 3, 1),
            operation_start_date: None,
            pollutants: vec![Pollutant {
                name: "먼지".into(),
                amount: Some(1.0),
            }],
            outlets: vec![
                OutletTree {
                    id: None,
                    outlet_number: 1,
                    outlet_name: Some("배출구1".into()),
                    discharge_facilities: vec![facility("도장부스")],
                    prevention_facilities: vec![facility("여과집진"), facility("흡착")],
                },
                OutletTree {
                    id: None,
                    outlet_number: 3,
                    outlet_name: None,
                    discharge_facilities: vec![],
                    prevention_facilities: vec![facility("세정")],
                },
            ],
        }
    }

    #[tokio::test]
    async fn tree_round_trips_through_store() {
        let pool = test_pool().await;
        let id = seed_business(&pool, "A").await;
        let mut conn = pool.acquire().await.unwrap();
        insert_tree(&mut conn, id, &sample_tree(), 1).await.unwrap();

        let trees = load_trees(&mut conn, Some(id)).await.unwrap();
        let tree = &trees[&id][0];
        assert!(tree.id.is_some());
        assert_eq!(tree.outlet_count(), 2);
        assert_eq!(tree.facility_count(), 4);
        assert_eq!(tree.outlets[1].outlet_number, 3);
        assert_eq!(tree.pollutants[0].name, "먼지");
        assert_eq!(tree.first_report_date, sample_tree().first_report_date);
    }

    #[tokio::test]
    async fn delete_trees_only_touches_active_businesses() {
        let pool = test_pool().await;
        let live = seed_business(&pool, "live").await;
        let gone = seed_business(&pool, "gone").await;
        let mut conn = pool.acquire().await.unwrap();
        insert_tree(&mut conn, live, &sample_tree(), 1).await.unwrap();
        insert_tree(&mut conn, gone, &sample_tree(), 1).await.unwrap();
        sqlx::query("UPDATE business_info SET is_deleted = 1 WHERE id = ?")
            .bind(gone)
            .execute(&mut *conn)
            .await
            .unwrap();

        assert_eq!(delete_trees_for_active(&mut conn).await.unwrap(), 1);
        drop(conn);

        assert_eq!(count(&pool, "SELECT COUNT(*) FROM air_permits").await, 1);
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM discharge_outlets").await, 2);
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM prevention_facilities").await, 3);
    }
}
