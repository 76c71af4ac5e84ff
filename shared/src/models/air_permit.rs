//! Air permit tree: permit → discharge outlets → facilities
//!
//! The same nested shape is used for the API, for snapshot payloads and
//! for reattachment after a replace-all. Ids are informational only; a tree
//! is always inserted with fresh ids.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One pollutant emitted under a permit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pollutant {
    pub name: String,
    #[serde(default)]
    pub amount: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AirPermitTree {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default)]
    pub business_type: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub annual_emission_amount: Option<f64>,
    #[serde(default)]
    pub first_report_date: Option<NaiveDate>,
    #[serde(default)]
    pub operation_start_date: Option<NaiveDate>,
    #[serde(default)]
    pub pollutants: Vec<Pollutant>,
    #[serde(default)]
    pub outlets: Vec<OutletTree>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutletTree {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub outlet_number: i64,
    #[serde(default)]
    pub outlet_name: Option<String>,
    #[serde(default)]
    pub discharge_facilities: Vec<FacilityNode>,
    #[serde(default)]
    pub prevention_facilities: Vec<FacilityNode>,
}

/// Discharge or prevention facility
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacilityNode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub facility_name: String,
    #[serde(default)]
    pub capacity: String,
    #[serde(default = "default_quantity")]
    pub quantity: i64,
}

fn default_quantity() -> i64 {
    1
}

impl AirPermitTree {
    pub fn outlet_count(&self) -> usize {
        self.outlets.len()
    }

    pub fn facility_count(&self) -> usize {
        self.outlets
            .iter()
            .map(|o| o.discharge_facilities.len() + o.prevention_facilities.len())
            .sum()
    }
}
