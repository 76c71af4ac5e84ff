//! Business registry record and its static field catalog

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Storage/normalization class of a catalog field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// NFC-normalized trimmed string, empty by default
    Text,
    /// Integer, `0` by default, nullable only through explicit clearing
    Int,
    /// Calendar date stored as `YYYY-MM-DD`, nullable
    Date,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
}

const fn text(name: &'static str) -> FieldSpec {
    FieldSpec {
        name,
        kind: FieldKind::Text,
    }
}

const fn int(name: &'static str) -> FieldSpec {
    FieldSpec {
        name,
        kind: FieldKind::Int,
    }
}

const fn date(name: &'static str) -> FieldSpec {
    FieldSpec {
        name,
        kind: FieldKind::Date,
    }
}

/// Equipment count columns; the store rejects negative values.
pub const EQUIPMENT_FIELDS: &[&str] = &[
    "ph_meter",
    "differential_pressure_meter",
    "temperature_meter",
    "discharge_current_meter",
    "fan_current_meter",
    "pump_current_meter",
    "gateway",
    "gateway_1_2",
    "gateway_3_4",
    "vpn_wired",
    "vpn_wireless",
    "explosion_proof_differential_pressure_meter",
    "explosion_proof_temperature_meter",
    "expansion_device",
    "relay_8ch",
    "relay_16ch",
    "main_board_replacement",
    "multiple_stack",
];

/// Invoice/payment mirror columns; values are money and bounded by
/// [`MAX_AMOUNT`](super::invoice::MAX_AMOUNT).
pub const AMOUNT_FIELDS: &[&str] = &[
    "invoice_1st_amount",
    "payment_1st_amount",
    "invoice_2nd_amount",
    "payment_2nd_amount",
    "invoice_additional_amount",
    "payment_additional_amount",
    "invoice_advance_amount",
    "payment_advance_amount",
    "invoice_balance_amount",
    "payment_balance_amount",
];

/// Every bulk-writable business column except `business_name`.
///
/// Order matters: it is the column order of generated INSERT statements.
pub const BUSINESS_FIELDS: &[FieldSpec] = &[
    // ── identity / contact ──
    text("local_government"),
    text("address"),
    text("representative_name"),
    text("business_registration_number"),
    text("business_type"),
    text("business_category"),
    text("business_contact"),
    text("fax_number"),
    text("email"),
    text("manager_name"),
    text("manager_position"),
    text("manager_contact"),
    text("pollutant_type"),
    text("business_management_code"),
    text("greenlink_id"),
    text("greenlink_pw"),
    // ── workflow ──
    text("manufacturer"),
    text("sales_office"),
    text("installation_team"),
    text("progress_status"),
    text("order_manager"),
    text("department_manager"),
    text("installation_manager"),
    text("facility_summary"),
    text("additional_info"),
    text("special_notes"),
    // ── equipment counts ──
    int("ph_meter"),
    int("differential_pressure_meter"),
    int("temperature_meter"),
    int("discharge_current_meter"),
    int("fan_current_meter"),
    int("pump_current_meter"),
    int("gateway"),
    int("gateway_1_2"),
    int("gateway_3_4"),
    int("vpn_wired"),
    int("vpn_wireless"),
    int("explosion_proof_differential_pressure_meter"),
    int("explosion_proof_temperature_meter"),
    int("expansion_device"),
    int("relay_8ch"),
    int("relay_16ch"),
    int("main_board_replacement"),
    int("multiple_stack"),
    // ── project / financial ──
    int("project_year"),
    int("additional_cost"),
    int("negotiation"),
    int("multiple_stack_cost"),
    int("installation_extra_cost"),
    // ── project dates ──
    date("installation_date"),
    date("order_date"),
    date("shipment_date"),
    date("receipt_date"),
    date("contract_sent_date"),
    date("construction_report_submitted_at"),
    date("greenlink_confirmation_submitted_at"),
    date("attachment_completion_submitted_at"),
    date("subsidy_approval_date"),
    // ── per-stage invoice / payment mirror ──
    date("invoice_1st_date"),
    int("invoice_1st_amount"),
    date("payment_1st_date"),
    int("payment_1st_amount"),
    date("invoice_2nd_date"),
    int("invoice_2nd_amount"),
    date("payment_2nd_date"),
    int("payment_2nd_amount"),
    date("invoice_additional_date"),
    int("invoice_additional_amount"),
    date("payment_additional_date"),
    int("payment_additional_amount"),
    date("invoice_advance_date"),
    int("invoice_advance_amount"),
    date("payment_advance_date"),
    int("payment_advance_amount"),
    date("invoice_balance_date"),
    int("invoice_balance_amount"),
    date("payment_balance_date"),
    int("payment_balance_amount"),
];

/// Look up a catalog field by column name
pub fn field_spec(name: &str) -> Option<&'static FieldSpec> {
    BUSINESS_FIELDS.iter().find(|f| f.name == name)
}

/// A typed catalog value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Int(Option<i64>),
    Date(Option<NaiveDate>),
}

impl FieldValue {
    /// Whether a merge upload may write this value over an existing one
    pub fn is_meaningful(&self) -> bool {
        match self {
            FieldValue::Text(s) => !s.is_empty(),
            FieldValue::Int(v) => matches!(v, Some(n) if *n != 0),
            FieldValue::Date(d) => d.is_some(),
        }
    }

    /// The default a full-mode normalization produces for a missing key
    pub fn default_for(kind: FieldKind) -> Self {
        match kind {
            FieldKind::Text => FieldValue::Text(String::new()),
            FieldKind::Int => FieldValue::Int(Some(0)),
            FieldKind::Date => FieldValue::Date(None),
        }
    }
}

/// Typed values for one business after normalization (full shape)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BusinessInput {
    pub business_name: String,
    pub fields: BTreeMap<&'static str, FieldValue>,
}

/// Partial update: only keys present in the request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BusinessPatch {
    pub business_name: Option<String>,
    pub fields: BTreeMap<&'static str, FieldValue>,
    pub is_active: Option<bool>,
}

impl BusinessPatch {
    pub fn is_empty(&self) -> bool {
        self.business_name.is_none() && self.fields.is_empty() && self.is_active.is_none()
    }
}

/// Business registry row
#[derive(Debug, Clone, Serialize)]
pub struct BusinessRecord {
    pub id: i64,
    pub business_name: String,
    #[serde(flatten)]
    pub fields: BTreeMap<&'static str, FieldValue>,
    pub is_active: bool,
    pub is_deleted: bool,
    pub created_at: i64,
    pub updated_at: i64,
    pub updated_by: Option<String>,
}

impl BusinessRecord {
    pub fn int(&self, name: &str) -> Option<i64> {
        match self.fields.get(name) {
            Some(FieldValue::Int(v)) => *v,
            _ => None,
        }
    }

    pub fn date(&self, name: &str) -> Option<NaiveDate> {
        match self.fields.get(name) {
            Some(FieldValue::Date(v)) => *v,
            _ => None,
        }
    }

    pub fn text(&self, name: &str) -> &str {
        match self.fields.get(name) {
            Some(FieldValue::Text(v)) => v,
            _ => "",
        }
    }
}

/// List row enriched with the registered photo count (best effort)
#[derive(Debug, Clone, Serialize)]
pub struct BusinessListItem {
    #[serde(flatten)]
    pub record: BusinessRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_count: Option<i64>,
}

/// `GET /api/businesses` query
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BusinessQuery {
    pub search: Option<String>,
    pub id: Option<i64>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// `DELETE /api/businesses/{id}` query
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeleteBusinessQuery {
    #[serde(default)]
    pub force: bool,
}

/// One business blocked by the photo guard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct PhotoGuardEntry {
    pub business_name: String,
    pub photo_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn catalog_names_are_unique() {
        let names: HashSet<_> = BUSINESS_FIELDS.iter().map(|f| f.name).collect();
        assert_eq!(names.len(), BUSINESS_FIELDS.len());
        assert!(!names.contains("business_name"));
    }

    #[test]
    fn equipment_fields_are_int_catalog_entries() {
        for name in EQUIPMENT_FIELDS {
            let spec = field_spec(name).unwrap();
            assert_eq!(spec.kind, FieldKind::Int, "{name}");
        }
    }

    #[test]
    fn amount_fields_cover_every_stage_mirror() {
        for name in AMOUNT_FIELDS {
            assert_eq!(field_spec(name).unwrap().kind, FieldKind::Int, "{name}");
        }
        for stage in crate::models::InvoiceStage::CANONICAL {
            let cols = stage.business_columns().unwrap();
            assert!(AMOUNT_FIELDS.contains(&cols.invoice_amount));
            assert!(AMOUNT_FIELDS.contains(&cols.payment_amount));
        }
    }

    #[test]
    fn meaningful_values() {
        assert!(!FieldValue::Int(Some(0)).is_meaningful());
        assert!(!FieldValue::Int(None).is_meaningful());
        assert!(FieldValue::Int(Some(-3)).is_meaningful());
        assert!(!FieldValue::Text(String::new()).is_meaningful());
        assert!(FieldValue::Text("x".into()).is_meaningful());
        assert!(!FieldValue::Date(None).is_meaningful());
    }

    #[test]
    fn record_serializes_flat() {
        let mut fields = BTreeMap::new();
        fields.insert("ph_meter", FieldValue::Int(Some(2)));
        fields.insert(
            "order_date",
            FieldValue::Date(NaiveDate::from_ymd_opt(2024, 5, 1)),
        );
        let record = BusinessRecord {
            id: 7,
            business_name: "Acme".into(),
            fields,
            is_active: true,
            is_deleted: false,
            created_at: 1,
            updated_at: 2,
            updated_by: None,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["ph_meter"], 2);
        assert_eq!(json["order_date"], "2024-05-01");
        assert_eq!(json["business_name"], "Acme");
    }
}
