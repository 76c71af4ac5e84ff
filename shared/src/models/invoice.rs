//! Invoice-stage ledger models

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Largest amount (won) accepted for any single supply, tax or payment
/// figure. Sums of a business's stages stay far inside `i64`.
pub const MAX_AMOUNT: i64 = 1_000_000_000_000;

/// Billing stage of an invoice record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
pub enum InvoiceStage {
    #[serde(rename = "subsidy_1st")]
    #[cfg_attr(feature = "db", sqlx(rename = "subsidy_1st"))]
    Subsidy1st,
    #[serde(rename = "subsidy_2nd")]
    #[cfg_attr(feature = "db", sqlx(rename = "subsidy_2nd"))]
    Subsidy2nd,
    #[serde(rename = "subsidy_additional")]
    #[cfg_attr(feature = "db", sqlx(rename = "subsidy_additional"))]
    SubsidyAdditional,
    #[serde(rename = "self_advance")]
    #[cfg_attr(feature = "db", sqlx(rename = "self_advance"))]
    SelfAdvance,
    #[serde(rename = "self_balance")]
    #[cfg_attr(feature = "db", sqlx(rename = "self_balance"))]
    SelfBalance,
    #[serde(rename = "extra")]
    #[cfg_attr(feature = "db", sqlx(rename = "extra"))]
    Extra,
}

/// Receivable category of a canonical stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageCategory {
    Subsidy,
    SelfPay,
    Extra,
}

/// Business columns mirroring a canonical stage's effective values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageColumns {
    pub invoice_date: &'static str,
    pub invoice_amount: &'static str,
    pub payment_date: &'static str,
    pub payment_amount: &'static str,
}

impl InvoiceStage {
    /// The five stages allowing at most one active original each
    pub const CANONICAL: [InvoiceStage; 5] = [
        InvoiceStage::Subsidy1st,
        InvoiceStage::Subsidy2nd,
        InvoiceStage::SubsidyAdditional,
        InvoiceStage::SelfAdvance,
        InvoiceStage::SelfBalance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Subsidy1st => "subsidy_1st",
            Self::Subsidy2nd => "subsidy_2nd",
            Self::SubsidyAdditional => "subsidy_additional",
            Self::SelfAdvance => "self_advance",
            Self::SelfBalance => "self_balance",
            Self::Extra => "extra",
        }
    }

    pub fn is_canonical(&self) -> bool {
        !matches!(self, Self::Extra)
    }

    pub fn category(&self) -> StageCategory {
        match self {
            Self::Subsidy1st | Self::Subsidy2nd | Self::SubsidyAdditional => StageCategory::Subsidy,
            Self::SelfAdvance | Self::SelfBalance => StageCategory::SelfPay,
            Self::Extra => StageCategory::Extra,
        }
    }

    pub fn business_columns(&self) -> Option<StageColumns> {
        let cols = |invoice_date, invoice_amount, payment_date, payment_amount| StageColumns {
            invoice_date,
            invoice_amount,
            payment_date,
            payment_amount,
        };
        match self {
            Self::Subsidy1st => Some(cols(
                "invoice_1st_date",
                "invoice_1st_amount",
                "payment_1st_date",
                "payment_1st_amount",
            )),
            Self::Subsidy2nd => Some(cols(
                "invoice_2nd_date",
                "invoice_2nd_amount",
                "payment_2nd_date",
                "payment_2nd_amount",
            )),
            Self::SubsidyAdditional => Some(cols(
                "invoice_additional_date",
                "invoice_additional_amount",
                "payment_additional_date",
                "payment_additional_amount",
            )),
            Self::SelfAdvance => Some(cols(
                "invoice_advance_date",
                "invoice_advance_amount",
                "payment_advance_date",
                "payment_advance_amount",
            )),
            Self::SelfBalance => Some(cols(
                "invoice_balance_date",
                "invoice_balance_amount",
                "payment_balance_date",
                "payment_balance_amount",
            )),
            Self::Extra => None,
        }
    }
}

impl std::fmt::Display for InvoiceStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[cfg_attr(feature = "db", sqlx(rename_all = "snake_case"))]
pub enum RecordType {
    #[default]
    Original,
    Revised,
    Cancelled,
}

/// Invoice record (from DB)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct InvoiceRecord {
    pub id: i64,
    pub business_id: i64,
    pub stage: InvoiceStage,
    pub record_type: RecordType,
    pub extra_title: Option<String>,
    pub issue_date: Option<String>,
    pub document_number: Option<String>,
    pub supply_amount: i64,
    pub tax_amount: i64,
    pub total_amount: i64,
    pub payment_date: Option<String>,
    pub payment_amount: Option<i64>,
    pub payment_memo: Option<String>,
    pub parent_record_id: Option<i64>,
    pub revised_reason: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
}

/// Create invoice record payload (original or revised)
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct InvoiceCreate {
    pub stage: InvoiceStage,
    #[serde(default)]
    pub record_type: RecordType,
    #[validate(length(max = 200))]
    pub extra_title: Option<String>,
    pub issue_date: Option<NaiveDate>,
    #[validate(length(max = 100))]
    pub document_number: Option<String>,
    #[serde(default)]
    #[validate(range(min = 0, max = MAX_AMOUNT))]
    pub supply_amount: i64,
    #[serde(default)]
    #[validate(range(min = 0, max = MAX_AMOUNT))]
    pub tax_amount: i64,
    pub payment_date: Option<NaiveDate>,
    #[validate(range(min = 0, max = MAX_AMOUNT))]
    pub payment_amount: Option<i64>,
    #[validate(length(max = 500))]
    pub payment_memo: Option<String>,
    pub parent_record_id: Option<i64>,
    #[validate(length(max = 500))]
    pub revised_reason: Option<String>,
}

/// Amend an existing record; only present fields are touched
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct InvoiceUpdate {
    #[validate(length(max = 200))]
    pub extra_title: Option<String>,
    pub issue_date: Option<NaiveDate>,
    #[validate(length(max = 100))]
    pub document_number: Option<String>,
    #[validate(range(min = 0, max = MAX_AMOUNT))]
    pub supply_amount: Option<i64>,
    #[validate(range(min = 0, max = MAX_AMOUNT))]
    pub tax_amount: Option<i64>,
    pub payment_date: Option<NaiveDate>,
    #[validate(range(min = 0, max = MAX_AMOUNT))]
    pub payment_amount: Option<i64>,
    #[validate(length(max = 500))]
    pub payment_memo: Option<String>,
    #[validate(length(max = 500))]
    pub revised_reason: Option<String>,
    /// Reject the write if the record's `updated_at` differs
    pub expected_updated_at: Option<i64>,
}

/// Where a stage receivable's figures came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceivableSource {
    Ledger,
    BusinessColumns,
}

/// Effective figures for one canonical stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageReceivable {
    pub stage: InvoiceStage,
    pub total_amount: i64,
    pub payment_amount: i64,
    pub receivable: i64,
    /// Listed among outstanding line items
    pub outstanding: bool,
    pub source: ReceivableSource,
}

/// Effective figures for one extra-stage chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraReceivable {
    pub record_id: i64,
    pub extra_title: Option<String>,
    pub total_amount: i64,
    pub payment_amount: i64,
    pub receivable: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessReceivables {
    pub business_id: i64,
    pub business_name: String,
    pub stages: Vec<StageReceivable>,
    pub extras: Vec<ExtraReceivable>,
    pub subsidy_subtotal: i64,
    pub self_pay_subtotal: i64,
    pub canonical_subtotal: i64,
    pub extra_subtotal: i64,
    pub grand_total: i64,
}

/// Receivables across every non-deleted business
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivableSummary {
    pub businesses: Vec<BusinessReceivables>,
    pub canonical_subtotal: i64,
    pub extra_subtotal: i64,
    pub grand_total: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_wire_names() {
        let json = serde_json::to_string(&InvoiceStage::Subsidy1st).unwrap();
        assert_eq!(json, "\"subsidy_1st\"");
        let stage: InvoiceStage = serde_json::from_str("\"self_balance\"").unwrap();
        assert_eq!(stage, InvoiceStage::SelfBalance);
        assert_eq!(stage.as_str(), "self_balance");
        assert!(serde_json::from_str::<InvoiceStage>("\"subsidy_3rd\"").is_err());
    }

    #[test]
    fn stage_mirror_columns() {
        let cols = InvoiceStage::SubsidyAdditional.business_columns().unwrap();
        assert_eq!(cols.invoice_amount, "invoice_additional_amount");
        assert_eq!(cols.payment_date, "payment_additional_date");
        assert!(InvoiceStage::Extra.business_columns().is_none());
        for stage in InvoiceStage::CANONICAL {
            assert!(stage.business_columns().is_some());
            assert!(stage.is_canonical());
        }
    }

    #[test]
    fn create_payload_validation() {
        let payload: InvoiceCreate = serde_json::from_value(serde_json::json!({
            "stage": "subsidy_1st",
            "supply_amount": -1,
            "tax_amount": 0
        }))
        .unwrap();
        assert_eq!(payload.record_type, RecordType::Original);
        assert!(payload.validate().is_err());
    }

    #[test]
    fn amounts_are_bounded_above() {
        let payload: InvoiceCreate = serde_json::from_value(serde_json::json!({
            "stage": "subsidy_1st",
            "supply_amount": i64::MAX,
            "tax_amount": 1
        }))
        .unwrap();
        assert!(payload.validate().is_err());

        let at_limit = InvoiceUpdate {
            supply_amount: Some(MAX_AMOUNT),
            payment_amount: Some(MAX_AMOUNT),
            ..Default::default()
        };
        assert!(at_limit.validate().is_ok());
        let over = InvoiceUpdate {
            payment_amount: Some(MAX_AMOUNT + 1),
            ..Default::default()
        };
        assert!(over.validate().is_err());
    }
}
