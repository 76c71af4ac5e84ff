//! Receivable arithmetic over invoice chains
//!
//! A chain is an original record plus every revision hanging off it through
//! `parent_record_id`. Cancelling the root drops the whole chain; cancelling
//! a revision drops only that record. The latest remaining revision supplies
//! the total; payment and dates come from the latest record that has them.
//!
//! All sums are checked: figures that would leave `i64` yield
//! `ValueOutOfRange` instead of wrapping.

use shared::error::{AppError, ErrorCode};
use shared::models::{
    BusinessReceivables, BusinessRecord, ExtraReceivable, InvoiceRecord, InvoiceStage,
    ReceivableSource, ReceivableSummary, RecordType, StageCategory, StageReceivable,
};
use std::collections::HashMap;

fn overflow() -> AppError {
    AppError::with_message(
        ErrorCode::ValueOutOfRange,
        "Invoice amounts exceed the supported range",
    )
}

fn add(a: i64, b: i64) -> Result<i64, AppError> {
    a.checked_add(b).ok_or_else(overflow)
}

fn sub(a: i64, b: i64) -> Result<i64, AppError> {
    a.checked_sub(b).ok_or_else(overflow)
}

/// One original and its revisions, ordered by id
#[derive(Debug)]
pub struct Chain<'a> {
    pub root: &'a InvoiceRecord,
    pub members: Vec<&'a InvoiceRecord>,
}

impl<'a> Chain<'a> {
    pub fn is_cancelled(&self) -> bool {
        self.root.record_type == RecordType::Cancelled
    }

    fn live(&self) -> impl DoubleEndedIterator<Item = &'a InvoiceRecord> {
        self.members
            .iter()
            .copied()
            .filter(|r| r.record_type != RecordType::Cancelled)
    }

    /// `None` when the chain is cancelled
    pub fn effective(&self) -> Option<EffectiveValues> {
        if self.is_cancelled() {
            return None;
        }
        let latest = self.live().next_back()?;
        Some(EffectiveValues {
            total_amount: latest.total_amount,
            payment_amount: self.live().rev().find_map(|r| r.payment_amount),
            issue_date: self.live().rev().find_map(|r| r.issue_date.clone()),
            payment_date: self.live().rev().find_map(|r| r.payment_date.clone()),
        })
    }
}

/// Values a chain currently stands for
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EffectiveValues {
    pub total_amount: i64,
    pub payment_amount: Option<i64>,
    pub issue_date: Option<String>,
    pub payment_date: Option<String>,
}

/// Root id of `id`, following parent links (cycle-safe)
pub fn root_of(by_id: &HashMap<i64, &InvoiceRecord>, id: i64) -> i64 {
    let mut current = id;
    let mut hops = 0;
    while let Some(parent) = by_id.get(&current).and_then(|r| r.parent_record_id) {
        if !by_id.contains_key(&parent) || hops > by_id.len() {
            break;
        }
        current = parent;
        hops += 1;
    }
    current
}

/// Group records of one business and stage into chains, ordered by root id
pub fn chains(records: &[InvoiceRecord]) -> Vec<Chain<'_>> {
    let by_id: HashMap<i64, &InvoiceRecord> = records.iter().map(|r| (r.id, r)).collect();
    let mut grouped: HashMap<i64, Vec<&InvoiceRecord>> = HashMap::new();
    for record in records {
        grouped
            .entry(root_of(&by_id, record.id))
            .or_default()
            .push(record);
    }

    let mut out: Vec<Chain<'_>> = grouped
        .into_iter()
        .filter_map(|(root_id, mut members)| {
            members.sort_by_key(|r| r.id);
            let root = *by_id.get(&root_id)?;
            Some(Chain { root, members })
        })
        .collect();
    out.sort_by_key(|c| c.root.id);
    out
}

/// Effective values of one canonical stage across its live chains.
///
/// `None` when the stage has no records at all; all-cancelled stages yield
/// zero amounts and no dates.
pub fn stage_effective(
    stage_records: &[InvoiceRecord],
) -> Result<Option<EffectiveValues>, AppError> {
    if stage_records.is_empty() {
        return Ok(None);
    }
    let mut acc = EffectiveValues::default();
    for chain in chains(stage_records) {
        let Some(values) = chain.effective() else {
            continue;
        };
        acc.total_amount = add(acc.total_amount, values.total_amount)?;
        if let Some(paid) = values.payment_amount {
            acc.payment_amount = Some(add(acc.payment_amount.unwrap_or(0), paid)?);
        }
        if values.issue_date.is_some() {
            acc.issue_date = values.issue_date;
        }
        if values.payment_date.is_some() {
            acc.payment_date = values.payment_date;
        }
    }
    Ok(Some(acc))
}

fn positive(v: i64) -> i64 {
    v.max(0)
}

/// Receivables of one business from its ledger records, falling back to the
/// mirrored business columns for stages without any record.
pub fn business_receivables(
    business: &BusinessRecord,
    records: &[InvoiceRecord],
) -> Result<BusinessReceivables, AppError> {
    let mut stages: Vec<StageReceivable> = InvoiceStage::CANONICAL
        .iter()
        .map(|&stage| -> Result<StageReceivable, AppError> {
            let stage_records: Vec<InvoiceRecord> = records
                .iter()
                .filter(|r| r.stage == stage)
                .cloned()
                .collect();
            let (total_amount, payment_amount, source) = match stage_effective(&stage_records)? {
                Some(values) => (
                    values.total_amount,
                    values.payment_amount.unwrap_or(0),
                    ReceivableSource::Ledger,
                ),
                None => {
                    let (total, paid) = stage
                        .business_columns()
                        .map(|cols| {
                            (
                                business.int(cols.invoice_amount).unwrap_or(0),
                                business.int(cols.payment_amount).unwrap_or(0),
                            )
                        })
                        .unwrap_or((0, 0));
                    (total, paid, ReceivableSource::BusinessColumns)
                }
            };
            let receivable = sub(total_amount, payment_amount)?;
            Ok(StageReceivable {
                stage,
                total_amount,
                payment_amount,
                receivable,
                outstanding: receivable > 0,
                source,
            })
        })
        .collect::<Result<_, _>>()?;

    apply_subsidy_netting(&mut stages)?;

    let subtotal = |category: StageCategory| -> Result<i64, AppError> {
        stages
            .iter()
            .filter(|s| s.stage.category() == category)
            .try_fold(0, |acc, s| add(acc, positive(s.receivable)))
    };
    let subsidy_subtotal = subtotal(StageCategory::Subsidy)?;
    let self_pay_subtotal = subtotal(StageCategory::SelfPay)?;

    let extra_records: Vec<InvoiceRecord> = records
        .iter()
        .filter(|r| r.stage == InvoiceStage::Extra)
        .cloned()
        .collect();
    let mut extras: Vec<ExtraReceivable> = Vec::new();
    for chain in chains(&extra_records) {
        let Some(values) = chain.effective() else {
            continue;
        };
        let payment_amount = values.payment_amount.unwrap_or(0);
        extras.push(ExtraReceivable {
            record_id: chain.root.id,
            extra_title: chain.root.extra_title.clone(),
            total_amount: values.total_amount,
            payment_amount,
            receivable: sub(values.total_amount, payment_amount)?,
        });
    }
    let extra_subtotal = extras
        .iter()
        .try_fold(0, |acc, e| add(acc, positive(e.receivable)))?;

    let canonical_subtotal = add(subsidy_subtotal, self_pay_subtotal)?;
    Ok(BusinessReceivables {
        business_id: business.id,
        business_name: business.business_name.clone(),
        stages,
        extras,
        subsidy_subtotal,
        self_pay_subtotal,
        canonical_subtotal,
        extra_subtotal,
        grand_total: add(canonical_subtotal, extra_subtotal)?,
    })
}

/// A 2nd-stage payment larger than the 2nd-stage invoice settles the 1st
/// stage: the pair is reported as one combined figure on the 1st line.
fn apply_subsidy_netting(stages: &mut [StageReceivable]) -> Result<(), AppError> {
    let find = |stages: &[StageReceivable], stage: InvoiceStage| stages.iter().position(|s| s.stage == stage);
    let (Some(i1), Some(i2)) = (
        find(stages, InvoiceStage::Subsidy1st),
        find(stages, InvoiceStage::Subsidy2nd),
    ) else {
        return Ok(());
    };
    if stages[i2].payment_amount <= stages[i2].total_amount {
        return Ok(());
    }

    let invoiced = add(stages[i1].total_amount, stages[i2].total_amount)?;
    let paid = add(stages[i1].payment_amount, stages[i2].payment_amount)?;
    let combined = positive(sub(invoiced, paid)?);
    stages[i1].receivable = combined;
    stages[i1].outstanding = combined > 0;
    stages[i2].receivable = 0;
    stages[i2].outstanding = false;
    Ok(())
}

/// Receivables across businesses; only businesses with something owed are
/// listed, totals cover everyone.
pub fn summarize(
    businesses: &[BusinessRecord],
    records: &[InvoiceRecord],
) -> Result<ReceivableSummary, AppError> {
    let mut by_business: HashMap<i64, Vec<InvoiceRecord>> = HashMap::new();
    for record in records {
        by_business
            .entry(record.business_id)
            .or_default()
            .push(record.clone());
    }

    let mut summary = ReceivableSummary {
        businesses: Vec::new(),
        canonical_subtotal: 0,
        extra_subtotal: 0,
        grand_total: 0,
    };
    for business in businesses {
        let own = by_business.remove(&business.id).unwrap_or_default();
        let receivables = business_receivables(business, &own)?;
        summary.canonical_subtotal = add(summary.canonical_subtotal, receivables.canonical_subtotal)?;
        summary.extra_subtotal = add(summary.extra_subtotal, receivables.extra_subtotal)?;
        summary.grand_total = add(summary.grand_total, receivables.grand_total)?;
        if receivables.grand_total > 0 {
            summary.businesses.push(receivables);
        }
    }
    Ok(summary)
}
