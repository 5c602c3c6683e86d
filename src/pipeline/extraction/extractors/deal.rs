//! Deal assumptions: name, value, fee, LTV and the equity/debt split.

use std::sync::LazyLock;

use crate::pipeline::extraction::master::MasterSnapshot;
use crate::pipeline::extraction::patterns::*;
use crate::pipeline::extraction::traits::{DomainExtractor, ExtractorDeps};
use crate::pipeline::extraction::types::*;
use crate::pipeline::extraction::validation::*;

const DEAL_NAME: &str = "dealName";
const DEAL_VALUE: &str = "dealValue";
const TRANSACTION_FEE: &str = "transactionFee";
const LTV: &str = "dealLTV";
const EQUITY: &str = "equityContribution";
const DEBT: &str = "debtFinancing";

/// Relative gap between `equity + debt` and the deal value that counts as
/// an inconsistency.
const SPLIT_TOLERANCE: f64 = 0.05;

/// Percentage points between the stated LTV and `debt / value`.
const LTV_TOLERANCE: f64 = 5.0;

/// Derivation passes; each pass fills at most one field.
const MAX_DERIVATION_PASSES: usize = 4;

static DEAL_PATTERNS: LazyLock<Vec<FieldPatterns>> = LazyLock::new(|| {
    vec![
        FieldPatterns::new(
            DEAL_NAME,
            vec![
                text_after(r"deal\s+name|project\s+name|transaction\s+name", 1.0),
                text_after(r"deal|project|target\s+company|company\s+name", 0.5),
            ],
        ),
        FieldPatterns::new(
            DEAL_VALUE,
            vec![
                amount_after(
                    r"deal\s+value|purchase\s+price|acquisition\s+price|transaction\s+value|enterprise\s+value",
                    1.0,
                ),
                rule(&format!(r"(?i)[$€£]\s*{NUM}{UNIT}"), 0.7),
            ],
        ),
        FieldPatterns::new(
            TRANSACTION_FEE,
            vec![
                percent_after(r"transaction\s+fees?|acquisition\s+fees?|deal\s+fees?", 1.0),
                percent_before(r"transaction\s+fees?|acquisition\s+fees?", 0.8),
            ],
        ),
        FieldPatterns::new(
            LTV,
            vec![
                percent_after(r"ltv|loan[\s-]+to[\s-]+value", 1.0),
                percent_before(r"ltv|loan[\s-]+to[\s-]+value", 0.9),
                number_after(r"ltv", 0.5),
            ],
        ),
        FieldPatterns::new(
            EQUITY,
            vec![
                amount_after(r"equity\s+contribution|equity\s+investment|sponsor\s+equity", 1.0),
                amount_after(r"equity", 0.6),
            ],
        ),
        FieldPatterns::new(
            DEBT,
            vec![
                amount_after(
                    r"debt\s+financing|acquisition\s+debt|senior\s+debt|debt\s+facility|loan\s+amount",
                    1.0,
                ),
                amount_after(r"debt|borrowings?", 0.6),
            ],
        ),
    ]
});

pub struct DealAssumptionsExtractor {
    deps: ExtractorDeps,
}

impl DealAssumptionsExtractor {
    pub fn new(deps: ExtractorDeps) -> Self {
        Self { deps }
    }
}

impl DomainExtractor for DealAssumptionsExtractor {
    fn domain(&self) -> InsightDomain {
        InsightDomain::DealAssumptions
    }

    fn deps(&self) -> &ExtractorDeps {
        &self.deps
    }

    fn patterns(&self) -> &'static [FieldPatterns] {
        &DEAL_PATTERNS
    }

    fn master_hints(&self, snapshot: &MasterSnapshot) -> Vec<(&'static str, FieldValue)> {
        let t = &snapshot.transaction_details;
        let f = &snapshot.financing_structure;
        let name = t
            .deal_name
            .clone()
            .or_else(|| snapshot.company_overview.company_name.clone());

        let mut hints = Vec::new();
        if let Some(name) = name {
            hints.push((DEAL_NAME, FieldValue::from(name)));
        }
        hints.extend(
            [
                (DEAL_VALUE, t.deal_value),
                (TRANSACTION_FEE, t.transaction_fee),
                (LTV, f.ltv),
                (EQUITY, f.equity_contribution),
                (DEBT, f.debt_financing),
            ]
            .into_iter()
            .filter_map(|(name, value)| value.map(|v| (name, FieldValue::Number(v)))),
        );
        hints
    }

    fn validate(&self, record: DomainRecord, _ctx: &ValidationContext<'_>) -> DomainRecord {
        let record = check_split(record);
        let mut record = check_ltv(record);
        for _ in 0..MAX_DERIVATION_PASSES {
            let missing = record.missing_fields().len();
            record = derive_next(record);
            if record.missing_fields().len() == missing {
                break;
            }
        }
        record
    }
}

/// `equity + debt` should equal the deal value.
fn check_split(record: DomainRecord) -> DomainRecord {
    let (Some(value), Some(equity), Some(debt)) = (
        number(&record, DEAL_VALUE),
        number(&record, EQUITY),
        number(&record, DEBT),
    ) else {
        return record;
    };
    match relative_gap(equity + debt, value) {
        Some(gap) if gap > SPLIT_TOLERANCE => {
            penalize_all(record, &[DEAL_VALUE, EQUITY, DEBT], INCONSISTENCY_PENALTY)
        }
        _ => record,
    }
}

/// The stated LTV should match `debt / value`.
fn check_ltv(record: DomainRecord) -> DomainRecord {
    let (Some(value), Some(debt), Some(ltv)) = (
        number(&record, DEAL_VALUE),
        number(&record, DEBT),
        number(&record, LTV),
    ) else {
        return record;
    };
    if value != 0.0 && (debt / value * 100.0 - ltv).abs() > LTV_TOLERANCE {
        penalize_all(record, &[LTV], INCONSISTENCY_PENALTY)
    } else {
        record
    }
}

/// Fill the first derivable missing field. LTV is on the 0–100 scale.
fn derive_next(record: DomainRecord) -> DomainRecord {
    let value = number(&record, DEAL_VALUE);
    let equity = number(&record, EQUITY);
    let debt = number(&record, DEBT);
    let ltv = number(&record, LTV).filter(|l| *l > 0.0 && *l < 100.0);

    let Some(value) = value else {
        return match (equity, debt, ltv) {
            (Some(e), Some(d), _) => {
                derive(record, DEAL_VALUE, FieldValue::Number(e + d), &[EQUITY, DEBT])
            }
            (_, Some(d), Some(l)) => {
                derive(record, DEAL_VALUE, FieldValue::Number(d * 100.0 / l), &[DEBT, LTV])
            }
            (Some(e), _, Some(l)) => {
                let value = FieldValue::Number(e * 100.0 / (100.0 - l));
                derive(record, DEAL_VALUE, value, &[EQUITY, LTV])
            }
            _ => record,
        };
    };

    if debt.is_none() {
        if let Some(l) = ltv {
            return derive(record, DEBT, FieldValue::Number(value * l / 100.0), &[DEAL_VALUE, LTV]);
        }
        if let Some(e) = equity.filter(|e| *e < value) {
            return derive(record, DEBT, FieldValue::Number(value - e), &[DEAL_VALUE, EQUITY]);
        }
    }
    if equity.is_none() {
        if let Some(l) = ltv {
            return derive(
                record,
                EQUITY,
                FieldValue::Number(value * (100.0 - l) / 100.0),
                &[DEAL_VALUE, LTV],
            );
        }
        if let Some(d) = debt.filter(|d| *d < value) {
            return derive(record, EQUITY, FieldValue::Number(value - d), &[DEAL_VALUE, DEBT]);
        }
    }
    if record.is_missing(LTV) && value != 0.0 {
        if let Some(d) = debt {
            return derive(record, LTV, FieldValue::Number(d * 100.0 / value), &[DEBT, DEAL_VALUE]);
        }
    }
    record
}
