//! Debt model: rate structure, fees, amount, term and facility type.

use std::sync::LazyLock;

use crate::pipeline::extraction::master::MasterSnapshot;
use crate::pipeline::extraction::patterns::*;
use crate::pipeline::extraction::schema::InterestRateType;
use crate::pipeline::extraction::traits::{DomainExtractor, ExtractorDeps};
use crate::pipeline::extraction::types::*;
use crate::pipeline::extraction::validation::*;

const ISSUANCE_FEES: &str = "loanIssuanceFees";
const RATE_TYPE: &str = "interestRateType";
const INTEREST_RATE: &str = "interestRate";
const BASE_RATE: &str = "baseRate";
const CREDIT_MARGIN: &str = "creditMargin";
const LOAN_TERM: &str = "loanTerm";
const LOAN_AMOUNT: &str = "loanAmount";
const COMMITMENT_FEE: &str = "commitmentFee";
const PREPAYMENT_PENALTY: &str = "prepaymentPenalty";
const DEBT_TYPE: &str = "debtType";
const CURRENCY: &str = "debtCurrency";
const AMORTIZATION: &str = "amortizationType";

/// Percentage points between `base + margin` and the all-in rate.
const RATE_TOLERANCE: f64 = 0.5;

const BENCHMARKS: &str = r"sofr|euribor|libor|sonia|base\s+rate|reference\s+rate";

static DEBT_PATTERNS: LazyLock<Vec<FieldPatterns>> = LazyLock::new(|| {
    vec![
        FieldPatterns::new(
            ISSUANCE_FEES,
            vec![percent_after(
                r"(?:loan\s+)?(?:issuance|arrangement|upfront|origination)\s+fees?",
                1.0,
            )],
        ),
        FieldPatterns::new(
            RATE_TYPE,
            vec![
                word_after(r"interest\s+rate\s+type|rate\s+type", 1.0),
                rule(r"(?i)\b(?P<text>fixed|floating|variable)[\s-]+rate\b", 0.8),
            ],
        ),
        FieldPatterns::new(
            INTEREST_RATE,
            vec![
                percent_after(r"all[\s-]+in\s+(?:interest\s+)?rate|interest\s+rate|coupon", 1.0),
                percent_before(r"interest|coupon", 0.7),
            ],
        ),
        // `SOFR + 3.25%` quotes the margin, not the benchmark.
        FieldPatterns::new(
            BASE_RATE,
            vec![rule(&format!(r"(?i)\b(?:{BENCHMARKS})\b[^\n\d+]{{0,30}}{NUM}\s*%"), 1.0)],
        ),
        FieldPatterns::new(
            CREDIT_MARGIN,
            vec![
                percent_after(r"(?:credit\s+)?margin|spread", 1.0),
                rule(&format!(r"(?i)\b(?:{BENCHMARKS})\s*\+\s*{NUM}\s*%"), 0.8),
            ],
        ),
        FieldPatterns::new(
            LOAN_TERM,
            vec![
                number_after(r"loan\s+term|tenor|term\s+of\s+the\s+loan|maturity", 1.0),
                rule(&format!(r"(?i){NUM}[\s-]+years?\s+(?:term|tenor|loan|facility)"), 0.7),
            ],
        ),
        FieldPatterns::new(
            LOAN_AMOUNT,
            vec![
                amount_after(
                    r"loan\s+amount|facility\s+(?:amount|size)|principal|senior\s+loan",
                    1.0,
                ),
                amount_after(r"debt\s+financing|borrowings?", 0.7),
            ],
        ),
        FieldPatterns::new(
            COMMITMENT_FEE,
            vec![percent_after(r"commitment\s+fees?|undrawn\s+fees?", 1.0)],
        ),
        FieldPatterns::new(
            PREPAYMENT_PENALTY,
            vec![percent_after(
                r"prepayment\s+(?:penalty|fee|premium)|early\s+repayment\s+(?:fee|penalty)",
                1.0,
            )],
        ),
        FieldPatterns::new(
            DEBT_TYPE,
            vec![
                word_after(r"debt\s+type|facility\s+type|loan\s+type", 1.0),
                rule(
                    r"(?i)\b(?P<text>senior\s+secured|senior|subordinated|mezzanine|revolving\s+credit\s+facility|revolver|term\s+loan)\b",
                    0.6,
                ),
            ],
        ),
        FieldPatterns::new(
            CURRENCY,
            vec![
                text_after(r"debt\s+currency|loan\s+currency|facility\s+currency", 1.0),
                text_after(r"currency", 0.5),
            ],
        ),
        FieldPatterns::new(
            AMORTIZATION,
            vec![
                word_after(
                    r"amortization\s+(?:type|profile)|amortisation\s+(?:type|profile)|repayment\s+profile",
                    1.0,
                ),
                rule(
                    r"(?i)\b(?P<text>bullet|balloon|interest[\s-]only|straight[\s-]line)\b",
                    0.6,
                ),
            ],
        ),
    ]
});

pub struct DebtModelExtractor {
    deps: ExtractorDeps,
}

impl DebtModelExtractor {
    pub fn new(deps: ExtractorDeps) -> Self {
        Self { deps }
    }
}

impl DomainExtractor for DebtModelExtractor {
    fn domain(&self) -> InsightDomain {
        InsightDomain::DebtModel
    }

    fn deps(&self) -> &ExtractorDeps {
        &self.deps
    }

    fn patterns(&self) -> &'static [FieldPatterns] {
        &DEBT_PATTERNS
    }

    fn currency_field(&self) -> Option<&'static str> {
        Some(CURRENCY)
    }

    fn master_hints(&self, snapshot: &MasterSnapshot) -> Vec<(&'static str, FieldValue)> {
        let f = &snapshot.financing_structure;
        let mut hints: Vec<(&'static str, FieldValue)> = [
            (INTEREST_RATE, f.interest_rate),
            (LOAN_AMOUNT, f.debt_financing),
            (LOAN_TERM, f.loan_term_years),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.map(|v| (name, FieldValue::Number(v))))
        .collect();
        if let Some(currency) = snapshot.currency() {
            hints.push((CURRENCY, FieldValue::from(currency)));
        }
        hints
    }

    fn validate(&self, record: DomainRecord, _ctx: &ValidationContext<'_>) -> DomainRecord {
        let floating = label(&record, RATE_TYPE)
            .and_then(|l| InterestRateType::parse(&l))
            .is_some_and(|t| t == InterestRateType::Floating);

        let base = number(&record, BASE_RATE);
        let margin = number(&record, CREDIT_MARGIN);
        match (base, margin, number(&record, INTEREST_RATE)) {
            (Some(b), Some(m), None) if floating => {
                let rate = FieldValue::Number(b + m);
                derive(record, INTEREST_RATE, rate, &[BASE_RATE, CREDIT_MARGIN])
            }
            (Some(b), Some(m), Some(rate)) if (b + m - rate).abs() > RATE_TOLERANCE => {
                penalize_all(record, &[INTEREST_RATE], INCONSISTENCY_PENALTY)
            }
            _ => record,
        }
    }
}
