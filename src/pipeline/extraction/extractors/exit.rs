//! Exit assumptions: timing, multiple, route and return targets.
//!
//! Exit date and holding period are two views of the same fact. Whichever
//! is missing is derived from the other (the date via the snapshot's
//! closing date); an exit date that is already behind "today" is kept but
//! trusted half as much.

use std::sync::LazyLock;

use crate::pipeline::extraction::master::{add_months, MasterSnapshot};
use crate::pipeline::extraction::patterns::*;
use crate::pipeline::extraction::standardize::years_between;
use crate::pipeline::extraction::traits::{DomainExtractor, ExtractorDeps};
use crate::pipeline::extraction::types::*;
use crate::pipeline::extraction::validation::*;

const DISPOSAL_COST: &str = "disposalCost";
const TERMINAL_CAP_RATE: &str = "terminalCapRate";
const EXIT_MULTIPLE: &str = "exitMultiple";
const MULTIPLE_TYPE: &str = "exitMultipleType";
const TERMINAL_GROWTH: &str = "terminalGrowthRate";
const DISCOUNT_RATE: &str = "discountRate";
const EXIT_DATE: &str = "expectedExitDate";
const EXIT_ROUTE: &str = "exitRoute";
const TARGET_IRR: &str = "targetIRR";
const HOLDING_PERIOD: &str = "holdingPeriod";

const HOLD_LABEL: &str = r"holding\s+period|hold\s+period|investment\s+horizon";

static EXIT_PATTERNS: LazyLock<Vec<FieldPatterns>> = LazyLock::new(|| {
    vec![
        FieldPatterns::new(
            DISPOSAL_COST,
            vec![percent_after(
                r"disposal\s+costs?|selling\s+costs?|exit\s+costs?|sale\s+costs?",
                1.0,
            )],
        ),
        FieldPatterns::new(
            TERMINAL_CAP_RATE,
            vec![percent_after(
                r"terminal\s+cap(?:italization)?\s+rate|exit\s+cap(?:\s+rate)?|exit\s+yield",
                1.0,
            )],
        ),
        FieldPatterns::new(
            EXIT_MULTIPLE,
            vec![
                number_after(r"exit\s+multiple", 1.0),
                rule(&format!(r"(?i){NUM}\s*x\s+(?:ev\s*/\s*)?(?:ebitda|revenue|earnings)\b"), 0.8),
            ],
        ),
        FieldPatterns::new(
            MULTIPLE_TYPE,
            vec![
                word_after(r"(?:exit\s+)?multiple\s+type", 1.0),
                rule(r"(?i)\b(?P<text>EV\s*/\s*EBITDA|EV\s*/\s*Revenue|P\s*/\s*E)\b", 0.9),
                rule(r"(?i)\d\s*x\s+(?P<text>EBITDA|revenue)\b", 0.8),
            ],
        ),
        FieldPatterns::new(
            TERMINAL_GROWTH,
            vec![percent_after(
                r"terminal\s+growth(?:\s+rate)?|perpetual\s+growth(?:\s+rate)?|long[\s-]term\s+growth(?:\s+rate)?",
                1.0,
            )],
        ),
        FieldPatterns::new(
            DISCOUNT_RATE,
            vec![percent_after(r"discount\s+rate|wacc|cost\s+of\s+capital", 1.0)],
        ),
        FieldPatterns::new(
            EXIT_DATE,
            vec![
                date_after(
                    r"(?:expected\s+|target\s+|anticipated\s+)?exit\s+date|disposal\s+date",
                    1.0,
                ),
                date_after(r"exit\s+(?:in|by|on)", 0.7),
            ],
        ),
        FieldPatterns::new(
            EXIT_ROUTE,
            vec![
                word_after(r"exit\s+route|exit\s+strategy", 1.0),
                rule(
                    r"(?i)\b(?P<text>IPO|initial\s+public\s+offering|trade\s+sale|secondary\s+buyout|management\s+buyout|refinancing)\b",
                    0.6,
                ),
            ],
        ),
        FieldPatterns::new(
            TARGET_IRR,
            vec![
                percent_after(r"target(?:ed)?\s+(?:levered\s+)?irr|irr\s+target|irr", 1.0),
                percent_before(r"irr", 0.8),
            ],
        ),
        FieldPatterns::new(
            HOLDING_PERIOD,
            vec![
                years_after(HOLD_LABEL, 1.0),
                years_in_row(HOLD_LABEL, 1.0),
                rule(
                    &format!(
                        r"(?i){NUM}[\s-]+(?P<period>years?|months?)\s+(?:hold|holding\s+period|investment\s+horizon)"
                    ),
                    0.8,
                ),
            ],
        ),
    ]
});

pub struct ExitAssumptionsExtractor {
    deps: ExtractorDeps,
}

impl ExitAssumptionsExtractor {
    pub fn new(deps: ExtractorDeps) -> Self {
        Self { deps }
    }
}

impl DomainExtractor for ExitAssumptionsExtractor {
    fn domain(&self) -> InsightDomain {
        InsightDomain::ExitAssumptions
    }

    fn deps(&self) -> &ExtractorDeps {
        &self.deps
    }

    fn patterns(&self) -> &'static [FieldPatterns] {
        &EXIT_PATTERNS
    }

    fn master_hints(&self, snapshot: &MasterSnapshot) -> Vec<(&'static str, FieldValue)> {
        let exit = &snapshot.exit_assumptions;
        let mut hints = Vec::new();
        if let Some(date) = exit.expected_exit_date {
            hints.push((EXIT_DATE, FieldValue::from(date)));
        }
        if let Some(multiple) = exit.exit_multiple {
            hints.push((EXIT_MULTIPLE, FieldValue::Number(multiple)));
        }
        if let Some(route) = exit.exit_route.as_deref() {
            hints.push((EXIT_ROUTE, FieldValue::from(route)));
        }
        if let Some(years) = snapshot.holding_period_years() {
            hints.push((HOLDING_PERIOD, FieldValue::Number(years)));
        }
        if let Some(irr) = snapshot.key_metrics.target_irr {
            hints.push((TARGET_IRR, FieldValue::Number(irr)));
        }
        hints
    }

    fn validate(&self, record: DomainRecord, ctx: &ValidationContext<'_>) -> DomainRecord {
        let record = exit_date_from_hold(record, ctx);
        match date(&record, EXIT_DATE) {
            Some(exit) if exit <= ctx.today => {
                tracing::debug!(exit = %exit, today = %ctx.today, "Exit date is not in the future");
                penalize_all(record, &[EXIT_DATE], PAST_DATE_PENALTY)
            }
            Some(exit) => {
                let years = round_to_hundredths(years_between(ctx.today, exit));
                derive(record, HOLDING_PERIOD, FieldValue::Number(years), &[EXIT_DATE])
            }
            None => record,
        }
    }
}

/// Closing date plus holding period, when the exit date is missing.
fn exit_date_from_hold(record: DomainRecord, ctx: &ValidationContext<'_>) -> DomainRecord {
    if !record.is_missing(EXIT_DATE) {
        return record;
    }
    let hold = number(&record, HOLDING_PERIOD);
    let (Some(years), Some(closing)) = (hold, ctx.snapshot.closing_date()) else {
        return record;
    };
    match add_months(closing, years * 12.0) {
        Some(exit) => derive(record, EXIT_DATE, FieldValue::from(exit), &[HOLDING_PERIOD]),
        None => record,
    }
}

fn round_to_hundredths(n: f64) -> f64 {
    (n * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use serde_json::json;

    use super::*;
    use crate::pipeline::extraction::extractors::test_support::*;
    use crate::pipeline::extraction::insight::MockInsightService;

    fn extractor() -> ExitAssumptionsExtractor {
        ExitAssumptionsExtractor::new(offline_deps())
    }

    #[test]
    fn past_exit_date_is_halved_and_not_used() {
        let mock = MockInsightService::new().with_response(
            InsightDomain::ExitAssumptions,
            json!({"expectedExitDate": "2024-06-30"}),
        );
        let record = run(&ExitAssumptionsExtractor::new(deps_with(mock)), &["memo"]);
        let exit = record.get(EXIT_DATE).unwrap();
        assert_eq!(exit.value, Some(FieldValue::from("2024-06-30")));
        assert!((exit.confidence - 0.25).abs() < 1e-6);
        assert_eq!(record.get(HOLDING_PERIOD).unwrap(), &ExtractedField::missing());
    }

    #[test]
    fn future_exit_date_gives_holding_period() {
        let record = run(&extractor(), &["Expected exit date: 2030-01-01"]);
        let hold = record.get(HOLDING_PERIOD).unwrap();
        assert_eq!(hold.value, Some(FieldValue::Number(5.0)));
        assert_eq!(hold.source, FieldSource::Calculated);
        // Pattern 0.6 carried over, +0.1 in range.
        assert!((hold.confidence - 0.7).abs() < 1e-6);
    }

    #[test]
    fn hold_and_closing_date_give_exit_date() {
        let mut snapshot = MasterSnapshot::default();
        snapshot.transaction_details.closing_date = NaiveDate::from_ymd_opt(2025, 3, 31);
        let record = run_with(&extractor(), &["We underwrite a 5-year hold."], &snapshot);
        assert_eq!(numeric(&record, HOLDING_PERIOD), Some(5.0));
        let exit = record.get(EXIT_DATE).unwrap();
        assert_eq!(exit.value, Some(FieldValue::from("2030-03-31")));
        assert_eq!(exit.source, FieldSource::Calculated);
    }

    #[test]
    fn holding_period_in_months_is_converted() {
        let mut snapshot = MasterSnapshot::default();
        snapshot.transaction_details.closing_date = NaiveDate::from_ymd_opt(2025, 3, 31);
        let record = run_with(&extractor(), &["Holding period: 24 months"], &snapshot);
        let hold = record.get(HOLDING_PERIOD).unwrap();
        assert_eq!(hold.value, Some(FieldValue::Number(2.0)));
        assert_eq!(hold.source, FieldSource::Pattern);
        assert_eq!(text(&record, EXIT_DATE), Some("2027-03-31"));
    }

    #[test]
    fn holding_period_units() {
        let cases = [
            ("Holding period: 5 years", 5.0),
            ("Investment horizon of 7", 7.0),
            ("Holding Period,,,,,60", 5.0),
            ("Holding period (years),,,,,4", 4.0),
            ("An 18-month hold is assumed.", 1.5),
        ];
        for (memo, years) in cases {
            let record = run(&extractor(), &[memo]);
            assert_eq!(numeric(&record, HOLDING_PERIOD), Some(years), "{memo}");
        }
    }

    #[test]
    fn exit_terms_from_a_memo() {
        let record = run(
            &extractor(),
            &["Exit multiple: 8.5x EBITDA. Exit route: IPO. Target IRR of 20%. \
Discount rate (WACC): 10%. Terminal growth rate: 2%. Disposal costs: 1.5%. Terminal cap rate: 6.25%."],
        );
        assert_eq!(numeric(&record, EXIT_MULTIPLE), Some(8.5));
        assert_eq!(text(&record, MULTIPLE_TYPE), Some("EV/EBITDA"));
        assert_eq!(text(&record, EXIT_ROUTE), Some("IPO"));
        assert_eq!(numeric(&record, TARGET_IRR), Some(20.0));
        assert_eq!(numeric(&record, DISCOUNT_RATE), Some(10.0));
        assert_eq!(numeric(&record, TERMINAL_GROWTH), Some(2.0));
        assert_eq!(numeric(&record, DISPOSAL_COST), Some(1.5));
        assert_eq!(numeric(&record, TERMINAL_CAP_RATE), Some(6.25));
        assert_eq!(record.get(EXIT_DATE).unwrap(), &ExtractedField::missing());
    }

    #[test]
    fn snapshot_fills_exit_plan() {
        let mut snapshot = MasterSnapshot::default();
        snapshot.exit_assumptions.holding_period_months = Some(60.0);
        snapshot.exit_assumptions.exit_route = Some("secondary".into());
        snapshot.key_metrics.target_irr = Some(18.0);
        snapshot.overall_confidence = 0.5;

        let record = run_with(&extractor(), &["nothing"], &snapshot);
        assert_eq!(numeric(&record, HOLDING_PERIOD), Some(5.0));
        assert_eq!(text(&record, EXIT_ROUTE), Some("secondary_buyout"));
        let irr = record.get(TARGET_IRR).unwrap();
        assert_eq!(irr.source, FieldSource::Derived);
        // 0.8 × 0.5 hint confidence, +0.1 in range.
        assert!((irr.confidence - 0.5).abs() < 1e-6);
    }
}
