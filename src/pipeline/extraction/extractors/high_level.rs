//! High-level model parameters: currency, project dates, period granularity.

use std::sync::LazyLock;

use crate::pipeline::extraction::master::MasterSnapshot;
use crate::pipeline::extraction::patterns::*;
use crate::pipeline::extraction::traits::{DomainExtractor, ExtractorDeps};
use crate::pipeline::extraction::types::*;
use crate::pipeline::extraction::validation::{check_date_order, ValidationContext};

const CURRENCY: &str = "currency";
const START_DATE: &str = "projectStartDate";
const END_DATE: &str = "projectEndDate";
const MODEL_PERIODS: &str = "modelPeriods";

static HIGH_LEVEL_PATTERNS: LazyLock<Vec<FieldPatterns>> = LazyLock::new(|| {
    vec![
        FieldPatterns::new(
            CURRENCY,
            vec![
                text_after(r"(?:model|reporting|base|functional)\s+currency", 1.0),
                text_after(r"currency", 0.8),
                rule(
                    r"(?i)\b(?:denominated|presented|stated|figures)\s+in\s+(?P<text>USD|EUR|GBP|JPY|CHF|CAD|AUD|SGD|HKD|dollars|euros|pounds)\b",
                    0.6,
                ),
            ],
        ),
        FieldPatterns::new(
            START_DATE,
            vec![
                date_after(r"(?:project\s+)?start\s+date|commencement\s+date|model\s+start", 1.0),
                date_after(r"acquisition\s+date|closing\s+date|completion\s+date", 0.7),
            ],
        ),
        FieldPatterns::new(
            END_DATE,
            vec![
                date_after(r"(?:project\s+)?end\s+date|model\s+end", 1.0),
                date_after(r"(?:expected\s+)?exit\s+date", 0.7),
            ],
        ),
        FieldPatterns::new(
            MODEL_PERIODS,
            vec![
                word_after(r"model\s+periods?|periodicity|period\s+granularity|time\s+step", 1.0),
                rule(
                    r"(?i)\b(?P<text>daily|monthly|quarterly|annual|yearly)\s+(?:model|periods|cash\s*flows?|projections?)\b",
                    0.6,
                ),
            ],
        ),
    ]
});

pub struct HighLevelExtractor {
    deps: ExtractorDeps,
}

impl HighLevelExtractor {
    pub fn new(deps: ExtractorDeps) -> Self {
        Self { deps }
    }
}

impl DomainExtractor for HighLevelExtractor {
    fn domain(&self) -> InsightDomain {
        InsightDomain::HighLevelParameters
    }

    fn deps(&self) -> &ExtractorDeps {
        &self.deps
    }

    fn patterns(&self) -> &'static [FieldPatterns] {
        &HIGH_LEVEL_PATTERNS
    }

    fn currency_field(&self) -> Option<&'static str> {
        Some(CURRENCY)
    }

    fn master_hints(&self, snapshot: &MasterSnapshot) -> Vec<(&'static str, FieldValue)> {
        let mut hints = Vec::new();
        if let Some(currency) = snapshot.currency() {
            hints.push((CURRENCY, FieldValue::from(currency)));
        }
        if let Some(start) = snapshot.closing_date() {
            hints.push((START_DATE, FieldValue::from(start)));
        }
        if let Some(end) = snapshot.exit_assumptions.expected_exit_date {
            hints.push((END_DATE, FieldValue::from(end)));
        }
        hints
    }

    fn validate(&self, record: DomainRecord, _ctx: &ValidationContext<'_>) -> DomainRecord {
        check_date_order(record, START_DATE, END_DATE)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use serde_json::json;

    use super::*;
    use crate::pipeline::extraction::extractors::test_support::*;
    use crate::pipeline::extraction::insight::MockInsightService;

    fn extractor() -> HighLevelExtractor {
        HighLevelExtractor::new(offline_deps())
    }

    #[test]
    fn parameters_from_a_csv_dump() {
        let record = run(
            &extractor(),
            &["Model Currency,,,,,EUR\nProject Start Date,,,,,2025-07-01\nProject End Date,,,,,30/06/2032\nModel Periods,,,,,Quarterly"],
        );
        assert_eq!(text(&record, CURRENCY), Some("EUR"));
        assert_eq!(text(&record, START_DATE), Some("2025-07-01"));
        assert_eq!(text(&record, END_DATE), Some("2032-06-30"));
        assert_eq!(text(&record, MODEL_PERIODS), Some("quarterly"));
        assert_eq!(record.get(CURRENCY).unwrap().source, FieldSource::Pattern);
    }

    #[test]
    fn narrative_dates_and_symbols() {
        let record = run(
            &extractor(),
            &["All figures in GBP. The project start date is March 31, 2025 with monthly cash flows."],
        );
        assert_eq!(text(&record, CURRENCY), Some("GBP"));
        assert_eq!(text(&record, START_DATE), Some("2025-03-31"));
        assert_eq!(text(&record, MODEL_PERIODS), Some("monthly"));
        assert_eq!(record.get(END_DATE).unwrap(), &ExtractedField::missing());
    }

    #[test]
    fn reversed_dates_lose_confidence() {
        let mock = MockInsightService::new().with_response(
            InsightDomain::HighLevelParameters,
            json!({"projectStartDate": "2030-01-01", "projectEndDate": "2025-01-01"}),
        );
        let record = run(&HighLevelExtractor::new(deps_with(mock)), &["memo"]);
        assert!((record.get(START_DATE).unwrap().confidence - 0.4).abs() < 1e-6);
        assert!((record.get(END_DATE).unwrap().confidence - 0.4).abs() < 1e-6);
    }

    #[test]
    fn snapshot_supplies_dates_and_currency() {
        let mut snapshot = MasterSnapshot::default();
        snapshot.transaction_details.currency = Some("$".into());
        snapshot.transaction_details.closing_date = NaiveDate::from_ymd_opt(2025, 3, 31);
        snapshot.exit_assumptions.expected_exit_date = NaiveDate::from_ymd_opt(2030, 3, 31);

        let record = run_with(&extractor(), &["no labels here"], &snapshot);
        assert_eq!(text(&record, CURRENCY), Some("USD"));
        assert_eq!(text(&record, START_DATE), Some("2025-03-31"));
        assert_eq!(text(&record, END_DATE), Some("2030-03-31"));
        assert_eq!(record.get(END_DATE).unwrap().source, FieldSource::Derived);
        assert!((record.get(END_DATE).unwrap().confidence - 0.2).abs() < 1e-6);
    }

    #[test]
    fn unknown_period_label_is_annotated() {
        let mock = MockInsightService::new().with_response(
            InsightDomain::HighLevelParameters,
            json!({"modelPeriods": "fortnightly"}),
        );
        let record = run(&HighLevelExtractor::new(deps_with(mock)), &["memo"]);
        let field = record.get(MODEL_PERIODS).unwrap();
        assert_eq!(field.value, Some(FieldValue::from("fortnightly")));
        assert!(field.error.is_some());
    }
}
