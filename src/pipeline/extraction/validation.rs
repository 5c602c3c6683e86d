//! Cross-field validation helpers shared by the domain extractors.
//!
//! A validator may only fill a missing field by derivation (`source =
//! calculated`) or multiply an existing field's confidence down. It never
//! replaces a present value.

use chrono::NaiveDate;

use super::master::MasterSnapshot;
use super::schema::{field_spec, FieldKind};
use super::standardize::{numeric_view, parse_date, standardize_number_value};
use super::types::*;

/// Confidence factor applied to every field involved in an inconsistency.
pub const INCONSISTENCY_PENALTY: f32 = 0.8;

/// Confidence factor for an exit date that is not in the future.
pub const PAST_DATE_PENALTY: f32 = 0.5;

/// Read-only inputs a validator may consult.
#[derive(Debug, Clone, Copy)]
pub struct ValidationContext<'a> {
    pub snapshot: &'a MasterSnapshot,
    /// "Now" for date arithmetic.
    pub today: NaiveDate,
}

impl<'a> ValidationContext<'a> {
    pub fn new(snapshot: &'a MasterSnapshot, today: NaiveDate) -> Self {
        Self { snapshot, today }
    }
}

/// Numeric reading of a field in its canonical unit (percentages on 0–100).
pub fn number(record: &DomainRecord, name: &str) -> Option<f64> {
    let value = record.value(name)?;
    match field_spec(record.domain, name).map(|s| s.kind) {
        Some(kind @ (FieldKind::Percentage | FieldKind::Currency | FieldKind::Number)) => {
            numeric_view(value, kind)
        }
        _ => standardize_number_value(value).ok(),
    }
}

/// Date reading of a field.
pub fn date(record: &DomainRecord, name: &str) -> Option<NaiveDate> {
    record.value(name)?.as_text().and_then(parse_date)
}

/// Label reading of a field, lowercased.
pub fn label(record: &DomainRecord, name: &str) -> Option<String> {
    record.value(name)?.as_text().map(|s| s.trim().to_lowercase())
}

pub fn confidence(record: &DomainRecord, name: &str) -> f32 {
    record.get(name).map_or(0.0, |f| f.confidence)
}

/// Fill a missing field with a computed value. Confidence is the weakest
/// of the inputs it was computed from.
pub fn derive(
    record: DomainRecord,
    name: &str,
    value: FieldValue,
    inputs: &[&str],
) -> DomainRecord {
    if !record.is_missing(name) {
        return record;
    }
    let confidence = inputs
        .iter()
        .map(|input| confidence(&record, input))
        .fold(1.0_f32, f32::min);
    tracing::debug!(domain = %record.domain, field = name, inputs = ?inputs, "Derived field");
    record.with_field(
        name,
        ExtractedField::found(value, confidence, FieldSource::Calculated),
    )
}

/// Multiply the confidence of every named field by `factor`.
pub fn penalize_all(record: DomainRecord, names: &[&str], factor: f32) -> DomainRecord {
    tracing::debug!(domain = %record.domain, fields = ?names, factor, "Inconsistency penalty");
    names
        .iter()
        .fold(record, |record, name| record.penalize(name, factor))
}

/// `|actual - expected| / |expected|`. Undefined for a zero expectation.
pub fn relative_gap(actual: f64, expected: f64) -> Option<f64> {
    (expected != 0.0).then(|| (actual - expected).abs() / expected.abs())
}

/// Sum of numeric line-item values and the weakest item confidence.
pub fn item_total(record: &DomainRecord, name: &str) -> Option<(f64, f32)> {
    let items = record.value(name)?.as_items()?;
    let mut total = 0.0;
    let mut weakest = 1.0_f32;
    let mut counted = 0;
    for item in items {
        if let Ok(n) = standardize_number_value(&item.value) {
            total += n;
            weakest = weakest.min(item.confidence);
            counted += 1;
        }
    }
    (counted > 0).then_some((total, weakest))
}

/// Aggregate vs. line items: derive a missing total by summation, or
/// penalize a present total that diverges by more than `tolerance`.
pub fn reconcile_total(
    record: DomainRecord,
    items_field: &str,
    total_field: &str,
    tolerance: f64,
) -> DomainRecord {
    let Some((sum, weakest)) = item_total(&record, items_field) else {
        return record;
    };

    match number(&record, total_field) {
        None => {
            let confidence = weakest.min(confidence(&record, items_field));
            tracing::debug!(
                domain = %record.domain,
                field = total_field,
                sum,
                "Derived total from line items"
            );
            record.with_field(
                total_field,
                ExtractedField::found(FieldValue::Number(sum), confidence, FieldSource::Calculated),
            )
        }
        Some(total) => match relative_gap(sum, total) {
            Some(gap) if gap > tolerance => {
                tracing::debug!(
                    domain = %record.domain,
                    field = total_field,
                    total,
                    sum,
                    gap,
                    "Line items diverge from total"
                );
                record.penalize(total_field, INCONSISTENCY_PENALTY)
            }
            _ => record,
        },
    }
}

/// Penalize both dates when `end` precedes `start`.
pub fn check_date_order(record: DomainRecord, start: &str, end: &str) -> DomainRecord {
    match (date(&record, start), date(&record, end)) {
        (Some(s), Some(e)) if e < s => penalize_all(record, &[start, end], INCONSISTENCY_PENALTY),
        _ => record,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn found(value: FieldValue, confidence: f32) -> ExtractedField {
        ExtractedField::found(value, confidence, FieldSource::Ai)
    }

    fn revenue_record() -> DomainRecord {
        DomainRecord::empty(InsightDomain::RevenueItems, &["revenueItems", "totalRevenue"])
    }

    fn item(value: f64, confidence: f32) -> LineItem {
        LineItem {
            id: value.to_string(),
            name: format!("item {value}"),
            value: FieldValue::Number(value),
            growth_type: GrowthType::Custom,
            growth_rate: None,
            category: None,
            is_fixed: None,
            depreciation_years: None,
            confidence,
        }
    }

    #[test]
    fn number_reads_percent_fraction_as_percent() {
        let record = DomainRecord::empty(InsightDomain::DealAssumptions, &["dealLTV", "dealValue"])
            .with_field("dealLTV", found(FieldValue::Number(0.7), 0.6))
            .with_field("dealValue", found("100 million".into(), 0.6));
        assert_eq!(number(&record, "dealLTV"), Some(70.0));
        assert_eq!(number(&record, "dealValue"), Some(1e8));
        assert_eq!(number(&record, "equityContribution"), None);
    }

    #[test]
    fn derive_uses_weakest_input_and_never_overwrites() {
        let names = ["dealValue", "dealLTV", "debtFinancing"];
        let record = DomainRecord::empty(InsightDomain::DealAssumptions, &names)
            .with_field("dealValue", found(FieldValue::Number(1e8), 0.8))
            .with_field("dealLTV", found(FieldValue::Number(70.0), 0.6));
        let inputs = ["dealValue", "dealLTV"];
        let record = derive(record, "debtFinancing", FieldValue::Number(7e7), &inputs);
        let debt = record.get("debtFinancing").unwrap();
        assert_eq!(debt.source, FieldSource::Calculated);
        assert!((debt.confidence - 0.6).abs() < f32::EPSILON);

        let record = derive(record, "dealValue", FieldValue::Number(1.0), &["dealLTV"]);
        assert_eq!(record.value("dealValue"), Some(&FieldValue::Number(1e8)));
    }

    #[test]
    fn relative_gap_handles_zero() {
        assert_eq!(relative_gap(110.0, 100.0), Some(0.1));
        assert_eq!(relative_gap(1.0, 0.0), None);
    }

    #[test]
    fn total_derived_from_items() {
        let items = FieldValue::Items(vec![item(100.0, 0.7), item(50.0, 0.5)]);
        let record = revenue_record().with_field("revenueItems", found(items, 0.6));
        let record = reconcile_total(record, "revenueItems", "totalRevenue", 0.2);
        let total = record.get("totalRevenue").unwrap();
        assert_eq!(total.value, Some(FieldValue::Number(150.0)));
        assert_eq!(total.source, FieldSource::Calculated);
        assert!((total.confidence - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn diverging_total_is_penalized() {
        let record = revenue_record()
            .with_field("revenueItems", found(FieldValue::Items(vec![item(100.0, 0.7)]), 0.6))
            .with_field("totalRevenue", found(FieldValue::Number(200.0), 0.5));
        let record = reconcile_total(record, "revenueItems", "totalRevenue", 0.2);
        let total = record.get("totalRevenue").unwrap();
        assert_eq!(total.value, Some(FieldValue::Number(200.0)));
        assert!((total.confidence - 0.4).abs() < 1e-6);
    }

    #[test]
    fn close_total_is_left_alone() {
        let record = revenue_record()
            .with_field("revenueItems", found(FieldValue::Items(vec![item(110.0, 0.7)]), 0.6))
            .with_field("totalRevenue", found(FieldValue::Number(100.0), 0.5));
        let record = reconcile_total(record, "revenueItems", "totalRevenue", 0.2);
        assert!((confidence(&record, "totalRevenue") - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn reversed_dates_are_penalized() {
        let names = ["projectStartDate", "projectEndDate"];
        let record = DomainRecord::empty(InsightDomain::HighLevelParameters, &names)
            .with_field("projectStartDate", found("2030-01-01".into(), 0.5))
            .with_field("projectEndDate", found("31/12/2025".into(), 0.5));
        let record = check_date_order(record, "projectStartDate", "projectEndDate");
        assert!((confidence(&record, "projectStartDate") - 0.4).abs() < 1e-6);
        assert!((confidence(&record, "projectEndDate") - 0.4).abs() < 1e-6);
    }
}
