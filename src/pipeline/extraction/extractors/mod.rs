//! Domain extractors: one per field set.
//!
//! Each extractor supplies its rule table, master-snapshot hints and
//! cross-field checks; the shared pipeline lives on `DomainExtractor::extract`.

pub mod cost;
pub mod deal;
pub mod debt;
pub mod exit;
pub mod high_level;
pub mod revenue;

use std::sync::Arc;

use serde_json::Value;

pub use cost::CostItemsExtractor;
pub use deal::DealAssumptionsExtractor;
pub use debt::DebtModelExtractor;
pub use exit::ExitAssumptionsExtractor;
pub use high_level::HighLevelExtractor;
pub use revenue::RevenueItemsExtractor;

use super::insight::InsightPayload;
use super::patterns::{line_item_id, scan_line_items, ItemCategory};
use super::traits::{DomainExtractor, ExtractorDeps};
use super::types::*;

/// Confidence of a list assembled by the row scan.
const SCANNED_LIST_CONFIDENCE: f32 = 0.4;

/// The six extractors in output order, sharing one set of dependencies.
pub fn all_extractors(deps: &ExtractorDeps) -> Vec<Arc<dyn DomainExtractor>> {
    vec![
        Arc::new(HighLevelExtractor::new(deps.clone())),
        Arc::new(DealAssumptionsExtractor::new(deps.clone())),
        Arc::new(RevenueItemsExtractor::new(deps.clone())),
        Arc::new(CostItemsExtractor::new(deps.clone())),
        Arc::new(DebtModelExtractor::new(deps.clone())),
        Arc::new(ExitAssumptionsExtractor::new(deps.clone())),
    ]
}

// ═══════════════════════════════════════════
// Line-item helpers
// ═══════════════════════════════════════════

/// Parse a line-item array from a service payload.
///
/// Entries without a name or a scalar value are dropped; everything else
/// is optional. Items carry the field's base confidence.
pub fn parse_line_items(
    value: &Value,
    domain: InsightDomain,
    confidence: f32,
    max_items: usize,
) -> Vec<LineItem> {
    let Some(entries) = value.as_array() else {
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(|entry| {
            let name = entry.get("name")?.as_str()?.trim();
            if name.is_empty() {
                return None;
            }
            let value = entry
                .get("value")
                .or_else(|| entry.get("amount"))
                .and_then(FieldValue::from_json_scalar)?;
            Some(LineItem {
                id: line_item_id(domain, name),
                name: name.to_string(),
                value,
                growth_type: entry
                    .get("growthType")
                    .and_then(Value::as_str)
                    .map(GrowthType::normalize)
                    .unwrap_or_default(),
                growth_rate: entry.get("growthRate").and_then(FieldValue::from_json_scalar),
                category: entry
                    .get("category")
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .map(str::to_string),
                is_fixed: entry.get("isFixed").and_then(Value::as_bool),
                depreciation_years: entry.get("depreciationYears").and_then(Value::as_f64),
                confidence,
            })
        })
        .take(max_items)
        .collect()
}

/// Accept a line-item array field from the payload, if it has any items.
pub fn apply_items(
    record: DomainRecord,
    payload: &InsightPayload,
    field: &str,
    max_items: usize,
) -> DomainRecord {
    let Some(raw) = payload.field(field) else {
        return record;
    };
    let confidence = payload.base_confidence(field);
    let items = parse_line_items(raw, record.domain, confidence, max_items);
    if items.is_empty() {
        return record;
    }
    record.with_field(
        field,
        ExtractedField::found(FieldValue::Items(items), confidence, FieldSource::Ai),
    )
}

/// Fill a missing list field from label-anchored corpus rows.
pub fn scan_items_into<'a>(
    record: DomainRecord,
    field: &str,
    lines: impl Iterator<Item = &'a str>,
    categories: &[ItemCategory],
    max_items: usize,
) -> DomainRecord {
    if !record.is_missing(field) {
        return record;
    }
    let items = scan_line_items(lines, record.domain, categories, max_items);
    if items.is_empty() {
        return record;
    }
    tracing::debug!(
        domain = %record.domain,
        field,
        count = items.len(),
        "Line items from row scan"
    );
    let items = FieldValue::Items(items);
    record.with_field(
        field,
        ExtractedField::found(items, SCANNED_LIST_CONFIDENCE, FieldSource::Pattern),
    )
}

/// Whether `line` mentions one of `keywords` as a whole word.
pub(crate) fn mentions_any(line: &str, keywords: &[&str]) -> bool {
    let lower = line.to_lowercase();
    keywords.iter().any(|k| {
        lower.match_indices(k).any(|(i, _)| {
            let before = lower[..i].chars().next_back();
            let after = lower[i + k.len()..].chars().next();
            !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
        })
    })
}


#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::test_support::*;
    use super::*;

    #[test]
    fn six_extractors_in_output_order() {
        let extractors = all_extractors(&offline_deps());
        let domains: Vec<InsightDomain> = extractors.iter().map(|e| e.domain()).collect();
        assert_eq!(domains, InsightDomain::extraction_domains());
    }

    #[test]
    fn line_items_parse_leniently() {
        let raw = json!([
            {"name": "Office rent", "value": "1.2m", "growthType": "annual", "growthRate": 3, "category": "rental"},
            {"name": "", "value": 5},
            {"name": "No value"},
            {"name": "Parking", "amount": 150000, "isFixed": true}
        ]);
        let items = parse_line_items(&raw, InsightDomain::RevenueItems, 0.7, 10);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].value, FieldValue::from("1.2m"));
        assert_eq!(items[0].growth_type, GrowthType::Compound);
        assert_eq!(items[0].category.as_deref(), Some("rental"));
        assert_eq!(items[1].value, FieldValue::Number(150_000.0));
        assert_eq!(items[1].is_fixed, Some(true));
        assert_eq!(items[1].growth_type, GrowthType::Custom);
    }

    #[test]
    fn line_items_respect_cap_and_shape() {
        let raw = json!([{"name": "a", "value": 1}, {"name": "b", "value": 2}]);
        assert_eq!(parse_line_items(&raw, InsightDomain::CostItems, 0.5, 1).len(), 1);
        let single = json!({"name": "a"});
        assert!(parse_line_items(&single, InsightDomain::CostItems, 0.5, 5).is_empty());
    }

    #[test]
    fn whole_word_mentions() {
        assert!(mentions_any("Renovation CapEx: 2m", &["capex"]));
        assert!(!mentions_any("capexes", &["capex"]));
    }
}
