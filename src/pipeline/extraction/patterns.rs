//! Pattern library: weighted regex rules used when the AI pass has nothing.
//!
//! Every field owns an ordered list of `PatternRule`s. All rules run against
//! the concatenated corpus; every match is parsed, scaled by its unit word and
//! checked against the field's plausible range. Among the survivors the
//! highest weight wins, ties going to the match that appears first in the
//! corpus. Each extractor declares its own rule table with the helpers below.

use std::sync::LazyLock;

use regex::Regex;
use uuid::Uuid;

use super::schema::{field_spec, FieldKind, FieldSpec};
use super::standardize::{parse_date, standardize_currency_code, unit_multiplier};
use super::types::*;

/// Numeric capture shared by every rule: `1,250.5`, `30000000`, `.5`.
pub const NUM: &str = r"(?P<num>\d[\d,]*(?:\.\d+)?|\.\d+)";

/// Optional magnitude word following a number.
pub const UNIT: &str = r"(?:\s*(?P<unit>billion|million|thousand|bn|mm|mn|b|m|k)\b)?";

/// Pattern confidence is the rule weight scaled into this band.
const PATTERN_CONFIDENCE_SCALE: f32 = 0.6;

/// Namespace for stable line-item ids.
const LINE_ITEM_NAMESPACE: Uuid = Uuid::NAMESPACE_OID;

static ITEM_VALUE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)[$€£]?\s*{NUM}{UNIT}")).unwrap()
});

static ITEM_GROWTH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?P<num>-?\d+(?:\.\d+)?)\s*%").unwrap()
});

/// One weighted candidate rule for a field.
#[derive(Debug, Clone)]
pub struct PatternRule {
    pub regex: Regex,
    pub weight: f32,
}

/// All rules for one field, in declaration order.
#[derive(Debug, Clone)]
pub struct FieldPatterns {
    pub field: &'static str,
    pub rules: Vec<PatternRule>,
}

impl FieldPatterns {
    pub fn new(field: &'static str, rules: Vec<PatternRule>) -> Self {
        Self { field, rules }
    }
}

/// Compile a rule. Only called while initializing static rule tables.
pub fn rule(pattern: &str, weight: f32) -> PatternRule {
    PatternRule {
        regex: Regex::new(pattern).unwrap(),
        weight,
    }
}

/// Money or magnitude anchored on a label: `Deal Value: $50 million`,
/// `Equity Contribution,,,,,30000000`.
pub fn amount_after(label: &str, weight: f32) -> PatternRule {
    rule(
        &format!(r"(?i)\b(?:{label})\b[^\n\d$€£]{{0,30}}[$€£]?\s*{NUM}{UNIT}"),
        weight,
    )
}

/// Percentage anchored on a label: `LTV: 70%`, `interest rate of 6.5 %`.
pub fn percent_after(label: &str, weight: f32) -> PatternRule {
    rule(
        &format!(r"(?i)\b(?:{label})\b[^\n\d]{{0,30}}{NUM}\s*(?:%|percent\b|pct\b)"),
        weight,
    )
}

/// Percentage followed by its label: `70% LTV`.
pub fn percent_before(label: &str, weight: f32) -> PatternRule {
    rule(
        &format!(r"(?i){NUM}\s*(?:%|percent\b)\s*(?:\w+\s+){{0,2}}(?:{label})\b"),
        weight,
    )
}

/// Plain number anchored on a label, no percent sign required.
pub fn number_after(label: &str, weight: f32) -> PatternRule {
    rule(&format!(r"(?i)\b(?:{label})\b[^\n\d]{{0,30}}{NUM}"), weight)
}

/// Optional duration unit following a number.
const PERIOD: &str = r"(?:\s*(?P<period>months?|mos?|years?|yrs?)\b)?";

/// Duration in years after a label: `Holding period: 24 months`,
/// `hold period of 5 years`. A bare number counts as years.
pub fn years_after(label: &str, weight: f32) -> PatternRule {
    rule(
        &format!(r"(?i)\b(?:{label})\b(?P<head>[^\n\d,;\t]{{0,30}}){NUM}{PERIOD}"),
        weight,
    )
}

/// Duration in a spreadsheet row: `Holding Period,,,,,60`. A bare cell
/// counts as months unless the label names the unit.
pub fn years_in_row(label: &str, weight: f32) -> PatternRule {
    rule(
        &format!(
            r"(?i)\b(?:{label})\b(?P<head>[^\n\d,;\t]{{0,30}})(?P<cell>[,;\t][,;\t ]*){NUM}{PERIOD}"
        ),
        weight,
    )
}

/// Free text after a label and separator, up to the end of the cell or line.
pub fn text_after(label: &str, weight: f32) -> PatternRule {
    rule(
        &format!(r"(?im)\b(?:{label})\b\s*[:=,\t]+\s*(?P<text>[^,;\t\r\n]+?)\s*$"),
        weight,
    )
}

/// Free text between a label and the next separator.
pub fn word_after(label: &str, weight: f32) -> PatternRule {
    rule(
        &format!(r"(?i)\b(?:{label})\b\s*[:=,\t]*\s*(?P<text>[A-Za-z/][A-Za-z/ \-]{{1,30}})"),
        weight,
    )
}

/// Date literal after a label: `Closing date: March 31, 2025`,
/// `Acquisition date,,,,,31/03/2025`.
pub fn date_after(label: &str, weight: f32) -> PatternRule {
    rule(
        &format!(r"(?i)\b(?:{label})\b[^\n\d]{{0,30}}?(?P<text>{DATE})"),
        weight,
    )
}

/// Date shapes understood by `parse_date`.
const DATE: &str = r"\d{4}-\d{1,2}-\d{1,2}|\d{1,2}[/.\-]\d{1,2}[/.\-]\d{2,4}|[A-Za-z]{3,9}\.?\s+\d{1,2},?\s+\d{4}|\d{1,2}\s+[A-Za-z]{3,9}\.?,?\s+\d{4}";

/// A candidate that survived parsing and plausibility checks.
#[derive(Debug, Clone)]
struct Candidate {
    value: FieldValue,
    weight: f32,
    offset: usize,
}

/// Match one field against corpus text.
///
/// Returns `None` when no candidate survives plausibility filtering.
pub fn match_field(
    text: &str,
    patterns: &FieldPatterns,
    spec: &FieldSpec,
) -> Option<ExtractedField> {
    let mut best: Option<Candidate> = None;

    for rule in &patterns.rules {
        for caps in rule.regex.captures_iter(text) {
            let Some(whole) = caps.get(0) else { continue };
            let Some(value) = parse_capture(&caps, spec) else {
                continue;
            };
            let candidate = Candidate {
                value,
                weight: rule.weight,
                offset: whole.start(),
            };
            let better = match &best {
                None => true,
                Some(b) => {
                    candidate.weight > b.weight
                        || (candidate.weight == b.weight && candidate.offset < b.offset)
                }
            };
            if better {
                best = Some(candidate);
            }
        }
    }

    best.map(|c| {
        ExtractedField::found(c.value, c.weight * PATTERN_CONFIDENCE_SCALE, FieldSource::Pattern)
    })
}

/// Parse the captures of one match according to the field kind and
/// reject values outside the plausible range.
fn parse_capture(caps: &regex::Captures<'_>, spec: &FieldSpec) -> Option<FieldValue> {
    match spec.kind {
        FieldKind::Currency | FieldKind::Number => {
            let mut n: f64 = caps.name("num")?.as_str().replace(',', "").parse().ok()?;
            if let Some(unit) = caps.name("unit") {
                n *= unit_multiplier(unit.as_str()).unwrap_or(1.0);
            }
            if counts_months(caps) {
                n /= 12.0;
            }
            spec.in_range(n).then_some(FieldValue::Number(n))
        }
        // Kept with its sign so `0.35%` is never read back as a fraction.
        FieldKind::Percentage => {
            let raw = caps.name("num")?.as_str().replace(',', "");
            let n: f64 = raw.parse().ok()?;
            spec.in_range(n).then(|| FieldValue::Text(format!("{raw}%")))
        }
        FieldKind::Date => {
            let raw = caps.name("text")?.as_str().trim();
            parse_date(raw).map(FieldValue::from)
        }
        FieldKind::CurrencyCode => {
            let raw = caps.name("text")?.as_str().trim();
            standardize_currency_code(raw).ok().map(FieldValue::from)
        }
        FieldKind::Category(kind) => {
            let raw = caps.name("text")?.as_str().trim();
            kind.normalize(raw).map(FieldValue::from)
        }
        FieldKind::Text => {
            let raw = caps.name("text")?.as_str().trim();
            (!raw.is_empty()).then(|| FieldValue::from(raw))
        }
        FieldKind::Items => None,
    }
}

/// Whether a duration capture is in months: an explicit unit wins, then a
/// unit named in the label, then the row rule's months default.
fn counts_months(caps: &regex::Captures<'_>) -> bool {
    if let Some(period) = caps.name("period") {
        return period.as_str().to_lowercase().starts_with("mo");
    }
    let head = caps.name("head").map_or(String::new(), |m| m.as_str().to_lowercase());
    if head.contains("month") {
        true
    } else if head.contains("year") {
        false
    } else {
        caps.name("cell").is_some()
    }
}

/// Fill every still-missing field of `record` from its rule table.
pub fn fill_from_patterns(
    record: DomainRecord,
    text: &str,
    table: &[FieldPatterns],
) -> DomainRecord {
    let domain = record.domain;
    table.iter().fold(record, |record, patterns| {
        if !record.is_missing(patterns.field) {
            return record;
        }
        let Some(spec) = field_spec(domain, patterns.field) else {
            return record;
        };
        match match_field(text, patterns, spec) {
            Some(field) => {
                tracing::debug!(
                    domain = %domain,
                    field = patterns.field,
                    confidence = field.confidence,
                    "Pattern fallback matched"
                );
                record.with_field(patterns.field, field)
            }
            None => record,
        }
    })
}

// ═══════════════════════════════════════════
// Line-item heuristics
// ═══════════════════════════════════════════

/// Keywords that mark a row as a line item of some category.
#[derive(Debug, Clone, Copy)]
pub struct ItemCategory {
    pub category: &'static str,
    pub keywords: &'static [&'static str],
}

/// Stable id for a line item: UUID v5 of `(domain, lowercase name)`.
pub fn line_item_id(domain: InsightDomain, name: &str) -> String {
    let key = format!("{}:{}", domain.as_str(), name.trim().to_lowercase());
    Uuid::new_v5(&LINE_ITEM_NAMESPACE, key.as_bytes()).to_string()
}

/// Scan corpus lines for label-anchored rows (`Rent, 1200000`,
/// `Parking revenue: $150k growing 3%`). Rows mentioning "total" are
/// aggregates, not items, and are skipped.
pub fn scan_line_items<'a>(
    lines: impl Iterator<Item = &'a str>,
    domain: InsightDomain,
    categories: &[ItemCategory],
    max_items: usize,
) -> Vec<LineItem> {
    let mut items = Vec::new();

    for line in lines {
        if items.len() >= max_items {
            break;
        }
        let lower = line.to_lowercase();
        if lower.contains("total") {
            continue;
        }
        let Some(category) = categories
            .iter()
            .find(|c| c.keywords.iter().any(|k| contains_word(&lower, k)))
        else {
            continue;
        };
        if let Some(item) = parse_item_row(line, domain, category.category) {
            items.push(item);
        }
    }

    items
}

fn parse_item_row(line: &str, domain: InsightDomain, category: &str) -> Option<LineItem> {
    let split = line
        .find(|c: char| c == ':' || c == ',' || c == '\t' || c == '=')
        .unwrap_or(line.len());
    let name = line[..split].trim().trim_matches(|c: char| !c.is_alphanumeric() && c != ')');
    if name.is_empty() || name.chars().all(|c| c.is_ascii_digit() || c.is_whitespace()) {
        return None;
    }
    let rest = &line[split..];

    let value = ITEM_VALUE_RE.captures_iter(rest).find_map(|caps| {
        let whole = caps.get(0)?;
        if rest[whole.end()..].trim_start().starts_with('%') {
            return None;
        }
        let mut n: f64 = caps.name("num")?.as_str().replace(',', "").parse().ok()?;
        if let Some(unit) = caps.name("unit") {
            n *= unit_multiplier(unit.as_str()).unwrap_or(1.0);
        }
        (n > 0.0).then_some(n)
    })?;

    let growth_rate = ITEM_GROWTH_RE
        .captures(rest)
        .filter(|c| c["num"].parse::<f64>().is_ok())
        .map(|c| FieldValue::Text(format!("{}%", &c["num"])));

    let lower = line.to_lowercase();
    let growth_type = ["linear", "flat", "compound", "annual", "exponential"]
        .iter()
        .find(|w| contains_word(&lower, w))
        .map(|w| GrowthType::normalize(w))
        .unwrap_or_default();

    Some(LineItem {
        id: line_item_id(domain, name),
        name: name.to_string(),
        value: FieldValue::Number(value),
        growth_type,
        growth_rate,
        category: Some(category.to_string()),
        is_fixed: None,
        depreciation_years: None,
        confidence: 0.4,
    })
}

fn contains_word(haystack: &str, word: &str) -> bool {
    haystack.match_indices(word).any(|(i, _)| {
        let before = haystack[..i].chars().next_back();
        let after = haystack[i + word.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deal_value_patterns() -> FieldPatterns {
        FieldPatterns::new(
            "dealValue",
            vec![
                amount_after(r"deal\s+value", 1.0),
                rule(&format!(r"(?i)\$\s*{NUM}{UNIT}"), 0.7),
            ],
        )
    }

    fn spec(domain: InsightDomain, name: &str) -> &'static FieldSpec {
        field_spec(domain, name).unwrap()
    }

    #[test]
    fn highest_weight_wins_over_earlier_generic_mention() {
        let text = "The sponsor also reviewed a $80 million portfolio.\nDeal Value: $50 million";
        let field = match_field(
            text,
            &deal_value_patterns(),
            spec(InsightDomain::DealAssumptions, "dealValue"),
        )
        .unwrap();
        assert_eq!(field.value, Some(FieldValue::Number(50_000_000.0)));
        assert_eq!(field.source, FieldSource::Pattern);
        assert!((field.confidence - 0.6).abs() < 1e-6);
    }

    #[test]
    fn equal_weights_take_first_in_corpus() {
        let text = "Price of $75 million, later revised to $90 million.";
        let field = match_field(
            text,
            &deal_value_patterns(),
            spec(InsightDomain::DealAssumptions, "dealValue"),
        )
        .unwrap();
        assert_eq!(field.value, Some(FieldValue::Number(75_000_000.0)));
    }

    #[test]
    fn implausible_matches_are_filtered() {
        // $5 is below the deal value floor; only the second match survives.
        let text = "Deal Value: $5\nconsideration of $120m";
        let field = match_field(
            text,
            &deal_value_patterns(),
            spec(InsightDomain::DealAssumptions, "dealValue"),
        )
        .unwrap();
        assert_eq!(field.value, Some(FieldValue::Number(120_000_000.0)));
        assert!((field.confidence - 0.42).abs() < 1e-6);
    }

    #[test]
    fn no_surviving_candidate_is_none() {
        let text = "Deal Value: to be confirmed";
        assert!(match_field(
            text,
            &deal_value_patterns(),
            spec(InsightDomain::DealAssumptions, "dealValue"),
        )
        .is_none());
    }

    #[test]
    fn sparse_csv_row_is_matched() {
        let patterns = FieldPatterns::new(
            "equityContribution",
            vec![amount_after(r"equity\s+contribution", 1.0)],
        );
        let field = match_field(
            "Equity Contribution,,,,,30000000",
            &patterns,
            spec(InsightDomain::DealAssumptions, "equityContribution"),
        )
        .unwrap();
        assert_eq!(field.value, Some(FieldValue::Number(30_000_000.0)));
    }

    #[test]
    fn percentages_keep_their_sign() {
        let patterns = FieldPatterns::new(
            "dealLTV",
            vec![percent_after(r"ltv|loan[\s-]to[\s-]value", 1.0), percent_before("ltv", 0.8)],
        );
        let ltv = spec(InsightDomain::DealAssumptions, "dealLTV");
        let field = match_field("LTV: 65%", &patterns, ltv).unwrap();
        assert_eq!(field.value, Some(FieldValue::from("65%")));
        let field = match_field("financed at 70% LTV", &patterns, ltv).unwrap();
        assert_eq!(field.value, Some(FieldValue::from("70%")));
        // 120% is outside [10, 95].
        assert!(match_field("LTV: 120%", &patterns, ltv).is_none());
    }

    #[test]
    fn text_date_and_category_captures() {
        let name = FieldPatterns::new("dealName", vec![text_after(r"deal\s+name|project", 1.0)]);
        let field = match_field(
            "Project: Harbor Point Logistics\n",
            &name,
            spec(InsightDomain::DealAssumptions, "dealName"),
        )
        .unwrap();
        assert_eq!(field.value, Some(FieldValue::from("Harbor Point Logistics")));

        let date = FieldPatterns::new("expectedExitDate", vec![text_after(r"exit\s+date", 1.0)]);
        let field = match_field(
            "Exit date: 31/03/2030",
            &date,
            spec(InsightDomain::ExitAssumptions, "expectedExitDate"),
        )
        .unwrap();
        assert_eq!(field.value, Some(FieldValue::from("2030-03-31")));

        let route = FieldPatterns::new("exitRoute", vec![word_after(r"exit\s+route", 1.0)]);
        let field = match_field(
            "Exit route: Trade sale",
            &route,
            spec(InsightDomain::ExitAssumptions, "exitRoute"),
        )
        .unwrap();
        assert_eq!(field.value, Some(FieldValue::from("trade_sale")));
    }

    #[test]
    fn fill_only_touches_missing_fields() {
        let record = DomainRecord::empty(InsightDomain::DealAssumptions, &["dealValue", "dealLTV"])
            .with_field(
                "dealLTV",
                ExtractedField::found(FieldValue::Number(60.0), 0.8, FieldSource::Ai),
            );
        let table = vec![
            deal_value_patterns(),
            FieldPatterns::new("dealLTV", vec![percent_after("ltv", 1.0)]),
        ];
        let record = fill_from_patterns(record, "Deal Value: $50m\nLTV: 75%", &table);
        assert_eq!(record.value("dealValue"), Some(&FieldValue::Number(5e7)));
        assert_eq!(record.value("dealLTV"), Some(&FieldValue::Number(60.0)));
        assert_eq!(record.get("dealLTV").unwrap().source, FieldSource::Ai);
    }

    #[test]
    fn line_item_rows() {
        let categories = [ItemCategory {
            category: "rental",
            keywords: &["rent", "rental", "lease"],
        }];
        let text = "Rent,,,,1200000\nParking: $150k growing 3% annual\nRental income total, 1350000\nLease, 3%, 80000";
        let items = scan_line_items(text.lines(), InsightDomain::RevenueItems, &categories, 10);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].name, "Rent");
        assert_eq!(items[0].value, FieldValue::Number(1_200_000.0));
        assert_eq!(items[1].name, "Lease");
        assert_eq!(items[1].value, FieldValue::Number(80_000.0));
        assert_eq!(items[1].growth_rate, Some(FieldValue::from("3%")));
        assert_eq!(items[0].category.as_deref(), Some("rental"));
    }

    #[test]
    fn line_item_growth_and_cap() {
        let categories = [ItemCategory {
            category: "parking",
            keywords: &["parking"],
        }];
        let text = "Parking: $150k growing 3% annual\nParking B: 90k\nParking C: 10k";
        let items = scan_line_items(text.lines(), InsightDomain::RevenueItems, &categories, 2);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].value, FieldValue::Number(150_000.0));
        assert_eq!(items[0].growth_type, GrowthType::Compound);
    }

    #[test]
    fn line_item_ids_are_stable() {
        let a = line_item_id(InsightDomain::CostItems, "Utilities");
        let b = line_item_id(InsightDomain::CostItems, " utilities ");
        let c = line_item_id(InsightDomain::RevenueItems, "Utilities");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn dates_after_labels() {
        let spec = field_spec(InsightDomain::HighLevelParameters, "projectStartDate").unwrap();
        let patterns =
            FieldPatterns::new("projectStartDate", vec![date_after(r"closing\s+date", 1.0)]);

        let field = match_field("Closing date: March 31, 2025", &patterns, spec).unwrap();
        assert_eq!(field.value, Some(FieldValue::from("2025-03-31")));

        let field = match_field("Closing Date,,,,,13/05/2024", &patterns, spec).unwrap();
        assert_eq!(field.value, Some(FieldValue::from("2024-05-13")));

        assert!(match_field("Closing date: TBD", &patterns, spec).is_none());
    }

    #[test]
    fn keyword_match_respects_word_boundaries() {
        assert!(contains_word("rent roll", "rent"));
        assert!(!contains_word("current assets", "rent"));
    }
}
