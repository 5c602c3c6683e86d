//! Core types for the deal extraction pipeline.
//!
//! These types model the full lifecycle of one request:
//! Corpus → MasterSnapshot → DomainRecord (AI → pattern → validate → score)
//! → StandardizedRecord → FormPayload.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════
// Domain Enum
// ═══════════════════════════════════════════

/// Domain tags understood by the `DocumentInsightService`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InsightDomain {
    HighLevelParameters,
    DealAssumptions,
    RevenueItems,
    CostItems,
    DebtModel,
    ExitAssumptions,
    MasterAnalysis,
}

impl InsightDomain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HighLevelParameters => "highLevelParameters",
            Self::DealAssumptions => "dealAssumptions",
            Self::RevenueItems => "revenueItems",
            Self::CostItems => "costItems",
            Self::DebtModel => "debtModel",
            Self::ExitAssumptions => "exitAssumptions",
            Self::MasterAnalysis => "masterAnalysis",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "highLevelParameters" => Some(Self::HighLevelParameters),
            "dealAssumptions" => Some(Self::DealAssumptions),
            "revenueItems" => Some(Self::RevenueItems),
            "costItems" => Some(Self::CostItems),
            "debtModel" => Some(Self::DebtModel),
            "exitAssumptions" => Some(Self::ExitAssumptions),
            "masterAnalysis" => Some(Self::MasterAnalysis),
            _ => None,
        }
    }

    /// The six domains handled by a `DomainExtractor`, in output order.
    pub fn extraction_domains() -> &'static [InsightDomain] {
        &[
            Self::HighLevelParameters,
            Self::DealAssumptions,
            Self::RevenueItems,
            Self::CostItems,
            Self::DebtModel,
            Self::ExitAssumptions,
        ]
    }
}

impl fmt::Display for InsightDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ═══════════════════════════════════════════
// Field values
// ═══════════════════════════════════════════

/// Where a field's value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldSource {
    /// Read from the insight service response.
    Ai,
    /// Matched by the pattern library.
    Pattern,
    /// Carried over from the master snapshot.
    Derived,
    /// Computed arithmetically from other fields.
    Calculated,
    /// Not found.
    None,
}

impl FieldSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ai => "ai",
            Self::Pattern => "pattern",
            Self::Derived => "derived",
            Self::Calculated => "calculated",
            Self::None => "none",
        }
    }
}

/// Growth model of a line item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrowthType {
    Linear,
    Compound,
    #[default]
    Custom,
}

impl GrowthType {
    /// Normalize a free-text growth label.
    pub fn normalize(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "linear" | "flat" => Self::Linear,
            "compound" | "annual" | "exponential" => Self::Compound,
            _ => Self::Custom,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Linear => "linear",
            Self::Compound => "compound",
            Self::Custom => "custom",
        }
    }
}

/// One revenue or cost line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub id: String,
    pub name: String,
    pub value: FieldValue,
    pub growth_type: GrowthType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub growth_rate: Option<FieldValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_fixed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depreciation_years: Option<f64>,
    pub confidence: f32,
}

/// A field value before or after standardization.
///
/// Raw values from the insight service may be text ("$2.5m", "31/03/2025");
/// standardization turns them into numbers or canonical text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Bool(bool),
    Text(String),
    Items(Vec<LineItem>),
}

impl FieldValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_items(&self) -> Option<&[LineItem]> {
        match self {
            Self::Items(items) => Some(items),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Number(_) => "number",
            Self::Bool(_) => "boolean",
            Self::Text(_) => "text",
            Self::Items(_) => "line items",
        }
    }

    /// Convert a JSON scalar. Null, empty strings, objects and arrays give `None`.
    pub fn from_json_scalar(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Number(n) => n.as_f64().map(Self::Number),
            serde_json::Value::Bool(b) => Some(Self::Bool(*b)),
            serde_json::Value::String(s) if !s.trim().is_empty() => {
                Some(Self::Text(s.trim().to_string()))
            }
            _ => None,
        }
    }

    /// JSON rendering for the form payload.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<NaiveDate> for FieldValue {
    fn from(d: NaiveDate) -> Self {
        Self::Text(d.format("%Y-%m-%d").to_string())
    }
}

/// A single extracted field.
///
/// `confidence == 0` together with `source == None` means "not found".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedField {
    pub value: Option<FieldValue>,
    pub confidence: f32,
    pub source: FieldSource,
    /// Standardization failure, if any. The value is kept unchanged.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExtractedField {
    pub fn missing() -> Self {
        Self {
            value: None,
            confidence: 0.0,
            source: FieldSource::None,
            error: None,
        }
    }

    pub fn found(value: FieldValue, confidence: f32, source: FieldSource) -> Self {
        Self {
            value: Some(value),
            confidence: clamp_confidence(confidence),
            source,
            error: None,
        }
    }

    pub fn is_missing(&self) -> bool {
        self.value.is_none()
    }

    /// Same field with confidence multiplied by `factor`.
    pub fn penalized(self, factor: f32) -> Self {
        let confidence = clamp_confidence(self.confidence * factor);
        Self { confidence, ..self }
    }

    /// Same field with `delta` added to confidence.
    pub fn boosted(self, delta: f32) -> Self {
        let confidence = clamp_confidence(self.confidence + delta);
        Self { confidence, ..self }
    }

    pub fn with_value(self, value: FieldValue) -> Self {
        Self {
            value: Some(value),
            ..self
        }
    }

    pub fn with_error(self, error: String) -> Self {
        Self {
            error: Some(error),
            ..self
        }
    }
}

/// Clamp any confidence into [0, 1]. NaN becomes 0.
pub fn clamp_confidence(confidence: f32) -> f32 {
    if confidence.is_nan() {
        0.0
    } else {
        confidence.clamp(0.0, 1.0)
    }
}

// ═══════════════════════════════════════════
// Records
// ═══════════════════════════════════════════

/// Working record for one domain. Every stage takes it by value and
/// returns the next version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainRecord {
    pub domain: InsightDomain,
    pub fields: BTreeMap<String, ExtractedField>,
    /// Currency the monetary fields are denominated in, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
}

impl DomainRecord {
    /// A record with every named field missing.
    pub fn empty(domain: InsightDomain, field_names: &[&str]) -> Self {
        Self {
            domain,
            fields: field_names
                .iter()
                .map(|name| (name.to_string(), ExtractedField::missing()))
                .collect(),
            currency: None,
        }
    }

    pub fn get(&self, name: &str) -> Option<&ExtractedField> {
        self.fields.get(name)
    }

    pub fn value(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name).and_then(|f| f.value.as_ref())
    }

    pub fn is_missing(&self, name: &str) -> bool {
        self.fields.get(name).map_or(true, ExtractedField::is_missing)
    }

    pub fn with_field(mut self, name: &str, field: ExtractedField) -> Self {
        self.fields.insert(name.to_string(), field);
        self
    }

    /// Fill a field only if it is currently missing.
    pub fn fill(self, name: &str, field: ExtractedField) -> Self {
        if self.is_missing(name) {
            self.with_field(name, field)
        } else {
            self
        }
    }

    /// Apply a confidence penalty to a present field.
    pub fn penalize(mut self, name: &str, factor: f32) -> Self {
        if let Some(field) = self.fields.remove(name) {
            self.fields.insert(name.to_string(), field.penalized(factor));
        }
        self
    }

    pub fn with_currency(self, currency: Option<String>) -> Self {
        Self { currency, ..self }
    }

    pub fn missing_fields(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|(_, f)| f.is_missing())
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

/// A domain record after unit/format normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StandardizedRecord {
    pub domain: InsightDomain,
    pub fields: BTreeMap<String, ExtractedField>,
    pub standardized_at: DateTime<Utc>,
    pub target_currency: String,
    pub version: String,
}

impl StandardizedRecord {
    pub fn get(&self, name: &str) -> Option<&ExtractedField> {
        self.fields.get(name)
    }

    pub fn value(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name).and_then(|f| f.value.as_ref())
    }

    /// Average confidence over found fields, 0 when nothing was found.
    pub fn mean_confidence(&self) -> f32 {
        let found: Vec<f32> = self
            .fields
            .values()
            .filter(|f| !f.is_missing())
            .map(|f| f.confidence)
            .collect();
        if found.is_empty() {
            0.0
        } else {
            found.iter().sum::<f32>() / found.len() as f32
        }
    }
}

// ═══════════════════════════════════════════
// Form payload (output sink)
// ═══════════════════════════════════════════

/// One entry of the flat mapping handed to the form-population collaborator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormEntry {
    pub value: serde_json::Value,
    pub confidence: f32,
    pub source: FieldSource,
    pub domain: InsightDomain,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Flat `{fieldName: entry}` mapping across all domains.
pub type FormPayload = BTreeMap<String, FormEntry>;

// ═══════════════════════════════════════════
// Configuration
// ═══════════════════════════════════════════

/// Exchange rates expressed as units of each currency per one USD.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrencyRates(pub HashMap<String, f64>);

impl CurrencyRates {
    pub fn rate(&self, code: &str) -> Option<f64> {
        self.0.get(&code.to_uppercase()).copied()
    }
}

impl Default for CurrencyRates {
    fn default() -> Self {
        let rates = [
            ("USD", 1.0),
            ("EUR", 0.92),
            ("GBP", 0.79),
            ("JPY", 149.5),
            ("CHF", 0.88),
            ("CAD", 1.36),
            ("AUD", 1.52),
            ("SGD", 1.34),
            ("HKD", 7.82),
            ("CNY", 7.24),
            ("INR", 83.2),
            ("SEK", 10.6),
            ("NOK", 10.7),
            ("DKK", 6.87),
        ];
        Self(
            rates
                .iter()
                .map(|(code, rate)| (code.to_string(), *rate))
                .collect(),
        )
    }
}

/// Configuration for one extraction pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Currency every monetary field is converted into.
    pub target_currency: String,
    /// Upper bound for a single insight service call, in milliseconds.
    pub insight_timeout_ms: u64,
    /// "Today" for date arithmetic. `None` uses the current UTC date.
    pub reference_date: Option<NaiveDate>,
    pub currency_rates: CurrencyRates,
    /// Maximum line items kept per list field.
    pub max_line_items: usize,
    /// Corpus characters included in a prompt before truncation.
    pub max_prompt_chars: usize,
    /// Version stamped on every standardized record.
    pub record_version: String,
}

impl ExtractionConfig {
    pub fn today(&self) -> NaiveDate {
        self.reference_date
            .unwrap_or_else(|| Utc::now().date_naive())
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            target_currency: "USD".to_string(),
            insight_timeout_ms: crate::config::DEFAULT_INSIGHT_TIMEOUT_SECS * 1000,
            reference_date: None,
            currency_rates: CurrencyRates::default(),
            max_line_items: 50,
            max_prompt_chars: 60_000,
            record_version: crate::config::RECORD_VERSION.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_round_trips_through_tag() {
        for domain in InsightDomain::extraction_domains() {
            assert_eq!(InsightDomain::from_str(domain.as_str()), Some(*domain));
        }
        assert_eq!(
            InsightDomain::from_str("masterAnalysis"),
            Some(InsightDomain::MasterAnalysis)
        );
        assert_eq!(InsightDomain::from_str("unknown"), None);
    }

    #[test]
    fn extraction_domains_exclude_master() {
        let domains = InsightDomain::extraction_domains();
        assert_eq!(domains.len(), 6);
        assert!(!domains.contains(&InsightDomain::MasterAnalysis));
    }

    #[test]
    fn growth_type_normalization() {
        assert_eq!(GrowthType::normalize("Flat"), GrowthType::Linear);
        assert_eq!(GrowthType::normalize("linear"), GrowthType::Linear);
        assert_eq!(GrowthType::normalize("annual"), GrowthType::Compound);
        assert_eq!(GrowthType::normalize("Exponential"), GrowthType::Compound);
        assert_eq!(GrowthType::normalize("step-up"), GrowthType::Custom);
    }

    #[test]
    fn missing_field_is_zero_confidence_none_source() {
        let field = ExtractedField::missing();
        assert!(field.is_missing());
        assert_eq!(field.confidence, 0.0);
        assert_eq!(field.source, FieldSource::None);
    }

    #[test]
    fn confidence_is_clamped() {
        let field = ExtractedField::found(FieldValue::Number(1.0), 1.7, FieldSource::Ai);
        assert_eq!(field.confidence, 1.0);
        assert_eq!(field.clone().boosted(0.5).confidence, 1.0);
        assert_eq!(field.penalized(-2.0).confidence, 0.0);
        assert_eq!(clamp_confidence(f32::NAN), 0.0);
    }

    #[test]
    fn fill_never_overwrites_present_value() {
        let record = DomainRecord::empty(InsightDomain::DealAssumptions, &["dealValue"])
            .with_field(
                "dealValue",
                ExtractedField::found(FieldValue::Number(5e7), 0.6, FieldSource::Ai),
            )
            .fill(
                "dealValue",
                ExtractedField::found(FieldValue::Number(9e7), 0.9, FieldSource::Pattern),
            );
        assert_eq!(record.value("dealValue"), Some(&FieldValue::Number(5e7)));
    }

    #[test]
    fn penalize_ignores_missing_field_names() {
        let record = DomainRecord::empty(InsightDomain::DebtModel, &["interestRate"])
            .penalize("loanAmount", 0.5);
        assert!(record.get("loanAmount").is_none());
    }

    #[test]
    fn json_scalar_conversion() {
        assert_eq!(
            FieldValue::from_json_scalar(&serde_json::json!(12.5)),
            Some(FieldValue::Number(12.5))
        );
        assert_eq!(
            FieldValue::from_json_scalar(&serde_json::json!(" USD ")),
            Some(FieldValue::Text("USD".into()))
        );
        assert_eq!(FieldValue::from_json_scalar(&serde_json::json!("")), None);
        assert_eq!(FieldValue::from_json_scalar(&serde_json::Value::Null), None);
        assert_eq!(FieldValue::from_json_scalar(&serde_json::json!([1, 2])), None);
    }

    #[test]
    fn currency_rates_lookup_is_case_insensitive() {
        let rates = CurrencyRates::default();
        assert_eq!(rates.rate("usd"), Some(1.0));
        assert_eq!(rates.rate("EUR"), Some(0.92));
        assert_eq!(rates.rate("XYZ"), None);
    }

    #[test]
    fn mean_confidence_ignores_missing_fields() {
        let mut fields = BTreeMap::new();
        fields.insert(
            "a".to_string(),
            ExtractedField::found(FieldValue::Number(1.0), 0.8, FieldSource::Ai),
        );
        fields.insert("b".to_string(), ExtractedField::missing());
        let record = StandardizedRecord {
            domain: InsightDomain::DebtModel,
            fields,
            standardized_at: Utc::now(),
            target_currency: "USD".into(),
            version: "1".into(),
        };
        assert!((record.mean_confidence() - 0.8).abs() < f32::EPSILON);
    }
}
