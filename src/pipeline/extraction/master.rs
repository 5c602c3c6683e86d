//! Master analyzer: one coarse, cross-domain pass before the extractors.
//!
//! Asks the insight service for a holistic `MasterSnapshot`. When the call
//! fails, times out, or comes back empty or malformed, a deterministic
//! fallback builds a best-effort snapshot from label-anchored corpus lines.
//! Undeterminable fields stay `None`; no placeholder values are injected.

use std::sync::LazyLock;

use chrono::{Months, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::pipeline::corpus::DocumentCorpus;

use super::insight::{CancelFlag, InsightGateway};
use super::patterns::{NUM, UNIT};
use super::standardize::{
    parse_date, standardize_currency_code, standardize_number, standardize_percentage,
    unit_multiplier,
};
use super::types::{clamp_confidence, FieldValue, InsightDomain};

/// Labels the fallback scans for, in the order they are reported.
const FALLBACK_LABELS: &[(&str, &str)] = &[
    ("equityContribution", "equity contribution"),
    ("debtFinancing", "debt financing"),
    ("currency", "currency"),
    ("transactionFee", "transaction fee"),
    ("ltv", "ltv"),
    ("acquisitionDate", "acquisition date"),
    ("holdingPeriod", "holding period"),
];

/// Fallback overall confidence when every label is found.
const FALLBACK_MAX_CONFIDENCE: f32 = 0.6;

/// Labels needed for a `medium` fallback quality rating.
const FALLBACK_MEDIUM_THRESHOLD: usize = 5;

/// Master hints are trusted less than the snapshot itself.
const HINT_CONFIDENCE_FACTOR: f32 = 0.8;
const HINT_CONFIDENCE_MIN: f32 = 0.2;
const HINT_CONFIDENCE_MAX: f32 = 0.6;

static DEAL_VALUE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)\$\s*{NUM}\s*(?P<scale>million|billion|mm|bn|m|b)\b")).unwrap()
});

static LABEL_VALUE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"(?i)[$€£]?\s*-?{NUM}{UNIT}")).unwrap());

// ═══════════════════════════════════════════
// Snapshot
// ═══════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSourceQuality {
    High,
    Medium,
    #[default]
    Low,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompanyOverview {
    #[serde(deserialize_with = "de_text")]
    pub company_name: Option<String>,
    #[serde(deserialize_with = "de_text")]
    pub industry: Option<String>,
    #[serde(deserialize_with = "de_text")]
    pub location: Option<String>,
    #[serde(deserialize_with = "de_text")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransactionDetails {
    #[serde(deserialize_with = "de_text")]
    pub deal_name: Option<String>,
    #[serde(deserialize_with = "de_number")]
    pub deal_value: Option<f64>,
    #[serde(deserialize_with = "de_text")]
    pub currency: Option<String>,
    #[serde(deserialize_with = "de_date")]
    pub closing_date: Option<NaiveDate>,
    #[serde(deserialize_with = "de_percent")]
    pub transaction_fee: Option<f64>,
    #[serde(deserialize_with = "de_text")]
    pub deal_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FinancingStructure {
    #[serde(deserialize_with = "de_number")]
    pub equity_contribution: Option<f64>,
    #[serde(deserialize_with = "de_number")]
    pub debt_financing: Option<f64>,
    #[serde(deserialize_with = "de_percent")]
    pub ltv: Option<f64>,
    #[serde(deserialize_with = "de_percent")]
    pub interest_rate: Option<f64>,
    #[serde(deserialize_with = "de_number")]
    pub loan_term_years: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HistoricalFinancials {
    #[serde(deserialize_with = "de_number")]
    pub revenue: Option<f64>,
    #[serde(deserialize_with = "de_number")]
    pub operating_expenses: Option<f64>,
    #[serde(deserialize_with = "de_number")]
    pub ebitda: Option<f64>,
    #[serde(deserialize_with = "de_number")]
    pub net_income: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectionAssumptions {
    #[serde(deserialize_with = "de_percent")]
    pub revenue_growth_rate: Option<f64>,
    #[serde(deserialize_with = "de_percent")]
    pub cost_inflation_rate: Option<f64>,
    #[serde(deserialize_with = "de_number")]
    pub projection_years: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExitPlan {
    #[serde(deserialize_with = "de_number")]
    pub holding_period_months: Option<f64>,
    #[serde(deserialize_with = "de_date")]
    pub expected_exit_date: Option<NaiveDate>,
    #[serde(deserialize_with = "de_number")]
    pub exit_multiple: Option<f64>,
    #[serde(deserialize_with = "de_text")]
    pub exit_route: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KeyMetrics {
    #[serde(deserialize_with = "de_percent")]
    pub target_irr: Option<f64>,
    #[serde(deserialize_with = "de_number")]
    pub target_moic: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DataQuality {
    #[serde(deserialize_with = "de_number")]
    pub completeness: Option<f64>,
    pub missing_fields: Vec<String>,
    #[serde(deserialize_with = "de_text")]
    pub notes: Option<String>,
}

/// Coarse cross-domain aggregate produced before the domain extractors run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MasterSnapshot {
    pub company_overview: CompanyOverview,
    pub transaction_details: TransactionDetails,
    pub financing_structure: FinancingStructure,
    pub historical_financials: HistoricalFinancials,
    pub projection_assumptions: ProjectionAssumptions,
    pub exit_assumptions: ExitPlan,
    pub key_metrics: KeyMetrics,
    pub data_quality: DataQuality,
    #[serde(deserialize_with = "de_confidence")]
    pub overall_confidence: f32,
    pub data_source_quality: DataSourceQuality,
}

impl MasterSnapshot {
    /// Whether the snapshot carries any deal data at all.
    pub fn has_content(&self) -> bool {
        let t = &self.transaction_details;
        let f = &self.financing_structure;
        let e = &self.exit_assumptions;
        self.company_overview.company_name.is_some()
            || t.deal_name.is_some()
            || t.deal_value.is_some()
            || t.currency.is_some()
            || t.closing_date.is_some()
            || f.equity_contribution.is_some()
            || f.debt_financing.is_some()
            || f.ltv.is_some()
            || self.historical_financials.revenue.is_some()
            || e.holding_period_months.is_some()
            || e.expected_exit_date.is_some()
    }

    /// Confidence given to values an extractor takes from this snapshot.
    pub fn hint_confidence(&self) -> f32 {
        (HINT_CONFIDENCE_FACTOR * clamp_confidence(self.overall_confidence))
            .clamp(HINT_CONFIDENCE_MIN, HINT_CONFIDENCE_MAX)
    }

    /// Deal currency as an ISO code.
    pub fn currency(&self) -> Option<String> {
        self.transaction_details
            .currency
            .as_deref()
            .and_then(|c| standardize_currency_code(c).ok())
    }

    pub fn closing_date(&self) -> Option<NaiveDate> {
        self.transaction_details.closing_date
    }

    pub fn holding_period_years(&self) -> Option<f64> {
        self.exit_assumptions.holding_period_months.map(|m| m / 12.0)
    }

    /// Fill gaps that follow arithmetically from other snapshot values:
    /// deal value from the financing split and exit date from closing date
    /// plus holding period.
    pub fn with_derived_gaps(mut self) -> Self {
        let financing = &self.financing_structure;
        if self.transaction_details.deal_value.is_none() {
            self.transaction_details.deal_value =
                match (financing.equity_contribution, financing.debt_financing) {
                    (Some(e), Some(d)) => Some(e + d),
                    (Some(v), None) | (None, Some(v)) => Some(v),
                    (None, None) => None,
                };
        }
        if self.exit_assumptions.expected_exit_date.is_none() {
            self.exit_assumptions.expected_exit_date =
                match (self.closing_date(), self.exit_assumptions.holding_period_months) {
                    (Some(closing), Some(months)) => add_months(closing, months),
                    _ => None,
                };
        }
        self
    }
}

pub(crate) fn add_months(date: NaiveDate, months: f64) -> Option<NaiveDate> {
    let months = months.round();
    if !(0.0..=1200.0).contains(&months) {
        return None;
    }
    date.checked_add_months(Months::new(months as u32))
}

// ═══════════════════════════════════════════
// Lenient field decoding
// ═══════════════════════════════════════════

fn de_number<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    let value = Option::<Value>::deserialize(d)?;
    Ok(value.as_ref().and_then(FieldValue::from_json_scalar).and_then(|v| match v {
        FieldValue::Number(n) => Some(n),
        FieldValue::Text(s) => standardize_number(&s).ok(),
        _ => None,
    }))
}

fn de_percent<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    let value = Option::<Value>::deserialize(d)?;
    Ok(value
        .as_ref()
        .and_then(FieldValue::from_json_scalar)
        .and_then(|v| standardize_percentage(&v).ok()))
}

fn de_date<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveDate>, D::Error> {
    let value = Option::<Value>::deserialize(d)?;
    Ok(value.as_ref().and_then(Value::as_str).and_then(parse_date))
}

fn de_text<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    let value = Option::<Value>::deserialize(d)?;
    Ok(match value {
        Some(Value::String(s)) if !s.trim().is_empty() && s.trim() != "null" => {
            Some(s.trim().to_string())
        }
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn de_confidence<'de, D: Deserializer<'de>>(d: D) -> Result<f32, D::Error> {
    let value = Option::<Value>::deserialize(d)?;
    let n = value.as_ref().and_then(Value::as_f64).unwrap_or(0.0) as f32;
    let n = if n > 1.0 && n <= 100.0 { n / 100.0 } else { n };
    Ok(clamp_confidence(n))
}

// ═══════════════════════════════════════════
// Analyzer
// ═══════════════════════════════════════════

/// Produces the master snapshot for one request.
pub struct MasterAnalyzer {
    gateway: InsightGateway,
}

impl MasterAnalyzer {
    pub fn new(gateway: InsightGateway) -> Self {
        Self { gateway }
    }

    /// Never fails: any service problem routes to the deterministic fallback.
    pub fn analyze(&self, corpus: &DocumentCorpus, cancel: &CancelFlag) -> MasterSnapshot {
        let domain = InsightDomain::MasterAnalysis;
        let payload = match self.gateway.call(corpus.shared(), domain, cancel) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(
                    domain = %domain,
                    error = %e,
                    "Master analysis call failed, using fallback"
                );
                return fallback_snapshot(corpus);
            }
        };

        match serde_json::from_value::<MasterSnapshot>(payload.into_value()) {
            Ok(snapshot) if snapshot.has_content() => {
                tracing::info!(
                    confidence = snapshot.overall_confidence,
                    quality = ?snapshot.data_source_quality,
                    "Master analysis complete"
                );
                snapshot.with_derived_gaps()
            }
            Ok(_) => {
                tracing::info!(
                    domain = %domain,
                    "Master analysis returned no deal data, using fallback"
                );
                fallback_snapshot(corpus)
            }
            Err(e) => {
                tracing::warn!(
                    domain = %domain,
                    error = %e,
                    "Unparseable master analysis, using fallback"
                );
                fallback_snapshot(corpus)
            }
        }
    }
}

/// Values found by the label scan, before assembly.
#[derive(Debug, Default)]
struct LabelScan {
    equity: Option<f64>,
    debt: Option<f64>,
    currency: Option<String>,
    fee: Option<f64>,
    ltv: Option<f64>,
    acquisition: Option<NaiveDate>,
    holding_months: Option<f64>,
}

impl LabelScan {
    fn is_found(&self, key: &str) -> bool {
        match key {
            "equityContribution" => self.equity.is_some(),
            "debtFinancing" => self.debt.is_some(),
            "currency" => self.currency.is_some(),
            "transactionFee" => self.fee.is_some(),
            "ltv" => self.ltv.is_some(),
            "acquisitionDate" => self.acquisition.is_some(),
            "holdingPeriod" => self.holding_months.is_some(),
            _ => false,
        }
    }

    /// Record a value for `key` if the line yields one and it is still unset.
    fn take(&mut self, key: &str, label: &str, line: &str) {
        if self.is_found(key) {
            return;
        }
        let Some(token) = value_token(line, label) else {
            return;
        };
        match key {
            "equityContribution" => self.equity = parse_amount(token),
            "debtFinancing" => self.debt = parse_amount(token),
            "currency" => self.currency = standardize_currency_code(token).ok(),
            "transactionFee" => self.fee = standardize_percentage(&FieldValue::from(token)).ok(),
            "ltv" => self.ltv = standardize_percentage(&FieldValue::from(token)).ok(),
            "acquisitionDate" => self.acquisition = parse_date(token),
            "holdingPeriod" => {
                self.holding_months = parse_amount(token).map(|n| holding_months(line, n));
            }
            _ => {}
        }
    }
}

/// The value of a label line. Delimited rows (`Label,,,,,Value`) yield the
/// last non-empty cell after the label's cell; a cell that carries its own
/// value (`Label: Value`) yields the text after the label. Other lines are
/// read as a single cell.
fn value_token<'a>(line: &'a str, label: &str) -> Option<&'a str> {
    if !is_delimited_row(line) {
        return after_label(line, label);
    }
    let cells = row_cells(line);
    let Some(at) = cells.iter().position(|c| c.to_lowercase().contains(label)) else {
        return after_label(line, label);
    };
    let cell = cells[at];
    if cell.contains([':', '=']) {
        return after_label(cell, label);
    }
    cells[at + 1..]
        .iter()
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .last()
        .or_else(|| after_label(cell, label))
}

/// Text following `label` in `text`, without separators or brackets.
fn after_label<'a>(text: &'a str, label: &str) -> Option<&'a str> {
    let idx = text.to_lowercase().find(label)?;
    let rest = text.get(idx + label.len()..)?;
    let rest = rest
        .trim_start_matches(|c: char| c.is_whitespace() || matches!(c, ':' | '=' | '-' | '('));
    let rest = rest.trim_end_matches(')').trim();
    (!rest.is_empty()).then_some(rest)
}

/// A comma between a digit and exactly three more digits (`30,000`).
fn is_digit_group_comma(bytes: &[u8], at: usize) -> bool {
    at > 0
        && bytes[at - 1].is_ascii_digit()
        && bytes.len() >= at + 4
        && bytes[at + 1..at + 4].iter().all(u8::is_ascii_digit)
        && bytes.get(at + 4).map_or(true, |b| !b.is_ascii_digit())
}

/// Positions of cell separators, ignoring thousands separators.
fn separator_positions(line: &str) -> Vec<usize> {
    let bytes = line.as_bytes();
    bytes
        .iter()
        .enumerate()
        .filter(|&(i, &b)| match b {
            b'\t' | b';' => true,
            b',' => !is_digit_group_comma(bytes, i),
            _ => false,
        })
        .map(|(i, _)| i)
        .collect()
}

fn is_delimited_row(line: &str) -> bool {
    !separator_positions(line).is_empty()
}

fn row_cells(line: &str) -> Vec<&str> {
    let mut cells = Vec::new();
    let mut start = 0;
    for at in separator_positions(line) {
        cells.push(&line[start..at]);
        start = at + 1;
    }
    cells.push(&line[start..]);
    cells
}

/// Holding period in months; a bare number counts as months unless the
/// line says years.
fn holding_months(line: &str, amount: f64) -> f64 {
    if line.to_lowercase().contains("year") {
        amount * 12.0
    } else {
        amount
    }
}

/// Parse an amount cell, tolerating trailing words (`60 months`).
fn parse_amount(token: &str) -> Option<f64> {
    if let Ok(n) = standardize_number(token) {
        return Some(n);
    }
    let caps = LABEL_VALUE_RE.captures(token)?;
    let mut n: f64 = caps["num"].replace(',', "").parse().ok()?;
    if let Some(unit) = caps.name("unit") {
        n *= unit_multiplier(unit.as_str()).unwrap_or(1.0);
    }
    Some(n)
}

/// First `$X million/billion` mention in the corpus.
fn scan_deal_value(text: &str) -> Option<f64> {
    DEAL_VALUE_RE.captures_iter(text).find_map(|caps| {
        let n: f64 = caps["num"].replace(',', "").parse().ok()?;
        Some(n * unit_multiplier(&caps["scale"])?)
    })
}

/// Deterministic snapshot from label-anchored corpus lines.
pub fn fallback_snapshot(corpus: &DocumentCorpus) -> MasterSnapshot {
    let mut scan = LabelScan::default();
    for line in corpus.lines() {
        let lower = line.to_lowercase();
        for (key, label) in FALLBACK_LABELS {
            if lower.contains(label) {
                scan.take(key, label, line);
            }
        }
    }

    let found: Vec<&str> = FALLBACK_LABELS
        .iter()
        .map(|(key, _)| *key)
        .filter(|key| scan.is_found(key))
        .collect();
    let missing: Vec<String> = FALLBACK_LABELS
        .iter()
        .map(|(key, _)| *key)
        .filter(|key| !scan.is_found(key))
        .map(str::to_string)
        .collect();
    let ratio = found.len() as f32 / FALLBACK_LABELS.len() as f32;

    let deal_value = match (scan.equity, scan.debt) {
        (None, None) => scan_deal_value(&corpus.concatenated()),
        _ => None,
    };

    let snapshot = MasterSnapshot {
        transaction_details: TransactionDetails {
            deal_value,
            currency: scan.currency,
            closing_date: scan.acquisition,
            transaction_fee: scan.fee,
            ..Default::default()
        },
        financing_structure: FinancingStructure {
            equity_contribution: scan.equity,
            debt_financing: scan.debt,
            ltv: scan.ltv,
            ..Default::default()
        },
        exit_assumptions: ExitPlan {
            holding_period_months: scan.holding_months,
            ..Default::default()
        },
        data_quality: DataQuality {
            completeness: Some(f64::from(ratio)),
            missing_fields: missing,
            notes: Some("Built from label-anchored corpus lines".to_string()),
        },
        overall_confidence: clamp_confidence(FALLBACK_MAX_CONFIDENCE * ratio),
        data_source_quality: if found.len() >= FALLBACK_MEDIUM_THRESHOLD {
            DataSourceQuality::Medium
        } else {
            DataSourceQuality::Low
        },
        ..Default::default()
    }
    .with_derived_gaps();

    tracing::info!(
        found = found.len(),
        confidence = snapshot.overall_confidence,
        "Master fallback snapshot built"
    );
    snapshot
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::pipeline::corpus::SourceFile;
    use crate::pipeline::extraction::error::InsightError;
    use crate::pipeline::extraction::insight::{MockInsightService, UnavailableInsightService};
    use crate::pipeline::extraction::traits::DocumentInsightService;

    const CSV: &str = "Equity Contribution,,,,,30000000\n\
Debt Financing,,,,,70000000\n\
Currency,,,,,USD\n\
Acquisition date,,,,,31/03/2025\n\
Holding Period,,,,,60";

    fn corpus(text: &str) -> DocumentCorpus {
        DocumentCorpus::from_files(vec![SourceFile::new("model.csv", text)])
    }

    fn analyzer(service: impl DocumentInsightService + 'static) -> MasterAnalyzer {
        MasterAnalyzer::new(InsightGateway::new(Arc::new(service), Duration::from_secs(2)))
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn csv_fallback_end_to_end() {
        let snapshot =
            analyzer(UnavailableInsightService).analyze(&corpus(CSV), &CancelFlag::new());
        assert_eq!(snapshot.transaction_details.deal_value, Some(100_000_000.0));
        assert_eq!(snapshot.currency().as_deref(), Some("USD"));
        assert_eq!(snapshot.closing_date(), Some(date(2025, 3, 31)));
        assert_eq!(snapshot.exit_assumptions.expected_exit_date, Some(date(2030, 3, 31)));
        assert_eq!(snapshot.exit_assumptions.holding_period_months, Some(60.0));
    }

    #[test]
    fn fallback_quality_reflects_found_labels() {
        let snapshot = fallback_snapshot(&corpus(CSV));
        // 5 of 7 labels: no transaction fee, no LTV.
        assert_eq!(snapshot.data_source_quality, DataSourceQuality::Medium);
        assert!((snapshot.overall_confidence - 0.6 * 5.0 / 7.0).abs() < 1e-6);
        assert_eq!(snapshot.data_quality.missing_fields, vec!["transactionFee", "ltv"]);
    }

    #[test]
    fn fallback_never_invents_placeholders() {
        let snapshot = fallback_snapshot(&DocumentCorpus::default());
        assert!(!snapshot.has_content());
        assert_eq!(snapshot.company_overview.company_name, None);
        assert_eq!(snapshot.transaction_details.deal_value, None);
        assert_eq!(snapshot.overall_confidence, 0.0);
        assert_eq!(snapshot.data_source_quality, DataSourceQuality::Low);
        assert_eq!(snapshot.data_quality.missing_fields.len(), 7);
    }

    #[test]
    fn single_financing_component_becomes_deal_value() {
        let snapshot = fallback_snapshot(&corpus("Equity Contribution,,,,,30000000"));
        assert_eq!(snapshot.transaction_details.deal_value, Some(30_000_000.0));
        assert_eq!(snapshot.data_source_quality, DataSourceQuality::Low);
    }

    #[test]
    fn deal_value_from_dollar_mention() {
        let snapshot = fallback_snapshot(&corpus("The asset trades at $42.5 million in total."));
        assert_eq!(snapshot.transaction_details.deal_value, Some(42_500_000.0));
    }

    #[test]
    fn narrative_label_lines() {
        let text = "Equity contribution: $25m\nDebt financing: $75m\nLTV: 75%\nTransaction fee: 2%\nHolding period: 5 years";
        let snapshot = fallback_snapshot(&corpus(text));
        assert_eq!(snapshot.financing_structure.equity_contribution, Some(25_000_000.0));
        assert_eq!(snapshot.financing_structure.debt_financing, Some(75_000_000.0));
        assert_eq!(snapshot.financing_structure.ltv, Some(75.0));
        assert_eq!(snapshot.transaction_details.transaction_fee, Some(2.0));
        assert_eq!(snapshot.exit_assumptions.holding_period_months, Some(60.0));
        assert_eq!(snapshot.transaction_details.deal_value, Some(100_000_000.0));
    }

    #[test]
    fn thousands_separators_are_not_cells() {
        let text = "Equity contribution: $30,000,000\nDebt financing: $70,000,000";
        let snapshot = fallback_snapshot(&corpus(text));
        assert_eq!(snapshot.financing_structure.equity_contribution, Some(30_000_000.0));
        assert_eq!(snapshot.financing_structure.debt_financing, Some(70_000_000.0));
        assert_eq!(snapshot.transaction_details.deal_value, Some(100_000_000.0));
    }

    #[test]
    fn unlabelled_grouped_amount_is_not_split() {
        let snapshot = fallback_snapshot(&corpus("Equity contribution $30,000,000"));
        assert_eq!(snapshot.financing_structure.equity_contribution, Some(30_000_000.0));
    }

    #[test]
    fn delimited_row_with_grouped_value() {
        let snapshot = fallback_snapshot(&corpus("Debt Financing,,,,,\"70,000,000\""));
        assert_eq!(snapshot.financing_structure.debt_financing, Some(70_000_000.0));
    }

    #[test]
    fn label_cell_without_separator_keeps_its_value() {
        let text = "Equity contribution: $25m, LTV 75%";
        let snapshot = fallback_snapshot(&corpus(text));
        assert_eq!(snapshot.financing_structure.equity_contribution, Some(25_000_000.0));
        assert_eq!(snapshot.financing_structure.ltv, Some(75.0));
    }

    #[test]
    fn two_labels_on_one_row() {
        let text = "Equity contribution: 30,000,000, Debt financing: 70,000,000";
        let snapshot = fallback_snapshot(&corpus(text));
        assert_eq!(snapshot.financing_structure.equity_contribution, Some(30_000_000.0));
        assert_eq!(snapshot.financing_structure.debt_financing, Some(70_000_000.0));
    }

    #[test]
    fn ai_snapshot_is_used_and_gaps_derived() {
        let service = MockInsightService::new().with_response(
            InsightDomain::MasterAnalysis,
            json!({
                "companyOverview": {"companyName": "Harbor Point Logistics"},
                "transactionDetails": {"currency": "EUR", "closingDate": "2025-06-30"},
                "financingStructure": {"equityContribution": "40 million", "debtFinancing": 60000000, "ltv": 0.6},
                "exitAssumptions": {"holdingPeriodMonths": 48},
                "overallConfidence": 0.75,
                "dataSourceQuality": "high"
            }),
        );
        let snapshot = analyzer(service).analyze(&corpus("anything"), &CancelFlag::new());
        assert_eq!(
            snapshot.company_overview.company_name.as_deref(),
            Some("Harbor Point Logistics")
        );
        assert_eq!(snapshot.transaction_details.deal_value, Some(100_000_000.0));
        assert_eq!(snapshot.financing_structure.ltv, Some(60.0));
        assert_eq!(snapshot.exit_assumptions.expected_exit_date, Some(date(2029, 6, 30)));
        assert_eq!(snapshot.data_source_quality, DataSourceQuality::High);
        assert!((snapshot.hint_confidence() - 0.6).abs() < 1e-6);
    }

    #[test]
    fn empty_ai_snapshot_falls_back() {
        let service = MockInsightService::new().with_response(
            InsightDomain::MasterAnalysis,
            json!({"companyOverview": {"companyName": null}, "overallConfidence": 0.9}),
        );
        let snapshot = analyzer(service).analyze(&corpus(CSV), &CancelFlag::new());
        assert_eq!(snapshot.transaction_details.deal_value, Some(100_000_000.0));
        assert_eq!(snapshot.data_source_quality, DataSourceQuality::Medium);
    }

    #[test]
    fn malformed_ai_snapshot_falls_back() {
        let service = MockInsightService::new().with_error(
            InsightDomain::MasterAnalysis,
            InsightError::UnparseableResponse("eof".into()),
        );
        let snapshot = analyzer(service).analyze(&corpus(CSV), &CancelFlag::new());
        assert_eq!(snapshot.currency().as_deref(), Some("USD"));
    }

    #[test]
    fn wrongly_typed_ai_fields_become_none() {
        let service = MockInsightService::new().with_response(
            InsightDomain::MasterAnalysis,
            json!({
                "transactionDetails": {"dealValue": {"amount": 5}, "dealName": "Project Atlas", "closingDate": 20250101},
                "overallConfidence": "high"
            }),
        );
        let snapshot = analyzer(service).analyze(&corpus("x"), &CancelFlag::new());
        assert_eq!(snapshot.transaction_details.deal_name.as_deref(), Some("Project Atlas"));
        assert_eq!(snapshot.transaction_details.deal_value, None);
        assert_eq!(snapshot.transaction_details.closing_date, None);
        assert_eq!(snapshot.overall_confidence, 0.0);
    }

    #[test]
    fn hint_confidence_is_bounded() {
        let mut snapshot = MasterSnapshot::default();
        assert!((snapshot.hint_confidence() - 0.2).abs() < 1e-6);
        snapshot.overall_confidence = 0.5;
        assert!((snapshot.hint_confidence() - 0.4).abs() < 1e-6);
    }

    #[test]
    fn snapshot_serializes_camel_case() {
        let snapshot = fallback_snapshot(&corpus(CSV));
        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["transactionDetails"]["closingDate"], "2025-03-31");
        assert_eq!(value["dataSourceQuality"], "medium");
        assert_eq!(value["financingStructure"]["equityContribution"], 30000000.0);
    }
}
