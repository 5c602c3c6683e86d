//! Data standardizer: pure conversions into canonical representation.
//!
//! Dates become ISO `YYYY-MM-DD`, money becomes a plain number in the target
//! currency, percentages use the 0–100 scale, magnitudes are absolute and
//! categorical fields use their canonical label. Nothing here invents a
//! value: a field that cannot be converted keeps its original value and
//! carries an error annotation instead.

use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveDateTime, Utc};
use regex::Regex;

use super::error::StandardizationError;
use super::schema::{field_specs, FieldKind, FieldSpec};
use super::types::*;

static NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\(?\s*(?P<neg>-)?\s*(?:[a-z]{3}\s+)?[$€£¥]?\s*(?P<neg2>-)?(?P<num>\d[\d,]*(?:\.\d+)?|\.\d+)\s*(?P<unit>billion|bn|b|million|mio|mm|mn|m|thousand|k)?\.?\s*(?:[a-z]{3})?\s*\)?$",
    )
    .unwrap()
});

static ISO_DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4})[-/](\d{1,2})[-/](\d{1,2})(?:[T\s].*)?$").unwrap()
});

static NUMERIC_DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,2})[/.\-](\d{1,2})[/.\-](\d{2}|\d{4})$").unwrap()
});

static MONTH_FIRST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^([a-z]{3,9})\.?\s+(\d{1,2})(?:st|nd|rd|th)?,?\s+(\d{4})$").unwrap()
});

static DAY_FIRST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(\d{1,2})(?:st|nd|rd|th)?[\s\-]+([a-z]{3,9})\.?,?[\s\-]+(\d{4})$").unwrap()
});

/// Formats tried after the specific patterns above.
const GENERIC_DATE_FORMATS: &[&str] = &["%Y%m%d", "%d %m %Y", "%Y.%m.%d"];

const MONTHS: &[&str] = &[
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

/// Excel's day zero for serial dates.
const EXCEL_EPOCH: (i32, u32, u32) = (1899, 12, 30);

/// Multiplier for a magnitude word or suffix (`billion|b`, `million|m`, `thousand|k`).
pub fn unit_multiplier(unit: &str) -> Option<f64> {
    match unit.trim().trim_end_matches('.').to_lowercase().as_str() {
        "billion" | "billions" | "bn" | "b" => Some(1e9),
        "million" | "millions" | "mio" | "mm" | "mn" | "m" => Some(1e6),
        "thousand" | "thousands" | "k" => Some(1e3),
        _ => None,
    }
}

/// Parse a number that may carry symbols, commas and a magnitude suffix.
///
/// `"2.5 million"` → 2_500_000, `"150k"` → 150_000, `"$1,200"` → 1200,
/// `"(500)"` → -500.
pub fn standardize_number(raw: &str) -> Result<f64, StandardizationError> {
    let trimmed = raw.trim();
    let caps = NUMBER_RE
        .captures(trimmed)
        .ok_or_else(|| StandardizationError::UnparseableNumber(raw.to_string()))?;

    let digits = caps["num"].replace(',', "");
    let mut value: f64 = digits
        .parse()
        .map_err(|_| StandardizationError::UnparseableNumber(raw.to_string()))?;

    if let Some(unit) = caps.name("unit") {
        value *= unit_multiplier(unit.as_str()).unwrap_or(1.0);
    }

    let negative = caps.name("neg").is_some()
        || caps.name("neg2").is_some()
        || (trimmed.starts_with('(') && trimmed.ends_with(')'));
    Ok(if negative { -value } else { value })
}

/// Numeric value of a raw field value.
pub fn standardize_number_value(value: &FieldValue) -> Result<f64, StandardizationError> {
    match value {
        FieldValue::Number(n) => Ok(*n),
        FieldValue::Text(s) => standardize_number(s),
        other => Err(StandardizationError::TypeMismatch {
            expected: "number",
            found: other.type_name(),
        }),
    }
}

/// Percentage on the 0–100 scale.
///
/// Numbers ≥ 1 are already percentages; numbers below 1 are fractions and
/// get multiplied by 100. Text with a literal `%` is stripped and kept as-is;
/// basis points (`"250 bps"`) are divided by 100.
pub fn standardize_percentage(value: &FieldValue) -> Result<f64, StandardizationError> {
    match value {
        FieldValue::Number(n) => Ok(scale_fraction(*n)),
        FieldValue::Text(s) => {
            let lower = s.trim().to_lowercase();
            let unparseable = || StandardizationError::UnparseablePercentage(s.clone());

            if let Some(stripped) = lower.strip_suffix('%') {
                return parse_plain(stripped).ok_or_else(unparseable);
            }
            for suffix in ["bps", "bp", "basis points"] {
                if let Some(stripped) = lower.strip_suffix(suffix) {
                    return parse_plain(stripped).map(|bps| bps / 100.0).ok_or_else(unparseable);
                }
            }
            parse_plain(&lower).map(scale_fraction).ok_or_else(unparseable)
        }
        other => Err(StandardizationError::TypeMismatch {
            expected: "percentage",
            found: other.type_name(),
        }),
    }
}

fn scale_fraction(n: f64) -> f64 {
    if n.abs() < 1.0 {
        n * 100.0
    } else {
        n
    }
}

fn parse_plain(s: &str) -> Option<f64> {
    s.trim().replace(',', "").parse().ok()
}

/// Normalize a date into ISO `YYYY-MM-DD`.
///
/// Slash/dash numeric dates default to month-first; when the first field is
/// greater than 12 it must be the day, so day and month swap.
pub fn standardize_date(raw: &str) -> Result<String, StandardizationError> {
    parse_date(raw)
        .map(|d| d.format("%Y-%m-%d").to_string())
        .ok_or_else(|| StandardizationError::UnparseableDate(raw.to_string()))
}

/// Parse a date in any supported format.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();

    if let Some(c) = ISO_DATE_RE.captures(s) {
        return ymd(c[1].parse().ok()?, c[2].parse().ok()?, c[3].parse().ok()?);
    }

    if let Some(c) = NUMERIC_DATE_RE.captures(s) {
        let first: u32 = c[1].parse().ok()?;
        let second: u32 = c[2].parse().ok()?;
        let year = expand_year(c[3].parse().ok()?, c[3].len());
        let (month, day) = if first > 12 { (second, first) } else { (first, second) };
        return ymd(year, month, day);
    }

    if let Some(c) = MONTH_FIRST_RE.captures(s) {
        let month = month_from_name(&c[1])?;
        return ymd(c[3].parse().ok()?, month, c[2].parse().ok()?);
    }

    if let Some(c) = DAY_FIRST_RE.captures(s) {
        let month = month_from_name(&c[2])?;
        return ymd(c[3].parse().ok()?, month, c[1].parse().ok()?);
    }

    parse_generic_date(s)
}

fn parse_generic_date(s: &str) -> Option<NaiveDate> {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.date());
    }
    GENERIC_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

fn ymd(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, day)
}

fn expand_year(year: i32, digits: usize) -> i32 {
    match digits {
        2 if year < 70 => 2000 + year,
        2 => 1900 + year,
        _ => year,
    }
}

fn month_from_name(name: &str) -> Option<u32> {
    let lower = name.to_lowercase();
    let prefix = lower.get(..3)?;
    MONTHS
        .iter()
        .position(|m| *m == prefix)
        .map(|i| i as u32 + 1)
}

/// Interpret a spreadsheet serial number as a date.
fn excel_serial_date(serial: f64) -> Option<NaiveDate> {
    if !(1.0..=2_958_465.0).contains(&serial) || serial.fract() != 0.0 {
        return None;
    }
    let (y, m, d) = EXCEL_EPOCH;
    NaiveDate::from_ymd_opt(y, m, d)?.checked_add_days(chrono::Days::new(serial as u64))
}

/// Normalize a currency label into an ISO 4217 code.
pub fn standardize_currency_code(raw: &str) -> Result<String, StandardizationError> {
    let lower = raw.trim().to_lowercase();
    let code = match lower.as_str() {
        "$" | "us$" | "usd" | "us dollar" | "us dollars" | "dollar" | "dollars" => "USD",
        "€" | "eur" | "euro" | "euros" => "EUR",
        "£" | "gbp" | "pound" | "pounds" | "sterling" | "pound sterling" => "GBP",
        "¥" | "jpy" | "yen" => "JPY",
        "chf" | "swiss franc" | "swiss francs" => "CHF",
        "c$" | "cad" | "canadian dollar" | "canadian dollars" => "CAD",
        "a$" | "aud" | "australian dollar" | "australian dollars" => "AUD",
        other if other.len() == 3 && other.chars().all(|c| c.is_ascii_alphabetic()) => {
            return Ok(other.to_uppercase());
        }
        _ => return Err(StandardizationError::UnknownCurrency(raw.to_string())),
    };
    Ok(code.to_string())
}

/// Convert an amount between currencies: `amount · rate[to] / rate[from]`.
pub fn convert_currency(
    amount: f64,
    from: &str,
    to: &str,
    rates: &CurrencyRates,
) -> Result<f64, StandardizationError> {
    if from.eq_ignore_ascii_case(to) {
        return Ok(amount);
    }
    let from_rate = rates
        .rate(from)
        .ok_or_else(|| StandardizationError::UnknownCurrency(from.to_string()))?;
    let to_rate = rates
        .rate(to)
        .ok_or_else(|| StandardizationError::UnknownCurrency(to.to_string()))?;
    Ok(amount * to_rate / from_rate)
}

/// Numeric view of a raw value for a given field kind, without changing it.
/// Used by validation and scoring, which run before standardization.
pub fn numeric_view(value: &FieldValue, kind: FieldKind) -> Option<f64> {
    match kind {
        FieldKind::Percentage => standardize_percentage(value).ok(),
        FieldKind::Currency | FieldKind::Number => standardize_number_value(value).ok(),
        _ => None,
    }
}

/// Converts whole domain records into standardized records.
#[derive(Debug, Clone)]
pub struct DataStandardizer {
    rates: CurrencyRates,
    version: String,
}

impl DataStandardizer {
    pub fn new(rates: CurrencyRates, version: impl Into<String>) -> Self {
        Self {
            rates,
            version: version.into(),
        }
    }

    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self::new(config.currency_rates.clone(), config.record_version.clone())
    }

    /// Standardize every field of `record`. Never fails: a field that cannot
    /// be converted keeps its value and gets an `error` annotation.
    pub fn standardize(&self, record: DomainRecord, target_currency: &str) -> StandardizedRecord {
        let target = standardize_currency_code(target_currency)
            .unwrap_or_else(|_| target_currency.to_uppercase());
        let source_currency = record.currency.as_deref().map(standardize_currency_code);

        let mut fields = record.fields;
        for spec in field_specs(record.domain) {
            let Some(field) = fields.remove(spec.name) else {
                continue;
            };
            let field = self.standardize_field(field, spec, source_currency.as_ref(), &target);
            fields.insert(spec.name.to_string(), field);
        }

        StandardizedRecord {
            domain: record.domain,
            fields,
            standardized_at: Utc::now(),
            target_currency: target,
            version: self.version.clone(),
        }
    }

    fn standardize_field(
        &self,
        field: ExtractedField,
        spec: &FieldSpec,
        source_currency: Option<&Result<String, StandardizationError>>,
        target: &str,
    ) -> ExtractedField {
        let Some(value) = field.value.clone() else {
            return field;
        };

        let converted = match spec.kind {
            FieldKind::Text => match value {
                FieldValue::Text(s) => Ok(FieldValue::Text(s.trim().to_string())),
                FieldValue::Number(n) => Ok(FieldValue::Text(format_number(n))),
                other => Err(StandardizationError::TypeMismatch {
                    expected: "text",
                    found: other.type_name(),
                }),
            },
            FieldKind::Date => self.date_value(&value),
            FieldKind::Currency => standardize_number_value(&value)
                .and_then(|n| self.to_target(n, source_currency, target))
                .map(FieldValue::Number),
            FieldKind::CurrencyCode => text_of(&value, "currency code")
                .and_then(standardize_currency_code)
                .map(FieldValue::Text),
            FieldKind::Percentage => standardize_percentage(&value).map(FieldValue::Number),
            FieldKind::Number => standardize_number_value(&value).map(FieldValue::Number),
            FieldKind::Category(kind) => text_of(&value, kind.label()).and_then(|s| {
                kind.normalize(s)
                    .map(FieldValue::from)
                    .ok_or_else(|| StandardizationError::UnknownCategory {
                        kind: kind.label(),
                        value: s.to_string(),
                    })
            }),
            FieldKind::Items => match value {
                FieldValue::Items(items) => {
                    let (items, errors) = self.standardize_items(items, source_currency, target);
                    if !errors.is_empty() {
                        tracing::debug!(
                            field = spec.name,
                            errors = ?errors,
                            "Line item standardization errors"
                        );
                        let field = field.with_value(FieldValue::Items(items));
                        return field.with_error(errors.join("; "));
                    }
                    Ok(FieldValue::Items(items))
                }
                other => Err(StandardizationError::TypeMismatch {
                    expected: "line items",
                    found: other.type_name(),
                }),
            },
        };

        match converted {
            Ok(value) => field.with_value(value),
            Err(e) => {
                tracing::debug!(
                    field = spec.name,
                    error = %e,
                    "Standardization failed, keeping original value"
                );
                field.with_error(e.to_string())
            }
        }
    }

    fn date_value(&self, value: &FieldValue) -> Result<FieldValue, StandardizationError> {
        match value {
            FieldValue::Text(s) => standardize_date(s).map(FieldValue::Text),
            FieldValue::Number(n) => excel_serial_date(*n)
                .map(FieldValue::from)
                .ok_or_else(|| StandardizationError::UnparseableDate(format_number(*n))),
            other => Err(StandardizationError::TypeMismatch {
                expected: "date",
                found: other.type_name(),
            }),
        }
    }

    fn to_target(
        &self,
        amount: f64,
        source_currency: Option<&Result<String, StandardizationError>>,
        target: &str,
    ) -> Result<f64, StandardizationError> {
        match source_currency {
            None => Ok(amount),
            Some(Ok(from)) => convert_currency(amount, from, target, &self.rates),
            Some(Err(e)) => Err(e.clone()),
        }
    }

    /// Standardize line items, then drop duplicate `(name, value)` pairs
    /// (keeping the more confident one) and sort by value descending.
    fn standardize_items(
        &self,
        items: Vec<LineItem>,
        source_currency: Option<&Result<String, StandardizationError>>,
        target: &str,
    ) -> (Vec<LineItem>, Vec<String>) {
        let mut errors = Vec::new();
        let mut standardized: Vec<LineItem> = Vec::with_capacity(items.len());

        for item in items {
            let value = match standardize_number_value(&item.value)
                .and_then(|n| self.to_target(n, source_currency, target))
            {
                Ok(n) => FieldValue::Number(n),
                Err(e) => {
                    errors.push(format!("item '{}': {e}", item.name));
                    item.value.clone()
                }
            };
            let growth_rate = match item.growth_rate.as_ref().map(standardize_percentage) {
                Some(Ok(rate)) => Some(FieldValue::Number(rate)),
                Some(Err(e)) => {
                    errors.push(format!("item '{}': {e}", item.name));
                    item.growth_rate.clone()
                }
                None => None,
            };
            standardized.push(LineItem {
                name: item.name.trim().to_string(),
                value,
                growth_rate,
                ..item
            });
        }

        (dedup_and_sort(standardized), errors)
    }
}

/// Remove duplicate `(name, value)` pairs and sort by value descending.
pub fn dedup_and_sort(items: Vec<LineItem>) -> Vec<LineItem> {
    let mut kept: Vec<LineItem> = Vec::with_capacity(items.len());
    for item in items {
        let duplicate = kept.iter().position(|k| {
            k.name.eq_ignore_ascii_case(&item.name) && same_value(&k.value, &item.value)
        });
        match duplicate {
            Some(i) if item.confidence > kept[i].confidence => kept[i] = item,
            Some(_) => {}
            None => kept.push(item),
        }
    }
    kept.sort_by(|a, b| {
        let va = a.value.as_f64().unwrap_or(f64::NEG_INFINITY);
        let vb = b.value.as_f64().unwrap_or(f64::NEG_INFINITY);
        vb.total_cmp(&va)
    });
    kept
}

fn same_value(a: &FieldValue, b: &FieldValue) -> bool {
    match (a, b) {
        (FieldValue::Number(x), FieldValue::Number(y)) => (x - y).abs() < 1e-6,
        _ => a == b,
    }
}

fn text_of<'a>(
    value: &'a FieldValue,
    expected: &'static str,
) -> Result<&'a str, StandardizationError> {
    value.as_text().ok_or(StandardizationError::TypeMismatch {
        expected,
        found: value.type_name(),
    })
}

/// Render a number without a trailing `.0` for whole values.
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// Days between two dates expressed in years.
pub fn years_between(from: NaiveDate, to: NaiveDate) -> f64 {
    (to - from).num_days() as f64 / 365.25
}
