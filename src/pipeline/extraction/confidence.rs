//! Confidence scorer: adjusts field confidence from corpus evidence.
//!
//! Two bonuses on top of the confidence a field already carries:
//! 1. Corroboration: +0.1 per additional document (beyond the first) in
//!    which the value textually occurs
//! 2. Plausibility: +0.1 when the value falls inside the field's range
//!
//! Inconsistency penalties are applied earlier, by the validators. Every
//! adjustment clamps to [0, 1].

use chrono::NaiveDate;

use crate::pipeline::corpus::DocumentCorpus;

use super::schema::{field_spec, FieldKind, FieldSpec};
use super::standardize::{format_number, numeric_view, parse_date};
use super::types::*;

/// Bonus per corroborating document beyond the first.
pub const CORROBORATION_BONUS: f32 = 0.1;

/// Bonus for a value inside its plausible range.
pub const PLAUSIBILITY_BONUS: f32 = 0.1;

/// Score every present field of `record` against the corpus.
pub fn score_record(record: DomainRecord, corpus: &DocumentCorpus) -> DomainRecord {
    let lowered: Vec<String> = corpus
        .documents()
        .iter()
        .map(|d| d.content.to_lowercase())
        .collect();

    let domain = record.domain;
    let mut fields = record.fields;
    for (name, field) in fields.iter_mut() {
        let Some(spec) = field_spec(domain, name) else {
            continue;
        };
        if field.is_missing() {
            continue;
        }
        *field = score_field(field.clone(), spec, &lowered);
    }

    DomainRecord { fields, ..record }
}

fn score_field(field: ExtractedField, spec: &FieldSpec, documents: &[String]) -> ExtractedField {
    let Some(value) = field.value.as_ref() else {
        return field;
    };

    let variants = textual_variants(value, spec.kind);
    let supporting = documents
        .iter()
        .filter(|doc| variants.iter().any(|v| occurs(doc, v)))
        .count();
    let corroboration = supporting.saturating_sub(1) as f32 * CORROBORATION_BONUS;

    let plausible = spec.range.is_some()
        && numeric_view(value, spec.kind).is_some_and(|n| spec.in_range(n));
    let plausibility = if plausible { PLAUSIBILITY_BONUS } else { 0.0 };

    field.boosted(corroboration).boosted(plausibility)
}

/// Lowercase spellings under which a value may appear in a document.
fn textual_variants(value: &FieldValue, kind: FieldKind) -> Vec<String> {
    match kind {
        FieldKind::Currency | FieldKind::Number => match numeric_view(value, kind) {
            Some(n) => magnitude_variants(n),
            None => text_variant(value),
        },
        FieldKind::Percentage => match numeric_view(value, kind) {
            Some(n) => {
                let plain = format_number(n);
                vec![format!("{plain}%"), format!("{plain} %"), format!("{plain} percent")]
            }
            None => text_variant(value),
        },
        FieldKind::Date => match value.as_text().and_then(parse_date) {
            Some(d) => date_variants(d),
            None => text_variant(value),
        },
        FieldKind::Items => Vec::new(),
        _ => text_variant(value),
    }
}

fn text_variant(value: &FieldValue) -> Vec<String> {
    value
        .as_text()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| s.len() >= 2)
        .into_iter()
        .collect()
}

fn magnitude_variants(n: f64) -> Vec<String> {
    let mut variants = vec![format_number(n), with_separators(n)];
    for (scale, words) in [
        (1e9, &["billion", "bn", "b"][..]),
        (1e6, &["million", "mm", "m"][..]),
        (1e3, &["thousand", "k"][..]),
    ] {
        if n.abs() >= scale {
            let scaled = format_number(n / scale);
            for word in words {
                variants.push(format!("{scaled} {word}"));
                variants.push(format!("{scaled}{word}"));
            }
            break;
        }
    }
    variants.dedup();
    variants
}

/// `30000000` → `30,000,000`. Fractions are dropped.
fn with_separators(n: f64) -> String {
    let digits = format!("{}", n.abs().trunc() as u64);
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    if n < 0.0 {
        format!("-{out}")
    } else {
        out
    }
}

fn date_variants(d: NaiveDate) -> Vec<String> {
    ["%Y-%m-%d", "%d/%m/%Y", "%m/%d/%Y", "%B %-d, %Y", "%-d %B %Y"]
        .iter()
        .map(|fmt| d.format(fmt).to_string().to_lowercase())
        .collect()
}

/// Whether `needle` occurs in `haystack` without being part of a longer
/// number (`50m` must not match inside `150m`).
fn occurs(haystack: &str, needle: &str) -> bool {
    let starts_numeric = needle.starts_with(|c: char| c.is_ascii_digit());
    let ends_numeric = needle.ends_with(|c: char| c.is_ascii_digit());

    haystack.match_indices(needle).any(|(i, _)| {
        let before = haystack[..i].chars().next_back();
        let after = haystack[i + needle.len()..].chars().next();
        let clean_before = !starts_numeric
            || !before.is_some_and(|c| c.is_ascii_digit() || c == '.' || c == ',');
        let clean_after = !ends_numeric
            || !after.is_some_and(|c| c.is_ascii_digit() || c == '.' || c == ',');
        let word_end =
            !after.is_some_and(|c| c.is_alphabetic()) || !needle.ends_with(char::is_alphabetic);
        clean_before && clean_after && word_end
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::corpus::SourceFile;

    fn corpus(texts: &[&str]) -> DocumentCorpus {
        DocumentCorpus::from_files(
            texts
                .iter()
                .enumerate()
                .map(|(i, t)| SourceFile::new(format!("doc{i}.txt"), *t))
                .collect(),
        )
    }

    fn deal_record(value: FieldValue, confidence: f32) -> DomainRecord {
        DomainRecord::empty(InsightDomain::DealAssumptions, &["dealValue"]).with_field(
            "dealValue",
            ExtractedField::found(value, confidence, FieldSource::Ai),
        )
    }

    #[test]
    fn corroborating_documents_add_bonus() {
        let corpus = corpus(&[
            "Deal value: $50 million",
            "Purchase price 50,000,000",
            "We paid $50m for it",
            "Unrelated memo",
        ]);
        let record = score_record(deal_record(FieldValue::Number(5e7), 0.5), &corpus);
        // Three supporting documents → +0.2, in range → +0.1.
        assert!((record.get("dealValue").unwrap().confidence - 0.8).abs() < 1e-6);
    }

    #[test]
    fn single_document_gets_only_range_bonus() {
        let corpus = corpus(&["Deal value: $50 million"]);
        let record = score_record(deal_record(FieldValue::Number(5e7), 0.5), &corpus);
        assert!((record.get("dealValue").unwrap().confidence - 0.6).abs() < 1e-6);
    }

    #[test]
    fn implausible_value_gets_no_range_bonus() {
        let corpus = corpus(&["nothing"]);
        let record = score_record(deal_record(FieldValue::Number(500.0), 0.5), &corpus);
        assert!((record.get("dealValue").unwrap().confidence - 0.5).abs() < 1e-6);
    }

    #[test]
    fn bonuses_are_clamped() {
        let corpus = corpus(&["$50m", "$50m", "$50m", "$50m"]);
        let record = score_record(deal_record(FieldValue::Number(5e7), 0.9), &corpus);
        assert_eq!(record.get("dealValue").unwrap().confidence, 1.0);
    }

    #[test]
    fn missing_fields_stay_at_zero() {
        let corpus = corpus(&["Deal value: $50 million"]);
        let record = DomainRecord::empty(InsightDomain::DealAssumptions, &["dealValue"]);
        let record = score_record(record, &corpus);
        assert_eq!(record.get("dealValue").unwrap(), &ExtractedField::missing());
    }

    #[test]
    fn numbers_do_not_match_inside_longer_numbers() {
        assert!(occurs("price $50m today", "50m"));
        assert!(!occurs("price $150m today", "50m"));
        assert!(!occurs("price 50.5m", "50"));
        assert!(!occurs("50 months", "50 m"));
        assert!(occurs("rate of 6.5%", "6.5%"));
    }

    #[test]
    fn date_and_text_variants() {
        let variants = textual_variants(&FieldValue::from("2025-03-31"), FieldKind::Date);
        assert!(variants.contains(&"31/03/2025".to_string()));
        assert!(variants.contains(&"march 31, 2025".to_string()));

        let variants = textual_variants(&FieldValue::from("Harbor Point"), FieldKind::Text);
        assert_eq!(variants, vec!["harbor point".to_string()]);
    }

    #[test]
    fn separators() {
        assert_eq!(with_separators(30_000_000.0), "30,000,000");
        assert_eq!(with_separators(999.0), "999");
        assert_eq!(with_separators(-1_500.0), "-1,500");
    }
}
