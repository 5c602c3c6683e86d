//! Trait definitions for the deal extraction pipeline.
//!
//! Two traits define the module boundaries:
//! - DocumentInsightService: the external, unreliable structured-guess service
//! - DomainExtractor: domain-specific extraction over one field set
//!
//! Collaborators are injected through `ExtractorDeps`; nothing is looked up
//! from ambient state.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::pipeline::corpus::{DocumentCorpus, DocumentText};

use super::confidence::score_record;
use super::error::InsightError;
use super::insight::{CancelFlag, InsightGateway, InsightPayload};
use super::master::MasterSnapshot;
use super::patterns::{fill_from_patterns, FieldPatterns};
use super::schema::field_names;
use super::standardize::DataStandardizer;
use super::types::*;
use super::validation::ValidationContext;

/// External collaborator: given documents and a domain tag, returns a
/// best-effort JSON guess. `Ok(None)` means "nothing to say".
///
/// Implementations may block; callers go through `InsightGateway`, which
/// bounds every call with a timeout.
pub trait DocumentInsightService: Send + Sync {
    fn extract(
        &self,
        documents: &[DocumentText],
        domain: InsightDomain,
    ) -> Result<Option<serde_json::Value>, InsightError>;
}

impl<F> DocumentInsightService for F
where
    F: Fn(&[DocumentText], InsightDomain) -> Result<Option<serde_json::Value>, InsightError>
        + Send
        + Sync,
{
    fn extract(
        &self,
        documents: &[DocumentText],
        domain: InsightDomain,
    ) -> Result<Option<serde_json::Value>, InsightError> {
        self(documents, domain)
    }
}

/// Shared collaborators handed to every extractor.
#[derive(Clone)]
pub struct ExtractorDeps {
    pub gateway: InsightGateway,
    pub standardizer: Arc<DataStandardizer>,
    pub config: Arc<ExtractionConfig>,
}

impl ExtractorDeps {
    pub fn new(service: Arc<dyn DocumentInsightService>, config: ExtractionConfig) -> Self {
        let timeout = Duration::from_millis(config.insight_timeout_ms);
        Self {
            gateway: InsightGateway::new(service, timeout),
            standardizer: Arc::new(DataStandardizer::from_config(&config)),
            config: Arc::new(config),
        }
    }
}

/// Domain-specific extraction for one field set.
///
/// Implementors supply the domain-specific pieces (rule table, master
/// hints, cross-field rules); `extract` runs them in the fixed order
/// AI → patterns → validation → master hints → revalidation of the
/// hinted fields → scoring → standardization.
pub trait DomainExtractor: Send + Sync {
    /// Which domain this extractor handles.
    fn domain(&self) -> InsightDomain;

    fn deps(&self) -> &ExtractorDeps;

    /// Pattern rules for the scalar fields of this domain.
    fn patterns(&self) -> &'static [FieldPatterns];

    /// Field naming this domain's currency, if the domain has one.
    fn currency_field(&self) -> Option<&'static str> {
        None
    }

    /// Accept present, non-null fields from the service payload.
    fn apply_ai(&self, record: DomainRecord, payload: &InsightPayload) -> DomainRecord {
        apply_scalar_fields(record, payload)
    }

    /// Domain-specific corpus heuristics beyond the rule table.
    fn scan_corpus(&self, record: DomainRecord, _corpus: &DocumentCorpus) -> DomainRecord {
        record
    }

    /// Values the master snapshot can offer for this domain's fields.
    fn master_hints(&self, snapshot: &MasterSnapshot) -> Vec<(&'static str, FieldValue)>;

    /// Cross-field derivation and consistency checks.
    fn validate(&self, record: DomainRecord, _ctx: &ValidationContext<'_>) -> DomainRecord {
        record
    }

    /// Run the full pipeline. Never fails: every exhausted field comes back
    /// as `{value: null, confidence: 0, source: none}`.
    fn extract(
        &self,
        corpus: &DocumentCorpus,
        snapshot: &MasterSnapshot,
        cancel: &CancelFlag,
    ) -> StandardizedRecord {
        let start = Instant::now();
        let deps = self.deps();
        let domain = self.domain();
        let record = DomainRecord::empty(domain, &field_names(domain));

        let record = match deps.gateway.call(corpus.shared(), domain, cancel) {
            Ok(payload) => self.apply_ai(record, &payload),
            Err(InsightError::Cancelled) => {
                tracing::info!(domain = %domain, "Request cancelled, skipping insight call");
                record
            }
            Err(e) => {
                tracing::warn!(
                    domain = %domain,
                    error = %e,
                    "Insight call failed, falling back to patterns"
                );
                record
            }
        };

        let text = corpus.concatenated();
        let record = fill_from_patterns(record, &text, self.patterns());
        let record = self.scan_corpus(record, corpus);

        let ctx = ValidationContext::new(snapshot, deps.config.today());
        let settled = self.validate(record, &ctx);
        let hinted = fill_from_master(
            settled.clone(),
            self.master_hints(snapshot),
            snapshot.hint_confidence(),
        );
        let record = if hinted.fields == settled.fields {
            hinted
        } else {
            keep_settled(self.validate(hinted, &ctx), &settled)
        };
        let record = score_record(record, corpus);

        let currency = self
            .currency_field()
            .and_then(|f| record.value(f))
            .and_then(FieldValue::as_text)
            .map(str::to_string)
            .or_else(|| snapshot.currency());
        let record = record.with_currency(currency);

        let missing = record.missing_fields().len();
        let standardized = deps.standardizer.standardize(record, &deps.config.target_currency);

        tracing::debug!(
            domain = %domain,
            fields = standardized.fields.len(),
            missing,
            duration_ms = start.elapsed().as_millis() as u64,
            "Domain extraction complete"
        );
        standardized
    }
}

/// Accept every scalar field the payload carries for this record.
/// Arrays and objects are left to domain-specific parsing.
pub fn apply_scalar_fields(record: DomainRecord, payload: &InsightPayload) -> DomainRecord {
    let names: Vec<String> = record.fields.keys().cloned().collect();
    names.iter().fold(record, |record, name| {
        match payload.field(name).and_then(FieldValue::from_json_scalar) {
            Some(value) => {
                let confidence = payload.base_confidence(name);
                record.with_field(name, ExtractedField::found(value, confidence, FieldSource::Ai))
            }
            None => record,
        }
    })
}

/// Fill still-missing fields from master-snapshot hints (`source = derived`).
pub fn fill_from_master(
    record: DomainRecord,
    hints: Vec<(&'static str, FieldValue)>,
    confidence: f32,
) -> DomainRecord {
    hints.into_iter().fold(record, |record, (name, value)| {
        if !record.is_missing(name) {
            return record;
        }
        tracing::debug!(domain = %record.domain, field = name, "Filled from master snapshot");
        record.with_field(name, ExtractedField::found(value, confidence, FieldSource::Derived))
    })
}

/// Restore every field that was present before the master hints, so a
/// second validation pass only touches hinted and newly derived fields.
fn keep_settled(record: DomainRecord, settled: &DomainRecord) -> DomainRecord {
    settled
        .fields
        .iter()
        .filter(|(_, field)| !field.is_missing())
        .fold(record, |record, (name, field)| record.with_field(name, field.clone()))
}
