//! ExtractionOrchestrator: master analysis, then the six extractors.
//!
//! The master pass always runs to completion first; its snapshot is then
//! shared read-only with the six extractors, which fan out onto blocking
//! worker threads and are joined in output order. The orchestrator holds
//! no extraction logic of its own.

use std::sync::Arc;
use std::time::Instant;

use futures_util::future::join_all;
use serde::Serialize;

use crate::pipeline::corpus::{DocumentCorpus, SourceFile};

use super::extractors::all_extractors;
use super::insight::CancelFlag;
use super::master::{fallback_snapshot, MasterAnalyzer, MasterSnapshot};
use super::schema::field_names;
use super::traits::{DocumentInsightService, ExtractorDeps};
use super::types::*;

/// Everything one request produced.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionReport {
    pub master: MasterSnapshot,
    /// One record per extraction domain, in output order.
    pub records: Vec<StandardizedRecord>,
    pub duration_ms: u64,
}

impl ExtractionReport {
    pub fn record(&self, domain: InsightDomain) -> Option<&StandardizedRecord> {
        self.records.iter().find(|r| r.domain == domain)
    }

    /// Flat `{fieldName: entry}` mapping across all six records.
    pub fn form_payload(&self) -> FormPayload {
        self.records
            .iter()
            .flat_map(|record| {
                record.fields.iter().map(move |(name, field)| {
                    let entry = FormEntry {
                        value: field
                            .value
                            .as_ref()
                            .map_or(serde_json::Value::Null, FieldValue::to_json),
                        confidence: field.confidence,
                        source: field.source,
                        domain: record.domain,
                        error: field.error.clone(),
                    };
                    (name.clone(), entry)
                })
            })
            .collect()
    }
}

/// Runs the full pipeline for one request.
pub struct ExtractionOrchestrator {
    deps: ExtractorDeps,
    cancel: CancelFlag,
}

impl ExtractionOrchestrator {
    pub fn new(service: Arc<dyn DocumentInsightService>, config: ExtractionConfig) -> Self {
        Self {
            deps: ExtractorDeps::new(service, config),
            cancel: CancelFlag::new(),
        }
    }

    /// Handle for aborting the request. In-flight service calls are
    /// abandoned; every extractor still returns a well-formed record.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub async fn run(&self, files: Vec<SourceFile>) -> ExtractionReport {
        self.run_corpus(DocumentCorpus::from_files(files)).await
    }

    pub async fn run_corpus(&self, corpus: DocumentCorpus) -> ExtractionReport {
        let start = Instant::now();
        tracing::info!(documents = corpus.len(), "Extraction started");

        let master = self.analyze(corpus.clone()).await;
        let records = self.extract_all(corpus, Arc::new(master.clone())).await;

        let duration_ms = start.elapsed().as_millis() as u64;
        let found: usize = records
            .iter()
            .map(|r| r.fields.values().filter(|f| !f.is_missing()).count())
            .sum();
        tracing::info!(
            found,
            cancelled = self.cancel.is_cancelled(),
            duration_ms,
            "Extraction complete"
        );

        ExtractionReport {
            master,
            records,
            duration_ms,
        }
    }

    async fn analyze(&self, corpus: DocumentCorpus) -> MasterSnapshot {
        let analyzer = MasterAnalyzer::new(self.deps.gateway.clone());
        let cancel = self.cancel.clone();
        let task_corpus = corpus.clone();
        match tokio::task::spawn_blocking(move || analyzer.analyze(&task_corpus, &cancel)).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::error!(error = %e, "Master analysis task failed, using fallback");
                fallback_snapshot(&corpus)
            }
        }
    }

    async fn extract_all(
        &self,
        corpus: DocumentCorpus,
        snapshot: Arc<MasterSnapshot>,
    ) -> Vec<StandardizedRecord> {
        let extractors = all_extractors(&self.deps);
        let domains: Vec<InsightDomain> = extractors.iter().map(|e| e.domain()).collect();

        let handles = extractors.into_iter().map(|extractor| {
            let corpus = corpus.clone();
            let snapshot = Arc::clone(&snapshot);
            let cancel = self.cancel.clone();
            tokio::task::spawn_blocking(move || extractor.extract(&corpus, &snapshot, &cancel))
        });

        join_all(handles)
            .await
            .into_iter()
            .zip(domains)
            .map(|(result, domain)| match result {
                Ok(record) => record,
                Err(e) => {
                    tracing::error!(domain = %domain, error = %e, "Extractor task failed");
                    self.empty_record(domain)
                }
            })
            .collect()
    }

    /// All-missing record for a domain whose extractor did not finish.
    fn empty_record(&self, domain: InsightDomain) -> StandardizedRecord {
        let record = DomainRecord::empty(domain, &field_names(domain));
        self.deps
            .standardizer
            .standardize(record, &self.deps.config.target_currency)
    }
}
