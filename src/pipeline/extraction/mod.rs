//! Deal Extraction Pipeline
//!
//! Turns a corpus of semi-structured deal documents (spreadsheet dumps,
//! memos, OCR text) into six confidence-scored, standardized records.
//!
//! ## Architecture
//!
//! ```text
//! DocumentCorpus → MasterAnalyzer → 6 × DomainExtractor → ExtractionReport
//!                                     │
//!                                     ├─ insight service (bounded, no retry)
//!                                     ├─ pattern library
//!                                     ├─ master snapshot hints
//!                                     ├─ cross-field validation
//!                                     ├─ confidence scoring
//!                                     └─ standardization
//! ```
//!
//! ## Principles
//! - Nothing is fatal: every failure degrades to a lower confidence or a
//!   missing field, never an error returned to the caller.
//! - No fabrication: a field is either read, matched, hinted, derived from
//!   other fields, or left `{value: null, confidence: 0, source: none}`.
//! - Extractors share only read-only state: the corpus and the snapshot.

pub mod confidence;
pub mod error;
pub mod extractors;
pub mod insight;
pub mod master;
pub mod ollama;
pub mod orchestrator;
pub mod patterns;
pub mod prompt;
pub mod schema;
pub mod standardize;
pub mod traits;
pub mod types;
pub mod validation;

pub use error::{ExtractionError, InsightError, StandardizationError};
pub use extractors::all_extractors;
pub use insight::{CancelFlag, InsightGateway, MockInsightService, UnavailableInsightService};
pub use master::{MasterAnalyzer, MasterSnapshot};
pub use ollama::OllamaInsightClient;
pub use orchestrator::{ExtractionOrchestrator, ExtractionReport};
pub use standardize::DataStandardizer;
pub use traits::{DocumentInsightService, DomainExtractor, ExtractorDeps};
pub use types::*;
