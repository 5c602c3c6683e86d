//! Insight gateway: bounded, cancellable calls to a `DocumentInsightService`.
//!
//! Every call runs on a worker thread and is abandoned after the configured
//! timeout. There is no retry: a failed or slow call sends the extractor
//! straight to its deterministic fallbacks.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};

use regex::Regex;
use serde_json::Value;

use crate::pipeline::corpus::DocumentText;

use super::error::InsightError;
use super::traits::DocumentInsightService;
use super::types::{clamp_confidence, InsightDomain};

/// Base confidence of an AI field when the service reports no certainty.
pub const DEFAULT_AI_CONFIDENCE: f32 = 0.5;

/// Base confidence band for AI fields with reported certainty.
const AI_CONFIDENCE_FLOOR: f32 = 0.5;
const AI_CONFIDENCE_CEILING: f32 = 0.9;

/// How often a waiting call checks for cancellation.
const CANCEL_POLL: Duration = Duration::from_millis(20);

static THINK_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(think|thinking|reasoning)>.*?</(think|thinking|reasoning)>").unwrap()
});

static UNUSED_TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<unused\d+>").unwrap());

// ═══════════════════════════════════════════
// Cancellation
// ═══════════════════════════════════════════

/// Request-wide cancellation flag. Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

// ═══════════════════════════════════════════
// Payload
// ═══════════════════════════════════════════

/// A non-empty JSON object returned by the service for one domain.
#[derive(Debug, Clone, PartialEq)]
pub struct InsightPayload {
    value: Value,
}

impl InsightPayload {
    /// Wrap a service response. Responses nested under their domain tag
    /// (`{"dealAssumptions": {...}}`) are unwrapped.
    pub fn new(value: Value, domain: InsightDomain) -> Result<Self, InsightError> {
        let value = match value {
            Value::Object(mut map) if map.get(domain.as_str()).is_some_and(Value::is_object) => {
                map.remove(domain.as_str()).unwrap_or(Value::Null)
            }
            other => other,
        };
        match &value {
            Value::Null => Err(InsightError::EmptyResponse),
            Value::Object(map) if map.is_empty() => Err(InsightError::EmptyResponse),
            Value::Object(_) => Ok(Self { value }),
            other => Err(InsightError::UnparseableResponse(format!(
                "expected a JSON object, got {}",
                json_type(other)
            ))),
        }
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    /// A present, non-null field.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.value.get(name).filter(|v| !v.is_null())
    }

    /// Overall certainty reported by the service, in [0, 1].
    pub fn certainty(&self) -> Option<f32> {
        self.value.get("confidence").and_then(certainty_of)
    }

    /// Per-field certainty from a `fieldConfidence` map, in [0, 1].
    pub fn field_certainty(&self, name: &str) -> Option<f32> {
        self.value
            .get("fieldConfidence")
            .and_then(|m| m.get(name))
            .and_then(certainty_of)
    }

    /// Base confidence for an accepted AI field: `0.5 + 0.4·certainty`
    /// within [0.5, 0.9], or 0.5 when no certainty was reported.
    pub fn base_confidence(&self, name: &str) -> f32 {
        match self.field_certainty(name).or_else(|| self.certainty()) {
            Some(c) => {
                (AI_CONFIDENCE_FLOOR + 0.4 * c).clamp(AI_CONFIDENCE_FLOOR, AI_CONFIDENCE_CEILING)
            }
            None => DEFAULT_AI_CONFIDENCE,
        }
    }
}

/// Certainty as a fraction. Values in (1, 100] are read as percentages.
fn certainty_of(value: &Value) -> Option<f32> {
    let n = value.as_f64()? as f32;
    let n = if n > 1.0 && n <= 100.0 { n / 100.0 } else { n };
    (0.0..=1.0).contains(&n).then(|| clamp_confidence(n))
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ═══════════════════════════════════════════
// Gateway
// ═══════════════════════════════════════════

/// Wraps a service with a per-call timeout and cancellation check.
#[derive(Clone)]
pub struct InsightGateway {
    service: Arc<dyn DocumentInsightService>,
    timeout: Duration,
}

impl InsightGateway {
    pub fn new(service: Arc<dyn DocumentInsightService>, timeout: Duration) -> Self {
        Self { service, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// One bounded call. The wait ends at the timeout or as soon as the
    /// request is cancelled; the worker is then detached and its eventual
    /// result dropped.
    pub fn call(
        &self,
        documents: Arc<[DocumentText]>,
        domain: InsightDomain,
        cancel: &CancelFlag,
    ) -> Result<InsightPayload, InsightError> {
        if cancel.is_cancelled() {
            return Err(InsightError::Cancelled);
        }

        let (tx, rx) = mpsc::channel();
        let service = Arc::clone(&self.service);
        std::thread::Builder::new()
            .name(format!("insight-{}", domain.as_str()))
            .spawn(move || {
                // Receiver may be gone after a timeout or cancellation.
                let _ = tx.send(service.extract(&documents, domain));
            })
            .map_err(|e| {
                InsightError::Unavailable(format!("failed to spawn insight worker: {e}"))
            })?;

        let deadline = Instant::now() + self.timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(InsightError::Timeout(self.timeout.as_millis() as u64));
            }
            match rx.recv_timeout(remaining.min(CANCEL_POLL)) {
                Ok(Ok(Some(value))) => return InsightPayload::new(value, domain),
                Ok(Ok(None)) => return Err(InsightError::EmptyResponse),
                Ok(Err(e)) => return Err(e),
                Err(RecvTimeoutError::Timeout) if cancel.is_cancelled() => {
                    tracing::debug!(domain = %domain, "Insight call abandoned on cancellation");
                    return Err(InsightError::Cancelled);
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(InsightError::Unavailable(
                        "insight worker exited without a response".to_string(),
                    ))
                }
            }
        }
    }
}

// ═══════════════════════════════════════════
// Response text handling
// ═══════════════════════════════════════════

/// Strip model reasoning blocks (`<think>...</think>`, `<unusedN>thought`)
/// from raw generated text.
pub fn strip_reasoning(raw: &str) -> String {
    let mut text = THINK_BLOCK_RE.replace_all(raw, "").into_owned();

    if let Some(idx) = text.find("<unused") {
        if let Some(thought_offset) = text[idx..].find("thought\n") {
            text = text[idx + thought_offset + 8..].to_string();
        }
    }
    text = UNUSED_TOKEN_RE.replace_all(&text, "").into_owned();

    text.trim().to_string()
}

/// Find the JSON object in generated text that may carry prose or
/// markdown fences around it.
pub fn extract_json_block(response: &str) -> Option<&str> {
    let trimmed = response.trim();

    if let Some(start) = trimmed.find("```json") {
        let after_fence = &trimmed[start + 7..];
        if let Some(end) = after_fence.find("```") {
            return Some(after_fence[..end].trim());
        }
    }

    if let Some(start) = trimmed.find("```") {
        let after_fence = &trimmed[start + 3..];
        if let Some(end) = after_fence.find("```") {
            let block = after_fence[..end].trim();
            if block.starts_with('{') {
                return Some(block);
            }
        }
    }

    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => Some(&trimmed[start..=end]),
        _ => None,
    }
}

/// Parse generated text into JSON. Blank text or a literal `null` is `None`.
pub fn parse_insight_response(raw: &str) -> Result<Option<Value>, InsightError> {
    let cleaned = strip_reasoning(raw);
    if cleaned.is_empty() || cleaned == "null" {
        return Ok(None);
    }
    let block = extract_json_block(&cleaned).ok_or_else(|| {
        InsightError::UnparseableResponse("no JSON object in response".to_string())
    })?;
    let value: Value = serde_json::from_str(block)
        .map_err(|e| InsightError::UnparseableResponse(e.to_string()))?;
    Ok((!value.is_null()).then_some(value))
}

// ═══════════════════════════════════════════
// Stand-in services
// ═══════════════════════════════════════════

/// Service that is never reachable. Used for offline runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableInsightService;

impl DocumentInsightService for UnavailableInsightService {
    fn extract(
        &self,
        _documents: &[DocumentText],
        _domain: InsightDomain,
    ) -> Result<Option<Value>, InsightError> {
        Err(InsightError::Unavailable("insight service disabled".to_string()))
    }
}

/// Mock service for testing: canned responses per domain.
/// Domains without a canned response return `Ok(None)`.
#[derive(Debug, Default)]
pub struct MockInsightService {
    responses: HashMap<InsightDomain, Result<Option<Value>, InsightError>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockInsightService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(mut self, domain: InsightDomain, value: Value) -> Self {
        self.responses.insert(domain, Ok(Some(value)));
        self
    }

    pub fn with_error(mut self, domain: InsightDomain, error: InsightError) -> Self {
        self.responses.insert(domain, Err(error));
        self
    }

    /// Generated text, parsed the way the HTTP client parses it.
    pub fn with_text(mut self, domain: InsightDomain, text: &str) -> Self {
        self.responses.insert(domain, parse_insight_response(text));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

impl DocumentInsightService for MockInsightService {
    fn extract(
        &self,
        _documents: &[DocumentText],
        domain: InsightDomain,
    ) -> Result<Option<Value>, InsightError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        self.responses.get(&domain).cloned().unwrap_or(Ok(None))
    }
}
