use serde::{Deserialize, Serialize};

use crate::config::InsightSettings;
use crate::pipeline::corpus::DocumentText;

use super::error::{ExtractionError, InsightError};
use super::prompt::{build_prompt, SYSTEM_PROMPT};
use super::traits::DocumentInsightService;
use super::types::InsightDomain;

/// Ollama-compatible HTTP client acting as the document insight service.
pub struct OllamaInsightClient {
    base_url: String,
    model: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
    max_prompt_chars: usize,
}

impl OllamaInsightClient {
    pub fn new(
        base_url: &str,
        model: &str,
        timeout_secs: u64,
        max_prompt_chars: usize,
    ) -> Result<Self, ExtractionError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ExtractionError::HttpClient(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client,
            timeout_secs,
            max_prompt_chars,
        })
    }

    pub fn from_settings(
        settings: &InsightSettings,
        max_prompt_chars: usize,
    ) -> Result<Self, ExtractionError> {
        Self::new(
            &settings.base_url,
            &settings.model,
            settings.timeout_secs,
            max_prompt_chars,
        )
    }

    fn generate(&self, prompt: &str) -> Result<String, InsightError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = OllamaGenerateRequest {
            model: &self.model,
            prompt,
            system: SYSTEM_PROMPT,
            stream: false,
            format: "json",
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .map_err(|e| {
                if e.is_connect() {
                    InsightError::Unavailable(format!("cannot connect to {}", self.base_url))
                } else if e.is_timeout() {
                    InsightError::Timeout(self.timeout_secs * 1000)
                } else {
                    InsightError::Unavailable(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(InsightError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: OllamaGenerateResponse = response
            .json()
            .map_err(|e| InsightError::UnparseableResponse(e.to_string()))?;

        Ok(parsed.response)
    }
}

/// Request body for Ollama /api/generate
#[derive(Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    stream: bool,
    format: &'a str,
}

/// Response body from Ollama /api/generate
#[derive(Deserialize)]
struct OllamaGenerateResponse {
    response: String,
}

impl DocumentInsightService for OllamaInsightClient {
    fn extract(
        &self,
        documents: &[DocumentText],
        domain: InsightDomain,
    ) -> Result<Option<serde_json::Value>, InsightError> {
        if documents.is_empty() {
            return Ok(None);
        }
        let prompt = build_prompt(documents, domain, self.max_prompt_chars);
        let raw = self.generate(&prompt)?;
        tracing::debug!(domain = %domain, chars = raw.len(), "Insight response received");
        super::insight::parse_insight_response(&raw)
    }
}
