use std::time::Duration;

use crate::pipeline::extraction::error::ExtractionError;

/// Application-level constants
pub const APP_NAME: &str = "Dealscope";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Version stamped on every standardized record.
pub const RECORD_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Local Ollama-compatible endpoint used when nothing else is configured.
pub const DEFAULT_INSIGHT_URL: &str = "http://localhost:11434";

/// Model asked for structured guesses.
pub const DEFAULT_MODEL: &str = "llama3.1:8b";

/// Upper bound for a single insight call.
pub const DEFAULT_INSIGHT_TIMEOUT_SECS: u64 = 30;

pub const ENV_INSIGHT_URL: &str = "DEALSCOPE_INSIGHT_URL";
pub const ENV_MODEL: &str = "DEALSCOPE_MODEL";
pub const ENV_INSIGHT_TIMEOUT_SECS: &str = "DEALSCOPE_INSIGHT_TIMEOUT_SECS";

/// Log filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    if cfg!(debug_assertions) {
        "dealscope=debug,warn"
    } else {
        "dealscope=info,warn"
    }
}

/// Where and how to reach the insight service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsightSettings {
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for InsightSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_INSIGHT_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout_secs: DEFAULT_INSIGHT_TIMEOUT_SECS,
        }
    }
}

impl InsightSettings {
    /// Resolve settings from the process environment.
    pub fn from_env() -> Result<Self, ExtractionError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve settings from any key lookup; unset or blank keys keep defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ExtractionError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let timeout_secs = match get(ENV_INSIGHT_TIMEOUT_SECS) {
            Some(raw) => raw.trim().parse::<u64>().map_err(|_| {
                ExtractionError::Config(format!(
                    "{ENV_INSIGHT_TIMEOUT_SECS} must be a whole number of seconds, got '{raw}'"
                ))
            })?,
            None => defaults.timeout_secs,
        };
        if timeout_secs == 0 {
            return Err(ExtractionError::Config(format!(
                "{ENV_INSIGHT_TIMEOUT_SECS} must be greater than zero"
            )));
        }

        Ok(Self {
            base_url: get(ENV_INSIGHT_URL).unwrap_or(defaults.base_url),
            model: get(ENV_MODEL).unwrap_or(defaults.model),
            timeout_secs,
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn app_name_is_dealscope() {
        assert_eq!(APP_NAME, "Dealscope");
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, env!("CARGO_PKG_VERSION"));
        assert_eq!(RECORD_VERSION, APP_VERSION);
    }

    #[test]
    fn defaults_without_env() {
        let settings = InsightSettings::from_lookup(lookup(&[])).unwrap();
        assert_eq!(settings, InsightSettings::default());
        assert_eq!(settings.base_url, "http://localhost:11434");
        assert_eq!(settings.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn env_overrides_defaults() {
        let settings = InsightSettings::from_lookup(lookup(&[
            (ENV_INSIGHT_URL, "http://insight:8080"),
            (ENV_MODEL, "qwen2.5:14b"),
            (ENV_INSIGHT_TIMEOUT_SECS, " 5 "),
        ]))
        .unwrap();
        assert_eq!(settings.base_url, "http://insight:8080");
        assert_eq!(settings.model, "qwen2.5:14b");
        assert_eq!(settings.timeout_secs, 5);
    }

    #[test]
    fn blank_values_keep_defaults() {
        let settings = InsightSettings::from_lookup(lookup(&[(ENV_MODEL, "  ")])).unwrap();
        assert_eq!(settings.model, DEFAULT_MODEL);
    }

    #[test]
    fn invalid_timeout_is_config_error() {
        let result = InsightSettings::from_lookup(lookup(&[(ENV_INSIGHT_TIMEOUT_SECS, "soon")]));
        assert!(matches!(result, Err(ExtractionError::Config(_))));
        let result = InsightSettings::from_lookup(lookup(&[(ENV_INSIGHT_TIMEOUT_SECS, "0")]));
        assert!(matches!(result, Err(ExtractionError::Config(_))));
    }

    #[test]
    fn log_filter_targets_crate() {
        assert!(default_log_filter().starts_with("dealscope="));
    }
}
