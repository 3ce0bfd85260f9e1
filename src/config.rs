//! Dispatcher configuration
//!
//! Loaded from YAML (all fields optional, defaults below) and/or
//! `DISPATCH_*` environment variables.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;

/// Upper bound on `pending_ttl_secs` (one year)
pub const MAX_PENDING_TTL_SECS: u64 = 365 * 24 * 60 * 60;

/// Tunables for the clarity gate, classifier, pending store and tool stages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Clarification rounds allowed per original question before proceeding as clear
    pub max_clarification_attempts: u32,
    /// Utterances with fewer words are "too short"
    pub min_words: usize,
    /// Model confidence required for the clarity gate to call an utterance clear
    pub clarity_threshold: f32,
    /// Model confidence required to trust the intent model over keyword fallback
    pub intent_confidence_threshold: f32,
    /// Default pending action TTL
    pub pending_ttl_secs: u64,
    /// Interval of the background expiry sweep
    pub sweep_interval_secs: u64,
    /// Terminal pending actions older than this are purged by the sweep; 0 keeps them
    pub pending_retention_secs: u64,
    /// Timeout applied to every LLM call
    pub llm_timeout_ms: u64,
    /// Execution timeout passed to the query tool
    pub query_timeout_secs: u64,
    /// Row cap passed to the query tool
    pub query_max_rows: usize,
    /// Recent history entries fetched per turn
    pub history_limit: usize,
    /// Messages kept per session by the in-memory history
    pub history_capacity: usize,
    pub clarity_temperature: f32,
    pub intent_temperature: f32,
    pub question_temperature: f32,
    pub max_tokens: u32,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_clarification_attempts: 3,
            min_words: 3,
            clarity_threshold: 0.4,
            intent_confidence_threshold: 0.6,
            pending_ttl_secs: 300,
            sweep_interval_secs: 60,
            pending_retention_secs: 24 * 60 * 60,
            llm_timeout_ms: 20_000,
            query_timeout_secs: 30,
            query_max_rows: 1000,
            history_limit: 10,
            history_capacity: crate::tools::DEFAULT_HISTORY_CAPACITY,
            clarity_temperature: 0.0,
            intent_temperature: 0.0,
            question_temperature: 0.3,
            max_tokens: 512,
        }
    }
}

impl DispatchConfig {
    /// Parse from a YAML document; missing fields take defaults
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: DispatchConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a YAML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }

    /// Defaults overridden by `DISPATCH_*` environment variables (after `.env`)
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a lookup function (env in production, a map in tests)
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parse<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
            raw.trim()
                .parse::<T>()
                .map_err(|_| ConfigError::invalid(key, format!("cannot parse '{}'", raw)))
        }

        macro_rules! overlay {
            ($field:ident, $key:literal) => {
                if let Some(raw) = lookup($key) {
                    self.$field = parse($key, &raw)?;
                }
            };
        }

        overlay!(max_clarification_attempts, "DISPATCH_MAX_CLARIFICATION_ATTEMPTS");
        overlay!(min_words, "DISPATCH_MIN_WORDS");
        overlay!(clarity_threshold, "DISPATCH_CLARITY_THRESHOLD");
        overlay!(intent_confidence_threshold, "DISPATCH_INTENT_CONFIDENCE_THRESHOLD");
        overlay!(pending_ttl_secs, "DISPATCH_PENDING_TTL_SECS");
        overlay!(sweep_interval_secs, "DISPATCH_SWEEP_INTERVAL_SECS");
        overlay!(pending_retention_secs, "DISPATCH_PENDING_RETENTION_SECS");
        overlay!(llm_timeout_ms, "DISPATCH_LLM_TIMEOUT_MS");
        overlay!(query_timeout_secs, "DISPATCH_QUERY_TIMEOUT_SECS");
        overlay!(query_max_rows, "DISPATCH_QUERY_MAX_ROWS");
        overlay!(history_limit, "DISPATCH_HISTORY_LIMIT");
        overlay!(history_capacity, "DISPATCH_HISTORY_CAPACITY");
        overlay!(max_tokens, "DISPATCH_MAX_TOKENS");

        Ok(())
    }

    /// Check ranges and the threshold ordering
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("clarity_threshold", self.clarity_threshold),
            ("intent_confidence_threshold", self.intent_confidence_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::invalid(field, "must be within [0, 1]"));
            }
        }
        if self.clarity_threshold >= self.intent_confidence_threshold {
            return Err(ConfigError::invalid(
                "clarity_threshold",
                format!(
                    "must be lower than intent_confidence_threshold ({})",
                    self.intent_confidence_threshold
                ),
            ));
        }
        if self.max_clarification_attempts == 0 {
            return Err(ConfigError::invalid(
                "max_clarification_attempts",
                "must be at least 1",
            ));
        }
        if self.min_words == 0 {
            return Err(ConfigError::invalid("min_words", "must be at least 1"));
        }
        if self.llm_timeout_ms == 0 {
            return Err(ConfigError::invalid("llm_timeout_ms", "must be positive"));
        }
        if self.pending_ttl_secs > MAX_PENDING_TTL_SECS {
            return Err(ConfigError::invalid(
                "pending_ttl_secs",
                format!("must be at most {}", MAX_PENDING_TTL_SECS),
            ));
        }
        if self.pending_retention_secs > MAX_PENDING_TTL_SECS {
            return Err(ConfigError::invalid(
                "pending_retention_secs",
                format!("must be at most {}", MAX_PENDING_TTL_SECS),
            ));
        }
        if self.history_capacity < self.history_window() {
            return Err(ConfigError::invalid(
                "history_capacity",
                format!("must be at least the history window ({})", self.history_window()),
            ));
        }
        Ok(())
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_millis(self.llm_timeout_ms)
    }

    /// Saturates at `MAX_PENDING_TTL_SECS` for configs that skipped `validate()`
    pub fn pending_ttl(&self) -> chrono::Duration {
        bounded_secs(self.pending_ttl_secs)
    }

    /// `None` when retention is disabled
    pub fn pending_retention(&self) -> Option<chrono::Duration> {
        (self.pending_retention_secs > 0).then(|| bounded_secs(self.pending_retention_secs))
    }

    /// History entries fetched per turn: `history_limit`, widened so a full
    /// clarification chain (original question plus every round) stays visible
    pub fn history_window(&self) -> usize {
        let chain = 2 * self.max_clarification_attempts as usize + 2;
        self.history_limit.max(chain)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

fn bounded_secs(secs: u64) -> chrono::Duration {
    i64::try_from(secs.min(MAX_PENDING_TTL_SECS))
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .unwrap_or(chrono::Duration::MAX)
}
