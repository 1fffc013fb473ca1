//! Engine configuration.
//!
//! Settings can be built in code with the `with_*` methods, parsed from a
//! TOML string, or loaded from an optional TOML file layered under
//! `REVIEW_ENGINE__*` environment variables:
//!
//! ```toml
//! concurrency = 4
//! timeout_ms = 120000
//! load_balancing = "round_robin"
//! rules_batch_size = 10
//!
//! [quotas]
//! request = 200
//!
//! [quotas.tokens]
//! total = 2000000
//!
//! [run_failure]
//! critical_threshold = 1
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::summary::RunFailureConfig;

/// Prefix for environment overrides, e.g. `REVIEW_ENGINE__CONCURRENCY=8`.
pub const ENV_PREFIX: &str = "REVIEW_ENGINE";

/// Separator between nested keys in environment overrides,
/// e.g. `REVIEW_ENGINE__QUOTAS__REQUEST=100`.
pub const ENV_SEPARATOR: &str = "__";

/// Errors raised while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The layered sources could not be read or deserialized.
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// A TOML document could not be parsed.
    #[error("invalid TOML configuration: {0}")]
    Toml(#[from] toml::de::Error),

    /// A value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// How a client is picked from a pool for each task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalancingStrategy {
    #[default]
    RoundRobin,
    Random,
}

/// Ceilings on cumulative token usage. Unset dimensions are not enforced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokensQuota {
    pub completion: Option<u64>,
    pub prompt: Option<u64>,
    pub total: Option<u64>,
}

impl TokensQuota {
    pub fn with_completion(mut self, limit: u64) -> Self {
        self.completion = Some(limit);
        self
    }

    pub fn with_prompt(mut self, limit: u64) -> Self {
        self.prompt = Some(limit);
        self
    }

    pub fn with_total(mut self, limit: u64) -> Self {
        self.total = Some(limit);
        self
    }

    pub fn is_unbounded(&self) -> bool {
        self.completion.is_none() && self.prompt.is_none() && self.total.is_none()
    }
}

/// Request and token ceilings for one review.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Quotas {
    /// Maximum number of provider requests a plan may need.
    pub request: Option<u64>,
    pub tokens: Option<TokensQuota>,
}

/// Configuration for planning and dispatching a review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of prompts processed at once. 1 runs sequentially.
    /// Default: 1
    pub concurrency: usize,

    /// Deadline for the whole dispatch, in milliseconds. Unset means no deadline.
    pub timeout_ms: Option<u64>,

    /// Client selection strategy when a pool of clients is given.
    /// Default: round robin
    pub load_balancing: LoadBalancingStrategy,

    pub quotas: Quotas,

    /// Maximum rules per prompt. Unset or 0 sends all rules in one batch.
    pub rules_batch_size: Option<usize>,

    /// Ask the provider to emit reasoning steps.
    pub use_reasoning: bool,

    /// Finding thresholds that fail a run.
    pub run_failure: RunFailureConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            timeout_ms: None,
            load_balancing: LoadBalancingStrategy::default(),
            quotas: Quotas::default(),
            rules_batch_size: None,
            use_reasoning: false,
            run_failure: RunFailureConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Creates a new EngineConfig with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from an optional TOML file, then apply
    /// `REVIEW_ENGINE__*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator(ENV_SEPARATOR)
                .separator(ENV_SEPARATOR)
                .try_parsing(true),
        );

        let loaded: EngineConfig = builder.build()?.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Parse configuration from a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let parsed: EngineConfig = toml::from_str(content)?;
        parsed.validate()?;
        Ok(parsed)
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid(
                "concurrency must be at least 1".to_string(),
            ));
        }
        if self.timeout_ms == Some(0) {
            return Err(ConfigError::Invalid(
                "timeout_ms must be positive when set".to_string(),
            ));
        }
        Ok(())
    }

    /// Dispatch deadline, if configured.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Sets the concurrency level.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Sets the dispatch deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn with_load_balancing(mut self, strategy: LoadBalancingStrategy) -> Self {
        self.load_balancing = strategy;
        self
    }

    pub fn with_request_quota(mut self, quota: u64) -> Self {
        self.quotas.request = Some(quota);
        self
    }

    pub fn with_tokens_quota(mut self, quota: TokensQuota) -> Self {
        self.quotas.tokens = Some(quota);
        self
    }

    pub fn with_rules_batch_size(mut self, size: usize) -> Self {
        self.rules_batch_size = Some(size);
        self
    }

    pub fn with_reasoning(mut self, use_reasoning: bool) -> Self {
        self.use_reasoning = use_reasoning;
        self
    }

    pub fn with_run_failure(mut self, run_failure: RunFailureConfig) -> Self {
        self.run_failure = run_failure;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.timeout(), None);
        assert_eq!(config.load_balancing, LoadBalancingStrategy::RoundRobin);
        assert!(config.quotas.request.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_pattern() {
        let config = EngineConfig::new()
            .with_concurrency(4)
            .with_timeout(Duration::from_secs(30))
            .with_load_balancing(LoadBalancingStrategy::Random)
            .with_request_quota(10)
            .with_tokens_quota(TokensQuota::default().with_total(1_000))
            .with_rules_batch_size(5)
            .with_reasoning(true);

        assert_eq!(config.concurrency, 4);
        assert_eq!(config.timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.load_balancing, LoadBalancingStrategy::Random);
        assert_eq!(config.quotas.request, Some(10));
        assert_eq!(config.quotas.tokens.and_then(|t| t.total), Some(1_000));
        assert_eq!(config.rules_batch_size, Some(5));
        assert!(config.use_reasoning);
    }

    #[test]
    fn test_zero_concurrency_is_invalid() {
        let config = EngineConfig::new().with_concurrency(0);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_from_toml_str() {
        let config = EngineConfig::from_toml_str(
            r#"
            concurrency = 3
            load_balancing = "random"

            [quotas]
            request = 50

            [quotas.tokens]
            prompt = 900

            [run_failure]
            critical_threshold = 2
            "#,
        )
        .expect("parse");

        assert_eq!(config.concurrency, 3);
        assert_eq!(config.load_balancing, LoadBalancingStrategy::Random);
        assert_eq!(config.quotas.request, Some(50));
        let tokens = config.quotas.tokens.expect("tokens quota");
        assert_eq!(tokens.prompt, Some(900));
        assert_eq!(tokens.total, None);
        assert_eq!(config.run_failure.critical_threshold, Some(2));
    }

    #[test]
    fn test_from_toml_str_rejects_zero_concurrency() {
        let result = EngineConfig::from_toml_str("concurrency = 0");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("temp file");
        writeln!(file, "concurrency = 6\nrules_batch_size = 4").expect("write");

        let config = EngineConfig::load(Some(file.path())).expect("load");
        assert_eq!(config.concurrency, 6);
        assert_eq!(config.rules_batch_size, Some(4));
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config =
            EngineConfig::load(Some(Path::new("/nonexistent/review-engine.toml"))).expect("load");
        assert_eq!(config.rules_batch_size, None);
    }
}
