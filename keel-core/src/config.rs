// Engine configuration: worker pool sizing, join naming and optimizer switches

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Worker pool and parallel dispatch settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Worker thread count; `None` auto-detects the core count.
    pub max_workers: Option<usize>,
    /// Inputs shorter than this run on the calling thread.
    pub min_rows_for_parallel: usize,
    /// Rows per chunk handed to a worker.
    pub morsel_size: usize,
    pub parallel_enabled: bool,
    pub thread_name_prefix: String,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_workers: None,
            min_rows_for_parallel: 8192,
            morsel_size: 4096,
            parallel_enabled: true,
            thread_name_prefix: "keel-worker".to_string(),
        }
    }
}

impl ExecutionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.morsel_size == 0 {
            return Err(Error::Configuration(
                "execution.morsel_size must be > 0".to_string(),
            ));
        }
        if self.max_workers == Some(0) {
            return Err(Error::Configuration(
                "execution.max_workers must be > 0 when set".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JoinConfig {
    /// Appended to right-side column names that collide with the left side.
    pub suffix: String,
}

impl Default for JoinConfig {
    fn default() -> Self {
        Self {
            suffix: "_right".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub predicate_pushdown: bool,
    pub projection_pushdown: bool,
    pub constant_folding: bool,
    /// Upper bound on fixpoint rounds of the rewrite passes.
    pub max_iterations: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            predicate_pushdown: true,
            projection_pushdown: true,
            constant_folding: true,
            max_iterations: 16,
        }
    }
}

/// Top-level engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub execution: ExecutionConfig,
    pub join: JoinConfig,
    pub optimizer: OptimizerConfig,
}

impl EngineConfig {
    /// Load configuration from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from string (JSON, TOML or YAML)
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self> {
        if let Ok(config) = serde_json::from_str::<EngineConfig>(content) {
            return Ok(config);
        }

        if let Ok(config) = toml::from_str::<EngineConfig>(content) {
            return Ok(config);
        }

        if let Ok(config) = serde_yaml::from_str::<EngineConfig>(content) {
            return Ok(config);
        }

        Err(Error::Configuration("unrecognized configuration format".to_string()))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(workers) = env_parse::<usize>("KEEL_MAX_WORKERS") {
            config.execution.max_workers = Some(workers);
        }

        if let Some(morsel) = env_parse::<usize>("KEEL_MORSEL_SIZE") {
            config.execution.morsel_size = morsel;
        }

        if let Some(min_rows) = env_parse::<usize>("KEEL_MIN_ROWS_FOR_PARALLEL") {
            config.execution.min_rows_for_parallel = min_rows;
        }

        if let Some(parallel) = env_parse::<bool>("KEEL_PARALLEL") {
            config.execution.parallel_enabled = parallel;
        }

        config
    }

    /// Merge with another configuration (other takes precedence)
    pub fn merge(&mut self, other: EngineConfig) {
        self.execution = other.execution;
        self.join = other.join;
        self.optimizer = other.optimizer;
    }

    pub fn validate(&self) -> Result<()> {
        self.execution.validate()?;

        if self.optimizer.max_iterations == 0 {
            return Err(Error::Configuration(
                "optimizer.max_iterations must be > 0".to_string(),
            ));
        }

        if self.join.suffix.is_empty() {
            return Err(Error::Configuration("join.suffix cannot be empty".to_string()));
        }

        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
