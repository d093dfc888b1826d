use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Settings shared by every layer above a persist backend.
///
/// All fields have defaults, so a TOML file only needs to name the values
/// it changes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Identifies the repository inside a shared backend.
    pub repository_id: String,
    /// Branch created by `initialize_repo`.
    pub default_branch: String,
    /// Maximum number of ancestor ids carried in a commit's tail.
    pub parents_per_commit: usize,
    /// Incremental index element count that triggers materialization.
    pub incremental_index_distance: usize,
    /// Incremental index serialized size that triggers materialization.
    pub max_incremental_index_bytes: usize,
    /// Complete indexes above this size are split into stripes.
    pub max_segment_bytes: usize,
    pub retry: RetryPolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            repository_id: String::new(),
            default_branch: "main".into(),
            parents_per_commit: 20,
            incremental_index_distance: 50,
            max_incremental_index_bytes: 50 * 1024,
            max_segment_bytes: 128 * 1024,
            retry: RetryPolicy::default(),
        }
    }
}

impl StoreConfig {
    pub fn with_repository_id(mut self, id: impl Into<String>) -> Self {
        self.repository_id = id.into();
        self
    }

    pub fn with_default_branch(mut self, name: impl Into<String>) -> Self {
        self.default_branch = name.into();
        self
    }

    pub fn with_parents_per_commit(mut self, n: usize) -> Self {
        self.parents_per_commit = n;
        self
    }

    pub fn with_incremental_index_distance(mut self, n: usize) -> Self {
        self.incremental_index_distance = n;
        self
    }

    pub fn with_max_incremental_index_bytes(mut self, n: usize) -> Self {
        self.max_incremental_index_bytes = n;
        self
    }

    pub fn with_max_segment_bytes(mut self, n: usize) -> Self {
        self.max_segment_bytes = n;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Parse and validate a TOML configuration.
    pub fn from_toml_str(s: &str) -> StoreResult<Self> {
        let config: Self = toml::from_str(s).map_err(|e| StoreError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot operate with.
    pub fn validate(&self) -> StoreResult<()> {
        if self.default_branch.is_empty() {
            return Err(StoreError::Config("default_branch must not be empty".into()));
        }
        if self.parents_per_commit == 0 {
            return Err(StoreError::Config("parents_per_commit must be at least 1".into()));
        }
        if self.incremental_index_distance == 0 {
            return Err(StoreError::Config(
                "incremental_index_distance must be at least 1".into(),
            ));
        }
        if self.max_incremental_index_bytes == 0 || self.max_segment_bytes == 0 {
            return Err(StoreError::Config("index size limits must be positive".into()));
        }
        self.retry.validate()
    }
}

/// Bounded, randomized backoff for operations that lose a compare-and-swap.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub timeout_ms: u64,
    /// Lower bound of the first sleep window.
    pub initial_sleep_lower_ms: u64,
    /// Upper bound of the first sleep window.
    pub initial_sleep_upper_ms: u64,
    /// The sleep window doubles after each attempt, up to this bound.
    pub max_sleep_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 25,
            timeout_ms: 5_000,
            initial_sleep_lower_ms: 5,
            initial_sleep_upper_ms: 25,
            max_sleep_ms: 75,
        }
    }
}

impl RetryPolicy {
    /// A policy that runs an operation exactly once.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn validate(&self) -> StoreResult<()> {
        if self.max_attempts == 0 {
            return Err(StoreError::Config("retry.max_attempts must be at least 1".into()));
        }
        if self.initial_sleep_lower_ms > self.initial_sleep_upper_ms {
            return Err(StoreError::Config(
                "retry.initial_sleep_lower_ms exceeds retry.initial_sleep_upper_ms".into(),
            ));
        }
        if self.initial_sleep_upper_ms > self.max_sleep_ms {
            return Err(StoreError::Config(
                "retry.initial_sleep_upper_ms exceeds retry.max_sleep_ms".into(),
            ));
        }
        Ok(())
    }
}
