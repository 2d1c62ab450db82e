//! Configuration surface consumed by the server core.
//!
//! Loading configuration is up to the embedder: every type here implements
//! [`serde::Deserialize`] with defaults for missing fields, so any serde format works.
//!
//! ```
//! use micro_servlet::config::ServerConfig;
//!
//! let config = ServerConfig::default().maximal_content_length(1024 * 1024).block_size(4096);
//! assert!(config.validate().is_ok());
//! ```

use serde::Deserialize;

use crate::ensure;
use crate::protocol::ConfigError;

/// Default cap on the total bytes of one request, headers included.
pub const DEFAULT_MAXIMAL_CONTENT_LENGTH: usize = 16 * 1024 * 1024;

/// Default size of a pool block.
pub const DEFAULT_BLOCK_SIZE: usize = 8 * 1024;

/// Default minimum free space in the current read buffer before a fresh one is taken.
pub const DEFAULT_READ_SLACK: usize = 2 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub maximal_content_length: usize,
    pub read_slack: usize,
    pub pool: PoolConfig,
    pub limits: ParserLimits,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            maximal_content_length: DEFAULT_MAXIMAL_CONTENT_LENGTH,
            read_slack: DEFAULT_READ_SLACK,
            pool: PoolConfig::default(),
            limits: ParserLimits::default(),
        }
    }
}

impl ServerConfig {
    #[must_use]
    pub fn maximal_content_length(mut self, length: usize) -> Self {
        self.maximal_content_length = length;
        self
    }

    #[must_use]
    pub fn read_slack(mut self, slack: usize) -> Self {
        self.read_slack = slack;
        self
    }

    #[must_use]
    pub fn block_size(mut self, size: usize) -> Self {
        self.pool.block_size = size;
        self
    }

    #[must_use]
    pub fn blocks(mut self, initial_blocks: usize, max_blocks: usize) -> Self {
        self.pool.initial_blocks = initial_blocks;
        self.pool.max_blocks = max_blocks;
        self
    }

    #[must_use]
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.pool.retry = retry;
        self
    }

    #[must_use]
    pub fn limits(mut self, limits: ParserLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Rejects settings the core cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] naming the offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure!(self.pool.block_size > 0, ConfigError::invalid("pool.block_size", "must be positive"));
        ensure!(self.maximal_content_length > 0, ConfigError::invalid("maximal_content_length", "must be positive"));
        ensure!(
            self.pool.max_blocks == 0 || self.pool.initial_blocks <= self.pool.max_blocks,
            ConfigError::invalid("pool.initial_blocks", "must not exceed pool.max_blocks")
        );
        ensure!(
            self.pool.retry.spin_attempts <= self.pool.retry.max_attempts,
            ConfigError::invalid("pool.retry.spin_attempts", "must not exceed pool.retry.max_attempts")
        );
        self.limits.validate()
    }
}

/// Sizing of the shared [`BufferPool`](crate::buffer::BufferPool).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub block_size: usize,
    /// Blocks allocated up front.
    pub initial_blocks: usize,
    /// Upper bound on blocks ever owned by the pool, `0` means unbounded.
    pub max_blocks: usize,
    pub retry: RetryPolicy,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self { block_size: DEFAULT_BLOCK_SIZE, initial_blocks: 16, max_blocks: 1024, retry: RetryPolicy::default() }
    }
}

/// Backoff applied by [`BufferPool::acquire`](crate::buffer::BufferPool::acquire) while the pool is full.
///
/// The first `spin_attempts` retries only yield; after that the n-th retry sleeps
/// `n * sleep_step_micros`, capped at `max_sleep_micros`. After `max_attempts`
/// retries the acquisition fails.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub spin_attempts: u32,
    pub max_attempts: u32,
    pub sleep_step_micros: u64,
    pub max_sleep_micros: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { spin_attempts: 16, max_attempts: 200, sleep_step_micros: 50, max_sleep_micros: 5_000 }
    }
}

/// Per-token caps applied while parsing the request head.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ParserLimits {
    pub max_method_length: usize,
    pub max_uri_length: usize,
    pub max_header_name_length: usize,
    pub max_header_value_length: usize,
    pub max_header_count: usize,
}

impl Default for ParserLimits {
    fn default() -> Self {
        Self {
            max_method_length: 16,
            max_uri_length: 8 * 1024,
            max_header_name_length: 4 * 1024,
            max_header_value_length: 8 * 1024,
            max_header_count: 100,
        }
    }
}

impl ParserLimits {
    fn validate(&self) -> Result<(), ConfigError> {
        ensure!(self.max_method_length >= 7, ConfigError::invalid("limits.max_method_length", "must fit OPTIONS"));
        ensure!(self.max_uri_length > 0, ConfigError::invalid("limits.max_uri_length", "must be positive"));
        ensure!(self.max_header_name_length > 0, ConfigError::invalid("limits.max_header_name_length", "must be positive"));
        ensure!(self.max_header_count > 0, ConfigError::invalid("limits.max_header_count", "must be positive"));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.limits.max_method_length, 16);
        assert_eq!(config.limits.max_header_name_length, 4096);
        assert_eq!(config.limits.max_header_value_length, 8192);
    }

    #[test]
    fn deserialize_fills_missing_fields_with_defaults() {
        let config: ServerConfig = serde_json::from_str(
            r#"{
                "maximal_content_length": 65536,
                "pool": { "block_size": 1024, "max_blocks": 0 },
                "limits": { "max_header_value_length": 100 }
            }"#,
        )
        .unwrap();

        assert_eq!(config.maximal_content_length, 65536);
        assert_eq!(config.pool.block_size, 1024);
        assert_eq!(config.pool.max_blocks, 0);
        assert_eq!(config.pool.initial_blocks, 16);
        assert_eq!(config.pool.retry, RetryPolicy::default());
        assert_eq!(config.limits.max_header_value_length, 100);
        assert_eq!(config.limits.max_header_name_length, 4096);
        assert_eq!(config.read_slack, DEFAULT_READ_SLACK);
    }

    #[test]
    fn validate_rejects_broken_pool_settings() {
        let zero_block = ServerConfig::default().block_size(0);
        assert!(matches!(zero_block.validate(), Err(ConfigError::Invalid { field: "pool.block_size", .. })));

        let too_many_initial = ServerConfig::default().blocks(10, 4);
        assert!(too_many_initial.validate().is_err());

        let unbounded = ServerConfig::default().blocks(10, 0);
        assert!(unbounded.validate().is_ok());
    }
}
