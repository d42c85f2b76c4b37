//! Compiler configuration.
//!
//! Handles loading configuration from environment variables with sensible defaults.

use crate::query::ParserLimits;
use crate::sql::{DEFAULT_CLICKHOUSE_TABLE, DEFAULT_LIMIT, DEFAULT_SQLITE_TABLE};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::Validate;

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A numeric variable could not be parsed.
    #[error("{var} must be a non-negative integer, got '{value}'")]
    InvalidNumber {
        /// Variable name.
        var: String,
        /// The rejected value.
        value: String,
    },

    /// Validation failed with details.
    #[error("Validation failed: {0}")]
    ValidationError(#[from] validator::ValidationErrors),
}

/// Compiler configuration.
///
/// Configuration values can be set via environment variables:
/// - `SPLC_CLICKHOUSE_TABLE`: ClickHouse table (default: "heimsight.logs")
/// - `SPLC_SQLITE_TABLE`: SQLite table (default: "logs")
/// - `SPLC_DEFAULT_LIMIT`: Row limit for non-aggregating queries (default: 1000)
/// - `SPLC_MAX_TOKENS`: Largest accepted query, in tokens (default: 10000)
/// - `SPLC_MAX_DEPTH`: Deepest accepted nesting of groups and expressions (default: 64)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct CompilerConfig {
    /// Table queried by the ClickHouse dialect.
    #[validate(length(min = 1, message = "ClickHouse table cannot be empty"))]
    pub clickhouse_table: String,
    /// Table queried by the SQLite dialect.
    #[validate(length(min = 1, message = "SQLite table cannot be empty"))]
    pub sqlite_table: String,
    /// Limit applied when a non-aggregating query has none.
    #[validate(range(min = 1, max = 1_000_000))]
    pub default_limit: usize,
    /// Maximum number of tokens in a query.
    #[validate(range(min = 1))]
    pub max_tokens: usize,
    /// Maximum nesting depth of condition groups and eval expressions.
    #[validate(range(min = 1, max = 1024))]
    pub max_depth: usize,
}

impl CompilerConfig {
    /// Creates a configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a numeric variable is not an integer, or if the resulting
    /// configuration fails validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Creates a configuration from any variable source.
    ///
    /// # Errors
    ///
    /// Same as [`CompilerConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let number = |var: &str, default: usize| -> Result<usize, ConfigError> {
            lookup(var)
                .map(|value| {
                    value
                        .trim()
                        .parse::<usize>()
                        .map_err(|_| ConfigError::InvalidNumber {
                            var: var.to_string(),
                            value,
                        })
                })
                .transpose()
                .map(|v| v.unwrap_or(default))
        };

        let config = Self {
            clickhouse_table: lookup("SPLC_CLICKHOUSE_TABLE").unwrap_or(defaults.clickhouse_table),
            sqlite_table: lookup("SPLC_SQLITE_TABLE").unwrap_or(defaults.sqlite_table),
            default_limit: number("SPLC_DEFAULT_LIMIT", defaults.default_limit)?,
            max_tokens: number("SPLC_MAX_TOKENS", defaults.max_tokens)?,
            max_depth: number("SPLC_MAX_DEPTH", defaults.max_depth)?,
        };

        config.validate()?;
        tracing::debug!(?config, "Loaded compiler configuration");
        Ok(config)
    }

    /// Parser guards derived from this configuration.
    #[must_use]
    pub fn parser_limits(&self) -> ParserLimits {
        ParserLimits {
            max_tokens: self.max_tokens,
            max_depth: self.max_depth,
        }
    }
}

impl Default for CompilerConfig {
    fn default() -> Self {
        let limits = ParserLimits::default();
        Self {
            clickhouse_table: DEFAULT_CLICKHOUSE_TABLE.to_string(),
            sqlite_table: DEFAULT_SQLITE_TABLE.to_string(),
            default_limit: DEFAULT_LIMIT,
            max_tokens: limits.max_tokens,
            max_depth: limits.max_depth,
        }
    }
}
