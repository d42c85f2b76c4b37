//! Heimsight Search Pipeline Language
//!
//! This crate turns SPL-style pipeline queries into a single SQL `SELECT` for
//! ClickHouse or SQLite log tables.
//!
//! # Modules
//!
//! - [`query`] - Lexer, AST and parser
//! - [`sql`] - Dialects and the stage compiler
//! - [`config`] - Compiler configuration
//!
//! # Example
//!
//! ```
//! use spl::{parse_and_compile, SqlDialect};
//!
//! let query = parse_and_compile("search level=error | top 5 host", SqlDialect::Sqlite).unwrap();
//! assert_eq!(
//!     query.sql,
//!     "SELECT hostname, COUNT(*) AS count FROM logs WHERE severity = 'error' \
//!      GROUP BY hostname ORDER BY count DESC LIMIT 5"
//! );
//! assert!(query.params.is_empty());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod query;
pub mod sql;

pub use config::{CompilerConfig, ConfigError};
pub use query::{LexError, ParseError, QueryAst};
pub use sql::{CompiledQuery, SqlDialect, TimeRangeError};

use query::{tokenize, Parser, ParserLimits};
use serde::{Deserialize, Serialize};
use sql::{ClickHouseDialect, Compiler, SqliteDialect};
use thiserror::Error;

/// Re-export common dependencies for convenience.
pub use serde_json;

/// Any failure turning query text into SQL.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// The text could not be tokenized.
    #[error(transparent)]
    Lex(#[from] LexError),

    /// The tokens do not form a valid pipeline.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// A time bound is malformed.
    #[error(transparent)]
    TimeRange(#[from] TimeRangeError),
}

impl QueryError {
    /// Line and column of the offending input, when the error has one.
    #[must_use]
    pub fn position(&self) -> Option<(usize, usize)> {
        match self {
            Self::Lex(e) => Some((e.line, e.column)),
            Self::Parse(e) => Some((e.line, e.column)),
            Self::TimeRange(_) => None,
        }
    }
}

/// Outcome of [`validate_query`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validation {
    /// True when the query compiles.
    pub valid: bool,
    /// The error message when it does not.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Validation {
    fn from_result<T>(result: Result<T, QueryError>) -> Self {
        match result {
            Ok(_) => Self {
                valid: true,
                error: None,
            },
            Err(e) => Self {
                valid: false,
                error: Some(e.to_string()),
            },
        }
    }
}

/// Parses query text into its AST.
///
/// # Errors
///
/// Returns a [`QueryError`] if the text does not tokenize or parse.
pub fn parse_to_ast(text: &str) -> Result<QueryAst, QueryError> {
    QueryCompiler::default().parse(text)
}

/// Parses query text and compiles it for `dialect` with the default configuration.
///
/// # Errors
///
/// Returns a [`QueryError`] if the text does not tokenize or parse.
pub fn parse_and_compile(text: &str, dialect: SqlDialect) -> Result<CompiledQuery, QueryError> {
    QueryCompiler::default().compile(text, dialect)
}

/// Reports whether query text compiles, without failing.
#[must_use]
pub fn validate_query(text: &str) -> Validation {
    QueryCompiler::default().validate(text, SqlDialect::default())
}

/// Entry points bound to one [`CompilerConfig`].
#[derive(Debug, Clone, Default)]
pub struct QueryCompiler {
    config: CompilerConfig,
}

impl QueryCompiler {
    /// Creates a compiler using `config`.
    #[must_use]
    pub fn new(config: CompilerConfig) -> Self {
        Self { config }
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    fn limits(&self) -> ParserLimits {
        self.config.parser_limits()
    }

    /// Parses query text into its AST.
    ///
    /// # Errors
    ///
    /// Returns a [`QueryError`] if the text does not tokenize or parse.
    pub fn parse(&self, text: &str) -> Result<QueryAst, QueryError> {
        let tokens = tokenize(text)?;
        tracing::trace!(tokens = tokens.len(), "Tokenized query");
        let ast = Parser::with_limits(tokens, self.limits()).parse()?;
        tracing::debug!(stages = ast.stages.len(), "Parsed query");
        Ok(ast)
    }

    /// Parses and compiles query text.
    ///
    /// # Errors
    ///
    /// Returns a [`QueryError`] if the text does not tokenize or parse.
    pub fn compile(&self, text: &str, dialect: SqlDialect) -> Result<CompiledQuery, QueryError> {
        self.compile_with_time_range(text, dialect, None, None)
    }

    /// Parses and compiles query text bounded by optional `earliest`/`latest` times.
    ///
    /// # Errors
    ///
    /// Returns a [`QueryError`] if the text does not parse or a bound is malformed.
    pub fn compile_with_time_range(
        &self,
        text: &str,
        dialect: SqlDialect,
        earliest: Option<&str>,
        latest: Option<&str>,
    ) -> Result<CompiledQuery, QueryError> {
        let ast = self.parse(text)?;
        let limit = self.config.default_limit;
        let compiled = match dialect {
            SqlDialect::ClickHouse => {
                Compiler::new(ClickHouseDialect::new(self.config.clickhouse_table.as_str()))
                    .with_default_limit(limit)
                    .compile_with_time_range(&ast, earliest, latest)?
            }
            SqlDialect::Sqlite => {
                Compiler::new(SqliteDialect::new(self.config.sqlite_table.as_str()))
                    .with_default_limit(limit)
                    .compile_with_time_range(&ast, earliest, latest)?
            }
        };
        Ok(compiled)
    }

    /// Reports whether query text compiles for `dialect`.
    #[must_use]
    pub fn validate(&self, text: &str, dialect: SqlDialect) -> Validation {
        Validation::from_result(self.compile(text, dialect))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_compile_both_dialects() {
        let ch = parse_and_compile("host=web-01", SqlDialect::ClickHouse).unwrap();
        assert_eq!(
            ch.sql,
            "SELECT timestamp, hostname, app_name, severity, message FROM heimsight.logs \
             WHERE hostname = 'web-01' ORDER BY timestamp DESC LIMIT 1000"
        );
        let sqlite = parse_and_compile("host=web-01", SqlDialect::Sqlite).unwrap();
        assert!(sqlite.sql.contains("FROM logs WHERE hostname = 'web-01'"));
    }

    #[test]
    fn test_parse_to_ast() {
        let ast = parse_to_ast("search a=1 | head 3").unwrap();
        assert_eq!(ast.stages.len(), 2);
        assert_eq!(ast.stages[1].name(), "head");
    }

    #[test]
    fn test_error_positions() {
        let err = parse_and_compile("search host=", SqlDialect::ClickHouse).unwrap_err();
        assert!(matches!(err, QueryError::Parse(_)));
        assert_eq!(err.position(), Some((1, 13)));

        let err = parse_to_ast("search msg=\"open").unwrap_err();
        assert!(matches!(err, QueryError::Lex(_)));
        assert_eq!(err.position(), Some((1, 12)));
    }

    #[test]
    fn test_validate_query() {
        assert_eq!(
            validate_query("search host=a | stats count by app"),
            Validation {
                valid: true,
                error: None
            }
        );

        let result = validate_query("host=a | frobnicate");
        assert!(!result.valid);
        assert!(result
            .error
            .as_deref()
            .is_some_and(|e| e.starts_with("Unknown command 'frobnicate'")));
    }

    #[test]
    fn test_validation_json_omits_missing_error() {
        let json = serde_json::to_string(&validate_query("host=a")).unwrap();
        assert_eq!(json, r#"{"valid":true}"#);
    }

    #[test]
    fn test_query_compiler_uses_config() {
        let compiler = QueryCompiler::new(CompilerConfig {
            sqlite_table: "events".to_string(),
            default_limit: 20,
            max_depth: 2,
            ..CompilerConfig::default()
        });

        let query = compiler.compile("host=a", SqlDialect::Sqlite).unwrap();
        assert!(query.sql.ends_with("FROM events WHERE hostname = 'a' ORDER BY timestamp DESC LIMIT 20"));

        let err = compiler.parse("((((a=1))))").unwrap_err();
        assert!(err.to_string().contains("maximum depth of 2"));
    }

    #[test]
    fn test_time_range_errors_surface() {
        let err = QueryCompiler::default()
            .compile_with_time_range("host=a", SqlDialect::ClickHouse, Some("-0m"), None)
            .unwrap_err();
        assert!(matches!(err, QueryError::TimeRange(TimeRangeError::ZeroOffset(_))));
        assert_eq!(err.position(), None);
    }
}
