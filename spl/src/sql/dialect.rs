//! The capability set every SQL backend implements.
//!
//! The stage walk in [`super::Compiler`] is shared; only the leaf fragments emitted
//! through this trait differ between backends.

use crate::query::{AggFunction, TimeUnit, Value};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::str::FromStr;
use thiserror::Error;

/// Context available to aggregate emission.
///
/// Backends without native percentile or first/last functions emit correlated
/// subqueries that need the source table and the filter collected so far.
#[derive(Debug, Clone, Copy)]
pub struct AggregateScope<'a> {
    /// Source table.
    pub table: &'a str,
    /// AND-joined WHERE fragment, if any.
    pub filter: Option<&'a str>,
}

/// A SQL backend.
pub trait Dialect {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Table queried by `FROM`.
    fn table(&self) -> &str;

    /// Escapes a string for use between single quotes.
    fn escape_string(&self, value: &str) -> String;

    /// Quotes an identifier unconditionally.
    fn quote_identifier(&self, name: &str) -> String;

    /// Case-insensitive substring test. `needle` is raw text.
    fn contains(&self, column: &str, needle: &str) -> String;

    /// `LIKE` test. `pattern` is a LIKE pattern using `\` as its escape character.
    fn like(&self, column: &str, pattern: &str, case_insensitive: bool, negated: bool) -> String;

    /// Regular expression test. `pattern` is raw text.
    fn regex_match(&self, column: &str, pattern: &str) -> String;

    /// `count` without a field.
    fn count_all(&self) -> &'static str;

    /// Aggregate over a column.
    fn aggregate(&self, function: AggFunction, column: &str, scope: &AggregateScope<'_>) -> String;

    /// Start of the `seconds`-wide time bucket containing `column`.
    fn time_bucket(&self, column: &str, seconds: u64) -> String;

    /// Start of the `width`-wide numeric bucket containing `column`.
    fn numeric_bin(&self, column: &str, width: f64) -> String;

    /// Expression extracting one named group of `pattern` from `column`, or `None` when
    /// the backend cannot extract regex groups.
    fn extract_group(&self, column: &str, pattern: &str, group: &str) -> Option<String>;

    /// String concatenation.
    fn concat(&self, parts: &[String]) -> String;

    /// Multi-branch conditional: the first true condition picks its value.
    fn conditional(&self, branches: &[(String, String)], otherwise: &str) -> String;

    /// Tests whether the IPv4 address in `ip` lies inside `start..=end`.
    fn ipv4_in_range(&self, ip: &str, start: Ipv4Addr, end: Ipv4Addr) -> String;

    /// `substr(text, start[, length])` with 1-based `start`.
    fn substring(&self, args: &[String]) -> String;

    /// Converts a value to text.
    fn to_text(&self, value: &str) -> String;

    /// Converts a value to a number.
    fn to_number(&self, value: &str) -> String;

    /// Natural logarithm.
    fn natural_log(&self, value: &str) -> String;

    /// Current time.
    fn now(&self) -> String;

    /// Current time minus `amount` units.
    fn relative_time(&self, amount: u64, unit: TimeUnit) -> String;

    /// Quoted and escaped string literal.
    fn quote_string(&self, value: &str) -> String {
        format!("'{}'", self.escape_string(value))
    }

    /// An identifier, quoted only when it is not a plain name.
    fn identifier(&self, name: &str) -> String {
        if is_plain_identifier(name) {
            name.to_string()
        } else {
            self.quote_identifier(name)
        }
    }

    /// A literal value.
    fn literal(&self, value: &Value) -> String {
        match value {
            Value::String(s) | Value::Regex(s) => self.quote_string(s),
            Value::Number(n) => format!("{n}"),
            Value::Null => "NULL".to_string(),
            Value::List(values) => {
                let items: Vec<String> = values.iter().map(|v| self.literal(v)).collect();
                format!("({})", items.join(", "))
            }
        }
    }
}

/// Returns true for names matching `[A-Za-z_][A-Za-z0-9_.]*`.
#[must_use]
pub fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

/// Converts a `*` wildcard value into a LIKE pattern escaped with `\`.
#[must_use]
pub fn like_pattern(value: &str) -> String {
    let mut pattern = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '*' => pattern.push('%'),
            '%' | '_' | '\\' => {
                pattern.push('\\');
                pattern.push(c);
            }
            c => pattern.push(c),
        }
    }
    pattern
}

/// Error for an unrecognized dialect name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown SQL dialect '{0}' (expected clickhouse or sqlite)")]
pub struct UnknownDialect(pub String);

/// Selects a backend by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlDialect {
    /// ClickHouse, the analytical store.
    #[default]
    ClickHouse,
    /// SQLite, the embedded store.
    Sqlite,
}

impl FromStr for SqlDialect {
    type Err = UnknownDialect;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "clickhouse" | "ch" => Ok(Self::ClickHouse),
            "sqlite" | "sqlite3" => Ok(Self::Sqlite),
            _ => Err(UnknownDialect(s.to_string())),
        }
    }
}

impl std::fmt::Display for SqlDialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ClickHouse => write!(f, "clickhouse"),
            Self::Sqlite => write!(f, "sqlite"),
        }
    }
}
