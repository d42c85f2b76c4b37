//! Relative and absolute time expressions for `--earliest` / `--latest` bounds.
//!
//! Accepted forms:
//! - `now`
//! - `-<N><unit>` such as `-15m`, `-24h`, `-7d`, `-1w`
//! - ISO dates and date-times: `2024-01-15`, `2024-01-15T10:00:00`, RFC 3339

use super::dialect::Dialect;
use crate::query::span::{amount, time_unit};
use crate::query::TimeUnit;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use nom::{bytes::complete::tag, combinator::all_consuming, IResult, Parser};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const DATE_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
];

/// Errors from parsing a time expression.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum TimeRangeError {
    /// The expression was empty.
    #[error("Empty time expression")]
    Empty,

    /// The expression is neither relative, `now`, nor an ISO date.
    #[error("Invalid time expression '{0}' (expected now, -<N><unit> or an ISO date)")]
    Invalid(String),

    /// A relative offset of zero.
    #[error("Relative time '{0}' must be greater than zero")]
    ZeroOffset(String),
}

/// A parsed time expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TimeExpr {
    /// The current time.
    Now,
    /// The current time minus an offset.
    Relative {
        /// Number of units.
        amount: u64,
        /// The unit.
        unit: TimeUnit,
    },
    /// An absolute date or date-time, kept as written.
    Absolute {
        /// The original text.
        text: String,
    },
}

fn relative(input: &str) -> IResult<&str, (u64, TimeUnit)> {
    let (input, (_, amount, unit)) = (tag("-"), amount, time_unit).parse(input)?;
    Ok((input, (amount, unit)))
}

fn is_iso_timestamp(text: &str) -> bool {
    DateTime::parse_from_rfc3339(text).is_ok()
        || NaiveDate::parse_from_str(text, "%Y-%m-%d").is_ok()
        || DATE_TIME_FORMATS
            .iter()
            .any(|format| NaiveDateTime::parse_from_str(text, format).is_ok())
}

/// Parses a time expression.
///
/// # Errors
///
/// Returns a [`TimeRangeError`] for empty, zero or unrecognized expressions.
pub fn parse_time_expr(text: &str) -> Result<TimeExpr, TimeRangeError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(TimeRangeError::Empty);
    }
    if text.eq_ignore_ascii_case("now") {
        return Ok(TimeExpr::Now);
    }

    let lower = text.to_lowercase();
    if let Ok((_, (amount, unit))) = all_consuming(relative).parse(lower.as_str()) {
        if amount == 0 {
            return Err(TimeRangeError::ZeroOffset(text.to_string()));
        }
        return Ok(TimeExpr::Relative { amount, unit });
    }

    if is_iso_timestamp(text) {
        return Ok(TimeExpr::Absolute {
            text: text.to_string(),
        });
    }

    Err(TimeRangeError::Invalid(text.to_string()))
}

/// Renders a parsed time expression as a dialect SQL expression.
#[must_use]
pub fn time_expr_sql<D: Dialect>(dialect: &D, expr: &TimeExpr) -> String {
    match expr {
        TimeExpr::Now => dialect.now(),
        TimeExpr::Relative { amount, unit } => dialect.relative_time(*amount, *unit),
        TimeExpr::Absolute { text } => dialect.quote_string(text),
    }
}

/// Parses `text` and renders it for `dialect`.
///
/// # Errors
///
/// Returns a [`TimeRangeError`] if `text` is not a valid time expression.
///
/// # Examples
///
/// ```
/// use spl::sql::{time_range_sql, ClickHouseDialect, SqliteDialect};
///
/// assert_eq!(
///     time_range_sql(&ClickHouseDialect::default(), "-24h").unwrap(),
///     "now() - INTERVAL 24 HOUR"
/// );
/// assert_eq!(
///     time_range_sql(&SqliteDialect::default(), "-1w").unwrap(),
///     "datetime('now', '-7 days')"
/// );
/// ```
pub fn time_range_sql<D: Dialect>(dialect: &D, text: &str) -> Result<String, TimeRangeError> {
    parse_time_expr(text).map(|expr| time_expr_sql(dialect, &expr))
}
