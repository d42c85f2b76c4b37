//! Bucket spans for `bin` and `timechart` (`span=5m`, `span=1h`, `span=100`).

use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::digit1,
    combinator::{all_consuming, map_res, value},
    number::complete::double,
    IResult, Parser,
};
use serde::{Deserialize, Serialize};

/// A time unit accepted in spans and relative time expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    /// Seconds (`s`, `sec`, `seconds`)
    Second,
    /// Minutes (`m`, `min`, `minutes`)
    Minute,
    /// Hours (`h`, `hr`, `hours`)
    Hour,
    /// Days (`d`, `day`, `days`)
    Day,
    /// Weeks (`w`, `week`, `weeks`)
    Week,
}

impl TimeUnit {
    /// Number of seconds in one unit.
    #[must_use]
    pub const fn as_secs(self) -> u64 {
        match self {
            Self::Second => 1,
            Self::Minute => 60,
            Self::Hour => 3_600,
            Self::Day => 86_400,
            Self::Week => 604_800,
        }
    }

    /// Singular SQL interval keyword (`SECOND`, `MINUTE`, ...).
    #[must_use]
    pub const fn sql_keyword(self) -> &'static str {
        match self {
            Self::Second => "SECOND",
            Self::Minute => "MINUTE",
            Self::Hour => "HOUR",
            Self::Day => "DAY",
            Self::Week => "WEEK",
        }
    }
}

/// Span of a bucket: either a time interval or a plain numeric width.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Span {
    /// A time interval such as `5m`.
    Time {
        /// Number of units.
        amount: u64,
        /// The unit.
        unit: TimeUnit,
    },
    /// A numeric bucket width such as `100` or `0.5`.
    Numeric {
        /// The bucket width.
        width: f64,
    },
}

impl Span {
    /// Length of a time span in seconds, `None` for numeric spans.
    #[must_use]
    pub const fn as_secs(&self) -> Option<u64> {
        match self {
            Self::Time { amount, unit } => Some(amount.saturating_mul(unit.as_secs())),
            Self::Numeric { .. } => None,
        }
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Time { amount, unit } => {
                let suffix = match unit {
                    TimeUnit::Second => "s",
                    TimeUnit::Minute => "m",
                    TimeUnit::Hour => "h",
                    TimeUnit::Day => "d",
                    TimeUnit::Week => "w",
                };
                write!(f, "{amount}{suffix}")
            }
            Self::Numeric { width } => write!(f, "{width}"),
        }
    }
}

/// Parses a time unit suffix. Longer spellings are tried first.
pub(crate) fn time_unit(input: &str) -> IResult<&str, TimeUnit> {
    alt((
        value(
            TimeUnit::Second,
            alt((tag("seconds"), tag("second"), tag("secs"), tag("sec"), tag("s"))),
        ),
        value(
            TimeUnit::Minute,
            alt((tag("minutes"), tag("minute"), tag("mins"), tag("min"), tag("m"))),
        ),
        value(
            TimeUnit::Hour,
            alt((tag("hours"), tag("hour"), tag("hrs"), tag("hr"), tag("h"))),
        ),
        value(TimeUnit::Day, alt((tag("days"), tag("day"), tag("d")))),
        value(TimeUnit::Week, alt((tag("weeks"), tag("week"), tag("w")))),
    ))
    .parse(input)
}

/// Parses an unsigned integer amount.
pub(crate) fn amount(input: &str) -> IResult<&str, u64> {
    map_res(digit1, |s: &str| s.parse::<u64>()).parse(input)
}

fn time_span(input: &str) -> IResult<&str, Span> {
    let (input, (amount, unit)) = (amount, time_unit).parse(input)?;
    Ok((input, Span::Time { amount, unit }))
}

fn numeric_span(input: &str) -> IResult<&str, Span> {
    let (input, width) = double(input)?;
    Ok((input, Span::Numeric { width }))
}

/// Parses a span value, ignoring case. Returns `None` if the text is not a valid
/// positive span.
///
/// ```
/// use spl::query::{parse_span, Span, TimeUnit};
///
/// assert_eq!(parse_span("5m"), Some(Span::Time { amount: 5, unit: TimeUnit::Minute }));
/// assert_eq!(parse_span("100"), Some(Span::Numeric { width: 100.0 }));
/// assert_eq!(parse_span("soon"), None);
/// ```
#[must_use]
pub fn parse_span(text: &str) -> Option<Span> {
    let lower = text.trim().to_lowercase();
    let (_, span) = all_consuming(alt((time_span, numeric_span)))
        .parse(lower.as_str())
        .ok()?;

    match span {
        Span::Time { amount: 0, .. } => None,
        Span::Numeric { width } if !(width.is_finite() && width > 0.0) => None,
        span => Some(span),
    }
}
