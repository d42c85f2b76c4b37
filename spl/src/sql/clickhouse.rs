//! ClickHouse dialect.

use super::dialect::{AggregateScope, Dialect};
use super::rex::isolate_group;
use crate::query::{AggFunction, TimeUnit};
use std::net::Ipv4Addr;

/// Default ClickHouse table.
pub const DEFAULT_CLICKHOUSE_TABLE: &str = "heimsight.logs";

/// SQL emitter for ClickHouse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClickHouseDialect {
    table: String,
}

impl ClickHouseDialect {
    /// Creates a dialect querying `table`.
    #[must_use]
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
        }
    }
}

impl Default for ClickHouseDialect {
    fn default() -> Self {
        Self::new(DEFAULT_CLICKHOUSE_TABLE)
    }
}

impl Dialect for ClickHouseDialect {
    fn name(&self) -> &'static str {
        "clickhouse"
    }

    fn table(&self) -> &str {
        &self.table
    }

    fn escape_string(&self, value: &str) -> String {
        value.replace('\\', "\\\\").replace('\'', "''")
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("`{}`", name.replace('\\', "\\\\").replace('`', "\\`"))
    }

    fn contains(&self, column: &str, needle: &str) -> String {
        format!(
            "positionCaseInsensitive({column}, {}) > 0",
            self.quote_string(needle)
        )
    }

    fn like(&self, column: &str, pattern: &str, case_insensitive: bool, negated: bool) -> String {
        let op = match (case_insensitive, negated) {
            (false, false) => "LIKE",
            (false, true) => "NOT LIKE",
            (true, false) => "ILIKE",
            (true, true) => "NOT ILIKE",
        };
        format!("{column} {op} {}", self.quote_string(pattern))
    }

    fn regex_match(&self, column: &str, pattern: &str) -> String {
        format!("match({column}, {})", self.quote_string(pattern))
    }

    fn count_all(&self) -> &'static str {
        "count()"
    }

    fn aggregate(&self, function: AggFunction, column: &str, _scope: &AggregateScope<'_>) -> String {
        match function {
            AggFunction::Count => format!("count({column})"),
            AggFunction::Sum => format!("sum({column})"),
            AggFunction::Avg => format!("avg({column})"),
            AggFunction::Min => format!("min({column})"),
            AggFunction::Max => format!("max({column})"),
            AggFunction::DistinctCount => format!("uniq({column})"),
            AggFunction::Values => format!("groupUniqArray({column})"),
            AggFunction::List => format!("groupArray({column})"),
            AggFunction::Earliest | AggFunction::First => {
                format!("argMin({column}, timestamp)")
            }
            AggFunction::Latest | AggFunction::Last => format!("argMax({column}, timestamp)"),
            AggFunction::Median => format!("median({column})"),
            AggFunction::Mode => format!("topK(1)({column})[1]"),
            AggFunction::Stddev => format!("stddevPop({column})"),
            AggFunction::Variance => format!("varPop({column})"),
            AggFunction::Range => format!("max({column}) - min({column})"),
            AggFunction::Percentile(p) => {
                format!("quantile({})({column})", f64::from(p) / 100.0)
            }
        }
    }

    fn time_bucket(&self, column: &str, seconds: u64) -> String {
        let function = match seconds {
            1 => "toStartOfSecond",
            60 => "toStartOfMinute",
            300 => "toStartOfFiveMinutes",
            600 => "toStartOfTenMinutes",
            900 => "toStartOfFifteenMinutes",
            3_600 => "toStartOfHour",
            86_400 => "toStartOfDay",
            _ => return format!("toStartOfInterval({column}, INTERVAL {seconds} SECOND)"),
        };
        format!("{function}({column})")
    }

    fn numeric_bin(&self, column: &str, width: f64) -> String {
        format!("floor({column} / {width}) * {width}")
    }

    fn extract_group(&self, column: &str, pattern: &str, group: &str) -> Option<String> {
        let isolated = isolate_group(pattern, group);
        Some(format!("extract({column}, {})", self.quote_string(&isolated)))
    }

    fn concat(&self, parts: &[String]) -> String {
        format!("concat({})", parts.join(", "))
    }

    fn conditional(&self, branches: &[(String, String)], otherwise: &str) -> String {
        match branches {
            [(condition, value)] => format!("if({condition}, {value}, {otherwise})"),
            _ => {
                let mut args: Vec<&str> = Vec::with_capacity(branches.len() * 2 + 1);
                for (condition, value) in branches {
                    args.push(condition);
                    args.push(value);
                }
                args.push(otherwise);
                format!("multiIf({})", args.join(", "))
            }
        }
    }

    fn ipv4_in_range(&self, ip: &str, start: Ipv4Addr, end: Ipv4Addr) -> String {
        format!("toIPv4OrNull({ip}) BETWEEN toIPv4('{start}') AND toIPv4('{end}')")
    }

    fn substring(&self, args: &[String]) -> String {
        format!("substring({})", args.join(", "))
    }

    fn to_text(&self, value: &str) -> String {
        format!("toString({value})")
    }

    fn to_number(&self, value: &str) -> String {
        format!("toFloat64OrNull(toString({value}))")
    }

    fn natural_log(&self, value: &str) -> String {
        format!("log({value})")
    }

    fn now(&self) -> String {
        "now()".to_string()
    }

    fn relative_time(&self, amount: u64, unit: TimeUnit) -> String {
        format!("now() - INTERVAL {amount} {}", unit.sql_keyword())
    }
}
