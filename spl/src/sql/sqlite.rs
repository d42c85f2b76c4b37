//! SQLite dialect.
//!
//! SQLite has no regex extraction, no population statistics and no IP type. `rex`
//! columns compile to `NULL`, `stddev`/`variance` compile to `0`, and IP tests
//! decompose the dotted quad into an integer with `substr`/`instr`.

use super::dialect::{AggregateScope, Dialect};
use crate::query::{AggFunction, TimeUnit};
use std::net::Ipv4Addr;

/// Default SQLite table.
pub const DEFAULT_SQLITE_TABLE: &str = "logs";

/// SQL emitter for SQLite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqliteDialect {
    table: String,
}

impl SqliteDialect {
    /// Creates a dialect querying `table`.
    #[must_use]
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
        }
    }

    /// `WHERE` clause of a correlated subquery over `column`.
    fn subquery_filter(column: &str, scope: &AggregateScope<'_>) -> String {
        match scope.filter {
            Some(filter) => format!("WHERE {filter} AND {column} IS NOT NULL"),
            None => format!("WHERE {column} IS NOT NULL"),
        }
    }

    fn percentile(column: &str, fraction: f64, scope: &AggregateScope<'_>) -> String {
        let table = scope.table;
        let filter = Self::subquery_filter(column, scope);
        format!(
            "(SELECT {column} FROM {table} {filter} ORDER BY {column} LIMIT 1 OFFSET \
             (SELECT CAST(COUNT({column}) * {fraction} AS INTEGER) FROM {table} {filter}))"
        )
    }
}

impl Default for SqliteDialect {
    fn default() -> Self {
        Self::new(DEFAULT_SQLITE_TABLE)
    }
}

/// Integer value of the dotted quad in `ip`.
fn ipv4_to_integer(ip: &str) -> String {
    let rest1 = format!("substr({ip}, instr({ip}, '.') + 1)");
    let rest2 = format!("substr({rest1}, instr({rest1}, '.') + 1)");
    let rest3 = format!("substr({rest2}, instr({rest2}, '.') + 1)");
    let octet = |text: &str| format!("CAST(substr({text}, 1, instr({text}, '.') - 1) AS INTEGER)");
    format!(
        "({} * 16777216 + {} * 65536 + {} * 256 + CAST({rest3} AS INTEGER))",
        octet(ip),
        octet(&rest1),
        octet(&rest2),
    )
}

impl Dialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn table(&self) -> &str {
        &self.table
    }

    fn escape_string(&self, value: &str) -> String {
        value.replace('\'', "''")
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn contains(&self, column: &str, needle: &str) -> String {
        format!(
            "instr(lower({column}), lower({})) > 0",
            self.quote_string(needle)
        )
    }

    // SQLite LIKE ignores ASCII case either way.
    fn like(&self, column: &str, pattern: &str, _case_insensitive: bool, negated: bool) -> String {
        let op = if negated { "NOT LIKE" } else { "LIKE" };
        format!("{column} {op} {} ESCAPE '\\'", self.quote_string(pattern))
    }

    fn regex_match(&self, column: &str, pattern: &str) -> String {
        format!("{column} REGEXP {}", self.quote_string(pattern))
    }

    fn count_all(&self) -> &'static str {
        "COUNT(*)"
    }

    fn aggregate(&self, function: AggFunction, column: &str, scope: &AggregateScope<'_>) -> String {
        let table = scope.table;
        match function {
            AggFunction::Count => format!("COUNT({column})"),
            AggFunction::Sum => format!("SUM({column})"),
            AggFunction::Avg => format!("AVG({column})"),
            AggFunction::Min => format!("MIN({column})"),
            AggFunction::Max => format!("MAX({column})"),
            AggFunction::DistinctCount => format!("COUNT(DISTINCT {column})"),
            AggFunction::Values => format!("GROUP_CONCAT(DISTINCT {column})"),
            AggFunction::List => format!("GROUP_CONCAT({column})"),
            AggFunction::Earliest | AggFunction::First => format!(
                "(SELECT {column} FROM {table} AS _sub WHERE _sub.rowid = MIN({table}.rowid))"
            ),
            AggFunction::Latest | AggFunction::Last => format!(
                "(SELECT {column} FROM {table} AS _sub WHERE _sub.rowid = MAX({table}.rowid))"
            ),
            AggFunction::Median => Self::percentile(column, 0.5, scope),
            AggFunction::Percentile(p) => Self::percentile(column, f64::from(p) / 100.0, scope),
            AggFunction::Mode => format!(
                "(SELECT {column} FROM {table} {} GROUP BY {column} ORDER BY COUNT(*) DESC LIMIT 1)",
                Self::subquery_filter(column, scope)
            ),
            AggFunction::Stddev | AggFunction::Variance => {
                tracing::warn!(
                    function = %function.name(),
                    column,
                    "SQLite has no population statistics, emitting 0"
                );
                "0".to_string()
            }
            AggFunction::Range => format!("MAX({column}) - MIN({column})"),
        }
    }

    fn time_bucket(&self, column: &str, seconds: u64) -> String {
        let format = match seconds {
            1 => "%Y-%m-%d %H:%M:%S",
            60 => "%Y-%m-%d %H:%M:00",
            3_600 => "%Y-%m-%d %H:00:00",
            86_400 => "%Y-%m-%d 00:00:00",
            _ => {
                return format!(
                    "datetime((CAST(strftime('%s', {column}) AS INTEGER) / {seconds}) * {seconds}, 'unixepoch')"
                )
            }
        };
        format!("strftime('{format}', {column})")
    }

    fn numeric_bin(&self, column: &str, width: f64) -> String {
        format!("CAST({column} / {width} AS INTEGER) * {width}")
    }

    fn extract_group(&self, _column: &str, _pattern: &str, _group: &str) -> Option<String> {
        None
    }

    fn concat(&self, parts: &[String]) -> String {
        if parts.is_empty() {
            return "''".to_string();
        }
        format!("({})", parts.join(" || "))
    }

    fn conditional(&self, branches: &[(String, String)], otherwise: &str) -> String {
        let mut sql = String::from("CASE");
        for (condition, value) in branches {
            sql.push_str(&format!(" WHEN {condition} THEN {value}"));
        }
        sql.push_str(&format!(" ELSE {otherwise} END"));
        sql
    }

    fn ipv4_in_range(&self, ip: &str, start: Ipv4Addr, end: Ipv4Addr) -> String {
        format!(
            "{} BETWEEN {} AND {}",
            ipv4_to_integer(ip),
            u32::from(start),
            u32::from(end)
        )
    }

    fn substring(&self, args: &[String]) -> String {
        format!("substr({})", args.join(", "))
    }

    fn to_text(&self, value: &str) -> String {
        format!("CAST({value} AS TEXT)")
    }

    fn to_number(&self, value: &str) -> String {
        format!("CAST({value} AS REAL)")
    }

    fn natural_log(&self, value: &str) -> String {
        format!("ln({value})")
    }

    fn now(&self) -> String {
        "datetime('now')".to_string()
    }

    fn relative_time(&self, amount: u64, unit: TimeUnit) -> String {
        let (amount, unit) = match unit {
            TimeUnit::Second => (amount, "seconds"),
            TimeUnit::Minute => (amount, "minutes"),
            TimeUnit::Hour => (amount, "hours"),
            TimeUnit::Day => (amount, "days"),
            TimeUnit::Week => (amount.saturating_mul(7), "days"),
        };
        format!("datetime('now', '-{amount} {unit}')")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_string() {
        let sqlite = SqliteDialect::default();
        assert_eq!(sqlite.quote_string("it's"), "'it''s'");
        assert_eq!(sqlite.quote_string(r"C:\temp"), r"'C:\temp'");
    }

    #[test]
    fn test_identifiers() {
        let sqlite = SqliteDialect::default();
        assert_eq!(sqlite.identifier("app_name"), "app_name");
        assert_eq!(sqlite.identifier("my \"col\""), "\"my \"\"col\"\"\"");
    }

    #[test]
    fn test_percentile_subquery() {
        let sqlite = SqliteDialect::default();
        let scope = AggregateScope {
            table: "logs",
            filter: Some("hostname = 'a'"),
        };
        assert_eq!(
            sqlite.aggregate(AggFunction::Percentile(90), "latency", &scope),
            "(SELECT latency FROM logs WHERE hostname = 'a' AND latency IS NOT NULL \
             ORDER BY latency LIMIT 1 OFFSET (SELECT CAST(COUNT(latency) * 0.9 AS INTEGER) \
             FROM logs WHERE hostname = 'a' AND latency IS NOT NULL))"
        );
    }

    #[test]
    fn test_unsupported_statistics() {
        let sqlite = SqliteDialect::default();
        let scope = AggregateScope {
            table: "logs",
            filter: None,
        };
        assert_eq!(sqlite.aggregate(AggFunction::Stddev, "latency", &scope), "0");
        assert_eq!(sqlite.aggregate(AggFunction::Variance, "latency", &scope), "0");
        assert_eq!(sqlite.extract_group("raw", "(?<x>.)", "x"), None);
    }

    #[test]
    fn test_time_buckets() {
        let sqlite = SqliteDialect::default();
        assert_eq!(
            sqlite.time_bucket("timestamp", 3_600),
            "strftime('%Y-%m-%d %H:00:00', timestamp)"
        );
        assert_eq!(
            sqlite.time_bucket("timestamp", 300),
            "datetime((CAST(strftime('%s', timestamp) AS INTEGER) / 300) * 300, 'unixepoch')"
        );
    }

    #[test]
    fn test_conditional_and_concat() {
        let sqlite = SqliteDialect::default();
        let branches = vec![("a > 1".to_string(), "'big'".to_string())];
        assert_eq!(
            sqlite.conditional(&branches, "'small'"),
            "CASE WHEN a > 1 THEN 'big' ELSE 'small' END"
        );
        assert_eq!(
            sqlite.concat(&["a".to_string(), "'-'".to_string(), "b".to_string()]),
            "(a || '-' || b)"
        );
    }

    #[test]
    fn test_ipv4_in_range() {
        let sqlite = SqliteDialect::default();
        let sql = sqlite.ipv4_in_range(
            "src",
            Ipv4Addr::new(10, 0, 0, 0),
            Ipv4Addr::new(10, 255, 255, 255),
        );
        assert!(sql.starts_with("(CAST(substr(src, 1, instr(src, '.') - 1) AS INTEGER) * 16777216"));
        assert!(sql.ends_with("BETWEEN 167772160 AND 184549375"));
    }

    #[test]
    fn test_relative_time() {
        let sqlite = SqliteDialect::default();
        assert_eq!(
            sqlite.relative_time(2, TimeUnit::Week),
            "datetime('now', '-14 days')"
        );
        assert_eq!(
            sqlite.relative_time(15, TimeUnit::Minute),
            "datetime('now', '-15 minutes')"
        );
    }
}
