//! End-to-end tests for the query compiler.
//!
//! These tests drive query text through the public entry points and check the
//! SQL produced for both dialects.

use spl::query::{LimitCommand, Stage};
use spl::{parse_and_compile, parse_to_ast, validate_query, QueryError, SqlDialect};

const DIALECTS: [SqlDialect; 2] = [SqlDialect::ClickHouse, SqlDialect::Sqlite];

fn compile(query: &str, dialect: SqlDialect) -> String {
    parse_and_compile(query, dialect)
        .unwrap_or_else(|e| panic!("{query:?} failed to compile: {e}"))
        .sql
}

/// Number of `'` left after removing every doubled `''` pair.
fn lone_quotes(sql: &str) -> usize {
    sql.replace("''", "").matches('\'').count()
}

// ============================================================================
// ESCAPING
// ============================================================================

#[test]
fn test_condition_values_are_escaped() {
    for dialect in DIALECTS {
        let sql = compile(r#"search msg="it's down""#, dialect);
        assert!(sql.contains("message = 'it''s down'"), "{sql}");
        assert_eq!(lone_quotes(&sql), 2, "{sql}");

        let sql = compile(r#"search user~"o'brien""#, dialect);
        assert!(sql.contains("'o''brien'"), "{sql}");
        assert_eq!(lone_quotes(&sql) % 2, 0, "{sql}");
    }
}

#[test]
fn test_clickhouse_doubles_backslashes() {
    let sql = compile(r#"search path="C:\temp""#, SqlDialect::ClickHouse);
    assert!(sql.contains(r"path = 'C:\\temp'"), "{sql}");

    let sql = compile(r#"search path="C:\temp""#, SqlDialect::Sqlite);
    assert!(sql.contains(r"path = 'C:\temp'"), "{sql}");
}

#[test]
fn test_eval_literals_are_escaped() {
    for dialect in DIALECTS {
        let sql = compile(r#"eval owner = "O'Brien""#, dialect);
        assert!(sql.contains("'O''Brien' AS owner"), "{sql}");
        assert_eq!(lone_quotes(&sql), 2, "{sql}");
    }
}

#[test]
fn test_rex_patterns_are_escaped() {
    let sql = compile(r#"rex field=msg "(?<quote>it's \d+)""#, SqlDialect::ClickHouse);
    assert!(sql.contains(r"extract(message, '(it''s \\d+)') AS quote"), "{sql}");
    assert_eq!(lone_quotes(&sql), 2, "{sql}");
}

#[test]
fn test_in_list_values_are_escaped() {
    let sql = compile(r#"host IN ("a'b", c)"#, SqlDialect::Sqlite);
    assert!(sql.contains("hostname IN ('a''b', 'c')"), "{sql}");
}

// ============================================================================
// FIELD MAPPING
// ============================================================================

#[test]
fn test_field_aliases_compile_identically() {
    for dialect in DIALECTS {
        assert_eq!(
            compile("search host=X", dialect),
            compile("search hostname=X", dialect)
        );
        assert_eq!(
            compile("search level=error", dialect),
            compile("search severity=error", dialect)
        );
    }
}

// ============================================================================
// STAGE ORDER
// ============================================================================

#[test]
fn test_stats_switches_to_aggregation() {
    for dialect in DIALECTS {
        let sql = compile("search a=1 | stats count by b", dialect);
        assert!(sql.contains("GROUP BY b"), "{sql}");
        assert!(!sql.contains("LIMIT 1000"), "{sql}");
        assert!(!sql.contains("ORDER BY timestamp DESC"), "{sql}");

        let sql = compile("search a=1", dialect);
        assert!(!sql.contains("GROUP BY"), "{sql}");
        assert!(sql.ends_with("ORDER BY timestamp DESC LIMIT 1000"), "{sql}");
    }
}

#[test]
fn test_where_after_stats_still_filters_rows() {
    let sql = compile("stats count by host | where host=a", SqlDialect::Sqlite);
    assert_eq!(
        sql,
        "SELECT hostname, COUNT(*) AS count FROM logs WHERE hostname = 'a' GROUP BY hostname"
    );
}

// ============================================================================
// SEVERITY
// ============================================================================

#[test]
fn test_severity_names_coerce_to_levels() {
    for dialect in DIALECTS {
        let sql = compile("search severity>=warning", dialect);
        assert!(sql.contains("WHERE severity >= 4"), "{sql}");

        let sql = compile("search severity<=unknown_word", dialect);
        assert!(sql.contains("WHERE severity <= 6"), "{sql}");
    }
}

// ============================================================================
// IP CLASSIFICATION
// ============================================================================

#[test]
fn test_classify_ip_labels() {
    let cases = [
        ("127.0.0.1", "loopback"),
        ("10.1.2.3", "private"),
        ("172.16.5.4", "private"),
        ("192.168.1.1", "private"),
        ("100.64.0.1", "private"),
        ("169.254.1.1", "link_local"),
        ("224.0.0.1", "multicast"),
        ("0.1.2.3", "reserved"),
        ("240.0.0.1", "reserved"),
        ("8.8.8.8", "public"),
    ];
    for dialect in DIALECTS {
        for (addr, label) in cases {
            let sql = compile(&format!(r#"eval class = classify_ip("{addr}")"#), dialect);
            assert!(sql.contains(&format!("'{label}' AS class")), "{addr}: {sql}");
        }
    }
}

#[test]
fn test_ip_predicate_on_field() {
    let sql = compile("eval internal = is_private_ip(src_ip)", SqlDialect::ClickHouse);
    assert!(
        sql.contains("toIPv4OrNull(src_ip) BETWEEN toIPv4('10.0.0.0') AND toIPv4('10.255.255.255')"),
        "{sql}"
    );
    assert!(sql.contains(" AS internal FROM"), "{sql}");
}

// ============================================================================
// LOGIC GROUPS
// ============================================================================

#[test]
fn test_nested_logic_grouping() {
    for dialect in DIALECTS {
        let sql = compile("search (a=1 OR a=2) AND b=3", dialect);
        assert_eq!(sql.matches('(').count(), 2, "{sql}");
        assert_eq!(sql.matches(')').count(), 2, "{sql}");
        assert!(sql.contains("WHERE ((a = 1 OR a = 2) AND b = 3)"), "{sql}");

        // The AND sits outside the inner OR group.
        let filter = &sql[sql.find("WHERE ").unwrap_or(0)..];
        let mut depth = 0usize;
        let mut and_depths = Vec::new();
        for (i, c) in filter.char_indices() {
            match c {
                '(' => depth += 1,
                ')' => depth -= 1,
                _ if filter[i..].starts_with(" AND ") => and_depths.push(depth),
                _ => {}
            }
        }
        assert_eq!(and_depths, vec![1], "{sql}");
    }
}

#[test]
fn test_negated_group() {
    let sql = compile("NOT (host=a OR host=b) level=error", SqlDialect::ClickHouse);
    assert!(
        sql.contains("WHERE (NOT (hostname = 'a' OR hostname = 'b') AND severity = 'error')"),
        "{sql}"
    );
}

// ============================================================================
// PERCENTILES
// ============================================================================

#[test]
fn test_percentile_shapes_per_dialect() {
    let query = "stats p95(latency) by host";

    let sql = compile(query, SqlDialect::ClickHouse);
    assert_eq!(
        sql,
        "SELECT hostname, quantile(0.95)(latency) AS p95_latency FROM heimsight.logs GROUP BY hostname"
    );

    let sql = compile(query, SqlDialect::Sqlite);
    assert!(sql.contains("(SELECT latency FROM logs WHERE latency IS NOT NULL ORDER BY latency LIMIT 1 OFFSET"), "{sql}");
    assert!(sql.contains("CAST(COUNT(latency) * 0.95 AS INTEGER)"), "{sql}");
    assert!(sql.ends_with("AS p95_latency FROM logs GROUP BY hostname"), "{sql}");
}

// ============================================================================
// ERRORS
// ============================================================================

#[test]
fn test_error_points_past_incomplete_condition() {
    let err = parse_and_compile("search host=", SqlDialect::ClickHouse).unwrap_err();
    assert!(matches!(err, QueryError::Parse(_)));
    assert_eq!(err.position(), Some((1, 13)));
    assert_eq!(
        err.to_string(),
        "Expected a value after '=', found end of query at line 1, column 13"
    );
}

#[test]
fn test_error_position_on_later_line() {
    let err = parse_to_ast("search host=a\n| bogus").unwrap_err();
    assert_eq!(err.position(), Some((2, 3)));
}

#[test]
fn test_validate_reports_message() {
    let result = validate_query("stats avg by host");
    assert!(!result.valid);
    assert!(result
        .error
        .as_deref()
        .is_some_and(|e| e.contains("requires a field")));
}

// ============================================================================
// HEAD / TAIL
// ============================================================================

#[test]
fn test_tail_compiles_like_head() {
    for dialect in DIALECTS {
        assert_eq!(
            compile("search a=1 | tail 5", dialect),
            compile("search a=1 | head 5", dialect)
        );
    }

    let ast = parse_to_ast("tail").unwrap();
    assert!(matches!(
        ast.stages.as_slice(),
        [Stage::Limit(stage)] if stage.count == 10 && stage.command == LimitCommand::Tail
    ));
}

// ============================================================================
// FULL PIPELINES
// ============================================================================

#[test]
fn test_full_pipeline_clickhouse() {
    let sql = compile(
        "search app=nginx status>=500 | eval kb = bytes / 1024 | stats count, avg(kb) by host | sort -count | head 5",
        SqlDialect::ClickHouse,
    );
    assert_eq!(
        sql,
        "SELECT hostname, count() AS count, avg((bytes / 1024)) AS avg_kb FROM heimsight.logs \
         WHERE (app_name = 'nginx' AND status >= 500) GROUP BY hostname \
         ORDER BY count DESC LIMIT 5"
    );
}

#[test]
fn test_timechart_pipeline_sqlite() {
    let sql = compile("level<=err | timechart span=1m count by host", SqlDialect::Sqlite);
    assert_eq!(
        sql,
        "SELECT strftime('%Y-%m-%d %H:%M:00', timestamp) AS time, hostname, COUNT(*) AS count \
         FROM logs WHERE severity <= 3 GROUP BY time, hostname ORDER BY time ASC"
    );
}

#[test]
fn test_params_always_empty() {
    for dialect in DIALECTS {
        let query = parse_and_compile(r#"host="web" | stats count"#, dialect).unwrap();
        assert!(query.params.is_empty());
    }
}
