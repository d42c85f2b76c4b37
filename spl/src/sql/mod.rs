//! SQL generation for parsed pipelines.
//!
//! [`Compiler`] walks the stages of a [`QueryAst`] as a left fold over an immutable
//! [`QueryBuildState`]. Each stage either narrows the `WHERE` clause, replaces the
//! select list (stats, top, rare, timechart, dedup, table, fields), or appends
//! computed columns (eval, bin, rex). The backend-specific fragments come from a
//! [`Dialect`].
//!
//! # Example
//!
//! ```
//! use spl::query::{parse, tokenize};
//! use spl::sql::{ClickHouseDialect, Compiler};
//!
//! let ast = parse(tokenize("search host=web-01 | stats count by app").unwrap()).unwrap();
//! let query = Compiler::new(ClickHouseDialect::default()).compile(&ast);
//! assert_eq!(
//!     query.sql,
//!     "SELECT app_name, count() AS count FROM heimsight.logs \
//!      WHERE hostname = 'web-01' GROUP BY app_name"
//! );
//! ```

pub mod clickhouse;
pub mod dialect;
pub mod fields;
pub mod functions;
pub mod ip;
pub mod rex;
pub mod sqlite;
pub mod time_range;

pub use clickhouse::{ClickHouseDialect, DEFAULT_CLICKHOUSE_TABLE};
pub use dialect::{AggregateScope, Dialect, SqlDialect, UnknownDialect};
pub use fields::{map_field, DEFAULT_FIELDS};
pub use ip::{classify_ipv4, IpClass};
pub use sqlite::{SqliteDialect, DEFAULT_SQLITE_TABLE};
pub use time_range::{parse_time_expr, time_range_sql, TimeExpr, TimeRangeError};

use crate::query::{
    Aggregation, BinStage, ComparisonOp, Condition, ConditionStage, EvalStage, FieldsStage,
    QueryAst, RenameStage, RexStage, SimpleCondition, SortOrder, Span, Stage, StatsStage,
    TimechartStage, TopStage, Value,
};
use dialect::like_pattern;
use fields::{coerce_severity, SEVERITY_FIELD, TIMESTAMP_FIELD};
use functions::compile_expr;
use rex::named_groups;
use serde::{Deserialize, Serialize};

/// Row limit applied to non-aggregating queries without an explicit limit.
pub const DEFAULT_LIMIT: usize = 1000;

/// Output column of `timechart` buckets.
const TIMECHART_COLUMN: &str = "time";

/// Output column of `top`/`rare` counts.
const COUNT_COLUMN: &str = "count";

/// A compiled SQL statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledQuery {
    /// The SQL text with every value inlined as an escaped literal.
    pub sql: String,
    /// Bind parameters. Always empty: values are inlined into `sql`.
    #[serde(default)]
    pub params: Vec<serde_json::Value>,
}

/// One entry of the select list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectItem {
    /// Rendered SQL expression.
    pub expr: String,
    /// Output name, unquoted.
    pub alias: Option<String>,
}

impl SelectItem {
    fn column(expr: String) -> Self {
        Self { expr, alias: None }
    }

    fn aliased(expr: String, alias: impl Into<String>) -> Self {
        Self {
            expr,
            alias: Some(alias.into()),
        }
    }
}

/// A computed column that later stages can refer to by name.
#[derive(Debug, Clone, PartialEq, Eq)]
struct DerivedColumn {
    /// Output name.
    name: String,
    /// Source column a `bin` replaces in later references.
    source: Option<String>,
    /// Rendered SQL expression.
    expr: String,
}

/// Accumulated clauses, threaded through the stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryBuildState {
    /// Select list.
    pub select: Vec<SelectItem>,
    /// `SELECT DISTINCT`
    pub distinct: bool,
    /// Rendered WHERE fragments, joined with `AND`.
    pub conditions: Vec<String>,
    /// Rendered GROUP BY keys.
    pub group_by: Vec<String>,
    /// Rendered ORDER BY keys.
    pub order_by: Vec<String>,
    /// Explicit row limit.
    pub limit: Option<usize>,
    /// Set once a stats, top, rare or timechart stage is seen.
    pub aggregation: bool,
    derived: Vec<DerivedColumn>,
}

impl QueryBuildState {
    /// Rendered WHERE clause body, if any condition has been collected.
    #[must_use]
    pub fn filter(&self) -> Option<String> {
        (!self.conditions.is_empty()).then(|| self.conditions.join(" AND "))
    }

    fn derived_for(&self, field: &str) -> Option<&DerivedColumn> {
        let column = map_field(field);
        self.derived
            .iter()
            .rev()
            .find(|d| d.name == field || d.source.as_deref() == Some(column))
    }
}

/// Compiles pipelines for one dialect.
#[derive(Debug, Clone)]
pub struct Compiler<D> {
    dialect: D,
    default_limit: usize,
}

impl<D: Dialect> Compiler<D> {
    /// Creates a compiler with the default row limit.
    #[must_use]
    pub fn new(dialect: D) -> Self {
        Self {
            dialect,
            default_limit: DEFAULT_LIMIT,
        }
    }

    /// Sets the limit applied to non-aggregating queries without an explicit limit.
    #[must_use]
    pub fn with_default_limit(mut self, limit: usize) -> Self {
        self.default_limit = limit;
        self
    }

    /// The dialect in use.
    pub fn dialect(&self) -> &D {
        &self.dialect
    }

    /// Compiles a pipeline into a single `SELECT`.
    #[must_use]
    pub fn compile(&self, ast: &QueryAst) -> CompiledQuery {
        let state = self.build(ast, self.initial_state());
        self.finish(ast, &state)
    }

    /// Compiles a pipeline bounded by `timestamp >= earliest` and `timestamp <= latest`.
    ///
    /// # Errors
    ///
    /// Returns a [`TimeRangeError`] if either bound is not a valid time expression.
    pub fn compile_with_time_range(
        &self,
        ast: &QueryAst,
        earliest: Option<&str>,
        latest: Option<&str>,
    ) -> Result<CompiledQuery, TimeRangeError> {
        let timestamp = self.dialect.identifier(TIMESTAMP_FIELD);
        let mut initial = self.initial_state();
        if let Some(earliest) = earliest {
            let bound = time_range_sql(&self.dialect, earliest)?;
            initial.conditions.push(format!("{timestamp} >= {bound}"));
        }
        if let Some(latest) = latest {
            let bound = time_range_sql(&self.dialect, latest)?;
            initial.conditions.push(format!("{timestamp} <= {bound}"));
        }

        let state = self.build(ast, initial);
        Ok(self.finish(ast, &state))
    }

    /// State before any stage: the default select list and no clauses.
    #[must_use]
    pub fn initial_state(&self) -> QueryBuildState {
        QueryBuildState {
            select: self.default_select(),
            distinct: false,
            conditions: Vec::new(),
            group_by: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            aggregation: false,
            derived: Vec::new(),
        }
    }

    /// Folds every stage of `ast` into `initial`.
    #[must_use]
    pub fn build(&self, ast: &QueryAst, initial: QueryBuildState) -> QueryBuildState {
        ast.stages
            .iter()
            .fold(initial, |state, stage| self.apply(state, stage))
    }

    fn apply(&self, state: QueryBuildState, stage: &Stage) -> QueryBuildState {
        match stage {
            Stage::Search(s) | Stage::Filter(s) | Stage::Where(s) => self.apply_conditions(state, s),
            Stage::Stats(s) => self.apply_stats(state, s),
            Stage::Sort(s) => {
                let order_by = s
                    .fields
                    .iter()
                    .map(|f| format!("{} {}", self.reference(&state, &f.field), f.order))
                    .collect();
                QueryBuildState { order_by, ..state }
            }
            Stage::Limit(s) => QueryBuildState {
                limit: Some(s.count),
                ..state
            },
            Stage::Dedup(s) => {
                let select = s.fields.iter().map(|f| self.select_item(&state, f)).collect();
                QueryBuildState {
                    select,
                    distinct: true,
                    ..state
                }
            }
            Stage::Table(s) => {
                let select = s.fields.iter().map(|f| self.select_item(&state, f)).collect();
                QueryBuildState { select, ..state }
            }
            Stage::Fields(s) => self.apply_fields(state, s),
            Stage::Rename(s) => self.apply_rename(state, s),
            Stage::Eval(s) => self.apply_eval(state, s),
            Stage::Top(s) => self.apply_top(state, s, SortOrder::Desc),
            Stage::Rare(s) => self.apply_top(state, s, SortOrder::Asc),
            Stage::Bin(s) => self.apply_bin(state, s),
            Stage::Timechart(s) => self.apply_timechart(state, s),
            Stage::Rex(s) => self.apply_rex(state, s),
        }
    }

    fn finish(&self, ast: &QueryAst, state: &QueryBuildState) -> CompiledQuery {
        let mut sql = String::from("SELECT ");
        if state.distinct {
            sql.push_str("DISTINCT ");
        }

        if state.select.is_empty() {
            sql.push('*');
        } else {
            let items: Vec<String> = state.select.iter().map(|i| self.render_item(i)).collect();
            sql.push_str(&items.join(", "));
        }

        sql.push_str(" FROM ");
        sql.push_str(self.dialect.table());

        if let Some(filter) = state.filter() {
            sql.push_str(" WHERE ");
            sql.push_str(&filter);
        }

        if !state.group_by.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&state.group_by.join(", "));
        }

        if !state.order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&state.order_by.join(", "));
        } else if !state.aggregation && !state.distinct {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.dialect.identifier(TIMESTAMP_FIELD));
            sql.push_str(" DESC");
        }

        let limit = match state.limit {
            Some(limit) => Some(limit),
            None if !state.aggregation => Some(self.default_limit),
            None => None,
        };
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        tracing::debug!(
            dialect = self.dialect.name(),
            stages = ast.stages.len(),
            aggregation = state.aggregation,
            "Compiled query"
        );

        CompiledQuery {
            sql,
            params: Vec::new(),
        }
    }

    // ========================================================================
    // Select list helpers
    // ========================================================================

    fn default_select(&self) -> Vec<SelectItem> {
        DEFAULT_FIELDS
            .iter()
            .map(|f| SelectItem::column(self.dialect.identifier(f)))
            .collect()
    }

    fn render_item(&self, item: &SelectItem) -> String {
        match &item.alias {
            Some(alias) => format!("{} AS {}", item.expr, self.dialect.identifier(alias)),
            None => item.expr.clone(),
        }
    }

    /// SQL reference to a field in GROUP BY or ORDER BY.
    fn reference(&self, state: &QueryBuildState, field: &str) -> String {
        match state.derived_for(field) {
            Some(derived) => self.dialect.identifier(&derived.name),
            None => self.dialect.identifier(map_field(field)),
        }
    }

    /// Select-list entry for a field, re-emitting computed columns by name.
    fn select_item(&self, state: &QueryBuildState, field: &str) -> SelectItem {
        match state.derived_for(field) {
            Some(derived) => SelectItem::aliased(derived.expr.clone(), derived.name.clone()),
            None => SelectItem::column(self.dialect.identifier(map_field(field))),
        }
    }

    fn group_keys(
        &self,
        state: &QueryBuildState,
        fields: &[String],
    ) -> (Vec<SelectItem>, Vec<String>) {
        fields
            .iter()
            .map(|f| (self.select_item(state, f), self.reference(state, f)))
            .unzip()
    }

    /// Computed columns are aggregated through their expression.
    fn aggregation_item(
        &self,
        state: &QueryBuildState,
        aggregation: &Aggregation,
        scope: &AggregateScope<'_>,
    ) -> SelectItem {
        let expr = match &aggregation.field {
            None => self.dialect.count_all().to_string(),
            Some(field) => {
                let column = match state.derived_for(field) {
                    Some(derived) => derived.expr.clone(),
                    None => self.dialect.identifier(map_field(field)),
                };
                self.dialect.aggregate(aggregation.function, &column, scope)
            }
        };
        SelectItem::aliased(expr, aggregation.output_name())
    }

    // ========================================================================
    // Stages
    // ========================================================================

    fn apply_conditions(&self, state: QueryBuildState, stage: &ConditionStage) -> QueryBuildState {
        let mut parts: Vec<String> = stage
            .conditions
            .iter()
            .map(|c| self.compile_condition(c))
            .collect();

        let fragment = match parts.len() {
            0 => return state,
            1 => parts.remove(0),
            _ => format!("({})", parts.join(" AND ")),
        };

        let mut conditions = state.conditions;
        conditions.push(fragment);
        QueryBuildState { conditions, ..state }
    }

    fn apply_stats(&self, state: QueryBuildState, stats: &StatsStage) -> QueryBuildState {
        let filter = state.filter();
        let scope = AggregateScope {
            table: self.dialect.table(),
            filter: filter.as_deref(),
        };

        let (mut select, group_by) = self.group_keys(&state, &stats.group_by);
        select.extend(
            stats
                .aggregations
                .iter()
                .map(|a| self.aggregation_item(&state, a, &scope)),
        );

        QueryBuildState {
            select,
            group_by,
            aggregation: true,
            ..state
        }
    }

    fn apply_top(&self, state: QueryBuildState, top: &TopStage, order: SortOrder) -> QueryBuildState {
        let (mut select, group_by) = self.group_keys(&state, &top.fields);
        select.push(SelectItem::aliased(
            self.dialect.count_all().to_string(),
            COUNT_COLUMN,
        ));

        QueryBuildState {
            select,
            group_by,
            order_by: vec![format!("{COUNT_COLUMN} {order}")],
            limit: Some(top.limit),
            aggregation: true,
            ..state
        }
    }

    fn apply_timechart(&self, state: QueryBuildState, chart: &TimechartStage) -> QueryBuildState {
        let filter = state.filter();
        let scope = AggregateScope {
            table: self.dialect.table(),
            filter: filter.as_deref(),
        };

        let timestamp = self.dialect.identifier(TIMESTAMP_FIELD);
        let bucket = self.dialect.time_bucket(&timestamp, span_seconds(&chart.span));

        let mut select = vec![SelectItem::aliased(bucket, TIMECHART_COLUMN)];
        let mut group_by = vec![TIMECHART_COLUMN.to_string()];
        if let Some(by) = &chart.by {
            select.push(self.select_item(&state, by));
            group_by.push(self.reference(&state, by));
        }
        select.extend(
            chart
                .aggregations
                .iter()
                .map(|a| self.aggregation_item(&state, a, &scope)),
        );

        QueryBuildState {
            select,
            group_by,
            order_by: vec![format!("{TIMECHART_COLUMN} ASC")],
            aggregation: true,
            ..state
        }
    }

    fn apply_fields(&self, state: QueryBuildState, stage: &FieldsStage) -> QueryBuildState {
        let select = if stage.include {
            stage
                .fields
                .iter()
                .map(|f| self.select_item(&state, f))
                .collect()
        } else {
            let excluded: Vec<&str> = stage.fields.iter().map(|f| map_field(f)).collect();
            DEFAULT_FIELDS
                .iter()
                .filter(|f| !excluded.contains(*f))
                .map(|f| SelectItem::column(self.dialect.identifier(f)))
                .collect()
        };
        QueryBuildState { select, ..state }
    }

    fn apply_rename(&self, state: QueryBuildState, stage: &RenameStage) -> QueryBuildState {
        let mut select = state.select;
        for rename in &stage.renames {
            let column = self.dialect.identifier(map_field(&rename.from));
            for item in &mut select {
                let matches = match &item.alias {
                    Some(alias) => *alias == rename.from,
                    None => item.expr == column,
                };
                if matches {
                    item.alias = Some(rename.to.clone());
                }
            }
        }
        QueryBuildState { select, ..state }
    }

    fn apply_eval(&self, state: QueryBuildState, stage: &EvalStage) -> QueryBuildState {
        let mut select = state.select;
        let mut derived = state.derived;
        for assignment in &stage.assignments {
            let expr = compile_expr(&self.dialect, &assignment.expr);
            select.push(SelectItem::aliased(expr.clone(), assignment.field.clone()));
            derived.push(DerivedColumn {
                name: assignment.field.clone(),
                source: None,
                expr,
            });
        }
        QueryBuildState {
            select,
            derived,
            ..state
        }
    }

    fn apply_bin(&self, state: QueryBuildState, stage: &BinStage) -> QueryBuildState {
        let source = map_field(&stage.field);
        let column = self.dialect.identifier(source);
        let expr = match stage.span {
            Span::Time { .. } => self.dialect.time_bucket(&column, span_seconds(&stage.span)),
            Span::Numeric { width } => self.dialect.numeric_bin(&column, width),
        };
        let name = stage
            .alias
            .clone()
            .unwrap_or_else(|| format!("{source}_bin"));

        let mut select = state.select;
        let mut derived = state.derived;
        select.push(SelectItem::aliased(expr.clone(), name.clone()));
        derived.push(DerivedColumn {
            name,
            source: Some(source.to_string()),
            expr,
        });
        QueryBuildState {
            select,
            derived,
            ..state
        }
    }

    fn apply_rex(&self, state: QueryBuildState, stage: &RexStage) -> QueryBuildState {
        let column = self.dialect.identifier(map_field(&stage.field));
        let groups = named_groups(&stage.pattern);
        if groups.is_empty() {
            tracing::debug!(pattern = %stage.pattern, "rex pattern has no named groups");
        }

        let mut select = state.select;
        let mut derived = state.derived;
        for group in groups {
            let expr = self
                .dialect
                .extract_group(&column, &stage.pattern, &group)
                .unwrap_or_else(|| {
                    tracing::warn!(
                        dialect = self.dialect.name(),
                        group = %group,
                        "Regex extraction unsupported, emitting NULL"
                    );
                    "NULL".to_string()
                });
            select.push(SelectItem::aliased(expr.clone(), group.clone()));
            derived.push(DerivedColumn {
                name: group,
                source: None,
                expr,
            });
        }
        QueryBuildState {
            select,
            derived,
            ..state
        }
    }

    // ========================================================================
    // Conditions
    // ========================================================================

    fn compile_condition(&self, condition: &Condition) -> String {
        match condition {
            Condition::Simple(simple) => self.compile_simple(simple),
            Condition::Group(group) => {
                let parts: Vec<String> = group
                    .conditions
                    .iter()
                    .map(|c| self.compile_condition(c))
                    .collect();
                let joined = parts.join(&format!(" {} ", group.logic));
                if group.negated {
                    format!("NOT ({joined})")
                } else {
                    format!("({joined})")
                }
            }
        }
    }

    fn compile_simple(&self, condition: &SimpleCondition) -> String {
        let source = map_field(&condition.field);
        let column = self.dialect.identifier(source);
        let sql = self.compile_comparison(&column, source, condition.operator, &condition.value);
        if condition.negate {
            format!("NOT ({sql})")
        } else {
            sql
        }
    }

    fn compile_comparison(
        &self,
        column: &str,
        source: &str,
        operator: ComparisonOp,
        value: &Value,
    ) -> String {
        let d = &self.dialect;
        match (operator, value) {
            (ComparisonOp::Eq | ComparisonOp::Contains, Value::Null) => format!("{column} IS NULL"),
            (ComparisonOp::NotEq, Value::Null) => format!("{column} IS NOT NULL"),
            (ComparisonOp::Eq | ComparisonOp::Contains, Value::Regex(pattern)) => {
                d.regex_match(column, pattern)
            }
            (ComparisonOp::NotEq, Value::Regex(pattern)) => {
                format!("NOT {}", d.regex_match(column, pattern))
            }
            (ComparisonOp::In | ComparisonOp::NotIn, value) => {
                let list = match value {
                    Value::List(_) => d.literal(value),
                    other => format!("({})", d.literal(other)),
                };
                format!("{column} {operator} {list}")
            }
            (ComparisonOp::Eq, Value::String(s)) if s.contains('*') => {
                d.like(column, &like_pattern(s), false, false)
            }
            (ComparisonOp::NotEq, Value::String(s)) if s.contains('*') => {
                d.like(column, &like_pattern(s), false, true)
            }
            (ComparisonOp::Contains, Value::String(s)) if s.contains('*') => {
                d.like(column, &like_pattern(s), true, false)
            }
            (ComparisonOp::Contains, Value::String(s)) => d.contains(column, s),
            (ComparisonOp::Contains, other) => d.contains(column, &other.to_string()),
            (operator, value) => {
                let value = if operator.is_relational() && source == SEVERITY_FIELD {
                    coerce_severity(value)
                } else {
                    value.clone()
                };
                format!("{column} {operator} {}", d.literal(&value))
            }
        }
    }
}

/// Width of a bucket in seconds. Numeric timechart spans count seconds.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn span_seconds(span: &Span) -> u64 {
    match span {
        Span::Time { .. } => span.as_secs().unwrap_or(1),
        Span::Numeric { width } => width.round().max(1.0) as u64,
    }
}
