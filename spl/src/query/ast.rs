//! Abstract Syntax Tree definitions for the search pipeline language.
//!
//! A query is an ordered list of [`Stage`]s. Order matters: it decides which stages feed
//! the WHERE clause, when the query switches to aggregation mode, and what the select
//! list looks like when the SQL is assembled.

use super::span::Span;
use serde::{Deserialize, Serialize};

/// A parsed pipeline query.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QueryAst {
    /// Pipeline stages in the order they were written.
    pub stages: Vec<Stage>,
}

impl QueryAst {
    /// Creates a query from its stages.
    #[must_use]
    pub fn new(stages: Vec<Stage>) -> Self {
        Self { stages }
    }

    /// Returns true if any stage aggregates rows.
    #[must_use]
    pub fn is_aggregation(&self) -> bool {
        self.stages.iter().any(Stage::is_aggregation)
    }
}

/// One step of the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Stage {
    /// `search <conditions>` (also the implicit leading stage).
    Search(ConditionStage),
    /// `filter <conditions>`
    Filter(ConditionStage),
    /// `where <conditions>`
    Where(ConditionStage),
    /// `stats <aggregations> [by fields]`
    Stats(StatsStage),
    /// `sort [-]field [asc|desc], ...`
    Sort(SortStage),
    /// `limit N`, `head [N]`, `tail [N]`
    Limit(LimitStage),
    /// `dedup field, ...`
    Dedup(FieldListStage),
    /// `table field, ...`
    Table(FieldListStage),
    /// `fields [+|-] field, ...`
    Fields(FieldsStage),
    /// `rename field AS alias, ...`
    Rename(RenameStage),
    /// `eval field = expression, ...`
    Eval(EvalStage),
    /// `top [N] field, ...`
    Top(TopStage),
    /// `rare [N] field, ...`
    Rare(TopStage),
    /// `bin span=X field [AS alias]`
    Bin(BinStage),
    /// `timechart [span=X] aggregations [by field]`
    Timechart(TimechartStage),
    /// `rex [field=f] "pattern"`
    Rex(RexStage),
}

impl Stage {
    /// The command name of the stage.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Search(_) => "search",
            Self::Filter(_) => "filter",
            Self::Where(_) => "where",
            Self::Stats(_) => "stats",
            Self::Sort(_) => "sort",
            Self::Limit(stage) => match stage.command {
                LimitCommand::Limit => "limit",
                LimitCommand::Head => "head",
                LimitCommand::Tail => "tail",
            },
            Self::Dedup(_) => "dedup",
            Self::Table(_) => "table",
            Self::Fields(_) => "fields",
            Self::Rename(_) => "rename",
            Self::Eval(_) => "eval",
            Self::Top(_) => "top",
            Self::Rare(_) => "rare",
            Self::Bin(_) => "bin",
            Self::Timechart(_) => "timechart",
            Self::Rex(_) => "rex",
        }
    }

    /// Returns true for stages that switch the query into aggregation mode.
    #[must_use]
    pub const fn is_aggregation(&self) -> bool {
        matches!(
            self,
            Self::Stats(_) | Self::Top(_) | Self::Rare(_) | Self::Timechart(_)
        )
    }
}

/// Comparison operators for conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOp {
    /// `=`
    Eq,
    /// `!=`
    NotEq,
    /// `<`
    Lt,
    /// `<=`
    LtEq,
    /// `>`
    Gt,
    /// `>=`
    GtEq,
    /// `~` (case-insensitive contains, or wildcard match when the value has `*`)
    Contains,
    /// `IN (...)`
    In,
    /// `NOT IN (...)`
    NotIn,
}

impl ComparisonOp {
    /// Returns true for ordering comparisons (`<`, `<=`, `>`, `>=`).
    #[must_use]
    pub const fn is_relational(self) -> bool {
        matches!(self, Self::Lt | Self::LtEq | Self::Gt | Self::GtEq)
    }
}

impl std::fmt::Display for ComparisonOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Eq => write!(f, "="),
            Self::NotEq => write!(f, "!="),
            Self::Lt => write!(f, "<"),
            Self::LtEq => write!(f, "<="),
            Self::Gt => write!(f, ">"),
            Self::GtEq => write!(f, ">="),
            Self::Contains => write!(f, "~"),
            Self::In => write!(f, "IN"),
            Self::NotIn => write!(f, "NOT IN"),
        }
    }
}

/// Logical operators for combining conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogicalOp {
    /// Logical AND
    And,
    /// Logical OR
    Or,
}

impl std::fmt::Display for LogicalOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::And => write!(f, "AND"),
            Self::Or => write!(f, "OR"),
        }
    }
}

/// A literal value in a condition or eval expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Value {
    /// String value, quoted or bare (`"api"`, `web-01`, `err*`).
    String(String),
    /// Numeric value.
    Number(f64),
    /// Regular expression written as `/pattern/`.
    Regex(String),
    /// The bare word `null`.
    Null,
    /// Value list of `IN (...)`.
    List(Vec<Value>),
}

impl Value {
    /// Returns true if the value is a string containing a `*` wildcard.
    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        matches!(self, Self::String(s) if s.contains('*'))
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String(s) => write!(f, "\"{}\"", s.replace('"', "\\\"")),
            Self::Number(n) => write!(f, "{n}"),
            Self::Regex(r) => write!(f, "/{r}/"),
            Self::Null => write!(f, "null"),
            Self::List(values) => {
                write!(f, "(")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, ")")
            }
        }
    }
}

/// A single comparison (`host=web`, `NOT status>=500`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimpleCondition {
    /// Field name as written by the user.
    pub field: String,
    /// The comparison operator.
    pub operator: ComparisonOp,
    /// The value to compare against.
    pub value: Value,
    /// True when prefixed with `NOT`.
    #[serde(default)]
    pub negate: bool,
}

impl SimpleCondition {
    /// Creates a non-negated condition.
    #[must_use]
    pub fn new(field: impl Into<String>, operator: ComparisonOp, value: Value) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
            negate: false,
        }
    }
}

/// A parenthesized group of conditions joined by one logical operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogicGroup {
    /// How the members are combined.
    pub logic: LogicalOp,
    /// Members, possibly groups themselves.
    pub conditions: Vec<Condition>,
    /// True when prefixed with `NOT`.
    #[serde(default)]
    pub negated: bool,
}

/// A condition tree node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Condition {
    /// A single comparison.
    Simple(SimpleCondition),
    /// A nested AND/OR group.
    Group(LogicGroup),
}

impl Condition {
    /// Negates the condition in place (double negation cancels out).
    pub fn negate(&mut self) {
        match self {
            Self::Simple(c) => c.negate = !c.negate,
            Self::Group(g) => g.negated = !g.negated,
        }
    }
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Simple(c) => {
                if c.negate {
                    write!(f, "NOT ")?;
                }
                match c.operator {
                    ComparisonOp::In | ComparisonOp::NotIn => {
                        write!(f, "{} {} {}", c.field, c.operator, c.value)
                    }
                    _ => write!(f, "{}{}{}", c.field, c.operator, c.value),
                }
            }
            Self::Group(g) => {
                if g.negated {
                    write!(f, "NOT ")?;
                }
                write!(f, "(")?;
                for (i, c) in g.conditions.iter().enumerate() {
                    if i > 0 {
                        write!(f, " {} ", g.logic)?;
                    }
                    write!(f, "{c}")?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Payload of `search`, `filter` and `where`. Members are ANDed together.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConditionStage {
    /// Top-level conditions.
    pub conditions: Vec<Condition>,
}

/// Aggregation functions available to `stats` and `timechart`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggFunction {
    /// Row count, or non-null count with a field.
    Count,
    /// Sum
    Sum,
    /// Average
    Avg,
    /// Minimum
    Min,
    /// Maximum
    Max,
    /// Distinct count (`dc`)
    DistinctCount,
    /// Distinct values
    Values,
    /// All values
    List,
    /// Value of the oldest event
    Earliest,
    /// Value of the newest event
    Latest,
    /// Value of the first event by time
    First,
    /// Value of the last event by time
    Last,
    /// Median
    Median,
    /// Most frequent value
    Mode,
    /// Population standard deviation
    Stddev,
    /// Population variance
    Variance,
    /// max - min
    Range,
    /// `pNN` percentile, 1..=99
    Percentile(u8),
}

impl AggFunction {
    /// Looks up an aggregation by name, ignoring case.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let lower = name.to_lowercase();
        let function = match lower.as_str() {
            "count" => Self::Count,
            "sum" => Self::Sum,
            "avg" | "mean" => Self::Avg,
            "min" => Self::Min,
            "max" => Self::Max,
            "dc" | "distinct_count" => Self::DistinctCount,
            "values" => Self::Values,
            "list" => Self::List,
            "earliest" => Self::Earliest,
            "latest" => Self::Latest,
            "first" => Self::First,
            "last" => Self::Last,
            "median" => Self::Median,
            "mode" => Self::Mode,
            "stddev" | "stdev" => Self::Stddev,
            "variance" | "var" => Self::Variance,
            "range" => Self::Range,
            other => {
                let digits = other.strip_prefix('p')?;
                if digits.is_empty() || digits.len() > 2 || !digits.bytes().all(|b| b.is_ascii_digit())
                {
                    return None;
                }
                let pct: u8 = digits.parse().ok()?;
                if pct == 0 {
                    return None;
                }
                Self::Percentile(pct)
            }
        };
        Some(function)
    }

    /// Canonical name, as used in default aliases.
    #[must_use]
    pub fn name(self) -> String {
        let name = match self {
            Self::Count => "count",
            Self::Sum => "sum",
            Self::Avg => "avg",
            Self::Min => "min",
            Self::Max => "max",
            Self::DistinctCount => "dc",
            Self::Values => "values",
            Self::List => "list",
            Self::Earliest => "earliest",
            Self::Latest => "latest",
            Self::First => "first",
            Self::Last => "last",
            Self::Median => "median",
            Self::Mode => "mode",
            Self::Stddev => "stddev",
            Self::Variance => "variance",
            Self::Range => "range",
            Self::Percentile(p) => return format!("p{p}"),
        };
        name.to_string()
    }
}

/// One aggregation of a `stats` or `timechart` stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregation {
    /// The function.
    pub function: AggFunction,
    /// The aggregated field; `None` only for bare `count`.
    pub field: Option<String>,
    /// Output column name from `AS`.
    pub alias: Option<String>,
}

impl Aggregation {
    /// Name of the output column: the alias, or `count` / `<func>_<field>`.
    #[must_use]
    pub fn output_name(&self) -> String {
        if let Some(alias) = &self.alias {
            return alias.clone();
        }
        match &self.field {
            None => self.function.name(),
            Some(field) => {
                let field: String = field
                    .chars()
                    .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
                    .collect();
                format!("{}_{}", self.function.name(), field.trim_start_matches('_'))
            }
        }
    }
}

/// Payload of `stats`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsStage {
    /// Aggregations in the order written.
    pub aggregations: Vec<Aggregation>,
    /// `by` fields.
    pub group_by: Vec<String>,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Ascending
    #[default]
    Asc,
    /// Descending
    Desc,
}

impl std::fmt::Display for SortOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Asc => write!(f, "ASC"),
            Self::Desc => write!(f, "DESC"),
        }
    }
}

/// One sort key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortField {
    /// The field to sort by.
    pub field: String,
    /// The direction.
    pub order: SortOrder,
}

/// Payload of `sort`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortStage {
    /// Sort keys, most significant first.
    pub fields: Vec<SortField>,
}

/// Which command produced a [`LimitStage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LimitCommand {
    /// `limit N`
    Limit,
    /// `head [N]`
    Head,
    /// `tail [N]`
    Tail,
}

/// Payload of `limit`, `head` and `tail`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitStage {
    /// Maximum number of rows.
    pub count: usize,
    /// The command as written.
    pub command: LimitCommand,
}

/// Payload of `dedup` and `table`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldListStage {
    /// Fields in the order written.
    pub fields: Vec<String>,
}

/// Payload of `fields`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldsStage {
    /// Fields in the order written.
    pub fields: Vec<String>,
    /// False for `fields - a, b` (exclusion).
    pub include: bool,
}

/// A single `field AS alias` of a `rename` stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rename {
    /// Existing field.
    pub from: String,
    /// New name.
    pub to: String,
}

/// Payload of `rename`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameStage {
    /// Renames in the order written.
    pub renames: Vec<Rename>,
}

/// Binary operators in eval expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOperator {
    /// `+`
    Add,
    /// `-`
    Subtract,
    /// `*`
    Multiply,
    /// `/`
    Divide,
    /// `=`
    Eq,
    /// `!=`
    NotEq,
    /// `<`
    Lt,
    /// `<=`
    LtEq,
    /// `>`
    Gt,
    /// `>=`
    GtEq,
    /// `AND`
    And,
    /// `OR`
    Or,
}

impl BinaryOperator {
    /// The SQL spelling of the operator.
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Subtract => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
            Self::Eq => "=",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Gt => ">",
            Self::GtEq => ">=",
            Self::And => "AND",
            Self::Or => "OR",
        }
    }
}

impl std::fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_sql())
    }
}

/// Eval expression tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EvalExpr {
    /// A literal value.
    Literal {
        /// The value.
        value: Value,
    },
    /// A reference to a field.
    FieldRef {
        /// Field name as written.
        name: String,
    },
    /// `left op right`
    BinaryOp {
        /// The operator.
        op: BinaryOperator,
        /// Left operand.
        left: Box<EvalExpr>,
        /// Right operand.
        right: Box<EvalExpr>,
    },
    /// `name(args...)`
    FunctionCall {
        /// Function name, lowercased.
        name: String,
        /// Arguments.
        args: Vec<EvalExpr>,
    },
}

impl EvalExpr {
    /// Shorthand for a literal.
    #[must_use]
    pub fn literal(value: Value) -> Self {
        Self::Literal { value }
    }

    /// Shorthand for a field reference.
    #[must_use]
    pub fn field(name: impl Into<String>) -> Self {
        Self::FieldRef { name: name.into() }
    }

    /// Shorthand for a binary operation.
    #[must_use]
    pub fn binary(op: BinaryOperator, left: Self, right: Self) -> Self {
        Self::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Shorthand for a function call.
    #[must_use]
    pub fn call(name: impl Into<String>, args: Vec<Self>) -> Self {
        Self::FunctionCall {
            name: name.into(),
            args,
        }
    }
}

impl std::fmt::Display for EvalExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Literal { value } => write!(f, "{value}"),
            Self::FieldRef { name } => write!(f, "{name}"),
            Self::BinaryOp { op, left, right } => write!(f, "({left} {op} {right})"),
            Self::FunctionCall { name, args } => {
                write!(f, "{name}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
        }
    }
}

/// A single `field = expression` of an `eval` stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalAssignment {
    /// Output column name.
    pub field: String,
    /// The expression.
    pub expr: EvalExpr,
}

/// Payload of `eval`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalStage {
    /// Assignments in the order written.
    pub assignments: Vec<EvalAssignment>,
}

/// Payload of `top` and `rare`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopStage {
    /// Fields whose value combinations are counted.
    pub fields: Vec<String>,
    /// Number of rows to return.
    pub limit: usize,
}

/// Payload of `bin`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinStage {
    /// Field to bucket.
    pub field: String,
    /// Bucket width.
    pub span: Span,
    /// Output column name from `AS`.
    pub alias: Option<String>,
}

/// Payload of `timechart`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimechartStage {
    /// Time bucket width.
    pub span: Span,
    /// Aggregations per bucket.
    pub aggregations: Vec<Aggregation>,
    /// Optional split-by field.
    pub by: Option<String>,
}

/// Payload of `rex`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RexStage {
    /// Field the pattern is applied to.
    pub field: String,
    /// Regular expression with named capture groups.
    pub pattern: String,
}
