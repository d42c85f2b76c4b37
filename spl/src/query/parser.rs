//! Recursive-descent parser for the search pipeline language.
//!
//! Parses queries like:
//! - `host=web-01 error`
//! - `search (level=error OR level=fatal) app=api | stats count by host`
//! - `search status>=500 | eval kb = round(bytes / 1024, 2) | table host, kb`
//! - `timechart span=5m count by app`
//!
//! There is no backtracking and no recovery: the first unexpected token aborts the
//! parse with a [`ParseError`] pointing at that token.

mod expr;

use super::ast::{
    Aggregation, AggFunction, ComparisonOp, Condition, ConditionStage, EvalAssignment,
    EvalStage, FieldListStage, FieldsStage, LimitCommand, LimitStage, LogicGroup, LogicalOp,
    QueryAst, Rename, RenameStage, RexStage, SimpleCondition, SortField, SortOrder, SortStage,
    Stage, StatsStage, TimechartStage, TopStage, Value,
};
use super::ast::BinStage;
use super::lexer::{Token, TokenKind};
use super::span::{parse_span, Span, TimeUnit};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Field used for bare full-text terms.
pub const RAW_FIELD: &str = "_raw";

const DEFAULT_TOP_LIMIT: usize = 10;
const DEFAULT_HEAD_COUNT: usize = 10;

/// Error produced when the token stream does not form a valid query.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message} at line {line}, column {column}")]
pub struct ParseError {
    /// Human readable description.
    pub message: String,
    /// 1-based line of the offending token.
    pub line: usize,
    /// 1-based column of the offending token.
    pub column: usize,
}

impl ParseError {
    /// Creates an error located at the given token.
    #[must_use]
    pub fn at(token: &Token, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            line: token.line,
            column: token.column,
        }
    }
}

/// Bounds on input size and nesting that keep parsing and compilation cheap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParserLimits {
    /// Maximum number of tokens in a query, `Eof` excluded.
    pub max_tokens: usize,
    /// Maximum nesting of parentheses, `NOT`s and function calls.
    pub max_depth: usize,
}

impl Default for ParserLimits {
    fn default() -> Self {
        Self {
            max_tokens: 10_000,
            max_depth: 64,
        }
    }
}

/// Pipeline parser over a token stream.
pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
    depth: usize,
    limits: ParserLimits,
}

impl Parser {
    /// Creates a parser with default limits.
    #[must_use]
    pub fn new(tokens: Vec<Token>) -> Self {
        Self::with_limits(tokens, ParserLimits::default())
    }

    /// Creates a parser with explicit limits.
    #[must_use]
    pub fn with_limits(mut tokens: Vec<Token>, limits: ParserLimits) -> Self {
        if tokens.last().map(|t| t.kind) != Some(TokenKind::Eof) {
            let (line, column) = tokens
                .last()
                .map_or((1, 1), |t| (t.line, t.end_column()));
            tokens.push(Token::new(TokenKind::Eof, "", line, column));
        }
        Self {
            tokens,
            position: 0,
            depth: 0,
            limits,
        }
    }

    /// Parses the whole token stream into a [`QueryAst`].
    ///
    /// # Errors
    ///
    /// Returns a [`ParseError`] on the first malformed stage, on trailing tokens, or when
    /// the query exceeds the configured limits.
    pub fn parse(mut self) -> Result<QueryAst, ParseError> {
        let token_count = self.tokens.len() - 1;
        if token_count > self.limits.max_tokens {
            let token = &self.tokens[self.limits.max_tokens];
            return Err(ParseError::at(
                token,
                format!(
                    "Query exceeds the maximum of {} tokens",
                    self.limits.max_tokens
                ),
            ));
        }

        let mut stages = Vec::new();
        if self.check(TokenKind::Eof) {
            return Ok(QueryAst::new(stages));
        }

        if self.starts_implicit_search() {
            stages.push(Stage::Search(self.parse_condition_stage()?));
        } else {
            stages.push(self.parse_command()?);
        }

        while self.check(TokenKind::Pipe) {
            self.advance();
            stages.push(self.parse_command()?);
        }

        if !self.check(TokenKind::Eof) {
            return Err(self.unexpected("'|' or end of query"));
        }

        Ok(QueryAst::new(stages))
    }

    // ========================================================================
    // Token helpers
    // ========================================================================

    fn current(&self) -> &Token {
        &self.tokens[self.position.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self, offset: usize) -> TokenKind {
        let index = (self.position + offset).min(self.tokens.len() - 1);
        self.tokens[index].kind
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current().kind == kind
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if token.kind != TokenKind::Eof {
            self.position += 1;
        }
        token
    }

    fn consume(&mut self, kind: TokenKind, expected: &str) -> Result<Token, ParseError> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        let token = self.current();
        ParseError::at(token, format!("Expected {expected}, found {}", describe(token)))
    }

    fn at_stage_end(&self) -> bool {
        matches!(self.current().kind, TokenKind::Pipe | TokenKind::Eof)
    }

    /// True when the current token is the bare word `name` followed by `=`.
    fn at_named_param(&self, name: &str) -> bool {
        let token = self.current();
        token.kind.is_word()
            && token.text.eq_ignore_ascii_case(name)
            && self.peek_kind(1) == TokenKind::Eq
    }

    fn enter(&mut self) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > self.limits.max_depth {
            return Err(ParseError::at(
                self.current(),
                format!(
                    "Query nesting exceeds the maximum depth of {}",
                    self.limits.max_depth
                ),
            ));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// Consumes the current token and every following token that touches it with no
    /// whitespace in between, returning the joined source text (`web-01`, `err*`, `5m`).
    fn glue(&mut self) -> String {
        let first = self.advance();
        let mut text = first.text.clone();
        let mut end = (first.line, first.end_column());

        loop {
            let next = self.current();
            let gluable = next.kind.is_word()
                || matches!(
                    next.kind,
                    TokenKind::Number | TokenKind::Star | TokenKind::Minus
                );
            if !gluable || (next.line, next.column) != end {
                break;
            }
            let token = self.advance();
            text.push_str(&token.text);
            end = (token.line, token.end_column());
        }

        text
    }

    fn parse_field_name(&mut self) -> Result<String, ParseError> {
        if self.current().kind.is_word() {
            Ok(self.advance().text)
        } else {
            Err(self.unexpected("a field name"))
        }
    }

    fn parse_alias(&mut self) -> Result<String, ParseError> {
        if self.current().kind.is_word() || self.check(TokenKind::String) {
            Ok(self.advance().text)
        } else {
            Err(self.unexpected("an alias"))
        }
    }

    /// Parses `field[,] field ...`, requiring at least one field.
    fn parse_field_list(&mut self) -> Result<Vec<String>, ParseError> {
        let mut fields = vec![self.parse_field_name()?];
        loop {
            if self.check(TokenKind::Comma) {
                self.advance();
                fields.push(self.parse_field_name()?);
            } else if self.current().kind.is_word() && !self.at_named_param("limit") {
                fields.push(self.parse_field_name()?);
            } else {
                break;
            }
        }
        Ok(fields)
    }

    fn parse_count(&mut self) -> Result<usize, ParseError> {
        let token = self.consume(TokenKind::Number, "a number")?;
        token.text.parse::<usize>().map_err(|_| {
            ParseError::at(
                &token,
                format!("Expected a non-negative integer, found '{}'", token.text),
            )
        })
    }

    // ========================================================================
    // Commands
    // ========================================================================

    fn starts_implicit_search(&self) -> bool {
        matches!(
            self.current().kind,
            TokenKind::Identifier
                | TokenKind::String
                | TokenKind::Number
                | TokenKind::Regex
                | TokenKind::Star
                | TokenKind::LParen
                | TokenKind::Not
        )
    }

    fn parse_command(&mut self) -> Result<Stage, ParseError> {
        let kind = self.current().kind;
        match kind {
            TokenKind::Search => {
                self.advance();
                Ok(Stage::Search(self.parse_condition_stage()?))
            }
            TokenKind::Filter => {
                self.advance();
                Ok(Stage::Filter(self.parse_condition_stage()?))
            }
            TokenKind::Where => {
                self.advance();
                Ok(Stage::Where(self.parse_condition_stage()?))
            }
            TokenKind::Stats => self.parse_stats(),
            TokenKind::Sort => self.parse_sort(),
            TokenKind::Limit | TokenKind::Head | TokenKind::Tail => self.parse_limit(),
            TokenKind::Dedup => {
                self.advance();
                Ok(Stage::Dedup(FieldListStage {
                    fields: self.parse_field_list()?,
                }))
            }
            TokenKind::Table => {
                self.advance();
                Ok(Stage::Table(FieldListStage {
                    fields: self.parse_field_list()?,
                }))
            }
            TokenKind::Fields => self.parse_fields(),
            TokenKind::Rename => self.parse_rename(),
            TokenKind::Eval => self.parse_eval(),
            TokenKind::Top | TokenKind::Rare => self.parse_top(),
            TokenKind::Bin => self.parse_bin(),
            TokenKind::Timechart => self.parse_timechart(),
            TokenKind::Rex => self.parse_rex(),
            TokenKind::Identifier => {
                let token = self.current();
                Err(ParseError::at(
                    token,
                    format!("Unknown command '{}'", token.text),
                ))
            }
            _ => Err(self.unexpected("a command")),
        }
    }

    fn parse_stats(&mut self) -> Result<Stage, ParseError> {
        self.advance();
        let aggregations = self.parse_aggregations()?;
        let group_by = if self.check(TokenKind::By) {
            self.advance();
            self.parse_field_list()?
        } else {
            Vec::new()
        };
        Ok(Stage::Stats(StatsStage {
            aggregations,
            group_by,
        }))
    }

    fn parse_aggregations(&mut self) -> Result<Vec<Aggregation>, ParseError> {
        let mut aggregations = Vec::new();
        loop {
            match self.current().kind {
                TokenKind::Comma => {
                    self.advance();
                }
                TokenKind::By | TokenKind::Pipe | TokenKind::Eof => break,
                _ if self.at_named_param("span") => break,
                _ => aggregations.push(self.parse_aggregation()?),
            }
        }
        if aggregations.is_empty() {
            return Err(self.unexpected("an aggregation function"));
        }
        Ok(aggregations)
    }

    fn parse_aggregation(&mut self) -> Result<Aggregation, ParseError> {
        let token = self.current().clone();
        if !token.kind.is_word() {
            return Err(self.unexpected("an aggregation function"));
        }
        let function = AggFunction::from_name(&token.text).ok_or_else(|| {
            ParseError::at(
                &token,
                format!("Unknown aggregation function '{}'", token.text),
            )
        })?;
        self.advance();

        let mut field = None;
        if self.check(TokenKind::LParen) {
            self.advance();
            if self.check(TokenKind::Star) {
                self.advance();
            } else if !self.check(TokenKind::RParen) {
                field = Some(self.parse_field_name()?);
            }
            self.consume(TokenKind::RParen, "')'")?;
        }

        if function != AggFunction::Count && field.is_none() {
            return Err(ParseError::at(
                &token,
                format!("Aggregation '{}' requires a field", function.name()),
            ));
        }

        let alias = if self.check(TokenKind::As) {
            self.advance();
            Some(self.parse_alias()?)
        } else {
            None
        };

        Ok(Aggregation {
            function,
            field,
            alias,
        })
    }

    fn parse_sort(&mut self) -> Result<Stage, ParseError> {
        self.advance();
        let mut fields = Vec::new();
        while !self.at_stage_end() {
            if self.check(TokenKind::Comma) {
                self.advance();
                continue;
            }

            let mut order = SortOrder::Asc;
            if self.check(TokenKind::Minus) {
                self.advance();
                order = SortOrder::Desc;
            } else if self.check(TokenKind::Plus) {
                self.advance();
            }

            let field = self.parse_field_name()?;
            if self.check(TokenKind::Asc) {
                self.advance();
                order = SortOrder::Asc;
            } else if self.check(TokenKind::Desc) {
                self.advance();
                order = SortOrder::Desc;
            }
            fields.push(SortField { field, order });
        }

        if fields.is_empty() {
            return Err(self.unexpected("a field to sort by"));
        }
        Ok(Stage::Sort(SortStage { fields }))
    }

    fn parse_limit(&mut self) -> Result<Stage, ParseError> {
        let command = match self.advance().kind {
            TokenKind::Head => LimitCommand::Head,
            TokenKind::Tail => LimitCommand::Tail,
            _ => LimitCommand::Limit,
        };

        let count = if self.check(TokenKind::Number) || command == LimitCommand::Limit {
            self.parse_count()?
        } else {
            DEFAULT_HEAD_COUNT
        };

        Ok(Stage::Limit(LimitStage { count, command }))
    }

    fn parse_fields(&mut self) -> Result<Stage, ParseError> {
        self.advance();
        let include = if self.check(TokenKind::Minus) {
            self.advance();
            false
        } else {
            if self.check(TokenKind::Plus) {
                self.advance();
            }
            true
        };
        Ok(Stage::Fields(FieldsStage {
            fields: self.parse_field_list()?,
            include,
        }))
    }

    fn parse_rename(&mut self) -> Result<Stage, ParseError> {
        self.advance();
        let mut renames = Vec::new();
        loop {
            let from = self.parse_field_name()?;
            self.consume(TokenKind::As, "AS")?;
            let to = self.parse_alias()?;
            renames.push(Rename { from, to });

            if self.check(TokenKind::Comma) {
                self.advance();
            } else if self.at_stage_end() {
                break;
            }
        }
        Ok(Stage::Rename(RenameStage { renames }))
    }

    fn parse_eval(&mut self) -> Result<Stage, ParseError> {
        self.advance();
        let mut assignments = Vec::new();
        loop {
            let field = self.parse_field_name()?;
            self.consume(TokenKind::Eq, "'='")?;
            let expr = self.parse_expression()?;
            assignments.push(EvalAssignment { field, expr });

            if self.check(TokenKind::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        Ok(Stage::Eval(EvalStage { assignments }))
    }

    fn parse_top(&mut self) -> Result<Stage, ParseError> {
        let rare = self.advance().kind == TokenKind::Rare;
        let mut limit = DEFAULT_TOP_LIMIT;

        if self.check(TokenKind::Number) {
            limit = self.parse_count()?;
        } else if self.at_named_param("limit") {
            self.advance();
            self.advance();
            limit = self.parse_count()?;
        }

        let fields = self.parse_field_list()?;

        if self.at_named_param("limit") {
            self.advance();
            self.advance();
            limit = self.parse_count()?;
        }

        let stage = TopStage { fields, limit };
        Ok(if rare {
            Stage::Rare(stage)
        } else {
            Stage::Top(stage)
        })
    }

    fn parse_span_param(&mut self) -> Result<Span, ParseError> {
        self.advance();
        self.advance();
        let token = self.current().clone();
        let text = match token.kind {
            TokenKind::String => self.advance().text,
            TokenKind::Number | TokenKind::Identifier => self.glue(),
            _ => return Err(self.unexpected("a span such as 5m or 100")),
        };
        parse_span(&text)
            .ok_or_else(|| ParseError::at(&token, format!("Invalid span '{text}'")))
    }

    fn parse_bin(&mut self) -> Result<Stage, ParseError> {
        let command = self.advance();
        let mut span = None;
        let mut field = None;
        let mut alias = None;

        while !self.at_stage_end() {
            if self.at_named_param("span") {
                span = Some(self.parse_span_param()?);
            } else if self.check(TokenKind::As) {
                self.advance();
                alias = Some(self.parse_alias()?);
            } else if field.is_none() {
                field = Some(self.parse_field_name()?);
            } else {
                return Err(self.unexpected("span=<value> or AS"));
            }
        }

        let field =
            field.ok_or_else(|| ParseError::at(self.current(), "bin requires a field"))?;
        let span = span
            .ok_or_else(|| ParseError::at(&command, "bin requires span=<value>"))?;

        Ok(Stage::Bin(BinStage { field, span, alias }))
    }

    fn parse_timechart(&mut self) -> Result<Stage, ParseError> {
        self.advance();
        let mut span = None;

        if self.at_named_param("span") {
            span = Some(self.parse_span_param()?);
        }

        let aggregations = self.parse_aggregations()?;

        if self.at_named_param("span") {
            span = Some(self.parse_span_param()?);
        }

        let by = if self.check(TokenKind::By) {
            self.advance();
            Some(self.parse_field_name()?)
        } else {
            None
        };

        if self.at_named_param("span") {
            span = Some(self.parse_span_param()?);
        }

        Ok(Stage::Timechart(TimechartStage {
            span: span.unwrap_or(Span::Time {
                amount: 1,
                unit: TimeUnit::Hour,
            }),
            aggregations,
            by,
        }))
    }

    fn parse_rex(&mut self) -> Result<Stage, ParseError> {
        self.advance();
        let mut field = RAW_FIELD.to_string();
        if self.at_named_param("field") {
            self.advance();
            self.advance();
            field = self.parse_field_name()?;
        }

        if !matches!(self.current().kind, TokenKind::String | TokenKind::Regex) {
            return Err(self.unexpected("a quoted regular expression"));
        }
        let token = self.advance();
        if let Err(e) = regex::Regex::new(&token.text) {
            tracing::debug!(pattern = %token.text, error = %e, "Rejected rex pattern");
            return Err(ParseError::at(
                &token,
                format!("Invalid regular expression '{}'", token.text),
            ));
        }

        Ok(Stage::Rex(RexStage {
            field,
            pattern: token.text,
        }))
    }

    // ========================================================================
    // Conditions
    // ========================================================================

    fn parse_condition_stage(&mut self) -> Result<ConditionStage, ParseError> {
        let conditions = match self.parse_or()? {
            None => Vec::new(),
            Some(Condition::Group(group)) if group.logic == LogicalOp::And && !group.negated => {
                group.conditions
            }
            Some(condition) => vec![condition],
        };

        if !self.at_stage_end() {
            return Err(self.unexpected("a condition, '|' or end of query"));
        }
        Ok(ConditionStage { conditions })
    }

    fn at_condition_end(&self) -> bool {
        matches!(
            self.current().kind,
            TokenKind::Pipe | TokenKind::Eof | TokenKind::RParen | TokenKind::Or | TokenKind::And
        )
    }

    fn parse_or(&mut self) -> Result<Option<Condition>, ParseError> {
        let mut members = Vec::new();
        members.extend(self.parse_and()?);

        while self.check(TokenKind::Or) {
            self.advance();
            if self.at_condition_end() {
                return Err(self.unexpected("a condition after OR"));
            }
            members.extend(self.parse_and()?);
        }

        Ok(group(members, LogicalOp::Or))
    }

    fn parse_and(&mut self) -> Result<Option<Condition>, ParseError> {
        let mut members = Vec::new();
        loop {
            match self.current().kind {
                TokenKind::Pipe | TokenKind::Eof | TokenKind::RParen | TokenKind::Or => break,
                TokenKind::And => {
                    self.advance();
                    if self.at_condition_end() {
                        return Err(self.unexpected("a condition after AND"));
                    }
                }
                _ => members.extend(self.parse_unary()?),
            }
        }
        Ok(group(members, LogicalOp::And))
    }

    fn parse_unary(&mut self) -> Result<Option<Condition>, ParseError> {
        match self.current().kind {
            TokenKind::Not => {
                self.advance();
                self.enter()?;
                let operand = self.parse_unary()?;
                self.leave();
                let mut condition =
                    operand.ok_or_else(|| self.unexpected("a condition after NOT"))?;
                condition.negate();
                Ok(Some(condition))
            }
            TokenKind::LParen => {
                self.advance();
                self.enter()?;
                let inner = self.parse_or()?;
                self.consume(TokenKind::RParen, "')'")?;
                self.leave();
                Ok(inner)
            }
            _ => self.parse_term(),
        }
    }

    fn parse_term(&mut self) -> Result<Option<Condition>, ParseError> {
        let token = self.current().clone();
        match token.kind {
            TokenKind::Star | TokenKind::Number => {
                let text = self.glue();
                if text.chars().all(|c| c == '*') {
                    return Ok(None);
                }
                Ok(Some(raw_contains(Value::String(text))))
            }
            TokenKind::String => {
                self.advance();
                Ok(Some(raw_contains(Value::String(token.text))))
            }
            TokenKind::Regex => {
                self.advance();
                Ok(Some(raw_contains(Value::Regex(token.text))))
            }
            kind if kind.is_word() => {
                let operator = match self.peek_kind(1) {
                    TokenKind::Eq => Some(ComparisonOp::Eq),
                    TokenKind::NotEq => Some(ComparisonOp::NotEq),
                    TokenKind::Lt => Some(ComparisonOp::Lt),
                    TokenKind::LtEq => Some(ComparisonOp::LtEq),
                    TokenKind::Gt => Some(ComparisonOp::Gt),
                    TokenKind::GtEq => Some(ComparisonOp::GtEq),
                    TokenKind::Tilde => Some(ComparisonOp::Contains),
                    TokenKind::In => Some(ComparisonOp::In),
                    TokenKind::Not if self.peek_kind(2) == TokenKind::In => {
                        Some(ComparisonOp::NotIn)
                    }
                    _ => None,
                };

                let Some(operator) = operator else {
                    let text = self.glue();
                    return Ok(Some(raw_contains(Value::String(text))));
                };

                let field = self.advance().text;
                if operator == ComparisonOp::NotIn {
                    self.advance();
                }
                let op_token = self.advance();

                let value = match operator {
                    ComparisonOp::In | ComparisonOp::NotIn => self.parse_value_list()?,
                    _ => self.parse_value(&op_token)?,
                };

                Ok(Some(Condition::Simple(SimpleCondition::new(
                    field, operator, value,
                ))))
            }
            _ => Err(self.unexpected("a condition")),
        }
    }

    fn parse_value(&mut self, after: &Token) -> Result<Value, ParseError> {
        let token = self.current().clone();
        match token.kind {
            TokenKind::String => {
                self.advance();
                Ok(Value::String(token.text))
            }
            TokenKind::Regex => {
                self.advance();
                Ok(Value::Regex(token.text))
            }
            TokenKind::Number => {
                let text = self.glue();
                match text.parse::<f64>() {
                    Ok(n) if text == token.text && n.is_finite() => Ok(Value::Number(n)),
                    _ => Ok(Value::String(text)),
                }
            }
            kind if kind.is_word() || matches!(kind, TokenKind::Star | TokenKind::Minus) => {
                let text = self.glue();
                if text.eq_ignore_ascii_case("null") {
                    Ok(Value::Null)
                } else {
                    Ok(Value::String(text))
                }
            }
            _ => Err(self.unexpected(&format!("a value after '{}'", after.text))),
        }
    }

    fn parse_value_list(&mut self) -> Result<Value, ParseError> {
        let open = self.consume(TokenKind::LParen, "'(' after IN")?;
        let mut values = Vec::new();
        while !self.check(TokenKind::RParen) {
            if self.check(TokenKind::Comma) {
                self.advance();
                continue;
            }
            if self.check(TokenKind::Eof) {
                return Err(self.unexpected("')'"));
            }
            values.push(self.parse_value(&open)?);
        }
        let close = self.advance();
        if values.is_empty() {
            return Err(ParseError::at(&close, "IN requires at least one value"));
        }
        Ok(Value::List(values))
    }
}

/// Wraps members in a logic group, or unwraps a single member.
fn group(mut members: Vec<Condition>, logic: LogicalOp) -> Option<Condition> {
    match members.len() {
        0 => None,
        1 => members.pop(),
        _ => Some(Condition::Group(LogicGroup {
            logic,
            conditions: members,
            negated: false,
        })),
    }
}

fn raw_contains(value: Value) -> Condition {
    Condition::Simple(SimpleCondition::new(RAW_FIELD, ComparisonOp::Contains, value))
}

fn describe(token: &Token) -> String {
    match token.kind {
        TokenKind::Eof => "end of query".to_string(),
        TokenKind::String => format!("\"{}\"", token.text),
        TokenKind::Regex => format!("/{}/", token.text),
        _ => format!("'{}'", token.text),
    }
}

/// Parses a token stream into a [`QueryAst`] with default limits.
///
/// # Errors
///
/// Returns a [`ParseError`] if the tokens do not form a valid query.
///
/// # Examples
///
/// ```
/// use spl::query::{parse, tokenize, Stage};
///
/// let ast = parse(tokenize("host=web | head 5").unwrap()).unwrap();
/// assert_eq!(ast.stages.len(), 2);
/// assert!(matches!(ast.stages[0], Stage::Search(_)));
/// ```
pub fn parse(tokens: Vec<Token>) -> Result<QueryAst, ParseError> {
    Parser::new(tokens).parse()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::ast::EvalExpr;
    use crate::query::lexer::tokenize;

    fn parse_str(input: &str) -> Result<QueryAst, ParseError> {
        parse(tokenize(input).unwrap())
    }

    fn conditions(input: &str) -> Vec<Condition> {
        match parse_str(input).unwrap().stages.remove(0) {
            Stage::Search(s) | Stage::Filter(s) | Stage::Where(s) => s.conditions,
            other => panic!("Expected condition stage, got {other:?}"),
        }
    }

    fn simple(condition: &Condition) -> &SimpleCondition {
        match condition {
            Condition::Simple(c) => c,
            Condition::Group(g) => panic!("Expected simple condition, got {g:?}"),
        }
    }

    #[test]
    fn test_parse_empty_query() {
        assert!(parse_str("").unwrap().stages.is_empty());
        assert!(parse_str("  # only a comment").unwrap().stages.is_empty());
    }

    #[test]
    fn test_parse_implicit_search() {
        let ast = parse_str("host=router").unwrap();
        assert_eq!(ast, parse_str("search host=router").unwrap());
    }

    #[test]
    fn test_parse_simple_condition() {
        let conds = conditions("search host=web-01");
        assert_eq!(conds.len(), 1);
        let c = simple(&conds[0]);
        assert_eq!(c.field, "host");
        assert_eq!(c.operator, ComparisonOp::Eq);
        assert_eq!(c.value, Value::String("web-01".to_string()));
        assert!(!c.negate);
    }

    #[test]
    fn test_parse_numeric_and_dotted_values() {
        let conds = conditions("status>=500 src=10.0.0.1 delta=-3");
        assert_eq!(simple(&conds[0]).value, Value::Number(500.0));
        assert_eq!(simple(&conds[0]).operator, ComparisonOp::GtEq);
        assert_eq!(
            simple(&conds[1]).value,
            Value::String("10.0.0.1".to_string())
        );
        assert_eq!(simple(&conds[2]).value, Value::Number(-3.0));
    }

    #[test]
    fn test_parse_wildcard_values() {
        let conds = conditions("host=web* src=10.0.0.*");
        assert_eq!(simple(&conds[0]).value, Value::String("web*".to_string()));
        assert_eq!(
            simple(&conds[1]).value,
            Value::String("10.0.0.*".to_string())
        );
    }

    #[test]
    fn test_parse_bare_star_dropped() {
        assert!(conditions("search *").is_empty());
        let conds = conditions("search * host=a");
        assert_eq!(conds.len(), 1);
        assert_eq!(simple(&conds[0]).field, "host");
    }

    #[test]
    fn test_parse_bare_term_is_raw_contains() {
        let conds = conditions("search error \"disk full\" *timeout*");
        assert_eq!(conds.len(), 3);
        for c in &conds {
            assert_eq!(simple(c).field, RAW_FIELD);
            assert_eq!(simple(c).operator, ComparisonOp::Contains);
        }
        assert_eq!(simple(&conds[1]).value, Value::String("disk full".to_string()));
        assert_eq!(simple(&conds[2]).value, Value::String("*timeout*".to_string()));
    }

    #[test]
    fn test_parse_not_and_explicit_and() {
        let conds = conditions("search NOT level=debug AND app=api");
        assert_eq!(conds.len(), 2);
        assert!(simple(&conds[0]).negate);
        assert!(!simple(&conds[1]).negate);
    }

    #[test]
    fn test_parse_or_precedence() {
        let conds = conditions("a=1 OR b=2 c=3");
        assert_eq!(conds.len(), 1);
        match &conds[0] {
            Condition::Group(g) => {
                assert_eq!(g.logic, LogicalOp::Or);
                assert_eq!(g.conditions.len(), 2);
                assert!(matches!(
                    &g.conditions[1],
                    Condition::Group(inner) if inner.logic == LogicalOp::And
                ));
            }
            Condition::Simple(_) => panic!("Expected OR group"),
        }
    }

    #[test]
    fn test_parse_grouped_conditions() {
        let conds = conditions("search (a=1 OR a=2) AND b=3");
        assert_eq!(conds.len(), 2);
        match &conds[0] {
            Condition::Group(g) => {
                assert_eq!(g.logic, LogicalOp::Or);
                assert_eq!(g.conditions.len(), 2);
            }
            Condition::Simple(_) => panic!("Expected group"),
        }
        assert_eq!(simple(&conds[1]).field, "b");
    }

    #[test]
    fn test_parse_negated_group() {
        let conds = conditions("NOT (level=debug OR level=info)");
        assert!(matches!(&conds[0], Condition::Group(g) if g.negated));
    }

    #[test]
    fn test_parse_in_and_not_in() {
        let conds = conditions("host IN (a, \"b\", 3) app NOT IN (x y)");
        let c = simple(&conds[0]);
        assert_eq!(c.operator, ComparisonOp::In);
        assert_eq!(
            c.value,
            Value::List(vec![
                Value::String("a".to_string()),
                Value::String("b".to_string()),
                Value::Number(3.0),
            ])
        );
        assert_eq!(simple(&conds[1]).operator, ComparisonOp::NotIn);
    }

    #[test]
    fn test_parse_regex_and_null_values() {
        let conds = conditions("message~/fail(ed|ure)/ user=null");
        assert_eq!(
            simple(&conds[0]).value,
            Value::Regex("fail(ed|ure)".to_string())
        );
        assert_eq!(simple(&conds[1]).value, Value::Null);
    }

    #[test]
    fn test_parse_stats() {
        let ast = parse_str("search a=1 | stats count, avg(latency) AS avg_lat, p95(latency) by host, app")
            .unwrap();
        match &ast.stages[1] {
            Stage::Stats(stats) => {
                assert_eq!(stats.aggregations.len(), 3);
                assert_eq!(stats.aggregations[0].function, AggFunction::Count);
                assert_eq!(stats.aggregations[0].field, None);
                assert_eq!(stats.aggregations[1].alias.as_deref(), Some("avg_lat"));
                assert_eq!(
                    stats.aggregations[2].function,
                    AggFunction::Percentile(95)
                );
                assert_eq!(stats.group_by, vec!["host", "app"]);
            }
            other => panic!("Expected stats, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_stats_count_forms() {
        for query in ["stats count", "stats count()", "stats count(*)"] {
            match &parse_str(query).unwrap().stages[0] {
                Stage::Stats(s) => assert_eq!(s.aggregations[0].field, None, "{query}"),
                other => panic!("Expected stats, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_parse_stats_errors() {
        let err = parse_str("stats bogus(x)").unwrap_err();
        assert_eq!(err.message, "Unknown aggregation function 'bogus'");
        assert_eq!(err.column, 7);

        let err = parse_str("stats avg").unwrap_err();
        assert_eq!(err.message, "Aggregation 'avg' requires a field");

        let err = parse_str("stats by host").unwrap_err();
        assert!(err.message.starts_with("Expected an aggregation function"));
    }

    #[test]
    fn test_parse_sort() {
        let ast = parse_str("stats count by host | sort -count, host asc, app DESC").unwrap();
        match &ast.stages[1] {
            Stage::Sort(sort) => {
                assert_eq!(
                    sort.fields,
                    vec![
                        SortField {
                            field: "count".to_string(),
                            order: SortOrder::Desc
                        },
                        SortField {
                            field: "host".to_string(),
                            order: SortOrder::Asc
                        },
                        SortField {
                            field: "app".to_string(),
                            order: SortOrder::Desc
                        },
                    ]
                );
            }
            other => panic!("Expected sort, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_limit_commands() {
        let ast = parse_str("search a | head | tail 3 | limit 7").unwrap();
        assert_eq!(
            ast.stages[1..],
            [
                Stage::Limit(LimitStage {
                    count: 10,
                    command: LimitCommand::Head
                }),
                Stage::Limit(LimitStage {
                    count: 3,
                    command: LimitCommand::Tail
                }),
                Stage::Limit(LimitStage {
                    count: 7,
                    command: LimitCommand::Limit
                }),
            ]
        );

        let err = parse_str("search a | limit").unwrap_err();
        assert_eq!(err.message, "Expected a number, found end of query");

        let err = parse_str("search a | head 1.5").unwrap_err();
        assert_eq!(err.message, "Expected a non-negative integer, found '1.5'");
    }

    #[test]
    fn test_parse_field_lists() {
        let ast = parse_str("search a | dedup host app | table host, app | fields - msg, severity")
            .unwrap();
        assert_eq!(
            ast.stages[1],
            Stage::Dedup(FieldListStage {
                fields: vec!["host".to_string(), "app".to_string()]
            })
        );
        assert_eq!(
            ast.stages[2],
            Stage::Table(FieldListStage {
                fields: vec!["host".to_string(), "app".to_string()]
            })
        );
        assert_eq!(
            ast.stages[3],
            Stage::Fields(FieldsStage {
                fields: vec!["msg".to_string(), "severity".to_string()],
                include: false
            })
        );
    }

    #[test]
    fn test_parse_rename() {
        let ast = parse_str("table host, app | rename host AS server, app as \"Application\"")
            .unwrap();
        assert_eq!(
            ast.stages[1],
            Stage::Rename(RenameStage {
                renames: vec![
                    Rename {
                        from: "host".to_string(),
                        to: "server".to_string()
                    },
                    Rename {
                        from: "app".to_string(),
                        to: "Application".to_string()
                    },
                ]
            })
        );
    }

    #[test]
    fn test_parse_eval() {
        let ast = parse_str("eval kb = round(bytes / 1024, 2), slow = latency > 500").unwrap();
        match &ast.stages[0] {
            Stage::Eval(eval) => {
                assert_eq!(eval.assignments.len(), 2);
                assert_eq!(eval.assignments[0].field, "kb");
                assert!(matches!(
                    &eval.assignments[0].expr,
                    EvalExpr::FunctionCall { name, args } if name == "round" && args.len() == 2
                ));
                assert_eq!(eval.assignments[1].field, "slow");
            }
            other => panic!("Expected eval, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_top_and_rare() {
        let ast = parse_str("top host | top 5 app | top limit=3 host, app | rare severity").unwrap();
        assert_eq!(
            ast.stages[0],
            Stage::Top(TopStage {
                fields: vec!["host".to_string()],
                limit: 10
            })
        );
        assert_eq!(
            ast.stages[1],
            Stage::Top(TopStage {
                fields: vec!["app".to_string()],
                limit: 5
            })
        );
        assert_eq!(
            ast.stages[2],
            Stage::Top(TopStage {
                fields: vec!["host".to_string(), "app".to_string()],
                limit: 3
            })
        );
        assert!(matches!(ast.stages[3], Stage::Rare(_)));
    }

    #[test]
    fn test_parse_bin() {
        let ast = parse_str("bin _time span=5m | bin span=100 bytes AS size").unwrap();
        assert_eq!(
            ast.stages[0],
            Stage::Bin(BinStage {
                field: "_time".to_string(),
                span: Span::Time {
                    amount: 5,
                    unit: TimeUnit::Minute
                },
                alias: None
            })
        );
        assert_eq!(
            ast.stages[1],
            Stage::Bin(BinStage {
                field: "bytes".to_string(),
                span: Span::Numeric { width: 100.0 },
                alias: Some("size".to_string())
            })
        );

        let err = parse_str("bin _time").unwrap_err();
        assert_eq!(err.message, "bin requires span=<value>");

        let err = parse_str("bin _time span=5x").unwrap_err();
        assert_eq!(err.message, "Invalid span '5x'");
        assert_eq!(err.column, 16);
    }

    #[test]
    fn test_parse_timechart() {
        let ast = parse_str("timechart span=15m count, avg(latency) by host").unwrap();
        match &ast.stages[0] {
            Stage::Timechart(tc) => {
                assert_eq!(tc.span.as_secs(), Some(900));
                assert_eq!(tc.aggregations.len(), 2);
                assert_eq!(tc.by.as_deref(), Some("host"));
            }
            other => panic!("Expected timechart, got {other:?}"),
        }

        match &parse_str("timechart count").unwrap().stages[0] {
            Stage::Timechart(tc) => assert_eq!(tc.span.as_secs(), Some(3600)),
            other => panic!("Expected timechart, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_rex() {
        let ast = parse_str(r#"rex field=msg "user=(?<user>\w+)" | rex /id=(?P<id>\d+)/"#).unwrap();
        assert_eq!(
            ast.stages[0],
            Stage::Rex(RexStage {
                field: "msg".to_string(),
                pattern: r"user=(?<user>\w+)".to_string()
            })
        );
        assert_eq!(
            ast.stages[1],
            Stage::Rex(RexStage {
                field: RAW_FIELD.to_string(),
                pattern: r"id=(?P<id>\d+)".to_string()
            })
        );

        let err = parse_str("rex \"(unclosed\"").unwrap_err();
        assert_eq!(err.message, "Invalid regular expression '(unclosed'");
        assert_eq!(err.column, 5);
    }

    #[test]
    fn test_parse_error_points_after_operator() {
        let err = parse_str("search host=").unwrap_err();
        assert_eq!(err.message, "Expected a value after '=', found end of query");
        assert_eq!((err.line, err.column), (1, 13));
    }

    #[test]
    fn test_parse_unknown_command() {
        let err = parse_str("search a | frobnicate x").unwrap_err();
        assert_eq!(err.message, "Unknown command 'frobnicate'");
        assert_eq!(err.column, 12);
    }

    #[test]
    fn test_parse_trailing_tokens() {
        let err = parse_str("search a | head 5 6").unwrap_err();
        assert_eq!(err.message, "Expected '|' or end of query, found '6'");
        assert_eq!(err.column, 19);
    }

    #[test]
    fn test_parse_unbalanced_parens() {
        let err = parse_str("search (a=1 OR b=2").unwrap_err();
        assert_eq!(err.message, "Expected ')', found end of query");

        let err = parse_str("search a=1)").unwrap_err();
        assert_eq!(err.column, 11);
    }

    #[test]
    fn test_parse_dangling_logic() {
        let err = parse_str("search a=1 OR").unwrap_err();
        assert_eq!(err.message, "Expected a condition after OR, found end of query");
        let err = parse_str("search a=1 AND | head").unwrap_err();
        assert_eq!(err.message, "Expected a condition after AND, found '|'");
    }

    #[test]
    fn test_parse_token_limit() {
        let tokens = tokenize("a b c d e f").unwrap();
        let limits = ParserLimits {
            max_tokens: 3,
            max_depth: 64,
        };
        let err = Parser::with_limits(tokens, limits).parse().unwrap_err();
        assert_eq!(err.message, "Query exceeds the maximum of 3 tokens");
        assert_eq!(err.column, 7);
    }

    #[test]
    fn test_parse_depth_limit() {
        let query = format!("search {}a=1{}", "(".repeat(10), ")".repeat(10));
        let limits = ParserLimits {
            max_tokens: 1_000,
            max_depth: 5,
        };
        let err = Parser::with_limits(tokenize(&query).unwrap(), limits)
            .parse()
            .unwrap_err();
        assert_eq!(err.message, "Query nesting exceeds the maximum depth of 5");

        assert!(parse_str(&query).is_ok());
    }

    #[test]
    fn test_parse_tokens_without_eof() {
        let mut tokens = tokenize("head 3").unwrap();
        tokens.pop();
        let ast = parse(tokens).unwrap();
        assert_eq!(ast.stages.len(), 1);
    }
}
