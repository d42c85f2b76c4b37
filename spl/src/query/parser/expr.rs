//! Expression grammar for `eval` assignments.
//!
//! ```text
//! expr       := or
//! or         := and ( OR and )*
//! and        := comparison ( AND comparison )*
//! comparison := additive ( ( = | != | < | <= | > | >= ) additive )?
//! additive   := term ( ( + | - ) term )*
//! term       := unary ( ( * | / ) unary )*
//! unary      := - unary | primary
//! primary    := number | string | null | field | name ( args ) | ( expr )
//! ```

use super::{ParseError, Parser};
use crate::query::ast::{BinaryOperator, EvalExpr, Value};
use crate::query::lexer::TokenKind;

impl Parser {
    /// Parses one eval expression, stopping before `,`, `|` or end of query.
    pub(super) fn parse_expression(&mut self) -> Result<EvalExpr, ParseError> {
        self.enter()?;
        let expr = self.parse_or_expr();
        self.leave();
        expr
    }

    fn parse_or_expr(&mut self) -> Result<EvalExpr, ParseError> {
        let mut left = self.parse_and_expr()?;
        while self.check(TokenKind::Or) {
            self.advance();
            let right = self.parse_and_expr()?;
            left = EvalExpr::binary(BinaryOperator::Or, left, right);
        }
        Ok(left)
    }

    fn parse_and_expr(&mut self) -> Result<EvalExpr, ParseError> {
        let mut left = self.parse_comparison_expr()?;
        while self.check(TokenKind::And) {
            self.advance();
            let right = self.parse_comparison_expr()?;
            left = EvalExpr::binary(BinaryOperator::And, left, right);
        }
        Ok(left)
    }

    fn parse_comparison_expr(&mut self) -> Result<EvalExpr, ParseError> {
        let left = self.parse_additive_expr()?;
        let op = match self.current().kind {
            TokenKind::Eq => BinaryOperator::Eq,
            TokenKind::NotEq => BinaryOperator::NotEq,
            TokenKind::Lt => BinaryOperator::Lt,
            TokenKind::LtEq => BinaryOperator::LtEq,
            TokenKind::Gt => BinaryOperator::Gt,
            TokenKind::GtEq => BinaryOperator::GtEq,
            _ => return Ok(left),
        };
        self.advance();
        let right = self.parse_additive_expr()?;
        Ok(EvalExpr::binary(op, left, right))
    }

    fn parse_additive_expr(&mut self) -> Result<EvalExpr, ParseError> {
        let mut left = self.parse_term_expr()?;
        loop {
            let op = match self.current().kind {
                TokenKind::Plus => BinaryOperator::Add,
                TokenKind::Minus => BinaryOperator::Subtract,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_term_expr()?;
            left = EvalExpr::binary(op, left, right);
        }
    }

    fn parse_term_expr(&mut self) -> Result<EvalExpr, ParseError> {
        let mut left = self.parse_unary_expr()?;
        loop {
            let op = match self.current().kind {
                TokenKind::Star => BinaryOperator::Multiply,
                TokenKind::Slash => BinaryOperator::Divide,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_unary_expr()?;
            left = EvalExpr::binary(op, left, right);
        }
    }

    fn parse_unary_expr(&mut self) -> Result<EvalExpr, ParseError> {
        if self.check(TokenKind::Minus) {
            self.advance();
            self.enter()?;
            let operand = self.parse_unary_expr();
            self.leave();
            return Ok(EvalExpr::binary(
                BinaryOperator::Subtract,
                EvalExpr::literal(Value::Number(0.0)),
                operand?,
            ));
        }
        self.parse_primary_expr()
    }

    fn parse_primary_expr(&mut self) -> Result<EvalExpr, ParseError> {
        let token = self.current().clone();
        match token.kind {
            TokenKind::Number => {
                self.advance();
                let value = token
                    .text
                    .parse::<f64>()
                    .ok()
                    .filter(|n| n.is_finite())
                    .map_or(Value::String(token.text), Value::Number);
                Ok(EvalExpr::literal(value))
            }
            TokenKind::String => {
                self.advance();
                Ok(EvalExpr::literal(Value::String(token.text)))
            }
            TokenKind::Regex => {
                self.advance();
                Ok(EvalExpr::literal(Value::Regex(token.text)))
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expression()?;
                self.consume(TokenKind::RParen, "')'")?;
                Ok(inner)
            }
            kind if kind.is_word() => {
                self.advance();
                if self.check(TokenKind::LParen) {
                    self.advance();
                    let args = self.parse_arguments()?;
                    return Ok(EvalExpr::call(token.text.to_lowercase(), args));
                }
                if token.text.eq_ignore_ascii_case("null") {
                    return Ok(EvalExpr::literal(Value::Null));
                }
                Ok(EvalExpr::field(token.text))
            }
            _ => Err(self.unexpected("an expression")),
        }
    }

    /// Parses call arguments after the opening parenthesis, consuming the closing one.
    fn parse_arguments(&mut self) -> Result<Vec<EvalExpr>, ParseError> {
        let mut args = Vec::new();
        if self.check(TokenKind::RParen) {
            self.advance();
            return Ok(args);
        }
        loop {
            args.push(self.parse_expression()?);
            if self.check(TokenKind::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        self.consume(TokenKind::RParen, "',' or ')'")?;
        Ok(args)
    }
}
