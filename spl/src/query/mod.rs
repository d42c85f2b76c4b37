//! Query language front end: lexer, AST and parser.

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod span;

pub use ast::{
    AggFunction, Aggregation, BinStage, BinaryOperator, ComparisonOp, Condition, ConditionStage,
    EvalAssignment, EvalExpr, EvalStage, FieldListStage, FieldsStage, LimitCommand, LimitStage,
    LogicGroup, LogicalOp, QueryAst, Rename, RenameStage, RexStage, SimpleCondition, SortField,
    SortOrder, SortStage, Stage, StatsStage, TimechartStage, TopStage, Value,
};
pub use lexer::{tokenize, LexError, Lexer, Token, TokenKind, KEYWORDS};
pub use parser::{parse, ParseError, Parser, ParserLimits, RAW_FIELD};
pub use span::{parse_span, Span, TimeUnit};
