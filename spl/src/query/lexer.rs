//! Tokenizer for the search pipeline language.
//!
//! Turns raw query text such as `search host=web-01 | stats count by app` into a flat
//! stream of [`Token`]s. Keywords are case-insensitive, identifiers keep their original
//! case, and every token carries the 1-based line and column of its first character.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The kind of a lexical token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenKind {
    // Pipeline commands
    /// `search`
    Search,
    /// `filter`
    Filter,
    /// `where`
    Where,
    /// `stats`
    Stats,
    /// `sort`
    Sort,
    /// `limit`
    Limit,
    /// `head`
    Head,
    /// `tail`
    Tail,
    /// `dedup`
    Dedup,
    /// `table`
    Table,
    /// `fields`
    Fields,
    /// `rename`
    Rename,
    /// `eval`
    Eval,
    /// `top`
    Top,
    /// `rare`
    Rare,
    /// `bin` (also `bucket`)
    Bin,
    /// `timechart`
    Timechart,
    /// `rex`
    Rex,

    // Clause keywords
    /// `by`
    By,
    /// `as`
    As,
    /// `and`
    And,
    /// `or`
    Or,
    /// `not`
    Not,
    /// `asc`
    Asc,
    /// `desc`
    Desc,
    /// `in`
    In,

    // Aggregation functions with their own keyword
    /// `count`
    Count,
    /// `sum`
    Sum,
    /// `avg`
    Avg,
    /// `min`
    Min,
    /// `max`
    Max,
    /// `dc`
    Dc,
    /// `values`
    Values,
    /// `earliest`
    Earliest,
    /// `latest`
    Latest,

    // Comparison operators
    /// `=` or `==`
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
    /// `~` (contains)
    Tilde,

    // Arithmetic operators
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*` (multiplication or wildcard)
    Star,
    /// `/` (division)
    Slash,

    // Punctuation
    /// `|`
    Pipe,
    /// `,`
    Comma,
    /// `(`
    LParen,
    /// `)`
    RParen,

    // Literals
    /// A bare word that is not a keyword.
    Identifier,
    /// A quoted string; `text` holds the unescaped content.
    String,
    /// A number, possibly negative or dotted (`42`, `-1.5`, `10.0.0.1`).
    Number,
    /// A `/regex/` literal; `text` holds the pattern between the slashes.
    Regex,

    /// End of input.
    Eof,
}

/// Keyword table. Lookup happens on the lowercased identifier text.
pub const KEYWORDS: &[(&str, TokenKind)] = &[
    ("search", TokenKind::Search),
    ("filter", TokenKind::Filter),
    ("where", TokenKind::Where),
    ("stats", TokenKind::Stats),
    ("sort", TokenKind::Sort),
    ("limit", TokenKind::Limit),
    ("head", TokenKind::Head),
    ("tail", TokenKind::Tail),
    ("dedup", TokenKind::Dedup),
    ("table", TokenKind::Table),
    ("fields", TokenKind::Fields),
    ("rename", TokenKind::Rename),
    ("eval", TokenKind::Eval),
    ("top", TokenKind::Top),
    ("rare", TokenKind::Rare),
    ("bin", TokenKind::Bin),
    ("bucket", TokenKind::Bin),
    ("timechart", TokenKind::Timechart),
    ("rex", TokenKind::Rex),
    ("by", TokenKind::By),
    ("as", TokenKind::As),
    ("and", TokenKind::And),
    ("or", TokenKind::Or),
    ("not", TokenKind::Not),
    ("asc", TokenKind::Asc),
    ("desc", TokenKind::Desc),
    ("in", TokenKind::In),
    ("count", TokenKind::Count),
    ("sum", TokenKind::Sum),
    ("avg", TokenKind::Avg),
    ("min", TokenKind::Min),
    ("max", TokenKind::Max),
    ("dc", TokenKind::Dc),
    ("values", TokenKind::Values),
    ("earliest", TokenKind::Earliest),
    ("latest", TokenKind::Latest),
];

impl TokenKind {
    /// Looks up a keyword, ignoring case.
    #[must_use]
    pub fn keyword(word: &str) -> Option<Self> {
        let lower = word.to_lowercase();
        KEYWORDS
            .iter()
            .find(|(name, _)| *name == lower)
            .map(|(_, kind)| *kind)
    }

    /// Returns true for keywords that start a pipeline stage.
    #[must_use]
    pub const fn is_command(self) -> bool {
        matches!(
            self,
            Self::Search
                | Self::Filter
                | Self::Where
                | Self::Stats
                | Self::Sort
                | Self::Limit
                | Self::Head
                | Self::Tail
                | Self::Dedup
                | Self::Table
                | Self::Fields
                | Self::Rename
                | Self::Eval
                | Self::Top
                | Self::Rare
                | Self::Bin
                | Self::Timechart
                | Self::Rex
        )
    }

    /// Returns true for aggregation keywords (`count`, `avg`, ...).
    #[must_use]
    pub const fn is_aggregation(self) -> bool {
        matches!(
            self,
            Self::Count
                | Self::Sum
                | Self::Avg
                | Self::Min
                | Self::Max
                | Self::Dc
                | Self::Values
                | Self::Earliest
                | Self::Latest
        )
    }

    /// Returns true for any keyword.
    #[must_use]
    pub fn is_keyword(self) -> bool {
        KEYWORDS.iter().any(|(_, kind)| *kind == self)
    }

    /// Returns true for tokens made of word characters: identifiers and keywords.
    ///
    /// Keywords are accepted wherever a field name is expected, so `sort -count`
    /// or `where min > 3` parse.
    #[must_use]
    pub fn is_word(self) -> bool {
        self == Self::Identifier || self.is_keyword()
    }

    /// Returns true if a `/` or `-` after this token is an arithmetic operator.
    const fn ends_operand(self) -> bool {
        matches!(self, Self::Identifier | Self::Number | Self::RParen) || self.is_aggregation()
    }
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Eq => "'='",
            Self::NotEq => "'!='",
            Self::Lt => "'<'",
            Self::LtEq => "'<='",
            Self::Gt => "'>'",
            Self::GtEq => "'>='",
            Self::Tilde => "'~'",
            Self::Plus => "'+'",
            Self::Minus => "'-'",
            Self::Star => "'*'",
            Self::Slash => "'/'",
            Self::Pipe => "'|'",
            Self::Comma => "','",
            Self::LParen => "'('",
            Self::RParen => "')'",
            Self::Identifier => "identifier",
            Self::String => "string",
            Self::Number => "number",
            Self::Regex => "regular expression",
            Self::Eof => "end of query",
            keyword => {
                return match KEYWORDS.iter().find(|(_, kind)| kind == keyword) {
                    Some((name, _)) => write!(f, "'{}'", name.to_uppercase()),
                    None => write!(f, "{keyword:?}"),
                };
            }
        };
        write!(f, "{text}")
    }
}

/// A single lexical token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// The token kind.
    pub kind: TokenKind,
    /// The token text. Exact source text, except for strings and regexes which hold
    /// their content without delimiters.
    pub text: String,
    /// 1-based line of the first character.
    pub line: usize,
    /// 1-based column of the first character.
    pub column: usize,
}

impl Token {
    /// Creates a new token.
    #[must_use]
    pub fn new(kind: TokenKind, text: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            kind,
            text: text.into(),
            line,
            column,
        }
    }

    /// Column just past the last character of the token in the source.
    ///
    /// Only meaningful for tokens whose `text` is the exact source slice.
    #[must_use]
    pub fn end_column(&self) -> usize {
        self.column + self.text.chars().count()
    }
}

/// Error produced when the input cannot be tokenized.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message} at line {line}, column {column}")]
pub struct LexError {
    /// Human readable description.
    pub message: String,
    /// 1-based line of the offending character.
    pub line: usize,
    /// 1-based column of the offending character.
    pub column: usize,
}

/// Single-pass scanner with one character of lookahead.
pub struct Lexer {
    input: Vec<char>,
    position: usize,
    line: usize,
    column: usize,
    tokens: Vec<Token>,
}

impl Lexer {
    /// Creates a lexer over the given input.
    #[must_use]
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            position: 0,
            line: 1,
            column: 1,
            tokens: Vec::new(),
        }
    }

    /// Consumes the lexer and returns all tokens, terminated by an `Eof` token.
    ///
    /// # Errors
    ///
    /// Returns a [`LexError`] on an unterminated string or regex literal, a bare `!`,
    /// or any character outside the language.
    pub fn tokenize(mut self) -> Result<Vec<Token>, LexError> {
        loop {
            self.skip_whitespace_and_comments();
            let (line, column) = (self.line, self.column);

            let Some(ch) = self.peek() else {
                self.tokens.push(Token::new(TokenKind::Eof, "", line, column));
                break;
            };

            let token = match ch {
                '|' => self.single(TokenKind::Pipe),
                ',' => self.single(TokenKind::Comma),
                '(' => self.single(TokenKind::LParen),
                ')' => self.single(TokenKind::RParen),
                '*' => self.single(TokenKind::Star),
                '+' => self.single(TokenKind::Plus),
                '~' => self.single(TokenKind::Tilde),
                '=' => self.with_optional_eq(TokenKind::Eq, TokenKind::Eq),
                '<' => self.with_optional_eq(TokenKind::Lt, TokenKind::LtEq),
                '>' => self.with_optional_eq(TokenKind::Gt, TokenKind::GtEq),
                '!' => {
                    if self.peek_next() == Some('=') {
                        self.advance();
                        self.advance();
                        Token::new(TokenKind::NotEq, "!=", line, column)
                    } else {
                        return Err(self.error("Unexpected character '!' (did you mean '!='?)"));
                    }
                }
                '-' => {
                    let negative_number = self.peek_next().is_some_and(|c| c.is_ascii_digit())
                        && !self.previous_ends_operand();
                    if negative_number {
                        self.read_number()
                    } else {
                        self.single(TokenKind::Minus)
                    }
                }
                '/' => {
                    if self.previous_ends_operand() {
                        self.single(TokenKind::Slash)
                    } else {
                        self.read_regex()?
                    }
                }
                '"' | '\'' => self.read_string(ch)?,
                c if c.is_ascii_digit() => self.read_number(),
                c if c.is_alphabetic() || c == '_' => self.read_word(),
                c => return Err(self.error(&format!("Unexpected character '{c}'"))),
            };

            self.tokens.push(token);
        }

        tracing::trace!(tokens = self.tokens.len(), "Tokenized query");
        Ok(self.tokens)
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    fn peek_next(&self) -> Option<char> {
        self.input.get(self.position + 1).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.position += 1;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn error(&self, message: &str) -> LexError {
        LexError {
            message: message.to_string(),
            line: self.line,
            column: self.column,
        }
    }

    fn previous_ends_operand(&self) -> bool {
        self.tokens
            .last()
            .is_some_and(|token| token.kind.ends_operand())
    }

    fn skip_whitespace_and_comments(&mut self) {
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() {
                self.advance();
            } else if ch == '#' {
                while let Some(c) = self.peek() {
                    if c == '\n' {
                        break;
                    }
                    self.advance();
                }
            } else {
                break;
            }
        }
    }

    fn single(&mut self, kind: TokenKind) -> Token {
        let (line, column) = (self.line, self.column);
        let ch = self.advance().unwrap_or_default();
        Token::new(kind, ch.to_string(), line, column)
    }

    fn with_optional_eq(&mut self, plain: TokenKind, with_eq: TokenKind) -> Token {
        let (line, column) = (self.line, self.column);
        let mut text = String::new();
        text.extend(self.advance());
        if self.peek() == Some('=') {
            text.extend(self.advance());
            return Token::new(with_eq, text, line, column);
        }
        Token::new(plain, text, line, column)
    }

    fn read_word(&mut self) -> Token {
        let (line, column) = (self.line, self.column);
        let mut text = String::new();
        while let Some(ch) = self.peek() {
            if ch.is_alphanumeric() || ch == '_' || ch == '.' {
                text.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        let kind = TokenKind::keyword(&text).unwrap_or(TokenKind::Identifier);
        Token::new(kind, text, line, column)
    }

    fn read_number(&mut self) -> Token {
        let (line, column) = (self.line, self.column);
        let mut text = String::new();
        if self.peek() == Some('-') {
            text.extend(self.advance());
        }
        while let Some(ch) = self.peek() {
            let dot_continues =
                ch == '.' && self.peek_next().is_some_and(|c| c.is_ascii_digit() || c == '*');
            if ch.is_ascii_digit() || dot_continues {
                text.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        Token::new(TokenKind::Number, text, line, column)
    }

    fn read_string(&mut self, quote: char) -> Result<Token, LexError> {
        let (line, column) = (self.line, self.column);
        self.advance();

        let mut text = String::new();
        loop {
            match self.peek() {
                None => {
                    return Err(LexError {
                        message: "Unterminated string literal".to_string(),
                        line,
                        column,
                    })
                }
                Some(c) if c == quote => {
                    self.advance();
                    return Ok(Token::new(TokenKind::String, text, line, column));
                }
                Some('\\') if self.peek_next() == Some(quote) => {
                    self.advance();
                    self.advance();
                    text.push(quote);
                }
                Some(c) => {
                    self.advance();
                    text.push(c);
                }
            }
        }
    }

    fn read_regex(&mut self) -> Result<Token, LexError> {
        let (line, column) = (self.line, self.column);
        self.advance();

        let mut text = String::new();
        loop {
            match self.peek() {
                None => {
                    return Err(LexError {
                        message: "Unterminated regular expression".to_string(),
                        line,
                        column,
                    })
                }
                Some('/') => {
                    self.advance();
                    return Ok(Token::new(TokenKind::Regex, text, line, column));
                }
                Some('\\') if self.peek_next().is_some() => {
                    text.extend(self.advance());
                    text.extend(self.advance());
                }
                Some(c) => {
                    self.advance();
                    text.push(c);
                }
            }
        }
    }
}

/// Tokenizes a query string.
///
/// # Errors
///
/// Returns a [`LexError`] when the input contains a malformed token.
///
/// # Examples
///
/// ```
/// use spl::query::{tokenize, TokenKind};
///
/// let tokens = tokenize("search host=web").unwrap();
/// assert_eq!(tokens[0].kind, TokenKind::Search);
/// assert_eq!(tokens[1].kind, TokenKind::Identifier);
/// assert_eq!(tokens.last().unwrap().kind, TokenKind::Eof);
/// ```
pub fn tokenize(input: &str) -> Result<Vec<Token>, LexError> {
    Lexer::new(input).tokenize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize(input)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_keywords_case_insensitive() {
        for (word, kind) in KEYWORDS {
            for variant in [word.to_string(), word.to_uppercase()] {
                let tokens = tokenize(&variant).unwrap();
                assert_eq!(tokens[0].kind, *kind, "keyword {variant}");
                assert_eq!(tokens[0].text, variant);
            }
        }
    }

    #[test]
    fn test_keyword_prefix_stays_identifier() {
        for input in ["counter", "searching", "tables", "byte", "sorted", "ascii"] {
            let tokens = tokenize(input).unwrap();
            assert_eq!(tokens[0].kind, TokenKind::Identifier, "{input}");
            assert_eq!(tokens[0].text, input);
        }
    }

    #[test]
    fn test_identifier_keeps_case() {
        let tokens = tokenize("HostName").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Identifier);
        assert_eq!(tokens[0].text, "HostName");
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            kinds("= == != < <= > >= ~ + * , ( ) |"),
            vec![
                TokenKind::Eq,
                TokenKind::Eq,
                TokenKind::NotEq,
                TokenKind::Lt,
                TokenKind::LtEq,
                TokenKind::Gt,
                TokenKind::GtEq,
                TokenKind::Tilde,
                TokenKind::Plus,
                TokenKind::Star,
                TokenKind::Comma,
                TokenKind::LParen,
                TokenKind::RParen,
                TokenKind::Pipe,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_slash_after_operand_is_division() {
        assert_eq!(
            kinds("a / 2"),
            vec![
                TokenKind::Identifier,
                TokenKind::Slash,
                TokenKind::Number,
                TokenKind::Eof
            ]
        );
        assert_eq!(
            kinds("(a) / 2")[3],
            TokenKind::Slash,
            "slash after ')' is division"
        );
    }

    #[test]
    fn test_slash_after_operator_is_regex() {
        let tokens = tokenize(r"message ~ /err\/or\d+/").unwrap();
        assert_eq!(tokens[2].kind, TokenKind::Regex);
        assert_eq!(tokens[2].text, r"err\/or\d+");
    }

    #[test]
    fn test_minus_disambiguation() {
        let tokens = tokenize("x = -5").unwrap();
        assert_eq!(tokens[2].kind, TokenKind::Number);
        assert_eq!(tokens[2].text, "-5");

        assert_eq!(
            kinds("a -5"),
            vec![
                TokenKind::Identifier,
                TokenKind::Minus,
                TokenKind::Number,
                TokenKind::Eof
            ]
        );
        assert_eq!(
            kinds("sort -count"),
            vec![
                TokenKind::Sort,
                TokenKind::Minus,
                TokenKind::Count,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_dotted_number() {
        let tokens = tokenize("10.0.0.1 1.5").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Number);
        assert_eq!(tokens[0].text, "10.0.0.1");
        assert_eq!(tokens[1].text, "1.5");
    }

    #[test]
    fn test_string_escapes_only_delimiter() {
        let tokens = tokenize(r#""say \"hi\" \n""#).unwrap();
        assert_eq!(tokens[0].kind, TokenKind::String);
        assert_eq!(tokens[0].text, r#"say "hi" \n"#);

        let tokens = tokenize(r"'it\'s'").unwrap();
        assert_eq!(tokens[0].text, "it's");
    }

    #[test]
    fn test_comments_discarded() {
        assert_eq!(
            kinds("search # everything after is ignored\nhost"),
            vec![TokenKind::Search, TokenKind::Identifier, TokenKind::Eof]
        );
    }

    #[test]
    fn test_positions_point_at_token_start() {
        let tokens = tokenize("search host=web\n  | head 5").unwrap();
        assert_eq!((tokens[0].line, tokens[0].column), (1, 1));
        assert_eq!((tokens[1].line, tokens[1].column), (1, 8));
        assert_eq!((tokens[2].line, tokens[2].column), (1, 12));
        assert_eq!((tokens[3].line, tokens[3].column), (1, 13));
        assert_eq!((tokens[4].line, tokens[4].column), (2, 3));
        assert_eq!((tokens[5].line, tokens[5].column), (2, 5));
        assert_eq!((tokens[6].line, tokens[6].column), (2, 10));
        assert_eq!(tokens[7].kind, TokenKind::Eof);
        assert_eq!((tokens[7].line, tokens[7].column), (2, 11));
    }

    #[test]
    fn test_unterminated_string() {
        let err = tokenize("search msg=\"oops").unwrap_err();
        assert_eq!(err.message, "Unterminated string literal");
        assert_eq!((err.line, err.column), (1, 12));
    }

    #[test]
    fn test_unterminated_regex() {
        let err = tokenize("search msg~/abc").unwrap_err();
        assert_eq!(err.message, "Unterminated regular expression");
        assert_eq!(err.column, 12);
    }

    #[test]
    fn test_bare_bang_is_error() {
        let err = tokenize("search !host").unwrap_err();
        assert!(err.message.contains('!'));
        assert_eq!(err.column, 8);
    }

    #[test]
    fn test_unknown_character() {
        let err = tokenize("search host=a & b").unwrap_err();
        assert_eq!(err.message, "Unexpected character '&'");
        assert_eq!((err.line, err.column), (1, 15));
    }

    #[test]
    fn test_display_includes_position() {
        let err = tokenize("a ;").unwrap_err();
        assert_eq!(err.to_string(), "Unexpected character ';' at line 1, column 3");
    }
}
