use std::{
    collections::{BTreeMap, VecDeque},
    str::Chars,
};

use itertools::{PeekNth, peek_nth};
use once_cell::sync::Lazy;
use strum::EnumString;
use thiserror::Error;

use crate::frontend::SourceFile;

#[derive(Debug)]
pub struct Lexer<'source> {
    source: &'source SourceFile,
    position: usize,
    chars: PeekNth<Chars<'source>>,
    peek_buffer: VecDeque<Token>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /* Words */
    Keyword(Keyword), // while
    Identifier,       // counter

    /* Literals */
    BooleanLiteral, // true
    IntegerLiteral, // 1
    FloatLiteral,   // 1.0
    StringLiteral,  // "hello, world"

    /* Delimiters */
    OpenParen,    // (
    CloseParen,   // )
    OpenBracket,  // [
    CloseBracket, // ]
    OpenBrace,    // {
    CloseBrace,   // }
    Semicolon,    // ;
    Comma,        // ,
    Question,     // ?
    Colon,        // :

    /* Unary Ops */
    Bang,       // !
    PlusPlus,   // ++
    MinusMinus, // --

    /* Unary + Binary Ops */
    Minus, // -

    /* Binary Ops */
    Plus,                 // +
    Asterisk,             // *
    Divide,               // /
    LogicalAnd,           // &&
    LogicalOr,            // ||
    DoubleEquals,         // ==
    NotEquals,            // !=
    LessThan,             // <
    LessThanOrEqualTo,    // <=
    GreaterThan,          // >
    GreaterThanOrEqualTo, // >=

    /* Assignment */
    Equals,      // =
    PlusEquals,  // +=
    MinusEquals, // -=
}

impl TokenKind {
    pub fn is_assignment_operator(&self) -> bool {
        matches!(self, Self::Equals | Self::PlusEquals | Self::MinusEquals)
    }

    pub fn is_type_keyword(&self) -> bool {
        matches!(
            self,
            Self::Keyword(
                Keyword::Int | Keyword::Float | Keyword::String | Keyword::Bool | Keyword::List
            )
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum Keyword {
    Int,
    Float,
    String,
    Bool,
    List,
    If,
    Else,
    While,
    For,
    Print,
}

/// Table of single char tokens (matched after longer sequences are checked for)
static SINGLE_TOKENS: Lazy<BTreeMap<char, TokenKind>> = Lazy::new(|| {
    BTreeMap::from([
        ('(', TokenKind::OpenParen),
        (')', TokenKind::CloseParen),
        ('[', TokenKind::OpenBracket),
        (']', TokenKind::CloseBracket),
        ('{', TokenKind::OpenBrace),
        ('}', TokenKind::CloseBrace),
        (';', TokenKind::Semicolon),
        (',', TokenKind::Comma),
        ('?', TokenKind::Question),
        (':', TokenKind::Colon),
        ('!', TokenKind::Bang),
        ('*', TokenKind::Asterisk),
        ('-', TokenKind::Minus),
        ('=', TokenKind::Equals),
        ('+', TokenKind::Plus),
        ('/', TokenKind::Divide),
        ('<', TokenKind::LessThan),
        ('>', TokenKind::GreaterThan),
    ])
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

/// A lexical or grammatical error in the source text
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct SyntaxError {
    pub message: String,
    pub span: Span,
}

impl SyntaxError {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }
}

impl<'source> Lexer<'source> {
    pub fn new(source: &'source SourceFile) -> Self {
        Self {
            source,
            chars: peek_nth(source.contents.chars()),
            position: 0,
            peek_buffer: VecDeque::new(),
        }
    }

    pub fn source(&self) -> &'source SourceFile {
        self.source
    }

    /// Span pointing just past the last character of the source
    pub fn eof_span(&self) -> Span {
        let end = self.source.contents.len();
        Span::new(end, end)
    }

    /// Consumes one character, keeping `position` a byte offset
    fn advance(&mut self) {
        if let Some(c) = self.chars.next() {
            self.position += c.len_utf8();
        }
    }

    fn ignore_whitespace(&mut self) {
        while let Some(c) = self.chars.peek().copied() {
            if !c.is_ascii_whitespace() {
                break;
            }

            self.advance();
        }
    }

    fn ignore_line(&mut self) {
        while let Some(c) = self.chars.peek().copied() {
            if c == '\n' {
                break;
            }

            self.advance();
        }
    }

    fn read_string(&mut self) -> Result<Token, SyntaxError> {
        let start_position = self.position;

        // Opening quote
        self.advance();

        while let Some(c) = self.chars.peek().copied() {
            if c == '\n' {
                return Err(SyntaxError::new(
                    "Reached end of line while reading string literal",
                    self.new_span(start_position),
                ));
            }

            self.advance();

            // Escaped quotes do not terminate the literal
            if c == '\\' && self.chars.peek().is_some_and(|c| *c == '"') {
                self.advance();
                continue;
            }

            if c == '"' {
                return Ok(Token {
                    kind: TokenKind::StringLiteral,
                    span: self.new_span(start_position),
                });
            }
        }

        Err(SyntaxError::new(
            "Reached end of file while reading string literal",
            self.new_span(start_position),
        ))
    }

    // Keyword, identifier, or boolean literal
    fn read_word(&mut self) -> Token {
        let start_position = self.position;

        while let Some(c) = self.chars.peek().copied() {
            if !(c.is_ascii_alphanumeric() || c == '_') {
                break;
            }

            self.advance();
        }

        let span = self.new_span(start_position);
        let value = self.source.value_of_span(span);

        let kind = if let Ok(keyword) = value.parse() {
            TokenKind::Keyword(keyword)
        } else {
            match value {
                "true" | "false" => TokenKind::BooleanLiteral,
                _ => TokenKind::Identifier,
            }
        };

        Token { kind, span }
    }

    fn read_number(&mut self) -> Token {
        let start_position = self.position;
        let mut kind = TokenKind::IntegerLiteral;

        while let Some(c) = self.chars.peek().copied() {
            // Only a dot followed by a digit starts a fractional part
            if c == '.' && self.chars.peek_nth(1).is_some_and(|c| c.is_ascii_digit()) {
                kind = TokenKind::FloatLiteral;
                self.advance();
                continue;
            }

            if !c.is_ascii_digit() {
                break;
            }

            self.advance();
        }

        Token {
            kind,
            span: self.new_span(start_position),
        }
    }

    fn read_single(&mut self, kind: TokenKind) -> Token {
        let start_position = self.position;

        self.advance();

        Token {
            kind,
            span: self.new_span(start_position),
        }
    }

    fn read_double(&mut self, kind: TokenKind) -> Token {
        let start_position = self.position;

        self.advance();
        self.advance();

        Token {
            kind,
            span: self.new_span(start_position),
        }
    }

    fn new_span(&self, start: usize) -> Span {
        Span {
            start,
            end: self.position,
        }
    }

    fn second_is(&mut self, expected: char) -> bool {
        self.chars.peek_nth(1).is_some_and(|c| *c == expected)
    }

    pub fn peek(&mut self) -> Result<Option<Token>, SyntaxError> {
        if let Some(token) = self.peek_buffer.front() {
            return Ok(Some(*token));
        }

        if let Some(token) = self.lex_token()? {
            self.peek_buffer.push_back(token);
        }

        Ok(self.peek_buffer.front().copied())
    }

    pub fn next(&mut self) -> Result<Option<Token>, SyntaxError> {
        if let Some(token) = self.peek_buffer.pop_front() {
            return Ok(Some(token));
        }

        self.lex_token()
    }

    fn lex_token(&mut self) -> Result<Option<Token>, SyntaxError> {
        while let Some(c) = self.chars.peek().copied() {
            if !c.is_ascii() {
                return Err(SyntaxError::new(
                    format!("Unexpected non-ascii character in stream: `{c}`"),
                    Span::new(self.position, self.position + c.len_utf8()),
                ));
            }

            let token = match c {
                // Ignore whitespace
                c if c.is_ascii_whitespace() => {
                    self.ignore_whitespace();
                    continue;
                }
                // Ignore comments
                '/' if self.second_is('/') => {
                    self.ignore_line();
                    continue;
                }

                '"' => self.read_string()?,

                // Integer and float literals
                n if n.is_ascii_digit() => self.read_number(),

                // Identifiers, keywords, and boolean literals
                a if a.is_ascii_alphabetic() || a == '_' => self.read_word(),

                '=' if self.second_is('=') => self.read_double(TokenKind::DoubleEquals),
                '!' if self.second_is('=') => self.read_double(TokenKind::NotEquals),
                '<' if self.second_is('=') => self.read_double(TokenKind::LessThanOrEqualTo),
                '>' if self.second_is('=') => {
                    self.read_double(TokenKind::GreaterThanOrEqualTo)
                }
                '+' if self.second_is('=') => self.read_double(TokenKind::PlusEquals),
                '-' if self.second_is('=') => self.read_double(TokenKind::MinusEquals),
                '+' if self.second_is('+') => self.read_double(TokenKind::PlusPlus),
                '-' if self.second_is('-') => self.read_double(TokenKind::MinusMinus),
                '&' if self.second_is('&') => self.read_double(TokenKind::LogicalAnd),
                '|' if self.second_is('|') => self.read_double(TokenKind::LogicalOr),

                s if SINGLE_TOKENS.contains_key(&s) => self.read_single(SINGLE_TOKENS[&s]),
                c => {
                    return Err(SyntaxError::new(
                        format!("Unexpected character in stream: `{c}`"),
                        Span::new(self.position, self.position + 1),
                    ));
                }
            };

            return Ok(Some(token));
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let source = SourceFile::in_memory(source);
        let mut lexer = Lexer::new(&source);
        let mut kinds = Vec::new();

        while let Some(token) = lexer.next().unwrap() {
            kinds.push(token.kind);
        }

        kinds
    }

    #[test]
    fn lexes_declaration() {
        assert_eq!(
            kinds("int x = 42;"),
            vec![
                TokenKind::Keyword(Keyword::Int),
                TokenKind::Identifier,
                TokenKind::Equals,
                TokenKind::IntegerLiteral,
                TokenKind::Semicolon,
            ]
        );
    }

    #[test]
    fn prefers_longest_operator() {
        assert_eq!(
            kinds("i++ += -- <= != && || == -"),
            vec![
                TokenKind::Identifier,
                TokenKind::PlusPlus,
                TokenKind::PlusEquals,
                TokenKind::MinusMinus,
                TokenKind::LessThanOrEqualTo,
                TokenKind::NotEquals,
                TokenKind::LogicalAnd,
                TokenKind::LogicalOr,
                TokenKind::DoubleEquals,
                TokenKind::Minus,
            ]
        );
    }

    #[test]
    fn lexes_literals_and_skips_comments() {
        assert_eq!(
            kinds("3.25 7 true \"a \\\" b\" // trailing comment\nfalse"),
            vec![
                TokenKind::FloatLiteral,
                TokenKind::IntegerLiteral,
                TokenKind::BooleanLiteral,
                TokenKind::StringLiteral,
                TokenKind::BooleanLiteral,
            ]
        );
    }

    #[test]
    fn peek_does_not_consume() {
        let source = SourceFile::in_memory("print(x);");
        let mut lexer = Lexer::new(&source);

        let peeked = lexer.peek().unwrap().unwrap();
        assert_eq!(peeked.kind, TokenKind::Keyword(Keyword::Print));
        assert_eq!(lexer.next().unwrap(), Some(peeked));
        assert_eq!(lexer.next().unwrap().unwrap().kind, TokenKind::OpenParen);
    }

    #[test]
    fn reports_unterminated_string() {
        let source = SourceFile::in_memory("string s = \"abc");
        let mut lexer = Lexer::new(&source);

        let error = loop {
            match lexer.next() {
                Ok(Some(_)) => continue,
                Ok(None) => panic!("expected an error"),
                Err(error) => break error,
            }
        };

        assert_eq!(error.span.start, 11);
        assert!(error.message.contains("end of file"));
    }

    #[test]
    fn spans_are_byte_offsets() {
        let source = SourceFile::in_memory("\"héllo\" x");
        let mut lexer = Lexer::new(&source);

        let string = lexer.next().unwrap().unwrap();
        assert_eq!(source.value_of_span(string.span), "\"héllo\"");
        assert_eq!(lexer.next().unwrap().unwrap().span, Span::new(9, 10));
    }

    #[test]
    fn reports_unexpected_character() {
        let source = SourceFile::in_memory("x @ y");
        let mut lexer = Lexer::new(&source);

        assert!(lexer.next().unwrap().is_some());
        let error = lexer.next().unwrap_err();
        assert_eq!(error.span, Span::new(2, 3));
    }
}
