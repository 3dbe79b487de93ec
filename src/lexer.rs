//! Lexical analyzer: source text to token stream
//!
//! The lexer walks a character buffer with a single cursor, classifying at
//! each position in priority order: whitespace, comments, preprocessor
//! directives, numeric literals, character/string literals, identifiers and
//! keywords, then operators under the longest-match rule. The output is a
//! finite token list terminated by exactly one `Eof` token.
//!
//! Errors are fail-fast: the first malformed construct aborts tokenization
//! with a [`LexerError`] carrying the offending source position.

use crate::token::{Token, TokenKind, keyword_kind};
use thiserror::Error;

/// Error raised for lexical analysis failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Lexer error at {line}:{column}: {message}")]
pub struct LexerError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

pub struct Lexer {
    chars: Vec<char>,
    position: usize,
    line: usize,
    column: usize,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Lexer {
            chars: source.chars().collect(),
            position: 0,
            line: 1,
            column: 1,
        }
    }

    /// Tokenize the entire source and return the token list,
    /// terminated by a single `Eof` token.
    pub fn tokenize(mut self) -> Result<Vec<Token>, LexerError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let is_eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if is_eof {
                break;
            }
        }
        Ok(tokens)
    }

    fn error<T>(&self, message: impl Into<String>) -> Result<T, LexerError> {
        Err(LexerError {
            message: message.into(),
            line: self.line,
            column: self.column,
        })
    }

    fn current(&self) -> Option<char> {
        self.chars.get(self.position).copied()
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.chars.get(self.position + offset).copied()
    }

    fn advance(&mut self) {
        if self.current() == Some('\n') {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        self.position += 1;
    }

    fn skip_whitespace(&mut self) {
        while self.current().is_some_and(|c| c.is_whitespace()) {
            self.advance();
        }
    }

    fn skip_single_line_comment(&mut self) {
        // Skip to end of line; the newline itself is consumed too
        while let Some(c) = self.current() {
            if c == '\n' {
                self.advance();
                return;
            }
            self.advance();
        }
    }

    fn skip_multi_line_comment(&mut self) -> Result<(), LexerError> {
        let start_line = self.line;
        let start_column = self.column;
        self.advance(); // /
        self.advance(); // *

        while self.current().is_some() {
            if self.current() == Some('*') && self.peek(1) == Some('/') {
                self.advance();
                self.advance();
                return Ok(());
            }
            self.advance();
        }

        self.error(format!(
            "Unterminated comment starting at {}:{}",
            start_line, start_column
        ))
    }

    /// Read a preprocessor directive: everything up to an unescaped
    /// newline, with backslash-newline continuation.
    fn read_preprocessor(&mut self) -> Token {
        let start_line = self.line;
        let start_column = self.column;
        let mut directive = String::new();

        while let Some(c) = self.current() {
            if c == '\\' && self.peek(1) == Some('\n') {
                directive.push(c);
                self.advance();
                directive.push('\n');
                self.advance();
            } else if c == '\n' {
                break;
            } else {
                directive.push(c);
                self.advance();
            }
        }

        Token::new(TokenKind::Preprocessor, directive, start_line, start_column)
    }

    /// Consume a run of digits matching `accepts`, appending them to the
    /// lexeme. Digit separators (`'`) are consumed but not appended.
    fn read_digit_run(&mut self, lexeme: &mut String, accepts: impl Fn(char) -> bool) {
        while let Some(c) = self.current() {
            if !accepts(c) && c != '\'' {
                break;
            }
            if c != '\'' {
                lexeme.push(c);
            }
            self.advance();
        }
    }

    /// Consume a run of type-suffix characters.
    fn read_suffix_run(&mut self, lexeme: &mut String, suffixes: &str) {
        while let Some(c) = self.current() {
            if !suffixes.contains(c) {
                break;
            }
            lexeme.push(c);
            self.advance();
        }
    }

    /// Read an integer or floating-point literal. Digit separators (`'`)
    /// are permitted inside digit runs and stripped from the lexeme.
    fn read_number(&mut self) -> Result<Token, LexerError> {
        let start_line = self.line;
        let start_column = self.column;
        let mut lexeme = String::new();

        // Hexadecimal: 0x / 0X
        if self.current() == Some('0') && matches!(self.peek(1), Some('x') | Some('X')) {
            lexeme.push('0');
            self.advance();
            if let Some(marker) = self.current() {
                lexeme.push(marker);
            }
            self.advance();

            if !self.current().is_some_and(|c| c.is_ascii_hexdigit()) {
                return self.error("Invalid hexadecimal literal");
            }
            self.read_digit_run(&mut lexeme, |c| c.is_ascii_hexdigit());
            self.read_suffix_run(&mut lexeme, "uUlL");
            return Ok(Token::new(TokenKind::Integer, lexeme, start_line, start_column));
        }

        // Binary: 0b / 0B
        if self.current() == Some('0') && matches!(self.peek(1), Some('b') | Some('B')) {
            lexeme.push('0');
            self.advance();
            if let Some(marker) = self.current() {
                lexeme.push(marker);
            }
            self.advance();

            if !matches!(self.current(), Some('0') | Some('1')) {
                return self.error("Invalid binary literal");
            }
            self.read_digit_run(&mut lexeme, |c| c == '0' || c == '1');
            self.read_suffix_run(&mut lexeme, "uUlL");
            return Ok(Token::new(TokenKind::Integer, lexeme, start_line, start_column));
        }

        // Octal: leading 0 followed by a digit
        if self.current() == Some('0') && self.peek(1).is_some_and(|c| c.is_ascii_digit()) {
            lexeme.push('0');
            self.advance();

            self.read_digit_run(&mut lexeme, |c| ('0'..='7').contains(&c));
            self.read_suffix_run(&mut lexeme, "uUlL");
            return Ok(Token::new(TokenKind::Integer, lexeme, start_line, start_column));
        }

        let mut is_float = false;

        // Integer part
        self.read_digit_run(&mut lexeme, |c| c.is_ascii_digit());

        // Fractional part: '.' followed by a digit or exponent marker
        if self.current() == Some('.')
            && self
                .peek(1)
                .is_some_and(|c| c.is_ascii_digit() || c == 'e' || c == 'E')
        {
            is_float = true;
            lexeme.push('.');
            self.advance();
            self.read_digit_run(&mut lexeme, |c| c.is_ascii_digit());
        }

        // Exponent
        if let Some(marker @ ('e' | 'E')) = self.current() {
            is_float = true;
            lexeme.push(marker);
            self.advance();

            if let Some(sign @ ('+' | '-')) = self.current() {
                lexeme.push(sign);
                self.advance();
            }

            if !self.current().is_some_and(|c| c.is_ascii_digit()) {
                return self.error("Invalid exponent in floating-point literal");
            }
            self.read_digit_run(&mut lexeme, |c| c.is_ascii_digit());
        }

        // Suffixes: f|F|l|L for floats, one or more of u|U|l|L for integers
        if is_float {
            if let Some(suffix) = self.current().filter(|c| "fFlL".contains(*c)) {
                lexeme.push(suffix);
                self.advance();
            }
        } else if let Some(suffix @ ('f' | 'F')) = self.current() {
            is_float = true;
            lexeme.push(suffix);
            self.advance();
        } else {
            self.read_suffix_run(&mut lexeme, "uUlL");
        }

        let kind = if is_float {
            TokenKind::FloatLiteral
        } else {
            TokenKind::Integer
        };
        Ok(Token::new(kind, lexeme, start_line, start_column))
    }

    /// Read a character literal: one character or one escape sequence.
    fn read_char_literal(&mut self) -> Result<Token, LexerError> {
        let start_line = self.line;
        let start_column = self.column;
        let mut lexeme = String::from('\'');
        self.advance();

        match self.current() {
            None => return self.error("Unterminated character literal"),
            Some('\\') => {
                lexeme.push('\\');
                self.advance();
                match self.current() {
                    None => return self.error("Unterminated character literal"),
                    Some(c) => {
                        lexeme.push(c);
                        self.advance();
                    }
                }
            }
            Some('\'') => return self.error("Empty character literal"),
            Some(c) => {
                lexeme.push(c);
                self.advance();
            }
        }

        if self.current() != Some('\'') {
            return self.error("Unterminated character literal");
        }
        lexeme.push('\'');
        self.advance();

        Ok(Token::new(
            TokenKind::CharLiteral,
            lexeme,
            start_line,
            start_column,
        ))
    }

    /// Read a string literal. A literal newline inside the string is an error.
    fn read_string_literal(&mut self) -> Result<Token, LexerError> {
        let start_line = self.line;
        let start_column = self.column;
        let mut lexeme = String::from('"');
        self.advance();

        while let Some(c) = self.current() {
            if c == '"' {
                break;
            }
            if c == '\\' {
                lexeme.push(c);
                self.advance();
                match self.current() {
                    None => return self.error("Unterminated string literal"),
                    Some(escaped) => {
                        lexeme.push(escaped);
                        self.advance();
                    }
                }
            } else if c == '\n' {
                return self.error("Unterminated string literal (newline in string)");
            } else {
                lexeme.push(c);
                self.advance();
            }
        }

        if self.current().is_none() {
            return self.error("Unterminated string literal");
        }
        lexeme.push('"');
        self.advance();

        Ok(Token::new(
            TokenKind::StringLiteral,
            lexeme,
            start_line,
            start_column,
        ))
    }

    fn read_identifier(&mut self) -> Token {
        let start_line = self.line;
        let start_column = self.column;
        let mut ident = String::new();

        while let Some(c) = self.current() {
            if !c.is_alphanumeric() && c != '_' {
                break;
            }
            ident.push(c);
            self.advance();
        }

        let kind = keyword_kind(&ident).unwrap_or(TokenKind::Identifier);
        Token::new(kind, ident, start_line, start_column)
    }

    fn next_token(&mut self) -> Result<Token, LexerError> {
        while let Some(c) = self.current() {
            if c.is_whitespace() {
                self.skip_whitespace();
                continue;
            }

            if c == '#' {
                return Ok(self.read_preprocessor());
            }

            if c == '/' {
                if self.peek(1) == Some('/') {
                    self.skip_single_line_comment();
                    continue;
                }
                if self.peek(1) == Some('*') {
                    self.skip_multi_line_comment()?;
                    continue;
                }
            }

            if c.is_ascii_digit() {
                return self.read_number();
            }

            if c == '\'' {
                return self.read_char_literal();
            }

            if c == '"' {
                return self.read_string_literal();
            }

            if c.is_alphabetic() || c == '_' {
                return Ok(self.read_identifier());
            }

            return self.read_operator(c);
        }

        Ok(Token::new(TokenKind::Eof, "", self.line, self.column))
    }

    /// Read an operator or delimiter under the longest-match rule:
    /// three-character forms first, then two, then one.
    fn read_operator(&mut self, c0: char) -> Result<Token, LexerError> {
        let start_line = self.line;
        let start_column = self.column;

        let c1 = self.peek(1);
        let c2 = self.peek(2);

        if let (Some(c1), Some(c2)) = (c1, c2) {
            let three: String = [c0, c1, c2].iter().collect();
            let kind = match three.as_str() {
                "<=>" => Some(TokenKind::Spaceship),
                "..." => Some(TokenKind::Ellipsis),
                ">>=" => Some(TokenKind::RightShiftAssign),
                "<<=" => Some(TokenKind::LeftShiftAssign),
                "->*" => Some(TokenKind::ArrowStar),
                _ => None,
            };
            if let Some(kind) = kind {
                self.advance();
                self.advance();
                self.advance();
                return Ok(Token::new(kind, three, start_line, start_column));
            }
        }

        if let Some(c1) = c1 {
            let two: String = [c0, c1].iter().collect();
            let kind = match two.as_str() {
                "==" => Some(TokenKind::Equal),
                "!=" => Some(TokenKind::NotEqual),
                "<=" => Some(TokenKind::LessEqual),
                ">=" => Some(TokenKind::GreaterEqual),
                "&&" => Some(TokenKind::LogicalAnd),
                "||" => Some(TokenKind::LogicalOr),
                "++" => Some(TokenKind::Increment),
                "--" => Some(TokenKind::Decrement),
                "->" => Some(TokenKind::Arrow),
                "::" => Some(TokenKind::Scope),
                "<<" => Some(TokenKind::LeftShift),
                ">>" => Some(TokenKind::RightShift),
                "+=" => Some(TokenKind::PlusAssign),
                "-=" => Some(TokenKind::MinusAssign),
                "*=" => Some(TokenKind::MultiplyAssign),
                "/=" => Some(TokenKind::DivideAssign),
                "%=" => Some(TokenKind::ModuloAssign),
                "&=" => Some(TokenKind::AndAssign),
                "|=" => Some(TokenKind::OrAssign),
                "^=" => Some(TokenKind::XorAssign),
                ".*" => Some(TokenKind::DotStar),
                _ => None,
            };
            if let Some(kind) = kind {
                self.advance();
                self.advance();
                return Ok(Token::new(kind, two, start_line, start_column));
            }
        }

        let kind = match c0 {
            '+' => Some(TokenKind::Plus),
            '-' => Some(TokenKind::Minus),
            '*' => Some(TokenKind::Multiply),
            '/' => Some(TokenKind::Divide),
            '%' => Some(TokenKind::Modulo),
            '=' => Some(TokenKind::Assign),
            '<' => Some(TokenKind::LessThan),
            '>' => Some(TokenKind::GreaterThan),
            '!' => Some(TokenKind::LogicalNot),
            '&' => Some(TokenKind::BitwiseAnd),
            '|' => Some(TokenKind::BitwiseOr),
            '^' => Some(TokenKind::BitwiseXor),
            '~' => Some(TokenKind::BitwiseNot),
            '.' => Some(TokenKind::Dot),
            '(' => Some(TokenKind::LParen),
            ')' => Some(TokenKind::RParen),
            '{' => Some(TokenKind::LBrace),
            '}' => Some(TokenKind::RBrace),
            '[' => Some(TokenKind::LBracket),
            ']' => Some(TokenKind::RBracket),
            ';' => Some(TokenKind::Semicolon),
            ',' => Some(TokenKind::Comma),
            ':' => Some(TokenKind::Colon),
            '?' => Some(TokenKind::Question),
            _ => None,
        };

        if let Some(kind) = kind {
            self.advance();
            return Ok(Token::new(kind, c0.to_string(), start_line, start_column));
        }

        self.advance();
        Err(LexerError {
            message: format!("Invalid character: '{}'", c0),
            line: start_line,
            column: start_column,
        })
    }
}

/// Tokenize a source string.
pub fn tokenize(source: &str) -> Result<Vec<Token>, LexerError> {
    Lexer::new(source).tokenize()
}
