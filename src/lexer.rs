use thiserror::Error;

pub mod token;

use self::token::{Span, Token, TokenKind};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LexError {
    #[error("Unterminated string literal at position {position}")]
    UnterminatedString { position: usize },
    #[error("Unrecognized escape sequence '\\{escape}' at position {position}")]
    UnrecognizedEscape { escape: char, position: usize },
    #[error("Line break inside string literal at position {position}")]
    LineBreakInString { position: usize },
    #[error("Invalid integer literal '{literal}' at position {position}")]
    InvalidIntegerLiteral { literal: String, position: usize },
    #[error("Unexpected character '{character}' at position {position}")]
    UnexpectedCharacter { character: char, position: usize },
    #[error("Expected {expected}, got {found} at line {line}, column {column}")]
    UnexpectedToken {
        expected: String,
        found: String,
        line: usize,
        column: usize,
    },
}

pub type LexResult<T> = Result<T, LexError>;

/// Tokenizes the whole input up front and then acts as a cursor over the
/// token buffer. The `expect_*` helpers are the parser's only way to consume
/// tokens.
#[derive(Debug)]
pub struct Lexer<'a> {
    input: &'a str,
    pos: usize,
    line: usize,
    line_start: usize,
    prev_indent: usize,
    tokens: Vec<Token<'a>>,
    cursor: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> LexResult<Self> {
        let mut lexer = Self {
            input,
            pos: 0,
            line: 1,
            line_start: 0,
            prev_indent: 0,
            tokens: Vec::new(),
            cursor: 0,
        };
        lexer.tokenize_all()?;
        Ok(lexer)
    }

    fn tokenize_all(&mut self) -> LexResult<()> {
        self.process_indent();
        while let Some(c) = self.peek_char() {
            self.process_next_token(c)?;
        }
        if self
            .tokens
            .last()
            .is_some_and(|token| !matches!(token.kind, TokenKind::Newline | TokenKind::Dedent))
        {
            self.push_token(TokenKind::Newline);
        }
        while self.prev_indent > 0 {
            self.prev_indent -= 1;
            self.push_token(TokenKind::Dedent);
        }
        self.push_token(TokenKind::Eof);
        Ok(())
    }

    fn process_next_token(&mut self, c: char) -> LexResult<()> {
        match c {
            '\n' => {
                self.process_newline();
                self.consume_char();
                self.line += 1;
                self.line_start = self.pos;
                self.process_indent();
            }
            ' ' => {
                self.consume_char();
            }
            '#' => self.skip_comment(),
            '\'' | '"' => self.read_string(c)?,
            c if c.is_ascii_digit() => self.read_number()?,
            c if c == '_' || c.is_ascii_alphabetic() => self.read_word(),
            c if c.is_ascii_punctuation() => self.read_operator(c),
            c => {
                return Err(LexError::UnexpectedCharacter {
                    character: c,
                    position: self.pos,
                });
            }
        }
        Ok(())
    }

    /// Measures leading spaces at a line start and emits the Indent/Dedent
    /// delta against the previous line's level. Two spaces per level; only
    /// blank lines leave the level untouched.
    fn process_indent(&mut self) {
        let spaces = self.consume_while(|c| c == ' ');
        if matches!(self.peek_char(), Some('\n') | None) {
            return;
        }
        let indent = spaces / 2;
        while indent > self.prev_indent {
            self.prev_indent += 1;
            self.push_token(TokenKind::Indent);
        }
        while indent < self.prev_indent {
            self.prev_indent -= 1;
            self.push_token(TokenKind::Dedent);
        }
    }

    // A Newline is emitted only for lines that produced tokens, so blank
    // lines collapse.
    fn process_newline(&mut self) {
        if self
            .tokens
            .last()
            .is_some_and(|token| !matches!(token.kind, TokenKind::Newline))
        {
            self.push_token(TokenKind::Newline);
        }
    }

    fn skip_comment(&mut self) {
        self.consume_while(|c| c != '\n');
    }

    fn read_word(&mut self) {
        let start = self.pos;
        self.consume_while(|c| c == '_' || c.is_ascii_alphanumeric());
        let word = &self.input[start..self.pos];
        let kind = match word {
            "class" => TokenKind::Class,
            "return" => TokenKind::Return,
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "def" => TokenKind::Def,
            "print" => TokenKind::Print,
            "and" => TokenKind::And,
            "or" => TokenKind::Or,
            "not" => TokenKind::Not,
            "None" => TokenKind::None,
            "True" => TokenKind::True,
            "False" => TokenKind::False,
            _ => TokenKind::Id(word),
        };
        self.push_spanned(kind, start);
    }

    fn read_number(&mut self) -> LexResult<()> {
        let start = self.pos;
        self.consume_while(|c| c.is_ascii_digit());
        let literal = &self.input[start..self.pos];
        let value = literal
            .parse::<i64>()
            .map_err(|_| LexError::InvalidIntegerLiteral {
                literal: literal.to_string(),
                position: start,
            })?;
        self.push_spanned(TokenKind::Number(value), start);
        Ok(())
    }

    fn read_string(&mut self, delimiter: char) -> LexResult<()> {
        let start = self.pos;
        self.consume_char();
        let mut value = String::new();
        loop {
            let Some(c) = self.consume_char() else {
                return Err(LexError::UnterminatedString { position: start });
            };
            if c == delimiter {
                break;
            }
            match c {
                '\\' => {
                    let Some(escaped) = self.consume_char() else {
                        return Err(LexError::UnterminatedString { position: start });
                    };
                    match escaped {
                        'n' => value.push('\n'),
                        't' => value.push('\t'),
                        'r' => value.push('\r'),
                        '\'' => value.push('\''),
                        '"' => value.push('"'),
                        '\\' => value.push('\\'),
                        other => {
                            return Err(LexError::UnrecognizedEscape {
                                escape: other,
                                position: self.pos,
                            });
                        }
                    }
                }
                '\n' | '\r' => {
                    return Err(LexError::LineBreakInString { position: self.pos });
                }
                other => value.push(other),
            }
        }
        self.push_spanned(TokenKind::String(value), start);
        Ok(())
    }

    // One character of lookahead pairs `== != <= >=`; everything else is a
    // verbatim Char token.
    fn read_operator(&mut self, c: char) {
        let start = self.pos;
        self.consume_char();
        let compound = match (c, self.peek_char()) {
            ('=', Some('=')) => Some(TokenKind::Eq),
            ('!', Some('=')) => Some(TokenKind::NotEq),
            ('<', Some('=')) => Some(TokenKind::LessOrEq),
            ('>', Some('=')) => Some(TokenKind::GreaterOrEq),
            _ => None,
        };
        if let Some(kind) = compound {
            self.consume_char();
            self.push_spanned(kind, start);
        } else {
            self.push_spanned(TokenKind::Char(c), start);
        }
    }

    fn consume_while<P>(&mut self, keep: P) -> usize
    where
        P: Fn(char) -> bool,
    {
        let start = self.pos;
        while let Some(c) = self.peek_char() {
            if !keep(c) {
                break;
            }
            self.consume_char();
        }
        self.pos - start
    }

    fn peek_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn consume_char(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn push_token(&mut self, kind: TokenKind<'a>) {
        let span = self.span_at(self.pos, self.pos);
        self.tokens.push(Token::new(kind, span));
    }

    fn push_spanned(&mut self, kind: TokenKind<'a>, start: usize) {
        let span = self.span_at(start, self.pos);
        self.tokens.push(Token::new(kind, span));
    }

    fn span_at(&self, start: usize, end: usize) -> Span {
        Span {
            start,
            end,
            line: self.line,
            column: start.saturating_sub(self.line_start) + 1,
        }
    }

    /// Returns the token at the cursor; past the end this is always Eof.
    pub fn current_token(&self) -> &Token<'a> {
        &self.tokens[self.cursor]
    }

    /// Advances the cursor and returns the new current token, saturating at
    /// the final Eof.
    pub fn next_token(&mut self) -> &Token<'a> {
        if self.cursor + 1 < self.tokens.len() {
            self.cursor += 1;
        }
        self.current_token()
    }

    /// Peeks `offset` tokens ahead of the cursor without advancing.
    pub fn lookahead(&self, offset: usize) -> &TokenKind<'a> {
        let index = (self.cursor + offset).min(self.tokens.len() - 1);
        &self.tokens[index].kind
    }

    pub fn expect_char(&mut self, expected: char) -> LexResult<()> {
        if matches!(self.current_token().kind, TokenKind::Char(c) if c == expected) {
            self.next_token();
            return Ok(());
        }
        Err(self.mismatch(&format!("Char{{{expected}}}")))
    }

    pub fn expect_identifier(&mut self) -> LexResult<&'a str> {
        if let TokenKind::Id(name) = self.current_token().kind() {
            let name = *name;
            self.next_token();
            return Ok(name);
        }
        Err(self.mismatch("an identifier"))
    }

    pub fn expect_newline(&mut self) -> LexResult<()> {
        self.expect_kind(&TokenKind::Newline, "Newline")
    }

    pub fn expect_indent(&mut self) -> LexResult<()> {
        self.expect_kind(&TokenKind::Indent, "Indent")
    }

    pub fn expect_dedent(&mut self) -> LexResult<()> {
        self.expect_kind(&TokenKind::Dedent, "Dedent")
    }

    fn expect_kind(&mut self, kind: &TokenKind<'a>, description: &str) -> LexResult<()> {
        if self.current_token().kind() == kind {
            self.next_token();
            return Ok(());
        }
        Err(self.mismatch(description))
    }

    fn mismatch(&self, expected: &str) -> LexError {
        let token = self.current_token();
        LexError::UnexpectedToken {
            expected: expected.to_string(),
            found: token.kind.to_string(),
            line: token.span.line,
            column: token.span.column,
        }
    }
}
