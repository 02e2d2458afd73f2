//! Hand-written lexer.
//!
//! Statement terminators follow the usual line-based rule: a newline after an
//! identifier, literal, closing delimiter, `++`/`--` or one of `break`,
//! `continue`, `fallthrough`, `return` produces a [`TokenKind::Semi`].

use ctxflow_ast::{FileId, Span};
use ctxflow_diag::{Category, Diagnostic, SourceLocation};

use crate::token::{Token, TokenKind, Trivia, TriviaKind};

/// Tokens plus the comments skipped while producing them.
#[derive(Debug, Clone)]
pub struct Lexed {
    pub tokens: Vec<Token>,
    pub comments: Vec<Trivia>,
}

/// Lex source text into a sequence of tokens.
///
/// The last token is always `Eof`. Returns `Err` with every lexical error
/// found.
pub fn lex(source: &str, file: FileId) -> Result<Lexed, Vec<Diagnostic>> {
    let mut lexer = Lexer::new(source, file);
    lexer.scan_all();
    if lexer.errors.is_empty() {
        Ok(Lexed {
            tokens: lexer.tokens,
            comments: lexer.comments,
        })
    } else {
        Err(lexer.errors)
    }
}

struct Lexer<'src> {
    source: &'src str,
    file: FileId,
    pos: usize,
    tokens: Vec<Token>,
    comments: Vec<Trivia>,
    errors: Vec<Diagnostic>,
}

impl<'src> Lexer<'src> {
    fn new(source: &'src str, file: FileId) -> Self {
        Self {
            source,
            file,
            pos: 0,
            tokens: Vec::new(),
            comments: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn scan_all(&mut self) {
        loop {
            self.skip_blanks();
            if self.is_at_end() {
                self.insert_semi(self.pos);
                self.emit(TokenKind::Eof, self.pos, self.pos);
                break;
            }
            self.scan_token();
        }
    }

    fn skip_blanks(&mut self) {
        while let Some(byte) = self.peek() {
            match byte {
                b' ' | b'\t' | b'\r' => self.pos += 1,
                _ => break,
            }
        }
    }

    fn scan_token(&mut self) {
        let start = self.pos;
        let Some(ch) = self.advance_char() else {
            return;
        };

        match ch {
            '\n' => self.insert_semi(start),
            '/' if self.peek() == Some(b'/') => {
                while self.peek().is_some_and(|b| b != b'\n') {
                    self.pos += 1;
                }
                self.push_comment(TriviaKind::LineComment, start);
            }
            '/' if self.peek() == Some(b'*') => {
                self.pos += 1;
                let mut has_newline = false;
                loop {
                    match self.peek() {
                        None => {
                            self.error(start, "unterminated block comment");
                            break;
                        }
                        Some(b'*') if self.peek_at(1) == Some(b'/') => {
                            self.pos += 2;
                            break;
                        }
                        Some(b'\n') => {
                            has_newline = true;
                            self.pos += 1;
                        }
                        Some(_) => self.pos += 1,
                    }
                }
                self.push_comment(TriviaKind::BlockComment, start);
                if has_newline {
                    self.insert_semi(start);
                }
            }
            '(' => self.emit(TokenKind::LParen, start, self.pos),
            ')' => self.emit(TokenKind::RParen, start, self.pos),
            '[' => self.emit(TokenKind::LBracket, start, self.pos),
            ']' => self.emit(TokenKind::RBracket, start, self.pos),
            '{' => self.emit(TokenKind::LBrace, start, self.pos),
            '}' => self.emit(TokenKind::RBrace, start, self.pos),
            ',' => self.emit(TokenKind::Comma, start, self.pos),
            ';' => self.emit(TokenKind::Semi, start, self.pos),
            '~' => self.emit(TokenKind::Tilde, start, self.pos),
            ':' => {
                if self.match_byte(b'=') {
                    self.emit(TokenKind::Define, start, self.pos);
                } else {
                    self.emit(TokenKind::Colon, start, self.pos);
                }
            }
            '.' => {
                if self.peek().is_some_and(|b| b.is_ascii_digit()) {
                    self.scan_number(start);
                } else if self.peek() == Some(b'.') && self.peek_at(1) == Some(b'.') {
                    self.pos += 2;
                    self.emit(TokenKind::Ellipsis, start, self.pos);
                } else {
                    self.emit(TokenKind::Dot, start, self.pos);
                }
            }
            '+' => {
                if self.match_byte(b'+') {
                    self.emit(TokenKind::Inc, start, self.pos);
                } else {
                    self.operator_or_assign(TokenKind::Plus, start);
                }
            }
            '-' => {
                if self.match_byte(b'-') {
                    self.emit(TokenKind::Dec, start, self.pos);
                } else {
                    self.operator_or_assign(TokenKind::Minus, start);
                }
            }
            '*' => self.operator_or_assign(TokenKind::Star, start),
            '/' => self.operator_or_assign(TokenKind::Slash, start),
            '%' => self.operator_or_assign(TokenKind::Percent, start),
            '^' => self.operator_or_assign(TokenKind::Caret, start),
            '&' => {
                if self.match_byte(b'&') {
                    self.emit(TokenKind::AndAnd, start, self.pos);
                } else if self.match_byte(b'^') {
                    self.operator_or_assign(TokenKind::AmpCaret, start);
                } else {
                    self.operator_or_assign(TokenKind::Amp, start);
                }
            }
            '|' => {
                if self.match_byte(b'|') {
                    self.emit(TokenKind::OrOr, start, self.pos);
                } else {
                    self.operator_or_assign(TokenKind::Pipe, start);
                }
            }
            '<' => {
                if self.match_byte(b'-') {
                    self.emit(TokenKind::Arrow, start, self.pos);
                } else if self.match_byte(b'<') {
                    self.operator_or_assign(TokenKind::Shl, start);
                } else if self.match_byte(b'=') {
                    self.emit(TokenKind::LtEq, start, self.pos);
                } else {
                    self.emit(TokenKind::Lt, start, self.pos);
                }
            }
            '>' => {
                if self.match_byte(b'>') {
                    self.operator_or_assign(TokenKind::Shr, start);
                } else if self.match_byte(b'=') {
                    self.emit(TokenKind::GtEq, start, self.pos);
                } else {
                    self.emit(TokenKind::Gt, start, self.pos);
                }
            }
            '=' => {
                if self.match_byte(b'=') {
                    self.emit(TokenKind::EqEq, start, self.pos);
                } else {
                    self.emit(TokenKind::Eq, start, self.pos);
                }
            }
            '!' => {
                if self.match_byte(b'=') {
                    self.emit(TokenKind::NotEq, start, self.pos);
                } else {
                    self.emit(TokenKind::Bang, start, self.pos);
                }
            }
            '"' => self.scan_string(start),
            '`' => self.scan_raw_string(start),
            '\'' => self.scan_char(start),
            '0'..='9' => self.scan_number(start),
            ch if ch == '_' || ch.is_alphabetic() => self.scan_ident(start),
            other => self.error(start, &format!("unexpected character '{other}'")),
        }
    }

    /// `op` or `op=`.
    fn operator_or_assign(&mut self, kind: TokenKind, start: usize) {
        if self.match_byte(b'=') {
            let text = self.source[start..self.pos].to_string();
            self.emit(TokenKind::OpAssign(text), start, self.pos);
        } else {
            self.emit(kind, start, self.pos);
        }
    }

    fn scan_ident(&mut self, start: usize) {
        while let Some(ch) = self.peek_char() {
            if ch == '_' || ch.is_alphanumeric() {
                self.pos += ch.len_utf8();
            } else {
                break;
            }
        }
        let text = &self.source[start..self.pos];
        let kind = TokenKind::keyword(text).unwrap_or_else(|| TokenKind::Ident(text.to_string()));
        self.emit(kind, start, self.pos);
    }

    fn scan_number(&mut self, start: usize) {
        let mut is_float = self.source.as_bytes()[start] == b'.';
        if self.source.as_bytes()[start] == b'0' && matches!(self.peek(), Some(b'x' | b'X')) {
            self.pos += 1;
            while self
                .peek()
                .is_some_and(|b| b.is_ascii_hexdigit() || b == b'_')
            {
                self.pos += 1;
            }
        } else {
            while let Some(byte) = self.peek() {
                match byte {
                    b'0'..=b'9' | b'_' => self.pos += 1,
                    b'.' if !is_float && self.peek_at(1).is_some_and(|b| b.is_ascii_digit()) => {
                        is_float = true;
                        self.pos += 1;
                    }
                    b'e' | b'E' => {
                        is_float = true;
                        self.pos += 1;
                        if matches!(self.peek(), Some(b'+' | b'-')) {
                            self.pos += 1;
                        }
                    }
                    _ => break,
                }
            }
        }
        let text = self.source[start..self.pos].to_string();
        let kind = if is_float {
            TokenKind::Float(text)
        } else {
            TokenKind::Int(text)
        };
        self.emit(kind, start, self.pos);
    }

    fn scan_string(&mut self, start: usize) {
        let mut value = String::new();
        loop {
            match self.advance_char() {
                None | Some('\n') => {
                    self.error(start, "unterminated string literal");
                    return;
                }
                Some('"') => break,
                Some('\\') => match self.advance_char() {
                    Some('n') => value.push('\n'),
                    Some('t') => value.push('\t'),
                    Some('r') => value.push('\r'),
                    Some('0') => value.push('\0'),
                    Some(other) => value.push(other),
                    None => {
                        self.error(start, "unterminated string literal");
                        return;
                    }
                },
                Some(ch) => value.push(ch),
            }
        }
        self.emit(TokenKind::String(value), start, self.pos);
    }

    fn scan_raw_string(&mut self, start: usize) {
        let content_start = self.pos;
        loop {
            match self.peek() {
                None => {
                    self.error(start, "unterminated raw string literal");
                    return;
                }
                Some(b'`') => break,
                Some(_) => self.pos += 1,
            }
        }
        let value = self.source[content_start..self.pos].to_string();
        self.pos += 1;
        self.emit(TokenKind::String(value), start, self.pos);
    }

    fn scan_char(&mut self, start: usize) {
        let content_start = self.pos;
        loop {
            match self.advance_char() {
                None | Some('\n') => {
                    self.error(start, "unterminated character literal");
                    return;
                }
                Some('\\') => {
                    self.advance_char();
                }
                Some('\'') => break,
                Some(_) => {}
            }
        }
        let value = self.source[content_start..self.pos - 1].to_string();
        self.emit(TokenKind::Char(value), start, self.pos);
    }

    // -- Helpers --

    fn insert_semi(&mut self, at: usize) {
        if self
            .tokens
            .last()
            .is_some_and(|token| token.kind.ends_statement())
        {
            self.emit(TokenKind::Semi, at, at);
        }
    }

    fn push_comment(&mut self, kind: TriviaKind, start: usize) {
        self.comments.push(Trivia {
            kind,
            text: self.source[start..self.pos].to_string(),
            span: Span::new(self.file, start as u32, self.pos as u32),
        });
    }

    fn emit(&mut self, kind: TokenKind, start: usize, end: usize) {
        self.tokens.push(Token {
            kind,
            span: Span::new(self.file, start as u32, end as u32),
        });
    }

    fn error(&mut self, start: usize, message: &str) {
        self.errors.push(
            Diagnostic::error(Category::Syntax, message).at(SourceLocation {
                file_id: self.file.0,
                start: start as u32,
                end: self.pos.max(start + 1) as u32,
            }),
        );
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.source.len()
    }

    fn peek(&self) -> Option<u8> {
        self.source.as_bytes().get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.source.as_bytes().get(self.pos + offset).copied()
    }

    fn peek_char(&self) -> Option<char> {
        self.source[self.pos..].chars().next()
    }

    fn advance_char(&mut self) -> Option<char> {
        let ch = self.peek_char()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn match_byte(&mut self, expected: u8) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }
}
