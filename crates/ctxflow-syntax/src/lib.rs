//! Lexer and recursive descent parser for the analyzed source language.
//!
//! This crate takes source text and produces the syntax tree defined in
//! `ctxflow-ast`. Statement terminators are inserted by the lexer at line ends,
//! so the parser only ever sees explicit `;` tokens.

pub mod lexer;
pub mod parser;
pub mod token;

use ctxflow_ast::{Expr, FileId, SourceFile};
use ctxflow_diag::Diagnostic;

pub use lexer::{Lexed, lex};
pub use parser::{parse_expr, parse_file};
pub use token::{Token, TokenKind, Trivia, TriviaKind};

/// Parse a whole source file directly from source text.
pub fn parse_source(source: &str, file: FileId) -> Result<SourceFile, Vec<Diagnostic>> {
    let Lexed { tokens, comments } = lex(source, file)?;
    parse_file(tokens, comments, file)
}

/// Parse a single expression directly from source text.
pub fn parse_expr_source(source: &str, file: FileId) -> Result<Expr, Vec<Diagnostic>> {
    let Lexed { tokens, .. } = lex(source, file)?;
    parse_expr(tokens, file)
}
