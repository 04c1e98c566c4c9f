//! `mython` library crate.
//!
//! High-level layout:
//! - frontend: `lexer` + `parser` produce the shared AST (`parser::ast`)
//! - dynamic value model and class runtime: `runtime`
//! - AST-walking evaluation: `interpreter`

use std::io;

use thiserror::Error;

pub mod interpreter;
pub mod lexer;
pub mod parser;
pub mod runtime;

pub use parser::ast;

use crate::lexer::{LexError, Lexer};
use crate::parser::ParseError;
use crate::runtime::Context;
use crate::runtime::error::RuntimeError;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Lexer(#[from] LexError),
    #[error(transparent)]
    Parser(#[from] ParseError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

/// Runs a Mython program: tokenize, parse, execute against a fresh global
/// scope and a context that prints straight to `output`. Output written
/// before a runtime error stays written.
pub fn run(source: &str, output: &mut dyn io::Write) -> Result<(), Error> {
    let mut lexer = Lexer::new(source)?;
    let program = parser::parse_program(&mut lexer)?;
    let mut context = Context::new(output);
    interpreter::execute_program(&program, &mut context)?;
    Ok(())
}
