//! Pseudoc: compiler and stepping virtual machine for a typed pseudocode
//!
//! A small imperative teaching language with Spanish keywords: atomic
//! variables and row-major arrays, procedures with by-value and by-reference
//! parameters, functions, structured control flow and `leer`/`escribir` I/O.
//!
//! # Architecture
//!
//! ```text
//! Source → Lexer → Parser → AST → Resolver → HIR → Checker → Bytecode → VM
//! ```
//!
//! The [`interp`] module walks the checked HIR directly and is used as a
//! reference for the bytecode. [`session::Session`] drives a loaded program
//! for the CLI and the interactive debugger.
//!
//! # Example
//!
//! ```text
//! entero a, v[3]
//! para a <- 1 hasta 3
//!     v[a] <- a * a
//! finpara
//! escribir(v)
//! ```

pub mod ast;
pub mod bytecode;
pub mod check;
pub mod common;
pub mod config;
pub mod diagnostics;
pub mod hir;
pub mod interp;
pub mod lexer;
pub mod parser;
pub mod resolve;
pub mod session;
pub mod types;
pub mod value;
pub mod vm;

// Re-export diagnostics for convenience
pub use diagnostics::{CompileError, Reporter, SourceFile};

// Re-exports for convenience
pub use ast::ParsedProgram;
pub use bytecode::Program;
pub use config::Config;
pub use hir::Hir;
pub use session::{Session, SessionError};
pub use types::Type;
pub use value::Value;
pub use vm::{Machine, State, Stop, StopReason, VmError};

/// Compiler version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Lex and parse source code; a syntax error is a one-element list
pub fn parse(source: &str) -> Result<ParsedProgram, Vec<CompileError>> {
    let tokens = lexer::lex(source).map_err(|e| vec![e])?;
    parser::parse(&tokens).map_err(|e| vec![e])
}

/// Resolve and type-check a parsed program
pub fn analyze(program: &ParsedProgram) -> Result<Hir, Vec<CompileError>> {
    let mut hir = resolve::resolve(program)?;
    check::check(&mut hir)?;
    Ok(hir)
}

/// Type-check source code without generating bytecode
pub fn typecheck(source: &str) -> Result<Hir, Vec<CompileError>> {
    analyze(&parse(source)?)
}

/// Compile source code to bytecode
pub fn compile(source: &str) -> Result<Program, Vec<CompileError>> {
    let hir = typecheck(source)?;
    let program = bytecode::lower(&hir).map_err(|e| vec![e])?;
    tracing::debug!(
        instructions = program.len(),
        modules = program.templates.len(),
        "compiled program"
    );
    Ok(program)
}

/// Run source code on the tree-walking interpreter with canned input
pub fn interpret(
    source: &str,
    input: impl IntoIterator<Item = Value>,
) -> miette::Result<Vec<Value>> {
    let hir = typecheck(source).map_err(|errors| {
        let count = errors.len();
        let report = errors
            .into_iter()
            .next()
            .map(|e| miette::Report::new(e).with_source_code(source.to_string()));
        match report {
            Some(report) if count == 1 => report,
            Some(report) => report.wrap_err(format!("{count} errors")),
            None => miette::miette!("compilation failed"),
        }
    })?;
    let mut interpreter = interp::Interpreter::new(&hir).with_input(input);
    interpreter.run().map_err(|e| miette::miette!("{e}"))?;
    Ok(interpreter.output().to_vec())
}
