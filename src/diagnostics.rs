//! Diagnostic reporting with source locations
//!
//! This module provides rich error messages with source locations using miette.
//! Every compile-time failure of every stage is a [`CompileError`]; stages
//! accumulate them into a list instead of stopping at the first one.

use crate::common::Span;
use miette::{Diagnostic, NamedSource, SourceSpan};
use std::sync::Arc;
use thiserror::Error;

/// Source file for error reporting
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub content: Arc<str>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: Arc::from(content.into()),
        }
    }

    pub fn to_named_source(&self) -> NamedSource<String> {
        NamedSource::new(self.name.clone(), self.content.to_string())
    }
}

/// Convert our Span to miette's SourceSpan
impl From<Span> for SourceSpan {
    fn from(span: Span) -> Self {
        SourceSpan::new(span.start.into(), span.len())
    }
}

/// Compiler diagnostic
#[derive(Error, Debug, Diagnostic, Clone, PartialEq)]
pub enum CompileError {
    // === Lexing and Parsing ===
    #[error("line {line}: unrecognized input `{text}`")]
    #[diagnostic(code(parse::invalid_token))]
    InvalidToken {
        text: String,
        #[label("not part of the language")]
        span: SourceSpan,
        line: u32,
    },

    #[error("line {line}: expected {expected}, found {found}")]
    #[diagnostic(code(parse::unexpected_token))]
    UnexpectedToken {
        expected: String,
        found: String,
        #[label("unexpected token here")]
        span: SourceSpan,
        line: u32,
    },

    #[error("line {line}: module `{name}` is defined more than once")]
    #[diagnostic(code(declare::repeated_module))]
    RepeatedModule {
        name: String,
        #[label("redefined here")]
        span: SourceSpan,
        line: u32,
    },

    // === Declarations ===
    #[error("line {line}: array `{name}` must have positive dimensions and at most {max} cells")]
    #[diagnostic(code(declare::invalid_dimension))]
    InvalidDimension {
        name: String,
        max: usize,
        #[label("invalid dimensions")]
        span: SourceSpan,
        line: u32,
    },

    #[error("line {line}: variable `{name}` declared twice, as `{first}` and as `{second}`")]
    #[diagnostic(code(declare::repeated_variable))]
    RepeatedVariable {
        name: String,
        first: String,
        second: String,
        #[label("redeclared here")]
        span: SourceSpan,
        #[label("first declared here")]
        first_span: SourceSpan,
        line: u32,
    },

    // === Resolution ===
    #[error("line {line}: undefined variable `{name}`")]
    #[diagnostic(
        code(resolve::undefined_variable),
        help("declare it in this module or in the main program")
    )]
    UndefinedVariable {
        name: String,
        #[label("not found in this scope")]
        span: SourceSpan,
        line: u32,
    },

    #[error("line {line}: undefined module `{name}`")]
    #[diagnostic(code(resolve::undefined_module))]
    UndefinedModule {
        name: String,
        #[label("no function or procedure with this name")]
        span: SourceSpan,
        line: u32,
    },

    #[error("line {line}: `{name}` does not return a value")]
    #[diagnostic(code(resolve::not_a_function))]
    NotAFunction {
        name: String,
        #[label("used as a value here")]
        span: SourceSpan,
        line: u32,
    },

    #[error("line {line}: result of function `{name}` is discarded")]
    #[diagnostic(
        code(resolve::unused_result),
        help("assign the result to a variable")
    )]
    UnusedResult {
        name: String,
        #[label("called as a procedure")]
        span: SourceSpan,
        line: u32,
    },

    #[error("line {line}: `{name}` has {declared} dimension(s) but {supplied} index(es) were given")]
    #[diagnostic(code(resolve::too_many_indexes))]
    TooManyIndexes {
        name: String,
        declared: usize,
        supplied: usize,
        #[label("too many indexes")]
        span: SourceSpan,
        line: u32,
    },

    #[error("line {line}: `{name}` needs at least one argument")]
    #[diagnostic(code(resolve::missing_arguments))]
    MissingArguments {
        name: String,
        #[label("empty argument list")]
        span: SourceSpan,
        line: u32,
    },

    // === Typing ===
    #[error("line {line}: operator `{op}` cannot be applied to `{lhs}` and `{rhs}`")]
    #[diagnostic(code(typecheck::incompatible_operands))]
    IncompatibleOperands {
        op: String,
        lhs: String,
        rhs: String,
        #[label("incompatible operand types")]
        span: SourceSpan,
        line: u32,
    },

    #[error("line {line}: operator `{op}` cannot be applied to `{operand}`")]
    #[diagnostic(code(typecheck::incompatible_operand))]
    IncompatibleOperand {
        op: String,
        operand: String,
        #[label("incompatible operand type")]
        span: SourceSpan,
        line: u32,
    },

    // === Checking ===
    #[error("line {line}: cannot assign `{value}` to `{target}`")]
    #[diagnostic(code(typecheck::incompatible_assignment))]
    IncompatibleAssignment {
        target: String,
        value: String,
        #[label("incompatible assignment")]
        span: SourceSpan,
        line: u32,
    },

    #[error("line {line}: condition must be `logico`, found `{found}`")]
    #[diagnostic(code(typecheck::condition))]
    ConditionNotLogical {
        found: String,
        #[label("not a logical expression")]
        span: SourceSpan,
        line: u32,
    },

    #[error("line {line}: loop counter must be numeric, found `{found}`")]
    #[diagnostic(code(typecheck::counter))]
    CounterNotNumeric {
        found: String,
        #[label("counter")]
        span: SourceSpan,
        line: u32,
    },

    #[error("line {line}: loop bound must be numeric, found `{found}`")]
    #[diagnostic(code(typecheck::bound))]
    BoundNotNumeric {
        found: String,
        #[label("bound")]
        span: SourceSpan,
        line: u32,
    },

    #[error("line {line}: array index must be `entero`, found `{found}`")]
    #[diagnostic(code(typecheck::index))]
    IndexNotInteger {
        found: String,
        #[label("index")]
        span: SourceSpan,
        line: u32,
    },

    #[error("line {line}: `{name}` expects {expected} argument(s), found {found}")]
    #[diagnostic(code(typecheck::arity))]
    ArityMismatch {
        name: String,
        expected: usize,
        found: usize,
        #[label("wrong number of arguments")]
        span: SourceSpan,
        line: u32,
    },

    #[error("line {line}: parameter `{param}` of `{name}` expects `{expected}`, found `{found}`")]
    #[diagnostic(code(typecheck::argument))]
    IncompatibleArgument {
        name: String,
        param: String,
        expected: String,
        found: String,
        #[label("incompatible argument")]
        span: SourceSpan,
        line: u32,
    },

    #[error("line {line}: parameter `{param}` of `{name}` is by reference and needs a variable")]
    #[diagnostic(code(typecheck::reference_argument))]
    BadReferenceArgument {
        name: String,
        param: String,
        #[label("not a variable")]
        span: SourceSpan,
        line: u32,
    },

    #[error("line {line}: `leer` can only store into variables")]
    #[diagnostic(code(typecheck::read_target))]
    ReadTarget {
        #[label("not a variable")]
        span: SourceSpan,
        line: u32,
    },

    #[error("line {line}: cannot read a value of type `{found}`")]
    #[diagnostic(code(typecheck::unreadable))]
    UnreadableType {
        found: String,
        #[label("only scalars and character arrays can be read")]
        span: SourceSpan,
        line: u32,
    },

    #[error("line {line}: string of length {length} does not fit in `{target}`")]
    #[diagnostic(code(typecheck::long_string))]
    LongString {
        target: String,
        length: usize,
        #[label("string too long")]
        span: SourceSpan,
        line: u32,
    },

    #[error("line {line}: `retornar` is only allowed inside functions")]
    #[diagnostic(code(typecheck::return_outside_function))]
    ReturnOutsideFunction {
        #[label("not inside a function")]
        span: SourceSpan,
        line: u32,
    },

    #[error("line {line}: function returns `{expected}`, found `{found}`")]
    #[diagnostic(code(typecheck::return_type))]
    IncompatibleReturn {
        expected: String,
        found: String,
        #[label("incompatible return value")]
        span: SourceSpan,
        line: u32,
    },

    // === Internal ===
    #[error("internal compiler error: {0}")]
    #[diagnostic(code(internal))]
    Internal(String),
}

impl CompileError {
    /// Byte offset and line of the primary location (0 for internal errors)
    pub fn location(&self) -> (usize, u32) {
        use CompileError::*;
        match self {
            InvalidToken { span, line, .. }
            | UnexpectedToken { span, line, .. }
            | InvalidDimension { span, line, .. }
            | RepeatedModule { span, line, .. }
            | RepeatedVariable { span, line, .. }
            | UndefinedVariable { span, line, .. }
            | UndefinedModule { span, line, .. }
            | NotAFunction { span, line, .. }
            | UnusedResult { span, line, .. }
            | TooManyIndexes { span, line, .. }
            | MissingArguments { span, line, .. }
            | IncompatibleOperands { span, line, .. }
            | IncompatibleOperand { span, line, .. }
            | IncompatibleAssignment { span, line, .. }
            | ConditionNotLogical { span, line, .. }
            | CounterNotNumeric { span, line, .. }
            | BoundNotNumeric { span, line, .. }
            | IndexNotInteger { span, line, .. }
            | ArityMismatch { span, line, .. }
            | IncompatibleArgument { span, line, .. }
            | BadReferenceArgument { span, line, .. }
            | ReadTarget { span, line, .. }
            | UnreadableType { span, line, .. }
            | LongString { span, line, .. }
            | ReturnOutsideFunction { span, line, .. }
            | IncompatibleReturn { span, line, .. } => (span.offset(), *line),
            Internal(_) => (0, 0),
        }
    }

    pub fn line(&self) -> u32 {
        self.location().1
    }
}

/// Sort diagnostics by source position, keeping discovery order for ties
pub fn sort_by_position(errors: &mut [CompileError]) {
    errors.sort_by_key(|e| e.location().0);
}

/// Collects the diagnostics of one source file and prints them
pub struct Reporter {
    source: SourceFile,
    errors: Vec<CompileError>,
}

impl Reporter {
    pub fn new(source: SourceFile) -> Self {
        Self {
            source,
            errors: Vec::new(),
        }
    }

    pub fn extend(&mut self, errors: impl IntoIterator<Item = CompileError>) {
        self.errors.extend(errors);
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Print all diagnostics to stderr with the source attached
    pub fn emit_all(&self) {
        for error in &self.errors {
            let report = miette::Report::new(error.clone())
                .with_source_code(self.source.to_named_source());
            eprintln!("{:?}", report);
        }
    }
}
