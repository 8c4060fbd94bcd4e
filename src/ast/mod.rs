//! Abstract Syntax Tree for the pseudocode language
//!
//! This is the untyped, unresolved program tree handed over by the parser.
//! Declarations are still ordinary statements inside module bodies; the
//! declaration extractor pulls them out before resolution.

use crate::common::Span;
use crate::types::AtomicKind;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of the main module
pub const MAIN_MODULE: &str = "principal";

/// Parsed program: the main module plus user modules by name, in
/// declaration order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedProgram {
    pub main: Module,
    pub modules: IndexMap<String, Module>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModuleKind {
    Main,
    Procedure,
    Function,
}

/// Main program body or user-defined subroutine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Module {
    pub name: String,
    pub kind: ModuleKind,
    pub params: Vec<Param>,
    pub return_type: Option<AtomicKind>,
    pub body: Vec<Stmt>,
    pub span: Span,
}

/// Subroutine parameter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub kind: AtomicKind,
    pub dims: Vec<usize>,
    pub by_ref: bool,
    pub span: Span,
}

// ==================== STATEMENTS ====================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StmtKind {
    /// `entero a, b[2, 3]`
    Declare(Vec<Declarator>),
    /// `target <- value`
    Assign { target: Invocation, value: Expr },
    /// Procedure call, including the built-ins `escribir` and `leer`
    Call(Call),
    If {
        cond: Expr,
        then_branch: Vec<Stmt>,
        else_branch: Vec<Stmt>,
    },
    While { cond: Expr, body: Vec<Stmt> },
    /// `repetir body hasta que cond`
    Until {
        body: Vec<Stmt>,
        cond: Expr,
        cond_span: Span,
    },
    /// `para counter <- from hasta to body finpara`
    For {
        counter: Invocation,
        from: Expr,
        to: Expr,
        body: Vec<Stmt>,
    },
    Return(Expr),
}

/// One declared variable
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Declarator {
    pub name: String,
    pub kind: AtomicKind,
    pub dims: Vec<usize>,
    pub span: Span,
}

// ==================== EXPRESSIONS ====================

/// Variable use, optionally subscripted: `a`, `m[i, 2]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invocation {
    pub name: String,
    pub indexes: Vec<Expr>,
    pub span: Span,
}

/// Module call site: `f(a, 2)`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Call {
    pub name: String,
    pub args: Vec<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExprKind {
    Literal(Literal),
    Invocation(Invocation),
    Call(Call),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary { op: UnaryOp, operand: Box<Expr> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Integer(i64),
    Real(f64),
    Text(String),
    Logical(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Plus,
    Minus,
    Times,
    Power,
    /// Real division `/`
    Slash,
    /// Integer division `div`
    Div,
    Mod,
    Minor,
    MinorEq,
    Major,
    MajorEq,
    Equal,
    Different,
    And,
    Or,
}

impl BinaryOp {
    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            BinaryOp::Plus | BinaryOp::Minus | BinaryOp::Times | BinaryOp::Power
        )
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Minor
                | BinaryOp::MinorEq
                | BinaryOp::Major
                | BinaryOp::MajorEq
                | BinaryOp::Equal
                | BinaryOp::Different
        )
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Plus => "+",
            BinaryOp::Minus => "-",
            BinaryOp::Times => "*",
            BinaryOp::Power => "^",
            BinaryOp::Slash => "/",
            BinaryOp::Div => "div",
            BinaryOp::Mod => "mod",
            BinaryOp::Minor => "<",
            BinaryOp::MinorEq => "<=",
            BinaryOp::Major => ">",
            BinaryOp::MajorEq => ">=",
            BinaryOp::Equal => "=",
            BinaryOp::Different => "<>",
            BinaryOp::And => "y",
            BinaryOp::Or => "o",
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Neg,
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnaryOp::Not => f.write_str("no"),
            UnaryOp::Neg => f.write_str("-"),
        }
    }
}
