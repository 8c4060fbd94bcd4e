//! High-level Intermediate Representation (HIR)
//!
//! HIR is the decorated program tree produced by the reference resolver. It
//! contains:
//! - Per-module symbol tables with declarations removed from the bodies
//! - Every variable invocation bound to its declaration and scope
//! - Every call site bound to the callee signature
//! - A type slot on every expression, filled in by the typer

use crate::ast::{BinaryOp, Literal, ModuleKind, UnaryOp};
use crate::common::Span;
use crate::resolve::symbols::{Scope, Signature, SymbolTable, VarSymbol};
use crate::types::Type;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// HIR root: main module first, then user modules in declaration order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hir {
    pub modules: IndexMap<String, HirModule>,
}

impl Hir {
    pub fn main(&self) -> Option<&HirModule> {
        self.modules.values().find(|m| m.kind == ModuleKind::Main)
    }
}

// ==================== MODULES ====================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HirModule {
    pub name: String,
    pub kind: ModuleKind,
    pub signature: Signature,
    pub symbols: SymbolTable,
    pub body: Vec<HirStmt>,
    pub span: Span,
}

// ==================== STATEMENTS ====================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HirStmt {
    pub kind: HirStmtKind,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum HirStmtKind {
    Assign {
        target: HirInvocation,
        value: HirExpr,
    },
    /// User procedure call
    Call(HirCall),
    /// `leer(...)`; each argument should be an invocation
    Read(Vec<HirExpr>),
    /// `escribir(...)`
    Write(Vec<HirExpr>),
    If {
        cond: HirExpr,
        then_branch: Vec<HirStmt>,
        else_branch: Vec<HirStmt>,
    },
    While {
        cond: HirExpr,
        body: Vec<HirStmt>,
    },
    Until {
        body: Vec<HirStmt>,
        cond: HirExpr,
        cond_span: Span,
    },
    For {
        counter: HirInvocation,
        from: HirExpr,
        to: HirExpr,
        body: Vec<HirStmt>,
    },
    Return(HirExpr),
}

// ==================== EXPRESSIONS ====================

/// Variable bound to its declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarRef {
    pub scope: Scope,
    pub symbol: VarSymbol,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HirInvocation {
    pub name: String,
    pub indexes: Vec<HirExpr>,
    pub var: VarRef,
    pub span: Span,
}

impl HirInvocation {
    /// Declared type of the whole variable
    pub fn declared(&self) -> Type {
        self.var.symbol.ty()
    }

    /// Type after applying the supplied indexes
    pub fn ty(&self) -> Option<Type> {
        self.declared().reduce(self.indexes.len())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HirCall {
    pub callee: String,
    pub signature: Signature,
    pub args: Vec<HirExpr>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HirExpr {
    pub kind: HirExprKind,
    /// `None` until typed, and afterwards for ill-typed nodes
    pub ty: Option<Type>,
    pub span: Span,
}

impl HirExpr {
    pub fn new(kind: HirExprKind, span: Span) -> Self {
        Self {
            kind,
            ty: None,
            span,
        }
    }

    pub fn as_invocation(&self) -> Option<&HirInvocation> {
        match &self.kind {
            HirExprKind::Invocation(inv) => Some(inv),
            _ => None,
        }
    }

    /// String literal length, if this is a multi-character literal
    pub fn text_literal_len(&self) -> Option<usize> {
        match &self.kind {
            HirExprKind::Literal(Literal::Text(text)) => Some(text.chars().count()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum HirExprKind {
    Literal(Literal),
    Invocation(HirInvocation),
    Call(HirCall),
    Binary {
        op: BinaryOp,
        lhs: Box<HirExpr>,
        rhs: Box<HirExpr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<HirExpr>,
    },
}
