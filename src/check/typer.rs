//! Bottom-up type inference over the HIR
//!
//! Fills the `ty` slot of every expression. A node whose operands are
//! incompatible is reported once and left untyped; enclosing nodes with an
//! untyped operand stay untyped without a further diagnostic.

use crate::ast::{BinaryOp, Literal, UnaryOp};
use crate::diagnostics::CompileError;
use crate::hir::*;
use crate::types::{AtomicKind, Type};

/// Type every expression of the program, returning the diagnostics found
pub fn type_program(hir: &mut Hir) -> Vec<CompileError> {
    let mut typer = Typer { errors: Vec::new() };
    for module in hir.modules.values_mut() {
        typer.type_block(&mut module.body);
    }
    typer.errors
}

struct Typer {
    errors: Vec<CompileError>,
}

impl Typer {
    fn type_block(&mut self, stmts: &mut [HirStmt]) {
        for stmt in stmts {
            self.type_stmt(stmt);
        }
    }

    fn type_stmt(&mut self, stmt: &mut HirStmt) {
        match &mut stmt.kind {
            HirStmtKind::Assign { target, value } => {
                self.type_invocation(target);
                self.type_expr(value);
            }
            HirStmtKind::Call(call) => self.type_exprs(&mut call.args),
            HirStmtKind::Read(args) | HirStmtKind::Write(args) => self.type_exprs(args),
            HirStmtKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.type_expr(cond);
                self.type_block(then_branch);
                self.type_block(else_branch);
            }
            HirStmtKind::While { cond, body } => {
                self.type_expr(cond);
                self.type_block(body);
            }
            HirStmtKind::Until { body, cond, .. } => {
                self.type_block(body);
                self.type_expr(cond);
            }
            HirStmtKind::For {
                counter,
                from,
                to,
                body,
            } => {
                self.type_invocation(counter);
                self.type_expr(from);
                self.type_expr(to);
                self.type_block(body);
            }
            HirStmtKind::Return(value) => self.type_expr(value),
        }
    }

    fn type_exprs(&mut self, exprs: &mut [HirExpr]) {
        for expr in exprs {
            self.type_expr(expr);
        }
    }

    fn type_invocation(&mut self, inv: &mut HirInvocation) -> Option<Type> {
        self.type_exprs(&mut inv.indexes);
        inv.ty()
    }

    fn type_expr(&mut self, expr: &mut HirExpr) {
        let span = expr.span;
        expr.ty = match &mut expr.kind {
            HirExprKind::Literal(lit) => Some(literal_type(lit)),
            HirExprKind::Invocation(inv) => self.type_invocation(inv),
            HirExprKind::Call(call) => {
                self.type_exprs(&mut call.args);
                call.signature.return_type.clone()
            }
            HirExprKind::Binary { op, lhs, rhs } => {
                self.type_expr(lhs);
                self.type_expr(rhs);
                let (Some(l), Some(r)) = (&lhs.ty, &rhs.ty) else {
                    return;
                };
                let result = binary_type(*op, l, r);
                if result.is_none() {
                    self.errors.push(CompileError::IncompatibleOperands {
                        op: op.to_string(),
                        lhs: l.to_string(),
                        rhs: r.to_string(),
                        span: span.into(),
                        line: span.line,
                    });
                }
                result
            }
            HirExprKind::Unary { op, operand } => {
                self.type_expr(operand);
                let Some(t) = &operand.ty else {
                    return;
                };
                let result = unary_type(*op, t);
                if result.is_none() {
                    self.errors.push(CompileError::IncompatibleOperand {
                        op: op.to_string(),
                        operand: t.to_string(),
                        span: span.into(),
                        line: span.line,
                    });
                }
                result
            }
        };
    }
}

/// Type of a literal; a one-character string is a `caracter`
pub fn literal_type(lit: &Literal) -> Type {
    match lit {
        Literal::Integer(_) => Type::INTEGER,
        Literal::Real(_) => Type::REAL,
        Literal::Logical(_) => Type::LOGICAL,
        Literal::Text(text) => match text.chars().count() {
            1 => Type::CHARACTER,
            n => Type::string(n),
        },
    }
}

/// Result type of a binary operator, `None` when the operands don't fit
pub fn binary_type(op: BinaryOp, lhs: &Type, rhs: &Type) -> Option<Type> {
    let (l, r) = (lhs.atomic()?, rhs.atomic()?);
    match op {
        BinaryOp::Plus | BinaryOp::Minus | BinaryOp::Times | BinaryOp::Power => {
            if !(l.is_numeric() && r.is_numeric()) {
                return None;
            }
            if l == AtomicKind::Integer && r == AtomicKind::Integer {
                Some(Type::INTEGER)
            } else {
                Some(Type::REAL)
            }
        }
        BinaryOp::Div | BinaryOp::Mod => {
            (l == AtomicKind::Integer && r == AtomicKind::Integer).then_some(Type::INTEGER)
        }
        BinaryOp::Slash => (l == AtomicKind::Real && r == AtomicKind::Real).then_some(Type::REAL),
        BinaryOp::And | BinaryOp::Or => {
            (l == AtomicKind::Logical && r == AtomicKind::Logical).then_some(Type::LOGICAL)
        }
        BinaryOp::Minor
        | BinaryOp::MinorEq
        | BinaryOp::Major
        | BinaryOp::MajorEq
        | BinaryOp::Equal
        | BinaryOp::Different => {
            let comparable = (l == r && l != AtomicKind::None) || (l.is_numeric() && r.is_numeric());
            comparable.then_some(Type::LOGICAL)
        }
    }
}

/// Result type of a unary operator
pub fn unary_type(op: UnaryOp, operand: &Type) -> Option<Type> {
    match op {
        UnaryOp::Not => operand.is_logical().then_some(Type::LOGICAL),
        UnaryOp::Neg => operand.is_numeric().then(|| operand.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arithmetic_promotion() {
        assert_eq!(
            binary_type(BinaryOp::Plus, &Type::INTEGER, &Type::INTEGER),
            Some(Type::INTEGER)
        );
        assert_eq!(
            binary_type(BinaryOp::Power, &Type::INTEGER, &Type::REAL),
            Some(Type::REAL)
        );
        assert_eq!(binary_type(BinaryOp::Plus, &Type::REAL, &Type::LOGICAL), None);
    }

    #[test]
    fn test_real_division_rejects_integers() {
        assert_eq!(binary_type(BinaryOp::Slash, &Type::INTEGER, &Type::REAL), None);
        assert_eq!(
            binary_type(BinaryOp::Slash, &Type::REAL, &Type::REAL),
            Some(Type::REAL)
        );
        assert_eq!(binary_type(BinaryOp::Div, &Type::REAL, &Type::INTEGER), None);
    }

    #[test]
    fn test_comparisons_never_take_arrays() {
        assert_eq!(
            binary_type(BinaryOp::Equal, &Type::CHARACTER, &Type::CHARACTER),
            Some(Type::LOGICAL)
        );
        assert_eq!(
            binary_type(BinaryOp::Minor, &Type::INTEGER, &Type::REAL),
            Some(Type::LOGICAL)
        );
        assert_eq!(
            binary_type(BinaryOp::Equal, &Type::string(3), &Type::string(3)),
            None
        );
        assert_eq!(binary_type(BinaryOp::Equal, &Type::LOGICAL, &Type::INTEGER), None);
    }

    #[test]
    fn test_literal_types() {
        assert_eq!(literal_type(&Literal::Text("a".into())), Type::CHARACTER);
        assert_eq!(literal_type(&Literal::Text("abc".into())), Type::string(3));
        assert_eq!(literal_type(&Literal::Text(String::new())), Type::string(0));
    }
}
