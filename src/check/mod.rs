//! Type checker for the pseudocode language
//!
//! Runs the typer over the decorated program and then validates:
//! - Assignment and argument compatibility
//! - Logical conditions and numeric loop counters and bounds
//! - By-reference arguments and `leer` targets
//! - String literal lengths against fixed-size character arrays
//! - `retornar` placement and value

pub mod typer;

use crate::ast::ModuleKind;
use crate::common::Span;
use crate::diagnostics::{sort_by_position, CompileError};
use crate::hir::*;
use crate::types::Type;

/// Type and check the program; diagnostics come back ordered by position
pub fn check(hir: &mut Hir) -> Result<(), Vec<CompileError>> {
    let mut errors = typer::type_program(hir);

    let mut checker = TypeChecker::new();
    for module in hir.modules.values() {
        checker.check_module(module);
    }
    errors.extend(checker.errors);

    if errors.is_empty() {
        tracing::debug!("program is well typed");
        Ok(())
    } else {
        sort_by_position(&mut errors);
        tracing::debug!("type checking found {} diagnostic(s)", errors.len());
        Err(errors)
    }
}

/// Type checker state
pub struct TypeChecker {
    /// Kind and return type of the module being checked
    module: Option<(ModuleKind, Option<Type>)>,
    /// Errors accumulated during checking
    errors: Vec<CompileError>,
}

impl Default for TypeChecker {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeChecker {
    pub fn new() -> Self {
        Self {
            module: None,
            errors: Vec::new(),
        }
    }

    pub fn check_module(&mut self, module: &HirModule) {
        self.module = Some((module.kind, module.signature.return_type.clone()));
        self.check_block(&module.body);
        self.module = None;
    }

    fn check_block(&mut self, stmts: &[HirStmt]) {
        for stmt in stmts {
            self.check_stmt(stmt);
        }
    }

    fn check_stmt(&mut self, stmt: &HirStmt) {
        match &stmt.kind {
            HirStmtKind::Assign { target, value } => {
                self.check_invocation(target);
                self.check_expr(value);
                if let Some(target_ty) = target.ty() {
                    self.check_assignable(&target_ty, value, stmt.span);
                }
            }
            HirStmtKind::Call(call) => self.check_call(call),
            HirStmtKind::Read(args) => {
                for arg in args {
                    self.check_expr(arg);
                    let Some(inv) = arg.as_invocation() else {
                        self.errors.push(CompileError::ReadTarget {
                            span: arg.span.into(),
                            line: arg.span.line,
                        });
                        continue;
                    };
                    if let Some(ty) = inv.ty() {
                        if ty.is_array() && !ty.is_text() {
                            self.errors.push(CompileError::UnreadableType {
                                found: ty.to_string(),
                                span: arg.span.into(),
                                line: arg.span.line,
                            });
                        }
                    }
                }
            }
            HirStmtKind::Write(args) => {
                for arg in args {
                    self.check_expr(arg);
                }
            }
            HirStmtKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.check_condition(cond);
                self.check_block(then_branch);
                self.check_block(else_branch);
            }
            HirStmtKind::While { cond, body } => {
                self.check_condition(cond);
                self.check_block(body);
            }
            HirStmtKind::Until { body, cond, .. } => {
                self.check_block(body);
                self.check_condition(cond);
            }
            HirStmtKind::For {
                counter,
                from,
                to,
                body,
            } => {
                self.check_invocation(counter);
                self.check_expr(from);
                self.check_expr(to);
                let counter_ty = counter.ty();
                if let Some(ty) = &counter_ty {
                    if !ty.is_numeric() {
                        self.errors.push(CompileError::CounterNotNumeric {
                            found: ty.to_string(),
                            span: counter.span.into(),
                            line: counter.span.line,
                        });
                    }
                }
                for bound in [from, to] {
                    if let Some(ty) = &bound.ty {
                        if !ty.is_numeric() {
                            self.errors.push(CompileError::BoundNotNumeric {
                                found: ty.to_string(),
                                span: bound.span.into(),
                                line: bound.span.line,
                            });
                        }
                    }
                }
                if let (Some(counter_ty), Some(from_ty)) = (&counter_ty, &from.ty) {
                    if counter_ty.is_numeric()
                        && from_ty.is_numeric()
                        && !counter_ty.accepts(from_ty)
                    {
                        self.errors.push(CompileError::IncompatibleAssignment {
                            target: counter_ty.to_string(),
                            value: from_ty.to_string(),
                            span: from.span.into(),
                            line: from.span.line,
                        });
                    }
                }
                self.check_block(body);
            }
            HirStmtKind::Return(value) => {
                self.check_expr(value);
                match &self.module {
                    Some((ModuleKind::Function, Some(expected))) => {
                        if let Some(found) = &value.ty {
                            if !expected.accepts(found) {
                                self.errors.push(CompileError::IncompatibleReturn {
                                    expected: expected.to_string(),
                                    found: found.to_string(),
                                    span: value.span.into(),
                                    line: value.span.line,
                                });
                            }
                        }
                    }
                    _ => self.errors.push(CompileError::ReturnOutsideFunction {
                        span: stmt.span.into(),
                        line: stmt.span.line,
                    }),
                }
            }
        }
    }

    /// Assignment rule, with the string literal capacity check first
    fn check_assignable(&mut self, target: &Type, value: &HirExpr, span: Span) {
        let Some(value_ty) = &value.ty else {
            return;
        };
        if let (Some(length), Some(capacity)) = (value.text_literal_len(), target.text_capacity())
        {
            if value_ty.is_array() {
                if length > capacity {
                    self.errors.push(CompileError::LongString {
                        target: target.to_string(),
                        length,
                        span: value.span.into(),
                        line: value.span.line,
                    });
                }
                return;
            }
        }
        if !target.accepts(value_ty) {
            self.errors.push(CompileError::IncompatibleAssignment {
                target: target.to_string(),
                value: value_ty.to_string(),
                span: span.into(),
                line: span.line,
            });
        }
    }

    fn check_condition(&mut self, cond: &HirExpr) {
        self.check_expr(cond);
        if let Some(ty) = &cond.ty {
            if !ty.is_logical() {
                self.errors.push(CompileError::ConditionNotLogical {
                    found: ty.to_string(),
                    span: cond.span.into(),
                    line: cond.span.line,
                });
            }
        }
    }

    fn check_call(&mut self, call: &HirCall) {
        for arg in &call.args {
            self.check_expr(arg);
        }

        let params = &call.signature.params;
        if params.len() != call.args.len() {
            self.errors.push(CompileError::ArityMismatch {
                name: call.callee.clone(),
                expected: params.len(),
                found: call.args.len(),
                span: call.span.into(),
                line: call.span.line,
            });
            return;
        }

        for (param, arg) in params.iter().zip(&call.args) {
            let Some(arg_ty) = &arg.ty else {
                continue;
            };
            if param.by_ref {
                if arg.as_invocation().is_none() {
                    self.errors.push(CompileError::BadReferenceArgument {
                        name: call.callee.clone(),
                        param: param.name.clone(),
                        span: arg.span.into(),
                        line: arg.span.line,
                    });
                } else if *arg_ty != param.ty {
                    self.incompatible_argument(call, &param.name, &param.ty, arg_ty, arg.span);
                }
                continue;
            }

            if let (Some(length), Some(capacity)) =
                (arg.text_literal_len(), param.ty.text_capacity())
            {
                if arg_ty.is_array() {
                    if length > capacity {
                        self.errors.push(CompileError::LongString {
                            target: param.ty.to_string(),
                            length,
                            span: arg.span.into(),
                            line: arg.span.line,
                        });
                    }
                    continue;
                }
            }
            if !param.ty.accepts(arg_ty) {
                self.incompatible_argument(call, &param.name, &param.ty, arg_ty, arg.span);
            }
        }
    }

    fn incompatible_argument(
        &mut self,
        call: &HirCall,
        param: &str,
        expected: &Type,
        found: &Type,
        span: Span,
    ) {
        self.errors.push(CompileError::IncompatibleArgument {
            name: call.callee.clone(),
            param: param.to_string(),
            expected: expected.to_string(),
            found: found.to_string(),
            span: span.into(),
            line: span.line,
        });
    }

    fn check_invocation(&mut self, inv: &HirInvocation) {
        for index in &inv.indexes {
            self.check_expr(index);
            if let Some(ty) = &index.ty {
                if *ty != Type::INTEGER {
                    self.errors.push(CompileError::IndexNotInteger {
                        found: ty.to_string(),
                        span: index.span.into(),
                        line: index.span.line,
                    });
                }
            }
        }
    }

    /// Nested calls and subscripts inside an expression
    fn check_expr(&mut self, expr: &HirExpr) {
        match &expr.kind {
            HirExprKind::Literal(_) => {}
            HirExprKind::Invocation(inv) => self.check_invocation(inv),
            HirExprKind::Call(call) => self.check_call(call),
            HirExprKind::Binary { lhs, rhs, .. } => {
                self.check_expr(lhs);
                self.check_expr(rhs);
            }
            HirExprKind::Unary { operand, .. } => self.check_expr(operand),
        }
    }
}
