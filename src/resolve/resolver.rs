//! Reference resolution pass
//!
//! Binds every variable invocation to its declaration and every call site to
//! the callee signature. All diagnostics of a run are accumulated; the
//! decorated tree is only returned when there are none.

use super::declarations::{self, Extracted};
use super::symbols::*;
use crate::ast::*;
use crate::diagnostics::{sort_by_position, CompileError};
use crate::hir::*;
use crate::types::Type;
use indexmap::IndexMap;

/// Built-in output procedure
pub const WRITE: &str = "escribir";
/// Built-in input procedure
pub const READ: &str = "leer";

/// Resolve names in a parsed program
pub fn resolve(program: &ParsedProgram) -> Result<Hir, Vec<CompileError>> {
    let resolver = Resolver::new();
    resolver.resolve(program)
}

/// Name resolver
pub struct Resolver {
    signatures: IndexMap<String, Signature>,
    globals: SymbolTable,
    errors: Vec<CompileError>,
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new()
    }
}

impl Resolver {
    pub fn new() -> Self {
        Self {
            signatures: IndexMap::new(),
            globals: SymbolTable::new(MAIN_MODULE),
            errors: Vec::new(),
        }
    }

    /// Resolve all modules of the program
    pub fn resolve(mut self, program: &ParsedProgram) -> Result<Hir, Vec<CompileError>> {
        let modules: Vec<&Module> = std::iter::once(&program.main)
            .chain(program.modules.values())
            .collect();

        // First pass: symbol tables and signatures
        let mut extracted: Vec<Extracted> = Vec::with_capacity(modules.len());
        for module in &modules {
            self.signatures
                .insert(module.name.clone(), signature_of(module));
            match declarations::extract(module) {
                Ok(e) => extracted.push(e),
                Err(errors) => self.errors.extend(errors),
            }
        }
        if !self.errors.is_empty() {
            sort_by_position(&mut self.errors);
            return Err(self.errors);
        }
        self.globals = extracted[0].symbols.clone();

        // Second pass: bodies
        let mut resolved = IndexMap::new();
        for (module, Extracted { symbols, body }) in modules.into_iter().zip(extracted) {
            let hir_body = self.resolve_block(&body, &symbols);
            let signature = self.signatures[&module.name].clone();
            resolved.insert(
                module.name.clone(),
                HirModule {
                    name: module.name.clone(),
                    kind: module.kind,
                    signature,
                    symbols,
                    body: hir_body,
                    span: module.span,
                },
            );
        }

        if !self.errors.is_empty() {
            sort_by_position(&mut self.errors);
            return Err(self.errors);
        }
        tracing::debug!("resolved {} module(s)", resolved.len());
        Ok(Hir { modules: resolved })
    }

    // ==================== STATEMENTS ====================

    fn resolve_block(&mut self, stmts: &[Stmt], locals: &SymbolTable) -> Vec<HirStmt> {
        stmts
            .iter()
            .filter_map(|stmt| self.resolve_stmt(stmt, locals))
            .collect()
    }

    fn resolve_stmt(&mut self, stmt: &Stmt, locals: &SymbolTable) -> Option<HirStmt> {
        let kind = match &stmt.kind {
            // removed by the declaration extractor
            StmtKind::Declare(_) => return None,
            StmtKind::Assign { target, value } => {
                let target = self.resolve_invocation(target, locals);
                let value = self.resolve_expr(value, locals);
                HirStmtKind::Assign {
                    target: target?,
                    value: value?,
                }
            }
            StmtKind::Call(call) => self.resolve_call_stmt(call, locals)?,
            StmtKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let cond = self.resolve_expr(cond, locals);
                let then_branch = self.resolve_block(then_branch, locals);
                let else_branch = self.resolve_block(else_branch, locals);
                HirStmtKind::If {
                    cond: cond?,
                    then_branch,
                    else_branch,
                }
            }
            StmtKind::While { cond, body } => {
                let cond = self.resolve_expr(cond, locals);
                let body = self.resolve_block(body, locals);
                HirStmtKind::While { cond: cond?, body }
            }
            StmtKind::Until {
                body,
                cond,
                cond_span,
            } => {
                let body = self.resolve_block(body, locals);
                let cond = self.resolve_expr(cond, locals);
                HirStmtKind::Until {
                    body,
                    cond: cond?,
                    cond_span: *cond_span,
                }
            }
            StmtKind::For {
                counter,
                from,
                to,
                body,
            } => {
                let counter = self.resolve_invocation(counter, locals);
                let from = self.resolve_expr(from, locals);
                let to = self.resolve_expr(to, locals);
                let body = self.resolve_block(body, locals);
                HirStmtKind::For {
                    counter: counter?,
                    from: from?,
                    to: to?,
                    body,
                }
            }
            StmtKind::Return(value) => HirStmtKind::Return(self.resolve_expr(value, locals)?),
        };
        Some(HirStmt {
            kind,
            span: stmt.span,
        })
    }

    fn resolve_call_stmt(&mut self, call: &Call, locals: &SymbolTable) -> Option<HirStmtKind> {
        if call.name == WRITE || call.name == READ {
            let args = self.resolve_args(&call.args, locals);
            if call.args.is_empty() {
                self.errors.push(CompileError::MissingArguments {
                    name: call.name.clone(),
                    span: call.span.into(),
                    line: call.span.line,
                });
                return None;
            }
            let args = args?;
            return Some(if call.name == WRITE {
                HirStmtKind::Write(args)
            } else {
                HirStmtKind::Read(args)
            });
        }

        let call = self.resolve_call(call, locals)?;
        if call.signature.is_function() {
            self.errors.push(CompileError::UnusedResult {
                name: call.callee.clone(),
                span: call.span.into(),
                line: call.span.line,
            });
            return None;
        }
        Some(HirStmtKind::Call(call))
    }

    // ==================== EXPRESSIONS ====================

    fn resolve_expr(&mut self, expr: &Expr, locals: &SymbolTable) -> Option<HirExpr> {
        let kind = match &expr.kind {
            ExprKind::Literal(lit) => HirExprKind::Literal(lit.clone()),
            ExprKind::Invocation(inv) => {
                HirExprKind::Invocation(self.resolve_invocation(inv, locals)?)
            }
            ExprKind::Call(call) => {
                if call.name == WRITE || call.name == READ {
                    self.resolve_args(&call.args, locals);
                    self.not_a_function(call);
                    return None;
                }
                let call_site = self.resolve_call(call, locals)?;
                if !call_site.signature.is_function() {
                    self.not_a_function(call);
                    return None;
                }
                HirExprKind::Call(call_site)
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let lhs = self.resolve_expr(lhs, locals);
                let rhs = self.resolve_expr(rhs, locals);
                HirExprKind::Binary {
                    op: *op,
                    lhs: Box::new(lhs?),
                    rhs: Box::new(rhs?),
                }
            }
            ExprKind::Unary { op, operand } => HirExprKind::Unary {
                op: *op,
                operand: Box::new(self.resolve_expr(operand, locals)?),
            },
        };
        Some(HirExpr::new(kind, expr.span))
    }

    fn resolve_args(&mut self, args: &[Expr], locals: &SymbolTable) -> Option<Vec<HirExpr>> {
        let resolved: Vec<_> = args
            .iter()
            .map(|arg| self.resolve_expr(arg, locals))
            .collect();
        resolved.into_iter().collect()
    }

    fn resolve_call(&mut self, call: &Call, locals: &SymbolTable) -> Option<HirCall> {
        let args = self.resolve_args(&call.args, locals);
        let Some(signature) = self.signatures.get(&call.name).cloned() else {
            self.errors.push(CompileError::UndefinedModule {
                name: call.name.clone(),
                span: call.span.into(),
                line: call.span.line,
            });
            return None;
        };
        // calling the main module is not possible
        if signature.kind == ModuleKind::Main {
            self.errors.push(CompileError::UndefinedModule {
                name: call.name.clone(),
                span: call.span.into(),
                line: call.span.line,
            });
            return None;
        }
        Some(HirCall {
            callee: call.name.clone(),
            signature,
            args: args?,
            span: call.span,
        })
    }

    fn resolve_invocation(
        &mut self,
        inv: &Invocation,
        locals: &SymbolTable,
    ) -> Option<HirInvocation> {
        let indexes = self.resolve_args(&inv.indexes, locals);

        let var = if let Some(symbol) = locals.lookup(&inv.name) {
            VarRef {
                scope: Scope::Local,
                symbol: symbol.clone(),
            }
        } else if let Some(symbol) = self.globals.lookup(&inv.name) {
            VarRef {
                scope: Scope::Global,
                symbol: symbol.clone(),
            }
        } else {
            self.errors.push(CompileError::UndefinedVariable {
                name: inv.name.clone(),
                span: inv.span.into(),
                line: inv.span.line,
            });
            return None;
        };

        if inv.indexes.len() > var.symbol.dims.len() {
            self.errors.push(CompileError::TooManyIndexes {
                name: inv.name.clone(),
                declared: var.symbol.dims.len(),
                supplied: inv.indexes.len(),
                span: inv.span.into(),
                line: inv.span.line,
            });
            return None;
        }

        Some(HirInvocation {
            name: inv.name.clone(),
            indexes: indexes?,
            var,
            span: inv.span,
        })
    }

    fn not_a_function(&mut self, call: &Call) {
        self.errors.push(CompileError::NotAFunction {
            name: call.name.clone(),
            span: call.span.into(),
            line: call.span.line,
        });
    }
}

fn signature_of(module: &Module) -> Signature {
    Signature {
        name: module.name.clone(),
        kind: module.kind,
        params: module
            .params
            .iter()
            .map(|p| ParamSig {
                name: p.name.clone(),
                ty: Type::declared(p.kind, &p.dims),
                by_ref: p.by_ref,
            })
            .collect(),
        return_type: module.return_type.map(Type::Atomic),
    }
}
