//! HIR to bytecode lowering
//!
//! Modules are laid out main first, then user modules in declaration order.
//! Every statement is generated knowing its absolute base address, so jump
//! targets are computed from the lengths of code already generated and no
//! instruction is ever patched.

use super::ir::*;
use crate::ast::{BinaryOp, ModuleKind, UnaryOp};
use crate::diagnostics::CompileError;
use crate::hir::*;
use crate::resolve::symbols::SymbolTable;
use crate::types::Type;
use crate::value::Value;

type Code = Result<Vec<Instruction>, CompileError>;

/// Lower a checked program to bytecode
pub fn lower(hir: &Hir) -> Result<Program, CompileError> {
    let lowering = Lowering::new();
    lowering.lower_program(hir)
}

/// Lowering context
struct Lowering {
    program: Program,
    /// `para` nesting depth inside the current module
    depth: usize,
}

impl Lowering {
    fn new() -> Self {
        Self {
            program: Program::default(),
            depth: 0,
        }
    }

    fn lower_program(mut self, hir: &Hir) -> Result<Program, CompileError> {
        for module in hir.modules.values() {
            self.program
                .templates
                .insert(module.name.clone(), template_of(module));

            let start = self.program.code.len();
            self.depth = 0;
            let mut code = self.block(&module.body, start)?;
            match module.kind {
                // main falls off the end of its range
                ModuleKind::Main => {}
                ModuleKind::Procedure => code.push(Instruction::Return),
                ModuleKind::Function => code.push(Instruction::MissingReturn {
                    module: module.name.clone(),
                }),
            }
            self.program.code.extend(code);

            let range = AddressRange {
                start,
                end: self.program.code.len(),
            };
            tracing::debug!(
                "module `{}` at [{}, {})",
                module.name,
                range.start,
                range.end
            );
            self.program.ranges.insert(module.name.clone(), range);
        }
        tracing::debug!("generated {} instruction(s)", self.program.code.len());
        Ok(self.program)
    }

    /// Record a statement start
    fn map(&mut self, address: Address, line: u32) {
        // inner statements are recorded first and win
        self.program.statements.entry(address).or_insert(line);
        self.program
            .lines
            .entry(line)
            .and_modify(|a| *a = (*a).min(address))
            .or_insert(address);
    }

    // ==================== STATEMENTS ====================

    fn block(&mut self, stmts: &[HirStmt], base: Address) -> Code {
        let mut code = Vec::new();
        for stmt in stmts {
            let part = self.stmt(stmt, base + code.len())?;
            code.extend(part);
        }
        Ok(code)
    }

    fn stmt(&mut self, stmt: &HirStmt, base: Address) -> Code {
        let code = match &stmt.kind {
            HirStmtKind::Assign { target, value } => self.assign(target, value)?,
            HirStmtKind::Call(call) => self.call(call)?,
            HirStmtKind::Read(args) => {
                let mut code = Vec::new();
                for arg in args {
                    let inv = arg
                        .as_invocation()
                        .ok_or_else(|| internal("`leer` argument is not a variable"))?;
                    code.extend(self.indexes(inv)?);
                    code.push(Instruction::Read {
                        name: inv.name.clone(),
                        ty: inv.ty().ok_or_else(|| internal("untyped `leer` target"))?,
                    });
                    code.push(Instruction::Store {
                        name: inv.name.clone(),
                        indexes: inv.indexes.len(),
                    });
                }
                code
            }
            HirStmtKind::Write(args) => {
                let mut code = Vec::new();
                for arg in args {
                    code.extend(self.write_arg(arg)?);
                }
                code
            }
            HirStmtKind::If {
                cond,
                then_branch,
                else_branch,
            } => self.if_stmt(cond, then_branch, else_branch, base)?,
            HirStmtKind::While { cond, body } => {
                let mut code = self.expr(cond)?;
                let body_base = base + code.len() + 1;
                let body = self.block(body, body_base)?;
                let end = body_base + body.len() + 1;
                code.push(Instruction::JumpIfFalse(end));
                code.extend(body);
                code.push(Instruction::Jump(base));
                code
            }
            HirStmtKind::Until {
                body,
                cond,
                cond_span,
            } => {
                let mut code = self.block(body, base)?;
                self.map(base + code.len(), cond_span.line);
                code.extend(self.expr(cond)?);
                code.push(Instruction::JumpIfFalse(base));
                code
            }
            HirStmtKind::For {
                counter,
                from,
                to,
                body,
            } => self.for_stmt(counter, from, to, body, base, stmt.span.line)?,
            HirStmtKind::Return(value) => {
                let mut code = self.expr(value)?;
                code.push(Instruction::Return);
                code
            }
        };
        if !code.is_empty() {
            self.map(base, stmt.span.line);
        }
        Ok(code)
    }

    fn assign(&self, target: &HirInvocation, value: &HirExpr) -> Code {
        let mut code = self.indexes(target)?;
        let target_is_array = target.ty().is_some_and(|t| t.is_array());
        if let Some(source) = value.as_invocation().filter(|_| target_is_array) {
            if source.ty().is_some_and(|t| t.is_array()) {
                code.extend(self.indexes(source)?);
                code.push(Instruction::CopyArray {
                    target: target.name.clone(),
                    target_indexes: target.indexes.len(),
                    source: source.name.clone(),
                    source_indexes: source.indexes.len(),
                });
                return Ok(code);
            }
        }
        code.extend(self.expr(value)?);
        code.push(Instruction::Store {
            name: target.name.clone(),
            indexes: target.indexes.len(),
        });
        Ok(code)
    }

    fn if_stmt(
        &mut self,
        cond: &HirExpr,
        then_branch: &[HirStmt],
        else_branch: &[HirStmt],
        base: Address,
    ) -> Code {
        let then_silent = is_silent(then_branch);
        let else_silent = is_silent(else_branch);
        if then_silent && else_silent {
            return Ok(Vec::new());
        }

        let mut code = self.expr(cond)?;
        let first_base = base + code.len() + 1;
        if else_silent {
            let then_code = self.block(then_branch, first_base)?;
            code.push(Instruction::JumpIfFalse(first_base + then_code.len()));
            code.extend(then_code);
        } else if then_silent {
            let else_code = self.block(else_branch, first_base)?;
            code.push(Instruction::JumpIfTrue(first_base + else_code.len()));
            code.extend(else_code);
        } else {
            let then_code = self.block(then_branch, first_base)?;
            let else_base = first_base + then_code.len() + 1;
            let else_code = self.block(else_branch, else_base)?;
            let end = else_base + else_code.len();
            code.push(Instruction::JumpIfFalse(else_base));
            code.extend(then_code);
            code.push(Instruction::Jump(end));
            code.extend(else_code);
        }
        Ok(code)
    }

    fn for_stmt(
        &mut self,
        counter: &HirInvocation,
        from: &HirExpr,
        to: &HirExpr,
        body: &[HirStmt],
        base: Address,
        line: u32,
    ) -> Code {
        let slot = self.depth;
        let store = Instruction::Store {
            name: counter.name.clone(),
            indexes: counter.indexes.len(),
        };
        let load = Instruction::Load {
            name: counter.name.clone(),
            indexes: counter.indexes.len(),
        };

        let mut code = self.indexes(counter)?;
        code.extend(self.expr(from)?);
        code.push(store.clone());
        code.extend(self.expr(to)?);
        code.push(Instruction::SetBound(slot));

        let test = base + code.len();
        let mut test_code = self.indexes(counter)?;
        test_code.push(load.clone());
        test_code.push(Instruction::LoadBound(slot));
        test_code.push(Instruction::Gt);

        let body_base = test + test_code.len() + 1;
        self.depth += 1;
        let body = self.block(body, body_base);
        self.depth -= 1;
        let body = body?;

        let mut step = self.indexes(counter)?;
        step.extend(self.indexes(counter)?);
        step.push(load);
        step.push(Instruction::Push(Value::Integer(1)));
        step.push(Instruction::Add);
        step.push(store);

        let end = body_base + body.len() + step.len() + 1;
        code.extend(test_code);
        code.push(Instruction::JumpIfTrue(end));
        code.extend(body);
        code.extend(step);
        code.push(Instruction::Jump(test));

        self.map(test, line);
        Ok(code)
    }

    /// `escribir` argument: arrays expand to one load per cell
    fn write_arg(&self, arg: &HirExpr) -> Code {
        let array = arg
            .as_invocation()
            .and_then(|inv| inv.ty().filter(Type::is_array).map(|ty| (inv, ty)));
        let Some((inv, ty)) = array else {
            let mut code = self.expr(arg)?;
            code.push(Instruction::Write { cells: 1 });
            return Ok(code);
        };

        let dims = ty.dims();
        let cells = ty.cell_count();
        let mut counter = vec![1i64; dims.len()];
        let mut code = Vec::new();
        for _ in 0..cells {
            code.extend(self.indexes(inv)?);
            code.extend(counter.iter().map(|&i| Instruction::Push(Value::Integer(i))));
            code.push(Instruction::Load {
                name: inv.name.clone(),
                indexes: inv.indexes.len() + dims.len(),
            });
            // row-major: rightmost dimension fastest
            for d in (0..dims.len()).rev() {
                counter[d] += 1;
                if counter[d] <= dims[d] as i64 {
                    break;
                }
                counter[d] = 1;
            }
        }
        code.push(Instruction::Write { cells });
        Ok(code)
    }

    fn call(&self, call: &HirCall) -> Code {
        let mut code = vec![Instruction::Alloc {
            module: call.callee.clone(),
        }];
        for (param, arg) in call.signature.params.iter().zip(&call.args) {
            let array_source = arg
                .as_invocation()
                .filter(|inv| inv.ty().is_some_and(|t| t.is_array()));
            if param.by_ref {
                let inv = arg
                    .as_invocation()
                    .ok_or_else(|| internal("reference argument is not a variable"))?;
                code.extend(self.indexes(inv)?);
                code.push(Instruction::BindRef {
                    param: param.name.clone(),
                    source: inv.name.clone(),
                    indexes: inv.indexes.len(),
                });
            } else if let Some(inv) = array_source.filter(|_| param.ty.is_array()) {
                code.extend(self.indexes(inv)?);
                code.push(Instruction::InitArray {
                    param: param.name.clone(),
                    source: inv.name.clone(),
                    indexes: inv.indexes.len(),
                });
            } else {
                code.extend(self.expr(arg)?);
                code.push(Instruction::StoreParam {
                    param: param.name.clone(),
                });
            }
        }
        code.push(Instruction::Invoke {
            module: call.callee.clone(),
        });
        Ok(code)
    }

    // ==================== EXPRESSIONS ====================

    fn indexes(&self, inv: &HirInvocation) -> Code {
        let mut code = Vec::new();
        for index in &inv.indexes {
            code.extend(self.expr(index)?);
        }
        Ok(code)
    }

    /// Postfix code for an expression
    fn expr(&self, expr: &HirExpr) -> Code {
        if expr.ty.is_none() {
            return Err(internal("untyped expression reached the generator"));
        }
        let code = match &expr.kind {
            HirExprKind::Literal(lit) => vec![Instruction::Push(Value::from_literal(lit))],
            HirExprKind::Invocation(inv) => {
                let mut code = self.indexes(inv)?;
                code.push(Instruction::Load {
                    name: inv.name.clone(),
                    indexes: inv.indexes.len(),
                });
                code
            }
            HirExprKind::Call(call) => self.call(call)?,
            HirExprKind::Binary { op, lhs, rhs } => {
                let mut code = self.expr(lhs)?;
                code.extend(self.expr(rhs)?);
                code.push(binary_instruction(*op));
                code
            }
            HirExprKind::Unary { op, operand } => {
                let mut code = self.expr(operand)?;
                code.push(match op {
                    UnaryOp::Neg => Instruction::Neg,
                    UnaryOp::Not => Instruction::Not,
                });
                code
            }
        };
        Ok(code)
    }
}

/// Whether a statement list generates no code at all
pub fn is_silent(stmts: &[HirStmt]) -> bool {
    stmts.iter().all(|stmt| match &stmt.kind {
        HirStmtKind::If {
            then_branch,
            else_branch,
            ..
        } => is_silent(then_branch) && is_silent(else_branch),
        _ => false,
    })
}

fn binary_instruction(op: BinaryOp) -> Instruction {
    match op {
        BinaryOp::Plus => Instruction::Add,
        BinaryOp::Minus => Instruction::Sub,
        BinaryOp::Times => Instruction::Mul,
        BinaryOp::Power => Instruction::Pow,
        BinaryOp::Slash => Instruction::Slash,
        BinaryOp::Div => Instruction::Div,
        BinaryOp::Mod => Instruction::Mod,
        BinaryOp::Minor => Instruction::Lt,
        BinaryOp::MinorEq => Instruction::Le,
        BinaryOp::Major => Instruction::Gt,
        BinaryOp::MajorEq => Instruction::Ge,
        BinaryOp::Equal => Instruction::Eq,
        BinaryOp::Different => Instruction::Ne,
        BinaryOp::And => Instruction::And,
        BinaryOp::Or => Instruction::Or,
    }
}

fn template_of(module: &HirModule) -> Template {
    Template {
        module: module.name.clone(),
        kind: module.kind,
        params: module.symbols.params().map(|p| p.name.clone()).collect(),
        slots: slots_of(&module.symbols),
    }
}

fn slots_of(symbols: &SymbolTable) -> indexmap::IndexMap<String, Slot> {
    symbols
        .iter()
        .map(|symbol| {
            let slot = if symbol.by_ref {
                Slot::Reference
            } else if symbol.dims.is_empty() {
                Slot::Scalar(symbol.element)
            } else {
                Slot::Vector {
                    kind: symbol.element,
                    dims: symbol.dims.clone(),
                }
            };
            (symbol.name.clone(), slot)
        })
        .collect()
}

fn internal(message: &str) -> CompileError {
    CompileError::Internal(message.to_string())
}
