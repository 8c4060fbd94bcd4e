//! Tree-walking interpreter for HIR

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use indexmap::IndexMap;
use thiserror::Error;

use crate::ast::{BinaryOp, ModuleKind};
use crate::bytecode::is_silent;
use crate::hir::*;
use crate::resolve::symbols::SymbolTable;
use crate::types::AtomicKind;
use crate::value::{ArithmeticError, Value};
use crate::vm::{copy_region, fill_region, region, OutOfBounds, SizeMismatch, VmError};

/// Interpreter failure
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InterpError {
    /// The same faults the virtual machine reports
    #[error(transparent)]
    Fault(#[from] VmError),

    #[error("`leer` needs more input than was supplied")]
    InputExhausted,
}

/// Non-local control flow
enum Flow {
    Return(Value),
    Fault(InterpError),
}

impl From<VmError> for Flow {
    fn from(error: VmError) -> Self {
        Flow::Fault(InterpError::Fault(error))
    }
}

impl From<ArithmeticError> for Flow {
    fn from(error: ArithmeticError) -> Self {
        Flow::from(VmError::Arithmetic(error))
    }
}

/// View on shared storage: a whole variable, a slice or a single cell
#[derive(Debug, Clone)]
struct Storage {
    cells: Rc<RefCell<Vec<Option<Value>>>>,
    offset: usize,
    kind: AtomicKind,
    dims: Vec<usize>,
    name: String,
}

impl Storage {
    fn new(name: &str, kind: AtomicKind, dims: &[usize]) -> Self {
        let len = dims.iter().product();
        Self {
            cells: Rc::new(RefCell::new(vec![None; len])),
            offset: 0,
            kind,
            dims: dims.to_vec(),
            name: name.to_string(),
        }
    }

    fn len(&self) -> usize {
        self.dims.iter().product()
    }

    fn view(&self, prefix: &[i64]) -> Result<Storage, VmError> {
        let (start, _) = region(&self.dims, prefix).map_err(|e| self.out_of_bounds(e))?;
        Ok(Storage {
            cells: Rc::clone(&self.cells),
            offset: self.offset + start,
            kind: self.kind,
            dims: self.dims[prefix.len()..].to_vec(),
            name: self.name.clone(),
        })
    }

    fn read(&self) -> Vec<Option<Value>> {
        self.cells.borrow()[self.offset..self.offset + self.len()].to_vec()
    }

    /// Value of the whole view; every cell must be initialized
    fn value(&self) -> Result<Value, VmError> {
        let uninitialized = || VmError::Uninitialized {
            name: self.name.clone(),
        };
        let mut values = self
            .read()
            .into_iter()
            .map(|cell| cell.ok_or_else(uninitialized))
            .collect::<Result<Vec<_>, _>>()?;
        if self.dims.is_empty() {
            values.pop().ok_or_else(uninitialized)
        } else {
            Ok(Value::Array(values))
        }
    }

    fn fill(&self, value: Value) -> Result<(), VmError> {
        let range = self.offset..self.offset + self.len();
        fill_region(&mut self.cells.borrow_mut()[range], self.kind, value)
            .map_err(|e| self.mismatch(e))
    }

    fn copy(&self, source: Vec<Option<Value>>) -> Result<(), VmError> {
        let range = self.offset..self.offset + self.len();
        copy_region(&mut self.cells.borrow_mut()[range], self.kind, source)
            .map_err(|e| self.mismatch(e))
    }

    fn out_of_bounds(&self, error: OutOfBounds) -> VmError {
        VmError::IndexOutOfBounds {
            name: self.name.clone(),
            index: error.index,
            dimension: error.dimension,
            size: error.size,
        }
    }

    fn mismatch(&self, error: SizeMismatch) -> VmError {
        VmError::Internal(format!(
            "{} value(s) do not fit the {} cell(s) of `{}`",
            error.values, error.cells, self.name
        ))
    }
}

type Frame = IndexMap<String, Storage>;

/// Tree-walking interpreter
pub struct Interpreter<'h> {
    hir: &'h Hir,
    globals: Frame,
    frames: Vec<Frame>,
    input: VecDeque<Value>,
    output: Vec<Value>,
    max_call_depth: usize,
}

impl<'h> Interpreter<'h> {
    /// Create a new interpreter
    pub fn new(hir: &'h Hir) -> Self {
        Interpreter {
            hir,
            globals: Frame::new(),
            frames: Vec::new(),
            input: VecDeque::new(),
            output: Vec::new(),
            max_call_depth: 1_000,
        }
    }

    /// Values consumed by `leer`, in order
    pub fn with_input(mut self, input: impl IntoIterator<Item = Value>) -> Self {
        self.input.extend(input);
        self
    }

    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    /// Get captured output
    pub fn output(&self) -> &[Value] {
        &self.output
    }

    /// Value of a global variable, if fully initialized
    pub fn value_of(&self, name: &str) -> Option<Value> {
        self.globals.get(name)?.value().ok()
    }

    /// Raw cells of a global variable
    pub fn cells_of(&self, name: &str) -> Option<Vec<Option<Value>>> {
        self.globals.get(name).map(Storage::read)
    }

    /// Interpret the main module
    pub fn run(&mut self) -> Result<(), InterpError> {
        let main = self
            .hir
            .main()
            .ok_or_else(|| VmError::Internal("program has no main module".into()))?;
        self.globals = frame_of(&main.symbols);
        self.frames.clear();

        match self.exec_block(&main.body) {
            Ok(()) => Ok(()),
            Err(Flow::Fault(error)) => Err(error),
            Err(Flow::Return(_)) => Err(VmError::Internal("return from the main module".into()).into()),
        }
    }

    // ==================== STATEMENTS ====================

    fn exec_block(&mut self, stmts: &[HirStmt]) -> Result<(), Flow> {
        for stmt in stmts {
            self.exec_stmt(stmt)?;
        }
        Ok(())
    }

    fn exec_stmt(&mut self, stmt: &HirStmt) -> Result<(), Flow> {
        match &stmt.kind {
            HirStmtKind::Assign { target, value } => {
                let target_indexes = self.indexes(target)?;
                let source = value
                    .as_invocation()
                    .filter(|inv| inv.ty().is_some_and(|t| t.is_array()));
                match source {
                    Some(source) if target.ty().is_some_and(|t| t.is_array()) => {
                        let source_indexes = self.indexes(source)?;
                        let cells = self.place(source, &source_indexes)?.read();
                        self.place(target, &target_indexes)?.copy(cells)?;
                    }
                    _ => {
                        let value = self.eval(value)?;
                        self.place(target, &target_indexes)?.fill(value)?;
                    }
                }
            }
            HirStmtKind::Call(call) => {
                self.call(call)?;
            }
            HirStmtKind::Read(args) => {
                for arg in args {
                    let inv = arg
                        .as_invocation()
                        .ok_or_else(|| VmError::Internal("`leer` argument is not a variable".into()))?;
                    let indexes = self.indexes(inv)?;
                    let value = self
                        .input
                        .pop_front()
                        .ok_or(Flow::Fault(InterpError::InputExhausted))?;
                    let ty = inv
                        .ty()
                        .ok_or_else(|| VmError::Internal("untyped `leer` target".into()))?;
                    if !value.fits(&ty) {
                        let error = match (value.as_text(), ty.text_capacity()) {
                            (Some(text), Some(capacity)) => VmError::LongInput {
                                name: inv.name.clone(),
                                length: text.chars().count(),
                                capacity,
                            },
                            _ => VmError::InputMismatch {
                                name: inv.name.clone(),
                                expected: ty.to_string(),
                                found: value.type_name().to_string(),
                            },
                        };
                        return Err(error.into());
                    }
                    let value = match ty.atomic() {
                        Some(kind) => value.coerce(kind),
                        None => value,
                    };
                    self.place(inv, &indexes)?.fill(value)?;
                }
            }
            HirStmtKind::Write(args) => {
                for arg in args {
                    let array = arg
                        .as_invocation()
                        .filter(|inv| inv.ty().is_some_and(|t| t.is_array()));
                    let value = match array {
                        Some(inv) => {
                            let indexes = self.indexes(inv)?;
                            let storage = self.place(inv, &indexes)?;
                            match storage.value()? {
                                Value::Array(mut cells) if cells.len() == 1 => {
                                    cells.pop().ok_or_else(|| VmError::Internal("empty array".into()))?
                                }
                                value => value,
                            }
                        }
                        None => self.eval(arg)?,
                    };
                    self.output.push(value);
                }
            }
            HirStmtKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                if is_silent(then_branch) && is_silent(else_branch) {
                    return Ok(());
                }
                if self.eval_logical(cond)? {
                    self.exec_block(then_branch)?;
                } else {
                    self.exec_block(else_branch)?;
                }
            }
            HirStmtKind::While { cond, body } => {
                while self.eval_logical(cond)? {
                    self.exec_block(body)?;
                }
            }
            HirStmtKind::Until { body, cond, .. } => loop {
                self.exec_block(body)?;
                if self.eval_logical(cond)? {
                    break;
                }
            },
            HirStmtKind::For {
                counter,
                from,
                to,
                body,
            } => {
                let indexes = self.indexes(counter)?;
                let first = self.eval(from)?;
                self.place(counter, &indexes)?.fill(first)?;
                let bound = self.eval(to)?;
                loop {
                    let indexes = self.indexes(counter)?;
                    let current = self.place(counter, &indexes)?.value()?;
                    if Value::binary(BinaryOp::Major, &current, &bound)? == Value::Logical(true) {
                        break;
                    }
                    self.exec_block(body)?;
                    let store_at = self.indexes(counter)?;
                    let load_at = self.indexes(counter)?;
                    let current = self.place(counter, &load_at)?.value()?;
                    let next = Value::binary(BinaryOp::Plus, &current, &Value::Integer(1))?;
                    self.place(counter, &store_at)?.fill(next)?;
                }
            }
            HirStmtKind::Return(value) => {
                let value = self.eval(value)?;
                return Err(Flow::Return(value));
            }
        }
        Ok(())
    }

    fn call(&mut self, call: &HirCall) -> Result<Option<Value>, Flow> {
        let hir = self.hir;
        let module = hir
            .modules
            .get(&call.callee)
            .ok_or_else(|| VmError::Internal(format!("no module `{}`", call.callee)))?;
        let mut frame = frame_of(&module.symbols);

        for (param, arg) in call.signature.params.iter().zip(&call.args) {
            let array_source = arg
                .as_invocation()
                .filter(|inv| inv.ty().is_some_and(|t| t.is_array()));
            if param.by_ref {
                let inv = arg
                    .as_invocation()
                    .ok_or_else(|| VmError::Internal("reference argument is not a variable".into()))?;
                let indexes = self.indexes(inv)?;
                let view = self.place(inv, &indexes)?;
                frame.insert(param.name.clone(), view);
            } else if let Some(inv) = array_source.filter(|_| param.ty.is_array()) {
                let indexes = self.indexes(inv)?;
                let cells = self.place(inv, &indexes)?.read();
                param_slot(&frame, &param.name)?.copy(cells)?;
            } else {
                let value = self.eval(arg)?;
                param_slot(&frame, &param.name)?.fill(value)?;
            }
        }

        if self.frames.len() >= self.max_call_depth {
            return Err(VmError::CallDepth {
                limit: self.max_call_depth,
            }
            .into());
        }
        self.frames.push(frame);
        let result = self.exec_block(&module.body);
        self.frames.pop();

        match result {
            Ok(()) if module.kind == ModuleKind::Function => Err(VmError::MissingReturn {
                module: module.name.clone(),
            }
            .into()),
            Ok(()) => Ok(None),
            Err(Flow::Return(value)) => Ok(Some(value)),
            Err(fault) => Err(fault),
        }
    }

    // ==================== EXPRESSIONS ====================

    fn eval(&mut self, expr: &HirExpr) -> Result<Value, Flow> {
        match &expr.kind {
            HirExprKind::Literal(lit) => Ok(Value::from_literal(lit)),
            HirExprKind::Invocation(inv) => {
                let indexes = self.indexes(inv)?;
                Ok(self.place(inv, &indexes)?.value()?)
            }
            HirExprKind::Call(call) => self
                .call(call)?
                .ok_or_else(|| VmError::Internal(format!("`{}` returned nothing", call.callee)).into()),
            HirExprKind::Binary { op, lhs, rhs } => {
                // both operands are always evaluated
                let lhs = self.eval(lhs)?;
                let rhs = self.eval(rhs)?;
                Ok(Value::binary(*op, &lhs, &rhs)?)
            }
            HirExprKind::Unary { op, operand } => {
                let operand = self.eval(operand)?;
                Ok(Value::unary(*op, &operand)?)
            }
        }
    }

    fn eval_logical(&mut self, expr: &HirExpr) -> Result<bool, Flow> {
        let value = self.eval(expr)?;
        value
            .as_logical()
            .ok_or_else(|| VmError::Internal(format!("expected a logical, found {value:?}")).into())
    }

    fn indexes(&mut self, inv: &HirInvocation) -> Result<Vec<i64>, Flow> {
        let mut indexes = Vec::with_capacity(inv.indexes.len());
        for index in &inv.indexes {
            let value = self.eval(index)?;
            let index = value
                .as_integer()
                .ok_or_else(|| VmError::Internal(format!("non-integer index {value:?}")))?;
            indexes.push(index);
        }
        Ok(indexes)
    }

    /// Storage addressed by an invocation: current frame first, then globals
    fn place(&self, inv: &HirInvocation, indexes: &[i64]) -> Result<Storage, VmError> {
        let storage = self
            .frames
            .last()
            .and_then(|frame| frame.get(&inv.name))
            .or_else(|| self.globals.get(&inv.name))
            .ok_or_else(|| VmError::Internal(format!("unknown variable `{}`", inv.name)))?;
        storage.view(indexes)
    }
}

/// Fresh storage for every non-reference variable of a module
fn frame_of(symbols: &SymbolTable) -> Frame {
    symbols
        .iter()
        .filter(|symbol| !symbol.by_ref)
        .map(|symbol| {
            (
                symbol.name.clone(),
                Storage::new(&symbol.name, symbol.element, &symbol.dims),
            )
        })
        .collect()
}

fn param_slot<'f>(frame: &'f Frame, name: &str) -> Result<&'f Storage, VmError> {
    frame
        .get(name)
        .ok_or_else(|| VmError::Internal(format!("no parameter `{name}`")))
}

impl From<InterpError> for Flow {
    fn from(error: InterpError) -> Self {
        Flow::Fault(error)
    }
}
