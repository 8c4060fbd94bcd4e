//! The virtual machine

use super::error::VmError;
use super::memory::{
    copy_region, fill_region, region, Binding, Memory, OutOfBounds, SizeMismatch, Target,
};
use super::{ReadRequest, State, Stop, StopReason};
use crate::ast::{BinaryOp, UnaryOp};
use crate::bytecode::{Address, Instruction, Program};
use crate::config::VmConfig;
use crate::value::Value;
use std::collections::BTreeSet;
use std::rc::Rc;

/// Frame of the call stack
#[derive(Debug, Clone)]
struct Activation {
    module: String,
    memory: Memory,
    return_address: Address,
    /// `para` bound registers, indexed by loop depth
    bounds: Vec<Value>,
}

/// Where a resolved variable lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Place {
    Global,
    Frame(usize),
}

/// A variable after reference chasing, with the full subscript list
#[derive(Debug, Clone)]
struct Location {
    place: Place,
    name: String,
    indexes: Vec<i64>,
}

/// Stack machine
pub struct Machine {
    program: Rc<Program>,
    config: VmConfig,
    state: State,
    ip: Address,
    stack: Vec<Value>,
    globals: Memory,
    main_bounds: Vec<Value>,
    activations: Vec<Activation>,
    /// Frames built by `Alloc` and not yet invoked
    pending: Vec<Memory>,
    breakpoints: BTreeSet<Address>,
    /// The breakpoint at `ip` already stopped execution
    satisfied: bool,
    /// The statement starting at `ip` already stopped a step
    visited: bool,
    output: Option<Value>,
    request: Option<ReadRequest>,
    /// Address of the instruction that suspended for I/O
    suspended_at: Address,
    executed: u64,
    /// Instructions executed since the last entry point call
    budget: u64,
    fault: Option<VmError>,
}

impl Machine {
    pub fn new(program: Program, config: VmConfig) -> Result<Self, VmError> {
        let main = program
            .main()
            .ok_or_else(|| VmError::Internal("program has no main module".into()))?;
        let template = program
            .template(main)
            .ok_or_else(|| VmError::Internal("main module has no template".into()))?;
        let start = program.range(main).map_or(0, |r| r.start);
        let globals = Memory::from_template(template);

        let mut machine = Self {
            program: Rc::new(program),
            config,
            state: State::Running,
            ip: start,
            stack: Vec::new(),
            globals,
            main_bounds: Vec::new(),
            activations: Vec::new(),
            pending: Vec::new(),
            breakpoints: BTreeSet::new(),
            satisfied: false,
            visited: false,
            output: None,
            request: None,
            suspended_at: start,
            executed: 0,
            budget: 0,
            fault: None,
        };
        machine.unwind();
        Ok(machine)
    }

    // ==================== ACCESSORS ====================

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn ip(&self) -> Address {
        self.ip
    }

    /// Instructions executed since the machine was created
    pub fn executed(&self) -> u64 {
        self.executed
    }

    /// The fault that stopped the machine, if any
    pub fn fault(&self) -> Option<&VmError> {
        self.fault.as_ref()
    }

    pub fn call_depth(&self) -> usize {
        self.activations.len()
    }

    /// Name of the module executing at `ip`
    pub fn current_module(&self) -> &str {
        match self.activations.last() {
            Some(activation) => &activation.module,
            None => &self.globals.module,
        }
    }

    pub fn pending_read(&self) -> Option<&ReadRequest> {
        self.request.as_ref()
    }

    pub fn globals(&self) -> &Memory {
        &self.globals
    }

    // ==================== BREAKPOINTS ====================

    /// Returns `false` when the breakpoint was already set
    pub fn add_breakpoint(&mut self, address: Address) -> bool {
        self.breakpoints.insert(address)
    }

    pub fn remove_breakpoint(&mut self, address: Address) -> bool {
        self.breakpoints.remove(&address)
    }

    pub fn breakpoints(&self) -> impl Iterator<Item = Address> + '_ {
        self.breakpoints.iter().copied()
    }

    // ==================== EXECUTION CONTROL ====================

    /// Run until the program finishes, suspends for I/O or hits a breakpoint
    pub fn run(&mut self) -> Result<Stop, VmError> {
        if let Some(stop) = self.enter()? {
            return Ok(stop);
        }
        loop {
            if self.state == State::Finished {
                return Ok(self.stop(StopReason::Finished, self.ip));
            }
            if self.breakpoints.contains(&self.ip) && !self.satisfied {
                self.satisfied = true;
                self.visited = self.program.is_statement_start(self.ip);
                self.state = State::AwaitingStep;
                tracing::debug!("breakpoint at address {}", self.ip);
                return Ok(self.stop(StopReason::Breakpoint, self.ip));
            }
            if let Some(stop) = self.advance()? {
                return Ok(stop);
            }
        }
    }

    /// Run until the next source statement start that has not stopped yet
    pub fn step(&mut self) -> Result<Stop, VmError> {
        if let Some(stop) = self.enter()? {
            return Ok(stop);
        }
        loop {
            if self.state == State::Finished {
                return Ok(self.stop(StopReason::Finished, self.ip));
            }
            if self.program.is_statement_start(self.ip) && !self.visited {
                self.visited = true;
                if self.breakpoints.contains(&self.ip) {
                    self.satisfied = true;
                }
                self.state = State::AwaitingStep;
                return Ok(self.stop(StopReason::Step, self.ip));
            }
            if let Some(stop) = self.advance()? {
                return Ok(stop);
            }
        }
    }

    /// Take the pending output and resume
    pub fn take_output(&mut self) -> Option<Value> {
        let output = self.output.take();
        if output.is_some() && self.state == State::AwaitingWrite {
            self.state = State::Running;
            self.unwind();
        }
        output
    }

    /// Answer a pending read; an incompatible value is a fault
    pub fn supply_input(&mut self, value: Value) -> Result<(), VmError> {
        if self.state != State::AwaitingRead {
            return Err(VmError::NoInputRequested);
        }
        let Some(request) = self.request.take() else {
            return Err(VmError::NoInputRequested);
        };

        if !value.fits(&request.ty) {
            let error = match (value.as_text(), request.ty.text_capacity()) {
                (Some(text), Some(capacity)) => VmError::LongInput {
                    name: request.name.clone(),
                    length: text.chars().count(),
                    capacity,
                },
                _ => VmError::InputMismatch {
                    name: request.name.clone(),
                    expected: request.ty.to_string(),
                    found: value.type_name().to_string(),
                },
            };
            return Err(self.fail(error));
        }

        let value = match request.ty.atomic() {
            Some(kind) => value.coerce(kind),
            None => value,
        };
        self.push(value).map_err(|e| self.fail(e))?;
        self.state = State::Running;
        self.budget = 0;
        // the store of the read value
        self.execute()
    }

    /// Protocol checks shared by `run` and `step`
    fn enter(&mut self) -> Result<Option<Stop>, VmError> {
        match self.state {
            State::AwaitingRead => Err(VmError::InputPending),
            State::AwaitingWrite => Err(VmError::OutputPending),
            State::Error => Err(VmError::Halted),
            State::Finished => Ok(Some(self.stop(StopReason::Finished, self.ip))),
            State::Running | State::AwaitingStep => {
                self.state = State::Running;
                self.budget = 0;
                Ok(None)
            }
        }
    }

    /// Execute one instruction and report an I/O suspension
    fn advance(&mut self) -> Result<Option<Stop>, VmError> {
        self.execute()?;
        Ok(match self.state {
            State::AwaitingWrite => Some(self.stop(StopReason::Write, self.suspended_at)),
            State::AwaitingRead => Some(self.stop(StopReason::Read, self.suspended_at)),
            State::Finished => Some(self.stop(StopReason::Finished, self.ip)),
            _ => None,
        })
    }

    fn stop(&self, reason: StopReason, address: Address) -> Stop {
        let line = match reason {
            StopReason::Finished => None,
            _ => self.program.line_for(address),
        };
        Stop {
            reason,
            line,
            address,
        }
    }

    fn fail(&mut self, error: VmError) -> VmError {
        if error.is_fatal() {
            tracing::warn!("run-time fault at address {}: {}", self.ip, error);
            self.state = State::Error;
            self.fault = Some(error.clone());
        }
        error
    }

    // ==================== INSTRUCTIONS ====================

    fn execute(&mut self) -> Result<(), VmError> {
        match self.execute_instruction() {
            Ok(()) => Ok(()),
            Err(error) => Err(self.fail(error)),
        }
    }

    fn execute_instruction(&mut self) -> Result<(), VmError> {
        if let Some(limit) = self.config.max_steps {
            if self.budget >= limit {
                return Err(VmError::StepLimit { limit });
            }
        }
        let program = Rc::clone(&self.program);
        let instruction = program
            .get(self.ip)
            .ok_or_else(|| VmError::Internal(format!("no instruction at {}", self.ip)))?;

        self.executed += 1;
        self.budget += 1;
        self.satisfied = false;
        self.visited = false;
        let mut next = self.ip + 1;

        match instruction {
            Instruction::Add => self.binary(BinaryOp::Plus)?,
            Instruction::Sub => self.binary(BinaryOp::Minus)?,
            Instruction::Mul => self.binary(BinaryOp::Times)?,
            Instruction::Pow => self.binary(BinaryOp::Power)?,
            Instruction::Slash => self.binary(BinaryOp::Slash)?,
            Instruction::Div => self.binary(BinaryOp::Div)?,
            Instruction::Mod => self.binary(BinaryOp::Mod)?,
            Instruction::Lt => self.binary(BinaryOp::Minor)?,
            Instruction::Le => self.binary(BinaryOp::MinorEq)?,
            Instruction::Gt => self.binary(BinaryOp::Major)?,
            Instruction::Ge => self.binary(BinaryOp::MajorEq)?,
            Instruction::Eq => self.binary(BinaryOp::Equal)?,
            Instruction::Ne => self.binary(BinaryOp::Different)?,
            Instruction::And => self.binary(BinaryOp::And)?,
            Instruction::Or => self.binary(BinaryOp::Or)?,
            Instruction::Neg => self.unary(UnaryOp::Neg)?,
            Instruction::Not => self.unary(UnaryOp::Not)?,

            Instruction::Push(value) => self.push(value.clone())?,

            Instruction::Load { name, indexes } => {
                let indexes = self.pop_indexes(*indexes)?;
                let location = self.resolve(name, indexes)?;
                let value = self.load(&location)?;
                self.push(value)?;
            }
            Instruction::Store { name, indexes } => {
                let value = self.pop()?;
                let indexes = self.pop_indexes(*indexes)?;
                let location = self.resolve(name, indexes)?;
                self.store(&location, value)?;
            }

            Instruction::Jump(target) => next = *target,
            Instruction::JumpIfFalse(target) => {
                if !self.pop_logical()? {
                    next = *target;
                }
            }
            Instruction::JumpIfTrue(target) => {
                if self.pop_logical()? {
                    next = *target;
                }
            }

            Instruction::SetBound(slot) => {
                let value = self.pop()?;
                let bounds = self.bounds_mut();
                if bounds.len() <= *slot {
                    bounds.resize(*slot + 1, Value::Integer(0));
                }
                bounds[*slot] = value;
            }
            Instruction::LoadBound(slot) => {
                let value = self
                    .bounds()
                    .get(*slot)
                    .cloned()
                    .ok_or_else(|| VmError::Internal(format!("bound register {slot} unset")))?;
                self.push(value)?;
            }

            Instruction::Alloc { module } => {
                let template = program
                    .template(module)
                    .ok_or_else(|| VmError::Internal(format!("no template for `{module}`")))?;
                self.pending.push(Memory::from_template(template));
            }
            Instruction::StoreParam { param } => {
                let value = self.pop()?;
                let binding = self.pending_param(param)?;
                store_cells(binding, param, &[], value)?;
            }
            Instruction::BindRef {
                param,
                source,
                indexes,
            } => {
                let prefix = self.pop_indexes(*indexes)?;
                // validates the subscripts at the call site
                let location = self.resolve(source, prefix.clone())?;
                self.binding(&location).and_then(|b| check_region(b, &location))?;
                let target = Target {
                    name: source.clone(),
                    prefix,
                    level: self.activations.len(),
                };
                *self.pending_param(param)? = Binding::Reference(Some(target));
            }
            Instruction::InitArray {
                param,
                source,
                indexes,
            } => {
                let indexes = self.pop_indexes(*indexes)?;
                let location = self.resolve(source, indexes)?;
                let cells = self.read_region(&location)?;
                let binding = self.pending_param(param)?;
                write_region(binding, param, &[], cells)?;
            }
            Instruction::Invoke { module } => {
                if self.activations.len() >= self.config.max_call_depth {
                    return Err(VmError::CallDepth {
                        limit: self.config.max_call_depth,
                    });
                }
                let memory = self
                    .pending
                    .pop()
                    .ok_or_else(|| VmError::Internal("invoke without a pending frame".into()))?;
                let range = program
                    .range(module)
                    .ok_or_else(|| VmError::Internal(format!("no code for `{module}`")))?;
                self.activations.push(Activation {
                    module: module.clone(),
                    memory,
                    return_address: next,
                    bounds: Vec::new(),
                });
                tracing::trace!("invoke `{}` at depth {}", module, self.activations.len());
                next = range.start;
            }
            Instruction::Return => {
                let activation = self
                    .activations
                    .pop()
                    .ok_or_else(|| VmError::Internal("return from the main module".into()))?;
                next = activation.return_address;
            }
            Instruction::MissingReturn { module } => {
                return Err(VmError::MissingReturn {
                    module: module.clone(),
                });
            }

            Instruction::Read { name, ty } => {
                self.request = Some(ReadRequest {
                    name: name.clone(),
                    ty: ty.clone(),
                });
                self.suspended_at = self.ip;
                self.state = State::AwaitingRead;
            }
            Instruction::Write { cells } => {
                let mut values = Vec::with_capacity(*cells);
                for _ in 0..*cells {
                    values.push(self.pop()?);
                }
                values.reverse();
                let output = if values.len() == 1 {
                    values.pop()
                } else {
                    Some(Value::Array(values))
                };
                self.output = output;
                self.suspended_at = self.ip;
                self.state = State::AwaitingWrite;
            }

            Instruction::CopyArray {
                target,
                target_indexes,
                source,
                source_indexes,
            } => {
                let source_indexes = self.pop_indexes(*source_indexes)?;
                let target_indexes = self.pop_indexes(*target_indexes)?;
                let source = self.resolve(source, source_indexes)?;
                let cells = self.read_region(&source)?;
                let target = self.resolve(target, target_indexes)?;
                let name = target.name.clone();
                let binding = self.binding_mut(&target)?;
                write_region(binding, &name, &target.indexes, cells)?;
            }
        }

        self.ip = next;
        self.unwind();
        Ok(())
    }

    /// Pop activations whose module range has been left by falling off
    fn unwind(&mut self) {
        loop {
            let module = self.current_module();
            let Some(range) = self.program.range(module) else {
                return;
            };
            if self.ip != range.end {
                return;
            }
            match self.activations.pop() {
                Some(activation) => self.ip = activation.return_address,
                None => {
                    // a suspended write finishes once its output is taken
                    if self.state == State::Running {
                        tracing::debug!("program finished after {} instruction(s)", self.executed);
                        self.state = State::Finished;
                    }
                    return;
                }
            }
        }
    }

    // ==================== STACK ====================

    fn push(&mut self, value: Value) -> Result<(), VmError> {
        if self.stack.len() >= self.config.max_stack {
            return Err(VmError::StackOverflow {
                limit: self.config.max_stack,
            });
        }
        self.stack.push(value);
        Ok(())
    }

    fn pop(&mut self) -> Result<Value, VmError> {
        self.stack
            .pop()
            .ok_or_else(|| VmError::Internal("value stack underflow".into()))
    }

    fn pop_logical(&mut self) -> Result<bool, VmError> {
        let value = self.pop()?;
        value
            .as_logical()
            .ok_or_else(|| VmError::Internal(format!("expected a logical, found {value:?}")))
    }

    /// Pop `count` subscripts, returned in source order
    fn pop_indexes(&mut self, count: usize) -> Result<Vec<i64>, VmError> {
        let mut indexes = Vec::with_capacity(count);
        for _ in 0..count {
            let value = self.pop()?;
            let index = value
                .as_integer()
                .ok_or_else(|| VmError::Internal(format!("non-integer index {value:?}")))?;
            indexes.push(index);
        }
        indexes.reverse();
        Ok(indexes)
    }

    fn binary(&mut self, op: BinaryOp) -> Result<(), VmError> {
        let rhs = self.pop()?;
        let lhs = self.pop()?;
        let value = Value::binary(op, &lhs, &rhs)?;
        self.push(value)
    }

    fn unary(&mut self, op: UnaryOp) -> Result<(), VmError> {
        let operand = self.pop()?;
        let value = Value::unary(op, &operand)?;
        self.push(value)
    }

    fn bounds(&self) -> &[Value] {
        match self.activations.last() {
            Some(activation) => &activation.bounds,
            None => &self.main_bounds,
        }
    }

    fn bounds_mut(&mut self) -> &mut Vec<Value> {
        match self.activations.last_mut() {
            Some(activation) => &mut activation.bounds,
            None => &mut self.main_bounds,
        }
    }

    // ==================== MEMORY ====================

    fn pending_param(&mut self, param: &str) -> Result<&mut Binding, VmError> {
        self.pending
            .last_mut()
            .and_then(|frame| frame.get_mut(param))
            .ok_or_else(|| VmError::Internal(format!("no pending parameter `{param}`")))
    }

    /// Find the record holding `name` as seen from `level` live activations
    fn lookup(&self, level: usize, name: &str) -> Option<(Place, &Binding)> {
        if level > 0 {
            if let Some(binding) = self
                .activations
                .get(level - 1)
                .and_then(|a| a.memory.get(name))
            {
                return Some((Place::Frame(level - 1), binding));
            }
        }
        self.globals.get(name).map(|b| (Place::Global, b))
    }

    /// Chase references outward until a storage binding is reached
    fn resolve(&self, name: &str, indexes: Vec<i64>) -> Result<Location, VmError> {
        let mut level = self.activations.len();
        let mut name = name.to_string();
        let mut indexes = indexes;

        for _ in 0..=self.activations.len() {
            let (place, binding) = self
                .lookup(level, &name)
                .ok_or_else(|| VmError::Internal(format!("unknown variable `{name}`")))?;
            match binding {
                Binding::Reference(Some(target)) => {
                    let mut full = target.prefix.clone();
                    full.extend(indexes);
                    indexes = full;
                    name = target.name.clone();
                    level = target.level;
                }
                Binding::Reference(None) => {
                    return Err(VmError::Internal(format!("unbound reference `{name}`")));
                }
                _ => {
                    return Ok(Location {
                        place,
                        name,
                        indexes,
                    });
                }
            }
        }
        Err(VmError::Internal("reference chain does not end".into()))
    }

    fn binding(&self, location: &Location) -> Result<&Binding, VmError> {
        let memory = match location.place {
            Place::Global => Some(&self.globals),
            Place::Frame(i) => self.activations.get(i).map(|a| &a.memory),
        };
        memory
            .and_then(|m| m.get(&location.name))
            .ok_or_else(|| VmError::Internal(format!("lost variable `{}`", location.name)))
    }

    fn binding_mut(&mut self, location: &Location) -> Result<&mut Binding, VmError> {
        let memory = match location.place {
            Place::Global => Some(&mut self.globals),
            Place::Frame(i) => self.activations.get_mut(i).map(|a| &mut a.memory),
        };
        memory
            .and_then(|m| m.get_mut(&location.name))
            .ok_or_else(|| VmError::Internal(format!("lost variable `{}`", location.name)))
    }

    fn load(&self, location: &Location) -> Result<Value, VmError> {
        let binding = self.binding(location)?;
        let cells = cells_of(binding, location)?;
        if let [cell] = cells {
            if location.indexes.len() == dims_of(binding).len() {
                return cell.clone().ok_or_else(|| uninitialized(location));
            }
        }
        let values = cells
            .iter()
            .map(|cell| cell.clone().ok_or_else(|| uninitialized(location)))
            .collect::<Result<_, _>>()?;
        Ok(Value::Array(values))
    }

    fn store(&mut self, location: &Location, value: Value) -> Result<(), VmError> {
        let name = location.name.clone();
        let binding = self.binding_mut(location)?;
        store_cells(binding, &name, &location.indexes, value)
    }

    fn read_region(&self, location: &Location) -> Result<Vec<Option<Value>>, VmError> {
        let binding = self.binding(location)?;
        Ok(cells_of(binding, location)?.to_vec())
    }

    // ==================== INSPECTION ====================

    /// Value of a variable as seen from the current module; `None` when it
    /// does not exist or is not fully initialized
    pub fn value_of(&self, name: &str) -> Option<Value> {
        let location = self.resolve(name, Vec::new()).ok()?;
        self.load(&location).ok()
    }

    /// Value of one cell or slice
    pub fn cell_of(&self, name: &str, indexes: &[i64]) -> Option<Value> {
        let location = self.resolve(name, indexes.to_vec()).ok()?;
        self.load(&location).ok()
    }

    /// Raw cells of a variable, uninitialized ones as `None`
    pub fn cells_of(&self, name: &str) -> Option<Vec<Option<Value>>> {
        let location = self.resolve(name, Vec::new()).ok()?;
        self.read_region(&location).ok()
    }
}

fn uninitialized(location: &Location) -> VmError {
    let name = if location.indexes.is_empty() {
        location.name.clone()
    } else {
        let indexes: Vec<_> = location.indexes.iter().map(i64::to_string).collect();
        format!("{}[{}]", location.name, indexes.join(", "))
    };
    VmError::Uninitialized { name }
}

fn out_of_bounds(name: &str, error: OutOfBounds) -> VmError {
    VmError::IndexOutOfBounds {
        name: name.to_string(),
        index: error.index,
        dimension: error.dimension,
        size: error.size,
    }
}

fn dims_of(binding: &Binding) -> &[usize] {
    match binding {
        Binding::Vector { dims, .. } => dims,
        _ => &[],
    }
}

/// Cells addressed by `location` inside its binding
fn cells_of<'a>(binding: &'a Binding, location: &Location) -> Result<&'a [Option<Value>], VmError> {
    match binding {
        Binding::Scalar { value, .. } if location.indexes.is_empty() => {
            Ok(std::slice::from_ref(value))
        }
        Binding::Vector { dims, cells, .. } => {
            let (start, len) =
                region(dims, &location.indexes).map_err(|e| out_of_bounds(&location.name, e))?;
            Ok(&cells[start..start + len])
        }
        _ => Err(VmError::Internal(format!(
            "`{}` cannot be subscripted",
            location.name
        ))),
    }
}

fn check_region(binding: &Binding, location: &Location) -> Result<(), VmError> {
    cells_of(binding, location).map(|_| ())
}

fn size_mismatch(name: &str, error: SizeMismatch) -> VmError {
    VmError::Internal(format!(
        "{} value(s) do not fit the {} cell(s) of `{}`",
        error.values, error.cells, name
    ))
}

/// Store one value into the cells addressed by `indexes`
fn store_cells(
    binding: &mut Binding,
    name: &str,
    indexes: &[i64],
    value: Value,
) -> Result<(), VmError> {
    match binding {
        Binding::Scalar { kind, value: slot } if indexes.is_empty() => {
            fill_region(std::slice::from_mut(slot), *kind, value)
                .map_err(|e| size_mismatch(name, e))
        }
        Binding::Vector { kind, dims, cells } => {
            let (start, len) = region(dims, indexes).map_err(|e| out_of_bounds(name, e))?;
            fill_region(&mut cells[start..start + len], *kind, value)
                .map_err(|e| size_mismatch(name, e))
        }
        _ => Err(VmError::Internal(format!("cannot store into `{name}`"))),
    }
}

/// Copy cells into a region of the same size
fn write_region(
    binding: &mut Binding,
    name: &str,
    indexes: &[i64],
    source: Vec<Option<Value>>,
) -> Result<(), VmError> {
    let Binding::Vector { kind, dims, cells } = binding else {
        return Err(VmError::Internal(format!("`{name}` is not an array")));
    };
    let (start, len) = region(dims, indexes).map_err(|e| out_of_bounds(name, e))?;
    copy_region(&mut cells[start..start + len], *kind, source).map_err(|e| size_mismatch(name, e))
}

impl std::fmt::Debug for Machine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Machine")
            .field("state", &self.state)
            .field("ip", &self.ip)
            .field("stack", &self.stack)
            .field("depth", &self.activations.len())
            .field("executed", &self.executed)
            .finish()
    }
}
