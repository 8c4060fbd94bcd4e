//! Session controller
//!
//! Owns the compiled program and its machine and exposes the operations the
//! CLI and the debugger need: run, step, I/O and source-line breakpoints.

use crate::ast::Literal;
use crate::bytecode::Program;
use crate::config::VmConfig;
use crate::diagnostics::CompileError;
use crate::value::Value;
use crate::vm::{Machine, ReadRequest, State, Stop, VmError};
use thiserror::Error;

/// Session failure
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("no program is loaded")]
    NotLoaded,

    #[error(transparent)]
    Vm(#[from] VmError),

    #[error("`{raw}` is not a valid input value")]
    InvalidInput { raw: String },
}

/// A loaded program and its machine
#[derive(Debug, Default)]
pub struct Session {
    config: VmConfig,
    machine: Option<Machine>,
}

impl Session {
    pub fn new(config: VmConfig) -> Self {
        Self {
            config,
            machine: None,
        }
    }

    /// Compile `source` and prepare a fresh machine for it
    pub fn load(&mut self, source: &str) -> Result<&Program, Vec<CompileError>> {
        self.machine = None;
        let program = crate::compile(source)?;
        let machine = Machine::new(program, self.config.clone())
            .map_err(|e| vec![CompileError::Internal(e.to_string())])?;
        tracing::info!(state = ?machine.state(), "program loaded");
        Ok(self.machine.insert(machine).program())
    }

    /// Start the loaded program over, keeping its breakpoints
    pub fn restart(&mut self) -> Result<(), SessionError> {
        let machine = self.machine.take().ok_or(SessionError::NotLoaded)?;
        let breakpoints: Vec<_> = machine.breakpoints().collect();
        let program = machine.program().clone();
        let mut fresh = Machine::new(program, self.config.clone())?;
        for address in breakpoints {
            fresh.add_breakpoint(address);
        }
        self.machine = Some(fresh);
        Ok(())
    }

    pub fn program(&self) -> Option<&Program> {
        self.machine.as_ref().map(Machine::program)
    }

    pub fn run(&mut self) -> Result<Stop, SessionError> {
        Ok(self.machine_mut()?.run()?)
    }

    pub fn step(&mut self) -> Result<Stop, SessionError> {
        Ok(self.machine_mut()?.step()?)
    }

    /// Retrieve and clear the value of a pending `escribir`
    pub fn pending_write(&mut self) -> Option<Value> {
        self.machine.as_mut()?.take_output()
    }

    pub fn pending_read(&self) -> Option<&ReadRequest> {
        self.machine.as_ref()?.pending_read()
    }

    /// Parse one input literal and answer the pending `leer`
    pub fn supply_input(&mut self, raw: &str) -> Result<(), SessionError> {
        let value = parse_input(raw).ok_or_else(|| SessionError::InvalidInput {
            raw: raw.to_string(),
        })?;
        Ok(self.machine_mut()?.supply_input(value)?)
    }

    /// Set a breakpoint on `line`, or on the nearest following line with
    /// code. Returns the line actually used.
    pub fn add_breakpoint(&mut self, line: u32) -> Result<Option<u32>, SessionError> {
        let machine = self.machine_mut()?;
        let Some((line, address)) = machine.program().address_of_line(line) else {
            return Ok(None);
        };
        machine.add_breakpoint(address);
        tracing::debug!(line, address, "breakpoint set");
        Ok(Some(line))
    }

    pub fn remove_breakpoint(&mut self, line: u32) -> Result<bool, SessionError> {
        let machine = self.machine_mut()?;
        let Some((_, address)) = machine.program().address_of_line(line) else {
            return Ok(false);
        };
        Ok(machine.remove_breakpoint(address))
    }

    /// Source lines with a breakpoint
    pub fn breakpoints(&self) -> Vec<u32> {
        let Some(machine) = &self.machine else {
            return Vec::new();
        };
        machine
            .breakpoints()
            .filter_map(|address| machine.program().line_at(address))
            .collect()
    }

    // ==================== INSPECTION ====================

    pub fn value_of(&self, name: &str) -> Option<Value> {
        self.machine.as_ref()?.value_of(name)
    }

    pub fn cell_of(&self, name: &str, indexes: &[i64]) -> Option<Value> {
        self.machine.as_ref()?.cell_of(name, indexes)
    }

    pub fn state(&self) -> Option<State> {
        self.machine.as_ref().map(Machine::state)
    }

    pub fn executed(&self) -> u64 {
        self.machine.as_ref().map_or(0, Machine::executed)
    }

    pub fn machine(&self) -> Option<&Machine> {
        self.machine.as_ref()
    }

    fn machine_mut(&mut self) -> Result<&mut Machine, SessionError> {
        self.machine.as_mut().ok_or(SessionError::NotLoaded)
    }
}

/// Parse one raw input line into a value
///
/// Surrounding whitespace is ignored. `verdadero`/`falso` are logicals,
/// numbers with a dot are reals, other numbers integers. A quoted string
/// loses its quotes and keeps its inner spaces; anything else is taken as
/// raw text. One-character text is a `caracter`.
pub fn parse_input(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed {
        "verdadero" => return Some(Value::Logical(true)),
        "falso" => return Some(Value::Logical(false)),
        _ => {}
    }
    if let Ok(n) = trimmed.parse::<i64>() {
        return Some(Value::Integer(n));
    }
    if trimmed.contains('.') {
        if let Ok(x) = trimmed.parse::<f64>() {
            return Some(Value::Real(x));
        }
    }
    let text = trimmed
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .unwrap_or(trimmed);
    if text.is_empty() {
        return None;
    }
    Some(Value::from_literal(&Literal::Text(text.to_string())))
}
