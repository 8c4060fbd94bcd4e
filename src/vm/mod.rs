//! Stack machine executing the flat bytecode
//!
//! The machine only advances inside [`Machine::run`], [`Machine::step`] and
//! [`Machine::supply_input`]. It suspends to hand out output, to request
//! input, on breakpoints and after each source-level step.

pub mod error;
pub mod machine;
pub mod memory;

pub use error::VmError;
pub use machine::Machine;
pub use memory::{
    copy_region, fill_region, flat_offset, region, Binding, Memory, OutOfBounds, SizeMismatch, Target,
};

use crate::bytecode::Address;
use crate::types::Type;
use serde::Serialize;

/// Machine state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum State {
    Running,
    AwaitingRead,
    AwaitingWrite,
    /// Stopped on a breakpoint or after a step
    AwaitingStep,
    Finished,
    Error,
}

/// Why `run` or `step` returned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StopReason {
    Write,
    Read,
    Breakpoint,
    Step,
    Finished,
}

/// Where and why execution stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Stop {
    pub reason: StopReason,
    /// Source line of the statement being executed
    pub line: Option<u32>,
    pub address: Address,
}

/// Pending `leer` target
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadRequest {
    pub name: String,
    pub ty: Type,
}
