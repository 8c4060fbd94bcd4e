//! Run-time errors of the virtual machine

use crate::value::ArithmeticError;
use thiserror::Error;

/// Virtual machine error
///
/// Faults put the machine in the `Error` state for good; protocol errors
/// report a call that is not valid in the current state and change nothing.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VmError {
    // === Faults ===
    #[error("index {index} out of bounds for dimension {dimension} of `{name}` (size {size})")]
    IndexOutOfBounds {
        name: String,
        index: i64,
        dimension: usize,
        size: usize,
    },

    #[error("`{name}` expects a value of type `{expected}`, got `{found}`")]
    InputMismatch {
        name: String,
        expected: String,
        found: String,
    },

    #[error("input of length {length} does not fit in `{name}` (capacity {capacity})")]
    LongInput {
        name: String,
        length: usize,
        capacity: usize,
    },

    #[error("`{name}` is read before being assigned")]
    Uninitialized { name: String },

    #[error("{0}")]
    Arithmetic(#[from] ArithmeticError),

    #[error("function `{module}` ended without `retornar`")]
    MissingReturn { module: String },

    #[error("step limit of {limit} instructions exceeded")]
    StepLimit { limit: u64 },

    #[error("value stack exceeded {limit} entries")]
    StackOverflow { limit: usize },

    #[error("call depth exceeded {limit} activations")]
    CallDepth { limit: usize },

    #[error("internal machine error: {0}")]
    Internal(String),

    // === Protocol ===
    #[error("the program is waiting for input")]
    InputPending,

    #[error("the program has output waiting to be taken")]
    OutputPending,

    #[error("no input was requested")]
    NoInputRequested,

    #[error("the program has already stopped")]
    Halted,
}

impl VmError {
    /// Whether the error ends the run
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            VmError::InputPending
                | VmError::OutputPending
                | VmError::NoInputRequested
                | VmError::Halted
        )
    }
}
