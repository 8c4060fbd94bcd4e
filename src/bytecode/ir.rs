//! Bytecode definitions
//!
//! A program is one flat instruction array. Every module occupies a
//! contiguous address range and every jump target is an absolute address.

use crate::ast::ModuleKind;
use crate::types::{AtomicKind, Type};
use crate::value::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Absolute instruction address
pub type Address = usize;

/// Stack machine instruction
///
/// Instructions that take `indexes` pop that many integer subscripts, pushed
/// in source order, after popping any value operand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Instruction {
    // Arithmetic, comparison and logic
    Add,
    Sub,
    Mul,
    Pow,
    /// Real division
    Slash,
    /// Integer division
    Div,
    Mod,
    Neg,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
    Not,

    /// Push a literal
    Push(Value),

    // Memory
    Load { name: String, indexes: usize },
    Store { name: String, indexes: usize },

    // Control flow
    Jump(Address),
    JumpIfFalse(Address),
    JumpIfTrue(Address),

    /// Pop the final value of a `para` loop into a bound register
    SetBound(usize),
    LoadBound(usize),

    // Call protocol
    /// Create a pending frame from the callee's template
    Alloc { module: String },
    /// Pop a value into a parameter of the pending frame
    StoreParam { param: String },
    /// Bind a by-reference parameter of the pending frame to a variable
    BindRef {
        param: String,
        source: String,
        indexes: usize,
    },
    /// Copy an array variable into a by-value array parameter
    InitArray {
        param: String,
        source: String,
        indexes: usize,
    },
    /// Activate the pending frame and jump to the callee
    Invoke { module: String },
    Return,
    /// Reached the end of a function without `retornar`
    MissingReturn { module: String },

    // I/O
    /// Suspend until a value of type `ty` is supplied, then push it
    Read { name: String, ty: Type },
    /// Pop `cells` values and suspend until the output is taken
    Write { cells: usize },

    /// Copy every cell of one array region into another; target indexes are
    /// pushed before source indexes
    CopyArray {
        target: String,
        target_indexes: usize,
        source: String,
        source_indexes: usize,
    },
}

/// Half-open address range `[start, end)` of a module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressRange {
    pub start: Address,
    pub end: Address,
}

impl AddressRange {
    pub fn contains(&self, address: Address) -> bool {
        (self.start..self.end).contains(&address)
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Storage slot of a module variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Slot {
    Scalar(AtomicKind),
    Vector { kind: AtomicKind, dims: Vec<usize> },
    /// By-reference parameter, bound at call time
    Reference,
}

/// Memory layout of a module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub module: String,
    pub kind: ModuleKind,
    pub params: Vec<String>,
    pub slots: IndexMap<String, Slot>,
}

/// Complete compiled program
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Program {
    pub code: Vec<Instruction>,
    /// Module name -> address range, main first
    pub ranges: IndexMap<String, AddressRange>,
    /// Source line -> first instruction address
    pub lines: BTreeMap<u32, Address>,
    /// Statement start address -> source line
    pub statements: BTreeMap<Address, u32>,
    pub templates: IndexMap<String, Template>,
}

impl Program {
    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    pub fn get(&self, address: Address) -> Option<&Instruction> {
        self.code.get(address)
    }

    pub fn range(&self, module: &str) -> Option<AddressRange> {
        self.ranges.get(module).copied()
    }

    pub fn template(&self, module: &str) -> Option<&Template> {
        self.templates.get(module)
    }

    /// Name of the main module
    pub fn main(&self) -> Option<&str> {
        self.templates
            .values()
            .find(|t| t.kind == ModuleKind::Main)
            .map(|t| t.module.as_str())
    }

    /// Module whose range contains `address`
    pub fn module_at(&self, address: Address) -> Option<&str> {
        self.ranges
            .iter()
            .find(|(_, range)| range.contains(address))
            .map(|(name, _)| name.as_str())
    }

    /// Source line of the statement starting at `address`
    pub fn line_at(&self, address: Address) -> Option<u32> {
        self.statements.get(&address).copied()
    }

    /// Line of the statement that `address` belongs to
    pub fn line_for(&self, address: Address) -> Option<u32> {
        self.statements
            .range(..=address)
            .next_back()
            .map(|(_, line)| *line)
    }

    pub fn is_statement_start(&self, address: Address) -> bool {
        self.statements.contains_key(&address)
    }

    /// First address of `line`, or of the nearest following mapped line
    pub fn address_of_line(&self, line: u32) -> Option<(u32, Address)> {
        self.lines
            .range(line..)
            .next()
            .map(|(line, address)| (*line, *address))
    }
}
