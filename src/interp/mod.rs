//! Tree-walking interpreter for HIR
//!
//! Executes the checked program directly. It shares the value semantics and
//! fault kinds of the virtual machine and serves as a reference to test the
//! generated bytecode against.

pub mod eval;

pub use eval::{InterpError, Interpreter};
