//! Flat bytecode for the stack machine
//!
//! The bytecode is a single addressable instruction array with:
//! - Explicit absolute jump targets
//! - One contiguous address range per module
//! - Line maps in both directions for stepping and breakpoints
//! - Per-module memory templates

pub mod ir;
pub mod lower;

pub use ir::*;
pub use lower::{is_silent, lower};
