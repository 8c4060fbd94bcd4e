//! Declaration extraction and reference resolution

pub mod declarations;
pub mod resolver;
pub mod symbols;

pub use resolver::{resolve, Resolver, READ, WRITE};
pub use symbols::{ParamSig, Scope, Signature, SymbolTable, VarKind, VarSymbol};
