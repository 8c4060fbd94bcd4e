//! Symbol table implementation

use crate::ast::ModuleKind;
use crate::common::Span;
use crate::types::{AtomicKind, Type};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Kind of variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VarKind {
    Scalar,
    Array,
}

/// Declared variable or parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarSymbol {
    pub name: String,
    pub kind: VarKind,
    /// Element type for arrays, value type for scalars
    pub element: AtomicKind,
    /// Empty for scalars
    pub dims: Vec<usize>,
    pub by_ref: bool,
    pub is_param: bool,
    /// Span in source
    pub span: Span,
}

impl VarSymbol {
    pub fn new(
        name: impl Into<String>,
        element: AtomicKind,
        dims: Vec<usize>,
        span: Span,
    ) -> Self {
        let kind = if dims.is_empty() {
            VarKind::Scalar
        } else {
            VarKind::Array
        };
        Self {
            name: name.into(),
            kind,
            element,
            dims,
            by_ref: false,
            is_param: false,
            span,
        }
    }

    /// Declared type of the variable
    pub fn ty(&self) -> Type {
        Type::declared(self.element, &self.dims)
    }
}

/// Variables of one module, parameters first then locals
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SymbolTable {
    pub module: String,
    vars: IndexMap<String, VarSymbol>,
}

impl SymbolTable {
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            vars: IndexMap::new(),
        }
    }

    /// Insert a symbol; on a clash the existing one is returned untouched
    pub fn insert(&mut self, symbol: VarSymbol) -> Result<(), &VarSymbol> {
        if self.vars.contains_key(&symbol.name) {
            return Err(&self.vars[&symbol.name]);
        }
        self.vars.insert(symbol.name.clone(), symbol);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<&VarSymbol> {
        self.vars.get(name)
    }

    pub fn params(&self) -> impl Iterator<Item = &VarSymbol> {
        self.vars.values().filter(|v| v.is_param)
    }

    pub fn iter(&self) -> impl Iterator<Item = &VarSymbol> {
        self.vars.values()
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

/// Where a variable invocation was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scope {
    /// The enclosing module's own variables
    Local,
    /// The main module's variables
    Global,
}

/// Parameter as seen from a call site
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSig {
    pub name: String,
    pub ty: Type,
    pub by_ref: bool,
}

/// Callee signature attached to every call site
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signature {
    pub name: String,
    pub kind: ModuleKind,
    pub params: Vec<ParamSig>,
    pub return_type: Option<Type>,
}

impl Signature {
    pub fn is_function(&self) -> bool {
        self.return_type.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_reports_first_declaration() {
        let mut table = SymbolTable::new("principal");
        let a = VarSymbol::new("a", AtomicKind::Integer, vec![], Span::default());
        assert!(table.insert(a).is_ok());
        let again = VarSymbol::new("a", AtomicKind::Real, vec![3], Span::default());
        let first = table.insert(again).unwrap_err();
        assert_eq!(first.element, AtomicKind::Integer);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_symbol_type() {
        let m = VarSymbol::new("m", AtomicKind::Real, vec![3, 2], Span::default());
        assert_eq!(m.kind, VarKind::Array);
        assert_eq!(m.ty().to_string(), "real[3, 2]");
    }
}
