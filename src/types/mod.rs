//! Type system for the pseudocode language
//!
//! Every value is either atomic or an array. A string is an array of
//! `caracter`; an N-dimensional array nests `Array` N times with the
//! outermost level being the first declared dimension.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Atomic (non-array) kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AtomicKind {
    Integer,
    Real,
    Character,
    Logical,
    /// Result kind of procedures
    None,
}

impl AtomicKind {
    pub fn is_numeric(self) -> bool {
        matches!(self, AtomicKind::Integer | AtomicKind::Real)
    }

    /// Assignment compatibility between atomic kinds: equal, or integer into real
    pub fn accepts(self, source: AtomicKind) -> bool {
        self == source || (self == AtomicKind::Real && source == AtomicKind::Integer)
    }

    pub fn name(self) -> &'static str {
        match self {
            AtomicKind::Integer => "entero",
            AtomicKind::Real => "real",
            AtomicKind::Character => "caracter",
            AtomicKind::Logical => "logico",
            AtomicKind::None => "ninguno",
        }
    }
}

impl fmt::Display for AtomicKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Largest number of cells a declared variable may occupy
pub const MAX_CELLS: usize = 1 << 24;

/// Cells occupied by an array with `dims`, `None` when a dimension is zero
/// or the total exceeds [`MAX_CELLS`]
pub fn checked_cells(dims: &[usize]) -> Option<usize> {
    dims.iter()
        .try_fold(1usize, |total, &dim| match dim {
            0 => None,
            _ => total.checked_mul(dim),
        })
        .filter(|&total| total <= MAX_CELLS)
}

/// Static type of an expression or variable
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    Atomic(AtomicKind),
    Array { element: Box<Type>, length: usize },
}

impl Type {
    pub const INTEGER: Type = Type::Atomic(AtomicKind::Integer);
    pub const REAL: Type = Type::Atomic(AtomicKind::Real);
    pub const CHARACTER: Type = Type::Atomic(AtomicKind::Character);
    pub const LOGICAL: Type = Type::Atomic(AtomicKind::Logical);

    /// Build the type of a variable declared with `kind` and `dims`
    pub fn declared(kind: AtomicKind, dims: &[usize]) -> Type {
        dims.iter().rev().fold(Type::Atomic(kind), |element, &length| {
            Type::Array {
                element: Box::new(element),
                length,
            }
        })
    }

    /// Character array of `length` cells
    pub fn string(length: usize) -> Type {
        Type::declared(AtomicKind::Character, &[length])
    }

    pub fn atomic(&self) -> Option<AtomicKind> {
        match self {
            Type::Atomic(kind) => Some(*kind),
            Type::Array { .. } => None,
        }
    }

    /// Innermost element kind
    pub fn base_kind(&self) -> AtomicKind {
        match self {
            Type::Atomic(kind) => *kind,
            Type::Array { element, .. } => element.base_kind(),
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Type::Array { .. })
    }

    pub fn is_numeric(&self) -> bool {
        self.atomic().is_some_and(AtomicKind::is_numeric)
    }

    pub fn is_logical(&self) -> bool {
        self.atomic() == Some(AtomicKind::Logical)
    }

    /// One-dimensional character array
    pub fn is_text(&self) -> bool {
        matches!(self, Type::Array { element, .. } if **element == Type::CHARACTER)
    }

    pub fn dims(&self) -> Vec<usize> {
        let mut dims = Vec::new();
        let mut current = self;
        while let Type::Array { element, length } = current {
            dims.push(*length);
            current = element;
        }
        dims
    }

    /// Number of atomic cells the type occupies
    pub fn cell_count(&self) -> usize {
        match self {
            Type::Atomic(_) => 1,
            Type::Array { element, length } => length * element.cell_count(),
        }
    }

    /// Type left after applying `indexes` subscripts, `None` when there are
    /// more subscripts than dimensions
    pub fn reduce(&self, indexes: usize) -> Option<Type> {
        let mut current = self;
        for _ in 0..indexes {
            match current {
                Type::Array { element, .. } => current = element,
                Type::Atomic(_) => return None,
            }
        }
        Some(current.clone())
    }

    /// Assignment compatibility: can a value of type `source` be stored
    /// into a location of type `self`?
    pub fn accepts(&self, source: &Type) -> bool {
        match (self, source) {
            (Type::Atomic(target), Type::Atomic(source)) => target.accepts(*source),
            (Type::Array { .. }, Type::Array { .. }) => {
                self.base_kind().accepts(source.base_kind())
                    && self.cell_count() == source.cell_count()
            }
            // a lone character fits in any character array
            (Type::Array { .. }, Type::Atomic(AtomicKind::Character)) => self.is_text(),
            _ => false,
        }
    }

    /// Capacity when `self` can hold string literals
    pub fn text_capacity(&self) -> Option<usize> {
        match self {
            Type::Array { length, .. } if self.is_text() => Some(*length),
            _ => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Atomic(kind) => write!(f, "{}", kind),
            Type::Array { .. } => {
                let dims: Vec<_> = self.dims().iter().map(|d| d.to_string()).collect();
                write!(f, "{}[{}]", self.base_kind(), dims.join(", "))
            }
        }
    }
}
