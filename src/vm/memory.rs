//! Memory records
//!
//! Every activation owns one record built from its module's template; the
//! main module's record is the global memory. Arrays are stored flat in
//! row-major order with 1-based subscripts.

use crate::bytecode::{Slot, Template};
use crate::types::AtomicKind;
use crate::value::Value;
use indexmap::IndexMap;

/// Variable a by-reference parameter is bound to
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub name: String,
    /// Subscripts fixed at the call site; a slice keeps a partial prefix
    pub prefix: Vec<i64>,
    /// Number of activations live when the binding was made
    pub level: usize,
}

/// Storage of one variable
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    Scalar {
        kind: AtomicKind,
        value: Option<Value>,
    },
    Vector {
        kind: AtomicKind,
        dims: Vec<usize>,
        cells: Vec<Option<Value>>,
    },
    /// `None` until the call binds it
    Reference(Option<Target>),
}

impl Binding {
    pub fn from_slot(slot: &Slot) -> Self {
        match slot {
            Slot::Scalar(kind) => Binding::Scalar {
                kind: *kind,
                value: None,
            },
            Slot::Vector { kind, dims } => Binding::Vector {
                kind: *kind,
                dims: dims.clone(),
                cells: vec![None; dims.iter().product()],
            },
            Slot::Reference => Binding::Reference(None),
        }
    }
}

/// Memory record of one activation
#[derive(Debug, Clone, PartialEq)]
pub struct Memory {
    pub module: String,
    bindings: IndexMap<String, Binding>,
}

impl Memory {
    pub fn from_template(template: &Template) -> Self {
        Self {
            module: template.module.clone(),
            bindings: template
                .slots
                .iter()
                .map(|(name, slot)| (name.clone(), Binding::from_slot(slot)))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Binding> {
        self.bindings.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Binding> {
        self.bindings.get_mut(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(String::as_str)
    }
}

/// Subscript outside its dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutOfBounds {
    /// 1-based dimension number
    pub dimension: usize,
    pub index: i64,
    pub size: usize,
}

/// Cells addressed by a subscript prefix, as `(start, len)` into the flat
/// storage; a full subscript list addresses exactly one cell
pub fn region(dims: &[usize], prefix: &[i64]) -> Result<(usize, usize), OutOfBounds> {
    let mut start = 0usize;
    for (k, &index) in prefix.iter().enumerate() {
        let size = dims.get(k).copied().unwrap_or(0);
        if index < 1 || index as u64 > size as u64 {
            return Err(OutOfBounds {
                dimension: k + 1,
                index,
                size,
            });
        }
        let stride: usize = dims[k + 1..].iter().product();
        start += (index as usize - 1) * stride;
    }
    let len = dims.get(prefix.len()..).map_or(0, |rest| rest.iter().product());
    Ok((start, len))
}

/// 0-based flat offset of a full subscript list; rightmost dimension fastest
pub fn flat_offset(dims: &[usize], indexes: &[i64]) -> Result<usize, OutOfBounds> {
    region(dims, indexes).map(|(start, _)| start)
}

/// Value count that does not match a region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeMismatch {
    pub values: usize,
    pub cells: usize,
}

/// Store `value` into a region of cells; text shorter than a character
/// region is padded with `'\0'`
pub fn fill_region(
    slots: &mut [Option<Value>],
    kind: AtomicKind,
    value: Value,
) -> Result<(), SizeMismatch> {
    let items = match value {
        Value::Array(items) => items,
        single => vec![single],
    };
    let short = items.len() < slots.len() && kind != AtomicKind::Character;
    if items.len() > slots.len() || short {
        return Err(SizeMismatch {
            values: items.len(),
            cells: slots.len(),
        });
    }
    let padding = std::iter::repeat(Value::Character('\0'));
    for (slot, item) in slots.iter_mut().zip(items.into_iter().chain(padding)) {
        *slot = Some(item.coerce(kind));
    }
    Ok(())
}

/// Copy cells between regions of the same size
pub fn copy_region(
    slots: &mut [Option<Value>],
    kind: AtomicKind,
    source: Vec<Option<Value>>,
) -> Result<(), SizeMismatch> {
    if source.len() != slots.len() {
        return Err(SizeMismatch {
            values: source.len(),
            cells: slots.len(),
        });
    }
    for (slot, value) in slots.iter_mut().zip(source) {
        *slot = value.map(|v| v.coerce(kind));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_row_major() {
        let dims = [3, 2];
        assert_eq!(flat_offset(&dims, &[1, 1]), Ok(0));
        assert_eq!(flat_offset(&dims, &[1, 2]), Ok(1));
        assert_eq!(flat_offset(&dims, &[2, 1]), Ok(2));
        assert_eq!(flat_offset(&dims, &[3, 2]), Ok(5));
    }

    #[test]
    fn test_row_region() {
        assert_eq!(region(&[3, 2], &[2]), Ok((2, 2)));
        assert_eq!(region(&[3, 2], &[]), Ok((0, 6)));
    }

    #[test]
    fn test_out_of_bounds() {
        let err = flat_offset(&[3, 2], &[1, 3]).unwrap_err();
        assert_eq!(
            err,
            OutOfBounds {
                dimension: 2,
                index: 3,
                size: 2
            }
        );
        assert!(flat_offset(&[3], &[0]).is_err());
    }

    #[test]
    fn test_fill_pads_text() {
        let mut slots = vec![None; 4];
        fill_region(&mut slots, AtomicKind::Character, Value::text("ab")).unwrap();
        let chars: Vec<_> = slots.into_iter().flatten().collect();
        assert_eq!(
            chars,
            vec![
                Value::Character('a'),
                Value::Character('b'),
                Value::Character('\0'),
                Value::Character('\0'),
            ]
        );
    }

    #[test]
    fn test_fill_size_mismatch() {
        let mut slots = vec![None; 3];
        let short = Value::Array(vec![Value::Integer(1), Value::Integer(2)]);
        assert_eq!(
            fill_region(&mut slots, AtomicKind::Integer, short),
            Err(SizeMismatch {
                values: 2,
                cells: 3
            })
        );
        assert!(slots.iter().all(Option::is_none));

        let mut cell = vec![None];
        assert!(fill_region(&mut cell, AtomicKind::Character, Value::text("ab")).is_err());
    }

    #[test]
    fn test_fill_coerces_into_real() {
        let mut slots = vec![None; 2];
        let values = Value::Array(vec![Value::Integer(1), Value::Real(2.5)]);
        fill_region(&mut slots, AtomicKind::Real, values).unwrap();
        assert_eq!(slots, vec![Some(Value::Real(1.0)), Some(Value::Real(2.5))]);
    }

    proptest! {
        #[test]
        fn flat_offset_is_a_bijection(
            dims in prop::collection::vec(1usize..5, 1..4),
            seed in any::<u64>(),
        ) {
            let total: usize = dims.iter().product();
            let mut seen = vec![false; total];
            let mut counter = vec![1i64; dims.len()];
            for _ in 0..total {
                let offset = flat_offset(&dims, &counter).unwrap();
                prop_assert!(offset < total);
                prop_assert!(!seen[offset]);
                seen[offset] = true;
                for d in (0..dims.len()).rev() {
                    counter[d] += 1;
                    if counter[d] <= dims[d] as i64 {
                        break;
                    }
                    counter[d] = 1;
                }
            }
            prop_assert!(seen.iter().all(|s| *s));

            // mixed radix decomposition of an arbitrary offset
            let target = (seed % total as u64) as usize;
            let mut rest = target;
            let mut indexes = vec![0i64; dims.len()];
            for d in (0..dims.len()).rev() {
                indexes[d] = (rest % dims[d]) as i64 + 1;
                rest /= dims[d];
            }
            prop_assert_eq!(flat_offset(&dims, &indexes).unwrap(), target);
        }

        #[test]
        fn prefix_region_contains_its_cells(
            dims in prop::collection::vec(1usize..5, 2..4),
            first in 1i64..5,
        ) {
            prop_assume!(first as usize <= dims[0]);
            let (start, len) = region(&dims, &[first]).unwrap();
            let mut full = vec![1i64; dims.len()];
            full[0] = first;
            prop_assert_eq!(flat_offset(&dims, &full).unwrap(), start);
            prop_assert_eq!(len, dims[1..].iter().product::<usize>());
        }
    }
}
