//! Guest Value Model
//!
//! The slice of the managed value model the bridge consumes from the
//! evaluator core: scalars, element vectors, generic lists, pairlist-family
//! objects, and symbols. The bridge only wraps and unwraps these values at
//! the call boundary; evaluation semantics live elsewhere.
//!
//! The conversion contract is intentionally flat: `wrap` a native scalar or
//! array into a [`GuestValue`], `unwrap` a guest value back to its native
//! representation, with a typed [`BridgeError::TypeMismatch`] when the
//! representation does not line up.

use std::rc::Rc;

use crate::error::{BridgeError, BridgeResult};
use crate::pairlist::PairNode;

/// A managed guest value as seen at the native boundary.
///
/// `Null` doubles as the empty-list sentinel: pairlist traversal terminates
/// on `Null`, never on a null reference.
#[derive(Debug, Clone, PartialEq)]
pub enum GuestValue {
    /// The null / empty-list sentinel.
    Null,
    /// Scalar integer.
    Int(i32),
    /// Scalar real.
    Real(f64),
    /// Scalar logical.
    Logical(bool),
    /// Scalar string.
    Str(String),
    /// Integer vector.
    IntVec(Vec<i32>),
    /// Real vector.
    RealVec(Vec<f64>),
    /// Raw byte vector.
    RawVec(Vec<u8>),
    /// Logical vector, one byte per element (0 false, 1 true).
    LogicalVec(Vec<u8>),
    /// Character vector.
    StrVec(Vec<String>),
    /// Generic vector with optional element names.
    List(GuestList),
    /// Pairlist cell.
    Pair(Rc<PairNode>),
    /// Call / language expression: a tagged pairlist whose head is the
    /// function and whose tail holds the arguments.
    Lang(Rc<PairNode>),
    /// Argument-list object (values and names captured at a call site).
    Args(ArgList),
    /// Symbol.
    Symbol(String),
}

impl GuestValue {
    /// Short representation name used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            GuestValue::Null => "NULL",
            GuestValue::Int(_) => "integer",
            GuestValue::Real(_) => "real",
            GuestValue::Logical(_) => "logical",
            GuestValue::Str(_) => "string",
            GuestValue::IntVec(_) => "integer vector",
            GuestValue::RealVec(_) => "real vector",
            GuestValue::RawVec(_) => "raw vector",
            GuestValue::LogicalVec(_) => "logical vector",
            GuestValue::StrVec(_) => "character vector",
            GuestValue::List(_) => "list",
            GuestValue::Pair(_) => "pairlist",
            GuestValue::Lang(_) => "language object",
            GuestValue::Args(_) => "argument list",
            GuestValue::Symbol(_) => "symbol",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, GuestValue::Null)
    }

    /// Logical length of the value as the native API reports it.
    pub fn length(&self) -> usize {
        match self {
            GuestValue::Null => 0,
            GuestValue::Int(_)
            | GuestValue::Real(_)
            | GuestValue::Logical(_)
            | GuestValue::Str(_)
            | GuestValue::Symbol(_) => 1,
            GuestValue::IntVec(v) => v.len(),
            GuestValue::RealVec(v) => v.len(),
            GuestValue::RawVec(v) => v.len(),
            GuestValue::LogicalVec(v) => v.len(),
            GuestValue::StrVec(v) => v.len(),
            GuestValue::List(l) => l.elements.len(),
            GuestValue::Pair(p) | GuestValue::Lang(p) => p.list_length(),
            GuestValue::Args(a) => a.values.len(),
        }
    }

    pub fn as_int(&self) -> BridgeResult<i32> {
        match self {
            GuestValue::Int(v) => Ok(*v),
            GuestValue::IntVec(v) if !v.is_empty() => Ok(v[0]),
            GuestValue::Real(v) => Ok(*v as i32),
            GuestValue::Logical(b) => Ok(*b as i32),
            other => Err(BridgeError::TypeMismatch {
                expected: "integer",
                found: other.kind_name(),
            }),
        }
    }

    pub fn as_real(&self) -> BridgeResult<f64> {
        match self {
            GuestValue::Real(v) => Ok(*v),
            GuestValue::RealVec(v) if !v.is_empty() => Ok(v[0]),
            GuestValue::Int(v) => Ok(*v as f64),
            other => Err(BridgeError::TypeMismatch {
                expected: "real",
                found: other.kind_name(),
            }),
        }
    }

    pub fn as_logical(&self) -> BridgeResult<bool> {
        match self {
            GuestValue::Logical(b) => Ok(*b),
            GuestValue::LogicalVec(v) if !v.is_empty() => Ok(v[0] != 0),
            GuestValue::Int(v) => Ok(*v != 0),
            other => Err(BridgeError::TypeMismatch {
                expected: "logical",
                found: other.kind_name(),
            }),
        }
    }

    pub fn as_str(&self) -> BridgeResult<&str> {
        match self {
            GuestValue::Str(s) | GuestValue::Symbol(s) => Ok(s),
            GuestValue::StrVec(v) if !v.is_empty() => Ok(&v[0]),
            other => Err(BridgeError::TypeMismatch {
                expected: "string",
                found: other.kind_name(),
            }),
        }
    }
}

/// Generic vector with optional per-element names.
///
/// Unlike pairlists, lists are never updated destructively by the bridge;
/// tail-taking produces a fresh list.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GuestList {
    pub elements: Vec<GuestValue>,
    pub names: Option<Vec<String>>,
}

impl GuestList {
    pub fn new(elements: Vec<GuestValue>) -> Self {
        Self {
            elements,
            names: None,
        }
    }

    pub fn with_names(elements: Vec<GuestValue>, names: Vec<String>) -> Self {
        debug_assert_eq!(elements.len(), names.len());
        Self {
            elements,
            names: Some(names),
        }
    }
}

/// Argument values and names captured at a call site.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ArgList {
    pub values: Vec<GuestValue>,
    pub names: Vec<Option<String>>,
}

impl ArgList {
    pub fn new(values: Vec<GuestValue>) -> Self {
        let names = vec![None; values.len()];
        Self { values, names }
    }

    pub fn named(values: Vec<GuestValue>, names: Vec<Option<String>>) -> Self {
        debug_assert_eq!(values.len(), names.len());
        Self { values, names }
    }

    /// Materialize the argument list as a pairlist, tagging named arguments.
    pub fn to_pairlist(&self) -> GuestValue {
        let mut out = GuestValue::Null;
        for (value, name) in self.values.iter().zip(&self.names).rev() {
            out = GuestValue::Pair(Rc::new(PairNode::new(
                value.clone(),
                out,
                name.clone(),
            )));
        }
        out
    }
}
