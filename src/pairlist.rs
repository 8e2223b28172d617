//! Pairlist / Call-List Primitives
//!
//! Cons-style cells emulating the classic native list representation, plus
//! the accessor family (`car`, `cdr`, `cadr`, `caddr`, `cddr`) native
//! extension code expects over pairlists, language objects, argument lists,
//! symbols, and lists.
//!
//! N.B. the reference native runtime does not error check these accessors;
//! it will crash (segv) if given, say, a numeric arg. Here every accessor is
//! an exhaustive match over the representation family with a default arm
//! raising [`BridgeError::UnsupportedRepresentation`], so a misuse is
//! diagnosable instead of undefined behavior.

use std::rc::Rc;

use crate::error::{BridgeError, BridgeResult};
use crate::value::{GuestList, GuestValue};

/// A single pairlist cell: `(car, cdr)` plus an optional tag.
///
/// Cells are immutable once built; list surgery allocates new cells. The
/// `cdr` chain terminates in `GuestValue::Null`.
#[derive(Debug, Clone, PartialEq)]
pub struct PairNode {
    car: GuestValue,
    cdr: GuestValue,
    tag: Option<String>,
}

impl PairNode {
    pub fn new(car: GuestValue, cdr: GuestValue, tag: Option<String>) -> Self {
        Self { car, cdr, tag }
    }

    pub fn car(&self) -> GuestValue {
        self.car.clone()
    }

    pub fn cdr(&self) -> GuestValue {
        self.cdr.clone()
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// Number of cells reachable through the `cdr` chain, this cell included.
    pub fn list_length(&self) -> usize {
        let mut len = 1;
        let mut cursor = self.cdr.clone();
        while let GuestValue::Pair(node) | GuestValue::Lang(node) = cursor {
            len += 1;
            cursor = node.cdr();
        }
        len
    }

    /// Cell at `offset` positions down the `cdr` chain, if the chain is
    /// long enough.
    fn nth_cell(self: &Rc<Self>, offset: usize) -> Option<Rc<PairNode>> {
        let mut cursor = Rc::clone(self);
        for _ in 0..offset {
            match cursor.cdr {
                GuestValue::Pair(ref next) | GuestValue::Lang(ref next) => {
                    cursor = Rc::clone(next);
                }
                _ => return None,
            }
        }
        Some(cursor)
    }

    /// Element at `offset`, or `Null` when the chain runs out. The native
    /// API treats reading past the end of a pairlist as reading `Null`.
    fn element_at(self: &Rc<Self>, offset: usize) -> GuestValue {
        match self.nth_cell(offset) {
            Some(cell) => cell.car(),
            None => GuestValue::Null,
        }
    }

    /// Tail starting `offset` cells down, or `Null` when the chain runs out.
    fn tail_at(self: &Rc<Self>, offset: usize) -> GuestValue {
        match self.nth_cell(offset) {
            Some(cell) => cell.cdr(),
            None => GuestValue::Null,
        }
    }
}

/// Build a pairlist from a slice of values, last cell pointing at `Null`.
pub fn cons_all(values: &[GuestValue]) -> GuestValue {
    let mut out = GuestValue::Null;
    for value in values.iter().rev() {
        out = cons(value.clone(), out);
    }
    out
}

/// `CONS`: allocate one untagged cell.
pub fn cons(car: GuestValue, cdr: GuestValue) -> GuestValue {
    GuestValue::Pair(Rc::new(PairNode::new(car, cdr, None)))
}

/// `LCONS`: allocate one cell of a language object.
pub fn lcons(car: GuestValue, cdr: GuestValue) -> GuestValue {
    GuestValue::Lang(Rc::new(PairNode::new(car, cdr, None)))
}

/// `CAR`: first element.
///
/// Works on pairlists, language objects, argument lists, symbols (a symbol
/// is its own head), lists, and `Null`.
pub fn car(value: &GuestValue) -> BridgeResult<GuestValue> {
    match value {
        GuestValue::Pair(node) | GuestValue::Lang(node) => Ok(node.car()),
        GuestValue::Args(args) => Ok(args
            .values
            .first()
            .cloned()
            .unwrap_or(GuestValue::Null)),
        GuestValue::Symbol(_) => Ok(value.clone()),
        GuestValue::List(list) => Ok(list
            .elements
            .first()
            .cloned()
            .unwrap_or(GuestValue::Null)),
        GuestValue::Null => Ok(GuestValue::Null),
        other => Err(BridgeError::UnsupportedRepresentation {
            op: "CAR",
            found: other.kind_name(),
        }),
    }
}

/// `CDR`: everything past the first element.
///
/// For a list object this is non-destructive: the tail of a length-1 list is
/// `Null`, otherwise a fresh list of the remaining elements with element
/// names carried over when the original had them.
pub fn cdr(value: &GuestValue) -> BridgeResult<GuestValue> {
    match value {
        GuestValue::Pair(node) | GuestValue::Lang(node) => Ok(node.cdr()),
        GuestValue::Args(args) => cdr(&args.to_pairlist()),
        GuestValue::List(list) => {
            if list.elements.len() <= 1 {
                return Ok(GuestValue::Null);
            }
            let elements = list.elements[1..].to_vec();
            let names = list.names.as_ref().map(|n| n[1..].to_vec());
            Ok(GuestValue::List(GuestList { elements, names }))
        }
        other => Err(BridgeError::UnsupportedRepresentation {
            op: "CDR",
            found: other.kind_name(),
        }),
    }
}

/// `CADR`: second element.
pub fn cadr(value: &GuestValue) -> BridgeResult<GuestValue> {
    match value {
        GuestValue::Pair(node) | GuestValue::Lang(node) => Ok(node.element_at(1)),
        other => Err(BridgeError::UnsupportedRepresentation {
            op: "CADR",
            found: other.kind_name(),
        }),
    }
}

/// `CADDR`: third element.
pub fn caddr(value: &GuestValue) -> BridgeResult<GuestValue> {
    match value {
        GuestValue::Pair(node) | GuestValue::Lang(node) => Ok(node.element_at(2)),
        other => Err(BridgeError::UnsupportedRepresentation {
            op: "CADDR",
            found: other.kind_name(),
        }),
    }
}

/// `CDDR`: everything past the second element.
pub fn cddr(value: &GuestValue) -> BridgeResult<GuestValue> {
    match value {
        GuestValue::Pair(node) | GuestValue::Lang(node) => Ok(node.tail_at(1)),
        other => Err(BridgeError::UnsupportedRepresentation {
            op: "CDDR",
            found: other.kind_name(),
        }),
    }
}

/// `TAG`: the tag of the first cell, `Null` when untagged.
pub fn tag(value: &GuestValue) -> BridgeResult<GuestValue> {
    match value {
        GuestValue::Pair(node) | GuestValue::Lang(node) => Ok(node
            .tag()
            .map(|t| GuestValue::Symbol(t.to_string()))
            .unwrap_or(GuestValue::Null)),
        GuestValue::Null => Ok(GuestValue::Null),
        other => Err(BridgeError::UnsupportedRepresentation {
            op: "TAG",
            found: other.kind_name(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_pairlist() -> GuestValue {
        cons_all(&[
            GuestValue::Int(1),
            GuestValue::Int(2),
            GuestValue::Int(3),
        ])
    }

    #[test]
    fn test_car_cdr_pairlist() {
        let pl = sample_pairlist();
        assert_eq!(car(&pl).unwrap(), GuestValue::Int(1));
        let rest = cdr(&pl).unwrap();
        assert_eq!(car(&rest).unwrap(), GuestValue::Int(2));
    }

    #[test]
    fn test_cadr_caddr_cddr() {
        let pl = sample_pairlist();
        assert_eq!(cadr(&pl).unwrap(), GuestValue::Int(2));
        assert_eq!(caddr(&pl).unwrap(), GuestValue::Int(3));
        let tail = cddr(&pl).unwrap();
        assert_eq!(car(&tail).unwrap(), GuestValue::Int(3));
    }

    #[test]
    fn test_accessors_past_the_end() {
        let single = cons(GuestValue::Int(1), GuestValue::Null);
        assert_eq!(cadr(&single).unwrap(), GuestValue::Null);
        assert_eq!(caddr(&single).unwrap(), GuestValue::Null);
        assert_eq!(cddr(&single).unwrap(), GuestValue::Null);
    }

    #[test]
    fn test_symbol_is_its_own_car() {
        let sym = GuestValue::Symbol("quote".to_string());
        assert_eq!(car(&sym).unwrap(), sym);
        assert!(cdr(&sym).is_err());
    }

    #[test]
    fn test_unsupported_representation() {
        let vec = GuestValue::RealVec(vec![1.0]);
        let err = car(&vec).unwrap_err();
        match err {
            BridgeError::UnsupportedRepresentation { op, found } => {
                assert_eq!(op, "CAR");
                assert_eq!(found, "real vector");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(cadr(&vec).is_err());
        assert!(cddr(&vec).is_err());
    }

    #[test]
    fn test_lang_object_accessors() {
        let call = lcons(
            GuestValue::Symbol("sum".to_string()),
            cons(GuestValue::Real(1.5), GuestValue::Null),
        );
        assert_eq!(
            car(&call).unwrap(),
            GuestValue::Symbol("sum".to_string())
        );
        assert_eq!(cadr(&call).unwrap(), GuestValue::Real(1.5));
    }

    #[test]
    fn test_list_cdr_preserves_names() {
        let list = GuestValue::List(GuestList::with_names(
            vec![GuestValue::Int(1), GuestValue::Int(2), GuestValue::Int(3)],
            vec!["a".into(), "b".into(), "c".into()],
        ));
        let rest = cdr(&list).unwrap();
        match rest {
            GuestValue::List(l) => {
                assert_eq!(l.elements, vec![GuestValue::Int(2), GuestValue::Int(3)]);
                assert_eq!(l.names, Some(vec!["b".to_string(), "c".to_string()]));
            }
            other => panic!("expected list, got {:?}", other),
        }
        // original untouched
        match list {
            GuestValue::List(l) => assert_eq!(l.elements.len(), 3),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_list_singleton_cdr_is_null() {
        let list = GuestValue::List(GuestList::new(vec![GuestValue::Int(1)]));
        assert_eq!(cdr(&list).unwrap(), GuestValue::Null);
    }

    #[test]
    fn test_tag() {
        let tagged = GuestValue::Pair(Rc::new(PairNode::new(
            GuestValue::Int(1),
            GuestValue::Null,
            Some("x".to_string()),
        )));
        assert_eq!(tag(&tagged).unwrap(), GuestValue::Symbol("x".to_string()));
        let untagged = cons(GuestValue::Int(1), GuestValue::Null);
        assert_eq!(tag(&untagged).unwrap(), GuestValue::Null);
    }
}
