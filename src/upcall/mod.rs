//! Upcall Table
//!
//! The fixed, densely indexed registry of callbacks native code may invoke
//! back into the managed runtime. The index ordering is shared with native
//! code and is ABI: reordering [`UpcallId`] is a breaking change (a test
//! pins every assignment).
//!
//! The table is built once from an exhaustive match over the closed enum,
//! so coverage is checked at compile time; there is no half-registered
//! state. A raw index arriving from native code that maps to no variant
//! raises [`BridgeError::UnimplementedUpcall`] at the call site; gaps fail
//! loudly, never with a default value.

mod impls;

use crate::error::{BridgeError, BridgeResult};
use crate::handles::{HandleTable, NativeHandle};
use crate::value::GuestValue;

/// Every native-API entry point the bridge exposes for re-entry, in ABI
/// order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum UpcallId {
    Car = 0,
    Cdr = 1,
    Cadr = 2,
    Caddr = 3,
    Cddr = 4,
    Tag = 5,
    Cons = 6,
    LCons = 7,
    AllocVector = 8,
    Length = 9,
    VectorElt = 10,
    SetVectorElt = 11,
    IntegerData = 12,
    RealData = 13,
    RawData = 14,
    LogicalData = 15,
    StringElt = 16,
    MkChar = 17,
    MkString = 18,
    AsInteger = 19,
    AsReal = 20,
    AsLogical = 21,
    AsChar = 22,
    Duplicate = 23,
    IsNull = 24,
    Protect = 25,
    Unprotect = 26,
    FindVar = 27,
    SetVar = 28,
    GetNames = 29,
    SetNames = 30,
}

impl UpcallId {
    /// Dense ABI order; position equals discriminant.
    pub const ALL: [UpcallId; 31] = [
        UpcallId::Car,
        UpcallId::Cdr,
        UpcallId::Cadr,
        UpcallId::Caddr,
        UpcallId::Cddr,
        UpcallId::Tag,
        UpcallId::Cons,
        UpcallId::LCons,
        UpcallId::AllocVector,
        UpcallId::Length,
        UpcallId::VectorElt,
        UpcallId::SetVectorElt,
        UpcallId::IntegerData,
        UpcallId::RealData,
        UpcallId::RawData,
        UpcallId::LogicalData,
        UpcallId::StringElt,
        UpcallId::MkChar,
        UpcallId::MkString,
        UpcallId::AsInteger,
        UpcallId::AsReal,
        UpcallId::AsLogical,
        UpcallId::AsChar,
        UpcallId::Duplicate,
        UpcallId::IsNull,
        UpcallId::Protect,
        UpcallId::Unprotect,
        UpcallId::FindVar,
        UpcallId::SetVar,
        UpcallId::GetNames,
        UpcallId::SetNames,
    ];

    pub fn index(self) -> u32 {
        self as u32
    }

    /// Map a raw index from native code. `None` for anything outside the
    /// table.
    pub fn from_index(index: u32) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }
}

/// A marshaled argument as native code passes it: an opaque handle, a bare
/// scalar, or a byte buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeArg {
    Handle(NativeHandle),
    Int(i32),
    Real(f64),
    Logical(bool),
    Str(String),
    Bytes(Vec<u8>),
}

impl NativeArg {
    fn kind_name(&self) -> &'static str {
        match self {
            NativeArg::Handle(_) => "handle",
            NativeArg::Int(_) => "int",
            NativeArg::Real(_) => "real",
            NativeArg::Logical(_) => "logical",
            NativeArg::Str(_) => "string",
            NativeArg::Bytes(_) => "bytes",
        }
    }
}

/// An upcall result in whatever representation the active backend needs:
/// a handle for managed objects, an array snapshot the backend projects
/// into a native memory view, or a direct scalar.
#[derive(Debug, Clone, PartialEq)]
pub enum UpcallResult {
    Handle(NativeHandle),
    Int(i32),
    Real(f64),
    Logical(bool),
    Str(String),
    IntArray(Vec<i32>),
    RealArray(Vec<f64>),
    Bytes(Vec<u8>),
    Unit,
}

/// The slice of the evaluator the upcalls re-enter: variable lookup and
/// assignment in the guest environment. Everything else the bridge needs
/// from the evaluator is the value model itself.
pub trait EvalDelegate {
    fn find_var(&mut self, name: &str) -> Option<GuestValue>;
    fn set_var(&mut self, name: &str, value: GuestValue);
}

/// Per-dispatch context: the handle table of the calling guest context plus
/// its evaluator delegate. Upcalls run synchronously on the caller's stack.
pub struct UpcallContext<'a> {
    pub handles: &'a mut HandleTable,
    pub eval: &'a mut dyn EvalDelegate,
}

impl<'a> UpcallContext<'a> {
    pub fn new(handles: &'a mut HandleTable, eval: &'a mut dyn EvalDelegate) -> Self {
        Self { handles, eval }
    }
}

/// Callback signature: unwrap native arguments, perform the managed
/// operation, wrap the result.
pub type UpcallFn = fn(&mut UpcallContext<'_>, &[NativeArg]) -> BridgeResult<UpcallResult>;

/// Dense upcall registry. Built once, immutable after construction, O(1)
/// lookup by index.
pub struct UpcallTable {
    slots: Vec<UpcallFn>,
}

impl UpcallTable {
    pub fn new() -> Self {
        let slots = UpcallId::ALL.iter().map(|&id| impls::callback_for(id)).collect();
        Self { slots }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Dispatch a raw index from native code.
    pub fn dispatch(
        &self,
        ctx: &mut UpcallContext<'_>,
        index: u32,
        args: &[NativeArg],
    ) -> BridgeResult<UpcallResult> {
        let id = UpcallId::from_index(index).ok_or(BridgeError::UnimplementedUpcall(index))?;
        self.call(ctx, id, args)
    }

    /// Dispatch a known upcall id.
    pub fn call(
        &self,
        ctx: &mut UpcallContext<'_>,
        id: UpcallId,
        args: &[NativeArg],
    ) -> BridgeResult<UpcallResult> {
        (self.slots[id.index() as usize])(ctx, args)
    }
}

impl Default for UpcallTable {
    fn default() -> Self {
        Self::new()
    }
}

// Argument unwrapping helpers shared by the implementations.

fn arg(args: &[NativeArg], i: usize, expected: &'static str) -> BridgeResult<NativeArg> {
    args.get(i).cloned().ok_or(BridgeError::TypeMismatch {
        expected,
        found: "missing argument",
    })
}

fn arg_handle(args: &[NativeArg], i: usize) -> BridgeResult<NativeHandle> {
    match arg(args, i, "handle")? {
        NativeArg::Handle(h) => Ok(h),
        other => Err(BridgeError::TypeMismatch {
            expected: "handle",
            found: other.kind_name(),
        }),
    }
}

fn arg_int(args: &[NativeArg], i: usize) -> BridgeResult<i32> {
    match arg(args, i, "int")? {
        NativeArg::Int(v) => Ok(v),
        other => Err(BridgeError::TypeMismatch {
            expected: "int",
            found: other.kind_name(),
        }),
    }
}

fn arg_str(args: &[NativeArg], i: usize) -> BridgeResult<String> {
    match arg(args, i, "string")? {
        NativeArg::Str(s) => Ok(s),
        NativeArg::Bytes(b) => Ok(String::from_utf8_lossy(&b).into_owned()),
        other => Err(BridgeError::TypeMismatch {
            expected: "string",
            found: other.kind_name(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_order_is_abi() {
        // Position == discriminant, pinned: reordering the enum breaks
        // native code compiled against the table.
        for (pos, id) in UpcallId::ALL.iter().enumerate() {
            assert_eq!(id.index() as usize, pos);
        }
        assert_eq!(UpcallId::Car.index(), 0);
        assert_eq!(UpcallId::AllocVector.index(), 8);
        assert_eq!(UpcallId::Protect.index(), 25);
        assert_eq!(UpcallId::SetNames.index(), 30);
    }

    #[test]
    fn test_from_index_rejects_out_of_range() {
        assert_eq!(UpcallId::from_index(0), Some(UpcallId::Car));
        assert_eq!(UpcallId::from_index(30), Some(UpcallId::SetNames));
        assert_eq!(UpcallId::from_index(31), None);
        assert_eq!(UpcallId::from_index(u32::MAX), None);
    }

    #[test]
    fn test_table_is_dense_and_complete() {
        let table = UpcallTable::new();
        assert_eq!(table.len(), UpcallId::ALL.len());
    }
}
