//! Upcall implementations.
//!
//! Every callback follows the same three steps: unwrap the native argument
//! representations into managed values, perform the managed operation, and
//! wrap the result back into what the active backend expects: a handle, an
//! array snapshot, or a direct scalar.
//!
//! Vector kind codes in [`alloc_vector`] follow the classic SEXP type
//! numbering native extension code was compiled against.

use crate::error::{BridgeError, BridgeResult};
use crate::pairlist;
use crate::value::{GuestList, GuestValue};

use super::{
    arg_handle, arg_int, arg_str, NativeArg, UpcallContext, UpcallFn, UpcallId, UpcallResult,
};

/// Classic SEXP type codes used by `AllocVector`.
pub mod vector_kind {
    pub const LGLSXP: i32 = 10;
    pub const INTSXP: i32 = 13;
    pub const REALSXP: i32 = 14;
    pub const STRSXP: i32 = 16;
    pub const VECSXP: i32 = 19;
    pub const RAWSXP: i32 = 24;
}

/// The compile-time-checked mapping from the closed id enum to callbacks.
/// The match is exhaustive: adding an id without a callback does not build.
pub(super) fn callback_for(id: UpcallId) -> UpcallFn {
    match id {
        UpcallId::Car => car,
        UpcallId::Cdr => cdr,
        UpcallId::Cadr => cadr,
        UpcallId::Caddr => caddr,
        UpcallId::Cddr => cddr,
        UpcallId::Tag => tag,
        UpcallId::Cons => cons,
        UpcallId::LCons => lcons,
        UpcallId::AllocVector => alloc_vector,
        UpcallId::Length => length,
        UpcallId::VectorElt => vector_elt,
        UpcallId::SetVectorElt => set_vector_elt,
        UpcallId::IntegerData => integer_data,
        UpcallId::RealData => real_data,
        UpcallId::RawData => raw_data,
        UpcallId::LogicalData => logical_data,
        UpcallId::StringElt => string_elt,
        UpcallId::MkChar => mk_char,
        UpcallId::MkString => mk_string,
        UpcallId::AsInteger => as_integer,
        UpcallId::AsReal => as_real,
        UpcallId::AsLogical => as_logical,
        UpcallId::AsChar => as_char,
        UpcallId::Duplicate => duplicate,
        UpcallId::IsNull => is_null,
        UpcallId::Protect => protect,
        UpcallId::Unprotect => unprotect,
        UpcallId::FindVar => find_var,
        UpcallId::SetVar => set_var,
        UpcallId::GetNames => get_names,
        UpcallId::SetNames => set_names,
    }
}

// Pairlist family -------------------------------------------------------------

fn accessor_upcall(
    ctx: &mut UpcallContext<'_>,
    args: &[NativeArg],
    op: fn(&GuestValue) -> BridgeResult<GuestValue>,
) -> BridgeResult<UpcallResult> {
    let handle = arg_handle(args, 0)?;
    let value = ctx.handles.resolve(handle)?.clone();
    let result = op(&value)?;
    Ok(UpcallResult::Handle(ctx.handles.bind(result)))
}

fn car(ctx: &mut UpcallContext<'_>, args: &[NativeArg]) -> BridgeResult<UpcallResult> {
    accessor_upcall(ctx, args, pairlist::car)
}

fn cdr(ctx: &mut UpcallContext<'_>, args: &[NativeArg]) -> BridgeResult<UpcallResult> {
    accessor_upcall(ctx, args, pairlist::cdr)
}

fn cadr(ctx: &mut UpcallContext<'_>, args: &[NativeArg]) -> BridgeResult<UpcallResult> {
    accessor_upcall(ctx, args, pairlist::cadr)
}

fn caddr(ctx: &mut UpcallContext<'_>, args: &[NativeArg]) -> BridgeResult<UpcallResult> {
    accessor_upcall(ctx, args, pairlist::caddr)
}

fn cddr(ctx: &mut UpcallContext<'_>, args: &[NativeArg]) -> BridgeResult<UpcallResult> {
    accessor_upcall(ctx, args, pairlist::cddr)
}

fn tag(ctx: &mut UpcallContext<'_>, args: &[NativeArg]) -> BridgeResult<UpcallResult> {
    accessor_upcall(ctx, args, pairlist::tag)
}

fn cons(ctx: &mut UpcallContext<'_>, args: &[NativeArg]) -> BridgeResult<UpcallResult> {
    let head = ctx.handles.resolve(arg_handle(args, 0)?)?.clone();
    let tail = ctx.handles.resolve(arg_handle(args, 1)?)?.clone();
    Ok(UpcallResult::Handle(
        ctx.handles.bind(pairlist::cons(head, tail)),
    ))
}

fn lcons(ctx: &mut UpcallContext<'_>, args: &[NativeArg]) -> BridgeResult<UpcallResult> {
    let head = ctx.handles.resolve(arg_handle(args, 0)?)?.clone();
    let tail = ctx.handles.resolve(arg_handle(args, 1)?)?.clone();
    Ok(UpcallResult::Handle(
        ctx.handles.bind(pairlist::lcons(head, tail)),
    ))
}

// Construction & element access ----------------------------------------------

fn alloc_vector(ctx: &mut UpcallContext<'_>, args: &[NativeArg]) -> BridgeResult<UpcallResult> {
    let kind = arg_int(args, 0)?;
    let len = arg_int(args, 1)?.max(0) as usize;
    let value = match kind {
        vector_kind::LGLSXP => GuestValue::LogicalVec(vec![0; len]),
        vector_kind::INTSXP => GuestValue::IntVec(vec![0; len]),
        vector_kind::REALSXP => GuestValue::RealVec(vec![0.0; len]),
        vector_kind::STRSXP => GuestValue::StrVec(vec![String::new(); len]),
        vector_kind::VECSXP => GuestValue::List(GuestList::new(vec![GuestValue::Null; len])),
        vector_kind::RAWSXP => GuestValue::RawVec(vec![0; len]),
        _ => {
            return Err(BridgeError::TypeMismatch {
                expected: "vector kind code",
                found: "unknown kind",
            })
        }
    };
    Ok(UpcallResult::Handle(ctx.handles.bind(value)))
}

fn length(ctx: &mut UpcallContext<'_>, args: &[NativeArg]) -> BridgeResult<UpcallResult> {
    let value = ctx.handles.resolve(arg_handle(args, 0)?)?;
    Ok(UpcallResult::Int(value.length() as i32))
}

fn vector_elt(ctx: &mut UpcallContext<'_>, args: &[NativeArg]) -> BridgeResult<UpcallResult> {
    let handle = arg_handle(args, 0)?;
    let index = arg_int(args, 1)?.max(0) as usize;
    let value = ctx.handles.resolve(handle)?.clone();
    let elt = match value {
        GuestValue::List(list) => list
            .elements
            .get(index)
            .cloned()
            .unwrap_or(GuestValue::Null),
        other => {
            return Err(BridgeError::TypeMismatch {
                expected: "list",
                found: other.kind_name(),
            })
        }
    };
    Ok(UpcallResult::Handle(ctx.handles.bind(elt)))
}

fn set_vector_elt(ctx: &mut UpcallContext<'_>, args: &[NativeArg]) -> BridgeResult<UpcallResult> {
    let handle = arg_handle(args, 0)?;
    let index = arg_int(args, 1)?.max(0) as usize;
    let elt = ctx.handles.resolve(arg_handle(args, 2)?)?.clone();
    let mut value = ctx.handles.resolve(handle)?.clone();
    match value {
        GuestValue::List(ref mut list) => {
            if index >= list.elements.len() {
                return Err(BridgeError::IndexOutOfBounds {
                    index,
                    length: list.elements.len(),
                });
            }
            list.elements[index] = elt;
        }
        ref other => {
            return Err(BridgeError::TypeMismatch {
                expected: "list",
                found: other.kind_name(),
            })
        }
    }
    ctx.handles.rebind(handle, value)?;
    Ok(UpcallResult::Handle(handle))
}

fn integer_data(ctx: &mut UpcallContext<'_>, args: &[NativeArg]) -> BridgeResult<UpcallResult> {
    match ctx.handles.resolve(arg_handle(args, 0)?)? {
        GuestValue::IntVec(v) => Ok(UpcallResult::IntArray(v.clone())),
        GuestValue::Int(v) => Ok(UpcallResult::IntArray(vec![*v])),
        other => Err(BridgeError::TypeMismatch {
            expected: "integer vector",
            found: other.kind_name(),
        }),
    }
}

fn real_data(ctx: &mut UpcallContext<'_>, args: &[NativeArg]) -> BridgeResult<UpcallResult> {
    match ctx.handles.resolve(arg_handle(args, 0)?)? {
        GuestValue::RealVec(v) => Ok(UpcallResult::RealArray(v.clone())),
        GuestValue::Real(v) => Ok(UpcallResult::RealArray(vec![*v])),
        other => Err(BridgeError::TypeMismatch {
            expected: "real vector",
            found: other.kind_name(),
        }),
    }
}

fn raw_data(ctx: &mut UpcallContext<'_>, args: &[NativeArg]) -> BridgeResult<UpcallResult> {
    match ctx.handles.resolve(arg_handle(args, 0)?)? {
        GuestValue::RawVec(v) => Ok(UpcallResult::Bytes(v.clone())),
        other => Err(BridgeError::TypeMismatch {
            expected: "raw vector",
            found: other.kind_name(),
        }),
    }
}

fn logical_data(ctx: &mut UpcallContext<'_>, args: &[NativeArg]) -> BridgeResult<UpcallResult> {
    match ctx.handles.resolve(arg_handle(args, 0)?)? {
        GuestValue::LogicalVec(v) => Ok(UpcallResult::Bytes(v.clone())),
        GuestValue::Logical(b) => Ok(UpcallResult::Bytes(vec![*b as u8])),
        other => Err(BridgeError::TypeMismatch {
            expected: "logical vector",
            found: other.kind_name(),
        }),
    }
}

fn string_elt(ctx: &mut UpcallContext<'_>, args: &[NativeArg]) -> BridgeResult<UpcallResult> {
    let handle = arg_handle(args, 0)?;
    let index = arg_int(args, 1)?.max(0) as usize;
    match ctx.handles.resolve(handle)? {
        GuestValue::StrVec(v) => Ok(UpcallResult::Str(
            v.get(index).cloned().unwrap_or_default(),
        )),
        GuestValue::Str(s) if index == 0 => Ok(UpcallResult::Str(s.clone())),
        other => Err(BridgeError::TypeMismatch {
            expected: "character vector",
            found: other.kind_name(),
        }),
    }
}

fn mk_char(ctx: &mut UpcallContext<'_>, args: &[NativeArg]) -> BridgeResult<UpcallResult> {
    let s = arg_str(args, 0)?;
    Ok(UpcallResult::Handle(ctx.handles.bind(GuestValue::Str(s))))
}

fn mk_string(ctx: &mut UpcallContext<'_>, args: &[NativeArg]) -> BridgeResult<UpcallResult> {
    let s = arg_str(args, 0)?;
    Ok(UpcallResult::Handle(
        ctx.handles.bind(GuestValue::StrVec(vec![s])),
    ))
}

// Scalar coercion -------------------------------------------------------------

fn as_integer(ctx: &mut UpcallContext<'_>, args: &[NativeArg]) -> BridgeResult<UpcallResult> {
    let value = ctx.handles.resolve(arg_handle(args, 0)?)?;
    Ok(UpcallResult::Int(value.as_int()?))
}

fn as_real(ctx: &mut UpcallContext<'_>, args: &[NativeArg]) -> BridgeResult<UpcallResult> {
    let value = ctx.handles.resolve(arg_handle(args, 0)?)?;
    Ok(UpcallResult::Real(value.as_real()?))
}

fn as_logical(ctx: &mut UpcallContext<'_>, args: &[NativeArg]) -> BridgeResult<UpcallResult> {
    let value = ctx.handles.resolve(arg_handle(args, 0)?)?;
    Ok(UpcallResult::Logical(value.as_logical()?))
}

fn as_char(ctx: &mut UpcallContext<'_>, args: &[NativeArg]) -> BridgeResult<UpcallResult> {
    let value = ctx.handles.resolve(arg_handle(args, 0)?)?;
    Ok(UpcallResult::Str(value.as_str()?.to_string()))
}

// Misc ------------------------------------------------------------------------

fn duplicate(ctx: &mut UpcallContext<'_>, args: &[NativeArg]) -> BridgeResult<UpcallResult> {
    let value = ctx.handles.resolve(arg_handle(args, 0)?)?.clone();
    Ok(UpcallResult::Handle(ctx.handles.bind(value)))
}

fn is_null(ctx: &mut UpcallContext<'_>, args: &[NativeArg]) -> BridgeResult<UpcallResult> {
    let value = ctx.handles.resolve(arg_handle(args, 0)?)?;
    Ok(UpcallResult::Logical(value.is_null()))
}

fn protect(ctx: &mut UpcallContext<'_>, args: &[NativeArg]) -> BridgeResult<UpcallResult> {
    let handle = arg_handle(args, 0)?;
    ctx.handles.pin(handle)?;
    Ok(UpcallResult::Handle(handle))
}

fn unprotect(ctx: &mut UpcallContext<'_>, args: &[NativeArg]) -> BridgeResult<UpcallResult> {
    let handle = arg_handle(args, 0)?;
    ctx.handles.unpin(handle)?;
    Ok(UpcallResult::Unit)
}

// Environment -----------------------------------------------------------------

fn find_var(ctx: &mut UpcallContext<'_>, args: &[NativeArg]) -> BridgeResult<UpcallResult> {
    let sym = arg_handle(args, 0)?;
    let name = ctx.handles.resolve(sym)?.as_str()?.to_string();
    let value = ctx.eval.find_var(&name).unwrap_or(GuestValue::Null);
    Ok(UpcallResult::Handle(ctx.handles.bind(value)))
}

fn set_var(ctx: &mut UpcallContext<'_>, args: &[NativeArg]) -> BridgeResult<UpcallResult> {
    let sym = arg_handle(args, 0)?;
    let name = ctx.handles.resolve(sym)?.as_str()?.to_string();
    let value = ctx.handles.resolve(arg_handle(args, 1)?)?.clone();
    ctx.eval.set_var(&name, value);
    Ok(UpcallResult::Unit)
}

// Names metadata --------------------------------------------------------------

fn get_names(ctx: &mut UpcallContext<'_>, args: &[NativeArg]) -> BridgeResult<UpcallResult> {
    let value = ctx.handles.resolve(arg_handle(args, 0)?)?.clone();
    let names = match value {
        GuestValue::List(list) => list.names.map(GuestValue::StrVec),
        _ => None,
    };
    Ok(UpcallResult::Handle(
        ctx.handles.bind(names.unwrap_or(GuestValue::Null)),
    ))
}

fn set_names(ctx: &mut UpcallContext<'_>, args: &[NativeArg]) -> BridgeResult<UpcallResult> {
    let handle = arg_handle(args, 0)?;
    let names = match ctx.handles.resolve(arg_handle(args, 1)?)? {
        GuestValue::StrVec(v) => Some(v.clone()),
        GuestValue::Null => None,
        other => {
            return Err(BridgeError::TypeMismatch {
                expected: "character vector",
                found: other.kind_name(),
            })
        }
    };
    let mut value = ctx.handles.resolve(handle)?.clone();
    match value {
        GuestValue::List(ref mut list) => list.names = names,
        ref other => {
            return Err(BridgeError::TypeMismatch {
                expected: "list",
                found: other.kind_name(),
            })
        }
    }
    ctx.handles.rebind(handle, value)?;
    Ok(UpcallResult::Handle(handle))
}
