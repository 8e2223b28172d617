//! Upcall dispatch through a full bridge context: native code re-entering
//! the managed runtime by dense callback index.

use std::collections::HashMap;

use ferrule::upcall::UpcallId;
use ferrule::{
    BridgeConfig, BridgeContext, BridgeError, EvalDelegate, GuestValue, NativeArg, NativeHandle,
    UpcallResult,
};

/// Minimal evaluator: a flat variable environment.
struct MapEval {
    vars: HashMap<String, GuestValue>,
}

impl MapEval {
    fn new() -> Self {
        Self {
            vars: HashMap::new(),
        }
    }
}

impl EvalDelegate for MapEval {
    fn find_var(&mut self, name: &str) -> Option<GuestValue> {
        self.vars.get(name).cloned()
    }

    fn set_var(&mut self, name: &str, value: GuestValue) {
        self.vars.insert(name.to_string(), value);
    }
}

fn context() -> BridgeContext {
    BridgeContext::new(BridgeConfig::default()).unwrap()
}

fn call(
    ctx: &mut BridgeContext,
    eval: &mut MapEval,
    id: UpcallId,
    args: &[NativeArg],
) -> UpcallResult {
    ctx.upcall(eval, id.index(), args).unwrap()
}

fn handle_of(result: UpcallResult) -> NativeHandle {
    match result {
        UpcallResult::Handle(h) => h,
        other => panic!("expected handle result, got {:?}", other),
    }
}

#[test]
fn callback_indices_are_abi_stable() {
    assert_eq!(UpcallId::Car.index(), 0);
    assert_eq!(UpcallId::AllocVector.index(), 8);
    assert_eq!(UpcallId::Protect.index(), 25);
    assert_eq!(UpcallId::SetNames.index(), 30);
    assert_eq!(UpcallId::from_index(0), Some(UpcallId::Car));
    assert_eq!(UpcallId::from_index(30), Some(UpcallId::SetNames));
    assert_eq!(UpcallId::from_index(31), None);
}

#[test]
fn unassigned_index_is_a_typed_error_not_a_crash() {
    let mut ctx = context();
    let mut eval = MapEval::new();
    for index in [31, 100, u32::MAX] {
        match ctx.upcall(&mut eval, index, &[]) {
            Err(BridgeError::UnimplementedUpcall(i)) => assert_eq!(i, index),
            other => panic!("expected UnimplementedUpcall, got {:?}", other),
        }
    }
}

#[test]
fn cons_then_car_and_cdr_round_trip_through_handles() {
    let mut ctx = context();
    let mut eval = MapEval::new();

    let head = ctx.handles().bind(GuestValue::Int(7));
    let empty = ctx.handles().bind(GuestValue::Null);
    let cell = handle_of(call(
        &mut ctx,
        &mut eval,
        UpcallId::Cons,
        &[NativeArg::Handle(head), NativeArg::Handle(empty)],
    ));

    let car = handle_of(call(
        &mut ctx,
        &mut eval,
        UpcallId::Car,
        &[NativeArg::Handle(cell)],
    ));
    assert_eq!(ctx.handles().resolve(car).unwrap(), &GuestValue::Int(7));

    let cdr = handle_of(call(
        &mut ctx,
        &mut eval,
        UpcallId::Cdr,
        &[NativeArg::Handle(cell)],
    ));
    assert!(ctx.handles().resolve(cdr).unwrap().is_null());
}

#[test]
fn alloc_and_mutate_a_generic_vector() {
    let mut ctx = context();
    let mut eval = MapEval::new();

    // VECSXP == 19
    let list = handle_of(call(
        &mut ctx,
        &mut eval,
        UpcallId::AllocVector,
        &[NativeArg::Int(19), NativeArg::Int(3)],
    ));
    let len = call(&mut ctx, &mut eval, UpcallId::Length, &[NativeArg::Handle(list)]);
    assert_eq!(len, UpcallResult::Int(3));

    let elt = ctx.handles().bind(GuestValue::Real(2.5));
    call(
        &mut ctx,
        &mut eval,
        UpcallId::SetVectorElt,
        &[NativeArg::Handle(list), NativeArg::Int(1), NativeArg::Handle(elt)],
    );

    let got = handle_of(call(
        &mut ctx,
        &mut eval,
        UpcallId::VectorElt,
        &[NativeArg::Handle(list), NativeArg::Int(1)],
    ));
    assert_eq!(ctx.handles().resolve(got).unwrap(), &GuestValue::Real(2.5));

    // untouched slots stay empty
    let hole = handle_of(call(
        &mut ctx,
        &mut eval,
        UpcallId::VectorElt,
        &[NativeArg::Handle(list), NativeArg::Int(0)],
    ));
    assert!(ctx.handles().resolve(hole).unwrap().is_null());
}

#[test]
fn out_of_range_list_write_is_a_typed_error() {
    let mut ctx = context();
    let mut eval = MapEval::new();

    let list = handle_of(call(
        &mut ctx,
        &mut eval,
        UpcallId::AllocVector,
        &[NativeArg::Int(19), NativeArg::Int(2)],
    ));
    let elt = ctx.handles().bind(GuestValue::Int(5));
    match ctx.upcall(
        &mut eval,
        UpcallId::SetVectorElt.index(),
        &[NativeArg::Handle(list), NativeArg::Int(2), NativeArg::Handle(elt)],
    ) {
        Err(BridgeError::IndexOutOfBounds { index, length }) => {
            assert_eq!(index, 2);
            assert_eq!(length, 2);
        }
        other => panic!("expected IndexOutOfBounds, got {:?}", other),
    }

    // the rejected write leaves the list untouched
    let slot = handle_of(call(
        &mut ctx,
        &mut eval,
        UpcallId::VectorElt,
        &[NativeArg::Handle(list), NativeArg::Int(1)],
    ));
    assert!(ctx.handles().resolve(slot).unwrap().is_null());
}

#[test]
fn data_upcalls_return_snapshots() {
    let mut ctx = context();
    let mut eval = MapEval::new();

    let ints = ctx.handles().bind(GuestValue::IntVec(vec![1, 2, 3]));
    let snap = call(&mut ctx, &mut eval, UpcallId::IntegerData, &[NativeArg::Handle(ints)]);
    assert_eq!(snap, UpcallResult::IntArray(vec![1, 2, 3]));

    let reals = ctx.handles().bind(GuestValue::RealVec(vec![0.5, -0.5]));
    let snap = call(&mut ctx, &mut eval, UpcallId::RealData, &[NativeArg::Handle(reals)]);
    assert_eq!(snap, UpcallResult::RealArray(vec![0.5, -0.5]));
}

#[test]
fn mk_string_builds_a_length_one_character_vector() {
    let mut ctx = context();
    let mut eval = MapEval::new();

    let s = handle_of(call(
        &mut ctx,
        &mut eval,
        UpcallId::MkString,
        &[NativeArg::Str("hello".to_string())],
    ));
    assert_eq!(
        ctx.handles().resolve(s).unwrap(),
        &GuestValue::StrVec(vec!["hello".to_string()])
    );

    let elt = call(
        &mut ctx,
        &mut eval,
        UpcallId::StringElt,
        &[NativeArg::Handle(s), NativeArg::Int(0)],
    );
    assert_eq!(elt, UpcallResult::Str("hello".to_string()));
}

#[test]
fn scalar_coercions_are_typed() {
    let mut ctx = context();
    let mut eval = MapEval::new();

    let n = ctx.handles().bind(GuestValue::Int(41));
    assert_eq!(
        call(&mut ctx, &mut eval, UpcallId::AsInteger, &[NativeArg::Handle(n)]),
        UpcallResult::Int(41)
    );

    let s = ctx.handles().bind(GuestValue::Str("nope".to_string()));
    match ctx.upcall(&mut eval, UpcallId::AsReal.index(), &[NativeArg::Handle(s)]) {
        Err(BridgeError::TypeMismatch { .. }) => {}
        other => panic!("expected TypeMismatch, got {:?}", other),
    }
}

#[test]
fn wrong_argument_representation_is_rejected() {
    let mut ctx = context();
    let mut eval = MapEval::new();
    match ctx.upcall(&mut eval, UpcallId::Car.index(), &[NativeArg::Int(3)]) {
        Err(BridgeError::TypeMismatch { expected, .. }) => assert_eq!(expected, "handle"),
        other => panic!("expected TypeMismatch, got {:?}", other),
    }
}

#[test]
fn protect_keeps_a_handle_alive_across_scope_exit() {
    let mut ctx = context();
    let mut eval = MapEval::new();

    ctx.handles().open_scope();
    let kept = ctx.handles().bind(GuestValue::Int(1));
    let lost = ctx.handles().bind(GuestValue::Int(2));
    call(&mut ctx, &mut eval, UpcallId::Protect, &[NativeArg::Handle(kept)]);
    ctx.handles().close_scope();

    assert_eq!(ctx.handles().resolve(kept).unwrap(), &GuestValue::Int(1));
    assert!(matches!(
        ctx.handles().resolve(lost),
        Err(BridgeError::DeadHandle(_))
    ));

    // once released, the next scope exit reclaims it
    call(&mut ctx, &mut eval, UpcallId::Unprotect, &[NativeArg::Handle(kept)]);
    ctx.handles().open_scope();
    ctx.handles().close_scope();
    assert!(ctx.handles().resolve(kept).is_err());
}

#[test]
fn environment_upcalls_go_through_the_evaluator() {
    let mut ctx = context();
    let mut eval = MapEval::new();

    let sym = ctx.handles().bind(GuestValue::Symbol("x".to_string()));
    let val = ctx.handles().bind(GuestValue::Real(9.0));
    call(
        &mut ctx,
        &mut eval,
        UpcallId::SetVar,
        &[NativeArg::Handle(sym), NativeArg::Handle(val)],
    );
    assert_eq!(eval.vars.get("x"), Some(&GuestValue::Real(9.0)));

    let found = handle_of(call(
        &mut ctx,
        &mut eval,
        UpcallId::FindVar,
        &[NativeArg::Handle(sym)],
    ));
    assert_eq!(ctx.handles().resolve(found).unwrap(), &GuestValue::Real(9.0));

    // a miss binds the empty value rather than erroring
    let missing = ctx.handles().bind(GuestValue::Symbol("ghost".to_string()));
    let found = handle_of(call(
        &mut ctx,
        &mut eval,
        UpcallId::FindVar,
        &[NativeArg::Handle(missing)],
    ));
    assert!(ctx.handles().resolve(found).unwrap().is_null());
}

#[test]
fn names_metadata_round_trips_on_lists() {
    let mut ctx = context();
    let mut eval = MapEval::new();

    let list = handle_of(call(
        &mut ctx,
        &mut eval,
        UpcallId::AllocVector,
        &[NativeArg::Int(19), NativeArg::Int(2)],
    ));
    let names = ctx
        .handles()
        .bind(GuestValue::StrVec(vec!["a".to_string(), "b".to_string()]));
    call(
        &mut ctx,
        &mut eval,
        UpcallId::SetNames,
        &[NativeArg::Handle(list), NativeArg::Handle(names)],
    );

    let got = handle_of(call(
        &mut ctx,
        &mut eval,
        UpcallId::GetNames,
        &[NativeArg::Handle(list)],
    ));
    assert_eq!(
        ctx.handles().resolve(got).unwrap(),
        &GuestValue::StrVec(vec!["a".to_string(), "b".to_string()])
    );
}
