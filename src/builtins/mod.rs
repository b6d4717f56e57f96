//! # Built-in registry
//!
//! Populates a frame with the stdlib signatures/implementations the
//! built-in registry groups into strings, arithmetic, collections,
//! transforms, and audio glue. Registration goes through [`host`], a thin
//! wrapper around `declare_overload` that builds the `FunctionValue::Host`
//! shape every submodule needs — the same `register(interp)` plugin shape
//! a scripting-language native-function registry uses, generalized here to
//! carry a `Signature` instead of an untyped name.
//!
//! Higher-order builtins (`map`/`filter`/`each`/`reduce` in
//! `collections.rs`) call back into user-defined Flow functions through
//! `interpreter::invoke_pure` rather than taking an `EvalContext` — a
//! `Host` closure's signature is `Fn(&[Value]) -> Value`, so it has no
//! frame or diagnostics channel of its own, and is never handed one.

mod arithmetic;
mod audio;
mod collections;
mod strings;
mod transforms;

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use rand::rngs::StdRng;

use crate::context::{declare_overload, FrameHandle, FunctionValue};
use crate::synth::Synth;
use crate::types::{Signature, Type};
use crate::value::Value;

pub(crate) fn host(
    frame: &FrameHandle,
    name: &str,
    params: Vec<Type>,
    is_varargs: bool,
    call: impl Fn(&[Value]) -> Value + 'static,
) {
    let signature = Signature::new(name, params, is_varargs);
    let func = FunctionValue::Host { signature, call: Rc::new(call) };
    declare_overload(frame, name.to_string(), Rc::new(func));
}

/// Registers every stdlib category into `frame`. `synths` backs the
/// `render` builtin in `audio.rs`; an engine builds it once from
/// `synth::default_registry` (or a host-supplied replacement) at
/// construction time and shares it across every `render` call.
pub fn register_all(frame: &FrameHandle, synths: Rc<HashMap<&'static str, Rc<dyn Synth>>>, rng: Rc<RefCell<StdRng>>) {
    arithmetic::register(frame);
    strings::register(frame);
    collections::register(frame);
    transforms::register(frame);
    audio::register(frame, synths, rng);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinaryOp, Expr, ExprKind, Param, Stmt, StmtKind};
    use crate::context::Frame;
    use crate::diagnostics::SourceLocation;
    use crate::overload::try_resolve;
    use rand::SeedableRng;

    fn registered_frame() -> FrameHandle {
        let frame = Frame::new_root();
        let synths: HashMap<&'static str, Rc<dyn Synth>> = HashMap::new();
        let rng = Rc::new(RefCell::new(StdRng::seed_from_u64(42)));
        register_all(&frame, Rc::new(synths), rng);
        frame
    }

    fn host_call(frame: &FrameHandle, name: &str, arg_types: &[Type]) -> Rc<dyn Fn(&[Value]) -> Value> {
        let resolution = try_resolve(frame, name, arg_types).unwrap();
        match &*resolution.function {
            FunctionValue::Host { call, .. } => call.clone(),
            FunctionValue::User { .. } => panic!("{name} is not a host builtin"),
        }
    }

    #[test]
    fn abs_resolves_for_int_and_double() {
        let frame = registered_frame();
        assert!(try_resolve(&frame, "abs", &[Type::Int]).is_some());
        assert!(try_resolve(&frame, "abs", &[Type::Double]).is_some());
    }

    #[test]
    fn str_of_string_is_identity_per_overload_example() {
        let frame = registered_frame();
        let call = host_call(&frame, "str", &[Type::String]);
        let result = call(&[Value::Str("hi".into())]);
        assert!(matches!(result, Value::Str(s) if s == "hi"));
    }

    #[test]
    fn length_accepts_any_array_element_type_via_void_wildcard() {
        let frame = registered_frame();
        let call = host_call(&frame, "length", &[Type::Array(Box::new(Type::Int))]);
        let arr = Value::Array(Type::Int, Rc::new(vec![Value::Int(1), Value::Int(2)]));
        assert!(matches!(call(&[arr]), Value::Int(2)));
    }

    #[test]
    fn map_doubles_each_element_via_host_callback() {
        let frame = registered_frame();

        let body = Expr::new(
            ExprKind::Binary {
                op: BinaryOp::Mul,
                left: Box::new(Expr::new(ExprKind::Identifier("n".into()), SourceLocation::new(1, 1))),
                right: Box::new(Expr::new(ExprKind::IntLit(2), SourceLocation::new(1, 1))),
            },
            SourceLocation::new(1, 1),
        );
        let func = FunctionValue::User {
            signature: Signature::new("<test-double>", vec![Type::Int], false),
            params: vec![Param { name: "n".into(), ty: Type::Int, is_varargs: false }],
            body: Rc::new(vec![Stmt::new(StmtKind::Expr(body), SourceLocation::new(1, 1))]),
            captured: Some(Rc::clone(&frame)),
            is_internal: false,
        };

        let call = host_call(&frame, "map", &[Type::Array(Box::new(Type::Int)), Type::Function]);
        let input = Value::Array(Type::Int, Rc::new(vec![Value::Int(1), Value::Int(2), Value::Int(3)]));
        let result = call(&[input, Value::Function(Rc::new(func))]);

        match result {
            Value::Array(_, items) => {
                let doubled: Vec<i64> = items.iter().map(|v| match v { Value::Int(n) => *n, _ => 0 }).collect();
                assert_eq!(doubled, vec![2, 4, 6]);
            }
            other => panic!("expected array, got {:?}", other),
        }
    }
}
