//! Array stdlib: `length`/`range`/`map`/`filter`/`each`/`reduce`. The
//! parametric slots register against `Array<Void>`, the same universal
//! placeholder the varargs machinery in `overload.rs` uses for `list(...)`
//! — there is no "any array" type in the closed type set, so the
//! Void-wildcard compatibility rule is how one signature matches every
//! concrete element type.
//!
//! `reduce`'s accumulator is typed `Double` rather than left generic: the
//! overload system has no universal placeholder for an arbitrary scalar
//! the way it has one for arrays, so a truly generic accumulator would
//! need a distinct registered overload per accumulator type. `Double`
//! covers every numeric accumulator through the existing widening ladder
//! (`Int`/`Long`/`Float` all convert up to it); a non-numeric accumulator
//! is out of scope for this builtin.

use std::rc::Rc;

use crate::context::{FrameHandle, FunctionValue};
use crate::interpreter::invoke_pure;
use crate::types::Type;
use crate::value::Value;

use super::host;

fn as_items(v: &Value) -> Rc<Vec<Value>> {
    match v {
        Value::Array(_, items) => items.clone(),
        _ => Rc::new(Vec::new()),
    }
}

fn as_function(v: &Value) -> Option<Rc<FunctionValue>> {
    match v {
        Value::Function(f) => Some(f.clone()),
        _ => None,
    }
}

fn array_of(values: Vec<Value>) -> Value {
    let elem_ty = match values.split_first() {
        None => Type::Void,
        Some((first, rest)) => {
            let ty = first.type_of();
            if rest.iter().all(|v| v.type_of() == ty) { ty } else { Type::Void }
        }
    };
    Value::Array(elem_ty, Rc::new(values))
}

pub fn register(frame: &FrameHandle) {
    let arr = Type::Array(Box::new(Type::Void));

    host(frame, "length", vec![arr.clone()], false, |args| Value::Int(as_items(&args[0]).len() as i64));

    host(frame, "range", vec![Type::Int, Type::Int], false, |args| {
        let (Value::Int(from), Value::Int(to)) = (&args[0], &args[1]) else { return Value::Void };
        Value::Array(Type::Int, Rc::new((*from..*to).map(Value::Int).collect()))
    });

    host(frame, "map", vec![arr.clone(), Type::Function], false, |args| {
        let items = as_items(&args[0]);
        let Some(func) = as_function(&args[1]) else { return Value::Void };
        let mapped: Vec<Value> = items.iter().map(|v| invoke_pure(&func, vec![v.clone()])).collect();
        array_of(mapped)
    });

    host(frame, "filter", vec![arr.clone(), Type::Function], false, |args| {
        let items = as_items(&args[0]);
        let Some(func) = as_function(&args[1]) else { return Value::Void };
        let elem_ty = match &args[0] {
            Value::Array(t, _) => t.clone(),
            _ => Type::Void,
        };
        let kept: Vec<Value> = items
            .iter()
            .filter(|v| matches!(invoke_pure(&func, vec![(*v).clone()]), Value::Bool(true)))
            .cloned()
            .collect();
        Value::Array(elem_ty, Rc::new(kept))
    });

    host(frame, "each", vec![arr.clone(), Type::Function], false, |args| {
        let items = as_items(&args[0]);
        let Some(func) = as_function(&args[1]) else { return Value::Void };
        for v in items.iter() {
            invoke_pure(&func, vec![v.clone()]);
        }
        Value::Void
    });

    host(frame, "reduce", vec![arr, Type::Function, Type::Double], false, |args| {
        let items = as_items(&args[0]);
        let Some(func) = as_function(&args[1]) else { return Value::Void };
        let mut acc = match &args[2] {
            Value::Double(n) => *n,
            _ => 0.0,
        };
        for v in items.iter() {
            acc = match invoke_pure(&func, vec![Value::Double(acc), v.clone()]) {
                Value::Double(n) => n,
                Value::Int(n) => n as f64,
                Value::Number(n) => n,
                _ => acc,
            };
        }
        Value::Double(acc)
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Frame;
    use crate::overload::try_resolve;

    fn call(name: &str, arg_types: &[Type], args: &[Value]) -> Value {
        let frame = Frame::new_root();
        register(&frame);
        let resolution = try_resolve(&frame, name, arg_types).unwrap();
        match &*resolution.function {
            FunctionValue::Host { call, .. } => call(args),
            _ => unreachable!(),
        }
    }

    fn arr_ty() -> Type {
        Type::Array(Box::new(Type::Int))
    }

    #[test]
    fn length_counts_elements() {
        let arr = Value::Array(Type::Int, Rc::new(vec![Value::Int(1), Value::Int(2), Value::Int(3)]));
        assert!(matches!(call("length", &[arr_ty()], &[arr]), Value::Int(3)));
    }

    #[test]
    fn range_is_half_open() {
        let result = call("range", &[Type::Int, Type::Int], &[Value::Int(0), Value::Int(3)]);
        match result {
            Value::Array(_, items) => assert_eq!(items.len(), 3),
            other => panic!("expected array, got {:?}", other),
        }
    }

    #[test]
    fn filter_keeps_only_matching_elements() {
        use crate::ast::{BinaryOp, Expr, ExprKind, Param, Stmt, StmtKind};
        use crate::diagnostics::SourceLocation;
        use crate::types::Signature;

        let frame = Frame::new_root();
        let body = Expr::new(
            ExprKind::Binary {
                op: BinaryOp::Gt,
                left: Box::new(Expr::new(ExprKind::Identifier("n".into()), SourceLocation::new(1, 1))),
                right: Box::new(Expr::new(ExprKind::IntLit(1), SourceLocation::new(1, 1))),
            },
            SourceLocation::new(1, 1),
        );
        let func = FunctionValue::User {
            signature: Signature::new("<test-gt1>", vec![Type::Int], false),
            params: vec![Param { name: "n".into(), ty: Type::Int, is_varargs: false }],
            body: Rc::new(vec![Stmt::new(StmtKind::Expr(body), SourceLocation::new(1, 1))]),
            captured: Some(Rc::clone(&frame)),
            is_internal: false,
        };

        register(&frame);
        let resolution = try_resolve(&frame, "filter", &[arr_ty(), Type::Function]).unwrap();
        let call = match &*resolution.function {
            FunctionValue::Host { call, .. } => call.clone(),
            _ => unreachable!(),
        };
        let input = Value::Array(Type::Int, Rc::new(vec![Value::Int(1), Value::Int(2), Value::Int(3)]));
        let result = call(&[input, Value::Function(Rc::new(func))]);
        match result {
            Value::Array(_, items) => {
                let kept: Vec<i64> = items.iter().map(|v| match v { Value::Int(n) => *n, _ => 0 }).collect();
                assert_eq!(kept, vec![2, 3]);
            }
            other => panic!("expected array, got {:?}", other),
        }
    }
}
