//! Numeric stdlib: one overload per numeric type an operation makes sense
//! for, mirroring the overload-table example in the interpreter's own
//! design notes (`str(Int)` vs `str(Double)`) rather than a single
//! generic-numeric entry point.

use crate::context::FrameHandle;
use crate::types::Type;
use crate::value::Value;

use super::host;

fn as_int(v: &Value) -> i64 {
    match v {
        Value::Int(n) => *n,
        _ => 0,
    }
}

fn as_double(v: &Value) -> f64 {
    match v {
        Value::Double(n) => *n,
        Value::Number(n) => *n,
        _ => 0.0,
    }
}

pub fn register(frame: &FrameHandle) {
    host(frame, "add", vec![Type::Int, Type::Int], false, |args| Value::Int(as_int(&args[0]) + as_int(&args[1])));
    host(frame, "add", vec![Type::Double, Type::Double], false, |args| {
        Value::Double(as_double(&args[0]) + as_double(&args[1]))
    });

    host(frame, "abs", vec![Type::Int], false, |args| Value::Int(as_int(&args[0]).abs()));
    host(frame, "abs", vec![Type::Double], false, |args| Value::Double(as_double(&args[0]).abs()));

    host(frame, "min", vec![Type::Int, Type::Int], false, |args| Value::Int(as_int(&args[0]).min(as_int(&args[1]))));
    host(frame, "min", vec![Type::Double, Type::Double], false, |args| {
        Value::Double(as_double(&args[0]).min(as_double(&args[1])))
    });

    host(frame, "max", vec![Type::Int, Type::Int], false, |args| Value::Int(as_int(&args[0]).max(as_int(&args[1]))));
    host(frame, "max", vec![Type::Double, Type::Double], false, |args| {
        Value::Double(as_double(&args[0]).max(as_double(&args[1])))
    });

    host(frame, "round", vec![Type::Double], false, |args| Value::Int(as_double(&args[0]).round() as i64));
    host(frame, "floor", vec![Type::Double], false, |args| Value::Int(as_double(&args[0]).floor() as i64));
    host(frame, "ceil", vec![Type::Double], false, |args| Value::Int(as_double(&args[0]).ceil() as i64));

    host(frame, "sqrt", vec![Type::Double], false, |args| Value::Double(as_double(&args[0]).sqrt()));
    host(frame, "pow", vec![Type::Double, Type::Double], false, |args| {
        Value::Double(as_double(&args[0]).powf(as_double(&args[1])))
    });
}
