//! String stdlib: the `str` conversion family (including the
//! `str(String)` identity overload the interpreter's design notes use as
//! its worked overload-resolution example) plus length/concat/case.

use crate::context::FrameHandle;
use crate::types::Type;
use crate::value::Value;

use super::host;

fn as_string(v: &Value) -> String {
    match v {
        Value::Str(s) => s.clone(),
        _ => String::new(),
    }
}

pub fn register(frame: &FrameHandle) {
    host(frame, "str", vec![Type::Int], false, |args| match &args[0] {
        Value::Int(n) => Value::Str(n.to_string()),
        _ => Value::Void,
    });
    host(frame, "str", vec![Type::Long], false, |args| match &args[0] {
        Value::Long(n) => Value::Str(n.to_string()),
        _ => Value::Void,
    });
    host(frame, "str", vec![Type::Double], false, |args| match &args[0] {
        Value::Double(n) => Value::Str(n.to_string()),
        _ => Value::Void,
    });
    host(frame, "str", vec![Type::Bool], false, |args| match &args[0] {
        Value::Bool(b) => Value::Str(b.to_string()),
        _ => Value::Void,
    });
    host(frame, "str", vec![Type::String], false, |args| args[0].clone());

    host(frame, "length", vec![Type::String], false, |args| Value::Int(as_string(&args[0]).chars().count() as i64));
    host(frame, "concat", vec![Type::String, Type::String], false, |args| {
        Value::Str(format!("{}{}", as_string(&args[0]), as_string(&args[1])))
    });
    host(frame, "upper", vec![Type::String], false, |args| Value::Str(as_string(&args[0]).to_uppercase()));
    host(frame, "lower", vec![Type::String], false, |args| Value::Str(as_string(&args[0]).to_lowercase()));

    host(frame, "print", vec![Type::String], false, |args| {
        println!("{}", as_string(&args[0]));
        Value::Void
    });
}
