//! # Interpreter
//!
//! Tree walker over the parsed AST: `execute`/`evaluate`, call-depth
//! guarded frame pushes, implicit-return aggregation, and the value-level
//! conversion/default logic `types.rs`'s relations deliberately leave out
//! (those operate on `Type` alone). Carries state across statements —
//! frames, overloads, closures — rather than producing one throwaway
//! AST per call.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use rand::RngCore;

use crate::ast::{BinaryOp, ContextKind, Expr, ExprKind, Stmt, StmtKind, UnaryOp};
use crate::context::{
    assign_var, declare_overload, declare_var, effective_musical_context, Frame, FrameHandle,
    FunctionValue, MusicalContextSnapshot, MAX_STACK_DEPTH,
};
use crate::diagnostics::{DiagnosticKind, Diagnostics, SourceLocation};
use crate::notestream_compiler;
use crate::overload::{self, Resolution};
use crate::types::{numeric_rank, Signature, Type};
use crate::value::{SectionValue, TimeSignatureValue, Value};

/// `use "path"` delegates resolution and execution to whatever the host
/// engine wires up here, so the interpreter never has to know about the
/// filesystem or the loaded/loading cycle guard itself.
pub trait ModuleLoader {
    fn resolve_and_load(
        &mut self,
        raw_path: &str,
        importing_file: Option<&Path>,
        frame: &FrameHandle,
        diags: &mut Diagnostics,
        location: SourceLocation,
    );
}

/// Everything a single evaluation needs that isn't per-frame state: the
/// diagnostics sink, the module loader, the shared PRNG for `??`
/// note-stream elements, and which file is currently executing (for
/// relative `use` resolution and diagnostic file tags).
pub struct EvalContext<'a> {
    pub diags: &'a mut Diagnostics,
    pub loader: &'a mut dyn ModuleLoader,
    pub rng: &'a mut dyn RngCore,
    pub current_file: Option<PathBuf>,
}

pub fn execute(frame: &FrameHandle, program: &[Stmt], ctx: &mut EvalContext) {
    execute_block(frame, program, ctx);
}

fn execute_block(frame: &FrameHandle, stmts: &[Stmt], ctx: &mut EvalContext) {
    for stmt in stmts {
        if frame.borrow().pending_return.is_some() {
            break;
        }
        execute_stmt(frame, stmt, ctx);
    }
}

fn execute_stmt(frame: &FrameHandle, stmt: &Stmt, ctx: &mut EvalContext) {
    match &stmt.kind {
        StmtKind::ProcDecl { name, is_internal, params, body } => {
            let param_types: Vec<Type> = params.iter().map(|p| p.ty.clone()).collect();
            let is_varargs = params.last().is_some_and(|p| p.is_varargs);
            let signature = Signature::new(name.clone(), param_types, is_varargs);
            // A named proc resolves free variables against the live
            // declaring frame, not a snapshot: unlike a lambda, it is
            // meant to see later mutations of outer state (and to call
            // itself recursively through the overload table).
            let func = FunctionValue::User {
                signature,
                params: params.clone(),
                body: Rc::new(body.clone()),
                captured: Some(Rc::clone(frame)),
                is_internal: *is_internal,
            };
            declare_overload(frame, name.clone(), Rc::new(func));
        }

        StmtKind::VarDecl { ty, name, init } => {
            let declared = match init {
                None => default_value(ty),
                Some(expr) => {
                    let value = evaluate(frame, expr, ctx);
                    let vty = value.type_of();
                    if vty.equals(ty) || vty.is_compatible_with(ty) {
                        value
                    } else if vty.can_convert_to(ty) {
                        convert_value(value, ty)
                    } else {
                        ctx.diags.push(
                            DiagnosticKind::TypeIncompatibleAssignment { from: vty.to_string(), to: ty.to_string() },
                            stmt.location.clone(),
                        );
                        default_value(ty)
                    }
                }
            };
            // A Sequence declared straight from a note-stream literal keeps
            // its raw bars and the context they were compiled against
            // alongside the compiled value, so an enclosing section can
            // recompile it on a later repeat (see `note_sources`).
            if let (Value::Sequence(_), Some(expr)) = (&declared, init) {
                if let ExprKind::NoteStream(bars) = &expr.kind {
                    let resolved = effective_musical_context(frame);
                    frame.borrow_mut().note_sources.insert(name.clone(), (Rc::new(bars.clone()), resolved));
                }
            }
            if !declare_var(frame, name, declared) {
                ctx.diags.push(DiagnosticKind::ResolutionAlreadyDeclared(name.clone()), stmt.location.clone());
            }
        }

        StmtKind::Assign { name, value } => {
            let v = evaluate(frame, value, ctx);
            if !assign_var(frame, name, v) {
                ctx.diags.push(DiagnosticKind::ResolutionNotFound(name.clone()), stmt.location.clone());
            }
        }

        StmtKind::Return(expr) => {
            let v = match expr {
                Some(e) => evaluate(frame, e, ctx),
                None => Value::Void,
            };
            frame.borrow_mut().pending_return = Some(v);
        }

        StmtKind::Use { path } => {
            ctx.loader.resolve_and_load(path, ctx.current_file.as_deref(), frame, ctx.diags, stmt.location.clone());
        }

        StmtKind::Context { kind, body } => {
            let snapshot = build_context_snapshot(frame, kind, stmt.location.clone(), ctx);
            let child = Frame::child_of(frame);
            child.borrow_mut().musical_context = Some(snapshot);
            execute_block(&child, body, ctx);
            let pending = child.borrow().pending_return.clone();
            if let Some(v) = pending {
                frame.borrow_mut().pending_return = Some(v);
            }
        }

        StmtKind::Section { name, body } => {
            let child = Frame::child_of(frame);
            execute_block(&child, body, ctx);
            let mut sequences = HashMap::new();
            let mut raw = HashMap::new();
            let child_ref = child.borrow();
            for (k, v) in child_ref.variables.iter() {
                if let Value::Sequence(seq) = v {
                    sequences.insert(k.clone(), seq.clone());
                    if let Some(source) = child_ref.note_sources.get(k) {
                        raw.insert(k.clone(), source.clone());
                    }
                }
            }
            drop(child_ref);
            let section = SectionValue { name: name.clone(), sequences: Rc::new(sequences), raw: Rc::new(raw) };
            if !declare_var(frame, name, Value::Section(Rc::new(section))) {
                ctx.diags.push(DiagnosticKind::ResolutionAlreadyDeclared(name.clone()), stmt.location.clone());
            }
        }

        StmtKind::Expr(expr) => {
            let v = evaluate(frame, expr, ctx);
            frame.borrow_mut().implicit_values.push(v);
        }
    }
}

fn build_context_snapshot(
    frame: &FrameHandle,
    kind: &ContextKind,
    loc: SourceLocation,
    ctx: &mut EvalContext,
) -> MusicalContextSnapshot {
    match kind {
        ContextKind::TimeSig { numerator, denominator } => {
            if *denominator == 0 || !denominator.is_power_of_two() {
                ctx.diags.push(
                    DiagnosticKind::MusicalInvalidTimeSignature { numerator: *numerator, denominator: *denominator },
                    loc,
                );
            }
            MusicalContextSnapshot {
                time_signature: Some(TimeSignatureValue { numerator: *numerator, denominator: *denominator }),
                ..Default::default()
            }
        }
        ContextKind::Tempo(expr) => {
            let v = evaluate(frame, expr, ctx);
            let tempo = numeric_of(&v).map(|(f, _)| f).unwrap_or(0.0);
            if tempo <= 0.0 {
                ctx.diags.push(DiagnosticKind::MusicalInvalidTempo(tempo), loc);
            }
            MusicalContextSnapshot { tempo: Some(tempo), ..Default::default() }
        }
        ContextKind::Swing(expr) => {
            let v = evaluate(frame, expr, ctx);
            let swing = numeric_of(&v).map(|(f, _)| f).unwrap_or(0.0);
            if !(0.0..=1.0).contains(&swing) {
                ctx.diags.push(DiagnosticKind::MusicalInvalidSwing(swing), loc);
            }
            MusicalContextSnapshot { swing: Some(swing), ..Default::default() }
        }
        ContextKind::Key(name) => {
            if !is_valid_key(name) {
                ctx.diags.push(DiagnosticKind::MusicalInvalidKey(name.clone()), loc);
            }
            MusicalContextSnapshot { key: Some(name.clone()), ..Default::default() }
        }
        // `dynamics` scopes a block of declarations without contributing a
        // field the context-resolution walk tracks.
        ContextKind::Dynamics(_) => MusicalContextSnapshot::default(),
    }
}

const SHARP_PITCH_CLASSES: [&str; 12] = ["C", "Cs", "D", "Ds", "E", "F", "Fs", "G", "Gs", "A", "As", "B"];
const FLAT_PITCH_CLASSES: [&str; 12] = ["C", "Df", "D", "Ef", "E", "F", "Gf", "G", "Af", "A", "Bf", "B"];

fn is_valid_key(name: &str) -> bool {
    SHARP_PITCH_CLASSES
        .iter()
        .chain(FLAT_PITCH_CLASSES.iter())
        .any(|pc| *pc == name || format!("{pc}m") == name)
}

pub fn evaluate(frame: &FrameHandle, expr: &Expr, ctx: &mut EvalContext) -> Value {
    match &expr.kind {
        ExprKind::IntLit(v) => Value::Int(*v),
        ExprKind::LongLit(v) => Value::Long(*v),
        ExprKind::FloatLit(v) => Value::Float(*v),
        ExprKind::DoubleLit(v) => Value::Double(*v),
        ExprKind::StringLit(s) => Value::Str(s.clone()),
        ExprKind::BoolLit(b) => Value::Bool(*b),
        ExprKind::SemitoneLit(v) => Value::Semitone(*v),
        ExprKind::CentLit(v) => Value::Cent(*v),
        ExprKind::MillisecondLit(v) => Value::Millisecond(*v),
        ExprKind::SecondLit(v) => Value::Second(*v),
        ExprKind::DecibelLit(v) => Value::Decibel(*v),
        ExprKind::NoteLit { letter, alteration, octave } => {
            Value::Note(crate::ast::PitchSpelling { letter: *letter, alteration: *alteration, octave: *octave })
        }

        ExprKind::Identifier(name) => match crate::context::lookup_var(frame, name) {
            Some(v) => v,
            None => match overload::try_resolve(frame, name, &[]) {
                Some(resolution) => call_function(&resolution, Vec::new(), expr.location.clone(), ctx),
                None => {
                    ctx.diags.push(DiagnosticKind::ResolutionNotFound(name.clone()), expr.location.clone());
                    Value::Void
                }
            },
        },

        ExprKind::Call { callee, args } => {
            let arg_values: Vec<Value> = args.iter().map(|a| evaluate(frame, a, ctx)).collect();
            // A bare name can be either a declared overload set or a plain
            // variable holding a closure (`Function f = fn n => ...; f(5)`);
            // a variable and an overload set can never share a name (both
            // go through `name_is_taken`), so checking the variable first
            // is unambiguous.
            if let Some(Value::Function(func)) = crate::context::lookup_var(frame, callee) {
                return invoke(&func, arg_values, expr.location.clone(), ctx);
            }
            let arg_types: Vec<Type> = arg_values.iter().map(Value::type_of).collect();
            match overload::resolve(frame, callee, &arg_types, ctx.diags, expr.location.clone()) {
                Some(resolution) => call_function(&resolution, arg_values, expr.location.clone(), ctx),
                None => Value::Void,
            }
        }

        ExprKind::Flow { left, right } => {
            let left_val = evaluate(frame, left, ctx);
            match &right.kind {
                ExprKind::Call { callee, args } => {
                    let mut arg_values = vec![left_val];
                    arg_values.extend(args.iter().map(|a| evaluate(frame, a, ctx)));
                    let arg_types: Vec<Type> = arg_values.iter().map(Value::type_of).collect();
                    match overload::resolve(frame, callee, &arg_types, ctx.diags, expr.location.clone()) {
                        Some(resolution) => call_function(&resolution, arg_values, expr.location.clone(), ctx),
                        None => Value::Void,
                    }
                }
                ExprKind::Identifier(name) => {
                    let arg_types = [left_val.type_of()];
                    match overload::resolve(frame, name, &arg_types, ctx.diags, expr.location.clone()) {
                        Some(resolution) => call_function(&resolution, vec![left_val], expr.location.clone(), ctx),
                        None => Value::Void,
                    }
                }
                _ => {
                    let right_val = evaluate(frame, right, ctx);
                    match right_val {
                        Value::Function(func) => invoke(&func, vec![left_val], expr.location.clone(), ctx),
                        _ => {
                            ctx.diags.push(
                                DiagnosticKind::RuntimeBadClosure("flow right-hand side is not callable".into()),
                                expr.location.clone(),
                            );
                            Value::Void
                        }
                    }
                }
            }
        }

        ExprKind::Binary { op, left, right } => {
            let l = evaluate(frame, left, ctx);
            let r = evaluate(frame, right, ctx);
            apply_binary(*op, &l, &r, expr.location.clone(), ctx.diags)
        }

        ExprKind::Unary { op, operand } => {
            let v = evaluate(frame, operand, ctx);
            match op {
                UnaryOp::Neg => match numeric_of(&v) {
                    Some((f, t)) => wrap_numeric(-f, t),
                    None => {
                        ctx.diags.push(
                            DiagnosticKind::TypeInconvertible { from: v.type_of().to_string(), to: "Number".into() },
                            expr.location.clone(),
                        );
                        Value::Void
                    }
                },
            }
        }

        ExprKind::Index { target, index } => {
            let target_val = evaluate(frame, target, ctx);
            let index_val = evaluate(frame, index, ctx);
            match (&target_val, numeric_of(&index_val)) {
                (Value::Array(_, items), Some((i, _))) => {
                    Value::index_array(items, i as i64).unwrap_or_else(|| {
                        ctx.diags.push(DiagnosticKind::RuntimeOutOfBounds(i as i64), expr.location.clone());
                        Value::Void
                    })
                }
                _ => {
                    ctx.diags.push(
                        DiagnosticKind::TypeUnknownMember(format!("@ on {}", target_val.type_of())),
                        expr.location.clone(),
                    );
                    Value::Void
                }
            }
        }

        ExprKind::Member { target, name } => {
            let target_val = evaluate(frame, target, ctx);
            evaluate_member(&target_val, name, expr.location.clone(), ctx.diags)
        }

        ExprKind::Lambda { params, body } => {
            let captured = snapshot_frame(frame);
            let signature = Signature::new(
                format!("<lambda@{}:{}>", expr.location.line, expr.location.column),
                params.iter().map(|p| p.ty.clone()).collect(),
                params.last().is_some_and(|p| p.is_varargs),
            );
            let wrapped_body = vec![Stmt::new(StmtKind::Expr((**body).clone()), body.location.clone())];
            let func = FunctionValue::User {
                signature,
                params: params.clone(),
                body: Rc::new(wrapped_body),
                captured: Some(captured),
                is_internal: false,
            };
            Value::Function(Rc::new(func))
        }

        ExprKind::Lazy(inner) => {
            Value::Lazy(Rc::new(crate::value::Thunk::new((**inner).clone(), Rc::clone(frame), Type::Void)))
        }

        ExprKind::ArrayLit(elems) => {
            let values: Vec<Value> = elems.iter().map(|e| evaluate(frame, e, ctx)).collect();
            let elem_ty = match values.split_first() {
                None => Type::Void,
                Some((first, rest)) => {
                    let first_ty = first.type_of();
                    if rest.iter().all(|v| v.type_of() == first_ty) { first_ty } else { Type::Void }
                }
            };
            Value::Array(elem_ty, Rc::new(values))
        }

        ExprKind::NoteStream(bars) => {
            let resolved = effective_musical_context(frame);
            notestream_compiler::compile(bars, &resolved, ctx.rng, ctx.diags, expr.location.clone())
        }
    }
}

fn evaluate_member(target: &Value, name: &str, loc: SourceLocation, diags: &mut Diagnostics) -> Value {
    let unknown = |diags: &mut Diagnostics| {
        diags.push(DiagnosticKind::TypeUnknownMember(name.to_string()), loc.clone());
        Value::Void
    };
    match target {
        Value::Section(sec) => match name {
            "name" => Value::Str(sec.name.clone()),
            _ => match sec.sequences.get(name) {
                Some(seq) => Value::Sequence(seq.clone()),
                None => unknown(diags),
            },
        },
        Value::MusicalNote(note) => match name {
            "pitch" => note.pitch.clone().map(Value::Note).unwrap_or(Value::Void),
            "duration" => Value::NoteValue(crate::value::NoteValueData { class: note.duration, dotted: note.dotted }),
            "isRest" => Value::Bool(note.is_rest),
            "tied" => Value::Bool(note.tied),
            "velocity" => note.velocity.map(Value::Number).unwrap_or(Value::Void),
            "centOffset" => note.cent_offset.map(Value::Int).unwrap_or(Value::Void),
            _ => unknown(diags),
        },
        Value::TimeSignature(ts) => match name {
            "numerator" => Value::Int(ts.numerator as i64),
            "denominator" => Value::Int(ts.denominator as i64),
            _ => unknown(diags),
        },
        Value::Voice(voice) => {
            let v = voice.borrow();
            match name {
                "gain" => Value::Double(v.gain),
                "pan" => Value::Double(v.pan),
                "offset" => Value::Beat(v.offset_beats),
                _ => unknown(diags),
            }
        }
        Value::Track(track) => {
            let t = track.borrow();
            match name {
                "gain" => Value::Double(t.gain),
                _ => unknown(diags),
            }
        }
        _ => unknown(diags),
    }
}

fn numeric_of(v: &Value) -> Option<(f64, Type)> {
    match v {
        Value::Int(n) => Some((*n as f64, Type::Int)),
        Value::Long(n) => Some((*n as f64, Type::Long)),
        Value::Float(n) => Some((*n as f64, Type::Float)),
        Value::Double(n) => Some((*n, Type::Double)),
        Value::Number(n) => Some((*n, Type::Number)),
        _ => None,
    }
}

fn wrap_numeric(v: f64, ty: Type) -> Value {
    match ty {
        Type::Int => Value::Int(v as i64),
        Type::Long => Value::Long(v as i64),
        Type::Float => Value::Float(v as f32),
        Type::Double => Value::Double(v),
        _ => Value::Number(v),
    }
}

fn widest_numeric(a: &Type, b: &Type) -> Type {
    if numeric_rank(a).unwrap_or(0) >= numeric_rank(b).unwrap_or(0) { a.clone() } else { b.clone() }
}

fn apply_binary(op: BinaryOp, left: &Value, right: &Value, loc: SourceLocation, diags: &mut Diagnostics) -> Value {
    let lhs = match numeric_of(left) {
        Some(x) => x,
        None => {
            diags.push(
                DiagnosticKind::TypeInconvertible { from: left.type_of().to_string(), to: "Number".into() },
                loc,
            );
            return Value::Void;
        }
    };
    let rhs = match numeric_of(right) {
        Some(x) => x,
        None => {
            diags.push(
                DiagnosticKind::TypeInconvertible { from: right.type_of().to_string(), to: "Number".into() },
                loc,
            );
            return Value::Void;
        }
    };
    let (lf, lt) = lhs;
    let (rf, rt) = rhs;
    match op {
        BinaryOp::Lt => return Value::Bool(lf < rf),
        BinaryOp::Gt => return Value::Bool(lf > rf),
        BinaryOp::Div if rf == 0.0 => {
            diags.push(DiagnosticKind::RuntimeDivisionByZero, loc);
            return Value::Void;
        }
        _ => {}
    }
    let result = match op {
        BinaryOp::Add => lf + rf,
        BinaryOp::Sub => lf - rf,
        BinaryOp::Mul => lf * rf,
        BinaryOp::Div => lf / rf,
        BinaryOp::Lt | BinaryOp::Gt => unreachable!("handled above"),
    };
    wrap_numeric(result, widest_numeric(&lt, &rt))
}

/// Flattens the visible chain (root to nearest, nearest wins on name
/// collision) into one standalone frame. Values that are plain-clone
/// immutable are copied independently; the five named mutable audio
/// containers are `Rc<RefCell<_>>`, so their clone still aliases the
/// live container by design, not a leak of this snapshot's purpose.
fn snapshot_frame(frame: &FrameHandle) -> FrameHandle {
    let mut chain = Vec::new();
    let mut cursor = Some(Rc::clone(frame));
    while let Some(f) = cursor {
        let parent = f.borrow().parent.clone();
        chain.push(f);
        cursor = parent;
    }
    chain.reverse();

    let snapshot = Frame::new_root();
    for f in chain {
        let f_ref = f.borrow();
        for (k, v) in f_ref.variables.iter() {
            snapshot.borrow_mut().variables.insert(k.clone(), v.clone());
        }
        for (k, list) in f_ref.overloads.iter() {
            snapshot.borrow_mut().overloads.entry(k.clone()).or_default().extend(list.iter().cloned());
        }
    }
    snapshot
}

pub fn default_value(ty: &Type) -> Value {
    match ty {
        Type::Int => Value::Int(0),
        Type::Long => Value::Long(0),
        Type::Float => Value::Float(0.0),
        Type::Double => Value::Double(0.0),
        Type::String => Value::Str(String::new()),
        Type::Bool => Value::Bool(false),
        Type::Number => Value::Number(0.0),
        Type::Semitone => Value::Semitone(0),
        Type::Cent => Value::Cent(0.0),
        Type::Millisecond => Value::Millisecond(0.0),
        Type::Second => Value::Second(0.0),
        Type::Decibel => Value::Decibel(0.0),
        Type::Beat => Value::Beat(0.0),
        Type::Array(elem) => Value::Array((**elem).clone(), Rc::new(Vec::new())),
        _ => Value::Void,
    }
}

pub fn convert_value(value: Value, target: &Type) -> Value {
    if value.type_of().equals(target) {
        return value;
    }
    match (value, target) {
        (Value::Int(v), Type::Long) => Value::Long(v),
        (Value::Int(v), Type::Float) => Value::Float(v as f32),
        (Value::Int(v), Type::Double) => Value::Double(v as f64),
        (Value::Int(v), Type::Number) => Value::Number(v as f64),
        (Value::Long(v), Type::Float) => Value::Float(v as f32),
        (Value::Long(v), Type::Double) => Value::Double(v as f64),
        (Value::Long(v), Type::Number) => Value::Number(v as f64),
        (Value::Float(v), Type::Double) => Value::Double(v as f64),
        (Value::Float(v), Type::Number) => Value::Number(v as f64),
        (Value::Double(v), Type::Number) => Value::Number(v),
        (Value::Millisecond(v), Type::Second) => Value::Second(v / 1000.0),
        (Value::Second(v), Type::Millisecond) => Value::Millisecond(v * 1000.0),
        (Value::Array(_, items), Type::Array(elem)) if items.is_empty() => Value::Array((**elem).clone(), items),
        (Value::Array(_, items), Type::Array(elem)) => {
            let converted: Vec<Value> = items.iter().cloned().map(|v| convert_value(v, elem)).collect();
            Value::Array((**elem).clone(), Rc::new(converted))
        }
        (other, _) => other,
    }
}

fn prepare_call_args(sig: &Signature, mut args: Vec<Value>, passthrough: bool) -> Vec<Value> {
    if !sig.is_varargs {
        return args;
    }
    let fixed = sig.params.len() - 1;
    let elem_ty = sig.params.last().and_then(Type::array_element).cloned().unwrap_or(Type::Void);
    let surplus: Vec<Value> = if fixed <= args.len() { args.split_off(fixed) } else { Vec::new() };
    let arr = if passthrough && surplus.len() == 1 {
        surplus.into_iter().next().unwrap()
    } else {
        let converted: Vec<Value> = surplus
            .into_iter()
            .map(|v| if v.type_of().equals(&elem_ty) { v } else { convert_value(v, &elem_ty) })
            .collect();
        Value::Array(elem_ty, Rc::new(converted))
    };
    args.push(arr);
    args
}

fn invoke(func: &Rc<FunctionValue>, args: Vec<Value>, loc: SourceLocation, ctx: &mut EvalContext) -> Value {
    match &**func {
        FunctionValue::Host { call, .. } => call(&args),
        FunctionValue::User { params, body, captured, .. } => {
            let defining = captured.clone().unwrap_or_else(Frame::new_root);
            if defining.borrow().depth + 1 > MAX_STACK_DEPTH {
                ctx.diags.push(DiagnosticKind::RuntimeStackOverflow, loc);
                return Value::Void;
            }
            let call_frame = Frame::child_of(&defining);
            for (param, arg) in params.iter().zip(args) {
                let coerced = if arg.type_of().equals(&param.ty) { arg } else { convert_value(arg, &param.ty) };
                declare_var(&call_frame, &param.name, coerced);
            }
            execute_block(&call_frame, body, ctx);
            frame_final_value(&call_frame)
        }
    }
}

struct ZeroRng;

impl RngCore for ZeroRng {
    fn next_u32(&mut self) -> u32 {
        0
    }
    fn next_u64(&mut self) -> u64 {
        0
    }
    fn fill_bytes(&mut self, dest: &mut [u8]) {
        dest.fill(0);
    }
    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        dest.fill(0);
        Ok(())
    }
}

struct NoCallbackLoader;

impl ModuleLoader for NoCallbackLoader {
    fn resolve_and_load(
        &mut self,
        _raw_path: &str,
        _importing_file: Option<&Path>,
        _frame: &FrameHandle,
        diags: &mut Diagnostics,
        location: SourceLocation,
    ) {
        diags.push(DiagnosticKind::ModuleNotFound("use is unavailable inside a host callback".into()), location);
    }
}

/// Invokes a function value from outside any running program's own
/// `EvalContext` — the shape a `FunctionValue::Host` closure needs to call
/// back into user code (map/filter/each/reduce) without the registry
/// seeing interpreter internals like `Frame` or `EvalContext` itself.
/// Diagnostics raised while forcing the callback have nowhere to surface,
/// since `Host::call`'s signature is `Fn(&[Value]) -> Value`; they are
/// swallowed here rather than threaded through the builtin's own return.
pub fn invoke_pure(func: &Rc<FunctionValue>, args: Vec<Value>) -> Value {
    let mut diags = Diagnostics::new();
    let mut loader = NoCallbackLoader;
    let mut rng = ZeroRng;
    let mut ctx = EvalContext { diags: &mut diags, loader: &mut loader, rng: &mut rng, current_file: None };
    invoke(func, args, SourceLocation::new(0, 0), &mut ctx)
}

pub fn call_function(resolution: &Resolution, mut args: Vec<Value>, loc: SourceLocation, ctx: &mut EvalContext) -> Value {
    let sig = resolution.function.signature().clone();
    let fixed = if sig.is_varargs { sig.params.len().saturating_sub(1) } else { sig.params.len() };
    for i in 0..fixed.min(args.len()) {
        if resolution.needs_conversion.get(i).copied().unwrap_or(false) {
            args[i] = convert_value(args[i].clone(), &sig.params[i]);
        }
    }
    let final_args = prepare_call_args(&sig, args, resolution.varargs_passthrough);
    invoke(&resolution.function, final_args, loc, ctx)
}

fn frame_final_value(frame: &FrameHandle) -> Value {
    let f = frame.borrow();
    if let Some(v) = &f.pending_return {
        return v.clone();
    }
    match f.implicit_values.len() {
        0 => Value::Void,
        1 => f.implicit_values[0].clone(),
        _ => {
            let first_ty = f.implicit_values[0].type_of();
            if f.implicit_values.iter().all(|v| v.type_of() == first_ty) {
                Value::Array(first_ty, Rc::new(f.implicit_values.clone()))
            } else {
                Value::Array(Type::Void, Rc::new(f.implicit_values.clone()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::SourceLocation;
    use crate::lexer::tokenize;
    use crate::parser::parse;
    use pretty_assertions::assert_eq;
    use rand::rngs::mock::StepRng;

    struct NullLoader;
    impl ModuleLoader for NullLoader {
        fn resolve_and_load(
            &mut self,
            _raw_path: &str,
            _importing_file: Option<&Path>,
            _frame: &FrameHandle,
            diags: &mut Diagnostics,
            location: SourceLocation,
        ) {
            diags.push(DiagnosticKind::ModuleNotFound("not wired in this test".into()), location);
        }
    }

    fn run(src: &str) -> (FrameHandle, Diagnostics) {
        let mut diags = Diagnostics::new();
        let tokens = tokenize(src, &mut diags);
        let program = parse(tokens, &mut diags);
        let frame = Frame::new_root();
        let mut loader = NullLoader;
        let mut rng = StepRng::new(0, 1);
        let mut ctx = EvalContext { diags: &mut diags, loader: &mut loader, rng: &mut rng, current_file: None };
        execute(&frame, &program, &mut ctx);
        (frame, diags)
    }

    #[test]
    fn arithmetic_widens_to_double() {
        let (frame, diags) = run("Double x = 3 + 4 * 2;");
        assert!(diags.is_empty());
        assert!(matches!(crate::context::lookup_var(&frame, "x"), Some(Value::Double(v)) if v == 11.0));
    }

    #[test]
    fn division_by_zero_reports_and_continues() {
        let (frame, diags) = run("Int x = 1 / 0; Int y = 2;");
        assert_eq!(diags.len(), 1);
        assert!(matches!(crate::context::lookup_var(&frame, "y"), Some(Value::Int(2))));
    }

    #[test]
    fn closure_snapshot_freezes_captured_value() {
        let (frame, diags) = run(
            "Int x = 1; Function f = fn => x; x = 2;",
        );
        assert!(diags.is_empty());
        let f = crate::context::lookup_var(&frame, "f").unwrap();
        match f {
            Value::Function(func) => {
                let mut diags2 = Diagnostics::new();
                let mut loader = NullLoader;
                let mut rng = StepRng::new(0, 1);
                let mut ctx = EvalContext { diags: &mut diags2, loader: &mut loader, rng: &mut rng, current_file: None };
                let result = invoke(&func, vec![], SourceLocation::new(1, 1), &mut ctx);
                assert!(matches!(result, Value::Int(1)));
            }
            other => panic!("expected a function value, got {:?}", other),
        }
    }

    #[test]
    fn negative_wrap_index_reads_last_element() {
        let (frame, diags) = run("Ints xs = [1, 2, 3]; Int last = xs@-1;");
        assert!(diags.is_empty());
        assert!(matches!(crate::context::lookup_var(&frame, "last"), Some(Value::Int(3))));
    }

    #[test]
    fn redeclaring_a_name_reports_already_declared() {
        let (_frame, diags) = run("Int x = 1; Int x = 2;");
        assert_eq!(diags.len(), 1);
    }

    #[test]
    fn invalid_tempo_is_reported_but_body_still_runs() {
        let (frame, diags) = run("tempo -5 { Int ran = 1; }");
        assert_eq!(diags.len(), 1);
        assert!(matches!(crate::context::lookup_var(&frame, "ran"), Some(Value::Int(1))));
    }

    #[test]
    fn calling_a_variable_bound_closure_by_name_invokes_it() {
        let (frame, diags) = run("Int x = 10; Function f = fn Int n => n + x; x = 999; Int result = f(5);");
        assert!(diags.is_empty());
        assert!(matches!(crate::context::lookup_var(&frame, "result"), Some(Value::Int(15))));
    }
}
