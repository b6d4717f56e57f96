//! # Stack frames & musical-context snapshots
//!
//! A frame owns a variable map, an overload table, and an optional musical
//! context snapshot, and chains to its parent by reference. A proper
//! parent-chained stack the interpreter pushes and pops around every
//! block, rather than a single flat validation pass.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::{Bar, Param, Stmt};
use crate::types::Signature;
use crate::value::{Value, TimeSignatureValue};

/// Frames guard against unbounded recursion with a floor of 1000 deep.
pub const MAX_STACK_DEPTH: usize = 2000;

pub type FrameHandle = Rc<RefCell<Frame>>;

#[derive(Debug, Clone, Default)]
pub struct MusicalContextSnapshot {
    pub time_signature: Option<TimeSignatureValue>,
    pub tempo: Option<f64>,
    pub swing: Option<f64>,
    pub key: Option<String>,
}

/// Either a user declaration (with, for closures, the frame captured at
/// creation time) or a host-provided callable. `signature` drives overload
/// resolution in `overload.rs`; host functions get a callback into the
/// collection builtins without exposing interpreter internals to them,
/// per the "Higher-order calls via host" design note.
pub enum FunctionValue {
    User {
        signature: Signature,
        params: Vec<Param>,
        body: Rc<Vec<Stmt>>,
        captured: Option<FrameHandle>,
        is_internal: bool,
    },
    Host {
        signature: Signature,
        call: Rc<dyn Fn(&[Value]) -> Value>,
    },
}

impl FunctionValue {
    pub fn signature(&self) -> &Signature {
        match self {
            FunctionValue::User { signature, .. } => signature,
            FunctionValue::Host { signature, .. } => signature,
        }
    }
}

impl std::fmt::Debug for FunctionValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FunctionValue::User { signature, is_internal, .. } => f
                .debug_struct("FunctionValue::User")
                .field("signature", signature)
                .field("is_internal", is_internal)
                .finish(),
            FunctionValue::Host { signature, .. } => {
                f.debug_struct("FunctionValue::Host").field("signature", signature).finish()
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct Frame {
    pub variables: HashMap<String, Value>,
    pub overloads: HashMap<String, Vec<Rc<FunctionValue>>>,
    pub musical_context: Option<MusicalContextSnapshot>,
    pub parent: Option<FrameHandle>,
    pub depth: usize,
    pub pending_return: Option<Value>,
    /// Expression-statement values accumulated for implicit return.
    pub implicit_values: Vec<Value>,
    /// For a variable declared directly from a note-stream literal, the raw
    /// bars and the musical context they were compiled against — kept
    /// alongside the compiled `Sequence` so a section built from this frame
    /// can recompile a `??`-bearing sequence on a later repeat instead of
    /// only ever replaying its first compile.
    pub note_sources: HashMap<String, (Rc<Vec<Bar>>, ResolvedContext)>,
}

impl Frame {
    pub fn new_root() -> FrameHandle {
        Rc::new(RefCell::new(Frame {
            variables: HashMap::new(),
            overloads: HashMap::new(),
            musical_context: None,
            parent: None,
            depth: 0,
            pending_return: None,
            implicit_values: Vec::new(),
            note_sources: HashMap::new(),
        }))
    }

    pub fn child_of(parent: &FrameHandle) -> FrameHandle {
        let depth = parent.borrow().depth + 1;
        Rc::new(RefCell::new(Frame {
            variables: HashMap::new(),
            overloads: HashMap::new(),
            musical_context: None,
            parent: Some(Rc::clone(parent)),
            depth,
            pending_return: None,
            implicit_values: Vec::new(),
            note_sources: HashMap::new(),
        }))
    }
}

/// Declares a fresh variable in `frame`. Fails (returns `false`, no
/// mutation) if the name already resolves to a variable or function
/// overload anywhere in the reachable parent chain.
pub fn declare_var(frame: &FrameHandle, name: &str, value: Value) -> bool {
    if name_is_taken(frame, name) {
        return false;
    }
    frame.borrow_mut().variables.insert(name.to_string(), value);
    true
}

fn name_is_taken(frame: &FrameHandle, name: &str) -> bool {
    let mut cursor = Some(Rc::clone(frame));
    while let Some(f) = cursor {
        let f_ref = f.borrow();
        if f_ref.variables.contains_key(name) || f_ref.overloads.contains_key(name) {
            return true;
        }
        cursor = f_ref.parent.clone();
        drop(f_ref);
    }
    false
}

/// Looks up a variable by walking the parent chain.
pub fn lookup_var(frame: &FrameHandle, name: &str) -> Option<Value> {
    let mut cursor = Some(Rc::clone(frame));
    while let Some(f) = cursor {
        let f_ref = f.borrow();
        if let Some(v) = f_ref.variables.get(name) {
            return Some(v.clone());
        }
        cursor = f_ref.parent.clone();
    }
    None
}

/// Walks parents until `name` is found, then updates it in place. Returns
/// `false` (no-op) if the name is not found anywhere in the chain.
pub fn assign_var(frame: &FrameHandle, name: &str, value: Value) -> bool {
    let mut cursor = Some(Rc::clone(frame));
    while let Some(f) = cursor {
        let mut f_mut = f.borrow_mut();
        if f_mut.variables.contains_key(name) {
            f_mut.variables.insert(name.to_string(), value);
            return true;
        }
        let parent = f_mut.parent.clone();
        drop(f_mut);
        cursor = parent;
    }
    false
}

/// Collects every overload visible for `name` up the frame chain — the
/// resolver scores across all of them together, not just the nearest
/// frame that declares one.
pub fn lookup_overloads(frame: &FrameHandle, name: &str) -> Vec<Rc<FunctionValue>> {
    let mut found = Vec::new();
    let mut cursor = Some(Rc::clone(frame));
    while let Some(f) = cursor {
        let f_ref = f.borrow();
        if let Some(list) = f_ref.overloads.get(name) {
            found.extend(list.iter().cloned());
        }
        cursor = f_ref.parent.clone();
    }
    found
}

/// Registers a function overload in `frame`. An existing overload with an
/// identical signature is replaced in place (REPL redefinition semantics).
pub fn declare_overload(frame: &FrameHandle, name: String, func: Rc<FunctionValue>) {
    let mut f_mut = frame.borrow_mut();
    let list = f_mut.overloads.entry(name).or_default();
    if let Some(slot) = list.iter_mut().find(|existing| existing.signature().signature_equals(func.signature())) {
        *slot = func;
    } else {
        list.push(func);
    }
}

/// Effective musical context: walk the frame chain top-to-bottom and
/// coalesce per-field, first non-absent value wins, then fill defaults.
pub fn effective_musical_context(frame: &FrameHandle) -> ResolvedContext {
    let mut time_signature = None;
    let mut tempo = None;
    let mut swing = None;
    let mut key = None;

    let mut cursor = Some(Rc::clone(frame));
    while let Some(f) = cursor {
        let f_ref = f.borrow();
        if let Some(ctx) = &f_ref.musical_context {
            if time_signature.is_none() {
                time_signature = ctx.time_signature;
            }
            if tempo.is_none() {
                tempo = ctx.tempo;
            }
            if swing.is_none() {
                swing = ctx.swing;
            }
            if key.is_none() {
                key = ctx.key.clone();
            }
        }
        cursor = f_ref.parent.clone();
    }

    ResolvedContext {
        time_signature: time_signature.unwrap_or_default(),
        tempo: tempo.unwrap_or(120.0),
        swing: swing.unwrap_or(0.5),
        key,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedContext {
    pub time_signature: TimeSignatureValue,
    pub tempo: f64,
    pub swing: f64,
    pub key: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assignment_walks_to_declaring_parent() {
        let root = Frame::new_root();
        declare_var(&root, "x", Value::Int(1));
        let child = Frame::child_of(&root);
        assert!(assign_var(&child, "x", Value::Int(2)));
        assert!(matches!(lookup_var(&root, "x"), Some(Value::Int(2))));
    }

    #[test]
    fn assignment_to_unknown_name_fails() {
        let root = Frame::new_root();
        assert!(!assign_var(&root, "nope", Value::Int(1)));
    }

    #[test]
    fn declaration_collision_is_rejected() {
        let root = Frame::new_root();
        assert!(declare_var(&root, "x", Value::Int(1)));
        assert!(!declare_var(&root, "x", Value::Int(2)));
    }

    #[test]
    fn context_resolution_falls_back_to_documented_defaults() {
        let root = Frame::new_root();
        let resolved = effective_musical_context(&root);
        assert_eq!(resolved.time_signature, TimeSignatureValue::default());
        assert_eq!(resolved.tempo, 120.0);
        assert_eq!(resolved.swing, 0.5);
        assert_eq!(resolved.key, None);
    }

    #[test]
    fn context_resolution_prefers_nearest_frame() {
        let root = Frame::new_root();
        root.borrow_mut().musical_context = Some(MusicalContextSnapshot {
            tempo: Some(90.0),
            ..Default::default()
        });
        let child = Frame::child_of(&root);
        child.borrow_mut().musical_context = Some(MusicalContextSnapshot {
            swing: Some(0.66),
            ..Default::default()
        });
        let resolved = effective_musical_context(&child);
        assert_eq!(resolved.tempo, 90.0);
        assert_eq!(resolved.swing, 0.66);
    }
}
