//! # Overload resolution
//!
//! Scores every visible overload for a call against the argument types
//! present and picks the unique best match. This is the piece the
//! interpreter consults for every call, including bare-identifier probes
//! that might be a zero-arg call instead of a variable read.

use std::rc::Rc;

use crate::context::{lookup_overloads, FrameHandle, FunctionValue};
use crate::diagnostics::{Diagnostics, DiagnosticKind, SourceLocation};
use crate::types::Type;

const EXACT_SCORE: i64 = 1000;
const COMPATIBLE_SCORE: i64 = 500;
const CONVERTIBLE_SCORE: i64 = 100;

#[derive(Debug, Clone)]
pub struct Resolution {
    pub function: Rc<FunctionValue>,
    /// Per fixed parameter, whether the argument needs a convert-to-target
    /// coercion before the call (exact/compatible matches need none).
    pub needs_conversion: Vec<bool>,
    /// True when the single trailing argument was an already-built array
    /// of the varargs element type and should be passed through unwrapped
    /// rather than re-collected.
    pub varargs_passthrough: bool,
}

fn per_argument_score(arg: &Type, param: &Type) -> Option<i64> {
    if arg.equals(param) {
        Some(EXACT_SCORE)
    } else if arg.is_compatible_with(param) {
        Some(COMPATIBLE_SCORE)
    } else if arg.can_convert_to(param) {
        Some(CONVERTIBLE_SCORE)
    } else {
        None
    }
}

fn aggregate_specificity(sig_params: &[Type]) -> i32 {
    sig_params.iter().map(Type::specificity).sum()
}

/// Scores one candidate against `arg_types`. Returns `None` if the
/// candidate can't accept this argument list at all.
fn score_candidate(func: &FunctionValue, arg_types: &[Type]) -> Option<(i64, i32, bool)> {
    let sig = func.signature();
    let fixed = if sig.is_varargs { sig.params.len().saturating_sub(1) } else { sig.params.len() };

    if sig.is_varargs {
        if arg_types.len() < fixed {
            return None;
        }
    } else if arg_types.len() != sig.params.len() {
        return None;
    }

    let mut total = 0i64;
    for i in 0..fixed {
        total += per_argument_score(&arg_types[i], &sig.params[i])?;
    }

    let mut varargs_passthrough = false;
    if sig.is_varargs {
        let elem_ty = sig.params.last().and_then(Type::array_element).cloned().unwrap_or(Type::Void);
        let surplus = &arg_types[fixed..];

        if surplus.len() == 1 && surplus[0].is_array() {
            let surplus_elem = surplus[0].array_element().cloned().unwrap_or(Type::Void);
            if surplus_elem == elem_ty || surplus_elem == Type::Void || elem_ty == Type::Void {
                varargs_passthrough = true;
                total += EXACT_SCORE;
            }
        }
        if !varargs_passthrough {
            for arg in surplus {
                total += per_argument_score(arg, &elem_ty)?;
            }
        }
    }

    Some((total, aggregate_specificity(&sig.params), varargs_passthrough))
}

fn resolve_candidates(
    candidates: &[Rc<FunctionValue>],
    arg_types: &[Type],
) -> Vec<(Rc<FunctionValue>, i64, i32, bool)> {
    candidates
        .iter()
        .filter_map(|c| score_candidate(c, arg_types).map(|(score, spec, pass)| (Rc::clone(c), score, spec, pass)))
        .collect()
}

fn pick_best(scored: Vec<(Rc<FunctionValue>, i64, i32, bool)>) -> Result<(Rc<FunctionValue>, bool), bool> {
    let max_score = match scored.iter().map(|(_, s, _, _)| *s).max() {
        Some(s) => s,
        None => return Err(false),
    };
    let mut top: Vec<_> = scored.into_iter().filter(|(_, s, _, _)| *s == max_score).collect();
    if top.len() == 1 {
        let (func, _, _, pass) = top.remove(0);
        return Ok((func, pass));
    }
    let max_specificity = top.iter().map(|(_, _, spec, _)| *spec).max().unwrap();
    let mut at_max_specificity: Vec<_> = top.into_iter().filter(|(_, _, spec, _)| *spec == max_specificity).collect();
    if at_max_specificity.len() == 1 {
        let (func, _, _, pass) = at_max_specificity.remove(0);
        Ok((func, pass))
    } else {
        Err(true)
    }
}

fn needs_conversion_flags(sig_params: &[Type], arg_types: &[Type], fixed: usize) -> Vec<bool> {
    (0..fixed.min(arg_types.len())).map(|i| !arg_types[i].equals(&sig_params[i]) && !arg_types[i].is_compatible_with(&sig_params[i])).collect()
}

/// Full resolution with diagnostics: "not found" if nothing is registered
/// under `name`, "no matching overload" if every candidate rejects the
/// argument list, "ambiguous overload" on an unresolved tie.
pub fn resolve(
    frame: &FrameHandle,
    name: &str,
    arg_types: &[Type],
    diags: &mut Diagnostics,
    location: SourceLocation,
) -> Option<Resolution> {
    let candidates = lookup_overloads(frame, name);
    if candidates.is_empty() {
        diags.push(DiagnosticKind::ResolutionNotFound(name.to_string()), location);
        return None;
    }
    let scored = resolve_candidates(&candidates, arg_types);
    match pick_best(scored) {
        Ok((function, varargs_passthrough)) => {
            let fixed = if function.signature().is_varargs {
                function.signature().params.len().saturating_sub(1)
            } else {
                function.signature().params.len()
            };
            let needs_conversion = needs_conversion_flags(&function.signature().params, arg_types, fixed);
            Some(Resolution { function, needs_conversion, varargs_passthrough })
        }
        Err(true) => {
            diags.push(DiagnosticKind::ResolutionAmbiguous(name.to_string()), location);
            None
        }
        Err(false) => {
            diags.push(DiagnosticKind::ResolutionNoOverload(name.to_string()), location);
            None
        }
    }
}

/// Same scoring, no diagnostics — used where the interpreter probes a
/// name speculatively (e.g. a bare identifier that might be a zero-arg
/// call rather than a variable read).
pub fn try_resolve(frame: &FrameHandle, name: &str, arg_types: &[Type]) -> Option<Resolution> {
    let candidates = lookup_overloads(frame, name);
    if candidates.is_empty() {
        return None;
    }
    let scored = resolve_candidates(&candidates, arg_types);
    let (function, varargs_passthrough) = pick_best(scored).ok()?;
    let fixed = if function.signature().is_varargs {
        function.signature().params.len().saturating_sub(1)
    } else {
        function.signature().params.len()
    };
    let needs_conversion = needs_conversion_flags(&function.signature().params, arg_types, fixed);
    Some(Resolution { function, needs_conversion, varargs_passthrough })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{declare_overload, Frame};
    use crate::types::Signature;

    fn host_fn(name: &str, params: Vec<Type>) -> Rc<FunctionValue> {
        Rc::new(FunctionValue::Host {
            signature: Signature::new(name, params, false),
            call: Rc::new(|_args| crate::value::Value::Void),
        })
    }

    #[test]
    fn exact_match_beats_convertible_match() {
        let root = Frame::new_root();
        declare_overload(&root, "str".into(), host_fn("str", vec![Type::Int]));
        declare_overload(&root, "str".into(), host_fn("str", vec![Type::Double]));

        let picked = resolve(&root, "str", &[Type::Int], &mut Diagnostics::new(), SourceLocation::new(1, 1)).unwrap();
        assert_eq!(picked.function.signature().params, vec![Type::Int]);

        let picked = resolve(&root, "str", &[Type::Double], &mut Diagnostics::new(), SourceLocation::new(1, 1)).unwrap();
        assert_eq!(picked.function.signature().params, vec![Type::Double]);
    }

    #[test]
    fn unknown_name_reports_not_found() {
        let root = Frame::new_root();
        let mut diags = Diagnostics::new();
        assert!(resolve(&root, "ghost", &[], &mut diags, SourceLocation::new(1, 1)).is_none());
        assert_eq!(diags.len(), 1);
    }

    #[test]
    fn specificity_breaks_ties_between_convertible_candidates() {
        let root = Frame::new_root();
        declare_overload(&root, "f".into(), host_fn("f", vec![Type::Number]));
        declare_overload(&root, "f".into(), host_fn("f", vec![Type::Double]));
        let mut diags = Diagnostics::new();
        // An Int argument converts to both Number and Double at the same
        // per-argument score; Double's strictly higher specificity breaks
        // the tie instead of reporting ambiguity.
        let resolved = resolve(&root, "f", &[Type::Int], &mut diags, SourceLocation::new(1, 1));
        assert_eq!(resolved.unwrap().function.signature().params, vec![Type::Double]);
        assert!(diags.is_empty());
    }

    #[test]
    fn genuine_score_and_specificity_tie_is_ambiguous() {
        let root = Frame::new_root();
        declare_overload(&root, "g".into(), host_fn("g", vec![Type::Int, Type::Double]));
        declare_overload(&root, "g".into(), host_fn("g", vec![Type::Double, Type::Int]));
        let mut diags = Diagnostics::new();
        let resolved = resolve(&root, "g", &[Type::Int, Type::Int], &mut diags, SourceLocation::new(1, 1));
        assert!(resolved.is_none());
        assert_eq!(diags.len(), 1);
    }

    #[test]
    fn varargs_array_passthrough_is_not_rewrapped() {
        let root = Frame::new_root();
        declare_overload(
            &root,
            "list".into(),
            host_fn("list", vec![Type::Array(Box::new(Type::Void))]),
        );
        let arg = Type::Array(Box::new(Type::Int));
        let resolved = try_resolve(&root, "list", std::slice::from_ref(&arg)).unwrap();
        assert!(resolved.varargs_passthrough);
    }
}
