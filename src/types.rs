//! # Type system
//!
//! Types are singleton descriptors over a closed set, represented as
//! plain `Copy` enums with small inherent methods rather than a trait
//! hierarchy. `Type` adds three explicit relations instead of
//! inheritance: [`Type::equals`], [`Type::is_compatible_with`],
//! [`Type::can_convert_to`].

use std::fmt;

/// The closed set of value categories this language supports.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    // Primitives
    Int,
    Long,
    Float,
    Double,
    String,
    Bool,
    Number,
    Void,

    // Musical scalars
    Note,
    Semitone,
    Cent,
    Millisecond,
    Second,
    Decibel,
    Beat,

    // Musical aggregates
    MusicalNote,
    Bar,
    Sequence,
    Chord,
    Section,
    Song,
    TimeSignature,
    NoteValue,

    // Audio aggregates
    Buffer,
    OscillatorState,
    Envelope,
    Voice,
    Track,

    // Parametric
    Array(Box<Type>),
    Lazy(Box<Type>),
    Function,

    // Abstract placeholder
    Buf,
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Array(inner) => write!(f, "{}s", inner),
            Type::Lazy(inner) => write!(f, "Lazy<{}>", inner),
            other => write!(f, "{:?}", other),
        }
    }
}

/// Rung on the numeric widening ladder; higher outranks lower for
/// conversion purposes. Non-numeric types have no rung. Exposed beyond
/// this module so the interpreter can pick a binary expression's result
/// type without re-deriving the same ladder.
pub fn numeric_rank(ty: &Type) -> Option<u8> {
    match ty {
        Type::Int => Some(0),
        Type::Long | Type::Float => Some(1),
        Type::Double => Some(2),
        Type::Number => Some(3),
        _ => None,
    }
}

impl Type {
    /// Integer specificity, used as an overload-resolution tie-break.
    /// More specific (narrower) types get a higher number; `Void` and the
    /// `Array<Void>` universal placeholder sit at the bottom.
    pub fn specificity(&self) -> i32 {
        match self {
            Type::Void => 0,
            Type::Array(inner) if **inner == Type::Void => 1,
            Type::Number => 2,
            Type::Double => 4,
            Type::Long | Type::Float => 5,
            Type::Int => 6,
            Type::Array(inner) => 10 + inner.specificity(),
            Type::Lazy(inner) => 10 + inner.specificity(),
            Type::Buf => 1,
            _ => 8,
        }
    }

    pub fn equals(&self, other: &Type) -> bool {
        self == other
    }

    /// Same effective category. Distinct from equality: e.g. any two
    /// array types are compatible with each other's "arrayness" is not
    /// implied — compatibility is element-wise for parametrics, exact
    /// otherwise, with the Void-array wildcard accepting either side.
    pub fn is_compatible_with(&self, other: &Type) -> bool {
        match (self, other) {
            (a, b) if a == b => true,
            (Type::Array(a), Type::Array(b)) => {
                **a == Type::Void || **b == Type::Void || a.is_compatible_with(b)
            }
            (Type::Lazy(a), Type::Lazy(b)) => {
                **a == Type::Void || **b == Type::Void || a.is_compatible_with(b)
            }
            _ => false,
        }
    }

    /// Explicit convertibility ladder: numeric widening, symmetric time
    /// units, and the empty-array-literal rule.
    pub fn can_convert_to(&self, target: &Type) -> bool {
        if self == target {
            return true;
        }
        if let (Some(from_rank), Some(to_rank)) = (numeric_rank(self), numeric_rank(target)) {
            return from_rank <= to_rank;
        }
        match (self, target) {
            (Type::Millisecond, Type::Second) | (Type::Second, Type::Millisecond) => true,
            (Type::Array(a), Type::Array(b)) => **a == Type::Void || a.can_convert_to(b),
            _ => false,
        }
    }

    pub fn default_value_type(&self) -> Type {
        self.clone()
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Type::Array(_))
    }

    pub fn array_element(&self) -> Option<&Type> {
        match self {
            Type::Array(inner) => Some(inner),
            _ => None,
        }
    }
}

/// A function signature: name, ordered parameter types, varargs flag.
/// Equality (used for overload replacement and ambiguity checks) compares
/// name, arity ignoring trailing varargs expansion, pairwise parameter
/// equality, and the varargs flag, with the Void-varargs wildcard that
/// lets `list(...)` accept any single-argument array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub name: String,
    pub params: Vec<Type>,
    pub is_varargs: bool,
}

impl Signature {
    pub fn new(name: impl Into<String>, params: Vec<Type>, is_varargs: bool) -> Self {
        Self {
            name: name.into(),
            params,
            is_varargs,
        }
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    pub fn signature_equals(&self, other: &Signature) -> bool {
        if self.name != other.name || self.is_varargs != other.is_varargs {
            return false;
        }
        if self.params.len() != other.params.len() {
            return false;
        }
        self.params
            .iter()
            .zip(other.params.iter())
            .all(|(a, b)| a == b || is_void_wildcard_pair(a, b))
    }
}

fn is_void_wildcard_pair(a: &Type, b: &Type) -> bool {
    matches!((a, b), (Type::Array(x), Type::Array(y)) if **x == Type::Void || **y == Type::Void)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_ladder_reflexivity() {
        for t in [Type::Int, Type::Long, Type::Float, Type::Double, Type::Number] {
            assert!(t.can_convert_to(&t), "{:?} should convert to itself", t);
        }
    }

    #[test]
    fn numeric_ladder_widens_one_direction() {
        assert!(Type::Int.can_convert_to(&Type::Long));
        assert!(Type::Int.can_convert_to(&Type::Double));
        assert!(Type::Long.can_convert_to(&Type::Number));
        assert!(!Type::Double.can_convert_to(&Type::Int));
        assert!(!Type::Number.can_convert_to(&Type::Double));
    }

    #[test]
    fn time_units_are_symmetric() {
        assert!(Type::Millisecond.can_convert_to(&Type::Second));
        assert!(Type::Second.can_convert_to(&Type::Millisecond));
    }

    #[test]
    fn void_array_matches_any_element() {
        let void_arr = Type::Array(Box::new(Type::Void));
        let int_arr = Type::Array(Box::new(Type::Int));
        assert!(void_arr.is_compatible_with(&int_arr));
        assert!(int_arr.is_compatible_with(&void_arr));
    }

    #[test]
    fn signature_equality_ignores_void_varargs_wildcard() {
        let a = Signature::new("list", vec![Type::Array(Box::new(Type::Void))], true);
        let b = Signature::new("list", vec![Type::Array(Box::new(Type::Int))], true);
        assert!(a.signature_equals(&b));
    }

    #[test]
    fn specificity_orders_narrow_over_wide() {
        assert!(Type::Int.specificity() > Type::Double.specificity());
        assert!(Type::Double.specificity() > Type::Number.specificity());
        assert!(Type::Number.specificity() > Type::Void.specificity());
    }
}
