//! # Abstract syntax tree
//!
//! Node variants for statements, expressions, and note-stream elements:
//! small `Copy` enums with inherent helper methods, wrapped by a handful
//! of struct node types that carry a `SourceLocation` for diagnostics.

use crate::diagnostics::SourceLocation;
use crate::types::Type;

pub type Program = Vec<Stmt>;

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub location: SourceLocation,
}

impl Stmt {
    pub fn new(kind: StmtKind, location: SourceLocation) -> Self {
        Self { kind, location }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: Type,
    pub is_varargs: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ContextKind {
    TimeSig { numerator: u32, denominator: u32 },
    Tempo(Expr),
    Swing(Expr),
    Key(String),
    Dynamics(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    ProcDecl {
        name: String,
        is_internal: bool,
        params: Vec<Param>,
        body: Vec<Stmt>,
    },
    VarDecl {
        ty: Type,
        name: String,
        init: Option<Expr>,
    },
    Assign {
        name: String,
        value: Expr,
    },
    Return(Option<Expr>),
    Use {
        path: String,
    },
    Context {
        kind: ContextKind,
        body: Vec<Stmt>,
    },
    Section {
        name: String,
        body: Vec<Stmt>,
    },
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub location: SourceLocation,
}

impl Expr {
    pub fn new(kind: ExprKind, location: SourceLocation) -> Self {
        Self { kind, location }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Lt,
    Gt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    IntLit(i64),
    LongLit(i64),
    FloatLit(f32),
    DoubleLit(f64),
    StringLit(String),
    BoolLit(bool),
    SemitoneLit(i64),
    CentLit(f64),
    MillisecondLit(f64),
    SecondLit(f64),
    DecibelLit(f64),
    NoteLit {
        letter: char,
        alteration: i8,
        octave: Option<i64>,
    },

    Identifier(String),

    /// A call written either as `(name args…)` or as a bare
    /// identifier-followed-by-argument-tokens form, for readability in
    /// musical code.
    Call {
        callee: String,
        args: Vec<Expr>,
    },

    /// `left -> right`, before reduction. The interpreter reduces this to
    /// a call of `right` with `left` spliced in as the first argument,
    /// falling back to a bare-call wrap if `right` is not already a call.
    Flow {
        left: Box<Expr>,
        right: Box<Expr>,
    },

    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },

    /// `target@index`.
    Index {
        target: Box<Expr>,
        index: Box<Expr>,
    },
    /// `target.name`.
    Member {
        target: Box<Expr>,
        name: String,
    },

    /// `fn params => body`, capturing nothing itself — the interpreter
    /// snapshots the enclosing frame's visible bindings when this node is
    /// evaluated.
    Lambda {
        params: Vec<Param>,
        body: Box<Expr>,
    },

    Lazy(Box<Expr>),

    ArrayLit(Vec<Expr>),

    NoteStream(Vec<Bar>),
}

/// A token run between two `|` markers in a note-stream expression.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Bar {
    pub elements: Vec<NoteStreamElement>,
}

/// One of the six fixed duration classes a note-stream element can carry
/// explicitly, or auto-fit when absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationClass {
    Whole,
    Half,
    Quarter,
    Eighth,
    Sixteenth,
    ThirtySecond,
}

impl DurationClass {
    /// Fraction of a whole note, before the dotted multiplier.
    pub fn fraction(self) -> f64 {
        match self {
            DurationClass::Whole => 1.0,
            DurationClass::Half => 1.0 / 2.0,
            DurationClass::Quarter => 1.0 / 4.0,
            DurationClass::Eighth => 1.0 / 8.0,
            DurationClass::Sixteenth => 1.0 / 16.0,
            DurationClass::ThirtySecond => 1.0 / 32.0,
        }
    }

    pub fn from_letter(c: char) -> Option<Self> {
        Some(match c {
            'w' => DurationClass::Whole,
            'h' => DurationClass::Half,
            'q' => DurationClass::Quarter,
            'e' => DurationClass::Eighth,
            's' => DurationClass::Sixteenth,
            't' => DurationClass::ThirtySecond,
            _ => return None,
        })
    }

    pub fn all() -> [DurationClass; 6] {
        [
            DurationClass::Whole,
            DurationClass::Half,
            DurationClass::Quarter,
            DurationClass::Eighth,
            DurationClass::Sixteenth,
            DurationClass::ThirtySecond,
        ]
    }
}

/// Shared duration/articulation suffix grammar for notes, rests, and chords:
/// optional duration-class letter, optional dotted flag, optional tie,
/// optional cent offset.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DurationSuffix {
    pub class: Option<DurationClass>,
    pub dotted: bool,
    pub tied: bool,
    pub cent_offset: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PitchSpelling {
    pub letter: char,
    pub alteration: i8,
    pub octave: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NoteStreamElement {
    Note {
        pitch: PitchSpelling,
        suffix: DurationSuffix,
    },
    Rest {
        suffix: DurationSuffix,
    },
    Chord {
        pitches: Vec<PitchSpelling>,
        suffix: DurationSuffix,
    },
    ChordSymbol {
        symbol: String,
        suffix: DurationSuffix,
    },
    RomanNumeral {
        numeral: String,
        suffix: DurationSuffix,
    },
    RandomChoice {
        /// `??` (double) re-rolls on every repetition of the bar; `?`
        /// (single) chooses once at compile time.
        reroll_each_repeat: bool,
        choices: Vec<(Box<NoteStreamElement>, Option<f64>)>,
    },
}

impl NoteStreamElement {
    pub fn explicit_suffix(&self) -> Option<&DurationSuffix> {
        match self {
            NoteStreamElement::Note { suffix, .. }
            | NoteStreamElement::Rest { suffix }
            | NoteStreamElement::Chord { suffix, .. }
            | NoteStreamElement::ChordSymbol { suffix, .. }
            | NoteStreamElement::RomanNumeral { suffix, .. } => Some(suffix),
            NoteStreamElement::RandomChoice { .. } => None,
        }
    }

    pub fn has_explicit_duration(&self) -> bool {
        self.explicit_suffix().is_some_and(|s| s.class.is_some())
    }
}
