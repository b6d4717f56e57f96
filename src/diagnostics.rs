//! # Diagnostics
//!
//! Every error an engine run can produce funnels through this module instead
//! of `Result`'s early-return: a producing operation reports a
//! [`Diagnostic`] and returns a sentinel `Value::Void` so the program keeps
//! running. An engine run is "successful" iff its [`Diagnostics`]
//! accumulator is empty at the end.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// A position in source text. `file` is `None` for the entry program and
/// `Some` once a diagnostic originates inside a module pulled in by `use`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
    pub file: Option<PathBuf>,
}

impl SourceLocation {
    pub fn new(line: usize, column: usize) -> Self {
        Self {
            line,
            column,
            file: None,
        }
    }

    pub fn in_file(line: usize, column: usize, file: PathBuf) -> Self {
        Self {
            line,
            column,
            file: Some(file),
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.file {
            Some(path) => write!(f, "{}:{}:{}", path.display(), self.line, self.column),
            None => write!(f, "{}:{}", self.line, self.column),
        }
    }
}

/// Taxonomy of diagnostic kinds: lex, parse, type, resolution, runtime,
/// module, musical-context, and audio-export failures.
#[derive(Debug, Error, Clone, PartialEq, Serialize)]
pub enum DiagnosticKind {
    #[error("unexpected character: {0:?}")]
    LexUnexpectedChar(char),
    #[error("numeric literal overflow: {0}")]
    LexNumberOverflow(String),

    #[error("unexpected token: {0}")]
    ParseUnexpectedToken(String),
    #[error("missing 'end proc'")]
    ParseMissingEndProc,
    #[error("malformed musical literal: {0}")]
    ParseMalformedMusicalLiteral(String),

    #[error("cannot assign {from} to {to}")]
    TypeIncompatibleAssignment { from: String, to: String },
    #[error("cannot convert {from} to {to}")]
    TypeInconvertible { from: String, to: String },
    #[error("unknown member {0}")]
    TypeUnknownMember(String),

    #[error("not found: {0}")]
    ResolutionNotFound(String),
    #[error("no matching overload for {0}")]
    ResolutionNoOverload(String),
    #[error("ambiguous overload for {0}")]
    ResolutionAmbiguous(String),
    #[error("{0} is already declared in this scope")]
    ResolutionAlreadyDeclared(String),

    #[error("division by zero")]
    RuntimeDivisionByZero,
    #[error("index out of bounds: {0}")]
    RuntimeOutOfBounds(i64),
    #[error("stack overflow")]
    RuntimeStackOverflow,
    #[error("bad closure invocation: {0}")]
    RuntimeBadClosure(String),

    #[error("module not found: {0}")]
    ModuleNotFound(String),
    #[error("module cycle detected: {0}")]
    ModuleCycle(String),
    #[error("error loading module {path}: {message}")]
    ModuleNestedFailure { path: String, message: String },

    #[error("invalid tempo: {0}")]
    MusicalInvalidTempo(f64),
    #[error("invalid swing: {0}")]
    MusicalInvalidSwing(f64),
    #[error("invalid key: {0}")]
    MusicalInvalidKey(String),
    #[error("invalid time signature: {numerator}/{denominator}")]
    MusicalInvalidTimeSignature { numerator: u32, denominator: u32 },
    #[error("could not resolve {symbol} in key {key}")]
    MusicalUnresolvedSymbol { symbol: String, key: String },

    #[error("audio backend unavailable")]
    AudioBackendUnavailable,
    #[error("invalid bit depth: {0}")]
    AudioInvalidBitDepth(u16),
}

/// A single accumulated diagnostic.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub location: SourceLocation,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.location, self.kind)
    }
}

/// Per-engine accumulator. Never panics, never short-circuits a caller;
/// operations push into it and return their own sentinel value.
#[derive(Debug, Default, Clone)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, kind: DiagnosticKind, location: SourceLocation) {
        tracing::debug!(%location, %kind, "diagnostic");
        self.entries.push(Diagnostic { kind, location });
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// YAML rendering for hosts that want structured diagnostics instead of
    /// the `Display` text report (an editor integration, say). Diagnostics
    /// never contain non-UTF8 data, so this can't fail.
    pub fn to_yaml(&self) -> String {
        serde_yaml::to_string(&self.entries).unwrap_or_default()
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for d in &self.entries {
            writeln!(f, "{}", d)?;
        }
        Ok(())
    }
}
