//! # Flow
//!
//! A statically-typed, interpreted language for algorithmic music
//! composition.
//!
//! ## Pipeline
//!
//! ```text
//! source → Lexer → Parser → Interpreter → note streams → Renderer → audio
//! ```
//!
//! 1. **Lexer** ([`lexer`]) - tokenizes source into a located token stream
//! 2. **Parser** ([`parser`]) - recursive-descent parser, including the
//!    note-stream sub-grammar in [`parser::notestream`]
//! 3. **Interpreter** ([`interpreter`]) - tree-walking evaluator with
//!    overload resolution ([`overload`]) over a scope chain ([`context`])
//! 4. **Note-stream compiler** ([`notestream_compiler`]) - resolves musical
//!    context ([`types`], [`value`]) into concrete notes
//! 5. **Renderer** ([`render`]) - note streams plus a [`synth::Synth`] into
//!    sample buffers, written out via [`wav`] or played through an
//!    [`audio_backend::AudioBackend`]
//!
//! [`engine::Engine`] owns one run end to end: the stdlib registry
//! ([`builtins`]), the module loader ([`modules`]), the seeded PRNG, and the
//! diagnostics accumulator ([`diagnostics`]) every stage reports into instead
//! of aborting.

pub mod ast;
pub mod audio_backend;
pub mod builtins;
pub mod context;
pub mod diagnostics;
pub mod engine;
pub mod interpreter;
pub mod lexer;
pub mod modules;
pub mod notestream_compiler;
pub mod overload;
pub mod parser;
pub mod render;
pub mod synth;
pub mod types;
pub mod value;
pub mod wav;

pub use diagnostics::{Diagnostic, DiagnosticKind, Diagnostics, SourceLocation};
pub use engine::Engine;
