//! # Runtime values
//!
//! The tagged (type, payload) pair. Every variant here is the payload
//! half; its type tag is recoverable via [`Value::type_of`] without a
//! separate `Type` field, distinguishing shape by match arm rather than
//! a redundant tag.
//!
//! Everything here is plain-clone immutable except the five named
//! mutable audio containers (`Buffer` samples, `Track.voices`,
//! `Voice.gain`/`pan`/`offset`, `OscillatorState.phase`), which are the
//! only variants wrapped in `Rc<RefCell<_>>`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Mutex;

use crate::ast::{Bar, DurationClass, Expr, PitchSpelling};
use crate::context::{FrameHandle, ResolvedContext};
use crate::types::Type;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Articulation {
    Staccato,
    Marcato,
    Other,
}

impl Articulation {
    pub fn multiplier(self) -> f64 {
        match self {
            Articulation::Staccato => 0.5,
            Articulation::Marcato => 0.8,
            Articulation::Other => 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MusicalNoteValue {
    pub pitch: Option<PitchSpelling>,
    pub duration: DurationClass,
    pub dotted: bool,
    pub is_rest: bool,
    pub articulation: Option<Articulation>,
    pub velocity: Option<f64>,
    pub tied: bool,
    pub cent_offset: Option<i64>,
}

impl MusicalNoteValue {
    /// Beats occupied in a bar whose time signature denominator is
    /// `denominator` (a quarter, in 4/4, is one beat; the same note in
    /// 8/8 is two eighths' worth).
    pub fn beats(&self, denominator: u32) -> f64 {
        let mut beats = self.duration.fraction() * denominator as f64;
        if self.dotted {
            beats *= 1.5;
        }
        beats
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSignatureValue {
    pub numerator: u32,
    pub denominator: u32,
}

impl Default for TimeSignatureValue {
    fn default() -> Self {
        Self { numerator: 4, denominator: 4 }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BarValue {
    pub notes: Vec<MusicalNoteValue>,
    pub time_signature: TimeSignatureValue,
}

pub type SequenceValue = Rc<Vec<BarValue>>;

#[derive(Debug, Clone, PartialEq)]
pub struct SectionValue {
    pub name: String,
    pub sequences: Rc<HashMap<String, SequenceValue>>,
    /// Raw bars and musical context for sequences declared directly from a
    /// note-stream literal, carried so a repeat-aware render can recompile
    /// a `??`-bearing sequence fresh on each repetition rather than only
    /// ever replaying the bars this section's own compile produced.
    /// Sequences built any other way (a transform, a function call) have
    /// no entry here and always replay their compiled bars.
    pub raw: Rc<HashMap<String, (Rc<Vec<Bar>>, ResolvedContext)>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SongEntry {
    pub section: String,
    pub repeat: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SongValue {
    pub entries: Vec<SongEntry>,
    pub sections: Rc<HashMap<String, SectionValue>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteValueData {
    pub class: DurationClass,
    pub dotted: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BufferData {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OscillatorStateData {
    pub phase: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvelopeData {
    pub attack_ms: f64,
    pub decay_ms: f64,
    pub sustain_level: f64,
    pub release_ms: f64,
}

#[derive(Debug, Clone)]
pub struct VoiceData {
    pub buffer: Rc<RefCell<BufferData>>,
    pub gain: f64,
    pub pan: f64,
    pub offset_beats: f64,
}

#[derive(Debug, Clone)]
pub struct TrackData {
    pub voices: Vec<Rc<RefCell<VoiceData>>>,
    pub gain: f64,
}

/// A deferred expression plus the frame it closes over: forced at most
/// once, guarded by a mutex so incidental concurrent forces (the host's
/// playback thread calling back in) agree on a single value.
pub struct Thunk {
    pub declared_type: Type,
    state: Mutex<ThunkState>,
}

enum ThunkState {
    Pending(Expr, FrameHandle),
    Done(Value),
}

impl Thunk {
    pub fn new(expr: Expr, frame: FrameHandle, declared_type: Type) -> Self {
        Self {
            declared_type,
            state: Mutex::new(ThunkState::Pending(expr, frame)),
        }
    }

    /// Returns the already-forced value, or the pending `(expr, frame)`
    /// to force — the caller (the interpreter, which alone knows how to
    /// evaluate an `Expr`) forces outside the lock and then stores the
    /// result with [`Thunk::resolve`].
    pub fn pending(&self) -> Option<(Expr, FrameHandle)> {
        match &*self.state.lock().unwrap() {
            ThunkState::Pending(expr, frame) => Some((expr.clone(), frame.clone())),
            ThunkState::Done(_) => None,
        }
    }

    pub fn forced(&self) -> Option<Value> {
        match &*self.state.lock().unwrap() {
            ThunkState::Done(v) => Some(v.clone()),
            ThunkState::Pending(..) => None,
        }
    }

    /// Idempotent: the first caller to arrive wins; later callers (even if
    /// they redundantly evaluated the expression under a race) get the
    /// already-stored value back instead of clobbering it.
    pub fn resolve(&self, value: Value) -> Value {
        let mut guard = self.state.lock().unwrap();
        if let ThunkState::Done(existing) = &*guard {
            return existing.clone();
        }
        *guard = ThunkState::Done(value.clone());
        value
    }
}

impl std::fmt::Debug for Thunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Thunk").field("declared_type", &self.declared_type).finish()
    }
}

#[derive(Debug, Clone)]
pub enum Value {
    Int(i64),
    Long(i64),
    Float(f32),
    Double(f64),
    Str(String),
    Bool(bool),
    Number(f64),
    Void,

    Note(PitchSpelling),
    Semitone(i64),
    Cent(f64),
    Millisecond(f64),
    Second(f64),
    Decibel(f64),
    Beat(f64),

    MusicalNote(Rc<MusicalNoteValue>),
    Bar(Rc<BarValue>),
    Sequence(SequenceValue),
    Chord(Rc<Vec<MusicalNoteValue>>),
    Section(Rc<SectionValue>),
    Song(Rc<SongValue>),
    TimeSignature(TimeSignatureValue),
    NoteValue(NoteValueData),

    Buffer(Rc<RefCell<BufferData>>),
    OscillatorState(Rc<RefCell<OscillatorStateData>>),
    Envelope(EnvelopeData),
    Voice(Rc<RefCell<VoiceData>>),
    Track(Rc<RefCell<TrackData>>),

    Array(Type, Rc<Vec<Value>>),
    Lazy(Rc<Thunk>),
    Function(Rc<crate::context::FunctionValue>),
}

impl Value {
    pub fn type_of(&self) -> Type {
        match self {
            Value::Int(_) => Type::Int,
            Value::Long(_) => Type::Long,
            Value::Float(_) => Type::Float,
            Value::Double(_) => Type::Double,
            Value::Str(_) => Type::String,
            Value::Bool(_) => Type::Bool,
            Value::Number(_) => Type::Number,
            Value::Void => Type::Void,
            Value::Note(_) => Type::Note,
            Value::Semitone(_) => Type::Semitone,
            Value::Cent(_) => Type::Cent,
            Value::Millisecond(_) => Type::Millisecond,
            Value::Second(_) => Type::Second,
            Value::Decibel(_) => Type::Decibel,
            Value::Beat(_) => Type::Beat,
            Value::MusicalNote(_) => Type::MusicalNote,
            Value::Bar(_) => Type::Bar,
            Value::Sequence(_) => Type::Sequence,
            Value::Chord(_) => Type::Chord,
            Value::Section(_) => Type::Section,
            Value::Song(_) => Type::Song,
            Value::TimeSignature(_) => Type::TimeSignature,
            Value::NoteValue(_) => Type::NoteValue,
            Value::Buffer(_) => Type::Buffer,
            Value::OscillatorState(_) => Type::OscillatorState,
            Value::Envelope(_) => Type::Envelope,
            Value::Voice(_) => Type::Voice,
            Value::Track(_) => Type::Track,
            Value::Array(elem, _) => Type::Array(Box::new(elem.clone())),
            Value::Lazy(thunk) => Type::Lazy(Box::new(thunk.declared_type.clone())),
            Value::Function(_) => Type::Function,
        }
    }

    pub fn void() -> Self {
        Value::Void
    }

    /// Negative-wrap indexing into an array, per invariant (ii).
    pub fn index_array(items: &[Value], index: i64) -> Option<Value> {
        let len = items.len() as i64;
        let resolved = if index < 0 { len + index } else { index };
        if resolved < 0 || resolved >= len {
            None
        } else {
            items.get(resolved as usize).cloned()
        }
    }
}
