//! Musical transforms over `MusicalNote`/`Sequence` values: transpose,
//! reverse, augment, diminish. The fourth stdlib category alongside
//! strings/arithmetic/collections, operating on the note-stream compiler's
//! own output types rather than raw numbers or strings.

use crate::ast::DurationClass;
use crate::context::FrameHandle;
use crate::types::Type;
use crate::value::{BarValue, MusicalNoteValue, Value};

use super::host;

fn transpose_note(note: &MusicalNoteValue, semitones: i64) -> MusicalNoteValue {
    let mut out = note.clone();
    if let Some(pitch) = &mut out.pitch {
        pitch.alteration = pitch.alteration.saturating_add(semitones as i8);
    }
    out
}

fn step_duration(class: DurationClass, up: bool) -> DurationClass {
    use DurationClass::*;
    match (class, up) {
        (Whole, _) => Whole,
        (Half, true) => Whole,
        (Half, false) => Quarter,
        (Quarter, true) => Half,
        (Quarter, false) => Eighth,
        (Eighth, true) => Quarter,
        (Eighth, false) => Sixteenth,
        (Sixteenth, true) => Eighth,
        (Sixteenth, false) => ThirtySecond,
        (ThirtySecond, true) => Sixteenth,
        (ThirtySecond, false) => ThirtySecond,
    }
}

fn scale_durations(bars: &[BarValue], up: bool) -> Vec<BarValue> {
    bars.iter()
        .map(|bar| BarValue {
            notes: bar
                .notes
                .iter()
                .map(|note| {
                    let mut out = note.clone();
                    out.duration = step_duration(note.duration, up);
                    out
                })
                .collect(),
            time_signature: bar.time_signature,
        })
        .collect()
}

pub fn register(frame: &FrameHandle) {
    host(frame, "transpose", vec![Type::MusicalNote, Type::Semitone], false, |args| {
        let (Value::MusicalNote(note), Value::Semitone(n)) = (&args[0], &args[1]) else { return Value::Void };
        Value::MusicalNote(std::rc::Rc::new(transpose_note(note, *n)))
    });

    host(frame, "transpose", vec![Type::Sequence, Type::Semitone], false, |args| {
        let (Value::Sequence(bars), Value::Semitone(n)) = (&args[0], &args[1]) else { return Value::Void };
        let transposed: Vec<BarValue> = bars
            .iter()
            .map(|bar| BarValue { notes: bar.notes.iter().map(|note| transpose_note(note, *n)).collect(), time_signature: bar.time_signature })
            .collect();
        Value::Sequence(std::rc::Rc::new(transposed))
    });

    host(frame, "reverse", vec![Type::Sequence], false, |args| {
        let Value::Sequence(bars) = &args[0] else { return Value::Void };
        let reversed: Vec<BarValue> = bars
            .iter()
            .rev()
            .map(|bar| BarValue { notes: bar.notes.iter().rev().cloned().collect(), time_signature: bar.time_signature })
            .collect();
        Value::Sequence(std::rc::Rc::new(reversed))
    });

    host(frame, "augment", vec![Type::Sequence], false, |args| {
        let Value::Sequence(bars) = &args[0] else { return Value::Void };
        Value::Sequence(std::rc::Rc::new(scale_durations(bars, true)))
    });

    host(frame, "diminish", vec![Type::Sequence], false, |args| {
        let Value::Sequence(bars) = &args[0] else { return Value::Void };
        Value::Sequence(std::rc::Rc::new(scale_durations(bars, false)))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::PitchSpelling;
    use crate::context::{Frame, FunctionValue};
    use crate::overload::try_resolve;
    use crate::value::TimeSignatureValue;
    use std::rc::Rc;

    fn call(name: &str, arg_types: &[Type], args: &[Value]) -> Value {
        let frame = Frame::new_root();
        register(&frame);
        let resolution = try_resolve(&frame, name, arg_types).unwrap();
        match &*resolution.function {
            FunctionValue::Host { call, .. } => call(args),
            _ => unreachable!(),
        }
    }

    fn note(letter: char, alteration: i8) -> MusicalNoteValue {
        MusicalNoteValue {
            pitch: Some(PitchSpelling { letter, alteration, octave: Some(4) }),
            duration: DurationClass::Quarter,
            dotted: false,
            is_rest: false,
            articulation: None,
            velocity: None,
            tied: false,
            cent_offset: None,
        }
    }

    #[test]
    fn transpose_note_shifts_alteration() {
        let result = call("transpose", &[Type::MusicalNote, Type::Semitone], &[Value::MusicalNote(Rc::new(note('C', 0))), Value::Semitone(2)]);
        match result {
            Value::MusicalNote(n) => assert_eq!(n.pitch.as_ref().unwrap().alteration, 2),
            other => panic!("expected a musical note, got {:?}", other),
        }
    }

    #[test]
    fn reverse_flips_bar_and_note_order() {
        let bars = vec![
            BarValue { notes: vec![note('C', 0), note('D', 0)], time_signature: TimeSignatureValue::default() },
            BarValue { notes: vec![note('E', 0)], time_signature: TimeSignatureValue::default() },
        ];
        let result = call("reverse", &[Type::Sequence], &[Value::Sequence(Rc::new(bars))]);
        match result {
            Value::Sequence(reversed) => {
                assert_eq!(reversed[0].notes[0].pitch.as_ref().unwrap().letter, 'E');
                assert_eq!(reversed[1].notes[0].pitch.as_ref().unwrap().letter, 'D');
            }
            other => panic!("expected a sequence, got {:?}", other),
        }
    }

    #[test]
    fn augment_then_diminish_is_a_roundtrip_for_non_extreme_durations() {
        let bars = vec![BarValue { notes: vec![note('C', 0)], time_signature: TimeSignatureValue::default() }];
        let augmented = call("augment", &[Type::Sequence], &[Value::Sequence(Rc::new(bars))]);
        let diminished = call("diminish", &[Type::Sequence], std::slice::from_ref(&augmented));
        match diminished {
            Value::Sequence(bars) => assert_eq!(bars[0].notes[0].duration, DurationClass::Quarter),
            other => panic!("expected a sequence, got {:?}", other),
        }
    }
}
