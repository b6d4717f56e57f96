//! Audio glue: connects a compiled note stream to the synth registry and
//! the WAV writer — the last of the stdlib categories alongside
//! strings/arithmetic/collections/transforms. `write`'s failures collapse
//! to a `Bool`, and `render`'s unknown-synth case to `Void`, rather than a
//! pushed diagnostic: a `Host` closure has no diagnostics channel of its
//! own, so these builtins report failure the same way any other
//! value-level operation without host access would.
//!
//! `render` is overloaded on its first argument: a bare Sequence renders
//! once, a Song walks `render_song`'s repeat-aware entries, and a Track
//! mixes its own loose Voices via `render_track`. `song` builds a Song out
//! of parallel Section/Int arrays; `voices` and `track` build the pieces a
//! Track is assembled from — the individual rendered Voices of a Sequence,
//! then a shared gain wrapped around a chosen subset of them.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use rand::rngs::StdRng;

use crate::context::FrameHandle;
use crate::diagnostics::{Diagnostics, SourceLocation};
use crate::render;
use crate::synth::Synth;
use crate::types::Type;
use crate::value::{SongEntry, SongValue, TrackData, Value};
use crate::wav::{write_wav, WavSpec};

use super::host;

pub fn register(frame: &FrameHandle, synths: Rc<HashMap<&'static str, Rc<dyn Synth>>>, rng: Rc<RefCell<StdRng>>) {
    host(frame, "gain", vec![Type::Voice, Type::Double], false, |args| {
        let (Value::Voice(voice), Value::Double(g)) = (&args[0], &args[1]) else { return Value::Void };
        voice.borrow_mut().gain = *g;
        args[0].clone()
    });

    host(frame, "pan", vec![Type::Voice, Type::Double], false, |args| {
        let (Value::Voice(voice), Value::Double(p)) = (&args[0], &args[1]) else { return Value::Void };
        voice.borrow_mut().pan = *p;
        args[0].clone()
    });

    // Pairs sections with positive repeat counts into an ordered Song,
    // snapshotting each referenced section's sequences into the Song's own
    // registry so later edits to the originating variables can't reach back
    // into an already-built Song.
    host(frame, "song", vec![Type::Array(Box::new(Type::Section)), Type::Array(Box::new(Type::Int))], false, |args| {
        let (Value::Array(_, sections), Value::Array(_, repeats)) = (&args[0], &args[1]) else { return Value::Void };
        let mut entries = Vec::new();
        let mut registry = HashMap::new();
        for (s, r) in sections.iter().zip(repeats.iter()) {
            let (Value::Section(sec), Value::Int(rep)) = (s, r) else { continue };
            registry.insert(sec.name.clone(), (**sec).clone());
            entries.push(SongEntry { section: sec.name.clone(), repeat: (*rep).max(0) as u32 });
        }
        Value::Song(Rc::new(SongValue { entries, sections: Rc::new(registry) }))
    });

    let song_synths = Rc::clone(&synths);
    let sequence_synths = Rc::clone(&synths);
    host(frame, "render", vec![Type::Sequence, Type::String, Type::Int, Type::Double], false, move |args| {
        let (Value::Sequence(bars), Value::Str(name), Value::Int(sample_rate), Value::Double(bpm)) =
            (&args[0], &args[1], &args[2], &args[3])
        else {
            return Value::Void;
        };
        let Some(synth) = sequence_synths.get(name.as_str()) else { return Value::Void };
        let rendered = render::render_bars(bars, synth.as_ref(), *sample_rate as u32, *bpm, 1.0, 0.0);
        let buffer = render::mix_voices(&rendered.voices, rendered.total_beats, *bpm, *sample_rate as u32, 1, 1.0);
        Value::Buffer(Rc::new(RefCell::new(buffer)))
    });

    // Walks every (section, repeat-count) entry in source order, re-rendering
    // each section's sequences once per repetition so a repeated section
    // actually occupies repeat-count times its length on the timeline. Draws
    // from the engine's own seeded PRNG (shared with the interpreter, not a
    // closure-local one) so a `??` choice it re-rolls here replays the same
    // way after `reset_rng`, same as one resolved at compile time.
    let song_rng = Rc::clone(&rng);
    host(frame, "render", vec![Type::Song, Type::String, Type::Int, Type::Double], false, move |args| {
        let (Value::Song(song), Value::Str(name), Value::Int(sample_rate), Value::Double(bpm)) =
            (&args[0], &args[1], &args[2], &args[3])
        else {
            return Value::Void;
        };
        let Some(synth) = song_synths.get(name.as_str()) else { return Value::Void };
        let buffer = render::render_song(song, synth.as_ref(), *sample_rate as u32, *bpm, 1, &mut *song_rng.borrow_mut());
        Value::Buffer(Rc::new(RefCell::new(buffer)))
    });

    // Renders a Sequence the same way the Sequence `render` overload does,
    // but stops short of mixing down so the individual Voices stay
    // addressable — the only way a program gets hold of a Voice to build a
    // Track out of.
    let voice_synths = Rc::clone(&synths);
    host(frame, "voices", vec![Type::Sequence, Type::String, Type::Int, Type::Double], false, move |args| {
        let (Value::Sequence(bars), Value::Str(name), Value::Int(sample_rate), Value::Double(bpm)) =
            (&args[0], &args[1], &args[2], &args[3])
        else {
            return Value::Void;
        };
        let Some(synth) = voice_synths.get(name.as_str()) else { return Value::Void };
        let rendered = render::render_bars(bars, synth.as_ref(), *sample_rate as u32, *bpm, 1.0, 0.0);
        let items = rendered.voices.into_iter().map(|v| Value::Voice(Rc::new(RefCell::new(v)))).collect();
        Value::Array(Type::Voice, Rc::new(items))
    });

    host(frame, "track", vec![Type::Array(Box::new(Type::Voice)), Type::Double], false, |args| {
        let (Value::Array(_, items), Value::Double(gain)) = (&args[0], &args[1]) else { return Value::Void };
        let voices = items
            .iter()
            .filter_map(|v| match v {
                Value::Voice(voice) => Some(voice.clone()),
                _ => None,
            })
            .collect();
        Value::Track(Rc::new(RefCell::new(TrackData { voices, gain: *gain })))
    });

    // A Track's own extent isn't passed in anywhere (unlike the Sequence
    // overload, which knows `total_beats` from the render it just did), so
    // this delegates to `render_track`, which measures it from the voices.
    host(frame, "render", vec![Type::Track, Type::Int, Type::Double], false, |args| {
        let (Value::Track(track), Value::Int(sample_rate), Value::Double(bpm)) = (&args[0], &args[1], &args[2]) else {
            return Value::Void;
        };
        let buffer = render::render_track(&track.borrow(), *sample_rate as u32, *bpm, 1);
        Value::Buffer(Rc::new(RefCell::new(buffer)))
    });

    host(frame, "write", vec![Type::Buffer, Type::String, Type::Int], false, |args| {
        let (Value::Buffer(buf), Value::Str(path), Value::Int(bits)) = (&args[0], &args[1], &args[2]) else {
            return Value::Bool(false);
        };
        let buf = buf.borrow();
        let spec = WavSpec { channels: 1, sample_rate: buf.sample_rate, bits_per_sample: *bits as u16 };
        let mut scratch = Diagnostics::new();
        match write_wav(&buf.samples, &spec, &mut scratch, SourceLocation::new(0, 0)) {
            Some(bytes) => Value::Bool(std::fs::write(path, bytes).is_ok()),
            None => Value::Bool(false),
        }
    });
}
