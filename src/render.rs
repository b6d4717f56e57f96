//! # Song / sequence renderer
//!
//! Staged pipeline: Sequence -> (Bar, beat-offset) pairs -> (note,
//! beat-offset-within-bar) pairs -> one rendered [`Voice`][VoiceData] per
//! sounding note -> a mixed-down buffer. A time-cursor walk in sample
//! frames rather than beats or MIDI ticks, with ties handled by
//! extending this note's render into a small overlap with the next
//! rather than extending the first note's own duration.
//!
//! [`render_song`] is one level up: it walks a Song's ordered
//! (section, repeat-count) entries and re-renders a section's sequences
//! once per repetition, advancing the same time cursor this module uses
//! for a bare Sequence. [`render_track`] sits beside it: a Track is a
//! loose bag of Voices plus a shared gain rather than anything compiled
//! from bars, so its total beats are measured from the voices themselves
//! rather than threaded in by a caller that rendered them.

use std::cell::RefCell;
use std::rc::Rc;

use rand::RngCore;

use crate::diagnostics::{Diagnostics, SourceLocation};
use crate::notestream_compiler;
use crate::synth::Synth;
use crate::value::{BarValue, BufferData, MusicalNoteValue, SongValue, TrackData, Value, VoiceData};

/// How far a tied note's rendered audio bleeds past its beat-grid
/// duration to produce legato, in beats.
const TIE_OVERLAP_BEATS: f64 = 0.05;

fn articulation_multiplier(note: &MusicalNoteValue) -> f64 {
    note.articulation.map(|a| a.multiplier()).unwrap_or(1.0)
}

fn beats_to_frames(beats: f64, bpm: f64, sample_rate: u32) -> usize {
    ((beats * 60.0 / bpm) * sample_rate as f64).round().max(0.0) as usize
}

pub struct RenderedSequence {
    pub voices: Vec<VoiceData>,
    pub total_beats: f64,
}

/// Walks every bar/note in source order, accumulating a beat cursor.
/// Rests advance the cursor without producing a voice. `gain`/`pan` are
/// applied uniformly to every voice produced (per-note gain/pan is not
/// part of the note-stream grammar).
pub fn render_bars(
    bars: &[BarValue],
    synth: &dyn Synth,
    sample_rate: u32,
    bpm: f64,
    gain: f64,
    pan: f64,
) -> RenderedSequence {
    let mut voices = Vec::new();
    let mut cursor_beats = 0.0;

    for bar in bars {
        let denominator = bar.time_signature.denominator;
        for note in &bar.notes {
            let grid_beats = note.beats(denominator);
            if !note.is_rest {
                let mut render_beats = grid_beats * articulation_multiplier(note);
                if note.tied {
                    render_beats += TIE_OVERLAP_BEATS;
                }
                let samples = synth.render(note, sample_rate, render_beats, bpm);
                voices.push(VoiceData {
                    buffer: Rc::new(RefCell::new(BufferData { samples, sample_rate })),
                    gain,
                    pan,
                    offset_beats: cursor_beats,
                });
            }
            cursor_beats += grid_beats;
        }
    }

    RenderedSequence { voices, total_beats: cursor_beats }
}

fn equal_power_gains(pan: f64) -> (f64, f64) {
    let clamped = pan.clamp(-1.0, 1.0);
    let angle = (clamped + 1.0) * std::f64::consts::FRAC_PI_4;
    (angle.cos(), angle.sin())
}

/// Mixes a set of voices down into a buffer spanning `total_beats`.
/// Samples are summed as floats, unclamped; clamping happens at the
/// playback or WAV-writing boundary.
pub fn mix_voices(voices: &[VoiceData], total_beats: f64, bpm: f64, sample_rate: u32, channels: u16, track_gain: f64) -> BufferData {
    let total_frames = beats_to_frames(total_beats, bpm, sample_rate);
    let mut samples = vec![0.0f32; total_frames * channels as usize];

    for voice in voices {
        let start_frame = beats_to_frames(voice.offset_beats, bpm, sample_rate);
        let buf = voice.buffer.borrow();
        let effective_gain = (voice.gain * track_gain) as f32;

        if channels == 1 {
            for (i, s) in buf.samples.iter().enumerate() {
                let frame = start_frame + i;
                if frame < total_frames {
                    samples[frame] += s * effective_gain;
                }
            }
        } else {
            let (left_gain, right_gain) = equal_power_gains(voice.pan);
            for (i, s) in buf.samples.iter().enumerate() {
                let frame = start_frame + i;
                if frame < total_frames {
                    samples[frame * 2] += s * effective_gain * left_gain as f32;
                    samples[frame * 2 + 1] += s * effective_gain * right_gain as f32;
                }
            }
        }
    }

    BufferData { samples, sample_rate }
}

/// Mixes every voice in a track, applying the track's own gain on top of
/// each voice's gain.
pub fn mix_track(track: &TrackData, total_beats: f64, bpm: f64, sample_rate: u32, channels: u16) -> BufferData {
    let borrowed: Vec<VoiceData> = track.voices.iter().map(|v| v.borrow().clone()).collect();
    mix_voices(&borrowed, total_beats, bpm, sample_rate, channels, track.gain)
}

fn frames_to_beats(frames: usize, bpm: f64, sample_rate: u32) -> f64 {
    frames as f64 / sample_rate.max(1) as f64 * bpm / 60.0
}

/// A track's own extent: the furthest any of its voices reaches past its
/// offset, not just the latest offset. A caller that only has the track
/// (no separate record of how long the sequence it came from ran) derives
/// `total_beats` for [`mix_track`] from this instead.
fn track_total_beats(track: &TrackData, bpm: f64, sample_rate: u32) -> f64 {
    track
        .voices
        .iter()
        .map(|v| {
            let v = v.borrow();
            let len = v.buffer.borrow().samples.len();
            v.offset_beats + frames_to_beats(len, bpm, sample_rate)
        })
        .fold(0.0, f64::max)
}

/// `mix_track` plus the total-beats bookkeeping a freestanding Track value
/// (built from loose Voices rather than rendered straight from a Sequence)
/// doesn't carry anywhere else.
pub fn render_track(track: &TrackData, sample_rate: u32, bpm: f64, channels: u16) -> BufferData {
    let total_beats = track_total_beats(track, bpm, sample_rate);
    mix_track(track, total_beats, bpm, sample_rate, channels)
}

/// Walks a Song's (section, repeat-count) entries in order, re-rendering a
/// section's sequences once per repetition rather than once total, so a
/// repeat count of 3 actually occupies three times a section's length on
/// the timeline. A section's sequences (its simultaneous voices) are
/// rendered at the same starting offset and advance a shared cursor by the
/// longest of them; an entry naming a section absent from the Song's own
/// registry contributes silence, not a skipped beat.
pub fn render_song(song: &SongValue, synth: &dyn Synth, sample_rate: u32, bpm: f64, channels: u16, rng: &mut dyn RngCore) -> BufferData {
    let mut voices = Vec::new();
    let mut cursor_beats = 0.0;

    for entry in &song.entries {
        let Some(section) = song.sections.get(&entry.section) else { continue };
        let mut names: Vec<&String> = section.sequences.keys().collect();
        names.sort();

        for _ in 0..entry.repeat {
            let mut repeat_beats = 0.0_f64;
            for name in &names {
                let bars = bars_for_this_repeat(section, name, rng);
                let rendered = render_bars(&bars, synth, sample_rate, bpm, 1.0, 0.0);
                for mut voice in rendered.voices {
                    voice.offset_beats += cursor_beats;
                    voices.push(voice);
                }
                repeat_beats = repeat_beats.max(rendered.total_beats);
            }
            cursor_beats += repeat_beats;
        }
    }

    mix_voices(&voices, cursor_beats, bpm, sample_rate, channels, 1.0)
}

/// The bars a section's named sequence contributes to one repeat. A
/// sequence with no `??` anywhere just replays the bars its first (and
/// only) compile produced — that's where every `?` in it already got
/// frozen. A sequence with a `??` recompiles fresh from its raw bars every
/// time this is called, so each repeat draws its own pick.
fn bars_for_this_repeat(section: &crate::value::SectionValue, name: &str, rng: &mut dyn RngCore) -> Rc<Vec<BarValue>> {
    let compiled = &section.sequences[name];
    let Some((raw_bars, resolved)) = section.raw.get(name) else { return compiled.clone() };
    if !notestream_compiler::contains_reroll(raw_bars) {
        return compiled.clone();
    }
    let mut scratch = Diagnostics::new();
    match notestream_compiler::compile(raw_bars, resolved, rng, &mut scratch, SourceLocation::new(0, 0)) {
        Value::Sequence(fresh) => fresh,
        _ => compiled.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{DurationClass, PitchSpelling};
    use crate::synth::SineSynth;
    use crate::value::{SectionValue, SongEntry, TimeSignatureValue, TrackData};
    use rand::rngs::mock::StepRng;
    use std::collections::HashMap;

    fn note(letter: char, is_rest: bool) -> MusicalNoteValue {
        MusicalNoteValue {
            pitch: if is_rest { None } else { Some(PitchSpelling { letter, alteration: 0, octave: Some(4) }) },
            duration: DurationClass::Quarter,
            dotted: false,
            is_rest,
            articulation: None,
            velocity: None,
            tied: false,
            cent_offset: None,
        }
    }

    #[test]
    fn one_bar_of_four_quarters_yields_88200_frames_at_120bpm() {
        let bar = BarValue {
            notes: vec![note('C', false), note('D', false), note('E', false), note('F', false)],
            time_signature: TimeSignatureValue { numerator: 4, denominator: 4 },
        };
        let synth = SineSynth;
        let rendered = render_bars(&[bar], &synth, 44_100, 120.0, 1.0, 0.0);
        assert_eq!(rendered.total_beats, 4.0);
        let mixed = mix_voices(&rendered.voices, rendered.total_beats, 120.0, 44_100, 1, 1.0);
        assert_eq!(mixed.samples.len(), 88_200);
        assert!(mixed.samples.iter().take(100).any(|s| s.abs() > 0.001));
    }

    #[test]
    fn rests_advance_cursor_without_producing_voices() {
        let bar = BarValue {
            notes: vec![note('C', true), note('D', false)],
            time_signature: TimeSignatureValue { numerator: 4, denominator: 4 },
        };
        let synth = SineSynth;
        let rendered = render_bars(&[bar], &synth, 44_100, 120.0, 1.0, 0.0);
        assert_eq!(rendered.voices.len(), 1);
        assert_eq!(rendered.voices[0].offset_beats, 1.0);
    }

    #[test]
    fn song_of_one_section_one_bar_matches_sequence_mix_down() {
        let bar = BarValue {
            notes: vec![note('C', false)],
            time_signature: TimeSignatureValue { numerator: 4, denominator: 4 },
        };
        let mut sequences = HashMap::new();
        sequences.insert("s".to_string(), Rc::new(vec![bar]));
        let mut sections = HashMap::new();
        sections.insert(
            "verse".to_string(),
            SectionValue { name: "verse".to_string(), sequences: Rc::new(sequences), raw: Rc::new(HashMap::new()) },
        );
        let song = SongValue {
            entries: vec![SongEntry { section: "verse".to_string(), repeat: 1 }],
            sections: Rc::new(sections),
        };

        let synth = SineSynth;
        let mut rng = StepRng::new(0, 1);
        let buffer = render_song(&song, &synth, 44_100, 120.0, 1, &mut rng);
        assert_eq!(buffer.samples.len(), 88_200);
        assert!(buffer.samples.iter().take(100).any(|s| s.abs() > 0.001));
    }

    #[test]
    fn repeat_count_multiplies_a_section_s_length() {
        let bar = BarValue {
            notes: vec![note('C', false)],
            time_signature: TimeSignatureValue { numerator: 4, denominator: 4 },
        };
        let mut sequences = HashMap::new();
        sequences.insert("s".to_string(), Rc::new(vec![bar]));
        let mut sections = HashMap::new();
        sections.insert(
            "verse".to_string(),
            SectionValue { name: "verse".to_string(), sequences: Rc::new(sequences), raw: Rc::new(HashMap::new()) },
        );
        let song = SongValue {
            entries: vec![SongEntry { section: "verse".to_string(), repeat: 3 }],
            sections: Rc::new(sections),
        };

        let synth = SineSynth;
        let mut rng = StepRng::new(0, 1);
        let buffer = render_song(&song, &synth, 44_100, 120.0, 1, &mut rng);
        assert_eq!(buffer.samples.len(), 88_200 * 3);
    }

    #[test]
    fn a_single_question_choice_replays_the_same_compiled_bars_every_repeat() {
        use crate::ast::{Bar, DurationSuffix, NoteStreamElement};
        use crate::context::ResolvedContext;

        let raw_bars = vec![Bar {
            elements: vec![NoteStreamElement::RandomChoice {
                reroll_each_repeat: false,
                choices: vec![
                    (Box::new(NoteStreamElement::Note { pitch: PitchSpelling { letter: 'C', alteration: 0, octave: Some(4) }, suffix: DurationSuffix::default() }), None),
                    (Box::new(NoteStreamElement::Note { pitch: PitchSpelling { letter: 'D', alteration: 0, octave: Some(4) }, suffix: DurationSuffix::default() }), None),
                ],
            }],
        }];
        let resolved = ResolvedContext { time_signature: TimeSignatureValue::default(), tempo: 120.0, swing: 0.5, key: None };
        let mut compile_rng = StepRng::new(7, 11);
        let mut scratch = Diagnostics::new();
        let compiled = match notestream_compiler::compile(&raw_bars, &resolved, &mut compile_rng, &mut scratch, SourceLocation::new(0, 0)) {
            Value::Sequence(bars) => bars,
            _ => unreachable!(),
        };
        let mut sequences = HashMap::new();
        sequences.insert("s".to_string(), compiled);
        let mut raw = HashMap::new();
        raw.insert("s".to_string(), (Rc::new(raw_bars), resolved));
        let section = SectionValue { name: "verse".to_string(), sequences: Rc::new(sequences), raw: Rc::new(raw) };

        let mut repeat_rng = StepRng::new(1, 1);
        let first = bars_for_this_repeat(&section, "s", &mut repeat_rng);
        let second = bars_for_this_repeat(&section, "s", &mut repeat_rng);
        assert!(Rc::ptr_eq(&first, &second));
    }

    #[test]
    fn a_double_question_choice_recompiles_fresh_every_repeat() {
        use crate::ast::{Bar, DurationSuffix, NoteStreamElement};
        use crate::context::ResolvedContext;

        let raw_bars = vec![Bar {
            elements: vec![NoteStreamElement::RandomChoice {
                reroll_each_repeat: true,
                choices: vec![
                    (Box::new(NoteStreamElement::Note { pitch: PitchSpelling { letter: 'C', alteration: 0, octave: Some(4) }, suffix: DurationSuffix::default() }), None),
                    (Box::new(NoteStreamElement::Note { pitch: PitchSpelling { letter: 'D', alteration: 0, octave: Some(4) }, suffix: DurationSuffix::default() }), None),
                ],
            }],
        }];
        let resolved = ResolvedContext { time_signature: TimeSignatureValue::default(), tempo: 120.0, swing: 0.5, key: None };
        let mut compile_rng = StepRng::new(7, 11);
        let mut scratch = Diagnostics::new();
        let compiled = match notestream_compiler::compile(&raw_bars, &resolved, &mut compile_rng, &mut scratch, SourceLocation::new(0, 0)) {
            Value::Sequence(bars) => bars,
            _ => unreachable!(),
        };
        let mut sequences = HashMap::new();
        sequences.insert("s".to_string(), compiled);
        let mut raw = HashMap::new();
        raw.insert("s".to_string(), (Rc::new(raw_bars), resolved));
        let section = SectionValue { name: "verse".to_string(), sequences: Rc::new(sequences), raw: Rc::new(raw) };

        let mut repeat_rng = StepRng::new(1, 1);
        let first = bars_for_this_repeat(&section, "s", &mut repeat_rng);
        let second = bars_for_this_repeat(&section, "s", &mut repeat_rng);
        assert!(!Rc::ptr_eq(&first, &second));
    }

    #[test]
    fn track_gain_scales_a_standalone_track_s_mix() {
        let bar = BarValue {
            notes: vec![note('C', false), note('D', false), note('E', false), note('F', false)],
            time_signature: TimeSignatureValue { numerator: 4, denominator: 4 },
        };
        let synth = SineSynth;
        let rendered = render_bars(&[bar], &synth, 44_100, 120.0, 1.0, 0.0);
        let voices = rendered.voices.into_iter().map(|v| Rc::new(RefCell::new(v))).collect();
        let track = TrackData { voices, gain: 0.5 };

        let buffer = render_track(&track, 44_100, 120.0, 1);
        assert_eq!(buffer.samples.len(), 88_200);
        let unscaled = render_track(&TrackData { voices: track.voices.clone(), gain: 1.0 }, 44_100, 120.0, 1);
        for (scaled, full) in buffer.samples.iter().zip(unscaled.samples.iter()) {
            assert!((scaled - full * 0.5).abs() < 1e-6);
        }
    }
}
