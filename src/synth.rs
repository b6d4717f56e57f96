//! # Synth capability
//!
//! `render(note, sample_rate, duration_beats, bpm) -> buffer`. The
//! engine registers one implementation per name; a host may replace any
//! of them before a program runs. These defaults are short analytic
//! waveform generators, not a DSP effects chain — enough to make
//! `compile -> render` examples produce audible, non-silent output
//! without a host supplying its own synth.

use std::f64::consts::PI;

use crate::value::MusicalNoteValue;

pub trait Synth {
    fn render(&self, note: &MusicalNoteValue, sample_rate: u32, duration_beats: f64, bpm: f64) -> Vec<f32>;
}

fn frame_count(duration_beats: f64, bpm: f64, sample_rate: u32) -> usize {
    ((duration_beats * 60.0 / bpm) * sample_rate as f64).round().max(0.0) as usize
}

fn note_frequency_hz(note: &MusicalNoteValue) -> f64 {
    let pitch = match &note.pitch {
        Some(p) => p,
        None => return 0.0,
    };
    let step = match pitch.letter {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        _ => 0,
    };
    let octave = pitch.octave.unwrap_or(4);
    let midi = (octave + 1) * 12 + step + pitch.alteration as i64;
    440.0 * 2f64.powf((midi as f64 - 69.0) / 12.0)
}

fn adsr(frame: usize, total: usize, attack: usize, decay: usize, sustain_level: f64, release: usize) -> f64 {
    if frame < attack {
        frame as f64 / attack.max(1) as f64
    } else if frame < attack + decay {
        let t = (frame - attack) as f64 / decay.max(1) as f64;
        1.0 - t * (1.0 - sustain_level)
    } else if frame < total.saturating_sub(release) {
        sustain_level
    } else {
        let remaining = total.saturating_sub(frame) as f64;
        sustain_level * (remaining / release.max(1) as f64)
    }
}

/// Pure sine tone.
pub struct SineSynth;

impl Synth for SineSynth {
    fn render(&self, note: &MusicalNoteValue, sample_rate: u32, duration_beats: f64, bpm: f64) -> Vec<f32> {
        if note.is_rest {
            return vec![0.0; frame_count(duration_beats, bpm, sample_rate)];
        }
        let freq = note_frequency_hz(note);
        let total = frame_count(duration_beats, bpm, sample_rate);
        (0..total)
            .map(|i| {
                let t = i as f64 / sample_rate as f64;
                (2.0 * PI * freq * t).sin() as f32
            })
            .collect()
    }
}

/// Band-naive sawtooth, DC-corrected by centering around zero.
pub struct SawSynth;

impl Synth for SawSynth {
    fn render(&self, note: &MusicalNoteValue, sample_rate: u32, duration_beats: f64, bpm: f64) -> Vec<f32> {
        if note.is_rest {
            return vec![0.0; frame_count(duration_beats, bpm, sample_rate)];
        }
        let freq = note_frequency_hz(note);
        let total = frame_count(duration_beats, bpm, sample_rate);
        (0..total)
            .map(|i| {
                let t = i as f64 / sample_rate as f64;
                let phase = (freq * t).fract();
                (2.0 * phase - 1.0) as f32
            })
            .collect()
    }
}

/// Band-naive square, DC-corrected the same way as the sawtooth.
pub struct SquareSynth;

impl Synth for SquareSynth {
    fn render(&self, note: &MusicalNoteValue, sample_rate: u32, duration_beats: f64, bpm: f64) -> Vec<f32> {
        if note.is_rest {
            return vec![0.0; frame_count(duration_beats, bpm, sample_rate)];
        }
        let freq = note_frequency_hz(note);
        let total = frame_count(duration_beats, bpm, sample_rate);
        (0..total)
            .map(|i| {
                let t = i as f64 / sample_rate as f64;
                let phase = (freq * t).fract();
                if phase < 0.5 { 1.0 } else { -1.0 }
            })
            .collect()
    }
}

/// A small additive harmonic stack with a fixed ADSR envelope, shared by
/// the instrument-flavored defaults (piano, brass, sax, flute) that
/// differ only in which harmonics are present and how fast the envelope
/// moves.
struct HarmonicSynth {
    harmonics: &'static [(f64, f64)],
    attack_ms: f64,
    decay_ms: f64,
    sustain_level: f64,
    release_ms: f64,
}

impl Synth for HarmonicSynth {
    fn render(&self, note: &MusicalNoteValue, sample_rate: u32, duration_beats: f64, bpm: f64) -> Vec<f32> {
        let total = frame_count(duration_beats, bpm, sample_rate);
        if note.is_rest {
            return vec![0.0; total];
        }
        let freq = note_frequency_hz(note);
        let attack = (self.attack_ms / 1000.0 * sample_rate as f64) as usize;
        let decay = (self.decay_ms / 1000.0 * sample_rate as f64) as usize;
        let release = (self.release_ms / 1000.0 * sample_rate as f64) as usize;
        (0..total)
            .map(|i| {
                let t = i as f64 / sample_rate as f64;
                let sample: f64 = self
                    .harmonics
                    .iter()
                    .map(|(mult, weight)| (2.0 * PI * freq * mult * t).sin() * weight)
                    .sum();
                let env = adsr(i, total, attack, decay, self.sustain_level, release);
                (sample * env) as f32
            })
            .collect()
    }
}

pub fn piano() -> impl Synth {
    HarmonicSynth { harmonics: &[(1.0, 1.0), (2.0, 0.5), (3.0, 0.25)], attack_ms: 5.0, decay_ms: 120.0, sustain_level: 0.6, release_ms: 200.0 }
}

pub fn brass() -> impl Synth {
    HarmonicSynth { harmonics: &[(1.0, 1.0), (2.0, 0.6), (3.0, 0.4), (4.0, 0.2)], attack_ms: 40.0, decay_ms: 60.0, sustain_level: 0.8, release_ms: 80.0 }
}

pub fn sax() -> impl Synth {
    HarmonicSynth { harmonics: &[(1.0, 1.0), (2.0, 0.3), (3.0, 0.5), (4.0, 0.15)], attack_ms: 60.0, decay_ms: 40.0, sustain_level: 0.7, release_ms: 120.0 }
}

pub fn flute() -> impl Synth {
    HarmonicSynth { harmonics: &[(1.0, 1.0), (2.0, 0.1)], attack_ms: 80.0, decay_ms: 20.0, sustain_level: 0.9, release_ms: 100.0 }
}

/// Filtered noise burst: a linear-congruential noise source with a
/// one-pole low-pass and an exponential decay envelope.
pub struct DrumsSynth;

impl Synth for DrumsSynth {
    fn render(&self, note: &MusicalNoteValue, sample_rate: u32, duration_beats: f64, bpm: f64) -> Vec<f32> {
        let total = frame_count(duration_beats, bpm, sample_rate);
        if note.is_rest {
            return vec![0.0; total];
        }
        let mut state: u32 = 0x1234_5678;
        let mut prev = 0.0f64;
        (0..total)
            .map(|i| {
                state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                let white = (state as f64 / u32::MAX as f64) * 2.0 - 1.0;
                let filtered = prev * 0.7 + white * 0.3;
                prev = filtered;
                let decay = (-(i as f64) / (sample_rate as f64 * 0.15)).exp();
                (filtered * decay) as f32
            })
            .collect()
    }
}

pub fn default_registry() -> Vec<(&'static str, Box<dyn Synth>)> {
    vec![
        ("sine", Box::new(SineSynth)),
        ("saw", Box::new(SawSynth)),
        ("square", Box::new(SquareSynth)),
        ("piano", Box::new(piano())),
        ("brass", Box::new(brass())),
        ("sax", Box::new(sax())),
        ("flute", Box::new(flute())),
        ("drums", Box::new(DrumsSynth)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{DurationClass, PitchSpelling};

    fn note(letter: char, octave: i64) -> MusicalNoteValue {
        MusicalNoteValue {
            pitch: Some(PitchSpelling { letter, alteration: 0, octave: Some(octave) }),
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
    fn sine_render_has_correct_frame_count() {
        let synth = SineSynth;
        let buf = synth.render(&note('C', 4), 44_100, 1.0, 120.0);
        assert_eq!(buf.len(), 22_050);
    }

    #[test]
    fn rest_renders_silence() {
        let mut rest = note('C', 4);
        rest.is_rest = true;
        let synth = SineSynth;
        let buf = synth.render(&rest, 44_100, 1.0, 120.0);
        assert!(buf.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn sounding_note_has_nonzero_energy() {
        let synth = SineSynth;
        let buf = synth.render(&note('A', 4), 44_100, 1.0, 120.0);
        assert!(buf.iter().any(|s| s.abs() > 0.01));
    }

    #[test]
    fn registry_has_one_entry_per_named_synth() {
        let registry = default_registry();
        let names: Vec<&str> = registry.iter().map(|(n, _)| *n).collect();
        for expected in ["sine", "saw", "square", "piano", "brass", "sax", "flute", "drums"] {
            assert!(names.contains(&expected));
        }
    }
}
