//! # Audio backend interface
//!
//! The opaque playback capability: `initialize`/`play`/`devices`/
//! `set_device`/`initialized`. The core never talks to real audio
//! hardware directly — a host supplies an implementation the same way it
//! may replace any `synth.rs` default before a program runs. The only
//! implementation shipped here is [`NullAudioBackend`], which "plays" by
//! sleeping for the buffer's real-time duration instead of opening a
//! device; a host embedding Flow in, say, a cpal-backed player supplies
//! its own [`AudioBackend`] rather than this crate growing a hardware
//! dependency it can't exercise in CI.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Cooperative cancellation for a blocking `play` call. Cloning shares
/// the same underlying flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlaybackOutcome {
    Drained,
    Cancelled,
}

pub trait AudioBackend {
    fn initialize(&mut self, sample_rate: u32, channels: u16) -> bool;

    /// Blocks until every sample has been presented or `cancellation` is
    /// signalled, whichever comes first.
    fn play(&mut self, samples: &[f32], sample_rate: u32, channels: u16, cancellation: &CancellationToken) -> PlaybackOutcome;

    fn devices(&self) -> Vec<String>;

    fn set_device(&mut self, name: &str) -> bool;

    fn is_initialized(&self) -> bool;
}

/// Default backend: no hardware, just real-time pacing so `play` behaves
/// like a device that drains at the stated sample rate. Good enough for
/// running Flow programs headlessly (tests, batch rendering to WAV) where
/// `render`/`write` already produce the audible artifact without needing
/// playback at all.
pub struct NullAudioBackend {
    initialized: bool,
    device: String,
}

impl Default for NullAudioBackend {
    fn default() -> Self {
        Self { initialized: false, device: "null".to_string() }
    }
}

impl AudioBackend for NullAudioBackend {
    fn initialize(&mut self, _sample_rate: u32, _channels: u16) -> bool {
        self.initialized = true;
        true
    }

    fn play(&mut self, samples: &[f32], sample_rate: u32, channels: u16, cancellation: &CancellationToken) -> PlaybackOutcome {
        if !self.initialized {
            return PlaybackOutcome::Cancelled;
        }
        let frames = samples.len() / channels.max(1) as usize;
        let total = Duration::from_secs_f64(frames as f64 / sample_rate.max(1) as f64);

        // Poll in small slices instead of one long sleep so cancellation
        // takes effect promptly rather than only after the whole buffer.
        let slice = Duration::from_millis(10);
        let mut elapsed = Duration::ZERO;
        while elapsed < total {
            if cancellation.is_cancelled() {
                return PlaybackOutcome::Cancelled;
            }
            let step = slice.min(total - elapsed);
            std::thread::sleep(step);
            elapsed += step;
        }
        PlaybackOutcome::Drained
    }

    fn devices(&self) -> Vec<String> {
        vec![self.device.clone()]
    }

    fn set_device(&mut self, name: &str) -> bool {
        self.device = name.to_string();
        true
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}
