//! # WAV writer
//!
//! Hand-assembled little-endian RIFF/WAVE byte buffers. Flow has no
//! notation-output format, so there is no markup-writer crate to reuse
//! here; the binary layout is small enough, and specified precisely
//! enough (exact chunk sizes, dither rule), that writing it directly
//! keeps the byte layout auditable rather than hidden behind a
//! library's defaults.

use crate::diagnostics::{DiagnosticKind, Diagnostics, SourceLocation};

pub struct WavSpec {
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
}

/// TPDF dither: two uniform variables summed and scaled to one
/// quantization step, used for 16- and 24-bit output; 32-bit is
/// undithered.
struct Dither {
    state: u32,
}

impl Dither {
    fn new(seed: u32) -> Self {
        Self { state: seed }
    }

    fn next_uniform(&mut self) -> f64 {
        self.state = self.state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        self.state as f64 / u32::MAX as f64
    }

    fn triangular(&mut self) -> f64 {
        self.next_uniform() + self.next_uniform() - 1.0
    }
}

fn clamp_sample(sample: f32) -> f32 {
    if sample.is_nan() {
        0.0
    } else if sample == f32::INFINITY {
        1.0
    } else if sample == f32::NEG_INFINITY {
        -1.0
    } else {
        sample.clamp(-1.0, 1.0)
    }
}

fn quantize(sample: f32, bits: u16, dither: &mut Dither) -> Vec<u8> {
    let clamped = clamp_sample(sample) as f64;
    match bits {
        16 => {
            let scale = i16::MAX as f64;
            let dithered = clamped * scale + dither.triangular();
            let quantized = dithered.round().clamp(i16::MIN as f64, i16::MAX as f64) as i16;
            quantized.to_le_bytes().to_vec()
        }
        24 => {
            let scale = (1i32 << 23) as f64 - 1.0;
            let dithered = clamped * scale + dither.triangular();
            let quantized = dithered.round().clamp(-(1i32 << 23) as f64, ((1i32 << 23) - 1) as f64) as i32;
            quantized.to_le_bytes()[..3].to_vec()
        }
        32 => {
            let scale = i32::MAX as f64;
            let quantized = (clamped * scale).round().clamp(i32::MIN as f64, i32::MAX as f64) as i32;
            quantized.to_le_bytes().to_vec()
        }
        _ => unreachable!("bit depth validated before reaching quantize"),
    }
}

/// Assembles a full RIFF/WAVE byte buffer from interleaved float samples,
/// or reports `AudioInvalidBitDepth` and returns `None` for anything
/// other than 16/24/32.
pub fn write_wav(samples: &[f32], spec: &WavSpec, diags: &mut Diagnostics, location: SourceLocation) -> Option<Vec<u8>> {
    if !matches!(spec.bits_per_sample, 16 | 24 | 32) {
        diags.push(DiagnosticKind::AudioInvalidBitDepth(spec.bits_per_sample), location);
        return None;
    }

    let bytes_per_sample = (spec.bits_per_sample / 8) as u32;
    let block_align = spec.channels as u32 * bytes_per_sample;
    let byte_rate = spec.sample_rate * block_align;
    let data_size = samples.len() as u32 * bytes_per_sample;

    let mut buf = Vec::with_capacity(44 + data_size as usize);

    buf.extend_from_slice(b"RIFF");
    buf.extend_from_slice(&(36 + data_size).to_le_bytes());
    buf.extend_from_slice(b"WAVE");

    buf.extend_from_slice(b"fmt ");
    buf.extend_from_slice(&16u32.to_le_bytes());
    buf.extend_from_slice(&1u16.to_le_bytes());
    buf.extend_from_slice(&spec.channels.to_le_bytes());
    buf.extend_from_slice(&spec.sample_rate.to_le_bytes());
    buf.extend_from_slice(&byte_rate.to_le_bytes());
    buf.extend_from_slice(&(block_align as u16).to_le_bytes());
    buf.extend_from_slice(&spec.bits_per_sample.to_le_bytes());

    buf.extend_from_slice(b"data");
    buf.extend_from_slice(&data_size.to_le_bytes());

    let mut dither = Dither::new(0x9E37_79B9);
    for sample in samples {
        buf.extend_from_slice(&quantize(*sample, spec.bits_per_sample, &mut dither));
    }

    Some(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(bits: u16) -> WavSpec {
        WavSpec { channels: 1, sample_rate: 44_100, bits_per_sample: bits }
    }

    #[test]
    fn header_has_documented_chunk_sizes() {
        let samples = vec![0.0f32; 10];
        let mut diags = Diagnostics::new();
        let buf = write_wav(&samples, &spec(16), &mut diags, SourceLocation::new(1, 1)).unwrap();
        assert_eq!(&buf[0..4], b"RIFF");
        assert_eq!(&buf[8..12], b"WAVE");
        assert_eq!(&buf[12..16], b"fmt ");
        assert_eq!(u32::from_le_bytes(buf[16..20].try_into().unwrap()), 16);
        assert_eq!(&buf[36..40], b"data");
        let data_size = u32::from_le_bytes(buf[40..44].try_into().unwrap());
        assert_eq!(data_size, 20);
        assert_eq!(buf.len(), 44 + 20);
    }

    #[test]
    fn sixteen_bit_roundtrips_sample_count() {
        let samples = vec![0.5f32; 100];
        let mut diags = Diagnostics::new();
        let buf = write_wav(&samples, &spec(16), &mut diags, SourceLocation::new(1, 1)).unwrap();
        let data = &buf[44..];
        assert_eq!(data.len() / 2, 100);
    }

    #[test]
    fn invalid_bit_depth_reports_and_returns_none() {
        let samples = vec![0.0f32; 4];
        let mut diags = Diagnostics::new();
        let result = write_wav(&samples, &spec(8), &mut diags, SourceLocation::new(1, 1));
        assert!(result.is_none());
        assert_eq!(diags.len(), 1);
    }

    #[test]
    fn nan_and_infinity_map_to_zero_and_clamped_extremes() {
        assert_eq!(clamp_sample(f32::NAN), 0.0);
        assert_eq!(clamp_sample(f32::INFINITY), 1.0);
        assert_eq!(clamp_sample(f32::NEG_INFINITY), -1.0);
        assert_eq!(clamp_sample(2.5), 1.0);
    }

    #[test]
    fn written_buffer_survives_a_round_trip_through_disk() {
        use std::io::Write;

        let samples = vec![0.25f32; 50];
        let mut diags = Diagnostics::new();
        let buf = write_wav(&samples, &spec(16), &mut diags, SourceLocation::new(1, 1)).unwrap();

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&buf).unwrap();
        let on_disk = std::fs::read(file.path()).unwrap();
        assert_eq!(on_disk, buf);
    }
}
