//! Sample playback: WAV banks and rate-resampled voices
//!
//! A `SampleBank` holds the decoded reference-pitch buffers of a sampler
//! instrument. Notes play the nearest reference sample, resampled by the
//! equal-tempered rate ratio to hit the requested pitch. Files that fail to
//! load are simply absent from the bank; those pitches fall back to the
//! synth recipe at spawn time.

use anyhow::{bail, Result};
use contrisonics_core::SamplerSpec;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// Release ramp applied at note-off, in seconds.
const RELEASE_RAMP_SECS: f32 = 0.008;
/// Forced-fade time used when a voice is stolen, in seconds.
const KILL_FADE_SECS: f32 = 0.005;

/// One decoded sample, mono, already at the output sample rate.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    pub data: Vec<f32>,
}

impl SampleBuffer {
    /// Load a WAV file, folding channels to mono and resampling to the
    /// output rate.
    pub fn load_wav(path: &Path, target_rate: u32) -> Result<Self> {
        let mut reader = hound::WavReader::open(path)?;
        let spec = reader.spec();
        let channels = spec.channels as usize;
        if channels == 0 {
            bail!("WAV file has no channels: {}", path.display());
        }

        let samples: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => {
                reader.samples::<f32>().collect::<Result<Vec<_>, _>>()?
            }
            hound::SampleFormat::Int => {
                let max = (1i64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|x| x as f32 / max))
                    .collect::<Result<Vec<_>, _>>()?
            }
        };

        let mut mono: Vec<f32> = samples
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect();

        if spec.sample_rate != target_rate {
            mono = resample_linear(&mono, spec.sample_rate, target_rate);
        }

        Ok(SampleBuffer { data: mono })
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Linear resampler, good enough for reference samples at load time.
fn resample_linear(data: &[f32], source_rate: u32, target_rate: u32) -> Vec<f32> {
    if source_rate == target_rate || data.is_empty() {
        return data.to_vec();
    }
    let ratio = target_rate as f64 / source_rate as f64;
    let out_len = (data.len() as f64 * ratio).ceil() as usize;
    let mut out = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let src_pos = i as f64 / ratio;
        let idx = src_pos.floor() as usize;
        let frac = (src_pos - idx as f64) as f32;
        if idx + 1 >= data.len() {
            out.push(*data.last().unwrap_or(&0.0));
        } else {
            out.push(data[idx] * (1.0 - frac) + data[idx + 1] * frac);
        }
    }
    out
}

/// Rate multiplier that repitches a reference sample to a target note.
pub fn playback_rate(target_midi: f32, reference_midi: i32) -> f64 {
    2.0_f64.powf((target_midi as f64 - reference_midi as f64) / 12.0)
}

/// Decoded reference samples of one sampler instrument, keyed by the MIDI
/// note each recording was pitched at.
#[derive(Debug, Clone, Default)]
pub struct SampleBank {
    samples: BTreeMap<i32, Arc<SampleBuffer>>,
}

impl SampleBank {
    /// Decode every sample in the spec. Per-file failures leave that pitch
    /// out of the bank rather than failing the whole load.
    pub fn load(spec: &SamplerSpec, target_rate: u32) -> Self {
        let mut samples = BTreeMap::new();
        for (&midi, path) in &spec.samples {
            match SampleBuffer::load_wav(path, target_rate) {
                Ok(buffer) if !buffer.is_empty() => {
                    samples.insert(midi, Arc::new(buffer));
                }
                Ok(_) => {
                    eprintln!("contrisonics: empty sample {}", path.display());
                }
                Err(e) => {
                    eprintln!("contrisonics: failed to load {}: {}", path.display(), e);
                }
            }
        }
        SampleBank { samples }
    }

    /// Build a bank from already-decoded buffers.
    pub fn from_buffers(samples: BTreeMap<i32, Arc<SampleBuffer>>) -> Self {
        SampleBank { samples }
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// The loaded sample pitched closest (in semitones) to the target.
    pub fn nearest(&self, target_midi: f32) -> Option<(i32, Arc<SampleBuffer>)> {
        self.samples
            .iter()
            .min_by(|(a, _), (b, _)| {
                let da = (**a as f32 - target_midi).abs();
                let db = (**b as f32 - target_midi).abs();
                da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(&midi, buffer)| (midi, Arc::clone(buffer)))
    }
}

/// One sounding sampled note: interpolated playback of a reference buffer
/// at a repitching rate, with a short ramp at note-off.
pub struct SamplerVoice {
    buffer: Arc<SampleBuffer>,
    pos: f64,
    rate: f64,
    gain: f32,
    hold_samples: u64,
    fade: f32,
    fade_step: f32,
    kill_step: f32,
    releasing: bool,
    finished: bool,
}

impl SamplerVoice {
    pub fn new(
        buffer: Arc<SampleBuffer>,
        rate: f64,
        velocity: f32,
        duration_secs: f32,
        sample_rate: f32,
    ) -> Self {
        let finished = buffer.is_empty();
        Self {
            buffer,
            pos: 0.0,
            rate: rate.max(0.0),
            gain: velocity.clamp(0.0, 1.0),
            hold_samples: (duration_secs.max(0.0) * sample_rate) as u64,
            fade: 1.0,
            fade_step: 1.0 / (RELEASE_RAMP_SECS * sample_rate),
            kill_step: 1.0 / (KILL_FADE_SECS * sample_rate),
            releasing: false,
            finished,
        }
    }

    /// Fast forced fade for voice stealing.
    pub fn kill(&mut self) {
        self.releasing = true;
        self.fade_step = self.fade_step.max(self.kill_step);
        self.hold_samples = 0;
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn next_sample(&mut self) -> f32 {
        if self.finished {
            return 0.0;
        }

        let data = &self.buffer.data;
        let idx = self.pos as usize;
        if idx + 1 >= data.len() {
            self.finished = true;
            return 0.0;
        }
        let frac = (self.pos - idx as f64) as f32;
        let value = data[idx] * (1.0 - frac) + data[idx + 1] * frac;

        self.pos += self.rate;

        if self.hold_samples > 0 {
            self.hold_samples -= 1;
            if self.hold_samples == 0 {
                self.releasing = true;
            }
        }

        if self.releasing {
            self.fade -= self.fade_step;
            if self.fade <= 0.0 {
                self.fade = 0.0;
                self.finished = true;
            }
        }

        value * self.gain * self.fade
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: f32 = 44100.0;

    fn bank_with(pitches: &[i32]) -> SampleBank {
        let buffers = pitches
            .iter()
            .map(|&midi| {
                (
                    midi,
                    Arc::new(SampleBuffer {
                        data: vec![0.5; 4410],
                    }),
                )
            })
            .collect();
        SampleBank::from_buffers(buffers)
    }

    #[test]
    fn test_nearest_picks_closest_semitone() {
        let bank = bank_with(&[60, 64, 67]);
        assert_eq!(bank.nearest(60.0).unwrap().0, 60);
        assert_eq!(bank.nearest(65.0).unwrap().0, 64);
        assert_eq!(bank.nearest(69.0).unwrap().0, 67);
        assert_eq!(bank.nearest(40.0).unwrap().0, 60);
    }

    #[test]
    fn test_nearest_on_empty_bank() {
        assert!(SampleBank::default().nearest(60.0).is_none());
    }

    #[test]
    fn test_playback_rate_octave() {
        assert!((playback_rate(72.0, 60) - 2.0).abs() < 1e-9);
        assert!((playback_rate(48.0, 60) - 0.5).abs() < 1e-9);
        assert!((playback_rate(60.0, 60) - 1.0).abs() < 1e-9);
        // A fifth up: 2^(7/12)
        assert!((playback_rate(67.0, 60) - 1.498307).abs() < 1e-5);
    }

    #[test]
    fn test_bank_load_tolerates_missing_files() {
        let spec = SamplerSpec {
            samples: std::collections::BTreeMap::from([
                (60, std::path::PathBuf::from("/nonexistent/c4.wav")),
                (64, std::path::PathBuf::from("/nonexistent/e4.wav")),
            ]),
        };
        let bank = SampleBank::load(&spec, 44100);
        assert!(bank.is_empty());
    }

    #[test]
    fn test_voice_ends_at_buffer_end() {
        let buffer = Arc::new(SampleBuffer {
            data: vec![0.25; 100],
        });
        // Long hold: the buffer runs out first
        let mut voice = SamplerVoice::new(buffer, 1.0, 1.0, 10.0, SAMPLE_RATE);
        let mut produced = 0;
        while !voice.is_finished() && produced < 1000 {
            voice.next_sample();
            produced += 1;
        }
        assert!(voice.is_finished());
        assert!(produced <= 100);
    }

    #[test]
    fn test_voice_release_ramp_after_hold() {
        let buffer = Arc::new(SampleBuffer {
            data: vec![0.8; 44100],
        });
        let mut voice = SamplerVoice::new(buffer, 1.0, 1.0, 0.01, SAMPLE_RATE);
        // Past hold (441 samples) plus the 8ms ramp
        for _ in 0..441 + (RELEASE_RAMP_SECS * SAMPLE_RATE) as usize + 10 {
            voice.next_sample();
        }
        assert!(voice.is_finished());
    }

    #[test]
    fn test_double_rate_consumes_twice_as_fast() {
        let buffer = Arc::new(SampleBuffer {
            data: (0..1000).map(|i| i as f32 / 1000.0).collect(),
        });
        let mut normal = SamplerVoice::new(Arc::clone(&buffer), 1.0, 1.0, 10.0, SAMPLE_RATE);
        let mut double = SamplerVoice::new(buffer, 2.0, 1.0, 10.0, SAMPLE_RATE);
        let mut normal_count = 0;
        let mut double_count = 0;
        while !normal.is_finished() {
            normal.next_sample();
            normal_count += 1;
        }
        while !double.is_finished() {
            double.next_sample();
            double_count += 1;
        }
        assert!((normal_count as f64 / double_count as f64 - 2.0).abs() < 0.1);
    }

    #[test]
    fn test_resample_linear_length() {
        let data = vec![0.0; 44100];
        let out = resample_linear(&data, 44100, 48000);
        assert_eq!(out.len(), 48000);
    }
}
