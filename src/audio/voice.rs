//! Voice lifecycle: spawn, steal, auto-remove
//!
//! `VoiceSpec` is a fully resolved description of one note, built outside
//! the audio callback (instrument lookup, sample selection, fallback) so
//! the render thread never touches locks or the filesystem. `VoicePool`
//! owns the sounding voices, enforces the per-instrument polyphony cap
//! with oldest-voice stealing, and drops voices when they fade out.

use super::oscillator::SynthVoice;
use super::sampler::{playback_rate, SampleBank, SampleBuffer, SamplerVoice};
use contrisonics_core::{freq_to_semitone, Instrument, InstrumentKind, SynthRecipe, BASE_MIDI};
use std::sync::Arc;

/// Everything the render thread needs to start one note.
#[derive(Clone)]
pub enum VoiceSpec {
    Synth {
        recipe: SynthRecipe,
        freq: f32,
        velocity: f32,
        duration: f32,
    },
    Sample {
        buffer: Arc<SampleBuffer>,
        rate: f64,
        velocity: f32,
        duration: f32,
    },
}

/// Resolve an instrument and note into a spawnable spec.
///
/// A sampler note picks the loaded reference sample nearest in semitones
/// and repitches it; a missing bank or pitch falls back to the default
/// synth recipe, so every scheduled note is audible in some form.
pub fn resolve_voice(
    instrument: &Instrument,
    bank: Option<&SampleBank>,
    base_hz: f32,
    freq: f32,
    velocity: f32,
    duration: f32,
) -> VoiceSpec {
    match &instrument.kind {
        InstrumentKind::Synth(recipe) => VoiceSpec::Synth {
            recipe: *recipe,
            freq,
            velocity,
            duration,
        },
        InstrumentKind::Sampler(_) => {
            let target_midi = BASE_MIDI as f32 + freq_to_semitone(base_hz, freq);
            match bank.and_then(|b| b.nearest(target_midi)) {
                Some((reference_midi, buffer)) => VoiceSpec::Sample {
                    buffer,
                    rate: playback_rate(target_midi, reference_midi),
                    velocity,
                    duration,
                },
                None => VoiceSpec::Synth {
                    recipe: SynthRecipe::fallback(),
                    freq,
                    velocity,
                    duration,
                },
            }
        }
    }
}

enum VoiceKind {
    Synth(SynthVoice),
    Sample(SamplerVoice),
}

/// One sounding note in the pool.
pub struct Voice {
    kind: VoiceKind,
    /// Crossfade lane (instrument generation) this voice renders into
    pub lane: u64,
    /// Absolute sample-clock time the note starts
    start_at: u64,
    /// Spawn order, for FIFO stealing
    seq: u64,
    stolen: bool,
}

impl Voice {
    fn from_spec(spec: VoiceSpec, lane: u64, start_at: u64, seq: u64, sample_rate: f32) -> Self {
        let kind = match spec {
            VoiceSpec::Synth {
                recipe,
                freq,
                velocity,
                duration,
            } => VoiceKind::Synth(SynthVoice::new(&recipe, freq, velocity, duration, sample_rate)),
            VoiceSpec::Sample {
                buffer,
                rate,
                velocity,
                duration,
            } => VoiceKind::Sample(SamplerVoice::new(buffer, rate, velocity, duration, sample_rate)),
        };
        Voice {
            kind,
            lane,
            start_at,
            seq,
            stolen: false,
        }
    }

    fn kill(&mut self) {
        self.stolen = true;
        match &mut self.kind {
            VoiceKind::Synth(v) => v.kill(),
            VoiceKind::Sample(v) => v.kill(),
        }
    }

    pub fn is_finished(&self) -> bool {
        match &self.kind {
            VoiceKind::Synth(v) => v.is_finished(),
            VoiceKind::Sample(v) => v.is_finished(),
        }
    }

    /// Next sample at the given clock time; silent until `start_at`.
    #[inline]
    fn render_at(&mut self, clock: u64) -> f32 {
        if clock < self.start_at {
            return 0.0;
        }
        match &mut self.kind {
            VoiceKind::Synth(v) => v.next_sample(),
            VoiceKind::Sample(v) => v.next_sample(),
        }
    }
}

/// The set of sounding voices.
#[derive(Default)]
pub struct VoicePool {
    voices: Vec<Voice>,
    next_seq: u64,
}

impl VoicePool {
    pub fn new() -> Self {
        VoicePool::default()
    }

    /// Start a voice, stealing the oldest voice of the same lane first if
    /// the polyphony cap would be exceeded.
    pub fn spawn(
        &mut self,
        spec: VoiceSpec,
        lane: u64,
        start_at: u64,
        cap: usize,
        sample_rate: f32,
    ) {
        let cap = cap.max(1);
        while self.active_in_lane(lane) >= cap {
            let oldest = self
                .voices
                .iter_mut()
                .filter(|v| v.lane == lane && !v.stolen && !v.is_finished())
                .min_by_key(|v| v.seq);
            match oldest {
                Some(victim) => victim.kill(),
                None => break,
            }
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.voices
            .push(Voice::from_spec(spec, lane, start_at, seq, sample_rate));
    }

    /// Voices in a lane that count against the polyphony cap.
    pub fn active_in_lane(&self, lane: u64) -> usize {
        self.voices
            .iter()
            .filter(|v| v.lane == lane && !v.stolen && !v.is_finished())
            .count()
    }

    pub fn len(&self) -> usize {
        self.voices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }

    /// Sum of all voices at one clock tick, each weighted by its lane gain.
    #[inline]
    pub fn render_sample(&mut self, clock: u64, lane_gain: impl Fn(u64) -> f32) -> f32 {
        let mut sum = 0.0;
        for voice in &mut self.voices {
            let s = voice.render_at(clock);
            if s != 0.0 {
                sum += s * lane_gain(voice.lane);
            }
        }
        sum
    }

    /// Drop voices that have fully faded out.
    pub fn sweep(&mut self) {
        self.voices.retain(|v| !v.is_finished());
    }

    /// Drop every voice belonging to a lane (used when a faded-out
    /// crossfade lane is torn down).
    pub fn drop_lane(&mut self, lane: u64) {
        self.voices.retain(|v| v.lane != lane);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contrisonics_core::{instrument, AdsrParams, InstrumentId, Waveform};
    use std::collections::BTreeMap;

    const SAMPLE_RATE: f32 = 44100.0;

    fn spec(duration: f32) -> VoiceSpec {
        VoiceSpec::Synth {
            recipe: SynthRecipe {
                osc: Waveform::Sine,
                voices: 4,
                detune_cents: 0.0,
                drive: 0.0,
                adsr: AdsrParams::new(0.001, 0.01, 0.8, 0.02),
                filter: None,
            },
            freq: 440.0,
            velocity: 0.8,
            duration,
        }
    }

    #[test]
    fn test_cap_steals_oldest_first() {
        let mut pool = VoicePool::new();
        for _ in 0..4 {
            pool.spawn(spec(5.0), 0, 0, 4, SAMPLE_RATE);
        }
        assert_eq!(pool.active_in_lane(0), 4);

        pool.spawn(spec(5.0), 0, 0, 4, SAMPLE_RATE);
        // Cap held: one voice was stolen, the new one is in
        assert_eq!(pool.active_in_lane(0), 4);
        assert_eq!(pool.len(), 5);
        // The stolen voice is the oldest (seq 0)
        let stolen: Vec<u64> = pool
            .voices
            .iter()
            .filter(|v| v.stolen)
            .map(|v| v.seq)
            .collect();
        assert_eq!(stolen, vec![0]);
    }

    #[test]
    fn test_stolen_voice_fades_and_sweeps() {
        let mut pool = VoicePool::new();
        for _ in 0..5 {
            pool.spawn(spec(5.0), 0, 0, 4, SAMPLE_RATE);
        }
        // Render well past the 5ms kill fade
        for clock in 0..(SAMPLE_RATE * 0.05) as u64 {
            pool.render_sample(clock, |_| 1.0);
        }
        pool.sweep();
        assert_eq!(pool.len(), 4);
    }

    #[test]
    fn test_caps_are_per_lane() {
        let mut pool = VoicePool::new();
        for _ in 0..3 {
            pool.spawn(spec(5.0), 0, 0, 4, SAMPLE_RATE);
            pool.spawn(spec(5.0), 1, 0, 4, SAMPLE_RATE);
        }
        assert_eq!(pool.active_in_lane(0), 3);
        assert_eq!(pool.active_in_lane(1), 3);
        assert_eq!(pool.len(), 6);
    }

    #[test]
    fn test_voice_waits_for_start_time() {
        let mut pool = VoicePool::new();
        pool.spawn(spec(1.0), 0, 1000, 4, SAMPLE_RATE);
        assert_eq!(pool.render_sample(0, |_| 1.0), 0.0);
        assert_eq!(pool.render_sample(999, |_| 1.0), 0.0);
        // After the start time the envelope opens
        let mut heard = false;
        for clock in 1000..2000 {
            if pool.render_sample(clock, |_| 1.0).abs() > 0.0 {
                heard = true;
                break;
            }
        }
        assert!(heard);
    }

    #[test]
    fn test_finished_voices_removed_on_sweep() {
        let mut pool = VoicePool::new();
        pool.spawn(spec(0.02), 0, 0, 4, SAMPLE_RATE);
        for clock in 0..(SAMPLE_RATE * 0.2) as u64 {
            pool.render_sample(clock, |_| 1.0);
        }
        pool.sweep();
        assert!(pool.is_empty());
    }

    #[test]
    fn test_drop_lane_clears_voices() {
        let mut pool = VoicePool::new();
        pool.spawn(spec(5.0), 0, 0, 4, SAMPLE_RATE);
        pool.spawn(spec(5.0), 1, 0, 4, SAMPLE_RATE);
        pool.drop_lane(0);
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.active_in_lane(0), 0);
        assert_eq!(pool.active_in_lane(1), 1);
    }

    #[test]
    fn test_resolve_synth_uses_recipe() {
        let metal = instrument(InstrumentId::Metal);
        let v = resolve_voice(&metal, None, 261.63, 392.0, 0.6, 0.3);
        match v {
            VoiceSpec::Synth { recipe, freq, .. } => {
                assert_eq!(recipe.osc, Waveform::Saw);
                assert!((freq - 392.0).abs() < 1e-3);
            }
            _ => panic!("expected synth spec"),
        }
    }

    #[test]
    fn test_resolve_sampler_missing_bank_falls_back() {
        let piano = instrument(InstrumentId::Piano);
        let v = resolve_voice(&piano, None, 261.63, 392.0, 0.6, 0.3);
        match v {
            VoiceSpec::Synth { recipe, .. } => {
                assert_eq!(recipe, SynthRecipe::fallback());
            }
            _ => panic!("expected fallback synth spec"),
        }
    }

    #[test]
    fn test_resolve_sampler_picks_nearest_and_rate() {
        let piano = instrument(InstrumentId::Piano);
        let bank = SampleBank::from_buffers(BTreeMap::from([(
            60,
            Arc::new(SampleBuffer {
                data: vec![0.1; 1000],
            }),
        )]));
        // G4 = +7 semitones from middle C
        let freq = contrisonics_core::semitone_to_freq(261.63, 7.0);
        let v = resolve_voice(&piano, Some(&bank), 261.63, freq, 0.6, 0.3);
        match v {
            VoiceSpec::Sample { rate, .. } => {
                assert!((rate - 2.0_f64.powf(7.0 / 12.0)).abs() < 1e-4);
            }
            _ => panic!("expected sample spec"),
        }
    }
}
