//! Synth voice: oscillator pair with ADSR envelope
//!
//! One sounding synthesized note, built from an instrument recipe: a
//! primary oscillator, an optional detuned partner, optional soft-clip
//! drive and lowpass filter, all shaped by an ADSR envelope scaled by the
//! note velocity. The voice holds for its note duration, then releases.

use super::adsr::AdsrEnvelope;
use contrisonics_core::{SynthRecipe, Waveform};
use std::f32::consts::PI;

/// Chamberlin state-variable lowpass, cutoff and resonance per the recipe.
#[derive(Clone, Copy)]
struct LowpassFilter {
    f: f32,
    damp: f32,
    low: f32,
    band: f32,
}

impl LowpassFilter {
    fn new(cutoff_hz: f32, q: f32, sample_rate: f32) -> Self {
        // Tuning coefficient; cutoff is clamped away from Nyquist where the
        // state-variable form goes unstable
        let fc = cutoff_hz.min(sample_rate / 6.0);
        LowpassFilter {
            f: 2.0 * (PI * fc / sample_rate).sin(),
            damp: 1.0 / q.max(0.5),
            low: 0.0,
            band: 0.0,
        }
    }

    #[inline]
    fn process(&mut self, x: f32) -> f32 {
        self.low += self.f * self.band;
        let high = x - self.low - self.damp * self.band;
        self.band += self.f * high;
        self.low
    }
}

/// Per-note synthesizer state
pub struct SynthVoice {
    waveform: Waveform,
    phase: f32,
    phase_inc: f32,
    detune_phase: f32,
    detune_inc: f32,
    detuned: bool,
    drive: f32,
    filter: Option<LowpassFilter>,
    envelope: AdsrEnvelope,
    velocity: f32,
    hold_samples: u64,
}

impl SynthVoice {
    /// Create a voice for one note and start its envelope immediately.
    pub fn new(
        recipe: &SynthRecipe,
        freq: f32,
        velocity: f32,
        duration_secs: f32,
        sample_rate: f32,
    ) -> Self {
        let mut envelope = AdsrEnvelope::new(recipe.adsr, sample_rate);
        envelope.trigger();

        let phase_inc = freq / sample_rate;
        let detuned = recipe.detune_cents.abs() > f32::EPSILON;
        let detune_inc = phase_inc * 2.0_f32.powf(recipe.detune_cents / 1200.0);

        Self {
            waveform: recipe.osc,
            phase: 0.0,
            phase_inc,
            detune_phase: 0.0,
            detune_inc,
            detuned,
            drive: recipe.drive.max(0.0),
            filter: recipe
                .filter
                .map(|spec| LowpassFilter::new(spec.cutoff_hz, spec.q, sample_rate)),
            envelope,
            velocity: velocity.clamp(0.0, 1.0),
            hold_samples: (duration_secs.max(0.0) * sample_rate) as u64,
        }
    }

    /// Begin the release phase early (note-off before the hold elapses).
    pub fn release_now(&mut self) {
        self.envelope.release();
        self.hold_samples = 0;
    }

    /// Fast forced fade for voice stealing.
    pub fn kill(&mut self) {
        self.envelope.kill();
        self.hold_samples = 0;
    }

    /// Whether the envelope has fully faded out
    pub fn is_finished(&self) -> bool {
        self.envelope.is_finished()
    }

    /// Generate the next output sample
    pub fn next_sample(&mut self) -> f32 {
        if self.is_finished() {
            return 0.0;
        }

        let mut value = waveform_value(self.waveform, self.phase);
        self.phase += self.phase_inc;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }

        if self.detuned {
            value = 0.5 * (value + waveform_value(self.waveform, self.detune_phase));
            self.detune_phase += self.detune_inc;
            if self.detune_phase >= 1.0 {
                self.detune_phase -= 1.0;
            }
        }

        if self.drive > 0.0 {
            let g = 1.0 + 4.0 * self.drive;
            value = (value * g).tanh() / g.tanh();
        }

        if let Some(filter) = &mut self.filter {
            value = filter.process(value);
        }

        if self.hold_samples > 0 {
            self.hold_samples -= 1;
            if self.hold_samples == 0 {
                self.envelope.release();
            }
        }

        value * self.envelope.next_sample() * self.velocity
    }
}

/// Raw waveform value at a phase in [0, 1)
#[inline]
fn waveform_value(waveform: Waveform, phase: f32) -> f32 {
    match waveform {
        // Smooth, pure tone
        Waveform::Sine => (2.0 * PI * phase).sin(),
        // Bright, buzzy - all harmonics
        Waveform::Saw => 2.0 * phase - 1.0,
        // Hollow, woody - odd harmonics only
        Waveform::Square => {
            if phase < 0.5 {
                1.0
            } else {
                -1.0
            }
        }
        // Mellow, flute-like
        Waveform::Triangle => {
            if phase < 0.5 {
                4.0 * phase - 1.0
            } else {
                3.0 - 4.0 * phase
            }
        }
    }
}
