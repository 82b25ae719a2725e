//! ADSR (Attack, Decay, Sustain, Release) envelope generator
//!
//! Per-sample amplitude envelopes with exponential curves, driven by the
//! `AdsrParams` carried on an instrument recipe. Voices hold the envelope
//! at sustain for their note duration, then release toward silence.

use contrisonics_core::AdsrParams;

/// ADSR envelope stages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeStage {
    /// Not active, output is 0
    Idle,
    /// Rising from 0 to peak (1.0)
    Attack,
    /// Falling from peak to sustain level
    Decay,
    /// Holding at sustain level while the note is held
    Sustain,
    /// Falling from current level to 0 after note-off
    Release,
}

/// Per-sample ADSR envelope generator
///
/// Uses exponential target-approach curves. Envelope times are in seconds,
/// independent of the sample rate.
#[derive(Clone)]
pub struct AdsrEnvelope {
    params: AdsrParams,
    stage: EnvelopeStage,
    level: f32,

    // Pre-computed coefficients for exponential curves
    attack_coeff: f32,
    decay_coeff: f32,
    release_coeff: f32,
    kill_coeff: f32,
    killed: bool,
}

/// Forced-fade time used when a voice is stolen, in seconds.
const KILL_FADE_SECS: f32 = 0.005;

impl AdsrEnvelope {
    /// Create a new ADSR envelope with the given parameters
    pub fn new(params: AdsrParams, sample_rate: f32) -> Self {
        // Exponential envelope formula: level = level + (target - level) * coeff
        // To reach ~99.9% of target in `time` seconds:
        // coeff = 1 - exp(-6.9 / (time * sample_rate))
        // Using -6.9 because exp(-6.9) ≈ 0.001 (reaches 99.9% of target)
        let time_constant = 6.9;
        let coeff = |time: f32| {
            if time > 0.0 {
                1.0 - (-time_constant / (time * sample_rate)).exp()
            } else {
                1.0 // Instant
            }
        };

        Self {
            attack_coeff: coeff(params.attack),
            decay_coeff: coeff(params.decay),
            release_coeff: coeff(params.release),
            kill_coeff: coeff(KILL_FADE_SECS),
            params,
            stage: EnvelopeStage::Idle,
            level: 0.0,
            killed: false,
        }
    }

    /// Start the attack phase. Call when the note starts.
    pub fn trigger(&mut self) {
        self.stage = EnvelopeStage::Attack;
        // Level is not reset to 0, so retriggering during release stays smooth
    }

    /// Start the release phase. Call when the note's hold time elapses.
    pub fn release(&mut self) {
        if self.stage != EnvelopeStage::Idle {
            self.stage = EnvelopeStage::Release;
        }
    }

    /// Force a fast fade-out, used when this voice is stolen. Faster than
    /// any musical release but still a ramp, so eviction cannot click.
    pub fn kill(&mut self) {
        self.killed = true;
        if self.stage != EnvelopeStage::Idle {
            self.stage = EnvelopeStage::Release;
        }
    }

    pub fn stage(&self) -> EnvelopeStage {
        self.stage
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    /// Check if the envelope has faded out completely
    pub fn is_finished(&self) -> bool {
        self.stage == EnvelopeStage::Idle
            || (self.stage == EnvelopeStage::Release && self.level < 0.0001)
    }

    /// Generate the next amplitude value, between 0.0 and 1.0
    pub fn next_sample(&mut self) -> f32 {
        match self.stage {
            EnvelopeStage::Idle => {
                self.level = 0.0;
            }

            EnvelopeStage::Attack => {
                self.level += (1.0 - self.level) * self.attack_coeff;
                if self.level >= 0.999 {
                    self.level = 1.0;
                    self.stage = EnvelopeStage::Decay;
                }
            }

            EnvelopeStage::Decay => {
                let target = self.params.sustain;
                self.level += (target - self.level) * self.decay_coeff;
                if (self.level - target).abs() < 0.001 {
                    self.level = target;
                    self.stage = EnvelopeStage::Sustain;
                }
            }

            EnvelopeStage::Sustain => {
                // Hold until release() is called
                self.level = self.params.sustain;
            }

            EnvelopeStage::Release => {
                let coeff = if self.killed {
                    self.kill_coeff
                } else {
                    self.release_coeff
                };
                self.level += (0.0 - self.level) * coeff;
                if self.level < 0.0001 {
                    self.level = 0.0;
                    self.stage = EnvelopeStage::Idle;
                }
            }
        }

        self.level
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: f32 = 44100.0;

    fn triggered(params: AdsrParams) -> AdsrEnvelope {
        let mut env = AdsrEnvelope::new(params, SAMPLE_RATE);
        env.trigger();
        env
    }

    #[test]
    fn test_envelope_idle_start() {
        let env = AdsrEnvelope::new(AdsrParams::default(), SAMPLE_RATE);
        assert_eq!(env.stage(), EnvelopeStage::Idle);
        assert_eq!(env.level(), 0.0);
    }

    #[test]
    fn test_envelope_attack_rises() {
        let mut env = triggered(AdsrParams::new(0.01, 0.1, 0.7, 0.2));
        let initial = env.level();
        for _ in 0..100 {
            env.next_sample();
        }
        assert!(env.level() > initial, "Level should rise during attack");
    }

    #[test]
    fn test_envelope_reaches_sustain() {
        let sustain = 0.6;
        let mut env = triggered(AdsrParams::new(0.001, 0.01, sustain, 0.1));
        for _ in 0..5000 {
            env.next_sample();
        }
        assert_eq!(env.stage(), EnvelopeStage::Sustain);
        assert!((env.level() - sustain).abs() < 0.01);
    }

    #[test]
    fn test_envelope_release_falls_and_finishes() {
        let mut env = triggered(AdsrParams::new(0.001, 0.01, 0.7, 0.05));
        for _ in 0..5000 {
            env.next_sample();
        }
        env.release();
        assert_eq!(env.stage(), EnvelopeStage::Release);
        let at_release = env.level();
        for _ in 0..1000 {
            env.next_sample();
        }
        assert!(env.level() < at_release, "Level should fall during release");
        for _ in 0..10000 {
            env.next_sample();
        }
        assert!(env.is_finished());
    }

    #[test]
    fn test_release_mid_attack_is_smooth() {
        let mut env = triggered(AdsrParams::new(0.1, 0.1, 0.7, 0.1));
        for _ in 0..10 {
            env.next_sample();
        }
        let before = env.level();
        env.release();
        assert_eq!(env.stage(), EnvelopeStage::Release);
        assert!((env.level() - before).abs() < 0.01);
    }

    #[test]
    fn test_kill_fades_faster_than_release() {
        let params = AdsrParams::new(0.001, 0.01, 0.8, 1.0);
        let mut released = triggered(params);
        let mut killed = triggered(params);
        for _ in 0..5000 {
            released.next_sample();
            killed.next_sample();
        }
        released.release();
        killed.kill();
        // 10ms of samples: the killed envelope should be done, the musical
        // release (1s) barely started
        for _ in 0..441 {
            released.next_sample();
            killed.next_sample();
        }
        assert!(killed.is_finished());
        assert!(!released.is_finished());
    }

    #[test]
    fn test_output_range() {
        let mut env = triggered(AdsrParams::default());
        for i in 0..20000 {
            if i == 10000 {
                env.release();
            }
            let sample = env.next_sample();
            assert!((0.0..=1.0).contains(&sample), "Sample {} out of range", sample);
        }
    }
}
