//! Instrument catalog
//!
//! Pure data definitions of the playable instruments: synth recipes
//! (oscillator, envelope, filter) and sampler specs (reference-pitch sample
//! files). The audio engine reads these; nothing here makes sound.

use std::collections::BTreeMap;
use std::path::PathBuf;

/// Polyphony cap used when a recipe does not declare its own.
pub const DEFAULT_VOICE_CAP: usize = 32;

/// MIDI note number of the base pitch (middle C). Sampler reference
/// pitches are keyed by MIDI number relative to this.
pub const BASE_MIDI: i32 = 60;

/// Available waveform types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Waveform {
    #[default]
    Sine,
    Saw,
    Square,
    Triangle,
}

impl Waveform {
    /// Parse waveform from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Waveform> {
        match s.to_lowercase().as_str() {
            "sine" | "sin" => Some(Waveform::Sine),
            "saw" | "sawtooth" => Some(Waveform::Saw),
            "square" | "sq" => Some(Waveform::Square),
            "triangle" | "tri" => Some(Waveform::Triangle),
            _ => None,
        }
    }

    /// Get display name
    pub fn name(&self) -> &'static str {
        match self {
            Waveform::Sine => "sine",
            Waveform::Saw => "saw",
            Waveform::Square => "square",
            Waveform::Triangle => "triangle",
        }
    }
}

/// ADSR envelope parameters (pure data, no sample generation)
///
/// - `attack`: Time in seconds to rise from 0 to peak (1.0)
/// - `decay`: Time in seconds to fall from peak to sustain level
/// - `sustain`: Level to hold while note is held (0.0-1.0, NOT time!)
/// - `release`: Time in seconds to fall from sustain to 0 after note-off
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AdsrParams {
    pub attack: f32,
    pub decay: f32,
    pub sustain: f32,
    pub release: f32,
}

impl AdsrParams {
    /// Create custom ADSR parameters
    pub fn new(attack: f32, decay: f32, sustain: f32, release: f32) -> Self {
        Self {
            attack: attack.max(0.001), // Minimum 1ms to avoid clicks
            decay: decay.max(0.0),
            sustain: sustain.clamp(0.0, 1.0),
            release: release.max(0.001), // Minimum 1ms to avoid clicks
        }
    }
}

impl Default for AdsrParams {
    fn default() -> Self {
        // Smooth and musical, slight attack to prevent clicks
        Self::new(0.01, 0.1, 0.7, 0.2)
    }
}

/// Lowpass filter settings for a synth recipe.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FilterSpec {
    pub cutoff_hz: f32,
    pub q: f32,
}

impl FilterSpec {
    pub fn new(cutoff_hz: f32) -> Self {
        FilterSpec {
            cutoff_hz,
            q: 0.707,
        }
    }

    pub fn with_q(cutoff_hz: f32, q: f32) -> Self {
        FilterSpec { cutoff_hz, q }
    }
}

/// How a synthesized instrument builds its voices.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SynthRecipe {
    pub osc: Waveform,
    /// Maximum simultaneous voices before the oldest is stolen
    pub voices: usize,
    /// Detune of the paired oscillator, in cents (0 = single oscillator)
    pub detune_cents: f32,
    /// Soft-clip drive amount, 0.0 = clean
    pub drive: f32,
    pub adsr: AdsrParams,
    pub filter: Option<FilterSpec>,
}

impl SynthRecipe {
    /// The recovery sound: played for any note whose sample is missing, and
    /// for sampler instruments whose preload failed entirely.
    pub fn fallback() -> Self {
        SynthRecipe {
            osc: Waveform::Triangle,
            voices: DEFAULT_VOICE_CAP,
            detune_cents: 0.0,
            drive: 0.0,
            adsr: AdsrParams::default(),
            filter: None,
        }
    }
}

/// Reference-pitch sample files for a sampler instrument, keyed by MIDI
/// note number of the recorded pitch.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SamplerSpec {
    pub samples: BTreeMap<i32, PathBuf>,
}

/// Sound-generation half of an instrument definition.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum InstrumentKind {
    Synth(SynthRecipe),
    Sampler(SamplerSpec),
}

/// Identifiers of the built-in instruments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum InstrumentId {
    Metal,
    Piano,
    Organ,
    Synth,
}

impl InstrumentId {
    pub fn from_str(s: &str) -> Option<InstrumentId> {
        match s.to_lowercase().as_str() {
            "metal" => Some(InstrumentId::Metal),
            "piano" => Some(InstrumentId::Piano),
            "organ" => Some(InstrumentId::Organ),
            "synth" => Some(InstrumentId::Synth),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            InstrumentId::Metal => "metal",
            InstrumentId::Piano => "piano",
            InstrumentId::Organ => "organ",
            InstrumentId::Synth => "synth",
        }
    }
}

/// One catalog entry: a recipe or sample set plus its mix levels.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Instrument {
    pub id: InstrumentId,
    pub label: String,
    pub kind: InstrumentKind,
    /// Level of this instrument's gain stage
    pub gain: f32,
    /// Level fed to the shared reverb
    pub reverb_send: f32,
}

impl Instrument {
    /// Polyphony cap for this instrument.
    pub fn voice_cap(&self) -> usize {
        match &self.kind {
            InstrumentKind::Synth(recipe) => recipe.voices,
            InstrumentKind::Sampler(_) => DEFAULT_VOICE_CAP,
        }
    }
}

/// Look up a single built-in instrument.
pub fn instrument(id: InstrumentId) -> Instrument {
    match id {
        InstrumentId::Metal => Instrument {
            id,
            label: "Metal".to_string(),
            kind: InstrumentKind::Synth(SynthRecipe {
                osc: Waveform::Saw,
                voices: 6,
                detune_cents: 8.0,
                drive: 0.35,
                adsr: AdsrParams::new(0.002, 0.08, 0.7, 0.15),
                filter: Some(FilterSpec::with_q(3800.0, 0.8)),
            }),
            gain: 0.85,
            reverb_send: 0.15,
        },
        InstrumentId::Piano => Instrument {
            id,
            label: "Piano".to_string(),
            kind: InstrumentKind::Sampler(SamplerSpec {
                samples: BTreeMap::from([
                    (60, PathBuf::from("samples/piano/c4.wav")),
                    (64, PathBuf::from("samples/piano/e4.wav")),
                    (67, PathBuf::from("samples/piano/g4.wav")),
                ]),
            }),
            gain: 0.9,
            reverb_send: 0.2,
        },
        InstrumentId::Organ => Instrument {
            id,
            label: "Organ".to_string(),
            kind: InstrumentKind::Synth(SynthRecipe {
                osc: Waveform::Square,
                voices: 8,
                detune_cents: 2.0,
                drive: 0.0,
                adsr: AdsrParams::new(0.005, 0.02, 0.95, 0.05),
                filter: Some(FilterSpec::new(5200.0)),
            }),
            gain: 0.8,
            reverb_send: 0.1,
        },
        InstrumentId::Synth => Instrument {
            id,
            label: "Synth Pad".to_string(),
            kind: InstrumentKind::Synth(SynthRecipe {
                osc: Waveform::Triangle,
                voices: 4,
                detune_cents: 12.0,
                drive: 0.0,
                adsr: AdsrParams::new(0.12, 0.2, 0.85, 0.6),
                filter: Some(FilterSpec::with_q(2200.0, 0.7)),
            }),
            gain: 0.75,
            reverb_send: 0.35,
        },
    }
}

/// All built-in instruments, in display order.
pub fn catalog() -> Vec<Instrument> {
    [
        InstrumentId::Metal,
        InstrumentId::Piano,
        InstrumentId::Organ,
        InstrumentId::Synth,
    ]
    .into_iter()
    .map(instrument)
    .collect()
}
