//! # ContriSonics
//!
//! ContriSonics turns a calendar grid of daily activity counts into a
//! playable musical sequence. This crate is the audio engine behind that:
//! it converts a grid of musical events into precisely timed sound,
//! supports transport control (play/pause/seek/skip), live instrument
//! switching without clicks, and per-cell preview on hover, while a visual
//! layer polls it for playhead position.
//!
//! The pure data side (grid model, pitch mapping, instrument catalog)
//! lives in `contrisonics-core`; this crate adds the parts that touch
//! hardware and time.
//!
//! ## Modules
//!
//! - `audio::engine`: the `AudioEngine` facade the UI layer owns.
//! - `audio::scheduler`: schedule derivation and the lookahead transport.
//! - `audio::mixer`: the render core and cpal output stream.
//! - `audio::voice`, `audio::oscillator`, `audio::sampler`, `audio::adsr`:
//!   voice lifecycle and sound generation.
//!
//! ## Example
//!
//! ```ignore
//! use contrisonics::{AudioEngine, EngineConfig};
//! use contrisonics_core::{map_grid_to_music, MappingOptions};
//!
//! let mut engine = AudioEngine::new(EngineConfig::default());
//! engine.attach_grid(map_grid_to_music(&grid, &MappingOptions::default()));
//! engine.play();
//! ```

pub mod audio;

// Re-export commonly used types and functions for convenience
pub use audio::engine::{AudioEngine, EngineConfig};
pub use contrisonics_core::{
    bar_duration_secs, catalog, map_grid_to_music, semitone_to_freq, CellRef, Grid, GridCell,
    Instrument, InstrumentId, MappingOptions,
};
