//! # ContriSonics Core
//!
//! WASM-compatible core library for ContriSonics. Provides the contribution
//! grid model, pitch/time mapping, and the instrument catalog without any
//! audio or hardware dependencies.
//!
//! ## Features
//!
//! - **serde**: Enable JSON serialization for web interop
//!
//! ## Example
//!
//! ```ignore
//! use contrisonics_core::{map_grid_to_music, Grid, MappingOptions};
//!
//! let grid = Grid::new(7, 52, cells)?;
//! let playable = map_grid_to_music(&grid, &MappingOptions::default());
//! ```

pub mod grid;
pub mod instrument;
pub mod mapping;

// Re-export commonly used types
pub use grid::{CellRef, Grid, GridCell};
pub use instrument::{
    catalog, instrument, AdsrParams, FilterSpec, Instrument, InstrumentId, InstrumentKind,
    SamplerSpec, SynthRecipe, Waveform, BASE_MIDI, DEFAULT_VOICE_CAP,
};
pub use mapping::{
    bar_duration_secs, freq_to_semitone, map_grid_to_music, semitone_to_freq, MappingOptions,
    DEFAULT_BASE_HZ, PENTATONIC,
};
