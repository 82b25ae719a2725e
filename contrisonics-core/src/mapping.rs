//! Pitch and time mapping
//!
//! Pure conversions between musical and physical units: equal-tempered
//! semitone offsets to frequencies, BPM to bar lengths, plus the scale
//! mapping that turns raw intensity buckets into playable notes.

use crate::grid::Grid;

/// Pentatonic scale degrees, in semitones relative to the root.
pub const PENTATONIC: [i32; 5] = [0, 2, 4, 7, 9];

/// Middle C, the default base pitch.
pub const DEFAULT_BASE_HZ: f32 = 261.63;

/// Equal-tempered frequency for a semitone offset from a base pitch.
pub fn semitone_to_freq(base_hz: f32, semis: f32) -> f32 {
    base_hz * 2.0_f32.powf(semis / 12.0)
}

/// Semitone offset (from a base pitch) of a frequency. Inverse of
/// [`semitone_to_freq`]; used for nearest-sample selection.
pub fn freq_to_semitone(base_hz: f32, freq: f32) -> f32 {
    12.0 * (freq / base_hz).log2()
}

/// Length in seconds of one 4/4 bar at the given tempo.
///
/// Each grid column occupies exactly one bar; rows are spread linearly
/// within that window.
pub fn bar_duration_secs(bpm: u32) -> f32 {
    (60.0 / bpm as f32) * 4.0
}

/// Options for [`map_grid_to_music`].
#[derive(Debug, Clone)]
pub struct MappingOptions {
    /// Frequency of the scale root (default middle C)
    pub key_root_hz: f32,
    /// Scale degrees as semitone offsets
    pub scale: Vec<i32>,
    /// Tempo used to size note durations
    pub bpm: u32,
}

impl Default for MappingOptions {
    fn default() -> Self {
        MappingOptions {
            key_root_hz: DEFAULT_BASE_HZ,
            scale: PENTATONIC.to_vec(),
            bpm: 90,
        }
    }
}

/// Fill in the musical fields of a grid from its intensity buckets.
///
/// Weekday (row) picks the scale degree, intensity 4 bumps the note up an
/// octave, velocity grows with intensity, and every note gets a 16th-note
/// duration at the mapping tempo. Rests keep their cells but stay silent.
pub fn map_grid_to_music(grid: &Grid, opts: &MappingOptions) -> Grid {
    let scale = if opts.scale.is_empty() {
        PENTATONIC.to_vec()
    } else {
        opts.scale.clone()
    };

    let cells = grid
        .cells
        .iter()
        .map(|cell| {
            let degree = cell.row % scale.len();
            let octave_bump = if cell.intensity >= 4 { 12 } else { 0 };
            let mut mapped = cell.clone();
            mapped.note_index = scale[degree] + octave_bump;
            mapped.velocity = (cell.intensity as f32 / 4.0 + 0.2).clamp(0.2, 1.0);
            mapped.duration = 0.25 * (60.0 / opts.bpm as f32);
            mapped
        })
        .collect();

    Grid {
        rows: grid.rows,
        cols: grid.cols,
        cells,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::GridCell;

    #[test]
    fn test_semitone_to_freq_perfect_fifth() {
        // G4 is 7 semitones above middle C
        let g4 = semitone_to_freq(261.63, 7.0);
        assert!((g4 - 392.00).abs() < 0.01, "got {}", g4);
    }

    #[test]
    fn test_semitone_to_freq_octaves() {
        assert!((semitone_to_freq(440.0, 12.0) - 880.0).abs() < 0.01);
        assert!((semitone_to_freq(440.0, -12.0) - 220.0).abs() < 0.01);
        assert!((semitone_to_freq(440.0, 0.0) - 440.0).abs() < 0.001);
    }

    #[test]
    fn test_freq_to_semitone_roundtrip() {
        for semis in [-24.0, -7.0, 0.0, 3.0, 7.0, 19.0] {
            let freq = semitone_to_freq(261.63, semis);
            let back = freq_to_semitone(261.63, freq);
            assert!((back - semis).abs() < 0.001, "{} -> {} -> {}", semis, freq, back);
        }
    }

    #[test]
    fn test_bar_duration() {
        // One 4/4 bar at 60 BPM is four seconds
        assert!((bar_duration_secs(60) - 4.0).abs() < f32::EPSILON);
        assert!((bar_duration_secs(120) - 2.0).abs() < f32::EPSILON);
        // 90 BPM: 8/3 seconds
        assert!((bar_duration_secs(90) - 8.0 / 3.0).abs() < 1e-6);
    }

    fn raw_cell(row: usize, intensity: i32) -> GridCell {
        GridCell {
            date: "2025-06-01".to_string(),
            count: intensity.max(0) as u32,
            color: "#40c463".to_string(),
            intensity,
            row,
            col: 0,
            note_index: 0,
            velocity: 0.0,
            duration: 0.0,
        }
    }

    #[test]
    fn test_mapping_octave_bump_at_max_intensity() {
        let grid = Grid::new(2, 1, vec![raw_cell(0, 3), raw_cell(1, 4)]).unwrap();
        let mapped = map_grid_to_music(&grid, &MappingOptions::default());
        // Row 0 -> degree 0, no bump
        assert_eq!(mapped.cells[0].note_index, 0);
        // Row 1 -> degree 1 (2 semis) plus the octave bump
        assert_eq!(mapped.cells[1].note_index, 2 + 12);
    }

    #[test]
    fn test_mapping_velocity_clamped() {
        let grid = Grid::new(2, 1, vec![raw_cell(0, 0), raw_cell(1, 4)]).unwrap();
        let mapped = map_grid_to_music(&grid, &MappingOptions::default());
        assert!((mapped.cells[0].velocity - 0.2).abs() < 1e-6);
        assert!((mapped.cells[1].velocity - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_mapping_duration_is_sixteenth() {
        let grid = Grid::new(1, 1, vec![raw_cell(0, 2)]).unwrap();
        let opts = MappingOptions {
            bpm: 120,
            ..Default::default()
        };
        let mapped = map_grid_to_music(&grid, &opts);
        assert!((mapped.cells[0].duration - 0.125).abs() < 1e-6);
    }

    #[test]
    fn test_mapping_preserves_dimensions() {
        let cells = (0..7).map(|r| raw_cell(r, 1)).collect();
        let grid = Grid::new(7, 1, cells).unwrap();
        let mapped = map_grid_to_music(&grid, &MappingOptions::default());
        assert_eq!(mapped.rows, 7);
        assert_eq!(mapped.cols, 1);
        assert_eq!(mapped.cells.len(), 7);
    }
}
