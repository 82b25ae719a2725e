use contrisonics_core::{
    bar_duration_secs, map_grid_to_music, semitone_to_freq, Grid, GridCell, MappingOptions,
};

fn cell(row: usize, col: usize, intensity: i32) -> GridCell {
    GridCell {
        date: format!("2025-W{:02}-{}", col, row),
        count: intensity.max(0) as u32 * 3,
        color: "#9be9a8".to_string(),
        intensity,
        row,
        col,
        note_index: 0,
        velocity: 0.0,
        duration: 0.0,
    }
}

fn grid(rows: usize, cols: usize) -> Grid {
    let mut cells = Vec::new();
    for col in 0..cols {
        for row in 0..rows {
            cells.push(cell(row, col, ((row * col) % 5) as i32));
        }
    }
    Grid::new(rows, cols, cells).unwrap()
}

#[test]
fn test_four_week_grid_duration_at_90_bpm() {
    // 4 bars of 4/4 at 90 BPM: 4 * (60/90) * 4 = 10.666... seconds
    let g = grid(7, 4);
    let total = g.cols as f32 * bar_duration_secs(90);
    assert!((total - 10.666_667).abs() < 1e-4, "got {}", total);
}

#[test]
fn test_mapped_fifth_lands_on_g4() {
    // A cell whose mapping yields +7 semitones from middle C plays G4
    let freq = semitone_to_freq(261.63, 7.0);
    assert!((freq - 392.00).abs() < 0.01);
}

#[test]
fn test_mapping_keeps_rests_silent() {
    let g = grid(7, 4);
    let mapped = map_grid_to_music(&g, &MappingOptions::default());
    for (before, after) in g.cells.iter().zip(mapped.cells.iter()) {
        assert_eq!(before.intensity, after.intensity);
        if !before.is_sounding() {
            assert!(!after.is_sounding());
        }
    }
}

#[test]
fn test_mapping_is_deterministic() {
    let g = grid(7, 12);
    let opts = MappingOptions::default();
    assert_eq!(map_grid_to_music(&g, &opts), map_grid_to_music(&g, &opts));
}
