//! Transport and lookahead scheduling
//!
//! Converts an attached grid into a flat, time-ordered note list and plays
//! it against the wall clock: a dedicated poll thread wakes every 25 ms,
//! fires every untriggered note inside a 100 ms lookahead window (handing
//! the render thread the precise remaining offset), and reports the
//! currently sounding cell to a single-slot listener. Play, pause, and
//! seek recompute each note's triggered flag against the transport
//! position, so resuming never re-fires past notes and never skips
//! upcoming ones.

use contrisonics_core::{bar_duration_secs, semitone_to_freq, CellRef, Grid};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Shortest sounding note; anything briefer is inaudible or clicks.
pub const MIN_NOTE_SECS: f32 = 0.12;
/// How far ahead of the playhead notes are handed to the render thread.
pub const DEFAULT_LOOKAHEAD_SECS: f32 = 0.1;
/// Poll cadence of the lookahead loop.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// One derived playback event.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledNote {
    /// Onset in seconds from the start of the grid
    pub time: f32,
    pub freq: f32,
    pub duration: f32,
    pub velocity: f32,
    pub cell: CellRef,
    pub triggered: bool,
}

/// Derive the full schedule from a grid.
///
/// Each column is one 4/4 bar; rows spread linearly across the bar window
/// so a dense column plays as a run instead of a single cluster. Rests are
/// dropped, durations are floored, and the result is sorted ascending by
/// onset (stable, so grid-traversal order breaks ties).
pub fn build_schedule(grid: &Grid, bpm: u32, base_hz: f32) -> Vec<ScheduledNote> {
    let bar = bar_duration_secs(bpm);
    let mut notes: Vec<ScheduledNote> = grid
        .cells
        .iter()
        .filter(|cell| cell.is_sounding())
        .map(|cell| ScheduledNote {
            time: cell.col as f32 * bar + (cell.row as f32 / grid.rows as f32) * bar,
            freq: semitone_to_freq(base_hz, cell.note_index as f32),
            duration: cell.duration.max(MIN_NOTE_SECS),
            velocity: cell.velocity,
            cell: CellRef::new(cell.row, cell.col),
            triggered: false,
        })
        .collect();
    notes.sort_by(|a, b| a.time.partial_cmp(&b.time).unwrap_or(std::cmp::Ordering::Equal));
    notes
}

/// Callback invoked when the currently sounding cell changes.
pub type CellListener = Box<dyn Fn(Option<CellRef>) + Send + 'static>;

/// Fires one due note: receives the note and the seconds remaining until
/// its exact onset.
pub type NoteFirer = Arc<dyn Fn(&ScheduledNote, f32) + Send + Sync + 'static>;

struct TransportState {
    playing: bool,
    /// Transport position while not playing; the position the clock anchor
    /// maps to while playing
    start_at_pos: f32,
    anchor: Option<Instant>,
    total: f32,
}

struct PollHandle {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Play/pause/seek state machine plus the lookahead poll loop.
pub struct Transport {
    state: Arc<Mutex<TransportState>>,
    schedule: Arc<Mutex<Vec<ScheduledNote>>>,
    listener: Arc<Mutex<Option<CellListener>>>,
    lookahead: f32,
    poll_interval: Duration,
    poll: Option<PollHandle>,
}

impl Transport {
    pub fn new(lookahead: f32, poll_interval: Duration) -> Self {
        Transport {
            state: Arc::new(Mutex::new(TransportState {
                playing: false,
                start_at_pos: 0.0,
                anchor: None,
                total: 0.0,
            })),
            schedule: Arc::new(Mutex::new(Vec::new())),
            listener: Arc::new(Mutex::new(None)),
            lookahead,
            poll_interval,
            poll: None,
        }
    }

    /// Replace the schedule. Existing triggered flags are discarded; play
    /// and seek recompute them.
    pub fn set_schedule(&self, notes: Vec<ScheduledNote>) {
        *self.schedule.lock().unwrap() = notes;
    }

    pub fn clear_schedule(&self) {
        self.schedule.lock().unwrap().clear();
    }

    pub fn has_schedule(&self) -> bool {
        !self.schedule.lock().unwrap().is_empty()
    }

    pub fn schedule_len(&self) -> usize {
        self.schedule.lock().unwrap().len()
    }

    pub fn set_listener(&self, listener: Option<CellListener>) {
        *self.listener.lock().unwrap() = listener;
    }

    fn notify(listener: &Arc<Mutex<Option<CellListener>>>, cell: Option<CellRef>) {
        if let Some(callback) = listener.lock().unwrap().as_ref() {
            callback(cell);
        }
    }

    /// Start (or restart) playback from the current position.
    ///
    /// Any previous poll loop is fully torn down before the new one starts,
    /// so two loops can never double-fire a note.
    pub fn play(&mut self, total: f32, firer: NoteFirer) {
        self.teardown_poll();

        {
            let mut state = self.state.lock().unwrap();
            state.playing = true;
            state.total = total;
            state.anchor = Some(Instant::now());
            let position = state.start_at_pos;
            let mut schedule = self.schedule.lock().unwrap();
            for note in schedule.iter_mut() {
                note.triggered = note.time < position;
            }
        }

        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = stop.clone();
        let state = self.state.clone();
        let schedule = self.schedule.clone();
        let listener = self.listener.clone();
        let lookahead = self.lookahead;
        let poll_interval = self.poll_interval;

        let handle = thread::spawn(move || {
            loop {
                if thread_stop.load(Ordering::Relaxed) {
                    break;
                }

                let (now_pos, total) = {
                    let state = state.lock().unwrap();
                    if !state.playing {
                        break;
                    }
                    let elapsed = state
                        .anchor
                        .map(|anchor| anchor.elapsed().as_secs_f32())
                        .unwrap_or(0.0);
                    (elapsed + state.start_at_pos, state.total)
                };

                if now_pos >= total {
                    // End of the grid: behave like stop()
                    {
                        let mut state = state.lock().unwrap();
                        state.playing = false;
                        state.start_at_pos = 0.0;
                        state.anchor = None;
                    }
                    Self::notify(&listener, None);
                    break;
                }

                let horizon = now_pos + lookahead;
                let mut due = Vec::new();
                {
                    let mut schedule = schedule.lock().unwrap();
                    for note in schedule.iter_mut() {
                        if !note.triggered && note.time >= now_pos && note.time < horizon {
                            note.triggered = true;
                            due.push(note.clone());
                        }
                    }
                }
                // Callbacks run outside the locks; `due` is already in
                // ascending onset order
                for note in &due {
                    firer(note, (note.time - now_pos).max(0.0));
                    Self::notify(&listener, Some(note.cell));
                }

                thread::sleep(poll_interval);
            }
        });

        self.poll = Some(PollHandle { stop, handle });
    }

    /// Halt future scheduling, keeping the position. Voices already handed
    /// to the render thread ring out on their own.
    pub fn pause(&mut self) {
        self.teardown_poll();
        let mut state = self.state.lock().unwrap();
        if state.playing {
            let elapsed = state
                .anchor
                .map(|anchor| anchor.elapsed().as_secs_f32())
                .unwrap_or(0.0);
            state.start_at_pos += elapsed;
            state.playing = false;
            state.anchor = None;
        }
    }

    /// Pause and rewind to the start.
    pub fn stop(&mut self) {
        self.pause();
        self.state.lock().unwrap().start_at_pos = 0.0;
        Self::notify(&self.listener, None);
    }

    /// Move the (non-playing) transport position and recompute which notes
    /// count as already played.
    pub fn set_position(&self, position: f32) {
        let mut state = self.state.lock().unwrap();
        state.start_at_pos = position;
        let mut schedule = self.schedule.lock().unwrap();
        for note in schedule.iter_mut() {
            note.triggered = note.time < position;
        }
    }

    pub fn position(&self) -> f32 {
        let state = self.state.lock().unwrap();
        if state.playing {
            let elapsed = state
                .anchor
                .map(|anchor| anchor.elapsed().as_secs_f32())
                .unwrap_or(0.0);
            elapsed + state.start_at_pos
        } else {
            state.start_at_pos
        }
    }

    pub fn is_playing(&self) -> bool {
        self.state.lock().unwrap().playing
    }

    fn teardown_poll(&mut self) {
        if let Some(poll) = self.poll.take() {
            poll.stop.store(true, Ordering::Relaxed);
            let _ = poll.handle.join();
        }
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.teardown_poll();
    }
}
