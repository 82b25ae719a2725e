//! Engine facade
//!
//! `AudioEngine` is the single owned entry point the UI layer talks to: it
//! composes the transport, the render core, and the instrument state, and
//! exposes the public surface of the player: attach a grid, transport
//! control, hover previews, live instrument switching, and the active-cell
//! notification slot.

use super::mixer::{AudioOutput, MixerCommand, CROSSFADE_SECS};
use super::sampler::SampleBank;
use super::scheduler::{
    build_schedule, CellListener, NoteFirer, Transport, DEFAULT_LOOKAHEAD_SECS,
    DEFAULT_POLL_INTERVAL, MIN_NOTE_SECS,
};
use super::voice::resolve_voice;
use contrisonics_core::{
    bar_duration_secs, instrument as catalog_instrument, Grid, Instrument, InstrumentId,
    InstrumentKind, DEFAULT_BASE_HZ,
};
use crossbeam_channel::Sender;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Sample rate assumed for decode work when no output device exists.
const FALLBACK_SAMPLE_RATE: u32 = 44100;

/// Engine construction options.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub bpm: u32,
    pub base_hz: f32,
    pub master_gain: f32,
    pub instrument: InstrumentId,
    pub lookahead_secs: f32,
    pub poll_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            bpm: 90,
            base_hz: DEFAULT_BASE_HZ,
            master_gain: 0.8,
            instrument: InstrumentId::Piano,
            lookahead_secs: DEFAULT_LOOKAHEAD_SECS,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// The committed instrument: its definition plus any decoded sample bank.
struct ActiveInstrument {
    instrument: Instrument,
    bank: Option<Arc<SampleBank>>,
}

/// The playback engine. One instance per session; all methods are meant to
/// be called from the same logical thread.
pub struct AudioEngine {
    bpm: u32,
    base_hz: f32,
    grid: Option<Grid>,
    transport: Transport,
    output: Option<AudioOutput>,
    active: Arc<Mutex<ActiveInstrument>>,
    /// Bumped on every swap request so a stale preload cannot overwrite a
    /// newer one
    swap_epoch: Arc<AtomicU64>,
}

impl AudioEngine {
    /// Build an engine. A missing audio device is not an error: the
    /// transport still runs and every play/preview call is a safe no-op
    /// sound-wise.
    pub fn new(config: EngineConfig) -> Self {
        let instrument = catalog_instrument(config.instrument);
        let output = match AudioOutput::try_new(
            config.master_gain,
            instrument.gain,
            instrument.reverb_send,
        ) {
            Ok(output) => Some(output),
            Err(e) => {
                eprintln!("contrisonics: audio output unavailable: {}", e);
                None
            }
        };

        let engine = AudioEngine {
            bpm: config.bpm.max(1),
            base_hz: config.base_hz,
            grid: None,
            transport: Transport::new(config.lookahead_secs, config.poll_interval),
            output,
            active: Arc::new(Mutex::new(ActiveInstrument {
                instrument: instrument.clone(),
                bank: None,
            })),
            swap_epoch: Arc::new(AtomicU64::new(0)),
        };
        engine.preload(instrument, false);
        engine
    }

    // ── Grid and schedule ────────────────────────────────────────────

    /// Attach a new grid, resetting schedule, position, and active cell.
    pub fn attach_grid(&mut self, grid: Grid) {
        self.transport.stop();
        self.transport.clear_schedule();
        self.grid = Some(grid);
    }

    /// Derive the schedule from the attached grid. Safe to call
    /// redundantly; a rebuild keeps notes behind the current position
    /// marked as already played.
    pub fn prepare_schedule(&mut self) {
        let grid = match &self.grid {
            Some(grid) => grid,
            None => return,
        };
        let position = self.transport.position();
        self.transport
            .set_schedule(build_schedule(grid, self.bpm, self.base_hz));
        if !self.transport.is_playing() {
            self.transport.set_position(position);
        }
    }

    /// Number of notes in the derived schedule.
    pub fn scheduled_note_count(&self) -> usize {
        self.transport.schedule_len()
    }

    // ── Transport ────────────────────────────────────────────────────

    /// Start playback from the current position. No-op without a grid.
    pub fn play(&mut self) {
        if self.grid.is_none() || self.transport.is_playing() {
            return;
        }
        if !self.transport.has_schedule() {
            self.prepare_schedule();
        }
        if let Some(output) = &self.output {
            if let Err(e) = output.resume() {
                eprintln!("contrisonics: could not resume output: {}", e);
            }
        }
        let total = self.total_duration_secs();
        let firer = self.make_firer();
        self.transport.play(total, firer);
    }

    /// Halt future scheduling; in-flight voices ring out naturally.
    pub fn pause(&mut self) {
        self.transport.pause();
    }

    /// Pause and rewind to the start.
    pub fn stop(&mut self) {
        self.transport.stop();
    }

    /// Jump to a position in seconds, clamped to the grid length. While
    /// playing this restarts the poll loop cleanly from the new position.
    pub fn seek_to(&mut self, seconds: f32) {
        let clamped = seconds.clamp(0.0, self.total_duration_secs());
        let was_playing = self.transport.is_playing();
        if was_playing {
            self.transport.pause();
        }
        self.transport.set_position(clamped);
        if was_playing {
            self.play();
        }
    }

    /// Seek relative to the current position.
    pub fn skip(&mut self, delta_seconds: f32) {
        self.seek_to(self.position_secs() + delta_seconds);
    }

    pub fn is_playing(&self) -> bool {
        self.transport.is_playing()
    }

    /// Current playhead position in seconds.
    pub fn position_secs(&self) -> f32 {
        self.transport.position()
    }

    /// Length of the attached grid in seconds; 0 without a grid.
    pub fn total_duration_secs(&self) -> f32 {
        match &self.grid {
            Some(grid) => grid.cols as f32 * bar_duration_secs(self.bpm),
            None => 0.0,
        }
    }

    // ── Musical parameters ───────────────────────────────────────────

    pub fn bpm(&self) -> u32 {
        self.bpm
    }

    /// Change the tempo. The schedule is rebuilt in full, so notes that
    /// were already in flight toward the lookahead window can shift
    /// audibly; a known discontinuity of the full-rebuild approach.
    pub fn set_bpm(&mut self, bpm: u32) {
        self.bpm = bpm.max(1);
        self.rebuild_keeping_position();
    }

    pub fn base_hz(&self) -> f32 {
        self.base_hz
    }

    /// Change the base pitch; rebuilds the schedule like a tempo change.
    pub fn set_base_hz(&mut self, base_hz: f32) {
        self.base_hz = base_hz;
        self.rebuild_keeping_position();
    }

    fn rebuild_keeping_position(&mut self) {
        if self.grid.is_none() || !self.transport.has_schedule() {
            return;
        }
        let was_playing = self.transport.is_playing();
        let position = self.transport.position();
        if was_playing {
            self.transport.pause();
        }
        self.prepare_schedule();
        self.transport
            .set_position(position.min(self.total_duration_secs()));
        if was_playing {
            self.play();
        }
    }

    // ── Instruments ──────────────────────────────────────────────────

    /// Id of the committed instrument (a swap in flight commits later).
    pub fn current_instrument(&self) -> InstrumentId {
        self.active.lock().unwrap().instrument.id
    }

    /// Switch instruments. Sample banks preload on a background thread;
    /// transport stays usable against the previous instrument until the
    /// swap commits with a crossfade. A failed preload still commits, with
    /// unresolved pitches falling back to the synth recipe.
    pub fn set_instrument(&mut self, id: InstrumentId) {
        self.preload(catalog_instrument(id), true);
    }

    fn preload(&self, instrument: Instrument, crossfade: bool) {
        let epoch = self.swap_epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let swap_epoch = self.swap_epoch.clone();
        let active = self.active.clone();
        let sender = self.command_sender();
        let sample_rate = self
            .output
            .as_ref()
            .map(|o| o.sample_rate())
            .unwrap_or(FALLBACK_SAMPLE_RATE);

        thread::spawn(move || {
            let bank = match &instrument.kind {
                InstrumentKind::Sampler(spec) => Some(Arc::new(SampleBank::load(spec, sample_rate))),
                InstrumentKind::Synth(_) => None,
            };
            // A newer swap superseded this one while we were loading
            if swap_epoch.load(Ordering::SeqCst) != epoch {
                return;
            }
            {
                let mut active = active.lock().unwrap();
                active.instrument = instrument.clone();
                active.bank = bank;
            }
            if let Some(tx) = sender {
                if crossfade {
                    let _ = tx.try_send(MixerCommand::Crossfade {
                        gain: instrument.gain,
                        fade_secs: CROSSFADE_SECS,
                    });
                }
                let _ = tx.try_send(MixerCommand::SetReverbSend(instrument.reverb_send));
            }
        });
    }

    // ── Preview and listeners ────────────────────────────────────────

    /// Immediate one-shot note for hover/tap feedback, independent of the
    /// transport. Scheduled 10 ms out so the stream has lead time.
    pub fn preview(&self, freq: f32, velocity: f32, duration: f32) {
        let output = match &self.output {
            Some(output) => output,
            None => return,
        };
        if let Err(e) = output.resume() {
            eprintln!("contrisonics: could not resume output: {}", e);
            return;
        }
        let (spec, cap) = {
            let active = self.active.lock().unwrap();
            (
                resolve_voice(
                    &active.instrument,
                    active.bank.as_deref(),
                    self.base_hz,
                    freq,
                    velocity,
                    duration.max(MIN_NOTE_SECS),
                ),
                active.instrument.voice_cap(),
            )
        };
        output.send(MixerCommand::Spawn {
            spec,
            start_in: 0.01,
            cap,
        });
    }

    /// Register (or clear, with `None`) the active-cell callback.
    pub fn set_active_cell_listener(&self, listener: Option<CellListener>) {
        self.transport.set_listener(listener);
    }

    // ── Internals ────────────────────────────────────────────────────

    fn command_sender(&self) -> Option<Sender<MixerCommand>> {
        self.output.as_ref().map(|o| o.sender())
    }

    fn make_firer(&self) -> NoteFirer {
        let active = self.active.clone();
        let sender = self.command_sender();
        let base_hz = self.base_hz;
        Arc::new(move |note, delay| {
            let tx = match &sender {
                Some(tx) => tx,
                None => return,
            };
            let (spec, cap) = {
                let active = active.lock().unwrap();
                (
                    resolve_voice(
                        &active.instrument,
                        active.bank.as_deref(),
                        base_hz,
                        note.freq,
                        note.velocity,
                        note.duration,
                    ),
                    active.instrument.voice_cap(),
                )
            };
            let _ = tx.try_send(MixerCommand::Spawn {
                spec,
                start_in: delay,
                cap,
            });
        })
    }
}
