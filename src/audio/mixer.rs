//! Mix bus and output stream
//!
//! `MixerCore` runs inside the audio callback: it drains a command channel,
//! advances the sample clock, renders the voice pool through per-instrument
//! crossfade lanes, and adds a reverb return fed by the send bus.
//! `AudioOutput` wraps it in a cpal stream; everything above communicates
//! with the callback exclusively through `MixerCommand`s.

use super::voice::{VoicePool, VoiceSpec};
use anyhow::{anyhow, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Instrument swap crossfade window, in seconds.
pub const CROSSFADE_SECS: f32 = 0.12;

/// Everything the engine can ask of the render thread.
pub enum MixerCommand {
    /// Start a voice `start_in` seconds from the current clock position
    Spawn {
        spec: VoiceSpec,
        start_in: f32,
        cap: usize,
    },
    /// Fade all current lanes to silence and ramp in a new lane at `gain`
    Crossfade { gain: f32, fade_secs: f32 },
    SetReverbSend(f32),
    SetMasterGain(f32),
}

/// One instrument generation's gain stage.
struct Lane {
    id: u64,
    gain: f32,
    target: f32,
    step: f32,
    fading_out: bool,
}

impl Lane {
    #[inline]
    fn advance(&mut self) {
        if self.gain < self.target {
            self.gain = (self.gain + self.step).min(self.target);
        } else if self.gain > self.target {
            self.gain = (self.gain - self.step).max(self.target);
        }
    }

    fn is_silent(&self) -> bool {
        self.fading_out && self.gain <= 0.0001
    }
}

/// Feedback comb with a damping lowpass in the loop.
struct Comb {
    buf: Vec<f32>,
    idx: usize,
    filter_state: f32,
}

impl Comb {
    fn new(delay_samples: usize) -> Self {
        Comb {
            buf: vec![0.0; delay_samples.max(1)],
            idx: 0,
            filter_state: 0.0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32, feedback: f32, damping: f32) -> f32 {
        let out = self.buf[self.idx];
        self.filter_state = out * (1.0 - damping) + self.filter_state * damping;
        self.buf[self.idx] = input + self.filter_state * feedback;
        self.idx = (self.idx + 1) % self.buf.len();
        out
    }
}

/// Small send/return reverb: a pair of damped combs at mutually prime
/// delays.
struct Reverb {
    combs: [Comb; 2],
    feedback: f32,
    damping: f32,
}

impl Reverb {
    fn new(sample_rate: f32) -> Self {
        let scale = sample_rate / 44100.0;
        Reverb {
            combs: [
                Comb::new((1557.0 * scale) as usize),
                Comb::new((1617.0 * scale) as usize),
            ],
            feedback: 0.78,
            damping: 0.4,
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let mut out = 0.0;
        for comb in &mut self.combs {
            out += comb.process(input, self.feedback, self.damping);
        }
        out * 0.3
    }
}

/// The render core behind the audio callback.
pub struct MixerCore {
    commands: Receiver<MixerCommand>,
    pool: VoicePool,
    lanes: Vec<Lane>,
    next_lane: u64,
    reverb: Reverb,
    reverb_send: f32,
    master_gain: f32,
    sample_rate: f32,
    clock: Arc<AtomicU64>,
}

impl MixerCore {
    pub fn new(
        commands: Receiver<MixerCommand>,
        sample_rate: f32,
        master_gain: f32,
        initial_gain: f32,
        reverb_send: f32,
        clock: Arc<AtomicU64>,
    ) -> Self {
        MixerCore {
            commands,
            pool: VoicePool::new(),
            lanes: vec![Lane {
                id: 0,
                gain: initial_gain,
                target: initial_gain,
                step: 0.0,
                fading_out: false,
            }],
            next_lane: 1,
            reverb: Reverb::new(sample_rate),
            reverb_send,
            master_gain,
            sample_rate,
            clock,
        }
    }

    fn handle(&mut self, cmd: MixerCommand, clock: u64) {
        match cmd {
            MixerCommand::Spawn {
                spec,
                start_in,
                cap,
            } => {
                let start_at = clock + (start_in.max(0.0) * self.sample_rate) as u64;
                // New voices always join the newest lane
                let lane = self.next_lane - 1;
                self.pool.spawn(spec, lane, start_at, cap, self.sample_rate);
            }
            MixerCommand::Crossfade { gain, fade_secs } => {
                let fade_samples = (fade_secs.max(0.001) * self.sample_rate).max(1.0);
                for lane in &mut self.lanes {
                    lane.target = 0.0;
                    lane.step = (lane.gain / fade_samples).max(f32::MIN_POSITIVE);
                    lane.fading_out = true;
                }
                self.lanes.push(Lane {
                    id: self.next_lane,
                    gain: 0.0,
                    target: gain,
                    step: (gain / fade_samples).max(f32::MIN_POSITIVE),
                    fading_out: false,
                });
                self.next_lane += 1;
            }
            MixerCommand::SetReverbSend(level) => self.reverb_send = level.max(0.0),
            MixerCommand::SetMasterGain(gain) => self.master_gain = gain.max(0.0),
        }
    }

    /// Render one mono block. The cpal wrapper fans this out to channels.
    pub fn render(&mut self, out: &mut [f32]) {
        let mut clock = self.clock.load(Ordering::Relaxed);

        while let Ok(cmd) = self.commands.try_recv() {
            self.handle(cmd, clock);
        }

        for sample in out.iter_mut() {
            for lane in &mut self.lanes {
                lane.advance();
            }
            let lanes = &self.lanes;
            let dry = self.pool.render_sample(clock, |id| {
                lanes
                    .iter()
                    .find(|l| l.id == id)
                    .map_or(0.0, |l| l.gain)
            });
            let wet = self.reverb.process(dry * self.reverb_send);
            *sample = (dry + wet) * self.master_gain;
            clock += 1;
        }

        // Tear down lanes that finished fading, along with their voices
        let pool = &mut self.pool;
        self.lanes.retain(|lane| {
            if lane.is_silent() {
                pool.drop_lane(lane.id);
                false
            } else {
                true
            }
        });
        self.pool.sweep();

        self.clock.store(clock, Ordering::Relaxed);
    }
}

/// Handle to the cpal output stream feeding a `MixerCore`.
pub struct AudioOutput {
    stream: Stream,
    tx: Sender<MixerCommand>,
    clock: Arc<AtomicU64>,
    sample_rate: u32,
}

impl AudioOutput {
    /// Open the default output device and start rendering.
    pub fn try_new(master_gain: f32, initial_gain: f32, reverb_send: f32) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| anyhow!("No output device available"))?;
        let config = device.default_output_config()?;

        let sample_format = config.sample_format();
        let config: StreamConfig = config.into();
        let sample_rate = config.sample_rate.0;

        let (tx, rx) = bounded(1024);
        let clock = Arc::new(AtomicU64::new(0));
        let core = MixerCore::new(
            rx,
            sample_rate as f32,
            master_gain,
            initial_gain,
            reverb_send,
            clock.clone(),
        );

        let stream = match sample_format {
            SampleFormat::F32 => Self::build_stream::<f32>(&device, &config, core)?,
            SampleFormat::I16 => Self::build_stream::<i16>(&device, &config, core)?,
            SampleFormat::U16 => Self::build_stream::<u16>(&device, &config, core)?,
            _ => return Err(anyhow!("Unsupported sample format: {:?}", sample_format)),
        };
        stream
            .play()
            .map_err(|e| anyhow!("Failed to start output stream: {}", e))?;

        Ok(AudioOutput {
            stream,
            tx,
            clock,
            sample_rate,
        })
    }

    fn build_stream<T>(
        device: &cpal::Device,
        config: &StreamConfig,
        mut core: MixerCore,
    ) -> Result<Stream>
    where
        T: Sample + SizedSample + Send + 'static + cpal::FromSample<f32>,
    {
        let channels = config.channels as usize;
        let mut scratch: Vec<f32> = Vec::new();

        let err_fn = |err| eprintln!("an error occurred on the output audio stream: {:?}", err);

        let stream = device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    let frames = data.len() / channels.max(1);
                    scratch.resize(frames, 0.0);
                    core.render(&mut scratch);

                    for (frame, &value) in data.chunks_mut(channels).zip(scratch.iter()) {
                        let value: T = cpal::Sample::from_sample(value);
                        for sample in frame.iter_mut() {
                            *sample = value;
                        }
                    }
                },
                err_fn,
                None,
            )
            .map_err(|e| anyhow!("Failed to build output stream: {}", e))?;

        Ok(stream)
    }

    /// Queue a command for the render thread. Dropped if the queue is full.
    pub fn send(&self, cmd: MixerCommand) {
        let _ = self.tx.try_send(cmd);
    }

    /// A clone of the command queue, for background committers.
    pub fn sender(&self) -> Sender<MixerCommand> {
        self.tx.clone()
    }

    /// Make sure the stream is running (it may be suspended before the
    /// first user gesture on some hosts).
    pub fn resume(&self) -> Result<()> {
        self.stream
            .play()
            .map_err(|e| anyhow!("Failed to resume stream: {}", e))
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Seconds of audio rendered since the stream opened.
    pub fn clock_secs(&self) -> f64 {
        self.clock.load(Ordering::Relaxed) as f64 / self.sample_rate as f64
    }
}
