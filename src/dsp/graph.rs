//! Signal Graph: the fixed auscultation topology.
//!
//! ```text
//! heart voices ─► heart bus gain ─► low-pass ─┐
//!                                             ├─► master gain ─┐
//! noise loop ───► noise gain ─────────────────┘                ├─► output gate ─► tanh ─► out
//! tinnitus sine ► tinnitus gain ───────────────────────────────┘
//! ```
//!
//! The tinnitus tone bypasses the low-pass on purpose: it is the ringing
//! that accompanies the muffling, so it must not be muffled itself.
//!
//! The graph is built once and owned by whichever thread pulls audio from
//! it. Everything else talks to it through [`GraphCommand`]s applied at the
//! start of each render block.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::Receiver;
use tracing::{debug, trace};

use super::filter::LowpassFilter;
use super::noise::NoiseLoop;
use super::oscillator::{Oscillator, Waveform};
use super::param::AudioParam;
use crate::config::AudioConfig;
use crate::heartbeat::{Thump, ThumpVoice};
use crate::psychoacoustics::OPEN_CUTOFF_HZ;

/// Persistent nodes: master gain, low-pass, tinnitus oscillator, tinnitus
/// gain, noise source, noise gain, heart bus gain.
pub const PERSISTENT_NODES: usize = 7;

/// Automatable graph parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamId {
    MasterGain,
    Cutoff,
    TinnitusGain,
    HeartBusGain,
    NoiseGain,
    /// Mute gate in front of the destination.
    OutputGate,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GraphCommand {
    /// Approach `value` from the graph's current time.
    SetTarget {
        param: ParamId,
        value: f64,
        time_constant: f64,
    },
    /// Start a heart sound at its scheduled time.
    Trigger(Thump),
    /// Drop every heart sound that has not started and fade out.
    Teardown { time_constant: f64 },
}

/// Rendered-frame counter shared between the render side and readers.
#[derive(Debug, Clone)]
pub struct AudioClock {
    frames: Arc<AtomicU64>,
    sample_rate: f64,
}

impl AudioClock {
    pub fn new(sample_rate: f64) -> Self {
        AudioClock {
            frames: Arc::new(AtomicU64::new(0)),
            sample_rate,
        }
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Acquire)
    }

    /// Current audio time, seconds.
    pub fn now(&self) -> f64 {
        self.frames() as f64 / self.sample_rate
    }

    fn publish(&self, frames: u64) {
        self.frames.store(frames, Ordering::Release);
    }
}

pub struct SignalGraph {
    sample_rate: f64,
    frame: u64,

    heart_bus: AudioParam,
    lowpass: LowpassFilter,
    cutoff: AudioParam,
    master_gain: AudioParam,

    noise: NoiseLoop,
    noise_gain: AudioParam,

    tinnitus: Oscillator,
    tinnitus_gain: AudioParam,

    output_gate: AudioParam,
    voices: Vec<ThumpVoice>,
}

impl SignalGraph {
    /// Build the topology at rest: filter open, tinnitus and noise silent,
    /// heart bus at unity.
    pub fn new(config: &AudioConfig, sample_rate: f64, muted: bool) -> Self {
        debug!(sample_rate, "building signal graph");
        SignalGraph {
            sample_rate,
            frame: 0,
            heart_bus: AudioParam::new(1.0),
            lowpass: LowpassFilter::new(OPEN_CUTOFF_HZ, config.filter_q, sample_rate),
            cutoff: AudioParam::new(OPEN_CUTOFF_HZ),
            master_gain: AudioParam::new(config.master_gain),
            noise: NoiseLoop::new(config.noise_buffer_secs, sample_rate, config.noise_seed),
            noise_gain: AudioParam::new(0.0),
            tinnitus: Oscillator::new(Waveform::Sine, config.tinnitus_frequency, sample_rate),
            tinnitus_gain: AudioParam::new(0.0),
            output_gate: AudioParam::new(if muted { 0.0 } else { 1.0 }),
            voices: Vec::new(),
        }
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Current graph time, seconds.
    pub fn now(&self) -> f64 {
        self.frame as f64 / self.sample_rate
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frame
    }

    pub fn node_count(&self) -> usize {
        PERSISTENT_NODES
    }

    /// Heart sounds sounding or waiting to sound.
    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }

    pub fn param(&self, id: ParamId) -> &AudioParam {
        match id {
            ParamId::MasterGain => &self.master_gain,
            ParamId::Cutoff => &self.cutoff,
            ParamId::TinnitusGain => &self.tinnitus_gain,
            ParamId::HeartBusGain => &self.heart_bus,
            ParamId::NoiseGain => &self.noise_gain,
            ParamId::OutputGate => &self.output_gate,
        }
    }

    fn param_mut(&mut self, id: ParamId) -> &mut AudioParam {
        match id {
            ParamId::MasterGain => &mut self.master_gain,
            ParamId::Cutoff => &mut self.cutoff,
            ParamId::TinnitusGain => &mut self.tinnitus_gain,
            ParamId::HeartBusGain => &mut self.heart_bus,
            ParamId::NoiseGain => &mut self.noise_gain,
            ParamId::OutputGate => &mut self.output_gate,
        }
    }

    pub fn apply(&mut self, command: GraphCommand) {
        let now = self.now();
        match command {
            GraphCommand::SetTarget {
                param,
                value,
                time_constant,
            } => {
                self.param_mut(param)
                    .set_target_at_time(value, now, time_constant);
            }
            GraphCommand::Trigger(mut thump) => {
                if thump.start < now {
                    trace!(late_by = now - thump.start, "heart sound arrived late");
                    thump.start = now;
                }
                self.voices.push(ThumpVoice::new(thump, self.sample_rate));
            }
            GraphCommand::Teardown { time_constant } => {
                let before = self.voices.len();
                self.voices.retain(|v| v.has_started(now));
                debug!(cancelled = before - self.voices.len(), "graph teardown");
                for id in [ParamId::MasterGain, ParamId::OutputGate] {
                    let param = self.param_mut(id);
                    param.cancel_scheduled_values(now);
                    param.set_target_at_time(0.0, now, time_constant);
                }
            }
        }
    }

    fn render_frame(&mut self) -> f64 {
        let t = self.now();

        let mut heart = 0.0;
        for voice in self.voices.iter_mut() {
            heart += voice.next_sample(t);
        }
        heart *= self.heart_bus.value_at(t);

        self.lowpass.set_frequency(self.cutoff.value_at(t));
        let filtered = self.lowpass.process(heart);

        let noise = self.noise.next_sample() * self.noise_gain.value_at(t);
        let master = (filtered + noise) * self.master_gain.value_at(t);

        let tinnitus = self.tinnitus.next_sample() * self.tinnitus_gain.value_at(t);

        self.frame += 1;
        soft_clip((master + tinnitus) * self.output_gate.value_at(t))
    }

    /// Render `out.len() / channels` frames, the same signal on every channel.
    pub fn render(&mut self, out: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        for frame in out.chunks_mut(channels) {
            let s = self.render_frame() as f32;
            frame.fill(s);
        }
        let now = self.now();
        self.voices.retain(|v| !v.is_finished(now));
    }

    pub fn render_mono(&mut self, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0f32; frames];
        self.render(&mut out, 1);
        out
    }
}

/// Soft clipper using tanh to prevent harsh digital clipping.
fn soft_clip(x: f64) -> f64 {
    x.tanh()
}

/// The render-side end of the graph: applies queued commands, renders,
/// and publishes the audio clock. Owned by the output device callback.
pub struct GraphRenderer {
    graph: SignalGraph,
    commands: Receiver<GraphCommand>,
    clock: AudioClock,
}

impl GraphRenderer {
    pub fn new(graph: SignalGraph, commands: Receiver<GraphCommand>) -> Self {
        let clock = AudioClock::new(graph.sample_rate());
        clock.publish(graph.frames_rendered());
        GraphRenderer {
            graph,
            commands,
            clock,
        }
    }

    pub fn clock(&self) -> AudioClock {
        self.clock.clone()
    }

    pub fn graph(&self) -> &SignalGraph {
        &self.graph
    }

    /// Fill an interleaved device buffer. Never blocks.
    pub fn render(&mut self, out: &mut [f32], channels: usize) {
        while let Ok(command) = self.commands.try_recv() {
            self.graph.apply(command);
        }
        self.graph.render(out, channels);
        self.clock.publish(self.graph.frames_rendered());
    }
}
