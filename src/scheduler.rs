//! Lookahead Scheduler: keeps the next heartbeat enqueued ahead of the
//! audio clock.
//!
//! A coarse driver wakes every 25 ms and enqueues every beat that falls
//! inside the next 100 ms of audio time. Beats are placed on the audio
//! device's clock, so wake-up jitter of the driver only changes *when* a
//! beat is enqueued, never when it sounds.
//!
//! The heart rate is sampled once per tick. A rate change only affects the
//! spacing of beats not yet enqueued, so it takes effect within one
//! lookahead window.

use tracing::{debug, trace};

use crate::auscultation::{self, MixTargets};
use crate::dsp::graph::{GraphCommand, ParamId};
use crate::heartbeat::HeartbeatSynth;
use crate::psychoacoustics::{self, PsychoacousticTargets};
use crate::vitals::VitalsSnapshot;

/// Time constant of the mute gate, seconds.
pub const MUTE_TIME_CONSTANT: f64 = 0.01;

/// A point on the audio clock where a heartbeat must begin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledEvent {
    pub time: f64,
    /// Spacing to the following beat at the rate in force when scheduled.
    pub interval: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LookaheadScheduler {
    next_event_time: f64,
    lookahead: f64,
}

impl LookaheadScheduler {
    /// `start_time` is the first beat, typically the audio time at
    /// activation plus a small offset.
    pub fn new(start_time: f64, lookahead: f64) -> Self {
        LookaheadScheduler {
            next_event_time: start_time,
            lookahead,
        }
    }

    pub fn next_event_time(&self) -> f64 {
        self.next_event_time
    }

    /// Enqueue every beat that starts before `now + lookahead`.
    pub fn tick(&mut self, now: f64, heart_rate: f64) -> Vec<ScheduledEvent> {
        let interval = beat_interval(heart_rate);

        if self.next_event_time < now {
            // the driver stalled past its lookahead; do not burst overdue beats
            debug!(
                behind = now - self.next_event_time,
                "scheduler fell behind the audio clock, re-anchoring"
            );
            self.next_event_time = now;
        }

        let mut events = Vec::new();
        while self.next_event_time < now + self.lookahead {
            events.push(ScheduledEvent {
                time: self.next_event_time,
                interval,
            });
            self.next_event_time += interval;
        }
        events
    }
}

/// Seconds per beat, with the rate floored at 1 bpm.
pub fn beat_interval(heart_rate: f64) -> f64 {
    if heart_rate.is_finite() {
        60.0 / heart_rate.max(1.0)
    } else {
        60.0
    }
}

/// Everything the scheduling side of the audio engine owns: the lookahead
/// timeline, the synthesizer, the last heart rate and the mute flag. It
/// turns inputs into [`GraphCommand`]s for whoever owns the graph.
#[derive(Debug, Clone)]
pub struct HeartbeatDriver {
    scheduler: LookaheadScheduler,
    synth: HeartbeatSynth,
    heart_rate: f64,
    muted: bool,
}

impl HeartbeatDriver {
    pub fn new(scheduler: LookaheadScheduler, heart_rate: f64, muted: bool) -> Self {
        HeartbeatDriver {
            scheduler,
            synth: HeartbeatSynth::default(),
            heart_rate: sanitize_rate(heart_rate, 75.0),
            muted,
        }
    }

    pub fn heart_rate(&self) -> f64 {
        self.heart_rate
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn scheduler(&self) -> &LookaheadScheduler {
        &self.scheduler
    }

    /// Record the new rate and retune the tunneling parameters.
    pub fn update_vitals(&mut self, vitals: &VitalsSnapshot) -> [GraphCommand; 2] {
        self.heart_rate = sanitize_rate(vitals.hr, self.heart_rate);
        let targets = PsychoacousticTargets::for_heart_rate(vitals.hr);
        [
            GraphCommand::SetTarget {
                param: ParamId::Cutoff,
                value: targets.cutoff_hz,
                time_constant: psychoacoustics::TIME_CONSTANT,
            },
            GraphCommand::SetTarget {
                param: ParamId::TinnitusGain,
                value: targets.tinnitus_gain,
                time_constant: psychoacoustics::TIME_CONSTANT,
            },
        ]
    }

    pub fn set_stethoscope_quality(&self, quality: f64) -> [GraphCommand; 2] {
        let mix = MixTargets::for_quality(quality);
        [
            GraphCommand::SetTarget {
                param: ParamId::HeartBusGain,
                value: mix.heart_gain,
                time_constant: auscultation::TIME_CONSTANT,
            },
            GraphCommand::SetTarget {
                param: ParamId::NoiseGain,
                value: mix.noise_gain,
                time_constant: auscultation::TIME_CONSTANT,
            },
        ]
    }

    pub fn set_muted(&mut self, muted: bool) -> GraphCommand {
        self.muted = muted;
        GraphCommand::SetTarget {
            param: ParamId::OutputGate,
            value: if muted { 0.0 } else { 1.0 },
            time_constant: MUTE_TIME_CONSTANT,
        }
    }

    /// Run one scheduler tick at audio time `now`, handing each heart sound
    /// to `emit`. Beats stay on the timeline while muted but are not
    /// sounded. Returns the number of beats scheduled.
    pub fn tick(&mut self, now: f64, mut emit: impl FnMut(GraphCommand)) -> usize {
        let events = self.scheduler.tick(now, self.heart_rate);
        for event in &events {
            trace!(time = event.time, interval = event.interval, muted = self.muted, "beat");
            if self.muted {
                continue;
            }
            for thump in self.synth.beat(event.time, event.interval).thumps() {
                emit(GraphCommand::Trigger(thump));
            }
        }
        events.len()
    }
}

fn sanitize_rate(hr: f64, fallback: f64) -> f64 {
    if hr.is_finite() { hr.max(1.0) } else { fallback }
}
