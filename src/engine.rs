//! Audio engine: owns the output device, the signal graph and the
//! heartbeat scheduler thread.
//!
//! ```text
//!  UI thread ──DriverCommand──► heartbeat-scheduler ──GraphCommand──► device callback
//!                                  (HeartbeatDriver)                   (GraphRenderer)
//!                                        ▲                                   │
//!                                        └──────────── AudioClock ◄──────────┘
//! ```
//!
//! The scheduler thread wakes every tick interval, reads the audio clock and
//! enqueues heart sounds ahead of it. Nothing on the render path locks.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, select, unbounded};
use tracing::{debug, info, warn};

use crate::backend::AudioBackend;
use crate::config::AudioConfig;
use crate::dsp::graph::{AudioClock, GraphCommand, GraphRenderer, PERSISTENT_NODES, SignalGraph};
use crate::error::AudioError;
use crate::scheduler::{HeartbeatDriver, LookaheadScheduler};
use crate::vitals::VitalsSnapshot;

/// Fade applied to the master and gate on teardown, seconds.
pub const TEARDOWN_TIME_CONSTANT: f64 = 0.01;

const DRIVER_THREAD_NAME: &str = "heartbeat-scheduler";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// No device opened yet.
    Uninitialized,
    /// Graph built and device running, scheduler not started.
    Idle,
    /// Heartbeats are being scheduled.
    Running,
}

#[derive(Debug, Clone)]
enum DriverCommand {
    Vitals(VitalsSnapshot),
    Quality(f64),
    Mute(bool),
    Shutdown,
}

struct GraphLink {
    commands: Sender<GraphCommand>,
    clock: AudioClock,
}

struct DriverHandle {
    commands: Sender<DriverCommand>,
    thread: JoinHandle<()>,
}

pub struct AudioEngine {
    config: AudioConfig,
    backend: Box<dyn AudioBackend>,
    state: EngineState,
    heart_rate: f64,
    muted: bool,
    graph: Option<GraphLink>,
    driver: Option<DriverHandle>,
    /// Updates that reached an idle engine; replayed when `init()` starts
    /// the scheduler.
    held_vitals: Option<VitalsSnapshot>,
    held_quality: Option<f64>,
}

impl AudioEngine {
    /// Nothing is opened until [`init`](Self::init). The engine starts muted.
    pub fn new(config: AudioConfig, backend: Box<dyn AudioBackend>) -> Self {
        AudioEngine {
            config,
            backend,
            state: EngineState::Uninitialized,
            heart_rate: VitalsSnapshot::baseline().hr,
            muted: true,
            graph: None,
            driver: None,
            held_vitals: None,
            held_quality: None,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Persistent graph nodes; 0 before the graph exists.
    pub fn node_count(&self) -> usize {
        if self.graph.is_some() { PERSISTENT_NODES } else { 0 }
    }

    /// The heart rate the scheduler is (or will be) pacing beats at.
    pub fn current_hr(&self) -> f64 {
        self.heart_rate
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// Audio time of the running graph, seconds.
    pub fn audio_time(&self) -> Option<f64> {
        self.graph.as_ref().map(|g| g.clock.now())
    }

    /// Open the device, build the graph and start scheduling. Idempotent:
    /// a second call on a running engine does nothing, and a call on an
    /// idle engine only retries starting the scheduler.
    pub fn init(&mut self) -> Result<(), AudioError> {
        if self.state == EngineState::Running {
            debug!("audio engine already running");
            return Ok(());
        }
        self.config.validate()?;

        if self.graph.is_none() {
            let sample_rate = self.backend.prepare()?;
            let graph = SignalGraph::new(&self.config, sample_rate as f64, self.muted);
            let (commands, receiver) = unbounded();
            let renderer = GraphRenderer::new(graph, receiver);
            let clock = renderer.clock();
            self.backend.start(renderer)?;
            self.graph = Some(GraphLink { commands, clock });
            self.set_state(EngineState::Idle);
        }

        let Some(link) = self.graph.as_ref() else {
            return Ok(());
        };
        let driver = self.spawn_driver(link)?;
        self.driver = Some(driver);
        self.held_vitals = None;
        self.held_quality = None;
        self.set_state(EngineState::Running);
        Ok(())
    }

    fn spawn_driver(&self, link: &GraphLink) -> Result<DriverHandle, AudioError> {
        let start = link.clock.now() + self.config.start_offset;
        let mut driver = HeartbeatDriver::new(
            LookaheadScheduler::new(start, self.config.lookahead),
            self.heart_rate,
            self.muted,
        );
        if let Some(vitals) = &self.held_vitals {
            forward(&link.commands, driver.update_vitals(vitals));
        }
        if let Some(quality) = self.held_quality {
            forward(&link.commands, driver.set_stethoscope_quality(quality));
        }
        let (commands, receiver) = unbounded();
        let graph = link.commands.clone();
        let clock = link.clock.clone();
        let interval = Duration::from_millis(self.config.tick_interval_ms);

        let thread = thread::Builder::new()
            .name(DRIVER_THREAD_NAME.to_string())
            .spawn(move || run_driver(driver, receiver, graph, clock, interval))
            .map_err(AudioError::ThreadSpawn)?;
        Ok(DriverHandle { commands, thread })
    }

    fn set_state(&mut self, state: EngineState) {
        if self.state != state {
            info!(from = ?self.state, to = ?state, "audio engine state");
            self.state = state;
        }
    }

    fn send(&self, command: DriverCommand) -> bool {
        match self.driver.as_ref() {
            Some(driver) => driver.commands.send(command).is_ok(),
            None => false,
        }
    }

    /// Mute or unmute. Unmuting also resumes a device the host suspended.
    pub fn set_mute(&mut self, muted: bool) {
        self.muted = muted;
        if !self.send(DriverCommand::Mute(muted)) {
            debug!(muted, "mute recorded, scheduler not running");
        }
        if !muted && self.graph.is_some() && self.backend.is_suspended() {
            if let Err(e) = self.backend.resume() {
                warn!(error = %e, "failed to resume audio output");
            }
        }
    }

    /// Follow the latest vitals: beat spacing and auditory tunneling.
    /// Before `init()` only the heart rate is recorded; on an idle engine
    /// the update is held for the next `init()`.
    pub fn update_vitals(&mut self, vitals: &VitalsSnapshot) {
        if vitals.hr.is_finite() {
            self.heart_rate = vitals.hr.max(1.0);
        }
        if self.send(DriverCommand::Vitals(*vitals)) {
            return;
        }
        if self.graph.is_some() {
            debug!(hr = vitals.hr, "vitals held, scheduler not running");
            self.held_vitals = Some(*vitals);
        } else {
            debug!(hr = vitals.hr, "heart rate recorded, no audio graph yet");
        }
    }

    /// `quality` in [0, 1]; ignored before `init()`, held on an idle engine.
    pub fn set_stethoscope_quality(&mut self, quality: f64) {
        if self.send(DriverCommand::Quality(quality)) {
            return;
        }
        if self.graph.is_some() {
            debug!(quality, "stethoscope quality held, scheduler not running");
            self.held_quality = Some(quality);
        } else {
            debug!(quality, "stethoscope quality ignored, no audio graph yet");
        }
    }

    /// Stop scheduling, fade out and close the device. Safe to call more
    /// than once; a later `init()` starts over with a fresh graph.
    pub fn shutdown(&mut self) {
        if let Some(driver) = self.driver.take() {
            let _ = driver.commands.send(DriverCommand::Shutdown);
            if driver.thread.join().is_err() {
                warn!("heartbeat scheduler thread panicked");
            }
        }
        if let Some(link) = self.graph.take() {
            let _ = link.commands.send(GraphCommand::Teardown {
                time_constant: TEARDOWN_TIME_CONSTANT,
            });
            thread::sleep(Duration::from_millis(self.config.teardown_fade_ms));
            self.backend.close();
        }
        self.held_vitals = None;
        self.held_quality = None;
        self.set_state(EngineState::Uninitialized);
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn forward(graph: &Sender<GraphCommand>, commands: impl IntoIterator<Item = GraphCommand>) -> bool {
    commands.into_iter().all(|c| graph.send(c).is_ok())
}

fn run_driver(
    mut driver: HeartbeatDriver,
    commands: Receiver<DriverCommand>,
    graph: Sender<GraphCommand>,
    clock: AudioClock,
    interval: Duration,
) {
    debug!(?interval, "heartbeat scheduler started");
    let ticker = crossbeam_channel::tick(interval);
    let mut alive = true;
    driver.tick(clock.now(), |c| alive &= graph.send(c).is_ok());

    while alive {
        select! {
            recv(commands) -> command => {
                alive = match command {
                    Ok(DriverCommand::Vitals(vitals)) => forward(&graph, driver.update_vitals(&vitals)),
                    Ok(DriverCommand::Quality(q)) => forward(&graph, driver.set_stethoscope_quality(q)),
                    Ok(DriverCommand::Mute(muted)) => forward(&graph, [driver.set_muted(muted)]),
                    Ok(DriverCommand::Shutdown) | Err(_) => false,
                };
            }
            recv(ticker) -> _ => {
                driver.tick(clock.now(), |c| alive &= graph.send(c).is_ok());
            }
        }
    }
    debug!("heartbeat scheduler stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ManualBackend, ManualDevice};
    use std::time::Instant;

    fn engine() -> (AudioEngine, ManualDevice) {
        let (backend, device) = ManualBackend::new(44100);
        (AudioEngine::new(AudioConfig::default(), Box::new(backend)), device)
    }

    fn vitals(hr: f64) -> VitalsSnapshot {
        VitalsSnapshot {
            hr,
            ..VitalsSnapshot::baseline()
        }
    }

    /// Pull audio in 10 ms blocks while the scheduler runs, until `done`
    /// sees the block or the wall-clock budget runs out.
    fn pull_until(device: &ManualDevice, budget: Duration, mut done: impl FnMut(&[f32]) -> bool) -> bool {
        let started = Instant::now();
        while started.elapsed() < budget {
            let block = device.pull(441);
            if done(&block) {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    fn peak(block: &[f32]) -> f32 {
        block.iter().fold(0.0f32, |m, s| m.max(s.abs()))
    }

    #[test]
    fn starts_uninitialized_and_muted() {
        let (engine, device) = engine();
        assert_eq!(engine.state(), EngineState::Uninitialized);
        assert_eq!(engine.node_count(), 0);
        assert!(engine.is_muted());
        assert_eq!(engine.current_hr(), 75.0);
        assert_eq!(device.graphs_started(), 0);
    }

    #[test]
    fn init_is_idempotent() {
        let (mut engine, device) = engine();
        engine.init().unwrap();
        engine.init().unwrap();
        assert_eq!(engine.state(), EngineState::Running);
        assert_eq!(engine.node_count(), 7);
        assert_eq!(device.graphs_started(), 1);
    }

    #[test]
    fn calls_before_init_are_harmless() {
        let (mut engine, device) = engine();
        engine.update_vitals(&vitals(150.0));
        engine.set_stethoscope_quality(0.2);
        engine.set_mute(false);
        assert_eq!(engine.current_hr(), 150.0);
        assert!(!engine.is_muted());
        assert_eq!(engine.state(), EngineState::Uninitialized);
        assert_eq!(device.graphs_started(), 0);
        assert_eq!(device.pull(64), vec![0.0; 64]);
    }

    #[test]
    fn idle_engine_replays_updates_when_scheduler_starts() {
        let (mut engine, device) = engine();
        engine.init().unwrap();
        // stop the scheduler thread only, as when it could not be spawned
        let driver = engine.driver.take().unwrap();
        driver.commands.send(DriverCommand::Shutdown).unwrap();
        driver.thread.join().unwrap();
        engine.set_state(EngineState::Idle);

        engine.update_vitals(&vitals(140.0));
        engine.set_stethoscope_quality(0.3);
        assert_eq!(engine.current_hr(), 140.0);
        assert_eq!(engine.held_vitals.map(|v| v.hr), Some(140.0));
        assert_eq!(engine.held_quality, Some(0.3));

        engine.init().unwrap();
        assert_eq!(engine.state(), EngineState::Running);
        assert_eq!(device.graphs_started(), 1);
        assert!(engine.held_vitals.is_none());
        assert!(engine.held_quality.is_none());
    }

    #[test]
    fn updates_before_init_are_not_held() {
        let (mut engine, _device) = engine();
        engine.update_vitals(&vitals(150.0));
        engine.set_stethoscope_quality(0.2);
        assert!(engine.held_vitals.is_none());
        assert!(engine.held_quality.is_none());
    }

    #[test]
    fn zero_heart_rate_is_floored() {
        let (mut engine, _device) = engine();
        engine.update_vitals(&vitals(0.0));
        assert_eq!(engine.current_hr(), 1.0);
        engine.update_vitals(&vitals(f64::NAN));
        assert_eq!(engine.current_hr(), 1.0);
    }

    #[test]
    fn unmute_resumes_suspended_device() {
        let (mut engine, device) = engine();
        engine.init().unwrap();
        device.suspend();
        engine.set_mute(true);
        assert!(device.is_suspended());
        engine.set_mute(false);
        assert!(!device.is_suspended());
    }

    #[test]
    fn muted_engine_is_silent() {
        let (mut engine, device) = engine();
        engine.init().unwrap();
        let mut loudest = 0.0f32;
        pull_until(&device, Duration::from_millis(300), |block| {
            loudest = loudest.max(peak(block));
            false
        });
        assert_eq!(loudest, 0.0);
    }

    #[test]
    fn unmuted_engine_beats() {
        let (mut engine, device) = engine();
        engine.set_mute(false);
        engine.init().unwrap();
        let heard = pull_until(&device, Duration::from_secs(3), |block| peak(block) > 0.01);
        assert!(heard, "no heartbeat within the time budget");
    }

    #[test]
    fn shutdown_closes_and_allows_restart() {
        let (mut engine, device) = engine();
        engine.init().unwrap();
        engine.shutdown();
        assert_eq!(engine.state(), EngineState::Uninitialized);
        assert_eq!(engine.node_count(), 0);
        assert!(device.is_closed());
        engine.shutdown();

        engine.init().unwrap();
        assert_eq!(device.graphs_started(), 2);
        assert!(!device.is_closed());
    }

    #[test]
    fn drop_closes_device() {
        let (mut engine, device) = engine();
        engine.init().unwrap();
        drop(engine);
        assert!(device.is_closed());
    }

    #[test]
    fn invalid_config_fails_init() {
        let (backend, device) = ManualBackend::new(44100);
        let config = AudioConfig {
            lookahead: 0.01,
            ..AudioConfig::default()
        };
        let mut engine = AudioEngine::new(config, Box::new(backend));
        assert!(matches!(engine.init(), Err(AudioError::Config(_))));
        assert_eq!(engine.state(), EngineState::Uninitialized);
        assert_eq!(device.graphs_started(), 0);
    }

    struct NoDevice;

    impl AudioBackend for NoDevice {
        fn prepare(&mut self) -> Result<u32, AudioError> {
            Err(AudioError::NoOutputDevice)
        }
        fn start(&mut self, _renderer: GraphRenderer) -> Result<(), AudioError> {
            Ok(())
        }
        fn resume(&mut self) -> Result<(), AudioError> {
            Ok(())
        }
        fn is_suspended(&self) -> bool {
            false
        }
        fn close(&mut self) {}
    }

    #[test]
    fn missing_device_leaves_engine_uninitialized() {
        let mut engine = AudioEngine::new(AudioConfig::default(), Box::new(NoDevice));
        assert!(matches!(engine.init(), Err(AudioError::NoOutputDevice)));
        assert_eq!(engine.state(), EngineState::Uninitialized);
        assert_eq!(engine.node_count(), 0);
    }
}
