//! Audio output backends.
//!
//! A backend owns the output device. The engine asks it for a sample rate,
//! builds a graph at that rate, then hands over the [`GraphRenderer`] which
//! the backend drives from its output callback.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::dsp::graph::GraphRenderer;
use crate::error::AudioError;

pub trait AudioBackend {
    /// Open the output device and report its sample rate.
    fn prepare(&mut self) -> Result<u32, AudioError>;

    /// Begin pulling audio from `renderer`.
    fn start(&mut self, renderer: GraphRenderer) -> Result<(), AudioError>;

    /// Resume a device that the host suspended, e.g. by autoplay policy.
    fn resume(&mut self) -> Result<(), AudioError>;

    fn is_suspended(&self) -> bool;

    /// Stop output and release the device.
    fn close(&mut self);
}

#[derive(Default)]
struct ManualState {
    renderer: Option<GraphRenderer>,
    suspended: bool,
    closed: bool,
    graphs_started: usize,
}

/// Backend whose output is pulled by the caller instead of a sound card.
///
/// Used for tests, offline capture, and hosts such as an AudioWorklet that
/// own the real device themselves.
pub struct ManualBackend {
    sample_rate: u32,
    device: ManualDevice,
}

impl ManualBackend {
    /// The returned [`ManualDevice`] is the caller's handle for pulling
    /// frames once the engine has started.
    pub fn new(sample_rate: u32) -> (Self, ManualDevice) {
        let device = ManualDevice::default();
        (
            ManualBackend {
                sample_rate,
                device: device.clone(),
            },
            device,
        )
    }
}

impl AudioBackend for ManualBackend {
    fn prepare(&mut self) -> Result<u32, AudioError> {
        Ok(self.sample_rate)
    }

    fn start(&mut self, renderer: GraphRenderer) -> Result<(), AudioError> {
        let mut state = self.device.lock();
        state.renderer = Some(renderer);
        state.graphs_started += 1;
        state.closed = false;
        Ok(())
    }

    fn resume(&mut self) -> Result<(), AudioError> {
        self.device.lock().suspended = false;
        Ok(())
    }

    fn is_suspended(&self) -> bool {
        self.device.lock().suspended
    }

    fn close(&mut self) {
        let mut state = self.device.lock();
        state.renderer = None;
        state.closed = true;
        debug!(graphs_started = state.graphs_started, "manual device closed");
    }
}

/// Shared handle onto a [`ManualBackend`].
#[derive(Clone, Default)]
pub struct ManualDevice {
    state: Arc<Mutex<ManualState>>,
}

impl ManualDevice {
    fn lock(&self) -> MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Render `frames` mono frames. Returns silence without advancing the
    /// audio clock while suspended, closed or not yet started.
    pub fn pull(&self, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0; frames];
        let mut state = self.lock();
        if state.suspended {
            return out;
        }
        if let Some(renderer) = state.renderer.as_mut() {
            renderer.render(&mut out, 1);
        }
        out
    }

    /// Simulate the host suspending output.
    pub fn suspend(&self) {
        self.lock().suspended = true;
    }

    pub fn is_suspended(&self) -> bool {
        self.lock().suspended
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// How many graphs have been handed to this device.
    pub fn graphs_started(&self) -> usize {
        self.lock().graphs_started
    }

    /// Voices alive in the running graph.
    pub fn active_voices(&self) -> usize {
        self.lock()
            .renderer
            .as_ref()
            .map_or(0, |r| r.graph().active_voices())
    }
}

impl std::fmt::Debug for ManualDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("ManualDevice")
            .field("running", &state.renderer.is_some())
            .field("suspended", &state.suspended)
            .field("closed", &state.closed)
            .field("graphs_started", &state.graphs_started)
            .finish()
    }
}

#[cfg(feature = "device")]
pub use self::cpal_backend::CpalBackend;

#[cfg(feature = "device")]
mod cpal_backend {
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use cpal::{FromSample, SizedSample};
    use tracing::{info, warn};

    use super::AudioBackend;
    use crate::dsp::graph::GraphRenderer;
    use crate::error::AudioError;

    /// The host's default output device.
    #[derive(Default)]
    pub struct CpalBackend {
        device: Option<cpal::Device>,
        config: Option<cpal::SupportedStreamConfig>,
        stream: Option<cpal::Stream>,
        suspended: bool,
    }

    impl CpalBackend {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl AudioBackend for CpalBackend {
        fn prepare(&mut self) -> Result<u32, AudioError> {
            let host = cpal::default_host();
            let device = host
                .default_output_device()
                .ok_or(AudioError::NoOutputDevice)?;
            let config = device
                .default_output_config()
                .map_err(|e| AudioError::DeviceConfig(e.to_string()))?;
            let sample_rate = config.sample_rate().0;
            info!(
                device = %device.name().unwrap_or_default(),
                sample_rate,
                channels = config.channels(),
                format = ?config.sample_format(),
                "opened audio output"
            );
            self.device = Some(device);
            self.config = Some(config);
            Ok(sample_rate)
        }

        fn start(&mut self, renderer: GraphRenderer) -> Result<(), AudioError> {
            let (Some(device), Some(config)) = (self.device.as_ref(), self.config.as_ref()) else {
                return Err(AudioError::NoOutputDevice);
            };
            let stream_config: cpal::StreamConfig = config.clone().into();
            let stream = match config.sample_format() {
                cpal::SampleFormat::F32 => build_stream::<f32>(device, &stream_config, renderer),
                cpal::SampleFormat::I16 => build_stream::<i16>(device, &stream_config, renderer),
                cpal::SampleFormat::U16 => build_stream::<u16>(device, &stream_config, renderer),
                other => Err(AudioError::DeviceConfig(format!(
                    "unsupported sample format {other:?}"
                ))),
            }?;
            stream.play().map_err(|e| AudioError::Play(e.to_string()))?;
            self.stream = Some(stream);
            self.suspended = false;
            Ok(())
        }

        fn resume(&mut self) -> Result<(), AudioError> {
            if let Some(stream) = self.stream.as_ref() {
                stream.play().map_err(|e| AudioError::Play(e.to_string()))?;
            }
            self.suspended = false;
            Ok(())
        }

        fn is_suspended(&self) -> bool {
            self.suspended
        }

        fn close(&mut self) {
            if let Some(stream) = self.stream.take() {
                if let Err(e) = stream.pause() {
                    warn!(error = %e, "failed to pause output stream");
                }
            }
            self.device = None;
            self.config = None;
        }
    }

    fn build_stream<T>(
        device: &cpal::Device,
        config: &cpal::StreamConfig,
        mut renderer: GraphRenderer,
    ) -> Result<cpal::Stream, AudioError>
    where
        T: SizedSample + FromSample<f32>,
    {
        let channels = config.channels as usize;
        let mut scratch: Vec<f32> = Vec::new();
        device
            .build_output_stream(
                config,
                move |data: &mut [T], _| {
                    scratch.resize(data.len(), 0.0);
                    renderer.render(&mut scratch, channels);
                    for (out, &s) in data.iter_mut().zip(scratch.iter()) {
                        *out = T::from_sample(s);
                    }
                },
                |err| warn!(error = %err, "audio stream error"),
                None,
            )
            .map_err(|e| AudioError::BuildStream(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AudioConfig;
    use crate::dsp::graph::SignalGraph;
    use crossbeam_channel::unbounded;

    fn renderer(sample_rate: u32) -> GraphRenderer {
        let (_tx, rx) = unbounded();
        let graph = SignalGraph::new(&AudioConfig::default(), sample_rate as f64, false);
        GraphRenderer::new(graph, rx)
    }

    #[test]
    fn pull_before_start_is_silent() {
        let (_backend, device) = ManualBackend::new(48000);
        assert_eq!(device.pull(64), vec![0.0; 64]);
        assert_eq!(device.graphs_started(), 0);
    }

    #[test]
    fn pull_advances_audio_clock() {
        let (mut backend, device) = ManualBackend::new(48000);
        assert_eq!(backend.prepare().unwrap(), 48000);
        let r = renderer(48000);
        let clock = r.clock();
        backend.start(r).unwrap();
        device.pull(480);
        assert!((clock.now() - 0.01).abs() < 1e-12);
        assert_eq!(device.graphs_started(), 1);
    }

    #[test]
    fn suspended_device_holds_the_clock() {
        let (mut backend, device) = ManualBackend::new(48000);
        let r = renderer(48000);
        let clock = r.clock();
        backend.start(r).unwrap();
        device.suspend();
        assert!(backend.is_suspended());
        device.pull(480);
        assert_eq!(clock.frames(), 0);
        backend.resume().unwrap();
        assert!(!device.is_suspended());
        device.pull(480);
        assert_eq!(clock.frames(), 480);
    }

    #[test]
    fn close_drops_renderer() {
        let (mut backend, device) = ManualBackend::new(48000);
        backend.start(renderer(48000)).unwrap();
        backend.close();
        assert!(device.is_closed());
        assert_eq!(device.active_voices(), 0);
    }
}
