//! WASM bindings for the browser simulator.
//!
//! The page drives everything: it passes `performance.now()` to the
//! physiology engine and pulls audio from an AudioWorklet, so nothing here
//! needs a system clock or a thread.

use std::fmt::Display;

use wasm_bindgen::prelude::*;

use crate::clock::ManualClock;
use crate::config::{AudioConfig, PhysiologyConfig};
use crate::dsp::graph::SignalGraph;
use crate::physiology::PhysiologyEngine;
use crate::renderer;
use crate::scheduler::{HeartbeatDriver, LookaheadScheduler};
use crate::vitals::{VitalsPatch, VitalsSnapshot};

fn js_error(e: impl Display) -> JsValue {
    JsValue::from_str(&format!("{e}"))
}

fn audio_config(json: Option<String>) -> Result<AudioConfig, JsValue> {
    match json {
        Some(json) => AudioConfig::from_json(&json).map_err(js_error),
        None => Ok(AudioConfig::default()),
    }
}

/// Physiology engine on a caller-fed clock.
#[wasm_bindgen]
pub struct WasmPhysiology {
    engine: PhysiologyEngine<ManualClock>,
    clock: ManualClock,
}

#[wasm_bindgen]
impl WasmPhysiology {
    /// `now_ms` is the page's monotonic time, e.g. `performance.now()`.
    #[wasm_bindgen(constructor)]
    pub fn new(now_ms: f64, config_json: Option<String>) -> Result<WasmPhysiology, JsValue> {
        let config = match config_json {
            Some(json) => PhysiologyConfig::from_json(&json).map_err(js_error)?,
            None => PhysiologyConfig::default(),
        };
        let clock = ManualClock::new(now_ms / 1000.0);
        Ok(WasmPhysiology {
            engine: PhysiologyEngine::with_clock(config, clock.clone()),
            clock,
        })
    }

    /// Merge Scenario Director JSON such as `{"HR": 130, "BP": "90/60"}`
    /// into the target.
    #[wasm_bindgen(js_name = setTarget)]
    pub fn set_target(&mut self, json: &str) -> Result<(), JsValue> {
        self.engine.apply_patch_json(json).map_err(js_error)
    }

    /// Same as `setTarget` for an already-parsed JS object.
    #[wasm_bindgen(js_name = setTargetObject)]
    pub fn set_target_object(&mut self, value: JsValue) -> Result<(), JsValue> {
        let patch: VitalsPatch = serde_wasm_bindgen::from_value(value).map_err(js_error)?;
        self.engine.apply_patch(patch);
        Ok(())
    }

    #[wasm_bindgen(js_name = resetTarget)]
    pub fn reset_target(&mut self) {
        self.engine.reset_target();
    }

    pub fn update(&mut self, now_ms: f64) {
        self.clock.set(now_ms / 1000.0);
        self.engine.update();
    }

    /// `{HR, BP, SpO2, RR, Temp, Pain}`.
    pub fn snapshot(&self) -> Result<JsValue, JsValue> {
        serde_wasm_bindgen::to_value(&self.engine.snapshot()).map_err(js_error)
    }
}

/// The auscultation graph and its scheduler, pulled from an AudioWorklet.
/// Starts muted.
#[wasm_bindgen]
pub struct WasmAuscultation {
    config: AudioConfig,
    graph: SignalGraph,
    driver: HeartbeatDriver,
    /// Frames rendered between scheduler ticks.
    tick_frames: usize,
}

#[wasm_bindgen]
impl WasmAuscultation {
    #[wasm_bindgen(constructor)]
    pub fn new(sample_rate: f64, config_json: Option<String>) -> Result<WasmAuscultation, JsValue> {
        let config = audio_config(config_json)?;
        if !(sample_rate >= 8000.0 && sample_rate.is_finite()) {
            return Err(js_error(format!("unsupported sample rate {sample_rate}")));
        }
        let graph = SignalGraph::new(&config, sample_rate, true);
        let driver = HeartbeatDriver::new(
            LookaheadScheduler::new(config.start_offset, config.lookahead),
            VitalsSnapshot::baseline().hr,
            true,
        );
        let tick_frames = ((config.tick_interval_secs() * sample_rate).round() as usize).max(1);
        Ok(WasmAuscultation {
            config,
            graph,
            driver,
            tick_frames,
        })
    }

    /// Render the next `frames` mono samples. Long blocks are rendered in
    /// tick-interval slices with a scheduler tick before each, so beats keep
    /// their spacing whatever block size the host pulls.
    pub fn process(&mut self, frames: usize) -> Vec<f32> {
        let mut out = Vec::with_capacity(frames);
        while out.len() < frames {
            let graph = &mut self.graph;
            self.driver.tick(graph.now(), |command| graph.apply(command));
            let slice = self.tick_frames.min(frames - out.len());
            out.extend(graph.render_mono(slice));
        }
        out
    }

    /// Scheduler tick period in milliseconds.
    #[wasm_bindgen(js_name = tickIntervalMs)]
    pub fn tick_interval_ms(&self) -> u64 {
        self.config.tick_interval_ms
    }

    /// Accepts a physiology snapshot object.
    #[wasm_bindgen(js_name = updateVitals)]
    pub fn update_vitals(&mut self, vitals: JsValue) -> Result<(), JsValue> {
        let vitals: VitalsSnapshot = serde_wasm_bindgen::from_value(vitals).map_err(js_error)?;
        for command in self.driver.update_vitals(&vitals) {
            self.graph.apply(command);
        }
        Ok(())
    }

    #[wasm_bindgen(js_name = setMute)]
    pub fn set_mute(&mut self, muted: bool) {
        let command = self.driver.set_muted(muted);
        self.graph.apply(command);
    }

    #[wasm_bindgen(js_name = setStethoscopeQuality)]
    pub fn set_stethoscope_quality(&mut self, quality: f64) {
        for command in self.driver.set_stethoscope_quality(quality) {
            self.graph.apply(command);
        }
    }

    #[wasm_bindgen(js_name = isMuted)]
    pub fn is_muted(&self) -> bool {
        self.driver.is_muted()
    }

    #[wasm_bindgen(js_name = currentHr)]
    pub fn current_hr(&self) -> f64 {
        self.driver.heart_rate()
    }

    #[wasm_bindgen(js_name = nodeCount)]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }
}

/// Render an auscultation take to WAV bytes for download.
#[wasm_bindgen(js_name = renderAuscultationWav)]
pub fn render_auscultation_wav(
    vitals: JsValue,
    quality: f64,
    seconds: f64,
    config_json: Option<String>,
) -> Result<Vec<u8>, JsValue> {
    let vitals: VitalsSnapshot = serde_wasm_bindgen::from_value(vitals).map_err(js_error)?;
    let config = audio_config(config_json)?;
    let samples =
        renderer::render_auscultation(&vitals, quality, seconds, &config).map_err(js_error)?;
    renderer::encode_wav(&samples, config.sample_rate).map_err(js_error)
}
