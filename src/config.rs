//! Engine configuration.
//!
//! Both configs deserialize from JSON with every field optional; missing
//! fields take the tuned defaults below.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::vitals::VitalsSnapshot;

/// Fraction of the remaining distance to target covered per second.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApproachRates {
    pub hr: f64,
    pub bp: f64,
    pub rr: f64,
    pub spo2: f64,
    pub temp: f64,
}

impl Default for ApproachRates {
    fn default() -> Self {
        ApproachRates {
            hr: 0.8,
            bp: 0.5,
            rr: 0.6,
            spo2: 0.4,
            temp: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysiologyConfig {
    /// Starting current and target values.
    pub baseline: VitalsSnapshot,
    pub rates: ApproachRates,
    /// Respiratory sinus arrhythmia amplitude on displayed HR, beats/min.
    pub rsa_depth: f64,
}

impl Default for PhysiologyConfig {
    fn default() -> Self {
        PhysiologyConfig {
            baseline: VitalsSnapshot::baseline(),
            rates: ApproachRates::default(),
            rsa_depth: 0.5,
        }
    }
}

impl PhysiologyConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: PhysiologyConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let rates = [
            ("rates.hr", self.rates.hr),
            ("rates.bp", self.rates.bp),
            ("rates.rr", self.rates.rr),
            ("rates.spo2", self.rates.spo2),
            ("rates.temp", self.rates.temp),
        ];
        for (field, rate) in rates {
            if !rate.is_finite() || rate <= 0.0 {
                return Err(ConfigError::invalid(field, format!("must be > 0, got {rate}")));
            }
        }
        if !self.rsa_depth.is_finite() || self.rsa_depth < 0.0 {
            return Err(ConfigError::invalid("rsa_depth", "must be >= 0"));
        }
        if self.baseline.hr <= 0.0 {
            return Err(ConfigError::invalid("baseline.HR", "must be > 0"));
        }
        Ok(())
    }
}

/// Longest accepted scheduling lookahead, seconds.
pub const MAX_LOOKAHEAD_SECS: f64 = 2.0;
/// Longest accepted friction-noise loop, seconds.
pub const MAX_NOISE_BUFFER_SECS: f64 = 60.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub master_gain: f64,
    /// Resonance of the tunneling low-pass.
    pub filter_q: f64,
    /// Tinnitus tone pitch in Hz.
    pub tinnitus_frequency: f64,
    pub noise_buffer_secs: f64,
    pub noise_seed: u64,
    /// Delay before the first heartbeat after `init()`, seconds.
    pub start_offset: f64,
    /// How far ahead of the audio clock beats are enqueued, seconds.
    pub lookahead: f64,
    /// Scheduler driver period.
    pub tick_interval_ms: u64,
    pub teardown_fade_ms: u64,
    /// Sample rate for pull-driven and offline rendering.
    pub sample_rate: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        AudioConfig {
            master_gain: 0.5,
            filter_q: 1.0,
            tinnitus_frequency: 6000.0,
            noise_buffer_secs: 2.0,
            noise_seed: 0x5EED,
            start_offset: 0.1,
            lookahead: 0.1,
            tick_interval_ms: 25,
            teardown_fade_ms: 30,
            sample_rate: 44100,
        }
    }
}

impl AudioConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: AudioConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn tick_interval_secs(&self) -> f64 {
        self.tick_interval_ms as f64 / 1000.0
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.master_gain) {
            return Err(ConfigError::invalid("master_gain", "must be within [0, 1]"));
        }
        // written as !(x > 0) so NaN is rejected too
        if !(self.filter_q > 0.0) {
            return Err(ConfigError::invalid("filter_q", "must be > 0"));
        }
        if !(self.tinnitus_frequency > 0.0) {
            return Err(ConfigError::invalid("tinnitus_frequency", "must be > 0"));
        }
        if !(self.noise_buffer_secs > 0.0 && self.noise_buffer_secs <= MAX_NOISE_BUFFER_SECS) {
            return Err(ConfigError::invalid(
                "noise_buffer_secs",
                format!("must be within (0, {MAX_NOISE_BUFFER_SECS}]"),
            ));
        }
        if !(self.start_offset >= 0.0 && self.start_offset.is_finite()) {
            return Err(ConfigError::invalid("start_offset", "must be finite and >= 0"));
        }
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::invalid("tick_interval_ms", "must be > 0"));
        }
        if !(self.lookahead > self.tick_interval_secs()) {
            return Err(ConfigError::invalid(
                "lookahead",
                format!(
                    "must exceed the tick interval ({} ms) or beats can be missed",
                    self.tick_interval_ms
                ),
            ));
        }
        if self.lookahead > MAX_LOOKAHEAD_SECS {
            return Err(ConfigError::invalid(
                "lookahead",
                format!("must be <= {MAX_LOOKAHEAD_SECS} s"),
            ));
        }
        if self.sample_rate < 8000 {
            return Err(ConfigError::invalid("sample_rate", "must be >= 8000"));
        }
        Ok(())
    }
}
