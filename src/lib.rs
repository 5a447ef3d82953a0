pub mod auscultation;
pub mod backend;
pub mod clock;
pub mod config;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod heartbeat;
pub mod physiology;
pub mod psychoacoustics;
pub mod renderer;
pub mod scheduler;
pub mod vitals;
pub mod wasm;

pub use crate::backend::{AudioBackend, ManualBackend, ManualDevice};
pub use crate::clock::{Clock, ManualClock, SystemClock};
pub use crate::config::{AudioConfig, PhysiologyConfig};
pub use crate::engine::{AudioEngine, EngineState};
pub use crate::error::{AudioError, BloodPressureError, ConfigError};
pub use crate::physiology::PhysiologyEngine;
pub use crate::vitals::{BloodPressure, VitalUpdate, VitalsPatch, VitalsSnapshot};

#[cfg(feature = "device")]
pub use crate::backend::CpalBackend;

use wasm_bindgen::prelude::*;

/// The crate version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// WASM-exposed: return the vitalsound-core version string.
#[wasm_bindgen]
pub fn core_version() -> String {
    VERSION.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_matches_manifest() {
        assert_eq!(core_version(), env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn physiology_feeds_audio() {
        let clock = ManualClock::new(0.0);
        let mut physiology = PhysiologyEngine::with_clock(PhysiologyConfig::default(), clock.clone());
        physiology.apply_patch_json(r#"{"HR": 170, "BP": "88/54"}"#).unwrap();
        for _ in 0..100 {
            clock.advance(0.1);
            physiology.update();
        }
        let vitals = physiology.snapshot();
        assert!((vitals.hr - 170.0).abs() <= 4.0, "hr {}", vitals.hr);
        assert_eq!(vitals.bp, BloodPressure::new(88, 54).unwrap());

        let (backend, device) = ManualBackend::new(44100);
        let mut engine = AudioEngine::new(AudioConfig::default(), Box::new(backend));
        engine.update_vitals(&vitals);
        engine.init().unwrap();
        assert_eq!(engine.current_hr(), vitals.hr);
        assert_eq!(device.graphs_started(), 1);
        engine.shutdown();
        assert!(device.is_closed());
    }
}
