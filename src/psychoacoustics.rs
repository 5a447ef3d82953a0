//! Psychoacoustic Mapper: auditory tunneling under tachycardia.
//!
//! Above 120 bpm the listener's hearing is progressively muffled (the
//! main-path low-pass closes) and a faint high tone rises (tinnitus). Both
//! saturate at 180 bpm.

/// Heart rate where tunneling begins, beats/min.
pub const STRESS_ONSET_HR: f64 = 120.0;
/// Heart rate where tunneling is complete, beats/min.
pub const STRESS_FULL_HR: f64 = 180.0;
/// Low-pass cutoff at rest.
pub const OPEN_CUTOFF_HZ: f64 = 22000.0;
/// How far the cutoff closes at full stress (22000 → 400 Hz).
pub const CUTOFF_SWEEP_HZ: f64 = 21600.0;
pub const MAX_TINNITUS_GAIN: f64 = 0.05;
/// Time constant for both parameter approaches, seconds.
pub const TIME_CONSTANT: f64 = 0.5;

/// Stress in [0, 1]: 0 at or below 120 bpm, 1 at or above 180 bpm.
pub fn stress_factor(hr: f64) -> f64 {
    if !hr.is_finite() {
        return 0.0;
    }
    ((hr - STRESS_ONSET_HR) / (STRESS_FULL_HR - STRESS_ONSET_HR)).clamp(0.0, 1.0)
}

/// Graph parameter targets derived from heart rate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PsychoacousticTargets {
    pub cutoff_hz: f64,
    pub tinnitus_gain: f64,
}

impl PsychoacousticTargets {
    pub fn for_heart_rate(hr: f64) -> Self {
        let s = stress_factor(hr);
        PsychoacousticTargets {
            cutoff_hz: OPEN_CUTOFF_HZ - s * CUTOFF_SWEEP_HZ,
            tinnitus_gain: s * MAX_TINNITUS_GAIN,
        }
    }
}
