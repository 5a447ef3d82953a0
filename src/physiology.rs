//! Physiology Engine: drifts the patient's vital signs toward targets.
//!
//! The engine keeps two sets of mean values: `current` (the simulated
//! physiological state) and `target` (what the Scenario Director wants the
//! patient to become). Each `update()` moves `current` a time-proportional
//! step toward `target` with a per-vital response rate. Display snapshots
//! add deterministic biological noise on top of the mean without writing
//! it back.
//!
//! The engine owns no timer: the caller decides when to tick, and every
//! tick measures the real elapsed time from the injected [`Clock`].

use std::f64::consts::PI;

use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::{ApproachRates, PhysiologyConfig};
use crate::vitals::{BloodPressure, MAX_PAIN, VitalUpdate, VitalsPatch, VitalsSnapshot};

/// Mean vital values with full precision. Rounding only happens when a
/// [`VitalsSnapshot`] is produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeanVitals {
    pub hr: f64,
    pub systolic: f64,
    pub diastolic: f64,
    pub spo2: f64,
    pub rr: f64,
    pub temp: f64,
    pub pain: u8,
}

impl From<VitalsSnapshot> for MeanVitals {
    fn from(v: VitalsSnapshot) -> Self {
        MeanVitals {
            hr: v.hr,
            systolic: v.bp.systolic as f64,
            diastolic: v.bp.diastolic as f64,
            spo2: v.spo2,
            rr: v.rr,
            temp: v.temp,
            pain: v.pain.min(MAX_PAIN),
        }
    }
}

/// Mutable engine state. Only `update()` and `set_target()` write to it.
#[derive(Debug, Clone, PartialEq)]
pub struct PhysiologyState {
    pub current: MeanVitals,
    pub target: MeanVitals,
    /// Clock reading at the previous `update()`, seconds.
    pub last_update: f64,
    /// Accumulated simulated time driving the noise generator.
    pub noise_phase: f64,
}

pub struct PhysiologyEngine<C: Clock = SystemClock> {
    state: PhysiologyState,
    baseline: MeanVitals,
    rates: ApproachRates,
    rsa_depth: f64,
    clock: C,
}

impl PhysiologyEngine<SystemClock> {
    /// Engine at normal resting values, driven by real time.
    pub fn new() -> Self {
        Self::with_clock(PhysiologyConfig::default(), SystemClock::new())
    }
}

impl Default for PhysiologyEngine<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> PhysiologyEngine<C> {
    pub fn with_clock(config: PhysiologyConfig, clock: C) -> Self {
        let baseline = MeanVitals::from(config.baseline);
        let now = clock.now_secs();
        PhysiologyEngine {
            state: PhysiologyState {
                current: baseline,
                target: baseline,
                last_update: now,
                noise_phase: 0.0,
            },
            baseline,
            rates: config.rates,
            rsa_depth: config.rsa_depth,
            clock,
        }
    }

    /// Merge an update set into the target. Pain is a sensory report rather
    /// than a lagged quantity, so it is also written to `current` at once.
    ///
    /// Unusable input (non-finite numbers, unparsable blood pressure) leaves
    /// the previous target in place.
    pub fn set_target<I>(&mut self, updates: I)
    where
        I: IntoIterator<Item = VitalUpdate>,
    {
        let target = &mut self.state.target;
        for update in updates {
            match update {
                VitalUpdate::HeartRate(v) => assign_finite(&mut target.hr, v, "HR"),
                VitalUpdate::SpO2(v) => assign_finite(&mut target.spo2, v, "SpO2"),
                VitalUpdate::RespiratoryRate(v) => assign_finite(&mut target.rr, v, "RR"),
                VitalUpdate::Temperature(v) => assign_finite(&mut target.temp, v, "Temp"),
                VitalUpdate::BloodPressure(bp) => {
                    // fields are public, so a caller-built value is checked again
                    match BloodPressure::new(bp.systolic, bp.diastolic) {
                        Ok(bp) => {
                            target.systolic = bp.systolic as f64;
                            target.diastolic = bp.diastolic as f64;
                        }
                        Err(e) => warn!(
                            "ignoring blood pressure target: {e}; keeping {:.0}/{:.0}",
                            target.systolic, target.diastolic
                        ),
                    }
                }
                VitalUpdate::BloodPressureText(text) => match text.parse::<BloodPressure>() {
                    Ok(bp) => {
                        target.systolic = bp.systolic as f64;
                        target.diastolic = bp.diastolic as f64;
                    }
                    Err(e) => warn!(
                        "ignoring blood pressure target: {e}; keeping {:.0}/{:.0}",
                        target.systolic, target.diastolic
                    ),
                },
                VitalUpdate::Pain(p) => {
                    let pain = p.min(MAX_PAIN);
                    target.pain = pain;
                    self.state.current.pain = pain;
                }
            }
        }
        debug!(vitals = ?self.state.target, "physiology target updated");
    }

    pub fn apply_patch(&mut self, patch: VitalsPatch) {
        self.set_target(patch.into_updates());
    }

    /// Decode Scenario Director JSON and merge it into the target.
    pub fn apply_patch_json(&mut self, json: &str) -> Result<(), serde_json::Error> {
        let patch = VitalsPatch::from_json(json)?;
        self.apply_patch(patch);
        Ok(())
    }

    /// Point the target back at the resting baseline; `current` still drifts.
    pub fn reset_target(&mut self) {
        let b = self.baseline;
        self.set_target([
            VitalUpdate::HeartRate(b.hr),
            VitalUpdate::SpO2(b.spo2),
            VitalUpdate::RespiratoryRate(b.rr),
            VitalUpdate::Temperature(b.temp),
            VitalUpdate::Pain(b.pain),
        ]);
        self.state.target.systolic = b.systolic;
        self.state.target.diastolic = b.diastolic;
    }

    /// Advance `current` toward `target` by the time elapsed since the
    /// previous call.
    pub fn update(&mut self) {
        let now = self.clock.now_secs();
        let dt = (now - self.state.last_update).max(0.0);
        self.state.last_update = now;
        self.state.noise_phase += dt;

        let rates = self.rates;
        let target = self.state.target;
        let current = &mut self.state.current;

        current.hr = approach(current.hr, target.hr, rates.hr * dt);
        current.spo2 = approach(current.spo2, target.spo2, rates.spo2 * dt);
        current.rr = approach(current.rr, target.rr, rates.rr * dt);
        current.temp = approach(current.temp, target.temp, rates.temp * dt);
        current.systolic = approach(current.systolic, target.systolic, rates.bp * dt);
        current.diastolic = approach(current.diastolic, target.diastolic, rates.bp * dt);
    }

    /// Display values: the current mean plus instantaneous noise on HR and
    /// SpO2, clamped to their domains.
    pub fn snapshot(&self) -> VitalsSnapshot {
        let c = &self.state.current;
        let phase = self.state.noise_phase;

        let hr_magnitude = 1.5 + c.pain as f64 * 0.2;
        let rsa = (phase * (c.rr / 60.0) * 2.0 * PI).sin() * self.rsa_depth;
        let hr = (c.hr + biological_noise(phase, hr_magnitude) + rsa).round().max(1.0);

        let spo2 = (c.spo2 + biological_noise(phase, 0.5)).clamp(0.0, 100.0).round();

        VitalsSnapshot {
            hr,
            bp: BloodPressure::from_mean(c.systolic, c.diastolic),
            spo2,
            rr: c.rr.round().max(0.0),
            temp: (c.temp * 10.0).round() / 10.0,
            pain: c.pain.min(MAX_PAIN),
        }
    }

    pub fn state(&self) -> &PhysiologyState {
        &self.state
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }
}

fn assign_finite(slot: &mut f64, value: f64, name: &str) {
    if value.is_finite() {
        *slot = value;
    } else {
        warn!("ignoring non-finite {name} target {value}");
    }
}

/// Move `from` toward `to` by the fraction `t` (clamped to [0, 1]),
/// never passing `to`.
fn approach(from: f64, to: f64, t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    if t >= 1.0 {
        return to;
    }
    let next = from + (to - from) * t;
    next.clamp(from.min(to), from.max(to))
}

/// Two superposed sines seeded by elapsed time. Deterministic for a given
/// phase; bounded by `1.5 * magnitude`.
fn biological_noise(phase: f64, magnitude: f64) -> f64 {
    (phase * 2.5).sin() * magnitude + (phase * 1.1).cos() * (magnitude * 0.5)
}
