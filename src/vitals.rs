//! Vital-sign value types shared by the physiology and audio engines.
//!
//! `VitalsSnapshot` is the immutable display value handed to the UI and the
//! audio engine. Targets arrive as a [`VitalUpdate`] set, usually decoded
//! from the Scenario Director's JSON through [`VitalsPatch`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::BloodPressureError;

/// Highest value on the patient-reported pain scale.
pub const MAX_PAIN: u8 = 10;

/// Arterial blood pressure in mmHg. Always `systolic > diastolic > 0`
/// when produced by parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BloodPressure {
    pub systolic: u16,
    pub diastolic: u16,
}

impl BloodPressure {
    pub fn new(systolic: u16, diastolic: u16) -> Result<Self, BloodPressureError> {
        if systolic == 0 || diastolic == 0 {
            return Err(BloodPressureError::NonPositive {
                systolic: systolic as f64,
                diastolic: diastolic as f64,
            });
        }
        if systolic <= diastolic {
            return Err(BloodPressureError::Inverted {
                systolic,
                diastolic,
            });
        }
        Ok(BloodPressure {
            systolic,
            diastolic,
        })
    }

    /// Round a fractional (interpolated) pressure pair for display.
    pub(crate) fn from_mean(systolic: f64, diastolic: f64) -> Self {
        BloodPressure {
            systolic: round_mmhg(systolic),
            diastolic: round_mmhg(diastolic),
        }
    }
}

fn round_mmhg(value: f64) -> u16 {
    value.round().clamp(0.0, u16::MAX as f64) as u16
}

impl Default for BloodPressure {
    fn default() -> Self {
        BloodPressure {
            systolic: 120,
            diastolic: 80,
        }
    }
}

impl fmt::Display for BloodPressure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.systolic, self.diastolic)
    }
}

impl FromStr for BloodPressure {
    type Err = BloodPressureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (sys, dia) = s
            .split_once('/')
            .ok_or_else(|| BloodPressureError::MissingSeparator {
                text: s.to_string(),
            })?;

        let parse = |component: &str| -> Result<f64, BloodPressureError> {
            component
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| BloodPressureError::NotANumber {
                    text: s.to_string(),
                    component: component.trim().to_string(),
                })
        };
        let systolic = parse(sys)?;
        let diastolic = parse(dia)?;

        if systolic < 0.5 || diastolic < 0.5 {
            return Err(BloodPressureError::NonPositive {
                systolic,
                diastolic,
            });
        }
        BloodPressure::new(round_mmhg(systolic), round_mmhg(diastolic))
    }
}

impl TryFrom<String> for BloodPressure {
    type Error = BloodPressureError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BloodPressure> for String {
    fn from(bp: BloodPressure) -> Self {
        bp.to_string()
    }
}

/// A display snapshot of the patient's vital signs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VitalsSnapshot {
    /// Heart rate, beats/min.
    #[serde(rename = "HR")]
    pub hr: f64,
    #[serde(rename = "BP")]
    pub bp: BloodPressure,
    /// Oxygen saturation, percent.
    #[serde(rename = "SpO2")]
    pub spo2: f64,
    /// Respiratory rate, breaths/min.
    #[serde(rename = "RR")]
    pub rr: f64,
    /// Body temperature, degrees C.
    #[serde(rename = "Temp")]
    pub temp: f64,
    #[serde(rename = "Pain")]
    pub pain: u8,
}

impl VitalsSnapshot {
    /// Healthy adult resting values.
    pub fn baseline() -> Self {
        VitalsSnapshot {
            hr: 75.0,
            bp: BloodPressure::default(),
            spo2: 98.0,
            rr: 16.0,
            temp: 37.0,
            pain: 0,
        }
    }

    /// Seconds between heartbeats at this heart rate.
    pub fn beat_interval(&self) -> f64 {
        60.0 / self.hr.max(1.0)
    }
}

impl Default for VitalsSnapshot {
    fn default() -> Self {
        Self::baseline()
    }
}

/// One field of a target update. A target change is a list of these;
/// fields not mentioned keep their previous target.
#[derive(Debug, Clone, PartialEq)]
pub enum VitalUpdate {
    HeartRate(f64),
    BloodPressure(BloodPressure),
    /// Unparsed "systolic/diastolic" text as sent upstream.
    BloodPressureText(String),
    SpO2(f64),
    RespiratoryRate(f64),
    Temperature(f64),
    Pain(u8),
}

/// Partial vitals as they arrive in Scenario Director JSON, e.g.
/// `{"HR": 118, "BP": "94/58", "Pain": 7}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VitalsPatch {
    #[serde(rename = "HR", default, skip_serializing_if = "Option::is_none")]
    pub hr: Option<f64>,
    #[serde(rename = "BP", default, skip_serializing_if = "Option::is_none")]
    pub bp: Option<String>,
    #[serde(rename = "SpO2", default, skip_serializing_if = "Option::is_none")]
    pub spo2: Option<f64>,
    #[serde(rename = "RR", default, skip_serializing_if = "Option::is_none")]
    pub rr: Option<f64>,
    #[serde(rename = "Temp", default, skip_serializing_if = "Option::is_none")]
    pub temp: Option<f64>,
    #[serde(rename = "Pain", default, skip_serializing_if = "Option::is_none")]
    pub pain: Option<f64>,
}

impl VitalsPatch {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Convert into an explicit update set. A non-finite pain value is dropped.
    pub fn into_updates(self) -> Vec<VitalUpdate> {
        let mut updates = Vec::new();
        if let Some(hr) = self.hr {
            updates.push(VitalUpdate::HeartRate(hr));
        }
        if let Some(bp) = self.bp {
            updates.push(VitalUpdate::BloodPressureText(bp));
        }
        if let Some(spo2) = self.spo2 {
            updates.push(VitalUpdate::SpO2(spo2));
        }
        if let Some(rr) = self.rr {
            updates.push(VitalUpdate::RespiratoryRate(rr));
        }
        if let Some(temp) = self.temp {
            updates.push(VitalUpdate::Temperature(temp));
        }
        if let Some(pain) = self.pain.filter(|p| p.is_finite()) {
            updates.push(VitalUpdate::Pain(
                pain.round().clamp(0.0, MAX_PAIN as f64) as u8,
            ));
        }
        updates
    }
}

impl From<VitalsSnapshot> for VitalsPatch {
    fn from(v: VitalsSnapshot) -> Self {
        VitalsPatch {
            hr: Some(v.hr),
            bp: Some(v.bp.to_string()),
            spo2: Some(v.spo2),
            rr: Some(v.rr),
            temp: Some(v.temp),
            pain: Some(v.pain as f64),
        }
    }
}
