use thiserror::Error;

/// A blood-pressure reading that could not be understood.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BloodPressureError {
    #[error("missing '/' separator in blood pressure '{text}'")]
    MissingSeparator { text: String },
    #[error("non-numeric component '{component}' in blood pressure '{text}'")]
    NotANumber { text: String, component: String },
    #[error("blood pressure components must be positive, got {systolic}/{diastolic}")]
    NonPositive { systolic: f64, diastolic: f64 },
    #[error("systolic {systolic} must exceed diastolic {diastolic}")]
    Inverted { systolic: u16, diastolic: u16 },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid config value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("no audio output device available")]
    NoOutputDevice,
    #[error("output device configuration failed: {0}")]
    DeviceConfig(String),
    #[error("failed to build output stream: {0}")]
    BuildStream(String),
    #[error("failed to start output stream: {0}")]
    Play(String),
    #[error("failed to spawn scheduler thread: {0}")]
    ThreadSpawn(#[source] std::io::Error),
    #[error("render duration {seconds} s is not within [0, {max}] s")]
    RenderDuration { seconds: f64, max: f64 },
    #[error("WAV encoding failed: {0}")]
    Wav(#[from] hound::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
