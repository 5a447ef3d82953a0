//! Offline renderer: a deterministic auscultation take on one thread.
//!
//! Instead of a device callback and a scheduler thread, the driver is
//! ticked once per tick interval of audio time and the graph renders the
//! slice in between. The result depends only on the inputs and the config.

use std::io::Cursor;

use tracing::debug;

use crate::config::AudioConfig;
use crate::dsp::graph::{GraphCommand, SignalGraph};
use crate::error::AudioError;
use crate::scheduler::{HeartbeatDriver, LookaheadScheduler};
use crate::vitals::VitalsSnapshot;

/// Longest take `render_auscultation` accepts, seconds.
pub const MAX_RENDER_SECS: f64 = 600.0;

/// Render `seconds` of mono audio at `config.sample_rate` for a patient
/// with these vitals, heard with the given stethoscope placement quality.
/// Negative durations give an empty take; non-finite ones or anything past
/// [`MAX_RENDER_SECS`] are rejected.
///
/// Tunneling and stethoscope mix start settled at their targets.
pub fn render_auscultation(
    vitals: &VitalsSnapshot,
    quality: f64,
    seconds: f64,
    config: &AudioConfig,
) -> Result<Vec<f32>, AudioError> {
    if !seconds.is_finite() || seconds > MAX_RENDER_SECS {
        return Err(AudioError::RenderDuration {
            seconds,
            max: MAX_RENDER_SECS,
        });
    }
    config.validate()?;

    let sample_rate = config.sample_rate as f64;
    let mut graph = SignalGraph::new(config, sample_rate, false);
    let mut driver = HeartbeatDriver::new(
        LookaheadScheduler::new(config.start_offset, config.lookahead),
        vitals.hr,
        false,
    );
    for command in driver
        .update_vitals(vitals)
        .into_iter()
        .chain(driver.set_stethoscope_quality(quality))
    {
        graph.apply(settled(command));
    }

    let total = (seconds.max(0.0) * sample_rate).round() as usize;
    let slice = ((config.tick_interval_secs() * sample_rate).round() as usize).max(1);
    debug!(total, slice, hr = vitals.hr, quality, "offline render");

    let mut out = Vec::with_capacity(total);
    while out.len() < total {
        driver.tick(graph.now(), |command| graph.apply(command));
        let frames = slice.min(total - out.len());
        out.extend(graph.render_mono(frames));
    }
    Ok(out)
}

fn settled(command: GraphCommand) -> GraphCommand {
    match command {
        GraphCommand::SetTarget { param, value, .. } => GraphCommand::SetTarget {
            param,
            value,
            time_constant: 0.0,
        },
        other => other,
    }
}

/// Encode mono f32 samples as a 16-bit PCM WAV file in memory.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>, AudioError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::with_capacity(44 + samples.len() * 2));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for &s in samples {
            writer.write_sample((s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vitals(hr: f64) -> VitalsSnapshot {
        VitalsSnapshot {
            hr,
            ..VitalsSnapshot::baseline()
        }
    }

    fn peak(samples: &[f32]) -> f32 {
        samples.iter().fold(0.0f32, |m, s| m.max(s.abs()))
    }

    fn window(samples: &[f32], from: f64, to: f64) -> &[f32] {
        let sr = AudioConfig::default().sample_rate as f64;
        &samples[(from * sr) as usize..(to * sr) as usize]
    }

    #[test]
    fn renders_requested_length() {
        let config = AudioConfig::default();
        let out = render_auscultation(&vitals(75.0), 1.0, 1.5, &config).unwrap();
        assert_eq!(out.len(), 66150);
        assert!(render_auscultation(&vitals(75.0), 1.0, -1.0, &config).unwrap().is_empty());
    }

    #[test]
    fn render_is_deterministic() {
        let config = AudioConfig::default();
        let a = render_auscultation(&vitals(110.0), 0.6, 1.0, &config).unwrap();
        let b = render_auscultation(&vitals(110.0), 0.6, 1.0, &config).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn silent_until_first_beat() {
        let out = render_auscultation(&vitals(60.0), 1.0, 1.0, &AudioConfig::default()).unwrap();
        assert_eq!(peak(window(&out, 0.0, 0.1)), 0.0);
        assert!(peak(window(&out, 0.1, 0.2)) > 0.1);
    }

    #[test]
    fn beats_repeat_at_heart_rate() {
        // HR 60: S1 at 0.1, 1.1, 2.1; S2 at 0.22, 1.22, 2.22
        let out = render_auscultation(&vitals(60.0), 1.0, 3.0, &AudioConfig::default()).unwrap();
        for start in [0.1, 1.1, 2.1] {
            assert!(peak(window(&out, start, start + 0.08)) > 0.1, "no S1 at {start}");
            assert!(peak(window(&out, start + 0.3, start + 0.95)) < 1e-3, "sound between beats after {start}");
        }
    }

    #[test]
    fn misplaced_stethoscope_hears_only_friction() {
        let out = render_auscultation(&vitals(75.0), 0.0, 1.0, &AudioConfig::default()).unwrap();
        let p = peak(&out);
        assert!(p > 0.03, "noise too quiet: {p}");
        assert!(p <= 0.076, "heart leaked through: {p}");
    }

    #[test]
    fn tachycardia_rings_between_beats() {
        // HR 180: beat at 0.1, S2 until 0.28, next beat at 0.433
        let out = render_auscultation(&vitals(180.0), 1.0, 0.5, &AudioConfig::default()).unwrap();
        let ring = peak(window(&out, 0.31, 0.42));
        assert!(ring > 0.045 && ring < 0.051, "tinnitus peak {ring}");
    }

    #[test]
    fn unbounded_durations_are_rejected() {
        let config = AudioConfig::default();
        for seconds in [f64::INFINITY, f64::NAN, 1e12, MAX_RENDER_SECS + 1.0] {
            let result = render_auscultation(&vitals(75.0), 1.0, seconds, &config);
            assert!(
                matches!(result, Err(AudioError::RenderDuration { .. })),
                "{seconds} accepted"
            );
        }
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = AudioConfig {
            start_offset: f64::NAN,
            ..AudioConfig::default()
        };
        let result = render_auscultation(&vitals(75.0), 1.0, 1.0, &config);
        assert!(matches!(result, Err(AudioError::Config(_))));
    }

    #[test]
    fn wav_round_trips_through_hound() {
        let samples = [0.0, 0.5, -0.5, 1.0, -2.0];
        let bytes = encode_wav(&samples, 22050).unwrap();
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");

        let mut reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 22050);
        assert_eq!(spec.bits_per_sample, 16);
        let decoded: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(decoded, vec![0, 16383, -16383, 32767, -32767]);
    }
}
