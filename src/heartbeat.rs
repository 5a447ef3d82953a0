//! Heartbeat Synthesizer: procedural "lub-dub".
//!
//! Each beat is two short triangle thumps. S1 ("lub") is lower and longer,
//! S2 ("dub") follows 120 ms later unless the beat interval is too short
//! for the two sounds to stay distinct. Every thump has an exponential
//! pitch drop to half its base frequency and a 10 ms linear attack followed
//! by an exponential decay.

use crate::dsp::oscillator::{Oscillator, Waveform};
use crate::dsp::param::AudioParam;

/// Linear attack time shared by both heart sounds, seconds.
pub const ATTACK: f64 = 0.01;
/// Gain the exponential decay ends on.
pub const DECAY_FLOOR: f64 = 0.001;

/// Static shape of one heart sound.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThumpShape {
    pub frequency: f64,
    pub duration: f64,
    pub peak: f64,
}

pub const S1: ThumpShape = ThumpShape {
    frequency: 150.0,
    duration: 0.08,
    peak: 0.5,
};

pub const S2: ThumpShape = ThumpShape {
    frequency: 200.0,
    duration: 0.06,
    peak: 0.4,
};

/// A heart sound placed on the audio clock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thump {
    /// Start time, seconds on the audio clock.
    pub start: f64,
    pub shape: ThumpShape,
}

impl Thump {
    pub fn end(&self) -> f64 {
        self.start + self.shape.duration
    }
}

/// The sounds making up one heartbeat.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Beat {
    pub s1: Thump,
    /// Absent when S1 and S2 would merge at very high rates.
    pub s2: Option<Thump>,
}

impl Beat {
    pub fn thumps(self) -> impl Iterator<Item = Thump> {
        std::iter::once(self.s1).chain(self.s2)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeartbeatSynth {
    pub s1: ThumpShape,
    pub s2: ThumpShape,
    /// Offset of S2 after S1 start, seconds.
    pub s2_delay: f64,
    /// S2 is only sounded when the beat interval exceeds this, seconds.
    pub merge_interval: f64,
}

impl Default for HeartbeatSynth {
    fn default() -> Self {
        HeartbeatSynth {
            s1: S1,
            s2: S2,
            s2_delay: 0.12,
            merge_interval: 0.25,
        }
    }
}

impl HeartbeatSynth {
    /// Lay out the beat starting at `time` given the interval to the next one.
    pub fn beat(&self, time: f64, interval: f64) -> Beat {
        let s2 = (interval > self.merge_interval).then(|| Thump {
            start: time + self.s2_delay,
            shape: self.s2,
        });
        Beat {
            s1: Thump {
                start: time,
                shape: self.s1,
            },
            s2,
        }
    }
}

/// A sounding thump: oscillator + gain, both automated on the audio clock.
/// Lives from `start` to `start + duration`, then is discarded.
#[derive(Debug, Clone)]
pub struct ThumpVoice {
    osc: Oscillator,
    frequency: AudioParam,
    gain: AudioParam,
    start: f64,
    stop: f64,
}

impl ThumpVoice {
    pub fn new(thump: Thump, sample_rate: f64) -> Self {
        let ThumpShape {
            frequency,
            duration,
            peak,
        } = thump.shape;
        let start = thump.start;

        let mut freq = AudioParam::new(frequency);
        freq.set_value_at_time(frequency, start);
        freq.exponential_ramp_to_value_at_time(frequency * 0.5, start + duration);

        let mut gain = AudioParam::new(0.0);
        gain.set_value_at_time(0.0, start);
        gain.linear_ramp_to_value_at_time(peak, start + ATTACK);
        gain.exponential_ramp_to_value_at_time(DECAY_FLOOR, start + duration);

        ThumpVoice {
            osc: Oscillator::new(Waveform::Triangle, frequency, sample_rate),
            frequency: freq,
            gain,
            start,
            stop: start + duration,
        }
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn has_started(&self, t: f64) -> bool {
        t >= self.start
    }

    pub fn is_finished(&self, t: f64) -> bool {
        t >= self.stop
    }

    /// Sample at audio time `t`; silent outside the voice's lifetime.
    pub fn next_sample(&mut self, t: f64) -> f64 {
        if t < self.start || t >= self.stop {
            return 0.0;
        }
        let f = self.frequency.value_at(t);
        let g = self.gain.value_at(t);
        self.osc.next_sample_at(f) * g
    }

    /// Current pitch, as last evaluated.
    pub fn current_frequency(&self) -> f64 {
        self.frequency.current()
    }

    pub fn current_gain(&self) -> f64 {
        self.gain.current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f64 = 44100.0;

    #[test]
    fn normal_rate_has_s2_after_120ms() {
        let synth = HeartbeatSynth::default();
        // HR 75 → 0.8 s between beats
        let beat = synth.beat(3.0, 60.0 / 75.0);
        let s2 = beat.s2.expect("S2 expected at 75 bpm");
        assert!((s2.start - 3.12).abs() < 1e-12);
        assert_eq!(s2.shape, S2);
        assert_eq!(beat.s1.shape, S1);
        assert_eq!(beat.thumps().count(), 2);
    }

    #[test]
    fn extreme_tachycardia_suppresses_s2() {
        let synth = HeartbeatSynth::default();
        // HR 250 → 0.24 s
        let beat = synth.beat(0.0, 60.0 / 250.0);
        assert!(beat.s2.is_none());
        assert_eq!(beat.thumps().count(), 1);
    }

    #[test]
    fn s2_boundary_is_exclusive() {
        let synth = HeartbeatSynth::default();
        assert!(synth.beat(0.0, 0.25).s2.is_none());
        assert!(synth.beat(0.0, 0.2501).s2.is_some());
    }

    fn render(voice: &mut ThumpVoice, from: f64, to: f64) -> Vec<(f64, f64)> {
        let n = ((to - from) * SR) as usize;
        (0..n)
            .map(|i| {
                let t = from + i as f64 / SR;
                (t, voice.next_sample(t))
            })
            .collect()
    }

    #[test]
    fn voice_is_silent_outside_lifetime() {
        let mut voice = ThumpVoice::new(
            Thump {
                start: 0.5,
                shape: S1,
            },
            SR,
        );
        let samples = render(&mut voice, 0.0, 1.0);
        for (t, s) in samples {
            if t < 0.5 || t >= 0.5 + S1.duration {
                assert_eq!(s, 0.0, "sound at {t}");
            }
        }
        assert!(voice.is_finished(0.5 + S1.duration));
    }

    #[test]
    fn envelope_peaks_after_attack_and_decays() {
        let mut voice = ThumpVoice::new(Thump { start: 0.0, shape: S1 }, SR);
        let mut peak_gain = 0.0f64;
        let mut t = 0.0;
        while t < S1.duration {
            voice.next_sample(t);
            if t <= ATTACK + 1.0 / SR {
                peak_gain = peak_gain.max(voice.current_gain());
            }
            t += 1.0 / SR;
        }
        assert!((peak_gain - S1.peak).abs() < 0.01, "peak {peak_gain}");
        assert!(voice.current_gain() < 0.002, "tail gain {}", voice.current_gain());
    }

    #[test]
    fn pitch_drops_to_half() {
        let mut voice = ThumpVoice::new(Thump { start: 0.0, shape: S2 }, SR);
        voice.next_sample(0.0);
        assert!((voice.current_frequency() - 200.0).abs() < 1e-9);
        let last = S2.duration - 1.0 / SR;
        voice.next_sample(last);
        assert!((voice.current_frequency() - 100.0).abs() < 0.1);
    }

    #[test]
    fn output_bounded_by_peak() {
        let mut voice = ThumpVoice::new(Thump { start: 0.0, shape: S1 }, SR);
        for (_, s) in render(&mut voice, 0.0, 0.1) {
            assert!(s.abs() <= S1.peak + 1e-9);
        }
    }
}
