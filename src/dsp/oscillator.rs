//! Phase-accumulating oscillators.
//!
//! Frequency may change every sample (pitch-drop envelopes), so the phase
//! increment is recomputed per call rather than cached.

use std::f64::consts::PI;

/// Supported waveform shapes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Waveform {
    Sine,
    Triangle,
}

#[derive(Debug, Clone)]
pub struct Oscillator {
    pub waveform: Waveform,
    pub frequency: f64,
    phase: f64,
    sample_rate: f64,
}

impl Oscillator {
    pub fn new(waveform: Waveform, frequency: f64, sample_rate: f64) -> Self {
        Oscillator {
            waveform,
            frequency,
            phase: 0.0,
            sample_rate,
        }
    }

    /// Generate the next sample at the current `frequency`.
    pub fn next_sample(&mut self) -> f64 {
        let sample = match self.waveform {
            Waveform::Sine => (2.0 * PI * self.phase).sin(),
            Waveform::Triangle => triangle(self.phase),
        };

        self.phase += self.frequency / self.sample_rate;
        self.phase -= self.phase.floor();

        sample
    }

    /// Generate the next sample at `frequency`, updating it first.
    pub fn next_sample_at(&mut self, frequency: f64) -> f64 {
        self.frequency = frequency;
        self.next_sample()
    }

    pub fn reset(&mut self) {
        self.phase = 0.0;
    }
}

/// Triangle that starts at zero and rises, like a sine:
/// 0 → +1 at 1/4, → -1 at 3/4, → 0 at 1.
fn triangle(phase: f64) -> f64 {
    if phase < 0.25 {
        4.0 * phase
    } else if phase < 0.75 {
        2.0 - 4.0 * phase
    } else {
        4.0 * phase - 4.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sine_zero_at_start() {
        let mut osc = Oscillator::new(Waveform::Sine, 6000.0, 44100.0);
        let sample = osc.next_sample();
        assert!(sample.abs() < 1e-10, "Sine should start near 0, got {sample}");
    }

    #[test]
    fn triangle_zero_at_start() {
        let mut osc = Oscillator::new(Waveform::Triangle, 150.0, 44100.0);
        assert_eq!(osc.next_sample(), 0.0);
    }

    #[test]
    fn triangle_range_and_peaks() {
        let mut osc = Oscillator::new(Waveform::Triangle, 150.0, 44100.0);
        let mut max = f64::MIN;
        let mut min = f64::MAX;
        for _ in 0..44100 {
            let s = osc.next_sample();
            assert!((-1.0..=1.0).contains(&s), "Triangle out of range: {s}");
            max = max.max(s);
            min = min.min(s);
        }
        assert!(max > 0.99 && min < -0.99);
    }

    #[test]
    fn sine_range() {
        let mut osc = Oscillator::new(Waveform::Sine, 6000.0, 44100.0);
        for _ in 0..44100 {
            let s = osc.next_sample();
            assert!((-1.0..=1.0).contains(&s), "Sine out of range: {s}");
        }
    }

    #[test]
    fn halving_frequency_halves_zero_crossings() {
        let count = |freq: f64| {
            let mut osc = Oscillator::new(Waveform::Triangle, freq, 48000.0);
            let mut prev = osc.next_sample();
            let mut crossings = 0;
            for _ in 0..48000 {
                let s = osc.next_sample_at(freq);
                if prev < 0.0 && s >= 0.0 {
                    crossings += 1;
                }
                prev = s;
            }
            crossings
        };
        let full = count(200.0);
        let half = count(100.0);
        assert!((full as i32 - 2 * half as i32).abs() <= 1, "{full} vs {half}");
    }
}
