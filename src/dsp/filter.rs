//! Biquad low-pass: matches WebAudio BiquadFilterNode "lowpass" coefficients.
//!
//! The cutoff is driven per sample by an automation curve, so coefficients
//! are recomputed lazily whenever the frequency actually moves.

use std::f64::consts::PI;

/// Highest usable cutoff as a fraction of the sample rate. Above Nyquist
/// the RBJ formulas put the poles on the unit circle.
const MAX_CUTOFF_RATIO: f64 = 0.45;

/// A 2nd-order IIR low-pass in Direct Form II Transposed.
/// Coefficient formulas from the Audio EQ Cookbook (Robert Bristow-Johnson).
#[derive(Debug, Clone)]
pub struct LowpassFilter {
    frequency: f64,
    q: f64,

    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,

    z1: f64,
    z2: f64,

    sample_rate: f64,
}

impl LowpassFilter {
    pub fn new(frequency: f64, q: f64, sample_rate: f64) -> Self {
        let mut f = LowpassFilter {
            frequency,
            q,
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
            z1: 0.0,
            z2: 0.0,
            sample_rate,
        };
        f.update_coefficients();
        f
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    /// Cutoff actually used for the coefficients.
    pub fn effective_frequency(&self) -> f64 {
        self.frequency
            .clamp(10.0, self.sample_rate * MAX_CUTOFF_RATIO)
    }

    fn update_coefficients(&mut self) {
        let w0 = 2.0 * PI * self.effective_frequency() / self.sample_rate;
        let cos_w0 = w0.cos();
        let alpha = w0.sin() / (2.0 * self.q);

        let b1 = 1.0 - cos_w0;
        let b0 = b1 / 2.0;
        let b2 = b0;
        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_w0;
        let a2 = 1.0 - alpha;

        self.b0 = b0 / a0;
        self.b1 = b1 / a0;
        self.b2 = b2 / a0;
        self.a1 = a1 / a0;
        self.a2 = a2 / a0;
    }

    /// Move the cutoff. Sub-millihertz changes are ignored.
    pub fn set_frequency(&mut self, freq: f64) {
        if (freq - self.frequency).abs() > 1e-3 {
            self.frequency = freq;
            self.update_coefficients();
        }
    }

    pub fn process(&mut self, input: f64) -> f64 {
        let output = self.b0 * input + self.z1;
        self.z1 = self.b1 * input - self.a1 * output + self.z2;
        self.z2 = self.b2 * input - self.a2 * output;
        output
    }

    pub fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone_amplitude(filter: &mut LowpassFilter, freq: f64) -> f64 {
        let mut max_out = 0.0_f64;
        for i in 0..8820 {
            let t = i as f64 / 44100.0;
            let out = filter.process((2.0 * PI * freq * t).sin());
            if i > 2000 {
                max_out = max_out.max(out.abs());
            }
        }
        max_out
    }

    #[test]
    fn passes_dc() {
        let mut f = LowpassFilter::new(5000.0, 1.0, 44100.0);
        let mut output = 0.0;
        for _ in 0..2000 {
            output = f.process(1.0);
        }
        assert!((output - 1.0).abs() < 0.001, "Lowpass should pass DC, got {output}");
    }

    #[test]
    fn open_filter_passes_heart_band() {
        let mut f = LowpassFilter::new(22000.0, 1.0, 44100.0);
        let amp = tone_amplitude(&mut f, 150.0);
        assert!((amp - 1.0).abs() < 0.05, "150 Hz should pass, got {amp}");
    }

    #[test]
    fn closed_filter_muffles_highs() {
        let mut f = LowpassFilter::new(400.0, 1.0, 44100.0);
        let amp = tone_amplitude(&mut f, 6000.0);
        assert!(amp < 0.01, "400 Hz lowpass should kill 6 kHz, got {amp}");
    }

    #[test]
    fn cutoff_above_nyquist_stays_stable() {
        let mut f = LowpassFilter::new(22000.0, 1.0, 32000.0);
        assert!(f.effective_frequency() < 16000.0);
        for i in 0..10000 {
            let input = if i % 100 == 0 { 1.0 } else { 0.0 };
            let out = f.process(input);
            assert!(out.is_finite() && out.abs() < 10.0, "unstable at sample {i}: {out}");
        }
    }

    #[test]
    fn sweeping_cutoff_stays_finite() {
        let mut f = LowpassFilter::new(22000.0, 1.0, 44100.0);
        for i in 0..44100 {
            f.set_frequency(22000.0 - 21600.0 * (i as f64 / 44100.0));
            let out = f.process(((i % 50) as f64 / 25.0) - 1.0);
            assert!(out.is_finite());
        }
        assert!((f.frequency() - 400.0).abs() < 1.0);
    }
}
