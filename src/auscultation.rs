//! Auscultation Mixer: clean heart sound vs. friction noise by
//! stethoscope placement quality.

/// Noise gain at the worst placement.
pub const MAX_NOISE_GAIN: f64 = 0.15;
/// Time constant for both gain approaches, seconds.
pub const TIME_CONSTANT: f64 = 0.1;

/// Gain targets for the heart-sound bus and the noise source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MixTargets {
    pub heart_gain: f64,
    pub noise_gain: f64,
}

impl MixTargets {
    /// `quality` is 0 for a fully mis-placed chest piece and 1 for a perfect
    /// placement. Out-of-range values are clamped; NaN counts as 0.
    ///
    /// Heart gain falls off quadratically so small placement errors barely
    /// matter; noise stays under the signal even at q = 0.
    pub fn for_quality(quality: f64) -> Self {
        let q = if quality.is_nan() {
            0.0
        } else {
            quality.clamp(0.0, 1.0)
        };
        MixTargets {
            heart_gain: q * q,
            noise_gain: (1.0 - q) * MAX_NOISE_GAIN,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_placement() {
        let m = MixTargets::for_quality(1.0);
        assert_eq!(m.heart_gain, 1.0);
        assert_eq!(m.noise_gain, 0.0);
    }

    #[test]
    fn missed_placement() {
        let m = MixTargets::for_quality(0.0);
        assert_eq!(m.heart_gain, 0.0);
        assert!((m.noise_gain - 0.15).abs() < 1e-12);
    }

    #[test]
    fn quadratic_sweet_spot() {
        let m = MixTargets::for_quality(0.9);
        assert!((m.heart_gain - 0.81).abs() < 1e-12);
        let m = MixTargets::for_quality(0.5);
        assert!((m.heart_gain - 0.25).abs() < 1e-12);
        assert!((m.noise_gain - 0.075).abs() < 1e-12);
    }

    #[test]
    fn clamps_out_of_range() {
        assert_eq!(MixTargets::for_quality(3.0), MixTargets::for_quality(1.0));
        assert_eq!(MixTargets::for_quality(-1.0), MixTargets::for_quality(0.0));
        assert_eq!(MixTargets::for_quality(f64::NAN), MixTargets::for_quality(0.0));
    }
}
