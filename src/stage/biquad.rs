//! A second-order low-pass filter with runtime retuning

use std::f64::consts::PI;

/// Filter quality factor, fixed for a single-stage Butterworth response.
pub const FILTER_Q: f64 = std::f64::consts::FRAC_1_SQRT_2;

/// Direct-form-I biquad low-pass filter for one channel.
///
/// Coefficients are stored already normalized by the design-time `a0`
/// denominator term, so applying a sample never divides. The delay line is
/// zeroed whenever the coefficients are recomputed; mixing old history with
/// new coefficients is never allowed.
#[derive(Clone, Debug, Default)]
pub struct Biquad {
    // Normalized coefficients: b* numerator, a* denominator
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,

    // Delay elements
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

impl Biquad {
    /// Build a filter designed for the given cutoff and sample rate.
    pub fn low_pass(cutoff_hz: f64, sample_rate_hz: f64) -> Self {
        let mut filt = Self::default();
        filt.set_low_pass(cutoff_hz, sample_rate_hz);
        filt
    }

    /// Recompute the low-pass coefficients via the bilinear-transform design
    /// and zero the delay line. Callable at any time to retune a live
    /// channel.
    ///
    /// Inputs are not validated against the Nyquist limit; the caller is
    /// responsible for keeping `cutoff_hz < sample_rate_hz / 2`.
    pub fn set_low_pass(&mut self, cutoff_hz: f64, sample_rate_hz: f64) {
        let omega = 2.0 * PI * cutoff_hz / sample_rate_hz;
        let (sinw, cosw) = omega.sin_cos();
        let alpha = sinw / (2.0 * FILTER_Q);

        let b1 = 1.0 - cosw;
        let b0 = 0.5 * b1;
        let a0 = 1.0 + alpha;

        self.b0 = b0 / a0;
        self.b1 = b1 / a0;
        self.b2 = b0 / a0;
        self.a1 = -2.0 * cosw / a0;
        self.a2 = (1.0 - alpha) / a0;

        self.reset();
    }

    /// Zero the delay line.
    pub fn reset(&mut self) {
        self.x1 = 0.0;
        self.x2 = 0.0;
        self.y1 = 0.0;
        self.y2 = 0.0;
    }

    /// Apply one sample and shift the delay line.
    pub fn update(&mut self, x: f64) -> f64 {
        let y = self.b0 * x + self.b1 * self.x1 + self.b2 * self.x2
            - self.a1 * self.y1
            - self.a2 * self.y2;

        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = y;

        y
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn designed_low_pass_has_unit_dc_gain() {
        let pairs = [
            (10.0, 1000.0),
            (100.0, 10_000.0),
            (250.0, 10_000.0),
            (1000.0, 48_000.0),
            (4000.0, 10_000.0),
        ];

        for (fc, fs) in pairs {
            let filt = Biquad::low_pass(fc, fs);
            let dc_gain = (filt.b0 + filt.b1 + filt.b2) / (1.0 + filt.a1 + filt.a2);
            assert!(
                (dc_gain - 1.0).abs() < 1e-12,
                "DC gain for fc={fc} fs={fs} is {dc_gain}"
            );
        }
    }

    #[test]
    fn replaying_identical_input_is_bit_identical() {
        let mut a = Biquad::low_pass(100.0, 10_000.0);
        let mut b = Biquad::low_pass(100.0, 10_000.0);

        for i in 0..1000 {
            let x = (i as f64 * 0.37).sin() * 5.0;
            let ya = a.update(x);
            let yb = b.update(x);
            assert_eq!(ya.to_bits(), yb.to_bits(), "divergence at sample {i}");
        }
    }

    #[test]
    fn step_input_converges_to_input_level() {
        let mut filt = Biquad::low_pass(100.0, 10_000.0);

        let mut y = 0.0;
        for _ in 0..20_000 {
            y = filt.update(5.0);
        }

        assert!((y - 5.0).abs() < 1e-9, "steady-state output is {y}");
    }

    #[test]
    fn retune_zeroes_the_delay_line() {
        let mut filt = Biquad::low_pass(100.0, 10_000.0);
        for _ in 0..100 {
            filt.update(3.0);
        }
        assert!(filt.y1 != 0.0);

        filt.set_low_pass(50.0, 10_000.0);
        assert_eq!(filt.x1, 0.0);
        assert_eq!(filt.x2, 0.0);
        assert_eq!(filt.y1, 0.0);
        assert_eq!(filt.y2, 0.0);
    }
}
