//! One-pole high-pass filter with state carried across frames.

use std::f64::consts::PI;

/// `y[n] = alpha * (y[n-1] + x[n] - x[n-1])`
///
/// The filter is never reset between frames of a session, so running it on
/// consecutive frames is the same as running it on the unbroken stream.
#[derive(Debug, Clone)]
pub struct HighPassFilter {
    fs: f64,
    fc: f64,
    alpha: f64,
    prev_x: f64,
    prev_y: f64,
}

impl HighPassFilter {
    pub fn new(fs: f64, fc: f64) -> Self {
        let dt = 1.0 / fs;
        let rc = 1.0 / (2.0 * PI * fc);
        Self {
            fs,
            fc,
            alpha: rc / (rc + dt),
            prev_x: 0.0,
            prev_y: 0.0,
        }
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn sample_rate(&self) -> f64 {
        self.fs
    }

    pub fn cutoff(&self) -> f64 {
        self.fc
    }

    /// Filter `input` into `output` (same length), updating the carried state.
    pub fn process(&mut self, input: &[f64], output: &mut [f64]) {
        debug_assert_eq!(input.len(), output.len());
        let a = self.alpha;
        let mut prev_x = self.prev_x;
        let mut prev_y = self.prev_y;

        for (x, y) in input.iter().zip(output.iter_mut()) {
            let v = a * (prev_y + x - prev_x);
            *y = v;
            prev_y = v;
            prev_x = *x;
        }

        self.prev_x = prev_x;
        self.prev_y = prev_y;
    }
}
