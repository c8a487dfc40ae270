//! Per-channel low-pass damping
//!
//! One Transposed Direct Form II biquad per internal channel. The filtered
//! signal is crossfaded with the unfiltered one by the damping amount, so
//! `damping = 0` leaves the diffused signal untouched.

use rv_core::Sample;
use std::f64::consts::{FRAC_1_SQRT_2, PI};

use crate::{ChannelBuffers, INTERNAL_CHANNELS, MonoProcessor, Processor};

/// Butterworth quality factor
pub const DAMPING_Q: f64 = FRAC_1_SQRT_2;

/// Low-pass biquad coefficients, normalized by a0
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LowpassCoeffs {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

impl LowpassCoeffs {
    /// RBJ cookbook low-pass
    ///
    /// The cutoff is kept below Nyquist so the filter stays stable for any
    /// sample rate the engine accepts.
    pub fn new(freq: f64, q: f64, sample_rate: f64) -> Self {
        let freq = freq.clamp(1.0, sample_rate * 0.49);
        let omega = 2.0 * PI * freq / sample_rate;
        let sin_omega = omega.sin();
        let cos_omega = omega.cos();
        let alpha = sin_omega / (2.0 * q);

        let b0 = (1.0 - cos_omega) / 2.0;
        let b1 = 1.0 - cos_omega;
        let b2 = (1.0 - cos_omega) / 2.0;
        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_omega;
        let a2 = 1.0 - alpha;

        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }

    pub fn bypass() -> Self {
        Self {
            b0: 1.0,
            ..Self::default()
        }
    }
}

/// TDF-II low-pass section
#[derive(Debug, Clone)]
pub struct DampingFilter {
    coeffs: LowpassCoeffs,
    z1: f64,
    z2: f64,
}

impl DampingFilter {
    pub fn new() -> Self {
        Self {
            coeffs: LowpassCoeffs::bypass(),
            z1: 0.0,
            z2: 0.0,
        }
    }

    #[inline]
    pub fn set_coeffs(&mut self, coeffs: LowpassCoeffs) {
        self.coeffs = coeffs;
    }

    #[inline]
    pub fn coeffs(&self) -> &LowpassCoeffs {
        &self.coeffs
    }
}

impl Default for DampingFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl Processor for DampingFilter {
    fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }
}

impl MonoProcessor for DampingFilter {
    #[inline(always)]
    fn process_sample(&mut self, input: Sample) -> Sample {
        let output = self.coeffs.b0 * input + self.z1;
        self.z1 = self.coeffs.b1 * input - self.coeffs.a1 * output + self.z2;
        self.z2 = self.coeffs.b2 * input - self.coeffs.a2 * output;
        if !(self.z1.is_finite() && self.z2.is_finite()) {
            self.z1 = 0.0;
            self.z2 = 0.0;
            return 0.0;
        }
        output
    }
}

/// One damping filter per internal channel
#[derive(Debug, Clone)]
pub struct DampingBank {
    filters: [DampingFilter; INTERNAL_CHANNELS],
    sample_rate: f64,
}

impl DampingBank {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            filters: std::array::from_fn(|_| DampingFilter::new()),
            sample_rate,
        }
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.reset();
    }

    /// Recompute every channel's coefficients for `cutoff_hz`
    pub fn set_cutoff(&mut self, cutoff_hz: f64) {
        let coeffs = LowpassCoeffs::new(cutoff_hz, DAMPING_Q, self.sample_rate);
        for filter in &mut self.filters {
            filter.set_coeffs(coeffs);
        }
    }

    /// Filter `frames` samples of each channel in place, blended by `amount`
    pub fn process(&mut self, buffers: &mut ChannelBuffers, frames: usize, amount: f64) {
        let amount = amount.clamp(0.0, 1.0);
        let dry = 1.0 - amount;
        for (filter, channel) in self.filters.iter_mut().zip(buffers.iter_mut()) {
            let frames = frames.min(channel.len());
            for sample in &mut channel[..frames] {
                let damped = filter.process_sample(*sample);
                *sample = damped * amount + *sample * dry;
            }
        }
    }
}

impl Processor for DampingBank {
    fn reset(&mut self) {
        for filter in &mut self.filters {
            filter.reset();
        }
    }
}
