//! rv-core: Shared types, traits, and utilities for Reverie
//!
//! This crate provides the foundational types used across all Reverie crates.

mod error;
mod params;
mod sample;
mod settings;

pub use error::*;
pub use params::*;
pub use sample::*;
pub use settings::*;

use serde::{Deserialize, Serialize};

/// Host configuration handed to an engine once, before processing starts
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProcessSpec {
    /// Sample rate in Hz
    pub sample_rate: f64,
    /// Largest number of frames a single block may carry
    pub max_block_size: usize,
    /// Host channel count
    pub channel_count: usize,
}

impl ProcessSpec {
    pub fn new(sample_rate: f64, max_block_size: usize, channel_count: usize) -> Self {
        Self {
            sample_rate,
            max_block_size,
            channel_count,
        }
    }

    /// Check the spec before any buffer is sized from it
    pub fn validate(&self) -> RvResult<()> {
        if !self.sample_rate.is_finite() || self.sample_rate < 1000.0 || self.sample_rate > 768_000.0
        {
            return Err(RvError::InvalidSampleRate(self.sample_rate));
        }
        if self.max_block_size == 0 {
            return Err(RvError::InvalidParam(
                "max_block_size must be at least 1".into(),
            ));
        }
        if self.channel_count == 0 {
            return Err(RvError::InvalidParam(
                "channel_count must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Convert milliseconds to whole samples at this rate
    #[inline]
    pub fn ms_to_samples(&self, ms: f64) -> usize {
        (ms * 0.001 * self.sample_rate).round().max(0.0) as usize
    }
}

impl Default for ProcessSpec {
    fn default() -> Self {
        Self::new(48000.0, 512, 2)
    }
}

/// Decibel value wrapper
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Decibels(pub f64);

impl Decibels {
    pub const ZERO: Self = Self(0.0);
    pub const NEG_INF: Self = Self(f64::NEG_INFINITY);

    #[inline]
    pub fn from_gain(gain: f64) -> Self {
        if gain <= 0.0 {
            Self::NEG_INF
        } else {
            Self(20.0 * gain.log10())
        }
    }

    #[inline]
    pub fn to_gain(self) -> f64 {
        if self.0 <= -144.0 {
            0.0
        } else {
            10.0_f64.powf(self.0 / 20.0)
        }
    }
}

impl Default for Decibels {
    fn default() -> Self {
        Self::ZERO
    }
}
