//! Per-block settings snapshot
//!
//! A plain value captured once per block by the parameter layer and read by
//! every stage of the engine. Out-of-range values are never an error: they
//! are clamped by [`Settings::sanitized`] before use.

use serde::{Deserialize, Serialize};

use crate::params::{ParamId, descriptor};

/// Largest decay the feedback loop accepts; 1.0 would make the tail diverge
pub const MAX_DECAY: f64 = 0.999;

/// Largest number of diffusion stages
pub const MAX_DIFFUSION_STEPS: u32 = 8;

/// Immutable control values for one block
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// 0 = feedback delay network. 1 is reserved and processed the same way.
    pub mode: u8,
    /// Master output gain (0.0-1.0)
    pub gain: f64,
    /// Blend between undamped and low-passed diffusion (0.0-1.0)
    pub damping: f64,
    /// Damping low-pass cutoff (200-4000 Hz)
    pub damping_frequency: f64,
    pub wet_level: f64,
    pub dry_level: f64,
    /// Reserved, not applied to the mix
    pub width: f64,
    /// Wet onset delay (0-500 ms)
    pub pre_delay_ms: f64,
    /// Number of diffusion stages (0-8)
    pub diffusion_steps: u32,
    /// Feedback loop gain, [0, 1)
    pub decay: f64,
    /// Hold the current tail and stop accepting new input
    pub freeze: bool,
    /// Reverse sample order within each block
    pub reverse: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mode: 0,
            gain: 0.5,
            damping: 0.5,
            damping_frequency: 2000.0,
            wet_level: 0.5,
            dry_level: 0.5,
            width: 0.5,
            pre_delay_ms: 30.0,
            diffusion_steps: 4,
            decay: 0.5,
            freeze: false,
            reverse: false,
        }
    }
}

impl Settings {
    /// Copy with every field clamped to its declared range
    pub fn sanitized(&self) -> Self {
        let clamp = |id: ParamId, value: f64| match descriptor(id) {
            Some(desc) => desc.range.constrain(value),
            None => value,
        };

        Self {
            mode: clamp(ParamId::MODE, f64::from(self.mode)) as u8,
            gain: clamp(ParamId::GAIN, self.gain),
            damping: clamp(ParamId::DAMPING, self.damping),
            damping_frequency: clamp(ParamId::DAMPING_FREQUENCY, self.damping_frequency),
            wet_level: clamp(ParamId::WET_LEVEL, self.wet_level),
            dry_level: clamp(ParamId::DRY_LEVEL, self.dry_level),
            width: clamp(ParamId::WIDTH, self.width),
            pre_delay_ms: clamp(ParamId::PRE_DELAY, self.pre_delay_ms),
            diffusion_steps: self.diffusion_steps.min(MAX_DIFFUSION_STEPS),
            decay: clamp(ParamId::DECAY, self.decay),
            freeze: self.freeze,
            reverse: self.reverse,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_in_range() {
        let settings = Settings::default();
        assert_eq!(settings.sanitized(), settings);
    }

    #[test]
    fn test_sanitized_clamps_every_field() {
        let wild = Settings {
            mode: 7,
            gain: 3.0,
            damping: -1.0,
            damping_frequency: 20.0,
            wet_level: f64::NAN,
            dry_level: f64::INFINITY,
            width: 2.0,
            pre_delay_ms: 9000.0,
            diffusion_steps: 40,
            decay: 1.0,
            freeze: true,
            reverse: true,
        };
        let s = wild.sanitized();
        assert_eq!(s.mode, 1);
        assert_eq!(s.gain, 1.0);
        assert_eq!(s.damping, 0.0);
        assert_eq!(s.damping_frequency, 200.0);
        assert_eq!(s.wet_level, 0.5);
        assert_eq!(s.dry_level, 0.5);
        assert_eq!(s.width, 1.0);
        assert_eq!(s.pre_delay_ms, 500.0);
        assert_eq!(s.diffusion_steps, MAX_DIFFUSION_STEPS);
        assert!(s.decay < 1.0);
        assert!(s.freeze && s.reverse);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let s: Settings = serde_json::from_str(r#"{ "decay": 0.8, "reverse": true }"#).unwrap();
        assert_eq!(s.decay, 0.8);
        assert!(s.reverse);
        assert_eq!(s.diffusion_steps, Settings::default().diffusion_steps);
    }
}
