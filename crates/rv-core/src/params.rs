//! Parameter types for the reverb engine
//!
//! The host-facing parameter layer is a collaborator of the engine, not part
//! of it: it owns the live values and hands the engine one immutable
//! [`Settings`] snapshot per block.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::settings::Settings;

/// Parameter ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParamId(pub u32);

impl ParamId {
    pub const MODE: Self = Self(0);
    pub const GAIN: Self = Self(1);
    pub const DAMPING: Self = Self(2);
    pub const DAMPING_FREQUENCY: Self = Self(3);
    pub const WET_LEVEL: Self = Self(4);
    pub const DRY_LEVEL: Self = Self(5);
    pub const WIDTH: Self = Self(6);
    pub const PRE_DELAY: Self = Self(7);
    pub const DIFFUSION_STEPS: Self = Self(8);
    pub const DECAY: Self = Self(9);
    pub const FREEZE: Self = Self(10);
    pub const REVERSE: Self = Self(11);

    /// Number of declared parameters
    pub const COUNT: usize = 12;

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Atomic parameter for lock-free access
pub struct AtomicParam {
    bits: AtomicU64,
}

impl AtomicParam {
    pub fn new(value: f64) -> Self {
        Self {
            bits: AtomicU64::new(value.to_bits()),
        }
    }

    #[inline]
    pub fn get(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }

    #[inline]
    pub fn set(&self, value: f64) {
        self.bits.store(value.to_bits(), Ordering::Release);
    }
}

impl Default for AtomicParam {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl std::fmt::Debug for AtomicParam {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("AtomicParam").field(&self.get()).finish()
    }
}

/// Parameter skew type
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ParamSkew {
    Linear,
    Logarithmic,
    /// Integer steps between min and max
    Stepped,
    /// Off/on switch, stored as 0.0 / 1.0
    Toggle,
}

/// Parameter range specification
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParamRange {
    pub min: f64,
    pub max: f64,
    pub default: f64,
    pub skew: ParamSkew,
}

impl ParamRange {
    pub const fn linear(min: f64, max: f64, default: f64) -> Self {
        Self {
            min,
            max,
            default,
            skew: ParamSkew::Linear,
        }
    }

    pub const fn logarithmic(min: f64, max: f64, default: f64) -> Self {
        Self {
            min,
            max,
            default,
            skew: ParamSkew::Logarithmic,
        }
    }

    pub const fn stepped(min: f64, max: f64, default: f64) -> Self {
        Self {
            min,
            max,
            default,
            skew: ParamSkew::Stepped,
        }
    }

    pub const fn toggle(default: bool) -> Self {
        Self {
            min: 0.0,
            max: 1.0,
            default: if default { 1.0 } else { 0.0 },
            skew: ParamSkew::Toggle,
        }
    }

    /// Clamp a plain value into range; non-finite values fall back to the default
    pub fn constrain(&self, value: f64) -> f64 {
        if !value.is_finite() {
            return self.default;
        }
        let clamped = value.clamp(self.min, self.max);
        match self.skew {
            ParamSkew::Stepped => clamped.round(),
            ParamSkew::Toggle => {
                if clamped >= 0.5 {
                    1.0
                } else {
                    0.0
                }
            }
            ParamSkew::Linear | ParamSkew::Logarithmic => clamped,
        }
    }

    /// Denormalize a 0-1 value to actual value
    pub fn denormalize(&self, normalized: f64) -> f64 {
        let normalized = if normalized.is_finite() {
            normalized.clamp(0.0, 1.0)
        } else {
            return self.default;
        };
        let value = match self.skew {
            ParamSkew::Logarithmic => {
                let log_min = self.min.ln();
                let log_max = self.max.ln();
                (log_min + normalized * (log_max - log_min)).exp()
            }
            _ => self.min + normalized * (self.max - self.min),
        };
        self.constrain(value)
    }

    /// Normalize an actual value to 0-1
    pub fn normalize(&self, value: f64) -> f64 {
        let clamped = self.constrain(value);
        if self.max <= self.min {
            return 0.0;
        }
        match self.skew {
            ParamSkew::Logarithmic => {
                let log_min = self.min.ln();
                let log_max = self.max.ln();
                (clamped.ln() - log_min) / (log_max - log_min)
            }
            _ => (clamped - self.min) / (self.max - self.min),
        }
    }
}

/// Declared parameter
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ParamDescriptor {
    pub id: ParamId,
    pub name: &'static str,
    pub unit: &'static str,
    pub range: ParamRange,
}

/// The reverb's parameter table, indexed by [`ParamId`]
pub static PARAM_LAYOUT: [ParamDescriptor; ParamId::COUNT] = [
    ParamDescriptor {
        id: ParamId::MODE,
        name: "Mode",
        unit: "",
        range: ParamRange::stepped(0.0, 1.0, 0.0),
    },
    ParamDescriptor {
        id: ParamId::GAIN,
        name: "Gain",
        unit: "",
        range: ParamRange::linear(0.0, 1.0, 0.5),
    },
    ParamDescriptor {
        id: ParamId::DAMPING,
        name: "Damping",
        unit: "",
        range: ParamRange::linear(0.0, 1.0, 0.5),
    },
    ParamDescriptor {
        id: ParamId::DAMPING_FREQUENCY,
        name: "Damping Frequency",
        unit: "Hz",
        range: ParamRange::logarithmic(200.0, 4000.0, 2000.0),
    },
    ParamDescriptor {
        id: ParamId::WET_LEVEL,
        name: "Wet Level",
        unit: "",
        range: ParamRange::linear(0.0, 1.0, 0.5),
    },
    ParamDescriptor {
        id: ParamId::DRY_LEVEL,
        name: "Dry Level",
        unit: "",
        range: ParamRange::linear(0.0, 1.0, 0.5),
    },
    ParamDescriptor {
        id: ParamId::WIDTH,
        name: "Width",
        unit: "",
        range: ParamRange::linear(0.0, 1.0, 0.5),
    },
    ParamDescriptor {
        id: ParamId::PRE_DELAY,
        name: "Pre-Delay",
        unit: "ms",
        range: ParamRange::linear(0.0, 500.0, 30.0),
    },
    ParamDescriptor {
        id: ParamId::DIFFUSION_STEPS,
        name: "Diffusion Steps",
        unit: "",
        range: ParamRange::stepped(0.0, 8.0, 4.0),
    },
    ParamDescriptor {
        id: ParamId::DECAY,
        name: "Decay",
        unit: "",
        range: ParamRange::linear(0.0, crate::settings::MAX_DECAY, 0.5),
    },
    ParamDescriptor {
        id: ParamId::FREEZE,
        name: "Freeze Mode",
        unit: "",
        range: ParamRange::toggle(false),
    },
    ParamDescriptor {
        id: ParamId::REVERSE,
        name: "Reverse",
        unit: "",
        range: ParamRange::toggle(false),
    },
];

/// Look up a declared parameter
pub fn descriptor(id: ParamId) -> Option<&'static ParamDescriptor> {
    PARAM_LAYOUT.get(id.index())
}

/// Look up a declared parameter by display name (case-insensitive)
pub fn descriptor_by_name(name: &str) -> Option<&'static ParamDescriptor> {
    PARAM_LAYOUT
        .iter()
        .find(|desc| desc.name.eq_ignore_ascii_case(name))
}

/// Maximum attempts to capture a snapshot without a concurrent write
const SNAPSHOT_ATTEMPTS: usize = 4;

/// Lock-free live parameter values
///
/// Written from a control thread, read from the audio thread through
/// [`ParamStore::snapshot`]. Every field is an independent atomic; a
/// generation counter lets the reader detect a write that raced the copy and
/// retry a bounded number of times.
#[derive(Debug)]
pub struct ParamStore {
    values: [AtomicParam; ParamId::COUNT],
    generation: AtomicU64,
}

impl ParamStore {
    pub fn new() -> Self {
        Self {
            values: std::array::from_fn(|i| AtomicParam::new(PARAM_LAYOUT[i].range.default)),
            generation: AtomicU64::new(0),
        }
    }

    /// Store a plain value, constrained to the parameter's range
    pub fn set(&self, id: ParamId, value: f64) {
        if let Some(desc) = descriptor(id) {
            self.values[id.index()].set(desc.range.constrain(value));
            self.generation.fetch_add(1, Ordering::AcqRel);
        }
    }

    /// Store a normalized (0-1) value
    pub fn set_normalized(&self, id: ParamId, normalized: f64) {
        if let Some(desc) = descriptor(id) {
            self.set(id, desc.range.denormalize(normalized));
        }
    }

    pub fn get(&self, id: ParamId) -> Option<f64> {
        self.values.get(id.index()).map(AtomicParam::get)
    }

    /// Copy every field into one immutable settings value
    pub fn snapshot(&self) -> Settings {
        let mut attempt = 1;
        loop {
            let before = self.generation.load(Ordering::Acquire);
            let settings = self.read_fields();
            if attempt >= SNAPSHOT_ATTEMPTS || self.generation.load(Ordering::Acquire) == before {
                return settings;
            }
            attempt += 1;
        }
    }

    /// Load every field from a settings value
    pub fn apply(&self, settings: &Settings) {
        self.set(ParamId::MODE, f64::from(settings.mode));
        self.set(ParamId::GAIN, settings.gain);
        self.set(ParamId::DAMPING, settings.damping);
        self.set(ParamId::DAMPING_FREQUENCY, settings.damping_frequency);
        self.set(ParamId::WET_LEVEL, settings.wet_level);
        self.set(ParamId::DRY_LEVEL, settings.dry_level);
        self.set(ParamId::WIDTH, settings.width);
        self.set(ParamId::PRE_DELAY, settings.pre_delay_ms);
        self.set(ParamId::DIFFUSION_STEPS, f64::from(settings.diffusion_steps));
        self.set(ParamId::DECAY, settings.decay);
        self.set(ParamId::FREEZE, if settings.freeze { 1.0 } else { 0.0 });
        self.set(ParamId::REVERSE, if settings.reverse { 1.0 } else { 0.0 });
    }

    fn read_fields(&self) -> Settings {
        let value = |id: ParamId| self.values[id.index()].get();
        Settings {
            mode: value(ParamId::MODE) as u8,
            gain: value(ParamId::GAIN),
            damping: value(ParamId::DAMPING),
            damping_frequency: value(ParamId::DAMPING_FREQUENCY),
            wet_level: value(ParamId::WET_LEVEL),
            dry_level: value(ParamId::DRY_LEVEL),
            width: value(ParamId::WIDTH),
            pre_delay_ms: value(ParamId::PRE_DELAY),
            diffusion_steps: value(ParamId::DIFFUSION_STEPS) as u32,
            decay: value(ParamId::DECAY),
            freeze: value(ParamId::FREEZE) >= 0.5,
            reverse: value(ParamId::REVERSE) >= 0.5,
        }
    }
}

impl Default for ParamStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_layout_is_indexed_by_id() {
        for (i, desc) in PARAM_LAYOUT.iter().enumerate() {
            assert_eq!(desc.id.index(), i, "{} out of place", desc.name);
            assert!(desc.range.min <= desc.range.default);
            assert!(desc.range.default <= desc.range.max);
        }
    }

    #[test]
    fn test_constrain_clamps_and_rounds() {
        let steps = descriptor(ParamId::DIFFUSION_STEPS).unwrap().range;
        assert_eq!(steps.constrain(-3.0), 0.0);
        assert_eq!(steps.constrain(3.6), 4.0);
        assert_eq!(steps.constrain(12.0), 8.0);
        assert_eq!(steps.constrain(f64::NAN), 4.0);
    }

    #[test]
    fn test_log_range_roundtrip_endpoints() {
        let freq = descriptor(ParamId::DAMPING_FREQUENCY).unwrap().range;
        assert_relative_eq!(freq.denormalize(0.0), 200.0, epsilon = 1e-9);
        assert_relative_eq!(freq.denormalize(1.0), 4000.0, epsilon = 1e-6);
        assert_relative_eq!(freq.normalize(freq.denormalize(0.3)), 0.3, epsilon = 1e-9);
    }

    #[test]
    fn test_store_defaults_match_layout() {
        let store = ParamStore::new();
        let settings = store.snapshot();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_store_clamps_writes() {
        let store = ParamStore::new();
        store.set(ParamId::DECAY, 1.5);
        store.set(ParamId::PRE_DELAY, -10.0);
        store.set(ParamId::FREEZE, 0.7);
        let settings = store.snapshot();
        assert!(settings.decay < 1.0);
        assert_eq!(settings.pre_delay_ms, 0.0);
        assert!(settings.freeze);
    }

    #[test]
    fn test_apply_then_snapshot() {
        let store = ParamStore::new();
        let wanted = Settings {
            decay: 0.8,
            diffusion_steps: 6,
            pre_delay_ms: 120.0,
            reverse: true,
            ..Settings::default()
        };
        store.apply(&wanted);
        assert_eq!(store.snapshot(), wanted);
    }

    #[test]
    fn test_descriptor_by_name() {
        let desc = descriptor_by_name("wet level").unwrap();
        assert_eq!(desc.id, ParamId::WET_LEVEL);
        assert!(descriptor_by_name("room size").is_none());
    }

    #[test]
    fn test_set_normalized_uses_skew() {
        let store = ParamStore::new();
        store.set_normalized(ParamId::DAMPING_FREQUENCY, 1.0);
        store.set_normalized(ParamId::DIFFUSION_STEPS, 0.5);
        assert_relative_eq!(
            store.get(ParamId::DAMPING_FREQUENCY).unwrap(),
            4000.0,
            epsilon = 1e-6
        );
        assert_eq!(store.get(ParamId::DIFFUSION_STEPS), Some(4.0));
    }
}
