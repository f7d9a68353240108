//! Velocity-dependent shaping curve `C(v)`: §4.1 step 6.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VelocityCurvePreset {
    Linear,
    SCurve,
    OneTap,
    RedZone,
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VelocityCurve {
    pub preset: VelocityCurvePreset,
    pub low_threshold: f64,
    pub high_threshold: f64,
    pub low_mult: f64,
    pub mid_mult: f64,
    pub high_mult: f64,
}

impl VelocityCurve {
    pub fn linear() -> Self {
        Self {
            preset: VelocityCurvePreset::Linear,
            low_threshold: 0.5,
            high_threshold: 5.0,
            low_mult: 1.0,
            mid_mult: 1.0,
            high_mult: 1.0,
        }
    }

    pub fn s_curve() -> Self {
        Self {
            preset: VelocityCurvePreset::SCurve,
            low_threshold: 0.3,
            high_threshold: 4.0,
            low_mult: 0.85,
            mid_mult: 1.0,
            high_mult: 1.15,
        }
    }

    /// Precise at low velocity for headshots; aim-assist engages at low
    /// speeds while leaving flick-shot multipliers mostly linear.
    pub fn one_tap() -> Self {
        Self {
            preset: VelocityCurvePreset::OneTap,
            low_threshold: 0.2,
            high_threshold: 3.0,
            low_mult: 0.7,
            mid_mult: 0.95,
            high_mult: 1.1,
        }
    }

    pub fn red_zone() -> Self {
        Self {
            preset: VelocityCurvePreset::RedZone,
            low_threshold: 0.5,
            high_threshold: 6.0,
            low_mult: 0.9,
            mid_mult: 1.0,
            high_mult: 1.3,
        }
    }

    pub fn from_preset(preset: VelocityCurvePreset) -> Self {
        match preset {
            VelocityCurvePreset::Linear => Self::linear(),
            VelocityCurvePreset::SCurve => Self::s_curve(),
            VelocityCurvePreset::OneTap => Self::one_tap(),
            VelocityCurvePreset::RedZone => Self::red_zone(),
            VelocityCurvePreset::Custom => Self::linear(),
        }
    }

    /// Any field edit flips the curve to `Custom`, matching the original
    /// UI's "editing a preset detaches it" behavior.
    pub fn set_low_mult(&mut self, v: f64) {
        self.low_mult = v;
        self.preset = VelocityCurvePreset::Custom;
    }
    pub fn set_mid_mult(&mut self, v: f64) {
        self.mid_mult = v;
        self.preset = VelocityCurvePreset::Custom;
    }
    pub fn set_high_mult(&mut self, v: f64) {
        self.high_mult = v;
        self.preset = VelocityCurvePreset::Custom;
    }

    fn smoothstep(s: f64) -> f64 {
        let s = s.clamp(0.0, 1.0);
        s * s * (3.0 - 2.0 * s)
    }

    /// `C(v)`: step 6 of §4.1.
    pub fn evaluate(&self, v: f64) -> f64 {
        if v <= self.low_threshold {
            return self.low_mult;
        }
        if v >= self.high_threshold {
            return self.high_mult;
        }
        let span = self.high_threshold - self.low_threshold;
        let t = if span > 0.0 {
            (v - self.low_threshold) / span
        } else {
            0.0
        };
        if t < 0.5 {
            let s = Self::smoothstep(2.0 * t);
            self.low_mult + s * (self.mid_mult - self.low_mult)
        } else {
            let s = Self::smoothstep(2.0 * (t - 0.5));
            self.mid_mult + s * (self.high_mult - self.mid_mult)
        }
    }
}

impl Default for VelocityCurve {
    fn default() -> Self {
        Self::linear()
    }
}
