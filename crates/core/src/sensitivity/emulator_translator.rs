//! Per-emulator sensitivity scalar and resolution scale: §4.1 step 4.
//! Preset table supplemented from `EmulatorTranslator.{h,cpp}` (§11.6).

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmulatorPreset {
    Bluestacks,
    Ldplayer,
    Memu,
    Generic,
}

impl EmulatorPreset {
    pub fn from_name(name: &str) -> Result<Self, PipelineError> {
        match name.to_ascii_lowercase().as_str() {
            "bluestacks" => Ok(EmulatorPreset::Bluestacks),
            "ldplayer" => Ok(EmulatorPreset::Ldplayer),
            "memu" => Ok(EmulatorPreset::Memu),
            "generic" => Ok(EmulatorPreset::Generic),
            other => Err(PipelineError::UnknownEmulatorPreset(other.to_string())),
        }
    }

    pub fn defaults(self) -> (f64, f64, u32, u32) {
        // (sensitivity_scalar, resolution_scale, width, height)
        match self {
            EmulatorPreset::Bluestacks => (1.0, 1.0, 1920, 1080),
            EmulatorPreset::Ldplayer => (1.1, 0.95, 1600, 900),
            EmulatorPreset::Memu => (0.95, 1.0, 1280, 720),
            EmulatorPreset::Generic => (1.0, 1.0, 1920, 1080),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmulatorTranslator {
    pub preset: EmulatorPreset,
    pub sensitivity_scalar: f64,
    pub resolution_scale: f64,
    pub emulator_width: u32,
    pub emulator_height: u32,
}

impl EmulatorTranslator {
    pub fn from_preset(preset: EmulatorPreset) -> Self {
        let (sens, res, w, h) = preset.defaults();
        Self {
            preset,
            sensitivity_scalar: sens,
            resolution_scale: res,
            emulator_width: w,
            emulator_height: h,
        }
    }

    /// `E_s`, clamped to `[0.1, 10.0]` per the Pipeline Parameters invariant.
    pub fn sensitivity(&self) -> f64 {
        self.sensitivity_scalar.clamp(0.1, 10.0)
    }

    /// `E_r`, clamped to `[0.1, 4.0]`, applied only when `adb_mode` is set.
    pub fn resolution(&self, adb_mode: bool) -> f64 {
        if adb_mode {
            self.resolution_scale.clamp(0.1, 4.0)
        } else {
            1.0
        }
    }
}

impl Default for EmulatorTranslator {
    fn default() -> Self {
        Self::from_preset(EmulatorPreset::Generic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_preset_name_is_an_error() {
        assert!(EmulatorPreset::from_name("nox").is_err());
    }

    #[test]
    fn resolution_scale_is_one_outside_adb_mode() {
        let t = EmulatorTranslator::from_preset(EmulatorPreset::Ldplayer);
        assert_eq!(t.resolution(false), 1.0);
        assert!((t.resolution(true) - 0.95).abs() < 1e-9);
    }
}
