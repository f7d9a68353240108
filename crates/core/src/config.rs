//! Layered configuration, generalized from the teacher's `SolverConfig`/
//! `Domain` pattern: every field that the spec gives a default for loads
//! via `#[serde(default = "...")]`, and malformed files fall back to
//! these defaults rather than failing to start.

use serde::{Deserialize, Serialize};

fn default_gain_factor() -> f64 {
    0.6
}
fn default_smoothing_ms() -> f64 {
    0.0
}
fn default_slow_zone_percent() -> f64 {
    20.0
}
fn default_mouse_dpi() -> f64 {
    800.0
}
fn default_sensitivity() -> f64 {
    1.0
}
fn default_true() -> bool {
    true
}
fn default_reconcile_interval_ms() -> u64 {
    2_000
}
fn default_exploration_rate() -> f64 {
    0.2
}
fn default_observation_min_ms() -> u64 {
    120_000
}
fn default_observation_max_ms() -> u64 {
    300_000
}
fn default_stability_threshold() -> f64 {
    0.05
}
fn default_shadow_trial_ms() -> u64 {
    30_000
}
fn default_shadow_stabilization_ms() -> u64 {
    5_000
}
fn default_emulator_confidence_floor() -> f64 {
    0.75
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_sensitivity")]
    pub sensitivity_x: f64,
    #[serde(default = "default_sensitivity")]
    pub sensitivity_y: f64,
    #[serde(default = "default_mouse_dpi")]
    pub mouse_dpi: f64,
    #[serde(default)]
    pub axis_multiplier_x: f64,
    #[serde(default)]
    pub axis_multiplier_y: f64,
    #[serde(default = "default_gain_factor")]
    pub gain_factor: f64,
    #[serde(default = "default_smoothing_ms")]
    pub smoothing_ms: f64,
    #[serde(default = "default_slow_zone_percent")]
    pub slow_zone_percent: f64,
    #[serde(default = "default_true")]
    pub safe_zone_clamp_enabled: bool,
    #[serde(default)]
    pub input_authority_enabled: bool,
    #[serde(default)]
    pub adb_mode: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sensitivity_x: default_sensitivity(),
            sensitivity_y: default_sensitivity(),
            mouse_dpi: default_mouse_dpi(),
            axis_multiplier_x: 0.0,
            axis_multiplier_y: 0.0,
            gain_factor: default_gain_factor(),
            smoothing_ms: default_smoothing_ms(),
            slow_zone_percent: default_slow_zone_percent(),
            safe_zone_clamp_enabled: true,
            input_authority_enabled: false,
            adb_mode: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZerecaConfig {
    #[serde(default = "default_reconcile_interval_ms")]
    pub reconcile_interval_ms: u64,
    #[serde(default = "default_exploration_rate")]
    pub exploration_rate: f64,
    #[serde(default = "default_observation_min_ms")]
    pub observation_min_ms: u64,
    #[serde(default = "default_observation_max_ms")]
    pub observation_max_ms: u64,
    #[serde(default = "default_stability_threshold")]
    pub stability_threshold: f64,
    #[serde(default = "default_shadow_trial_ms")]
    pub shadow_trial_ms: u64,
    #[serde(default = "default_shadow_stabilization_ms")]
    pub shadow_stabilization_ms: u64,
    #[serde(default = "default_emulator_confidence_floor")]
    pub emulator_confidence_floor: f64,
    #[serde(default)]
    pub seed: u64,
}

impl Default for ZerecaConfig {
    fn default() -> Self {
        Self {
            reconcile_interval_ms: default_reconcile_interval_ms(),
            exploration_rate: default_exploration_rate(),
            observation_min_ms: default_observation_min_ms(),
            observation_max_ms: default_observation_max_ms(),
            stability_threshold: default_stability_threshold(),
            shadow_trial_ms: default_shadow_trial_ms(),
            shadow_stabilization_ms: default_shadow_stabilization_ms(),
            emulator_confidence_floor: default_emulator_confidence_floor(),
            seed: 0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ZerecaRootConfig {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub zereca: ZerecaConfig,
}

impl ZerecaRootConfig {
    /// Loads from disk; on missing file or malformed JSON, logs a warning
    /// and falls back to defaults rather than refusing to start (spec §6
    /// Target State Document policy, generalized to this config).
    pub fn load_or_default(path: &std::path::Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(cfg) => cfg,
                Err(err) => {
                    tracing::warn!(%err, path = %path.display(), "malformed config, using defaults");
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }
}
