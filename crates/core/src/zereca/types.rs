//! Shared value types for the Zereca control plane, shaped after the
//! `Proposal`/`Violation`/`ParamVec` contract in the teacher's
//! `specs/005-adaptive-engine/contracts/traits.rs`.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::HashMap;

pub type ParamVec = SmallVec<[f64; 16]>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PowerPlan {
    #[serde(rename = "performance")]
    Performance,
    #[serde(rename = "balanced")]
    Balanced,
    #[serde(rename = "power_saver")]
    PowerSaver,
    #[serde(rename = "custom")]
    Custom,
    #[serde(rename = "unknown")]
    Unknown,
}

impl Default for PowerPlan {
    fn default() -> Self {
        PowerPlan::Balanced
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimerResolution {
    #[serde(rename = "default")]
    Default,
    #[serde(rename = "1ms")]
    OneMs,
    #[serde(rename = "0.5ms")]
    HalfMs,
    #[serde(rename = "unknown")]
    Unknown,
}

impl Default for TimerResolution {
    fn default() -> Self {
        TimerResolution::Default
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeType {
    Priority,
    IoPriority,
    Affinity,
    Timer,
    PowerPlan,
    Hpet,
}

impl ChangeType {
    /// Timer, PowerPlan, Hpet require Operator-tier privileges; confirmed
    /// against `OptimizationArbiter::requiresOperatorMode`.
    pub fn requires_operator(self) -> bool {
        matches!(self, ChangeType::Timer | ChangeType::PowerPlan | ChangeType::Hpet)
    }

    /// Confirmed against `OptimizationArbiter::getCooldownDuration`.
    pub fn cooldown_ms(self) -> u64 {
        match self {
            ChangeType::Priority | ChangeType::IoPriority => 5_000,
            ChangeType::Affinity => 30_000,
            ChangeType::Timer | ChangeType::PowerPlan => 120_000,
            ChangeType::Hpet => 600_000,
        }
    }

    pub fn is_shadow_testable(self) -> bool {
        matches!(self, ChangeType::Priority | ChangeType::IoPriority | ChangeType::Affinity)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationProposal {
    pub change_type: ChangeType,
    pub target_process: String,
    pub current_value: String,
    pub proposed_value: String,
    pub expected_gain: f64,
    pub confidence: f64,
    pub shadow_testable: bool,
}

impl OptimizationProposal {
    /// Identity used by the probation ledger: hash of
    /// `change_type ⊕ old_value ⊕ new_value`.
    pub fn config_hash(&self) -> u64 {
        use std::hash::{Hash, Hasher};
        let mut h = std::collections::hash_map::DefaultHasher::new();
        self.change_type.hash(&mut h);
        self.current_value.hash(&mut h);
        self.proposed_value.hash(&mut h);
        h.finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Positive,
    Neutral,
    NegativeStability,
    NegativeSafety,
}

/// Persisted as an integer (`1`/`2`/`3`) per the Probation Ledger's
/// on-disk contract, not the variant name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum ProbationSeverity {
    Low,
    Medium,
    Critical,
}

impl From<ProbationSeverity> for u8 {
    fn from(value: ProbationSeverity) -> Self {
        match value {
            ProbationSeverity::Low => 1,
            ProbationSeverity::Medium => 2,
            ProbationSeverity::Critical => 3,
        }
    }
}

#[derive(Debug)]
pub struct InvalidProbationSeverity(u8);

impl std::fmt::Display for InvalidProbationSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid probation severity: {}", self.0)
    }
}

impl std::error::Error for InvalidProbationSeverity {}

impl TryFrom<u8> for ProbationSeverity {
    type Error = InvalidProbationSeverity;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(ProbationSeverity::Low),
            2 => Ok(ProbationSeverity::Medium),
            3 => Ok(ProbationSeverity::Critical),
            other => Err(InvalidProbationSeverity(other)),
        }
    }
}

/// Uniquely identifies the running environment; confirmed against
/// `src/zereca/types/ContextHash.{h,cpp}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemContext {
    pub gpu_driver_version: String,
    pub os_build: String,
    pub bios_version: String,
    pub emulator_binary_hash: String,
}

impl SystemContext {
    /// Returns true if any identity field differs, matching the
    /// MEDIUM-severity probation "context shift" resurrection rule.
    pub fn differs_from(&self, other: &SystemContext) -> bool {
        self.gpu_driver_version != other.gpu_driver_version
            || self.os_build != other.os_build
            || self.bios_version != other.bios_version
            || self.emulator_binary_hash != other.emulator_binary_hash
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackTrigger {
    AppCrash,
    ThermalRunaway,
    BsodSignal,
    WatchdogTimeout,
    PrivilegeLost,
    UserRequested,
    Manual,
}

impl RollbackTrigger {
    /// Flight Recorder dump reason string, e.g. `"thermal_runaway"`.
    pub fn as_reason(self) -> &'static str {
        match self {
            RollbackTrigger::AppCrash => "app_crash",
            RollbackTrigger::ThermalRunaway => "thermal_runaway",
            RollbackTrigger::BsodSignal => "bsod_signal",
            RollbackTrigger::WatchdogTimeout => "watchdog_timeout",
            RollbackTrigger::PrivilegeLost => "privilege_lost",
            RollbackTrigger::UserRequested => "user_requested",
            RollbackTrigger::Manual => "manual",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AggregatedTelemetry {
    pub cpu_residency: f64,
    pub context_switch_rate: f64,
    pub core_utilization: f64,
    pub gpu_queue_depth: f64,
    pub gpu_utilization: f64,
    pub memory_pressure: f64,
    pub standby_size: f64,
    pub thermal_headroom: f64,
    pub avg_frame_time: f64,
    pub fps_variance: f64,
    pub fps: f64,
    pub timestamp_ms: u64,
}

#[derive(Debug, Clone, Default)]
pub struct BaselineMetrics {
    pub fps: f64,
    pub avg_frame_time: f64,
    pub fps_variance: f64,
    pub cpu_residency: f64,
    pub gpu_queue_depth: f64,
    pub memory_pressure: f64,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetStateDoc {
    pub power_mode: PowerPlan,
    pub timer_resolution: TimerResolution,
    pub cpu_parking: bool,
    #[serde(
        serialize_with = "serialize_on_off",
        deserialize_with = "deserialize_on_off"
    )]
    pub standby_purge: bool,
    pub process_affinity: HashMap<String, String>,
    pub timestamp: u64,
}

/// Serializes as `"off"`/`"on"` per §6's on-disk Target State contract,
/// not a JSON boolean.
fn serialize_on_off<S>(value: &bool, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(if *value { "on" } else { "off" })
}

fn deserialize_on_off<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    match s.as_str() {
        "on" => Ok(true),
        "off" => Ok(false),
        other => Err(serde::de::Error::custom(format!(
            "invalid standby_purge value: {other}"
        ))),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: u32,
    pub executable_name: String,
    pub window_class: Option<String>,
    pub loaded_modules: Vec<String>,
    pub child_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_hash_is_stable_for_identical_proposals() {
        let p = OptimizationProposal {
            change_type: ChangeType::Priority,
            target_process: "game.exe".into(),
            current_value: "normal".into(),
            proposed_value: "high".into(),
            expected_gain: 0.1,
            confidence: 0.8,
            shadow_testable: true,
        };
        assert_eq!(p.config_hash(), p.config_hash());
    }

    #[test]
    fn cooldowns_match_original_source() {
        assert_eq!(ChangeType::Priority.cooldown_ms(), 5_000);
        assert_eq!(ChangeType::IoPriority.cooldown_ms(), 5_000);
        assert_eq!(ChangeType::Affinity.cooldown_ms(), 30_000);
        assert_eq!(ChangeType::Timer.cooldown_ms(), 120_000);
        assert_eq!(ChangeType::PowerPlan.cooldown_ms(), 120_000);
        assert_eq!(ChangeType::Hpet.cooldown_ms(), 600_000);
    }

    #[test]
    fn operator_required_types_match_original_source() {
        assert!(ChangeType::Timer.requires_operator());
        assert!(ChangeType::PowerPlan.requires_operator());
        assert!(ChangeType::Hpet.requires_operator());
        assert!(!ChangeType::Priority.requires_operator());
        assert!(!ChangeType::IoPriority.requires_operator());
        assert!(!ChangeType::Affinity.requires_operator());
    }

    #[test]
    fn power_plan_serializes_to_the_documented_snake_case_strings() {
        assert_eq!(serde_json::to_string(&PowerPlan::Performance).unwrap(), "\"performance\"");
        assert_eq!(serde_json::to_string(&PowerPlan::Balanced).unwrap(), "\"balanced\"");
        assert_eq!(serde_json::to_string(&PowerPlan::PowerSaver).unwrap(), "\"power_saver\"");
        assert_eq!(serde_json::to_string(&PowerPlan::Custom).unwrap(), "\"custom\"");
        assert_eq!(serde_json::to_string(&PowerPlan::Unknown).unwrap(), "\"unknown\"");
    }

    #[test]
    fn timer_resolution_serializes_to_the_documented_strings() {
        assert_eq!(serde_json::to_string(&TimerResolution::Default).unwrap(), "\"default\"");
        assert_eq!(serde_json::to_string(&TimerResolution::OneMs).unwrap(), "\"1ms\"");
        assert_eq!(serde_json::to_string(&TimerResolution::HalfMs).unwrap(), "\"0.5ms\"");
        assert_eq!(serde_json::to_string(&TimerResolution::Unknown).unwrap(), "\"unknown\"");
    }

    #[test]
    fn probation_severity_serializes_to_integers() {
        assert_eq!(serde_json::to_string(&ProbationSeverity::Low).unwrap(), "1");
        assert_eq!(serde_json::to_string(&ProbationSeverity::Medium).unwrap(), "2");
        assert_eq!(serde_json::to_string(&ProbationSeverity::Critical).unwrap(), "3");
        let round_tripped: ProbationSeverity = serde_json::from_str("2").unwrap();
        assert_eq!(round_tripped, ProbationSeverity::Medium);
        assert!(serde_json::from_str::<ProbationSeverity>("4").is_err());
    }

    #[test]
    fn standby_purge_serializes_as_off_on() {
        let doc = TargetStateDoc {
            standby_purge: true,
            ..Default::default()
        };
        let json = serde_json::to_string(&doc).unwrap();
        assert!(json.contains("\"standby_purge\":\"on\""));
        let parsed: TargetStateDoc = serde_json::from_str(&json).unwrap();
        assert!(parsed.standby_purge);

        let off = TargetStateDoc::default();
        assert!(serde_json::to_string(&off).unwrap().contains("\"standby_purge\":\"off\""));
    }
}
