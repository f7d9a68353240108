//! Emergency Rollback: the sink every failure path funnels into (§4.5).
//! Grounded on the teacher's `control_safety.rs` `SafeMode` latch, a
//! sticky flag that must be explicitly acknowledged before the control
//! plane resumes normal operation.

use super::flight_recorder::FlightRecorder;
use super::target_state::TargetStateManager;
use super::types::RollbackTrigger;
use crate::event::{EventLog, Level};
use crate::platform::Platform;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

pub struct EmergencyRollback {
    active: AtomicBool,
    last_trigger: std::sync::RwLock<Option<RollbackTrigger>>,
}

impl EmergencyRollback {
    pub fn new() -> Self {
        Self {
            active: AtomicBool::new(false),
            last_trigger: std::sync::RwLock::new(None),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn last_trigger(&self) -> Option<RollbackTrigger> {
        *self.last_trigger.read().unwrap()
    }

    /// Fires the rollback: dumps the Flight Recorder, restores every
    /// enforceable field of the Target State to safe defaults, and
    /// latches `active` until [`Self::acknowledge`] clears it. Dump and
    /// restore failures are logged but never prevent the latch from
    /// being set, rollback must always leave the system in a safe,
    /// clearly-flagged state.
    pub fn trigger<P: Platform>(
        &self,
        platform: &P,
        target_state: &TargetStateManager,
        recorder: &FlightRecorder,
        dumps_dir: &Path,
        log: &mut EventLog,
        trigger: RollbackTrigger,
        now_ms: u64,
    ) {
        log.push(
            now_ms,
            Level::Critical,
            format!("emergency rollback triggered: {trigger:?}"),
        );

        if let Err(err) = recorder.dump(dumps_dir, trigger.as_reason(), now_ms) {
            tracing::warn!(%err, "flight recorder dump failed during rollback");
        }

        if let Err(err) = target_state.reset_to_safe_defaults(now_ms) {
            tracing::warn!(%err, "target state reset to safe defaults failed during rollback");
        }

        let restored = target_state.current();
        let _ = platform.set_power_plan(restored.power_mode);
        let _ = platform.set_timer_resolution(restored.timer_resolution);
        let _ = platform.set_cpu_parking(restored.cpu_parking);

        self.last_trigger.write().unwrap().replace(trigger);
        self.active.store(true, Ordering::SeqCst);

        log.push(
            now_ms,
            Level::Info,
            "rollback state change complete: power plan, timer resolution, and cpu parking restored to safe defaults".to_string(),
        );
    }

    /// Clears the latch once an operator has acknowledged the rollback,
    /// allowing the mode machine to return to `STANDBY`.
    pub fn acknowledge(&self, log: &mut EventLog, now_ms: u64) {
        self.active.store(false, Ordering::SeqCst);
        log.push(now_ms, Level::Info, "rollback acknowledged".to_string());
    }
}

impl Default for EmergencyRollback {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::null::NullPlatform;
    use crate::zereca::types::PowerPlan;

    #[test]
    fn trigger_latches_active_and_records_trigger() {
        let platform = NullPlatform::new();
        let dir = tempfile::tempdir().unwrap();
        let target = TargetStateManager::load_or_default(dir.path().join("t.json"), 0);
        target.update(0, |s| s.power_mode = PowerPlan::Performance).unwrap();
        let recorder = FlightRecorder::new();
        let mut log = EventLog::default();
        let rollback = EmergencyRollback::new();

        rollback.trigger(
            &platform,
            &target,
            &recorder,
            dir.path(),
            &mut log,
            RollbackTrigger::ThermalRunaway,
            1_000,
        );

        assert!(rollback.is_active());
        assert_eq!(rollback.last_trigger(), Some(RollbackTrigger::ThermalRunaway));
        assert_eq!(target.current().power_mode, PowerPlan::Balanced);
        assert_eq!(platform.get_power_plan(), PowerPlan::Balanced);
    }

    #[test]
    fn trigger_dumps_the_flight_recorder() {
        let platform = NullPlatform::new();
        let dir = tempfile::tempdir().unwrap();
        let target = TargetStateManager::load_or_default(dir.path().join("t.json"), 0);
        let recorder = FlightRecorder::new();
        let mut log = EventLog::default();
        let rollback = EmergencyRollback::new();
        let dumps = dir.path().join("dumps");

        rollback.trigger(
            &platform,
            &target,
            &recorder,
            &dumps,
            &mut log,
            RollbackTrigger::BsodSignal,
            2_000,
        );

        let mut entries = std::fs::read_dir(&dumps).unwrap();
        assert!(entries.next().is_some());
    }

    #[test]
    fn dump_reason_is_snake_case_not_debug_formatted() {
        let platform = NullPlatform::new();
        let dir = tempfile::tempdir().unwrap();
        let target = TargetStateManager::load_or_default(dir.path().join("t.json"), 0);
        let recorder = FlightRecorder::new();
        let mut log = EventLog::default();
        let rollback = EmergencyRollback::new();
        let dumps = dir.path().join("dumps");

        rollback.trigger(
            &platform,
            &target,
            &recorder,
            &dumps,
            &mut log,
            RollbackTrigger::ThermalRunaway,
            3_000,
        );

        let mut entries = std::fs::read_dir(&dumps).unwrap();
        let entry = entries.next().unwrap().unwrap();
        let content = std::fs::read_to_string(entry.path()).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed["reason"], "thermal_runaway");
    }

    #[test]
    fn acknowledge_clears_the_latch() {
        let platform = NullPlatform::new();
        let dir = tempfile::tempdir().unwrap();
        let target = TargetStateManager::load_or_default(dir.path().join("t.json"), 0);
        let recorder = FlightRecorder::new();
        let mut log = EventLog::default();
        let rollback = EmergencyRollback::new();

        rollback.trigger(
            &platform,
            &target,
            &recorder,
            dir.path(),
            &mut log,
            RollbackTrigger::Manual,
            0,
        );
        assert!(rollback.is_active());
        rollback.acknowledge(&mut log, 100);
        assert!(!rollback.is_active());
    }
}
