//! State Reconciler: periodically samples actual OS state and re-applies
//! any drift from the Target State (§4.3 reconciliation loop).

use super::flight_recorder::{FlightRecorder, StateChangeRecord};
use super::target_state::TargetStateManager;
use super::types::{PowerPlan, TargetStateDoc, TimerResolution};
use crate::event::{EventLog, Level};
use crate::platform::Platform;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

pub const MIN_INTERVAL_MS: u64 = 1_000;
pub const MAX_INTERVAL_MS: u64 = 5_000;

/// Read-only snapshot of the actual OS state, recomputed every tick.
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentState {
    pub power_mode: PowerPlan,
    pub timer_resolution: TimerResolution,
    pub cpu_parking: bool,
    pub process_affinity: std::collections::HashMap<String, String>,
}

impl CurrentState {
    pub fn sample<P: Platform>(platform: &P, target: &TargetStateDoc) -> Self {
        let mut affinity = std::collections::HashMap::new();
        for process_name in target.process_affinity.keys() {
            if let Some(value) = platform.get_process_affinity(process_name) {
                affinity.insert(process_name.clone(), value);
            }
        }
        Self {
            power_mode: platform.get_power_plan(),
            timer_resolution: platform.get_timer_resolution(),
            cpu_parking: platform.get_cpu_parking(),
            process_affinity: affinity,
        }
    }
}

pub struct Reconciler {
    interval_ms: AtomicU64,
    drift_count: AtomicU64,
    stopped: AtomicBool,
}

impl Reconciler {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms: AtomicU64::new(interval_ms.clamp(MIN_INTERVAL_MS, MAX_INTERVAL_MS)),
            drift_count: AtomicU64::new(0),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn interval_ms(&self) -> u64 {
        self.interval_ms.load(Ordering::SeqCst)
    }

    pub fn set_interval_ms(&self, interval_ms: u64) {
        self.interval_ms
            .store(interval_ms.clamp(MIN_INTERVAL_MS, MAX_INTERVAL_MS), Ordering::SeqCst);
    }

    pub fn drift_count(&self) -> u64 {
        self.drift_count.load(Ordering::SeqCst)
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Runs one reconciliation tick: reads target and current state,
    /// re-applies every field that differs and is readable, and emits
    /// drift + completion events. Returns the number of fields applied.
    pub fn tick<P: Platform>(
        &self,
        platform: &Arc<P>,
        target_state: &TargetStateManager,
        recorder: &FlightRecorder,
        log: &mut EventLog,
        now_ms: u64,
    ) -> u64 {
        if self.is_stopped() {
            return 0;
        }

        let target = target_state.current();
        let current = CurrentState::sample(platform.as_ref(), &target);
        let mut changes_applied = 0u64;

        if target.power_mode != current.power_mode && current.power_mode != PowerPlan::Unknown {
            self.apply_drift(
                platform,
                recorder,
                log,
                now_ms,
                "power_mode",
                format!("{:?}", current.power_mode),
                format!("{:?}", target.power_mode),
                |p| p.set_power_plan(target.power_mode),
            );
            changes_applied += 1;
        }

        if target.timer_resolution != current.timer_resolution
            && current.timer_resolution != TimerResolution::Unknown
        {
            self.apply_drift(
                platform,
                recorder,
                log,
                now_ms,
                "timer_resolution",
                format!("{:?}", current.timer_resolution),
                format!("{:?}", target.timer_resolution),
                |p| p.set_timer_resolution(target.timer_resolution),
            );
            changes_applied += 1;
        }

        if target.cpu_parking != current.cpu_parking {
            self.apply_drift(
                platform,
                recorder,
                log,
                now_ms,
                "cpu_parking",
                current.cpu_parking.to_string(),
                target.cpu_parking.to_string(),
                |p| p.set_cpu_parking(target.cpu_parking),
            );
            changes_applied += 1;
        }

        for (process_name, core_group) in &target.process_affinity {
            let current_value = current.process_affinity.get(process_name);
            if current_value != Some(core_group) {
                if let Some(current_value) = current_value {
                    self.apply_drift(
                        platform,
                        recorder,
                        log,
                        now_ms,
                        &format!("affinity:{process_name}"),
                        current_value.clone(),
                        core_group.clone(),
                        |p| p.set_process_affinity(process_name, core_group),
                    );
                    changes_applied += 1;
                }
            }
        }

        log.push(
            now_ms,
            Level::Info,
            format!("reconciliation complete, {changes_applied} change(s) applied"),
        );
        changes_applied
    }

    fn apply_drift<P: Platform>(
        &self,
        platform: &Arc<P>,
        recorder: &FlightRecorder,
        log: &mut EventLog,
        now_ms: u64,
        component: &str,
        expected: String,
        actual: String,
        apply: impl FnOnce(&P) -> Result<(), crate::error::ReconcileError>,
    ) {
        self.drift_count.fetch_add(1, Ordering::SeqCst);
        log.push(
            now_ms,
            Level::Warning,
            format!("drift detected in {component}: expected {actual}, observed {expected}"),
        );
        let result = apply(platform.as_ref());
        recorder.record(StateChangeRecord {
            timestamp_ms: now_ms,
            component_id: component.to_string(),
            old_value: expected,
            new_value: actual,
            expected_gain: 0.0,
            actual_delta: 0.0,
            rollback_reason: result.err().map(|e| e.to_string()),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::null::NullPlatform;

    #[test]
    fn drift_count_is_monotonically_non_decreasing() {
        let platform = Arc::new(NullPlatform::new());
        let dir = tempfile::tempdir().unwrap();
        let target = TargetStateManager::load_or_default(dir.path().join("t.json"), 0);
        let recorder = FlightRecorder::new();
        let reconciler = Reconciler::new(2_000);
        let mut log = EventLog::default();

        target
            .update(0, |s| s.power_mode = PowerPlan::Performance)
            .unwrap();

        let mut last = 0;
        for i in 0..5 {
            reconciler.tick(&platform, &target, &recorder, &mut log, i * 1000);
            let now = reconciler.drift_count();
            assert!(now >= last);
            last = now;
        }
    }

    #[test]
    fn interval_is_clamped_to_spec_bounds() {
        let r = Reconciler::new(50);
        assert_eq!(r.interval_ms(), MIN_INTERVAL_MS);
        r.set_interval_ms(999_999);
        assert_eq!(r.interval_ms(), MAX_INTERVAL_MS);
    }

    #[test]
    fn stopped_reconciler_applies_nothing() {
        let platform = Arc::new(NullPlatform::new());
        let dir = tempfile::tempdir().unwrap();
        let target = TargetStateManager::load_or_default(dir.path().join("t.json"), 0);
        let recorder = FlightRecorder::new();
        let reconciler = Reconciler::new(2_000);
        let mut log = EventLog::default();
        reconciler.stop();
        let applied = reconciler.tick(&platform, &target, &recorder, &mut log, 0);
        assert_eq!(applied, 0);
    }
}
