//! `NeoController`: the thin orchestration seam gluing the Sensitivity
//! Pipeline (via [`InputAuthority`]) and the Zereca control plane behind
//! a single command surface (§6, §11 item 4).
//!
//! Grounded on `original_source/src/backend/NeoController.h`: a struct
//! that owns one input manager, one sensitivity manager, and one Zereca
//! controller, and forwards a flat set of `Q_INVOKABLE` commands onto
//! them. The Qt property/signal surface is replaced by plain accessor
//! methods plus the shared [`EventLog`] (§9 "thread-affine UI/properties").

use crate::authority::InputAuthority;
use crate::config::{PipelineConfig, ZerecaConfig};
use crate::event::{EventLog, Level};
use crate::platform::Platform;
use crate::sensitivity::{PipelineParameters, SensitivityPipeline};
use crate::zereca::types::RollbackTrigger;
use crate::zereca::{Mode, ZerecaController};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

fn pipeline_params_from_config(cfg: &PipelineConfig) -> PipelineParameters {
    let mut params = PipelineParameters::default();
    params.sensitivity_x = cfg.sensitivity_x;
    params.sensitivity_y = cfg.sensitivity_y;
    params.axis_multiplier_x = cfg.axis_multiplier_x;
    params.axis_multiplier_y = cfg.axis_multiplier_y;
    params.gain_factor = cfg.gain_factor;
    params.smoothing_ms = cfg.smoothing_ms;
    params.slow_zone_percent = cfg.slow_zone_percent;
    params.safe_zone_clamp_enabled = cfg.safe_zone_clamp_enabled;
    params.input_authority_enabled = cfg.input_authority_enabled;
    params.adb_mode = cfg.adb_mode;
    params.host_normalizer.mouse_dpi = cfg.mouse_dpi;
    params
}

/// Read-only snapshot of the command surface's property groups (§6),
/// returned by [`NeoController::status`] for the `status` command and
/// the `cli` crate's `status` subcommand.
#[derive(Debug, Clone, serde::Serialize)]
pub struct StatusSnapshot {
    pub running: bool,
    pub mode: Mode,
    pub input_authority_enabled: bool,
    pub mouse_velocity: f64,
    pub mouse_angle_degrees: f64,
    pub angular_delta_x_deg: f64,
    pub angular_delta_y_deg: f64,
    pub latency_ms: f64,
    pub emulator_confidence: f64,
    pub emulator_name: String,
    pub hypotheses_count: usize,
    pub optimizations_applied: u64,
    pub drift_count: u64,
    pub probation_count: usize,
    pub rollback_active: bool,
    pub has_snapshot: bool,
}

/// Owns exactly one [`InputAuthority`] (and, through it, one
/// [`SensitivityPipeline`]) and one [`ZerecaController`], and forwards
/// the command surface of §6 onto them. There is no global back-channel:
/// every caller holds the handle it was given (§9 singleton re-architecture).
pub struct NeoController<P: Platform> {
    platform: Arc<P>,
    authority: InputAuthority<P>,
    zereca: ZerecaController<P>,
    event_log: Mutex<EventLog>,
    running: Mutex<bool>,
}

impl<P: Platform> NeoController<P> {
    pub fn new(
        platform: Arc<P>,
        pipeline_config: &PipelineConfig,
        zereca_config: ZerecaConfig,
        state_dir: impl Into<PathBuf>,
        now_ms: u64,
    ) -> Self {
        let pipeline = SensitivityPipeline::new(pipeline_params_from_config(pipeline_config));
        let authority = InputAuthority::new(platform.clone(), pipeline);
        let zereca = ZerecaController::new(platform.clone(), zereca_config, state_dir, now_ms);
        Self {
            platform,
            authority,
            zereca,
            event_log: Mutex::new(EventLog::default()),
            running: Mutex::new(false),
        }
    }

    pub fn authority(&self) -> &InputAuthority<P> {
        &self.authority
    }

    pub fn zereca(&self) -> &ZerecaController<P> {
        &self.zereca
    }

    pub fn event_log(&self) -> std::sync::MutexGuard<'_, EventLog> {
        self.event_log.lock().unwrap()
    }

    /// `start`: installs the input hook and enters the Zereca scanning
    /// mode. Refuses while a rollback is latched, same as
    /// `ZerecaController::start`.
    pub fn start(&self, now_ms: u64) -> bool {
        let mut log = self.event_log.lock().unwrap();
        if !self.zereca.start(&mut log, now_ms) {
            return false;
        }
        if let Err(err) = self.authority.start_hook(&mut log, now_ms) {
            log.push(now_ms, Level::Critical, format!("start failed: {err}"));
            self.zereca.stop(&mut log, now_ms);
            return false;
        }
        *self.running.lock().unwrap() = true;
        true
    }

    /// `stop`: removes the input hook and returns the control plane to
    /// standby. Safe-mode pass-through remains available through the
    /// Pipeline even after this call, since authority is gated by
    /// `input_authority_enabled`, not by the hook's install state.
    pub fn stop(&self, now_ms: u64) {
        let mut log = self.event_log.lock().unwrap();
        self.authority.stop_hook(&mut log, now_ms);
        self.zereca.stop(&mut log, now_ms);
        *self.running.lock().unwrap() = false;
    }

    pub fn is_running(&self) -> bool {
        *self.running.lock().unwrap()
    }

    /// `forceReconcile`: triggers an out-of-band reconciliation tick
    /// regardless of the Zereca mode (§4.3 "triggered immediately on
    /// Target State change").
    pub fn force_reconcile(&self, now_ms: u64) -> u64 {
        let mut log = self.event_log.lock().unwrap();
        self.zereca.reconcile(&mut log, now_ms)
    }

    /// `acknowledgeRollback`: clears the rollback latch and permits the
    /// Arbiter to accept proposals again.
    pub fn acknowledge_rollback(&self, now_ms: u64) {
        let mut log = self.event_log.lock().unwrap();
        self.zereca.acknowledge_rollback(&mut log, now_ms);
    }

    /// `clearProbation`: Operator-reserved manual override of the
    /// Probation Ledger (§4.8). Callers are responsible for gating this
    /// on `platform.is_operator()` before invoking it, mirroring the
    /// original's "reserved for Operator after an acknowledged rollback".
    pub fn clear_probation(&self) {
        self.zereca.clear_probation();
    }

    /// `resetLearning`: clears Hypothesis Engine priors and the current
    /// baseline without touching the persisted Target State.
    pub fn reset_learning(&self) {
        self.zereca.reset_learning();
    }

    /// `snapshot`: captures the Pipeline's user-visible tunables.
    pub fn snapshot(&self) {
        self.authority.pipeline().lock().unwrap().snapshot();
    }

    /// `rollback`: restores the last Pipeline snapshot, if any.
    pub fn rollback(&self) -> bool {
        self.authority.pipeline().lock().unwrap().rollback()
    }

    pub fn has_snapshot(&self) -> bool {
        self.authority.pipeline().lock().unwrap().has_snapshot()
    }

    /// `applyOptimization`: manually advances the Learning mode by one
    /// step, popping the next hypothesis through the Arbiter instead of
    /// waiting for the driver's next tick. A no-op outside LEARNING.
    pub fn apply_optimization(&self, now_ms: u64) {
        let mut log = self.event_log.lock().unwrap();
        self.zereca.advance_learning(&mut log, now_ms);
    }

    /// Fires an emergency rollback from any mode; the caller supplies the
    /// trigger it observed (crash watchdog, thermal sensor, BSOD signal
    /// handler, privilege-loss check, or an explicit user/manual request).
    pub fn trigger_rollback(&self, trigger: RollbackTrigger, now_ms: u64) {
        let mut log = self.event_log.lock().unwrap();
        self.zereca.trigger_rollback(trigger, &mut log, now_ms);
        *self.running.lock().unwrap() = false;
    }

    pub fn status(&self) -> StatusSnapshot {
        let (angular_delta_x_deg, angular_delta_y_deg) = self.authority.angular_delta_degrees();
        StatusSnapshot {
            running: self.is_running(),
            mode: self.zereca.mode(),
            input_authority_enabled: self.authority.pipeline().lock().unwrap().params().input_authority_enabled,
            mouse_velocity: self.authority.mouse_velocity(),
            mouse_angle_degrees: self.authority.mouse_angle_degrees(),
            angular_delta_x_deg,
            angular_delta_y_deg,
            latency_ms: self.authority.latency_ms(),
            emulator_confidence: self.zereca.emulator_confidence(),
            emulator_name: self.zereca.emulator_name(),
            hypotheses_count: self.zereca.hypotheses_pending(),
            optimizations_applied: self.zereca.optimizations_applied(),
            drift_count: self.zereca.drift_count(),
            probation_count: self.zereca.probation_count(),
            rollback_active: self.zereca.rollback_active(),
            has_snapshot: self.has_snapshot(),
        }
    }

    pub fn platform(&self) -> &Arc<P> {
        &self.platform
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::null::NullPlatform;

    fn controller(dir: &std::path::Path) -> NeoController<NullPlatform> {
        let platform = Arc::new(NullPlatform::new());
        NeoController::new(platform, &PipelineConfig::default(), ZerecaConfig::default(), dir, 0)
    }

    #[test]
    fn start_installs_hook_and_enters_scanning() {
        let dir = tempfile::tempdir().unwrap();
        let ctrl = controller(dir.path());
        assert!(ctrl.start(0));
        assert!(ctrl.is_running());
        assert!(ctrl.authority().is_active());
        assert_eq!(ctrl.zereca().mode(), Mode::Scanning);
    }

    #[test]
    fn stop_releases_hook_and_returns_to_standby() {
        let dir = tempfile::tempdir().unwrap();
        let ctrl = controller(dir.path());
        ctrl.start(0);
        ctrl.stop(1);
        assert!(!ctrl.is_running());
        assert!(!ctrl.authority().is_active());
        assert_eq!(ctrl.zereca().mode(), Mode::Standby);
    }

    #[test]
    fn start_refuses_while_rollback_latched_and_leaves_hook_uninstalled() {
        let dir = tempfile::tempdir().unwrap();
        let ctrl = controller(dir.path());
        ctrl.trigger_rollback(RollbackTrigger::Manual, 0);
        assert!(!ctrl.start(1));
        assert!(!ctrl.authority().is_active());
    }

    #[test]
    fn snapshot_and_rollback_round_trip_through_the_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let ctrl = controller(dir.path());
        assert!(!ctrl.has_snapshot());
        ctrl.snapshot();
        assert!(ctrl.has_snapshot());
        ctrl.authority().pipeline().lock().unwrap().update_params(|p| p.sensitivity_x = 4.0);
        assert!(ctrl.rollback());
        assert_eq!(ctrl.authority().pipeline().lock().unwrap().params().sensitivity_x, 1.0);
    }

    #[test]
    fn acknowledge_rollback_unlatches_and_allows_restart() {
        let dir = tempfile::tempdir().unwrap();
        let ctrl = controller(dir.path());
        ctrl.trigger_rollback(RollbackTrigger::ThermalRunaway, 0);
        assert!(ctrl.status().rollback_active);
        ctrl.acknowledge_rollback(1);
        assert!(!ctrl.status().rollback_active);
        assert!(ctrl.start(2));
    }

    #[test]
    fn force_reconcile_works_regardless_of_running_state() {
        let dir = tempfile::tempdir().unwrap();
        let ctrl = controller(dir.path());
        assert_eq!(ctrl.force_reconcile(0), 0);
    }
}
