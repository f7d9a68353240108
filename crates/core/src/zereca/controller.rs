//! Zereca Controller: the mode state machine wiring every control-plane
//! subsystem behind a single surface (§4.15).
//!
//! ```text
//!        start()                 confidence>=floor        baseline ready
//! STANDBY ------> SCANNING -----------------------> OBSERVING ----------> LEARNING
//!    ^                |                                                      | approved, shadow-testable
//!    | acknowledge     \                                                     v
//!    |                  \                                               TESTING
//!    |                   \  queue empty                                      |
//! ROLLBACK <--------------+------------------------------------------ trialComplete
//!    ^                                        MONITORING <-----------------/  (classify, commit/revert)
//!    \---------------------------- emergency trigger, from any mode --------/
//! ```
//!
//! Grounded on the teacher's `adaptive_engine/mod.rs`: a struct of
//! cooperating components plus a handful of orchestrating public
//! methods, each a no-op guarded by the current mode. A driver (the
//! `cli` crate's daemon loop) calls every method every tick; only the
//! one matching the current mode does anything.

use super::classify::{classify_outcome, ClassifierInput};
use super::detector::{EmulatorDetector, EmulatorInfo};
use super::flight_recorder::{FlightRecorder, StateChangeRecord};
use super::hypothesis::HypothesisEngine;
use super::observation::{ObservationPhase, ObservationResult};
use super::probation::ProbationLedger;
use super::reconciler::Reconciler;
use super::rollback::EmergencyRollback;
use super::shadow::{ShadowMode, ShadowTrial, TrialPhase};
use super::target_state::TargetStateManager;
use super::telemetry::TelemetryReader;
use super::types::{
    AggregatedTelemetry, BaselineMetrics, OptimizationProposal, PowerPlan, RollbackTrigger,
    TimerResolution,
};
use super::arbiter::{Arbiter, Decision};
use crate::config::ZerecaConfig;
use crate::event::{EventLog, Level};
use crate::platform::Platform;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum Mode {
    Standby,
    Scanning,
    Observing,
    Learning,
    Testing,
    Monitoring,
    Rollback,
}

fn parse_power_plan(value: &str) -> PowerPlan {
    match value {
        "performance" => PowerPlan::Performance,
        "balanced" => PowerPlan::Balanced,
        "power_saver" => PowerPlan::PowerSaver,
        "custom" => PowerPlan::Custom,
        _ => PowerPlan::Unknown,
    }
}

fn parse_timer_resolution(value: &str) -> TimerResolution {
    match value {
        "default" => TimerResolution::Default,
        "1ms" => TimerResolution::OneMs,
        "0.5ms" => TimerResolution::HalfMs,
        _ => TimerResolution::Unknown,
    }
}

/// Wires Enforcement (Reconciler), Learning (Observation -> Hypothesis ->
/// Shadow), and the Arbiter gate into the mode machine described above.
pub struct ZerecaController<P: Platform> {
    platform: Arc<P>,
    config: ZerecaConfig,
    mode: RwLock<Mode>,
    detector: Mutex<EmulatorDetector>,
    observation: Mutex<Option<ObservationPhase>>,
    hypothesis: Mutex<HypothesisEngine>,
    shadow_trial: Mutex<Option<ShadowTrial>>,
    pending_proposal: Mutex<Option<OptimizationProposal>>,
    baseline: Mutex<Option<BaselineMetrics>>,
    emulator: Mutex<Option<EmulatorInfo>>,
    target_process: Mutex<String>,
    reconciler: Reconciler,
    target_state: TargetStateManager,
    flight_recorder: FlightRecorder,
    rollback: EmergencyRollback,
    probation: ProbationLedger,
    arbiter: Arbiter,
    telemetry: TelemetryReader,
    dumps_dir: PathBuf,
}

impl<P: Platform> ZerecaController<P> {
    /// `state_dir` holds `target_state.json`, `probation.json`, and the
    /// `zereca_dumps/` Flight Recorder dump directory.
    pub fn new(platform: Arc<P>, config: ZerecaConfig, state_dir: impl Into<PathBuf>, now_ms: u64) -> Self {
        let state_dir = state_dir.into();
        let target_state = TargetStateManager::load_or_default(state_dir.join("target_state.json"), now_ms);
        let probation = ProbationLedger::load(state_dir.join("probation.json"));
        let hypothesis = HypothesisEngine::new(config.seed).with_exploration_rate(config.exploration_rate);
        let reconciler = Reconciler::new(config.reconcile_interval_ms);

        Self {
            platform,
            config,
            mode: RwLock::new(Mode::Standby),
            detector: Mutex::new(EmulatorDetector::default()),
            observation: Mutex::new(None),
            hypothesis: Mutex::new(hypothesis),
            shadow_trial: Mutex::new(None),
            pending_proposal: Mutex::new(None),
            baseline: Mutex::new(None),
            emulator: Mutex::new(None),
            target_process: Mutex::new(String::new()),
            reconciler,
            target_state,
            flight_recorder: FlightRecorder::new(),
            rollback: EmergencyRollback::new(),
            probation,
            arbiter: Arbiter::new(),
            telemetry: TelemetryReader::default(),
            dumps_dir: state_dir.join("zereca_dumps"),
        }
    }

    pub fn mode(&self) -> Mode {
        *self.mode.read().unwrap()
    }

    fn set_mode(&self, mode: Mode) {
        *self.mode.write().unwrap() = mode;
    }

    pub fn target_state(&self) -> &TargetStateManager {
        &self.target_state
    }

    pub fn telemetry(&self) -> &TelemetryReader {
        &self.telemetry
    }

    pub fn flight_recorder(&self) -> &FlightRecorder {
        &self.flight_recorder
    }

    pub fn probation(&self) -> &ProbationLedger {
        &self.probation
    }

    pub fn rollback_active(&self) -> bool {
        self.rollback.is_active()
    }

    pub fn drift_count(&self) -> u64 {
        self.reconciler.drift_count()
    }

    pub fn probation_count(&self) -> usize {
        self.probation.len()
    }

    pub fn optimizations_applied(&self) -> u64 {
        self.arbiter.approved_count()
    }

    pub fn emulator_confidence(&self) -> f64 {
        self.emulator.lock().unwrap().as_ref().map(|e| e.confidence).unwrap_or(0.0)
    }

    pub fn emulator_name(&self) -> String {
        self.emulator.lock().unwrap().as_ref().map(|e| e.name.clone()).unwrap_or_default()
    }

    pub fn hypotheses_pending(&self) -> usize {
        self.hypothesis.lock().unwrap().pending_count()
    }

    /// `start()`: enters SCANNING. Refuses while ROLLBACK is latched,
    /// the operator must acknowledge first.
    pub fn start(&self, log: &mut EventLog, now_ms: u64) -> bool {
        if self.mode() == Mode::Rollback {
            log.push(now_ms, Level::Warning, "cannot start while rollback is active, acknowledge first".to_string());
            return false;
        }
        self.set_mode(Mode::Scanning);
        log.push(now_ms, Level::Info, "zereca control plane started, entering scanning mode".to_string());
        true
    }

    pub fn stop(&self, log: &mut EventLog, now_ms: u64) {
        self.reconciler.stop();
        self.set_mode(Mode::Standby);
        log.push(now_ms, Level::Info, "zereca control plane stopped".to_string());
    }

    /// Scan tick: no-op outside SCANNING. Crossing the confidence floor
    /// locks in the primary candidate and enters OBSERVING.
    pub fn scan(&self, log: &mut EventLog, now_ms: u64) -> Option<EmulatorInfo> {
        if self.mode() != Mode::Scanning {
            return None;
        }
        let processes = self.platform.list_processes();
        let platform = self.platform.clone();
        let mut detector = self.detector.lock().unwrap();
        let (detected, _lost) = detector.scan(&processes, |exe| platform.hash_executable_prefix(exe));
        for info in &detected {
            log.push(
                now_ms,
                Level::Info,
                format!("emulator candidate detected: {} (confidence {:.2})", info.name, info.confidence),
            );
        }
        let primary = detector.primary().cloned();
        drop(detector);

        if let Some(info) = &primary {
            if info.confidence >= self.config.emulator_confidence_floor {
                let exe_name = processes
                    .iter()
                    .find(|p| p.pid == info.pid)
                    .map(|p| p.executable_name.clone())
                    .unwrap_or_default();
                *self.target_process.lock().unwrap() = exe_name;
                *self.emulator.lock().unwrap() = Some(info.clone());
                *self.observation.lock().unwrap() = Some(
                    ObservationPhase::new(info.pid)
                        .with_bounds(self.config.observation_min_ms, self.config.observation_max_ms),
                );
                self.set_mode(Mode::Observing);
                log.push(
                    now_ms,
                    Level::Info,
                    format!("emulator confidence {:.2} crossed the observation floor, entering observing mode", info.confidence),
                );
            }
        }
        primary
    }

    /// Observation tick: no-op outside OBSERVING. A complete baseline
    /// generates hypotheses and enters LEARNING; a lost target returns
    /// to SCANNING.
    pub fn observe(&self, sample: AggregatedTelemetry, target_alive: bool, log: &mut EventLog, now_ms: u64) -> Option<BaselineMetrics> {
        if self.mode() != Mode::Observing {
            return None;
        }
        self.telemetry.collect(sample.clone());

        let mut obs = self.observation.lock().unwrap();
        let result = obs.as_mut()?.sample(&sample, now_ms, target_alive);

        match result {
            ObservationResult::InProgress => None,
            ObservationResult::Failed => {
                *obs = None;
                drop(obs);
                self.set_mode(Mode::Scanning);
                log.push(now_ms, Level::Warning, "observation target exited, returning to scanning mode".to_string());
                None
            }
            ObservationResult::Complete(baseline) => {
                *obs = None;
                drop(obs);
                *self.baseline.lock().unwrap() = Some(baseline.clone());
                self.set_mode(Mode::Learning);
                log.push(now_ms, Level::Info, "baseline observation complete, entering learning mode".to_string());

                let emulator_name = self.emulator_name();
                let target_process = self.target_process.lock().unwrap().clone();
                let generated = self
                    .hypothesis
                    .lock()
                    .unwrap()
                    .generate_hypotheses(&baseline, &emulator_name, &target_process);
                log.push(now_ms, Level::Info, format!("generated {} optimization hypotheses", generated.len()));
                Some(baseline)
            }
        }
    }

    /// Learning tick: no-op outside LEARNING. Pops the next hypothesis
    /// and puts it to the Arbiter; an approved shadow-testable change
    /// enters TESTING, an approved non-testable change (timer/power
    /// plan) is committed to the Target State immediately, and an empty
    /// queue enters MONITORING.
    pub fn advance_learning(&self, log: &mut EventLog, now_ms: u64) -> Option<Decision> {
        if self.mode() != Mode::Learning {
            return None;
        }

        let hyp = self.hypothesis.lock().unwrap().next_hypothesis();
        let Some(hyp) = hyp else {
            self.set_mode(Mode::Monitoring);
            log.push(now_ms, Level::Info, "no hypotheses remain, entering monitoring mode".to_string());
            return None;
        };

        let proposal = OptimizationProposal {
            change_type: hyp.change_type,
            target_process: hyp.target_process,
            current_value: String::new(),
            proposed_value: hyp.proposed_value,
            expected_gain: hyp.expected_gain,
            confidence: hyp.confidence,
            shadow_testable: hyp.change_type.is_shadow_testable(),
        };

        let emulator_confidence = self.emulator_confidence();
        let rollback_active = self.rollback.is_active();
        let context = self.platform.capture_system_context();
        let is_operator = self.platform.is_operator();

        let decision = self.arbiter.evaluate(
            &proposal,
            emulator_confidence,
            rollback_active,
            &self.probation,
            &context,
            is_operator,
            now_ms,
        );

        match &decision {
            Decision::Approved => {
                if proposal.shadow_testable {
                    *self.pending_proposal.lock().unwrap() = Some(proposal.clone());
                    self.set_mode(Mode::Testing);
                    log.push(
                        now_ms,
                        Level::Info,
                        format!("proposal approved for {:?}, entering testing mode", proposal.change_type),
                    );
                } else {
                    self.apply_to_target_state(&proposal, now_ms);
                    log.push(
                        now_ms,
                        Level::Success,
                        format!("proposal approved and applied directly: {:?} -> {}", proposal.change_type, proposal.proposed_value),
                    );
                }
            }
            Decision::Rejected(reason) => {
                log.push(now_ms, Level::Warning, format!("proposal rejected: {reason:?}"));
            }
        }
        Some(decision)
    }

    /// Testing tick: no-op outside TESTING. Lazily starts the shadow
    /// trial on first call, then advances it; completion or abort
    /// always returns to LEARNING to pick up the next hypothesis.
    pub fn advance_testing(&self, current_fps: f64, target_alive: bool, log: &mut EventLog, now_ms: u64) -> Option<TrialPhase> {
        if self.mode() != Mode::Testing {
            return None;
        }

        let mut guard = self.shadow_trial.lock().unwrap();
        if guard.is_none() {
            let Some(proposal) = self.pending_proposal.lock().unwrap().clone() else {
                drop(guard);
                self.set_mode(Mode::Learning);
                return None;
            };
            let pid = self.emulator.lock().unwrap().as_ref().map(|e| e.pid).unwrap_or(0);
            let before_fps = self.baseline.lock().unwrap().as_ref().map(|b| b.fps).unwrap_or(current_fps);
            match ShadowMode::start_trial(self.platform.as_ref(), proposal, pid, before_fps, now_ms) {
                Ok(trial) => *guard = Some(trial),
                Err(err) => {
                    log.push(now_ms, Level::Warning, format!("failed to start shadow trial: {err}"));
                    drop(guard);
                    self.set_mode(Mode::Learning);
                    return None;
                }
            }
        }

        let trial = guard.as_mut().expect("just populated above");
        let phase = trial.tick(self.platform.as_ref(), current_fps, now_ms, target_alive);

        match phase {
            TrialPhase::Complete => {
                let result = trial.result();
                drop(guard);
                self.finish_trial(result, log, now_ms);
            }
            TrialPhase::Aborted => {
                drop(guard);
                *self.shadow_trial.lock().unwrap() = None;
                log.push(now_ms, Level::Warning, "shadow trial aborted, target process exited".to_string());
                self.set_mode(Mode::Learning);
            }
            TrialPhase::Stabilizing | TrialPhase::Sampling => {}
        }
        Some(phase)
    }

    fn finish_trial(&self, result: Option<super::shadow::ShadowTrialResult>, log: &mut EventLog, now_ms: u64) {
        *self.shadow_trial.lock().unwrap() = None;
        let Some(proposal) = self.pending_proposal.lock().unwrap().take() else {
            self.set_mode(Mode::Learning);
            return;
        };
        let Some(result) = result else {
            self.set_mode(Mode::Learning);
            return;
        };

        let baseline = self.baseline.lock().unwrap().clone().unwrap_or_default();
        // The trial only samples FPS; frame-time and variance are assumed
        // unchanged so the composite delta reflects the measured signal.
        let current = BaselineMetrics { fps: result.after_fps, ..baseline.clone() };
        let classifier_result = classify_outcome(ClassifierInput {
            baseline: &baseline,
            current: &current,
            had_crash: false,
            had_thermal_event: false,
            duration_ms: baseline.duration_ms.max(1),
        });

        let context = self.platform.capture_system_context();
        self.arbiter.record_outcome(
            &proposal,
            classifier_result.outcome,
            classifier_result.delta,
            &self.flight_recorder,
            &self.probation,
            &context,
            now_ms,
        );
        self.hypothesis.lock().unwrap().record_outcome(
            proposal.change_type,
            &proposal.proposed_value,
            classifier_result.outcome,
            classifier_result.delta,
        );

        if classifier_result.should_commit {
            self.commit_shadow_proposal(&proposal, classifier_result.delta, now_ms);
            log.push(
                now_ms,
                Level::Success,
                format!("optimization committed: {:?} -> {}", proposal.change_type, proposal.proposed_value),
            );
        } else if classifier_result.should_rollback {
            drop(proposal);
            // A shadow trial never sets had_crash/had_thermal_event, so this
            // is always rule 6's regression rollback, not an actual crash;
            // WatchdogTimeout is the closest fit in the trigger set for a
            // self-detected failure rather than an explicit external signal.
            self.trigger_rollback(RollbackTrigger::WatchdogTimeout, log, now_ms);
            return;
        } else {
            log.push(now_ms, Level::Info, format!("optimization reverted: {:?}", proposal.change_type));
        }

        self.set_mode(Mode::Learning);
    }

    fn apply_to_target_state(&self, proposal: &OptimizationProposal, now_ms: u64) {
        let result = self.target_state.update(now_ms, |doc| match proposal.change_type {
            super::types::ChangeType::PowerPlan => doc.power_mode = parse_power_plan(&proposal.proposed_value),
            super::types::ChangeType::Timer => doc.timer_resolution = parse_timer_resolution(&proposal.proposed_value),
            _ => {}
        });
        if let Err(err) = result {
            tracing::warn!(%err, "failed to persist target state after optimization commit");
        }
        self.flight_recorder.record(StateChangeRecord {
            timestamp_ms: now_ms,
            component_id: format!("{:?}", proposal.change_type),
            old_value: proposal.current_value.clone(),
            new_value: proposal.proposed_value.clone(),
            expected_gain: proposal.expected_gain,
            actual_delta: 0.0,
            rollback_reason: None,
        });
    }

    fn commit_shadow_proposal(&self, proposal: &OptimizationProposal, actual_delta: f64, now_ms: u64) {
        let _ = match proposal.change_type {
            super::types::ChangeType::Priority => {
                self.platform.set_process_priority(&proposal.target_process, &proposal.proposed_value)
            }
            super::types::ChangeType::IoPriority => {
                self.platform.set_process_io_priority(&proposal.target_process, &proposal.proposed_value)
            }
            super::types::ChangeType::Affinity => {
                let result = self.platform.set_process_affinity(&proposal.target_process, &proposal.proposed_value);
                let _ = self.target_state.update(now_ms, |doc| {
                    doc.process_affinity
                        .insert(proposal.target_process.clone(), proposal.proposed_value.clone());
                });
                result
            }
            _ => Ok(()),
        };
        self.flight_recorder.record(StateChangeRecord {
            timestamp_ms: now_ms,
            component_id: format!("{:?}", proposal.change_type),
            old_value: proposal.current_value.clone(),
            new_value: proposal.proposed_value.clone(),
            expected_gain: proposal.expected_gain,
            actual_delta,
            rollback_reason: None,
        });
    }

    /// Reconciles actual OS state against the Target State. Runs
    /// regardless of mode: drift correction is independent of the
    /// learning state machine (§5 concurrency model).
    pub fn reconcile(&self, log: &mut EventLog, now_ms: u64) -> u64 {
        self.reconciler.tick(&self.platform, &self.target_state, &self.flight_recorder, log, now_ms)
    }

    /// Fires an emergency rollback from any mode and latches ROLLBACK.
    pub fn trigger_rollback(&self, trigger: RollbackTrigger, log: &mut EventLog, now_ms: u64) {
        *self.shadow_trial.lock().unwrap() = None;
        *self.pending_proposal.lock().unwrap() = None;
        self.rollback.trigger(
            self.platform.as_ref(),
            &self.target_state,
            &self.flight_recorder,
            &self.dumps_dir,
            log,
            trigger,
            now_ms,
        );
        self.set_mode(Mode::Rollback);
    }

    /// `acknowledgeRollback`: clears the latch and returns to STANDBY.
    pub fn acknowledge_rollback(&self, log: &mut EventLog, now_ms: u64) {
        self.rollback.acknowledge(log, now_ms);
        self.set_mode(Mode::Standby);
    }

    pub fn clear_probation(&self) {
        self.probation.clear_all();
    }

    /// Manually dumps the Flight Recorder ring to `zereca_dumps/`, for
    /// the command surface's `dumpAudit`-equivalent diagnostics path
    /// (§4.4); independent of the rollback-triggered dump in `rollback.rs`.
    pub fn dump_flight_recorder(
        &self,
        reason: &str,
        now_ms: u64,
    ) -> Result<PathBuf, crate::error::PersistError> {
        self.flight_recorder.dump(&self.dumps_dir, reason, now_ms)
    }

    /// `resetLearning`: clears learned priors, the pending queue, and
    /// the current baseline, without touching the Target State.
    pub fn reset_learning(&self) {
        self.hypothesis.lock().unwrap().reset_priors();
        *self.baseline.lock().unwrap() = None;
    }
}
