//! Shadow Mode: reversible A/B trial executor for process-scoped
//! changes (§4.13). Grounded on the teacher's `machine.rs` phase
//! transitions (`Phase::Probe -> Classify -> Refine -> Done`).

use super::types::{ChangeType, OptimizationProposal};
use crate::error::ShadowError;
use crate::platform::Platform;

pub const DEFAULT_STABILIZATION_MS: u64 = 5_000;
pub const DEFAULT_TRIAL_MS: u64 = 30_000;
pub const MAX_TRIAL_MS: u64 = 60_000;
const SAMPLE_INTERVAL_MS: u64 = 500;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrialPhase {
    Stabilizing,
    Sampling,
    Complete,
    Aborted,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShadowTrialResult {
    pub before_fps: f64,
    pub after_fps: f64,
    pub performance_delta: f64,
}

pub struct ShadowTrial {
    proposal: OptimizationProposal,
    pid: u32,
    original_value: String,
    started_at_ms: u64,
    stabilization_ms: u64,
    trial_ms: u64,
    before_fps: f64,
    samples: Vec<f64>,
    last_sample_ms: u64,
    phase: TrialPhase,
}

impl ShadowTrial {
    /// `startTrial`: snapshots "before" metrics, applies the change, and
    /// begins the stabilization window. Only `Priority`, `IoPriority`,
    /// and `Affinity` are shadow-testable (§4.13 scope).
    pub fn start<P: Platform>(
        platform: &P,
        proposal: OptimizationProposal,
        pid: u32,
        before_fps: f64,
        now_ms: u64,
    ) -> Result<Self, ShadowError> {
        if !proposal.change_type.is_shadow_testable() {
            return Err(ShadowError::NotShadowTestable(proposal.change_type));
        }

        let original_value = match proposal.change_type {
            ChangeType::Priority => platform.get_process_priority(&proposal.target_process),
            ChangeType::IoPriority => platform.get_process_io_priority(&proposal.target_process),
            ChangeType::Affinity => platform.get_process_affinity(&proposal.target_process),
            _ => None,
        }
        .unwrap_or_default();

        Self::apply(platform, &proposal)?;

        Ok(Self {
            proposal,
            pid,
            original_value,
            started_at_ms: now_ms,
            stabilization_ms: DEFAULT_STABILIZATION_MS,
            trial_ms: DEFAULT_TRIAL_MS.min(MAX_TRIAL_MS),
            before_fps,
            samples: Vec::new(),
            last_sample_ms: now_ms,
            phase: TrialPhase::Stabilizing,
        })
    }

    pub fn with_durations(mut self, stabilization_ms: u64, trial_ms: u64) -> Self {
        self.stabilization_ms = stabilization_ms;
        self.trial_ms = trial_ms.min(MAX_TRIAL_MS);
        self
    }

    fn apply<P: Platform>(platform: &P, proposal: &OptimizationProposal) -> Result<(), ShadowError> {
        let result = match proposal.change_type {
            ChangeType::Priority => {
                platform.set_process_priority(&proposal.target_process, &proposal.proposed_value)
            }
            ChangeType::IoPriority => platform
                .set_process_io_priority(&proposal.target_process, &proposal.proposed_value),
            ChangeType::Affinity => {
                platform.set_process_affinity(&proposal.target_process, &proposal.proposed_value)
            }
            _ => return Err(ShadowError::NotShadowTestable(proposal.change_type)),
        };
        result.map_err(|_| ShadowError::TargetExited(0))
    }

    fn revert<P: Platform>(&self, platform: &P) {
        let _ = match self.proposal.change_type {
            ChangeType::Priority => {
                platform.set_process_priority(&self.proposal.target_process, &self.original_value)
            }
            ChangeType::IoPriority => platform
                .set_process_io_priority(&self.proposal.target_process, &self.original_value),
            ChangeType::Affinity => {
                platform.set_process_affinity(&self.proposal.target_process, &self.original_value)
            }
            _ => Ok(()),
        };
    }

    /// Samples metrics every 500 ms, advancing stabilization ->
    /// sampling -> complete. Reverts the change as soon as it completes
    /// or aborts. `target_alive` models the platform's liveness check.
    pub fn tick<P: Platform>(
        &mut self,
        platform: &P,
        current_fps: f64,
        now_ms: u64,
        target_alive: bool,
    ) -> TrialPhase {
        if matches!(self.phase, TrialPhase::Complete | TrialPhase::Aborted) {
            return self.phase;
        }

        if !target_alive {
            self.revert(platform);
            self.phase = TrialPhase::Aborted;
            return self.phase;
        }

        if now_ms.saturating_sub(self.last_sample_ms) < SAMPLE_INTERVAL_MS {
            return self.phase;
        }
        self.last_sample_ms = now_ms;

        let elapsed = now_ms.saturating_sub(self.started_at_ms);
        match self.phase {
            TrialPhase::Stabilizing => {
                if elapsed >= self.stabilization_ms {
                    self.phase = TrialPhase::Sampling;
                }
            }
            TrialPhase::Sampling => {
                self.samples.push(current_fps);
                if elapsed >= self.stabilization_ms + self.trial_ms {
                    self.revert(platform);
                    self.phase = TrialPhase::Complete;
                }
            }
            _ => {}
        }
        self.phase
    }

    pub fn phase(&self) -> TrialPhase {
        self.phase
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// `after = mean(trial_samples)`, `performance_delta = (after -
    /// before) / before`.
    pub fn result(&self) -> Option<ShadowTrialResult> {
        if self.phase != TrialPhase::Complete || self.samples.is_empty() {
            return None;
        }
        let after_fps = self.samples.iter().sum::<f64>() / self.samples.len() as f64;
        let performance_delta = if self.before_fps.abs() > 1e-9 {
            (after_fps - self.before_fps) / self.before_fps
        } else {
            0.0
        };
        Some(ShadowTrialResult {
            before_fps: self.before_fps,
            after_fps,
            performance_delta,
        })
    }
}

/// Stateless facade matching §4.13's `startTrial`/`trialComplete`
/// naming; `ShadowTrial` itself carries the per-trial state machine.
pub struct ShadowMode;

impl ShadowMode {
    pub fn start_trial<P: Platform>(
        platform: &P,
        proposal: OptimizationProposal,
        pid: u32,
        before_fps: f64,
        now_ms: u64,
    ) -> Result<ShadowTrial, ShadowError> {
        ShadowTrial::start(platform, proposal, pid, before_fps, now_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::null::NullPlatform;
    use crate::zereca::types::ProcessInfo;

    fn proposal(change_type: ChangeType) -> OptimizationProposal {
        OptimizationProposal {
            change_type,
            target_process: "game.exe".into(),
            current_value: "normal".into(),
            proposed_value: "high".into(),
            expected_gain: 0.05,
            confidence: 0.8,
            shadow_testable: true,
        }
    }

    fn platform_with_process() -> NullPlatform {
        let p = NullPlatform::new();
        p.seed_process(ProcessInfo {
            pid: 1,
            executable_name: "game.exe".into(),
            window_class: None,
            loaded_modules: vec![],
            child_count: 0,
        });
        p
    }

    #[test]
    fn non_shadow_testable_types_are_rejected() {
        let platform = platform_with_process();
        let result = ShadowMode::start_trial(&platform, proposal(ChangeType::Timer), 1, 60.0, 0);
        assert!(matches!(result, Err(ShadowError::NotShadowTestable(_))));
    }

    #[test]
    fn full_trial_computes_performance_delta() {
        let platform = platform_with_process();
        let mut trial =
            ShadowMode::start_trial(&platform, proposal(ChangeType::Priority), 1, 60.0, 0)
                .unwrap()
                .with_durations(1_000, 2_000);

        let mut t = 0u64;
        loop {
            t += 500;
            let phase = trial.tick(&platform, 66.0, t, true);
            if phase == TrialPhase::Complete {
                break;
            }
            if t > 10_000 {
                panic!("trial never completed");
            }
        }

        let result = trial.result().unwrap();
        assert!((result.performance_delta - 0.1).abs() < 1e-6);
        assert_eq!(platform.get_process_priority("game.exe").as_deref(), Some("normal"));
    }

    #[test]
    fn target_exit_mid_trial_aborts_and_reverts() {
        let platform = platform_with_process();
        let mut trial =
            ShadowMode::start_trial(&platform, proposal(ChangeType::Priority), 1, 60.0, 0)
                .unwrap();
        let phase = trial.tick(&platform, 66.0, 500, false);
        assert_eq!(phase, TrialPhase::Aborted);
        assert_eq!(platform.get_process_priority("game.exe").as_deref(), Some("normal"));
    }
}
