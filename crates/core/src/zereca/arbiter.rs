//! Arbiter: the rule-ordered gate that approves or rejects optimization
//! proposals (§4.7). Confirmed against `OptimizationArbiter.cpp`.

use super::flight_recorder::{FlightRecorder, StateChangeRecord};
use super::probation::ProbationLedger;
use super::types::{ChangeType, OptimizationProposal, Outcome, ProbationSeverity, SystemContext};
use std::collections::HashMap;
use std::sync::RwLock;

/// Locked invariant (§8): the Arbiter rejects every proposal below this
/// emulator-confidence floor, regardless of all other state.
pub const EMULATOR_CONFIDENCE_FLOOR: f64 = 0.75;

#[derive(Debug, Clone, PartialEq)]
pub enum RejectionReason {
    RollbackActive,
    LowEmulatorConfidence,
    OnProbation,
    PrivilegeRequired,
    CooldownActive { remaining_ms: u64 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Approved,
    Rejected(RejectionReason),
}

pub struct Arbiter {
    cooldowns: RwLock<HashMap<ChangeType, u64>>,
    approved_count: std::sync::atomic::AtomicU64,
}

impl Arbiter {
    pub fn new() -> Self {
        Self {
            cooldowns: RwLock::new(HashMap::new()),
            approved_count: std::sync::atomic::AtomicU64::new(0),
        }
    }

    pub fn approved_count(&self) -> u64 {
        self.approved_count.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Rule-ordered evaluation per §4.7. `is_operator` reflects the
    /// caller's current telemetry privilege tier.
    #[allow(clippy::too_many_arguments)]
    pub fn evaluate(
        &self,
        proposal: &OptimizationProposal,
        emulator_confidence: f64,
        rollback_active: bool,
        probation: &ProbationLedger,
        ctx: &SystemContext,
        is_operator: bool,
        now_ms: u64,
    ) -> Decision {
        if rollback_active {
            return Decision::Rejected(RejectionReason::RollbackActive);
        }
        if emulator_confidence < EMULATOR_CONFIDENCE_FLOOR {
            return Decision::Rejected(RejectionReason::LowEmulatorConfidence);
        }
        if probation.is_on_probation(proposal.config_hash(), now_ms, ctx) {
            return Decision::Rejected(RejectionReason::OnProbation);
        }
        if proposal.change_type.requires_operator() && !is_operator {
            return Decision::Rejected(RejectionReason::PrivilegeRequired);
        }
        if let Some(remaining) = self.cooldown_remaining(proposal.change_type, now_ms) {
            return Decision::Rejected(RejectionReason::CooldownActive {
                remaining_ms: remaining,
            });
        }

        self.cooldowns
            .write()
            .unwrap()
            .insert(proposal.change_type, now_ms);
        self.approved_count
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Decision::Approved
    }

    /// Writes a Flight Recorder entry for a trial outcome; negative
    /// stability/safety outcomes additionally add a Probation Entry.
    /// A shadow trial never sets `had_crash`/`had_thermal_event`, so the
    /// only way the classifier reaches `NegativeStability` from here is
    /// rule 6 (`delta <= -0.10`), which carries severity LOW; rule 2's
    /// crash-triggered `NegativeStability` (severity MEDIUM) is handled
    /// directly by `trigger_rollback`'s catastrophic path and never
    /// passes through the Arbiter.
    pub fn record_outcome(
        &self,
        proposal: &OptimizationProposal,
        outcome: Outcome,
        actual_delta: f64,
        recorder: &FlightRecorder,
        probation: &ProbationLedger,
        ctx: &SystemContext,
        now_ms: u64,
    ) {
        recorder.record(StateChangeRecord {
            timestamp_ms: now_ms,
            component_id: format!("{:?}", proposal.change_type),
            old_value: proposal.current_value.clone(),
            new_value: proposal.proposed_value.clone(),
            expected_gain: proposal.expected_gain,
            actual_delta,
            rollback_reason: None,
        });

        let severity = match outcome {
            Outcome::NegativeStability => Some(ProbationSeverity::Low),
            Outcome::NegativeSafety => Some(ProbationSeverity::Critical),
            Outcome::Positive | Outcome::Neutral => None,
        };
        if let Some(severity) = severity {
            probation.record_failure(proposal.config_hash(), now_ms, severity, ctx);
        }
    }

    fn cooldown_remaining(&self, change_type: ChangeType, now_ms: u64) -> Option<u64> {
        let last = *self.cooldowns.read().unwrap().get(&change_type)?;
        let elapsed = now_ms.saturating_sub(last);
        let cooldown = change_type.cooldown_ms();
        if elapsed < cooldown {
            Some(cooldown - elapsed)
        } else {
            None
        }
    }
}

impl Default for Arbiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proposal() -> OptimizationProposal {
        OptimizationProposal {
            change_type: ChangeType::Priority,
            target_process: "game.exe".into(),
            current_value: "normal".into(),
            proposed_value: "high".into(),
            expected_gain: 0.05,
            confidence: 0.9,
            shadow_testable: true,
        }
    }

    #[test]
    fn rejects_every_proposal_below_confidence_floor() {
        let arbiter = Arbiter::new();
        let probation = ProbationLedger::new();
        let ctx = SystemContext::default();
        let decision = arbiter.evaluate(&proposal(), 0.74, false, &probation, &ctx, true, 0);
        assert_eq!(
            decision,
            Decision::Rejected(RejectionReason::LowEmulatorConfidence)
        );
    }

    #[test]
    fn approves_at_and_above_confidence_floor() {
        let arbiter = Arbiter::new();
        let probation = ProbationLedger::new();
        let ctx = SystemContext::default();
        let decision = arbiter.evaluate(&proposal(), 0.76, false, &probation, &ctx, true, 0);
        assert_eq!(decision, Decision::Approved);
        assert_eq!(arbiter.approved_count(), 1);
    }

    #[test]
    fn s3_confidence_gate_then_approval_sets_cooldown() {
        let arbiter = Arbiter::new();
        let probation = ProbationLedger::new();
        let ctx = SystemContext::default();

        let first = arbiter.evaluate(&proposal(), 0.74, false, &probation, &ctx, true, 1_000);
        assert_eq!(
            first,
            Decision::Rejected(RejectionReason::LowEmulatorConfidence)
        );

        let second = arbiter.evaluate(&proposal(), 0.76, false, &probation, &ctx, true, 1_000);
        assert_eq!(second, Decision::Approved);
        assert_eq!(arbiter.approved_count(), 1);

        // Immediately re-submitting hits the 5s Priority cooldown.
        let third = arbiter.evaluate(&proposal(), 0.9, false, &probation, &ctx, true, 1_500);
        assert_eq!(
            third,
            Decision::Rejected(RejectionReason::CooldownActive { remaining_ms: 4_500 })
        );
    }

    #[test]
    fn rejects_every_proposal_when_rollback_is_active() {
        let arbiter = Arbiter::new();
        let probation = ProbationLedger::new();
        let ctx = SystemContext::default();
        let decision = arbiter.evaluate(&proposal(), 1.0, true, &probation, &ctx, true, 0);
        assert_eq!(decision, Decision::Rejected(RejectionReason::RollbackActive));
    }

    #[test]
    fn operator_required_types_rejected_for_standard_tier() {
        let arbiter = Arbiter::new();
        let probation = ProbationLedger::new();
        let ctx = SystemContext::default();
        let mut p = proposal();
        p.change_type = ChangeType::Timer;
        let decision = arbiter.evaluate(&p, 1.0, false, &probation, &ctx, false, 0);
        assert_eq!(decision, Decision::Rejected(RejectionReason::PrivilegeRequired));
    }

    #[test]
    fn probation_blocks_matching_config_hash() {
        let arbiter = Arbiter::new();
        let probation = ProbationLedger::new();
        let ctx = SystemContext::default();
        let p = proposal();
        probation.record_failure(
            p.config_hash(),
            0,
            super::super::types::ProbationSeverity::Critical,
            &ctx,
        );
        let decision = arbiter.evaluate(&p, 1.0, false, &probation, &ctx, true, 0);
        assert_eq!(decision, Decision::Rejected(RejectionReason::OnProbation));
    }

    #[test]
    fn negative_stability_outcome_adds_low_probation_entry() {
        let arbiter = Arbiter::new();
        let probation = ProbationLedger::new();
        let recorder = FlightRecorder::new();
        let ctx = SystemContext::default();
        let p = proposal();
        arbiter.record_outcome(
            &p,
            super::super::types::Outcome::NegativeStability,
            -0.15,
            &recorder,
            &probation,
            &ctx,
            0,
        );
        assert!(probation.is_on_probation(p.config_hash(), 0, &ctx));
        // LOW severity resurrects once the backoff window elapses, unlike
        // MEDIUM/CRITICAL which stay blocked regardless of elapsed time.
        assert!(!probation.is_on_probation(
            p.config_hash(),
            super::probation::LOW_INITIAL_BACKOFF_MS,
            &ctx
        ));
    }

    #[test]
    fn negative_safety_outcome_adds_critical_probation_entry() {
        let arbiter = Arbiter::new();
        let probation = ProbationLedger::new();
        let recorder = FlightRecorder::new();
        let ctx = SystemContext::default();
        let p = proposal();
        arbiter.record_outcome(
            &p,
            super::super::types::Outcome::NegativeSafety,
            -0.2,
            &recorder,
            &probation,
            &ctx,
            0,
        );
        assert_eq!(recorder.len(), 1);
        assert!(probation.is_on_probation(p.config_hash(), u64::MAX, &ctx));
    }
}
