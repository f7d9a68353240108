//! Hypothesis Engine: Bayesian-style parameter search over up to five
//! dimensions with Thompson-style exploration (§4.12). Grounded on the
//! teacher's `machine.rs` ask/tell `Solver` loop and `strategies/tpe.rs`'s
//! exploration-vs-exploitation split; `probe.rs`'s `UniformProbe` is the
//! model for the random-exploration fallback.

use super::types::{BaselineMetrics, ChangeType, Outcome};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::{HashMap, VecDeque};

pub const DEFAULT_EXPLORATION_RATE: f64 = 0.2;

#[derive(Debug, Clone)]
pub struct ParameterDimension {
    pub change_type: ChangeType,
    pub target_process: String,
    pub discrete_values: Vec<String>,
    pub prior_gain: f64,
    pub prior_confidence: f64,
}

impl ParameterDimension {
    fn type_bias(&self) -> f64 {
        match self.change_type {
            ChangeType::Priority => 10.0,
            ChangeType::IoPriority => 8.0,
            ChangeType::Affinity => 6.0,
            ChangeType::Timer => 4.0,
            ChangeType::PowerPlan => 4.0,
            ChangeType::Hpet => 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Hypothesis {
    pub change_type: ChangeType,
    pub target_process: String,
    pub proposed_value: String,
    pub expected_gain: f64,
    pub confidence: f64,
    pub priority: i64,
}

#[derive(Debug, Clone, Default)]
struct Priors {
    gain: f64,
    confidence: f64,
    trials: u64,
}

pub struct HypothesisEngine {
    dimensions: Vec<ParameterDimension>,
    exploration_rate: f64,
    queue: VecDeque<Hypothesis>,
    priors: HashMap<(ChangeType, String), Priors>,
    rng: ChaCha8Rng,
}

impl HypothesisEngine {
    pub fn new(seed: u64) -> Self {
        Self {
            dimensions: Self::default_dimensions(),
            exploration_rate: DEFAULT_EXPLORATION_RATE,
            queue: VecDeque::new(),
            priors: HashMap::new(),
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn with_exploration_rate(mut self, rate: f64) -> Self {
        self.exploration_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Default dimensions per §4.12: Priority (5), IoPriority (3),
    /// Affinity (2: all vs gold cores), Timer (3), PowerPlan (3).
    pub fn default_dimensions() -> Vec<ParameterDimension> {
        vec![
            ParameterDimension {
                change_type: ChangeType::Priority,
                target_process: String::new(),
                discrete_values: vec![
                    "idle".into(),
                    "below_normal".into(),
                    "normal".into(),
                    "above_normal".into(),
                    "high".into(),
                ],
                prior_gain: 0.03,
                prior_confidence: 0.3,
            },
            ParameterDimension {
                change_type: ChangeType::IoPriority,
                target_process: String::new(),
                discrete_values: vec!["low".into(), "normal".into(), "high".into()],
                prior_gain: 0.02,
                prior_confidence: 0.3,
            },
            ParameterDimension {
                change_type: ChangeType::Affinity,
                target_process: String::new(),
                discrete_values: vec!["all".into(), "gold_cores".into()],
                prior_gain: 0.04,
                prior_confidence: 0.35,
            },
            ParameterDimension {
                change_type: ChangeType::Timer,
                target_process: String::new(),
                discrete_values: vec!["default".into(), "1ms".into(), "0.5ms".into()],
                prior_gain: 0.03,
                prior_confidence: 0.3,
            },
            ParameterDimension {
                change_type: ChangeType::PowerPlan,
                target_process: String::new(),
                discrete_values: vec!["balanced".into(), "performance".into(), "custom".into()],
                prior_gain: 0.05,
                prior_confidence: 0.3,
            },
        ]
    }

    fn context_aware_gain(&self, dim: &ParameterDimension, baseline: &BaselineMetrics) -> f64 {
        let mut gain = dim.prior_gain;
        match dim.change_type {
            ChangeType::Priority | ChangeType::Affinity => {
                if baseline.cpu_residency > 0.7 {
                    gain *= 1.5;
                }
            }
            ChangeType::Timer => {
                if baseline.fps_variance > 4.0 {
                    gain *= 1.5;
                }
            }
            _ => {}
        }
        gain
    }

    fn prior_for(&self, change_type: ChangeType, value: &str) -> Priors {
        self.priors
            .get(&(change_type, value.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    /// Best-known value for a dimension: the discrete value with the
    /// highest recorded `gain * confidence`, falling back to the prior.
    fn best_known_value<'a>(
        &self,
        dim: &'a ParameterDimension,
    ) -> &'a str {
        dim.discrete_values
            .iter()
            .max_by(|a, b| {
                let pa = self.prior_for(dim.change_type, a);
                let pb = self.prior_for(dim.change_type, b);
                let score_a = if pa.trials > 0 { pa.gain * pa.confidence } else { dim.prior_gain * dim.prior_confidence };
                let score_b = if pb.trials > 0 { pb.gain * pb.confidence } else { dim.prior_gain * dim.prior_confidence };
                score_a.partial_cmp(&score_b).unwrap()
            })
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Generates one hypothesis per active dimension, sorted by
    /// priority descending, and refills the internal queue.
    pub fn generate_hypotheses(
        &mut self,
        baseline: &BaselineMetrics,
        emulator_name: &str,
        target_process: &str,
    ) -> Vec<Hypothesis> {
        let mut hypotheses = Vec::with_capacity(self.dimensions.len());
        let emulator_boost = if emulator_name.is_empty() { 0.0 } else { 0.05 };

        for dim in self.dimensions.clone() {
            let gain = self.context_aware_gain(&dim, baseline);
            let confidence = (dim.prior_confidence + emulator_boost).min(0.95);

            let value = if self.rng.random_bool(self.exploration_rate) {
                let idx = self.rng.random_range(0..dim.discrete_values.len());
                dim.discrete_values[idx].clone()
            } else {
                self.best_known_value(&dim).to_string()
            };

            let priority = (gain * confidence * 100.0).round() as i64 + dim.type_bias() as i64;

            hypotheses.push(Hypothesis {
                change_type: dim.change_type,
                target_process: target_process.to_string(),
                proposed_value: value,
                expected_gain: gain,
                confidence,
                priority,
            });
        }

        hypotheses.sort_by(|a, b| b.priority.cmp(&a.priority));
        self.queue = hypotheses.iter().cloned().collect();
        hypotheses
    }

    pub fn next_hypothesis(&mut self) -> Option<Hypothesis> {
        self.queue.pop_front()
    }

    pub fn pending_count(&self) -> usize {
        self.queue.len()
    }

    /// Incremental-mean gain update plus confidence nudge on outcome,
    /// keyed by `change_type ⊕ proposed_value` per §4.12.
    pub fn record_outcome(&mut self, change_type: ChangeType, value: &str, outcome: Outcome, actual_delta: f64) {
        let key = (change_type, value.to_string());
        let entry = self.priors.entry(key).or_default();
        entry.trials += 1;
        let n = entry.trials as f64;
        entry.gain = (1.0 - 1.0 / n) * entry.gain + (1.0 / n) * actual_delta;

        match outcome {
            Outcome::Positive => entry.confidence = (entry.confidence + 0.1).min(0.95),
            Outcome::Neutral => entry.confidence = (entry.confidence - 0.05).max(0.1),
            Outcome::NegativeStability | Outcome::NegativeSafety => {
                entry.confidence = (entry.confidence - 0.3).max(0.0)
            }
        }
    }

    pub fn reset_priors(&mut self) {
        self.priors.clear();
        self.queue.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn baseline() -> BaselineMetrics {
        BaselineMetrics {
            fps: 60.0,
            cpu_residency: 0.5,
            fps_variance: 2.0,
            ..Default::default()
        }
    }

    #[test]
    fn generates_one_hypothesis_per_default_dimension() {
        let mut engine = HypothesisEngine::new(42);
        let hyps = engine.generate_hypotheses(&baseline(), "LDPlayer", "game.exe");
        assert_eq!(hyps.len(), 5);
    }

    #[test]
    fn hypotheses_are_sorted_by_priority_descending() {
        let mut engine = HypothesisEngine::new(42);
        let hyps = engine.generate_hypotheses(&baseline(), "LDPlayer", "game.exe");
        for pair in hyps.windows(2) {
            assert!(pair[0].priority >= pair[1].priority);
        }
    }

    #[test]
    fn next_hypothesis_drains_the_queue_in_order() {
        let mut engine = HypothesisEngine::new(42);
        let hyps = engine.generate_hypotheses(&baseline(), "LDPlayer", "game.exe");
        assert_eq!(engine.pending_count(), hyps.len());
        let first = engine.next_hypothesis().unwrap();
        assert_eq!(first, hyps[0]);
        assert_eq!(engine.pending_count(), hyps.len() - 1);
    }

    #[test]
    fn positive_outcome_raises_confidence_prior() {
        let mut engine = HypothesisEngine::new(42);
        engine.record_outcome(ChangeType::Priority, "high", Outcome::Positive, 0.1);
        let p = engine.prior_for(ChangeType::Priority, "high");
        assert_eq!(p.trials, 1);
        assert!(p.confidence > 0.0);
    }

    #[test]
    fn negative_outcome_sharply_lowers_confidence() {
        let mut engine = HypothesisEngine::new(42);
        engine.record_outcome(ChangeType::Priority, "high", Outcome::Positive, 0.1);
        let before = engine.prior_for(ChangeType::Priority, "high").confidence;
        engine.record_outcome(ChangeType::Priority, "high", Outcome::NegativeSafety, -0.2);
        let after = engine.prior_for(ChangeType::Priority, "high").confidence;
        assert!(after < before);
    }

    #[test]
    fn reset_priors_clears_learned_state_and_queue() {
        let mut engine = HypothesisEngine::new(42);
        engine.record_outcome(ChangeType::Priority, "high", Outcome::Positive, 0.1);
        engine.generate_hypotheses(&baseline(), "LDPlayer", "game.exe");
        engine.reset_priors();
        assert_eq!(engine.pending_count(), 0);
        assert_eq!(engine.prior_for(ChangeType::Priority, "high").trials, 0);
    }
}
