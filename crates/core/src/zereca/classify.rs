//! Outcome Classifier: labels a shadow-trial result into one of the
//! four outcomes (§4.9). Confirmed against `OutcomeClassifier.cpp`;
//! structured after the teacher's `classify.rs` (`VarianceClassifier`'s
//! simple, rule-ordered shape).

use super::types::{BaselineMetrics, Outcome};

/// Composite-delta weights (§9 open question 2): reproduced literally
/// as the spec states them, since the original only carries these as
/// code comments.
const FPS_WEIGHT: f64 = 0.5;
const FRAME_TIME_WEIGHT: f64 = 0.3;
const VARIANCE_WEIGHT: f64 = 0.2;

const POSITIVE_DELTA_THRESHOLD: f64 = 0.05;
const POSITIVE_CONFIDENCE_THRESHOLD: f64 = 0.7;
const NEGATIVE_DELTA_THRESHOLD: f64 = -0.10;
const CONFIDENCE_DURATION_MS: f64 = 10_000.0;
const CONFIDENCE_SCALE: f64 = 0.9;

#[derive(Debug, Clone, Copy)]
pub struct ClassifierInput<'a> {
    pub baseline: &'a BaselineMetrics,
    pub current: &'a BaselineMetrics,
    pub had_crash: bool,
    pub had_thermal_event: bool,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassifierResult {
    pub outcome: Outcome,
    pub delta: f64,
    pub confidence: f64,
    pub should_commit: bool,
    pub should_rollback: bool,
    pub should_revert: bool,
}

fn relative_change(baseline: f64, current: f64) -> f64 {
    if baseline.abs() < 1e-9 {
        return 0.0;
    }
    (current - baseline) / baseline
}

fn composite_delta(baseline: &BaselineMetrics, current: &BaselineMetrics) -> f64 {
    let fps_delta = relative_change(baseline.fps, current.fps);
    // Lower frame time and lower variance are better, so invert the sign.
    let frame_time_delta = -relative_change(baseline.avg_frame_time, current.avg_frame_time);
    let variance_delta = -relative_change(baseline.fps_variance, current.fps_variance);

    FPS_WEIGHT * fps_delta + FRAME_TIME_WEIGHT * frame_time_delta + VARIANCE_WEIGHT * variance_delta
}

/// Rule-ordered classification per §4.9.
pub fn classify_outcome(input: ClassifierInput<'_>) -> ClassifierResult {
    if input.had_thermal_event {
        return ClassifierResult {
            outcome: Outcome::NegativeSafety,
            delta: 0.0,
            confidence: 1.0,
            should_commit: false,
            should_rollback: true,
            should_revert: false,
        };
    }
    if input.had_crash {
        return ClassifierResult {
            outcome: Outcome::NegativeStability,
            delta: 0.0,
            confidence: 1.0,
            should_commit: false,
            should_rollback: true,
            should_revert: false,
        };
    }

    let delta = composite_delta(input.baseline, input.current);
    let confidence = (input.duration_ms as f64 / CONFIDENCE_DURATION_MS).min(1.0) * CONFIDENCE_SCALE;

    if delta >= POSITIVE_DELTA_THRESHOLD && confidence >= POSITIVE_CONFIDENCE_THRESHOLD {
        return ClassifierResult {
            outcome: Outcome::Positive,
            delta,
            confidence,
            should_commit: true,
            should_rollback: false,
            should_revert: false,
        };
    }

    if delta <= NEGATIVE_DELTA_THRESHOLD {
        return ClassifierResult {
            outcome: Outcome::NegativeStability,
            delta,
            confidence,
            should_commit: false,
            should_rollback: true,
            should_revert: false,
        };
    }

    ClassifierResult {
        outcome: Outcome::Neutral,
        delta,
        confidence,
        should_commit: false,
        should_rollback: false,
        should_revert: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s4_positive_outcome_matches_spec_worked_example() {
        let baseline = BaselineMetrics {
            fps: 60.0,
            avg_frame_time: 16.67,
            fps_variance: 4.0,
            duration_ms: 11_000,
            ..Default::default()
        };
        let current = BaselineMetrics {
            fps: 66.0,
            avg_frame_time: 15.15,
            fps_variance: 3.0,
            ..Default::default()
        };
        let result = classify_outcome(ClassifierInput {
            baseline: &baseline,
            current: &current,
            had_crash: false,
            had_thermal_event: false,
            duration_ms: 11_000,
        });
        assert_eq!(result.outcome, Outcome::Positive);
        assert!((result.delta - 0.127).abs() < 0.01);
        assert!((result.confidence - 0.9).abs() < 1e-9);
        assert!(result.should_commit);
    }

    #[test]
    fn thermal_event_always_wins_regardless_of_metrics() {
        let baseline = BaselineMetrics::default();
        let current = BaselineMetrics {
            fps: 1000.0,
            ..Default::default()
        };
        let result = classify_outcome(ClassifierInput {
            baseline: &baseline,
            current: &current,
            had_crash: false,
            had_thermal_event: true,
            duration_ms: 30_000,
        });
        assert_eq!(result.outcome, Outcome::NegativeSafety);
        assert!(result.should_rollback);
    }

    #[test]
    fn crash_outranks_positive_metrics() {
        let baseline = BaselineMetrics {
            fps: 60.0,
            ..Default::default()
        };
        let current = BaselineMetrics {
            fps: 90.0,
            ..Default::default()
        };
        let result = classify_outcome(ClassifierInput {
            baseline: &baseline,
            current: &current,
            had_crash: true,
            had_thermal_event: false,
            duration_ms: 30_000,
        });
        assert_eq!(result.outcome, Outcome::NegativeStability);
    }

    #[test]
    fn large_regression_without_crash_is_negative_stability_low_severity() {
        let baseline = BaselineMetrics {
            fps: 60.0,
            avg_frame_time: 16.67,
            fps_variance: 1.0,
            ..Default::default()
        };
        let current = BaselineMetrics {
            fps: 40.0,
            avg_frame_time: 25.0,
            fps_variance: 5.0,
            ..Default::default()
        };
        let result = classify_outcome(ClassifierInput {
            baseline: &baseline,
            current: &current,
            had_crash: false,
            had_thermal_event: false,
            duration_ms: 30_000,
        });
        assert_eq!(result.outcome, Outcome::NegativeStability);
        assert!(result.should_rollback);
    }

    #[test]
    fn indeterminate_result_reverts_without_probation() {
        let baseline = BaselineMetrics {
            fps: 60.0,
            avg_frame_time: 16.67,
            fps_variance: 4.0,
            ..Default::default()
        };
        let current = BaselineMetrics {
            fps: 60.5,
            avg_frame_time: 16.6,
            fps_variance: 4.0,
            ..Default::default()
        };
        let result = classify_outcome(ClassifierInput {
            baseline: &baseline,
            current: &current,
            had_crash: false,
            had_thermal_event: false,
            duration_ms: 30_000,
        });
        assert_eq!(result.outcome, Outcome::Neutral);
        assert!(result.should_revert);
        assert!(!result.should_commit);
        assert!(!result.should_rollback);
    }
}
