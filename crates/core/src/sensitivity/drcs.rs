//! Directional Repetition Constraint System: an alternate repetition
//! limiter to the Pipeline's internal 8-element cosine damper (step 9).
//! Per §9 open question 1, only one limiter runs in the hot path at a
//! time; this one is built and tested but left unwired, mirroring the
//! original's dead-but-present component.

use std::collections::VecDeque;

const DEFAULT_RING_CAPACITY: usize = 20;
const DEFAULT_DIRECTION_THRESHOLD: f64 = 0.95;
const DEFAULT_DECAY_RATE: f64 = 0.3;
const DEFAULT_SIGMOID_STEEPNESS: f64 = 8.0;
const DEFAULT_SIGMOID_MIDPOINT: f64 = 0.5;
const DEFAULT_CV_BYPASS_THRESHOLD: f64 = 0.05;
const JITTER_SIMILARITY_LOW: f64 = 0.95;
const JITTER_SIMILARITY_HIGH: f64 = 0.99;
const RESET_THRESHOLD: f64 = 0.0;
const RESET_DECAY: f64 = 0.5;
const SUPPRESSION_MIN: f64 = 0.15;
const SUPPRESSION_MAX: f64 = 1.0;

#[derive(Debug, Clone, Copy)]
pub struct DrcsConfig {
    pub ring_capacity: usize,
    pub direction_threshold: f64,
    pub decay_rate: f64,
    pub sigmoid_steepness: f64,
    pub sigmoid_midpoint: f64,
    pub cv_bypass_threshold: f64,
}

impl Default for DrcsConfig {
    fn default() -> Self {
        Self {
            ring_capacity: DEFAULT_RING_CAPACITY,
            direction_threshold: DEFAULT_DIRECTION_THRESHOLD,
            decay_rate: DEFAULT_DECAY_RATE,
            sigmoid_steepness: DEFAULT_SIGMOID_STEEPNESS,
            sigmoid_midpoint: DEFAULT_SIGMOID_MIDPOINT,
            cv_bypass_threshold: DEFAULT_CV_BYPASS_THRESHOLD,
        }
    }
}

/// Cosine-similarity repetition detector with sigmoid suppression,
/// operating independently of the Pipeline's own drag limiter.
pub struct Drcs {
    config: DrcsConfig,
    directions: VecDeque<(f64, f64)>,
    magnitudes: VecDeque<f64>,
    score: f64,
}

impl Drcs {
    pub fn new(config: DrcsConfig) -> Self {
        Self {
            directions: VecDeque::with_capacity(config.ring_capacity),
            magnitudes: VecDeque::with_capacity(config.ring_capacity),
            config,
            score: 0.0,
        }
    }

    fn cosine(a: (f64, f64), b: (f64, f64)) -> f64 {
        let mag_a = a.0.hypot(a.1);
        let mag_b = b.0.hypot(b.1);
        if mag_a <= 1e-9 || mag_b <= 1e-9 {
            return 0.0;
        }
        (a.0 * b.0 + a.1 * b.1) / (mag_a * mag_b)
    }

    fn coefficient_of_variation(values: &VecDeque<f64>) -> f64 {
        if values.len() < 2 {
            return 0.0;
        }
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        if mean.abs() < 1e-9 {
            return 0.0;
        }
        let variance =
            values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
        variance.sqrt() / mean.abs()
    }

    fn sigmoid_suppression(&self, repetition: f64) -> f64 {
        let a = self.config.sigmoid_steepness;
        let r0 = self.config.sigmoid_midpoint;
        let raw = 1.0 / (1.0 + (a * (repetition - r0)).exp());
        raw.clamp(SUPPRESSION_MIN, SUPPRESSION_MAX)
    }

    /// Computes the weighted repetition score over the direction ring,
    /// applies the micro-variance bypass, and returns the clamped
    /// sigmoid suppression factor.
    fn repetition_score(&self, current: (f64, f64)) -> f64 {
        let mut score = 0.0;
        let mut similarities = Vec::with_capacity(self.directions.len());
        for (i, &past) in self.directions.iter().rev().enumerate() {
            let cosine = Self::cosine(current, past);
            similarities.push(cosine);
            if cosine >= self.config.direction_threshold {
                let weight = (-self.config.decay_rate * i as f64).exp();
                score += weight * cosine;
            }
        }

        let cv = Self::coefficient_of_variation(&self.magnitudes);
        let mean_similarity = if similarities.is_empty() {
            0.0
        } else {
            similarities.iter().sum::<f64>() / similarities.len() as f64
        };
        let is_natural_jitter =
            (JITTER_SIMILARITY_LOW..=JITTER_SIMILARITY_HIGH).contains(&mean_similarity);
        if cv > self.config.cv_bypass_threshold || is_natural_jitter {
            score *= 0.5;
        }
        score
    }

    /// Multiplies `(dx, dy)` in place by the suppression factor derived
    /// from recent direction history, then rolls the ring.
    pub fn apply_to_input(&mut self, dx: &mut f64, dy: &mut f64) {
        let current = (*dx, *dy);
        let magnitude = current.0.hypot(current.1);

        if magnitude <= 1e-9 {
            self.score *= RESET_DECAY;
            return;
        }

        let direction_changed = self
            .directions
            .back()
            .map(|&last| Self::cosine(current, last) < RESET_THRESHOLD)
            .unwrap_or(false);
        if direction_changed {
            self.score *= RESET_DECAY;
        }

        let repetition = self.repetition_score(current);
        self.score = repetition;
        let suppression = self.sigmoid_suppression(repetition);

        *dx *= suppression;
        *dy *= suppression;

        if self.directions.len() >= self.config.ring_capacity {
            self.directions.pop_front();
            self.magnitudes.pop_front();
        }
        self.directions.push_back(current);
        self.magnitudes.push_back(magnitude);
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn reset(&mut self) {
        self.directions.clear();
        self.magnitudes.clear();
        self.score = 0.0;
    }
}

impl Default for Drcs {
    fn default() -> Self {
        Self::new(DrcsConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suppression_factor_always_within_bounds() {
        let mut drcs = Drcs::default();
        for _ in 0..50 {
            let mut dx = 10.0;
            let mut dy = 0.0;
            drcs.apply_to_input(&mut dx, &mut dy);
            let factor = if dx.abs() > 1e-9 { dx / 10.0 } else { 0.0 };
            assert!((SUPPRESSION_MIN..=SUPPRESSION_MAX).contains(&factor) || factor == 0.0);
        }
    }

    #[test]
    fn repeated_identical_direction_increases_suppression_over_time() {
        let mut drcs = Drcs::default();
        let mut first_factor = 1.0;
        let mut last_factor = 1.0;
        for i in 0..10 {
            let mut dx = 10.0;
            let mut dy = 0.0;
            drcs.apply_to_input(&mut dx, &mut dy);
            let factor = dx / 10.0;
            if i == 0 {
                first_factor = factor;
            }
            last_factor = factor;
        }
        assert!(last_factor <= first_factor);
    }

    #[test]
    fn orthogonal_directions_do_not_trigger_suppression() {
        let mut drcs = Drcs::default();
        let mut last_factor = 1.0;
        for i in 0..10 {
            let mut dx = if i % 2 == 0 { 10.0 } else { 0.0 };
            let mut dy = if i % 2 == 0 { 0.0 } else { 10.0 };
            drcs.apply_to_input(&mut dx, &mut dy);
            let mag = dx.hypot(dy);
            last_factor = mag / 10.0;
        }
        assert!(last_factor > 0.9);
    }

    #[test]
    fn zero_magnitude_input_decays_score_without_panicking() {
        let mut drcs = Drcs::default();
        let mut dx = 0.0;
        let mut dy = 0.0;
        drcs.apply_to_input(&mut dx, &mut dy);
        assert_eq!(dx, 0.0);
        assert_eq!(dy, 0.0);
    }
}
