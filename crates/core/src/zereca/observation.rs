//! Observation Phase: collects baseline metrics with a stability-based
//! early exit (§4.11).

use super::types::{AggregatedTelemetry, BaselineMetrics};

pub const DEFAULT_MIN_DURATION_MS: u64 = 2 * 60 * 1000;
pub const DEFAULT_MAX_DURATION_MS: u64 = 5 * 60 * 1000;
pub const DEFAULT_STABILITY_THRESHOLD: f64 = 0.05;
const STABILITY_WINDOW: usize = 30;

#[derive(Debug, Clone)]
struct Sample {
    timestamp_ms: u64,
    fps: f64,
    frame_time: f64,
    cpu: f64,
    gpu: f64,
    mem_pressure: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ObservationResult {
    Complete(BaselineMetrics),
    Failed,
    InProgress,
}

pub struct ObservationPhase {
    target_pid: u32,
    started_at_ms: Option<u64>,
    samples: Vec<Sample>,
    min_duration_ms: u64,
    max_duration_ms: u64,
    stability_threshold: f64,
}

impl ObservationPhase {
    pub fn new(target_pid: u32) -> Self {
        Self {
            target_pid,
            started_at_ms: None,
            samples: Vec::new(),
            min_duration_ms: DEFAULT_MIN_DURATION_MS,
            max_duration_ms: DEFAULT_MAX_DURATION_MS,
            stability_threshold: DEFAULT_STABILITY_THRESHOLD,
        }
    }

    pub fn with_bounds(mut self, min_duration_ms: u64, max_duration_ms: u64) -> Self {
        self.min_duration_ms = min_duration_ms;
        self.max_duration_ms = max_duration_ms;
        self
    }

    pub fn target_pid(&self) -> u32 {
        self.target_pid
    }

    /// Records a 2 Hz sample. `target_still_running` models the
    /// platform's process-liveness check; losing it aborts the phase.
    pub fn sample(
        &mut self,
        telemetry: &AggregatedTelemetry,
        now_ms: u64,
        target_still_running: bool,
    ) -> ObservationResult {
        if !target_still_running {
            return ObservationResult::Failed;
        }

        let started_at = *self.started_at_ms.get_or_insert(now_ms);
        self.samples.push(Sample {
            timestamp_ms: now_ms,
            fps: telemetry.fps,
            frame_time: telemetry.avg_frame_time,
            cpu: telemetry.cpu_residency,
            gpu: telemetry.gpu_queue_depth,
            mem_pressure: telemetry.memory_pressure,
        });

        let elapsed = now_ms.saturating_sub(started_at);
        if elapsed >= self.max_duration_ms {
            return ObservationResult::Complete(self.finalize(elapsed));
        }
        if elapsed >= self.min_duration_ms && self.is_stable() {
            return ObservationResult::Complete(self.finalize(elapsed));
        }
        ObservationResult::InProgress
    }

    fn is_stable(&self) -> bool {
        if self.samples.len() < STABILITY_WINDOW {
            return false;
        }
        let window = &self.samples[self.samples.len() - STABILITY_WINDOW..];
        let fps: Vec<f64> = window.iter().map(|s| s.fps).collect();
        let mean = fps.iter().sum::<f64>() / fps.len() as f64;
        if mean.abs() < 1e-9 {
            return true;
        }
        let variance = fps.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / fps.len() as f64;
        let cv = variance.sqrt() / mean.abs();
        cv < self.stability_threshold
    }

    fn finalize(&self, elapsed_ms: u64) -> BaselineMetrics {
        let n = self.samples.len() as f64;
        let mean = |f: fn(&Sample) -> f64| self.samples.iter().map(f).sum::<f64>() / n;

        let fps = mean(|s| s.fps);
        let fps_variance =
            self.samples.iter().map(|s| (s.fps - fps).powi(2)).sum::<f64>() / n;

        BaselineMetrics {
            fps,
            avg_frame_time: mean(|s| s.frame_time),
            fps_variance,
            cpu_residency: mean(|s| s.cpu),
            gpu_queue_depth: mean(|s| s.gpu),
            memory_pressure: mean(|s| s.mem_pressure),
            duration_ms: elapsed_ms,
        }
    }
}
