//! Telemetry Reader: privilege-tiered aggregation of OS counters into a
//! swappable-under-lock metrics struct (§4.6). Grounded on the teacher's
//! `TelemetryDigest`/`TelemetryRingBuffer` (`adaptive_engine/telemetry.rs`);
//! the ring is dropped in favor of a single latest-snapshot slot since
//! §4.6 only ever asks for `latestMetrics()`, not history.

use super::types::AggregatedTelemetry;
use crate::event::{EventLog, Level};
use std::sync::RwLock;

pub const SAMPLE_HZ: f64 = 2.0;
pub const SAMPLE_INTERVAL_MS: u64 = (1000.0 / SAMPLE_HZ) as u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrivilegeTier {
    Standard,
    Operator,
}

pub struct TelemetryReader {
    tier: RwLock<PrivilegeTier>,
    latest: RwLock<AggregatedTelemetry>,
}

impl TelemetryReader {
    pub fn new(tier: PrivilegeTier) -> Self {
        Self {
            tier: RwLock::new(tier),
            latest: RwLock::new(AggregatedTelemetry::default()),
        }
    }

    pub fn tier(&self) -> PrivilegeTier {
        *self.tier.read().unwrap()
    }

    /// Swaps in a freshly-collected sample. Operator-only fields
    /// (`cpu_residency`, `context_switch_rate`, `gpu_queue_depth`) are
    /// zeroed when running at Standard tier, matching §4.6's privilege
    /// split: Standard callers never observe kernel-tracing-derived
    /// counters even if a caller accidentally supplies them.
    pub fn collect(&self, mut sample: AggregatedTelemetry) {
        if self.tier() == PrivilegeTier::Standard {
            sample.cpu_residency = 0.0;
            sample.context_switch_rate = 0.0;
            sample.gpu_queue_depth = 0.0;
        }
        *self.latest.write().unwrap() = sample;
    }

    pub fn latest_metrics(&self) -> AggregatedTelemetry {
        self.latest.read().unwrap().clone()
    }

    /// `is_operator` reflects the platform's current live privilege
    /// check; a prior-Operator reader that observes `false` downgrades
    /// itself and emits `privilegesLost`.
    pub fn observe_privilege(&self, is_operator: bool, log: &mut EventLog, now_ms: u64) {
        let mut tier = self.tier.write().unwrap();
        if *tier == PrivilegeTier::Operator && !is_operator {
            *tier = PrivilegeTier::Standard;
            drop(tier);
            log.push(now_ms, Level::Warning, "privileges lost, downgraded to standard tier".to_string());
        } else if *tier == PrivilegeTier::Standard && is_operator {
            *tier = PrivilegeTier::Operator;
        }
    }
}

impl Default for TelemetryReader {
    fn default() -> Self {
        Self::new(PrivilegeTier::Standard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AggregatedTelemetry {
        AggregatedTelemetry {
            fps: 60.0,
            cpu_residency: 0.5,
            context_switch_rate: 100.0,
            gpu_queue_depth: 3.0,
            ..Default::default()
        }
    }

    #[test]
    fn standard_tier_zeroes_operator_only_fields() {
        let reader = TelemetryReader::new(PrivilegeTier::Standard);
        reader.collect(sample());
        let metrics = reader.latest_metrics();
        assert_eq!(metrics.fps, 60.0);
        assert_eq!(metrics.cpu_residency, 0.0);
        assert_eq!(metrics.context_switch_rate, 0.0);
        assert_eq!(metrics.gpu_queue_depth, 0.0);
    }

    #[test]
    fn operator_tier_passes_through_all_fields() {
        let reader = TelemetryReader::new(PrivilegeTier::Operator);
        reader.collect(sample());
        let metrics = reader.latest_metrics();
        assert_eq!(metrics.cpu_residency, 0.5);
        assert_eq!(metrics.gpu_queue_depth, 3.0);
    }

    #[test]
    fn losing_privileges_downgrades_and_emits_event() {
        let reader = TelemetryReader::new(PrivilegeTier::Operator);
        let mut log = EventLog::default();
        reader.observe_privilege(false, &mut log, 1_000);
        assert_eq!(reader.tier(), PrivilegeTier::Standard);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn regaining_privileges_upgrades_tier_silently() {
        let reader = TelemetryReader::new(PrivilegeTier::Standard);
        let mut log = EventLog::default();
        reader.observe_privilege(true, &mut log, 1_000);
        assert_eq!(reader.tier(), PrivilegeTier::Operator);
        assert!(log.is_empty());
    }

    #[test]
    fn latest_metrics_returns_a_copy_not_a_lock_guard() {
        let reader = TelemetryReader::new(PrivilegeTier::Operator);
        reader.collect(sample());
        let a = reader.latest_metrics();
        reader.collect(AggregatedTelemetry::default());
        let b = reader.latest_metrics();
        assert_ne!(a.fps, b.fps);
    }
}
