//! Probation Ledger: persistent per-context blocklist for failed
//! configurations, with severity-scoped resurrection rules and
//! exponential backoff (§4.8, §3 Probation Entry).

use super::target_state::atomic_write;
use super::types::{ProbationSeverity, SystemContext};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

pub const LOW_INITIAL_BACKOFF_MS: u64 = 5 * 60 * 1000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbationEntry {
    pub config_hash: u64,
    pub last_failure_ts: u64,
    pub severity: ProbationSeverity,
    pub driver_version: String,
    pub os_build: String,
    pub bios_version: String,
    pub emulator_binary_hash: String,
    pub backoff_multiplier: f64,
}

impl ProbationEntry {
    fn context(&self) -> SystemContext {
        SystemContext {
            gpu_driver_version: self.driver_version.clone(),
            os_build: self.os_build.clone(),
            bios_version: self.bios_version.clone(),
            emulator_binary_hash: self.emulator_binary_hash.clone(),
        }
    }

    /// Resurrection rules (§3, confirmed against the original
    /// `ProbationLedger`): CRITICAL never resurrects; MEDIUM resurrects
    /// on any context shift; LOW resurrects after exponential backoff.
    fn is_on_probation(&self, now: u64, ctx: &SystemContext) -> bool {
        match self.severity {
            ProbationSeverity::Critical => true,
            ProbationSeverity::Medium => !self.context().differs_from(ctx),
            ProbationSeverity::Low => {
                let window_ms = (LOW_INITIAL_BACKOFF_MS as f64 * self.backoff_multiplier) as u64;
                now.saturating_sub(self.last_failure_ts) < window_ms
            }
        }
    }
}

pub struct ProbationLedger {
    path: Option<PathBuf>,
    entries: RwLock<HashMap<u64, ProbationEntry>>,
}

impl ProbationLedger {
    pub fn new() -> Self {
        Self {
            path: None,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Loads persisted entries from `path`; a tolerant loader, falling
    /// back to an empty ledger on any read or parse failure.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = std::fs::read_to_string(&path)
            .ok()
            .and_then(|content| serde_json::from_str::<Vec<ProbationEntry>>(&content).ok())
            .map(|list| list.into_iter().map(|e| (e.config_hash, e)).collect())
            .unwrap_or_default();
        Self {
            path: Some(path),
            entries: RwLock::new(entries),
        }
    }

    fn persist(&self) {
        let Some(path) = &self.path else { return };
        let list: Vec<ProbationEntry> = self.entries.read().unwrap().values().cloned().collect();
        if let Ok(json) = serde_json::to_string_pretty(&list) {
            if let Err(err) = atomic_write(path, &json) {
                tracing::warn!(%err, path = %path.display(), "failed to persist probation ledger");
            }
        }
    }

    pub fn is_on_probation(&self, config_hash: u64, now: u64, ctx: &SystemContext) -> bool {
        self.entries
            .read()
            .unwrap()
            .get(&config_hash)
            .map(|e| e.is_on_probation(now, ctx))
            .unwrap_or(false)
    }

    /// Adds a new failure, or doubles the existing entry's backoff
    /// multiplier on re-failure of the same config hash.
    pub fn record_failure(
        &self,
        config_hash: u64,
        now: u64,
        severity: ProbationSeverity,
        ctx: &SystemContext,
    ) {
        let mut entries = self.entries.write().unwrap();
        entries
            .entry(config_hash)
            .and_modify(|e| {
                e.last_failure_ts = now;
                e.backoff_multiplier *= 2.0;
                if severity > e.severity {
                    e.severity = severity;
                }
                e.driver_version = ctx.gpu_driver_version.clone();
                e.os_build = ctx.os_build.clone();
                e.bios_version = ctx.bios_version.clone();
                e.emulator_binary_hash = ctx.emulator_binary_hash.clone();
            })
            .or_insert(ProbationEntry {
                config_hash,
                last_failure_ts: now,
                severity,
                driver_version: ctx.gpu_driver_version.clone(),
                os_build: ctx.os_build.clone(),
                bios_version: ctx.bios_version.clone(),
                emulator_binary_hash: ctx.emulator_binary_hash.clone(),
                backoff_multiplier: 1.0,
            });
        drop(entries);
        self.persist();
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reserved for Operator use after an acknowledged rollback.
    pub fn clear_all(&self) {
        self.entries.write().unwrap().clear();
        self.persist();
    }
}

impl Default for ProbationLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(drv: &str, os: &str) -> SystemContext {
        SystemContext {
            gpu_driver_version: drv.into(),
            os_build: os.into(),
            bios_version: "bios1".into(),
            emulator_binary_hash: "hash1".into(),
        }
    }

    #[test]
    fn critical_never_resurrects() {
        let ledger = ProbationLedger::new();
        ledger.record_failure(1, 0, ProbationSeverity::Critical, &ctx("1", "1"));
        assert!(ledger.is_on_probation(1, u64::MAX, &ctx("99", "99")));
    }

    #[test]
    fn medium_resurrects_on_context_shift() {
        let ledger = ProbationLedger::new();
        ledger.record_failure(2, 0, ProbationSeverity::Medium, &ctx("1", "1"));
        assert!(ledger.is_on_probation(2, 1000, &ctx("1", "1")));
        assert!(!ledger.is_on_probation(2, 1000, &ctx("2", "1")));
    }

    #[test]
    fn low_resurrects_after_backoff_and_doubles_on_refailure() {
        let ledger = ProbationLedger::new();
        let t0 = 0u64;
        ledger.record_failure(3, t0, ProbationSeverity::Low, &ctx("1", "1"));

        let four_min = 4 * 60 * 1000;
        let six_min = 6 * 60 * 1000;
        assert!(ledger.is_on_probation(3, t0 + four_min, &ctx("1", "1")));
        assert!(!ledger.is_on_probation(3, t0 + six_min, &ctx("1", "1")));

        // re-failure at t0 + 6min doubles backoff to 2.0 (10 minute window)
        ledger.record_failure(3, t0 + six_min, ProbationSeverity::Low, &ctx("1", "1"));
        let nine_min_later = t0 + six_min + 9 * 60 * 1000;
        assert!(ledger.is_on_probation(3, nine_min_later, &ctx("1", "1")));
    }

    #[test]
    fn persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("probation.json");
        let ledger = ProbationLedger::load(&path);
        ledger.record_failure(7, 0, ProbationSeverity::Critical, &ctx("1", "1"));

        let reloaded = ProbationLedger::load(&path);
        assert!(reloaded.is_on_probation(7, 0, &ctx("1", "1")));
    }

    #[test]
    fn clear_all_empties_the_ledger() {
        let ledger = ProbationLedger::new();
        ledger.record_failure(1, 0, ProbationSeverity::Low, &ctx("1", "1"));
        ledger.clear_all();
        assert!(ledger.is_empty());
    }
}
