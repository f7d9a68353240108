//! Target State Manager: owns the declarative desired OS state and
//! persists it atomically (§4.3, §3 Target State Document, §6).

use super::types::TargetStateDoc;
use crate::error::PersistError;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

pub struct TargetStateManager {
    path: PathBuf,
    current: RwLock<TargetStateDoc>,
    dirty: AtomicBool,
}

impl TargetStateManager {
    /// Loads from `path`; on missing file or malformed content, writes
    /// and returns a fresh safe-default document (§6).
    pub fn load_or_default(path: impl Into<PathBuf>, now: u64) -> Self {
        let path = path.into();
        let doc = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<TargetStateDoc>(&content) {
                Ok(doc) => doc,
                Err(err) => {
                    tracing::warn!(
                        %err,
                        path = %path.display(),
                        "malformed target state document, falling back to safe defaults"
                    );
                    Self::safe_defaults(now)
                }
            },
            Err(_) => Self::safe_defaults(now),
        };
        let manager = Self {
            path,
            current: RwLock::new(doc),
            dirty: AtomicBool::new(false),
        };
        let _ = manager.persist();
        manager
    }

    pub fn safe_defaults(now: u64) -> TargetStateDoc {
        TargetStateDoc {
            power_mode: super::types::PowerPlan::Balanced,
            timer_resolution: super::types::TimerResolution::Default,
            cpu_parking: false,
            standby_purge: false,
            process_affinity: Default::default(),
            timestamp: now,
        }
    }

    pub fn current(&self) -> TargetStateDoc {
        self.current.read().unwrap().clone()
    }

    /// Mutates the target state, persists atomically, and marks the
    /// manager dirty so the Reconciler can trigger an immediate tick.
    pub fn update(
        &self,
        now: u64,
        f: impl FnOnce(&mut TargetStateDoc),
    ) -> Result<(), PersistError> {
        {
            let mut guard = self.current.write().unwrap();
            f(&mut guard);
            guard.timestamp = now;
        }
        self.dirty.store(true, Ordering::SeqCst);
        self.persist()
    }

    /// Resets to safe defaults; used by Emergency Rollback.
    pub fn reset_to_safe_defaults(&self, now: u64) -> Result<(), PersistError> {
        {
            let mut guard = self.current.write().unwrap();
            *guard = Self::safe_defaults(now);
        }
        self.dirty.store(true, Ordering::SeqCst);
        self.persist()
    }

    /// Returns `true` once and clears the flag; the Reconciler uses this
    /// to schedule an immediate re-tick on top of its periodic timer.
    pub fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::SeqCst)
    }

    fn persist(&self) -> Result<(), PersistError> {
        let doc = self.current.read().unwrap().clone();
        let json = serde_json::to_string_pretty(&doc).expect("TargetStateDoc always serializes");
        atomic_write(&self.path, &json)
    }
}

/// Writes `content` to `path` via temp-file + rename, matching the
/// atomic-persistence convention used across the control plane.
pub fn atomic_write(path: &Path, content: &str) -> Result<(), PersistError> {
    let tmp_path = path.with_extension("tmp");
    std::fs::write(&tmp_path, content).map_err(|source| PersistError::Io {
        path: tmp_path.display().to_string(),
        source,
    })?;
    std::fs::rename(&tmp_path, path).map_err(|source| PersistError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_safe_defaults_and_writes_them() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("target_state.json");
        let manager = TargetStateManager::load_or_default(&path, 1000);
        assert!(path.exists());
        assert_eq!(manager.current().power_mode, super::super::types::PowerPlan::Balanced);
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("target_state.json");
        std::fs::write(&path, "{ not json at all").unwrap();
        let manager = TargetStateManager::load_or_default(&path, 1000);
        assert_eq!(manager.current().power_mode, super::super::types::PowerPlan::Balanced);
    }

    #[test]
    fn update_persists_and_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("target_state.json");
        let manager = TargetStateManager::load_or_default(&path, 1000);
        manager
            .update(2000, |s| s.power_mode = super::super::types::PowerPlan::Performance)
            .unwrap();

        let reloaded = TargetStateManager::load_or_default(&path, 3000);
        assert_eq!(
            reloaded.current().power_mode,
            super::super::types::PowerPlan::Performance
        );
    }

    #[test]
    fn update_marks_dirty_for_immediate_reconciliation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("target_state.json");
        let manager = TargetStateManager::load_or_default(&path, 1000);
        assert!(!manager.take_dirty());
        manager.update(2000, |_| {}).unwrap();
        assert!(manager.take_dirty());
        assert!(!manager.take_dirty());
    }

    #[test]
    fn reset_to_safe_defaults_clears_affinity_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("target_state.json");
        let manager = TargetStateManager::load_or_default(&path, 1000);
        manager
            .update(2000, |s| {
                s.process_affinity.insert("game.exe".into(), "gold_cores".into());
            })
            .unwrap();
        manager.reset_to_safe_defaults(3000).unwrap();
        assert!(manager.current().process_affinity.is_empty());
    }
}
