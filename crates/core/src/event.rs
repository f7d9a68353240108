//! Structured event log replacing the original Qt signal surface.
//!
//! Every control-plane subsystem appends here instead of emitting a
//! Qt-style signal; the bounded ring is what the property-bridge command
//! surface exposes as `eventLog`. The hot path (`sensitivity::pipeline`)
//! does not append per-event entries here, see its own latency counter.

use std::collections::VecDeque;

/// Maps onto the original Logger's five levels, with `Critical` folded
/// into `tracing::Level::ERROR` plus a `critical` marker at emission time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Debug,
    Info,
    Warning,
    Success,
    Critical,
}

impl Level {
    pub fn as_tracing_level(self) -> tracing::Level {
        match self {
            Level::Debug => tracing::Level::DEBUG,
            Level::Info | Level::Success => tracing::Level::INFO,
            Level::Warning => tracing::Level::WARN,
            Level::Critical => tracing::Level::ERROR,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub timestamp_ms: u64,
    pub level: Level,
    pub message: String,
}

/// Bounded ring of the last 100 entries, exposed as `eventLog` on the
/// command surface.
#[derive(Debug)]
pub struct EventLog {
    entries: VecDeque<LogEntry>,
    capacity: usize,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, timestamp_ms: u64, level: Level, message: impl Into<String>) {
        let message = message.into();
        match level {
            Level::Debug => tracing::debug!("{message}"),
            Level::Info => tracing::info!("{message}"),
            Level::Success => tracing::info!(success = true, "{message}"),
            Level::Warning => tracing::warn!("{message}"),
            Level::Critical => tracing::error!(critical = true, "{message}"),
        }
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(LogEntry {
            timestamp_ms,
            level,
            message,
        });
    }

    pub fn recent(&self, n: usize) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter().rev().take(n)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_past_capacity() {
        let mut log = EventLog::new(2);
        log.push(1, Level::Info, "a");
        log.push(2, Level::Info, "b");
        log.push(3, Level::Info, "c");
        assert_eq!(log.len(), 2);
        let msgs: Vec<_> = log.recent(10).map(|e| e.message.clone()).collect();
        assert_eq!(msgs, vec!["c", "b"]);
    }
}
