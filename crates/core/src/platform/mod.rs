//! The single trait boundary for every OS primitive this crate touches:
//! hooks, priority classes, affinity masks, power schemes, timer
//! resolution, process enumeration, and elevated tracing sessions.
//!
//! Per the re-architecture away from the original's QObject singletons,
//! nothing in `sensitivity` or `zereca` talks to the OS directly, every
//! caller holds a `&dyn Platform` (or a concrete implementor) and the
//! rest of the crate is fully testable against [`null::NullPlatform`].

pub mod null;

use crate::error::{AuthorityError, ReconcileError};
use crate::zereca::types::{PowerPlan, ProcessInfo, SystemContext, TimerResolution};

pub trait Platform: Send + Sync {
    /// Monotonic milliseconds since an arbitrary epoch. Never wall-clock.
    fn monotonic_now_ms(&self) -> u64;

    fn get_power_plan(&self) -> PowerPlan;
    fn set_power_plan(&self, plan: PowerPlan) -> Result<(), ReconcileError>;

    fn get_timer_resolution(&self) -> TimerResolution;
    fn set_timer_resolution(&self, res: TimerResolution) -> Result<(), ReconcileError>;

    fn get_cpu_parking(&self) -> bool;
    fn set_cpu_parking(&self, enabled: bool) -> Result<(), ReconcileError>;

    /// `core_group` is one of `"all"`, `"gold_cores"`, or a hex bitmask.
    fn get_process_affinity(&self, process_name: &str) -> Option<String>;
    fn set_process_affinity(&self, process_name: &str, core_group: &str)
        -> Result<(), ReconcileError>;

    fn get_process_priority(&self, process_name: &str) -> Option<String>;
    fn set_process_priority(&self, process_name: &str, value: &str) -> Result<(), ReconcileError>;

    fn get_process_io_priority(&self, process_name: &str) -> Option<String>;
    fn set_process_io_priority(
        &self,
        process_name: &str,
        value: &str,
    ) -> Result<(), ReconcileError>;

    fn list_processes(&self) -> Vec<ProcessInfo>;
    fn find_process(&self, name: &str) -> Option<ProcessInfo>;

    fn capture_system_context(&self) -> SystemContext;

    /// Hash of the first 64 KiB of an executable; used as a detector
    /// context marker. Returns 0 when unavailable.
    fn hash_executable_prefix(&self, executable_name: &str) -> u64;

    /// `true` when running with elevated (Operator) privileges, enabling
    /// the Operator telemetry tier and Operator-gated proposal types.
    fn is_operator(&self) -> bool;

    fn install_hook(&self) -> Result<(), AuthorityError>;
    fn remove_hook(&self);

    /// Injects a residual delta into the OS input stream. Implementations
    /// must set the injection-origin flag so the hook does not observe
    /// its own synthetic event.
    fn inject_delta(&self, dx: i32, dy: i32);
}
