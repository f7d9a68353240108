//! Deterministic platform test double, in the spirit of the teacher's
//! `UniformProbe`/`VarianceClassifier` MVP defaults: a simple stand-in a
//! real Windows backend would replace, kept dependency-free so the rest
//! of this crate is unit-testable without Windows.

use super::Platform;
use crate::error::{AuthorityError, ReconcileError};
use crate::zereca::types::{PowerPlan, ProcessInfo, SystemContext, TimerResolution};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::RwLock;

pub struct NullPlatform {
    clock_ms: AtomicU64,
    power_plan: RwLock<PowerPlan>,
    timer_resolution: RwLock<TimerResolution>,
    cpu_parking: AtomicBool,
    affinity: RwLock<HashMap<String, String>>,
    priority: RwLock<HashMap<String, String>>,
    io_priority: RwLock<HashMap<String, String>>,
    processes: RwLock<Vec<ProcessInfo>>,
    context: RwLock<SystemContext>,
    operator: AtomicBool,
    hook_active: AtomicBool,
    pub injected: RwLock<Vec<(i32, i32)>>,
}

impl Default for NullPlatform {
    fn default() -> Self {
        Self {
            clock_ms: AtomicU64::new(0),
            power_plan: RwLock::new(PowerPlan::Balanced),
            timer_resolution: RwLock::new(TimerResolution::Default),
            cpu_parking: AtomicBool::new(false),
            affinity: RwLock::new(HashMap::new()),
            priority: RwLock::new(HashMap::new()),
            io_priority: RwLock::new(HashMap::new()),
            processes: RwLock::new(Vec::new()),
            context: RwLock::new(SystemContext::default()),
            operator: AtomicBool::new(false),
            hook_active: AtomicBool::new(false),
            injected: RwLock::new(Vec::new()),
        }
    }
}

impl NullPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advances the deterministic clock; tests drive time explicitly
    /// rather than relying on wall-clock jitter.
    pub fn advance_clock(&self, ms: u64) {
        self.clock_ms.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn set_operator(&self, operator: bool) {
        self.operator.store(operator, Ordering::SeqCst);
    }

    pub fn set_context(&self, context: SystemContext) {
        *self.context.write().unwrap() = context;
    }

    pub fn seed_process(&self, info: ProcessInfo) {
        self.processes.write().unwrap().push(info);
    }

    pub fn remove_process(&self, pid: u32) {
        self.processes.write().unwrap().retain(|p| p.pid != pid);
    }

    pub fn hook_is_active(&self) -> bool {
        self.hook_active.load(Ordering::SeqCst)
    }
}

impl Platform for NullPlatform {
    fn monotonic_now_ms(&self) -> u64 {
        self.clock_ms.load(Ordering::SeqCst)
    }

    fn get_power_plan(&self) -> PowerPlan {
        *self.power_plan.read().unwrap()
    }

    fn set_power_plan(&self, plan: PowerPlan) -> Result<(), ReconcileError> {
        *self.power_plan.write().unwrap() = plan;
        Ok(())
    }

    fn get_timer_resolution(&self) -> TimerResolution {
        *self.timer_resolution.read().unwrap()
    }

    fn set_timer_resolution(&self, res: TimerResolution) -> Result<(), ReconcileError> {
        *self.timer_resolution.write().unwrap() = res;
        Ok(())
    }

    fn get_cpu_parking(&self) -> bool {
        self.cpu_parking.load(Ordering::SeqCst)
    }

    fn set_cpu_parking(&self, enabled: bool) -> Result<(), ReconcileError> {
        self.cpu_parking.store(enabled, Ordering::SeqCst);
        Ok(())
    }

    fn get_process_affinity(&self, process_name: &str) -> Option<String> {
        self.affinity.read().unwrap().get(process_name).cloned()
    }

    fn set_process_affinity(
        &self,
        process_name: &str,
        core_group: &str,
    ) -> Result<(), ReconcileError> {
        if self.find_process(process_name).is_none() {
            return Err(ReconcileError::ProcessNotFound(process_name.to_string()));
        }
        self.affinity
            .write()
            .unwrap()
            .insert(process_name.to_string(), core_group.to_string());
        Ok(())
    }

    fn get_process_priority(&self, process_name: &str) -> Option<String> {
        self.priority.read().unwrap().get(process_name).cloned()
    }

    fn set_process_priority(&self, process_name: &str, value: &str) -> Result<(), ReconcileError> {
        if self.find_process(process_name).is_none() {
            return Err(ReconcileError::ProcessNotFound(process_name.to_string()));
        }
        self.priority
            .write()
            .unwrap()
            .insert(process_name.to_string(), value.to_string());
        Ok(())
    }

    fn get_process_io_priority(&self, process_name: &str) -> Option<String> {
        self.io_priority.read().unwrap().get(process_name).cloned()
    }

    fn set_process_io_priority(
        &self,
        process_name: &str,
        value: &str,
    ) -> Result<(), ReconcileError> {
        if self.find_process(process_name).is_none() {
            return Err(ReconcileError::ProcessNotFound(process_name.to_string()));
        }
        self.io_priority
            .write()
            .unwrap()
            .insert(process_name.to_string(), value.to_string());
        Ok(())
    }

    fn list_processes(&self) -> Vec<ProcessInfo> {
        self.processes.read().unwrap().clone()
    }

    fn find_process(&self, name: &str) -> Option<ProcessInfo> {
        self.processes
            .read()
            .unwrap()
            .iter()
            .find(|p| p.executable_name == name)
            .cloned()
    }

    fn capture_system_context(&self) -> SystemContext {
        self.context.read().unwrap().clone()
    }

    fn hash_executable_prefix(&self, _executable_name: &str) -> u64 {
        0
    }

    fn is_operator(&self) -> bool {
        self.operator.load(Ordering::SeqCst)
    }

    fn install_hook(&self) -> Result<(), AuthorityError> {
        if self.hook_active.swap(true, Ordering::SeqCst) {
            return Err(AuthorityError::AlreadyActive);
        }
        Ok(())
    }

    fn remove_hook(&self) {
        self.hook_active.store(false, Ordering::SeqCst);
    }

    fn inject_delta(&self, dx: i32, dy: i32) {
        self.injected.write().unwrap().push((dx, dy));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_process_affinity_requires_known_process() {
        let p = NullPlatform::new();
        assert!(p.set_process_affinity("game.exe", "all").is_err());
        p.seed_process(ProcessInfo {
            pid: 1,
            executable_name: "game.exe".into(),
            window_class: None,
            loaded_modules: vec![],
            child_count: 0,
        });
        assert!(p.set_process_affinity("game.exe", "all").is_ok());
        assert_eq!(p.get_process_affinity("game.exe").as_deref(), Some("all"));
    }

    #[test]
    fn hook_install_is_not_reentrant() {
        let p = NullPlatform::new();
        assert!(p.install_hook().is_ok());
        assert!(p.install_hook().is_err());
        p.remove_hook();
        assert!(p.install_hook().is_ok());
    }
}
