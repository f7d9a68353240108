//! Emulator Detector: process/topology/module-based multi-signal
//! detector producing a confidence score (§4.10).

use super::types::ProcessInfo;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct EmulatorSignature {
    pub name: String,
    pub executable_names: Vec<String>,
    pub window_classes: Vec<String>,
    pub required_modules: Vec<String>,
    pub base_confidence: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmulatorInfo {
    pub name: String,
    pub pid: u32,
    pub confidence: f64,
    pub context_hash: u64,
}

const WINDOW_CLASS_BONUS: f64 = 0.15;
const MODULE_BONUS_MAX: f64 = 0.10;
const CHILD_BONUS_MANY: f64 = 0.10;
const CHILD_BONUS_SOME: f64 = 0.05;
const CHILD_MANY_THRESHOLD: u32 = 3;
const CHILD_SOME_THRESHOLD: u32 = 1;

pub struct EmulatorDetector {
    signatures: Vec<EmulatorSignature>,
    seen: HashMap<u32, EmulatorInfo>,
}

impl EmulatorDetector {
    pub fn new(signatures: Vec<EmulatorSignature>) -> Self {
        Self {
            signatures,
            seen: HashMap::new(),
        }
    }

    pub fn default_signatures() -> Vec<EmulatorSignature> {
        vec![
            EmulatorSignature {
                name: "BlueStacks".into(),
                executable_names: vec!["hd-player.exe".into(), "bluestacks.exe".into()],
                window_classes: vec!["Qt5QWindowIcon".into()],
                required_modules: vec!["libc++_shared.so".into(), "bst_hyperv.dll".into()],
                base_confidence: 0.6,
            },
            EmulatorSignature {
                name: "LDPlayer".into(),
                executable_names: vec!["dnplayer.exe".into()],
                window_classes: vec!["LDPlayerMainFrame".into()],
                required_modules: vec!["ld_vbox.dll".into()],
                base_confidence: 0.55,
            },
            EmulatorSignature {
                name: "MEmu".into(),
                executable_names: vec!["memuc.exe".into(), "memu.exe".into()],
                window_classes: vec!["MEmuMainFrame".into()],
                required_modules: vec!["memu_vbox.dll".into()],
                base_confidence: 0.5,
            },
        ]
    }

    /// Runs one scan tick over a process snapshot, returning
    /// `(newly_detected, newly_lost)` PIDs since the last call.
    pub fn scan(
        &mut self,
        processes: &[ProcessInfo],
        hash_executable: impl Fn(&str) -> u64,
    ) -> (Vec<EmulatorInfo>, Vec<u32>) {
        let mut current: HashMap<u32, EmulatorInfo> = HashMap::new();

        for process in processes {
            let Some(sig) = self.signatures.iter().find(|s| {
                s.executable_names
                    .iter()
                    .any(|name| name.eq_ignore_ascii_case(&process.executable_name))
            }) else {
                continue;
            };

            let mut confidence = sig.base_confidence;

            if let Some(window_class) = &process.window_class {
                if sig.window_classes.iter().any(|c| c == window_class) {
                    confidence += WINDOW_CLASS_BONUS;
                }
            }

            if !sig.required_modules.is_empty() {
                let present = sig
                    .required_modules
                    .iter()
                    .filter(|m| process.loaded_modules.contains(m))
                    .count();
                let ratio = present as f64 / sig.required_modules.len() as f64;
                confidence += MODULE_BONUS_MAX * ratio;
            }

            if process.child_count >= CHILD_MANY_THRESHOLD {
                confidence += CHILD_BONUS_MANY;
            } else if process.child_count >= CHILD_SOME_THRESHOLD {
                confidence += CHILD_BONUS_SOME;
            }

            confidence = confidence.clamp(0.0, 1.0);

            current.insert(
                process.pid,
                EmulatorInfo {
                    name: sig.name.clone(),
                    pid: process.pid,
                    confidence,
                    context_hash: hash_executable(&process.executable_name),
                },
            );
        }

        let mut newly_detected = Vec::new();
        for (pid, info) in &current {
            if !self.seen.contains_key(pid) {
                newly_detected.push(info.clone());
            }
        }

        let newly_lost: Vec<u32> = self
            .seen
            .keys()
            .filter(|pid| !current.contains_key(pid))
            .copied()
            .collect();

        self.seen = current;
        (newly_detected, newly_lost)
    }

    /// The highest-confidence currently-tracked entry.
    pub fn primary(&self) -> Option<&EmulatorInfo> {
        self.seen
            .values()
            .max_by(|a, b| a.confidence.partial_cmp(&b.confidence).unwrap())
    }

    pub fn tracked_count(&self) -> usize {
        self.seen.len()
    }
}

impl Default for EmulatorDetector {
    fn default() -> Self {
        Self::new(Self::default_signatures())
    }
}
