//! `SensitivityPipeline`: the twelve-step hot-path transform chain of
//! §4.1. Parameters are published as an atomically swapped snapshot
//! (grounded on the teacher's `AtomicConfig`/`ConfigSnapshot`), read once
//! at stage 1 of each event so every stage of a single call observes a
//! coherent parameter set. The hot path never blocks and never returns
//! an error: out-of-range inputs degrade to an identity transform rather
//! than panicking.

use super::emulator_translator::EmulatorTranslator;
use super::host_normalizer::HostNormalizer;
use super::input_state::{InputState, Stage};
use super::velocity_curve::VelocityCurve;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

const DRAG_HISTORY_CAPACITY: usize = 8;
const DRAG_COSINE_THRESHOLD: f64 = 0.95;
const DRAG_SUPPRESSION: f64 = 0.85;
const SLOW_ZONE_GAMMA: f64 = 2.0;
const SLOW_ZONE_BASE_OMEGA: f64 = 500.0;

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineParameters {
    pub sensitivity_x: f64,
    pub sensitivity_y: f64,
    pub axis_multiplier_x: f64,
    pub axis_multiplier_y: f64,
    pub gain_factor: f64,
    pub smoothing_ms: f64,
    pub slow_zone_percent: f64,
    pub velocity_curve: VelocityCurve,
    pub host_normalizer: HostNormalizer,
    pub emulator_translator: EmulatorTranslator,
    pub input_authority_enabled: bool,
    pub adb_mode: bool,
    pub safe_zone_clamp_enabled: bool,
}

impl Default for PipelineParameters {
    fn default() -> Self {
        Self {
            sensitivity_x: 1.0,
            sensitivity_y: 1.0,
            axis_multiplier_x: 0.0,
            axis_multiplier_y: 0.0,
            gain_factor: 0.6,
            smoothing_ms: 0.0,
            slow_zone_percent: 20.0,
            velocity_curve: VelocityCurve::default(),
            host_normalizer: HostNormalizer::default(),
            emulator_translator: EmulatorTranslator::default(),
            input_authority_enabled: false,
            adb_mode: false,
            safe_zone_clamp_enabled: true,
        }
    }
}

impl PipelineParameters {
    fn clamp(&mut self) {
        self.sensitivity_x = self.sensitivity_x.clamp(0.01, 10.0);
        self.sensitivity_y = self.sensitivity_y.clamp(0.01, 10.0);
        self.axis_multiplier_x = self.axis_multiplier_x.clamp(-1.0, 1.0);
        self.axis_multiplier_y = self.axis_multiplier_y.clamp(-1.0, 1.0);
        self.gain_factor = self.gain_factor.clamp(0.1, 1.0);
        self.smoothing_ms = self.smoothing_ms.clamp(0.0, 200.0);
        self.slow_zone_percent = self.slow_zone_percent.clamp(1.0, 100.0);
        self.host_normalizer.mouse_dpi = self.host_normalizer.mouse_dpi.clamp(100.0, 16000.0);
    }

    fn gain_axis(&self, multiplier: f64) -> f64 {
        1.0 + self.gain_factor * multiplier
    }
}

/// Subset of user-visible tunables restorable via `snapshot()`/`rollback()`.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSnapshot {
    sensitivity_x: f64,
    sensitivity_y: f64,
    axis_multiplier_x: f64,
    axis_multiplier_y: f64,
    gain_factor: f64,
    smoothing_ms: f64,
    slow_zone_percent: f64,
    mouse_dpi: f64,
}

pub struct SensitivityPipeline {
    params: RwLock<Arc<PipelineParameters>>,
    generation: AtomicU64,
    snapshot_slot: RwLock<Option<PipelineSnapshot>>,
    // hot-path-only state, touched exclusively by `process` on its one thread
    prev_smoothed: (f64, f64),
    last_event_ms: Option<f64>,
    drag_history: VecDeque<(f64, f64)>,
    latency_ms_ewma: f64,
}

impl SensitivityPipeline {
    pub fn new(params: PipelineParameters) -> Self {
        Self {
            params: RwLock::new(Arc::new(params)),
            generation: AtomicU64::new(0),
            snapshot_slot: RwLock::new(None),
            prev_smoothed: (0.0, 0.0),
            last_event_ms: None,
            drag_history: VecDeque::with_capacity(DRAG_HISTORY_CAPACITY),
            latency_ms_ewma: 0.0,
        }
    }

    pub fn params(&self) -> Arc<PipelineParameters> {
        self.params.read().unwrap().clone()
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Publishes a new, clamped parameter set. Safe to call from any
    /// thread; the hot path picks it up at the next event boundary.
    pub fn set_params(&self, mut params: PipelineParameters) {
        params.clamp();
        let gen = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let _ = gen;
        *self.params.write().unwrap() = Arc::new(params);
    }

    pub fn update_params(&self, f: impl FnOnce(&mut PipelineParameters)) {
        let mut next = (**self.params.read().unwrap()).clone();
        f(&mut next);
        self.set_params(next);
    }

    pub fn has_snapshot(&self) -> bool {
        self.snapshot_slot.read().unwrap().is_some()
    }

    pub fn snapshot(&self) {
        let p = self.params();
        let snap = PipelineSnapshot {
            sensitivity_x: p.sensitivity_x,
            sensitivity_y: p.sensitivity_y,
            axis_multiplier_x: p.axis_multiplier_x,
            axis_multiplier_y: p.axis_multiplier_y,
            gain_factor: p.gain_factor,
            smoothing_ms: p.smoothing_ms,
            slow_zone_percent: p.slow_zone_percent,
            mouse_dpi: p.host_normalizer.mouse_dpi,
        };
        *self.snapshot_slot.write().unwrap() = Some(snap);
    }

    pub fn rollback(&self) -> bool {
        let Some(snap) = self.snapshot_slot.read().unwrap().clone() else {
            return false;
        };
        self.update_params(|p| {
            p.sensitivity_x = snap.sensitivity_x;
            p.sensitivity_y = snap.sensitivity_y;
            p.axis_multiplier_x = snap.axis_multiplier_x;
            p.axis_multiplier_y = snap.axis_multiplier_y;
            p.gain_factor = snap.gain_factor;
            p.smoothing_ms = snap.smoothing_ms;
            p.slow_zone_percent = snap.slow_zone_percent;
            p.host_normalizer.mouse_dpi = snap.mouse_dpi;
        });
        true
    }

    pub fn latency_ms(&self) -> f64 {
        self.latency_ms_ewma
    }

    /// The twelve-step per-event transform chain of §4.1. `now_ms` is a
    /// caller-supplied monotonic timestamp (milliseconds).
    pub fn process(&mut self, raw: InputState, now_ms: f64) -> InputState {
        let stage_start = now_ms;
        let params = self.params(); // single coherent snapshot for this event

        // step 1: authority gate
        if !params.input_authority_enabled {
            let mut out = raw;
            out.recompute_velocity();
            out.stage = Stage::Final;
            return out;
        }

        let raw_velocity = raw.velocity;

        // step 2: DPI normalization
        let (mut dx, mut dy) = params.host_normalizer.normalize_dpi(raw.delta_x, raw.delta_y);

        // step 3: host pointer scale (+ optional accel compensation)
        let (hx, hy) = params.host_normalizer.host_scale(dx, dy, raw_velocity);
        dx = hx;
        dy = hy;

        // step 4: resolution normalization
        let e_r = params.emulator_translator.resolution(params.adb_mode);
        dx *= e_r;
        dy *= e_r;

        // step 5: center-zero axis gain
        let gain_x = params.gain_axis(params.axis_multiplier_x);
        let gain_y = params.gain_axis(params.axis_multiplier_y);
        dx *= gain_x;
        dy *= gain_y;

        // step 6: velocity curve
        let v = dx.hypot(dy);
        let curve = params.velocity_curve.evaluate(v);
        dx *= curve;
        dy *= curve;

        // step 7: angular-velocity slow zone
        let dt_s = match self.last_event_ms {
            Some(prev) => ((now_ms - prev) / 1000.0).max(0.001),
            None => 0.001,
        };
        self.last_event_ms = Some(now_ms);
        let omega = dx.hypot(dy) / dt_s;
        let omega_threshold = SLOW_ZONE_BASE_OMEGA * params.slow_zone_percent / 100.0;
        if omega_threshold > 0.0 && omega < omega_threshold && omega.is_finite() {
            let ratio = (omega / omega_threshold).clamp(0.0, 1.0);
            let damp = ratio.powf(SLOW_ZONE_GAMMA);
            dx *= damp;
            dy *= damp;
        }

        // step 8: time-based exponential smoothing
        let tau_ms = params.smoothing_ms.powf(1.35).max(1.0);
        let lambda = if params.smoothing_ms <= 0.0 {
            0.0
        } else {
            let elapsed = dt_s * 1000.0;
            (-elapsed / tau_ms).exp()
        };
        let smoothed_x = lambda * self.prev_smoothed.0 + (1.0 - lambda) * dx;
        let smoothed_y = lambda * self.prev_smoothed.1 + (1.0 - lambda) * dy;
        self.prev_smoothed = (smoothed_x, smoothed_y);
        dx = smoothed_x;
        dy = smoothed_y;

        // step 9: repetition-drag limiter
        if let Some(&(px, py)) = self.drag_history.back() {
            let mag_prev = px.hypot(py);
            let mag_cur = dx.hypot(dy);
            if mag_prev > 0.001 && mag_cur > 0.001 {
                let cosine = (px * dx + py * dy) / (mag_prev * mag_cur);
                if cosine >= DRAG_COSINE_THRESHOLD {
                    dx *= DRAG_SUPPRESSION;
                    dy *= DRAG_SUPPRESSION;
                }
            }
        }
        if self.drag_history.len() >= DRAG_HISTORY_CAPACITY {
            self.drag_history.pop_front();
        }
        self.drag_history.push_back((dx, dy));

        // step 10: final multipliers + safe-zone clamp
        dx *= params.sensitivity_x;
        dy *= params.sensitivity_y;
        if params.safe_zone_clamp_enabled {
            dx = dx.clamp(-100.0, 100.0);
            dy = dy.clamp(-100.0, 100.0);
        }

        // step 11: latency accounting
        let elapsed = (now_ms - stage_start).max(0.0);
        self.latency_ms_ewma = 0.9 * self.latency_ms_ewma + 0.1 * elapsed;

        // step 12: emit final state
        let mut out = InputState::new(dx, dy, now_ms);
        out.stage = Stage::Final;
        out
    }
}
