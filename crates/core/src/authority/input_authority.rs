//! `InputAuthority`: intercepts physical mouse deltas, drives the
//! Sensitivity Pipeline, and injects the residual delta back into the
//! OS input stream (§4.2).

use crate::error::AuthorityError;
use crate::event::{EventLog, Level};
use crate::platform::Platform;
use crate::sensitivity::{InputState, SensitivityPipeline};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

/// Process-scoped owner of the platform hook and the pipeline it drives.
/// Exactly one of these is expected to be active per process, but unlike
/// the original it is an explicitly constructed value, not a singleton:
/// callers hold the handle they created.
pub struct InputAuthority<P: Platform> {
    platform: Arc<P>,
    pipeline: Mutex<SensitivityPipeline>,
    active: AtomicBool,
    first_move_pending: AtomicBool,
    last_cursor_x: AtomicI64,
    last_cursor_y: AtomicI64,
    last_velocity_bits: std::sync::atomic::AtomicU64,
    last_angle_bits: std::sync::atomic::AtomicU64,
    last_angular_delta_x_bits: std::sync::atomic::AtomicU64,
    last_angular_delta_y_bits: std::sync::atomic::AtomicU64,
}

impl<P: Platform> InputAuthority<P> {
    pub fn new(platform: Arc<P>, pipeline: SensitivityPipeline) -> Self {
        Self {
            platform,
            pipeline: Mutex::new(pipeline),
            active: AtomicBool::new(false),
            first_move_pending: AtomicBool::new(true),
            last_cursor_x: AtomicI64::new(0),
            last_cursor_y: AtomicI64::new(0),
            last_velocity_bits: std::sync::atomic::AtomicU64::new(0),
            last_angle_bits: std::sync::atomic::AtomicU64::new(0),
            last_angular_delta_x_bits: std::sync::atomic::AtomicU64::new(0),
            last_angular_delta_y_bits: std::sync::atomic::AtomicU64::new(0),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Installs the platform hook, resets the first-move flag, and marks
    /// this authority active. Idempotent: returns `Ok` if already active.
    pub fn start_hook(&self, log: &mut EventLog, now_ms: u64) -> Result<(), AuthorityError> {
        if self.active.load(Ordering::SeqCst) {
            return Ok(());
        }
        match self.platform.install_hook() {
            Ok(()) => {
                self.first_move_pending.store(true, Ordering::SeqCst);
                self.active.store(true, Ordering::SeqCst);
                log.push(now_ms, Level::Info, "input authority hook installed");
                Ok(())
            }
            Err(AuthorityError::AlreadyActive) => {
                self.active.store(true, Ordering::SeqCst);
                Ok(())
            }
            Err(err) => {
                log.push(
                    now_ms,
                    Level::Critical,
                    format!("failed to install input hook: {err}"),
                );
                Err(err)
            }
        }
    }

    /// Removes the platform hook and marks this authority inactive.
    /// Idempotent.
    pub fn stop_hook(&self, log: &mut EventLog, now_ms: u64) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        self.platform.remove_hook();
        log.push(now_ms, Level::Info, "input authority hook removed");
    }

    /// Hot-path entry point for a low-level mouse-movement event, given
    /// as an absolute cursor position. `is_injection` is the platform's
    /// own-synthetic-event flag; when set, the event is passed through
    /// unchanged to guard against reinjection feedback.
    ///
    /// Returns the residual `(round(processed) - physical)` delta to
    /// inject, or `None` when nothing should be injected this call.
    pub fn on_cursor_position(
        &self,
        cursor_x: i32,
        cursor_y: i32,
        is_injection: bool,
        now_ms: f64,
    ) -> Option<(i32, i32)> {
        if is_injection {
            return None;
        }
        if !self.active.load(Ordering::SeqCst) {
            return None;
        }

        if self.first_move_pending.swap(false, Ordering::SeqCst) {
            self.last_cursor_x.store(cursor_x as i64, Ordering::SeqCst);
            self.last_cursor_y.store(cursor_y as i64, Ordering::SeqCst);
            return None;
        }

        let prev_x = self.last_cursor_x.swap(cursor_x as i64, Ordering::SeqCst);
        let prev_y = self.last_cursor_y.swap(cursor_y as i64, Ordering::SeqCst);
        let physical_dx = (cursor_x as i64 - prev_x) as i32;
        let physical_dy = (cursor_y as i64 - prev_y) as i32;

        if physical_dx == 0 && physical_dy == 0 {
            return None;
        }

        let raw = InputState::new(physical_dx as f64, physical_dy as f64, now_ms);
        let (processed, angular_delta) = {
            let mut pipeline = self.pipeline.lock().unwrap();
            let processed = pipeline.process(raw, now_ms);
            let angular_delta = pipeline
                .params()
                .host_normalizer
                .angular_delta(physical_dx as f64, physical_dy as f64);
            (processed, angular_delta)
        };

        self.record_telemetry(
            processed.velocity,
            processed.delta_x,
            processed.delta_y,
            angular_delta,
        );

        let final_dx = processed.delta_x.round() as i32;
        let final_dy = processed.delta_y.round() as i32;
        let residual_x = final_dx - physical_dx;
        let residual_y = final_dy - physical_dy;
        Some((residual_x, residual_y))
    }

    /// Drives `on_cursor_position`, then injects the residual through
    /// the platform if non-zero. Convenience wrapper for callers that
    /// don't need to intercept the residual themselves.
    pub fn handle_and_inject(&self, cursor_x: i32, cursor_y: i32, is_injection: bool, now_ms: f64) {
        if let Some((rx, ry)) = self.on_cursor_position(cursor_x, cursor_y, is_injection, now_ms) {
            if rx != 0 || ry != 0 {
                self.platform.inject_delta(rx, ry);
            }
        }
    }

    fn record_telemetry(&self, velocity: f64, dx: f64, dy: f64, angular_delta: (f64, f64)) {
        self.last_velocity_bits
            .store(velocity.to_bits(), Ordering::SeqCst);
        let angle = dy.atan2(dx).to_degrees();
        self.last_angle_bits
            .store(angle.to_bits(), Ordering::SeqCst);
        self.last_angular_delta_x_bits
            .store(angular_delta.0.to_bits(), Ordering::SeqCst);
        self.last_angular_delta_y_bits
            .store(angular_delta.1.to_bits(), Ordering::SeqCst);
    }

    pub fn mouse_velocity(&self) -> f64 {
        f64::from_bits(self.last_velocity_bits.load(Ordering::SeqCst))
    }

    pub fn mouse_angle_degrees(&self) -> f64 {
        f64::from_bits(self.last_angle_bits.load(Ordering::SeqCst))
    }

    /// FOV-based angular delta (degrees) of the most recently handled
    /// physical mouse event, per `HostNormalizer::angular_delta`.
    pub fn angular_delta_degrees(&self) -> (f64, f64) {
        (
            f64::from_bits(self.last_angular_delta_x_bits.load(Ordering::SeqCst)),
            f64::from_bits(self.last_angular_delta_y_bits.load(Ordering::SeqCst)),
        )
    }

    pub fn latency_ms(&self) -> f64 {
        self.pipeline.lock().unwrap().latency_ms()
    }

    pub fn pipeline(&self) -> &Mutex<SensitivityPipeline> {
        &self.pipeline
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::null::NullPlatform;
    use crate::sensitivity::PipelineParameters;

    fn authority() -> InputAuthority<NullPlatform> {
        let platform = Arc::new(NullPlatform::new());
        let mut params = PipelineParameters::default();
        params.input_authority_enabled = true;
        InputAuthority::new(platform, SensitivityPipeline::new(params))
    }

    #[test]
    fn first_move_only_records_position_no_injection() {
        let auth = authority();
        let mut log = EventLog::default();
        auth.start_hook(&mut log, 0).unwrap();
        let out = auth.on_cursor_position(100, 100, false, 0.0);
        assert!(out.is_none());
    }

    #[test]
    fn zero_delta_is_dropped() {
        let auth = authority();
        let mut log = EventLog::default();
        auth.start_hook(&mut log, 0).unwrap();
        auth.on_cursor_position(100, 100, false, 0.0);
        let out = auth.on_cursor_position(100, 100, false, 10.0);
        assert!(out.is_none());
    }

    #[test]
    fn injection_flagged_events_pass_through_untouched() {
        let auth = authority();
        let mut log = EventLog::default();
        auth.start_hook(&mut log, 0).unwrap();
        auth.on_cursor_position(100, 100, false, 0.0);
        let out = auth.on_cursor_position(150, 100, true, 10.0);
        assert!(out.is_none());
    }

    #[test]
    fn inactive_authority_never_injects() {
        let auth = authority();
        let out = auth.on_cursor_position(100, 100, false, 0.0);
        assert!(out.is_none());
    }

    #[test]
    fn start_hook_is_idempotent() {
        let auth = authority();
        let mut log = EventLog::default();
        assert!(auth.start_hook(&mut log, 0).is_ok());
        assert!(auth.start_hook(&mut log, 1).is_ok());
        assert!(auth.is_active());
    }

    #[test]
    fn stop_hook_releases_the_platform_hook() {
        let auth = authority();
        let mut log = EventLog::default();
        auth.start_hook(&mut log, 0).unwrap();
        auth.stop_hook(&mut log, 1);
        assert!(!auth.is_active());
        assert!(!auth.platform.hook_is_active());
    }
}
