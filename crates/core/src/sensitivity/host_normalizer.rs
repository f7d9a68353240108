//! DPI normalization, host pointer-speed scalar, acceleration
//! compensation, refresh-rate compensation, and the FOV-based angular
//! delta: §4.1 steps 2-3.

use serde::{Deserialize, Serialize};

/// Pixel-to-angular-degree constant at the 1080p reference resolution.
pub const ALPHA_DEG_PER_PX: f64 = 0.022;
pub const REFERENCE_DPI: f64 = 800.0;
/// Refresh-rate compensation reference point.
pub const REFERENCE_HZ: f64 = 120.0;
const CM_PER_INCH: f64 = 2.54;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HostNormalizer {
    pub mouse_dpi: f64,
    pub host_pointer_speed: f64,
    pub accel_compensation_enabled: bool,
    pub screen_width: u32,
    pub screen_height: u32,
    pub refresh_hz: f64,
    pub horizontal_fov_deg: f64,
}

impl Default for HostNormalizer {
    fn default() -> Self {
        Self {
            mouse_dpi: REFERENCE_DPI,
            host_pointer_speed: 1.0,
            accel_compensation_enabled: false,
            screen_width: 1920,
            screen_height: 1080,
            refresh_hz: 60.0,
            horizontal_fov_deg: 90.0,
        }
    }
}

impl HostNormalizer {
    /// Step 2: `(dx, dy) /= mouse_dpi`.
    pub fn normalize_dpi(&self, dx: f64, dy: f64) -> (f64, f64) {
        if self.mouse_dpi <= 0.0 {
            return (dx, dy);
        }
        (dx / self.mouse_dpi, dy / self.mouse_dpi)
    }

    /// Piecewise approximation of the host acceleration curve, evaluated
    /// at the raw (pre-normalization) velocity in units/tick.
    pub fn accel_curve_approx(raw_velocity: f64) -> f64 {
        if raw_velocity < 3.5 {
            0.3 + (raw_velocity / 3.5) * 0.2
        } else if raw_velocity <= 7.0 {
            0.5 + (raw_velocity - 3.5) / 3.5 * 0.5
        } else {
            1.0 + 0.075 * (raw_velocity - 7.0)
        }
    }

    /// Step 3: host pointer scale, with optional acceleration
    /// compensation (divides out the approximated host curve), and
    /// refresh-rate compensation (higher Hz reads as faster perceived
    /// motion, scaled against `REFERENCE_HZ`).
    pub fn host_scale(&self, dx: f64, dy: f64, raw_velocity: f64) -> (f64, f64) {
        let mut scale = self.host_pointer_speed;
        if self.accel_compensation_enabled {
            let accel = Self::accel_curve_approx(raw_velocity).max(1e-6);
            scale /= accel;
        }
        scale *= self.refresh_rate_factor();
        (dx * scale, dy * scale)
    }

    /// Refresh-rate compensation factor relative to `REFERENCE_HZ`.
    pub fn refresh_rate_factor(&self) -> f64 {
        if self.refresh_hz <= 0.0 {
            return 1.0;
        }
        self.refresh_hz / REFERENCE_HZ
    }

    /// Vertical FOV derived from the horizontal FOV and the screen's
    /// aspect ratio: `tan(fovY/2) = tan(fovX/2) * (height/width)`.
    fn vertical_fov_deg(&self) -> f64 {
        if self.screen_width == 0 {
            return self.horizontal_fov_deg;
        }
        let half_fov_x = self.horizontal_fov_deg.to_radians() / 2.0;
        let aspect = self.screen_height as f64 / self.screen_width as f64;
        2.0 * (half_fov_x.tan() * aspect).atan().to_degrees()
    }

    /// FOV-based, resolution-independent angular delta for a raw counts
    /// delta: `Δθx = (Δcounts / DPI) · (FOVx / screenWidth)`, with the
    /// vertical axis scaled by the aspect-derived vertical FOV instead.
    pub fn angular_delta(&self, dx_counts: f64, dy_counts: f64) -> (f64, f64) {
        if self.mouse_dpi <= 0.0 || self.screen_width == 0 || self.screen_height == 0 {
            return (0.0, 0.0);
        }
        let x_ratio = self.horizontal_fov_deg / self.screen_width as f64;
        let y_ratio = self.vertical_fov_deg() / self.screen_height as f64;
        (
            (dx_counts / self.mouse_dpi) * x_ratio,
            (dy_counts / self.mouse_dpi) * y_ratio,
        )
    }

    /// Angular sensitivity in degrees per centimeter of physical mouse
    /// travel, for display/diagnostics.
    pub fn angular_sensitivity_deg_per_cm(&self) -> f64 {
        let counts_per_cm = self.mouse_dpi / CM_PER_INCH;
        self.angular_delta(counts_per_cm, 0.0).0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_dpi_divides_by_dpi() {
        let n = HostNormalizer {
            mouse_dpi: 1600.0,
            ..Default::default()
        };
        let (x, y) = n.normalize_dpi(16.0, 32.0);
        assert_eq!(x, 0.01);
        assert_eq!(y, 0.02);
    }

    #[test]
    fn accel_curve_is_monotonic_increasing() {
        let low = HostNormalizer::accel_curve_approx(1.0);
        let mid = HostNormalizer::accel_curve_approx(5.0);
        let high = HostNormalizer::accel_curve_approx(10.0);
        assert!(low < mid);
        assert!(mid <= 1.0 + 1e-9);
        assert!(high > 1.0);
    }

    #[test]
    fn zero_dpi_is_identity_not_a_panic() {
        let n = HostNormalizer {
            mouse_dpi: 0.0,
            ..Default::default()
        };
        let (x, y) = n.normalize_dpi(5.0, 5.0);
        assert_eq!((x, y), (5.0, 5.0));
    }

    #[test]
    fn refresh_rate_factor_is_one_at_the_reference_hz() {
        let n = HostNormalizer {
            refresh_hz: 120.0,
            ..Default::default()
        };
        assert!((n.refresh_rate_factor() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn higher_refresh_rate_scales_host_scale_up() {
        let low = HostNormalizer {
            refresh_hz: 60.0,
            ..Default::default()
        };
        let high = HostNormalizer {
            refresh_hz: 240.0,
            ..Default::default()
        };
        let (low_x, _) = low.host_scale(1.0, 0.0, 1.0);
        let (high_x, _) = high.host_scale(1.0, 0.0, 1.0);
        assert!(high_x > low_x);
    }

    #[test]
    fn zero_refresh_hz_is_identity_not_a_panic() {
        let n = HostNormalizer {
            refresh_hz: 0.0,
            ..Default::default()
        };
        assert_eq!(n.refresh_rate_factor(), 1.0);
    }

    #[test]
    fn angular_delta_shrinks_as_dpi_increases() {
        let low_dpi = HostNormalizer {
            mouse_dpi: 800.0,
            ..Default::default()
        };
        let high_dpi = HostNormalizer {
            mouse_dpi: 1600.0,
            ..Default::default()
        };
        let (low_x, _) = low_dpi.angular_delta(800.0, 0.0);
        let (high_x, _) = high_dpi.angular_delta(800.0, 0.0);
        assert!(high_x < low_x);
    }

    #[test]
    fn angular_delta_is_zero_at_zero_screen_width() {
        let n = HostNormalizer {
            screen_width: 0,
            ..Default::default()
        };
        assert_eq!(n.angular_delta(100.0, 100.0), (0.0, 0.0));
    }

    #[test]
    fn square_screen_gives_matching_axis_ratios() {
        let n = HostNormalizer {
            screen_width: 1000,
            screen_height: 1000,
            horizontal_fov_deg: 90.0,
            ..Default::default()
        };
        let (x, y) = n.angular_delta(800.0, 800.0);
        assert!((x - y).abs() < 1e-9);
    }

    #[test]
    fn angular_sensitivity_deg_per_cm_is_positive_under_defaults() {
        let n = HostNormalizer::default();
        assert!(n.angular_sensitivity_deg_per_cm() > 0.0);
    }
}
