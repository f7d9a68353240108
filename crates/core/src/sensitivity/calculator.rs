//! Master Equation composition and derived, read-only metrics: §4.1.

use super::host_normalizer::{HostNormalizer, ALPHA_DEG_PER_PX, REFERENCE_DPI};

/// The effective linear multiplier excluding the velocity curve and slow
/// zone, per the Master Equation:
/// `C(v) · S_xy · α · E_s · E_r · W_s · (REF_DPI / D_hw)`.
///
/// `curve_and_axis_gain` folds in `C(v) · S_xy` (the curve value times the
/// per-axis gain), the two stages that vary per-call and per-axis.
pub fn master_equation(
    curve_and_axis_gain: f64,
    emulator_sensitivity: f64,
    resolution_scale: f64,
    host_pointer_speed: f64,
    mouse_dpi: f64,
) -> f64 {
    if mouse_dpi <= 0.0 {
        return 0.0;
    }
    curve_and_axis_gain
        * ALPHA_DEG_PER_PX
        * emulator_sensitivity
        * resolution_scale
        * host_pointer_speed
        * (REFERENCE_DPI / mouse_dpi)
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DerivedMetrics {
    pub effective_sensitivity: f64,
    pub cm_per_360: f64,
    pub effective_angular_sensitivity: f64,
}

/// Computes the read-only panel metrics exposed on the property bridge.
pub fn derived_metrics(
    emulator_sensitivity: f64,
    resolution_scale: f64,
    host_pointer_speed: f64,
    mouse_dpi: f64,
    sensitivity_x: f64,
    gain_x: f64,
    host: &HostNormalizer,
) -> DerivedMetrics {
    let _ = host;
    let effective_sensitivity = ALPHA_DEG_PER_PX
        * emulator_sensitivity
        * resolution_scale
        * host_pointer_speed
        * if mouse_dpi > 0.0 {
            REFERENCE_DPI / mouse_dpi
        } else {
            0.0
        }
        * sensitivity_x
        * gain_x;

    let cm_per_360 = if effective_sensitivity > 0.0 && mouse_dpi > 0.0 {
        360.0 / effective_sensitivity / mouse_dpi * 2.54
    } else {
        0.0
    };

    let effective_angular_sensitivity = if cm_per_360 > 0.0 {
        360.0 / cm_per_360
    } else {
        0.0
    };

    DerivedMetrics {
        effective_sensitivity,
        cm_per_360,
        effective_angular_sensitivity,
    }
}
