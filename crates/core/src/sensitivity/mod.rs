//! Hot-path sensitivity transform: DPI normalization, axis gain,
//! velocity shaping, slow zone, smoothing, and the repetition-drag
//! limiter. Everything here runs on the single input-hook thread and
//! never blocks or returns an error (see `pipeline::SensitivityPipeline`).

pub mod calculator;
pub mod drcs;
pub mod emulator_translator;
pub mod host_normalizer;
pub mod input_state;
pub mod pipeline;
pub mod velocity_curve;

pub use input_state::{InputState, Stage};
pub use pipeline::{PipelineParameters, SensitivityPipeline};
pub use velocity_curve::{VelocityCurve, VelocityCurvePreset};
