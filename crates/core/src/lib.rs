#![allow(clippy::too_many_arguments)]

//! Core of the Zereca sensitivity pipeline and control plane.
//!
//! # Architecture
//!
//! ```text
//! hardware delta -> [authority] -> [sensitivity::pipeline] -> residual delta -> OS
//!
//! [zereca::telemetry] -> [zereca::observation] -> [zereca::hypothesis]
//!        -> [zereca::arbiter] -> [zereca::target_state] -> [zereca::reconciler]
//! ```
//!
//! The hot path (`sensitivity::pipeline`) never blocks and never returns an
//! error; every other subsystem here is free to use `Result` and to make
//! blocking OS calls through the [`platform::Platform`] trait.

pub mod config;
pub mod controller;
pub mod error;
pub mod event;
pub mod platform;
pub mod sensitivity;
pub mod authority;
pub mod zereca;

pub use controller::NeoController;
pub use error::ZerecaError;
