//! Per-subsystem error taxonomy, composed into [`ZerecaError`] at the
//! crate boundary. The sensitivity hot path (`sensitivity::pipeline`)
//! never returns these: out-of-range parameters are clamped silently
//! and malformed per-event state degrades to an identity transform.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("unknown velocity curve preset: {0}")]
    UnknownPreset(String),
    #[error("invalid emulator preset: {0}")]
    UnknownEmulatorPreset(String),
}

#[derive(Debug, Error)]
pub enum AuthorityError {
    #[error("failed to install input hook")]
    HookInstallFailed,
    #[error("authority already active")]
    AlreadyActive,
}

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("io error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed content in {path}, falling back to defaults: {source}")]
    Malformed {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("target process not found: {0}")]
    ProcessNotFound(String),
    #[error("platform enforcement failed for {component}: {reason}")]
    EnforcementFailed { component: String, reason: String },
}

#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("no active platform process enumeration available")]
    EnumerationUnavailable,
}

#[derive(Debug, Error)]
pub enum ShadowError {
    #[error("change type {0:?} is not shadow-testable")]
    NotShadowTestable(crate::zereca::types::ChangeType),
    #[error("target process {0} exited during trial")]
    TargetExited(u32),
}

#[derive(Debug, Error)]
pub enum ZerecaError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    Authority(#[from] AuthorityError),
    #[error(transparent)]
    Persist(#[from] PersistError),
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
    #[error(transparent)]
    Detector(#[from] DetectorError),
    #[error(transparent)]
    Shadow(#[from] ShadowError),
}
