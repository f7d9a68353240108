//! Zereca Control Plane: a reconciliation-based system-state manager
//! with three cooperating subsystems: Enforcement (Reconciler),
//! Learning (Observation → Hypothesis → Shadow), and the Arbiter gate,
//! plus a probation ledger and flight-recorder audit trail (§4.3-§4.15).

pub mod arbiter;
pub mod classify;
pub mod controller;
pub mod detector;
pub mod flight_recorder;
pub mod hypothesis;
pub mod observation;
pub mod probation;
pub mod reconciler;
pub mod rollback;
pub mod shadow;
pub mod target_state;
pub mod telemetry;
pub mod types;

pub use arbiter::{Arbiter, Decision, RejectionReason};
pub use classify::{classify_outcome, ClassifierInput, ClassifierResult};
pub use controller::{Mode, ZerecaController};
pub use detector::{EmulatorDetector, EmulatorInfo, EmulatorSignature};
pub use flight_recorder::{FlightRecorder, StateChangeRecord};
pub use hypothesis::{Hypothesis, HypothesisEngine};
pub use observation::{ObservationPhase, ObservationResult};
pub use probation::{ProbationEntry, ProbationLedger};
pub use reconciler::{CurrentState, Reconciler};
pub use rollback::EmergencyRollback;
pub use shadow::{ShadowMode, ShadowTrialResult};
pub use target_state::TargetStateManager;
