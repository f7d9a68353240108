//! Input Authority: the low-level mouse capture mechanism (§4.2).
//!
//! Re-architected away from the original's process-wide QObject
//! singleton per §9: the platform hook installer takes an owned handle
//! to the [`crate::sensitivity::SensitivityPipeline`] rather than
//! reaching through a global back-channel.

mod input_authority;

pub use input_authority::InputAuthority;
