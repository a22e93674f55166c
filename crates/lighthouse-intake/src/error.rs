//! Error types for the intake engine.

use lighthouse_core::error::LighthouseError;

use crate::state::IntakeState;

/// Errors from the intake engine.
///
/// Collaborator failures (understanding, speech, storage) are recovered
/// inside the orchestrator; only invariant violations escape `run`.
#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition { from: IntakeState, to: IntakeState },
    #[error("intake session already finished")]
    SessionFinished,
    #[error("understanding error: {0}")]
    Understanding(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<LighthouseError> for IntakeError {
    fn from(err: LighthouseError) -> Self {
        match err {
            LighthouseError::Understanding(msg) => IntakeError::Understanding(msg),
            other => IntakeError::Storage(other.to_string()),
        }
    }
}
