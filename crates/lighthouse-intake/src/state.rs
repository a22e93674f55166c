//! Intake conversation state machine.
//!
//! Valid transitions:
//! - Greeting -> Listening (greeting spoken)
//! - Greeting -> Finalizing (restored session already has every fact)
//! - Listening -> Processing (final transcript fragment received)
//! - Listening -> Nudging (silence monitor fired)
//! - Processing -> Nudging (facts still missing)
//! - Processing -> Finalizing (all required facts known)
//! - Nudging -> Listening (nudge spoken)
//! - Finalizing -> Complete (record handed off)

use std::fmt;

use tokio::sync::watch;

use crate::error::IntakeError;

/// Phase of an intake conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntakeState {
    /// Speaking the opening (or welcome-back) greeting.
    Greeting,
    /// Waiting for the user to speak or type.
    Listening,
    /// Extracting facts from the latest utterance.
    Processing,
    /// Speaking a clarifying or gentle-presence prompt.
    Nudging,
    /// Closing acknowledgment, enrichment and record hand-off.
    Finalizing,
    /// Terminal. No further transitions.
    Complete,
}

impl fmt::Display for IntakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntakeState::Greeting => write!(f, "Greeting"),
            IntakeState::Listening => write!(f, "Listening"),
            IntakeState::Processing => write!(f, "Processing"),
            IntakeState::Nudging => write!(f, "Nudging"),
            IntakeState::Finalizing => write!(f, "Finalizing"),
            IntakeState::Complete => write!(f, "Complete"),
        }
    }
}

impl IntakeState {
    /// Returns whether a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: &IntakeState) -> bool {
        matches!(
            (self, target),
            (IntakeState::Greeting, IntakeState::Listening)
                | (IntakeState::Greeting, IntakeState::Finalizing)
                | (IntakeState::Listening, IntakeState::Processing)
                | (IntakeState::Listening, IntakeState::Nudging)
                | (IntakeState::Processing, IntakeState::Nudging)
                | (IntakeState::Processing, IntakeState::Finalizing)
                | (IntakeState::Nudging, IntakeState::Listening)
                | (IntakeState::Finalizing, IntakeState::Complete)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, IntakeState::Complete)
    }
}

/// State holder that validates transitions and lets observers follow along
/// through a `watch` channel.
#[derive(Debug)]
pub struct StateMachine {
    tx: watch::Sender<IntakeState>,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    /// Create a new state machine initialized to `Greeting`.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(IntakeState::Greeting);
        Self { tx }
    }

    pub fn current(&self) -> IntakeState {
        *self.tx.borrow()
    }

    /// Attempt to transition to the target state.
    pub fn transition(&self, target: IntakeState) -> Result<(), IntakeError> {
        let from = self.current();
        if !from.can_transition_to(&target) {
            return Err(IntakeError::InvalidTransition { from, to: target });
        }
        tracing::debug!("Intake state: {} -> {}", from, target);
        self.tx.send_replace(target);
        Ok(())
    }

    /// Observe state changes.
    pub fn subscribe(&self) -> watch::Receiver<IntakeState> {
        self.tx.subscribe()
    }
}

// =============================================================================
// Tests
// =============================================================================
