use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{FactField, IntakeRecord};

/// Notifications published by an intake session.
///
/// Consumed by the presentation layer (console, UI bridge) to display
/// responses and state; the engine never depends on anyone listening.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum SessionEvent {
    /// The session started, possibly from a restored checkpoint.
    SessionStarted { session_id: Uuid, resumed: bool },

    /// The conversation moved to a new state.
    StateChanged { from: String, to: String },

    /// A system response to speak and/or display.
    Response { text: String },

    /// A transcript fragment was heard (interim fragments included).
    Heard { text: String, is_final: bool },

    /// Voice input is unavailable; the user should continue by typing.
    TextFallback { reason: String, prompt: String },

    /// Newly merged facts changed the record.
    FactsUpdated { missing: Vec<FactField> },

    /// A checkpoint was persisted.
    CheckpointSaved { version: u64 },

    /// The intake finished and the record was handed off.
    Completed { record: Box<IntakeRecord> },

    /// The user abandoned the intake; progress was discarded.
    Abandoned,

    /// Input ended before completion; progress was checkpointed.
    Interrupted,
}
