//! Speech collaborator interfaces.
//!
//! Capture and synthesis live outside the engine. Input implementations push
//! [`InputEvent`]s into the channel handed to the orchestrator; output
//! implementations resolve `speak` once playback has finished.

use async_trait::async_trait;

/// Failures reported by speech collaborators.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpeechError {
    #[error("speech is not supported in this environment")]
    Unsupported,
    #[error("microphone permission denied")]
    PermissionDenied,
    #[error("speech failure: {0}")]
    Failed(String),
}

/// Events produced on the input side of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    /// A recognized fragment. Interim fragments count as activity only.
    Transcript { text: String, is_final: bool },
    /// Manually entered text. Always treated as final.
    Typed(String),
    /// Capture started or stopped.
    ListeningChanged(bool),
    /// Capture failed.
    Error(SpeechError),
    /// The user chose to leave the intake and discard progress.
    Abandon,
}

/// Speech-to-text capture.
#[async_trait]
pub trait SpeechInput: Send {
    fn is_supported(&self) -> bool;

    /// Begin capturing. Transcript events arrive on the session channel.
    async fn start(&mut self) -> Result<(), SpeechError>;

    async fn stop(&mut self);
}

/// Text-to-speech playback.
#[async_trait]
pub trait SpeechOutput: Send {
    fn is_supported(&self) -> bool;

    /// Speak `text`, resolving when playback completes.
    async fn speak(&mut self, text: &str) -> Result<(), SpeechError>;

    async fn stop(&mut self);
}

/// Input for environments without a microphone. Text arrives as
/// [`InputEvent::Typed`] instead.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSpeechInput;

#[async_trait]
impl SpeechInput for NoSpeechInput {
    fn is_supported(&self) -> bool {
        false
    }

    async fn start(&mut self) -> Result<(), SpeechError> {
        Err(SpeechError::Unsupported)
    }

    async fn stop(&mut self) {}
}

/// Output for display-only environments.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSpeechOutput;

#[async_trait]
impl SpeechOutput for NoSpeechOutput {
    fn is_supported(&self) -> bool {
        false
    }

    async fn speak(&mut self, _text: &str) -> Result<(), SpeechError> {
        Err(SpeechError::Unsupported)
    }

    async fn stop(&mut self) {}
}
