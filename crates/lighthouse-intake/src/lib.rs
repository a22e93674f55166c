//! Conversational intake engine for Lighthouse.
//!
//! Listens to the user's story, silently extracts the facts needed to start
//! helping (who they are, who they lost, how they were related, where they
//! are), nudges only when necessary, and checkpoints progress so a crash or
//! reload never loses the conversation.

pub mod brain_fog;
pub mod enrichment;
pub mod error;
pub mod extractor;
pub mod location;
pub mod orchestrator;
pub mod policy;
pub mod silence;
pub mod speech;
pub mod state;
pub mod understanding;

pub use brain_fog::score_brain_fog;
pub use enrichment::InterstateResearcher;
pub use error::IntakeError;
pub use extractor::EntityExtractor;
pub use location::{classify_deceased_location, HeuristicLocationClassifier, LocationClassifier};
pub use orchestrator::{CompletionCallback, IntakeOutcome, TurnOrchestrator};
pub use silence::{SilenceContext, SilenceMonitor};
pub use speech::{InputEvent, NoSpeechInput, NoSpeechOutput, SpeechError, SpeechInput, SpeechOutput};
pub use state::{IntakeState, StateMachine};
pub use understanding::{CompletionRequest, HttpUnderstandingService, UnderstandingService};
