//! Turn orchestrator: drives one intake session from greeting to record.
//!
//! Single logical thread of control. The listening loop is one biased
//! `tokio::select!` over the input channel, the autosave deadline and the
//! silence poll. Extraction and enrichment are the only external calls and
//! both are awaited under a timeout.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use lighthouse_core::config::IntakeConfig;
use lighthouse_core::events::SessionEvent;
use lighthouse_core::types::{
    story_transcript, ConversationTurn, FactField, IntakeFacts, IntakeRecord, InterstateItinerary,
};
use lighthouse_storage::CheckpointStore;

use crate::brain_fog::score_brain_fog;
use crate::enrichment::InterstateResearcher;
use crate::error::IntakeError;
use crate::extractor::EntityExtractor;
use crate::location::{classify_deceased_location, HeuristicLocationClassifier, LocationClassifier};
use crate::policy;
use crate::silence::{SilenceContext, SilenceMonitor};
use crate::speech::{InputEvent, SpeechError, SpeechInput, SpeechOutput};
use crate::state::{IntakeState, StateMachine};
use crate::understanding::UnderstandingService;

/// Opening line of a fresh session.
pub const GREETING: &str = "Hi. I'm so glad you reached out, and I'm here to help. \
Whenever you're ready, tell me a little about what happened. Take all the time you need.";

const MICROPHONE_DENIED_PROMPT: &str =
    "I can't access your microphone. You can keep going by typing here.";
const VOICE_UNAVAILABLE_PROMPT: &str =
    "Voice input isn't available here, so let's continue by typing.";

/// Receives the finished record. Called at most once per session.
pub type CompletionCallback = Box<dyn FnOnce(IntakeRecord) + Send>;

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntakeOutcome {
    Completed(IntakeRecord),
    /// The user left; progress was discarded.
    Abandoned,
    /// Input ended early; progress was checkpointed for resume.
    Interrupted,
}

/// Who currently holds the audio floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Floor {
    Idle,
    Input,
    Output,
}

enum ListenOutcome {
    Utterance(String),
    Silence(&'static str),
    Abandon,
    Closed,
}

pub struct TurnOrchestrator {
    config: IntakeConfig,
    session_id: Uuid,
    machine: StateMachine,
    input: Box<dyn SpeechInput>,
    output: Box<dyn SpeechOutput>,
    input_rx: mpsc::UnboundedReceiver<InputEvent>,
    extractor: EntityExtractor,
    researcher: InterstateResearcher,
    classifier: Arc<dyn LocationClassifier>,
    checkpoint: CheckpointStore,
    silence: SilenceMonitor,
    floor: Floor,
    voice_input: bool,
    voice_output: bool,
    fallback_announced: bool,
    turn_count: u32,
    turns: Vec<ConversationTurn>,
    events: Option<mpsc::UnboundedSender<SessionEvent>>,
    on_complete: Option<CompletionCallback>,
}

impl TurnOrchestrator {
    /// Build a session around an already-opened checkpoint store.
    ///
    /// Any restore decision must be made on the store before this point.
    pub fn new(
        config: IntakeConfig,
        checkpoint: CheckpointStore,
        understanding: Arc<dyn UnderstandingService>,
        input: Box<dyn SpeechInput>,
        output: Box<dyn SpeechOutput>,
        input_rx: mpsc::UnboundedReceiver<InputEvent>,
    ) -> Self {
        let silence = SilenceMonitor::new(config.silence_threshold(), config.silence_max_turns);
        // The stored responses begin with the original greeting.
        let turn_count = if checkpoint.is_restored() {
            checkpoint.responses().len().saturating_sub(1) as u32
        } else {
            0
        };
        let voice_input = input.is_supported();
        let voice_output = output.is_supported();

        Self {
            config,
            session_id: Uuid::new_v4(),
            machine: StateMachine::new(),
            input,
            output,
            input_rx,
            extractor: EntityExtractor::new(Arc::clone(&understanding)),
            researcher: InterstateResearcher::new(understanding),
            classifier: Arc::new(HeuristicLocationClassifier),
            checkpoint,
            silence,
            floor: Floor::Idle,
            voice_input,
            voice_output,
            fallback_announced: false,
            turn_count,
            turns: Vec::new(),
            events: None,
            on_complete: None,
        }
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn LocationClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Sampling temperature for extraction requests.
    pub fn with_extraction_temperature(mut self, temperature: f32) -> Self {
        self.extractor = self.extractor.with_temperature(temperature);
        self
    }

    pub fn with_events(mut self, events: mpsc::UnboundedSender<SessionEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn on_complete(mut self, callback: CompletionCallback) -> Self {
        self.on_complete = Some(callback);
        self
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn state(&self) -> IntakeState {
        self.machine.current()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<IntakeState> {
        self.machine.subscribe()
    }

    pub fn facts(&self) -> &IntakeFacts {
        self.checkpoint.facts()
    }

    /// Turns processed in this run, oldest first.
    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn turn_count(&self) -> u32 {
        self.turn_count
    }

    pub fn checkpoint(&self) -> &CheckpointStore {
        &self.checkpoint
    }

    /// Run the session to completion, abandonment or interruption.
    ///
    /// Collaborator failures are recovered internally. An `Err` means an
    /// internal invariant was violated or the session was already run.
    pub async fn run(&mut self) -> Result<IntakeOutcome, IntakeError> {
        if self.machine.current() != IntakeState::Greeting {
            return Err(IntakeError::SessionFinished);
        }

        let resumed = self.checkpoint.is_restored();
        info!(
            session_id = %self.session_id,
            resumed,
            voice_input = self.voice_input,
            voice_output = self.voice_output,
            "Intake session started"
        );
        self.emit(SessionEvent::SessionStarted {
            session_id: self.session_id,
            resumed,
        });

        if !self.voice_input {
            self.fall_back_to_text(&SpeechError::Unsupported).await;
        }

        if self.greet().await? {
            return self.finalize().await;
        }

        loop {
            match self.listen().await {
                ListenOutcome::Utterance(utterance) => {
                    if let Some(outcome) = self.process(utterance).await? {
                        return Ok(outcome);
                    }
                }
                ListenOutcome::Silence(nudge) => {
                    self.transition(IntakeState::Nudging)?;
                    self.respond(nudge).await;
                    self.transition(IntakeState::Listening)?;
                }
                ListenOutcome::Abandon => return Ok(self.abandon().await),
                ListenOutcome::Closed => return Ok(self.interrupt().await),
            }
        }
    }

    // -------------------------------------------------------------------------
    // States
    // -------------------------------------------------------------------------

    /// Speak the greeting. Returns true when a restored session already holds
    /// every required fact and should finalize right away.
    async fn greet(&mut self) -> Result<bool, IntakeError> {
        match self.checkpoint.resume_greeting() {
            // Welcome-back lines are not stored so the turn history stays
            // aligned with the original session.
            Some(greeting) => self.speak(&greeting).await,
            None => self.respond(GREETING).await,
        }

        if self.checkpoint.is_restored() && policy::is_complete(self.checkpoint.facts()) {
            info!("Restored session already complete");
            self.transition(IntakeState::Finalizing)?;
            return Ok(true);
        }

        self.transition(IntakeState::Listening)?;
        Ok(false)
    }

    async fn listen(&mut self) -> ListenOutcome {
        self.silence.restart_window(Instant::now());
        self.acquire_input().await;

        let mut ticker = tokio::time::interval(self.config.silence_poll());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let autosave_at = self.checkpoint.autosave_deadline();

            tokio::select! {
                biased;

                event = self.input_rx.recv() => match event {
                    None => return ListenOutcome::Closed,
                    Some(InputEvent::Transcript { text, is_final }) => {
                        if let Some(utterance) = self.hear(text, is_final) {
                            return ListenOutcome::Utterance(utterance);
                        }
                    }
                    Some(InputEvent::Typed(text)) => {
                        if let Some(utterance) = self.hear(text, true) {
                            return ListenOutcome::Utterance(utterance);
                        }
                    }
                    Some(InputEvent::ListeningChanged(active)) => {
                        debug!(active, "Speech capture state changed");
                    }
                    Some(InputEvent::Error(err)) => {
                        warn!(error = %err, "Speech input error");
                        self.fall_back_to_text(&err).await;
                    }
                    Some(InputEvent::Abandon) => return ListenOutcome::Abandon,
                },

                _ = tokio::time::sleep_until(autosave_at.unwrap_or_else(Instant::now)),
                    if autosave_at.is_some() =>
                {
                    if let Some(saved) = self.checkpoint.autosave_if_due(Instant::now()) {
                        self.emit(SessionEvent::CheckpointSaved { version: saved.version });
                    }
                }

                _ = ticker.tick() => {
                    let missing = policy::missing_fields(self.checkpoint.facts());
                    let ctx = SilenceContext {
                        listening: self.machine.current() == IntakeState::Listening,
                        output_idle: self.floor != Floor::Output,
                        has_responded: !self.checkpoint.responses().is_empty(),
                        turn_count: self.turn_count,
                        missing: &missing,
                    };
                    if let Some(nudge) = self.silence.check(Instant::now(), ctx) {
                        info!(turn_count = self.turn_count, "Offering a gentle nudge after silence");
                        return ListenOutcome::Silence(nudge);
                    }
                }
            }
        }
    }

    /// Record a heard fragment. Returns the utterance when it is final.
    fn hear(&mut self, text: String, is_final: bool) -> Option<String> {
        self.silence.note_activity(Instant::now());
        self.emit(SessionEvent::Heard {
            text: text.clone(),
            is_final,
        });
        let text = text.trim();
        (is_final && !text.is_empty()).then(|| text.to_string())
    }

    /// Returns the outcome when this turn finished the session.
    async fn process(&mut self, utterance: String) -> Result<Option<IntakeOutcome>, IntakeError> {
        self.transition(IntakeState::Processing)?;
        self.release_input().await;

        self.checkpoint.append_transcript(&utterance);

        let extracted = match tokio::time::timeout(
            self.config.extraction_timeout(),
            self.extractor.extract(&utterance),
        )
        .await
        {
            Ok(facts) => facts,
            Err(_) => {
                warn!(
                    timeout_secs = self.config.extraction_timeout_secs,
                    "Fact extraction timed out; treating as empty"
                );
                IntakeFacts::default()
            }
        };

        let changed = self.checkpoint.merge_facts(&extracted);
        let missing = policy::missing_fields(self.checkpoint.facts());
        if changed > 0 {
            debug!(changed, missing = ?missing, "Facts merged");
            self.emit(SessionEvent::FactsUpdated {
                missing: missing.clone(),
            });
        }

        let completed_turns = self.turn_count;
        self.turn_count += 1;
        let index = self.turns.len() as u32 + 1;

        if missing.is_empty() {
            self.transition(IntakeState::Finalizing)?;
            self.turns.push(ConversationTurn {
                index,
                utterance,
                extracted,
                response: policy::closing_acknowledgment(self.checkpoint.facts()),
            });
            return self.finalize().await.map(Some);
        }

        self.transition(IntakeState::Nudging)?;
        let response =
            policy::policy_response(&missing, completed_turns, self.config.nudge_after_turns);
        self.turns.push(ConversationTurn {
            index,
            utterance,
            extracted,
            response: response.clone(),
        });
        self.respond(&response).await;
        self.transition(IntakeState::Listening)?;
        Ok(None)
    }

    async fn finalize(&mut self) -> Result<IntakeOutcome, IntakeError> {
        let closing = policy::closing_acknowledgment(self.checkpoint.facts());
        self.respond(&closing).await;
        tokio::time::sleep(self.config.finalize_pause()).await;

        let itinerary = self.enrich().await;
        let record = self.build_record(itinerary);

        self.checkpoint.clear();
        self.transition(IntakeState::Complete)?;

        info!(
            session_id = %self.session_id,
            turns = self.turn_count,
            brain_fog = record.brain_fog_level.value(),
            deceased_location = ?record.deceased_location,
            interstate = record.interstate_itinerary.is_some(),
            "Intake completed"
        );

        if let Some(callback) = self.on_complete.take() {
            callback(record.clone());
        }
        self.emit(SessionEvent::Completed {
            record: Box::new(record.clone()),
        });
        Ok(IntakeOutcome::Completed(record))
    }

    /// Interstate logistics, only when the user and the deceased are in
    /// different places. Bounded by the enrichment timeout.
    async fn enrich(&self) -> Option<InterstateItinerary> {
        let facts = self.checkpoint.facts();
        let origin = facts.get(FactField::Location)?;
        let destination = facts
            .deceased_location
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())?;

        if self.classifier.same_place(origin, destination) {
            return None;
        }

        info!("Locations differ; researching interstate logistics");
        match tokio::time::timeout(
            self.config.enrichment_timeout(),
            self.researcher.research(origin, destination),
        )
        .await
        {
            Ok(itinerary) => itinerary,
            Err(_) => {
                warn!(
                    timeout_secs = self.config.enrichment_timeout_secs,
                    "Interstate research timed out; finalizing without it"
                );
                None
            }
        }
    }

    fn build_record(&self, itinerary: Option<InterstateItinerary>) -> IntakeRecord {
        let facts = self.checkpoint.facts();
        let field = |f: FactField| facts.get(f).unwrap_or_default().to_string();
        let transcript = self.checkpoint.transcript();

        IntakeRecord {
            name: field(FactField::Name),
            deceased_name: field(FactField::Deceased),
            relationship: field(FactField::Relationship),
            user_location: field(FactField::Location),
            deceased_location: classify_deceased_location(
                facts.deceased_location.as_deref(),
                facts.get(FactField::Location),
                self.classifier.as_ref(),
            ),
            wishes_knowledge_level: facts.wishes_knowledge.unwrap_or_default(),
            initial_story_transcript: story_transcript(
                transcript,
                self.checkpoint.last_response(),
            ),
            brain_fog_level: score_brain_fog(transcript),
            interstate_itinerary: itinerary,
            completed_at: Utc::now(),
        }
    }

    async fn abandon(&mut self) -> IntakeOutcome {
        self.release_input().await;
        self.output.stop().await;
        self.checkpoint.clear();
        info!(session_id = %self.session_id, "Intake abandoned; progress discarded");
        self.emit(SessionEvent::Abandoned);
        IntakeOutcome::Abandoned
    }

    async fn interrupt(&mut self) -> IntakeOutcome {
        self.release_input().await;
        match self.checkpoint.save_now() {
            Ok(saved) => {
                info!(version = saved.version, "Intake interrupted; progress saved");
                self.emit(SessionEvent::CheckpointSaved {
                    version: saved.version,
                });
            }
            Err(e) => warn!(error = %e, "Failed to save checkpoint on interruption"),
        }
        self.emit(SessionEvent::Interrupted);
        IntakeOutcome::Interrupted
    }

    // -------------------------------------------------------------------------
    // Floor
    // -------------------------------------------------------------------------

    /// Store the response, then say it.
    async fn respond(&mut self, text: &str) {
        self.checkpoint.push_response(text);
        self.speak(text).await;
    }

    /// Display and (when possible) speak `text`. Input is stopped first and
    /// stays stopped until playback completes.
    async fn speak(&mut self, text: &str) {
        self.emit(SessionEvent::Response {
            text: text.to_string(),
        });
        self.release_input().await;

        if !self.voice_output {
            return;
        }

        self.floor = Floor::Output;
        if let Err(e) = self.output.speak(text).await {
            warn!(error = %e, "Speech output failed; continuing display-only");
            if matches!(e, SpeechError::Unsupported | SpeechError::PermissionDenied) {
                self.voice_output = false;
            }
        }
        self.floor = Floor::Idle;
    }

    async fn acquire_input(&mut self) {
        if !self.voice_input || self.floor == Floor::Input {
            return;
        }
        match self.input.start().await {
            Ok(()) => self.floor = Floor::Input,
            Err(e) => {
                warn!(error = %e, "Could not start speech input");
                self.fall_back_to_text(&e).await;
            }
        }
    }

    async fn release_input(&mut self) {
        if self.floor == Floor::Input {
            self.input.stop().await;
            self.floor = Floor::Idle;
        }
    }

    /// Switch the session to manual text entry. The prompt is published once.
    async fn fall_back_to_text(&mut self, reason: &SpeechError) {
        self.release_input().await;
        self.voice_input = false;

        if self.fallback_announced {
            return;
        }
        self.fallback_announced = true;

        let prompt = match reason {
            SpeechError::PermissionDenied => MICROPHONE_DENIED_PROMPT,
            _ => VOICE_UNAVAILABLE_PROMPT,
        };
        info!(reason = %reason, "Falling back to text input");
        self.emit(SessionEvent::TextFallback {
            reason: reason.to_string(),
            prompt: prompt.to_string(),
        });
    }

    fn transition(&mut self, to: IntakeState) -> Result<(), IntakeError> {
        let from = self.machine.current();
        self.machine.transition(to)?;
        self.emit(SessionEvent::StateChanged {
            from: from.to_string(),
            to: to.to_string(),
        });
        Ok(())
    }

    fn emit(&self, event: SessionEvent) {
        if let Some(ref tx) = self.events {
            // Nobody listening is fine.
            let _ = tx.send(event);
        }
    }
}

impl std::fmt::Debug for TurnOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnOrchestrator")
            .field("session_id", &self.session_id)
            .field("state", &self.machine.current())
            .field("turn_count", &self.turn_count)
            .field("voice_input", &self.voice_input)
            .field("voice_output", &self.voice_output)
            .finish()
    }
}
