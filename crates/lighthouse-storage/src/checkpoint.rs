//! Versioned checkpoint store for intake sessions.
//!
//! The store owns the live session draft (transcript, responses, facts).
//! Callers mutate it through the store so every change can re-arm the
//! debounced autosave. Startup is two-phase: the restore source is resolved
//! in [`CheckpointStore::open`] before any live state is built.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use lighthouse_core::config::CheckpointConfig;
use lighthouse_core::error::LighthouseError;
use lighthouse_core::types::{Checkpoint, IntakeFacts};

use crate::kv::DurableStore;

// =============================================================================
// Debounce
// =============================================================================

/// Owned debounce timer handle.
///
/// Holds only a deadline; the owning event loop sleeps until
/// [`Debounce::deadline`] and then asks [`Debounce::is_due`].
#[derive(Debug, Clone)]
pub struct Debounce {
    delay: Duration,
    deadline: Option<Instant>,
}

impl Debounce {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    /// (Re)start the timer from `now`.
    pub fn touch(&mut self, now: Instant) {
        self.deadline = Some(now + self.delay);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_due(&self, now: Instant) -> bool {
        matches!(self.deadline, Some(deadline) if now >= deadline)
    }
}

// =============================================================================
// Session draft
// =============================================================================

/// In-memory accumulation of one intake session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionDraft {
    pub transcript: String,
    pub responses: Vec<String>,
    pub facts: IntakeFacts,
}

impl SessionDraft {
    fn from_checkpoint(checkpoint: &Checkpoint) -> Self {
        Self {
            transcript: checkpoint.transcript.clone(),
            responses: checkpoint.responses.clone(),
            facts: checkpoint.facts.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.transcript.is_empty() && self.responses.is_empty() && self.facts.is_empty()
    }
}

// =============================================================================
// CheckpointStore
// =============================================================================

/// Durable, versioned snapshot of intake progress.
pub struct CheckpointStore {
    store: Arc<dyn DurableStore>,
    config: CheckpointConfig,
    draft: SessionDraft,
    version: u64,
    autosave: Debounce,
    resume: Option<Checkpoint>,
    restored: bool,
}

impl CheckpointStore {
    /// Resolve the restore source and build the store.
    ///
    /// An externally supplied checkpoint wins and is adopted immediately, so
    /// the live draft never starts empty and then flips. Otherwise the
    /// persisted checkpoint (if valid) is only exposed through
    /// [`resume_available`](Self::resume_available) until
    /// [`restore`](Self::restore) is called.
    pub fn open(
        store: Arc<dyn DurableStore>,
        config: CheckpointConfig,
        external: Option<Checkpoint>,
    ) -> Self {
        let autosave = Debounce::new(config.autosave_debounce());
        let mut this = Self {
            store,
            config,
            draft: SessionDraft::default(),
            version: 0,
            autosave,
            resume: None,
            restored: false,
        };

        match external {
            Some(checkpoint) => {
                info!(
                    version = checkpoint.version,
                    "Adopting externally supplied checkpoint"
                );
                this.adopt(&checkpoint);
            }
            None => {
                this.resume = this.load();
                if let Some(ref checkpoint) = this.resume {
                    info!(version = checkpoint.version, "Checkpoint available for resume");
                }
            }
        }

        this
    }

    /// Load the most recent valid checkpoint.
    pub fn load(&mut self) -> Option<Checkpoint> {
        self.load_at(Utc::now())
    }

    /// Load relative to an explicit wall-clock time.
    ///
    /// Stale or unreadable checkpoints are deleted and never returned.
    pub fn load_at(&mut self, now: DateTime<Utc>) -> Option<Checkpoint> {
        let raw = match self.store.get(&self.config.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "Failed to read checkpoint");
                return None;
            }
        };

        let checkpoint: Checkpoint = match serde_json::from_str(&raw) {
            Ok(checkpoint) => checkpoint,
            Err(e) => {
                warn!(error = %e, "Discarding unreadable checkpoint");
                self.remove_persisted();
                return None;
            }
        };

        if checkpoint.is_stale(now, self.config.max_age()) {
            info!(
                version = checkpoint.version,
                last_update = %checkpoint.last_update_at(),
                "Discarding stale checkpoint"
            );
            self.remove_persisted();
            return None;
        }

        self.version = self.version.max(checkpoint.version);
        Some(checkpoint)
    }

    /// Persist a snapshot with the next version number, overwriting the
    /// previous checkpoint.
    pub fn save(&mut self, snapshot: &SessionDraft) -> Result<Checkpoint, LighthouseError> {
        self.save_at(snapshot, Utc::now())
    }

    pub fn save_at(
        &mut self,
        snapshot: &SessionDraft,
        now: DateTime<Utc>,
    ) -> Result<Checkpoint, LighthouseError> {
        let checkpoint = Checkpoint {
            transcript: snapshot.transcript.clone(),
            responses: snapshot.responses.clone(),
            facts: snapshot.facts.clone(),
            last_update: now.timestamp_millis(),
            version: self.version + 1,
        };
        let json = serde_json::to_string(&checkpoint)?;
        self.store.set(&self.config.key, &json)?;
        self.version = checkpoint.version;
        debug!(version = checkpoint.version, "Checkpoint saved");
        Ok(checkpoint)
    }

    /// Persist the live draft right away, cancelling any pending autosave.
    pub fn save_now(&mut self) -> Result<Checkpoint, LighthouseError> {
        self.autosave.cancel();
        let snapshot = self.draft.clone();
        self.save(&snapshot)
    }

    /// Delete persisted state and reset the in-memory accumulation.
    pub fn clear(&mut self) {
        self.remove_persisted();
        self.draft = SessionDraft::default();
        self.autosave.cancel();
        self.resume = None;
        self.restored = false;
        debug!("Checkpoint cleared");
    }

    // -------------------------------------------------------------------------
    // Resume
    // -------------------------------------------------------------------------

    /// The persisted checkpoint found at startup, if it has not been
    /// restored or discarded yet.
    pub fn resume_available(&self) -> Option<&Checkpoint> {
        self.resume.as_ref()
    }

    /// Adopt the available checkpoint into the live draft.
    pub fn restore(&mut self) -> Option<Checkpoint> {
        let checkpoint = self.resume.take()?;
        info!(version = checkpoint.version, "Restoring checkpoint");
        self.adopt(&checkpoint);
        Some(checkpoint)
    }

    /// Decline the available checkpoint and delete it.
    pub fn discard_resume(&mut self) {
        if self.resume.take().is_some() {
            info!("Discarding checkpoint at user request");
            self.remove_persisted();
        }
    }

    /// Whether the live draft came from a checkpoint.
    pub fn is_restored(&self) -> bool {
        self.restored
    }

    fn adopt(&mut self, checkpoint: &Checkpoint) {
        self.draft = SessionDraft::from_checkpoint(checkpoint);
        self.version = self.version.max(checkpoint.version);
        self.restored = true;
    }

    // -------------------------------------------------------------------------
    // Live draft
    // -------------------------------------------------------------------------

    pub fn draft(&self) -> &SessionDraft {
        &self.draft
    }

    pub fn facts(&self) -> &IntakeFacts {
        &self.draft.facts
    }

    pub fn transcript(&self) -> &str {
        &self.draft.transcript
    }

    pub fn responses(&self) -> &[String] {
        &self.draft.responses
    }

    pub fn last_response(&self) -> Option<&str> {
        self.draft.responses.last().map(String::as_str)
    }

    /// Version of the most recent save (or adopted checkpoint).
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Append a user fragment to the transcript.
    pub fn append_transcript(&mut self, fragment: &str) {
        let fragment = fragment.trim();
        if fragment.is_empty() {
            return;
        }
        if !self.draft.transcript.is_empty() {
            self.draft.transcript.push(' ');
        }
        self.draft.transcript.push_str(fragment);
        self.autosave.touch(Instant::now());
    }

    pub fn push_response(&mut self, response: &str) {
        self.draft.responses.push(response.to_string());
        self.autosave.touch(Instant::now());
    }

    /// Merge newly extracted facts. Returns the number of changed fields.
    pub fn merge_facts(&mut self, newer: &IntakeFacts) -> usize {
        let changed = self.draft.facts.merge(newer);
        if changed > 0 {
            self.autosave.touch(Instant::now());
        }
        changed
    }

    // -------------------------------------------------------------------------
    // Autosave
    // -------------------------------------------------------------------------

    pub fn autosave_deadline(&self) -> Option<Instant> {
        self.autosave.deadline()
    }

    /// Save the draft if the debounce window has elapsed.
    ///
    /// Persistence failures are logged and the session carries on in memory.
    pub fn autosave_if_due(&mut self, now: Instant) -> Option<Checkpoint> {
        if !self.autosave.is_due(now) {
            return None;
        }
        match self.save_now() {
            Ok(checkpoint) => Some(checkpoint),
            Err(e) => {
                warn!(error = %e, "Autosave failed; continuing in memory");
                None
            }
        }
    }

    /// Resume greeting for a checkpoint.
    pub fn build_resume_greeting(&self, checkpoint: &Checkpoint) -> String {
        build_resume_greeting(checkpoint)
    }

    /// Welcome-back phrase for the live draft, if it came from a checkpoint.
    pub fn resume_greeting(&self) -> Option<String> {
        self.restored.then(|| greeting_for(&self.draft.facts))
    }

    fn remove_persisted(&self) {
        if let Err(e) = self.store.remove(&self.config.key) {
            warn!(error = %e, "Failed to remove checkpoint");
        }
    }
}

impl std::fmt::Debug for CheckpointStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckpointStore")
            .field("key", &self.config.key)
            .field("version", &self.version)
            .field("restored", &self.restored)
            .field("has_resume", &self.resume.is_some())
            .finish()
    }
}

/// Deterministic welcome-back phrase for a restored session.
pub fn build_resume_greeting(checkpoint: &Checkpoint) -> String {
    greeting_for(&checkpoint.facts)
}

fn greeting_for(facts: &IntakeFacts) -> String {
    let name = non_blank(facts.name.as_deref());
    let deceased = non_blank(facts.deceased_name.as_deref());

    match (name, deceased) {
        (Some(name), Some(deceased)) => format!(
            "Welcome back, {}. We were talking about {}. Take your time, and pick up wherever feels right.",
            name, deceased
        ),
        (None, Some(deceased)) => format!(
            "Welcome back. We were talking about {}. Take your time, and pick up wherever feels right.",
            deceased
        ),
        (Some(name), None) => format!(
            "Welcome back, {}. Let's pick up where we left off, whenever you're ready.",
            name
        ),
        (None, None) => {
            "Welcome back. Let's pick up where we left off, whenever you're ready.".to_string()
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryStore;

    struct FailingStore;

    impl DurableStore for FailingStore {
        fn get(&self, _key: &str) -> Result<Option<String>, LighthouseError> {
            Err(LighthouseError::Storage("read failed".to_string()))
        }
        fn set(&self, _key: &str, _value: &str) -> Result<(), LighthouseError> {
            Err(LighthouseError::Storage("write failed".to_string()))
        }
        fn remove(&self, _key: &str) -> Result<(), LighthouseError> {
            Err(LighthouseError::Storage("remove failed".to_string()))
        }
    }

    fn config() -> CheckpointConfig {
        CheckpointConfig::default()
    }

    fn draft(transcript: &str, name: Option<&str>, deceased: Option<&str>) -> SessionDraft {
        SessionDraft {
            transcript: transcript.to_string(),
            responses: vec!["Hello.".to_string()],
            facts: IntakeFacts {
                name: name.map(String::from),
                deceased_name: deceased.map(String::from),
                ..IntakeFacts::default()
            },
        }
    }

    fn checkpoint_at(last_update: DateTime<Utc>, version: u64) -> Checkpoint {
        Checkpoint {
            transcript: "my mother passed".to_string(),
            responses: vec!["I'm so sorry.".to_string()],
            facts: IntakeFacts {
                deceased_name: Some("Rosa".to_string()),
                ..IntakeFacts::default()
            },
            last_update: last_update.timestamp_millis(),
            version,
        }
    }

    fn persist(store: &MemoryStore, checkpoint: &Checkpoint) {
        store
            .set(&config().key, &serde_json::to_string(checkpoint).unwrap())
            .unwrap();
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let kv = Arc::new(MemoryStore::new());
        let mut store = CheckpointStore::open(kv.clone(), config(), None);

        let first = store.save(&draft("hello", Some("Sam"), None)).unwrap();
        let snapshot = draft("hello there", Some("Sam"), Some("Lee"));
        let second = store.save(&snapshot).unwrap();
        assert_eq!(second.version, first.version + 1);

        let mut reopened = CheckpointStore::open(kv, config(), None);
        let loaded = reopened.load().unwrap();
        assert_eq!(loaded.version, second.version);
        assert_eq!(loaded.transcript, snapshot.transcript);
        assert_eq!(loaded.facts, snapshot.facts);
    }

    #[test]
    fn test_version_continues_from_persisted_checkpoint() {
        let kv = Arc::new(MemoryStore::new());
        persist(&kv, &checkpoint_at(Utc::now(), 7));

        let mut store = CheckpointStore::open(kv, config(), None);
        let saved = store.save(&SessionDraft::default()).unwrap();
        assert_eq!(saved.version, 8);
    }

    #[test]
    fn test_stale_checkpoint_is_deleted_not_returned() {
        let kv = Arc::new(MemoryStore::new());
        persist(&kv, &checkpoint_at(Utc::now() - chrono::Duration::hours(25), 4));

        let mut store = CheckpointStore::open(kv.clone(), config(), None);
        assert!(store.resume_available().is_none());
        assert!(store.load().is_none());
        assert_eq!(kv.get(&config().key).unwrap(), None);
    }

    #[test]
    fn test_checkpoint_just_inside_window_is_kept() {
        let kv = Arc::new(MemoryStore::new());
        let now = Utc::now();
        persist(&kv, &checkpoint_at(now - chrono::Duration::hours(23), 2));

        let mut store = CheckpointStore::open(kv, config(), None);
        assert!(store.load_at(now).is_some());
    }

    #[test]
    fn test_corrupt_checkpoint_is_deleted() {
        let kv = Arc::new(MemoryStore::new());
        kv.set(&config().key, "{not json").unwrap();

        let store = CheckpointStore::open(kv.clone(), config(), None);
        assert!(store.resume_available().is_none());
        assert_eq!(kv.get(&config().key).unwrap(), None);
    }

    #[test]
    fn test_resume_available_does_not_touch_live_state() {
        let kv = Arc::new(MemoryStore::new());
        persist(&kv, &checkpoint_at(Utc::now(), 3));

        let mut store = CheckpointStore::open(kv, config(), None);
        assert!(store.resume_available().is_some());
        assert!(store.draft().is_empty());
        assert!(!store.is_restored());

        let restored = store.restore().unwrap();
        assert_eq!(restored.version, 3);
        assert_eq!(store.transcript(), "my mother passed");
        assert_eq!(store.facts().deceased_name.as_deref(), Some("Rosa"));
        assert!(store.is_restored());
        assert!(store.resume_available().is_none());
    }

    #[test]
    fn test_external_checkpoint_takes_precedence() {
        let kv = Arc::new(MemoryStore::new());
        persist(&kv, &checkpoint_at(Utc::now(), 9));

        let mut external = checkpoint_at(Utc::now(), 2);
        external.transcript = "from the caller".to_string();

        let store = CheckpointStore::open(kv, config(), Some(external));
        assert!(store.is_restored());
        assert!(store.resume_available().is_none());
        assert_eq!(store.transcript(), "from the caller");
    }

    #[test]
    fn test_discard_resume_deletes_persisted() {
        let kv = Arc::new(MemoryStore::new());
        persist(&kv, &checkpoint_at(Utc::now(), 1));

        let mut store = CheckpointStore::open(kv.clone(), config(), None);
        store.discard_resume();
        assert!(store.resume_available().is_none());
        assert_eq!(kv.get(&config().key).unwrap(), None);
    }

    #[test]
    fn test_clear_resets_everything() {
        let kv = Arc::new(MemoryStore::new());
        let mut store = CheckpointStore::open(kv.clone(), config(), None);
        store.append_transcript("my brother died");
        store.push_response("I'm so sorry.");
        store.save_now().unwrap();

        store.clear();
        assert!(store.draft().is_empty());
        assert!(store.autosave_deadline().is_none());
        assert_eq!(kv.get(&config().key).unwrap(), None);
    }

    #[test]
    fn test_append_transcript_joins_with_space() {
        let kv = Arc::new(MemoryStore::new());
        let mut store = CheckpointStore::open(kv, config(), None);
        store.append_transcript("My name is Sam.");
        store.append_transcript("   ");
        store.append_transcript(" I lost my husband. ");
        assert_eq!(store.transcript(), "My name is Sam. I lost my husband.");
    }

    #[test]
    fn test_unchanged_facts_do_not_arm_autosave() {
        let kv = Arc::new(MemoryStore::new());
        let mut store = CheckpointStore::open(kv, config(), None);
        assert_eq!(store.merge_facts(&IntakeFacts::default()), 0);
        assert!(store.autosave_deadline().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_mutations_coalesce_into_one_save() {
        let kv = Arc::new(MemoryStore::new());
        let mut store = CheckpointStore::open(kv.clone(), config(), None);

        store.append_transcript("one");
        tokio::time::advance(Duration::from_secs(4)).await;
        store.append_transcript("two");
        tokio::time::advance(Duration::from_secs(4)).await;
        store.push_response("three");

        // Eight seconds after the first mutation, nothing is due yet.
        assert!(store.autosave_if_due(Instant::now()).is_none());
        assert_eq!(kv.get(&config().key).unwrap(), None);

        tokio::time::advance(Duration::from_secs(10)).await;
        let saved = store.autosave_if_due(Instant::now()).unwrap();
        assert_eq!(saved.version, 1);
        assert_eq!(saved.transcript, "one two");
        assert_eq!(saved.responses, vec!["three".to_string()]);

        // The timer is consumed by the save.
        assert!(store.autosave_if_due(Instant::now()).is_none());
    }

    #[test]
    fn test_debounce_touch_pushes_deadline() {
        let start = Instant::now();
        let mut debounce = Debounce::new(Duration::from_secs(10));
        assert!(!debounce.is_due(start));

        debounce.touch(start);
        assert!(!debounce.is_due(start + Duration::from_secs(9)));
        debounce.touch(start + Duration::from_secs(5));
        assert!(!debounce.is_due(start + Duration::from_secs(12)));
        assert!(debounce.is_due(start + Duration::from_secs(15)));

        debounce.cancel();
        assert!(debounce.deadline().is_none());
    }

    #[test]
    fn test_persistence_failures_are_recovered() {
        let mut store = CheckpointStore::open(Arc::new(FailingStore), config(), None);
        assert!(store.resume_available().is_none());
        assert!(store.save(&SessionDraft::default()).is_err());
        assert_eq!(store.version(), 0);

        store.append_transcript("still works in memory");
        store.clear();
        assert!(store.draft().is_empty());
    }

    #[test]
    fn test_resume_greeting_only_for_restored_draft() {
        let kv = Arc::new(MemoryStore::new());
        persist(&kv, &checkpoint_at(Utc::now(), 1));

        let mut store = CheckpointStore::open(kv, config(), None);
        assert!(store.resume_greeting().is_none());

        store.restore();
        assert_eq!(
            store.resume_greeting().unwrap(),
            "Welcome back. We were talking about Rosa. Take your time, and pick up wherever feels right."
        );
    }

    #[test]
    fn test_resume_greeting_variants() {
        let mut checkpoint = checkpoint_at(Utc::now(), 1);
        checkpoint.facts.name = Some("Sam".to_string());
        assert_eq!(
            build_resume_greeting(&checkpoint),
            "Welcome back, Sam. We were talking about Rosa. Take your time, and pick up wherever feels right."
        );

        checkpoint.facts.name = None;
        assert!(build_resume_greeting(&checkpoint).starts_with("Welcome back. We were talking about Rosa."));

        checkpoint.facts.deceased_name = Some(" ".to_string());
        checkpoint.facts.name = Some("Sam".to_string());
        assert_eq!(
            build_resume_greeting(&checkpoint),
            "Welcome back, Sam. Let's pick up where we left off, whenever you're ready."
        );

        checkpoint.facts.name = None;
        assert_eq!(
            build_resume_greeting(&checkpoint),
            "Welcome back. Let's pick up where we left off, whenever you're ready."
        );
    }
}
