//! Silence monitor.
//!
//! Owned by the orchestrator and polled from its event loop while
//! listening. Holds no timer of its own, only the reference instant of the
//! last speech activity.

use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use lighthouse_core::types::FactField;

/// Gentle-presence nudge when the deceased has not been named yet.
pub const DECEASED_PRESENCE_NUDGE: &str =
    "I'm still here with you. Whenever you're ready, you can tell me who you lost.";

/// Gentle-presence nudge for every other case.
pub const GENERIC_PRESENCE_NUDGE: &str =
    "I'm still here with you. There's no rush. Share whatever feels right.";

/// Orchestrator state the monitor needs to decide whether to fire.
#[derive(Debug, Clone, Copy)]
pub struct SilenceContext<'a> {
    pub listening: bool,
    pub output_idle: bool,
    pub has_responded: bool,
    pub turn_count: u32,
    pub missing: &'a [FactField],
}

#[derive(Debug, Clone)]
pub struct SilenceMonitor {
    threshold: Duration,
    max_turns: u32,
    last_activity: Option<Instant>,
    armed: bool,
}

impl SilenceMonitor {
    pub fn new(threshold: Duration, max_turns: u32) -> Self {
        Self {
            threshold,
            max_turns,
            last_activity: None,
            armed: true,
        }
    }

    /// Speech was heard. Resets the silence window and re-arms the monitor.
    pub fn note_activity(&mut self, now: Instant) {
        self.last_activity = Some(now);
        self.armed = true;
    }

    /// Start measuring from `now` without re-arming. Used when listening
    /// resumes after the system has spoken.
    pub fn restart_window(&mut self, now: Instant) {
        self.last_activity = Some(now);
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Returns the nudge to speak if the silence window has been exceeded.
    /// Fires at most once until [`note_activity`](Self::note_activity).
    pub fn check(&mut self, now: Instant, ctx: SilenceContext<'_>) -> Option<&'static str> {
        if !self.armed
            || !ctx.listening
            || !ctx.output_idle
            || !ctx.has_responded
            || ctx.turn_count >= self.max_turns
        {
            return None;
        }
        let first_missing = *ctx.missing.first()?;
        let last = self.last_activity?;
        if now.saturating_duration_since(last) < self.threshold {
            return None;
        }

        self.armed = false;
        debug!(
            silent_ms = now.saturating_duration_since(last).as_millis() as u64,
            "Silence threshold reached"
        );
        Some(presence_nudge(first_missing))
    }
}

pub fn presence_nudge(first_missing: FactField) -> &'static str {
    match first_missing {
        FactField::Deceased => DECEASED_PRESENCE_NUDGE,
        _ => GENERIC_PRESENCE_NUDGE,
    }
}
