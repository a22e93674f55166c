//! Completion policy: what is still missing, and what (if anything) to say
//! about it.

use lighthouse_core::types::{FactField, IntakeFacts};

/// Fixed response used until the user has had room to tell their story.
pub const LISTENING_PHRASE: &str = "I'm listening. Take all the time you need.";

/// Required fields that are still empty, in nudge precedence.
pub fn missing_fields(facts: &IntakeFacts) -> Vec<FactField> {
    FactField::REQUIRED
        .iter()
        .copied()
        .filter(|field| !facts.has(*field))
        .collect()
}

pub fn is_complete(facts: &IntakeFacts) -> bool {
    missing_fields(facts).is_empty()
}

/// The canned clarifying question for one field.
pub fn clarifying_phrase(field: FactField) -> &'static str {
    match field {
        FactField::Deceased => "who did you lose?",
        FactField::Name => "what should I call you?",
        FactField::Relationship => "how were you related to them?",
        FactField::Location => "where are you located right now?",
    }
}

/// Nudge for the highest-precedence missing field.
pub fn nudge_for(missing: &[FactField]) -> Option<String> {
    let first = missing.first()?;
    Some(format!(
        "Thank you for sharing that with me. If you don't mind me asking, {}",
        clarifying_phrase(*first)
    ))
}

/// Response after a turn that did not complete the intake.
///
/// `completed_turns` is the number of turns finished before this one.
pub fn policy_response(missing: &[FactField], completed_turns: u32, nudge_after: u32) -> String {
    if completed_turns < nudge_after {
        return LISTENING_PHRASE.to_string();
    }
    nudge_for(missing).unwrap_or_else(|| LISTENING_PHRASE.to_string())
}

/// Closing acknowledgment spoken when every required fact is known.
pub fn closing_acknowledgment(facts: &IntakeFacts) -> String {
    match (facts.get(FactField::Name), facts.get(FactField::Deceased)) {
        (Some(name), Some(deceased)) => format!(
            "Thank you, {}. I have what I need to start helping you with everything for {}. Give me just a moment.",
            name, deceased
        ),
        _ => "Thank you. I have what I need to start helping you. Give me just a moment.".to_string(),
    }
}
