use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Enums
// =============================================================================

/// How much the user knows about the deceased's final wishes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WishesKnowledge {
    /// No idea what the deceased wanted.
    None,
    /// Some hints, nothing written down. Assumed when never resolved.
    #[default]
    Vague,
    /// Wishes are known or documented.
    Clear,
}

impl WishesKnowledge {
    /// Parse a loosely formatted value. Anything outside the three known
    /// levels is treated as absent.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "NONE" => Some(Self::None),
            "VAGUE" => Some(Self::Vague),
            "CLEAR" => Some(Self::Clear),
            _ => None,
        }
    }
}

impl fmt::Display for WishesKnowledge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WishesKnowledge::None => write!(f, "NONE"),
            WishesKnowledge::Vague => write!(f, "VAGUE"),
            WishesKnowledge::Clear => write!(f, "CLEAR"),
        }
    }
}

/// The facts that must be known before an intake can be finalized,
/// in the precedence order used for nudging.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactField {
    Name,
    Deceased,
    Relationship,
    Location,
}

impl FactField {
    /// Required fields in nudge precedence.
    pub const REQUIRED: [FactField; 4] = [
        FactField::Name,
        FactField::Deceased,
        FactField::Relationship,
        FactField::Location,
    ];
}

impl fmt::Display for FactField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FactField::Name => write!(f, "name"),
            FactField::Deceased => write!(f, "deceased"),
            FactField::Relationship => write!(f, "relationship"),
            FactField::Location => write!(f, "location"),
        }
    }
}

/// Where the deceased is, normalized for logistics planning.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeceasedLocationKind {
    Home,
    Hospital,
    OutOfState,
    #[default]
    Unknown,
}

// =============================================================================
// Intake facts
// =============================================================================

/// Structured facts extracted from the user's narrative.
///
/// Every field stays `None` until something non-empty is extracted for it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IntakeFacts {
    pub name: Option<String>,
    pub deceased_name: Option<String>,
    pub relationship: Option<String>,
    pub user_location: Option<String>,
    pub deceased_location: Option<String>,
    pub wishes_knowledge: Option<WishesKnowledge>,
}

impl IntakeFacts {
    /// Merge a newer extraction into these facts.
    ///
    /// A non-empty value replaces the current one; absent or blank values
    /// never clear a known fact. Returns the number of fields that changed.
    pub fn merge(&mut self, newer: &IntakeFacts) -> usize {
        let mut changed = 0;
        changed += merge_field(&mut self.name, &newer.name);
        changed += merge_field(&mut self.deceased_name, &newer.deceased_name);
        changed += merge_field(&mut self.relationship, &newer.relationship);
        changed += merge_field(&mut self.user_location, &newer.user_location);
        changed += merge_field(&mut self.deceased_location, &newer.deceased_location);
        if let Some(level) = newer.wishes_knowledge {
            if self.wishes_knowledge != Some(level) {
                self.wishes_knowledge = Some(level);
                changed += 1;
            }
        }
        changed
    }

    /// Value of a required field, if it holds something non-blank.
    pub fn get(&self, field: FactField) -> Option<&str> {
        let value = match field {
            FactField::Name => &self.name,
            FactField::Deceased => &self.deceased_name,
            FactField::Relationship => &self.relationship,
            FactField::Location => &self.user_location,
        };
        value.as_deref().map(str::trim).filter(|v| !v.is_empty())
    }

    pub fn has(&self, field: FactField) -> bool {
        self.get(field).is_some()
    }

    /// True when nothing at all has been extracted.
    pub fn is_empty(&self) -> bool {
        self == &IntakeFacts::default()
    }
}

fn merge_field(current: &mut Option<String>, newer: &Option<String>) -> usize {
    match newer.as_deref().map(str::trim) {
        Some(value) if !value.is_empty() => {
            if current.as_deref() == Some(value) {
                0
            } else {
                *current = Some(value.to_string());
                1
            }
        }
        _ => 0,
    }
}

// =============================================================================
// Conversation
// =============================================================================

/// One exchange between the user and the intake engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationTurn {
    /// Monotonically increasing, starting at 1.
    pub index: u32,
    pub utterance: String,
    /// Facts extracted from this utterance alone.
    pub extracted: IntakeFacts,
    pub response: String,
}

/// Durable snapshot of an intake session's progress.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    /// Everything the user has said so far, space separated.
    pub transcript: String,
    /// System responses in the order they were produced.
    pub responses: Vec<String>,
    pub facts: IntakeFacts,
    /// Milliseconds since the Unix epoch.
    pub last_update: i64,
    pub version: u64,
}

impl Checkpoint {
    pub fn last_update_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.last_update).unwrap_or_default()
    }

    /// Whether this checkpoint is too old to be offered for restore.
    pub fn is_stale(&self, now: DateTime<Utc>, max_age: chrono::Duration) -> bool {
        now - self.last_update_at() > max_age
    }
}

// =============================================================================
// Finalized record
// =============================================================================

/// Cognitive-load estimate derived from the final transcript.
///
/// Invariant: always within 1..=5.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BrainFogScore(u8);

impl BrainFogScore {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    /// Build a score, clamping into the valid range.
    pub fn new(value: u8) -> Self {
        Self(value.clamp(Self::MIN, Self::MAX))
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

/// Travel and transport plan returned by the interstate enrichment call.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InterstateItinerary {
    pub summary: String,
    pub steps: Vec<String>,
    pub estimated_cost: Option<String>,
    pub notes: Vec<String>,
}

/// The completed intake handed to the rest of the application.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntakeRecord {
    pub name: String,
    pub deceased_name: String,
    pub relationship: String,
    pub user_location: String,
    pub deceased_location: DeceasedLocationKind,
    pub wishes_knowledge_level: WishesKnowledge,
    pub initial_story_transcript: String,
    pub brain_fog_level: BrainFogScore,
    pub interstate_itinerary: Option<InterstateItinerary>,
    pub completed_at: DateTime<Utc>,
}

/// Build the story transcript stored on the record: the user's words
/// followed by the last thing the system said.
pub fn story_transcript(transcript: &str, last_response: Option<&str>) -> String {
    let mut story = format!("User: {}", transcript.trim());
    if let Some(response) = last_response.filter(|r| !r.trim().is_empty()) {
        story.push_str("\n\n");
        story.push_str(response.trim());
    }
    story
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facts(name: Option<&str>, deceased: Option<&str>) -> IntakeFacts {
        IntakeFacts {
            name: name.map(String::from),
            deceased_name: deceased.map(String::from),
            ..IntakeFacts::default()
        }
    }

    #[test]
    fn test_wishes_knowledge_parse() {
        assert_eq!(WishesKnowledge::parse("CLEAR"), Some(WishesKnowledge::Clear));
        assert_eq!(WishesKnowledge::parse(" vague "), Some(WishesKnowledge::Vague));
        assert_eq!(WishesKnowledge::parse("none"), Some(WishesKnowledge::None));
        assert_eq!(WishesKnowledge::parse("SOMEWHAT"), None);
        assert_eq!(WishesKnowledge::parse(""), None);
        assert_eq!(WishesKnowledge::default(), WishesKnowledge::Vague);
    }

    #[test]
    fn test_wishes_knowledge_serialization() {
        let json = serde_json::to_string(&WishesKnowledge::Clear).unwrap();
        assert_eq!(json, "\"CLEAR\"");
    }

    #[test]
    fn test_merge_replaces_with_non_empty() {
        let mut current = facts(Some("Sam"), None);
        let changed = current.merge(&facts(Some("Samantha"), Some("Lee")));
        assert_eq!(changed, 2);
        assert_eq!(current.name.as_deref(), Some("Samantha"));
        assert_eq!(current.deceased_name.as_deref(), Some("Lee"));
    }

    #[test]
    fn test_merge_never_clears() {
        let mut current = facts(Some("Sam"), Some("Lee"));
        let before = current.clone();

        assert_eq!(current.merge(&IntakeFacts::default()), 0);
        assert_eq!(current.merge(&facts(Some(""), Some("   "))), 0);
        assert_eq!(current, before);
    }

    #[test]
    fn test_merge_same_value_is_not_a_change() {
        let mut current = facts(Some("Sam"), None);
        assert_eq!(current.merge(&facts(Some(" Sam "), None)), 0);
    }

    #[test]
    fn test_merge_wishes_knowledge() {
        let mut current = IntakeFacts::default();
        let newer = IntakeFacts {
            wishes_knowledge: Some(WishesKnowledge::Clear),
            ..IntakeFacts::default()
        };
        assert_eq!(current.merge(&newer), 1);
        assert_eq!(current.merge(&IntakeFacts::default()), 0);
        assert_eq!(current.wishes_knowledge, Some(WishesKnowledge::Clear));
    }

    #[test]
    fn test_get_ignores_blank_values() {
        let current = IntakeFacts {
            relationship: Some("  ".to_string()),
            user_location: Some("Austin, TX".to_string()),
            ..IntakeFacts::default()
        };
        assert!(!current.has(FactField::Relationship));
        assert_eq!(current.get(FactField::Location), Some("Austin, TX"));
    }

    #[test]
    fn test_facts_json_shape() {
        let current = IntakeFacts {
            deceased_name: Some("Lee".to_string()),
            wishes_knowledge: Some(WishesKnowledge::None),
            ..IntakeFacts::default()
        };
        let value = serde_json::to_value(&current).unwrap();
        assert_eq!(value["deceasedName"], "Lee");
        assert_eq!(value["wishesKnowledge"], "NONE");
        assert!(value["userLocation"].is_null());
    }

    #[test]
    fn test_checkpoint_staleness() {
        let now = Utc::now();
        let checkpoint = Checkpoint {
            transcript: String::new(),
            responses: vec![],
            facts: IntakeFacts::default(),
            last_update: (now - chrono::Duration::hours(25)).timestamp_millis(),
            version: 3,
        };
        assert!(checkpoint.is_stale(now, chrono::Duration::hours(24)));
        assert!(!checkpoint.is_stale(now, chrono::Duration::hours(48)));
    }

    #[test]
    fn test_checkpoint_json_uses_camel_case() {
        let checkpoint = Checkpoint {
            transcript: "hello".to_string(),
            responses: vec!["hi".to_string()],
            facts: IntakeFacts::default(),
            last_update: 1_700_000_000_000,
            version: 1,
        };
        let json = serde_json::to_string(&checkpoint).unwrap();
        assert!(json.contains("\"lastUpdate\":1700000000000"));
        let back: Checkpoint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, checkpoint);
    }

    #[test]
    fn test_brain_fog_score_clamps() {
        assert_eq!(BrainFogScore::new(0).value(), 1);
        assert_eq!(BrainFogScore::new(3).value(), 3);
        assert_eq!(BrainFogScore::new(9).value(), 5);
    }

    #[test]
    fn test_story_transcript() {
        assert_eq!(
            story_transcript("my dad died", Some("I'm so sorry.")),
            "User: my dad died\n\nI'm so sorry."
        );
        assert_eq!(story_transcript(" my dad died ", None), "User: my dad died");
    }

    #[test]
    fn test_deceased_location_serialization() {
        let json = serde_json::to_string(&DeceasedLocationKind::OutOfState).unwrap();
        assert_eq!(json, "\"OUT_OF_STATE\"");
        assert_eq!(DeceasedLocationKind::default(), DeceasedLocationKind::Unknown);
    }
}
