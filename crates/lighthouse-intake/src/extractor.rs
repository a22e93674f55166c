//! Fact extraction from a single utterance.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use lighthouse_core::types::{IntakeFacts, WishesKnowledge};

use crate::understanding::{strip_code_fences, CompletionRequest, UnderstandingService};

/// Default sampling temperature for extraction. Kept low for stable output.
pub const EXTRACTION_TEMPERATURE: f32 = 0.1;

const EXTRACTION_PROMPT: &str = "You help a bereavement support service gently collect \
information from a grieving person's own words. From the user's message, extract only \
what they actually said. Respond with a single JSON object with these keys: \
\"name\" (the user's own name), \"deceasedName\" (the name of the person who died), \
\"relationship\" (how the deceased was related to the user, e.g. mother, husband), \
\"userLocation\" (where the user is, city and state), \"deceasedLocation\" (where the \
deceased is now, e.g. at home, a hospital, or a city and state), and \"wishesKnowledge\" \
(one of NONE, VAGUE, CLEAR describing how well the user knows the deceased's final \
wishes). Use null for anything not mentioned. Never guess.";

/// Values the model uses to mean "not mentioned".
const PLACEHOLDERS: [&str; 5] = ["null", "none", "unknown", "n/a", "undefined"];

/// Loose shape of the model's reply. Every field is optional and untyped so
/// that one malformed value never discards the rest.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ExtractionPayload {
    #[serde(alias = "userName", alias = "user_name")]
    name: Option<Value>,
    #[serde(rename = "deceasedName", alias = "deceased_name", alias = "deceased")]
    deceased_name: Option<Value>,
    relationship: Option<Value>,
    #[serde(rename = "userLocation", alias = "user_location", alias = "location")]
    user_location: Option<Value>,
    #[serde(rename = "deceasedLocation", alias = "deceased_location")]
    deceased_location: Option<Value>,
    #[serde(
        rename = "wishesKnowledge",
        alias = "wishes_knowledge",
        alias = "wishesKnowledgeLevel"
    )]
    wishes_knowledge: Option<Value>,
}

impl ExtractionPayload {
    fn into_facts(self) -> IntakeFacts {
        IntakeFacts {
            name: coerce_text(self.name),
            deceased_name: coerce_text(self.deceased_name),
            relationship: coerce_text(self.relationship),
            user_location: coerce_text(self.user_location),
            deceased_location: coerce_text(self.deceased_location),
            wishes_knowledge: self
                .wishes_knowledge
                .as_ref()
                .and_then(Value::as_str)
                .and_then(WishesKnowledge::parse),
        }
    }
}

fn coerce_text(value: Option<Value>) -> Option<String> {
    let text = match value? {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    let text = text.trim();
    if text.is_empty() || PLACEHOLDERS.contains(&text.to_ascii_lowercase().as_str()) {
        return None;
    }
    Some(text.to_string())
}

/// Parse a raw model reply into facts. Unparsable content yields `None`.
pub fn parse_extraction(raw: &str) -> Option<IntakeFacts> {
    let body = strip_code_fences(raw);
    let value: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "Extraction reply was not valid JSON");
            return None;
        }
    };
    if !value.is_object() {
        warn!("Extraction reply was not a JSON object");
        return None;
    }
    match serde_json::from_value::<ExtractionPayload>(value) {
        Ok(payload) => Some(payload.into_facts()),
        Err(e) => {
            warn!(error = %e, "Extraction reply had an unexpected shape");
            None
        }
    }
}

/// Turns one utterance into a best-effort partial fact record.
pub struct EntityExtractor {
    service: Arc<dyn UnderstandingService>,
    temperature: f32,
}

impl EntityExtractor {
    pub fn new(service: Arc<dyn UnderstandingService>) -> Self {
        Self {
            service,
            temperature: EXTRACTION_TEMPERATURE,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    /// Extract facts from `utterance`.
    ///
    /// Never fails: transport and parse errors are logged and produce an
    /// empty record.
    pub async fn extract(&self, utterance: &str) -> IntakeFacts {
        let utterance = utterance.trim();
        if utterance.is_empty() {
            return IntakeFacts::default();
        }

        let request = CompletionRequest {
            system: EXTRACTION_PROMPT.to_string(),
            user: utterance.to_string(),
            temperature: self.temperature,
            json_output: true,
        };

        let raw = match self.service.complete(request).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Fact extraction failed; treating as empty");
                return IntakeFacts::default();
            }
        };

        let facts = parse_extraction(&raw).unwrap_or_default();
        debug!(empty = facts.is_empty(), "Facts extracted");
        facts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IntakeError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Scripted {
        reply: Result<String, IntakeError>,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl Scripted {
        fn ok(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(reply.to_string()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: Err(IntakeError::Understanding("status 503".to_string())),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl UnderstandingService for Scripted {
        async fn complete(&self, request: CompletionRequest) -> Result<String, IntakeError> {
            self.requests.lock().unwrap().push(request);
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(e) => Err(IntakeError::Understanding(e.to_string())),
            }
        }
    }

    #[tokio::test]
    async fn test_extract_full_reply() {
        let service = Scripted::ok(
            r#"{"name":"Sam","deceasedName":"Lee","relationship":"spouse",
                "userLocation":"Austin, TX","deceasedLocation":"St. David's Hospital",
                "wishesKnowledge":"clear"}"#,
        );
        let extractor = EntityExtractor::new(service.clone());
        let facts = extractor.extract("I'm Sam, my wife Lee died.").await;

        assert_eq!(facts.name.as_deref(), Some("Sam"));
        assert_eq!(facts.deceased_name.as_deref(), Some("Lee"));
        assert_eq!(facts.relationship.as_deref(), Some("spouse"));
        assert_eq!(facts.user_location.as_deref(), Some("Austin, TX"));
        assert_eq!(facts.wishes_knowledge, Some(WishesKnowledge::Clear));
        assert_eq!(service.calls(), 1);

        let request = service.requests.lock().unwrap()[0].clone();
        assert!(request.json_output);
        assert!((request.temperature - EXTRACTION_TEMPERATURE).abs() < f32::EPSILON);
        assert_eq!(request.user, "I'm Sam, my wife Lee died.");
    }

    #[tokio::test]
    async fn test_configured_temperature_is_sent() {
        let service = Scripted::ok("{}");
        let extractor = EntityExtractor::new(service.clone()).with_temperature(0.25);
        assert!((extractor.temperature() - 0.25).abs() < f32::EPSILON);

        extractor.extract("my dad passed").await;
        let request = service.requests.lock().unwrap()[0].clone();
        assert!((request.temperature - 0.25).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_extract_strips_code_fences() {
        let service = Scripted::ok("```json\n{\"deceasedName\": \"Rosa\"}\n```");
        let facts = EntityExtractor::new(service).extract("my mom Rosa").await;
        assert_eq!(facts.deceased_name.as_deref(), Some("Rosa"));
    }

    #[tokio::test]
    async fn test_extract_failure_is_empty() {
        let service = Scripted::failing();
        let facts = EntityExtractor::new(service.clone()).extract("hello").await;
        assert!(facts.is_empty());
        assert_eq!(service.calls(), 1);
    }

    #[tokio::test]
    async fn test_extract_unparsable_is_empty() {
        let service = Scripted::ok("I'm sorry, I can't help with that.");
        let facts = EntityExtractor::new(service).extract("hello").await;
        assert!(facts.is_empty());
    }

    #[tokio::test]
    async fn test_blank_utterance_skips_call() {
        let service = Scripted::ok("{}");
        let facts = EntityExtractor::new(service.clone()).extract("   ").await;
        assert!(facts.is_empty());
        assert_eq!(service.calls(), 0);
    }

    #[test]
    fn test_invalid_wishes_value_is_absent() {
        let facts = parse_extraction(r#"{"wishesKnowledge":"SOMEWHAT","name":"Sam"}"#).unwrap();
        assert_eq!(facts.wishes_knowledge, None);
        assert_eq!(facts.name.as_deref(), Some("Sam"));

        let facts = parse_extraction(r#"{"wishesKnowledge":3}"#).unwrap();
        assert_eq!(facts.wishes_knowledge, None);
    }

    #[test]
    fn test_placeholders_and_wrong_types_are_absent() {
        let facts = parse_extraction(
            r#"{"name":"unknown","deceasedName":null,"relationship":"  ",
                "userLocation":["Austin"],"deceasedLocation":"N/A"}"#,
        )
        .unwrap();
        assert!(facts.is_empty());
    }

    #[test]
    fn test_snake_case_aliases_accepted() {
        let facts = parse_extraction(r#"{"deceased_name":"Lee","user_location":"Reno, NV"}"#)
            .unwrap();
        assert_eq!(facts.deceased_name.as_deref(), Some("Lee"));
        assert_eq!(facts.user_location.as_deref(), Some("Reno, NV"));
    }

    #[test]
    fn test_non_object_reply_is_none() {
        assert!(parse_extraction("[1, 2, 3]").is_none());
        assert!(parse_extraction("").is_none());
    }
}
