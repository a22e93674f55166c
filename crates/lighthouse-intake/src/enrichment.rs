//! Interstate logistics research.
//!
//! Issued once at finalization when the user and the deceased are in
//! different places. The result is attached to the record when available and
//! is never required for completion.

use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use lighthouse_core::types::InterstateItinerary;

use crate::understanding::{strip_code_fences, CompletionRequest, UnderstandingService};

const RESEARCH_PROMPT: &str = "You help a grieving family plan how to bring a loved one \
home from another state. Given where the family is and where the deceased is, reply with \
a single JSON object: \"summary\" (one or two plain sentences), \"steps\" (ordered list of \
practical steps such as contacting a receiving funeral home, transport permits, and \
airline or ground transport), \"estimatedCost\" (a rough range as text, or null), and \
\"notes\" (list of short cautions). Be gentle and concrete.";

const RESEARCH_TEMPERATURE: f32 = 0.3;

pub struct InterstateResearcher {
    service: Arc<dyn UnderstandingService>,
}

impl InterstateResearcher {
    pub fn new(service: Arc<dyn UnderstandingService>) -> Self {
        Self { service }
    }

    /// Research transport logistics from `destination` (where the deceased
    /// is) back to `origin` (where the family is).
    pub async fn research(&self, origin: &str, destination: &str) -> Option<InterstateItinerary> {
        let request = CompletionRequest {
            system: RESEARCH_PROMPT.to_string(),
            user: format!(
                "The family is in {}. The deceased is in {}.",
                origin.trim(),
                destination.trim()
            ),
            temperature: RESEARCH_TEMPERATURE,
            json_output: true,
        };

        let raw = match self.service.complete(request).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Interstate research failed");
                return None;
            }
        };

        let itinerary = parse_itinerary(&raw)?;
        info!(steps = itinerary.steps.len(), "Interstate itinerary attached");
        Some(itinerary)
    }
}

/// Parse a research reply. Replies without a summary or any steps are
/// treated as no result.
pub fn parse_itinerary(raw: &str) -> Option<InterstateItinerary> {
    let value: Value = match serde_json::from_str(strip_code_fences(raw)) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "Interstate research reply was not valid JSON");
            return None;
        }
    };
    if !value.is_object() {
        return None;
    }
    let mut itinerary: InterstateItinerary = match serde_json::from_value(value) {
        Ok(itinerary) => itinerary,
        Err(e) => {
            warn!(error = %e, "Interstate research reply had an unexpected shape");
            return None;
        }
    };

    itinerary.summary = itinerary.summary.trim().to_string();
    itinerary.steps.retain(|step| !step.trim().is_empty());
    itinerary.notes.retain(|note| !note.trim().is_empty());
    itinerary.estimated_cost = itinerary
        .estimated_cost
        .map(|cost| cost.trim().to_string())
        .filter(|cost| !cost.is_empty());

    if itinerary.summary.is_empty() && itinerary.steps.is_empty() {
        return None;
    }
    Some(itinerary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IntakeError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Recording {
        reply: Option<String>,
        last_user: Mutex<Option<String>>,
    }

    #[async_trait]
    impl UnderstandingService for Recording {
        async fn complete(&self, request: CompletionRequest) -> Result<String, IntakeError> {
            *self.last_user.lock().unwrap() = Some(request.user);
            self.reply
                .clone()
                .ok_or_else(|| IntakeError::Understanding("connection reset".to_string()))
        }
    }

    #[tokio::test]
    async fn test_research_parses_itinerary() {
        let service = Arc::new(Recording {
            reply: Some(
                r#"```json
{"summary":"Transport from Reno to Austin.","steps":["Call a receiving funeral home","Arrange air transport",""],"estimatedCost":" $3,000-$6,000 ","notes":[]}
```"#
                    .to_string(),
            ),
            last_user: Mutex::new(None),
        });
        let researcher = InterstateResearcher::new(service.clone());

        let itinerary = researcher.research("Austin, TX", "Reno, NV").await.unwrap();
        assert_eq!(itinerary.summary, "Transport from Reno to Austin.");
        assert_eq!(itinerary.steps.len(), 2);
        assert_eq!(itinerary.estimated_cost.as_deref(), Some("$3,000-$6,000"));

        let user = service.last_user.lock().unwrap().clone().unwrap();
        assert!(user.contains("Austin, TX"));
        assert!(user.contains("Reno, NV"));
    }

    #[tokio::test]
    async fn test_research_failure_is_none() {
        let service = Arc::new(Recording {
            reply: None,
            last_user: Mutex::new(None),
        });
        let researcher = InterstateResearcher::new(service);
        assert!(researcher.research("Austin, TX", "Reno, NV").await.is_none());
    }

    #[test]
    fn test_empty_itinerary_is_none() {
        assert!(parse_itinerary(r#"{"summary":"  ","steps":[]}"#).is_none());
        assert!(parse_itinerary("not json").is_none());
        assert!(parse_itinerary(r#"["a"]"#).is_none());
    }
}
