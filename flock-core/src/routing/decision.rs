//! Scored routing decisions shared by the model-backed routers

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{HandOffMode, HandOffRequest};
use crate::parsing::{JsonParser, OutputParser};

/// Confidence assigned when the agent name is recovered from free text
pub const TEXT_MATCH_SCORE: f64 = 0.6;

/// A candidate choice with its confidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteDecision {
    #[serde(default)]
    pub next_agent: String,

    #[serde(default)]
    pub score: f64,

    #[serde(default)]
    pub reasoning: String,
}

impl RouteDecision {
    /// Read a decision from a JSON value. Accepts the decision itself or
    /// an object wrapping it under `hand_off`.
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value
            .get("hand_off")
            .filter(|v| v.is_object())
            .unwrap_or(value)
            .as_object()?;

        let next_agent = object.get("next_agent")?.as_str()?.trim().to_string();
        let score = match object.get("score") {
            Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
            Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
            _ => 0.0,
        };
        let reasoning = object
            .get("reasoning")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        Some(Self {
            next_agent,
            score,
            reasoning,
        })
    }

    /// Parse a raw model response.
    ///
    /// JSON is tried first. Otherwise the longest candidate name found in
    /// the text wins (ties go to the earlier candidate) with
    /// [`TEXT_MATCH_SCORE`]. Returns `None` when neither works.
    pub fn from_text(raw: &str, candidates: &[String]) -> Option<Self> {
        if let Some(decision) = JsonParser::new()
            .parse(raw)
            .ok()
            .and_then(|value| Self::from_value(&value))
        {
            return Some(decision);
        }

        let lowered = raw.to_lowercase();
        let mut ordered: Vec<&String> = candidates.iter().filter(|c| !c.is_empty()).collect();
        ordered.sort_by(|a, b| b.len().cmp(&a.len()));

        ordered
            .into_iter()
            .find(|name| lowered.contains(&name.to_lowercase()))
            .map(|name| Self {
                next_agent: name.clone(),
                score: TEXT_MATCH_SCORE,
                reasoning: "agent name matched in unstructured response".to_string(),
            })
    }

    /// Apply the confidence gate. Below the threshold the chain terminates.
    pub fn into_hand_off(self, threshold: f64, mode: HandOffMode, router: &str) -> HandOffRequest {
        if self.next_agent.is_empty() {
            tracing::info!(router = %router, "Router chose no next agent");
            return HandOffRequest::terminate();
        }
        if self.score < threshold {
            tracing::info!(
                router = %router,
                candidate = %self.next_agent,
                score = self.score,
                threshold,
                "Routing confidence below threshold, terminating"
            );
            return HandOffRequest::terminate();
        }

        tracing::info!(
            router = %router,
            next_agent = %self.next_agent,
            score = self.score,
            reasoning = %self.reasoning,
            "Routing decision accepted"
        );
        HandOffRequest::to(self.next_agent).with_mode(mode)
    }
}
