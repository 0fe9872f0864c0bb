//! Turning model output into a typed [`Decision`].
//!
//! Models are asked for bare JSON but sometimes wrap it in prose or a code
//! fence, so extraction tries the whole reply, then a fenced block, then the
//! outermost braces. Entries that reference ids not present in the request
//! are dropped.

use std::collections::HashSet;

use optdesk_core::{
    ActionKind, Decision, DecisionRequest, ExternalError, ExternalResult, ManagementAction,
    OpportunityId, PositionId, RankedOpportunity, RiskAssessment,
};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

const MAX_ALERT_LEVEL: u8 = 10;

/// Finds the JSON object in a model reply.
#[must_use]
pub fn extract_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return value.is_object().then_some(value);
    }

    if let Some(fenced) = fenced_block(trimmed) {
        if let Ok(value) = serde_json::from_str::<Value>(fenced) {
            if value.is_object() {
                return Some(value);
            }
        }
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<Value>(&trimmed[start..=end])
        .ok()
        .filter(Value::is_object)
}

fn fenced_block(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after = &text[open + 3..];
    // skip an optional language tag
    let body_start = after.find('\n').map_or(0, |i| i + 1);
    let body = &after[body_start..];
    let close = body.find("```")?;
    Some(body[..close].trim())
}

// =============================================================================
// Wire shapes
// =============================================================================

#[derive(Debug, Deserialize)]
struct ManagementReply {
    #[serde(default)]
    actions: Vec<ActionReply>,
}

#[derive(Debug, Deserialize)]
struct ActionReply {
    position_id: String,
    action: String,
    #[serde(default = "default_confidence")]
    confidence: f64,
    #[serde(default)]
    rationale: String,
}

#[derive(Debug, Deserialize)]
struct RankingReply {
    #[serde(default, alias = "opportunities")]
    ranking: Vec<RankReply>,
}

#[derive(Debug, Deserialize)]
struct RankReply {
    opportunity_id: String,
    #[serde(default = "default_confidence")]
    confidence: f64,
    #[serde(default)]
    rationale: String,
}

#[derive(Debug, Deserialize)]
struct RiskReply {
    alert_level: f64,
    #[serde(default, alias = "message")]
    summary: String,
    #[serde(default)]
    concerns: Vec<String>,
}

const fn default_confidence() -> f64 {
    0.5
}

fn clamp_confidence(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn parse_action(raw: &str) -> Option<ActionKind> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "hold" => Some(ActionKind::Hold),
        "close" => Some(ActionKind::Close),
        "roll" => Some(ActionKind::Roll),
        "adjust" => Some(ActionKind::Adjust),
        _ => None,
    }
}

fn malformed(kind: &str, err: &serde_json::Error) -> ExternalError {
    ExternalError::invalid_data(format!("{kind} reply does not match schema: {err}"))
}

// =============================================================================
// Interpretation
// =============================================================================

/// Maps a model reply onto the decision variant matching `request`.
///
/// # Errors
///
/// Returns [`ExternalError::InvalidData`] if no JSON object can be found or
/// it does not match the expected schema.
pub fn interpret(request: &DecisionRequest, content: &str) -> ExternalResult<Decision> {
    let value = extract_json(content).ok_or_else(|| {
        ExternalError::invalid_data(format!("no JSON object in {} reply", request.kind()))
    })?;

    match request {
        DecisionRequest::ManagePositions { positions } => {
            let reply: ManagementReply =
                serde_json::from_value(value).map_err(|e| malformed(request.kind(), &e))?;
            let known: HashSet<&str> = positions.iter().map(|p| p.position_id.as_str()).collect();
            let actions = reply
                .actions
                .into_iter()
                .filter_map(|a| {
                    if !known.contains(a.position_id.as_str()) {
                        debug!(position_id = %a.position_id, "Dropping action for unknown position");
                        return None;
                    }
                    let action = parse_action(&a.action)?;
                    Some(ManagementAction {
                        position_id: PositionId::new(a.position_id),
                        action,
                        confidence: clamp_confidence(a.confidence),
                        rationale: a.rationale,
                    })
                })
                .collect();
            Ok(Decision::Management { actions })
        }
        DecisionRequest::PrioritizeOpportunities { opportunities } => {
            let reply: RankingReply =
                serde_json::from_value(value).map_err(|e| malformed(request.kind(), &e))?;
            let known: HashSet<OpportunityId> =
                opportunities.iter().map(|o| o.opportunity_id).collect();
            let mut seen = HashSet::new();
            let ranking = reply
                .ranking
                .into_iter()
                .filter_map(|r| {
                    let id: OpportunityId =
                        serde_json::from_value(Value::String(r.opportunity_id)).ok()?;
                    (known.contains(&id) && seen.insert(id)).then(|| RankedOpportunity {
                        opportunity_id: id,
                        confidence: clamp_confidence(r.confidence),
                        rationale: r.rationale,
                    })
                })
                .collect();
            Ok(Decision::Prioritization { ranking })
        }
        DecisionRequest::AssessRisk { .. } => {
            let reply: RiskReply =
                serde_json::from_value(value).map_err(|e| malformed(request.kind(), &e))?;
            if !reply.alert_level.is_finite() {
                return Err(ExternalError::invalid_data("alert_level is not a number"));
            }
            let level = reply.alert_level.round().clamp(0.0, f64::from(MAX_ALERT_LEVEL));
            Ok(Decision::Risk(RiskAssessment {
                // clamped to 0..=10 above
                alert_level: level as u8,
                summary: reply.summary,
                concerns: reply.concerns,
            }))
        }
    }
}
