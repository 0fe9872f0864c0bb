//! System and user prompts for each request kind.

use optdesk_core::DecisionRequest;

const BASE: &str = "You are an options risk analyst managing a small account that trades \
only defined-risk spreads (credit spreads, debit spreads, iron condors). \
Prioritise defined risk, high-probability setups, strict position sizing and \
diversification across underlyings and strategies. \
Reply with a single JSON object and nothing else.";

const MANAGE: &str = "Task: decide, for each position, whether to hold, close, roll or adjust. \
Reply as {\"actions\": [{\"position_id\": string, \"action\": \"hold\"|\"close\"|\"roll\"|\"adjust\", \
\"confidence\": number between 0 and 1, \"rationale\": string}]}. \
Include every position exactly once.";

const PRIORITIZE: &str = "Task: rank the candidate trades from best to worst risk-adjusted \
opportunity, leaving out any you would not take. \
Reply as {\"ranking\": [{\"opportunity_id\": string, \"confidence\": number between 0 and 1, \
\"rationale\": string}]}.";

const ASSESS: &str = "Task: assess portfolio-level risk from Greeks exposure, concentration \
and the volatility index. \
Reply as {\"alert_level\": integer 0-10, \"summary\": string, \"concerns\": [string]}.";

#[must_use]
pub fn system_prompt(request: &DecisionRequest) -> String {
    let task = match request {
        DecisionRequest::ManagePositions { .. } => MANAGE,
        DecisionRequest::PrioritizeOpportunities { .. } => PRIORITIZE,
        DecisionRequest::AssessRisk { .. } => ASSESS,
    };
    format!("{BASE}\n\n{task}")
}

/// The request payload as pretty JSON.
///
/// # Errors
///
/// Returns an error if the request cannot be serialized.
pub fn user_prompt(request: &DecisionRequest) -> serde_json::Result<String> {
    let body = match request {
        DecisionRequest::ManagePositions { positions } => serde_json::to_string_pretty(positions)?,
        DecisionRequest::PrioritizeOpportunities { opportunities } => {
            serde_json::to_string_pretty(opportunities)?
        }
        DecisionRequest::AssessRisk { portfolio } => serde_json::to_string_pretty(portfolio)?,
    };
    let label = match request {
        DecisionRequest::ManagePositions { .. } => "Open positions",
        DecisionRequest::PrioritizeOpportunities { .. } => "Candidate trades",
        DecisionRequest::AssessRisk { .. } => "Portfolio",
    };
    Ok(format!("{label}:\n{body}"))
}
