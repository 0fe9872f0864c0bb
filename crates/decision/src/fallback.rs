use async_trait::async_trait;
use optdesk_core::{
    ActionKind, Decision, DecisionEngine, DecisionRequest, ExternalResult, ManagementAction,
    RiskAssessment,
};

const HOLD_CONFIDENCE: f64 = 0.5;

/// Engine that never calls out: holds every position, offers no ranking and
/// reports no portfolio risk. Used when no chat engine is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackEngine;

impl FallbackEngine {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DecisionEngine for FallbackEngine {
    async fn decide(&self, request: DecisionRequest) -> ExternalResult<Decision> {
        Ok(match request {
            DecisionRequest::ManagePositions { positions } => Decision::Management {
                actions: positions
                    .into_iter()
                    .map(|p| ManagementAction {
                        position_id: p.position_id,
                        action: ActionKind::Hold,
                        confidence: HOLD_CONFIDENCE,
                        rationale: "no decision engine configured".to_string(),
                    })
                    .collect(),
            },
            DecisionRequest::PrioritizeOpportunities { .. } => Decision::Prioritization {
                ranking: Vec::new(),
            },
            DecisionRequest::AssessRisk { .. } => Decision::Risk(RiskAssessment {
                alert_level: 0,
                summary: "no risk assessment available".to_string(),
                concerns: Vec::new(),
            }),
        })
    }

    fn name(&self) -> &str {
        "fallback"
    }
}
