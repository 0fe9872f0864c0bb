//! Opportunity discovery: scan, score, let the engine rank, replace the queue.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use optdesk_core::{
    Decision, DecisionEngine, DecisionRequest, ExternalError, MarketScanner, Opportunity,
    OpportunityBrief, OpportunityCandidate, OpportunityId, RankedOpportunity, SharedState,
};
use optdesk_scheduler::{TickOutcome, WorkUnit};
use tracing::{debug, info, warn};

use crate::scoring::OpportunityScorer;

pub struct OpportunityDiscovery {
    state: Arc<SharedState>,
    scanner: Arc<dyn MarketScanner>,
    engine: Arc<dyn DecisionEngine>,
    scorer: OpportunityScorer,
    queue_capacity: usize,
    scan_timeout: Duration,
}

impl OpportunityDiscovery {
    #[must_use]
    pub fn new(
        state: Arc<SharedState>,
        scanner: Arc<dyn MarketScanner>,
        engine: Arc<dyn DecisionEngine>,
        scorer: OpportunityScorer,
        queue_capacity: usize,
        scan_timeout: Duration,
    ) -> Self {
        Self {
            state,
            scanner,
            engine,
            scorer,
            queue_capacity,
            scan_timeout,
        }
    }

    /// Scores every candidate, best first. Discarded candidates are logged.
    fn score_all(&self, candidates: Vec<OpportunityCandidate>, now: DateTime<Utc>) -> Vec<Opportunity> {
        let total = candidates.len();
        let mut scored: Vec<Opportunity> = candidates
            .into_iter()
            .filter_map(|candidate| {
                let label = format!("{} {}", candidate.symbol, candidate.strategy);
                self.scorer
                    .score(candidate, now)
                    .inspect_err(|reason| debug!(candidate = %label, %reason, "Candidate discarded"))
                    .ok()
            })
            .collect();
        scored.sort_by(|a, b| b.score().total_cmp(&a.score()));
        debug!(candidates = total, scored = scored.len(), "Candidates scored");
        scored
    }

    /// Applies the engine's ranking: ranked entries first in the engine's
    /// order, carrying its confidence, then the rest in local order.
    fn apply_ranking(
        &self,
        scored: Vec<Opportunity>,
        ranking: Vec<RankedOpportunity>,
        now: DateTime<Utc>,
    ) -> Vec<Opportunity> {
        let mut by_id: HashMap<OpportunityId, Opportunity> =
            scored.iter().map(|o| (o.id(), o.clone())).collect();

        let mut ordered = Vec::with_capacity(scored.len());
        for ranked in ranking {
            if let Some(opportunity) = by_id.remove(&ranked.opportunity_id) {
                ordered.push(self.scorer.with_confidence(&opportunity, ranked.confidence, now));
            }
        }
        ordered.extend(scored.into_iter().filter(|o| by_id.contains_key(&o.id())));
        ordered
    }

    async fn prioritise(&self, scored: Vec<Opportunity>, now: DateTime<Utc>) -> Vec<Opportunity> {
        let briefs = scored
            .iter()
            .map(|o| OpportunityBrief {
                opportunity_id: o.id(),
                symbol: o.symbol().to_string(),
                strategy: o.strategy(),
                score: o.score(),
                probability_of_profit: o.metrics().probability_of_profit,
                expected_value: o.metrics().expected_value,
                max_loss: o.metrics().max_loss,
                implied_vol: o.metrics().implied_vol,
            })
            .collect();

        match self
            .engine
            .decide(DecisionRequest::PrioritizeOpportunities { opportunities: briefs })
            .await
        {
            Ok(Decision::Prioritization { ranking }) if !ranking.is_empty() => {
                self.apply_ranking(scored, ranking, now)
            }
            Ok(Decision::Prioritization { .. }) => scored,
            Ok(other) => {
                warn!(engine = self.engine.name(), ?other, "Engine answered the wrong request, using local order");
                scored
            }
            Err(e) => {
                warn!(engine = self.engine.name(), error = %e, "Prioritisation failed, using local order");
                scored
            }
        }
    }
}

#[async_trait]
impl WorkUnit for OpportunityDiscovery {
    fn name(&self) -> &str {
        "opportunity_discovery"
    }

    async fn run_tick(&self) -> anyhow::Result<TickOutcome> {
        let candidates = tokio::time::timeout(self.scan_timeout, self.scanner.scan())
            .await
            .map_err(|_| ExternalError::timeout("scan", self.scan_timeout))
            .and_then(|scan| scan)
            .context("market scan failed")?;

        let now = Utc::now();
        let scanned = candidates.len();
        let scored = self.score_all(candidates, now);
        let mut queue = if scored.is_empty() {
            scored
        } else {
            self.prioritise(scored, now).await
        };
        queue.truncate(self.queue_capacity);

        let queued = queue.len();
        let top = queue.first().map(|o| format!("{} {} ({:.3})", o.symbol(), o.strategy(), o.score()));
        let superseded = self.state.enqueue_opportunities(queue);
        info!(
            scanned,
            queued,
            superseded,
            top = top.as_deref().unwrap_or("none"),
            "Opportunity queue replaced"
        );
        Ok(TickOutcome::Completed)
    }
}
