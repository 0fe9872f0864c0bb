//! Decision engines.
//!
//! [`ChatDecisionEngine`] sends each request to an OpenAI-compatible
//! chat-completions endpoint and parses the JSON reply. [`FallbackEngine`]
//! answers locally with the most conservative decision for each request.

pub mod chat;
pub mod fallback;
pub mod parse;
pub mod prompt;

use std::sync::Arc;

use optdesk_core::{DecisionConfig, DecisionEngine, DecisionKind};

pub use chat::ChatDecisionEngine;
pub use fallback::FallbackEngine;
pub use parse::{extract_json, interpret};

/// Builds the engine selected in config.
///
/// # Errors
///
/// Returns an error if the chat engine is selected but cannot be constructed.
pub fn build_engine(config: &DecisionConfig) -> anyhow::Result<Arc<dyn DecisionEngine>> {
    Ok(match config.kind {
        DecisionKind::Chat => Arc::new(ChatDecisionEngine::from_config(config)?),
        DecisionKind::Fallback => Arc::new(FallbackEngine::new()),
    })
}
