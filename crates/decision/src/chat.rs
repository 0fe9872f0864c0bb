//! OpenAI-compatible chat-completions decision engine.

use std::time::Duration;

use async_trait::async_trait;
use optdesk_core::{Decision, DecisionConfig, DecisionEngine, DecisionRequest, ExternalError, ExternalResult};
use optdesk_endpoints::{handle_response, map_reqwest_error};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::parse::interpret;
use crate::prompt::{system_prompt, user_prompt};

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [Message; 2],
    temperature: f64,
    max_tokens: u32,
}

#[derive(Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct ChatDecisionEngine {
    http: Client,
    endpoint: String,
    api_key: SecretString,
    model: String,
    temperature: f64,
    max_tokens: u32,
}

impl ChatDecisionEngine {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        base_url: &str,
        api_key: SecretString,
        model: impl Into<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            http: Client::builder().timeout(timeout).build()?,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key,
            model: model.into(),
            temperature: 0.1,
            max_tokens: 2000,
        })
    }

    #[must_use]
    pub const fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    #[must_use]
    pub const fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Builds the engine from config, reading the key from the configured
    /// environment variable.
    ///
    /// # Errors
    ///
    /// Returns an error if the key variable is unset or the client cannot be built.
    pub fn from_config(config: &DecisionConfig) -> anyhow::Result<Self> {
        let key = std::env::var(&config.api_key_env).map_err(|_| {
            anyhow::anyhow!("decision engine key variable {} is not set", config.api_key_env)
        })?;
        Ok(Self::new(
            &config.base_url,
            SecretString::from(key),
            &config.model,
            config.timeout(),
        )?
        .with_temperature(config.temperature)
        .with_max_tokens(config.max_tokens))
    }

    async fn complete(&self, request: &DecisionRequest) -> ExternalResult<String> {
        let user = user_prompt(request)
            .map_err(|e| ExternalError::invalid_data(format!("cannot encode request: {e}")))?;
        let body = ChatRequest {
            model: &self.model,
            messages: [
                Message {
                    role: "system",
                    content: system_prompt(request),
                },
                Message {
                    role: "user",
                    content: user,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let reply: ChatResponse = handle_response(response).await?;

        reply
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| ExternalError::invalid_data("empty completion"))
    }
}

#[async_trait]
impl DecisionEngine for ChatDecisionEngine {
    async fn decide(&self, request: DecisionRequest) -> ExternalResult<Decision> {
        let content = self.complete(&request).await?;
        debug!(kind = request.kind(), chars = content.len(), "Completion received");
        interpret(&request, &content).inspect_err(|e| {
            warn!(kind = request.kind(), error = %e, "Unusable completion");
        })
    }

    fn name(&self) -> &str {
        &self.model
    }
}

impl std::fmt::Debug for ChatDecisionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatDecisionEngine")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .finish_non_exhaustive()
    }
}
