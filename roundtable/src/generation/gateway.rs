//! Provider gateway: real LLM backends behind the [`ResponseGenerator`] seam.
//!
//! Two interchangeable wire shapes (anthropic-compatible messages API and
//! OpenAI-style chat completions), selected by configuration. API keys are
//! resolved indirectly through env-var names so configuration never carries
//! secrets. Each persona gets its own sliding one-minute rate-limit window;
//! exceeding it fails fast instead of queuing.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use super::{GeneratedResponse, GenerationError, ResponseGenerator};
use crate::orchestrator::ConversationContext;
use crate::personas::Persona;
use shared_types::{MessageAuthor, PersonaId};

/// How many trailing history messages are sent to the provider.
const HISTORY_WINDOW: usize = 20;

const RATE_WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub enum ProviderConfig {
    AnthropicCompatible {
        base_url: String,
        api_key_env: String,
        model: String,
    },
    OpenAiGeneric {
        base_url: String,
        api_key_env: String,
        model: String,
    },
}

impl ProviderConfig {
    fn provider_label(&self) -> &'static str {
        match self {
            ProviderConfig::AnthropicCompatible { .. } => "anthropic",
            ProviderConfig::OpenAiGeneric { .. } => "openai-generic",
        }
    }

    fn api_key(&self) -> Result<String, GenerationError> {
        let env = match self {
            ProviderConfig::AnthropicCompatible { api_key_env, .. } => api_key_env,
            ProviderConfig::OpenAiGeneric { api_key_env, .. } => api_key_env,
        };
        std::env::var(env)
            .map_err(|_| GenerationError::Provider(format!("api key env {env} not set")))
    }
}

pub struct ProviderGateway {
    config: ProviderConfig,
    client: reqwest::Client,
    rate_limit_per_minute: usize,
    rate_limit_state: Arc<Mutex<HashMap<PersonaId, Vec<Instant>>>>,
}

impl ProviderGateway {
    pub fn new(config: ProviderConfig, rate_limit_per_minute: usize) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            rate_limit_per_minute,
            rate_limit_state: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Sliding-window admission check; records the call when admitted.
    async fn check_rate_limit(&self, persona: PersonaId) -> Result<(), GenerationError> {
        let now = Instant::now();
        let mut state = self.rate_limit_state.lock().await;
        let window = state.entry(persona).or_default();
        window.retain(|t| now.duration_since(*t) < RATE_WINDOW);
        if window.len() >= self.rate_limit_per_minute {
            return Err(GenerationError::RateLimited {
                persona,
                limit: self.rate_limit_per_minute,
            });
        }
        window.push(now);
        Ok(())
    }

    fn system_prompt(persona: &Persona, context: &ConversationContext) -> String {
        let mut prompt = persona
            .prompt_template
            .replace("{product_idea}", &context.product_idea)
            .replace("{complexity}", context.complexity.as_str())
            .replace("{phase}", context.phase.as_str());
        if !context.target_users.is_empty() {
            prompt.push_str("\nTarget users: ");
            prompt.push_str(&context.target_users.join(", "));
        }
        prompt
    }

    /// Map stored history to provider chat messages, newest-last.
    fn history_messages(context: &ConversationContext) -> Vec<Value> {
        context
            .history
            .iter()
            .rev()
            .take(HISTORY_WINDOW)
            .rev()
            .map(|m| {
                let role = match m.author {
                    MessageAuthor::User => "user",
                    MessageAuthor::Persona(_) => "assistant",
                };
                json!({ "role": role, "content": m.content })
            })
            .collect()
    }

    async fn call_anthropic(
        &self,
        base_url: &str,
        model: &str,
        system: &str,
        mut messages: Vec<Value>,
        user_message: &str,
    ) -> Result<(String, i64), GenerationError> {
        messages.push(json!({ "role": "user", "content": user_message }));
        let body = json!({
            "model": model,
            "max_tokens": 1024,
            "system": system,
            "messages": messages,
        });

        let response = self
            .client
            .post(format!("{}/v1/messages", base_url.trim_end_matches('/')))
            .header("x-api-key", self.config.api_key()?)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::Provider(e.to_string()))?;

        let status = response.status();
        let payload: Value = response
            .json()
            .await
            .map_err(|e| GenerationError::Malformed(e.to_string()))?;
        if !status.is_success() {
            return Err(GenerationError::Provider(format!(
                "anthropic upstream returned {status}: {payload}"
            )));
        }

        let content = payload["content"][0]["text"]
            .as_str()
            .ok_or_else(|| GenerationError::Malformed("missing content[0].text".to_string()))?
            .to_string();
        let tokens = payload["usage"]["input_tokens"].as_i64().unwrap_or(0)
            + payload["usage"]["output_tokens"].as_i64().unwrap_or(0);
        Ok((content, tokens))
    }

    async fn call_openai(
        &self,
        base_url: &str,
        model: &str,
        system: &str,
        history: Vec<Value>,
        user_message: &str,
    ) -> Result<(String, i64), GenerationError> {
        let mut messages = vec![json!({ "role": "system", "content": system })];
        messages.extend(history);
        messages.push(json!({ "role": "user", "content": user_message }));
        let body = json!({ "model": model, "messages": messages });

        let response = self
            .client
            .post(format!(
                "{}/v1/chat/completions",
                base_url.trim_end_matches('/')
            ))
            .bearer_auth(self.config.api_key()?)
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::Provider(e.to_string()))?;

        let status = response.status();
        let payload: Value = response
            .json()
            .await
            .map_err(|e| GenerationError::Malformed(e.to_string()))?;
        if !status.is_success() {
            return Err(GenerationError::Provider(format!(
                "openai upstream returned {status}: {payload}"
            )));
        }

        let content = payload["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| {
                GenerationError::Malformed("missing choices[0].message.content".to_string())
            })?
            .to_string();
        let tokens = payload["usage"]["total_tokens"].as_i64().unwrap_or(0);
        Ok((content, tokens))
    }
}

#[async_trait]
impl ResponseGenerator for ProviderGateway {
    async fn generate(
        &self,
        persona: &Persona,
        context: &ConversationContext,
        user_message: &str,
    ) -> Result<GeneratedResponse, GenerationError> {
        self.check_rate_limit(persona.id).await?;

        let system = Self::system_prompt(persona, context);
        let history = Self::history_messages(context);
        let started = Instant::now();

        let (content, tokens) = match &self.config {
            ProviderConfig::AnthropicCompatible {
                base_url, model, ..
            } => {
                self.call_anthropic(base_url, model, &system, history, user_message)
                    .await?
            }
            ProviderConfig::OpenAiGeneric {
                base_url, model, ..
            } => {
                self.call_openai(base_url, model, &system, history, user_message)
                    .await?
            }
        };

        let processing_time_ms = started.elapsed().as_millis() as i64;
        tracing::debug!(
            persona = %persona.id,
            provider = self.config.provider_label(),
            tokens,
            processing_time_ms,
            "generated persona response"
        );

        Ok(GeneratedResponse {
            content,
            tokens,
            processing_time_ms,
        })
    }
}
