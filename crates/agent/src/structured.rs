//! Structured generation — ask a model for JSON and keep asking until it
//! validates.
//!
//! Each failed attempt is classified by the extractor ([`ExtractionError`])
//! and the model is shown exactly what went wrong: the parser message for
//! bad syntax, or the offending paths for a schema mismatch.

use std::sync::Arc;

use conductor_core::error::{Error, Result};
use conductor_core::extract::{self, ExtractionError};
use conductor_core::message::{Conversation, Message};
use conductor_core::provider::{Provider, ProviderRequest, Usage};
use conductor_core::schema::Schema;
use tracing::{debug, info, warn};

use crate::loop_runner::AgentConfig;

/// Correction rounds when none are configured.
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// A validated value plus how it was obtained.
#[derive(Debug, Clone)]
pub struct StructuredOutput<T> {
    pub value: T,

    /// Model calls made, including the successful one
    pub attempts: usize,

    pub usage: Usage,
}

pub struct StructuredGenerator {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    system_prompt: String,
    max_retries: u32,
}

impl StructuredGenerator {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.2,
            max_tokens: None,
            system_prompt: String::new(),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Reuse an agent's model settings and system prompt.
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            provider: config.provider.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            system_prompt: config.system_prompt.clone(),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    fn instructions<S: Schema + ?Sized>(&self, schema: &S) -> String {
        let descriptor =
            serde_json::to_string_pretty(&schema.descriptor()).unwrap_or_else(|_| "{}".into());
        let mut prompt = self.system_prompt.clone();
        if !prompt.is_empty() {
            prompt.push_str("\n\n");
        }
        prompt.push_str(
            "Respond with a single JSON value and nothing else. \
             It must conform to this JSON Schema:\n",
        );
        prompt.push_str(&descriptor);
        prompt
    }

    /// Generate a value satisfying `schema`.
    ///
    /// Makes at most `max_retries + 1` model calls.
    pub async fn generate<S>(&self, prompt: &str, schema: &S) -> Result<StructuredOutput<S::Output>>
    where
        S: Schema + ?Sized,
    {
        if prompt.trim().is_empty() {
            return Err(Error::InvalidInput("prompt must not be empty".into()));
        }

        let max_attempts = self.max_retries as usize + 1;
        let mut conversation = Conversation::seeded(&self.instructions(schema), prompt);
        let mut usage = Usage::default();
        let mut last_error: Option<ExtractionError> = None;

        for attempt in 1..=max_attempts {
            debug!(attempt, max_attempts, model = %self.model, "Requesting structured output");
            let request = ProviderRequest {
                model: self.model.clone(),
                messages: conversation.messages.clone(),
                temperature: self.temperature,
                max_tokens: self.max_tokens,
                tools: Vec::new(),
            };
            let response = self
                .provider
                .complete(request)
                .await
                .map_err(|source| Error::ModelFailed {
                    step: attempt - 1,
                    source,
                })?;
            if let Some(u) = response.usage {
                usage += u;
            }

            let text = response.message.content.clone();
            conversation.push(response.message);

            match extract::extract(&text, schema) {
                Ok(value) => {
                    info!(attempts = attempt, "Structured output accepted");
                    return Ok(StructuredOutput {
                        value,
                        attempts: attempt,
                        usage,
                    });
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Structured output rejected");
                    if attempt < max_attempts {
                        conversation.push(Message::user(e.retry_feedback()));
                    }
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(last) => Err(Error::ExtractionExhausted {
                attempts: max_attempts,
                last,
            }),
            None => Err(Error::Internal("structured generation made no attempts".into())),
        }
    }
}
