use log::{debug, info};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{OracleError, OracleResult};
use crate::judgment::ScoringOracle;
use crate::models::PipelineConfig;

const TEMPERATURE: f32 = 0.1;
const MAX_TOKENS: u32 = 1000;

/// Scoring oracle backed by an OpenAI-compatible chat completions endpoint
pub struct ChatOracle {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

impl ChatOracle {
    pub fn new(base_url: &str, api_key: String, model: String, timeout: Duration) -> OracleResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OracleError::CallFailed(format!("failed to create HTTP client: {}", e)))?;

        let base_url = base_url.trim_end_matches('/').to_string();
        info!("Scoring oracle: {} at {}", model, base_url);

        Ok(Self {
            client,
            base_url,
            api_key,
            model,
        })
    }

    /// Build an oracle from configuration; `None` when no API key is set
    pub fn from_config(config: &PipelineConfig) -> OracleResult<Option<Self>> {
        match &config.oracle_api_key {
            Some(api_key) => Self::new(
                &config.oracle_base_url,
                api_key.clone(),
                config.oracle_model.clone(),
                Duration::from_secs(config.oracle_timeout_secs),
            )
            .map(Some),
            None => Ok(None),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

impl ScoringOracle for ChatOracle {
    fn score(&self, system: &str, prompt: &str) -> OracleResult<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        };

        debug!("Sending {} byte prompt to {}", prompt.len(), self.endpoint());
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .map_err(|e| OracleError::CallFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(OracleError::CallFailed(format!("{} - {}", status.as_u16(), body)));
        }

        let body: ChatResponse = response
            .json()
            .map_err(|e| OracleError::CallFailed(format!("unreadable response: {}", e)))?;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| OracleError::CallFailed("empty response from oracle".to_string()))
    }
}
