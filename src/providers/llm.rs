//! Chat completion provider and entity extraction helpers

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{Error, Result};

#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// One-shot chat completion
    async fn complete(&self, system: &str, user: &str) -> Result<String>;
}

/// OpenAI-compatible chat completions client
pub struct OpenAiChat {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

impl OpenAiChat {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
        }
    }
}

#[async_trait]
impl ChatProvider for OpenAiChat {
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| Error::llm("no chat api key configured"))?;

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&json!({
                "model": self.model,
                "messages": [
                    { "role": "system", "content": system },
                    { "role": "user", "content": user },
                ],
                "temperature": 0.0,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::llm(format!("chat api returned {status}: {body}")));
        }

        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| Error::llm("chat api returned no choices"))
    }
}

const EXTRACTION_SYSTEM: &str = "You extract structured entities from text. \
Respond with a single JSON object mapping each requested entity type to an \
array of string values found in the text. Use empty arrays for types with \
no matches. Respond with JSON only, no prose.";

/// Ask the chat model for entities of the requested types in one chunk
/// of text. Returns None when the reply is not parseable JSON.
pub async fn extract_entities(
    chat: &dyn ChatProvider,
    text: &str,
    entity_types: &[String],
) -> Result<Option<Value>> {
    let user = format!(
        "Entity types: {}\n\nText:\n{}",
        entity_types.join(", "),
        text
    );
    let reply = chat.complete(EXTRACTION_SYSTEM, &user).await?;
    let cleaned = strip_code_fence(&reply);
    match serde_json::from_str::<Value>(cleaned) {
        Ok(value) if value.is_object() => Ok(Some(value)),
        _ => {
            debug!("entity extraction reply was not a JSON object");
            Ok(None)
        }
    }
}

/// Flatten an extraction object into unique `type:value` tags
pub fn build_entity_tags(entities: &Value) -> Vec<String> {
    let mut tags = Vec::new();
    if let Some(map) = entities.as_object() {
        for (entity_type, values) in map {
            if let Some(values) = values.as_array() {
                for value in values {
                    if let Some(value) = value.as_str() {
                        let tag = format!("{entity_type}:{value}");
                        if !tags.contains(&tag) {
                            tags.push(tag);
                        }
                    }
                }
            }
        }
    }
    tags
}

fn strip_code_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    let trimmed = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    trimmed.strip_suffix("```").unwrap_or(trimmed).trim()
}
