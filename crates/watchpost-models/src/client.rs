//! OpenAI-compatible `/chat/completions` client

use crate::error::ModelError;
use crate::{ReasoningModel, VisionModel};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

/// One model behind an OpenAI-compatible endpoint
#[derive(Clone)]
pub struct OpenAiCompatClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
}

impl OpenAiCompatClient {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        model: impl Into<String>,
        temperature: f32,
        timeout: Duration,
    ) -> Result<Self, ModelError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key,
            model: model.into(),
            temperature,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, content: Value) -> Result<String, ModelError> {
        let api_key = self.api_key.as_deref().ok_or(ModelError::MissingApiKey)?;
        let body = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": content}],
            "temperature": self.temperature,
        });

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Status {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        let body: Value = response.json().await?;
        let content = extract_content(&body).ok_or(ModelError::EmptyResponse)?;
        debug!(model = %self.model, chars = content.len(), "model responded");
        Ok(content)
    }
}

/// `choices[0].message.content`, either a string or a list of text parts
pub fn extract_content(body: &Value) -> Option<String> {
    let content = body.get("choices")?.get(0)?.get("message")?.get("content")?;
    let text = match content {
        Value::String(text) => text.clone(),
        Value::Array(parts) => parts
            .iter()
            .filter_map(|p| p.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join(""),
        _ => return None,
    };
    (!text.trim().is_empty()).then_some(text)
}

fn vision_content(prompt: &str, image: &str) -> Value {
    json!([
        {"type": "image_url", "image_url": {"url": image}},
        {"type": "text", "text": prompt},
    ])
}

impl VisionModel for OpenAiCompatClient {
    fn name(&self) -> &str {
        &self.model
    }

    async fn describe(&self, prompt: &str, image: &str) -> Result<String, ModelError> {
        self.complete(vision_content(prompt, image)).await
    }
}

impl ReasoningModel for OpenAiCompatClient {
    fn name(&self) -> &str {
        &self.model
    }

    async fn reason(&self, prompt: &str) -> Result<String, ModelError> {
        self.complete(Value::String(prompt.to_string())).await
    }
}
