// Shortsmith LLM Client - OpenAI-compatible chat completions
//
// One thin client shared by every collaborator that talks to the model:
// fact generation, candidate selection, music mood matching, and the two
// vision gates. Callers get the parsed JSON payload the model was asked
// to produce; code fences are stripped because models wrap JSON in them
// more often than not.

use anyhow::{anyhow, bail, Context, Result};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

pub struct LlmClient {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
}

impl LlmClient {
    pub fn new(api_url: &str, api_key: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: "gpt-4o".to_string(),
        }
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    /// Text-only chat completion that must come back as JSON.
    pub async fn chat_json(
        &self,
        system: &str,
        user: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<Value> {
        let payload = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
            "temperature": temperature,
            "max_tokens": max_tokens,
        });
        self.complete(payload).await
    }

    /// Vision chat completion: the user message interleaves text with
    /// base64-encoded JPEG frames. Frames are labelled by their position
    /// index so the model can refer back to them.
    pub async fn vision_json(
        &self,
        system: &str,
        question: &str,
        frames: &[(usize, String)],
        max_tokens: u32,
    ) -> Result<Value> {
        let mut content = vec![json!({ "type": "text", "text": question })];
        for (index, b64) in frames {
            content.push(json!({ "type": "text", "text": format!("Frame {}:", index) }));
            content.push(json!({
                "type": "image_url",
                "image_url": {
                    "url": format!("data:image/jpeg;base64,{}", b64),
                    "detail": "low",
                },
            }));
        }

        let payload = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": content },
            ],
            "max_tokens": max_tokens,
        });
        self.complete(payload).await
    }

    async fn complete(&self, payload: Value) -> Result<Value> {
        let endpoint = format!("{}/chat/completions", self.api_url);
        let resp = self
            .client
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .timeout(REQUEST_TIMEOUT)
            .json(&payload)
            .send()
            .await
            .context("LLM request failed")?;

        if !resp.status().is_success() {
            bail!("LLM API error: {}", resp.status());
        }

        let body: Value = resp.json().await.context("LLM response was not JSON")?;
        let content = body["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| anyhow!("LLM response had no message content"))?;

        debug!("[LLM] raw reply: {}", content);
        let stripped = strip_code_fences(content);
        serde_json::from_str(stripped).context("LLM reply was not valid JSON")
    }
}

/// Models like to wrap JSON replies in ```json fences. Peel them off.
pub fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let inner = if let Some(rest) = trimmed.strip_prefix("```json") {
        rest
    } else if let Some(rest) = trimmed.strip_prefix("```") {
        rest
    } else {
        return trimmed;
    };
    inner.trim_end_matches("```").trim()
}
