use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::history::HistoryEntry;

/// Produces the actor's next utterance from the conversation so far.
///
/// No retry happens at this seam: a failed generation fails the current turn
/// cycle and surfaces to the lifecycle layer.
#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    async fn generate(&self, transcript: &[HistoryEntry]) -> Result<String>;
}

#[derive(Clone)]
pub struct LlmClient {
    api_url: String,
    api_key: Option<String>,
    model: String,
    username: String,
    system_prompt: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

impl LlmClient {
    pub fn new(
        api_url: String,
        model: String,
        api_key: Option<String>,
        username: String,
        system_prompt: String,
    ) -> Self {
        Self {
            api_url,
            api_key,
            model,
            username,
            system_prompt,
            client: reqwest::Client::new(),
        }
    }

    /// Map the transcript into OpenAI-format messages. The actor's own
    /// entries become assistant turns; everything else is user content
    /// prefixed with its speaker label (mid-conversation system roles are
    /// rejected by several compatible servers).
    fn build_messages(&self, transcript: &[HistoryEntry]) -> Vec<ChatMessage> {
        let mut messages = vec![ChatMessage {
            role: "system".to_string(),
            content: self.system_prompt.clone(),
        }];

        for entry in transcript {
            if entry.source == self.username {
                messages.push(ChatMessage {
                    role: "assistant".to_string(),
                    content: entry.text.clone(),
                });
            } else {
                messages.push(ChatMessage {
                    role: "user".to_string(),
                    content: format!("{}: {}", entry.source, entry.text),
                });
            }
        }

        messages
    }
}

#[async_trait]
impl ResponseGenerator for LlmClient {
    async fn generate(&self, transcript: &[HistoryEntry]) -> Result<String> {
        let url = format!("{}/chat/completions", self.api_url);

        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: self.build_messages(transcript),
            temperature: Some(0.7),
            max_tokens: Some(512),
        };

        let mut req = self.client.post(&url).json(&request);

        // API key header is only needed for hosted endpoints, not local models
        if let Some(key) = self.api_key.as_deref() {
            if !key.is_empty() {
                req = req.header("Authorization", format!("Bearer {}", key));
            }
        }

        let response = req.send().await.context("Failed to send LLM request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read body".to_string());
            anyhow::bail!("LLM API returned error {}: {}", status, body);
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .context("Failed to parse LLM response")?;

        let content = completion
            .choices
            .first()
            .map(|c| c.message.content.trim().to_string())
            .ok_or_else(|| anyhow::anyhow!("No response from LLM"))?;

        Ok(content)
    }
}
