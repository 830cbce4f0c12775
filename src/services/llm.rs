use crate::error::GenerationError;
use crate::utils::{PREVIEW_CHARS, preview};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

/// One prompt sent to the completion service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub system: String,
    pub prompt: String,
    pub max_tokens: u32,
}

/// Anything that turns a prompt into generated text.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String, GenerationError>;
}

/// Connection and sampling parameters of the chat-completion endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct LLMSettings {
    pub api_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub top_p: Option<f32>,
    pub frequency_penalty: Option<f32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionBody<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    frequency_penalty: Option<f32>,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

pub struct LLMClient {
    client: reqwest::Client,
    settings: LLMSettings,
}

impl LLMClient {
    pub fn new(settings: LLMSettings) -> Self {
        LLMClient {
            client: reqwest::Client::new(),
            settings,
        }
    }

    fn body<'a>(&'a self, request: &'a CompletionRequest) -> ChatCompletionBody<'a> {
        ChatCompletionBody {
            model: &self.settings.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.prompt,
                },
            ],
            temperature: self.settings.temperature,
            top_p: self.settings.top_p,
            frequency_penalty: self.settings.frequency_penalty,
            max_tokens: request.max_tokens,
            stream: false,
        }
    }
}

#[async_trait]
impl CompletionClient for LLMClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, GenerationError> {
        let response = self
            .client
            .post(&self.settings.api_url)
            .bearer_auth(&self.settings.api_key)
            .json(&self.body(&request))
            .send()
            .await
            .map_err(|e| GenerationError::Transport {
                message: e.to_string(),
            })?;

        let status = response.status();
        let response_text = response
            .text()
            .await
            .map_err(|e| GenerationError::Transport {
                message: e.to_string(),
            })?;

        tracing::debug!(
            status = status.as_u16(),
            bytes = response_text.len(),
            "completion response received"
        );
        parse_completion(status, &response_text)
    }
}

/// Reads `choices[0].message.content` out of a chat-completion response.
///
/// Later choices are alternative completions of the same prompt and are ignored.
pub fn parse_completion(status: StatusCode, body: &str) -> Result<String, GenerationError> {
    if !status.is_success() {
        return Err(GenerationError::Status {
            status: status.as_u16(),
            preview: preview(body, PREVIEW_CHARS),
        });
    }

    let shape_error = |message: &str| GenerationError::ContentShape {
        message: message.to_string(),
        preview: preview(body, PREVIEW_CHARS),
    };

    let parsed: ChatCompletionResponse =
        serde_json::from_str(body).map_err(|e| shape_error(&format!("invalid JSON: {e}")))?;

    let content = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| shape_error("response has no choices"))?
        .message
        .and_then(|m| m.content)
        .ok_or_else(|| shape_error("first choice has no message content"))?;

    if content.trim().is_empty() {
        return Err(shape_error("first choice has empty content"));
    }
    Ok(content)
}
