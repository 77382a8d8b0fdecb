use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument};

use crate::config::OracleConfig;
use crate::error::MoveSourceError;
use crate::oracle::parse::parse_suggestion;
use crate::oracle::{MoveRequest, MoveSource, Suggestion};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl ChatRequest {
    pub fn for_move(config: &OracleConfig, request: &MoveRequest) -> Self {
        Self {
            model: config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: config.system_prompt.clone(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: request.prompt(),
                },
            ],
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    content: Option<String>,
}

/// Pulls `choices[0].message.content` out of a completions response body.
pub fn reply_content(body: &str) -> Result<String, MoveSourceError> {
    let response: ChatResponse = serde_json::from_str(body)?;
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| MoveSourceError::Malformed("response has no message content".to_string()))
}

/// Full path from a completions response body to an untrusted suggestion.
pub fn suggestion_from_body(body: &str) -> Result<Suggestion, MoveSourceError> {
    let content = reply_content(body)?;
    debug!(content = %content, "raw model reply");
    parse_suggestion(&content)
}

/// Asks a chat-completions endpoint for a move.
#[derive(Debug, Clone)]
pub struct ChatCompletionSource {
    client: reqwest::Client,
    config: OracleConfig,
}

impl ChatCompletionSource {
    pub fn new(config: OracleConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    pub fn with_client(client: reqwest::Client, config: OracleConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait(?Send)]
impl MoveSource for ChatCompletionSource {
    #[instrument(skip_all, fields(
        model = %self.config.model,
        generation = request.generation,
        request_id = request.request_id,
    ))]
    async fn request_move(&self, request: &MoveRequest) -> Result<Suggestion, MoveSourceError> {
        let body = ChatRequest::for_move(&self.config, request);

        let response = self
            .client
            .post(self.config.completions_url())
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                error!(error = %err, "completions request failed");
                MoveSourceError::from(err)
            })?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            error!(%status, body = %text, "completions endpoint returned an error");
            return Err(MoveSourceError::Unavailable(format!(
                "completions endpoint returned {status}"
            )));
        }

        suggestion_from_body(&text)
    }
}
