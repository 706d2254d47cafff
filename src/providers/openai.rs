//! OpenAI-compatible provider implementation
//!
//! Speaks the chat-completions dialect used by OpenAI and the many servers
//! that mimic it: bearer authentication, `data:` SSE events carrying
//! `choices[].delta.content`, and a literal `[DONE]` sentinel.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::config::{ProviderKind, ProviderSetting};
use crate::error::{ChatError, Result};
use crate::providers::stream::{decode_events, EventDecoder};
use crate::providers::{
    ChatHistoryItem, ChunkChoice, ChunkStream, GeneratedImage, GenerationParams, ImageParams,
    ImageResult, KeyRotator, Message, MessageChunk, ModelInfo, Provider, ProviderCapabilities,
    Role, RoleTable, SystemPlacement,
};
use crate::session::TaskId;
use crate::transport::StreamReader;

/// Role names for the chat-completions dialect
pub const OPENAI_ROLES: RoleTable = RoleTable {
    user: "user",
    assistant: "assistant",
    system: SystemPlacement::Inline("system"),
};

/// End-of-stream sentinel payload
pub const DONE_SENTINEL: &str = "[DONE]";

const DEFAULT_IMAGE_MODEL: &str = "dall-e-3";

/// OpenAI-compatible API provider
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use streamchat::config::ProviderConfig;
/// use streamchat::providers::{GenerationParams, OpenAiProvider, Provider};
/// use streamchat::transport::StreamReader;
///
/// # async fn example() -> streamchat::error::Result<()> {
/// let provider = OpenAiProvider::new(Arc::new(StreamReader::new()?));
/// let setting = ProviderConfig::default().settings[0].clone();
/// let models = provider.list_models(&setting).await?;
/// # Ok(())
/// # }
/// ```
pub struct OpenAiProvider {
    reader: Arc<StreamReader>,
    keys: KeyRotator,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct StreamEvent {
    #[serde(default)]
    id: String,
    #[serde(default)]
    model: String,
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    index: u32,
    #[serde(default)]
    delta: Option<WireDelta>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
    #[serde(default)]
    owned_by: Option<String>,
}

#[derive(Debug, Serialize)]
struct ImageRequest<'a> {
    prompt: &'a str,
    model: &'a str,
    n: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    size: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct ImagesResponse {
    #[serde(default)]
    data: Vec<ImageEntry>,
}

#[derive(Debug, Deserialize)]
struct ImageEntry {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    b64_json: Option<String>,
    #[serde(default)]
    revised_prompt: Option<String>,
}

/// Decoder for chat-completions SSE events
#[derive(Debug, Default)]
pub struct OpenAiDecoder;

impl EventDecoder for OpenAiDecoder {
    fn terminator(&self) -> Option<&'static str> {
        Some(DONE_SENTINEL)
    }

    fn decode(&mut self, payload: &str) -> Result<Option<MessageChunk>> {
        let event: StreamEvent = serde_json::from_str(payload)?;

        let choices: Vec<ChunkChoice> = event
            .choices
            .into_iter()
            .filter_map(|choice| {
                let text = choice
                    .delta
                    .and_then(|d| d.content)
                    .filter(|t| !t.is_empty());
                if text.is_none() && choice.finish_reason.is_none() {
                    return None;
                }
                let delta = match text {
                    Some(text) => Message::assistant(text),
                    None => Message {
                        role: Role::Assistant,
                        parts: Vec::new(),
                    },
                };
                Some(ChunkChoice {
                    index: choice.index,
                    delta: Some(delta),
                    message: None,
                    finish_reason: choice.finish_reason,
                })
            })
            .collect();

        if choices.is_empty() {
            return Ok(None);
        }
        Ok(Some(MessageChunk {
            id: event.id,
            model_id: event.model,
            choices,
        }))
    }
}

fn endpoint(setting: &ProviderSetting, path: &str) -> String {
    format!("{}/{}", setting.base_url.trim_end_matches('/'), path)
}

fn build_chat_request<'a>(
    history: &'a [ChatHistoryItem],
    params: &'a GenerationParams,
    stream: bool,
) -> ChatRequest<'a> {
    let messages = history
        .iter()
        .filter_map(|item| {
            OPENAI_ROLES.wire_name(item.role).map(|role| WireMessage {
                role,
                content: item.content.as_str(),
            })
        })
        .collect();

    ChatRequest {
        model: &params.model,
        messages,
        stream,
        temperature: params.temperature,
        max_tokens: params.max_tokens,
        top_p: params.top_p,
    }
}

fn decode_image(entry: ImageEntry) -> Result<GeneratedImage> {
    let data = match entry.b64_json {
        Some(encoded) => Some(
            base64::engine::general_purpose::STANDARD
                .decode(encoded.as_bytes())
                .map_err(|e| ChatError::Request(format!("invalid image data: {}", e)))?,
        ),
        None => None,
    };
    if data.is_none() && entry.url.is_none() {
        return Err(ChatError::Request(
            "image entry has neither url nor data".to_string(),
        ));
    }
    Ok(GeneratedImage {
        url: entry.url,
        data,
        revised_prompt: entry.revised_prompt,
    })
}

impl OpenAiProvider {
    /// Create an adapter sharing the given stream reader
    pub fn new(reader: Arc<StreamReader>) -> Self {
        Self {
            reader,
            keys: KeyRotator::new(),
        }
    }

    fn authorize(
        &self,
        setting: &ProviderSetting,
        request: reqwest::RequestBuilder,
    ) -> reqwest::RequestBuilder {
        match self.keys.next_key(setting) {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            supports_streaming: true,
            supports_model_listing: true,
            supports_image_generation: true,
        }
    }

    async fn list_models(&self, setting: &ProviderSetting) -> Result<Vec<ModelInfo>> {
        let url = endpoint(setting, "models");
        tracing::debug!("Listing models from {}", url);

        let client = self.reader.client_for(setting)?;
        let request = self.authorize(setting, client.get(&url));
        let response = self.reader.send(request).await?;
        let body = response.text().await.map_err(ChatError::from)?;
        let parsed: ModelsResponse = serde_json::from_str(&body).map_err(|e| {
            tracing::error!("Failed to parse models response: {}", e);
            ChatError::from(e)
        })?;

        let models: Vec<ModelInfo> = parsed
            .data
            .into_iter()
            .map(|entry| ModelInfo {
                display_name: entry.id.clone(),
                id: entry.id,
                owned_by: entry.owned_by,
            })
            .collect();
        tracing::debug!("Fetched {} models", models.len());
        Ok(models)
    }

    async fn generate_text(
        &self,
        setting: &ProviderSetting,
        history: &[ChatHistoryItem],
        params: &GenerationParams,
    ) -> Result<Message> {
        let client = self.reader.client_for(setting)?;
        let body = build_chat_request(history, params, false);
        tracing::debug!(
            model = %params.model,
            messages = body.messages.len(),
            "Sending completion request"
        );

        let request = self.authorize(setting, client.post(endpoint(setting, "chat/completions")));
        let response = self.reader.send(request.json(&body)).await?;
        let text = response.text().await.map_err(ChatError::from)?;
        let parsed: CompletionResponse = serde_json::from_str(&text)?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.is_empty())
            .ok_or_else(|| ChatError::Request("provider returned an empty response".to_string()))?;
        Ok(Message::assistant(content))
    }

    async fn stream_text(
        &self,
        setting: &ProviderSetting,
        history: &[ChatHistoryItem],
        params: &GenerationParams,
        task_id: &TaskId,
    ) -> Result<ChunkStream> {
        let client = self.reader.client_for(setting)?;
        let body = build_chat_request(history, params, true);
        tracing::debug!(
            task_id = %task_id,
            model = %params.model,
            messages = body.messages.len(),
            "Opening completion stream"
        );

        let request = self
            .authorize(setting, client.post(endpoint(setting, "chat/completions")))
            .json(&body);
        let lines = self.reader.open_lines(task_id, request).await?;
        Ok(decode_events(lines, OpenAiDecoder))
    }

    async fn generate_image(
        &self,
        setting: &ProviderSetting,
        params: &ImageParams,
    ) -> Result<ImageResult> {
        let client = self.reader.client_for(setting)?;
        let body = ImageRequest {
            prompt: &params.prompt,
            model: params.model.as_deref().unwrap_or(DEFAULT_IMAGE_MODEL),
            n: params.count.max(1),
            size: params.size.as_deref(),
        };
        tracing::debug!(model = body.model, n = body.n, "Requesting image generation");

        let request = self.authorize(setting, client.post(endpoint(setting, "images/generations")));
        let response = self.reader.send(request.json(&body)).await?;
        let text = response.text().await.map_err(ChatError::from)?;
        let parsed: ImagesResponse = serde_json::from_str(&text)?;

        if parsed.data.is_empty() {
            return Err(ChatError::Request("provider returned no images".to_string()));
        }
        let images = parsed
            .data
            .into_iter()
            .map(decode_image)
            .collect::<Result<Vec<_>>>()?;
        Ok(ImageResult { images })
    }
}
