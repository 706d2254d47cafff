//! Gemini provider implementation
//!
//! Gemini's streaming endpoint (`:streamGenerateContent?alt=sse`) emits
//! `data:` events shaped like full `generateContent` responses and has no
//! terminal sentinel: a stream ends on connection close, or early when a
//! candidate reports a finish reason other than `STOP`.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{ProviderKind, ProviderSetting};
use crate::error::{ChatError, Result};
use crate::providers::stream::{decode_events, EventDecoder};
use crate::providers::{
    ChatHistoryItem, ChunkStream, GenerationParams, KeyRotator, Message, MessageChunk, ModelInfo,
    Provider, ProviderCapabilities, Role, RoleTable, SystemPlacement,
};
use crate::session::TaskId;
use crate::transport::StreamReader;

/// Role names for the Gemini dialect
pub const GEMINI_ROLES: RoleTable = RoleTable {
    user: "user",
    assistant: "model",
    system: SystemPlacement::Instruction,
};

/// Finish reason Gemini reports for a normal end of turn
pub const FINISH_STOP: &str = "STOP";

const API_KEY_HEADER: &str = "x-goog-api-key";
const MODEL_PREFIX: &str = "models/";
const GENERATE_METHOD: &str = "generateContent";

/// Gemini API provider
pub struct GeminiProvider {
    reader: Arc<StreamReader>,
    keys: KeyRotator,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Instruction<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<TextPart<'a>>,
}

#[derive(Debug, Serialize)]
struct Instruction<'a> {
    parts: Vec<TextPart<'a>>,
}

#[derive(Debug, Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
    #[serde(default)]
    response_id: Option<String>,
    #[serde(default)]
    model_version: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
    #[serde(default)]
    index: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    models: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelEntry {
    name: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    supported_generation_methods: Vec<String>,
}

impl Candidate {
    fn text(&self) -> String {
        self.content
            .iter()
            .flat_map(|c| c.parts.iter())
            .filter_map(|p| p.text.as_deref())
            .collect()
    }

    fn finish_reason(&self) -> Option<String> {
        self.finish_reason
            .clone()
            .filter(|r| r != "FINISH_REASON_UNSPECIFIED")
    }
}

impl GenerateResponse {
    fn block_reason(&self) -> Option<String> {
        self.prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.clone())
    }
}

/// Decoder for Gemini SSE events
#[derive(Debug, Default)]
pub struct GeminiDecoder {
    model: String,
}

impl GeminiDecoder {
    /// Decoder that labels chunks with `model` when the event omits it
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
        }
    }
}

impl EventDecoder for GeminiDecoder {
    fn terminator(&self) -> Option<&'static str> {
        None
    }

    fn decode(&mut self, payload: &str) -> Result<Option<MessageChunk>> {
        let response: GenerateResponse = serde_json::from_str(payload)?;
        let id = response.response_id.clone().unwrap_or_default();
        let model = response
            .model_version
            .clone()
            .unwrap_or_else(|| self.model.clone());

        let Some(candidate) = response.candidates.first() else {
            // A blocked prompt arrives as feedback with no candidates
            return Ok(response
                .block_reason()
                .map(|reason| MessageChunk::delta(id, model, "", Some(reason))));
        };

        let text = candidate.text();
        let finish = candidate.finish_reason();
        if text.is_empty() && finish.is_none() {
            return Ok(None);
        }
        let mut chunk = MessageChunk::delta(id, model, text, finish);
        if let Some(choice) = chunk.choices.first_mut() {
            choice.index = candidate.index.unwrap_or(0);
        }
        Ok(Some(chunk))
    }

    fn ends_stream(&self, chunk: &MessageChunk) -> bool {
        chunk
            .finish_reason()
            .is_some_and(|reason| reason != FINISH_STOP)
    }
}

fn model_path(model: &str) -> String {
    if model.starts_with(MODEL_PREFIX) {
        model.to_string()
    } else {
        format!("{}{}", MODEL_PREFIX, model)
    }
}

fn base(setting: &ProviderSetting) -> &str {
    setting.base_url.trim_end_matches('/')
}

fn build_generate_request<'a>(
    history: &'a [ChatHistoryItem],
    params: &GenerationParams,
) -> GenerateRequest<'a> {
    let mut contents = Vec::new();
    let mut instruction = Vec::new();
    for item in history {
        match GEMINI_ROLES.wire_name(item.role) {
            Some(role) => contents.push(Content {
                role,
                parts: vec![TextPart {
                    text: item.content.as_str(),
                }],
            }),
            None => instruction.push(TextPart {
                text: item.content.as_str(),
            }),
        }
    }

    GenerateRequest {
        contents,
        system_instruction: (!instruction.is_empty()).then_some(Instruction {
            parts: instruction,
        }),
        generation_config: GenerationConfig {
            temperature: params.temperature,
            max_output_tokens: params.max_tokens,
            top_p: params.top_p,
        },
    }
}

impl GeminiProvider {
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
            Some(key) => request.header(API_KEY_HEADER, key),
            None => request,
        }
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            supports_streaming: true,
            supports_model_listing: true,
            supports_image_generation: false,
        }
    }

    async fn list_models(&self, setting: &ProviderSetting) -> Result<Vec<ModelInfo>> {
        let url = format!("{}/models", base(setting));
        tracing::debug!("Listing Gemini models from {}", url);

        let client = self.reader.client_for(setting)?;
        let response = self.reader.send(self.authorize(setting, client.get(&url))).await?;
        let body = response.text().await.map_err(ChatError::from)?;
        let parsed: ModelsResponse = serde_json::from_str(&body).map_err(|e| {
            tracing::error!("Failed to parse Gemini models response: {}", e);
            ChatError::from(e)
        })?;

        let models: Vec<ModelInfo> = parsed
            .models
            .into_iter()
            .filter(|m| {
                m.supported_generation_methods
                    .iter()
                    .any(|method| method == GENERATE_METHOD)
            })
            .map(|m| {
                let id = m
                    .name
                    .strip_prefix(MODEL_PREFIX)
                    .unwrap_or(&m.name)
                    .to_string();
                ModelInfo {
                    display_name: m.display_name.unwrap_or_else(|| id.clone()),
                    id,
                    owned_by: Some("google".to_string()),
                }
            })
            .collect();
        tracing::debug!("Fetched {} Gemini models", models.len());
        Ok(models)
    }

    async fn generate_text(
        &self,
        setting: &ProviderSetting,
        history: &[ChatHistoryItem],
        params: &GenerationParams,
    ) -> Result<Message> {
        let url = format!(
            "{}/{}:{}",
            base(setting),
            model_path(&params.model),
            GENERATE_METHOD
        );
        let body = build_generate_request(history, params);
        tracing::debug!(model = %params.model, contents = body.contents.len(), "Sending Gemini request");

        let client = self.reader.client_for(setting)?;
        let request = self.authorize(setting, client.post(&url)).json(&body);
        let response = self.reader.send(request).await?;
        let text = response.text().await.map_err(ChatError::from)?;
        let parsed: GenerateResponse = serde_json::from_str(&text)?;

        let Some(candidate) = parsed.candidates.first() else {
            return Err(match parsed.block_reason() {
                Some(reason) => ChatError::Request(format!("prompt was blocked: {}", reason)),
                None => ChatError::Request("provider returned no candidates".to_string()),
            });
        };
        let content = candidate.text();
        if content.is_empty() {
            return Err(ChatError::Request(
                "provider returned an empty response".to_string(),
            ));
        }
        Ok(Message::text(Role::Assistant, content))
    }

    async fn stream_text(
        &self,
        setting: &ProviderSetting,
        history: &[ChatHistoryItem],
        params: &GenerationParams,
        task_id: &TaskId,
    ) -> Result<ChunkStream> {
        let url = format!(
            "{}/{}:streamGenerateContent?alt=sse",
            base(setting),
            model_path(&params.model)
        );
        let body = build_generate_request(history, params);
        tracing::debug!(
            task_id = %task_id,
            model = %params.model,
            contents = body.contents.len(),
            "Opening Gemini stream"
        );

        let client = self.reader.client_for(setting)?;
        let request = self.authorize(setting, client.post(&url)).json(&body);
        let lines = self.reader.open_lines(task_id, request).await?;
        Ok(decode_events(lines, GeminiDecoder::new(params.model.clone())))
    }
}
