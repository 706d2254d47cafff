//! Base provider trait and common types for StreamChat
//!
//! This module defines the [`Provider`] capability trait that every backend
//! family implements, along with the uniform message and chunk model that
//! all wire formats are normalized into before reaching the consumer.

use crate::config::{ProviderKind, ProviderSetting};
use crate::error::{ChatError, Result};
use crate::session::TaskId;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

/// Role of a message author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// End user
    User,
    /// Model output
    Assistant,
    /// System instructions
    System,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::System => write!(f, "system"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "system" => Ok(Role::System),
            other => Err(ChatError::Request(format!("unknown role: {}", other))),
        }
    }
}

/// One part of a message body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessagePart {
    /// Plain text
    Text {
        /// Text content
        text: String,
    },
    /// Image reference (URL or data URI)
    Image {
        /// Image location
        url: String,
    },
}

/// Partial or full message
///
/// A message accumulated from chunks is the in-order concatenation of the
/// text parts of every delta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Author role
    pub role: Role,
    /// Ordered content parts
    pub parts: Vec<MessagePart>,
}

impl Message {
    /// Creates a text-only message with the given role
    ///
    /// # Examples
    ///
    /// ```
    /// use streamchat::providers::{Message, Role};
    ///
    /// let msg = Message::text(Role::User, "Hello");
    /// assert_eq!(msg.text_content(), "Hello");
    /// ```
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            parts: vec![MessagePart::Text { text: text.into() }],
        }
    }

    /// Creates a user message
    pub fn user(text: impl Into<String>) -> Self {
        Self::text(Role::User, text)
    }

    /// Creates an assistant message
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::text(Role::Assistant, text)
    }

    /// Concatenation of all text parts, ignoring images
    pub fn text_content(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                MessagePart::Text { text } => Some(text.as_str()),
                MessagePart::Image { .. } => None,
            })
            .collect()
    }
}

/// One choice inside a streamed or aggregated chunk
///
/// Exactly one of `delta`/`message` is populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkChoice {
    /// Choice index
    pub index: u32,
    /// Incremental content (streaming)
    pub delta: Option<Message>,
    /// Complete content (non-streaming)
    pub message: Option<Message>,
    /// Terminal marker; non-null ends this choice
    pub finish_reason: Option<String>,
}

impl ChunkChoice {
    /// Text carried by this choice, whichever slot holds it
    pub fn text(&self) -> String {
        self.delta
            .as_ref()
            .or(self.message.as_ref())
            .map(Message::text_content)
            .unwrap_or_default()
    }
}

/// A normalized unit of a generation response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageChunk {
    /// Provider-assigned response id (may be empty)
    pub id: String,
    /// Model that produced this chunk
    pub model_id: String,
    /// Choices carried by this chunk
    pub choices: Vec<ChunkChoice>,
}

impl MessageChunk {
    /// Build a single-choice streaming chunk
    ///
    /// # Examples
    ///
    /// ```
    /// use streamchat::providers::MessageChunk;
    ///
    /// let chunk = MessageChunk::delta("id-1", "gpt-4o", "Hi", None);
    /// assert_eq!(chunk.text(), "Hi");
    /// assert!(chunk.finish_reason().is_none());
    /// ```
    pub fn delta(
        id: impl Into<String>,
        model_id: impl Into<String>,
        text: impl Into<String>,
        finish_reason: Option<String>,
    ) -> Self {
        let text = text.into();
        let delta = if text.is_empty() {
            Message {
                role: Role::Assistant,
                parts: Vec::new(),
            }
        } else {
            Message::assistant(text)
        };
        Self {
            id: id.into(),
            model_id: model_id.into(),
            choices: vec![ChunkChoice {
                index: 0,
                delta: Some(delta),
                message: None,
                finish_reason,
            }],
        }
    }

    /// Build a single-choice chunk carrying a complete message
    pub fn full(
        id: impl Into<String>,
        model_id: impl Into<String>,
        message: Message,
        finish_reason: Option<String>,
    ) -> Self {
        Self {
            id: id.into(),
            model_id: model_id.into(),
            choices: vec![ChunkChoice {
                index: 0,
                delta: None,
                message: Some(message),
                finish_reason,
            }],
        }
    }

    /// Text of the first choice
    pub fn text(&self) -> String {
        self.choices.first().map(ChunkChoice::text).unwrap_or_default()
    }

    /// Finish reason of the first choice
    pub fn finish_reason(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|choice| choice.finish_reason.as_deref())
    }
}

/// Flattened conversation entry sent to providers as context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatHistoryItem {
    /// Author role
    pub role: Role,
    /// Flattened text content
    pub content: String,
}

impl ChatHistoryItem {
    /// Create a history item
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Uniform generation parameters translated by each adapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    /// Model identifier
    pub model: String,
    /// Sampling temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Output token cap
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Nucleus sampling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    /// Stream the response (false routes through `generate_text`)
    #[serde(default = "default_stream")]
    pub stream: bool,
}

fn default_stream() -> bool {
    true
}

impl GenerationParams {
    /// Parameters for a model with provider defaults for everything else
    pub fn for_model(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            temperature: None,
            max_tokens: None,
            top_p: None,
            stream: true,
        }
    }
}

/// Model metadata returned by `list_models`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Identifier used in requests
    pub id: String,
    /// Human-readable name
    pub display_name: String,
    /// Owning organisation, when reported
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owned_by: Option<String>,
}

/// Image generation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageParams {
    /// Text prompt
    pub prompt: String,
    /// Image model, provider default when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Size such as "1024x1024"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    /// Number of images
    #[serde(default = "default_image_count")]
    pub count: u32,
}

fn default_image_count() -> u32 {
    1
}

/// A single generated image
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedImage {
    /// Hosted URL, when the provider returns one
    pub url: Option<String>,
    /// Decoded image bytes, when the provider returns inline data
    pub data: Option<Vec<u8>>,
    /// Prompt as rewritten by the provider
    pub revised_prompt: Option<String>,
}

/// Result of `generate_image`
#[derive(Debug, Clone, PartialEq)]
pub struct ImageResult {
    /// Generated images in provider order
    pub images: Vec<GeneratedImage>,
}

/// What a provider family supports
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCapabilities {
    /// Supports `stream_text`
    pub supports_streaming: bool,
    /// Supports `list_models`
    pub supports_model_listing: bool,
    /// Supports `generate_image`
    pub supports_image_generation: bool,
}

/// Lazy, unbounded sequence of normalized chunks
pub type ChunkStream = BoxStream<'static, Result<MessageChunk>>;

/// Where a provider puts system-authored text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemPlacement {
    /// As a regular message using this role name
    Inline(&'static str),
    /// In a dedicated top-level instruction field
    Instruction,
}

/// Provider-specific role names
///
/// Each adapter declares one of these instead of hardcoding role strings in
/// its request builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleTable {
    /// Name for [`Role::User`]
    pub user: &'static str,
    /// Name for [`Role::Assistant`]
    pub assistant: &'static str,
    /// Placement for [`Role::System`]
    pub system: SystemPlacement,
}

impl RoleTable {
    /// Wire role name, or `None` when the role is carried out-of-band
    ///
    /// # Examples
    ///
    /// ```
    /// use streamchat::providers::{Role, RoleTable, SystemPlacement};
    ///
    /// let table = RoleTable { user: "user", assistant: "model", system: SystemPlacement::Instruction };
    /// assert_eq!(table.wire_name(Role::Assistant), Some("model"));
    /// assert_eq!(table.wire_name(Role::System), None);
    /// ```
    pub fn wire_name(&self, role: Role) -> Option<&'static str> {
        match role {
            Role::User => Some(self.user),
            Role::Assistant => Some(self.assistant),
            Role::System => match self.system {
                SystemPlacement::Inline(name) => Some(name),
                SystemPlacement::Instruction => None,
            },
        }
    }
}

/// Capability set implemented by every backend family
///
/// Settings are handed in per call and never mutated. Credential rotation
/// happens once per call, not per network retry.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Backend family this adapter serves
    fn kind(&self) -> ProviderKind;

    /// Features this adapter implements
    fn capabilities(&self) -> ProviderCapabilities;

    /// List models available for the setting
    async fn list_models(&self, setting: &ProviderSetting) -> Result<Vec<ModelInfo>>;

    /// Generate a complete answer in one request
    async fn generate_text(
        &self,
        setting: &ProviderSetting,
        history: &[ChatHistoryItem],
        params: &GenerationParams,
    ) -> Result<Message>;

    /// Open a streaming generation correlated with `task_id`
    ///
    /// The returned stream ends after the terminal sentinel, a terminal
    /// finish reason, or connection close.
    async fn stream_text(
        &self,
        setting: &ProviderSetting,
        history: &[ChatHistoryItem],
        params: &GenerationParams,
        task_id: &TaskId,
    ) -> Result<ChunkStream>;

    /// Generate images
    ///
    /// # Default Implementation
    ///
    /// Returns a request error; only families that support images override it.
    async fn generate_image(
        &self,
        _setting: &ProviderSetting,
        _params: &ImageParams,
    ) -> Result<ImageResult> {
        Err(ChatError::Request(format!(
            "image generation is not supported by {} providers",
            self.kind()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_text_content_skips_images() {
        let msg = Message {
            role: Role::User,
            parts: vec![
                MessagePart::Text { text: "look ".into() },
                MessagePart::Image {
                    url: "https://example.com/cat.png".into(),
                },
                MessagePart::Text { text: "here".into() },
            ],
        };
        assert_eq!(msg.text_content(), "look here");
    }

    #[test]
    fn test_chunk_delta_with_empty_text_has_no_parts() {
        let chunk = MessageChunk::delta("", "m", "", Some("stop".into()));
        let delta = chunk.choices[0].delta.as_ref().unwrap();
        assert!(delta.parts.is_empty());
        assert_eq!(chunk.finish_reason(), Some("stop"));
    }

    #[test]
    fn test_full_chunk_text_reads_message_slot() {
        let chunk = MessageChunk::full("x", "m", Message::assistant("whole"), None);
        assert!(chunk.choices[0].delta.is_none());
        assert_eq!(chunk.text(), "whole");
    }

    #[test]
    fn test_role_roundtrip_via_str() {
        for role in [Role::User, Role::Assistant, Role::System] {
            let parsed: Role = role.to_string().parse().unwrap();
            assert_eq!(parsed, role);
        }
        assert!("tool".parse::<Role>().is_err());
    }

    #[test]
    fn test_role_table_inline_system() {
        let table = RoleTable {
            user: "user",
            assistant: "assistant",
            system: SystemPlacement::Inline("system"),
        };
        assert_eq!(table.wire_name(Role::System), Some("system"));
    }

    #[test]
    fn test_generation_params_stream_defaults_true() {
        let params: GenerationParams = serde_json::from_str(r#"{"model":"m"}"#).unwrap();
        assert!(params.stream);
        assert!(params.temperature.is_none());
    }
}
