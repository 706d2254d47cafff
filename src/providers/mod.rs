//! Provider module for StreamChat
//!
//! This module contains the provider abstraction, the normalized chunk
//! model, and adapters for OpenAI-compatible and Gemini backends.

pub mod base;
pub mod gemini;
pub mod keys;
pub mod openai;
pub mod stream;

pub use base::{
    ChatHistoryItem, ChunkChoice, ChunkStream, GeneratedImage, GenerationParams, ImageParams,
    ImageResult, Message, MessageChunk, MessagePart, ModelInfo, Provider, ProviderCapabilities,
    Role, RoleTable, SystemPlacement,
};
pub use gemini::GeminiProvider;
pub use keys::KeyRotator;
pub use openai::OpenAiProvider;

use std::sync::Arc;

use crate::config::ProviderKind;
use crate::transport::StreamReader;

/// Create the adapter for a backend family
///
/// # Arguments
///
/// * `kind` - Backend family tag
/// * `reader` - Stream reader shared by all adapters
///
/// # Returns
///
/// Returns a shared provider instance
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use streamchat::config::ProviderKind;
/// use streamchat::providers::create_provider;
/// use streamchat::transport::StreamReader;
///
/// let reader = Arc::new(StreamReader::new().unwrap());
/// let provider = create_provider(ProviderKind::Gemini, reader);
/// assert_eq!(provider.kind(), ProviderKind::Gemini);
/// assert!(!provider.capabilities().supports_image_generation);
/// ```
pub fn create_provider(kind: ProviderKind, reader: Arc<StreamReader>) -> Arc<dyn Provider> {
    match kind {
        ProviderKind::OpenAi => Arc::new(OpenAiProvider::new(reader)),
        ProviderKind::Gemini => Arc::new(GeminiProvider::new(reader)),
    }
}
