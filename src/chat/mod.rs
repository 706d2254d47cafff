//! Chat Facade and generation orchestration
//!
//! [`ChatFacade`] hides which adapter serves a provider setting.
//! [`ChatController`] ties the facade, the session task registry, the
//! response consumer, and persistence together into send, regenerate,
//! cancel, and session-switch flows.

pub mod consumer;
pub mod controller;
pub mod events;
pub mod hint;
pub mod regenerate;

pub use consumer::{ConsumeOutcome, ResponseConsumer};
pub use controller::{ChatController, Generation, GenerationOutcome, ViewKind, ViewMessage};
pub use events::{ChatEvent, EventSink};
pub use hint::SlowHint;
pub use regenerate::{plan_regenerate, RegeneratePlan};

use std::collections::HashMap;
use std::sync::Arc;

use futures::StreamExt;

use crate::config::{ProviderKind, ProviderSetting};
use crate::error::Result;
use crate::providers::{
    create_provider, ChatHistoryItem, ChunkStream, GenerationParams, ImageParams, ImageResult,
    MessageChunk, ModelInfo, Provider,
};
use crate::session::TaskId;
use crate::transport::StreamReader;

/// Finish reason attached to aggregated (non-streaming) answers
pub const AGGREGATED_FINISH_REASON: &str = "stop";

/// Provider-independent entry point for generation
pub struct ChatFacade {
    reader: Arc<StreamReader>,
    providers: HashMap<ProviderKind, Arc<dyn Provider>>,
}

impl std::fmt::Debug for ChatFacade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatFacade")
            .field("reader", &self.reader)
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ChatFacade {
    /// Create a facade with its own stream reader
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new() -> Result<Self> {
        Ok(Self::with_reader(Arc::new(StreamReader::new()?)))
    }

    /// Create a facade around an existing stream reader
    pub fn with_reader(reader: Arc<StreamReader>) -> Self {
        let providers = [ProviderKind::OpenAi, ProviderKind::Gemini]
            .into_iter()
            .map(|kind| (kind, create_provider(kind, Arc::clone(&reader))))
            .collect();
        Self { reader, providers }
    }

    fn provider(&self, setting: &ProviderSetting) -> Arc<dyn Provider> {
        match self.providers.get(&setting.kind) {
            Some(provider) => Arc::clone(provider),
            None => create_provider(setting.kind, Arc::clone(&self.reader)),
        }
    }

    /// Start a generation and return its chunk stream
    ///
    /// Streaming parameters open an SSE stream correlated with `task_id`.
    /// Non-streaming parameters make one aggregated call and yield a single
    /// chunk carrying the full message.
    ///
    /// # Errors
    ///
    /// Returns a classified error if the call cannot be started
    pub async fn stream_chat(
        &self,
        history: &[ChatHistoryItem],
        setting: &ProviderSetting,
        params: &GenerationParams,
        task_id: &TaskId,
    ) -> Result<ChunkStream> {
        let provider = self.provider(setting);
        tracing::debug!(
            task_id = %task_id,
            provider = %setting.name,
            kind = %setting.kind,
            stream = params.stream,
            "Starting generation"
        );

        if params.stream {
            return provider.stream_text(setting, history, params, task_id).await;
        }

        let message = provider.generate_text(setting, history, params).await?;
        let chunk = MessageChunk::full(
            task_id.to_string(),
            params.model.clone(),
            message,
            Some(AGGREGATED_FINISH_REASON.to_string()),
        );
        Ok(futures::stream::iter([Ok(chunk)]).boxed())
    }

    /// Cancel the network call for a task
    ///
    /// Returns false when no call is live for the task.
    pub fn cancel_streaming(&self, task_id: &TaskId) -> bool {
        self.reader.cancel(task_id)
    }

    /// One-shot generation without streaming
    pub async fn generate_text(
        &self,
        history: &[ChatHistoryItem],
        setting: &ProviderSetting,
        params: &GenerationParams,
    ) -> Result<String> {
        let message = self
            .provider(setting)
            .generate_text(setting, history, params)
            .await?;
        Ok(message.text_content())
    }

    /// Models available for a setting
    pub async fn list_models(&self, setting: &ProviderSetting) -> Result<Vec<ModelInfo>> {
        self.provider(setting).list_models(setting).await
    }

    /// Generate images with a setting that supports it
    pub async fn generate_image(
        &self,
        setting: &ProviderSetting,
        params: &ImageParams,
    ) -> Result<ImageResult> {
        self.provider(setting).generate_image(setting, params).await
    }
}
