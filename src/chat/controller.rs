//! Send / regenerate / cancel orchestration
//!
//! The controller owns the visible conversation state for every session it
//! has opened and starts generations through the [`ChatFacade`]. Each
//! generation is registered in the [`SessionTaskRegistry`] before its task
//! is spawned, so it can always be cancelled by a later send, regenerate,
//! or session switch.
//!
//! A running generation holds its session's writer lock until it has made
//! its last storage write. Send and regenerate cancel the running
//! generation and take that lock before touching storage, so writes for one
//! session never interleave.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::consumer::{ConsumeOutcome, ResponseConsumer};
use super::events::{ChatEvent, EventSink};
use super::regenerate::plan_regenerate;
use super::ChatFacade;
use crate::config::{Config, ProviderSetting, SessionSettings};
use crate::error::Result;
use crate::providers::{ChatHistoryItem, GenerationParams, Role};
use crate::session::{JobHandle, SessionId, SessionTaskRegistry, TaskId};
use crate::storage::PersistenceGateway;

/// Text shown while an answer is being generated
pub const PLACEHOLDER_TEXT: &str = "...";

/// How a visible message relates to the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewKind {
    /// Part of the conversation sent to providers
    Chat,
    /// Stand-in for an answer being generated
    Placeholder,
    /// System notice shown to the user only
    Notice,
}

/// One message as the user sees it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewMessage {
    /// Author role
    pub role: Role,
    /// Text content
    pub content: String,
    /// Kind of entry
    pub kind: ViewKind,
}

impl ViewMessage {
    fn chat(item: ChatHistoryItem) -> Self {
        Self {
            role: item.role,
            content: item.content,
            kind: ViewKind::Chat,
        }
    }

    fn placeholder() -> Self {
        Self {
            role: Role::Assistant,
            content: PLACEHOLDER_TEXT.to_string(),
            kind: ViewKind::Placeholder,
        }
    }

    fn notice(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: text.into(),
            kind: ViewKind::Notice,
        }
    }
}

#[derive(Debug, Default)]
struct SessionView {
    messages: Vec<ViewMessage>,
    generating: Option<TaskId>,
    writer: Arc<AsyncMutex<()>>,
}

impl SessionView {
    fn from_history(items: Vec<ChatHistoryItem>) -> Self {
        Self {
            messages: items.into_iter().map(ViewMessage::chat).collect(),
            ..Self::default()
        }
    }

    /// Replace the conversation with stored items, keeping notices
    fn reload(&mut self, items: Vec<ChatHistoryItem>) {
        let notices: Vec<ViewMessage> = self
            .messages
            .iter()
            .filter(|m| m.kind == ViewKind::Notice)
            .cloned()
            .collect();
        self.messages = items.into_iter().map(ViewMessage::chat).collect();
        self.messages.extend(notices);
    }

    fn history(&self) -> Vec<ChatHistoryItem> {
        self.messages
            .iter()
            .filter(|m| m.kind == ViewKind::Chat)
            .map(|m| ChatHistoryItem::new(m.role, m.content.clone()))
            .collect()
    }

    fn owned_by(&self, task_id: &TaskId) -> bool {
        self.generating.as_ref() == Some(task_id)
    }

    fn remove_last_answer(&mut self) {
        if let Some(index) = self
            .messages
            .iter()
            .rposition(|m| m.kind == ViewKind::Chat && m.role == Role::Assistant)
        {
            self.messages.remove(index);
        }
    }

    fn drop_placeholders(&mut self) {
        self.messages.retain(|m| m.kind != ViewKind::Placeholder);
    }
}

#[derive(Debug)]
struct ControllerState {
    active: SessionId,
    views: HashMap<SessionId, SessionView>,
}

/// Result of a finished generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutcome {
    /// Answer generated and persisted
    Completed(String),
    /// Stopped by the user, a newer generation, or a session switch
    Cancelled,
    /// Failed; carries the user-facing message that was shown
    Failed(String),
}

/// A running generation
#[derive(Debug)]
pub struct Generation {
    session_id: SessionId,
    task_id: TaskId,
    handle: JoinHandle<GenerationOutcome>,
}

impl Generation {
    /// Session being answered
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Task id registered for this generation
    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    /// Wait for the generation to reach a terminal state
    pub async fn wait(self) -> GenerationOutcome {
        match self.handle.await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(task_id = %self.task_id, "Generation task failed: {}", e);
                GenerationOutcome::Failed(format!("Generation stopped unexpectedly: {}", e))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LaunchMode {
    Send,
    Regenerate,
}

struct Inner {
    facade: Arc<ChatFacade>,
    registry: Arc<SessionTaskRegistry>,
    store: Arc<dyn PersistenceGateway>,
    consumer: ResponseConsumer,
    setting: ProviderSetting,
    session: SessionSettings,
    sink: EventSink,
    state: Mutex<ControllerState>,
}

/// Conversation controller for one user
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use streamchat::chat::{ChatController, ChatFacade, EventSink};
/// use streamchat::config::Config;
/// use streamchat::session::SessionTaskRegistry;
/// use streamchat::storage::InMemoryStore;
///
/// # async fn example() -> streamchat::error::Result<()> {
/// let controller = ChatController::new(
///     &Config::default(),
///     Arc::new(ChatFacade::new()?),
///     Arc::new(SessionTaskRegistry::new()),
///     Arc::new(InMemoryStore::new()),
///     EventSink::disabled(),
/// )?;
/// if let Some(generation) = controller.send("Hello").await? {
///     println!("{:?}", generation.wait().await);
/// }
/// # Ok(())
/// # }
/// ```
pub struct ChatController {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ChatController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatController")
            .field("provider", &self.inner.setting.name)
            .field("active_session", &self.active_session())
            .finish()
    }
}

impl ChatController {
    /// Create a controller for the config's active provider
    ///
    /// Starts on a fresh, empty session.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the active provider is unknown
    pub fn new(
        config: &Config,
        facade: Arc<ChatFacade>,
        registry: Arc<SessionTaskRegistry>,
        store: Arc<dyn PersistenceGateway>,
        sink: EventSink,
    ) -> Result<Self> {
        let setting = config.provider.active_setting()?.clone();
        let active = uuid::Uuid::new_v4().to_string();
        let mut views = HashMap::new();
        views.insert(active.clone(), SessionView::default());

        let consumer = ResponseConsumer::new(Arc::clone(&store), config.streaming.clone(), sink.clone());
        Ok(Self {
            inner: Arc::new(Inner {
                facade,
                registry,
                store,
                consumer,
                setting,
                session: config.session.clone(),
                sink,
                state: Mutex::new(ControllerState { active, views }),
            }),
        })
    }

    /// Session receiving sends and regenerates
    pub fn active_session(&self) -> SessionId {
        self.inner.lock().active.clone()
    }

    /// Make `session_id` active, cancelling the previous session's generation
    ///
    /// The session's messages are loaded from storage the first time it is
    /// opened.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the messages cannot be loaded
    pub async fn switch_session(&self, session_id: &str) -> Result<()> {
        let (previous, loaded) = {
            let mut state = self.inner.lock();
            if state.active == session_id {
                return Ok(());
            }
            let previous = std::mem::replace(&mut state.active, session_id.to_string());
            (previous, state.views.contains_key(session_id))
        };

        if self.inner.cancel_session(&previous) {
            tracing::info!(
                from = %previous,
                to = %session_id,
                "Cancelled generation of previous session"
            );
        }

        if !loaded {
            let items = self.inner.store.load_messages(session_id).await?;
            tracing::debug!(session_id = %session_id, messages = items.len(), "Loaded session");
            self.inner
                .lock()
                .views
                .entry(session_id.to_string())
                .or_insert_with(|| SessionView::from_history(items));
        }
        Ok(())
    }

    /// Switch to a brand-new session and return its id
    pub async fn new_session(&self) -> Result<SessionId> {
        let session_id = uuid::Uuid::new_v4().to_string();
        self.inner
            .lock()
            .views
            .insert(session_id.clone(), SessionView::default());
        self.switch_session(&session_id).await?;
        Ok(session_id)
    }

    /// Send a user message in the active session and start answering it
    ///
    /// Returns `None` for blank input.
    ///
    /// # Errors
    ///
    /// Returns error if no model is configured or the user message cannot
    /// be persisted. Generation failures are reported through the returned
    /// [`Generation`] and a notice in the session view.
    pub async fn send(&self, text: &str) -> Result<Option<Generation>> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }
        let params = self.inner.session.generation_params(&self.inner.setting)?;
        let session_id = self.active_session();
        let writer = self.inner.quiesce(&session_id).await;

        let item = ChatHistoryItem::new(Role::User, text);
        self.inner.store.append_message(&session_id, &item).await?;

        let history = {
            let mut state = self.inner.lock();
            let view = state.views.entry(session_id.clone()).or_default();
            view.drop_placeholders();
            view.messages.push(ViewMessage::chat(item));
            view.history()
        };

        tracing::info!(session_id = %session_id, "Sending message");
        Ok(Some(self.launch(session_id, history, params, LaunchMode::Send, writer)))
    }

    /// Drop the last answer of the active session and generate it again
    ///
    /// A generation still running in the session is cancelled first; its
    /// partial answer is then the one replaced. Returns `None` without
    /// touching the registry when the session has no user message to answer.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if no model is configured, or a storage
    /// error if the session cannot be reloaded
    pub async fn regenerate(&self) -> Result<Option<Generation>> {
        let session_id = self.active_session();
        let visible = {
            let state = self.inner.lock();
            state
                .views
                .get(&session_id)
                .map(SessionView::history)
                .unwrap_or_default()
        };
        if plan_regenerate(&visible).is_none() {
            tracing::debug!(session_id = %session_id, "Nothing to regenerate");
            return Ok(None);
        }
        let params = self.inner.session.generation_params(&self.inner.setting)?;
        let writer = self.inner.quiesce(&session_id).await;

        let items = self.inner.store.load_messages(&session_id).await?;
        let Some(plan) = plan_regenerate(&items) else {
            tracing::debug!(session_id = %session_id, "Nothing to regenerate");
            return Ok(None);
        };
        self.inner
            .lock()
            .views
            .entry(session_id.clone())
            .or_default()
            .reload(items);

        tracing::info!(session_id = %session_id, "Regenerating last answer");
        Ok(Some(self.launch(
            session_id,
            plan.history,
            params,
            LaunchMode::Regenerate,
            writer,
        )))
    }

    /// Cancel the active session's generation
    pub fn cancel(&self) -> bool {
        let session_id = self.active_session();
        self.inner.cancel_session(&session_id)
    }

    /// Cancel every generation
    pub fn shutdown(&self) -> usize {
        self.inner.registry.clear()
    }

    /// Visible messages of a session
    pub fn messages(&self, session_id: &str) -> Vec<ViewMessage> {
        self.inner
            .lock()
            .views
            .get(session_id)
            .map(|v| v.messages.clone())
            .unwrap_or_default()
    }

    /// Whether a session is waiting on a generation
    pub fn is_generating(&self, session_id: &str) -> bool {
        self.inner
            .lock()
            .views
            .get(session_id)
            .is_some_and(|v| v.generating.is_some())
    }

    fn launch(
        &self,
        session_id: SessionId,
        history: Vec<ChatHistoryItem>,
        params: GenerationParams,
        mode: LaunchMode,
        writer: OwnedMutexGuard<()>,
    ) -> Generation {
        let task_id = TaskId::new();
        let token = CancellationToken::new();
        let hint_token =
            (!self.inner.consumer.settings().typing_mode).then(|| token.child_token());

        let streaming = JobHandle::new(task_id.clone(), token.clone());
        let hint = hint_token
            .as_ref()
            .map(|t| JobHandle::new(task_id.clone(), t.clone()));
        self.inner.registry.register(&session_id, streaming, hint);
        self.inner
            .lock()
            .views
            .entry(session_id.clone())
            .or_default()
            .generating = Some(task_id.clone());

        self.inner.sink.emit(ChatEvent::Started {
            session_id: session_id.clone(),
            task_id: task_id.clone(),
        });

        let history = self.inner.with_system_prompt(history);
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn({
            let session_id = session_id.clone();
            let task_id = task_id.clone();
            async move {
                let outcome = inner
                    .run(session_id, task_id, token, hint_token, history, params, mode)
                    .await;
                drop(writer);
                outcome
            }
        });

        Generation {
            session_id,
            task_id,
            handle,
        }
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn cancel_session(&self, session_id: &str) -> bool {
        let task = self.registry.current_task(session_id);
        let cancelled = self.registry.cancel(session_id);
        if let Some(task) = task {
            self.facade.cancel_streaming(&task);
        }
        cancelled
    }

    /// Stop the session's generation and wait until it has stopped writing
    async fn quiesce(&self, session_id: &str) -> OwnedMutexGuard<()> {
        let writer = Arc::clone(
            &self
                .lock()
                .views
                .entry(session_id.to_string())
                .or_default()
                .writer,
        );
        if self.cancel_session(session_id) {
            tracing::debug!(session_id = %session_id, "Cancelled running generation");
        }
        writer.lock_owned().await
    }

    fn with_system_prompt(&self, history: Vec<ChatHistoryItem>) -> Vec<ChatHistoryItem> {
        match self
            .session
            .system_prompt
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
        {
            Some(prompt) => std::iter::once(ChatHistoryItem::new(Role::System, prompt))
                .chain(history)
                .collect(),
            None => history,
        }
    }

    /// Apply `f` to the session view if `task_id` still owns it
    fn update_view<F: FnOnce(&mut SessionView)>(&self, session_id: &str, task_id: &TaskId, f: F) -> bool {
        let mut state = self.lock();
        match state.views.get_mut(session_id) {
            Some(view) if view.owned_by(task_id) => {
                f(view);
                true
            }
            _ => false,
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn run(
        self: Arc<Self>,
        session_id: SessionId,
        task_id: TaskId,
        token: CancellationToken,
        hint_token: Option<CancellationToken>,
        history: Vec<ChatHistoryItem>,
        params: GenerationParams,
        mode: LaunchMode,
    ) -> GenerationOutcome {
        let result = self
            .generate(&session_id, &task_id, &token, hint_token, &history, &params, mode)
            .await;
        self.registry.remove_task(&session_id, &task_id);

        let outcome = match result {
            Ok(ConsumeOutcome::Completed(content)) => {
                self.update_view(&session_id, &task_id, |view| {
                    view.drop_placeholders();
                    view.messages.push(ViewMessage::chat(ChatHistoryItem::new(
                        Role::Assistant,
                        content.clone(),
                    )));
                });
                self.sink.emit(ChatEvent::Completed {
                    session_id: session_id.clone(),
                    content: content.clone(),
                });
                GenerationOutcome::Completed(content)
            }
            Ok(ConsumeOutcome::Cancelled) => self.cancelled(&session_id, &task_id).await,
            Err(e) if e.is_cancelled() || token.is_cancelled() => {
                self.cancelled(&session_id, &task_id).await
            }
            Err(e) => {
                let message = e.user_message();
                tracing::error!(session_id = %session_id, task_id = %task_id, "Generation failed: {}", e);
                self.resync(&session_id, &task_id).await;
                self.update_view(&session_id, &task_id, |view| {
                    view.messages.push(ViewMessage::notice(message.clone()));
                });
                self.sink.emit(ChatEvent::Failed {
                    session_id: session_id.clone(),
                    message: message.clone(),
                });
                GenerationOutcome::Failed(message)
            }
        };

        self.update_view(&session_id, &task_id, |view| view.generating = None);
        outcome
    }

    #[allow(clippy::too_many_arguments)]
    async fn generate(
        &self,
        session_id: &str,
        task_id: &TaskId,
        token: &CancellationToken,
        hint_token: Option<CancellationToken>,
        history: &[ChatHistoryItem],
        params: &GenerationParams,
        mode: LaunchMode,
    ) -> Result<ConsumeOutcome> {
        let stream = tokio::select! {
            biased;
            _ = token.cancelled() => return Ok(ConsumeOutcome::Cancelled),
            stream = self.facade.stream_chat(history, &self.setting, params, task_id) => stream?,
        };
        if token.is_cancelled() {
            return Ok(ConsumeOutcome::Cancelled);
        }

        if mode == LaunchMode::Regenerate {
            self.store.remove_last_assistant_message(session_id).await?;
            if token.is_cancelled() {
                return Ok(ConsumeOutcome::Cancelled);
            }
        }
        self.update_view(session_id, task_id, |view| {
            if mode == LaunchMode::Regenerate {
                view.remove_last_answer();
            }
            view.messages.push(ViewMessage::placeholder());
        });

        self.consumer
            .consume(session_id, stream, token, hint_token)
            .await
    }

    async fn cancelled(&self, session_id: &str, task_id: &TaskId) -> GenerationOutcome {
        self.resync(session_id, task_id).await;
        self.sink.emit(ChatEvent::Cancelled {
            session_id: session_id.to_string(),
        });
        GenerationOutcome::Cancelled
    }

    /// Rebuild a session view from storage after an unfinished generation
    async fn resync(&self, session_id: &str, task_id: &TaskId) {
        if !self.update_view(session_id, task_id, SessionView::drop_placeholders) {
            return;
        }
        match self.store.load_messages(session_id).await {
            Ok(items) => {
                self.update_view(session_id, task_id, |view| view.reload(items));
            }
            Err(e) => tracing::warn!(session_id = %session_id, "Failed to reload session: {}", e),
        }
    }
}
