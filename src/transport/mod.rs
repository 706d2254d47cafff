//! Transport Stream Reader
//!
//! Opens HTTP streaming responses and yields raw text lines as they arrive.
//! The reader owns exactly one live network call per task id: opening a
//! second call under the same id cancels the first, and [`StreamReader::cancel`]
//! stops reads for a task from any thread.
//!
//! Non-success responses are converted into the crate's error taxonomy here,
//! so nothing above this layer handles raw `reqwest` errors.

pub mod sse;

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::{Client, RequestBuilder, Response};
use tokio_util::sync::CancellationToken;

use crate::config::ProviderSetting;
use crate::error::{ChatError, Result};
use crate::session::TaskId;
use sse::LineBuffer;

/// Lazy sequence of raw lines from one streaming response
pub type LineStream = BoxStream<'static, Result<String>>;

/// Connect timeout for every client
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
/// Whole-request timeout for non-streaming calls
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

type LiveCalls = Arc<Mutex<HashMap<TaskId, LiveCall>>>;

#[derive(Debug)]
struct LiveCall {
    call_id: u64,
    token: CancellationToken,
}

/// Removes a live-call entry when its stream is dropped
///
/// Only removes the entry if it still belongs to this call, so a replaced
/// call never evicts its successor.
struct LiveGuard {
    live: LiveCalls,
    task_id: TaskId,
    call_id: u64,
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        release(&self.live, &self.task_id, self.call_id);
    }
}

fn release(live: &LiveCalls, task_id: &TaskId, call_id: u64) {
    let mut calls = live.lock().unwrap_or_else(|p| p.into_inner());
    if calls.get(task_id).map(|c| c.call_id) == Some(call_id) {
        calls.remove(task_id);
    }
}

/// HTTP stream reader shared by all provider adapters
pub struct StreamReader {
    client: Client,
    proxied: Mutex<HashMap<String, Client>>,
    live: LiveCalls,
    next_call: AtomicU64,
}

impl std::fmt::Debug for StreamReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamReader")
            .field("live_calls", &self.live_count())
            .finish()
    }
}

impl StreamReader {
    /// Create a reader with a default (non-proxied) client
    ///
    /// # Errors
    ///
    /// Returns error if HTTP client initialization fails
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: build_client(None)?,
            proxied: Mutex::new(HashMap::new()),
            live: Arc::new(Mutex::new(HashMap::new())),
            next_call: AtomicU64::new(1),
        })
    }

    /// HTTP client honouring the setting's proxy
    ///
    /// Proxied clients are built once per proxy URL and reused.
    pub fn client_for(&self, setting: &ProviderSetting) -> Result<Client> {
        let Some(proxy) = setting.proxy.as_deref().filter(|p| !p.is_empty()) else {
            return Ok(self.client.clone());
        };

        let mut proxied = self.proxied.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(client) = proxied.get(proxy) {
            return Ok(client.clone());
        }
        let client = build_client(Some(proxy))?;
        proxied.insert(proxy.to_string(), client.clone());
        tracing::debug!("Built proxied HTTP client for {}", proxy);
        Ok(client)
    }

    /// Send a non-streaming request and check its status
    ///
    /// # Errors
    ///
    /// Returns a classified error for transport failures and non-2xx
    /// responses (carrying status code and body)
    pub async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.timeout(REQUEST_TIMEOUT).send().await.map_err(|e| {
            tracing::error!("Request failed: {}", e);
            ChatError::from(e)
        })?;
        check_status(response).await
    }

    /// Send a streaming request and return its body as lines
    ///
    /// Any call already live under `task_id` is cancelled first.
    ///
    /// # Errors
    ///
    /// Returns a classified error if the request fails before streaming
    /// begins, or `Cancelled` if the task is cancelled while connecting
    pub async fn open_lines(&self, task_id: &TaskId, request: RequestBuilder) -> Result<LineStream> {
        let token = CancellationToken::new();
        let call_id = self.next_call.fetch_add(1, Ordering::Relaxed);
        {
            let mut calls = self.live.lock().unwrap_or_else(|p| p.into_inner());
            let previous = calls.insert(
                task_id.clone(),
                LiveCall {
                    call_id,
                    token: token.clone(),
                },
            );
            if let Some(previous) = previous {
                tracing::warn!(task_id = %task_id, "Cancelling previous call for task");
                previous.token.cancel();
            }
        }
        let guard = LiveGuard {
            live: Arc::clone(&self.live),
            task_id: task_id.clone(),
            call_id,
        };

        let response = tokio::select! {
            _ = token.cancelled() => return Err(ChatError::Cancelled),
            result = request.send() => result.map_err(|e| {
                tracing::error!(task_id = %task_id, "Streaming request failed: {}", e);
                ChatError::from(e)
            })?,
        };
        let response = check_status(response).await?;

        tracing::debug!(task_id = %task_id, "Streaming response opened");
        Ok(line_stream(response.bytes_stream().boxed(), token, guard))
    }

    /// Cancel the live call for a task
    ///
    /// Returns false when no call is live; that is not an error.
    pub fn cancel(&self, task_id: &TaskId) -> bool {
        let mut calls = self.live.lock().unwrap_or_else(|p| p.into_inner());
        match calls.remove(task_id) {
            Some(call) => {
                call.token.cancel();
                tracing::debug!(task_id = %task_id, "Cancelled streaming call");
                true
            }
            None => false,
        }
    }

    /// Whether a call is live for the task
    pub fn is_live(&self, task_id: &TaskId) -> bool {
        self.live
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .contains_key(task_id)
    }

    fn live_count(&self) -> usize {
        self.live.lock().map(|calls| calls.len()).unwrap_or_default()
    }
}

fn build_client(proxy: Option<&str>) -> Result<Client> {
    let mut builder = Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .user_agent(concat!("streamchat/", env!("CARGO_PKG_VERSION")));
    if let Some(proxy) = proxy {
        let proxy = reqwest::Proxy::all(proxy)
            .map_err(|e| ChatError::Config(format!("Invalid proxy {}: {}", proxy, e)))?;
        builder = builder.proxy(proxy);
    }
    builder
        .build()
        .map_err(|e| ChatError::Config(format!("Failed to create HTTP client: {}", e)))
}

/// Convert a non-2xx response into a classified error
pub async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    tracing::error!("Provider returned error {}: {}", status, body);
    Err(ChatError::from_status(status.as_u16(), body))
}

struct LineState {
    bytes: BoxStream<'static, reqwest::Result<Bytes>>,
    buffer: LineBuffer,
    ready: VecDeque<String>,
    token: CancellationToken,
    finished: bool,
    _guard: LiveGuard,
}

fn line_stream(
    bytes: BoxStream<'static, reqwest::Result<Bytes>>,
    token: CancellationToken,
    guard: LiveGuard,
) -> LineStream {
    let state = LineState {
        bytes,
        buffer: LineBuffer::new(),
        ready: VecDeque::new(),
        token,
        finished: false,
        _guard: guard,
    };

    futures::stream::unfold(state, |mut st| async move {
        loop {
            if st.token.is_cancelled() && !st.finished {
                st.finished = true;
                st.ready.clear();
                return Some((Err(ChatError::Cancelled), st));
            }
            if let Some(line) = st.ready.pop_front() {
                return Some((Ok(line), st));
            }
            if st.finished {
                return None;
            }

            tokio::select! {
                biased;
                _ = st.token.cancelled() => continue,
                next = st.bytes.next() => match next {
                    Some(Ok(chunk)) => match st.buffer.push(&chunk) {
                        Ok(lines) => st.ready.extend(lines),
                        Err(e) => {
                            tracing::warn!("Dropping stream: {}", e);
                            st.finished = true;
                            st.ready.clear();
                            return Some((Err(e), st));
                        }
                    },
                    Some(Err(e)) => {
                        st.finished = true;
                        return Some((Err(ChatError::from(e)), st));
                    }
                    None => {
                        st.finished = true;
                        st.ready.extend(st.buffer.finish());
                    }
                },
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_open_lines_yields_body_lines_and_releases() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/stream"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string("data: one\n\ndata: two\n"),
            )
            .mount(&server)
            .await;

        let reader = StreamReader::new().unwrap();
        let task = TaskId::new();
        let request = reqwest::Client::new().post(format!("{}/stream", server.uri()));
        let lines: Vec<String> = reader
            .open_lines(&task, request)
            .await
            .unwrap()
            .map(|l| l.unwrap())
            .collect()
            .await;

        assert_eq!(lines, vec!["data: one", "", "data: two"]);
        assert!(!reader.is_live(&task));
    }

    #[tokio::test]
    async fn test_open_lines_classifies_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let reader = StreamReader::new().unwrap();
        let request = reqwest::Client::new().post(server.uri());
        let result = reader.open_lines(&TaskId::new(), request).await;
        match result {
            Err(ChatError::Authentication { status, body }) => {
                assert_eq!(status, 401);
                assert_eq!(body, "bad key");
            }
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_cancel_ends_stream_with_cancelled() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("data: a\n"))
            .mount(&server)
            .await;

        let reader = StreamReader::new().unwrap();
        let task = TaskId::new();
        let request = reqwest::Client::new().post(server.uri());
        let mut lines = reader.open_lines(&task, request).await.unwrap();
        assert!(reader.cancel(&task));
        assert!(matches!(lines.next().await, Some(Err(ChatError::Cancelled))));
        assert!(lines.next().await.is_none());
        assert!(!reader.cancel(&task));
    }

    #[tokio::test]
    async fn test_second_call_for_same_task_cancels_first() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("data: a\n"))
            .mount(&server)
            .await;

        let reader = StreamReader::new().unwrap();
        let task = TaskId::new();
        let client = reqwest::Client::new();
        let mut first = reader
            .open_lines(&task, client.post(server.uri()))
            .await
            .unwrap();
        let second = reader
            .open_lines(&task, client.post(server.uri()))
            .await
            .unwrap();

        assert!(matches!(first.next().await, Some(Err(ChatError::Cancelled))));
        drop(first);
        assert!(reader.is_live(&task));
        drop(second);
        assert!(!reader.is_live(&task));
    }
}
