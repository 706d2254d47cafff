//! Normalizing SSE events into [`MessageChunk`]s
//!
//! Each adapter supplies an [`EventDecoder`] describing its dialect; the
//! shared [`decode_events`] loop handles framing, the terminal sentinel, and
//! the skip-and-continue policy for malformed events.

use futures::StreamExt;

use crate::error::Result;
use crate::providers::{ChunkStream, MessageChunk};
use crate::transport::sse::{classify, SseLine};
use crate::transport::LineStream;

/// Provider-specific payload decoding
pub trait EventDecoder: Send + 'static {
    /// Payload that marks the end of the stream, if the dialect has one
    fn terminator(&self) -> Option<&'static str>;

    /// Decode one `data:` payload
    ///
    /// `Ok(None)` means the event parsed but carries no text and no finish
    /// reason. An `Err` marks the single event as malformed.
    fn decode(&mut self, payload: &str) -> Result<Option<MessageChunk>>;

    /// Whether the stream should end after emitting `chunk`
    fn ends_stream(&self, _chunk: &MessageChunk) -> bool {
        false
    }
}

struct DecodeState<D> {
    lines: LineStream,
    decoder: D,
    done: bool,
    skipped: usize,
}

/// Turn a line stream into a chunk stream using `decoder`
///
/// Transport errors end the stream after being yielded once. Malformed
/// events are logged and skipped.
pub fn decode_events<D: EventDecoder>(lines: LineStream, decoder: D) -> ChunkStream {
    let state = DecodeState {
        lines,
        decoder,
        done: false,
        skipped: 0,
    };

    futures::stream::unfold(state, |mut st| async move {
        if st.done {
            return None;
        }
        loop {
            let line = match st.lines.next().await {
                Some(Ok(line)) => line,
                Some(Err(e)) => {
                    st.done = true;
                    return Some((Err(e), st));
                }
                None => {
                    if st.skipped > 0 {
                        tracing::debug!(skipped = st.skipped, "Stream ended with skipped events");
                    }
                    return None;
                }
            };

            let payload = match classify(&line, st.decoder.terminator()) {
                SseLine::Skip => continue,
                SseLine::Terminator => {
                    tracing::debug!("Received stream terminator");
                    return None;
                }
                SseLine::Data(payload) => payload,
            };

            match st.decoder.decode(payload) {
                Ok(Some(chunk)) => {
                    if st.decoder.ends_stream(&chunk) {
                        st.done = true;
                    }
                    return Some((Ok(chunk), st));
                }
                Ok(None) => continue,
                Err(e) => {
                    st.skipped += 1;
                    tracing::warn!("Skipping malformed stream event: {}", e);
                    continue;
                }
            }
        }
    })
    .boxed()
}
