use crate::chat::{
    AssistantMessage, ChatCompletion, ChatCompletionChunk, ChunkChoice, CompletionChoice, Delta,
    Usage,
};
use crate::config::StreamConfig;
use axum::response::sse::Event;
use std::time::Duration;
use tokio::sync::mpsc;

pub const DONE_SENTINEL: &str = "[DONE]";

pub fn new_completion_id() -> String {
    format!("chatcmpl-{}", uuid::Uuid::new_v4().simple())
}

pub fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}

pub fn build_completion(text: &str, model: &str, request_id: &str, created: i64) -> ChatCompletion {
    ChatCompletion {
        id: request_id.to_string(),
        object: "chat.completion".to_string(),
        created,
        model: model.to_string(),
        choices: vec![CompletionChoice {
            index: 0,
            message: AssistantMessage {
                role: "assistant".to_string(),
                content: text.to_string(),
            },
            finish_reason: "stop".to_string(),
        }],
        usage: Usage::default(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Init,
    Emitting,
    Terminating { stop_sent: bool },
    Closed,
}

/// One SSE record of a simulated stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamRecord {
    Chunk(ChatCompletionChunk),
    Done,
}

impl StreamRecord {
    pub fn is_content(&self) -> bool {
        matches!(self, StreamRecord::Chunk(chunk)
            if chunk.choices.iter().any(|c| c.delta.content.is_some()))
    }

    /// The state the stream is in while this record is being written.
    pub fn phase(&self) -> StreamState {
        match self {
            _ if self.is_content() => StreamState::Emitting,
            StreamRecord::Chunk(_) => StreamState::Terminating { stop_sent: false },
            StreamRecord::Done => StreamState::Terminating { stop_sent: true },
        }
    }

    pub fn to_event(&self) -> Result<Event, axum::Error> {
        match self {
            StreamRecord::Chunk(chunk) => Event::default().json_data(chunk),
            StreamRecord::Done => Ok(Event::default().data(DONE_SENTINEL)),
        }
    }
}

/// Slices a finished answer into chat-completion chunks.
///
/// Walks `Init -> Emitting -> Terminating -> Closed`. Every chunk shares the
/// `id` and `created` fixed at construction, and the concatenated deltas
/// reproduce the text exactly. Slicing counts characters, not bytes.
#[derive(Debug)]
pub struct ChunkStream {
    id: String,
    created: i64,
    model: String,
    text: String,
    chunk_size: usize,
    cursor: usize,
    state: StreamState,
}

impl ChunkStream {
    pub fn new(
        text: String,
        model: impl Into<String>,
        id: impl Into<String>,
        created: i64,
        chunk_size: usize,
    ) -> Self {
        Self {
            id: id.into(),
            created,
            model: model.into(),
            text,
            chunk_size: chunk_size.max(1),
            cursor: 0,
            state: StreamState::Init,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn close(&mut self) {
        self.state = StreamState::Closed;
    }

    fn chunk(&self, delta: Delta, finish_reason: Option<&str>) -> ChatCompletionChunk {
        ChatCompletionChunk {
            id: self.id.clone(),
            object: "chat.completion.chunk".to_string(),
            created: self.created,
            model: self.model.clone(),
            choices: vec![ChunkChoice {
                index: 0,
                delta,
                finish_reason: finish_reason.map(str::to_string),
            }],
        }
    }

    fn next_slice(&mut self) -> Option<&str> {
        let rest = &self.text[self.cursor..];
        if rest.is_empty() {
            return None;
        }
        let end = rest
            .char_indices()
            .nth(self.chunk_size)
            .map(|(idx, _)| idx)
            .unwrap_or(rest.len());
        self.cursor += end;
        Some(&rest[..end])
    }
}

impl Iterator for ChunkStream {
    type Item = StreamRecord;

    fn next(&mut self) -> Option<StreamRecord> {
        loop {
            match self.state {
                StreamState::Init => self.state = StreamState::Emitting,
                StreamState::Emitting => match self.next_slice().map(str::to_string) {
                    Some(slice) => {
                        let delta = Delta {
                            content: Some(slice),
                        };
                        return Some(StreamRecord::Chunk(self.chunk(delta, None)));
                    }
                    None => self.state = StreamState::Terminating { stop_sent: false },
                },
                StreamState::Terminating { stop_sent: false } => {
                    self.state = StreamState::Terminating { stop_sent: true };
                    return Some(StreamRecord::Chunk(
                        self.chunk(Delta::default(), Some("stop")),
                    ));
                }
                StreamState::Terminating { stop_sent: true } => {
                    self.state = StreamState::Closed;
                    return Some(StreamRecord::Done);
                }
                StreamState::Closed => return None,
            }
        }
    }
}

/// How a pump run ended. `failed_in` names the phase whose write failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PumpOutcome {
    pub state: StreamState,
    pub failed_in: Option<StreamState>,
}

/// Feeds `stream` into `tx`, sleeping `chunk_delay` after each content chunk.
///
/// A failed send means the client went away; the stream is closed and the
/// failure logged. `tx` is dropped on every exit path, which ends the body.
pub async fn pump_stream(
    mut stream: ChunkStream,
    chunk_delay: Duration,
    tx: mpsc::Sender<Event>,
) -> PumpOutcome {
    let mut failed_in = None;
    while let Some(record) = stream.next() {
        let event = match record.to_event() {
            Ok(event) => event,
            Err(err) => {
                tracing::warn!(id = stream.id(), "stream chunk encode failed: {}", err);
                failed_in = Some(record.phase());
                stream.close();
                break;
            }
        };
        if let Err(err) = tx.send(event).await {
            tracing::warn!(
                id = stream.id(),
                phase = ?record.phase(),
                "stream send failed: {}",
                err
            );
            metrics::counter!("promptgate_streams_aborted_total").increment(1);
            failed_in = Some(record.phase());
            stream.close();
            break;
        }
        if record.is_content() {
            metrics::counter!("promptgate_stream_chunks_total").increment(1);
            if !chunk_delay.is_zero() {
                tokio::time::sleep(chunk_delay).await;
            }
        }
    }
    drop(tx);
    PumpOutcome {
        state: stream.state(),
        failed_in,
    }
}

/// Spawns the pump for `text` and returns the receiving half for the SSE body.
pub fn spawn_stream(
    text: String,
    model: &str,
    config: StreamConfig,
) -> tokio_stream::wrappers::ReceiverStream<Event> {
    let (tx, rx) = mpsc::channel::<Event>(64);
    let stream = ChunkStream::new(text, model, new_completion_id(), now_ts(), config.chunk_size);
    tokio::spawn(pump_stream(stream, config.chunk_delay, tx));
    tokio_stream::wrappers::ReceiverStream::new(rx)
}
