use crate::api::client::{ByteStream, ChatApiError, MockStreamProducer};
use crate::types::ChatTurn;
use bytes::Bytes;
use futures::stream;
use std::sync::{Arc, Mutex};

/// Scripted stream producer for session tests. Each configured response is a
/// list of raw chunks delivered in order; chunks are passed through verbatim
/// so tests control fragment boundaries exactly.
#[derive(Clone)]
pub struct MockChatClient {
    responses: Arc<Mutex<Vec<Vec<MockChunk>>>>,
}

#[derive(Clone)]
pub enum MockChunk {
    Bytes(Vec<u8>),
    TransportError(String),
}

impl MockChunk {
    pub fn line(payload: &str) -> Self {
        Self::Bytes(format!("data: {payload}\n").into_bytes())
    }
}

impl MockChatClient {
    pub fn new(responses: Vec<Vec<MockChunk>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
        }
    }
}

impl MockStreamProducer for MockChatClient {
    fn create_mock_stream(
        &self,
        _message: &str,
        _history: &[ChatTurn],
    ) -> Result<ByteStream, ChatApiError> {
        let mut responses_guard = self.responses.lock().unwrap();
        if responses_guard.is_empty() {
            return Err(ChatApiError::Transport {
                detail: "MockChatClient: no more responses configured".to_string(),
            });
        }
        let chunks = responses_guard.remove(0);

        let items: Vec<Result<Bytes, ChatApiError>> = chunks
            .into_iter()
            .map(|chunk| match chunk {
                MockChunk::Bytes(bytes) => Ok(Bytes::from(bytes)),
                MockChunk::TransportError(detail) => Err(ChatApiError::Transport { detail }),
            })
            .collect();

        Ok(Box::pin(stream::iter(items)))
    }
}

/// Producer backed by a channel, for tests that hold a stream open and feed
/// chunks at controlled points in virtual time.
pub struct ChannelChatClient {
    rx: Mutex<Option<tokio::sync::mpsc::UnboundedReceiver<Result<Bytes, ChatApiError>>>>,
}

impl ChannelChatClient {
    pub fn new(rx: tokio::sync::mpsc::UnboundedReceiver<Result<Bytes, ChatApiError>>) -> Self {
        Self {
            rx: Mutex::new(Some(rx)),
        }
    }
}

impl MockStreamProducer for ChannelChatClient {
    fn create_mock_stream(
        &self,
        _message: &str,
        _history: &[ChatTurn],
    ) -> Result<ByteStream, ChatApiError> {
        let rx = self
            .rx
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| ChatApiError::Transport {
                detail: "ChannelChatClient: stream already taken".to_string(),
            })?;
        let stream = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });
        Ok(Box::pin(stream))
    }
}

/// Producer that fails at request time, for status-level error tests.
pub struct FailingChatClient {
    pub error: ChatApiError,
}

impl MockStreamProducer for FailingChatClient {
    fn create_mock_stream(
        &self,
        _message: &str,
        _history: &[ChatTurn],
    ) -> Result<ByteStream, ChatApiError> {
        Err(self.error.clone())
    }
}
