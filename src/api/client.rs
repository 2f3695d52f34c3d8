use super::logging::{debug_payload_enabled, emit_debug_payload};
use crate::config::Config;
use crate::types::{ChatStreamRequest, ChatTurn};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::StatusCode;
use std::pin::Pin;
#[cfg(test)]
use std::sync::Arc;

use crate::util::is_local_endpoint_url;

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, ChatApiError>> + Send>>;

/// Outcome of opening (or reading) the chat stream, split the way the session
/// controller needs to react: 401 is distinguished so the host can purge the
/// stored credential, everything else carries user-facing text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatApiError {
    /// The request was rejected with HTTP 401.
    Unauthorized,
    /// The far end answered with a non-success status; `detail` is the
    /// response body's `detail` field, or an `HTTP <status>` fallback.
    Upstream { detail: String },
    /// The request never completed or the connection dropped mid-stream.
    Transport { detail: String },
}

impl std::fmt::Display for ChatApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unauthorized => write!(f, "unauthorized (HTTP 401)"),
            Self::Upstream { detail } | Self::Transport { detail } => write!(f, "{detail}"),
        }
    }
}

impl std::error::Error for ChatApiError {}

#[cfg(test)]
pub trait MockStreamProducer: Send + Sync {
    fn create_mock_stream(&self, message: &str, history: &[ChatTurn])
        -> Result<ByteStream, ChatApiError>;
}

#[derive(Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    api_url: String,
    bearer_token: Option<String>,
    student_context: String,
    #[cfg(test)]
    mock_stream_producer: Option<Arc<dyn MockStreamProducer>>,
}

impl ChatClient {
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: config.api_url.clone(),
            bearer_token: config.bearer_token.clone(),
            student_context: config.student.clone(),
            #[cfg(test)]
            mock_stream_producer: None,
        }
    }

    #[cfg(test)]
    pub fn new_mock(producer: Arc<dyn MockStreamProducer>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: "http://localhost:8000/chat/stream".to_string(),
            bearer_token: None,
            student_context: "default".to_string(),
            mock_stream_producer: Some(producer),
        }
    }

    /// Forget the bearer credential; subsequent requests go unauthenticated.
    pub fn discard_token(&mut self) {
        self.bearer_token = None;
    }

    pub fn endpoint(&self) -> &str {
        &self.api_url
    }

    /// Open the streaming chat request and hand back the raw body stream.
    ///
    /// Status handling happens here, before any frame is read: 401 maps to
    /// [`ChatApiError::Unauthorized`], any other non-2xx surfaces the body's
    /// `detail` field. The returned stream yields transport failures as
    /// [`ChatApiError::Transport`] items.
    pub async fn open_stream(
        &self,
        message: &str,
        history: &[ChatTurn],
    ) -> Result<ByteStream, ChatApiError> {
        #[cfg(test)]
        {
            if let Some(producer) = &self.mock_stream_producer {
                return producer.create_mock_stream(message, history);
            }
        }

        let payload = ChatStreamRequest {
            message,
            student_context: &self.student_context,
            history,
        };

        if debug_payload_enabled() {
            if let Ok(value) = serde_json::to_value(&payload) {
                emit_debug_payload(&self.api_url, &value);
            }
        }

        let mut request = self
            .http
            .post(&self.api_url)
            .header("content-type", "application/json")
            .json(&payload);
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|error| transport_error(&error, &self.api_url))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(ChatApiError::Unauthorized);
        }
        if !status.is_success() {
            let detail = response
                .json::<serde_json::Value>()
                .await
                .ok()
                .and_then(|body| {
                    body.get("detail")
                        .and_then(|d| d.as_str())
                        .map(str::to_string)
                })
                .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
            return Err(ChatApiError::Upstream { detail });
        }

        let api_url = self.api_url.clone();
        let stream = response
            .bytes_stream()
            .map(move |item| item.map_err(|error| transport_error(&error, &api_url)));
        Ok(Box::pin(stream))
    }
}

fn transport_error(error: &reqwest::Error, api_url: &str) -> ChatApiError {
    let detail = if error.is_connect() && is_local_endpoint_url(api_url) {
        format!("cannot reach the study server at '{api_url}' ({error})")
    } else if error.is_connect() {
        format!("cannot reach '{api_url}' ({error})")
    } else if error.is_timeout() {
        format!("request to '{api_url}' timed out ({error})")
    } else {
        format!("request to '{api_url}' failed ({error})")
    };
    ChatApiError::Transport { detail }
}
