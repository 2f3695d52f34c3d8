use serde::{Deserialize, Serialize};

/// One prior turn of the conversation, as sent to the chat endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

/// Request body for the streaming chat endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ChatStreamRequest<'a> {
    pub message: &'a str,
    pub student_context: &'a str,
    pub history: &'a [ChatTurn],
}

/// A retrieval hit the answer drew on, reported in the `meta` event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceDetail {
    pub source: String,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub score: Option<f64>,
}

/// Quiz payload attached to a `done` event when the turn produced a question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuizData {
    pub options: Vec<String>,
    pub correct_letter: String,
}

/// One parsed frame of the chat stream.
///
/// The protocol promises at most one `Meta` before any `Token`, then zero or
/// more `Token`s, then exactly one terminal `Done` or `Error`. Frames with an
/// unrecognized `type` deserialize to `Unknown` and are dropped by the parser.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Meta {
        intent: String,
        sources_used: u32,
        #[serde(default)]
        topics_referenced: Vec<String>,
        #[serde(default)]
        source_details: Vec<SourceDetail>,
    },
    Token {
        text: String,
    },
    Done {
        quiz_data: Option<QuizData>,
    },
    Error {
        detail: String,
    },
    #[serde(other)]
    Unknown,
}
