use crate::types::{ChatTurn, QuizData, SourceDetail};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources_used: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub topics_referenced: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_details: Vec<SourceDetail>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quiz_data: Option<QuizData>,
}

impl Message {
    pub fn user(content: String) -> Self {
        Self {
            role: Role::User,
            content,
            intent: None,
            sources_used: None,
            topics_referenced: Vec::new(),
            source_details: Vec::new(),
            quiz_data: None,
        }
    }

    fn assistant_placeholder() -> Self {
        Self {
            role: Role::Assistant,
            content: String::new(),
            intent: None,
            sources_used: None,
            topics_referenced: Vec::new(),
            source_details: Vec::new(),
            quiz_data: None,
        }
    }
}

/// Write capability for the currently open message. Minted by
/// [`Transcript::begin_assistant`]; every mutation presents it, and a ticket
/// from a closed or cleared session no longer matches, so a stale timer or an
/// orphaned task cannot touch the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTicket {
    epoch: u64,
}

/// Ordered message log. Append-only, except that the last element may be
/// mutated in place while it is "open" (receiving streamed content); at most
/// one message is open at a time and it is always the last element.
#[derive(Default)]
pub struct Transcript {
    messages: Vec<Message>,
    open_epoch: Option<u64>,
    next_epoch: u64,
    rejected_writes: u64,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn is_streaming(&self) -> bool {
        self.open_epoch.is_some()
    }

    /// Write attempts rejected because the presenting ticket was stale.
    pub fn rejected_writes(&self) -> u64 {
        self.rejected_writes
    }

    /// Closed turns as role/content pairs, for the outgoing request history.
    pub fn history_turns(&self) -> Vec<ChatTurn> {
        let closed = if self.is_streaming() {
            &self.messages[..self.messages.len().saturating_sub(1)]
        } else {
            &self.messages[..]
        };
        closed
            .iter()
            .map(|message| ChatTurn {
                role: message.role.as_str().to_string(),
                content: message.content.clone(),
            })
            .collect()
    }

    pub fn push_user(&mut self, content: String) {
        debug_assert!(!self.is_streaming(), "user message pushed during a stream");
        self.messages.push(Message::user(content));
    }

    /// Append the open assistant placeholder and mint the session's ticket.
    /// Any previously open message is closed in place first.
    pub fn begin_assistant(&mut self) -> SessionTicket {
        if self.is_streaming() {
            self.abandon_open();
        }
        self.messages.push(Message::assistant_placeholder());
        self.next_epoch += 1;
        self.open_epoch = Some(self.next_epoch);
        SessionTicket {
            epoch: self.next_epoch,
        }
    }

    fn accepts(&mut self, ticket: SessionTicket) -> bool {
        if self.open_epoch == Some(ticket.epoch) {
            true
        } else {
            self.rejected_writes += 1;
            false
        }
    }

    fn open_message_mut(&mut self) -> &mut Message {
        self.messages
            .last_mut()
            .expect("an open transcript always has a last message")
    }

    pub fn append_open(&mut self, ticket: SessionTicket, text: &str) -> bool {
        if !self.accepts(ticket) {
            return false;
        }
        self.open_message_mut().content.push_str(text);
        true
    }

    pub fn merge_open_meta(
        &mut self,
        ticket: SessionTicket,
        intent: String,
        sources_used: u32,
        topics_referenced: Vec<String>,
        source_details: Vec<SourceDetail>,
    ) -> bool {
        if !self.accepts(ticket) {
            return false;
        }
        let message = self.open_message_mut();
        message.intent = Some(intent);
        message.sources_used = Some(sources_used);
        message.topics_referenced = topics_referenced;
        message.source_details = source_details;
        true
    }

    /// Terminal close: attach quiz data (if any) and seal the content.
    pub fn close_open(&mut self, ticket: SessionTicket, quiz_data: Option<QuizData>) -> bool {
        if !self.accepts(ticket) {
            return false;
        }
        self.open_message_mut().quiz_data = quiz_data;
        self.open_epoch = None;
        true
    }

    /// Terminal failure: the explanation replaces whatever was streamed.
    pub fn fail_open(&mut self, ticket: SessionTicket, explanation: String) -> bool {
        if !self.accepts(ticket) {
            return false;
        }
        self.open_message_mut().content = explanation;
        self.open_epoch = None;
        true
    }

    /// Host-side close for a cancelled turn. Partial content is kept as a
    /// closed message; an empty placeholder is removed entirely. The epoch is
    /// retired either way, so the cancelled session's ticket goes stale.
    pub fn abandon_open(&mut self) {
        if self.open_epoch.take().is_none() {
            return;
        }
        if self
            .messages
            .last()
            .is_some_and(|message| message.content.is_empty())
        {
            self.messages.pop();
        }
    }

    /// User-initiated reset. In-flight sessions are orphaned: their tickets
    /// no longer match, so every later write attempt is rejected.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.open_epoch = None;
    }

    /// Seed the log from the archive. Only meaningful on a fresh transcript.
    pub fn restore(&mut self, messages: Vec<Message>) {
        debug_assert!(self.is_empty() && !self.is_streaming());
        self.messages = messages;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_message_is_always_last() {
        let mut transcript = Transcript::new();
        transcript.push_user("hi".to_string());
        let ticket = transcript.begin_assistant();

        assert!(transcript.is_streaming());
        assert_eq!(transcript.len(), 2);
        assert!(transcript.append_open(ticket, "hello"));
        assert_eq!(transcript.messages()[1].content, "hello");

        assert!(transcript.close_open(ticket, None));
        assert!(!transcript.is_streaming());
    }

    #[test]
    fn test_stale_ticket_after_close_is_rejected() {
        let mut transcript = Transcript::new();
        transcript.push_user("hi".to_string());
        let ticket = transcript.begin_assistant();
        transcript.close_open(ticket, None);

        assert!(!transcript.append_open(ticket, "late"));
        assert_eq!(transcript.messages()[1].content, "");
        assert_eq!(transcript.rejected_writes(), 1);
    }

    #[test]
    fn test_clear_orphans_the_open_session() {
        let mut transcript = Transcript::new();
        transcript.push_user("hi".to_string());
        let ticket = transcript.begin_assistant();
        transcript.append_open(ticket, "partial");

        transcript.clear();
        assert!(transcript.is_empty());

        assert!(!transcript.append_open(ticket, "more"));
        assert!(!transcript.close_open(ticket, None));
        assert!(transcript.is_empty(), "orphaned writes must not resurrect messages");
        assert_eq!(transcript.rejected_writes(), 2);
    }

    #[test]
    fn test_new_session_invalidates_previous_ticket() {
        let mut transcript = Transcript::new();
        transcript.push_user("first".to_string());
        let stale = transcript.begin_assistant();
        transcript.close_open(stale, None);

        transcript.push_user("second".to_string());
        let fresh = transcript.begin_assistant();

        assert!(!transcript.append_open(stale, "x"));
        assert!(transcript.append_open(fresh, "y"));
        assert_eq!(transcript.messages().last().unwrap().content, "y");
    }

    #[test]
    fn test_fail_open_replaces_content_and_keeps_position() {
        let mut transcript = Transcript::new();
        transcript.push_user("hi".to_string());
        let ticket = transcript.begin_assistant();
        transcript.append_open(ticket, "half an ans");

        assert!(transcript.fail_open(ticket, "something went wrong".to_string()));
        let last = transcript.messages().last().unwrap();
        assert_eq!(last.role, Role::Assistant);
        assert_eq!(last.content, "something went wrong");
        assert!(!transcript.is_streaming());
    }

    #[test]
    fn test_abandon_open_drops_empty_placeholder_keeps_partial() {
        let mut transcript = Transcript::new();
        transcript.push_user("hi".to_string());
        transcript.begin_assistant();
        transcript.abandon_open();
        assert_eq!(transcript.len(), 1, "empty placeholder should be removed");

        let ticket = transcript.begin_assistant();
        transcript.append_open(ticket, "partial answer");
        transcript.abandon_open();
        assert_eq!(transcript.messages().last().unwrap().content, "partial answer");
        assert!(!transcript.append_open(ticket, "late"));
    }

    #[test]
    fn test_history_turns_excludes_open_message() {
        let mut transcript = Transcript::new();
        transcript.push_user("q1".to_string());
        let ticket = transcript.begin_assistant();
        transcript.append_open(ticket, "a1");
        transcript.close_open(ticket, None);

        transcript.push_user("q2".to_string());
        transcript.begin_assistant();

        let history = transcript.history_turns();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].role, "user");
        assert_eq!(history[1].content, "a1");
        assert_eq!(history[2].content, "q2");
    }

    #[test]
    fn test_merge_open_meta_sets_fields_once() {
        let mut transcript = Transcript::new();
        transcript.push_user("hi".to_string());
        let ticket = transcript.begin_assistant();
        assert!(transcript.merge_open_meta(
            ticket,
            "explain".to_string(),
            2,
            vec!["osmosis".to_string()],
            Vec::new(),
        ));
        let open = transcript.messages().last().unwrap();
        assert_eq!(open.intent.as_deref(), Some("explain"));
        assert_eq!(open.sources_used, Some(2));
        assert_eq!(open.topics_referenced, vec!["osmosis".to_string()]);
    }
}
