use crate::api::client::{ByteStream, ChatApiError, ChatClient};
use crate::api::logging::emit_dropped_frames;
use crate::api::stream::StreamParser;
use crate::state::transcript::{SessionTicket, Transcript};
use crate::types::{ChatTurn, QuizData, StreamEvent};
use futures::StreamExt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Coalescing window for token commits. Tokens arriving inside the window are
/// batched into a single transcript update; nothing is ever dropped.
const TOKEN_FLUSH_INTERVAL: Duration = Duration::from_millis(50);

pub const REAUTH_MESSAGE: &str =
    "Your session has expired. Please sign in again and resend your question.";

/// Notifications the session sends the hosting surface. The transcript itself
/// is the source of truth; these exist to wake the UI and to report the two
/// outcomes the host must act on (turn finished, credential rejected).
#[derive(Debug, PartialEq, Eq)]
pub enum SessionUpdate {
    ContentChanged,
    TurnComplete,
    TurnFailed(String),
    Unauthorized,
}

/// One in-flight chat turn: owns the request, the frame parser, the token
/// buffer and its flush timer. Created per send, torn down at the terminal
/// event or on cancellation.
pub struct ChatSession {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl ChatSession {
    /// Append the user message and the open assistant placeholder
    /// synchronously, then spawn the task that drives the stream.
    pub fn start(
        client: ChatClient,
        transcript: Arc<Mutex<Transcript>>,
        prompt: String,
        history: Vec<ChatTurn>,
        update_tx: mpsc::UnboundedSender<SessionUpdate>,
    ) -> Self {
        let ticket = {
            let mut guard = transcript.lock().unwrap();
            guard.push_user(prompt.clone());
            guard.begin_assistant()
        };

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_session(
            client,
            transcript,
            ticket,
            prompt,
            history,
            cancel.clone(),
            update_tx,
        ));

        Self { cancel, task }
    }

    /// Abort the transport and stop all further transcript writes.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

enum Outcome {
    Done(Option<QuizData>),
    EndOfStream,
    Upstream(String),
    Transport(String),
}

async fn run_session(
    client: ChatClient,
    transcript: Arc<Mutex<Transcript>>,
    ticket: SessionTicket,
    prompt: String,
    history: Vec<ChatTurn>,
    cancel: CancellationToken,
    update_tx: mpsc::UnboundedSender<SessionUpdate>,
) {
    let open_result = tokio::select! {
        () = cancel.cancelled() => return,
        result = client.open_stream(&prompt, &history) => result,
    };

    let stream = match open_result {
        Ok(stream) => stream,
        Err(ChatApiError::Unauthorized) => {
            transcript
                .lock()
                .unwrap()
                .fail_open(ticket, REAUTH_MESSAGE.to_string());
            let _ = update_tx.send(SessionUpdate::Unauthorized);
            return;
        }
        // A non-2xx status surfaces its `detail` verbatim; transport failures
        // get the generic retry hint.
        Err(ChatApiError::Upstream { detail }) => {
            transcript.lock().unwrap().fail_open(ticket, detail.clone());
            let _ = update_tx.send(SessionUpdate::TurnFailed(detail));
            return;
        }
        Err(ChatApiError::Transport { detail }) => {
            transcript
                .lock()
                .unwrap()
                .fail_open(ticket, transport_failure_text(&detail));
            let _ = update_tx.send(SessionUpdate::TurnFailed(detail));
            return;
        }
    };

    drive_stream(
        stream,
        client.endpoint(),
        transcript,
        ticket,
        cancel,
        update_tx,
    )
    .await;
}

/// Pump chunks through the parser and apply events in order. Token text is
/// staged in `pending_text` and committed when the single-shot flush timer
/// fires; terminal events cancel the timer and settle the buffer themselves.
async fn drive_stream(
    mut stream: ByteStream,
    endpoint: &str,
    transcript: Arc<Mutex<Transcript>>,
    ticket: SessionTicket,
    cancel: CancellationToken,
    update_tx: mpsc::UnboundedSender<SessionUpdate>,
) {
    let mut parser = StreamParser::new();
    let mut pending_text = String::new();
    let mut flush_deadline: Option<Instant> = None;
    let mut saw_token = false;
    let mut meta_applied = false;

    let outcome = loop {
        let flush_timer = async move {
            match flush_deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            () = cancel.cancelled() => return,
            () = flush_timer => {
                flush_deadline = None;
                if !commit_pending(&transcript, ticket, &mut pending_text, &update_tx) {
                    return;
                }
            }
            chunk = stream.next() => match chunk {
                Some(Ok(bytes)) => {
                    let mut terminal = None;
                    for event in parser.process(&bytes) {
                        match event {
                            StreamEvent::Meta {
                                intent,
                                sources_used,
                                topics_referenced,
                                source_details,
                            } => {
                                // Metadata is only honored once, before any token.
                                if saw_token || meta_applied {
                                    continue;
                                }
                                meta_applied = true;
                                let applied = transcript.lock().unwrap().merge_open_meta(
                                    ticket,
                                    intent,
                                    sources_used,
                                    topics_referenced,
                                    source_details,
                                );
                                if !applied {
                                    return;
                                }
                                let _ = update_tx.send(SessionUpdate::ContentChanged);
                            }
                            StreamEvent::Token { text } => {
                                saw_token = true;
                                pending_text.push_str(&text);
                                if flush_deadline.is_none() {
                                    flush_deadline =
                                        Some(Instant::now() + TOKEN_FLUSH_INTERVAL);
                                }
                            }
                            StreamEvent::Done { quiz_data } => {
                                terminal = Some(Outcome::Done(quiz_data));
                                break;
                            }
                            StreamEvent::Error { detail } => {
                                terminal = Some(Outcome::Upstream(detail));
                                break;
                            }
                            StreamEvent::Unknown => {}
                        }
                    }
                    if let Some(outcome) = terminal {
                        break outcome;
                    }
                }
                Some(Err(error)) => break Outcome::Transport(error.to_string()),
                None => break Outcome::EndOfStream,
            }
        }
    };

    match outcome {
        Outcome::Done(quiz_data) => {
            close_turn(&transcript, ticket, &pending_text, &update_tx, quiz_data);
        }
        // End-of-stream without a terminal frame is settled like `done`:
        // whatever was buffered is kept, nothing is lost.
        Outcome::EndOfStream => {
            close_turn(&transcript, ticket, &pending_text, &update_tx, None);
        }
        Outcome::Upstream(detail) => {
            pending_text.clear();
            transcript.lock().unwrap().fail_open(ticket, detail.clone());
            let _ = update_tx.send(SessionUpdate::TurnFailed(detail));
        }
        Outcome::Transport(detail) => {
            pending_text.clear();
            transcript
                .lock()
                .unwrap()
                .fail_open(ticket, transport_failure_text(&detail));
            let _ = update_tx.send(SessionUpdate::TurnFailed(detail));
        }
    }

    if parser.dropped_frames() > 0 {
        emit_dropped_frames(endpoint, parser.dropped_frames());
    }
}

fn close_turn(
    transcript: &Arc<Mutex<Transcript>>,
    ticket: SessionTicket,
    pending_text: &str,
    update_tx: &mpsc::UnboundedSender<SessionUpdate>,
    quiz_data: Option<QuizData>,
) {
    let mut guard = transcript.lock().unwrap();
    if !pending_text.is_empty() {
        guard.append_open(ticket, pending_text);
    }
    guard.close_open(ticket, quiz_data);
    drop(guard);
    let _ = update_tx.send(SessionUpdate::TurnComplete);
}

/// Returns false when the transcript rejected the write (the session has been
/// orphaned) and the caller should stop.
fn commit_pending(
    transcript: &Arc<Mutex<Transcript>>,
    ticket: SessionTicket,
    pending_text: &mut String,
    update_tx: &mpsc::UnboundedSender<SessionUpdate>,
) -> bool {
    if pending_text.is_empty() {
        return true;
    }
    let staged = std::mem::take(pending_text);
    if !transcript.lock().unwrap().append_open(ticket, &staged) {
        return false;
    }
    let _ = update_tx.send(SessionUpdate::ContentChanged);
    true
}

fn transport_failure_text(detail: &str) -> String {
    format!("Sorry, I ran into an error: {detail}. Make sure the study server is running and try again.")
}
