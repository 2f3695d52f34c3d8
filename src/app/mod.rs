use crate::api::ChatClient;
use crate::config::Config;
use crate::state::{ChatSession, SessionUpdate, Transcript, TranscriptArchive};
use crate::terminal::{self, TerminalType};
use crate::ui::layout::split_three_pane_layout;
use crate::ui::render::{
    input_visual_rows, render_empty_state, render_header, render_input, render_transcript,
};
use crate::ui::text::clamp_to_char_boundary_left;
use crate::ui::viewport::TranscriptViewport;
use anyhow::Result;
use crossterm::event::{
    self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseEventKind,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub const QUICK_PROMPTS: [&str; 4] = [
    "Quiz me on the key concepts!",
    "Summarize the main topics",
    "What are the hardest parts to remember?",
    "Explain this like I'm a beginner",
];

const REDRAW_INTERVAL: Duration = Duration::from_millis(120);
const INPUT_POLL_INTERVAL: Duration = Duration::from_millis(100);
const MOUSE_SCROLL_ROWS: usize = 3;
const MAX_INPUT_ROWS: u16 = 6;

struct InputState {
    buffer: String,
    cursor_byte: usize,
}

pub struct App {
    config: Config,
    client: ChatClient,
    transcript: Arc<Mutex<Transcript>>,
    archive: TranscriptArchive,
    viewport: TranscriptViewport,
    input: InputState,
    session: Option<ChatSession>,
    update_tx: mpsc::UnboundedSender<SessionUpdate>,
    update_rx: Option<mpsc::UnboundedReceiver<SessionUpdate>>,
    status: Option<String>,
    transcript_rows: usize,
    should_quit: bool,
}

impl App {
    pub fn new(config: Config) -> Result<Self> {
        let client = ChatClient::new(&config);
        let archive = TranscriptArchive::new(&config.data_dir);

        let mut transcript = Transcript::new();
        if config.restore_history {
            transcript.restore(archive.load(&config.student)?);
        }

        let (update_tx, update_rx) = mpsc::unbounded_channel();
        Ok(Self {
            config,
            client,
            transcript: Arc::new(Mutex::new(transcript)),
            archive,
            viewport: TranscriptViewport::new(),
            input: InputState {
                buffer: String::new(),
                cursor_byte: 0,
            },
            session: None,
            update_tx,
            update_rx: Some(update_rx),
            status: None,
            transcript_rows: 0,
            should_quit: false,
        })
    }

    pub async fn run(&mut self) -> Result<()> {
        let mut terminal = terminal::setup()?;
        let result = self.event_loop(&mut terminal).await;
        terminal::restore()?;
        result
    }

    async fn event_loop(&mut self, terminal: &mut TerminalType) -> Result<()> {
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        spawn_input_reader(event_tx);

        let mut update_rx = self
            .update_rx
            .take()
            .expect("event loop entered more than once");

        let mut redraw = tokio::time::interval(REDRAW_INTERVAL);
        redraw.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        while !self.should_quit {
            self.draw(terminal)?;

            tokio::select! {
                maybe_event = event_rx.recv() => match maybe_event {
                    Some(event) => self.handle_terminal_event(event),
                    None => break,
                },
                Some(update) = update_rx.recv() => self.handle_session_update(update),
                _ = redraw.tick() => {}
            }

            // Drain whatever else queued up so a burst costs one redraw.
            while let Ok(event) = event_rx.try_recv() {
                self.handle_terminal_event(event);
            }
            while let Ok(update) = update_rx.try_recv() {
                self.handle_session_update(update);
            }
        }

        if let Some(session) = self.session.take() {
            session.cancel();
            self.transcript.lock().unwrap().abandon_open();
        }
        self.save_transcript();
        Ok(())
    }

    fn draw(&mut self, terminal: &mut TerminalType) -> Result<()> {
        terminal.draw(|frame| {
            let area = frame.area();
            let input_width = area.width.saturating_sub(2).max(1) as usize;
            let input_rows =
                (input_visual_rows(&self.input.buffer, input_width) as u16).min(MAX_INPUT_ROWS);
            let panes = split_three_pane_layout(area, input_rows);
            self.transcript_rows = panes.transcript.height as usize;

            let guard = self.transcript.lock().unwrap();
            let streaming = guard.is_streaming();

            let left = format!(
                "studychat · {} · {} messages",
                self.config.student,
                guard.len()
            );
            let right = if let Some(status) = &self.status {
                status.clone()
            } else if streaming {
                "streaming… (Esc cancels)".to_string()
            } else if !self.viewport.is_pinned_to_bottom() {
                "scrolled up · Down returns to newest".to_string()
            } else {
                "Enter send · Ctrl+L clear · Ctrl+C quit".to_string()
            };
            render_header(frame, panes.header, &left, &right);

            if guard.is_empty() {
                render_empty_state(frame, panes.transcript, &QUICK_PROMPTS);
            } else {
                render_transcript(
                    frame,
                    panes.transcript,
                    guard.messages(),
                    streaming,
                    &mut self.viewport,
                );
            }
            drop(guard);

            render_input(
                frame,
                panes.input,
                &self.input.buffer,
                self.input.cursor_byte,
            );
        })?;
        Ok(())
    }

    fn handle_terminal_event(&mut self, event: Event) {
        match event {
            Event::Key(key) => self.handle_key(key),
            Event::Mouse(mouse) => match mouse.kind {
                MouseEventKind::ScrollUp => self.viewport.scroll_up(MOUSE_SCROLL_ROWS),
                MouseEventKind::ScrollDown => self
                    .viewport
                    .scroll_down(MOUSE_SCROLL_ROWS, self.transcript_rows),
                _ => {}
            },
            // The next draw re-measures everything at the new width.
            Event::Resize(..) => {}
            _ => {}
        }
    }

    fn handle_key(&mut self, key: KeyEvent) {
        if key.kind != KeyEventKind::Press {
            return;
        }
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        let alt = key.modifiers.contains(KeyModifiers::ALT);

        match key.code {
            KeyCode::Char('c') if ctrl => self.should_quit = true,
            KeyCode::Char('l') if ctrl => self.clear_transcript(),
            KeyCode::Char(digit @ '1'..='4') if alt => self.fill_quick_prompt(digit),
            KeyCode::Enter => self.submit(),
            KeyCode::Esc => self.cancel_session(),
            KeyCode::Backspace => self.delete_before_cursor(),
            KeyCode::Delete => self.delete_at_cursor(),
            KeyCode::Left => {
                self.input.cursor_byte =
                    prev_char_boundary(&self.input.buffer, self.input.cursor_byte);
            }
            KeyCode::Right => {
                self.input.cursor_byte =
                    next_char_boundary(&self.input.buffer, self.input.cursor_byte);
            }
            KeyCode::Home => self.input.cursor_byte = 0,
            KeyCode::End => self.input.cursor_byte = self.input.buffer.len(),
            KeyCode::Up => self.viewport.scroll_up(1),
            KeyCode::Down => self.viewport.scroll_down(1, self.transcript_rows),
            KeyCode::PageUp => self.viewport.scroll_up(self.transcript_rows.max(1)),
            KeyCode::PageDown => self
                .viewport
                .scroll_down(self.transcript_rows.max(1), self.transcript_rows),
            KeyCode::Char(ch) if !ctrl && !alt => self.insert_char(ch),
            _ => {}
        }
    }

    fn insert_char(&mut self, ch: char) {
        let at = clamp_to_char_boundary_left(&self.input.buffer, self.input.cursor_byte);
        self.input.buffer.insert(at, ch);
        self.input.cursor_byte = at + ch.len_utf8();
    }

    fn delete_before_cursor(&mut self) {
        let at = clamp_to_char_boundary_left(&self.input.buffer, self.input.cursor_byte);
        if at == 0 {
            return;
        }
        let start = prev_char_boundary(&self.input.buffer, at);
        self.input.buffer.replace_range(start..at, "");
        self.input.cursor_byte = start;
    }

    fn delete_at_cursor(&mut self) {
        let at = clamp_to_char_boundary_left(&self.input.buffer, self.input.cursor_byte);
        if at >= self.input.buffer.len() {
            return;
        }
        let end = next_char_boundary(&self.input.buffer, at);
        self.input.buffer.replace_range(at..end, "");
        self.input.cursor_byte = at;
    }

    fn fill_quick_prompt(&mut self, digit: char) {
        let index = (digit as usize) - ('1' as usize);
        if let Some(prompt) = QUICK_PROMPTS.get(index) {
            self.input.buffer = (*prompt).to_string();
            self.input.cursor_byte = self.input.buffer.len();
        }
    }

    /// Send the drafted prompt. A no-op while a turn is streaming: the open
    /// session must settle before the next one starts.
    fn submit(&mut self) {
        if self.session.is_some() {
            return;
        }
        let prompt = self.input.buffer.trim().to_string();
        if prompt.is_empty() {
            return;
        }
        self.input.buffer.clear();
        self.input.cursor_byte = 0;
        self.status = None;

        let history = self.transcript.lock().unwrap().history_turns();
        self.viewport.scroll_to_bottom(self.transcript_rows);
        self.session = Some(ChatSession::start(
            self.client.clone(),
            Arc::clone(&self.transcript),
            prompt,
            history,
            self.update_tx.clone(),
        ));
    }

    fn cancel_session(&mut self) {
        if let Some(session) = self.session.take() {
            session.cancel();
            self.transcript.lock().unwrap().abandon_open();
            self.status = Some("turn canceled".to_string());
        }
    }

    /// Reset the transcript. An in-flight session is cancelled and orphaned
    /// first; its ticket goes stale with the cleared store.
    fn clear_transcript(&mut self) {
        if let Some(session) = self.session.take() {
            session.cancel();
        }
        self.transcript.lock().unwrap().clear();
        self.viewport = TranscriptViewport::new();
        self.status = None;
        self.save_transcript();
    }

    fn handle_session_update(&mut self, update: SessionUpdate) {
        match update {
            SessionUpdate::ContentChanged => {}
            SessionUpdate::TurnComplete => {
                self.session = None;
                self.save_transcript();
            }
            SessionUpdate::TurnFailed(_) => {
                self.session = None;
                self.save_transcript();
            }
            SessionUpdate::Unauthorized => {
                self.session = None;
                self.config.purge_stored_token();
                self.client.discard_token();
                self.status = Some("signed out: stored credential was rejected".to_string());
                self.save_transcript();
            }
        }
    }

    fn save_transcript(&mut self) {
        let messages = {
            let guard = self.transcript.lock().unwrap();
            if guard.is_streaming() {
                return;
            }
            guard.messages().to_vec()
        };
        if let Err(error) = self.archive.save(&self.config.student, &messages) {
            self.status = Some(format!("could not save transcript: {error}"));
        }
    }
}

fn spawn_input_reader(event_tx: mpsc::UnboundedSender<Event>) {
    std::thread::spawn(move || loop {
        match event::poll(INPUT_POLL_INTERVAL) {
            Ok(true) => {
                let Ok(ev) = event::read() else { break };
                if event_tx.send(ev).is_err() {
                    break;
                }
            }
            Ok(false) => {
                if event_tx.is_closed() {
                    break;
                }
            }
            Err(_) => break,
        }
    });
}

fn prev_char_boundary(s: &str, idx: usize) -> usize {
    let mut i = idx.min(s.len()).saturating_sub(1);
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn next_char_boundary(s: &str, idx: usize) -> usize {
    if idx >= s.len() {
        return s.len();
    }
    let mut i = idx + 1;
    while i < s.len() && !s.is_char_boundary(i) {
        i += 1;
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_char_boundary_navigation() {
        let s = "aé日";
        assert_eq!(next_char_boundary(s, 0), 1);
        assert_eq!(next_char_boundary(s, 1), 3);
        assert_eq!(next_char_boundary(s, 3), 6);
        assert_eq!(prev_char_boundary(s, 6), 3);
        assert_eq!(prev_char_boundary(s, 3), 1);
        assert_eq!(prev_char_boundary(s, 1), 0);
        assert_eq!(prev_char_boundary(s, 0), 0);
    }

    #[test]
    fn test_quick_prompts_match_expected_count() {
        assert_eq!(QUICK_PROMPTS.len(), 4);
    }
}
