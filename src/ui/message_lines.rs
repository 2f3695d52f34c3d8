use crate::state::transcript::{Message, Role};
use crate::ui::text::{display_width, wrap_lines};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::Line;

/// Render one transcript message as styled terminal lines at `width` columns.
/// The returned line count is the message's measured height; the viewport
/// relies on this function being the single source of truth for layout.
pub fn build_message_lines(message: &Message, width: usize, is_open: bool) -> Vec<Line<'static>> {
    let width = width.max(1);
    let mut lines = Vec::new();

    let (label, label_color) = match message.role {
        Role::User => ("You", Color::Cyan),
        Role::Assistant => ("Tutor", Color::Green),
    };
    lines.push(Line::styled(
        label,
        Style::default()
            .fg(label_color)
            .add_modifier(Modifier::BOLD),
    ));

    if let Some(meta) = meta_summary(message) {
        lines.push(Line::styled(meta, Style::default().fg(Color::DarkGray)));
    }

    if message.content.is_empty() && is_open {
        lines.push(Line::styled("…", Style::default().fg(Color::DarkGray)));
    } else {
        let content_style = match message.role {
            Role::User => Style::default().fg(Color::Gray),
            Role::Assistant => Style::default().fg(Color::White),
        };
        for wrapped in wrap_lines(&message.content, width) {
            lines.push(Line::styled(wrapped, content_style));
        }
    }

    if let Some(quiz) = &message.quiz_data {
        for (index, option) in quiz.options.iter().enumerate() {
            let letter = option_letter(index);
            for wrapped in wrap_lines(&format!("{letter}. {option}"), width) {
                lines.push(Line::styled(wrapped, Style::default().fg(Color::Yellow)));
            }
        }
        lines.push(Line::styled(
            format!("answer: {}", quiz.correct_letter),
            Style::default()
                .fg(Color::DarkGray)
                .add_modifier(Modifier::DIM),
        ));
    }

    lines.push(Line::from(""));
    lines
}

/// Cheap height guess used until a message is actually laid out. Over- or
/// under-shooting is fine; the viewport corrects from measurements.
pub fn estimate_rows(message: &Message, width: usize) -> usize {
    let width = width.max(1);
    let mut rows = 1; // role header
    if meta_summary(message).is_some() {
        rows += 1;
    }

    if message.content.is_empty() {
        rows += 1;
    } else {
        for line in message.content.split('\n') {
            rows += display_width(line).div_ceil(width).max(1);
        }
    }

    if let Some(quiz) = &message.quiz_data {
        for option in &quiz.options {
            rows += (display_width(option) + 3).div_ceil(width).max(1);
        }
        rows += 1;
    }

    rows + 1 // trailing separator
}

fn meta_summary(message: &Message) -> Option<String> {
    let intent = message.intent.as_deref()?;
    let mut parts = vec![intent.to_string()];
    if let Some(sources) = message.sources_used {
        let noun = if sources == 1 { "source" } else { "sources" };
        parts.push(format!("{sources} {noun}"));
    }
    if !message.topics_referenced.is_empty() {
        parts.push(message.topics_referenced.join(", "));
    }
    Some(parts.join(" · "))
}

fn option_letter(index: usize) -> char {
    (b'A' + (index % 26) as u8) as char
}
