use crate::state::transcript::Message;
use crate::ui::message_lines::{build_message_lines, estimate_rows};
use crate::ui::text::{
    char_display_width, cursor_row_col, truncate_to_display_width, wrap_lines,
};
use crate::ui::viewport::TranscriptViewport;
use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::Line,
    widgets::{Paragraph, Wrap},
    Frame,
};

pub fn input_visual_rows(input: &str, width: usize) -> usize {
    wrap_lines(input, width).len().max(1)
}

/// Draw the visible window of the transcript.
///
/// Geometry runs in two passes: the first window is computed from whatever
/// heights are on file, the covered messages are laid out and their true
/// heights fed back, then the anchor and window are recomputed on corrected
/// offsets. Only the final window's lines hit the frame, so the cost per
/// frame stays proportional to the viewport, not the transcript.
pub fn render_transcript(
    frame: &mut Frame<'_>,
    area: Rect,
    messages: &[Message],
    streaming: bool,
    viewport: &mut TranscriptViewport,
) {
    if area.height == 0 || area.width == 0 {
        return;
    }
    let width = area.width as usize;
    let rows = area.height as usize;

    viewport.begin_frame(width, messages.len(), streaming, |idx| {
        estimate_rows(&messages[idx], width)
    });

    let open_index = streaming.then(|| messages.len().saturating_sub(1));

    for _ in 0..2 {
        viewport.finish_frame(rows);
        let Some((lo, hi)) = viewport.window(rows) else {
            return;
        };
        for idx in lo..=hi {
            let lines = build_message_lines(&messages[idx], width, open_index == Some(idx));
            viewport.set_measured(idx, lines.len());
        }
    }

    viewport.finish_frame(rows);
    let Some((lo, hi)) = viewport.window(rows) else {
        return;
    };

    let mut lines: Vec<Line<'static>> = Vec::new();
    for idx in lo..=hi {
        lines.extend(build_message_lines(
            &messages[idx],
            width,
            open_index == Some(idx),
        ));
    }

    let skip = viewport
        .scroll_offset()
        .saturating_sub(viewport.offset_of(lo));
    frame.render_widget(
        Paragraph::new(lines).scroll((skip as u16, 0)),
        area,
    );
}

/// First-run screen shown while the transcript is empty.
pub fn render_empty_state(frame: &mut Frame<'_>, area: Rect, quick_prompts: &[&str]) {
    if area.height == 0 || area.width == 0 {
        return;
    }

    let mut lines = vec![
        Line::from(""),
        Line::styled(
            "Ready to study!",
            Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        ),
        Line::styled(
            "Ask about your study materials, or try one of these:",
            Style::default().fg(Color::DarkGray),
        ),
        Line::from(""),
    ];
    for (index, prompt) in quick_prompts.iter().enumerate() {
        lines.push(Line::styled(
            format!("  Alt+{}  {prompt}", index + 1),
            Style::default().fg(Color::Cyan),
        ));
    }

    frame.render_widget(Paragraph::new(lines).wrap(Wrap { trim: false }), area);
}

pub fn render_header(frame: &mut Frame<'_>, area: Rect, left: &str, right: &str) {
    if area.height == 0 || area.width == 0 {
        return;
    }
    let width = area.width as usize;
    let right = truncate_to_display_width(right, width);
    let right_width = right.chars().map(char_display_width).sum::<usize>();
    let left_budget = width.saturating_sub(right_width + 1);
    let left = truncate_line(left, left_budget);

    let padding = width
        .saturating_sub(left.chars().map(char_display_width).sum::<usize>() + right_width)
        .max(1);
    let text = format!("{left}{}{right}", " ".repeat(padding));
    frame.render_widget(
        Paragraph::new(text).style(Style::default().fg(Color::DarkGray)),
        area,
    );
}

pub fn render_input(frame: &mut Frame<'_>, area: Rect, input: &str, cursor_byte: usize) {
    if area.height == 0 || area.width <= 2 {
        return;
    }
    let inner = area;

    let input_width = inner.width.saturating_sub(2).max(1) as usize;
    let lines = wrap_lines(input, input_width);
    let (cursor_row, cursor_col) = cursor_row_col(input, cursor_byte, input_width);
    let visible_rows = inner.height as usize;
    let window_start = cursor_row.saturating_add(1).saturating_sub(visible_rows);

    let mut rendered = Vec::with_capacity(visible_rows);
    for offset in 0..visible_rows {
        let row_index = window_start + offset;
        let prefix = if row_index == 0 { "> " } else { "  " };
        let line = lines.get(row_index).cloned().unwrap_or_default();
        rendered.push(Line::from(format!("{prefix}{line}")));
    }

    frame.render_widget(
        Paragraph::new(rendered)
            .style(Style::default().fg(Color::Gray))
            .wrap(Wrap { trim: false }),
        inner,
    );

    let cursor_y = inner
        .y
        .saturating_add(cursor_row.saturating_sub(window_start) as u16);
    let cursor_x = inner
        .x
        .saturating_add(2 + cursor_col as u16)
        .min(inner.x.saturating_add(inner.width.saturating_sub(1)));
    frame.set_cursor_position((cursor_x, cursor_y));
}

fn truncate_line(input: &str, width: usize) -> String {
    let width = width.max(1);
    let mut out = String::new();
    let mut used = 0usize;
    let mut truncated = false;

    for ch in input.chars() {
        let ch_width = char_display_width(ch);
        if used + ch_width > width {
            truncated = true;
            break;
        }
        out.push(ch);
        used += ch_width;
    }

    if truncated && width >= 4 {
        out = truncate_to_display_width(&out, width - 3);
        out.push_str("...");
    }
    out
}
