//! Chat rendering with ratatui.

use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use ratatui::Frame;

use crate::chat::message::{unix_now, Message, MsgKind};

use super::app::App;

/// Draw the full chat frame: scrollback on top, input line below.
pub fn render(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(1), Constraint::Length(3)])
        .split(frame.size());

    let mut lines = Vec::new();
    for msg in &app.messages {
        lines.extend(message_lines(&app.user, msg));
    }

    let inner_height = chunks[0].height.saturating_sub(2) as usize;
    let scroll = lines
        .len()
        .saturating_sub(inner_height)
        .saturating_sub(app.scroll_offset);

    let history = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .scroll((scroll as u16, 0))
        .block(Block::default().borders(Borders::ALL).title("gabble"));
    frame.render_widget(history, chunks[0]);

    let prompt = format!("▸ {} ", app.user);
    let input_line = Line::from(vec![
        Span::styled(
            prompt.clone(),
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        ),
        Span::raw(app.input.as_str()),
    ]);
    let input = Paragraph::new(input_line).block(Block::default().borders(Borders::ALL));
    frame.render_widget(input, chunks[1]);

    let prompt_width = prompt.chars().count() as u16;
    frame.set_cursor(
        chunks[1].x + 1 + prompt_width + app.cursor as u16,
        chunks[1].y + 1,
    );
}

/// Render one event as styled lines, one per line of body text.
fn message_lines(user: &str, msg: &Message) -> Vec<Line<'static>> {
    let ts = if msg.timestamp == 0 {
        unix_now()
    } else {
        msg.timestamp
    };
    let stamp = Span::styled(
        format!("[{}] ", fmt_clock(ts)),
        Style::default().fg(Color::DarkGray),
    );

    let (label, label_style, body, body_style) = match msg.kind {
        MsgKind::Chat => {
            let own = msg.from == user;
            let body = if msg.body.is_empty() {
                "[empty message]".to_string()
            } else {
                msg.body.clone()
            };
            (
                format!("@{}", msg.from),
                Style::default().fg(Color::Cyan),
                body,
                if own {
                    Style::default().fg(Color::LightBlue)
                } else {
                    Style::default().fg(Color::White)
                },
            )
        }
        MsgKind::Join => (
            "status".to_string(),
            Style::default().fg(Color::Magenta),
            format!("{} joined the chat", msg.from),
            Style::default().fg(Color::Green),
        ),
        MsgKind::Leave => (
            "status".to_string(),
            Style::default().fg(Color::Magenta),
            format!("{} left the chat", msg.from),
            Style::default().fg(Color::Red),
        ),
        MsgKind::Error => (
            "error".to_string(),
            Style::default().fg(Color::Magenta),
            if msg.body.is_empty() {
                "notification".to_string()
            } else {
                msg.body.clone()
            },
            Style::default().fg(Color::LightRed),
        ),
        _ => (
            "system".to_string(),
            Style::default().fg(Color::Magenta),
            if msg.body.is_empty() {
                "notification".to_string()
            } else {
                msg.body.clone()
            },
            Style::default().fg(Color::Magenta),
        ),
    };

    let mut lines = Vec::new();
    for (i, part) in body.split('\n').enumerate() {
        if i == 0 {
            lines.push(Line::from(vec![
                stamp.clone(),
                Span::styled(format!("{label} "), label_style),
                Span::styled(part.to_string(), body_style),
            ]));
        } else {
            lines.push(Line::from(Span::styled(part.to_string(), body_style)));
        }
    }
    lines
}

/// Wall-clock `HH:MM:SS` (UTC) for a Unix timestamp.
fn fmt_clock(ts: i64) -> String {
    let secs = ts.rem_euclid(86_400);
    format!(
        "{:02}:{:02}:{:02}",
        secs / 3600,
        (secs % 3600) / 60,
        secs % 60
    )
}
