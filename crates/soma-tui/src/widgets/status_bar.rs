//! Status bar: now-playing line, separator, and keybindings footer.

use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};

use crate::theme::{style_playing, C_MODE_FILTER, C_MODE_NORMAL, C_MUTED, C_SEPARATOR};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputMode {
    Normal,
    Filter,
}

impl InputMode {
    pub fn label(self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::Filter => "FILTER",
        }
    }

    pub fn color(self) -> ratatui::style::Color {
        match self {
            Self::Normal => C_MODE_NORMAL,
            Self::Filter => C_MODE_FILTER,
        }
    }
}

/// `♫ Now playing: « <channel> | <stream title> »`, or `None` when there is
/// nothing to announce.
pub fn now_playing_text(channel_title: Option<&str>, stream_title: Option<&str>) -> Option<String> {
    match (channel_title, stream_title) {
        (Some(channel), Some(title)) if !title.is_empty() => {
            Some(format!("♫ Now playing: « {} | {} »", channel, title))
        }
        _ => None,
    }
}

pub fn draw_now_playing(frame: &mut Frame, area: Rect, text: Option<&str>) {
    let line = match text {
        Some(t) => Line::from(Span::styled(format!(" {}", t), style_playing())),
        None => Line::from(""),
    };
    frame.render_widget(Paragraph::new(line), area);
}

/// Draw a horizontal separator line.
pub fn draw_separator(frame: &mut Frame, area: Rect) {
    let line = Line::from(Span::styled(
        "─".repeat(area.width as usize),
        Style::default().fg(C_SEPARATOR),
    ));
    frame.render_widget(Paragraph::new(line), area);
}

/// Draw the keybindings footer bar (one row).
pub fn draw_keys_bar(frame: &mut Frame, area: Rect, mode: InputMode) {
    let keys = match mode {
        InputMode::Normal => {
            " ↑↓/jk select  PgUp/PgDn page  g/G first/last  Enter play/pause  / filter  q quit"
        }
        InputMode::Filter => " type to filter  ↑↓ move  Enter keep  Esc clear+close",
    };
    let line = Line::from(vec![
        Span::styled(
            format!(" {} ", mode.label()),
            Style::default().fg(mode.color()).add_modifier(Modifier::BOLD),
        ),
        Span::styled(keys, Style::default().fg(C_MUTED)),
    ]);
    frame.render_widget(Paragraph::new(line), area);
}
