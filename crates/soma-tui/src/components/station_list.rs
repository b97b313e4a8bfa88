//! StationList component: the channel directory pane.

use std::time::Instant;

use ratatui::crossterm::event::{
    KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseButton, MouseEvent, MouseEventKind,
};
use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph},
    Frame,
};

use soma_proto::channel::{Channel, ChannelList, ChannelRow};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::{
    action::Action,
    component::Component,
    core::UiState,
    theme::{style_border, style_muted, style_playing, C_GENRE, C_PRIMARY, C_SECONDARY, C_SELECTION_BG},
    widgets::{
        channel_view::ChannelView,
        filter_input::{FilterAction, FilterInput},
    },
};

const PAGE: isize = 10;
const DOUBLE_CLICK_MS: u128 = 400;

pub struct StationList {
    view: ChannelView,
    filter_input: FilterInput,
    list_state: ListState,
    /// Last click (directory index, time) for double-click detection.
    last_click: Option<(usize, Instant)>,
}

impl StationList {
    pub fn new(channels: &ChannelList, cursor: usize) -> Self {
        Self {
            view: ChannelView::new(channels, cursor),
            filter_input: FilterInput::new("channel id or description…"),
            list_state: ListState::default(),
            last_click: None,
        }
    }

    pub fn is_filter_active(&self) -> bool {
        self.filter_input.is_active()
    }

    /// Action describing the cursor's current channel, if any.
    fn select_action(&self) -> Vec<Action> {
        self.view.selected().map(Action::Select).into_iter().collect()
    }

    fn activate_action(&self) -> Vec<Action> {
        self.view.selected().map(Action::Activate).into_iter().collect()
    }

    fn render_item<'a>(
        channel: &Channel,
        is_selected: bool,
        ui: &UiState,
        width: usize,
    ) -> ListItem<'a> {
        let now_playing = ui.now_playing.as_deref() == Some(channel.id.as_str());
        let row = ChannelRow::new(channel, now_playing);

        let title_style = if row.now_playing {
            style_playing()
        } else if is_selected {
            Style::default().fg(C_PRIMARY).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(C_SECONDARY)
        };
        let bg = if is_selected {
            Style::default().bg(C_SELECTION_BG)
        } else {
            Style::default()
        };

        let (genre, description) = match row.description.split_once(" | ") {
            Some((g, d)) => (format!("{} | ", g), d.to_string()),
            None => (String::new(), row.description),
        };

        ListItem::new(vec![
            Line::from(Span::styled(
                truncate(&format!(" {}", row.title), width),
                title_style,
            )),
            Line::from(vec![
                Span::raw("   "),
                Span::styled(genre.clone(), Style::default().fg(C_GENRE)),
                Span::styled(
                    truncate(&description, width.saturating_sub(3 + genre.width())),
                    style_muted(),
                ),
            ]),
        ])
        .style(bg)
    }
}

/// Cut `s` to at most `max` terminal columns, ending in `…` when shortened.
fn truncate(s: &str, max: usize) -> String {
    if s.width() <= max {
        return s.to_string();
    }
    let mut out = String::new();
    let mut used = 0;
    for c in s.chars() {
        let w = c.width().unwrap_or(0);
        if used + w + 1 > max {
            break;
        }
        out.push(c);
        used += w;
    }
    if max > 0 {
        out.push('…');
    }
    out
}

impl Component for StationList {
    fn handle_key(&mut self, key: KeyEvent, _ui: &UiState) -> Vec<Action> {
        if key.kind == KeyEventKind::Release {
            return vec![];
        }

        // Filter mode input
        if self.filter_input.is_active() {
            match key.code {
                KeyCode::Up => {
                    self.view.step(-1);
                    return self.select_action();
                }
                KeyCode::Down => {
                    self.view.step(1);
                    return self.select_action();
                }
                _ => {}
            }
            return match self.filter_input.handle_key(key) {
                FilterAction::Changed(q) => {
                    self.view.set_query(&q);
                    self.select_action()
                }
                FilterAction::Confirmed => vec![],
                FilterAction::Cancelled => {
                    self.view.set_query("");
                    self.select_action()
                }
            };
        }

        let step: isize = if key.modifiers.contains(KeyModifiers::SHIFT) {
            5
        } else {
            1
        };
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => self.view.step(-step),
            KeyCode::Down | KeyCode::Char('j') => self.view.step(step),
            KeyCode::PageUp => self.view.step(-PAGE),
            KeyCode::PageDown => self.view.step(PAGE),
            KeyCode::Home | KeyCode::Char('g') => self.view.first(),
            KeyCode::End | KeyCode::Char('G') => self.view.last(),
            KeyCode::Enter => return self.activate_action(),
            KeyCode::Char('/') => {
                self.filter_input.activate();
                return vec![];
            }
            _ => return vec![],
        }
        self.select_action()
    }

    fn handle_mouse(&mut self, event: MouseEvent, area: Rect, _ui: &UiState) -> Vec<Action> {
        match event.kind {
            MouseEventKind::ScrollUp => self.view.step(-1),
            MouseEventKind::ScrollDown => self.view.step(1),
            MouseEventKind::Down(MouseButton::Left) => {
                // +1 for the top border
                let Some(hit) = self.view.click(event.row.saturating_sub(area.y + 1)) else {
                    self.last_click = None;
                    return vec![];
                };
                let is_double = self.last_click.is_some_and(|(idx, t)| {
                    idx == hit && t.elapsed().as_millis() < DOUBLE_CLICK_MS
                });
                if is_double {
                    self.last_click = None;
                    return self.activate_action();
                }
                self.last_click = Some((hit, Instant::now()));
            }
            _ => return vec![],
        }
        self.select_action()
    }

    fn draw(&mut self, frame: &mut Frame, area: Rect, ui: &UiState) {
        let title = if self.view.query().is_empty() {
            " SomaFM ".to_string()
        } else {
            format!(" SomaFM ({}/{}) ", self.view.shown().len(), self.view.len())
        };
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(style_border())
            .title(Line::from(Span::styled(
                title,
                Style::default().fg(C_PRIMARY).add_modifier(Modifier::BOLD),
            )));
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let (list_area, filter_area) = if self.filter_input.is_active() {
            let list_area = Rect {
                height: inner.height.saturating_sub(1),
                ..inner
            };
            let filter_area = Rect {
                y: inner.y + inner.height.saturating_sub(1),
                height: 1,
                ..inner
            };
            (list_area, Some(filter_area))
        } else {
            (inner, None)
        };

        if self.view.is_empty() {
            let msg = if self.view.query().is_empty() {
                "  no channels loaded"
            } else {
                "  no channels match filter"
            };
            frame.render_widget(Paragraph::new(Span::styled(msg, style_muted())), list_area);
        } else {
            let capacity = self.view.fit(list_area.height);
            let width = list_area.width as usize;
            let mut cursor_row = None;
            let items: Vec<ListItem> = self
                .view
                .window(capacity)
                .enumerate()
                .map(|(row, (_, channel, here))| {
                    if here {
                        cursor_row = Some(row);
                    }
                    Self::render_item(channel, here, ui, width)
                })
                .collect();

            self.list_state.select(cursor_row);
            frame.render_stateful_widget(List::new(items), list_area, &mut self.list_state);
        }

        if let Some(filter_area) = filter_area {
            self.filter_input.draw(frame, filter_area);
        }
    }
}
