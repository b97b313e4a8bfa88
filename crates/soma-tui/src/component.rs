//! Component trait, the interface UI panels implement.
//!
//! Components own their presentation state and render themselves from a
//! read-only `UiState`.  They never touch Session: they return `Vec<Action>`
//! and the App forwards those to the control loop.

use ratatui::crossterm::event::{KeyEvent, MouseEvent};
use ratatui::{layout::Rect, Frame};

use crate::action::Action;
use crate::core::UiState;

pub trait Component {
    /// Handle a key event. Returns actions to be dispatched.
    fn handle_key(&mut self, key: KeyEvent, ui: &UiState) -> Vec<Action>;

    /// Handle a mouse event inside `area`.
    fn handle_mouse(&mut self, event: MouseEvent, area: Rect, ui: &UiState) -> Vec<Action>;

    /// Render the component into `area`.
    fn draw(&mut self, frame: &mut Frame, area: Rect, ui: &UiState);
}
