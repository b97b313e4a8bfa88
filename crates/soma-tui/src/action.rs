//! Action enum: user intents produced by components.

/// Components produce Actions; the App hands them to the control loop.
/// Indices are positions in the full channel list, not the filtered view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Cursor moved onto a channel.
    Select(usize),
    /// Play/pause toggle on a channel.
    Activate(usize),
    Quit,
}
