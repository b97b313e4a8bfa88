//! Cursor, scroll window and filter over the channel directory.
//!
//! Positions below are indices into `shown`, the channels passing the current
//! query.  `selected()` maps back to the directory index the control loop
//! works with.

use soma_proto::channel::{Channel, ChannelList};

/// Each channel is drawn as a title line plus a description line.
pub const ROWS_PER_CHANNEL: usize = 2;

pub struct ChannelView {
    channels: Vec<Channel>,
    shown: Vec<usize>,
    cursor: usize,
    top: usize,
    query: String,
}

impl ChannelView {
    pub fn new(list: &ChannelList, selected: usize) -> Self {
        Self {
            channels: list.channels.clone(),
            shown: (0..list.len()).collect(),
            cursor: selected.min(list.len().saturating_sub(1)),
            top: 0,
            query: String::new(),
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn shown(&self) -> &[usize] {
        &self.shown
    }

    /// Size of the whole directory, filtered or not.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shown.is_empty()
    }

    /// Directory index under the cursor.
    pub fn selected(&self) -> Option<usize> {
        self.shown.get(self.cursor).copied()
    }

    /// Re-filter.  The channel under the cursor stays selected while it
    /// still matches; otherwise the cursor returns to the first match.
    pub fn set_query(&mut self, query: &str) {
        let previous = self.selected();
        self.query = query.to_string();
        self.shown = self
            .channels
            .iter()
            .enumerate()
            .filter(|(_, c)| channel_matches(c, query))
            .map(|(i, _)| i)
            .collect();
        self.cursor = previous
            .and_then(|p| self.shown.iter().position(|&i| i == p))
            .unwrap_or(0);
        self.top = 0;
    }

    /// Move by `delta` channels, clamped to the shown range.
    pub fn step(&mut self, delta: isize) {
        let Some(last) = self.shown.len().checked_sub(1) else {
            return;
        };
        self.cursor = self.cursor.saturating_add_signed(delta).min(last);
    }

    pub fn first(&mut self) {
        self.cursor = 0;
    }

    pub fn last(&mut self) {
        self.cursor = self.shown.len().saturating_sub(1);
    }

    /// Scroll so the cursor fits in `rows` terminal rows.  Returns how many
    /// channels fit.
    pub fn fit(&mut self, rows: u16) -> usize {
        let capacity = rows as usize / ROWS_PER_CHANNEL;
        if capacity == 0 {
            return 0;
        }
        if self.cursor < self.top {
            self.top = self.cursor;
        } else if self.cursor >= self.top + capacity {
            self.top = self.cursor + 1 - capacity;
        }
        capacity
    }

    /// The channels in the current window: (directory index, channel,
    /// under the cursor).
    pub fn window(&self, capacity: usize) -> impl Iterator<Item = (usize, &Channel, bool)> + '_ {
        self.shown
            .iter()
            .enumerate()
            .skip(self.top)
            .take(capacity)
            .map(move |(pos, &idx)| (idx, &self.channels[idx], pos == self.cursor))
    }

    /// Put the cursor on the channel drawn at `row` (relative to the top of
    /// the list).  Returns the directory index hit.
    pub fn click(&mut self, row: u16) -> Option<usize> {
        let pos = self.top + row as usize / ROWS_PER_CHANNEL;
        let idx = *self.shown.get(pos)?;
        self.cursor = pos;
        Some(idx)
    }
}

/// Case-insensitive; every whitespace-separated term must occur in the
/// channel's filter value.
pub fn channel_matches(channel: &Channel, query: &str) -> bool {
    let text = channel.filter_value().to_lowercase();
    query
        .to_lowercase()
        .split_whitespace()
        .all(|term| text.contains(term))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(cursor: usize) -> ChannelView {
        let make = |id: &str, description: &str| Channel {
            id: id.to_string(),
            description: description.to_string(),
            ..Channel::default()
        };
        let list = ChannelList::new(vec![
            make("groovesalad", "ambient beats and grooves"),
            make("dronezone", "atmospheric ambient space"),
            make("lush", "sensuous female vocals"),
            make("deepspaceone", "deep ambient electronic"),
            make("metal", "heavy metal"),
        ]);
        ChannelView::new(&list, cursor)
    }

    #[test]
    fn test_query_keeps_matching_selection() {
        let mut v = view(3);
        v.set_query("AMBIENT");
        assert_eq!(v.shown(), &[0, 1, 3]);
        assert_eq!(v.selected(), Some(3));

        v.set_query("ambient atmospheric");
        assert_eq!(v.shown(), &[1]);
        assert_eq!(v.selected(), Some(1));

        v.set_query("polka");
        assert!(v.is_empty());
        assert_eq!(v.selected(), None);
        v.step(1);
        assert_eq!(v.selected(), None);

        v.set_query("");
        assert_eq!(v.shown().len(), v.len());
        assert_eq!(v.selected(), Some(0));
    }

    #[test]
    fn test_window_follows_cursor() {
        let mut v = view(0);
        v.last();
        // five rows hold two channels
        assert_eq!(v.fit(5), 2);
        let window: Vec<(usize, bool)> = v.window(2).map(|(i, _, here)| (i, here)).collect();
        assert_eq!(window, vec![(3, false), (4, true)]);

        v.step(-10);
        assert_eq!(v.selected(), Some(0));
        v.fit(5);
        assert_eq!(v.window(2).next().map(|(i, _, _)| i), Some(0));
        assert_eq!(v.fit(1), 0);
    }

    #[test]
    fn test_click_maps_rows_to_channels() {
        let mut v = view(0);
        v.last();
        v.fit(4);
        // window starts at channel 3; its description line is row 1
        assert_eq!(v.click(1), Some(3));
        assert_eq!(v.click(2), Some(4));
        assert_eq!(v.click(4), None);
        assert_eq!(v.selected(), Some(4));
    }

    #[test]
    fn test_cursor_clamped_on_construction() {
        assert_eq!(view(99).selected(), Some(4));
        let empty = ChannelView::new(&ChannelList::default(), 3);
        assert_eq!(empty.selected(), None);
    }
}
