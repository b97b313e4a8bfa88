use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// How many days a cached directory stays fresh before startup re-fetches it.
pub const DIRECTORY_TTL_DAYS: i64 = 7;

/// One station of the directory.  Identity is `id`; the record is never
/// mutated after it has been fetched.
///
/// The serialised keys follow the directory's own XML element names so the
/// cached copy in the config file reads like the upstream list.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Channel {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub genre: String,
    /// Highest-quality playlist; this is what gets handed to the player.
    #[serde(rename = "highestpls", default)]
    pub stream_url: String,
    #[serde(rename = "fastpls", default, deserialize_with = "null_as_empty")]
    pub fast_urls: Vec<String>,
    #[serde(rename = "slowpls", default)]
    pub slow_url: String,
}

/// Records written by older clients store an empty list as `null`.
fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

impl Channel {
    /// Text the list filter matches against.
    pub fn filter_value(&self) -> String {
        format!("{} {}", self.id, self.description)
    }
}

/// How a channel appears as a list row.  Pure mapping; the channel itself
/// carries no display state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRow {
    pub title: String,
    pub description: String,
    pub now_playing: bool,
}

impl ChannelRow {
    pub fn new(channel: &Channel, now_playing: bool) -> Self {
        let title = if now_playing {
            format!("♫ {}", channel.title)
        } else {
            channel.title.clone()
        };
        Self {
            title,
            description: format!("{} | {}", channel.genre, channel.description),
            now_playing,
        }
    }
}

/// Ordered channel list, wrapped so the JSON shape stays `{"channels": [...]}`.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ChannelList {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub channels: Vec<Channel>,
}

impl ChannelList {
    pub fn new(channels: Vec<Channel>) -> Self {
        Self { channels }
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&Channel> {
        self.channels.get(idx)
    }

    pub fn position_by_id(&self, id: &str) -> Option<usize> {
        self.channels.iter().position(|c| c.id == id)
    }

    pub fn find_by_id(&self, id: &str) -> Option<&Channel> {
        self.channels.iter().find(|c| c.id == id)
    }

    /// Locate the channel whose primary stream the player reports as loaded.
    pub fn position_by_stream_url(&self, url: &str) -> Option<usize> {
        self.channels.iter().position(|c| c.stream_url == url)
    }
}

/// Cached directory plus the moment it was fetched.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct DirectorySnapshot {
    #[serde(default)]
    pub channels: ChannelList,
    #[serde(rename = "lastChannelsListUpdate", default)]
    pub last_fetched: Option<DateTime<Utc>>,
}

impl DirectorySnapshot {
    pub fn new(channels: Vec<Channel>, fetched_at: DateTime<Utc>) -> Self {
        Self {
            channels: ChannelList::new(channels),
            last_fetched: Some(fetched_at),
        }
    }

    /// True when the snapshot is missing, empty, or older than [`DIRECTORY_TTL_DAYS`].
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        if self.channels.is_empty() {
            return true;
        }
        match self.last_fetched {
            Some(at) => now.signed_duration_since(at) > Duration::days(DIRECTORY_TTL_DAYS),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(id: &str, url: &str) -> Channel {
        Channel {
            id: id.to_string(),
            title: id.to_uppercase(),
            stream_url: url.to_string(),
            ..Channel::default()
        }
    }

    #[test]
    fn test_lookup_by_id_and_url() {
        let list = ChannelList::new(vec![
            channel("groovesalad", "https://somafm.com/groovesalad256.pls"),
            channel("dronezone", "https://somafm.com/dronezone256.pls"),
        ]);
        assert_eq!(list.position_by_id("dronezone"), Some(1));
        assert_eq!(
            list.position_by_stream_url("https://somafm.com/groovesalad256.pls"),
            Some(0)
        );
        assert!(list.find_by_id("missing").is_none());
        assert!(list.position_by_stream_url("https://example.com/other.pls").is_none());
    }

    #[test]
    fn test_row_mapping() {
        let mut c = channel("lush", "https://a/lush.pls");
        c.title = "Lush".into();
        c.genre = "electronic".into();
        c.description = "Sensuous and mellow female vocals".into();

        let row = ChannelRow::new(&c, false);
        assert_eq!(row.title, "Lush");
        assert_eq!(row.description, "electronic | Sensuous and mellow female vocals");

        assert_eq!(ChannelRow::new(&c, true).title, "♫ Lush");
    }

    #[test]
    fn test_snapshot_ttl() {
        let now = Utc::now();
        let fresh = DirectorySnapshot::new(vec![channel("a", "u")], now - Duration::days(6));
        assert!(!fresh.needs_refresh(now));

        let stale = DirectorySnapshot::new(vec![channel("a", "u")], now - Duration::days(8));
        assert!(stale.needs_refresh(now));

        let empty = DirectorySnapshot::new(Vec::new(), now);
        assert!(empty.needs_refresh(now));

        assert!(DirectorySnapshot::default().needs_refresh(now));
    }
}
