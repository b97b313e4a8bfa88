use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::channel::DirectorySnapshot;
use super::error::ConfigError;
use super::platform;

/// Durable record of what should be playing.  The control loop is its only
/// writer once startup reconciliation has finished.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub selected_channel_id: Option<String>,
    pub is_paused: bool,
}

impl Session {
    pub fn playing(id: impl Into<String>) -> Self {
        Self {
            selected_channel_id: Some(id.into()),
            is_paused: false,
        }
    }

    pub fn paused(id: impl Into<String>) -> Self {
        Self {
            selected_channel_id: Some(id.into()),
            is_paused: true,
        }
    }
}

/// Everything persisted between runs, in the on-disk JSON shape.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredState {
    /// Channel id, empty when nothing is selected.
    #[serde(rename = "currentlyPlaying", default)]
    pub currently_playing: String,
    #[serde(rename = "isPaused", default)]
    pub is_paused: bool,
    #[serde(flatten)]
    pub directory: DirectorySnapshot,
}

impl StoredState {
    pub fn session(&self) -> Session {
        Session {
            selected_channel_id: if self.currently_playing.is_empty() {
                None
            } else {
                Some(self.currently_playing.clone())
            },
            is_paused: self.is_paused,
        }
    }

    pub fn set_session(&mut self, session: &Session) {
        self.currently_playing = session.selected_channel_id.clone().unwrap_or_default();
        self.is_paused = session.is_paused;
    }
}

/// Reads and writes [`StoredState`] at a fixed path.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the default per-user location.
    pub fn open_default() -> Self {
        Self::new(Self::default_path())
    }

    pub fn default_path() -> PathBuf {
        platform::config_dir().join("soma.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Best-effort load.  A missing or unreadable file, or one that does not
    /// parse, yields the empty record.
    pub fn load(&self) -> StoredState {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) => {
                debug!("config: no readable record at {:?}: {}", self.path, e);
                return StoredState::default();
            }
        };
        match serde_json::from_str::<StoredState>(&content) {
            Ok(state) => state,
            Err(e) => {
                warn!("config: ignoring corrupt record at {:?}: {}", self.path, e);
                StoredState::default()
            }
        }
    }

    /// Truncate and rewrite the record.
    pub fn save(&self, state: &StoredState) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let json = serde_json::to_string_pretty(state)?;
        std::fs::write(&self.path, json).map_err(|source| ConfigError::Io {
            path: self.path.clone(),
            source,
        })?;
        debug!("config: saved record to {:?}", self.path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{Channel, ChannelList};
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn sample_state() -> StoredState {
        let channel = Channel {
            id: "groovesalad".into(),
            title: "Groove Salad".into(),
            description: "A nicely chilled plate of ambient beats".into(),
            genre: "ambient|electronica".into(),
            stream_url: "https://somafm.com/groovesalad256.pls".into(),
            fast_urls: vec!["https://somafm.com/groovesalad.pls".into()],
            slow_url: "https://somafm.com/groovesalad64.pls".into(),
        };
        StoredState {
            currently_playing: "groovesalad".into(),
            is_paused: true,
            directory: DirectorySnapshot::new(
                vec![channel],
                Utc.with_ymd_and_hms(2026, 10, 1, 12, 0, 0).unwrap(),
            ),
        }
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::new(dir.path().join("nope.json"));
        let state = store.load();
        assert_eq!(state, StoredState::default());
        assert_eq!(state.session(), Session::default());
    }

    #[test]
    fn test_corrupt_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("soma.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(ConfigStore::new(&path).load(), StoredState::default());
    }

    #[test]
    fn test_save_then_load_is_fixed_point() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::new(dir.path().join("nested").join("soma.json"));
        store.save(&sample_state()).unwrap();
        let first = std::fs::read(store.path()).unwrap();

        let loaded = store.load();
        assert_eq!(loaded, sample_state());
        store.save(&loaded).unwrap();
        let second = std::fs::read(store.path()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_on_disk_keys() {
        let json = serde_json::to_value(sample_state()).unwrap();
        assert_eq!(json["currentlyPlaying"], "groovesalad");
        assert_eq!(json["isPaused"], true);
        assert_eq!(json["channels"]["channels"][0]["highestpls"], "https://somafm.com/groovesalad256.pls");
        assert!(json["lastChannelsListUpdate"].is_string());
    }

    #[test]
    fn test_reads_zero_time_record() {
        let raw = r#"{
            "currentlyPlaying": "dronezone",
            "isPaused": false,
            "channels": { "channels": [] },
            "lastChannelsListUpdate": "0001-01-01T00:00:00Z"
        }"#;
        let state: StoredState = serde_json::from_str(raw).unwrap();
        assert_eq!(state.session(), Session::playing("dronezone"));
        assert!(state.directory.needs_refresh(Utc::now()));
    }

    #[test]
    fn test_load_tolerates_null_lists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("soma.json");
        let raw = r#"{
            "currentlyPlaying": "dronezone",
            "isPaused": true,
            "channels": { "channels": [
                {
                    "title": "Drone Zone",
                    "highestpls": "https://api.somafm.com/dronezone130.pls",
                    "fastpls": null,
                    "slowpls": "",
                    "id": "dronezone",
                    "description": "Served best chilled",
                    "genre": "ambient|space",
                    "IsPlaying": null
                }
            ] },
            "lastChannelsListUpdate": "2026-10-01T12:00:00Z"
        }"#;
        std::fs::write(&path, raw).unwrap();

        let state = ConfigStore::new(&path).load();
        assert_eq!(state.session(), Session::paused("dronezone"));
        let channel = state.directory.channels.find_by_id("dronezone").unwrap();
        assert!(channel.fast_urls.is_empty());
        assert_eq!(channel.stream_url, "https://api.somafm.com/dronezone130.pls");
        assert!(!state.directory.needs_refresh(
            Utc.with_ymd_and_hms(2026, 10, 2, 0, 0, 0).unwrap()
        ));

        let empty: ChannelList = serde_json::from_str(r#"{"channels": null}"#).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_session_mapping() {
        let mut state = StoredState::default();
        state.set_session(&Session::paused("lush"));
        assert_eq!(state.currently_playing, "lush");
        assert!(state.is_paused);

        state.set_session(&Session::default());
        assert_eq!(state.currently_playing, "");
        assert_eq!(state.session().selected_channel_id, None);
    }
}
