//! Shared data model for the soma player: the channel directory, the
//! persisted session record and the per-user paths both live here so the
//! terminal front-end never touches the filesystem layout directly.

pub mod channel;
pub mod config;
pub mod directory;
pub mod error;
pub mod platform;
