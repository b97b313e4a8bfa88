use std::path::PathBuf;

/// Failure to obtain the channel directory.  Fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("directory server answered HTTP {0}")]
    Status(reqwest::StatusCode),

    #[error("malformed channel list: {0}")]
    Xml(#[from] quick_xml::DeError),

    #[error("channel list is empty")]
    Empty,
}

/// Failure to read or write the persisted record.
///
/// Reads never surface this (the store degrades to defaults); writes report
/// it once at shutdown.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
