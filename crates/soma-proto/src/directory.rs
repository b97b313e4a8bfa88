//! Channel directory retrieval.
//!
//! The upstream list is XML of the form
//!
//! ```text
//! <channels>
//!   <channel id="groovesalad">
//!     <title>…</title> <description>…</description> <genre>…</genre>
//!     <highestpls format="aac">…</highestpls>
//!     <fastpls format="mp3">…</fastpls> <fastpls format="aac">…</fastpls>
//!     <slowpls format="aacp">…</slowpls>
//!     …
//!   </channel>
//! </channels>
//! ```
//!
//! Anything else inside `<channel>` (images, dj, listeners…) is ignored.

use chrono::Utc;
use encoding_rs::{Encoding, UTF_8};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::channel::{Channel, DirectorySnapshot};
use crate::error::FetchError;

/// Intermediate structs that match the XML document.  Kept apart from
/// `Channel` so the cached JSON schema can diverge from the upstream one.
#[derive(Debug, Deserialize)]
struct XmlChannelList {
    #[serde(rename = "channel", default)]
    channels: Vec<XmlChannel>,
}

#[derive(Debug, Deserialize)]
struct XmlChannel {
    #[serde(rename = "@id", default)]
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    genre: String,
    #[serde(default)]
    highestpls: Option<XmlPlaylist>,
    #[serde(default)]
    fastpls: Vec<XmlPlaylist>,
    #[serde(default)]
    slowpls: Option<XmlPlaylist>,
}

/// `<highestpls format="aac">URL</highestpls>`; the format attribute is dropped.
#[derive(Debug, Deserialize)]
struct XmlPlaylist {
    #[serde(rename = "$text", default)]
    url: String,
}

impl From<XmlChannel> for Channel {
    fn from(c: XmlChannel) -> Self {
        Channel {
            id: c.id,
            title: c.title.trim().to_string(),
            description: c.description.trim().to_string(),
            genre: c.genre.trim().to_string(),
            stream_url: c.highestpls.map(|p| p.url.trim().to_string()).unwrap_or_default(),
            fast_urls: c
                .fastpls
                .into_iter()
                .map(|p| p.url.trim().to_string())
                .filter(|u| !u.is_empty())
                .collect(),
            slow_url: c.slowpls.map(|p| p.url.trim().to_string()).unwrap_or_default(),
        }
    }
}

pub fn parse_channels_from_str(content: &str) -> Result<Vec<Channel>, FetchError> {
    let list: XmlChannelList = quick_xml::de::from_str(content)?;
    let channels: Vec<Channel> = list.channels.into_iter().map(Channel::from).collect();
    if channels.is_empty() {
        return Err(FetchError::Empty);
    }
    Ok(channels)
}

/// GET the directory and decode it.  The charset comes from the
/// `Content-Type` header, else from the `<?xml encoding=...?>` declaration,
/// else UTF-8.
pub async fn fetch_channels(url: &str) -> Result<Vec<Channel>, FetchError> {
    info!("directory: fetching {}", url);
    let response = reqwest::get(url).await?;
    if !response.status().is_success() {
        return Err(FetchError::Status(response.status()));
    }
    let announced = header_charset(&response);
    let bytes = response.bytes().await?;
    debug!("directory: received {} bytes", bytes.len());
    let text = decode_document(&bytes, announced.as_deref());
    let channels = parse_channels_from_str(&text)?;
    info!("directory: loaded {} channels", channels.len());
    Ok(channels)
}

fn header_charset(response: &reqwest::Response) -> Option<String> {
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)?
        .to_str()
        .ok()?;
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.trim().split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches('"').to_string())
    })
}

/// Encoding named by the document's XML declaration, if it names a known one.
fn declared_encoding(bytes: &[u8]) -> Option<&'static Encoding> {
    let head = &bytes[..bytes.len().min(256)];
    if !head.starts_with(b"<?xml") {
        return None;
    }
    let end = head.windows(2).position(|w| w == b"?>")?;
    let decl = std::str::from_utf8(&head[..end]).ok()?;
    let rest = decl[decl.find("encoding")? + "encoding".len()..].trim_start();
    let rest = rest.strip_prefix('=')?.trim_start();
    let quote = rest.chars().next().filter(|q| *q == '"' || *q == '\'')?;
    let label = rest[1..].split(quote).next()?;
    Encoding::for_label(label.as_bytes())
}

pub fn decode_document(bytes: &[u8], header_charset: Option<&str>) -> String {
    let encoding = header_charset
        .and_then(|label| Encoding::for_label(label.as_bytes()))
        .or_else(|| declared_encoding(bytes))
        .unwrap_or(UTF_8);
    let (text, used, had_errors) = encoding.decode(bytes);
    if had_errors {
        warn!("directory: invalid {} sequences replaced", used.name());
    } else {
        debug!("directory: decoded as {}", used.name());
    }
    text.into_owned()
}

/// Fetch a fresh snapshot stamped with the current time.
pub async fn fetch_snapshot(url: &str) -> Result<DirectorySnapshot, FetchError> {
    let channels = fetch_channels(url).await?;
    Ok(DirectorySnapshot::new(channels, Utc::now()))
}
