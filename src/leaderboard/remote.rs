//! HTTP client for the shared leaderboard store.
//!
//! The store is a realtime database spoken to over its REST interface:
//! one `users` collection keyed by user id, upserts via `PUT`, and a
//! `text/event-stream` subscription for change notifications. Stream
//! frames arrive as `event:`/`data:` line pairs separated by blank
//! lines; `put` and `patch` frames carry a `{path, data}` payload,
//! `keep-alive` frames carry nothing of interest.

use crate::error::{AppError, Result};
use crate::leaderboard::RemoteEntry;
use futures_util::StreamExt;
use reqwest::header;

/// One parsed frame from the event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEvent {
    /// Event name: `put`, `patch`, `keep-alive`, ...
    pub event: String,
    /// Raw data payload, multi-line data joined with newlines.
    pub data: String,
}

/// Payload carried by `put` and `patch` events.
#[derive(Debug, serde::Deserialize)]
pub(crate) struct ChangePayload {
    /// Path below the subscribed location, `/` for the whole collection.
    pub path: String,
    /// New value at that path; `null` clears it.
    #[serde(default)]
    pub data: serde_json::Value,
}

/// REST client for the remote store.
#[derive(Clone)]
pub struct RemoteStore {
    client: reqwest::Client,
    base_url: String,
}

impl RemoteStore {
    /// Validate the configured URL and build a client for it.
    pub fn new(url: &str) -> Result<Self> {
        let parsed = reqwest::Url::parse(url)
            .map_err(|e| AppError::Config(format!("Invalid leaderboard URL '{}': {}", url, e)))?;

        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(AppError::Config(format!(
                "Leaderboard URL must be http(s): {}",
                url
            )));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            base_url: url.trim_end_matches('/').to_string(),
        })
    }

    /// Create or replace the record for one user id.
    pub async fn put_entry(&self, entry: &RemoteEntry) -> Result<()> {
        let url = format!("{}/users/{}.json", self.base_url, entry.id);

        self.client
            .put(&url)
            .json(entry)
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }

    /// Fetch the whole collection once.
    pub async fn fetch_entries(&self) -> Result<Vec<RemoteEntry>> {
        let url = format!("{}/users.json", self.base_url);

        let value: serde_json::Value = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(entries_from_value(value))
    }

    /// Open the live event stream and hand each parsed frame to `handler`.
    ///
    /// Returns when the stream ends; the caller decides whether to
    /// reconnect.
    pub async fn stream_events<F>(&self, mut handler: F) -> Result<()>
    where
        F: FnMut(StreamEvent),
    {
        let url = format!("{}/users.json", self.base_url);

        let response = self
            .client
            .get(&url)
            .header(header::ACCEPT, "text/event-stream")
            .send()
            .await?
            .error_for_status()?;

        let mut stream = response.bytes_stream();
        let mut decoder = FrameDecoder::new();

        while let Some(chunk) = stream.next().await {
            decoder.push(&chunk?, &mut handler);
        }

        Ok(())
    }
}

/// Incremental frame splitter for the event stream.
///
/// The network chunking is arbitrary and can split a multi-byte
/// character, so bytes are buffered raw and only converted to text one
/// complete frame at a time.
struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Buffer one chunk and hand every completed frame to `handler`.
    fn push<F>(&mut self, chunk: &[u8], handler: &mut F)
    where
        F: FnMut(StreamEvent),
    {
        self.buffer.extend_from_slice(chunk);

        while let Some(end) = self.buffer.windows(2).position(|pair| pair == b"\n\n") {
            let frame: Vec<u8> = self.buffer.drain(..end + 2).collect();
            if let Some(event) = parse_frame(&String::from_utf8_lossy(&frame)) {
                handler(event);
            }
        }
    }
}

/// Parse one blank-line-terminated stream frame.
///
/// Returns `None` for frames without an `event:` field, comment lines
/// included.
pub(crate) fn parse_frame(frame: &str) -> Option<StreamEvent> {
    let mut event = None;
    let mut data: Vec<&str> = Vec::new();

    for line in frame.lines() {
        if let Some(rest) = line.strip_prefix("event:") {
            event = Some(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("data:") {
            // the field value starts after one optional space
            data.push(rest.strip_prefix(' ').unwrap_or(rest));
        }
    }

    event.map(|event| StreamEvent {
        event,
        data: data.join("\n"),
    })
}

/// Flatten the collection object (`{id: entry, ...}`) into entries.
///
/// Records that do not parse are skipped; one malformed peer must not
/// take the whole leaderboard down.
pub(crate) fn entries_from_value(value: serde_json::Value) -> Vec<RemoteEntry> {
    match value {
        serde_json::Value::Object(map) => map
            .into_iter()
            .filter_map(|(_, entry)| serde_json::from_value(entry).ok())
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frame_put() {
        let frame = "event: put\ndata: {\"path\":\"/\",\"data\":null}\n\n";
        let event = parse_frame(frame).unwrap();

        assert_eq!(event.event, "put");
        assert_eq!(event.data, "{\"path\":\"/\",\"data\":null}");
    }

    #[test]
    fn test_parse_frame_joins_multiline_data() {
        let frame = "event: put\ndata: {\"a\":\ndata: 1}\n\n";
        let event = parse_frame(frame).unwrap();

        assert_eq!(event.data, "{\"a\":\n1}");
    }

    #[test]
    fn test_parse_frame_without_event_is_dropped() {
        assert!(parse_frame(": keep-alive comment\n\n").is_none());
        assert!(parse_frame("data: orphan\n\n").is_none());
    }

    #[test]
    fn test_keep_alive_frame_parses_with_empty_data() {
        let event = parse_frame("event: keep-alive\ndata: null\n\n").unwrap();

        assert_eq!(event.event, "keep-alive");
        assert_eq!(event.data, "null");
    }

    #[test]
    fn test_decoder_reassembles_multibyte_char_split_across_chunks() {
        let frame = "event: put\ndata: {\"path\":\"/id_z\",\"data\":{\"name\":\"Zoë\"}}\n\n";
        let bytes = frame.as_bytes();
        // split in the middle of the two-byte 'ë'
        let split = bytes.iter().position(|byte| *byte == 0xC3).unwrap() + 1;

        let mut decoder = FrameDecoder::new();
        let mut events = Vec::new();

        decoder.push(&bytes[..split], &mut |event| events.push(event));
        assert!(events.is_empty());

        decoder.push(&bytes[split..], &mut |event| events.push(event));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, "put");
        assert!(events[0].data.contains("Zoë"));
    }

    #[test]
    fn test_decoder_yields_every_complete_frame() {
        let mut decoder = FrameDecoder::new();
        let mut events = Vec::new();

        decoder.push(
            b"event: put\ndata: 1\n\nevent: keep-alive\ndata: null\n\nevent: pa",
            &mut |event| events.push(event),
        );

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event, "put");
        assert_eq!(events[1].event, "keep-alive");

        decoder.push(b"tch\ndata: 2\n\n", &mut |event| events.push(event));
        assert_eq!(events.len(), 3);
        assert_eq!(events[2].event, "patch");
        assert_eq!(events[2].data, "2");
    }

    #[test]
    fn test_entries_from_collection_object() {
        let value = serde_json::json!({
            "id_a": {"id": "id_a", "name": "Ana", "pagesRead": 120, "booksCompleted": 2, "lastUpdated": 1},
            "id_b": {"id": "id_b", "name": "Ben", "pagesRead": 80},
            "id_bad": 42,
        });

        let mut entries = entries_from_value(value);
        entries.sort_by(|a, b| a.id.cmp(&b.id));

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, "id_a");
        assert_eq!(entries[0].pages_read, 120);
        assert_eq!(entries[1].id, "id_b");
        assert_eq!(entries[1].books_completed, 0);
    }

    #[test]
    fn test_entries_from_non_object_is_empty() {
        assert!(entries_from_value(serde_json::Value::Null).is_empty());
        assert!(entries_from_value(serde_json::json!([1, 2])).is_empty());
    }

    #[test]
    fn test_rejects_non_http_url() {
        assert!(RemoteStore::new("ftp://example.com/db").is_err());
        assert!(RemoteStore::new("not a url").is_err());
        assert!(RemoteStore::new("https://example.firebaseio.com").is_ok());
    }
}
