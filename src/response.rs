//! Response handling

use std::path::{Path, PathBuf};

use bytes::{Bytes, BytesMut};
use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderMap, StatusCode};
use url::Url;

use crate::{Error, Result};

/// Response metadata delivered by the transport when headers arrive
#[derive(Debug, Clone, Default)]
pub struct ResponseMetadata {
    /// Final URL after redirects
    pub url: Option<Url>,
    /// HTTP status, absent for non-HTTP responses
    pub status: Option<StatusCode>,
    /// Declared body length
    pub expected_content_length: Option<u64>,
    /// MIME type from `Content-Type`
    pub mime_type: Option<String>,
    /// Charset from `Content-Type`
    pub text_encoding: Option<String>,
    /// Response headers
    pub headers: HeaderMap,
}

impl ResponseMetadata {
    /// Derive MIME type, encoding and content length from the headers
    pub fn from_parts(url: Option<Url>, status: StatusCode, headers: HeaderMap) -> Self {
        let (mime_type, text_encoding) = headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(split_content_type)
            .unwrap_or((None, None));

        let expected_content_length = headers
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok());

        Self {
            url,
            status: Some(status),
            expected_content_length,
            mime_type,
            text_encoding,
            headers,
        }
    }
}

fn split_content_type(value: &str) -> (Option<String>, Option<String>) {
    let mut parts = value.split(';');
    let mime_type = parts
        .next()
        .map(|mime| mime.trim().to_ascii_lowercase())
        .filter(|mime| !mime.is_empty());
    let text_encoding = parts.find_map(|param| {
        let (key, value) = param.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches('"').to_string())
    });
    (mime_type, text_encoding)
}

#[derive(Debug, Clone, Default)]
enum Payload {
    #[default]
    Empty,
    Buffered(BytesMut),
    Materialized(PathBuf),
}

/// A response assembled incrementally from transport events.
///
/// The body is either buffered in memory or materialized on disk, never both.
#[derive(Debug, Clone, Default)]
pub struct ResponseAccumulator {
    metadata: Option<ResponseMetadata>,
    payload: Payload,
}

impl ResponseAccumulator {
    /// Create an empty accumulator
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an accumulator from the first metadata event
    pub fn with_metadata(metadata: ResponseMetadata) -> Self {
        Self {
            metadata: Some(metadata),
            payload: Payload::Empty,
        }
    }

    /// Create an accumulator whose buffer starts with `chunk`
    pub fn with_data(chunk: &[u8]) -> Self {
        let mut accumulator = Self::new();
        accumulator.append(chunk);
        accumulator
    }

    /// Replace the metadata; redirects deliver more than one metadata event
    pub fn update(&mut self, metadata: ResponseMetadata) {
        self.metadata = Some(metadata);
    }

    /// Append a body chunk
    pub fn append(&mut self, chunk: &[u8]) {
        match &mut self.payload {
            payload @ Payload::Empty => *payload = Payload::Buffered(BytesMut::from(chunk)),
            Payload::Buffered(buffer) => buffer.extend_from_slice(chunk),
            Payload::Materialized(location) => {
                tracing::warn!(
                    "Dropping {} body bytes for response already materialized at {:?}",
                    chunk.len(),
                    location
                );
            }
        }
    }

    /// Record where a downloaded resource was moved to
    pub fn set_resource_location(&mut self, location: impl Into<PathBuf>) {
        if let Payload::Buffered(buffer) = &self.payload {
            tracing::warn!(
                "Discarding {} buffered bytes for a materialized response",
                buffer.len()
            );
        }
        self.payload = Payload::Materialized(location.into());
    }

    /// Whether any metadata event has been recorded
    pub fn has_metadata(&self) -> bool {
        self.metadata.is_some()
    }

    /// Latest metadata
    pub fn metadata(&self) -> Option<&ResponseMetadata> {
        self.metadata.as_ref()
    }

    /// HTTP status, if metadata arrived
    pub fn status_code(&self) -> Option<StatusCode> {
        self.metadata.as_ref().and_then(|m| m.status)
    }

    /// Declared body length, if known
    pub fn expected_content_length(&self) -> Option<u64> {
        self.metadata
            .as_ref()
            .and_then(|m| m.expected_content_length)
    }

    /// Buffered body
    pub fn body(&self) -> Option<&[u8]> {
        match &self.payload {
            Payload::Buffered(buffer) => Some(&buffer[..]),
            _ => None,
        }
    }

    /// On-disk location of a downloaded body
    pub fn resource_location(&self) -> Option<&Path> {
        match &self.payload {
            Payload::Materialized(location) => Some(location.as_path()),
            _ => None,
        }
    }

    /// Buffered body re-encoded as indented JSON, when it parses as JSON
    pub fn pretty_printed(&self) -> Option<String> {
        pretty_print(self.body()?)
    }
}

fn pretty_print(body: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    serde_json::to_string_pretty(&value).ok()
}

/// A finished HTTP response
#[derive(Debug, Clone)]
pub struct Response {
    url: Option<Url>,
    status: StatusCode,
    headers: HeaderMap,
    expected_content_length: Option<u64>,
    mime_type: Option<String>,
    text_encoding: Option<String>,
    body: Option<Bytes>,
    resource_location: Option<PathBuf>,
}

impl TryFrom<ResponseAccumulator> for Response {
    type Error = Error;

    fn try_from(accumulator: ResponseAccumulator) -> Result<Self> {
        let metadata = accumulator.metadata.ok_or(Error::NoResponse)?;
        // Non-HTTP responses carry no status and are treated as 200
        let status = metadata.status.unwrap_or(StatusCode::OK);

        let (body, resource_location) = match accumulator.payload {
            Payload::Empty => (None, None),
            Payload::Buffered(buffer) => (Some(buffer.freeze()), None),
            Payload::Materialized(location) => (None, Some(location)),
        };

        Ok(Self {
            url: metadata.url,
            status,
            headers: metadata.headers,
            expected_content_length: metadata.expected_content_length,
            mime_type: metadata.mime_type,
            text_encoding: metadata.text_encoding,
            body,
            resource_location,
        })
    }
}

impl Response {
    /// Get the response status code
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Check if the response status indicates success (2xx)
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Check if the response status indicates a client error (4xx)
    pub fn is_client_error(&self) -> bool {
        self.status.is_client_error()
    }

    /// Check if the response status indicates a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        self.status.is_server_error()
    }

    /// Get the response URL
    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    /// Get all headers
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Get a header value
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// Get the content length from headers
    pub fn content_length(&self) -> Option<u64> {
        self.expected_content_length
    }

    /// Get the MIME type
    pub fn mime_type(&self) -> Option<&str> {
        self.mime_type.as_deref()
    }

    /// Get the declared text encoding
    pub fn text_encoding(&self) -> Option<&str> {
        self.text_encoding.as_deref()
    }

    /// Buffered body, absent for downloads
    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// Where a download was saved
    pub fn resource_location(&self) -> Option<&Path> {
        self.resource_location.as_deref()
    }

    /// Consume the response and return the body as bytes
    pub fn bytes(self) -> Bytes {
        self.body.unwrap_or_default()
    }

    /// Consume the response and return the body as text
    pub fn text(self) -> Result<String> {
        String::from_utf8(self.bytes().to_vec()).map_err(Error::from)
    }

    /// Consume the response and parse the body as JSON
    pub fn json<T: serde::de::DeserializeOwned>(self) -> Result<T> {
        serde_json::from_slice(&self.bytes()).map_err(Error::from)
    }

    /// Body re-encoded as indented JSON, when it parses as JSON
    pub fn pretty_printed(&self) -> Option<String> {
        pretty_print(self.body.as_ref()?)
    }
}
