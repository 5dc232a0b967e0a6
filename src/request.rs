//! Request types and builders

use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use http::{HeaderMap, Method};
use url::Url;
use uuid::Uuid;

use crate::body::Body;
use crate::progress::Progress;
use crate::{Error, Result};

/// Opaque identifier generated when a request is built
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(Uuid);

impl RequestId {
    fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&Request> for RequestId {
    fn from(request: &Request) -> Self {
        request.id
    }
}

/// What kind of transport task a request runs as
#[derive(Debug, Clone)]
pub enum RequestKind {
    /// Response body is buffered in memory
    Data {
        /// Optional request body
        body: Option<Bytes>,
    },
    /// Request body is streamed from a local file
    Upload {
        /// File sent as the request body
        source: PathBuf,
    },
    /// Response body is written to disk and moved to `destination`
    Download {
        /// Final location of the downloaded resource
        destination: PathBuf,
    },
}

/// An immutable unit of work.
///
/// Two requests are equal only when they share the same [`RequestId`],
/// whatever their URL, method or headers.
#[derive(Clone)]
pub struct Request {
    id: RequestId,
    url: Url,
    method: Method,
    headers: HeaderMap,
    kind: RequestKind,
    progress: Option<Progress>,
}

impl Request {
    /// Start building a data request
    pub fn data(method: Method, url: impl AsRef<str>) -> RequestBuilder {
        RequestBuilder::new(method, url, RequestKind::Data { body: None })
    }

    /// Start building a GET data request
    pub fn get(url: impl AsRef<str>) -> RequestBuilder {
        Self::data(Method::GET, url)
    }

    /// Start building an upload request streaming `source` as the body
    pub fn upload(method: Method, url: impl AsRef<str>, source: impl AsRef<Path>) -> RequestBuilder {
        RequestBuilder::new(
            method,
            url,
            RequestKind::Upload {
                source: source.as_ref().to_path_buf(),
            },
        )
    }

    /// Start building a GET download request saved to `destination`
    pub fn download(url: impl AsRef<str>, destination: impl AsRef<Path>) -> RequestBuilder {
        RequestBuilder::new(
            Method::GET,
            url,
            RequestKind::Download {
                destination: destination.as_ref().to_path_buf(),
            },
        )
    }

    /// Unique identifier
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Target URL
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// HTTP method
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Headers in insertion order; duplicate names are kept
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Task kind and its kind-specific payload
    pub fn kind(&self) -> &RequestKind {
        &self.kind
    }

    /// Body of a data request
    pub fn body(&self) -> Option<&Bytes> {
        match &self.kind {
            RequestKind::Data { body } => body.as_ref(),
            _ => None,
        }
    }

    /// Source file of an upload request
    pub fn source_location(&self) -> Option<&Path> {
        match &self.kind {
            RequestKind::Upload { source } => Some(source),
            _ => None,
        }
    }

    /// Destination of a download request
    pub fn destination_location(&self) -> Option<&Path> {
        match &self.kind {
            RequestKind::Download { destination } => Some(destination),
            _ => None,
        }
    }

    /// Whether this is a download request
    pub fn is_download(&self) -> bool {
        matches!(self.kind, RequestKind::Download { .. })
    }

    /// Progress handle, if tracking was requested
    pub fn progress(&self) -> Option<&Progress> {
        self.progress.as_ref()
    }
}

impl PartialEq for Request {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Request {}

impl Hash for Request {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("id", &self.id)
            .field("method", &self.method)
            .field("url", &self.url.as_str())
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Request builder.
///
/// Invalid URLs, headers and bodies are reported by [`RequestBuilder::build`].
pub struct RequestBuilder {
    method: Method,
    url: Result<Url>,
    headers: HeaderMap,
    kind: RequestKind,
    body: Option<Body>,
    progress: Option<Progress>,
    error: Option<Error>,
}

impl RequestBuilder {
    pub(crate) fn new(method: Method, url: impl AsRef<str>, kind: RequestKind) -> Self {
        let url = url.as_ref();
        Self {
            method,
            url: Url::parse(url).map_err(|e| Error::InvalidUrl(format!("{}: {}", url, e))),
            headers: HeaderMap::new(),
            kind,
            body: None,
            progress: None,
            error: None,
        }
    }

    /// Append a header; an existing header of the same name is kept
    pub fn header<K, V>(mut self, name: K, value: V) -> Self
    where
        K: TryInto<HeaderName>,
        V: TryInto<HeaderValue>,
    {
        match (name.try_into(), value.try_into()) {
            (Ok(name), Ok(value)) => {
                self.headers.append(name, value);
            }
            _ => {
                self.error.get_or_insert(Error::InvalidHeader);
            }
        }
        self
    }

    /// Append every header in `headers`
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        let mut last_name = None;
        for (name, value) in headers {
            if let Some(name) = name {
                last_name = Some(name);
            }
            if let Some(name) = &last_name {
                self.headers.append(name.clone(), value);
            }
        }
        self
    }

    /// Set the request body (data requests only)
    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Set a JSON body (data requests only)
    pub fn json(mut self, value: impl serde::Serialize) -> Self {
        match Body::json(value) {
            Ok(body) => self.body = Some(body),
            Err(e) => {
                self.error.get_or_insert(e);
            }
        }
        self
    }

    /// Set a text body (data requests only)
    pub fn text(self, content: impl Into<String>) -> Self {
        self.body(Body::text(content))
    }

    /// Track progress without an observer
    pub fn track_progress(mut self) -> Self {
        self.progress.get_or_insert_with(Progress::new);
        self
    }

    /// Track progress, reporting `(completed, total)` to `callback`
    pub fn progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(u64, Option<u64>) + Send + Sync + 'static,
    {
        self.progress = Some(Progress::with_callback(callback));
        self
    }

    /// Finish the request
    pub fn build(self) -> Result<Request> {
        if let Some(error) = self.error {
            return Err(error);
        }
        let url = self.url?;
        let mut headers = self.headers;

        let kind = match (self.kind, self.body) {
            (kind, None) => kind,
            (RequestKind::Data { .. }, Some(body)) => {
                if !headers.contains_key(CONTENT_TYPE) {
                    let content_type = HeaderValue::from_str(body.content_type())
                        .map_err(|_| Error::InvalidHeader)?;
                    headers.insert(CONTENT_TYPE, content_type);
                }
                RequestKind::Data {
                    body: Some(body.into_bytes()),
                }
            }
            (_, Some(_)) => {
                return Err(Error::InvalidRequest(
                    "a body can only be attached to data requests".to_string(),
                ));
            }
        };

        Ok(Request {
            id: RequestId::generate(),
            url,
            method: self.method,
            headers,
            kind,
            progress: self.progress,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_identity_equality() {
        let a = Request::get("https://example.test/get").build().unwrap();
        let b = Request::get("https://example.test/get").build().unwrap();
        assert_ne!(a, b);
        assert_ne!(a.id(), b.id());

        let a_again = a.clone();
        assert_eq!(a, a_again);

        let set: HashSet<Request> = [a.clone(), b, a_again].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_duplicate_headers_are_kept_in_order() {
        let request = Request::get("https://example.test/")
            .header("x-tag", "one")
            .header("x-tag", "two")
            .build()
            .unwrap();
        let values: Vec<_> = request.headers().get_all("x-tag").iter().collect();
        assert_eq!(values, vec!["one", "two"]);
    }

    #[test]
    fn test_body_sets_content_type_once() {
        let request = Request::data(Method::POST, "https://example.test/post")
            .header("content-type", "application/vnd.custom+json")
            .json(serde_json::json!({"a": 1}))
            .build()
            .unwrap();
        assert_eq!(
            request.headers().get(CONTENT_TYPE).unwrap(),
            "application/vnd.custom+json"
        );
        assert_eq!(request.body().unwrap().as_ref(), br#"{"a":1}"#);
    }

    #[test]
    fn test_kind_specific_fields() {
        let upload = Request::upload(Method::PUT, "https://example.test/up", "/tmp/in.bin")
            .build()
            .unwrap();
        assert_eq!(upload.source_location(), Some(Path::new("/tmp/in.bin")));
        assert_eq!(upload.destination_location(), None);
        assert!(upload.body().is_none());

        let download = Request::download("https://example.test/file", "/tmp/out.bin")
            .build()
            .unwrap();
        assert!(download.is_download());
        assert_eq!(download.destination_location(), Some(Path::new("/tmp/out.bin")));
    }

    #[test]
    fn test_build_errors() {
        assert!(matches!(
            Request::get("not a url").build(),
            Err(Error::InvalidUrl(_))
        ));
        assert!(matches!(
            Request::get("https://example.test/")
                .header("bad header", "v")
                .build(),
            Err(Error::InvalidHeader)
        ));
        assert!(matches!(
            Request::download("https://example.test/", "/tmp/x")
                .text("nope")
                .build(),
            Err(Error::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_progress_is_opt_in() {
        let plain = Request::get("https://example.test/").build().unwrap();
        assert!(plain.progress().is_none());

        let tracked = Request::get("https://example.test/")
            .track_progress()
            .build()
            .unwrap();
        assert_eq!(tracked.progress().unwrap().completed(), 0);
    }
}
