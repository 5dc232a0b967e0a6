//! REST resource layer on top of [`SessionManager`]
//!
//! Resources are paths relative to a base URL. Every call merges the client's
//! default headers with the call-site headers and reports its outcome through
//! a completion callback, classifying failures in a fixed order: transport
//! error, then non-success status, then payload decoding.

mod auth;
mod operation;

pub use auth::Auth;
pub use operation::Operation;

use std::path::{Path, PathBuf};

use http::header::{AUTHORIZATION, HeaderName, HeaderValue};
use http::{HeaderMap, Method};
use serde::Serialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::config::Configuration;
use crate::handle::RequestHandle;
use crate::manager::SessionManager;
use crate::request::{Request, RequestBuilder};
use crate::response::Response;
use crate::{Error, Result};

/// Client for a REST API rooted at a base URL
#[derive(Clone, Debug)]
pub struct RestClient {
    manager: SessionManager,
    base_url: Url,
    default_headers: HeaderMap,
    configuration: Configuration,
}

impl RestClient {
    /// Create a client builder for `base_url`
    pub fn builder(base_url: impl Into<String>) -> RestClientBuilder {
        RestClientBuilder::new(base_url)
    }

    /// Base URL resources are resolved against
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Headers sent with every request
    pub fn default_headers(&self) -> &HeaderMap {
        &self.default_headers
    }

    /// Manager requests are submitted through
    pub fn manager(&self) -> &SessionManager {
        &self.manager
    }

    /// Start a call on the resource at `path`
    pub fn resource(&self, path: impl AsRef<str>) -> Resource<'_> {
        Resource {
            client: self,
            path: path.as_ref().trim_start_matches('/').to_string(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            error: None,
        }
    }

    /// Fetch and decode the resource at `path`
    pub fn get<T, F>(&self, path: impl AsRef<str>, completion: F) -> Result<RequestHandle>
    where
        T: DeserializeOwned + Send + 'static,
        F: FnOnce(Result<T>) + Send + 'static,
    {
        self.resource(path).get(completion)
    }

    /// Create a resource under `path` from `payload`
    pub fn post<P, F>(&self, path: impl AsRef<str>, payload: &P, completion: F) -> Result<RequestHandle>
    where
        P: Serialize + ?Sized,
        F: FnOnce(Result<()>) + Send + 'static,
    {
        self.resource(path).post(payload, completion)
    }

    /// Replace the resource at `path` with `payload`
    pub fn put<P, F>(&self, path: impl AsRef<str>, payload: &P, completion: F) -> Result<RequestHandle>
    where
        P: Serialize + ?Sized,
        F: FnOnce(Result<()>) + Send + 'static,
    {
        self.resource(path).put(payload, completion)
    }

    /// Partially update the resource at `path` with `payload`
    pub fn patch<P, F>(&self, path: impl AsRef<str>, payload: &P, completion: F) -> Result<RequestHandle>
    where
        P: Serialize + ?Sized,
        F: FnOnce(Result<()>) + Send + 'static,
    {
        self.resource(path).patch(payload, completion)
    }

    /// Delete the resource at `path`
    pub fn delete<F>(&self, path: impl AsRef<str>, completion: F) -> Result<RequestHandle>
    where
        F: FnOnce(Result<()>) + Send + 'static,
    {
        self.resource(path).delete(completion)
    }

    /// Merge default headers with `call_site`; nothing is deduplicated
    fn merged_headers(&self, call_site: &HeaderMap) -> HeaderMap {
        let mut headers = self.default_headers.clone();
        for (name, value) in call_site {
            headers.append(name.clone(), value.clone());
        }
        headers
    }

    fn resource_url(&self, path: &str, query: &[(String, String)]) -> Result<Url> {
        let mut url = self
            .base_url
            .join(path)
            .map_err(|e| Error::InvalidUrl(format!("{}: {}", path, e)))?;
        if !query.is_empty() {
            let encoded = query
                .iter()
                .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
                .collect::<Vec<_>>()
                .join("&");
            let merged = match url.query() {
                Some(existing) if !existing.is_empty() => format!("{}&{}", existing, encoded),
                _ => encoded,
            };
            url.set_query(Some(&merged));
        }
        Ok(url)
    }

    fn submit<F>(&self, request: Request, completion: F) -> RequestHandle
    where
        F: FnOnce(Result<Response>) + Send + 'static,
    {
        tracing::debug!("{} {}", request.method(), request.url());
        self.manager.send(request, &self.configuration, completion)
    }
}

/// Builder for [`RestClient`]
pub struct RestClientBuilder {
    base_url: String,
    headers: HeaderMap,
    auth: Option<Auth>,
    configuration: Configuration,
    manager: Option<SessionManager>,
    error: Option<Error>,
}

impl RestClientBuilder {
    fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            headers: HeaderMap::new(),
            auth: None,
            configuration: Configuration::default(),
            manager: None,
            error: None,
        }
    }

    /// Add a header sent with every request
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

    /// Authorization sent with every request
    pub fn auth(mut self, auth: Auth) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Session configuration requests run under
    pub fn configuration(mut self, configuration: Configuration) -> Self {
        self.configuration = configuration;
        self
    }

    /// Submit through an existing manager instead of creating one
    pub fn manager(mut self, manager: SessionManager) -> Self {
        self.manager = Some(manager);
        self
    }

    /// Build the client
    pub fn build(self) -> Result<RestClient> {
        if let Some(error) = self.error {
            return Err(error);
        }

        // Relative resources must resolve below the base path, not beside it.
        let mut base = self.base_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url =
            Url::parse(&base).map_err(|e| Error::InvalidUrl(format!("{}: {}", self.base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::InvalidUrl(format!("{} cannot be a base URL", self.base_url)));
        }

        let mut default_headers = self.headers;
        if let Some(auth) = &self.auth {
            default_headers.insert(AUTHORIZATION, auth.header()?);
        }

        let manager = match self.manager {
            Some(manager) => manager,
            None => SessionManager::new()?,
        };

        Ok(RestClient {
            manager,
            base_url,
            default_headers,
            configuration: self.configuration,
        })
    }
}

/// A single call against one resource.
///
/// Construction errors (bad URL, header or payload) are returned when the
/// call is issued; everything after submission arrives through the completion.
pub struct Resource<'a> {
    client: &'a RestClient,
    path: String,
    query: Vec<(String, String)>,
    headers: HeaderMap,
    error: Option<Error>,
}

impl<'a> Resource<'a> {
    /// Append a query parameter
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Append a call-site header, sent after the client's default headers
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

    /// Fetch and decode the resource. An empty body decodes as JSON `null`.
    pub fn get<T, F>(mut self, completion: F) -> Result<RequestHandle>
    where
        T: DeserializeOwned + Send + 'static,
        F: FnOnce(Result<T>) + Send + 'static,
    {
        let request = self.data_request(Operation::Fetch.method(), None)?;
        Ok(self.client.submit(request, move |result| {
            completion(classify(result).and_then(|response| decode(&response)));
        }))
    }

    /// `POST` `payload`
    pub fn post<P, F>(self, payload: &P, completion: F) -> Result<RequestHandle>
    where
        P: Serialize + ?Sized,
        F: FnOnce(Result<()>) + Send + 'static,
    {
        self.send(Operation::Create, Some(payload), completion)
    }

    /// `PUT` `payload`
    pub fn put<P, F>(self, payload: &P, completion: F) -> Result<RequestHandle>
    where
        P: Serialize + ?Sized,
        F: FnOnce(Result<()>) + Send + 'static,
    {
        self.send(Operation::Replace, Some(payload), completion)
    }

    /// `PATCH` `payload`
    pub fn patch<P, F>(self, payload: &P, completion: F) -> Result<RequestHandle>
    where
        P: Serialize + ?Sized,
        F: FnOnce(Result<()>) + Send + 'static,
    {
        self.send(Operation::Update, Some(payload), completion)
    }

    /// `DELETE` the resource
    pub fn delete<F>(self, completion: F) -> Result<RequestHandle>
    where
        F: FnOnce(Result<()>) + Send + 'static,
    {
        self.send::<(), F>(Operation::Remove, None, completion)
    }

    /// Run `operation` with an optional JSON payload, reporting only success
    pub fn send<P, F>(mut self, operation: Operation, payload: Option<&P>, completion: F) -> Result<RequestHandle>
    where
        P: Serialize + ?Sized,
        F: FnOnce(Result<()>) + Send + 'static,
    {
        let body = payload.map(serde_json::to_value).transpose()?;
        let request = self.data_request(operation.method(), body)?;
        Ok(self.client.submit(request, move |result| {
            completion(classify(result).map(|_| ()));
        }))
    }

    /// Run `operation` with an optional JSON payload and decode the response
    pub fn exchange<P, T, F>(mut self, operation: Operation, payload: Option<&P>, completion: F) -> Result<RequestHandle>
    where
        P: Serialize + ?Sized,
        T: DeserializeOwned + Send + 'static,
        F: FnOnce(Result<T>) + Send + 'static,
    {
        let body = payload.map(serde_json::to_value).transpose()?;
        let request = self.data_request(operation.method(), body)?;
        Ok(self.client.submit(request, move |result| {
            completion(classify(result).and_then(|response| decode(&response)));
        }))
    }

    /// Stream the file at `source` as the body of `operation`
    pub fn upload<F>(mut self, operation: Operation, source: impl AsRef<Path>, completion: F) -> Result<RequestHandle>
    where
        F: FnOnce(Result<()>) + Send + 'static,
    {
        let url = self.url()?;
        let request = self
            .with_headers(Request::upload(operation.method(), url.as_str(), source))
            .track_progress()
            .build()?;
        Ok(self.client.submit(request, move |result| {
            completion(classify(result).map(|_| ()));
        }))
    }

    /// Download the resource to `destination`, replacing any existing file.
    ///
    /// The body is staged next to `destination` and only moved over it on a
    /// success status; otherwise `destination` is left as it was.
    pub fn download<F>(mut self, destination: impl AsRef<Path>, completion: F) -> Result<RequestHandle>
    where
        F: FnOnce(Result<PathBuf>) + Send + 'static,
    {
        let url = self.url()?;
        let destination = destination.as_ref().to_path_buf();
        let staging = staging_path(&destination)?;
        let request = self
            .with_headers(Request::download(url.as_str(), &staging))
            .track_progress()
            .build()?;
        Ok(self.client.submit(request, move |result| {
            // Unless persisted, the staging path is dropped, and its file
            // removed, before `completion` runs.
            let outcome = classify(result).and_then(|response| {
                response.resource_location().ok_or(Error::NoResponse)?;
                staging.persist(&destination).map_err(|e| Error::Relocation {
                    from: e.path.to_path_buf(),
                    to: destination.clone(),
                    source: e.error,
                })?;
                Ok(destination)
            });
            completion(outcome);
        }))
    }

    fn url(&mut self) -> Result<Url> {
        if let Some(error) = self.error.take() {
            return Err(error);
        }
        self.client.resource_url(&self.path, &self.query)
    }

    fn with_headers(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.headers(self.client.merged_headers(&self.headers))
    }

    fn data_request(&mut self, method: Method, body: Option<serde_json::Value>) -> Result<Request> {
        let url = self.url()?;
        let mut builder = self.with_headers(Request::data(method, url.as_str()));
        if let Some(body) = body {
            builder = builder.body(body);
        }
        builder.build()
    }
}

/// Reserve a uniquely named file beside `destination`
fn staging_path(destination: &Path) -> Result<tempfile::TempPath> {
    let parent = destination
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    std::fs::create_dir_all(parent)?;
    Ok(tempfile::Builder::new()
        .prefix(".tasklane-")
        .suffix(".part")
        .tempfile_in(parent)?
        .into_temp_path())
}

/// Transport errors first, then non-success statuses
fn classify(result: Result<Response>) -> Result<Response> {
    let response = result?;
    if !response.is_success() {
        return Err(Error::from_status(response.status()));
    }
    Ok(response)
}

fn decode<T: DeserializeOwned>(response: &Response) -> Result<T> {
    let body = match response.body() {
        Some(body) if !body.is_empty() => &body[..],
        _ => &b"null"[..],
    };
    Ok(serde_json::from_slice(body)?)
}
