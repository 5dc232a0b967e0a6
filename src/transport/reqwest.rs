//! Default transport on reqwest and tokio

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use bytes::Bytes;
use futures_util::StreamExt;
use http::header::{CONTENT_LENGTH, HeaderMap, HeaderName, HeaderValue};
use http::Method;
use reqwest::cookie::Jar;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::runtime::Handle;
use tokio::sync::watch;
use url::Url;

use super::{
    ResponseDisposition, SessionId, TaskIdentifier, Transport, TransportEvents, TransportSession,
    TransportTask,
};
use crate::config::{CachePolicy, Configuration, CookiePolicy, CookieStorage, CustomConfiguration};
use crate::request::{Request, RequestKind};
use crate::response::ResponseMetadata;
use crate::{Error, Result};

const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Transport running every task as a tokio task on a reqwest client.
///
/// Foreground and background sessions (and custom sessions using
/// [`CookieStorage::Shared`]) share one cookie jar; ephemeral sessions get a
/// private one.
#[derive(Clone)]
pub struct ReqwestTransport {
    runtime: Handle,
    cookies: Arc<Jar>,
}

impl ReqwestTransport {
    /// Create a transport on the current tokio runtime
    pub fn new() -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| Error::Internal(format!("reqwest transport requires a tokio runtime: {}", e)))?;
        Ok(Self::with_runtime(runtime))
    }

    /// Create a transport spawning its tasks on `runtime`
    pub fn with_runtime(runtime: Handle) -> Self {
        Self {
            runtime,
            cookies: Arc::new(Jar::default()),
        }
    }
}

impl std::fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqwestTransport").finish_non_exhaustive()
    }
}

impl Transport for ReqwestTransport {
    fn create_session(
        &self,
        id: SessionId,
        configuration: &Configuration,
        events: Arc<dyn TransportEvents>,
    ) -> Result<Arc<dyn TransportSession>> {
        let client = build_client(configuration, &self.cookies)?;
        Ok(Arc::new(ReqwestSession {
            state: Arc::new(SessionState {
                id,
                configuration: configuration.clone(),
                client,
                events,
                runtime: self.runtime.clone(),
                next_task: AtomicU64::new(1),
                live: Mutex::new(HashMap::new()),
                invalidating: AtomicBool::new(false),
                invalidated: AtomicBool::new(false),
            }),
        }))
    }
}

fn build_client(configuration: &Configuration, shared: &Arc<Jar>) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder();

    let jar = match configuration {
        Configuration::Foreground | Configuration::Background(_) => Some(shared.clone()),
        Configuration::Ephemeral => Some(Arc::new(Jar::default())),
        Configuration::Custom(custom) => match (custom.cookie_policy, custom.cookie_storage) {
            (CookiePolicy::Never, _) => None,
            (_, CookieStorage::Shared) => Some(shared.clone()),
            (_, CookieStorage::Isolated) => Some(Arc::new(Jar::default())),
        },
    };
    if let Some(jar) = jar {
        builder = builder.cookie_provider(jar);
    }

    if let Configuration::Custom(custom) = configuration {
        builder = apply_custom(builder, custom)?;
    }

    builder
        .build()
        .map_err(|e| Error::Internal(format!("Failed to create reqwest client: {}", e)))
}

fn apply_custom(
    mut builder: reqwest::ClientBuilder,
    custom: &CustomConfiguration,
) -> Result<reqwest::ClientBuilder> {
    if let Some(timeout) = custom.timeout_for_request {
        builder = builder.read_timeout(timeout);
    }
    if let Some(timeout) = custom.timeout_for_resource {
        builder = builder.timeout(timeout);
    }
    if let Some(max) = custom.max_connections_per_host {
        builder = builder.pool_max_idle_per_host(max);
    }
    if let Some(user_agent) = &custom.user_agent {
        builder = builder.user_agent(user_agent.as_str());
    }

    if !custom.additional_headers.is_empty() {
        let mut headers = HeaderMap::new();
        for (name, value) in &custom.additional_headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| Error::InvalidHeader)?;
            let value = HeaderValue::from_str(value).map_err(|_| Error::InvalidHeader)?;
            headers.append(name, value);
        }
        builder = builder.default_headers(headers);
    }

    if custom.cache_policy != CachePolicy::UseProtocolCachePolicy {
        tracing::warn!("reqwest has no response cache; ignoring {:?}", custom.cache_policy);
    }
    if !custom.allows_cellular_access {
        tracing::warn!("reqwest cannot restrict cellular access; ignoring");
    }

    Ok(builder)
}

struct SessionState {
    id: SessionId,
    configuration: Configuration,
    client: reqwest::Client,
    events: Arc<dyn TransportEvents>,
    runtime: Handle,
    next_task: AtomicU64,
    live: Mutex<HashMap<TaskIdentifier, Weak<ReqwestTask>>>,
    invalidating: AtomicBool,
    invalidated: AtomicBool,
}

impl SessionState {
    fn task_finished(&self, task: TaskIdentifier) {
        let drained = {
            let mut live = lock(&self.live);
            live.remove(&task);
            live.retain(|_, task| task.strong_count() > 0);
            live.is_empty()
        };
        if drained && self.configuration.is_background() {
            self.events.did_finish_events_for_background_session(self.id);
        }
        self.invalidate_if_drained();
    }

    fn invalidate_if_drained(&self) {
        if !self.invalidating.load(Ordering::Acquire) {
            return;
        }
        let drained = {
            let mut live = lock(&self.live);
            live.retain(|_, task| task.strong_count() > 0);
            live.is_empty()
        };
        if drained && !self.invalidated.swap(true, Ordering::AcqRel) {
            tracing::debug!("{} invalidated", self.id);
            self.events.did_become_invalid(self.id, None);
        }
    }
}

/// Session backed by one [`reqwest::Client`]
pub struct ReqwestSession {
    state: Arc<SessionState>,
}

impl TransportSession for ReqwestSession {
    fn id(&self) -> SessionId {
        self.state.id
    }

    fn configuration(&self) -> &Configuration {
        &self.state.configuration
    }

    fn create_task(&self, request: &Request) -> Result<Arc<dyn TransportTask>> {
        if self.state.invalidating.load(Ordering::Acquire) {
            return Err(Error::SessionInvalidated);
        }

        let identifier = self.state.next_task.fetch_add(1, Ordering::Relaxed);
        let job = Job {
            session: self.state.clone(),
            task: identifier,
            method: request.method().clone(),
            url: request.url().clone(),
            headers: request.headers().clone(),
            kind: request.kind().clone(),
        };
        let (control, _) = watch::channel(Control::Suspended);
        let task = Arc::new(ReqwestTask {
            identifier,
            control,
            pending: Mutex::new(Some(job)),
            runtime: self.state.runtime.clone(),
        });
        lock(&self.state.live).insert(identifier, Arc::downgrade(&task));
        Ok(task)
    }

    fn has_pending_events(&self) -> bool {
        let mut live = lock(&self.state.live);
        live.retain(|_, task| task.strong_count() > 0);
        !live.is_empty()
    }

    fn finish_tasks_and_invalidate(&self) {
        self.state.invalidating.store(true, Ordering::Release);
        self.state.invalidate_if_drained();
    }

    fn invalidate_and_cancel(&self) {
        self.state.invalidating.store(true, Ordering::Release);
        let tasks: Vec<Arc<ReqwestTask>> = lock(&self.state.live)
            .values()
            .filter_map(Weak::upgrade)
            .collect();
        for task in tasks {
            task.cancel();
        }
        self.state.invalidate_if_drained();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Running,
    Suspended,
    Cancelled,
}

/// Everything needed to run a task once it is first started
struct Job {
    session: Arc<SessionState>,
    task: TaskIdentifier,
    method: Method,
    url: Url,
    headers: HeaderMap,
    kind: RequestKind,
}

/// Task created suspended; the first resume or cancel spawns it
pub struct ReqwestTask {
    identifier: TaskIdentifier,
    control: watch::Sender<Control>,
    pending: Mutex<Option<Job>>,
    runtime: Handle,
}

impl ReqwestTask {
    fn launch(&self) {
        let Some(job) = lock(&self.pending).take() else {
            return;
        };
        let control = self.control.subscribe();
        self.runtime.spawn(run(job, control));
    }
}

impl TransportTask for ReqwestTask {
    fn identifier(&self) -> TaskIdentifier {
        self.identifier
    }

    fn resume(&self) {
        self.control.send_if_modified(|control| {
            if *control == Control::Suspended {
                *control = Control::Running;
                true
            } else {
                false
            }
        });
        self.launch();
    }

    fn suspend(&self) {
        self.control.send_if_modified(|control| {
            if *control == Control::Running {
                *control = Control::Suspended;
                true
            } else {
                false
            }
        });
    }

    fn cancel(&self) {
        self.control.send_replace(Control::Cancelled);
        // An unstarted task still has to report its cancellation.
        self.launch();
    }
}

async fn run(job: Job, control: watch::Receiver<Control>) {
    let mut cancel_watch = control.clone();
    let result = tokio::select! {
        biased;
        _ = cancelled(&mut cancel_watch) => Err(Error::Cancelled),
        result = drive(&job, control) => result,
    };

    let session = &job.session;
    if let Err(error) = &result {
        tracing::debug!("Task {} on {} failed: {}", job.task, session.id, error);
    }
    session.events.did_complete(session.id, job.task, result.err());
    session.task_finished(job.task);
}

async fn cancelled(control: &mut watch::Receiver<Control>) {
    if control.wait_for(|c| *c == Control::Cancelled).await.is_err() {
        // Task handle dropped without cancelling
        std::future::pending::<()>().await;
    }
}

/// Wait while the task is suspended
async fn gate(control: &mut watch::Receiver<Control>) {
    let _ = control.wait_for(|c| *c != Control::Suspended).await;
}

async fn drive(job: &Job, mut control: watch::Receiver<Control>) -> Result<()> {
    gate(&mut control).await;
    let session = &job.session;

    let mut builder = session
        .client
        .request(job.method.clone(), job.url.clone())
        .headers(job.headers.clone());
    match &job.kind {
        RequestKind::Data { body: Some(body) } => builder = builder.body(body.clone()),
        RequestKind::Data { body: None } | RequestKind::Download { .. } => {}
        RequestKind::Upload { source } => {
            let (body, length) = upload_body(job, source).await?;
            if !job.headers.contains_key(CONTENT_LENGTH) {
                builder = builder.header(CONTENT_LENGTH, length);
            }
            builder = builder.body(body);
        }
    }

    let response = builder.send().await.map_err(Error::from_reqwest)?;
    let expected = response.content_length();
    let metadata = ResponseMetadata::from_parts(
        Some(response.url().clone()),
        response.status(),
        response.headers().clone(),
    );
    if session.events.did_receive_response(session.id, job.task, metadata) == ResponseDisposition::Cancel {
        return Err(Error::Cancelled);
    }

    let mut stream = std::pin::pin!(response.bytes_stream());
    if let RequestKind::Download { .. } = &job.kind {
        return download(job, &mut stream, expected, &mut control).await;
    }

    loop {
        gate(&mut control).await;
        match stream.next().await {
            Some(chunk) => {
                let chunk = chunk.map_err(Error::from_reqwest)?;
                if !chunk.is_empty() {
                    session.events.did_receive_data(session.id, job.task, chunk);
                }
            }
            None => return Ok(()),
        }
    }
}

async fn download<S>(
    job: &Job,
    stream: &mut S,
    expected: Option<u64>,
    control: &mut watch::Receiver<Control>,
) -> Result<()>
where
    S: futures_util::stream::Stream<Item = reqwest::Result<Bytes>> + Unpin,
{
    let session = &job.session;
    let (file, path) = tempfile::Builder::new()
        .prefix("tasklane-download-")
        .tempfile()?
        .into_parts();
    let mut file = tokio::fs::File::from_std(file);
    let mut written = 0u64;

    loop {
        gate(control).await;
        match stream.next().await {
            Some(chunk) => {
                let chunk = chunk.map_err(Error::from_reqwest)?;
                file.write_all(&chunk).await?;
                written += chunk.len() as u64;
                session.events.did_write_data(session.id, job.task, written, expected);
            }
            None => break,
        }
    }
    file.flush().await?;
    drop(file);

    session.events.did_finish_downloading(session.id, job.task, &path);
    // The temporary is removed here unless the delegate moved it away.
    drop(path);
    Ok(())
}

/// Stream `source` in chunks, reporting upload progress as each is read
async fn upload_body(job: &Job, source: &Path) -> Result<(reqwest::Body, u64)> {
    let file = tokio::fs::File::open(source).await?;
    let total = file.metadata().await?.len();
    let session = job.session.clone();
    let task = job.task;

    let chunks = futures_util::stream::try_unfold((file, 0u64), move |(mut file, sent)| {
        let session = session.clone();
        async move {
            let mut buffer = vec![0u8; UPLOAD_CHUNK_SIZE];
            let read = file.read(&mut buffer).await?;
            if read == 0 {
                return Ok::<_, std::io::Error>(None);
            }
            buffer.truncate(read);
            let sent = sent + read as u64;
            session.events.did_send_body_data(session.id, task, sent, Some(total));
            Ok(Some((Bytes::from(buffer), (file, sent))))
        }
    });

    Ok((reqwest::Body::wrap_stream(chunks), total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_custom_client_builds() {
        let configuration = CustomConfiguration::builder()
            .timeout_for_request(Duration::from_secs(5))
            .timeout_for_resource(Duration::from_secs(60))
            .max_connections_per_host(2)
            .cookie_storage(CookieStorage::Isolated)
            .header("X-Client", "tasklane")
            .user_agent("tasklane-test")
            .build();
        let jar = Arc::new(Jar::default());
        assert!(build_client(&configuration, &jar).is_ok());
    }

    #[test]
    fn test_invalid_additional_header_is_rejected() {
        let configuration = CustomConfiguration::builder()
            .header("bad header", "value")
            .build();
        let jar = Arc::new(Jar::default());
        assert!(matches!(
            build_client(&configuration, &jar),
            Err(Error::InvalidHeader)
        ));
    }

    #[test]
    fn test_new_without_runtime_fails() {
        assert!(matches!(ReqwestTransport::new(), Err(Error::Internal(_))));
    }
}
