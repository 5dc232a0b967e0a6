//! Scriptable in-memory transport shared by the integration tests.
//!
//! Sessions and tasks are recorded as they are created; tests drive each
//! task by hand with the delegate events a real transport would deliver.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use tasklane::transport::{
    ResponseDisposition, SessionId, Transport, TransportEvents, TransportSession, TransportTask,
};
use tasklane::{
    Configuration, Error, Request, Response, ResponseMetadata, Result, SessionManager,
};

pub const WAIT: Duration = Duration::from_secs(2);
pub const QUIET: Duration = Duration::from_millis(150);

#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<TransportState>,
}

#[derive(Default)]
struct TransportState {
    sessions: Mutex<Vec<Arc<MockSession>>>,
    without_resume: AtomicBool,
    refuse_sessions: AtomicBool,
    idle: AtomicBool,
    deferred_cancel: AtomicBool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tasks report that they cannot be resumed once suspended
    pub fn without_resume() -> Self {
        let transport = Self::default();
        transport.state.without_resume.store(true, Ordering::SeqCst);
        transport
    }

    /// Every session creation fails with a network error
    pub fn refusing_sessions() -> Self {
        let transport = Self::default();
        transport.state.refuse_sessions.store(true, Ordering::SeqCst);
        transport
    }

    /// Sessions report no queued events
    pub fn idle() -> Self {
        let transport = Self::default();
        transport.state.idle.store(true, Ordering::SeqCst);
        transport
    }

    /// Cancelled tasks only complete when the test completes them
    pub fn deferred_cancel() -> Self {
        let transport = Self::default();
        transport.state.deferred_cancel.store(true, Ordering::SeqCst);
        transport
    }

    pub fn sessions(&self) -> Vec<Arc<MockSession>> {
        self.state.sessions.lock().unwrap().clone()
    }

    pub fn session_count(&self) -> usize {
        self.state.sessions.lock().unwrap().len()
    }

    pub fn session(&self, index: usize) -> Arc<MockSession> {
        self.sessions()[index].clone()
    }

    pub fn manager(&self) -> SessionManager {
        SessionManager::builder()
            .transport(self.clone())
            .build()
            .unwrap()
    }
}

impl Transport for MockTransport {
    fn create_session(
        &self,
        id: SessionId,
        configuration: &Configuration,
        events: Arc<dyn TransportEvents>,
    ) -> Result<Arc<dyn TransportSession>> {
        if self.state.refuse_sessions.load(Ordering::SeqCst) {
            return Err(Error::Network {
                code: -1009,
                message: "offline".to_string(),
            });
        }
        let session = Arc::new(MockSession {
            id,
            configuration: configuration.clone(),
            events,
            tasks: Mutex::new(Vec::new()),
            next_task: AtomicU64::new(1),
            invalidated: AtomicBool::new(false),
            supports_resume: !self.state.without_resume.load(Ordering::SeqCst),
            idle: self.state.idle.load(Ordering::SeqCst),
            deferred_cancel: self.state.deferred_cancel.load(Ordering::SeqCst),
        });
        self.state.sessions.lock().unwrap().push(session.clone());
        Ok(session)
    }
}

pub struct MockSession {
    id: SessionId,
    configuration: Configuration,
    events: Arc<dyn TransportEvents>,
    tasks: Mutex<Vec<Arc<MockTask>>>,
    next_task: AtomicU64,
    invalidated: AtomicBool,
    supports_resume: bool,
    idle: bool,
    deferred_cancel: bool,
}

impl MockSession {
    pub fn tasks(&self) -> Vec<Arc<MockTask>> {
        self.tasks.lock().unwrap().clone()
    }

    pub fn task(&self, index: usize) -> Arc<MockTask> {
        self.tasks()[index].clone()
    }

    pub fn is_invalidated(&self) -> bool {
        self.invalidated.load(Ordering::SeqCst)
    }

    /// Report that the session became invalid on its own
    pub fn invalidate(&self) {
        self.invalidated.store(true, Ordering::SeqCst);
        self.events.did_become_invalid(self.id, None);
    }

    /// Report that all queued background events were delivered
    pub fn finish_background_events(&self) {
        self.events.did_finish_events_for_background_session(self.id);
    }
}

impl TransportSession for MockSession {
    fn id(&self) -> SessionId {
        self.id
    }

    fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    fn create_task(&self, request: &Request) -> Result<Arc<dyn TransportTask>> {
        if self.is_invalidated() {
            return Err(Error::SessionInvalidated);
        }
        let task = Arc::new(MockTask {
            identifier: self.next_task.fetch_add(1, Ordering::SeqCst),
            session: self.id,
            events: self.events.clone(),
            request: request.clone(),
            calls: Mutex::new(Vec::new()),
            completed: AtomicBool::new(false),
            supports_resume: self.supports_resume,
            deferred_cancel: self.deferred_cancel,
        });
        self.tasks.lock().unwrap().push(task.clone());
        Ok(task)
    }

    fn has_pending_events(&self) -> bool {
        !self.idle
    }

    fn finish_tasks_and_invalidate(&self) {
        self.invalidate();
    }

    fn invalidate_and_cancel(&self) {
        self.invalidated.store(true, Ordering::SeqCst);
        for task in self.tasks() {
            task.cancel();
        }
        self.events.did_become_invalid(self.id, None);
    }
}

pub struct MockTask {
    identifier: u64,
    session: SessionId,
    events: Arc<dyn TransportEvents>,
    request: Request,
    calls: Mutex<Vec<&'static str>>,
    completed: AtomicBool,
    supports_resume: bool,
    deferred_cancel: bool,
}

impl MockTask {
    /// The request this task was created for
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Control calls received from the manager, in order
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| **c == call).count()
    }

    pub fn respond(&self, status: u16, headers: &[(&str, &str)]) -> ResponseDisposition {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            map.append(
                HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        let metadata = ResponseMetadata::from_parts(
            Some(self.request.url().clone()),
            StatusCode::from_u16(status).unwrap(),
            map,
        );
        self.events
            .did_receive_response(self.session, self.identifier, metadata)
    }

    pub fn send_data(&self, chunk: &[u8]) {
        self.events
            .did_receive_data(self.session, self.identifier, Bytes::copy_from_slice(chunk));
    }

    pub fn sent(&self, total: u64, expected: Option<u64>) {
        self.events
            .did_send_body_data(self.session, self.identifier, total, expected);
    }

    pub fn written(&self, total: u64, expected: Option<u64>) {
        self.events
            .did_write_data(self.session, self.identifier, total, expected);
    }

    pub fn finish_download(&self, location: &Path) {
        self.events
            .did_finish_downloading(self.session, self.identifier, location);
    }

    /// Deliver a completion event, even if one was already delivered
    pub fn complete(&self, error: Option<Error>) {
        self.completed.store(true, Ordering::SeqCst);
        self.events.did_complete(self.session, self.identifier, error);
    }
}

impl TransportTask for MockTask {
    fn identifier(&self) -> u64 {
        self.identifier
    }

    fn resume(&self) {
        self.calls.lock().unwrap().push("resume");
    }

    fn suspend(&self) {
        self.calls.lock().unwrap().push("suspend");
    }

    fn cancel(&self) {
        self.calls.lock().unwrap().push("cancel");
        if !self.deferred_cancel && !self.completed.swap(true, Ordering::SeqCst) {
            self.events
                .did_complete(self.session, self.identifier, Some(Error::Cancelled));
        }
    }

    fn supports_resume(&self) -> bool {
        self.supports_resume
    }
}

/// Completion callback forwarding its result into a channel
pub fn recorder<T: Send + 'static>() -> (impl FnOnce(T) + Send + 'static, Receiver<T>) {
    let (tx, rx) = mpsc::channel();
    (
        move |result: T| {
            let _ = tx.send(result);
        },
        rx,
    )
}

/// [`recorder`] for a manager completion callback
pub fn completion() -> (
    impl FnOnce(Result<Response>) + Send + 'static,
    Receiver<Result<Response>>,
) {
    recorder::<Result<Response>>()
}

/// Receive the single expected result and check nothing else arrives
pub fn expect_one<T>(rx: &Receiver<T>) -> T {
    let result = rx.recv_timeout(WAIT).expect("completion was not delivered");
    assert!(rx.recv_timeout(QUIET).is_err(), "completion delivered twice");
    result
}

pub fn expect_none<T>(rx: &Receiver<T>) {
    assert!(rx.recv_timeout(QUIET).is_err(), "unexpected completion");
}
