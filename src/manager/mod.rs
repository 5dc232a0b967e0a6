//! Session manager: routes requests to transport sessions and correlates
//! their events back to the originating requests

mod delegate;
mod dispatch;
mod entry;

pub use entry::TaskState;
pub(crate) use entry::Signal;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::runtime::Handle;
use tokio::sync::oneshot;

use crate::action::{Action, ActionKind, completion_actions};
use crate::config::Configuration;
use crate::handle::{PendingResponse, RequestHandle};
use crate::relocate::{FileRelocator, FsRelocator};
use crate::request::{Request, RequestId};
use crate::response::{Response, ResponseAccumulator, ResponseMetadata};
use crate::transport::{
    ResponseDisposition, SessionId, Transport, TransportEvents, TransportSession, TransportTask,
};
use crate::{Error, Result};

use delegate::SessionDelegate;
use dispatch::Dispatcher;
use entry::{Completion, Outcome, SessionEntry, TaskKey};

type BackgroundCompletion = Box<dyn FnOnce() + Send + 'static>;

/// Lock a mutex, recovering the guard if a panicking thread poisoned it
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Multiplexes requests over one transport session per [`Configuration`].
///
/// Cloning is cheap; clones share sessions and in-flight tasks.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<ManagerInner>,
}

impl SessionManager {
    /// Create a manager on the default transport
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    /// Create a manager builder
    pub fn builder() -> SessionManagerBuilder {
        SessionManagerBuilder::new()
    }

    /// Submit `request` on the session for `configuration`.
    ///
    /// Never fails synchronously: setup errors are reported through the
    /// failure action like any other error.
    pub fn submit(
        &self,
        request: Request,
        configuration: &Configuration,
        actions: Vec<Action>,
    ) -> RequestHandle {
        let handle = RequestHandle::new(&request, Arc::downgrade(&self.inner));
        self.inner.submit(request, configuration, actions);
        handle
    }

    /// Submit `request` with a single completion callback
    pub fn send<F>(&self, request: Request, configuration: &Configuration, completion: F) -> RequestHandle
    where
        F: FnOnce(Result<Response>) + Send + 'static,
    {
        self.submit(request, configuration, completion_actions(Some(completion)))
    }

    /// Submit `request` and await its response
    pub fn fetch(&self, request: Request, configuration: &Configuration) -> PendingResponse {
        let (tx, rx) = oneshot::channel();
        let handle = self.send(request, configuration, move |result| {
            // The receiver may have been dropped; nobody is waiting then.
            let _ = tx.send(result);
        });
        PendingResponse::new(handle, rx)
    }

    /// Pause every live task of `request`
    pub fn suspend(&self, request: impl Into<RequestId>) {
        self.inner.signal(request.into(), Signal::Suspend);
    }

    /// Continue every suspended task of `request`.
    ///
    /// Silently does nothing when the transport cannot resume tasks.
    pub fn resume(&self, request: impl Into<RequestId>) {
        self.inner.signal(request.into(), Signal::Resume);
    }

    /// Cancel every live task of `request`.
    ///
    /// The failure action later fires once with [`Error::Cancelled`]. Calling
    /// this again, or after the request finished, does nothing.
    pub fn cancel(&self, request: impl Into<RequestId>) {
        self.inner.signal(request.into(), Signal::Cancel);
    }

    /// Cancel every live task on every session
    pub fn cancel_all(&self) {
        self.inner.cancel_all();
    }

    /// Current state of `request`, or `None` once it is no longer in flight
    pub fn state(&self, request: impl Into<RequestId>) -> Option<TaskState> {
        self.inner.state(request.into())
    }

    /// Number of in-flight tasks across all sessions
    pub fn live_task_count(&self) -> usize {
        lock(&self.inner.entries).len()
    }

    /// Number of cached transport sessions
    pub fn session_count(&self) -> usize {
        lock(&self.inner.sessions).len()
    }

    /// Register `completion` to run once the background session named
    /// `identifier` has delivered all of its queued events.
    ///
    /// A later registration for the same identifier replaces this one.
    pub fn register_background_completion<F>(&self, identifier: impl Into<String>, completion: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let identifier = identifier.into();
        let mut background = lock(&self.inner.background);
        if background
            .completions
            .insert(identifier.clone(), Box::new(completion))
            .is_some()
        {
            tracing::warn!("Replacing background completion for {}", identifier);
        }
    }

    /// Recreate the background session named `identifier` so the transport
    /// can deliver its queued events, and run `completion` once it has.
    ///
    /// With nothing queued, `completion` runs right away.
    pub fn reconnect_background_session<F>(
        &self,
        identifier: impl Into<String>,
        completion: F,
    ) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let identifier = identifier.into();
        let session = self
            .inner
            .session_for(&Configuration::background(identifier.clone()))?;
        self.register_background_completion(identifier, completion);

        // Whichever of this and the transport's own signal comes first takes
        // the completion; the other finds nothing registered.
        if !session.has_pending_events() {
            self.inner.on_background_events_finished(session.id());
        }
        Ok(())
    }

    /// Cancel every live task and invalidate every session.
    ///
    /// Sessions are recreated on the next submission.
    pub fn shutdown(&self) {
        let sessions: Vec<_> = lock(&self.inner.sessions).drain().map(|(_, s)| s).collect();
        tracing::debug!("Shutting down {} session(s)", sessions.len());
        for session in sessions {
            session.invalidate_and_cancel();
        }
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("sessions", &self.session_count())
            .field("live_tasks", &self.live_task_count())
            .finish()
    }
}

/// Builder for [`SessionManager`]
pub struct SessionManagerBuilder {
    transport: Option<Arc<dyn Transport>>,
    relocator: Arc<dyn FileRelocator>,
    runtime: Option<Handle>,
}

impl SessionManagerBuilder {
    /// Create a builder with the default transport and [`FsRelocator`]
    pub fn new() -> Self {
        Self {
            transport: None,
            relocator: Arc::new(FsRelocator),
            runtime: None,
        }
    }

    /// Use a custom transport provider
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Use a custom file relocator for finished downloads
    pub fn relocator(mut self, relocator: impl FileRelocator + 'static) -> Self {
        self.relocator = Arc::new(relocator);
        self
    }

    /// Runtime used to run completion actions and drive the default transport.
    ///
    /// Defaults to the runtime current at build time; without one, actions
    /// run on dedicated threads.
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// Build the manager
    pub fn build(self) -> Result<SessionManager> {
        let dispatcher = match &self.runtime {
            Some(handle) => Dispatcher::Runtime(handle.clone()),
            None => Dispatcher::current(),
        };
        let transport = match self.transport {
            Some(transport) => transport,
            None => default_transport(self.runtime)?,
        };
        let relocator = self.relocator;

        let inner = Arc::new_cyclic(|weak| ManagerInner {
            transport,
            relocator,
            dispatcher,
            delegate: Arc::new(SessionDelegate::new(weak.clone())),
            next_session: AtomicU64::new(1),
            sessions: Mutex::new(HashMap::new()),
            entries: Mutex::new(HashMap::new()),
            background: Mutex::new(BackgroundEvents::default()),
        });

        Ok(SessionManager { inner })
    }
}

impl Default for SessionManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "backend-reqwest")]
fn default_transport(runtime: Option<Handle>) -> Result<Arc<dyn Transport>> {
    let transport = match runtime {
        Some(handle) => crate::transport::reqwest::ReqwestTransport::with_runtime(handle),
        None => crate::transport::reqwest::ReqwestTransport::new()?,
    };
    Ok(Arc::new(transport))
}

#[cfg(not(feature = "backend-reqwest"))]
fn default_transport(_runtime: Option<Handle>) -> Result<Arc<dyn Transport>> {
    Err(Error::Internal(
        "no transport configured and the default transport is disabled".to_string(),
    ))
}

#[derive(Default)]
struct BackgroundEvents {
    /// Background identifier of every background session created
    identifiers: HashMap<SessionId, String>,
    completions: HashMap<String, BackgroundCompletion>,
}

pub(crate) struct ManagerInner {
    transport: Arc<dyn Transport>,
    relocator: Arc<dyn FileRelocator>,
    dispatcher: Dispatcher,
    delegate: Arc<SessionDelegate>,
    next_session: AtomicU64,
    sessions: Mutex<HashMap<Configuration, Arc<dyn TransportSession>>>,
    entries: Mutex<HashMap<TaskKey, SessionEntry>>,
    background: Mutex<BackgroundEvents>,
}

impl ManagerInner {
    fn submit(&self, request: Request, configuration: &Configuration, actions: Vec<Action>) {
        let request_id = request.id();
        let (session, task) = match self.task_for(&request, configuration) {
            Ok(created) => created,
            Err(error) => {
                tracing::debug!("Request {} failed before starting: {}", request_id, error);
                let completion = Completion {
                    progress: request.progress().cloned(),
                    request,
                    actions,
                    outcome: Outcome::Failure(error),
                };
                self.deliver(completion);
                return;
            }
        };

        let key = TaskKey {
            session,
            task: task.identifier(),
        };
        tracing::debug!(
            "Submitting {} {} as task {} on {}",
            request.method(),
            request.url(),
            key.task,
            key.session
        );
        lock(&self.entries).insert(key, SessionEntry::new(request, task.clone(), actions));

        // The transport may report events synchronously from resume, so the
        // table lock must not be held here.
        task.resume();

        if let Some(entry) = lock(&self.entries).get_mut(&key) {
            if entry.state == TaskState::Submitted {
                entry.state = TaskState::Active;
            }
        }
    }

    fn task_for(
        &self,
        request: &Request,
        configuration: &Configuration,
    ) -> Result<(SessionId, Arc<dyn TransportTask>)> {
        let session = self.session_for(configuration)?;
        match session.create_task(request) {
            Err(Error::SessionInvalidated) => {
                tracing::debug!("{} was invalidated, replacing it", session.id());
                self.evict(session.id());
                let session = self.session_for(configuration)?;
                let task = session.create_task(request)?;
                Ok((session.id(), task))
            }
            created => created.map(|task| (session.id(), task)),
        }
    }

    /// Cached session for `configuration`, created on first use
    fn session_for(&self, configuration: &Configuration) -> Result<Arc<dyn TransportSession>> {
        let mut sessions = lock(&self.sessions);
        if let Some(session) = sessions.get(configuration) {
            return Ok(session.clone());
        }

        let id = SessionId::new(self.next_session.fetch_add(1, Ordering::Relaxed));
        let events: Arc<dyn TransportEvents> = self.delegate.clone();
        let session = self.transport.create_session(id, configuration, events)?;
        tracing::debug!("Created {} for {:?}", id, configuration);

        if let Some(identifier) = configuration.background_identifier() {
            lock(&self.background)
                .identifiers
                .insert(id, identifier.to_string());
        }
        sessions.insert(configuration.clone(), session.clone());
        Ok(session)
    }

    fn evict(&self, session: SessionId) {
        let mut sessions = lock(&self.sessions);
        let before = sessions.len();
        sessions.retain(|_, cached| cached.id() != session);
        if sessions.len() != before {
            tracing::debug!("Evicted {}", session);
        }
    }

    pub(crate) fn signal(&self, request: RequestId, signal: Signal) {
        let targets: Vec<Arc<dyn TransportTask>> = {
            let mut entries = lock(&self.entries);
            entries
                .values_mut()
                .filter(|entry| entry.request.id() == request)
                .filter_map(|entry| apply_signal(entry, signal))
                .collect()
        };

        if targets.is_empty() {
            tracing::trace!("{:?} for {} matched no live task", signal, request);
        }
        for task in targets {
            send_signal(task.as_ref(), signal);
        }
    }

    fn cancel_all(&self) {
        let targets: Vec<Arc<dyn TransportTask>> = {
            let mut entries = lock(&self.entries);
            entries
                .values_mut()
                .filter_map(|entry| apply_signal(entry, Signal::Cancel))
                .collect()
        };
        tracing::debug!("Cancelling {} task(s)", targets.len());
        for task in targets {
            task.cancel();
        }
    }

    pub(crate) fn state(&self, request: RequestId) -> Option<TaskState> {
        lock(&self.entries)
            .values()
            .find(|entry| entry.request.id() == request)
            .map(|entry| entry.state)
    }

    pub(crate) fn on_response(&self, key: TaskKey, metadata: ResponseMetadata) -> ResponseDisposition {
        let mut entries = lock(&self.entries);
        let Some(entry) = entries.get_mut(&key) else {
            tracing::trace!("Metadata for unknown task {} on {}", key.task, key.session);
            return ResponseDisposition::Cancel;
        };
        tracing::trace!("Task {} on {} received {:?}", key.task, key.session, metadata.status);

        if entry.is_data_task() {
            if let (Some(progress), Some(length)) =
                (entry.request.progress(), metadata.expected_content_length)
            {
                progress.set_total(length);
            }
        }
        match entry.accumulator.as_mut() {
            Some(accumulator) => accumulator.update(metadata),
            None => entry.accumulator = Some(ResponseAccumulator::with_metadata(metadata)),
        }
        ResponseDisposition::Allow
    }

    pub(crate) fn on_data(&self, key: TaskKey, chunk: &[u8]) {
        let mut entries = lock(&self.entries);
        let Some(entry) = entries.get_mut(&key) else {
            tracing::trace!("Data for unknown task {} on {}", key.task, key.session);
            return;
        };

        match entry.accumulator.as_mut() {
            Some(accumulator) => accumulator.append(chunk),
            None => entry.accumulator = Some(ResponseAccumulator::with_data(chunk)),
        }
        let progress = match entry.is_data_task() {
            true => entry.request.progress().cloned(),
            false => None,
        };
        drop(entries);

        // Observers may call back into the manager.
        if let Some(progress) = progress {
            progress.advance(chunk.len() as u64);
        }
    }

    pub(crate) fn on_progress(&self, key: TaskKey, completed: u64, total: Option<u64>) {
        let progress = match lock(&self.entries).get(&key) {
            Some(entry) => entry.request.progress().cloned(),
            None => {
                tracing::trace!("Progress for unknown task {} on {}", key.task, key.session);
                return;
            }
        };
        if let Some(progress) = progress {
            progress.update(completed, total);
        }
    }

    pub(crate) fn on_download_finished(&self, key: TaskKey, location: &Path) {
        let destination: PathBuf = {
            let entries = lock(&self.entries);
            let Some(entry) = entries.get(&key) else {
                tracing::trace!("Finished download for unknown task {} on {}", key.task, key.session);
                return;
            };
            // A cancelled download resolves as cancelled; its destination stays untouched.
            if entry.state == TaskState::Cancelled {
                tracing::debug!(
                    "Discarding finished download of cancelled task {} on {}",
                    key.task,
                    key.session
                );
                return;
            }
            let Some(destination) = entry.request.destination_location() else {
                return;
            };
            destination.to_path_buf()
        };

        // Relocation touches the filesystem; keep it outside the table lock.
        let relocated = self.relocator.relocate(location, &destination);

        let mut entries = lock(&self.entries);
        let Some(entry) = entries.get_mut(&key) else {
            return;
        };
        match relocated {
            Ok(()) => entry.accumulator_mut().set_resource_location(destination),
            Err(error) => {
                tracing::warn!("Failed to relocate download to {:?}: {}", destination, error);
                entry.relocation_error = Some(error);
            }
        }
    }

    pub(crate) fn on_complete(&self, key: TaskKey, error: Option<Error>) {
        let Some(entry) = lock(&self.entries).remove(&key) else {
            tracing::trace!("Completion for unknown task {} on {}", key.task, key.session);
            return;
        };
        self.deliver(entry.resolve(error));
    }

    pub(crate) fn on_session_invalid(&self, session: SessionId, error: Option<Error>) {
        self.evict(session);
        lock(&self.background).identifiers.remove(&session);

        let orphaned: Vec<SessionEntry> = {
            let mut entries = lock(&self.entries);
            let keys: Vec<TaskKey> = entries
                .keys()
                .filter(|key| key.session == session)
                .copied()
                .collect();
            keys.iter().filter_map(|key| entries.remove(key)).collect()
        };

        match &error {
            Some(error) => tracing::debug!("{} became invalid: {}", session, error),
            None => tracing::debug!("{} became invalid", session),
        }
        if !orphaned.is_empty() {
            tracing::warn!("{} invalidated with {} live task(s)", session, orphaned.len());
        }
        for entry in orphaned {
            self.deliver(entry.fail(Error::SessionInvalidated));
        }
    }

    pub(crate) fn on_background_events_finished(&self, session: SessionId) {
        let completion = {
            let mut background = lock(&self.background);
            background
                .identifiers
                .get(&session)
                .cloned()
                .and_then(|identifier| background.completions.remove(&identifier))
        };
        match completion {
            Some(completion) => {
                tracing::debug!("Background events finished for {}", session);
                self.dispatcher.dispatch(completion);
            }
            None => tracing::trace!("No background completion registered for {}", session),
        }
    }

    /// Run the action matching the outcome, off the event-delivery path
    fn deliver(&self, mut completion: Completion) {
        let kind = match completion.outcome {
            Outcome::Success(_) => ActionKind::Success,
            Outcome::Failure(_) => ActionKind::Failure,
        };
        let action = completion.take_action(kind);
        let Completion {
            request,
            progress,
            outcome,
            ..
        } = completion;

        match &outcome {
            Outcome::Success(_) => {
                tracing::debug!("Request {} succeeded", request.id());
                if let Some(progress) = &progress {
                    progress.finish();
                }
            }
            Outcome::Failure(error) => {
                tracing::debug!("Request {} failed: {}", request.id(), error);
                if let Some(progress) = &progress {
                    if error.is_cancelled() {
                        progress.cancel();
                    }
                }
            }
        }

        match (action, outcome) {
            (Some(Action::OnSuccess(handler)), Outcome::Success(accumulator)) => {
                self.dispatcher.dispatch(move || handler(accumulator));
            }
            (Some(Action::OnFailure(handler)), Outcome::Failure(error)) => {
                self.dispatcher.dispatch(move || handler(error));
            }
            _ => {}
        }
    }
}

/// Update the entry for `signal` and return the task to notify, if any
fn apply_signal(entry: &mut SessionEntry, signal: Signal) -> Option<Arc<dyn TransportTask>> {
    if signal == Signal::Resume && !entry.task.supports_resume() {
        return None;
    }
    entry.state = entry.state.apply(signal)?;
    if let Some(progress) = entry.request.progress() {
        match signal {
            Signal::Suspend => progress.pause(),
            Signal::Resume => progress.resume(),
            Signal::Cancel => progress.cancel(),
        }
    }
    Some(entry.task.clone())
}

fn send_signal(task: &dyn TransportTask, signal: Signal) {
    match signal {
        Signal::Suspend => task.suspend(),
        Signal::Resume => task.resume(),
        Signal::Cancel => task.cancel(),
    }
}

impl Drop for ManagerInner {
    fn drop(&mut self) {
        let sessions = match self.sessions.get_mut() {
            Ok(sessions) => sessions,
            Err(poisoned) => poisoned.into_inner(),
        };
        for (_, session) in sessions.drain() {
            session.finish_tasks_and_invalidate();
        }
    }
}

