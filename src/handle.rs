//! Caller-facing view of a submitted request

use std::future::Future;
use std::pin::Pin;
use std::sync::Weak;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::manager::{ManagerInner, Signal, TaskState};
use crate::progress::Progress;
use crate::request::{Request, RequestId};
use crate::response::Response;
use crate::{Error, Result};

/// Handle to a submitted request.
///
/// Holds no state of its own: every operation is looked up through the
/// manager by request id, and becomes a no-op once the manager is gone.
#[derive(Clone)]
pub struct RequestHandle {
    id: RequestId,
    progress: Option<Progress>,
    manager: Weak<ManagerInner>,
}

impl RequestHandle {
    pub(crate) fn new(request: &Request, manager: Weak<ManagerInner>) -> Self {
        Self {
            id: request.id(),
            progress: request.progress().cloned(),
            manager,
        }
    }

    /// Identifier of the request
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Progress of the request, if tracking was requested
    pub fn progress(&self) -> Option<&Progress> {
        self.progress.as_ref()
    }

    /// Observe progress updates. Returns `false` when the request does not
    /// track progress.
    pub fn observe_progress<F>(&self, callback: F) -> bool
    where
        F: Fn(u64, Option<u64>) + Send + Sync + 'static,
    {
        match &self.progress {
            Some(progress) => {
                progress.observe(callback);
                true
            }
            None => false,
        }
    }

    /// Pause the request
    pub fn suspend(&self) {
        if let Some(manager) = self.manager.upgrade() {
            manager.signal(self.id, Signal::Suspend);
        }
    }

    /// Continue a suspended request
    pub fn resume(&self) {
        if let Some(manager) = self.manager.upgrade() {
            manager.signal(self.id, Signal::Resume);
        }
    }

    /// Cancel the request
    pub fn cancel(&self) {
        if let Some(manager) = self.manager.upgrade() {
            manager.signal(self.id, Signal::Cancel);
        }
    }

    /// Current state, or `None` once the request has finished
    pub fn state(&self) -> Option<TaskState> {
        self.manager.upgrade()?.state(self.id)
    }

    /// Whether the request still has a live task
    pub fn is_in_flight(&self) -> bool {
        self.state().is_some()
    }
}

impl std::fmt::Debug for RequestHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestHandle")
            .field("id", &self.id)
            .field("progress", &self.progress)
            .finish()
    }
}

impl From<&RequestHandle> for RequestId {
    fn from(handle: &RequestHandle) -> Self {
        handle.id
    }
}

/// Response of a request submitted with [`crate::SessionManager::fetch`]
pub struct PendingResponse {
    handle: RequestHandle,
    receiver: oneshot::Receiver<Result<Response>>,
}

impl PendingResponse {
    pub(crate) fn new(handle: RequestHandle, receiver: oneshot::Receiver<Result<Response>>) -> Self {
        Self { handle, receiver }
    }

    /// Handle to the underlying request
    pub fn handle(&self) -> &RequestHandle {
        &self.handle
    }
}

impl Future for PendingResponse {
    type Output = Result<Response>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(Error::Internal(
                "request was dropped without completing".to_string(),
            ))),
            Poll::Pending => Poll::Pending,
        }
    }
}
