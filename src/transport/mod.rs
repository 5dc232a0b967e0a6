//! Transport abstraction consumed by the session manager
//!
//! A [`Transport`] creates sessions for a [`Configuration`]; a session issues
//! tasks; each task reports its progress through [`TransportEvents`], the
//! delegate registered when the session was created.

#[cfg(feature = "backend-reqwest")]
pub mod reqwest;

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;

use crate::config::Configuration;
use crate::request::Request;
use crate::response::ResponseMetadata;
use crate::{Error, Result};

/// Identity of one transport session instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    /// Wrap a raw identifier
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw identifier
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Task identifier, unique within its session
pub type TaskIdentifier = u64;

/// Whether a data or upload task may continue after its metadata arrived
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseDisposition {
    /// Continue receiving the body
    Allow,
    /// Cancel the task
    Cancel,
}

/// Creates sessions for configurations
pub trait Transport: Send + Sync {
    /// Create a session that reports every task event to `events`
    fn create_session(
        &self,
        id: SessionId,
        configuration: &Configuration,
        events: Arc<dyn TransportEvents>,
    ) -> Result<Arc<dyn TransportSession>>;
}

/// A live transport session
pub trait TransportSession: Send + Sync {
    /// Identity assigned at creation
    fn id(&self) -> SessionId;

    /// Configuration the session was created for
    fn configuration(&self) -> &Configuration;

    /// Create a suspended task for `request`; [`TransportTask::resume`] starts it
    fn create_task(&self, request: &Request) -> Result<Arc<dyn TransportTask>>;

    /// Whether events are still queued for delivery. A background session
    /// with nothing pending never sends
    /// [`TransportEvents::did_finish_events_for_background_session`].
    fn has_pending_events(&self) -> bool;

    /// Let live tasks finish, then report invalidation
    fn finish_tasks_and_invalidate(&self);

    /// Cancel live tasks, then report invalidation
    fn invalidate_and_cancel(&self);
}

/// One asynchronous unit of transport work
pub trait TransportTask: Send + Sync {
    /// Identifier within the owning session
    fn identifier(&self) -> TaskIdentifier;

    /// Start the task, or continue it after [`TransportTask::suspend`]
    fn resume(&self);

    /// Pause the task
    fn suspend(&self);

    /// Cancel the task; completion is reported later with [`Error::Cancelled`]
    fn cancel(&self);

    /// Whether a suspended task can be resumed. Transports without support
    /// make resume a silent no-op.
    fn supports_resume(&self) -> bool {
        true
    }
}

/// Delegate receiving task events from a transport session.
///
/// Events for one task arrive in order; nothing is guaranteed across tasks.
pub trait TransportEvents: Send + Sync {
    /// Response metadata arrived (possibly more than once across redirects)
    fn did_receive_response(
        &self,
        session: SessionId,
        task: TaskIdentifier,
        metadata: ResponseMetadata,
    ) -> ResponseDisposition;

    /// A body chunk arrived for a data or upload task
    fn did_receive_data(&self, session: SessionId, task: TaskIdentifier, data: Bytes);

    /// Upload progress
    fn did_send_body_data(
        &self,
        session: SessionId,
        task: TaskIdentifier,
        total_bytes_sent: u64,
        total_bytes_expected_to_send: Option<u64>,
    );

    /// Download progress
    fn did_write_data(
        &self,
        session: SessionId,
        task: TaskIdentifier,
        total_bytes_written: u64,
        total_bytes_expected_to_write: Option<u64>,
    );

    /// A download finished at a temporary `location` that is removed once
    /// this call returns
    fn did_finish_downloading(&self, session: SessionId, task: TaskIdentifier, location: &Path);

    /// Terminal event for a task
    fn did_complete(&self, session: SessionId, task: TaskIdentifier, error: Option<Error>);

    /// The session became invalid and must not be used again
    fn did_become_invalid(&self, session: SessionId, error: Option<Error>);

    /// All queued events of a background session have been delivered
    fn did_finish_events_for_background_session(&self, session: SessionId);
}
