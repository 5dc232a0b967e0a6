//! Transport delegate forwarding session events to the manager

use std::path::Path;
use std::sync::Weak;

use bytes::Bytes;

use super::ManagerInner;
use super::entry::TaskKey;
use crate::Error;
use crate::response::ResponseMetadata;
use crate::transport::{ResponseDisposition, SessionId, TaskIdentifier, TransportEvents};

/// Shared by every session the manager creates.
///
/// Holds the manager weakly: sessions are owned by the manager, so events
/// arriving after it was dropped are discarded.
pub(crate) struct SessionDelegate {
    manager: Weak<ManagerInner>,
}

impl SessionDelegate {
    pub fn new(manager: Weak<ManagerInner>) -> Self {
        Self { manager }
    }
}

fn key(session: SessionId, task: TaskIdentifier) -> TaskKey {
    TaskKey { session, task }
}

impl TransportEvents for SessionDelegate {
    fn did_receive_response(
        &self,
        session: SessionId,
        task: TaskIdentifier,
        metadata: ResponseMetadata,
    ) -> ResponseDisposition {
        match self.manager.upgrade() {
            Some(manager) => manager.on_response(key(session, task), metadata),
            None => ResponseDisposition::Cancel,
        }
    }

    fn did_receive_data(&self, session: SessionId, task: TaskIdentifier, data: Bytes) {
        if let Some(manager) = self.manager.upgrade() {
            manager.on_data(key(session, task), &data);
        }
    }

    fn did_send_body_data(
        &self,
        session: SessionId,
        task: TaskIdentifier,
        total_bytes_sent: u64,
        total_bytes_expected_to_send: Option<u64>,
    ) {
        if let Some(manager) = self.manager.upgrade() {
            manager.on_progress(
                key(session, task),
                total_bytes_sent,
                total_bytes_expected_to_send,
            );
        }
    }

    fn did_write_data(
        &self,
        session: SessionId,
        task: TaskIdentifier,
        total_bytes_written: u64,
        total_bytes_expected_to_write: Option<u64>,
    ) {
        if let Some(manager) = self.manager.upgrade() {
            manager.on_progress(
                key(session, task),
                total_bytes_written,
                total_bytes_expected_to_write,
            );
        }
    }

    fn did_finish_downloading(&self, session: SessionId, task: TaskIdentifier, location: &Path) {
        if let Some(manager) = self.manager.upgrade() {
            manager.on_download_finished(key(session, task), location);
        }
    }

    fn did_complete(&self, session: SessionId, task: TaskIdentifier, error: Option<Error>) {
        if let Some(manager) = self.manager.upgrade() {
            manager.on_complete(key(session, task), error);
        }
    }

    fn did_become_invalid(&self, session: SessionId, error: Option<Error>) {
        if let Some(manager) = self.manager.upgrade() {
            manager.on_session_invalid(session, error);
        }
    }

    fn did_finish_events_for_background_session(&self, session: SessionId) {
        if let Some(manager) = self.manager.upgrade() {
            manager.on_background_events_finished(session);
        }
    }
}
