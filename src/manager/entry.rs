//! Correlation entries linking live transport tasks to their requests

use std::sync::Arc;

use crate::Error;
use crate::action::{Action, ActionKind};
use crate::progress::Progress;
use crate::request::{Request, RequestKind};
use crate::response::ResponseAccumulator;
use crate::transport::{SessionId, TaskIdentifier, TransportTask};

/// Correlation key: task identifiers are only unique within a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct TaskKey {
    pub session: SessionId,
    pub task: TaskIdentifier,
}

/// Lifecycle state of an in-flight request.
///
/// Terminal outcomes are not represented: once a task succeeds, fails or is
/// torn down after cancellation its entry is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Registered, not yet started
    Submitted,
    /// Running
    Active,
    /// Paused by [`crate::SessionManager::suspend`]
    Suspended,
    /// Cancel was requested; the failure action is pending
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Signal {
    Suspend,
    Resume,
    Cancel,
}

impl TaskState {
    /// Next state for `signal`, or `None` when the signal does not apply
    pub(crate) fn apply(self, signal: Signal) -> Option<TaskState> {
        match (self, signal) {
            (TaskState::Active, Signal::Suspend) => Some(TaskState::Suspended),
            (TaskState::Suspended, Signal::Resume) => Some(TaskState::Active),
            (TaskState::Cancelled, Signal::Cancel) => None,
            (_, Signal::Cancel) => Some(TaskState::Cancelled),
            _ => None,
        }
    }
}

pub(crate) enum Outcome {
    Success(ResponseAccumulator),
    Failure(Error),
}

pub(crate) struct SessionEntry {
    pub request: Request,
    pub task: Arc<dyn TransportTask>,
    pub state: TaskState,
    pub accumulator: Option<ResponseAccumulator>,
    pub relocation_error: Option<Error>,
    actions: Vec<Action>,
}

impl SessionEntry {
    pub fn new(request: Request, task: Arc<dyn TransportTask>, actions: Vec<Action>) -> Self {
        Self {
            request,
            task,
            state: TaskState::Submitted,
            accumulator: None,
            relocation_error: None,
            actions,
        }
    }

    pub fn is_data_task(&self) -> bool {
        matches!(self.request.kind(), RequestKind::Data { .. })
    }

    pub fn accumulator_mut(&mut self) -> &mut ResponseAccumulator {
        self.accumulator.get_or_insert_with(ResponseAccumulator::new)
    }

    /// Settle the terminal outcome.
    ///
    /// Precedence: transport error, then cancellation, then relocation
    /// failure, then missing metadata.
    pub fn resolve(self, error: Option<Error>) -> Completion {
        let SessionEntry {
            request,
            state,
            accumulator,
            relocation_error,
            actions,
            ..
        } = self;

        let outcome = match (error, relocation_error, accumulator) {
            (Some(error), _, _) => Outcome::Failure(error),
            (None, _, _) if state == TaskState::Cancelled => Outcome::Failure(Error::Cancelled),
            (None, Some(relocation_error), _) => Outcome::Failure(relocation_error),
            (None, None, Some(accumulator)) if accumulator.has_metadata() => {
                Outcome::Success(accumulator)
            }
            (None, None, _) => Outcome::Failure(Error::NoResponse),
        };

        Completion {
            progress: request.progress().cloned(),
            request,
            actions,
            outcome,
        }
    }

    /// Settle as failed with `error`, ignoring anything accumulated
    pub fn fail(self, error: Error) -> Completion {
        Completion {
            progress: self.request.progress().cloned(),
            request: self.request,
            actions: self.actions,
            outcome: Outcome::Failure(error),
        }
    }
}

pub(crate) struct Completion {
    pub request: Request,
    pub progress: Option<Progress>,
    pub actions: Vec<Action>,
    pub outcome: Outcome,
}

impl Completion {
    /// Pull out the action matching `kind`; the rest are dropped unrun
    pub fn take_action(&mut self, kind: ActionKind) -> Option<Action> {
        let index = self.actions.iter().position(|a| a.kind() == kind)?;
        Some(self.actions.swap_remove(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_transitions() {
        assert_eq!(TaskState::Active.apply(Signal::Suspend), Some(TaskState::Suspended));
        assert_eq!(TaskState::Suspended.apply(Signal::Resume), Some(TaskState::Active));
        assert_eq!(TaskState::Submitted.apply(Signal::Suspend), None);
        assert_eq!(TaskState::Active.apply(Signal::Resume), None);
        assert_eq!(TaskState::Suspended.apply(Signal::Suspend), None);
        assert_eq!(TaskState::Suspended.apply(Signal::Cancel), Some(TaskState::Cancelled));
        assert_eq!(TaskState::Cancelled.apply(Signal::Cancel), None);
        assert_eq!(TaskState::Cancelled.apply(Signal::Resume), None);
    }
}
