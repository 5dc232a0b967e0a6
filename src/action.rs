//! One-shot success/failure actions bound to a request at submission time

use std::fmt;

use crate::response::{Response, ResponseAccumulator};
use crate::{Error, Result};

/// Handler run with the finished accumulator
pub type SuccessHandler = Box<dyn FnOnce(ResponseAccumulator) + Send + 'static>;

/// Handler run with the terminal error
pub type FailureHandler = Box<dyn FnOnce(Error) + Send + 'static>;

/// What to do when a task reaches a terminal state
pub enum Action {
    /// Run when the task succeeds
    OnSuccess(SuccessHandler),
    /// Run when the task fails or is cancelled
    OnFailure(FailureHandler),
}

/// Variant tag of an [`Action`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    /// [`Action::OnSuccess`]
    Success,
    /// [`Action::OnFailure`]
    Failure,
}

impl Action {
    /// Wrap a success closure
    pub fn on_success<F>(handler: F) -> Self
    where
        F: FnOnce(ResponseAccumulator) + Send + 'static,
    {
        Action::OnSuccess(Box::new(handler))
    }

    /// Wrap a failure closure
    pub fn on_failure<F>(handler: F) -> Self
    where
        F: FnOnce(Error) + Send + 'static,
    {
        Action::OnFailure(Box::new(handler))
    }

    /// Variant tag
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::OnSuccess(_) => ActionKind::Success,
            Action::OnFailure(_) => ActionKind::Failure,
        }
    }

    /// Compares variants only; the wrapped closures are never compared
    pub fn is_same_kind(&self, other: &Action) -> bool {
        self.kind() == other.kind()
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::OnSuccess(_) => f.write_str("Action::OnSuccess(..)"),
            Action::OnFailure(_) => f.write_str("Action::OnFailure(..)"),
        }
    }
}

/// Split one completion callback into a success and a failure action.
///
/// The success action converts the accumulator into a [`Response`] and
/// reports [`Error::NoResponse`] when that is impossible. Without a callback
/// no actions are produced.
pub fn completion_actions<F>(completion: Option<F>) -> Vec<Action>
where
    F: FnOnce(Result<Response>) + Send + 'static,
{
    let Some(completion) = completion else {
        return Vec::new();
    };

    // Exactly one of the two actions is ever run; the other is dropped with its entry.
    let shared = std::sync::Arc::new(std::sync::Mutex::new(Some(completion)));
    let on_failure = shared.clone();

    vec![
        Action::on_success(move |accumulator| {
            if let Some(completion) = take(&shared) {
                completion(Response::try_from(accumulator));
            }
        }),
        Action::on_failure(move |error| {
            if let Some(completion) = take(&on_failure) {
                completion(Err(error));
            }
        }),
    ]
}

fn take<F>(slot: &std::sync::Mutex<Option<F>>) -> Option<F> {
    slot.lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .take()
}
