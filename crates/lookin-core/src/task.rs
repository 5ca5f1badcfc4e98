use std::fmt::Display;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ItemId;

/// Lifecycle of a single detail fetch.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum TaskState {
    /// Not yet handed to the fetcher.
    #[default]
    Pending,
    /// Handed to the fetcher, awaiting resolution.
    InFlight,
    /// Resolved with a detail.
    Done,
    /// Dropped before or during dispatch because its run ended.
    Cancelled,
    /// Resolved with a fetch failure.
    Failed,
}

/// Rejected [`TaskState`] transition.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TaskTransitionError {
    /// The transition is not part of the task lifecycle.
    #[error("illegal task transition from {from} to {to}")]
    Illegal {
        /// State the task was in.
        from: &'static str,
        /// State that was requested.
        to: &'static str,
    },
}

impl Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TaskState {
    /// Static name of the state, used in logs and transition errors.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Pending => "Pending",
            TaskState::InFlight => "InFlight",
            TaskState::Done => "Done",
            TaskState::Cancelled => "Cancelled",
            TaskState::Failed => "Failed",
        }
    }

    /// Pending -> InFlight.
    pub fn mark_in_flight(&self) -> Result<TaskState, TaskTransitionError> {
        match self {
            TaskState::Pending => Ok(TaskState::InFlight),
            state => Err(TaskTransitionError::Illegal {
                from: state.as_str(),
                to: "InFlight",
            }),
        }
    }

    /// InFlight -> Done.
    pub fn mark_done(&self) -> Result<TaskState, TaskTransitionError> {
        match self {
            TaskState::InFlight => Ok(TaskState::Done),
            state => Err(TaskTransitionError::Illegal {
                from: state.as_str(),
                to: "Done",
            }),
        }
    }

    /// InFlight -> Failed.
    pub fn mark_failed(&self) -> Result<TaskState, TaskTransitionError> {
        match self {
            TaskState::InFlight => Ok(TaskState::Failed),
            state => Err(TaskTransitionError::Illegal {
                from: state.as_str(),
                to: "Failed",
            }),
        }
    }

    /// Pending or InFlight -> Cancelled.
    pub fn mark_cancelled(&self) -> Result<TaskState, TaskTransitionError> {
        match self {
            TaskState::Pending | TaskState::InFlight => Ok(TaskState::Cancelled),
            state => Err(TaskTransitionError::Illegal {
                from: state.as_str(),
                to: "Cancelled",
            }),
        }
    }

    /// True once no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Done | TaskState::Cancelled | TaskState::Failed
        )
    }
}

/// Request for one item's detail inside a [`Package`](crate::Package).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    /// Item whose detail is requested.
    pub item_id: ItemId,
    /// Where the task is in its lifecycle.
    pub state: TaskState,
}

impl Task {
    /// A pending task for `item_id`.
    pub fn new(item_id: ItemId) -> Self {
        Self {
            item_id,
            state: TaskState::Pending,
        }
    }

    /// Moves the task to InFlight.
    pub fn dispatch(&mut self) -> Result<(), TaskTransitionError> {
        self.state = self.state.mark_in_flight()?;
        Ok(())
    }

    /// Moves the task to Done.
    pub fn complete(&mut self) -> Result<(), TaskTransitionError> {
        self.state = self.state.mark_done()?;
        Ok(())
    }

    /// Moves the task to Failed.
    pub fn fail(&mut self) -> Result<(), TaskTransitionError> {
        self.state = self.state.mark_failed()?;
        Ok(())
    }

    /// Moves the task to Cancelled.
    pub fn cancel(&mut self) -> Result<(), TaskTransitionError> {
        self.state = self.state.mark_cancelled()?;
        Ok(())
    }
}
