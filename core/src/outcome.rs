use crate::job::JobTicket;
use serde::{Deserialize, Serialize};

/// The explicit result of a step that may be deferred to a worker.
///
/// `Progress` is "control flow as data": a step either finished and hands
/// back its value, or it is waiting on a job and the caller must return a
/// loading artifact and try again on the next request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Progress<T> {
    /// The step completed during this call.
    Ready(T),
    /// The step is waiting on a deferred job.
    Pending(JobTicket),
}

impl<T> Progress<T> {
    pub fn map<U, F: FnOnce(T) -> U>(self, op: F) -> Progress<U> {
        match self {
            Progress::Ready(t) => Progress::Ready(op(t)),
            Progress::Pending(ticket) => Progress::Pending(ticket),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Progress::Pending(_))
    }

    pub fn ready(self) -> Option<T> {
        match self {
            Progress::Ready(t) => Some(t),
            Progress::Pending(_) => None,
        }
    }
}

/// Return early from the enclosing function with `Ok(Progress::Pending(..))`
/// when the expression is pending; otherwise evaluate to the ready value.
#[macro_export]
macro_rules! ready {
    ($e:expr) => {
        match $e {
            $crate::outcome::Progress::Ready(v) => v,
            $crate::outcome::Progress::Pending(ticket) => {
                return Ok($crate::outcome::Progress::Pending(ticket));
            }
        }
    };
}
