use crate::branch::BranchId;
use crate::job::JobError;
use crate::page::PageId;
use thiserror::Error;

/// Structural invariant violations on the branch stack.
///
/// These indicate a corrupted tree and are never recovered from: the request
/// that hit one is aborted and the participant's stored state is left as it
/// was before the request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StackError {
    #[error("head index {index} out of range for stack of {len} branches")]
    HeadOutOfRange { index: usize, len: usize },

    #[error("insert position {at} out of range for stack of {len} branches")]
    InsertOutOfRange { at: usize, len: usize },

    #[error("the root branch cannot be removed")]
    CannotRemoveRoot,

    #[error("the head branch cannot be removed while it is the head")]
    CannotRemoveHead,

    #[error("unknown branch {0}")]
    UnknownBranch(BranchId),

    #[error("unknown page {0}")]
    UnknownPage(PageId),

    #[error("cannot step back before the first page of {0}")]
    BeforeFirstPage(BranchId),

    #[error("target {0} is not reachable from the current position")]
    TargetUnreachable(PageId),

    #[error("a branch needs at least one page to be the root")]
    EmptyRoot,

    #[error("forward navigation ran past the last page of the survey")]
    EndOfSurvey,
}

/// Everything the navigator can fail with.
#[derive(Debug, Error)]
pub enum NavigationError {
    #[error(transparent)]
    Stack(#[from] StackError),

    #[error(transparent)]
    Job(#[from] JobError),
}
