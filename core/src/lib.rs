//! # quire-core
//!
//! The navigation core of quire: a participant walks a tree of pages whose
//! later branches are grown on demand from earlier answers.
//!
//! * [`SurveyTree`] and [`BranchStack`] hold the materialised branches and
//!   the head pointer.
//! * [`Navigator`] moves forward (growing) and backward (unwinding).
//! * [`StepContext`] runs compile/validate/submit/grow work inline or through
//!   a [`JobRunner`] using a start/poll/reset protocol.
//!
//! Nothing here knows about HTTP or worker threads; see `quire-runtime` and
//! `quire-job`.

pub mod branch;
pub mod bus;
pub mod dispatch;
pub mod error;
pub mod job;
pub mod navigator;
pub mod outcome;
pub mod page;
pub mod participant;
pub mod rules;
pub mod stack;
pub mod task;
pub mod timeline;
pub mod tree;

pub use branch::{Branch, BranchId, BranchSpec};
pub use bus::Bus;
pub use dispatch::StepContext;
pub use error::{NavigationError, StackError};
pub use job::{
    JobBook, JobError, JobId, JobKey, JobPoll, JobRunner, JobTicket, Method, Owner, WorkerConfig,
};
pub use navigator::{Navigator, NavigatorState};
pub use outcome::Progress;
pub use page::{Direction, GrowStep, Page, PageId, Question, RuleSet, Submission};
pub use participant::{Participant, ParticipantId, Route, RouterState};
pub use rules::{CompileRule, FnRule, GrowRule, RuleError, RuleRegistry, SubmitRule, ValidateRule};
pub use stack::BranchStack;
pub use task::{GrowInput, JobOutput, Task};
pub use timeline::{History, Viewing};
pub use tree::SurveyTree;

pub mod prelude {
    pub use crate::branch::BranchSpec;
    pub use crate::bus::Bus;
    pub use crate::job::{JobRunner, Method, Owner};
    pub use crate::outcome::Progress;
    pub use crate::page::{Direction, Page, PageId, Submission};
    pub use crate::participant::Participant;
    pub use crate::rules::{CompileRule, GrowRule, RuleRegistry, SubmitRule, ValidateRule};
    pub use crate::task::GrowInput;
}
