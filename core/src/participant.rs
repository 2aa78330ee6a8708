//! Participant: one person's survey session.
//!
//! Owns the survey tree, the live job tickets, the router's resume point and
//! the bookkeeping fields a host needs (timing, completion, free-form meta).
//! The whole value is what a session store persists between requests.

use crate::branch::BranchSpec;
use crate::dispatch::StepContext;
use crate::error::StackError;
use crate::job::JobBook;
use crate::navigator::{Navigator, NavigatorState};
use crate::timeline::History;
use crate::tree::SurveyTree;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(Uuid);

impl ParticipantId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ParticipantId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Router steps. `Render` ends a GET, `Redirect` ends a POST.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    #[default]
    Compile,
    Render,
    RecordResponse,
    Validate,
    Submit,
    ForwardPrep,
    Forward,
    Redirect,
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Route::Compile => "compile",
            Route::Render => "render",
            Route::RecordResponse => "record_response",
            Route::Validate => "validate",
            Route::Submit => "submit",
            Route::ForwardPrep => "forward_prep",
            Route::Forward => "forward",
            Route::Redirect => "redirect",
        })
    }
}

/// Where the router resumes on the next request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterState {
    pub route: Route,
    pub navigator: NavigatorState,
}

impl RouterState {
    pub fn reset(&mut self) {
        self.route = Route::Compile;
        self.navigator.reset();
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub tree: SurveyTree,
    pub jobs: JobBook,
    pub router: RouterState,
    pub started_at: DateTime<Utc>,
    /// Last activity; set to the completion time once the survey is done.
    pub end_time: Option<DateTime<Utc>>,
    pub completed: bool,
    /// Set whenever a response is recorded; hosts clear it after exporting.
    pub updated: bool,
    pub deadline: Option<DateTime<Utc>>,
    pub time_expired: bool,
    pub meta: BTreeMap<String, Value>,
    pub history: History,
}

impl Participant {
    pub fn new(root: BranchSpec) -> Result<Self, StackError> {
        Ok(Self {
            id: ParticipantId::new(),
            tree: SurveyTree::new(root)?,
            jobs: JobBook::new(),
            router: RouterState::default(),
            started_at: Utc::now(),
            end_time: None,
            completed: false,
            updated: false,
            deadline: None,
            time_expired: false,
            meta: BTreeMap::new(),
            history: History::new(),
        })
    }

    /// Expire the session `limit` after it started.
    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.deadline = Some(self.started_at + limit);
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    /// Force expiry regardless of any deadline.
    pub fn expire(&mut self) {
        self.time_expired = true;
    }

    /// Expired by force or by passing the deadline. Latches once observed.
    pub fn check_time_expired(&mut self, now: DateTime<Utc>) -> bool {
        if !self.time_expired && self.deadline.is_some_and(|d| now >= d) {
            self.time_expired = true;
        }
        self.time_expired
    }

    pub fn is_time_expired(&self, now: DateTime<Utc>) -> bool {
        self.time_expired || self.deadline.is_some_and(|d| now >= d)
    }

    /// Borrow the tree, tickets and navigator state as a navigator.
    pub fn navigator<'a>(&'a mut self, ctx: StepContext<'a>) -> Navigator<'a> {
        Navigator::new(
            &mut self.tree,
            &mut self.jobs,
            &mut self.router.navigator,
            ctx,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::Page;

    fn participant() -> Participant {
        Participant::new(BranchSpec::new().page(Page::new())).unwrap()
    }

    #[test]
    fn test_new_starts_at_compile() {
        let p = participant();
        assert_eq!(p.router.route, Route::Compile);
        assert!(!p.router.navigator.in_progress);
        assert!(p.jobs.is_empty());
        assert!(!p.completed);
    }

    #[test]
    fn test_deadline_expiry_latches() {
        let mut p = participant().with_time_limit(Duration::seconds(30));
        let start = p.started_at;

        assert!(!p.check_time_expired(start + Duration::seconds(10)));
        assert!(p.check_time_expired(start + Duration::seconds(30)));
        assert!(p.is_time_expired(start));
    }

    #[test]
    fn test_expire_without_deadline() {
        let mut p = participant();
        assert!(!p.is_time_expired(Utc::now()));
        p.expire();
        assert!(p.is_time_expired(Utc::now()));
    }

    #[test]
    fn test_route_serializes_snake_case() {
        let json = serde_json::to_string(&Route::RecordResponse).unwrap();
        assert_eq!(json, "\"record_response\"");
    }

    #[test]
    fn test_participant_survives_json() {
        let p = participant().with_meta("cohort", "b");
        let text = serde_json::to_string(&p).unwrap();
        let back: Participant = serde_json::from_str(&text).unwrap();
        assert_eq!(back, p);
    }
}
