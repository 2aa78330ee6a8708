//! # Page: the participant-facing unit of a survey
//!
//! A `Page` holds an ordered list of questions plus the names of the rules
//! that run around it: compile (before render), validate and submit (after
//! the participant responds) and grow (produce the next branch).
//!
//! Rules are referenced by name so a page stays serialisable; the
//! [`RuleRegistry`](crate::rules::RuleRegistry) resolves names at run time.

use crate::branch::BranchId;
use crate::job::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Stable identity of a page for the whole life of a participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageId(Uuid);

impl PageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "page:{}", self.0)
    }
}

/// Navigation intent recorded on a page when its response is submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    None,
    Back,
    Forward,
    Invalid,
}

/// A single form element. Rendering is left to the transport layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    /// Variable name; responses are keyed by it.
    pub var: String,
    pub label: String,
    pub response: Option<Value>,
    pub error: Option<String>,
}

impl Question {
    pub fn new(var: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            var: var.into(),
            label: label.into(),
            response: None,
            error: None,
        }
    }
}

/// Ordered rule names for one step, and whether that step runs on a worker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    pub rules: Vec<String>,
    pub deferred: bool,
}

impl RuleSet {
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// The rule that grows the next branch from a page or branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrowStep {
    pub rule: String,
    pub deferred: bool,
}

impl GrowStep {
    pub fn new(rule: impl Into<String>) -> Self {
        Self {
            rule: rule.into(),
            deferred: false,
        }
    }
}

/// What the participant sent back for the page they were shown.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub direction: Direction,
    pub responses: BTreeMap<String, Value>,
}

impl Submission {
    pub fn forward() -> Self {
        Self {
            direction: Direction::Forward,
            responses: BTreeMap::new(),
        }
    }

    pub fn back() -> Self {
        Self {
            direction: Direction::Back,
            responses: BTreeMap::new(),
        }
    }

    pub fn answer(mut self, var: impl Into<String>, value: impl Into<Value>) -> Self {
        self.responses.insert(var.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub id: PageId,
    /// Owning branch; set when the page is materialised into a tree.
    pub branch: Option<BranchId>,
    pub questions: Vec<Question>,
    pub error: Option<String>,
    pub terminal: bool,
    pub back: bool,
    pub forward: bool,
    pub direction_from: Direction,
    pub forward_to: Option<PageId>,
    pub back_to: Option<PageId>,
    pub compile: RuleSet,
    pub validate: RuleSet,
    pub submit: RuleSet,
    pub grow: Option<GrowStep>,
    /// Branch most recently grown from this page, if any.
    pub next_branch: Option<BranchId>,
    pub viewed: bool,
    /// Drop the compile rules after the first successful compile.
    pub cache_compile: bool,
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}

impl Page {
    pub fn new() -> Self {
        Self {
            id: PageId::new(),
            branch: None,
            questions: Vec::new(),
            error: None,
            terminal: false,
            back: false,
            forward: true,
            direction_from: Direction::None,
            forward_to: None,
            back_to: None,
            compile: RuleSet::default(),
            validate: RuleSet::default(),
            submit: RuleSet::default(),
            grow: None,
            next_branch: None,
            viewed: false,
            cache_compile: false,
        }
    }

    pub fn question(mut self, var: impl Into<String>, label: impl Into<String>) -> Self {
        self.questions.push(Question::new(var, label));
        self
    }

    pub fn terminal(mut self) -> Self {
        self.terminal = true;
        self
    }

    pub fn with_back(mut self) -> Self {
        self.back = true;
        self
    }

    pub fn without_forward(mut self) -> Self {
        self.forward = false;
        self
    }

    pub fn compile_rule(mut self, name: impl Into<String>) -> Self {
        self.compile.rules.push(name.into());
        self
    }

    pub fn validate_rule(mut self, name: impl Into<String>) -> Self {
        self.validate.rules.push(name.into());
        self
    }

    pub fn submit_rule(mut self, name: impl Into<String>) -> Self {
        self.submit.rules.push(name.into());
        self
    }

    pub fn grow_rule(mut self, name: impl Into<String>) -> Self {
        self.grow = Some(GrowStep::new(name));
        self
    }

    pub fn cached_compile(mut self) -> Self {
        self.cache_compile = true;
        self
    }

    /// Run the given step through the job runner instead of inline.
    pub fn defer(mut self, method: Method) -> Self {
        match method {
            Method::Compile => self.compile.deferred = true,
            Method::Validate => self.validate.deferred = true,
            Method::Submit => self.submit.deferred = true,
            Method::Grow => {
                if let Some(grow) = self.grow.as_mut() {
                    grow.deferred = true;
                }
            }
        }
        self
    }

    pub fn is_deferred(&self, method: Method) -> bool {
        match method {
            Method::Compile => self.compile.deferred,
            Method::Validate => self.validate.deferred,
            Method::Submit => self.submit.deferred,
            Method::Grow => self.grow.as_ref().is_some_and(|g| g.deferred),
        }
    }

    /// Valid iff neither the page nor any of its questions carries an error.
    pub fn is_valid(&self) -> bool {
        self.error.is_none() && self.questions.iter().all(|q| q.error.is_none())
    }

    pub fn clear_error(&mut self) {
        self.error = None;
        for q in &mut self.questions {
            q.error = None;
        }
    }

    pub fn clear_response(&mut self) {
        for q in &mut self.questions {
            q.response = None;
        }
    }

    pub fn response(&self, var: &str) -> Option<&Value> {
        self.questions
            .iter()
            .find(|q| q.var == var)
            .and_then(|q| q.response.as_ref())
    }

    pub fn question_mut(&mut self, var: &str) -> Option<&mut Question> {
        self.questions.iter_mut().find(|q| q.var == var)
    }

    /// Store the direction and the responses of a submission.
    ///
    /// Questions missing from the submission get their response cleared,
    /// matching an unanswered form field.
    pub fn record_response(&mut self, submission: &Submission) {
        self.direction_from = submission.direction;
        for q in &mut self.questions {
            q.response = submission.responses.get(&q.var).cloned();
        }
    }

    /// Take over what a rule run on a detached copy of this page produced.
    /// Tree links stay with `self`.
    pub(crate) fn absorb(&mut self, worked: Page) {
        let Page {
            questions,
            error,
            terminal,
            back,
            forward,
            direction_from,
            forward_to,
            back_to,
            compile,
            validate,
            submit,
            grow,
            cache_compile,
            ..
        } = worked;
        self.questions = questions;
        self.error = error;
        self.terminal = terminal;
        self.back = back;
        self.forward = forward;
        self.direction_from = direction_from;
        self.forward_to = forward_to;
        self.back_to = back_to;
        self.compile = compile;
        self.validate = validate;
        self.submit = submit;
        self.grow = grow;
        self.cache_compile = cache_compile;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_response_sets_direction_and_answers() {
        let mut page = Page::new().question("age", "Age?").question("name", "Name?");
        let submission = Submission::forward().answer("age", 31);

        page.record_response(&submission);

        assert_eq!(page.direction_from, Direction::Forward);
        assert_eq!(page.response("age"), Some(&json!(31)));
        assert_eq!(page.response("name"), None);
    }

    #[test]
    fn test_validity_tracks_page_and_question_errors() {
        let mut page = Page::new().question("q", "Q");
        assert!(page.is_valid());

        page.question_mut("q").unwrap().error = Some("required".into());
        assert!(!page.is_valid());

        page.clear_error();
        assert!(page.is_valid());

        page.error = Some("bad".into());
        assert!(!page.is_valid());
    }

    #[test]
    fn test_defer_marks_only_the_named_step() {
        let page = Page::new()
            .validate_rule("v")
            .grow_rule("g")
            .defer(Method::Validate)
            .defer(Method::Grow);

        assert!(page.is_deferred(Method::Validate));
        assert!(page.is_deferred(Method::Grow));
        assert!(!page.is_deferred(Method::Compile));
        assert!(!page.is_deferred(Method::Submit));
    }

    #[test]
    fn test_absorb_keeps_tree_links() {
        let mut page = Page::new().question("q", "Q");
        page.branch = Some(BranchId::new());
        page.next_branch = Some(BranchId::new());
        page.viewed = true;

        let mut worked = page.clone();
        worked.branch = None;
        worked.next_branch = None;
        worked.viewed = false;
        worked.error = Some("nope".into());

        let links = (page.branch, page.next_branch);
        page.absorb(worked);

        assert_eq!((page.branch, page.next_branch), links);
        assert!(page.viewed);
        assert_eq!(page.error.as_deref(), Some("nope"));
    }
}
