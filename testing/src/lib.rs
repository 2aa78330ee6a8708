//! # quire-test
//!
//! Utilities for testing quire surveys without a worker pool:
//!
//! * [`ManualRunner`]: a [`JobRunner`] whose jobs only finish when the test
//!   says so, which makes pending/resume paths deterministic.
//! * [`Scenario`]: a small branching survey used across the test suites.

use parking_lot::Mutex;
use quire_core::{
    Bus, BranchSpec, JobError, JobId, JobKey, JobOutput, JobPoll, JobRunner, Page, PageId,
    RuleRegistry, Task,
};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug)]
enum Slot {
    Pending(Task),
    Done(JobOutput),
    Failed(String),
}

/// A job runner driven by the test.
///
/// `start` only records the task. [`ManualRunner::complete`] executes a
/// recorded task with the shared registry, [`ManualRunner::fail`] marks it
/// failed and [`ManualRunner::forget`] simulates a runner restart.
pub struct ManualRunner {
    rules: Arc<RuleRegistry>,
    bus: Arc<Bus>,
    slots: Mutex<HashMap<JobId, Slot>>,
    started: Mutex<Vec<(JobId, JobKey)>>,
    refuse: Mutex<Option<String>>,
}

impl ManualRunner {
    pub fn new(rules: Arc<RuleRegistry>, bus: Arc<Bus>) -> Self {
        Self {
            rules,
            bus,
            slots: Mutex::new(HashMap::new()),
            started: Mutex::new(Vec::new()),
            refuse: Mutex::new(None),
        }
    }

    /// Every start call so far, oldest first.
    pub fn started(&self) -> Vec<(JobId, JobKey)> {
        self.started.lock().clone()
    }

    pub fn start_count(&self) -> usize {
        self.started.lock().len()
    }

    /// Ids of jobs that are started but not finished.
    pub fn pending(&self) -> Vec<JobId> {
        self.slots
            .lock()
            .iter()
            .filter(|(_, s)| matches!(s, Slot::Pending(_)))
            .map(|(id, _)| *id)
            .collect()
    }

    /// Number of jobs the runner still holds a record for.
    pub fn tracked(&self) -> usize {
        self.slots.lock().len()
    }

    /// Run a pending job to completion. Returns `false` if the id is not
    /// pending.
    pub async fn complete(&self, id: JobId) -> bool {
        let task = {
            let mut slots = self.slots.lock();
            match slots.remove(&id) {
                Some(Slot::Pending(task)) => task,
                Some(other) => {
                    slots.insert(id, other);
                    return false;
                }
                None => return false,
            }
        };
        let slot = match task.execute(&self.rules, &self.bus).await {
            Ok(output) => Slot::Done(output),
            Err(err) => Slot::Failed(err.to_string()),
        };
        self.slots.lock().insert(id, slot);
        true
    }

    /// Complete every pending job. Returns how many ran.
    pub async fn complete_all(&self) -> usize {
        let mut ran = 0;
        for id in self.pending() {
            if self.complete(id).await {
                ran += 1;
            }
        }
        ran
    }

    pub fn fail(&self, id: JobId, message: impl Into<String>) {
        self.slots.lock().insert(id, Slot::Failed(message.into()));
    }

    /// Drop the runner's record of a job.
    pub fn forget(&self, id: JobId) {
        self.slots.lock().remove(&id);
    }

    /// Make subsequent `start` calls fail with `reason`; `None` accepts again.
    pub fn refuse(&self, reason: Option<String>) {
        *self.refuse.lock() = reason;
    }
}

impl JobRunner for ManualRunner {
    fn start(&self, task: Task) -> Result<JobId, JobError> {
        let key = task.key();
        if let Some(reason) = self.refuse.lock().clone() {
            return Err(JobError::Rejected { key, reason });
        }
        let id = JobId::new();
        self.slots.lock().insert(id, Slot::Pending(task));
        self.started.lock().push((id, key));
        Ok(id)
    }

    fn poll(&self, id: JobId) -> JobPoll {
        match self.slots.lock().get(&id) {
            Some(Slot::Pending(_)) => JobPoll::Pending,
            Some(Slot::Done(output)) => JobPoll::Done(output.clone()),
            Some(Slot::Failed(message)) => JobPoll::Failed(message.clone()),
            None => JobPoll::Unknown,
        }
    }

    fn reset(&self, id: JobId) {
        self.slots.lock().remove(&id);
    }
}

/// The branching survey used throughout the tests.
///
/// The root branch has three pages. Page two grows a one-page branch `B`
/// (rule `grow_b`), page three is terminal:
///
/// ```text
/// root: p1, p2 -> [B: b1], p3 (terminal)
/// ```
pub struct Scenario {
    pub root: BranchSpec,
    pub p1: PageId,
    pub p2: PageId,
    pub p3: PageId,
    pub rules: RuleRegistry,
}

/// Question var of the page grown by `grow_b`.
pub const GROWN_VAR: &str = "b1";

impl Scenario {
    pub fn new() -> Self {
        Self::build(false)
    }

    /// Same survey, but page two's growth runs through the job runner.
    pub fn deferred() -> Self {
        Self::build(true)
    }

    fn build(deferred: bool) -> Self {
        let p1 = Page::new().question("p1", "First");
        let mut p2 = Page::new().question("p2", "Second").with_back().grow_rule("grow_b");
        if deferred {
            p2 = p2.defer(quire_core::Method::Grow);
        }
        let p3 = Page::new().question("p3", "Done").with_back().terminal();
        let (id1, id2, id3) = (p1.id, p2.id, p3.id);

        let mut rules = RuleRegistry::new();
        rules.grow_fn("grow_b", |_, _| {
            Ok(Some(
                BranchSpec::new().page(Page::new().question(GROWN_VAR, "Grown").with_back()),
            ))
        });

        Self {
            root: BranchSpec::new().page(p1).page(p2).page(p3),
            p1: id1,
            p2: id2,
            p3: id3,
            rules,
        }
    }
}

impl Default for Scenario {
    fn default() -> Self {
        Self::new()
    }
}

/// Question var of the first question on a page, for readable assertions.
pub fn var_of(page: &Page) -> &str {
    page.questions.first().map(|q| q.var.as_str()).unwrap_or("")
}

/// A linear survey of `n` pages with vars `q0..qn`; the last page is terminal.
pub fn linear(n: usize) -> BranchSpec {
    let mut spec = BranchSpec::new();
    for i in 0..n {
        let mut page = Page::new().question(format!("q{i}"), format!("Question {i}"));
        if i > 0 {
            page = page.with_back();
        }
        if i + 1 == n {
            page = page.terminal();
        }
        spec = spec.page(page);
    }
    spec
}

/// A response map with a single answer.
pub fn answer(var: &str, value: impl Into<serde_json::Value>) -> quire_core::Submission {
    quire_core::Submission::forward().answer(var, value)
}
