//! Step dispatch: run a task inline, or through the job runner with the
//! start / poll / reset protocol.

use crate::bus::Bus;
use crate::error::NavigationError;
use crate::job::{JobBook, JobError, JobPoll, JobRunner, JobTicket, Method};
use crate::outcome::Progress;
use crate::page::PageId;
use crate::rules::RuleRegistry;
use crate::task::{JobOutput, Task};
use crate::tree::SurveyTree;

/// Everything a step needs besides the participant's own state.
#[derive(Clone, Copy)]
pub struct StepContext<'a> {
    pub runner: &'a dyn JobRunner,
    pub rules: &'a RuleRegistry,
    pub bus: &'a Bus,
}

impl<'a> StepContext<'a> {
    pub fn new(runner: &'a dyn JobRunner, rules: &'a RuleRegistry, bus: &'a Bus) -> Self {
        Self { runner, rules, bus }
    }

    /// Run `task`. Inline tasks complete during the call. Deferred tasks
    /// consult the participant's ticket for the task's key:
    ///
    /// - no ticket: start a job, keep its ticket, report pending
    /// - pending: report pending with the same ticket
    /// - done: drop the ticket, reset the job, hand back the output
    /// - failed: drop the ticket, reset the job, return the failure
    /// - unknown to the runner: start again
    pub async fn run(
        &self,
        jobs: &mut JobBook,
        task: Task,
        deferred: bool,
    ) -> Result<Progress<JobOutput>, JobError> {
        let key = task.key();
        if !deferred {
            let output = task.execute(self.rules, self.bus).await?;
            return Ok(Progress::Ready(output));
        }

        if let Some(ticket) = jobs.get(&key).cloned() {
            match self.runner.poll(ticket.id) {
                JobPoll::Pending => return Ok(Progress::Pending(ticket)),
                JobPoll::Done(output) => {
                    jobs.remove(&key);
                    self.runner.reset(ticket.id);
                    if output.method() != key.method {
                        return Err(JobError::UnexpectedOutput { key });
                    }
                    tracing::debug!(job = %ticket.id, %key, "job completed");
                    return Ok(Progress::Ready(output));
                }
                JobPoll::Failed(message) => {
                    jobs.remove(&key);
                    self.runner.reset(ticket.id);
                    tracing::error!(job = %ticket.id, %key, %message, "job failed");
                    return Err(JobError::Failed { key, message });
                }
                JobPoll::Unknown => {
                    tracing::warn!(job = %ticket.id, %key, "runner lost job, starting again");
                    jobs.remove(&key);
                }
            }
        }

        let id = self.runner.start(task)?;
        let ticket = JobTicket::new(id, key);
        jobs.insert(ticket.clone());
        tracing::info!(job = %id, %key, "job started");
        Ok(Progress::Pending(ticket))
    }

    /// Run the compile, validate or submit step of a page and write the
    /// result back into the tree. Pages without rules for the step finish
    /// immediately.
    pub async fn run_page_step(
        &self,
        tree: &mut SurveyTree,
        jobs: &mut JobBook,
        page_id: PageId,
        method: Method,
    ) -> Result<Progress<()>, NavigationError> {
        let page = tree.page(page_id)?;
        let rules = match method {
            Method::Compile => &page.compile,
            Method::Validate => &page.validate,
            Method::Submit => &page.submit,
            Method::Grow => return Ok(Progress::Ready(())),
        };
        if rules.is_empty() {
            // validating with no rules still clears the last verdict
            if method == Method::Validate {
                tree.page_mut(page_id)?.error = None;
            }
            return Ok(Progress::Ready(()));
        }
        let deferred = rules.deferred;
        let snapshot = page.clone();
        let task = match method {
            Method::Compile => Task::Compile { page: snapshot },
            Method::Validate => Task::Validate { page: snapshot },
            _ => Task::Submit { page: snapshot },
        };
        let key = task.key();

        let output = crate::ready!(self.run(jobs, task, deferred).await?);
        let worked = match output {
            JobOutput::Compiled(p) | JobOutput::Validated(p) | JobOutput::Submitted(p) => p,
            JobOutput::Grown(_) => return Err(JobError::UnexpectedOutput { key }.into()),
        };
        tree.page_mut(page_id)?.absorb(worked);
        Ok(Progress::Ready(()))
    }
}

impl std::fmt::Debug for StepContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepContext")
            .field("rules", self.rules)
            .field("bus", self.bus)
            .finish()
    }
}
