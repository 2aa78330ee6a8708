//! # Navigator
//!
//! Moves a participant's position through the [`SurveyTree`] one page at a
//! time. Forward traversal grows branches lazily and may suspend on a
//! deferred grow job; backward traversal never runs rules, it only steps
//! cursors and unwinds grown branches off the stack.
//!
//! Both directions are loops over the branch stack rather than call-stack
//! recursion. The only state a suspended walk needs to resume is already in
//! the tree (head, cursors, stack membership) plus [`NavigatorState`].

use crate::dispatch::StepContext;
use crate::error::{NavigationError, StackError};
use crate::job::{JobBook, JobError, JobKey, Method, Owner};
use crate::outcome::Progress;
use crate::page::PageId;
use crate::ready;
use crate::task::{GrowInput, JobOutput, Task};
use crate::tree::SurveyTree;
use serde::{Deserialize, Serialize};

/// Persisted between requests while a forward walk is suspended.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigatorState {
    pub in_progress: bool,
    pub target: Option<PageId>,
}

impl NavigatorState {
    pub fn reset(&mut self) {
        self.in_progress = false;
        self.target = None;
    }
}

pub struct Navigator<'a> {
    tree: &'a mut SurveyTree,
    jobs: &'a mut JobBook,
    state: &'a mut NavigatorState,
    ctx: StepContext<'a>,
}

impl<'a> Navigator<'a> {
    pub fn new(
        tree: &'a mut SurveyTree,
        jobs: &'a mut JobBook,
        state: &'a mut NavigatorState,
        ctx: StepContext<'a>,
    ) -> Self {
        Self {
            tree,
            jobs,
            state,
            ctx,
        }
    }

    pub fn in_progress(&self) -> bool {
        self.state.in_progress
    }

    /// Start a forward walk: one page when `target` is `None`, otherwise
    /// until the current page is `target`.
    pub async fn forward(&mut self, target: Option<PageId>) -> Result<Progress<()>, NavigationError> {
        self.state.in_progress = true;
        self.state.target = target;
        self.walk_forward().await
    }

    /// Continue a forward walk that previously returned pending.
    pub async fn resume(&mut self) -> Result<Progress<()>, NavigationError> {
        self.walk_forward().await
    }

    async fn walk_forward(&mut self) -> Result<Progress<()>, NavigationError> {
        let Some(target) = self.state.target else {
            return self.forward_one().await;
        };
        loop {
            if let Some(page) = self.tree.current_page()? {
                if page.id == target {
                    return Ok(Progress::Ready(()));
                }
                let stuck = page.terminal && !self.tree.eligible(Owner::Page(page.id))?;
                if stuck {
                    return Err(StackError::TargetUnreachable(target).into());
                }
            }
            ready!(self.forward_one().await?);
        }
    }

    /// Advance exactly one page. Safe to call again after it returned
    /// pending: a page still eligible to grow retries its growth, and an
    /// exhausted branch picks up the walk where it stopped.
    pub async fn forward_one(&mut self) -> Result<Progress<()>, NavigationError> {
        let Some(page) = self.tree.current_page_id()? else {
            return self.forward_recurse().await;
        };
        let origin = Owner::Page(page);
        if self.tree.eligible(origin)? {
            if ready!(self.grow(origin).await?) {
                return self.forward_recurse().await;
            }
        }
        self.tree.head_branch_mut()?.step_forward();
        self.forward_recurse().await
    }

    async fn forward_recurse(&mut self) -> Result<Progress<()>, NavigationError> {
        loop {
            if self.tree.current_page_id()?.is_some() {
                return Ok(Progress::Ready(()));
            }
            let origin = Owner::Branch(self.tree.stack().head_branch()?);
            if self.tree.eligible(origin)? {
                if ready!(self.grow(origin).await?) {
                    continue;
                }
            }
            if self.tree.stack().head() == 0 {
                return Err(StackError::EndOfSurvey.into());
            }
            self.tree.stack_mut().decrement_head()?;
            self.tree.head_branch_mut()?.step_forward();
        }
    }

    /// Run `origin`'s grow rule and insert the result. `Ready(false)` when the
    /// rule grew nothing.
    async fn grow(&mut self, origin: Owner) -> Result<Progress<bool>, NavigationError> {
        let Some(step) = self.tree.grow_step(origin)?.cloned() else {
            return Ok(Progress::Ready(false));
        };
        let pages = match origin {
            Owner::Page(id) => vec![self.tree.page(id)?.clone()],
            Owner::Branch(id) => {
                let branch = self.tree.branch(id)?;
                branch
                    .pages
                    .iter()
                    .map(|p| self.tree.page(*p).cloned())
                    .collect::<Result<Vec<_>, _>>()?
            }
        };
        let input = GrowInput {
            origin,
            pages,
            answers: self.tree.answers(),
        };
        let task = Task::Grow {
            input,
            rule: step.rule,
        };
        match ready!(self.ctx.run(self.jobs, task, step.deferred).await?) {
            JobOutput::Grown(Some(spec)) => {
                self.tree.insert_grown(origin, spec)?;
                Ok(Progress::Ready(true))
            }
            JobOutput::Grown(None) => {
                tracing::debug!(origin = %origin, "grow rule produced no branch");
                Ok(Progress::Ready(false))
            }
            _ => Err(JobError::UnexpectedOutput {
                key: JobKey::new(origin, Method::Grow),
            }
            .into()),
        }
    }

    /// Retreat one page, or until the current page is `target`.
    pub fn back(&mut self, target: Option<PageId>) -> Result<(), NavigationError> {
        let Some(target) = target else {
            return self.back_one();
        };
        while self.tree.current_page_id()? != Some(target) {
            if self.tree.is_first_page()? {
                return Err(StackError::TargetUnreachable(target).into());
            }
            self.back_one()?;
        }
        Ok(())
    }

    pub fn back_one(&mut self) -> Result<(), NavigationError> {
        if self.tree.head_branch()?.is_at_first() {
            self.tree.remove_head_branch()?;
        } else {
            self.tree.head_branch_mut()?.step_back()?;
        }
        self.back_recurse()
    }

    /// Step back until landing on a page whose grown branch is not on the
    /// stack, descending into grown branches that are.
    fn back_recurse(&mut self) -> Result<(), NavigationError> {
        loop {
            if let Some(page) = self.tree.current_page()? {
                let child_active = page
                    .next_branch
                    .is_some_and(|b| self.tree.stack().contains(b));
                if !child_active {
                    return Ok(());
                }
                self.tree.stack_mut().increment_head()?;
                continue;
            }
            let branch = self.tree.head_branch()?;
            let child_active = branch
                .next_branch
                .is_some_and(|b| self.tree.stack().contains(b));
            if child_active {
                self.tree.stack_mut().increment_head()?;
            } else if branch.pages.is_empty() {
                self.tree.remove_head_branch()?;
            } else {
                self.tree.head_branch_mut()?.step_back()?;
            }
        }
    }
}
