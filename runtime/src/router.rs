//! # Router
//!
//! Drives one request through the per-participant state machine:
//!
//! ```text
//! GET : compile -> render
//! POST: record_response -> validate -> submit -> forward_prep -> forward -> redirect
//! ```
//!
//! Any step may be waiting on a deferred job, in which case the request ends
//! with a loading artifact and the next request resumes the same step. Every
//! completed transition is committed to the session store; a failing step
//! leaves the participant exactly as the last commit saw it.

use crate::config::Settings;
use crate::render::{Artifact, PageView, PlainRenderer, Renderer};
use crate::store::{MemorySessionStore, SessionStore, StoreError};
use chrono::Utc;
use quire_core::{
    BranchSpec, Bus, Direction, JobError, JobRunner, JobTicket, Method, NavigationError, PageId,
    Participant, ParticipantId, Progress, Route, RuleRegistry, StackError, StepContext, Submission,
    Viewing,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::Instrument;

#[derive(Debug, Error)]
pub enum RouterError {
    #[error(transparent)]
    Navigation(#[from] NavigationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("participant {0} has no current page")]
    NoCurrentPage(ParticipantId),

    #[error("unknown participant {0}")]
    UnknownParticipant(ParticipantId),
}

impl From<StackError> for RouterError {
    fn from(e: StackError) -> Self {
        RouterError::Navigation(e.into())
    }
}

impl From<JobError> for RouterError {
    fn from(e: JobError) -> Self {
        RouterError::Navigation(e.into())
    }
}

/// What the transport received.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Get,
    Post(Submission),
}

enum Step {
    Continue,
    Finish(Artifact),
}

pub struct Router {
    settings: Settings,
    rules: Arc<RuleRegistry>,
    bus: Arc<Bus>,
    runner: Arc<dyn JobRunner>,
    renderer: Arc<dyn Renderer>,
    store: Arc<dyn SessionStore>,
}

impl Router {
    pub fn new(
        settings: Settings,
        rules: Arc<RuleRegistry>,
        bus: Arc<Bus>,
        runner: Arc<dyn JobRunner>,
    ) -> Self {
        Self {
            settings,
            rules,
            bus,
            runner,
            renderer: Arc::new(PlainRenderer),
            store: Arc::new(MemorySessionStore::new()),
        }
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = store;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Create and persist a participant for the survey rooted at `root`.
    pub async fn enroll(&self, root: BranchSpec) -> Result<Participant, RouterError> {
        let mut participant = Participant::new(root)?;
        if let Some(limit) = self.settings.time_limit() {
            participant = participant.with_time_limit(limit);
        }
        self.store.save(&participant).await?;
        tracing::info!(participant = %participant.id, "participant enrolled");
        Ok(participant)
    }

    /// Load a participant from the store and handle one request for them.
    pub async fn handle(&self, id: ParticipantId, request: Request) -> Result<Artifact, RouterError> {
        let mut participant = self
            .store
            .load(id)
            .await?
            .ok_or(RouterError::UnknownParticipant(id))?;
        self.handle_request(&mut participant, request).await
    }

    /// Run the state machine until it renders, redirects or waits on a job.
    pub async fn handle_request(
        &self,
        part: &mut Participant,
        request: Request,
    ) -> Result<Artifact, RouterError> {
        let span = tracing::info_span!("Route", quire.participant = %part.id);
        self.route(part, request).instrument(span).await
    }

    async fn route(&self, part: &mut Participant, request: Request) -> Result<Artifact, RouterError> {
        if part.is_time_expired(Utc::now()) {
            return self.render_expired(part).await;
        }

        // Only a POST answering the page last rendered is recorded. Any other
        // POST (a resubmit after the redirect, or one racing a pending step)
        // resumes the stored step like a GET.
        let mut submission = None;
        let mut entry = match request {
            Request::Post(sub) if part.router.route == Route::Render => {
                submission = Some(sub);
                Some(Route::RecordResponse)
            }
            Request::Get if part.router.route == Route::Render => Some(Route::Compile),
            Request::Post(_) => {
                tracing::warn!(route = %part.router.route, "ignoring submission for a page not on screen");
                None
            }
            Request::Get => {
                tracing::debug!(route = %part.router.route, "resuming");
                None
            }
        };

        loop {
            let mut draft = begin_draft(part);
            if let Some(route) = entry.take() {
                draft.router.route = route;
            }
            let route = draft.router.route;
            let step = match self.step(&mut draft, &mut submission).await {
                Ok(step) => step,
                Err(err) => {
                    tracing::error!(%route, error = %err, "transition failed");
                    return Err(err);
                }
            };
            commit_draft(part, draft);
            self.store.save(part).await?;
            tracing::debug!(from = %route, to = %part.router.route, "transition committed");
            if let Step::Finish(artifact) = step {
                return Ok(artifact);
            }
        }
    }

    async fn render_expired(&self, part: &mut Participant) -> Result<Artifact, RouterError> {
        let mut draft = begin_draft(part);
        draft.check_time_expired(Utc::now());
        let first = draft.tree.is_first_page()?;
        let id = draft.id;
        let page = draft
            .tree
            .current_page_mut()?
            .ok_or(RouterError::NoCurrentPage(id))?;
        page.error = Some(self.settings.time_expired_text.clone());
        let body = self.renderer.render(&PageView::new(page, first));
        commit_draft(part, draft);
        self.store.save(part).await?;
        tracing::info!("time expired, page frozen");
        Ok(Artifact::Page { body })
    }

    fn context(&self) -> StepContext<'_> {
        StepContext::new(&*self.runner, &self.rules, &self.bus)
    }

    fn current_page_id(part: &Participant) -> Result<PageId, RouterError> {
        part.tree
            .current_page_id()?
            .ok_or(RouterError::NoCurrentPage(part.id))
    }

    fn loading(&self, ticket: JobTicket) -> Step {
        tracing::info!(job = %ticket.id, key = %ticket.key, "waiting on job");
        let body = self.renderer.loading(&ticket, &self.settings.survey_url);
        Step::Finish(Artifact::Loading { ticket, body })
    }

    async fn page_step(
        &self,
        part: &mut Participant,
        method: Method,
        next: Route,
    ) -> Result<Step, RouterError> {
        let id = Self::current_page_id(part)?;
        let progress = self
            .context()
            .run_page_step(&mut part.tree, &mut part.jobs, id, method)
            .await?;
        Ok(match progress {
            Progress::Ready(()) => {
                part.router.route = next;
                Step::Continue
            }
            Progress::Pending(ticket) => self.loading(ticket),
        })
    }

    /// Navigate back unless the current page is the first of the survey.
    fn go_back(&self, part: &mut Participant, target: Option<PageId>) -> Result<(), RouterError> {
        if target.is_none() && part.tree.is_first_page()? {
            return Ok(());
        }
        part.navigator(self.context()).back(target)?;
        Ok(())
    }

    async fn step(
        &self,
        part: &mut Participant,
        submission: &mut Option<Submission>,
    ) -> Result<Step, RouterError> {
        match part.router.route {
            Route::Compile => self.page_step(part, Method::Compile, Route::Render).await,
            Route::Render => self.render(part),
            Route::RecordResponse => self.record_response(part, submission.take()),
            Route::Validate => {
                if !self.settings.validate {
                    part.router.route = Route::Submit;
                    return Ok(Step::Continue);
                }
                self.page_step(part, Method::Validate, Route::Submit).await
            }
            Route::Submit => {
                let id = Self::current_page_id(part)?;
                if self.settings.validate && !part.tree.page(id)?.is_valid() {
                    part.router.route = Route::Redirect;
                    return Ok(Step::Continue);
                }
                self.page_step(part, Method::Submit, Route::ForwardPrep).await
            }
            Route::ForwardPrep => self.forward_prep(part),
            Route::Forward => self.forward(part).await,
            Route::Redirect => {
                part.router.reset();
                Ok(Step::Finish(Artifact::Redirect {
                    location: self.settings.survey_url.clone(),
                }))
            }
        }
    }

    fn render(&self, part: &mut Participant) -> Result<Step, RouterError> {
        let now = Utc::now();
        let first = part.tree.is_first_page()?;
        let id = Self::current_page_id(part)?;
        let page = part.tree.page_mut(id)?;
        if page.terminal && !part.completed {
            part.completed = true;
            part.end_time = Some(now);
            tracing::info!("survey completed");
        }
        let body = self.renderer.render(&PageView::new(page, first));
        part.history.push(Viewing {
            page: id,
            artifact: body.clone(),
            first_presentation: !page.viewed,
            viewed_at: now,
        });
        page.viewed = true;
        Ok(Step::Finish(Artifact::Page { body }))
    }

    fn record_response(
        &self,
        part: &mut Participant,
        submission: Option<Submission>,
    ) -> Result<Step, RouterError> {
        part.end_time = Some(Utc::now());
        part.completed = false;
        part.updated = true;

        let first = part.tree.is_first_page()?;
        let id = Self::current_page_id(part)?;
        let page = part.tree.page_mut(id)?;
        if let Some(submission) = &submission {
            page.record_response(submission);
        }
        let (direction, back_to) = (page.direction_from, page.back_to);
        let may_back = page.back && !first;
        let may_forward = page.forward && !page.terminal;

        part.router.route = match direction {
            Direction::Back => {
                if may_back {
                    self.go_back(part, back_to)?;
                }
                Route::Redirect
            }
            _ if !may_forward => Route::Redirect,
            _ => Route::Validate,
        };
        Ok(Step::Continue)
    }

    fn forward_prep(&self, part: &mut Participant) -> Result<Step, RouterError> {
        let id = Self::current_page_id(part)?;
        let page = part.tree.page(id)?;
        let (direction, back_to) = (page.direction_from, page.back_to);
        if direction == Direction::Back {
            self.go_back(part, back_to)?;
        }
        if matches!(direction, Direction::Back | Direction::Invalid) {
            part.router.route = Route::Redirect;
        } else {
            part.router.navigator.reset();
            part.router.route = Route::Forward;
        }
        Ok(Step::Continue)
    }

    async fn forward(&self, part: &mut Participant) -> Result<Step, RouterError> {
        let progress = if part.router.navigator.in_progress {
            part.navigator(self.context()).resume().await?
        } else {
            let id = Self::current_page_id(part)?;
            let target = part.tree.page(id)?.forward_to;
            part.navigator(self.context()).forward(target).await?
        };
        Ok(match progress {
            Progress::Ready(()) => {
                part.router.route = Route::Redirect;
                Step::Continue
            }
            Progress::Pending(ticket) => self.loading(ticket),
        })
    }
}

/// Working copy of a participant for one transition. The history only grows,
/// so the draft starts with an empty one instead of a copy.
fn begin_draft(part: &mut Participant) -> Participant {
    let history = std::mem::take(&mut part.history);
    let draft = part.clone();
    part.history = history;
    draft
}

/// Replace the participant with a finished draft, keeping the committed
/// history and appending whatever the draft viewed.
fn commit_draft(part: &mut Participant, mut draft: Participant) {
    let fresh = std::mem::take(&mut draft.history);
    let mut history = std::mem::take(&mut part.history);
    history.append(fresh);
    *part = draft;
    part.history = history;
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("settings", &self.settings)
            .field("rules", &self.rules)
            .finish()
    }
}
