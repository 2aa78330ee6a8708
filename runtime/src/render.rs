//! Rendering contract. Markup is the host's business; the router only needs
//! a page body and a loading body.

use quire_core::{JobTicket, Page};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// A page plus the navigation buttons it should show.
#[derive(Debug, Clone, Copy)]
pub struct PageView<'a> {
    pub page: &'a Page,
    pub show_back: bool,
    pub show_forward: bool,
}

impl<'a> PageView<'a> {
    /// No back button on the first page of the survey, no forward button on
    /// a terminal page.
    pub fn new(page: &'a Page, first_page: bool) -> Self {
        Self {
            page,
            show_back: page.back && !first_page,
            show_forward: page.forward && !page.terminal,
        }
    }
}

pub trait Renderer: Send + Sync {
    fn render(&self, view: &PageView<'_>) -> String;

    /// Body returned while a job is pending. The client is expected to
    /// re-issue the same request to `survey_url`.
    fn loading(&self, ticket: &JobTicket, survey_url: &str) -> String;
}

/// What a request produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Artifact {
    Page { body: String },
    Loading { ticket: JobTicket, body: String },
    Redirect { location: String },
}

impl Artifact {
    pub fn is_loading(&self) -> bool {
        matches!(self, Artifact::Loading { .. })
    }

    pub fn body(&self) -> Option<&str> {
        match self {
            Artifact::Page { body } | Artifact::Loading { body, .. } => Some(body),
            Artifact::Redirect { .. } => None,
        }
    }
}

/// Plain-text renderer, useful for terminals and tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainRenderer;

impl Renderer for PlainRenderer {
    fn render(&self, view: &PageView<'_>) -> String {
        let page = view.page;
        let mut out = String::new();
        if let Some(error) = &page.error {
            let _ = writeln!(out, "! {error}");
        }
        for q in &page.questions {
            let _ = write!(out, "[{}] {}", q.var, q.label);
            if let Some(response) = &q.response {
                let _ = write!(out, " = {response}");
            }
            out.push('\n');
            if let Some(error) = &q.error {
                let _ = writeln!(out, "  ! {error}");
            }
        }
        let buttons: Vec<&str> = [
            view.show_back.then_some("<< back"),
            view.show_forward.then_some("forward >>"),
        ]
        .into_iter()
        .flatten()
        .collect();
        if !buttons.is_empty() {
            let _ = writeln!(out, "{}", buttons.join("  "));
        }
        out
    }

    fn loading(&self, ticket: &JobTicket, survey_url: &str) -> String {
        format!("loading ({}), retry {survey_url}", ticket.key)
    }
}
