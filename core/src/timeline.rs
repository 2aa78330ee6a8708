use crate::page::PageId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One rendering of a page to a participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Viewing {
    pub page: PageId,
    /// The artifact exactly as it was handed to the transport.
    pub artifact: String,
    /// `true` the first time this page is shown, `false` on re-renders
    /// (validation errors, back navigation, reloads).
    pub first_presentation: bool,
    pub viewed_at: DateTime<Utc>,
}

/// Ordered record of every page a participant was shown.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct History {
    pub viewings: Vec<Viewing>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, viewing: Viewing) {
        self.viewings.push(viewing);
    }

    /// Move every viewing of `other` onto the end of this history.
    pub fn append(&mut self, mut other: History) {
        self.viewings.append(&mut other.viewings);
    }

    pub fn len(&self) -> usize {
        self.viewings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.viewings.is_empty()
    }

    pub fn last(&self) -> Option<&Viewing> {
        self.viewings.last()
    }

    /// Viewings of a single page, oldest first.
    pub fn of_page(&self, page: PageId) -> impl Iterator<Item = &Viewing> + '_ {
        self.viewings.iter().filter(move |v| v.page == page)
    }
}
