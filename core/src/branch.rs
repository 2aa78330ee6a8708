//! Branch: an ordered run of pages with its own cursor.

use crate::error::StackError;
use crate::job::Owner;
use crate::page::{GrowStep, Page, PageId};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BranchId(Uuid);

impl BranchId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BranchId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BranchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "branch:{}", self.0)
    }
}

/// A materialised branch inside a participant's tree.
///
/// `cursor` is the index of the current page. `None` means the cursor has run
/// past the last page (or the branch was entered from above and has not yet
/// been stepped into).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    pub id: BranchId,
    pub pages: Vec<PageId>,
    pub cursor: Option<usize>,
    /// Page or branch whose growth produced this branch. `None` for the root.
    pub origin: Option<Owner>,
    pub next_branch: Option<BranchId>,
    pub grow: Option<GrowStep>,
}

impl Branch {
    pub(crate) fn new(id: BranchId, pages: Vec<PageId>, grow: Option<GrowStep>) -> Self {
        let cursor = if pages.is_empty() { None } else { Some(0) };
        Self {
            id,
            pages,
            cursor,
            origin: None,
            next_branch: None,
            grow,
        }
    }

    pub fn current(&self) -> Option<PageId> {
        self.cursor.and_then(|i| self.pages.get(i).copied())
    }

    pub fn is_at_first(&self) -> bool {
        self.cursor == Some(0)
    }

    /// Advance the cursor by one page. Running off the end leaves `None`;
    /// an exhausted cursor stays exhausted.
    pub fn step_forward(&mut self) {
        self.cursor = match self.cursor {
            Some(i) if i + 1 < self.pages.len() => Some(i + 1),
            _ => None,
        };
    }

    /// Step the cursor back one page. An exhausted cursor lands on the last
    /// page; the first page cannot be stepped back from.
    pub fn step_back(&mut self) -> Result<(), StackError> {
        if self.pages.is_empty() {
            return Ok(());
        }
        self.cursor = match self.cursor {
            None => Some(self.pages.len() - 1),
            Some(0) => return Err(StackError::BeforeFirstPage(self.id)),
            Some(i) => Some(i - 1),
        };
        Ok(())
    }

    /// Rewind to the state of a freshly entered branch.
    pub(crate) fn rewind(&mut self) {
        self.cursor = if self.pages.is_empty() { None } else { Some(0) };
    }
}

/// A branch description as produced by the survey author or a grow rule.
/// Materialising it assigns ids and registers the pages with a tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BranchSpec {
    pub pages: Vec<Page>,
    pub grow: Option<GrowStep>,
}

impl BranchSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, page: Page) -> Self {
        self.pages.push(page);
        self
    }

    pub fn grow_rule(mut self, name: impl Into<String>) -> Self {
        self.grow = Some(GrowStep::new(name));
        self
    }

    pub fn deferred_grow(mut self) -> Self {
        if let Some(grow) = self.grow.as_mut() {
            grow.deferred = true;
        }
        self
    }
}

impl FromIterator<Page> for BranchSpec {
    fn from_iter<I: IntoIterator<Item = Page>>(iter: I) -> Self {
        Self {
            pages: iter.into_iter().collect(),
            grow: None,
        }
    }
}
