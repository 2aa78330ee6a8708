//! SurveyTree: every branch and page a participant has materialised, plus
//! the [`BranchStack`] of branches currently active.
//!
//! Branches and pages are never deleted from the tree. A branch removed from
//! the stack by backward navigation stays here as history.

use crate::branch::{Branch, BranchId, BranchSpec};
use crate::error::StackError;
use crate::job::Owner;
use crate::page::{GrowStep, Page, PageId};
use crate::stack::BranchStack;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurveyTree {
    branches: HashMap<BranchId, Branch>,
    pages: HashMap<PageId, Page>,
    stack: BranchStack,
}

impl SurveyTree {
    /// Build a tree whose stack holds the materialised root branch.
    pub fn new(root: BranchSpec) -> Result<Self, StackError> {
        if root.pages.is_empty() {
            return Err(StackError::EmptyRoot);
        }
        let root_id = BranchId::new();
        let mut tree = Self {
            branches: HashMap::new(),
            pages: HashMap::new(),
            stack: BranchStack::new(root_id),
        };
        tree.materialize_as(root_id, root, None);
        Ok(tree)
    }

    fn materialize_as(&mut self, id: BranchId, spec: BranchSpec, origin: Option<Owner>) {
        let mut page_ids = Vec::with_capacity(spec.pages.len());
        for mut page in spec.pages {
            page.branch = Some(id);
            page.next_branch = None;
            page_ids.push(page.id);
            self.pages.insert(page.id, page);
        }
        let mut branch = Branch::new(id, page_ids, spec.grow);
        branch.origin = origin;
        self.branches.insert(id, branch);
    }

    /// Register a branch (and its pages) with the tree without putting it on
    /// the stack.
    pub fn materialize(&mut self, spec: BranchSpec, origin: Option<Owner>) -> BranchId {
        let id = BranchId::new();
        self.materialize_as(id, spec, origin);
        id
    }

    pub fn stack(&self) -> &BranchStack {
        &self.stack
    }

    pub fn stack_mut(&mut self) -> &mut BranchStack {
        &mut self.stack
    }

    pub fn branch(&self, id: BranchId) -> Result<&Branch, StackError> {
        self.branches.get(&id).ok_or(StackError::UnknownBranch(id))
    }

    pub fn branch_mut(&mut self, id: BranchId) -> Result<&mut Branch, StackError> {
        self.branches.get_mut(&id).ok_or(StackError::UnknownBranch(id))
    }

    pub fn page(&self, id: PageId) -> Result<&Page, StackError> {
        self.pages.get(&id).ok_or(StackError::UnknownPage(id))
    }

    pub fn page_mut(&mut self, id: PageId) -> Result<&mut Page, StackError> {
        self.pages.get_mut(&id).ok_or(StackError::UnknownPage(id))
    }

    pub fn head_branch(&self) -> Result<&Branch, StackError> {
        self.branch(self.stack.head_branch()?)
    }

    pub fn head_branch_mut(&mut self) -> Result<&mut Branch, StackError> {
        let id = self.stack.head_branch()?;
        self.branch_mut(id)
    }

    /// Page under the head branch's cursor, `None` when that cursor has run
    /// past its last page.
    pub fn current_page_id(&self) -> Result<Option<PageId>, StackError> {
        Ok(self.head_branch()?.current())
    }

    pub fn current_page(&self) -> Result<Option<&Page>, StackError> {
        match self.current_page_id()? {
            Some(id) => self.page(id).map(Some),
            None => Ok(None),
        }
    }

    pub fn current_page_mut(&mut self) -> Result<Option<&mut Page>, StackError> {
        match self.current_page_id()? {
            Some(id) => self.page_mut(id).map(Some),
            None => Ok(None),
        }
    }

    fn grow_of(&self, owner: Owner) -> Result<(Option<&GrowStep>, Option<BranchId>), StackError> {
        Ok(match owner {
            Owner::Page(id) => {
                let page = self.page(id)?;
                (page.grow.as_ref(), page.next_branch)
            }
            Owner::Branch(id) => {
                let branch = self.branch(id)?;
                (branch.grow.as_ref(), branch.next_branch)
            }
        })
    }

    pub fn grow_step(&self, owner: Owner) -> Result<Option<&GrowStep>, StackError> {
        Ok(self.grow_of(owner)?.0)
    }

    pub fn next_branch(&self, owner: Owner) -> Result<Option<BranchId>, StackError> {
        Ok(self.grow_of(owner)?.1)
    }

    /// An owner may grow iff it has a grow rule and the branch it last grew
    /// is not on the stack.
    pub fn eligible(&self, owner: Owner) -> Result<bool, StackError> {
        let (grow, next) = self.grow_of(owner)?;
        Ok(grow.is_some() && !next.is_some_and(|b| self.stack.contains(b)))
    }

    /// Materialise a grown branch, insert it directly after the head branch,
    /// move the head onto it and link it from its origin.
    pub fn insert_grown(&mut self, origin: Owner, spec: BranchSpec) -> Result<BranchId, StackError> {
        // validate the origin before touching anything
        self.grow_of(origin)?;
        let at = self.stack.head() + 1;
        let id = self.materialize(spec, Some(origin));
        self.stack.insert(at, id)?;
        self.stack.increment_head()?;
        match origin {
            Owner::Page(page) => self.page_mut(page)?.next_branch = Some(id),
            Owner::Branch(branch) => self.branch_mut(branch)?.next_branch = Some(id),
        }
        tracing::debug!(branch = %id, origin = %origin, at, "inserted grown branch");
        Ok(id)
    }

    /// Move the head off the current branch and drop that branch from the
    /// stack. The branch itself stays in the tree.
    pub fn remove_head_branch(&mut self) -> Result<BranchId, StackError> {
        if self.stack.head() == 0 {
            return Err(StackError::CannotRemoveRoot);
        }
        self.stack.decrement_head()?;
        let removed = self.stack.remove(self.stack.head() + 1)?;
        self.branch_mut(removed)?.rewind();
        tracing::debug!(branch = %removed, "removed branch from stack");
        Ok(removed)
    }

    /// Whether the current page is the first page of the whole survey.
    pub fn is_first_page(&self) -> Result<bool, StackError> {
        Ok(self.stack.head() == 0 && self.head_branch()?.is_at_first())
    }

    /// Pages of the active stack in stack order.
    pub fn active_pages(&self) -> impl Iterator<Item = &Page> + '_ {
        self.stack
            .iter()
            .filter_map(|b| self.branches.get(&b))
            .flat_map(|b| b.pages.iter())
            .filter_map(|p| self.pages.get(p))
    }

    /// Every recorded response on the active stack, keyed by question var.
    /// Later pages win when a var repeats.
    pub fn answers(&self) -> BTreeMap<String, Value> {
        let mut out = BTreeMap::new();
        for page in self.active_pages() {
            for q in &page.questions {
                if let Some(v) = &q.response {
                    out.insert(q.var.clone(), v.clone());
                }
            }
        }
        out
    }

    /// Indented text view of the active stack. The head branch is marked
    /// with `<= head` and the current page with `*`.
    pub fn outline(&self) -> String {
        let mut out = String::new();
        let Some(root) = self.stack.get(0) else {
            return out;
        };
        self.outline_branch(root, 0, &mut out);
        out
    }

    fn outline_branch(&self, id: BranchId, depth: usize, out: &mut String) {
        let Some(branch) = self.branches.get(&id) else {
            return;
        };
        let indent = "  ".repeat(depth);
        let head = if self.stack.head_branch() == Ok(id) { " <= head" } else { "" };
        let _ = writeln!(out, "{indent}{id}{head}");
        for (i, page_id) in branch.pages.iter().enumerate() {
            let marker = if branch.cursor == Some(i) { "*" } else { " " };
            let page = self.pages.get(page_id);
            let var = page
                .and_then(|p| p.questions.first())
                .map(|q| q.var.as_str())
                .unwrap_or("");
            let _ = writeln!(out, "{indent} {marker} {page_id} {var}");
            if let Some(next) = page.and_then(|p| p.next_branch) {
                if self.stack.contains(next) {
                    self.outline_branch(next, depth + 1, out);
                }
            }
        }
        if branch.cursor.is_none() {
            let _ = writeln!(out, "{indent} * (end)");
        }
        if let Some(next) = branch.next_branch {
            if self.stack.contains(next) {
                self.outline_branch(next, depth + 1, out);
            }
        }
    }
}
