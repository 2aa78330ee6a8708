//! BranchStack: the ordered active branches plus the head pointer.

use crate::branch::BranchId;
use crate::error::StackError;
use serde::{Deserialize, Serialize};

/// Depth-first ordered branches of one participant. Index 0 is the root.
///
/// The head always points at a branch present in the stack. Insertions go
/// directly after the origin's branch, so positions after the insertion point
/// shift up by one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchStack {
    branches: Vec<BranchId>,
    head: usize,
}

impl BranchStack {
    pub fn new(root: BranchId) -> Self {
        Self {
            branches: vec![root],
            head: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.branches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }

    pub fn head(&self) -> usize {
        self.head
    }

    /// Branch under the head. Only a stack restored from corrupted data can
    /// have its head out of range.
    pub fn head_branch(&self) -> Result<BranchId, StackError> {
        self.branches
            .get(self.head)
            .copied()
            .ok_or(StackError::HeadOutOfRange {
                index: self.head,
                len: self.branches.len(),
            })
    }

    pub fn get(&self, index: usize) -> Option<BranchId> {
        self.branches.get(index).copied()
    }

    pub fn contains(&self, id: BranchId) -> bool {
        self.branches.contains(&id)
    }

    pub fn position(&self, id: BranchId) -> Option<usize> {
        self.branches.iter().position(|b| *b == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = BranchId> + '_ {
        self.branches.iter().copied()
    }

    /// Insert a branch at `at`. The head keeps pointing at the same branch.
    pub fn insert(&mut self, at: usize, id: BranchId) -> Result<(), StackError> {
        if at == 0 || at > self.branches.len() {
            return Err(StackError::InsertOutOfRange {
                at,
                len: self.branches.len(),
            });
        }
        self.branches.insert(at, id);
        if at <= self.head {
            self.head += 1;
        }
        Ok(())
    }

    /// Remove the branch at `index`. Neither the root nor the head branch
    /// may be removed.
    pub fn remove(&mut self, index: usize) -> Result<BranchId, StackError> {
        if index == 0 {
            return Err(StackError::CannotRemoveRoot);
        }
        if index >= self.branches.len() {
            return Err(StackError::HeadOutOfRange {
                index,
                len: self.branches.len(),
            });
        }
        if index == self.head {
            return Err(StackError::CannotRemoveHead);
        }
        let removed = self.branches.remove(index);
        if index < self.head {
            self.head -= 1;
        }
        Ok(removed)
    }

    pub fn increment_head(&mut self) -> Result<(), StackError> {
        let next = self.head + 1;
        if next >= self.branches.len() {
            return Err(StackError::HeadOutOfRange {
                index: next,
                len: self.branches.len(),
            });
        }
        self.head = next;
        Ok(())
    }

    pub fn decrement_head(&mut self) -> Result<(), StackError> {
        match self.head.checked_sub(1) {
            Some(prev) => {
                self.head = prev;
                Ok(())
            }
            None => Err(StackError::HeadOutOfRange {
                index: 0,
                len: self.branches.len(),
            }),
        }
    }
}
