//! Newest-first commit history along first parents.

use std::collections::VecDeque;

use tracing::debug;
use verso_store::{CommitObj, Persist};
use verso_types::ObjId;

use crate::error::DagResult;

/// Lazy iterator over a commit and its first-parent ancestors, newest first.
///
/// Every commit carries a bounded `tail` of its first-parent ancestors, so
/// after fetching one commit the log fetches the rest of that tail in a
/// single batch. [`position`](Self::position) names the commit that will be
/// yielded next; passing it to [`resume_from`](Self::resume_from) restarts
/// the log exactly there, e.g. for paging.
///
/// The iterator stops after the first error.
pub struct CommitLog<'a> {
    persist: &'a dyn Persist,
    buffer: VecDeque<CommitObj>,
    next: ObjId,
    failed: bool,
}

impl<'a> CommitLog<'a> {
    /// The history of `head`, starting with `head` itself. An empty `head`
    /// yields nothing.
    pub fn new(persist: &'a dyn Persist, head: ObjId) -> Self {
        Self {
            persist,
            buffer: VecDeque::new(),
            next: head,
            failed: false,
        }
    }

    /// Continue a log at a position previously reported by
    /// [`position`](Self::position).
    pub fn resume_from(persist: &'a dyn Persist, position: ObjId) -> Self {
        debug!(commit = %position.short_hex(), "resuming commit log");
        Self::new(persist, position)
    }

    /// The id of the commit the next call to `next()` yields, or
    /// [`ObjId::EMPTY`] once the history is exhausted.
    pub fn position(&self) -> ObjId {
        self.buffer.front().map(|c| c.id).unwrap_or(self.next)
    }

    fn fill(&mut self) -> DagResult<()> {
        let head = self.persist.fetch_commit(&self.next)?;
        let rest = match head.tail.get(1..) {
            Some(ids) if !ids.is_empty() => self.persist.fetch_commits(ids)?,
            _ => Vec::new(),
        };
        self.buffer.push_back(head);
        self.buffer.extend(rest);
        self.next = self
            .buffer
            .back()
            .map(CommitObj::parent)
            .unwrap_or(ObjId::EMPTY);
        Ok(())
    }
}

impl Iterator for CommitLog<'_> {
    type Item = DagResult<CommitObj>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        if self.buffer.is_empty() {
            if self.next.is_empty() {
                return None;
            }
            if let Err(e) = self.fill() {
                self.failed = true;
                return Some(Err(e));
            }
        }
        self.buffer.pop_front().map(Ok)
    }
}
