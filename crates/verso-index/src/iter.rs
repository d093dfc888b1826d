//! Lazy iteration over the live keys of a commit.

use std::cmp::Ordering;
use std::collections::VecDeque;
use std::iter::Peekable;
use std::vec::IntoIter;

use verso_store::{CommitOp, IndexElement, IndexSegmentObj, IndexStripe, Persist, SegmentBody};
use verso_types::ContentKey;

use crate::error::{IndexError, IndexResult};

/// Sorted iterator over `(key, state)` of all live keys at a commit.
///
/// Merges the commit's incremental index with its complete index. Stripes
/// of a striped complete index are fetched one at a time, when the
/// iteration reaches them. After the first error the iterator is fused.
pub struct KeyIter<'a> {
    persist: &'a dyn Persist,
    incremental: Peekable<IntoIter<IndexElement>>,
    stripes: VecDeque<IndexStripe>,
    leaf: Peekable<IntoIter<IndexElement>>,
    start: Option<ContentKey>,
    done: bool,
}

impl<'a> KeyIter<'a> {
    pub(crate) fn new(
        persist: &'a dyn Persist,
        incremental: &[IndexElement],
        root: Option<IndexSegmentObj>,
        start: Option<ContentKey>,
    ) -> Self {
        let at_or_after = |key: &ContentKey| start.as_ref().map_or(true, |s| key >= s);
        let incremental: Vec<IndexElement> = incremental
            .iter()
            .filter(|e| at_or_after(&e.key))
            .cloned()
            .collect();
        let (leaf, stripes) = match root.map(|r| r.body) {
            Some(SegmentBody::Leaf(elements)) => (
                elements.into_iter().filter(|e| at_or_after(&e.key)).collect(),
                VecDeque::new(),
            ),
            Some(SegmentBody::Stripes(stripes)) => (
                Vec::new(),
                stripes
                    .into_iter()
                    .filter(|s| at_or_after(&s.last_key))
                    .collect(),
            ),
            None => (Vec::new(), VecDeque::new()),
        };
        Self {
            persist,
            incremental: incremental.into_iter().peekable(),
            stripes,
            leaf: leaf.into_iter().peekable(),
            start,
            done: false,
        }
    }

    fn fill_leaf(&mut self) -> IndexResult<()> {
        while self.leaf.peek().is_none() {
            let Some(stripe) = self.stripes.pop_front() else {
                return Ok(());
            };
            let segment = self.persist.fetch_segment(&stripe.segment)?;
            let SegmentBody::Leaf(elements) = segment.body else {
                return Err(IndexError::NestedStripes(segment.id));
            };
            let start = self.start.as_ref();
            let elements: Vec<IndexElement> = elements
                .into_iter()
                .filter(|e| start.map_or(true, |s| &e.key >= s))
                .collect();
            self.leaf = elements.into_iter().peekable();
        }
        Ok(())
    }
}

impl Iterator for KeyIter<'_> {
    type Item = IndexResult<(ContentKey, CommitOp)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            if let Err(e) = self.fill_leaf() {
                self.done = true;
                return Some(Err(e));
            }
            let ordering = match (self.incremental.peek(), self.leaf.peek()) {
                (None, None) => {
                    self.done = true;
                    return None;
                }
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (Some(i), Some(l)) => i.key.cmp(&l.key),
            };
            // The incremental state of a key shadows the complete index.
            if ordering == Ordering::Equal {
                self.leaf.next();
            }
            let element = if ordering == Ordering::Greater {
                self.leaf.next()
            } else {
                self.incremental.next()
            };
            match element {
                Some(e) if e.op.is_add() => return Some(Ok((e.key, e.op))),
                Some(_) => continue,
                None => return None,
            }
        }
    }
}
