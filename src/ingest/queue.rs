//! Debounced work queue of documents waiting to be processed.
//!
//! Each queued document carries a budget of remaining attempts. Pushing a
//! document that is already queued resets its budget instead of adding a
//! second entry. Every drain spends one attempt per document and evicts
//! documents whose budget runs out, so an edited document is retried on a
//! few consecutive ticks and then forgotten.

use serde::Serialize;

use crate::domain::DocumentId;

/// A queued document and its remaining attempts
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueEntry {
    /// The document
    pub document: DocumentId,

    /// Attempts left before eviction
    pub remaining: u32,
}

/// Result of pushing a document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushResult {
    /// Document was not queued before
    Queued,

    /// Document was already queued; its budget was reset
    Reset,

    /// Zero budget; nothing was queued
    Ignored,
}

impl PushResult {
    /// Check if this was a new entry
    pub fn is_new(&self) -> bool {
        matches!(self, Self::Queued)
    }
}

/// Insertion-ordered queue with at most one entry per document
#[derive(Debug, Clone, Default)]
pub struct WorkQueue {
    entries: Vec<QueueEntry>,
}

impl WorkQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, doc: &DocumentId) -> Option<usize> {
        self.entries.iter().position(|e| &e.document == doc)
    }

    /// Queue `doc` with `attempts` tries, or reset its budget if queued.
    ///
    /// A re-push keeps the document's original position.
    pub fn push(&mut self, doc: DocumentId, attempts: u32) -> PushResult {
        if attempts == 0 {
            return PushResult::Ignored;
        }

        match self.position(&doc) {
            Some(pos) => {
                self.entries[pos].remaining = attempts;
                PushResult::Reset
            }
            None => {
                self.entries.push(QueueEntry {
                    document: doc,
                    remaining: attempts,
                });
                PushResult::Queued
            }
        }
    }

    /// Remove `doc` regardless of its budget. Returns whether it was queued.
    pub fn remove(&mut self, doc: &DocumentId) -> bool {
        match self.position(doc) {
            Some(pos) => {
                self.entries.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Iterate over the documents queued right now.
    ///
    /// Each yielded document loses one attempt and is evicted when none are
    /// left. Documents not yet reached when the iterator is dropped are left
    /// untouched.
    pub fn drain(&mut self) -> Drain<'_> {
        let pending: Vec<DocumentId> = self.entries.iter().map(|e| e.document.clone()).collect();
        Drain {
            queue: self,
            pending: pending.into_iter(),
        }
    }

    /// Remaining attempts for a document
    pub fn remaining(&self, doc: &DocumentId) -> Option<u32> {
        self.position(doc).map(|pos| self.entries[pos].remaining)
    }

    /// Whether a document is queued
    pub fn contains(&self, doc: &DocumentId) -> bool {
        self.position(doc).is_some()
    }

    /// Number of queued documents
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the queue is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of the queue in order
    pub fn entries(&self) -> &[QueueEntry] {
        &self.entries
    }
}

/// Lazy, one-shot drain over a [`WorkQueue`]
pub struct Drain<'a> {
    queue: &'a mut WorkQueue,
    pending: std::vec::IntoIter<DocumentId>,
}

impl Iterator for Drain<'_> {
    type Item = DocumentId;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let doc = self.pending.next()?;
            let Some(pos) = self.queue.position(&doc) else {
                continue;
            };

            let entry = &mut self.queue.entries[pos];
            entry.remaining = entry.remaining.saturating_sub(1);
            if entry.remaining == 0 {
                self.queue.entries.remove(pos);
            }

            return Some(doc);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(path: &str) -> DocumentId {
        DocumentId::new(path)
    }

    #[test]
    fn test_push_dedups_and_resets() {
        let mut queue = WorkQueue::new();

        assert!(queue.push(doc("a.md"), 3).is_new());
        assert_eq!(queue.push(doc("a.md"), 5), PushResult::Reset);

        assert_eq!(queue.len(), 1);
        assert_eq!(queue.remaining(&doc("a.md")), Some(5));
    }

    #[test]
    fn test_zero_budget_is_ignored() {
        let mut queue = WorkQueue::new();
        assert_eq!(queue.push(doc("a.md"), 0), PushResult::Ignored);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_drain_decrements_and_evicts() {
        let mut queue = WorkQueue::new();
        queue.push(doc("a.md"), 1);
        queue.push(doc("b.md"), 2);

        let drained: Vec<_> = queue.drain().collect();
        assert_eq!(drained, vec![doc("a.md"), doc("b.md")]);

        // a.md ran out, b.md survives with one attempt left
        assert!(!queue.contains(&doc("a.md")));
        assert_eq!(queue.remaining(&doc("b.md")), Some(1));

        let drained: Vec<_> = queue.drain().collect();
        assert_eq!(drained, vec![doc("b.md")]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_drain_is_lazy() {
        let mut queue = WorkQueue::new();
        queue.push(doc("a.md"), 2);
        queue.push(doc("b.md"), 2);

        {
            let mut drain = queue.drain();
            assert_eq!(drain.next(), Some(doc("a.md")));
        }

        assert_eq!(queue.remaining(&doc("a.md")), Some(1));
        assert_eq!(queue.remaining(&doc("b.md")), Some(2));
    }

    #[test]
    fn test_repush_keeps_position() {
        let mut queue = WorkQueue::new();
        queue.push(doc("a.md"), 1);
        queue.push(doc("b.md"), 1);
        queue.push(doc("a.md"), 3);

        let order: Vec<_> = queue.entries().iter().map(|e| e.document.clone()).collect();
        assert_eq!(order, vec![doc("a.md"), doc("b.md")]);
    }

    #[test]
    fn test_remove() {
        let mut queue = WorkQueue::new();
        queue.push(doc("a.md"), 3);

        assert!(queue.remove(&doc("a.md")));
        assert!(!queue.remove(&doc("a.md")));
        assert!(queue.drain().next().is_none());
    }
}
