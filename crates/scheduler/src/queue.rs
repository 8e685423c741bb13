//! Time/priority-ordered queue of task ids waiting for their due time.
//!
//! Ordering is data: the queue is built with an [`EntryOrdering`] function
//! (default [`due_then_priority`]). Entries that tie under that function
//! pop in insertion order. Removal is lazy: a removed or re-inserted id
//! leaves a stale heap entry behind that is discarded when it surfaces.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use cadence_core::{Priority, TaskId};
use chrono::{DateTime, Utc};

/// Stale entries tolerated before the heap is rebuilt.
const COMPACT_SLACK: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueEntry {
    pub id: TaskId,
    pub due_at: DateTime<Utc>,
    pub priority: Priority,
}

/// Comparator deciding which entry pops first (`Less` = sooner).
pub type EntryOrdering = fn(&QueueEntry, &QueueEntry) -> Ordering;

/// Earliest due time first; among equal times, higher priority first.
pub fn due_then_priority(a: &QueueEntry, b: &QueueEntry) -> Ordering {
    a.due_at
        .cmp(&b.due_at)
        .then_with(|| b.priority.weight().cmp(&a.priority.weight()))
}

struct HeapItem {
    entry: QueueEntry,
    seq: u64,
    ordering: EntryOrdering,
}

impl HeapItem {
    fn rank(&self, other: &Self) -> Ordering {
        (self.ordering)(&self.entry, &other.entry).then_with(|| self.seq.cmp(&other.seq))
    }
}

impl PartialEq for HeapItem {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for HeapItem {}

impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapItem {
    // BinaryHeap is a max-heap; invert so the soonest entry is on top.
    fn cmp(&self, other: &Self) -> Ordering {
        other.rank(self)
    }
}

pub struct ReadyQueue {
    heap: BinaryHeap<HeapItem>,
    /// Live entry sequence number per queued id.
    live: HashMap<TaskId, u64>,
    next_seq: u64,
    ordering: EntryOrdering,
}

impl ReadyQueue {
    pub fn new(ordering: EntryOrdering) -> Self {
        Self {
            heap: BinaryHeap::new(),
            live: HashMap::new(),
            next_seq: 0,
            ordering,
        }
    }

    /// Queue `id` for `due_at`, replacing any entry it already has.
    pub fn insert(&mut self, id: TaskId, due_at: DateTime<Utc>, priority: Priority) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.live.insert(id, seq);
        self.heap.push(HeapItem {
            entry: QueueEntry {
                id,
                due_at,
                priority,
            },
            seq,
            ordering: self.ordering,
        });
        self.maybe_compact();
    }

    /// Drop the entry for `id`. Returns whether one was queued.
    pub fn remove_if_present(&mut self, id: &TaskId) -> bool {
        let removed = self.live.remove(id).is_some();
        if removed {
            self.maybe_compact();
        }
        removed
    }

    /// Soonest live entry, if it is due at `now`.
    pub fn peek_due(&mut self, now: DateTime<Utc>) -> Option<QueueEntry> {
        self.discard_stale();
        self.heap
            .peek()
            .map(|item| item.entry)
            .filter(|entry| entry.due_at <= now)
    }

    /// Remove and return the soonest live entry, if it is due at `now`.
    pub fn pop_due(&mut self, now: DateTime<Utc>) -> Option<QueueEntry> {
        let entry = self.peek_due(now)?;
        self.heap.pop();
        self.live.remove(&entry.id);
        Some(entry)
    }

    /// Due time of the soonest live entry, due or not.
    pub fn next_due_at(&mut self) -> Option<DateTime<Utc>> {
        self.discard_stale();
        self.heap.peek().map(|item| item.entry.due_at)
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        self.live.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    fn is_live(&self, item: &HeapItem) -> bool {
        self.live.get(&item.entry.id) == Some(&item.seq)
    }

    fn discard_stale(&mut self) {
        while let Some(top) = self.heap.peek() {
            if self.is_live(top) {
                break;
            }
            self.heap.pop();
        }
    }

    fn maybe_compact(&mut self) {
        if self.heap.len() <= self.live.len() * 2 + COMPACT_SLACK {
            return;
        }
        let heap = std::mem::take(&mut self.heap);
        self.heap = heap
            .into_iter()
            .filter(|item| self.live.get(&item.entry.id) == Some(&item.seq))
            .collect();
    }
}

impl Default for ReadyQueue {
    fn default() -> Self {
        Self::new(due_then_priority)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_750_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn pops_in_time_order() {
        let mut q = ReadyQueue::default();
        let (a, b, c) = (TaskId::new(), TaskId::new(), TaskId::new());
        q.insert(c, at(30), Priority::Low);
        q.insert(a, at(10), Priority::Low);
        q.insert(b, at(20), Priority::Low);

        let order: Vec<TaskId> = std::iter::from_fn(|| q.pop_due(at(100)).map(|e| e.id)).collect();
        assert_eq!(order, vec![a, b, c]);
        assert!(q.is_empty());
    }

    #[test]
    fn higher_priority_wins_ties() {
        let mut q = ReadyQueue::default();
        let low = TaskId::new();
        let high = TaskId::new();
        q.insert(low, at(5), Priority::Low);
        q.insert(high, at(5), Priority::High);

        assert_eq!(q.pop_due(at(5)).map(|e| e.id), Some(high));
        assert_eq!(q.pop_due(at(5)).map(|e| e.id), Some(low));
    }

    #[test]
    fn equal_keys_pop_in_insertion_order() {
        let mut q = ReadyQueue::default();
        let ids: Vec<TaskId> = (0..5).map(|_| TaskId::new()).collect();
        for id in &ids {
            q.insert(*id, at(1), Priority::Medium);
        }
        let order: Vec<TaskId> = std::iter::from_fn(|| q.pop_due(at(1)).map(|e| e.id)).collect();
        assert_eq!(order, ids);
    }

    #[test]
    fn nothing_due_before_its_time() {
        let mut q = ReadyQueue::default();
        let id = TaskId::new();
        q.insert(id, at(10), Priority::Critical);

        assert!(q.peek_due(at(9)).is_none());
        assert!(q.pop_due(at(9)).is_none());
        assert_eq!(q.next_due_at(), Some(at(10)));
        assert_eq!(q.pop_due(at(10)).map(|e| e.id), Some(id));
    }

    #[test]
    fn removed_entry_is_never_popped() {
        let mut q = ReadyQueue::default();
        let keep = TaskId::new();
        let cancel = TaskId::new();
        q.insert(cancel, at(1), Priority::Critical);
        q.insert(keep, at(1), Priority::Low);

        assert!(q.remove_if_present(&cancel));
        assert!(!q.remove_if_present(&cancel));
        assert_eq!(q.len(), 1);
        assert_eq!(q.pop_due(at(1)).map(|e| e.id), Some(keep));
        assert!(q.pop_due(at(1)).is_none());
    }

    #[test]
    fn reinsert_replaces_previous_entry() {
        let mut q = ReadyQueue::default();
        let id = TaskId::new();
        q.insert(id, at(1), Priority::Low);
        q.insert(id, at(50), Priority::Low);

        assert_eq!(q.len(), 1);
        assert!(q.pop_due(at(10)).is_none());
        assert_eq!(q.pop_due(at(50)).map(|e| e.id), Some(id));
        assert!(q.pop_due(at(100)).is_none());
    }

    #[test]
    fn custom_ordering_is_respected() {
        // Priority first, then time.
        fn priority_first(a: &QueueEntry, b: &QueueEntry) -> Ordering {
            b.priority.cmp(&a.priority).then_with(|| a.due_at.cmp(&b.due_at))
        }
        let mut q = ReadyQueue::new(priority_first);
        let early_low = TaskId::new();
        let late_high = TaskId::new();
        q.insert(early_low, at(1), Priority::Low);
        q.insert(late_high, at(2), Priority::High);

        assert_eq!(q.pop_due(at(5)).map(|e| e.id), Some(late_high));
        assert_eq!(q.pop_due(at(5)).map(|e| e.id), Some(early_low));
    }

    #[test]
    fn compaction_keeps_live_entries() {
        let mut q = ReadyQueue::default();
        let survivor = TaskId::new();
        q.insert(survivor, at(500), Priority::Low);
        for i in 0..500 {
            let id = TaskId::new();
            q.insert(id, at(i), Priority::Low);
            q.remove_if_present(&id);
        }
        assert_eq!(q.len(), 1);
        assert!(q.heap.len() <= 2 + COMPACT_SLACK);
        assert_eq!(q.pop_due(at(1_000)).map(|e| e.id), Some(survivor));
    }
}
