//! Time-keyed min-priority queue with in-place replacement and lazy removal.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::hash::Hash;

use thiserror::Error;

/// Failures surfaced by [`PriorityQueue`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    /// `pop` or `peek` found no live item.
    #[error("priority queue is empty")]
    Empty,
    /// `remove` was asked for an item that is not queued.
    #[error("item not found in priority queue")]
    NotFound,
}

/// One heap slot. Ordered so that `BinaryHeap` (a max-heap) yields the
/// smallest priority first, and the oldest sequence among equal priorities.
#[derive(Debug)]
struct Entry<T> {
    priority: f64,
    sequence: u64,
    item: T,
}

impl<T> Ord for Entry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .total_cmp(&self.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T> Eq for Entry<T> {}

/// A min-priority queue keyed by time.
///
/// Each item appears at most once. Inserting an item that is already queued
/// replaces its priority; the superseded heap slot becomes a tombstone that
/// is discarded when it reaches the top of the heap. Equal priorities are
/// served in insertion order.
///
/// # Examples
///
/// ```
/// use lpdm_sim::sim::queue::PriorityQueue;
///
/// let mut queue = PriorityQueue::new();
/// queue.insert("late", 5.0);
/// queue.insert("early", 1.0);
/// queue.insert("late", 0.5); // replaces, does not duplicate
///
/// assert_eq!(queue.len(), 2);
/// assert_eq!(queue.pop(), Ok(("late", 0.5)));
/// assert_eq!(queue.pop(), Ok(("early", 1.0)));
/// assert!(queue.is_empty());
/// ```
#[derive(Debug)]
pub struct PriorityQueue<T> {
    heap: BinaryHeap<Entry<T>>,
    /// Live items mapped to the sequence number of their current heap slot.
    live: HashMap<T, (u64, f64)>,
    counter: u64,
}

impl<T> Default for PriorityQueue<T>
where
    T: Clone + Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PriorityQueue<T>
where
    T: Clone + Eq + Hash,
{
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            live: HashMap::new(),
            counter: 0,
        }
    }

    /// Inserts `item` at `priority`, replacing the priority of an existing
    /// equal item.
    pub fn insert(&mut self, item: T, priority: f64) {
        self.push(item, priority);
        self.prune_top();
    }

    /// Moves every live item matching `predicate` to `new_priority`.
    ///
    /// Matching items keep their relative insertion order. Returns the number
    /// of items updated.
    pub fn update_matching<F>(&mut self, predicate: F, new_priority: f64) -> usize
    where
        F: Fn(&T) -> bool,
    {
        let mut matches: Vec<(u64, T)> = self
            .live
            .iter()
            .filter(|(item, _)| predicate(item))
            .map(|(item, &(sequence, _))| (sequence, item.clone()))
            .collect();
        matches.sort_by_key(|(sequence, _)| *sequence);

        let updated = matches.len();
        for (_, item) in matches {
            self.push(item, new_priority);
        }
        self.prune_top();
        updated
    }

    /// Removes `item` from the queue.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::NotFound`] if the item is not queued.
    pub fn remove(&mut self, item: &T) -> Result<(), QueueError> {
        self.live.remove(item).ok_or(QueueError::NotFound)?;
        self.prune_top();
        Ok(())
    }

    /// Removes and returns the live item with the smallest priority.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Empty`] if no live items remain.
    pub fn pop(&mut self) -> Result<(T, f64), QueueError> {
        let entry = self.heap.pop().ok_or(QueueError::Empty)?;
        self.live.remove(&entry.item);
        self.prune_top();
        Ok((entry.item, entry.priority))
    }

    /// Returns the live item with the smallest priority without removing it.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Empty`] if no live items remain.
    pub fn peek(&self) -> Result<(&T, f64), QueueError> {
        self.heap
            .peek()
            .map(|entry| (&entry.item, entry.priority))
            .ok_or(QueueError::Empty)
    }

    /// Returns the smallest live priority, if any.
    pub fn peek_priority(&self) -> Option<f64> {
        self.heap.peek().map(|entry| entry.priority)
    }

    /// Returns the current priority of `item`, if it is queued.
    pub fn priority_of(&self, item: &T) -> Option<f64> {
        self.live.get(item).map(|&(_, priority)| priority)
    }

    /// Returns `true` if `item` is queued.
    pub fn contains(&self, item: &T) -> bool {
        self.live.contains_key(item)
    }

    /// Number of live items, excluding tombstones.
    pub fn len(&self) -> usize {
        self.live.len()
    }

    /// Returns `true` when no live items remain, whatever the heap holds.
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Discards every item and resets the tie-break counter.
    pub fn clear(&mut self) {
        self.heap.clear();
        self.live.clear();
        self.counter = 0;
    }

    fn push(&mut self, item: T, priority: f64) {
        let sequence = self.counter;
        self.counter += 1;
        self.live.insert(item.clone(), (sequence, priority));
        self.heap.push(Entry {
            priority,
            sequence,
            item,
        });
    }

    /// Pops tombstones until the heap top is live, so `peek` can stay `&self`.
    fn prune_top(&mut self) {
        while let Some(top) = self.heap.peek() {
            let is_live = self
                .live
                .get(&top.item)
                .is_some_and(|&(sequence, _)| sequence == top.sequence);
            if is_live {
                break;
            }
            self.heap.pop();
        }
    }
}
