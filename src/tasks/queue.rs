//! Priority task queue.
//!
//! Many producers, one consumer. `push` never blocks; `pop` waits until an
//! entry is available. Entries leave in ascending `(priority, sequence)`
//! order, so equal priorities are FIFO.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

use super::types::{Priority, QueueEntry, QueuedTask};

#[derive(Default)]
pub struct TaskQueue {
    heap: Mutex<BinaryHeap<Reverse<QueueEntry>>>,
    notify: Notify,
    /// Next sequence number; never reused
    sequence: AtomicU64,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn heap(&self) -> MutexGuard<'_, BinaryHeap<Reverse<QueueEntry>>> {
        self.heap.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue a task and return its sequence number.
    pub fn push(&self, priority: Priority, task: QueuedTask) -> u64 {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        self.heap().push(Reverse(QueueEntry {
            priority,
            sequence,
            task,
        }));
        // A stored permit covers a consumer that has not started waiting yet.
        self.notify.notify_one();
        sequence
    }

    /// Remove the most urgent entry without waiting.
    pub fn try_pop(&self) -> Option<QueueEntry> {
        self.heap().pop().map(|Reverse(entry)| entry)
    }

    /// Wait for and remove the most urgent entry.
    pub async fn pop(&self) -> QueueEntry {
        loop {
            if let Some(entry) = self.try_pop() {
                return entry;
            }
            self.notify.notified().await;
        }
    }

    /// Drop queued entries whose task does not satisfy `keep`.
    pub fn retain(&self, mut keep: impl FnMut(&QueuedTask) -> bool) {
        self.heap().retain(|Reverse(entry)| keep(&entry.task));
    }

    pub fn len(&self) -> usize {
        self.heap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap().is_empty()
    }
}
