//! The shared Job Queue: a bounded, thread-safe dedup set-queue
//!
//! FIFO ordering of insertion, but inserting a name already queued is a
//! no-op. This is the dedup that prevents the scheduler from flooding
//! workers with repeated entries of a slow job.

use std::collections::{HashSet, VecDeque};
use tokio::sync::{Mutex, Notify};

struct QueueState {
    order: VecDeque<String>,
    set: HashSet<String>,
}

/// A bounded set-queue of job names. Capacity is intended to equal the
/// worker pool size.
pub struct JobQueue {
    capacity: usize,
    state: Mutex<QueueState>,
    not_empty: Notify,
    not_full: Notify,
}

impl JobQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(QueueState {
                order: VecDeque::new(),
                set: HashSet::new(),
            }),
            not_empty: Notify::new(),
            not_full: Notify::new(),
        }
    }

    /// Insert `name`. If the queue is full, waits for space. If `name`
    /// is already queued, this is a no-op.
    pub async fn put(&self, name: String) {
        loop {
            {
                let mut state = self.state.lock().await;
                if state.set.contains(&name) {
                    return;
                }
                if state.order.len() < self.capacity {
                    state.set.insert(name.clone());
                    state.order.push_back(name);
                    self.not_empty.notify_one();
                    return;
                }
            }
            self.not_full.notified().await;
        }
    }

    /// Remove and return the oldest queued name, waiting if the queue
    /// is empty.
    pub async fn take(&self) -> String {
        loop {
            {
                let mut state = self.state.lock().await;
                if let Some(name) = state.order.pop_front() {
                    state.set.remove(&name);
                    self.not_full.notify_one();
                    return name;
                }
            }
            self.not_empty.notified().await;
        }
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.order.len()
    }
}
