//! Bounded, expiring store of task results
//!
//! A task is inserted as pending when it is submitted and completed by the
//! worker that ran it. Waiters hold a watch receiver, so a completion that
//! lands between the lookup and the wait is never missed. Entries leave the
//! pool when it is full (oldest first) or when they are older than the
//! maximum age, whether or not anyone fetched them yet.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::debug;

use super::{RpcError, RpcResult};
use crate::agents::domain::Message;

struct Entry {
    inserted: Instant,
    result: watch::Sender<Option<Message>>,
}

pub struct ResultPool {
    max_size: usize,
    max_age: Duration,
    // Task ids grow monotonically, so key order is insertion order
    entries: Mutex<BTreeMap<u64, Entry>>,
}

impl ResultPool {
    pub fn new(max_size: usize, max_age: Duration) -> Self {
        Self {
            max_size: max_size.max(1),
            max_age,
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    /// Register a task whose result is not known yet
    pub fn insert_pending(&self, task_id: u64) {
        self.insert(task_id, None);
    }

    /// Store a finished result directly
    pub fn insert_ready(&self, task_id: u64, message: Message) {
        self.insert(task_id, Some(message));
    }

    fn insert(&self, task_id: u64, value: Option<Message>) {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        self.evict_expired(&mut entries, now);
        while entries.len() >= self.max_size {
            if let Some((evicted, _)) = entries.pop_first() {
                debug!(task_id = evicted, "Result pool full, evicting oldest result");
            }
        }
        let (result, _) = watch::channel(value);
        entries.insert(
            task_id,
            Entry {
                inserted: now,
                result,
            },
        );
    }

    /// Publish the result of a pending task and wake its waiters
    pub fn complete(&self, task_id: u64, message: Message) {
        let entries = self.entries.lock();
        match entries.get(&task_id) {
            Some(entry) => {
                entry.result.send_replace(Some(message));
            }
            None => debug!(task_id, "Result finished after being evicted"),
        }
    }

    /// Wait up to `timeout` for a task result
    ///
    /// `Ok(None)` means the task is still running. Unknown, evicted and
    /// expired tasks are `NotFound`.
    pub async fn wait(&self, task_id: u64, timeout: Duration) -> RpcResult<Option<Message>> {
        let mut receiver = {
            let mut entries = self.entries.lock();
            self.evict_expired(&mut entries, Instant::now());
            match entries.get(&task_id) {
                Some(entry) => entry.result.subscribe(),
                None => return Err(not_found(task_id)),
            }
        };

        let waited = tokio::time::timeout(timeout, receiver.wait_for(Option::is_some)).await;
        match waited {
            Ok(Ok(result)) => Ok(result.clone()),
            // Sender dropped: the entry was evicted while we waited
            Ok(Err(_)) => Err(not_found(task_id)),
            Err(_) => Ok(None),
        }
    }

    /// Current result without waiting
    pub fn get(&self, task_id: u64) -> RpcResult<Option<Message>> {
        let mut entries = self.entries.lock();
        self.evict_expired(&mut entries, Instant::now());
        entries
            .get(&task_id)
            .map(|entry| entry.result.borrow().clone())
            .ok_or_else(|| not_found(task_id))
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tasks still waiting for their result
    pub fn pending(&self) -> usize {
        self.entries
            .lock()
            .values()
            .filter(|entry| entry.result.borrow().is_none())
            .count()
    }

    fn evict_expired(&self, entries: &mut BTreeMap<u64, Entry>, now: Instant) {
        while let Some(entry) = entries.first_entry() {
            if now.duration_since(entry.get().inserted) <= self.max_age {
                break;
            }
            debug!(task_id = *entry.key(), "Result expired");
            entry.remove();
        }
    }
}

fn not_found(task_id: u64) -> RpcError {
    RpcError::NotFound(format!("result of task {} is unknown or expired", task_id))
}
