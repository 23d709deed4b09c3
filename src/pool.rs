//! Core proxy pool implementation.
//!
//! The pool is a priority queue ordered ascending by score that holds at most
//! one entry per [`ProxyDescriptor`]. Every operation runs under a single mutex;
//! blocking pops park on a "not empty" condition variable instead of spinning.

use crate::error::Empty;
use crate::proxy::{PoolEntry, ProxyDescriptor};

use log::debug;
use parking_lot::{Condvar, Mutex};
use rand::Rng;
use std::time::{Duration, Instant};

/// Scores at or above this value are never admitted to the pool.
pub const MAX_SCORE: u32 = 100;

/// How long a pop may wait for an entry to show up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    /// Fail with [`Empty`] right away if nothing is queued.
    Immediate,
    /// Park until an entry arrives.
    Forever,
    /// Park for at most the given duration.
    Timeout(Duration),
}

/// A deduplicating, score-ordered pool of proxies.
#[derive(Default)]
pub struct ProxyPool {
    /// Entries sorted ascending by score.
    entries: Mutex<Vec<PoolEntry>>,
    not_empty: Condvar,
}

impl ProxyPool {
    /// Create an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry, replacing any entry for the same descriptor.
    ///
    /// The entry goes right before the first entry whose score is greater or
    /// equal to its own, so among equal scores the newest entry comes first.
    /// Returns `false` (and drops the entry) if its score is [`MAX_SCORE`] or more.
    pub fn put(&self, entry: PoolEntry) -> bool {
        if entry.score >= MAX_SCORE {
            debug!("Refusing {} with score {}", entry.descriptor, entry.score);
            return false;
        }

        let mut entries = self.entries.lock();
        if let Some(pos) = entries.iter().position(|e| e.descriptor == entry.descriptor) {
            entries.remove(pos);
        }
        let pos = entries
            .iter()
            .position(|e| entry.score <= e.score)
            .unwrap_or(entries.len());
        entries.insert(pos, entry);
        drop(entries);

        self.not_empty.notify_one();
        true
    }

    /// Remove and return the best-ranked (lowest score) entry.
    pub fn pop_best(&self, wait: Wait) -> Result<PoolEntry, Empty> {
        self.pop_with(wait, |_| 0)
    }

    /// Remove and return an entry chosen uniformly at random, regardless of score.
    pub fn pop_random(&self, wait: Wait) -> Result<PoolEntry, Empty> {
        self.pop_with(wait, |len| rand::rng().random_range(0..len))
    }

    fn pop_with(&self, wait: Wait, pick: impl FnOnce(usize) -> usize) -> Result<PoolEntry, Empty> {
        let mut entries = self.entries.lock();
        match wait {
            Wait::Immediate => {}
            Wait::Forever => {
                while entries.is_empty() {
                    self.not_empty.wait(&mut entries);
                }
            }
            Wait::Timeout(timeout) => match Instant::now().checked_add(timeout) {
                Some(deadline) => {
                    while entries.is_empty() {
                        if self.not_empty.wait_until(&mut entries, deadline).timed_out() {
                            break;
                        }
                    }
                }
                // too far out to represent, same as waiting forever
                None => {
                    while entries.is_empty() {
                        self.not_empty.wait(&mut entries);
                    }
                }
            },
        }

        if entries.is_empty() {
            return Err(Empty);
        }
        let idx = pick(entries.len());
        Ok(entries.remove(idx))
    }

    /// Remove the entry for `descriptor`, if present.
    pub fn remove(&self, descriptor: &ProxyDescriptor) -> Option<PoolEntry> {
        let mut entries = self.entries.lock();
        let pos = entries.iter().position(|e| &e.descriptor == descriptor)?;
        Some(entries.remove(pos))
    }

    /// Ordered copy of the current entries.
    pub fn snapshot(&self) -> Vec<PoolEntry> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
