//! Bounded cache of resolved format menus.
//!
//! Catalog probes are the slowest UI-facing operation, so resolved menus
//! are kept keyed by reference. The cache is the one piece of shared
//! mutable state in the system: a mutex around a map plus an insertion
//! queue, O(1) lookup, with the least-recently-inserted entry evicted once
//! the fixed capacity is exceeded.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use tracing::debug;

use crate::formats::SelectionEntry;

/// Bounded, mutex-protected map from reference to resolved menu.
#[derive(Debug)]
pub struct FormatCache {
    inner: Mutex<CacheInner>,
}

#[derive(Debug)]
struct CacheInner {
    entries: HashMap<String, Vec<SelectionEntry>>,
    insertion_order: VecDeque<String>,
    capacity: usize,
}

impl FormatCache {
    /// Create a cache holding at most `capacity` entries (minimum one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                insertion_order: VecDeque::new(),
                capacity: capacity.max(1),
            }),
        }
    }

    /// Look up the cached menu for a reference.
    #[must_use]
    pub fn get(&self, reference: &str) -> Option<Vec<SelectionEntry>> {
        let inner = self.lock();
        inner.entries.get(reference).cloned()
    }

    /// Insert (or replace) the menu for a reference.
    ///
    /// Replacing an existing key does not refresh its insertion slot;
    /// eviction order is strictly by first insertion.
    pub fn insert(&self, reference: String, entries: Vec<SelectionEntry>) {
        let mut inner = self.lock();
        if inner.entries.insert(reference.clone(), entries).is_some() {
            return;
        }
        inner.insertion_order.push_back(reference);
        while inner.insertion_order.len() > inner.capacity {
            if let Some(oldest) = inner.insertion_order.pop_front() {
                debug!("Evicting cached formats for {oldest}");
                inner.entries.remove(&oldest);
            }
        }
    }

    /// Number of cached references.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
