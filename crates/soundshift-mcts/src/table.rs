//! Transposition table: a trie over word-identity tuples that canonicalises
//! state nodes, so identical states reached along different paths share one
//! node. Entries are weak: the search graph owns node lifetime, the table
//! only answers identity questions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering::Relaxed};
use std::sync::{Arc, Mutex, Weak};

use crate::node::{Node, NodeRef};

#[derive(Default)]
struct TrieNode {
    children: HashMap<u32, TrieNode>,
    value: Option<Weak<Node>>,
}

impl TrieNode {
    /// Drop dead entries and empty branches below this node. Returns the
    /// number of entries evicted.
    fn evict_dead(&mut self) -> usize {
        let mut evicted = 0;
        if let Some(weak) = &self.value {
            if weak.strong_count() == 0 {
                self.value = None;
                evicted += 1;
            }
        }
        self.children.retain(|_, child| {
            evicted += child.evict_dead();
            child.value.is_some() || !child.children.is_empty()
        });
        evicted
    }

    fn count_live(&self) -> usize {
        let here = usize::from(matches!(&self.value, Some(w) if w.strong_count() > 0));
        here + self.children.values().map(TrieNode::count_live).sum::<usize>()
    }
}

/// Trie from word-key sequences to canonical state nodes.
///
/// All trie writes go through one mutex; the search only touches the table
/// on state creation, so a single lock is not on the hot path.
pub struct Table {
    root: Mutex<TrieNode>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Table {
    pub fn new() -> Self {
        Self {
            root: Mutex::new(TrieNode::default()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Canonical node for `key`, creating one via `make` on a miss.
    ///
    /// Idempotent: equal keys always return the same node identity while the
    /// node is alive. The second tuple element is `true` when `make` ran.
    pub fn get_or_insert(&self, key: &[u32], make: impl FnOnce() -> NodeRef) -> (NodeRef, bool) {
        let mut root = self.root.lock().unwrap();
        let mut cur = &mut *root;
        for &k in key {
            cur = cur.children.entry(k).or_default();
        }
        if let Some(existing) = cur.value.as_ref().and_then(Weak::upgrade) {
            self.hits.fetch_add(1, Relaxed);
            return (existing, false);
        }
        self.misses.fetch_add(1, Relaxed);
        let node = make();
        cur.value = Some(Arc::downgrade(&node));
        (node, true)
    }

    /// Look up `key` without inserting.
    pub fn get(&self, key: &[u32]) -> Option<NodeRef> {
        let mut root = self.root.lock().unwrap();
        let mut cur = &mut *root;
        for &k in key {
            cur = cur.children.get_mut(&k)?;
        }
        let found = cur.value.as_ref().and_then(Weak::upgrade);
        if found.is_some() {
            self.hits.fetch_add(1, Relaxed);
        } else {
            self.misses.fetch_add(1, Relaxed);
        }
        found
    }

    /// Drop the entry for `key`, if any. The node itself is untouched.
    pub fn remove(&self, key: &[u32]) -> bool {
        let mut root = self.root.lock().unwrap();
        let mut cur = &mut *root;
        for &k in key {
            match cur.children.get_mut(&k) {
                Some(child) => cur = child,
                None => return false,
            }
        }
        cur.value.take().is_some()
    }

    /// Sweep entries whose node has been dropped. Returns how many were
    /// evicted.
    pub fn evict_dead(&self) -> usize {
        self.root.lock().unwrap().evict_dead()
    }

    /// Number of live canonical nodes.
    pub fn len(&self) -> usize {
        self.root.lock().unwrap().count_live()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Relaxed);
        let total = hits + self.misses.load(Relaxed);
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    pub fn stats(&self) -> (u64, u64, usize) {
        (self.hits.load(Relaxed), self.misses.load(Relaxed), self.len())
    }
}

impl Default for Table {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
