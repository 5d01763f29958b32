//! Bounded de-duplication window.

use std::collections::{HashSet, VecDeque};
use std::hash::Hash;

/// The last `capacity` keys seen, oldest evicted first.
///
/// Guards against a source re-presenting records across a page boundary;
/// keys older than the window are forgotten.
#[derive(Debug, Clone)]
pub struct SeenWindow<K> {
    capacity: usize,
    order: VecDeque<K>,
    members: HashSet<K>,
}

impl<K: Eq + Hash + Clone> SeenWindow<K> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
            members: HashSet::with_capacity(capacity),
        }
    }

    /// Record `key`. Returns false if it is already in the window.
    pub fn insert(&mut self, key: K) -> bool {
        if self.members.contains(&key) {
            return false;
        }
        if self.order.len() == self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.members.remove(&oldest);
            }
        }
        self.order.push_back(key.clone());
        self.members.insert(key);
        true
    }

    pub fn contains(&self, key: &K) -> bool {
        self.members.contains(key)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_keys_in_window() {
        let mut seen = SeenWindow::new(3);
        assert!(seen.insert(1));
        assert!(seen.insert(2));
        assert!(!seen.insert(1));
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn test_evicts_oldest() {
        let mut seen = SeenWindow::new(2);
        seen.insert("a");
        seen.insert("b");
        seen.insert("c");
        assert!(!seen.contains(&"a"));
        assert!(seen.contains(&"b"));
        assert!(seen.insert("a"));
    }
}
