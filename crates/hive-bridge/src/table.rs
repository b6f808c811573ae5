//! Insertion-ordered ID tables

use rustc_hash::FxHashMap;
use std::hash::Hash;

/// Map from ID to record that iterates in insertion order
#[derive(Debug)]
pub(crate) struct IdTable<K, V> {
    entries: Vec<(K, V)>,
    index: FxHashMap<K, usize>,
}

impl<K: Copy + Eq + Hash, V> IdTable<K, V> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            index: FxHashMap::default(),
        }
    }

    pub fn insert(&mut self, key: K, value: V) {
        if let Some(&slot) = self.index.get(&key) {
            self.entries[slot].1 = value;
            return;
        }
        self.index.insert(key, self.entries.len());
        self.entries.push((key, value));
    }

    pub fn get(&self, key: K) -> Option<&V> {
        self.index.get(&key).map(|&slot| &self.entries[slot].1)
    }

    pub fn get_mut(&mut self, key: K) -> Option<&mut V> {
        match self.index.get(&key) {
            Some(&slot) => Some(&mut self.entries[slot].1),
            None => None,
        }
    }

    /// Remove an entry, keeping the order of the rest
    pub fn remove(&mut self, key: K) -> Option<V> {
        let slot = self.index.remove(&key)?;
        let (_, value) = self.entries.remove(slot);
        for position in self.index.values_mut() {
            if *position > slot {
                *position -= 1;
            }
        }
        Some(value)
    }

    pub fn keys(&self) -> impl Iterator<Item = K> + '_ {
        self.entries.iter().map(|(k, _)| *k)
    }

    pub fn values(&self) -> impl Iterator<Item = &V> + '_ {
        self.entries.iter().map(|(_, v)| v)
    }

    /// First key whose record satisfies `predicate`
    pub fn find_key(&self, predicate: impl Fn(&V) -> bool) -> Option<K> {
        self.entries.iter().find(|(_, v)| predicate(v)).map(|(k, _)| *k)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl<K: Copy + Eq + Hash, V> Default for IdTable<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insertion_order() {
        let mut table = IdTable::new();
        table.insert(5u64, "a");
        table.insert(2u64, "b");
        table.insert(9u64, "c");
        assert_eq!(table.keys().collect::<Vec<_>>(), vec![5, 2, 9]);
        assert_eq!(table.get(2), Some(&"b"));
        assert_eq!(table.get(3), None);
    }

    #[test]
    fn test_remove_keeps_order() {
        let mut table = IdTable::new();
        for (k, v) in [(1u64, 'a'), (2, 'b'), (3, 'c')] {
            table.insert(k, v);
        }
        assert_eq!(table.remove(2), Some('b'));
        assert_eq!(table.remove(2), None);
        assert_eq!(table.len(), 2);
        assert_eq!(table.keys().collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(table.get(3), Some(&'c'));
        assert_eq!(table.find_key(|v| *v == 'c'), Some(3));
    }
}
