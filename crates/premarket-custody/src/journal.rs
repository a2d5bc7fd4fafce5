//! Entity table with an undo journal.
//!
//! While a unit of work is open, each write records the row's previous
//! value. A savepoint is the journal length; rolling back replays the
//! journal in reverse. Closing the outermost unit, by release or rollback,
//! empties the journal. Writes made while no unit is open are permanent.

use std::collections::HashMap;
use std::hash::Hash;

#[derive(Debug, Clone)]
pub struct JournaledTable<K, V> {
    rows: HashMap<K, V>,
    undo: Vec<(K, Option<V>)>,
    open: usize,
}

impl<K, V> JournaledTable<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    #[must_use]
    pub fn new() -> Self {
        Self {
            rows: HashMap::new(),
            undo: Vec::new(),
            open: 0,
        }
    }

    #[must_use]
    pub fn get(&self, key: &K) -> Option<&V> {
        self.rows.get(key)
    }

    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        self.rows.contains_key(key)
    }

    /// Insert or overwrite a row, journaling its previous value.
    pub fn put(&mut self, key: K, value: V) {
        let previous = self.rows.insert(key.clone(), value);
        if self.open > 0 {
            self.undo.push((key, previous));
        }
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.rows.values()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.rows.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn journal_len(&self) -> usize {
        self.undo.len()
    }

    /// Open a unit of work.
    pub fn savepoint(&mut self) -> usize {
        self.open += 1;
        self.undo.len()
    }

    pub fn rollback_to(&mut self, savepoint: usize) {
        while self.undo.len() > savepoint {
            let Some((key, previous)) = self.undo.pop() else {
                break;
            };
            match previous {
                Some(value) => {
                    self.rows.insert(key, value);
                }
                None => {
                    self.rows.remove(&key);
                }
            }
        }
        self.close_unit();
    }

    pub fn release(&mut self, _savepoint: usize) {
        self.close_unit();
    }

    fn close_unit(&mut self) {
        self.open = self.open.saturating_sub(1);
        if self.open == 0 {
            self.undo.clear();
        }
    }
}

impl<K, V> Default for JournaledTable<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rollback_removes_inserts_and_restores_updates() {
        let mut t: JournaledTable<u64, &str> = JournaledTable::new();
        t.put(1, "a");

        let sp = t.savepoint();
        t.put(1, "b");
        t.put(2, "c");
        assert_eq!(t.get(&1), Some(&"b"));
        t.rollback_to(sp);
        assert_eq!(t.get(&1), Some(&"a"));
        assert!(!t.contains(&2));
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn release_keeps_changes() {
        let mut t: JournaledTable<u64, u64> = JournaledTable::new();
        let sp = t.savepoint();
        t.put(7, 70);
        t.release(sp);
        assert_eq!(t.get(&7), Some(&70));
        assert_eq!(t.journal_len(), 0);
    }

    #[test]
    fn nested_savepoints() {
        let mut t: JournaledTable<u64, u64> = JournaledTable::new();
        let outer = t.savepoint();
        t.put(1, 1);
        let inner = t.savepoint();
        t.put(2, 2);
        t.release(inner);
        assert_eq!(t.journal_len(), 2);
        t.rollback_to(outer);
        assert!(t.is_empty());
        assert_eq!(t.journal_len(), 0);
    }

    #[test]
    fn journal_does_not_grow_across_units() {
        let mut t: JournaledTable<u64, u64> = JournaledTable::new();
        t.put(0, 0);
        assert_eq!(t.journal_len(), 0);
        for i in 1..=50 {
            let sp = t.savepoint();
            t.put(i, i);
            t.release(sp);
        }
        assert_eq!(t.len(), 51);
        assert_eq!(t.journal_len(), 0);
    }
}
