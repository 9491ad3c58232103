//! Known-fact storage
//!
//! Owned map from quantity keys to asserted unit-benefit values. Lookup
//! is exact-match only; the solver, not the store, decides what follows
//! from the facts.

use std::collections::HashMap;

use crate::recursion::key::QuantityKey;

/// Asserted facts, keyed exactly
#[derive(Debug, Clone, Default)]
pub struct FactStore {
    facts: HashMap<QuantityKey, f64>,
}

impl FactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a fact, returning any previous value
    pub fn assert_fact(&mut self, key: QuantityKey, value: f64) -> Option<f64> {
        self.facts.insert(key, value)
    }

    /// Remove a fact, returning it if present
    pub fn retract(&mut self, key: &QuantityKey) -> Option<f64> {
        self.facts.remove(key)
    }

    /// Exact-match lookup; no interpolation, no inference
    pub fn lookup(&self, key: &QuantityKey) -> Option<f64> {
        self.facts.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    pub fn clear(&mut self) {
        self.facts.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&QuantityKey, &f64)> {
        self.facts.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assert_and_lookup() {
        let mut store = FactStore::new();
        let key = QuantityKey::mortality(60);
        assert!(store.lookup(&key).is_none());

        store.assert_fact(key, 0.01);
        assert_eq!(store.lookup(&key), Some(0.01));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_duplicate_assertion_overwrites() {
        let mut store = FactStore::new();
        let key = QuantityKey::survival(40);
        assert_eq!(store.assert_fact(key, 0.98), None);
        assert_eq!(store.assert_fact(key, 0.99), Some(0.98));
        assert_eq!(store.lookup(&key), Some(0.99));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_retract() {
        let mut store = FactStore::new();
        let key = QuantityKey::whole_life_annuity(65);
        store.assert_fact(key, 12.5);
        assert_eq!(store.retract(&key), Some(12.5));
        assert!(store.lookup(&key).is_none());
        assert_eq!(store.retract(&key), None);
    }

    #[test]
    fn test_distinct_keys_are_distinct_facts() {
        let mut store = FactStore::new();
        store.assert_fact(QuantityKey::term_insurance(60, 3), 0.15);
        store.assert_fact(QuantityKey::endowment_insurance(60, 3), 0.86);
        assert_eq!(store.len(), 2);
        assert_eq!(
            store.lookup(&QuantityKey::term_insurance(60, 3)),
            Some(0.15)
        );
    }
}
