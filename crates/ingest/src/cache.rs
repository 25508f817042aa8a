use std::collections::HashMap;
use std::hash::Hash;

/// Natural key to row id for one parent table.
///
/// `confirmed` mirrors rows known to be committed as of the last refresh.
/// Ids resolved since then sit in `pending` until the next successful flush
/// promotes them; a failed flush discards them so the cache never claims a
/// row the caller did not see committed.
#[derive(Debug, Clone)]
pub struct ExistingRowCache<K> {
    confirmed: HashMap<K, i64>,
    pending: HashMap<K, i64>,
}

impl<K> Default for ExistingRowCache<K> {
    fn default() -> Self {
        Self {
            confirmed: HashMap::new(),
            pending: HashMap::new(),
        }
    }
}

impl<K: Hash + Eq> ExistingRowCache<K> {
    pub fn from_rows(rows: HashMap<K, i64>) -> Self {
        Self {
            confirmed: rows,
            pending: HashMap::new(),
        }
    }

    pub fn get(&self, key: &K) -> Option<i64> {
        self.confirmed
            .get(key)
            .or_else(|| self.pending.get(key))
            .copied()
    }

    pub fn record_pending(&mut self, key: K, id: i64) {
        self.pending.insert(key, id);
    }

    pub fn promote(&mut self) {
        self.confirmed.extend(self.pending.drain());
    }

    pub fn discard_pending(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }

    /// Replaces the confirmed view with a fresh read of the table.
    pub fn refresh(&mut self, rows: HashMap<K, i64>) {
        self.confirmed = rows;
    }

    pub fn len(&self) -> usize {
        self.confirmed.len() + self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_entries_are_visible_until_discarded() {
        let mut cache = ExistingRowCache::from_rows(HashMap::from([("a".to_string(), 1)]));
        cache.record_pending("b".to_string(), 2);
        assert_eq!(cache.get(&"a".to_string()), Some(1));
        assert_eq!(cache.get(&"b".to_string()), Some(2));
        assert_eq!(cache.discard_pending(), 1);
        assert_eq!(cache.get(&"b".to_string()), None);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn promote_moves_pending_into_confirmed() {
        let mut cache = ExistingRowCache::default();
        cache.record_pending(7u32, 70);
        cache.promote();
        assert_eq!(cache.pending_len(), 0);
        assert_eq!(cache.discard_pending(), 0);
        assert_eq!(cache.get(&7), Some(70));

        cache.refresh(HashMap::from([(8u32, 80)]));
        assert_eq!(cache.get(&7), None);
        assert_eq!(cache.get(&8), Some(80));
    }
}
