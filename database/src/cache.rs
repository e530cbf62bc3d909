use parking_lot::RwLock;
use rand::Rng;
use std::{collections::HashMap, hash::Hash, sync::Arc};

/// A concurrent bounded cache with random eviction. Random eviction keeps
/// insertion O(1) and is resilient to adversarial access patterns which
/// degrade recency-based policies.
#[derive(Clone)]
pub struct Cache<TKey: Clone + Hash + Eq + Send + Sync, TData: Clone + Send + Sync> {
    map: Arc<RwLock<HashMap<TKey, TData>>>,
    size: usize,
}

impl<TKey: Clone + Hash + Eq + Send + Sync, TData: Clone + Send + Sync> Cache<TKey, TData> {
    pub fn new(size: u64) -> Self {
        Self { map: Arc::new(RwLock::new(HashMap::with_capacity(size as usize))), size: size as usize }
    }

    pub fn get(&self, key: &TKey) -> Option<TData> {
        self.map.read().get(key).cloned()
    }

    pub fn contains_key(&self, key: &TKey) -> bool {
        self.map.read().contains_key(key)
    }

    pub fn insert(&self, key: TKey, data: TData) {
        if self.size == 0 {
            return;
        }
        let mut write_guard = self.map.write();
        if write_guard.len() == self.size && !write_guard.contains_key(&key) {
            let random_key = write_guard.keys().nth(rand::thread_rng().gen_range(0..self.size)).unwrap().clone();
            write_guard.remove(&random_key);
        }
        write_guard.insert(key, data);
    }

    pub fn remove(&self, key: &TKey) -> Option<TData> {
        self.map.write().remove(key)
    }

    pub fn remove_many(&self, keys: &mut impl Iterator<Item = TKey>) {
        let mut write_guard = self.map.write();
        for key in keys {
            write_guard.remove(&key);
        }
    }

    pub fn remove_all(&self) {
        self.map.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounded_insertion() {
        let cache: Cache<u64, u64> = Cache::new(4);
        for i in 0..64 {
            cache.insert(i, i * 10);
        }
        let present = (0..64).filter(|i| cache.contains_key(i)).count();
        assert_eq!(present, 4);
    }

    #[test]
    fn test_zero_size_is_passthrough() {
        let cache: Cache<u64, u64> = Cache::new(0);
        cache.insert(1, 1);
        assert_eq!(cache.get(&1), None);
    }
}
