use crate::model::stores::block_window_cache::BlockWindowHeap;
use crate::model::stores::headers::HeaderStoreReader;
use std::sync::Arc;

/// Computes the median timestamp over a block window. Used as the lower
/// bound a new block's timestamp must exceed.
#[derive(Clone)]
pub struct PastMedianTimeManager<T: HeaderStoreReader> {
    headers_store: Arc<T>,
    genesis_timestamp: u64,
}

impl<T: HeaderStoreReader> PastMedianTimeManager<T> {
    pub fn new(headers_store: Arc<T>, genesis_timestamp: u64) -> Self {
        Self { headers_store, genesis_timestamp }
    }

    pub fn calc_past_median_time(&self, window: &BlockWindowHeap) -> u64 {
        if window.is_empty() {
            return self.genesis_timestamp;
        }
        let mut timestamps: Vec<u64> =
            window.iter().map(|item| self.headers_store.get_timestamp(item.0.hash).unwrap()).collect();
        timestamps.sort_unstable();
        timestamps[timestamps.len() / 2]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::stores::headers::{HeaderStore, MemoryHeadersStore};
    use crate::processes::traversal::WindowBlock;
    use sedra_consensus_core::header::Header;
    use std::cmp::Reverse;

    #[test]
    fn test_median_selection() {
        let headers = Arc::new(MemoryHeadersStore::new());
        let mut window = BlockWindowHeap::new();
        for (i, ts) in [100u64, 50, 150, 75, 125].into_iter().enumerate() {
            let hash = sedra_hashes::Hash::from_u64(i as u64 + 1);
            let mut header = Header::from_precomputed_hash(hash, vec![]);
            header.timestamp = ts;
            headers.insert(hash, Arc::new(header)).unwrap();
            window.push(Reverse(WindowBlock { hash, blue_score: i as u64 }));
        }

        let manager = PastMedianTimeManager::new(headers, 0);
        assert_eq!(manager.calc_past_median_time(&window), 100);
        assert_eq!(manager.calc_past_median_time(&BlockWindowHeap::new()), 0);
    }
}
