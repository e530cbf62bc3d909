pub mod block_transactions;
pub mod block_window_cache;
pub mod daa;
pub mod ghostdag;
pub mod headers;
pub mod headers_selected_tip;
pub mod pruning;
pub mod reachability;
pub mod relations;
pub mod statuses;
pub mod tips;
pub mod utxo_diffs;
pub mod utxo_multisets;
pub mod utxo_set;
pub mod virtual_state;
