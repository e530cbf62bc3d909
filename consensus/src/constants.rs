pub use sedra_consensus_core::wire::{BLOCK_VERSION, TX_VERSION};

/// The base unit granularity of the currency
pub const COIN: u64 = 100_000_000;

/// An upper bound on total supply, used for overflow sanity checks
pub const MAX_MONEY: u64 = 21_000_000_000 * COIN;

/// `lock_time` values below this threshold are interpreted as a blue score,
/// values at or above it as a unix timestamp in milliseconds
pub const LOCK_TIME_THRESHOLD: u64 = 500_000_000_000;

/// Sequence value disabling lock-time enforcement for an input
pub const SEQUENCE_LOCK_TIME_DISABLED: u64 = u64::MAX;

pub mod perf {
    //! Performance-tuning constants with no consensus meaning

    pub const DEFAULT_REINDEX_DEPTH: u64 = 100;
    pub const DEFAULT_REINDEX_SLACK: u64 = 1 << 12;

    pub const DEFAULT_CACHE_SIZE: u64 = 100_000;
    pub const UTXO_CACHE_SIZE: u64 = 10_000;
    pub const BLOCK_WINDOW_CACHE_SIZE: u64 = 2_000;
}
