pub mod body_processor;
pub mod header_processor;
pub mod virtual_processor;

use std::sync::atomic::AtomicU64;

/// Counters exposed by the consensus API. `body_counts` tracks blocks whose
/// bodies are currently held, so pruning decrements it.
#[derive(Default)]
pub struct ProcessingCounters {
    pub header_counts: AtomicU64,
    pub body_counts: AtomicU64,
}
