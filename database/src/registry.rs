/// Separator byte between a bucket prefix and the in-bucket key. Bucket
/// names are ASCII so the separator can never appear inside a prefix.
pub const SEPARATOR: u8 = b'/';

/// The registry of persisted buckets. Every store must allocate its prefix
/// here so the full on-disk layout is visible in one place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBucket {
    BlockHeader,
    BlockHeaderCompact,
    BlockBody,
    BlockRelations,
    Reachability,
    ReachabilityReindexRoot,
    Ghostdag,
    GhostdagCompact,
    BlockStatus,
    UtxoDiff,
    Multiset,
    VirtualUtxo,
    VirtualState,
    Tips,
    HeadersSelectedTip,
    PruningPoint,
    PruningUtxoSet,
    PruningUtxoImport,
    DaaAddedBlocks,
}

impl StoreBucket {
    pub const fn name(self) -> &'static [u8] {
        match self {
            StoreBucket::BlockHeader => b"block-header",
            StoreBucket::BlockHeaderCompact => b"block-header-compact",
            StoreBucket::BlockBody => b"block-body",
            StoreBucket::BlockRelations => b"block-relations",
            StoreBucket::Reachability => b"reachability",
            StoreBucket::ReachabilityReindexRoot => b"reachability-reindex-root",
            StoreBucket::Ghostdag => b"ghostdag",
            StoreBucket::GhostdagCompact => b"ghostdag-compact",
            StoreBucket::BlockStatus => b"block-status",
            StoreBucket::UtxoDiff => b"utxo-diff",
            StoreBucket::Multiset => b"multiset",
            StoreBucket::VirtualUtxo => b"virtual-utxo",
            StoreBucket::VirtualState => b"virtual-state",
            StoreBucket::Tips => b"tips",
            StoreBucket::HeadersSelectedTip => b"headers-selected-tip",
            StoreBucket::PruningPoint => b"pruning-point",
            StoreBucket::PruningUtxoSet => b"pruning-utxo-set",
            StoreBucket::PruningUtxoImport => b"pruning-utxo-import",
            StoreBucket::DaaAddedBlocks => b"daa-added-blocks",
        }
    }
}

impl AsRef<[u8]> for StoreBucket {
    fn as_ref(&self) -> &[u8] {
        self.name()
    }
}
