use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockStatus {
    /// The block is invalid
    StatusInvalid,

    /// The block is valid from any UTXO-related aspect and its UTXO state
    /// was fully verified as part of the virtual selected chain
    StatusUTXOValid,

    /// The block body is valid but its UTXO state was not verified yet,
    /// since it is not (yet) on the virtual selected chain
    StatusUTXOPendingVerification,

    /// The block is disqualified from being a chain block: its own UTXO
    /// verification failed
    StatusDisqualifiedFromChain,

    /// Only the header of this block was validated and admitted
    StatusHeaderOnly,
}

impl BlockStatus {
    pub fn has_block_body(self) -> bool {
        matches!(
            self,
            BlockStatus::StatusUTXOValid | BlockStatus::StatusUTXOPendingVerification | BlockStatus::StatusDisqualifiedFromChain
        )
    }

    pub fn is_utxo_valid_or_pending(self) -> bool {
        matches!(self, BlockStatus::StatusUTXOValid | BlockStatus::StatusUTXOPendingVerification)
    }

    pub fn is_valid(self) -> bool {
        self != BlockStatus::StatusInvalid
    }
}
