use crate::constants::BLOCK_VERSION;
use crate::processes::coinbase::{CoinbaseData, CoinbaseManager, MinerData};
use sedra_consensus_core::block::Block;
use sedra_consensus_core::header::Header;
use sedra_consensus_core::subnets::SUBNETWORK_ID_COINBASE;
use sedra_consensus_core::tx::{ScriptPublicKey, Transaction};
use sedra_consensus_core::KType;
use sedra_hashes::Hash;

/// The defining data of the genesis block. The genesis hash is derived, not
/// stored, so that parameter changes can never drift from the actual block.
#[derive(Clone)]
pub struct GenesisBlock {
    pub version: u16,
    pub timestamp: u64,
    pub bits: u32,
    pub nonce: u64,
    pub coinbase_payload: &'static [u8],
}

impl GenesisBlock {
    /// Builds the concrete genesis block: a parentless header over a single
    /// output-less coinbase, committing to an empty UTXO set. The coinbase
    /// payload is a well-formed zero-reward payload carrying the network tag
    /// as extra data.
    pub fn build(&self) -> Block {
        let payload = CoinbaseManager::serialize_coinbase_payload(&CoinbaseData {
            blue_score: 0,
            subsidy: 0,
            miner_data: MinerData::new(ScriptPublicKey::default(), self.coinbase_payload.to_vec()),
        });
        let coinbase = Transaction::new(0, vec![], vec![], 0, SUBNETWORK_ID_COINBASE, 0, payload);
        let hash_merkle_root = sedra_merkle::calc_merkle_root(std::iter::once(sedra_consensus_core::hashing::tx::hash(&coinbase)));
        let header = Header::new(
            self.version,
            vec![],
            hash_merkle_root,
            Hash::default(),
            sedra_muhash::MuHash::new().finalize(),
            self.timestamp,
            self.bits,
            self.nonce,
            0,
        );
        Block::new(header, vec![coinbase])
    }
}

#[derive(Clone)]
pub struct Params {
    pub genesis: GenesisBlock,
    pub ghostdag_k: KType,
    /// Timestamp deviation tolerance, in blocks
    pub timestamp_deviation_tolerance: u64,
    /// Target duration of a block, in milliseconds
    pub target_time_per_block: u64,
    pub max_block_parents: u8,
    pub difficulty_window_size: usize,
    pub mergeset_size_limit: u64,
    /// Duration of a finality window, in milliseconds
    pub finality_duration: u64,
    pub coinbase_maturity: u64,
    pub max_coinbase_payload_len: usize,
    pub max_tx_inputs: usize,
    pub max_tx_outputs: usize,
    pub max_signature_script_len: usize,
    pub max_script_public_key_len: usize,
    pub max_block_sig_ops: usize,
    pub max_block_txs: usize,
    pub base_subsidy: u64,
    pub skip_proof_of_work: bool,
}

impl Params {
    /// Number of blocks in a finality window
    pub fn finality_depth(&self) -> u64 {
        self.finality_duration / self.target_time_per_block
    }

    /// The selected-chain depth below the virtual after which history may be
    /// discarded. Derived so that any block violating finality is guaranteed
    /// to be below it: two finality windows plus the maximal anticone
    /// carried by merging blocks.
    pub fn pruning_depth(&self) -> u64 {
        2 * self.finality_depth() + 4 * self.mergeset_size_limit * self.ghostdag_k as u64 + 2 * self.ghostdag_k as u64 + 2
    }

    /// Size of the past-median-time window
    pub fn median_time_window_size(&self) -> usize {
        (2 * self.timestamp_deviation_tolerance - 1) as usize
    }

    /// Clones the params with `skip_proof_of_work = true`. For tests only.
    pub fn clone_with_skip_pow(&self) -> Self {
        let mut cloned_params = self.clone();
        cloned_params.skip_proof_of_work = true;
        cloned_params
    }
}

const DEFAULT_GHOSTDAG_K: KType = 18;

pub const MAINNET_PARAMS: Params = Params {
    genesis: GenesisBlock {
        version: BLOCK_VERSION,
        timestamp: 1637609671037,
        bits: 486722099,
        nonce: 0x3392c,
        coinbase_payload: b"sedra-mainnet",
    },
    ghostdag_k: DEFAULT_GHOSTDAG_K,
    timestamp_deviation_tolerance: 132,
    target_time_per_block: 1000,
    max_block_parents: 10,
    difficulty_window_size: 2641,
    mergeset_size_limit: (DEFAULT_GHOSTDAG_K as u64) * 10,
    finality_duration: 86_400_000,
    coinbase_maturity: 100,
    max_coinbase_payload_len: 204,
    max_tx_inputs: 10_000,
    max_tx_outputs: 10_000,
    max_signature_script_len: 10_000,
    max_script_public_key_len: 10_000,
    max_block_sig_ops: 20_000,
    max_block_txs: 10_000,
    base_subsidy: 50_000_000_000,
    skip_proof_of_work: false,
};

/// Simnet: maximal target so that every nonce practically solves the block,
/// and a small difficulty window to keep tests fast
pub const SIMNET_PARAMS: Params = Params {
    genesis: GenesisBlock {
        version: BLOCK_VERSION,
        timestamp: 1637609671037,
        bits: 0x207fffff,
        nonce: 0,
        coinbase_payload: b"sedra-simnet",
    },
    ghostdag_k: DEFAULT_GHOSTDAG_K,
    timestamp_deviation_tolerance: 132,
    target_time_per_block: 1000,
    max_block_parents: 10,
    difficulty_window_size: 264,
    mergeset_size_limit: (DEFAULT_GHOSTDAG_K as u64) * 10,
    finality_duration: 86_400_000,
    coinbase_maturity: 100,
    max_coinbase_payload_len: 204,
    max_tx_inputs: 10_000,
    max_tx_outputs: 10_000,
    max_signature_script_len: 10_000,
    max_script_public_key_len: 10_000,
    max_block_sig_ops: 20_000,
    max_block_txs: 10_000,
    base_subsidy: 50_000_000_000,
    skip_proof_of_work: false,
};

pub const DEVNET_PARAMS: Params = Params {
    genesis: GenesisBlock {
        version: BLOCK_VERSION,
        timestamp: 1637609671037,
        bits: 0x1e21bc1c,
        nonce: 0,
        coinbase_payload: b"sedra-devnet",
    },
    ghostdag_k: DEFAULT_GHOSTDAG_K,
    timestamp_deviation_tolerance: 132,
    target_time_per_block: 1000,
    max_block_parents: 10,
    difficulty_window_size: 2641,
    mergeset_size_limit: (DEFAULT_GHOSTDAG_K as u64) * 10,
    finality_duration: 86_400_000,
    coinbase_maturity: 100,
    max_coinbase_payload_len: 204,
    max_tx_inputs: 10_000,
    max_tx_outputs: 10_000,
    max_signature_script_len: 10_000,
    max_script_public_key_len: 10_000,
    max_block_sig_ops: 20_000,
    max_block_txs: 10_000,
    base_subsidy: 50_000_000_000,
    skip_proof_of_work: false,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pruning_depth_for_tiny_finality() {
        // finality window of two blocks with k=0 gives a pruning depth of 6
        let mut params = SIMNET_PARAMS.clone();
        params.finality_duration = 2 * params.target_time_per_block;
        params.ghostdag_k = 0;
        assert_eq!(params.finality_depth(), 2);
        assert_eq!(params.pruning_depth(), 6);
    }

    #[test]
    fn test_genesis_build_is_stable() {
        let a = MAINNET_PARAMS.genesis.build();
        let b = MAINNET_PARAMS.genesis.build();
        assert_eq!(a.hash(), b.hash());
        assert_ne!(a.hash(), SIMNET_PARAMS.genesis.build().hash());
        assert_eq!(a.transactions.len(), 1);
        assert!(a.transactions[0].is_coinbase());
    }
}
