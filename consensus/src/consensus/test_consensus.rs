use super::Consensus;
use crate::errors::BlockProcessResult;
use crate::params::Params;
use crate::processes::coinbase::MinerData;
use crate::processes::difficulty::target_from_bits;
use sedra_consensus_core::block::Block;
use sedra_consensus_core::blockstatus::BlockStatus;
use sedra_consensus_core::tx::Transaction;
use sedra_database::prelude::{create_temp_db, TempDbLifetime};
use sedra_math::Uint256;
use sedra_txscript::standard::op_true_script;
use std::ops::Deref;
use std::sync::Arc;

/// A self-contained consensus over a temp database, with mining helpers.
/// For test purposes only.
pub struct TestConsensus {
    pub consensus: Arc<Consensus>,
    miner_data: MinerData,
    _db_lifetime: TempDbLifetime,
}

impl TestConsensus {
    pub fn new(params: &Params) -> Self {
        let (db_lifetime, db) = create_temp_db();
        Self {
            consensus: Arc::new(Consensus::new(db, params)),
            miner_data: MinerData::new(op_true_script(), Vec::new()),
            _db_lifetime: db_lifetime,
        }
    }

    pub fn with_miner_tag(params: &Params, tag: &[u8]) -> Self {
        let mut this = Self::new(params);
        this.miner_data = MinerData::new(op_true_script(), tag.to_vec());
        this
    }

    /// Searches a nonce satisfying the block's own difficulty target
    pub fn solve_block(&self, mut block: Block) -> Block {
        let target = target_from_bits(block.header.bits).expect("tests use solvable bits");
        let mut header = (*block.header).clone();
        loop {
            if Uint256::from_le_bytes(header.hash.as_bytes()) <= target {
                block.header = Arc::new(header);
                return block;
            }
            header.nonce += 1;
            header.finalize();
        }
    }

    pub fn build_and_solve_block_with_txs(&self, txs: Vec<Transaction>) -> BlockProcessResult<Block> {
        let template = self.consensus.build_block_template(self.miner_data.clone(), txs)?;
        Ok(self.solve_block(template))
    }

    /// Mines the next block over the current virtual and inserts it
    pub fn mine_next_block(&self) -> BlockProcessResult<Block> {
        let block = self.build_and_solve_block_with_txs(Vec::new())?;
        self.consensus.validate_and_insert_block(block.clone())?;
        Ok(block)
    }

    pub fn mine_chain(&self, length: usize) -> BlockProcessResult<Vec<Block>> {
        (0..length).map(|_| self.mine_next_block()).collect()
    }
}

impl Deref for TestConsensus {
    type Target = Consensus;

    fn deref(&self) -> &Self::Target {
        &self.consensus
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::RuleError;
    use crate::params::SIMNET_PARAMS;
    use sedra_consensus_core::header::Header;
    use sedra_consensus_core::tx::{TransactionInput, TransactionOutpoint, TransactionOutput};
    use sedra_consensus_core::subnets::SUBNETWORK_ID_NATIVE;

    fn fast_params() -> Params {
        let mut params = SIMNET_PARAMS.clone();
        params.coinbase_maturity = 2;
        params
    }

    #[test]
    fn test_chain_growth_and_selected_tip() {
        let consensus = TestConsensus::new(&fast_params());
        let blocks = consensus.mine_chain(10).unwrap();

        assert_eq!(consensus.get_selected_tip_hash(), blocks.last().unwrap().hash());
        assert_eq!(consensus.get_block_count(), 11); // genesis included
        assert_eq!(consensus.get_header_count(), 11);

        // The virtual sits one blue score above the tip of a pure chain
        let state = consensus.get_virtual_state();
        assert_eq!(state.ghostdag_data.blue_score, 11);
        assert!(consensus.is_in_selected_parent_chain(blocks[3].hash()).unwrap());
    }

    #[test]
    fn test_parallel_tips_converge_deterministically() {
        let consensus = TestConsensus::new(&fast_params());

        // Three competing siblings over genesis, distinguished by miner tag
        let siblings: Vec<Block> = (0u8..3)
            .map(|i| {
                let miner = MinerData::new(op_true_script(), vec![i]);
                let template = consensus.build_block_template(miner, vec![]).unwrap();
                consensus.solve_block(template)
            })
            .collect();
        for block in siblings.iter() {
            consensus.validate_and_insert_block(block.clone()).unwrap();
        }

        let state = consensus.get_virtual_state();
        assert_eq!(state.parents.len(), 3);

        // The selected tip among equal-work siblings is the highest hash
        let expected = siblings.iter().map(|b| b.hash()).max().unwrap();
        assert_eq!(consensus.get_selected_tip_hash(), expected);

        // A merging block turns all siblings into its past
        let merging = consensus.mine_next_block().unwrap();
        assert_eq!(merging.header.parents.len(), 3);
        assert_eq!(consensus.get_virtual_state().parents, vec![merging.hash()]);
    }

    #[test]
    fn test_coinbase_spend_and_double_spend() {
        let consensus = TestConsensus::new(&fast_params());
        // The first block merges only the genesis, so its coinbase carries
        // no reward outputs; the second block's coinbase pays the first
        // block's miner
        let first = consensus.mine_next_block().unwrap();
        assert!(first.transactions[0].outputs.is_empty());
        let second = consensus.mine_next_block().unwrap();
        assert_eq!(second.transactions[0].outputs.len(), 1);
        let coinbase_id = second.transactions[0].id();

        // The rewarding coinbase is accepted by its chain child; mine past
        // the maturity window
        consensus.mine_chain(3).unwrap();

        let outpoint = TransactionOutpoint::new(coinbase_id, 0);
        let entry = consensus.get_virtual_utxo(&outpoint).expect("the coinbase output must be in the virtual utxo set");

        let spend = Transaction::new(
            0,
            vec![TransactionInput::new(outpoint, vec![], 0)],
            vec![TransactionOutput::new(entry.amount - 1000, op_true_script())],
            0,
            SUBNETWORK_ID_NATIVE,
            0,
            vec![],
        );

        let block = consensus.build_and_solve_block_with_txs(vec![spend.clone()]).unwrap();
        consensus.validate_and_insert_block(block).unwrap();

        // The spend is now accepted by the virtual and reflected in its
        // UTXO set
        let state = consensus.get_virtual_state();
        assert!(state.accepted_tx_ids.contains(&spend.id()));
        assert!(consensus.get_virtual_utxo(&outpoint).is_none());
        assert!(consensus.get_virtual_utxo(&TransactionOutpoint::new(spend.id(), 0)).is_some());

        // Spending the same outpoint again is rejected
        let double_spend = Transaction::new(
            0,
            vec![TransactionInput::new(outpoint, vec![], 0)],
            vec![TransactionOutput::new(100, op_true_script())],
            0,
            SUBNETWORK_ID_NATIVE,
            0,
            vec![],
        );
        let block = consensus.build_and_solve_block_with_txs(vec![double_spend]).unwrap();
        assert!(matches!(
            consensus.validate_and_insert_block(block),
            Err(RuleError::InvalidTransactionsInUtxoContext(1))
        ));
    }

    #[test]
    fn test_bad_utxo_commitment_rejected() {
        let consensus = TestConsensus::new(&fast_params());
        consensus.mine_chain(2).unwrap();

        let template = consensus.build_block_template(MinerData::new(op_true_script(), vec![]), vec![]).unwrap();
        let mut header: Header = (*template.header).clone();
        header.utxo_commitment = 12345.into();
        header.finalize();
        let block = consensus.solve_block(Block::new(header, (*template.transactions).clone()));

        assert!(matches!(consensus.validate_and_insert_block(block), Err(RuleError::BadUTXOCommitment(_, _))));
        // Consensus state is unaffected by the rejected block
        assert_eq!(consensus.get_block_count(), 3);
    }

    #[test]
    fn test_missing_parents_reported() {
        let consensus = TestConsensus::new(&fast_params());
        let template = consensus.build_block_template(MinerData::new(op_true_script(), vec![]), vec![]).unwrap();
        let mut header: Header = (*template.header).clone();
        header.parents = vec![777.into()];
        header.finalize();
        let block = consensus.solve_block(Block::new(header, (*template.transactions).clone()));

        match consensus.validate_and_insert_block(block) {
            Err(RuleError::MissingParents(missing)) => assert_eq!(missing, vec![777.into()]),
            other => panic!("expected missing parents, got {other:?}"),
        }
    }

    #[test]
    fn test_pruning_depth_cutoff() {
        let mut params = fast_params();
        // A finality window of two blocks with k=0 yields pruning depth 6
        params.finality_duration = 2 * params.target_time_per_block;
        params.ghostdag_k = 0;
        let consensus = TestConsensus::new(&params);

        let blocks = consensus.mine_chain(20).unwrap();

        // Bodies below the pruning point were discarded while headers remain
        assert!(consensus.get_block_count() < consensus.get_header_count());
        assert_eq!(consensus.get_header_count(), 21);

        let pruning_point = consensus.pruning_point();
        assert_ne!(pruning_point, consensus.genesis_hash());
        // Virtual blue score is 21, so the pruning point sits at blue score 15
        assert_eq!(pruning_point, blocks[14].hash());

        // A pruned block: header available, body gone
        let pruned = blocks[2].hash();
        assert!(consensus.get_block_header(pruned).is_ok());
        assert!(matches!(consensus.get_block(pruned), Err(RuleError::MissingBlockBody(_))));
        assert_eq!(consensus.get_block_status(pruned), Some(BlockStatus::StatusHeaderOnly));

        // Blocks above the pruning point keep their bodies
        assert!(consensus.get_block(blocks[18].hash()).is_ok());
    }

    #[test]
    fn test_block_statuses_through_lifecycle() {
        let consensus = TestConsensus::new(&fast_params());
        let block = consensus.mine_next_block().unwrap();
        assert_eq!(consensus.get_block_status(block.hash()), Some(BlockStatus::StatusUTXOValid));
        assert_eq!(consensus.get_block_status(consensus.genesis_hash()), Some(BlockStatus::StatusUTXOValid));

        // A header-only insertion stays header-only
        let template = consensus.build_block_template(MinerData::new(op_true_script(), vec![9]), vec![]).unwrap();
        let solved = consensus.solve_block(template);
        let header_only = Block::from_header_arc(solved.header.clone());
        consensus.validate_and_insert_block(header_only).unwrap();
        assert_eq!(consensus.get_block_status(solved.hash()), Some(BlockStatus::StatusHeaderOnly));

        // Completing the body upgrades it
        consensus.validate_and_insert_block(solved.clone()).unwrap();
        assert!(consensus.get_block_status(solved.hash()).unwrap().has_block_body());
    }
}
