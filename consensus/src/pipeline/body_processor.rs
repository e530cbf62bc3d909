use crate::errors::{BlockProcessResult, RuleError};
use crate::model::stores::{
    block_transactions::{BlockTransactionsStoreReader, DbBlockTransactionsStore},
    statuses::{DbStatusesStore, StatusesStoreReader},
};
use crate::params::Params;
use crate::pipeline::ProcessingCounters;
use crate::processes::coinbase::CoinbaseManager;
use crate::processes::transaction_validator::TransactionValidator;
use parking_lot::RwLock;
use rocksdb::WriteBatch;
use sedra_consensus_core::block::Block;
use sedra_consensus_core::blockstatus::BlockStatus::{self, StatusUTXOPendingVerification};
use sedra_consensus_core::hashing;
use sedra_consensus_core::tx::COINBASE_TRANSACTION_INDEX;
use sedra_database::prelude::DB;
use sedra_hashes::Hash;
use std::collections::HashSet;
use std::sync::{atomic::Ordering, Arc};

/// Validates block bodies in isolation and stores them, moving blocks from
/// header-only to pending UTXO verification.
pub struct BlockBodyProcessor {
    max_block_txs: usize,

    db: Arc<DB>,
    statuses_store: Arc<RwLock<DbStatusesStore>>,
    block_transactions_store: Arc<DbBlockTransactionsStore>,
    coinbase_manager: CoinbaseManager,
    transaction_validator: TransactionValidator,
    counters: Arc<ProcessingCounters>,
}

impl BlockBodyProcessor {
    pub fn new(
        params: &Params,
        db: Arc<DB>,
        statuses_store: Arc<RwLock<DbStatusesStore>>,
        block_transactions_store: Arc<DbBlockTransactionsStore>,
        coinbase_manager: CoinbaseManager,
        transaction_validator: TransactionValidator,
        counters: Arc<ProcessingCounters>,
    ) -> Self {
        Self {
            max_block_txs: params.max_block_txs,
            db,
            statuses_store,
            block_transactions_store,
            coinbase_manager,
            transaction_validator,
            counters,
        }
    }

    pub fn block_has_body(&self, hash: Hash) -> bool {
        self.block_transactions_store.has(hash).unwrap()
    }

    /// Validates the body against its (already admitted) header and stores
    /// it. The UTXO-contextual validation is deferred to virtual processing.
    pub fn process_body(&self, block: &Block) -> BlockProcessResult<BlockStatus> {
        let status =
            self.statuses_store.read().get_option(block.hash()).expect("the header must be processed before the body");
        if !status.is_valid() {
            return Err(RuleError::KnownInvalid);
        }
        if status.has_block_body() {
            return Ok(status);
        }

        self.validate_body_in_isolation(block)?;

        let mut batch = WriteBatch::default();
        self.block_transactions_store.insert_batch(&mut batch, block.hash(), block.transactions.clone()).unwrap();
        self.statuses_store.read().set_batch(&mut batch, block.hash(), StatusUTXOPendingVerification).unwrap();
        self.db.write(batch).unwrap();

        self.counters.body_counts.fetch_add(1, Ordering::Relaxed);
        Ok(StatusUTXOPendingVerification)
    }

    /// Stores a body without isolation checks beyond the merkle commitment.
    /// Used for the pruning point body received during sync, whose validity
    /// is attested by the imported UTXO commitment.
    pub fn process_trusted_body(&self, block: &Block, status: BlockStatus) -> BlockProcessResult<()> {
        self.check_merkle_root(block)?;
        let mut batch = WriteBatch::default();
        self.block_transactions_store.insert_batch(&mut batch, block.hash(), block.transactions.clone()).unwrap();
        self.statuses_store.read().set_batch(&mut batch, block.hash(), status).unwrap();
        self.db.write(batch).unwrap();
        self.counters.body_counts.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Reverts a stored body after its block failed virtual resolution,
    /// restoring the invariant that rejected blocks leave no state behind
    pub fn rollback_body(&self, hash: Hash, new_status: BlockStatus) {
        let mut batch = WriteBatch::default();
        self.block_transactions_store.delete_batch(&mut batch, hash).unwrap();
        self.statuses_store.read().set_batch(&mut batch, hash, new_status).unwrap();
        self.db.write(batch).unwrap();
        self.counters.body_counts.fetch_sub(1, Ordering::Relaxed);
    }

    fn check_merkle_root(&self, block: &Block) -> BlockProcessResult<()> {
        let computed = sedra_merkle::calc_merkle_root(block.transactions.iter().map(hashing::tx::hash));
        if block.header.hash_merkle_root != computed {
            return Err(RuleError::BadMerkleRoot(block.header.hash_merkle_root, computed));
        }
        Ok(())
    }

    fn validate_body_in_isolation(&self, block: &Block) -> BlockProcessResult<()> {
        if block.transactions.is_empty() {
            return Err(RuleError::NoTransactions);
        }
        if block.transactions.len() > self.max_block_txs {
            return Err(RuleError::TooManyTransactions(block.transactions.len(), self.max_block_txs));
        }
        if !block.transactions[COINBASE_TRANSACTION_INDEX].is_coinbase() {
            return Err(RuleError::FirstTxNotCoinbase);
        }
        for (i, tx) in block.transactions.iter().enumerate().skip(1) {
            if tx.is_coinbase() {
                return Err(RuleError::MultipleCoinbases(i));
            }
        }

        // The coinbase payload must decode, and the subsidy it commits (the
        // amount a future merging block will pay this block's miner) must be
        // exactly the schedule amount
        let coinbase_data =
            self.coinbase_manager.deserialize_coinbase_payload(&block.transactions[COINBASE_TRANSACTION_INDEX].payload)?;
        if coinbase_data.subsidy != self.coinbase_manager.calc_block_subsidy(block.header.daa_score) {
            return Err(RuleError::BadCoinbasePayload);
        }

        self.check_merkle_root(block)?;

        let mut ids = HashSet::with_capacity(block.transactions.len());
        for tx in block.transactions.iter() {
            if !ids.insert(tx.id()) {
                return Err(RuleError::DuplicateTransaction(tx.id()));
            }
            if !tx.is_coinbase() {
                self.transaction_validator.validate_tx_in_isolation(tx).map_err(|e| RuleError::InvalidTransaction(tx.id(), e))?;
            }
        }

        Ok(())
    }
}
