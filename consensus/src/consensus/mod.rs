pub mod test_consensus;

use crate::constants::perf;
use crate::errors::{BlockProcessResult, RuleError};
use crate::model::services::reachability::{MTReachabilityService, ReachabilityService};
use crate::model::services::relations::MTRelationsService;
use crate::model::stores::{
    block_transactions::{BlockTransactionsStoreReader, DbBlockTransactionsStore},
    block_window_cache::BlockWindowCacheStore,
    daa::DbDaaStore,
    ghostdag::{DbGhostdagStore, GhostdagStoreReader},
    headers::{DbHeadersStore, HeaderStoreReader},
    headers_selected_tip::{DbHeadersSelectedTipStore, HeadersSelectedTipStoreReader},
    pruning::{DbPruningStore, PruningStoreReader},
    reachability::DbReachabilityStore,
    relations::DbRelationsStore,
    statuses::{DbStatusesStore, StatusesStoreReader},
    tips::DbTipsStore,
    utxo_diffs::DbUtxoDiffsStore,
    utxo_multisets::DbUtxoMultisetsStore,
    utxo_set::DbUtxoSetStore,
    virtual_state::{DbVirtualStateStore, VirtualState, VirtualStateStoreReader},
};
use crate::params::Params;
use crate::pipeline::body_processor::BlockBodyProcessor;
use crate::pipeline::header_processor::{unix_now, HeaderProcessor};
use crate::pipeline::virtual_processor::VirtualStateProcessor;
use crate::pipeline::ProcessingCounters;
use crate::processes::block_locator::{BlockLocator, BlockLocatorManager};
use crate::processes::coinbase::{CoinbaseManager, MinerData};
use crate::processes::difficulty::DifficultyManager;
use crate::processes::ghostdag::protocol::GhostdagManager;
use crate::processes::past_median_time::PastMedianTimeManager;
use crate::processes::pruning::PruningPointManager;
use crate::processes::transaction_validator::TransactionValidator;
use crate::processes::traversal::DagTraversalManager;
use parking_lot::RwLock;
use sedra_consensus_core::block::Block;
use sedra_consensus_core::blockstatus::BlockStatus;
use sedra_consensus_core::hashing;
use sedra_consensus_core::header::Header;
use sedra_consensus_core::tx::{Transaction, TransactionOutpoint, UtxoEntry};
use sedra_consensus_core::utxo::utxo_view::UtxoView;
use sedra_database::prelude::{StoreBucket, DB};
use sedra_hashes::Hash;
use sedra_muhash::MuHash;
use std::sync::{atomic::Ordering, Arc};

/// The consensus core: owns all stores and processors behind a single
/// coarse read-write lock. Block acceptance, pruning advances and UTXO-set
/// imports serialize on the write side; all queries run concurrently on the
/// read side.
pub struct Consensus {
    // The coarse consensus session lock
    lock: RwLock<()>,

    pub params: Params,
    genesis: Block,

    // Stores
    statuses_store: Arc<RwLock<DbStatusesStore>>,
    ghostdag_store: Arc<DbGhostdagStore>,
    headers_store: Arc<DbHeadersStore>,
    block_transactions_store: Arc<DbBlockTransactionsStore>,
    pruning_store: Arc<RwLock<DbPruningStore>>,
    headers_selected_tip_store: Arc<RwLock<DbHeadersSelectedTipStore>>,
    virtual_state_store: Arc<RwLock<DbVirtualStateStore>>,
    virtual_utxo_store: Arc<DbUtxoSetStore>,

    // Processors
    header_processor: HeaderProcessor,
    body_processor: BlockBodyProcessor,
    virtual_processor: VirtualStateProcessor,

    // Services and managers
    reachability_service: MTReachabilityService<DbReachabilityStore>,
    block_locator_manager: BlockLocatorManager<DbGhostdagStore, BlockWindowCacheStore>,
    coinbase_manager: CoinbaseManager,

    // Counters
    pub counters: Arc<ProcessingCounters>,
}

impl Consensus {
    pub fn new(db: Arc<DB>, params: &Params) -> Self {
        let params = params.clone();
        let genesis = params.genesis.build();
        let genesis_hash = genesis.hash();

        // Stores
        let statuses_store = Arc::new(RwLock::new(DbStatusesStore::new(db.clone(), perf::DEFAULT_CACHE_SIZE)));
        let relations_store = Arc::new(RwLock::new(DbRelationsStore::new(db.clone(), perf::DEFAULT_CACHE_SIZE)));
        let reachability_store = Arc::new(RwLock::new(DbReachabilityStore::new(db.clone(), perf::DEFAULT_CACHE_SIZE)));
        let ghostdag_store = Arc::new(DbGhostdagStore::new(db.clone(), perf::DEFAULT_CACHE_SIZE));
        let headers_store = Arc::new(DbHeadersStore::new(db.clone(), perf::DEFAULT_CACHE_SIZE));
        let daa_store = Arc::new(DbDaaStore::new(db.clone(), perf::DEFAULT_CACHE_SIZE));
        let block_transactions_store = Arc::new(DbBlockTransactionsStore::new(db.clone(), perf::DEFAULT_CACHE_SIZE));
        let pruning_store = Arc::new(RwLock::new(DbPruningStore::new(db.clone())));
        let headers_selected_tip_store = Arc::new(RwLock::new(DbHeadersSelectedTipStore::new(db.clone())));
        let tips_store = Arc::new(RwLock::new(DbTipsStore::new(db.clone())));
        let utxo_diffs_store = Arc::new(DbUtxoDiffsStore::new(db.clone(), perf::DEFAULT_CACHE_SIZE));
        let utxo_multisets_store = Arc::new(DbUtxoMultisetsStore::new(db.clone(), perf::DEFAULT_CACHE_SIZE));
        let virtual_utxo_store = Arc::new(DbUtxoSetStore::new(db.clone(), perf::UTXO_CACHE_SIZE, StoreBucket::VirtualUtxo));
        let pruning_utxo_store = Arc::new(DbUtxoSetStore::new(db.clone(), 0, StoreBucket::PruningUtxoSet));
        let pruning_import_store = Arc::new(DbUtxoSetStore::new(db.clone(), 0, StoreBucket::PruningUtxoImport));
        let virtual_state_store = Arc::new(RwLock::new(DbVirtualStateStore::new(db.clone())));
        let block_window_cache_for_difficulty = Arc::new(BlockWindowCacheStore::new(perf::BLOCK_WINDOW_CACHE_SIZE));
        let block_window_cache_for_past_median_time = Arc::new(BlockWindowCacheStore::new(perf::BLOCK_WINDOW_CACHE_SIZE));

        // Services and managers
        let reachability_service = MTReachabilityService::new(reachability_store.clone());
        let relations_service = MTRelationsService::new(relations_store.clone());
        let ghostdag_manager = GhostdagManager::new(
            genesis_hash,
            params.ghostdag_k,
            ghostdag_store.clone(),
            relations_service,
            headers_store.clone(),
            reachability_service.clone(),
        );
        let dag_traversal_manager =
            DagTraversalManager::new(genesis_hash, ghostdag_store.clone(), block_window_cache_for_difficulty.clone());
        let difficulty_manager = DifficultyManager::new(
            headers_store.clone(),
            params.genesis.bits,
            params.difficulty_window_size,
            params.target_time_per_block,
        );
        let past_median_time_manager = PastMedianTimeManager::new(headers_store.clone(), params.genesis.timestamp);
        let coinbase_manager = CoinbaseManager::new(params.base_subsidy, params.max_coinbase_payload_len);
        let transaction_validator = TransactionValidator::new(&params);
        let pruning_manager =
            PruningPointManager::new(genesis_hash, params.pruning_depth(), ghostdag_store.clone(), dag_traversal_manager.clone());
        let block_locator_manager =
            BlockLocatorManager::new(genesis_hash, ghostdag_store.clone(), dag_traversal_manager.clone());

        let counters = Arc::new(ProcessingCounters::default());

        // Processors
        let header_processor = HeaderProcessor::new(
            &params,
            genesis_hash,
            db.clone(),
            relations_store.clone(),
            reachability_store.clone(),
            ghostdag_store.clone(),
            statuses_store.clone(),
            pruning_store.clone(),
            headers_store.clone(),
            daa_store,
            headers_selected_tip_store.clone(),
            block_window_cache_for_difficulty,
            block_window_cache_for_past_median_time,
            ghostdag_manager.clone(),
            dag_traversal_manager.clone(),
            difficulty_manager.clone(),
            past_median_time_manager.clone(),
            reachability_service.clone(),
            counters.clone(),
        );

        let body_processor = BlockBodyProcessor::new(
            &params,
            db.clone(),
            statuses_store.clone(),
            block_transactions_store.clone(),
            coinbase_manager.clone(),
            transaction_validator.clone(),
            counters.clone(),
        );

        let virtual_processor = VirtualStateProcessor::new(
            &params,
            genesis_hash,
            db.clone(),
            statuses_store.clone(),
            headers_store.clone(),
            ghostdag_store.clone(),
            relations_store.clone(),
            block_transactions_store.clone(),
            utxo_diffs_store,
            utxo_multisets_store,
            virtual_utxo_store.clone(),
            pruning_utxo_store,
            pruning_import_store,
            virtual_state_store.clone(),
            tips_store,
            pruning_store.clone(),
            ghostdag_manager,
            reachability_service.clone(),
            dag_traversal_manager,
            difficulty_manager,
            past_median_time_manager,
            coinbase_manager.clone(),
            transaction_validator,
            pruning_manager,
            counters.clone(),
        );

        let this = Self {
            lock: RwLock::new(()),
            params,
            genesis,
            statuses_store,
            ghostdag_store,
            headers_store,
            block_transactions_store,
            pruning_store,
            headers_selected_tip_store,
            virtual_state_store,
            virtual_utxo_store,
            header_processor,
            body_processor,
            virtual_processor,
            reachability_service,
            block_locator_manager,
            coinbase_manager,
            counters,
        };
        this.init_genesis_if_needed();
        this
    }

    fn init_genesis_if_needed(&self) {
        let _write_guard = self.lock.write();
        if self.header_processor.header_was_processed(self.genesis.hash()) {
            return;
        }
        self.header_processor.process_genesis(&self.genesis.header);
        self.virtual_processor.init_genesis(&self.genesis);
    }

    pub fn genesis_hash(&self) -> Hash {
        self.genesis.hash()
    }

    /// Validates a block and inserts it into the DAG, updating the virtual
    /// state when a body is present. Header-only blocks are admitted into
    /// the header structures alone (the header-first sync path).
    pub fn validate_and_insert_block(&self, block: Block) -> BlockProcessResult<BlockStatus> {
        let _write_guard = self.lock.write();

        let status = self.header_processor.process_header(&block.header)?;
        if block.is_header_only() {
            return Ok(status);
        }
        if status.has_block_body() {
            // Block was fully processed before
            return Ok(status);
        }

        self.body_processor.process_body(&block)?;
        match self.virtual_processor.resolve_virtual(&block) {
            Ok(status) => Ok(status),
            Err(rule_error) => {
                // A rejected block must leave no trace in consensus state.
                // A missing merge-set body is recoverable (sync ordering),
                // anything else permanently invalidates the block.
                let new_status = match rule_error {
                    RuleError::MissingBlockBody(_) => BlockStatus::StatusHeaderOnly,
                    _ => BlockStatus::StatusInvalid,
                };
                self.body_processor.rollback_body(block.hash(), new_status);
                Err(rule_error)
            }
        }
    }

    /// Inserts a body trusted by an imported pruning-point commitment. Used
    /// for the pruning point itself, whose UTXO context is pruned away.
    pub fn insert_trusted_block_body(&self, block: Block) -> BlockProcessResult<()> {
        let _write_guard = self.lock.write();
        if !self.header_processor.header_was_processed(block.hash()) {
            return Err(RuleError::UnknownBlock(block.hash()));
        }
        if self.body_processor.block_has_body(block.hash()) {
            return Ok(());
        }
        self.body_processor.process_trusted_body(&block, BlockStatus::StatusUTXOValid)
    }

    pub fn get_block(&self, hash: Hash) -> BlockProcessResult<Block> {
        let _read_guard = self.lock.read();
        let header = self.headers_store.get_header(hash).map_err(|_| RuleError::UnknownBlock(hash))?;
        let transactions = self.block_transactions_store.get(hash).map_err(|_| RuleError::MissingBlockBody(hash))?;
        Ok(Block::from_arcs(header, transactions))
    }

    pub fn get_block_header(&self, hash: Hash) -> BlockProcessResult<Arc<Header>> {
        let _read_guard = self.lock.read();
        self.headers_store.get_header(hash).map_err(|_| RuleError::UnknownBlock(hash))
    }

    pub fn get_block_status(&self, hash: Hash) -> Option<BlockStatus> {
        let _read_guard = self.lock.read();
        self.statuses_store.read().get_option(hash)
    }

    /// The hash of the virtual selected parent: the tip of the heaviest
    /// chain in the DAG
    pub fn get_selected_tip_hash(&self) -> Hash {
        let _read_guard = self.lock.read();
        self.virtual_state_store.read().get().unwrap().ghostdag_data.selected_parent
    }

    pub fn get_virtual_state(&self) -> Arc<VirtualState> {
        let _read_guard = self.lock.read();
        self.virtual_state_store.read().get().unwrap()
    }

    /// The number of blocks whose bodies are currently held
    pub fn get_block_count(&self) -> u64 {
        self.counters.body_counts.load(Ordering::Relaxed)
    }

    /// The number of admitted headers
    pub fn get_header_count(&self) -> u64 {
        self.counters.header_counts.load(Ordering::Relaxed)
    }

    pub fn get_headers_selected_tip(&self) -> Hash {
        let _read_guard = self.lock.read();
        self.headers_selected_tip_store.read().get().unwrap().hash
    }

    pub fn pruning_point(&self) -> Hash {
        let _read_guard = self.lock.read();
        self.pruning_store.read().pruning_point().unwrap()
    }

    pub fn get_block_locator(&self, high: Hash, low: Hash) -> BlockProcessResult<BlockLocator> {
        let _read_guard = self.lock.read();
        self.block_locator_manager.create_block_locator(high, low)
    }

    pub fn find_next_locator_boundaries(&self, locator: &[Hash]) -> (Option<Hash>, Hash) {
        let _read_guard = self.lock.read();
        self.block_locator_manager.find_next_locator_boundaries(locator)
    }

    pub fn get_virtual_utxo(&self, outpoint: &TransactionOutpoint) -> Option<UtxoEntry> {
        let _read_guard = self.lock.read();
        self.virtual_utxo_store.get(outpoint)
    }

    pub fn is_in_selected_parent_chain(&self, hash: Hash) -> BlockProcessResult<bool> {
        let _read_guard = self.lock.read();
        if !self.ghostdag_store.has(hash).unwrap_or(false) {
            return Err(RuleError::UnknownBlock(hash));
        }
        let selected_tip = self.virtual_state_store.read().get().unwrap().ghostdag_data.selected_parent;
        Ok(self.reachability_service.is_chain_ancestor_of(hash, selected_tip))
    }

    pub fn get_pruning_point_utxos(
        &self,
        from: Option<TransactionOutpoint>,
        limit: usize,
    ) -> BlockProcessResult<Vec<(TransactionOutpoint, UtxoEntry)>> {
        let _read_guard = self.lock.read();
        self.virtual_processor.get_pruning_point_utxos(from, limit)
    }

    pub fn start_importing_pruning_point_utxo_set(&self) -> BlockProcessResult<()> {
        let _write_guard = self.lock.write();
        self.virtual_processor.start_importing_pruning_point_utxo_set()
    }

    pub fn append_imported_pruning_point_utxos(
        &self,
        chunk: &[(TransactionOutpoint, UtxoEntry)],
        multiset: &mut MuHash,
    ) -> BlockProcessResult<()> {
        let _write_guard = self.lock.write();
        self.virtual_processor.append_imported_pruning_point_utxos(chunk, multiset)
    }

    pub fn finish_importing_pruning_point_utxo_set(&self, pruning_point: Hash, multiset: MuHash) -> BlockProcessResult<()> {
        let _write_guard = self.lock.write();
        self.virtual_processor.finish_importing_pruning_point_utxo_set(pruning_point, multiset)
    }

    pub fn get_blue_score(&self, hash: Hash) -> BlockProcessResult<u64> {
        let _read_guard = self.lock.read();
        self.ghostdag_store.get_blue_score(hash).map_err(|_| RuleError::UnknownBlock(hash))
    }

    /// Lists, in a valid processing order, the hashes in the future of `low`
    /// up to `high` (inclusive): the header-relay sequence of a sync session.
    /// Hashes already known to the receiver may be included; header admission
    /// is idempotent.
    pub fn get_hashes_between(&self, low: Hash, high: Hash) -> BlockProcessResult<Vec<Hash>> {
        let _read_guard = self.lock.read();
        if !self.ghostdag_store.has(low).unwrap_or(false) {
            return Err(RuleError::UnknownBlock(low));
        }
        if !self.ghostdag_store.has(high).unwrap_or(false) {
            return Err(RuleError::UnknownBlock(high));
        }
        let lca = self.reachability_service.find_common_chain_ancestor(low, high);
        let mut hashes = Vec::new();
        for chain_block in self.reachability_service.forward_chain_iterator(lca, high, true).skip(1) {
            let ghostdag_data = self.ghostdag_store.get_data(chain_block).unwrap();
            hashes.extend(ghostdag_data.ascending_mergeset_without_selected_parent(self.ghostdag_store.as_ref()).map(|s| s.hash));
            hashes.push(chain_block);
        }
        Ok(hashes)
    }

    /// Lists, in a valid processing order, the blocks between the pruning
    /// point and `high` whose bodies are missing locally
    pub fn get_missing_block_body_hashes(&self, high: Hash) -> BlockProcessResult<Vec<Hash>> {
        let _read_guard = self.lock.read();
        let pruning_point = self.pruning_store.read().pruning_point().unwrap();
        if !self.reachability_service.is_chain_ancestor_of(pruning_point, high) {
            return Err(RuleError::LocatorHashesNotOnSameChain);
        }

        let statuses = self.statuses_store.read();
        let mut missing = Vec::new();
        for chain_block in self.reachability_service.forward_chain_iterator(pruning_point, high, true) {
            if chain_block == pruning_point {
                if !statuses.get(chain_block).unwrap().has_block_body() {
                    missing.push(chain_block);
                }
                continue;
            }
            let ghostdag_data = self.ghostdag_store.get_data(chain_block).unwrap();
            for merged in ghostdag_data.ascending_mergeset_without_selected_parent(self.ghostdag_store.as_ref()) {
                if !statuses.get(merged.hash).unwrap().has_block_body() {
                    missing.push(merged.hash);
                }
            }
            if !statuses.get(chain_block).unwrap().has_block_body() {
                missing.push(chain_block);
            }
        }
        Ok(missing)
    }

    /// Builds a block template over the current virtual state: the next
    /// block a miner should solve
    pub fn build_block_template(&self, miner_data: MinerData, txs: Vec<Transaction>) -> BlockProcessResult<Block> {
        let _read_guard = self.lock.read();
        let state = self.virtual_state_store.read().get().unwrap();

        let coinbase = self.coinbase_manager.expected_coinbase_transaction(
            state.ghostdag_data.blue_score,
            &miner_data,
            &state.ghostdag_data,
            &state.mergeset_rewards,
        );
        let transactions: Vec<Transaction> = std::iter::once(coinbase).chain(txs).collect();

        let hash_merkle_root = sedra_merkle::calc_merkle_root(transactions.iter().map(hashing::tx::hash));
        let accepted_id_merkle_root = sedra_merkle::calc_merkle_root(state.accepted_tx_ids.iter().copied());
        let utxo_commitment = state.multiset.finalize();
        let timestamp = unix_now().max(state.past_median_time + 1);

        let header = Header::new(
            crate::constants::BLOCK_VERSION,
            state.parents.clone(),
            hash_merkle_root,
            accepted_id_merkle_root,
            utxo_commitment,
            timestamp,
            state.bits,
            0,
            state.daa_score,
        );
        Ok(Block::new(header, transactions))
    }
}
