use crate::errors::{BlockProcessResult, RuleError};
use crate::model::services::reachability::{MTReachabilityService, ReachabilityService};
use crate::model::services::relations::MTRelationsService;
use crate::model::stores::{
    block_window_cache::BlockWindowCacheStore,
    daa::DbDaaStore,
    ghostdag::{DbGhostdagStore, GhostdagData},
    headers::{DbHeadersStore, HeaderStoreReader},
    headers_selected_tip::{DbHeadersSelectedTipStore, HeadersSelectedTipStoreReader},
    pruning::{DbPruningStore, PruningStoreReader},
    reachability::{DbReachabilityStore, StagingReachabilityStore},
    relations::DbRelationsStore,
    statuses::{DbStatusesStore, StatusesStoreReader},
};
use crate::params::Params;
use crate::pipeline::ProcessingCounters;
use crate::processes::difficulty::{target_from_bits, DifficultyManager};
use crate::processes::ghostdag::ordering::SortableBlock;
use crate::processes::ghostdag::protocol::GhostdagManager;
use crate::processes::past_median_time::PastMedianTimeManager;
use crate::processes::reachability::inquirer as reachability;
use crate::processes::traversal::DagTraversalManager;
use parking_lot::RwLock;
use rocksdb::WriteBatch;
use sedra_consensus_core::blockhash::BlockHashes;
use sedra_consensus_core::blockstatus::BlockStatus::{self, StatusHeaderOnly};
use sedra_consensus_core::header::Header;
use sedra_database::prelude::DB;
use sedra_hashes::Hash;
use sedra_math::Uint256;
use std::sync::{atomic::Ordering, Arc};

pub type DbGhostdagManager = GhostdagManager<
    DbGhostdagStore,
    MTRelationsService<DbRelationsStore>,
    MTReachabilityService<DbReachabilityStore>,
    DbHeadersStore,
>;

/// Validates and admits block headers: structural checks, GHOSTDAG
/// computation, contextual difficulty/time validation, proof-of-work, and
/// the staged commit of all header-derived data.
pub struct HeaderProcessor {
    // Config
    pub(super) genesis_hash: Hash,
    pub(super) timestamp_deviation_tolerance: u64,
    pub(super) target_time_per_block: u64,
    pub(super) max_block_parents: u8,
    pub(super) mergeset_size_limit: u64,
    pub(super) difficulty_window_size: usize,
    pub(super) median_time_window_size: usize,
    pub(super) skip_proof_of_work: bool,

    // DB
    db: Arc<DB>,

    // Stores
    relations_store: Arc<RwLock<DbRelationsStore>>,
    reachability_store: Arc<RwLock<DbReachabilityStore>>,
    ghostdag_store: Arc<DbGhostdagStore>,
    statuses_store: Arc<RwLock<DbStatusesStore>>,
    pruning_store: Arc<RwLock<DbPruningStore>>,
    headers_store: Arc<DbHeadersStore>,
    daa_store: Arc<DbDaaStore>,
    headers_selected_tip_store: Arc<RwLock<DbHeadersSelectedTipStore>>,
    block_window_cache_for_difficulty: Arc<BlockWindowCacheStore>,
    block_window_cache_for_past_median_time: Arc<BlockWindowCacheStore>,

    // Managers and services
    ghostdag_manager: DbGhostdagManager,
    dag_traversal_manager: DagTraversalManager<DbGhostdagStore, BlockWindowCacheStore>,
    difficulty_manager: DifficultyManager<DbHeadersStore>,
    past_median_time_manager: PastMedianTimeManager<DbHeadersStore>,
    reachability_service: MTReachabilityService<DbReachabilityStore>,

    // Counters
    counters: Arc<ProcessingCounters>,
}

impl HeaderProcessor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        params: &Params,
        genesis_hash: Hash,
        db: Arc<DB>,
        relations_store: Arc<RwLock<DbRelationsStore>>,
        reachability_store: Arc<RwLock<DbReachabilityStore>>,
        ghostdag_store: Arc<DbGhostdagStore>,
        statuses_store: Arc<RwLock<DbStatusesStore>>,
        pruning_store: Arc<RwLock<DbPruningStore>>,
        headers_store: Arc<DbHeadersStore>,
        daa_store: Arc<DbDaaStore>,
        headers_selected_tip_store: Arc<RwLock<DbHeadersSelectedTipStore>>,
        block_window_cache_for_difficulty: Arc<BlockWindowCacheStore>,
        block_window_cache_for_past_median_time: Arc<BlockWindowCacheStore>,
        ghostdag_manager: DbGhostdagManager,
        dag_traversal_manager: DagTraversalManager<DbGhostdagStore, BlockWindowCacheStore>,
        difficulty_manager: DifficultyManager<DbHeadersStore>,
        past_median_time_manager: PastMedianTimeManager<DbHeadersStore>,
        reachability_service: MTReachabilityService<DbReachabilityStore>,
        counters: Arc<ProcessingCounters>,
    ) -> Self {
        Self {
            genesis_hash,
            timestamp_deviation_tolerance: params.timestamp_deviation_tolerance,
            target_time_per_block: params.target_time_per_block,
            max_block_parents: params.max_block_parents,
            mergeset_size_limit: params.mergeset_size_limit,
            difficulty_window_size: params.difficulty_window_size,
            median_time_window_size: params.median_time_window_size(),
            skip_proof_of_work: params.skip_proof_of_work,
            db,
            relations_store,
            reachability_store,
            ghostdag_store,
            statuses_store,
            pruning_store,
            headers_store,
            daa_store,
            headers_selected_tip_store,
            block_window_cache_for_difficulty,
            block_window_cache_for_past_median_time,
            ghostdag_manager,
            dag_traversal_manager,
            difficulty_manager,
            past_median_time_manager,
            reachability_service,
            counters,
        }
    }

    pub fn header_was_processed(&self, hash: Hash) -> bool {
        self.statuses_store.read().has(hash).unwrap()
    }

    /// Runs the full header admission flow. Returns the resulting status, or
    /// the existing one if the header was already processed.
    pub fn process_header(&self, header: &Arc<Header>) -> BlockProcessResult<BlockStatus> {
        if let Some(status) = self.statuses_store.read().get_option(header.hash) {
            if !status.is_valid() {
                return Err(RuleError::KnownInvalid);
            }
            return Ok(status);
        }

        self.validate_header_in_isolation(header)?;
        self.validate_parent_relations(header)?;

        // Run GHOSTDAG for the new header
        let ghostdag_data = Arc::new(self.ghostdag_manager.ghostdag(&header.parents));

        if let Err(rule_error) = self.validate_header_in_context(header, &ghostdag_data) {
            // Contextual rule violations mark the block as permanently invalid
            let mut batch = WriteBatch::default();
            self.statuses_store.read().set_batch(&mut batch, header.hash, BlockStatus::StatusInvalid).unwrap();
            self.db.write(batch).unwrap();
            return Err(rule_error);
        }

        self.commit_header(header, &ghostdag_data);

        self.counters.header_counts.fetch_add(1, Ordering::Relaxed);
        Ok(StatusHeaderOnly)
    }

    fn validate_header_in_isolation(&self, header: &Header) -> BlockProcessResult<()> {
        if header.version != crate::constants::BLOCK_VERSION {
            return Err(RuleError::WrongBlockVersion(header.version));
        }
        if header.parents.is_empty() {
            return Err(RuleError::NoParents);
        }
        if header.parents.len() > self.max_block_parents as usize {
            return Err(RuleError::TooManyParents(header.parents.len(), self.max_block_parents as usize));
        }
        let now = unix_now();
        let max_allowed = now + self.timestamp_deviation_tolerance * self.target_time_per_block;
        if header.timestamp > max_allowed {
            return Err(RuleError::TimeTooFarIntoTheFuture(header.timestamp, max_allowed));
        }
        Ok(())
    }

    fn validate_parent_relations(&self, header: &Header) -> BlockProcessResult<()> {
        // All parents must be known valid headers
        let statuses = self.statuses_store.read();
        let missing: Vec<Hash> = header.parents.iter().copied().filter(|&p| !statuses.has(p).unwrap()).collect();
        if !missing.is_empty() {
            return Err(RuleError::MissingParents(missing));
        }
        for &parent in header.parents.iter() {
            if !statuses.get(parent).unwrap().is_valid() {
                return Err(RuleError::InvalidParent(parent));
            }
        }
        drop(statuses);

        // No parent may be an ancestor of another parent
        for (i, &a) in header.parents.iter().enumerate() {
            for &b in header.parents.iter().skip(i + 1) {
                if self.reachability_service.is_dag_ancestor_of(a, b) {
                    return Err(RuleError::InvalidParentsRelation(a, b));
                }
                if self.reachability_service.is_dag_ancestor_of(b, a) {
                    return Err(RuleError::InvalidParentsRelation(b, a));
                }
            }
        }
        Ok(())
    }

    fn validate_header_in_context(&self, header: &Header, ghostdag_data: &GhostdagData) -> BlockProcessResult<()> {
        let mergeset_size = ghostdag_data.mergeset_size() as u64;
        if mergeset_size > self.mergeset_size_limit {
            return Err(RuleError::MergeSetTooBig(mergeset_size, self.mergeset_size_limit));
        }

        // The pruning point must remain in the past of every accepted block
        let pruning_point = self.pruning_store.read().pruning_point().unwrap();
        if pruning_point != self.genesis_hash
            && !header.parents.iter().any(|&parent| self.reachability_service.is_dag_ancestor_of(pruning_point, parent))
        {
            return Err(RuleError::PruningViolation(pruning_point));
        }

        // Difficulty window and expected bits
        let difficulty_window = self.dag_traversal_manager.block_window(ghostdag_data, self.difficulty_window_size);
        let expected_bits = self.difficulty_manager.calculate_difficulty_bits(&difficulty_window);
        if header.bits != expected_bits {
            return Err(RuleError::UnexpectedDifficulty(header.bits, expected_bits));
        }

        // DAA score
        let (expected_daa_score, _daa_added_blocks) = self
            .difficulty_manager
            .calc_daa_score_and_added_blocks(&mut difficulty_window.iter().map(|r| r.0.hash), ghostdag_data);
        if header.daa_score != expected_daa_score {
            return Err(RuleError::UnexpectedHeaderDaaScore(expected_daa_score, header.daa_score));
        }

        // Past median time
        let median_window = self.dag_traversal_manager.block_window(ghostdag_data, self.median_time_window_size);
        let past_median_time = self.past_median_time_manager.calc_past_median_time(&median_window);
        if header.timestamp <= past_median_time {
            return Err(RuleError::TimeTooOld(header.timestamp, past_median_time));
        }

        // Proof of work: the header hash must be at most the target encoded
        // by its (already validated) bits
        if !self.skip_proof_of_work {
            let target = target_from_bits(header.bits).ok_or(RuleError::InvalidPoW(header.hash))?;
            let hash_value = Uint256::from_le_bytes(header.hash.as_bytes());
            if hash_value > target {
                return Err(RuleError::InvalidPoW(header.hash));
            }
        }

        // Cache the windows for the upcoming virtual processing
        self.block_window_cache_for_difficulty.insert(header.hash, Arc::new(difficulty_window));
        self.block_window_cache_for_past_median_time.insert(header.hash, Arc::new(median_window));

        Ok(())
    }

    fn commit_header(&self, header: &Arc<Header>, ghostdag_data: &Arc<GhostdagData>) {
        let difficulty_window = self
            .block_window_cache_for_difficulty
            .get(&header.hash)
            .unwrap_or_else(|| Arc::new(self.dag_traversal_manager.block_window(ghostdag_data, self.difficulty_window_size)));
        let (_, daa_added_blocks) = self
            .difficulty_manager
            .calc_daa_score_and_added_blocks(&mut difficulty_window.iter().map(|r| r.0.hash), ghostdag_data);

        // Create staging reachability store. The whole header commit happens
        // under the consensus write lock, so a plain overlay suffices.
        let reachability_store = self.reachability_store.clone();
        let mut batch = WriteBatch::default();
        {
            let store_guard = reachability_store.read();
            let mut staging = StagingReachabilityStore::new(&store_guard);

            // Add the block to the reachability tree and DAG structures
            let mut mergeset_iter = ghostdag_data.unordered_mergeset_without_selected_parent();
            reachability::add_block(&mut staging, header.hash, ghostdag_data.selected_parent, &mut mergeset_iter).unwrap();

            // Update the headers selected tip and hint reachability when the
            // new header takes the lead
            let new_tip = SortableBlock::new(header.hash, ghostdag_data.blue_work);
            let mut hst_write = self.headers_selected_tip_store.write();
            let prev_tip = hst_write.get().unwrap();
            if new_tip > prev_tip {
                hst_write.set_batch(&mut batch, new_tip).unwrap();
                reachability::hint_virtual_selected_parent(&mut staging, header.hash).unwrap();
            }
            drop(hst_write);

            // Append-only stores
            self.ghostdag_store.insert_batch(&mut batch, header.hash, ghostdag_data).unwrap();
            self.headers_store.insert_batch(&mut batch, header.hash, header.clone()).unwrap();
            self.daa_store.insert_batch(&mut batch, header.hash, BlockHashes::new(daa_added_blocks)).unwrap();

            // Relations and statuses
            self.relations_store.write().insert_batch(&mut batch, header.hash, BlockHashes::new(header.parents.clone())).unwrap();
            self.statuses_store.read().set_batch(&mut batch, header.hash, StatusHeaderOnly).unwrap();

            // Flush the reachability staging into the same batch
            staging.commit(&mut batch).unwrap();
        }

        // Flush the batch to the DB: the single atomic commit point of the
        // header
        self.db.write(batch).unwrap();
    }

    /// Admits the genesis header: GHOSTDAG origin data, reachability tree
    /// root, relations root and initial headers-selected-tip.
    pub fn process_genesis(&self, genesis_header: &Arc<Header>) {
        debug_assert_eq!(genesis_header.hash, self.genesis_hash);

        let mut batch = WriteBatch::default();

        {
            let mut reachability_write = self.reachability_store.write();
            reachability::init(&mut *reachability_write).unwrap();
        }

        {
            let store_guard = self.reachability_store.read();
            let mut staging = StagingReachabilityStore::new(&store_guard);
            reachability::add_block(&mut staging, self.genesis_hash, sedra_consensus_core::blockhash::ORIGIN, &mut std::iter::empty())
                .unwrap();
            staging.commit(&mut batch).unwrap();
        }

        let genesis_ghostdag = Arc::new(self.ghostdag_manager.genesis_ghostdag_data());
        self.ghostdag_store.insert_batch(&mut batch, self.genesis_hash, &genesis_ghostdag).unwrap();
        self.headers_store.insert_batch(&mut batch, self.genesis_hash, genesis_header.clone()).unwrap();
        self.daa_store.insert_batch(&mut batch, self.genesis_hash, BlockHashes::new(Vec::new())).unwrap();
        self.relations_store.write().insert_root_batch(&mut batch, self.genesis_hash).unwrap();
        self.statuses_store.read().set_batch(&mut batch, self.genesis_hash, StatusHeaderOnly).unwrap();
        self.headers_selected_tip_store
            .write()
            .set_batch(&mut batch, SortableBlock::new(self.genesis_hash, genesis_ghostdag.blue_work))
            .unwrap();

        self.db.write(batch).unwrap();
        self.counters.header_counts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn headers_selected_tip(&self) -> Hash {
        self.headers_selected_tip_store.read().get().unwrap().hash
    }
}

/// Milliseconds since the unix epoch
pub fn unix_now() -> u64 {
    std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap().as_millis() as u64
}
