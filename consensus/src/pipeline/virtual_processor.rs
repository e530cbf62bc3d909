use crate::errors::{BlockProcessResult, RuleError};
use crate::model::services::reachability::{MTReachabilityService, ReachabilityService};
use crate::model::stores::{
    block_transactions::{BlockTransactionsStoreReader, DbBlockTransactionsStore},
    block_window_cache::BlockWindowCacheStore,
    ghostdag::{DbGhostdagStore, GhostdagData, GhostdagStoreReader},
    headers::{DbHeadersStore, HeaderStoreReader},
    pruning::{DbPruningStore, PruningPointInfo, PruningStoreReader},
    reachability::DbReachabilityStore,
    relations::{DbRelationsStore, RelationsStoreReader},
    statuses::{DbStatusesStore, StatusesStoreReader},
    tips::{DbTipsStore, TipsStoreReader},
    utxo_diffs::{DbUtxoDiffsStore, UtxoDiffsStoreReader},
    utxo_multisets::{DbUtxoMultisetsStore, UtxoMultisetsStoreReader},
    utxo_set::DbUtxoSetStore,
    virtual_state::{DbVirtualStateStore, VirtualState, VirtualStateStoreReader},
};
use crate::params::Params;
use crate::pipeline::header_processor::DbGhostdagManager;
use crate::pipeline::ProcessingCounters;
use crate::processes::coinbase::{BlockRewardData, CoinbaseManager, MergesetRewards};
use crate::processes::difficulty::DifficultyManager;
use crate::processes::past_median_time::PastMedianTimeManager;
use crate::processes::pruning::PruningPointManager;
use crate::processes::transaction_validator::{TransactionValidator, TxValidationFlags};
use crate::processes::traversal::DagTraversalManager;
use parking_lot::RwLock;
use rayon::prelude::*;
use rocksdb::WriteBatch;
use sedra_consensus_core::block::Block;
use sedra_consensus_core::blockstatus::BlockStatus::{self, StatusUTXOValid};
use sedra_consensus_core::hashing;
use sedra_consensus_core::muhash::MuHashExtensions;
use sedra_consensus_core::tx::{
    PopulatedTransaction, Transaction, TransactionId, TransactionOutpoint, UtxoEntry, ValidatedTransaction,
    VerifiableTransaction, COINBASE_TRANSACTION_INDEX,
};
use sedra_consensus_core::utxo::utxo_diff::UtxoDiff;
use sedra_consensus_core::utxo::utxo_iterator::UtxoIteratorWithDiff;
use sedra_consensus_core::utxo::utxo_view::{UtxoView, UtxoViewComposition};
use sedra_database::prelude::DB;
use sedra_hashes::Hash;
use sedra_muhash::MuHash;
use std::collections::HashSet;
use std::sync::{
    atomic::Ordering::{self as AtomicOrdering},
    Arc,
};

/// A borrowed overlay view used while a diff is still being accumulated
struct DiffOverlayView<'a, V: UtxoView> {
    base: &'a V,
    diff: &'a UtxoDiff,
}

impl<V: UtxoView> UtxoView for DiffOverlayView<'_, V> {
    fn get(&self, outpoint: &TransactionOutpoint) -> Option<UtxoEntry> {
        if let Some(entry) = self.diff.add.get(outpoint) {
            return Some(entry.clone());
        }
        if self.diff.remove.contains_key(outpoint) {
            return None;
        }
        self.base.get(outpoint)
    }
}

/// The accumulated UTXO effect of processing a block's merge set
struct UtxoProcessingContext {
    mergeset_diff: UtxoDiff,
    multiset_hash: MuHash,
    accepted_tx_ids: Vec<TransactionId>,
    mergeset_rewards: MergesetRewards,
}

/// Maintains the virtual block: resolves the selected tip after every body
/// acceptance, validates chain candidates against their own UTXO view,
/// updates the virtual UTXO set, and advances the pruning point.
pub struct VirtualStateProcessor {
    // Config
    genesis_hash: Hash,
    max_block_parents: u8,
    max_block_sig_ops: usize,
    difficulty_window_size: usize,
    median_time_window_size: usize,

    db: Arc<DB>,

    // Stores
    statuses_store: Arc<RwLock<DbStatusesStore>>,
    headers_store: Arc<DbHeadersStore>,
    ghostdag_store: Arc<DbGhostdagStore>,
    relations_store: Arc<RwLock<DbRelationsStore>>,
    block_transactions_store: Arc<DbBlockTransactionsStore>,
    utxo_diffs_store: Arc<DbUtxoDiffsStore>,
    utxo_multisets_store: Arc<DbUtxoMultisetsStore>,
    virtual_utxo_store: Arc<DbUtxoSetStore>,
    pruning_utxo_store: Arc<DbUtxoSetStore>,
    pruning_import_store: Arc<DbUtxoSetStore>,
    virtual_state_store: Arc<RwLock<DbVirtualStateStore>>,
    tips_store: Arc<RwLock<DbTipsStore>>,
    pruning_store: Arc<RwLock<DbPruningStore>>,

    // Managers
    ghostdag_manager: DbGhostdagManager,
    reachability_service: MTReachabilityService<DbReachabilityStore>,
    dag_traversal_manager: DagTraversalManager<DbGhostdagStore, BlockWindowCacheStore>,
    difficulty_manager: DifficultyManager<DbHeadersStore>,
    past_median_time_manager: PastMedianTimeManager<DbHeadersStore>,
    coinbase_manager: CoinbaseManager,
    transaction_validator: TransactionValidator,
    pruning_manager: PruningPointManager<DbGhostdagStore, BlockWindowCacheStore>,

    counters: Arc<ProcessingCounters>,
}

impl VirtualStateProcessor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        params: &Params,
        genesis_hash: Hash,
        db: Arc<DB>,
        statuses_store: Arc<RwLock<DbStatusesStore>>,
        headers_store: Arc<DbHeadersStore>,
        ghostdag_store: Arc<DbGhostdagStore>,
        relations_store: Arc<RwLock<DbRelationsStore>>,
        block_transactions_store: Arc<DbBlockTransactionsStore>,
        utxo_diffs_store: Arc<DbUtxoDiffsStore>,
        utxo_multisets_store: Arc<DbUtxoMultisetsStore>,
        virtual_utxo_store: Arc<DbUtxoSetStore>,
        pruning_utxo_store: Arc<DbUtxoSetStore>,
        pruning_import_store: Arc<DbUtxoSetStore>,
        virtual_state_store: Arc<RwLock<DbVirtualStateStore>>,
        tips_store: Arc<RwLock<DbTipsStore>>,
        pruning_store: Arc<RwLock<DbPruningStore>>,
        ghostdag_manager: DbGhostdagManager,
        reachability_service: MTReachabilityService<DbReachabilityStore>,
        dag_traversal_manager: DagTraversalManager<DbGhostdagStore, BlockWindowCacheStore>,
        difficulty_manager: DifficultyManager<DbHeadersStore>,
        past_median_time_manager: PastMedianTimeManager<DbHeadersStore>,
        coinbase_manager: CoinbaseManager,
        transaction_validator: TransactionValidator,
        pruning_manager: PruningPointManager<DbGhostdagStore, BlockWindowCacheStore>,
        counters: Arc<ProcessingCounters>,
    ) -> Self {
        Self {
            genesis_hash,
            max_block_parents: params.max_block_parents,
            max_block_sig_ops: params.max_block_sig_ops,
            difficulty_window_size: params.difficulty_window_size,
            median_time_window_size: params.median_time_window_size(),
            db,
            statuses_store,
            headers_store,
            ghostdag_store,
            relations_store,
            block_transactions_store,
            utxo_diffs_store,
            utxo_multisets_store,
            virtual_utxo_store,
            pruning_utxo_store,
            pruning_import_store,
            virtual_state_store,
            tips_store,
            pruning_store,
            ghostdag_manager,
            reachability_service,
            dag_traversal_manager,
            difficulty_manager,
            past_median_time_manager,
            coinbase_manager,
            transaction_validator,
            pruning_manager,
            counters,
        }
    }

    /// Initializes the virtual machinery over a freshly admitted genesis
    pub fn init_genesis(&self, genesis: &Block) {
        let genesis_hash = genesis.hash();
        let mut batch = WriteBatch::default();

        self.block_transactions_store.insert_batch(&mut batch, genesis_hash, genesis.transactions.clone()).unwrap();
        self.counters.body_counts.fetch_add(1, AtomicOrdering::Relaxed);
        self.utxo_diffs_store.insert_batch(&mut batch, genesis_hash, Arc::new(UtxoDiff::default())).unwrap();
        self.utxo_multisets_store.insert_batch(&mut batch, genesis_hash, MuHash::new()).unwrap();
        self.statuses_store.read().set_batch(&mut batch, genesis_hash, StatusUTXOValid).unwrap();
        self.tips_store.write().init_batch(&mut batch, &[genesis_hash]).unwrap();
        self.pruning_store
            .write()
            .set_batch(&mut batch, PruningPointInfo { pruning_point: genesis_hash, importing_utxo_set: false })
            .unwrap();

        // The virtual sits directly on top of genesis: its merge set is the
        // genesis block alone, whose coinbase carries no outputs
        let virtual_gd = self.ghostdag_manager.ghostdag(&[genesis_hash]);
        let genesis_header = genesis.header.clone();
        let state = VirtualState {
            parents: vec![genesis_hash],
            daa_score: genesis_header.daa_score,
            bits: genesis_header.bits,
            past_median_time: genesis_header.timestamp,
            multiset: MuHash::new(),
            utxo_diff: UtxoDiff::default(),
            accepted_tx_ids: vec![genesis.transactions[COINBASE_TRANSACTION_INDEX].id()],
            mergeset_rewards: MergesetRewards::new(),
            ghostdag_data: virtual_gd,
        };
        self.virtual_state_store.write().set_batch(&mut batch, Arc::new(state)).unwrap();

        self.db.write(batch).unwrap();
    }

    pub fn virtual_state(&self) -> Arc<VirtualState> {
        self.virtual_state_store.read().get().unwrap()
    }

    /// The single entry point after a block body is accepted: recomputes the
    /// virtual over the updated tip set, UTXO-validating any new chain
    /// blocks on the way. Returns the resulting status of the new block.
    pub fn resolve_virtual(&self, block: &Block) -> BlockProcessResult<BlockStatus> {
        let new_block_hash = block.hash();
        let current_tips = self.tips_store.read().get().unwrap();
        let new_tips: Vec<Hash> = current_tips
            .iter()
            .copied()
            .filter(|tip| !block.header.parents.contains(tip))
            .chain(std::iter::once(new_block_hash))
            .collect();

        // The virtual merges at most `max_block_parents` tips, preferring the
        // heaviest ones; any remaining tips are merged by later blocks
        let mut virtual_parents = new_tips.clone();
        if virtual_parents.len() > self.max_block_parents as usize {
            virtual_parents.sort_by_cached_key(|&tip| {
                std::cmp::Reverse(crate::processes::ghostdag::ordering::SortableBlock::new(
                    tip,
                    self.ghostdag_store.get_blue_work(tip).unwrap(),
                ))
            });
            virtual_parents.truncate(self.max_block_parents as usize);
            // The new block must stay a virtual parent even when it is not
            // among the heaviest tips, otherwise it could never be merged
            if !virtual_parents.contains(&new_block_hash) {
                *virtual_parents.last_mut().unwrap() = new_block_hash;
            }
        }

        let virtual_gd = self.ghostdag_manager.ghostdag(&virtual_parents);
        let prev_state = self.virtual_state_store.read().get().unwrap();
        let prev_selected = prev_state.ghostdag_data.selected_parent;
        let new_selected = virtual_gd.selected_parent;

        // The diff from the current virtual UTXO set to the point of
        // interest; starts at the previous selected tip
        let mut accumulated_diff = prev_state.utxo_diff.reversed();

        let mut staged_diffs: Vec<(Hash, Arc<UtxoDiff>)> = Vec::new();
        let mut staged_multisets: Vec<(Hash, MuHash)> = Vec::new();
        let mut staged_statuses: Vec<(Hash, BlockStatus)> = Vec::new();

        if new_selected != prev_selected {
            let lca = self.reachability_service.find_common_chain_ancestor(new_selected, prev_selected);

            // Walk down from the previous selected tip to the common
            // ancestor, unwinding each chain block's diff
            for chain_block in self.reachability_service.backward_chain_iterator(prev_selected, lca, false) {
                let diff = self.utxo_diffs_store.get(chain_block).unwrap();
                accumulated_diff.with_diff_in_place(&diff.reversed())?;
            }

            // Walk up from the common ancestor to the new selected tip,
            // validating-and-applying each chain block
            for chain_block in self.reachability_service.forward_chain_iterator(lca, new_selected, true).skip(1) {
                let status = self.statuses_store.read().get(chain_block).unwrap();
                match status {
                    StatusUTXOValid => {
                        let diff = self.utxo_diffs_store.get(chain_block).unwrap();
                        accumulated_diff.with_diff_in_place(&diff)?;
                    }
                    BlockStatus::StatusUTXOPendingVerification => {
                        let ctx = self.verify_chain_block(chain_block, &accumulated_diff, &staged_multisets)?;
                        accumulated_diff.with_diff_in_place(&ctx.mergeset_diff)?;
                        staged_diffs.push((chain_block, Arc::new(ctx.mergeset_diff)));
                        staged_multisets.push((chain_block, ctx.multiset_hash));
                        staged_statuses.push((chain_block, StatusUTXOValid));
                    }
                    _ => return Err(RuleError::InvalidParent(chain_block)),
                }
            }
        }

        // Virtual difficulty, DAA score and median time
        let difficulty_window = self.dag_traversal_manager.block_window(&virtual_gd, self.difficulty_window_size);
        let bits = self.difficulty_manager.calculate_difficulty_bits(&difficulty_window);
        let (daa_score, _) =
            self.difficulty_manager.calc_daa_score_and_added_blocks(&mut difficulty_window.iter().map(|r| r.0.hash), &virtual_gd);
        let median_window = self.dag_traversal_manager.block_window(&virtual_gd, self.median_time_window_size);
        let past_median_time = self.past_median_time_manager.calc_past_median_time(&median_window);

        // Process the virtual's own merge set over the new selected tip view
        let selected_tip_view = (&*self.virtual_utxo_store).compose(&accumulated_diff);
        let virtual_ctx = self.calculate_utxo_state(
            &virtual_gd,
            &selected_tip_view,
            virtual_gd.blue_score,
            past_median_time,
            &staged_multisets,
        )?;

        let new_state = VirtualState {
            parents: virtual_parents,
            daa_score,
            bits,
            past_median_time,
            multiset: virtual_ctx.multiset_hash,
            utxo_diff: virtual_ctx.mergeset_diff.clone(),
            accepted_tx_ids: virtual_ctx.accepted_tx_ids,
            mergeset_rewards: virtual_ctx.mergeset_rewards,
            ghostdag_data: virtual_gd.clone(),
        };

        // The total change to the materialized virtual UTXO set
        let utxo_set_diff = accumulated_diff.with_diff(&virtual_ctx.mergeset_diff)?;

        // Commit: a single atomic point after which readers observe the new
        // virtual state
        let mut batch = WriteBatch::default();
        self.tips_store.write().add_tip_batch(&mut batch, new_block_hash, &block.header.parents).unwrap();
        self.virtual_utxo_store.write_diff_batch(&mut batch, &utxo_set_diff).unwrap();
        for (hash, diff) in staged_diffs {
            self.utxo_diffs_store.insert_batch(&mut batch, hash, diff).unwrap();
        }
        for (hash, multiset) in staged_multisets {
            self.utxo_multisets_store.insert_batch(&mut batch, hash, multiset).unwrap();
        }
        for (hash, status) in staged_statuses {
            self.statuses_store.read().set_batch(&mut batch, hash, status).unwrap();
        }
        self.virtual_state_store.write().set_batch(&mut batch, Arc::new(new_state)).unwrap();
        self.db.write(batch).unwrap();

        // Pruning advances outside the acceptance batch; once started it
        // runs to completion under the consensus write lock
        self.advance_pruning_point()?;

        Ok(self.statuses_store.read().get(new_block_hash).unwrap())
    }

    /// UTXO-validates a pending chain block against the view implied by
    /// `accumulated_diff` and verifies its header commitments
    fn verify_chain_block(
        &self,
        chain_block: Hash,
        accumulated_diff: &UtxoDiff,
        pending_multisets: &[(Hash, MuHash)],
    ) -> BlockProcessResult<UtxoProcessingContext> {
        let ghostdag_data = self.ghostdag_store.get_data(chain_block).unwrap();
        let header = self.headers_store.get_header(chain_block).unwrap();

        let median_window = self.dag_traversal_manager.block_window(&ghostdag_data, self.median_time_window_size);
        let past_median_time = self.past_median_time_manager.calc_past_median_time(&median_window);

        let selected_parent_view = (&*self.virtual_utxo_store).compose(accumulated_diff);
        let ctx = self.calculate_utxo_state(
            &ghostdag_data,
            &selected_parent_view,
            ghostdag_data.blue_score,
            past_median_time,
            pending_multisets,
        )?;
        self.verify_expected_utxo_state(&ctx, &header, &ghostdag_data, &selected_parent_view, past_median_time)?;
        Ok(ctx)
    }

    /// Computes the UTXO state of a block (or the virtual) relative to its
    /// selected parent: processes the selected parent's coinbase and then
    /// every merge-set transaction in consensus order, collecting the
    /// accepted set, the UTXO diff and the updated multiset.
    fn calculate_utxo_state(
        &self,
        ghostdag_data: &GhostdagData,
        selected_parent_utxo_view: &impl UtxoView,
        pov_blue_score: u64,
        pov_past_median_time: u64,
        pending_multisets: &[(Hash, MuHash)],
    ) -> BlockProcessResult<UtxoProcessingContext> {
        let selected_parent = ghostdag_data.selected_parent;

        // The selected parent multiset may still be in staging when several
        // chain blocks are resolved within one virtual update
        let mut multiset_hash = match pending_multisets.iter().rev().find(|(hash, _)| *hash == selected_parent) {
            Some((_, multiset)) => multiset.clone(),
            None => self.utxo_multisets_store.get(selected_parent).unwrap(),
        };

        let mut mergeset_diff = UtxoDiff::default();
        let mut accepted_tx_ids = Vec::new();
        let mut mergeset_rewards = MergesetRewards::new();

        let selected_parent_transactions = self.transactions_of(selected_parent)?;
        let validated_coinbase = ValidatedTransaction::new_coinbase(&selected_parent_transactions[COINBASE_TRANSACTION_INDEX]);
        mergeset_diff.add_transaction(&validated_coinbase, pov_blue_score)?;
        multiset_hash.add_transaction(&validated_coinbase, pov_blue_score);
        accepted_tx_ids.push(validated_coinbase.id());

        let mergeset_without_sp: Vec<Hash> =
            ghostdag_data.ascending_mergeset_without_selected_parent(self.ghostdag_store.as_ref()).map(|s| s.hash).collect();

        for (i, merged_block) in std::iter::once(selected_parent).chain(mergeset_without_sp).enumerate() {
            let txs = if i == 0 { selected_parent_transactions.clone() } else { self.transactions_of(merged_block)? };

            // The first merged block is the selected parent; its
            // transactions were already fully validated against this very
            // UTXO context when the parent itself was verified
            let flags = if i == 0 { TxValidationFlags::SkipScriptChecks } else { TxValidationFlags::Full };

            let mut block_fee = 0u64;
            for tx in txs.iter().skip(1) {
                let composed_view = DiffOverlayView { base: selected_parent_utxo_view, diff: &mergeset_diff };
                let Some(populated) = self.populate_transaction(tx, &composed_view) else {
                    // A transaction spending unavailable outputs (e.g. a
                    // conflict with an already accepted transaction) is
                    // simply not accepted by this block
                    continue;
                };
                match self.transaction_validator.validate_populated_transaction_and_get_fee(
                    &populated,
                    pov_blue_score,
                    pov_past_median_time,
                    flags,
                ) {
                    Ok(fee) => {
                        let validated = ValidatedTransaction::new(populated, fee);
                        mergeset_diff.add_transaction(&validated, pov_blue_score)?;
                        multiset_hash.add_transaction(&validated, pov_blue_score);
                        accepted_tx_ids.push(validated.id());
                        block_fee += fee;
                    }
                    Err(_) => continue,
                }
            }

            // Record the reward owed to this merged block's own miner: its
            // subsidy (as committed in its coinbase payload) plus the fees
            // accepted out of it here. The genesis earns nothing.
            if merged_block != self.genesis_hash {
                let coinbase_data = self.coinbase_manager.deserialize_coinbase_payload(&txs[COINBASE_TRANSACTION_INDEX].payload)?;
                mergeset_rewards.insert(
                    merged_block,
                    BlockRewardData::new(coinbase_data.subsidy, block_fee, coinbase_data.miner_data.script_public_key),
                );
            }
        }

        Ok(UtxoProcessingContext { mergeset_diff, multiset_hash, accepted_tx_ids, mergeset_rewards })
    }

    /// Verifies that a block fully respects its own UTXO view: the header
    /// UTXO commitment and accepted-id merkle root match the computed state,
    /// the coinbase pays exactly the expected rewards, all of the block's
    /// own transactions are valid against its UTXO view, and the block
    /// respects the signature-operations budget.
    fn verify_expected_utxo_state(
        &self,
        ctx: &UtxoProcessingContext,
        header: &Arc<sedra_consensus_core::header::Header>,
        ghostdag_data: &GhostdagData,
        selected_parent_view: &(impl UtxoView + Sync),
        pov_past_median_time: u64,
    ) -> BlockProcessResult<()> {
        // Header UTXO commitment
        let expected_commitment = ctx.multiset_hash.finalize();
        if expected_commitment != header.utxo_commitment {
            return Err(RuleError::BadUTXOCommitment(header.utxo_commitment, expected_commitment));
        }

        // Header accepted-id merkle root
        let expected_accepted_root = sedra_merkle::calc_merkle_root(ctx.accepted_tx_ids.iter().copied());
        if expected_accepted_root != header.accepted_id_merkle_root {
            return Err(RuleError::BadAcceptedIDMerkleRoot(header.accepted_id_merkle_root, expected_accepted_root));
        }

        let txs = self.transactions_of(header.hash)?;

        // Coinbase: rebuilt from the declared miner data and the computed
        // merge-set rewards, it must hash to the actual coinbase
        let coinbase = &txs[COINBASE_TRANSACTION_INDEX];
        let coinbase_data = self.coinbase_manager.deserialize_coinbase_payload(&coinbase.payload)?;
        let expected_coinbase = self.coinbase_manager.expected_coinbase_transaction(
            ghostdag_data.blue_score,
            &coinbase_data.miner_data,
            ghostdag_data,
            &ctx.mergeset_rewards,
        );
        if hashing::tx::hash(coinbase) != hashing::tx::hash(&expected_coinbase) {
            return Err(RuleError::BadCoinbaseTransaction);
        }

        // The block's own transactions must all be valid against the
        // post-acceptance UTXO view, within the sig-op budget. Body
        // validation already assured the transactions are independent, so
        // they verify in parallel.
        let own_view = selected_parent_view.compose(&ctx.mergeset_diff);
        let per_tx: Vec<(usize, bool)> = txs
            .par_iter()
            .skip(1)
            .map(|tx| {
                let Some(populated) = self.populate_transaction(tx, &own_view) else {
                    return (0, false);
                };
                let sig_ops = populated
                    .tx
                    .inputs
                    .iter()
                    .zip(populated.entries.iter())
                    .map(|(input, entry)| sedra_txscript::get_precise_sig_op_count(&input.signature_script, &entry.script_public_key))
                    .sum();
                let valid = self
                    .transaction_validator
                    .validate_populated_transaction_and_get_fee(
                        &populated,
                        ghostdag_data.blue_score,
                        pov_past_median_time,
                        TxValidationFlags::Full,
                    )
                    .is_ok();
                (sig_ops, valid)
            })
            .collect();

        let total_sig_ops: usize = per_tx.iter().map(|(sig_ops, _)| sig_ops).sum();
        if total_sig_ops > self.max_block_sig_ops {
            return Err(RuleError::ExcessiveSigOps(total_sig_ops, self.max_block_sig_ops));
        }
        let invalid_count = per_tx.iter().filter(|(_, valid)| !valid).count();
        if invalid_count > 0 {
            return Err(RuleError::InvalidTransactionsInUtxoContext(invalid_count));
        }

        Ok(())
    }

    fn populate_transaction<'a>(&self, tx: &'a Transaction, view: &impl UtxoView) -> Option<PopulatedTransaction<'a>> {
        let mut entries = Vec::with_capacity(tx.inputs.len());
        for input in tx.inputs.iter() {
            entries.push(view.get(&input.previous_outpoint)?);
        }
        Some(PopulatedTransaction::new(tx, entries))
    }

    fn transactions_of(&self, hash: Hash) -> BlockProcessResult<Arc<Vec<Transaction>>> {
        self.block_transactions_store.get(hash).map_err(|_| RuleError::MissingBlockBody(hash))
    }

    /// Advances the pruning point when the virtual selected chain crossed a
    /// new finality interval: materializes the pruning-point UTXO set for
    /// peer serving and discards block bodies below the new point.
    fn advance_pruning_point(&self) -> BlockProcessResult<()> {
        let state = self.virtual_state_store.read().get().unwrap();
        let info = self.pruning_store.read().get().unwrap();
        let new_pruning_point = self.pruning_manager.expected_pruning_point(state.ghostdag_data.to_compact(), info.pruning_point);
        if new_pruning_point == info.pruning_point {
            return Ok(());
        }
        log::info!("advancing the pruning point to {new_pruning_point}");

        let mut batch = WriteBatch::default();

        // Materialize the UTXO set at the new pruning point by unwinding
        // the chain diffs from the virtual downwards
        let mut to_pruning_point_diff = state.utxo_diff.reversed();
        for chain_block in
            self.reachability_service.backward_chain_iterator(state.ghostdag_data.selected_parent, new_pruning_point, false)
        {
            let diff = self.utxo_diffs_store.get(chain_block).unwrap();
            to_pruning_point_diff.with_diff_in_place(&diff.reversed())?;
        }
        self.pruning_utxo_store.clear_batch(&mut batch).unwrap();
        let base_iter = self.virtual_utxo_store.iterate_all().map(|r| r.unwrap());
        let pruning_utxos = UtxoIteratorWithDiff::new(base_iter, to_pruning_point_diff);
        self.pruning_utxo_store.write_many_batch(&mut batch, pruning_utxos).unwrap();

        self.pruning_store
            .write()
            .set_batch(&mut batch, PruningPointInfo { pruning_point: new_pruning_point, importing_utxo_set: false })
            .unwrap();

        // Discard bodies strictly below the new pruning point. Headers are
        // retained; they remain eligible for deferred deletion.
        let mut pruned = 0u64;
        let mut visited: HashSet<Hash> = HashSet::from_iter([new_pruning_point]);
        let mut queue: Vec<Hash> = self.relations_store.read().get_parents(new_pruning_point).unwrap().to_vec();
        while let Some(current) = queue.pop() {
            if !visited.insert(current) {
                continue;
            }
            let status = self.statuses_store.read().get(current).unwrap();
            if !status.has_block_body() {
                // Already pruned, along with everything below it
                continue;
            }
            self.block_transactions_store.delete_batch(&mut batch, current).unwrap();
            self.statuses_store.read().set_batch(&mut batch, current, BlockStatus::StatusHeaderOnly).unwrap();
            pruned += 1;
            queue.extend(self.relations_store.read().get_parents(current).unwrap().iter());
        }

        self.db.write(batch).unwrap();
        self.counters.body_counts.fetch_sub(pruned, AtomicOrdering::Relaxed);
        Ok(())
    }

    //
    // Pruning-point UTXO set transfer (serving and importing)
    //

    /// Serves a page of the pruning-point UTXO set starting after `from`
    pub fn get_pruning_point_utxos(
        &self,
        from: Option<TransactionOutpoint>,
        limit: usize,
    ) -> BlockProcessResult<Vec<(TransactionOutpoint, UtxoEntry)>> {
        Ok(self.pruning_utxo_store.iterate_from(from, from.is_some(), limit).unwrap())
    }

    /// Clears the scratch area and marks an import as in-flight
    pub fn start_importing_pruning_point_utxo_set(&self) -> BlockProcessResult<()> {
        let mut batch = WriteBatch::default();
        self.pruning_import_store.clear_batch(&mut batch).unwrap();
        let info = self.pruning_store.read().get().unwrap();
        self.pruning_store
            .write()
            .set_batch(&mut batch, PruningPointInfo { pruning_point: info.pruning_point, importing_utxo_set: true })
            .unwrap();
        self.db.write(batch).unwrap();
        Ok(())
    }

    /// Appends a chunk of imported UTXOs into the scratch area, rolling
    /// them into the given multiset
    pub fn append_imported_pruning_point_utxos(
        &self,
        chunk: &[(TransactionOutpoint, UtxoEntry)],
        multiset: &mut MuHash,
    ) -> BlockProcessResult<()> {
        let mut batch = WriteBatch::default();
        self.pruning_import_store.write_many_batch(&mut batch, chunk.iter().cloned()).unwrap();
        for (outpoint, entry) in chunk.iter() {
            multiset.add_utxo(outpoint, entry);
        }
        self.db.write(batch).unwrap();
        Ok(())
    }

    /// Atomically switches the virtual base onto the imported pruning-point
    /// UTXO set, after verifying it against the pruning point's header
    /// commitment
    pub fn finish_importing_pruning_point_utxo_set(&self, pruning_point: Hash, multiset: MuHash) -> BlockProcessResult<()> {
        let header = self.headers_store.get_header(pruning_point).map_err(|_| RuleError::UnknownBlock(pruning_point))?;
        if multiset.finalize() != header.utxo_commitment {
            return Err(RuleError::ImportedPruningPointMismatch("imported utxo set does not match the pruning point commitment"));
        }

        let mut batch = WriteBatch::default();

        // Swap the virtual UTXO base and mirror the set into the serving
        // store so this node can in turn serve future syncees
        self.virtual_utxo_store.clear_batch(&mut batch).unwrap();
        self.virtual_utxo_store
            .write_many_batch(&mut batch, self.pruning_import_store.iterate_all().map(|r| r.unwrap()))
            .unwrap();
        self.pruning_utxo_store.clear_batch(&mut batch).unwrap();
        self.pruning_utxo_store
            .write_many_batch(&mut batch, self.pruning_import_store.iterate_all().map(|r| r.unwrap()))
            .unwrap();
        self.pruning_import_store.clear_batch(&mut batch).unwrap();

        self.utxo_multisets_store.insert_batch(&mut batch, pruning_point, multiset.clone()).unwrap();
        self.statuses_store.read().set_batch(&mut batch, pruning_point, StatusUTXOValid).unwrap();
        self.tips_store.write().set_batch(&mut batch, Arc::new(vec![pruning_point])).unwrap();
        self.pruning_store
            .write()
            .set_batch(&mut batch, PruningPointInfo { pruning_point, importing_utxo_set: false })
            .unwrap();

        // The virtual now sits directly on the pruning point: its UTXO set
        // is exactly the imported one, with nothing accepted on top yet
        let virtual_gd = self.ghostdag_manager.ghostdag(&[pruning_point]);
        let state = VirtualState {
            parents: vec![pruning_point],
            daa_score: header.daa_score,
            bits: header.bits,
            past_median_time: header.timestamp,
            multiset,
            utxo_diff: UtxoDiff::default(),
            accepted_tx_ids: Vec::new(),
            mergeset_rewards: MergesetRewards::new(),
            ghostdag_data: virtual_gd,
        };
        self.virtual_state_store.write().set_batch(&mut batch, Arc::new(state)).unwrap();

        self.db.write(batch).unwrap();
        Ok(())
    }
}
