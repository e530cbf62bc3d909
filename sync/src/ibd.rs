//! The initial-block-download state machine driven by a lagging node (the
//! syncee) against a single chosen peer (the syncer):
//!
//! `Idle -> Negotiating -> HeadersDownload -> (PruningPointUtxoDownload) ->
//! BodiesDownload -> Idle`
//!
//! Negotiation exchanges block locators, zooming in exponentially until the
//! highest chain block known to both sides is found. Headers are then
//! admitted body-less from that block up to the syncer's tip. When the
//! shared block lies below the syncer's pruning point, the pruning-point
//! UTXO set is imported in chunks and verified against the header
//! commitment before the virtual base is switched. Finally, bodies are
//! downloaded and pushed through the full acceptance pipeline.
//!
//! Any failure drops the session: consensus state is left at its last
//! committed point, and the caller is expected to disconnect the peer.

use crate::errors::{SyncError, SyncResult};
use crate::peer::SyncerPeer;
use sedra_consensus::consensus::Consensus;
use sedra_consensus_core::block::Block;
use sedra_hashes::Hash;
use sedra_muhash::MuHash;

/// The number of blocks requested per bodies batch
pub const IBD_BATCH_SIZE: usize = 99;

/// The number of UTXOs requested per pruning-point chunk
pub const UTXO_CHUNK_SIZE: usize = 1000;

/// An upper bound on locator rounds; exponential zoom-in converges orders
/// of magnitude faster on any realistic DAG
const MAX_NEGOTIATION_ROUNDS: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IbdState {
    Idle,
    Negotiating,
    HeadersDownload,
    PruningPointUtxoDownload,
    BodiesDownload,
}

pub struct IbdFlow<'a, P: SyncerPeer> {
    consensus: &'a Consensus,
    peer: &'a P,
    state: IbdState,
}

impl<'a, P: SyncerPeer> IbdFlow<'a, P> {
    pub fn new(consensus: &'a Consensus, peer: &'a P) -> Self {
        Self { consensus, peer, state: IbdState::Idle }
    }

    pub fn state(&self) -> IbdState {
        self.state
    }

    /// Runs a full sync session against the peer. On success the local
    /// selected tip converges to the syncer's.
    pub fn run(&mut self) -> SyncResult<()> {
        let result = self.run_inner();
        self.state = IbdState::Idle;
        result
    }

    fn run_inner(&mut self) -> SyncResult<()> {
        let syncer_tip = self.peer.headers_selected_tip()?;
        if self.consensus.get_block_status(syncer_tip).map(|s| s.has_block_body()).unwrap_or(false) {
            // Already synced past this peer
            return Ok(());
        }
        log::info!("IBD started towards syncer tip {syncer_tip}");

        self.state = IbdState::Negotiating;
        let shared = self.negotiate()?;
        log::debug!("negotiated the shared chain block {shared}");

        self.state = IbdState::HeadersDownload;
        self.download_headers(shared, syncer_tip)?;

        let syncer_pruning_point = self.peer.pruning_point()?;
        let shared_blue_score = self.consensus.get_blue_score(shared)?;
        let pruning_blue_score = self.consensus.get_blue_score(syncer_pruning_point)?;
        if shared_blue_score < pruning_blue_score {
            // The shared history is too deep to rebuild the UTXO state
            // transaction-by-transaction: import the syncer's pruning-point
            // snapshot instead
            self.state = IbdState::PruningPointUtxoDownload;
            self.download_pruning_point_utxo_set(syncer_pruning_point)?;
        }

        self.state = IbdState::BodiesDownload;
        self.download_bodies(syncer_tip)?;

        log::info!("IBD finished at the selected tip {}", self.consensus.get_selected_tip_hash());
        Ok(())
    }

    /// Exchanges block locators with the syncer until the highest block on
    /// the local selected chain known to the syncer is pinned down
    fn negotiate(&mut self) -> SyncResult<Hash> {
        let mut low = self.consensus.pruning_point();
        let mut high = self.consensus.get_headers_selected_tip();

        for _ in 0..MAX_NEGOTIATION_ROUNDS {
            if high == low {
                return Ok(low);
            }
            let locator = self.consensus.get_block_locator(high, low)?;
            let (next_high, highest_known) = self.peer.find_next_locator_boundaries(&locator)?;
            match next_high {
                // The syncer knows the top locator entry; no further zoom-in
                // can improve the shared block
                None => return Ok(highest_known),
                Some(next_high) => {
                    if next_high == high && highest_known == low {
                        // The range cannot shrink further
                        return Ok(highest_known);
                    }
                    high = next_high;
                    low = highest_known;
                }
            }
        }
        Err(SyncError::NegotiationFailure)
    }

    /// Streams headers from the shared block up to the syncer's tip,
    /// admitting each into the header structures without a body
    fn download_headers(&mut self, shared: Hash, syncer_tip: Hash) -> SyncResult<()> {
        let mut offset = 0usize;
        loop {
            let chunk = self.peer.request_headers_chunk(shared, syncer_tip, offset)?;
            if chunk.is_empty() {
                break;
            }
            offset += chunk.len();
            for header in chunk {
                // A failure to connect (missing parents) indicates the peer
                // served an inconsistent sequence; bubble and drop
                self.consensus.validate_and_insert_block(Block::from_header_arc(header))?;
            }
        }
        Ok(())
    }

    /// Imports the pruning-point UTXO snapshot chunk by chunk, then
    /// atomically switches the virtual base onto it
    fn download_pruning_point_utxo_set(&mut self, pruning_point: Hash) -> SyncResult<()> {
        log::info!("importing the pruning point UTXO set of {pruning_point}");
        self.consensus.start_importing_pruning_point_utxo_set()?;

        let mut multiset = MuHash::new();
        let mut from = None;
        loop {
            let chunk = self.peer.request_pruning_point_utxos(from, UTXO_CHUNK_SIZE)?;
            if chunk.is_empty() {
                break;
            }
            from = Some(chunk.last().unwrap().0);
            let full = chunk.len() == UTXO_CHUNK_SIZE;
            self.consensus.append_imported_pruning_point_utxos(&chunk, &mut multiset)?;
            if !full {
                break;
            }
        }

        self.consensus.finish_importing_pruning_point_utxo_set(pruning_point, multiset)?;

        // The pruning point body itself cannot be re-validated against its
        // (pruned) UTXO context; its correctness is attested by the imported
        // commitment
        let blocks = self.peer.request_blocks(&[pruning_point])?;
        let block = blocks.into_iter().next().ok_or(SyncError::ProtocolViolation("empty blocks response"))?;
        if block.hash() != pruning_point {
            return Err(SyncError::UnexpectedBlock { expected: pruning_point, got: block.hash() });
        }
        self.consensus.insert_trusted_block_body(block)?;
        Ok(())
    }

    /// Downloads the missing bodies in batches, each block passing through
    /// the full acceptance pipeline
    fn download_bodies(&mut self, syncer_tip: Hash) -> SyncResult<()> {
        let missing = self.consensus.get_missing_block_body_hashes(syncer_tip)?;
        if missing.is_empty() {
            return Ok(());
        }
        log::info!("downloading {} block bodies", missing.len());

        for batch in missing.chunks(IBD_BATCH_SIZE) {
            let blocks = self.peer.request_blocks(batch)?;
            if blocks.len() != batch.len() {
                return Err(SyncError::ProtocolViolation("blocks response length mismatch"));
            }
            for (&expected, block) in batch.iter().zip(blocks) {
                if block.hash() != expected {
                    return Err(SyncError::UnexpectedBlock { expected, got: block.hash() });
                }
                if block.is_header_only() {
                    return Err(SyncError::MissingRequestedBody(block.hash()));
                }
                self.consensus.validate_and_insert_block(block)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::spawn_syncer_service;
    use sedra_consensus::consensus::test_consensus::TestConsensus;
    use sedra_consensus::params::{Params, SIMNET_PARAMS};
    use std::time::Duration;

    const TEST_TIMEOUT: Duration = Duration::from_secs(60);

    fn sync(syncer: &TestConsensus, syncee: &TestConsensus) -> SyncResult<()> {
        let (peer, handle) = spawn_syncer_service(syncer.consensus.clone(), TEST_TIMEOUT);
        let result = IbdFlow::new(&syncee.consensus, &peer).run();
        drop(peer);
        handle.join().unwrap();
        result
    }

    #[test]
    fn test_ibd_from_scratch() {
        let params = SIMNET_PARAMS.clone();
        let syncer = TestConsensus::with_miner_tag(&params, b"syncer");
        let syncee = TestConsensus::with_miner_tag(&params, b"syncee");

        syncer.mine_chain(100).unwrap();
        sync(&syncer, &syncee).unwrap();

        assert_eq!(syncer.get_selected_tip_hash(), syncee.get_selected_tip_hash());
        assert_eq!(syncer.get_block_count(), syncee.get_block_count());
    }

    #[test]
    fn test_ibd_with_partial_overlap() {
        let params = SIMNET_PARAMS.clone();
        let syncer = TestConsensus::with_miner_tag(&params, b"syncer");
        let syncee = TestConsensus::with_miner_tag(&params, b"syncee");

        // The syncee holds a couple of blocks of its own, forcing more than
        // one locator round to find the shared chain block
        syncee.mine_chain(2).unwrap();
        syncer.mine_chain(50).unwrap();

        sync(&syncer, &syncee).unwrap();
        assert_eq!(syncer.get_selected_tip_hash(), syncee.get_selected_tip_hash());
        // The syncee kept its own side blocks on top of the synced chain
        assert_eq!(syncee.get_block_count(), syncer.get_block_count() + 2);
    }

    fn pruning_params() -> Params {
        let mut params = SIMNET_PARAMS.clone();
        // A pruning depth of 6
        params.finality_duration = 2 * params.target_time_per_block;
        params.ghostdag_k = 0;
        params
    }

    #[test]
    fn test_ibd_with_pruning() {
        let params = pruning_params();
        let syncer = TestConsensus::with_miner_tag(&params, b"syncer");
        let syncee = TestConsensus::with_miner_tag(&params, b"syncee");

        // Syncee-only blocks ahead of the sync
        const SYNCEE_ONLY_BLOCKS: u64 = 2;
        syncee.mine_chain(SYNCEE_ONLY_BLOCKS as usize).unwrap();
        syncer.mine_chain(99).unwrap();

        // The syncer must have pruned some bodies
        assert!(syncer.get_block_count() < syncer.get_header_count());

        sync(&syncer, &syncee).unwrap();

        assert_eq!(syncer.get_selected_tip_hash(), syncee.get_selected_tip_hash());
        // The syncee imported the pruning point snapshot, so it holds only
        // the syncer's unpruned bodies plus its own blocks and genesis
        assert_eq!(syncee.get_block_count(), syncer.get_block_count() + SYNCEE_ONLY_BLOCKS + 1);
        assert_eq!(syncee.get_header_count(), syncer.get_header_count() + SYNCEE_ONLY_BLOCKS);
        // And its virtual UTXO state matches the syncer's
        assert_eq!(
            syncee.get_virtual_state().multiset.finalize(),
            syncer.get_virtual_state().multiset.finalize()
        );
    }

    #[test]
    fn test_ibd_two_chains_converge() {
        let params = SIMNET_PARAMS.clone();
        let short = TestConsensus::with_miner_tag(&params, b"short");
        let long = TestConsensus::with_miner_tag(&params, b"long");
        let syncee = TestConsensus::with_miner_tag(&params, b"fresh");

        // Many parallel single-block chains over genesis
        let siblings: Vec<_> = (0u8..30)
            .map(|i| {
                let template = short
                    .build_block_template(
                        sedra_consensus::processes::coinbase::MinerData::new(
                            sedra_txscript_op_true(),
                            vec![i],
                        ),
                        vec![],
                    )
                    .unwrap();
                short.solve_block(template)
            })
            .collect();
        for block in siblings {
            short.consensus.validate_and_insert_block(block).unwrap();
        }

        // A long chain elsewhere
        long.mine_chain(100).unwrap();

        // Short syncs from long and converges onto the heavier chain
        sync(&long, &short).unwrap();
        assert_eq!(short.get_selected_tip_hash(), long.get_selected_tip_hash());

        // Mine on the short node until its parallel past is fully merged
        // under a single-parent chain block
        loop {
            let block = short.mine_next_block().unwrap();
            if block.header.parents.len() == 1 {
                break;
            }
        }

        // A fresh syncee then converges onto the merged DAG
        sync(&short, &syncee).unwrap();
        assert_eq!(short.get_selected_tip_hash(), syncee.get_selected_tip_hash());
    }

    fn sedra_txscript_op_true() -> sedra_consensus_core::tx::ScriptPublicKey {
        sedra_consensus_core::tx::ScriptPublicKey::from_vec(0, vec![0x51])
    }
}
