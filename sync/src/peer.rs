use crate::errors::{SyncError, SyncResult};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use sedra_consensus::consensus::Consensus;
use sedra_consensus_core::block::Block;
use sedra_consensus_core::header::Header;
use sedra_consensus_core::tx::{TransactionOutpoint, UtxoEntry};
use sedra_hashes::Hash;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// The capability a syncee requires from the peer it syncs from. Implemented
/// over whatever wire transport the node runs; tests use an in-process
/// channel pair.
pub trait SyncerPeer {
    fn headers_selected_tip(&self) -> SyncResult<Hash>;
    fn pruning_point(&self) -> SyncResult<Hash>;

    /// Runs a locator round on the syncer: returns the zoom-in boundaries
    /// `(next unknown, highest known)` per its local DAG
    fn find_next_locator_boundaries(&self, locator: &[Hash]) -> SyncResult<(Option<Hash>, Hash)>;

    /// Returns a chunk of ordered headers in the future of `low`, up to
    /// `high`, starting after `offset` already-delivered headers
    fn request_headers_chunk(&self, low: Hash, high: Hash, offset: usize) -> SyncResult<Vec<Arc<Header>>>;

    /// Returns a page of the syncer's pruning-point UTXO set
    fn request_pruning_point_utxos(
        &self,
        from: Option<TransactionOutpoint>,
        limit: usize,
    ) -> SyncResult<Vec<(TransactionOutpoint, UtxoEntry)>>;

    /// Returns full blocks for the requested hashes, in request order
    fn request_blocks(&self, hashes: &[Hash]) -> SyncResult<Vec<Block>>;
}

/// The number of headers transferred per chunk
pub const HEADERS_CHUNK_SIZE: usize = 1000;

enum SyncRequest {
    HeadersSelectedTip,
    PruningPoint,
    FindNextLocatorBoundaries(Vec<Hash>),
    HeadersChunk { low: Hash, high: Hash, offset: usize },
    PruningPointUtxos { from: Option<TransactionOutpoint>, limit: usize },
    Blocks(Vec<Hash>),
}

enum SyncResponse {
    Hash(Hash),
    Boundaries(Option<Hash>, Hash),
    Headers(Vec<Arc<Header>>),
    Utxos(Vec<(TransactionOutpoint, UtxoEntry)>),
    Blocks(Vec<Block>),
    Error(String),
}

/// A peer backed by an in-process request/response channel pair, served by
/// a thread holding the syncer's consensus
pub struct ChannelPeer {
    request_sender: Sender<SyncRequest>,
    response_receiver: Receiver<SyncResponse>,
    timeout: Duration,
}

impl ChannelPeer {
    fn roundtrip(&self, request: SyncRequest) -> SyncResult<SyncResponse> {
        self.request_sender.send(request).map_err(|_| SyncError::Disconnected)?;
        match self.response_receiver.recv_timeout(self.timeout) {
            Ok(SyncResponse::Error(message)) => {
                log::debug!("syncer reported: {message}");
                Err(SyncError::ProtocolViolation("syncer failed to serve the request"))
            }
            Ok(response) => Ok(response),
            Err(RecvTimeoutError::Timeout) => Err(SyncError::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(SyncError::Disconnected),
        }
    }
}

impl SyncerPeer for ChannelPeer {
    fn headers_selected_tip(&self) -> SyncResult<Hash> {
        match self.roundtrip(SyncRequest::HeadersSelectedTip)? {
            SyncResponse::Hash(hash) => Ok(hash),
            _ => Err(SyncError::ProtocolViolation("unexpected response type")),
        }
    }

    fn pruning_point(&self) -> SyncResult<Hash> {
        match self.roundtrip(SyncRequest::PruningPoint)? {
            SyncResponse::Hash(hash) => Ok(hash),
            _ => Err(SyncError::ProtocolViolation("unexpected response type")),
        }
    }

    fn find_next_locator_boundaries(&self, locator: &[Hash]) -> SyncResult<(Option<Hash>, Hash)> {
        match self.roundtrip(SyncRequest::FindNextLocatorBoundaries(locator.to_vec()))? {
            SyncResponse::Boundaries(high, low) => Ok((high, low)),
            _ => Err(SyncError::ProtocolViolation("unexpected response type")),
        }
    }

    fn request_headers_chunk(&self, low: Hash, high: Hash, offset: usize) -> SyncResult<Vec<Arc<Header>>> {
        match self.roundtrip(SyncRequest::HeadersChunk { low, high, offset })? {
            SyncResponse::Headers(headers) => Ok(headers),
            _ => Err(SyncError::ProtocolViolation("unexpected response type")),
        }
    }

    fn request_pruning_point_utxos(
        &self,
        from: Option<TransactionOutpoint>,
        limit: usize,
    ) -> SyncResult<Vec<(TransactionOutpoint, UtxoEntry)>> {
        match self.roundtrip(SyncRequest::PruningPointUtxos { from, limit })? {
            SyncResponse::Utxos(utxos) => Ok(utxos),
            _ => Err(SyncError::ProtocolViolation("unexpected response type")),
        }
    }

    fn request_blocks(&self, hashes: &[Hash]) -> SyncResult<Vec<Block>> {
        match self.roundtrip(SyncRequest::Blocks(hashes.to_vec()))? {
            SyncResponse::Blocks(blocks) => Ok(blocks),
            _ => Err(SyncError::ProtocolViolation("unexpected response type")),
        }
    }
}

fn serve(consensus: &Consensus, request: SyncRequest) -> SyncResponse {
    match request {
        SyncRequest::HeadersSelectedTip => SyncResponse::Hash(consensus.get_headers_selected_tip()),
        SyncRequest::PruningPoint => SyncResponse::Hash(consensus.pruning_point()),
        SyncRequest::FindNextLocatorBoundaries(locator) => {
            let (high, low) = consensus.find_next_locator_boundaries(&locator);
            SyncResponse::Boundaries(high, low)
        }
        SyncRequest::HeadersChunk { low, high, offset } => match consensus.get_hashes_between(low, high) {
            Ok(hashes) => {
                let headers = hashes
                    .into_iter()
                    .skip(offset)
                    .take(HEADERS_CHUNK_SIZE)
                    .map(|hash| consensus.get_block_header(hash).expect("every listed hash has a header"))
                    .collect();
                SyncResponse::Headers(headers)
            }
            Err(e) => SyncResponse::Error(e.to_string()),
        },
        SyncRequest::PruningPointUtxos { from, limit } => match consensus.get_pruning_point_utxos(from, limit) {
            Ok(utxos) => SyncResponse::Utxos(utxos),
            Err(e) => SyncResponse::Error(e.to_string()),
        },
        SyncRequest::Blocks(hashes) => {
            let mut blocks = Vec::with_capacity(hashes.len());
            for hash in hashes {
                match consensus.get_block(hash) {
                    Ok(block) => blocks.push(block),
                    Err(e) => return SyncResponse::Error(e.to_string()),
                }
            }
            SyncResponse::Blocks(blocks)
        }
    }
}

/// Spawns a thread serving sync requests from the given consensus and
/// returns the peer handle a syncee can drive. Dropping the peer shuts the
/// service down.
pub fn spawn_syncer_service(consensus: Arc<Consensus>, timeout: Duration) -> (ChannelPeer, JoinHandle<()>) {
    let (request_sender, request_receiver) = bounded::<SyncRequest>(16);
    let (response_sender, response_receiver) = bounded::<SyncResponse>(16);

    let handle = std::thread::spawn(move || {
        while let Ok(request) = request_receiver.recv() {
            let response = serve(&consensus, request);
            if response_sender.send(response).is_err() {
                break;
            }
        }
    });

    (ChannelPeer { request_sender, response_receiver, timeout }, handle)
}
