use std::collections::{HashMap, HashSet};
use std::sync::Arc;

pub mod block;
pub mod blockhash;
pub mod blockstatus;
pub mod hashing;
pub mod header;
pub mod muhash;
pub mod subnets;
pub mod tx;
pub mod utxo;
pub mod wire;

use sedra_hashes::Hash;

/// Integer type for accumulated PoW of blue blocks
pub type BlueWorkType = sedra_math::Uint256;

/// The type used to represent the GHOSTDAG K parameter
pub type KType = u8;

pub type BlockHashMap<V> = HashMap<Hash, V>;
pub type BlockHashSet = HashSet<Hash>;
pub type HashKTypeMap = Arc<BlockHashMap<KType>>;
