use crate::errors::{BlockProcessResult, RuleError};
use crate::model::stores::ghostdag::GhostdagData;
use sedra_consensus_core::subnets::SUBNETWORK_ID_COINBASE;
use sedra_consensus_core::tx::{ScriptPublicKey, Transaction, TransactionOutput};
use sedra_consensus_core::BlockHashMap;
use serde::{Deserialize, Serialize};

/// The miner data embedded in a coinbase payload
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MinerData {
    pub script_public_key: ScriptPublicKey,
    pub extra_data: Vec<u8>,
}

impl MinerData {
    pub fn new(script_public_key: ScriptPublicKey, extra_data: Vec<u8>) -> Self {
        Self { script_public_key, extra_data }
    }
}

/// The decoded content of a coinbase payload
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoinbaseData {
    pub blue_score: u64,
    pub subsidy: u64,
    pub miner_data: MinerData,
}

/// The reward owed to a single merged block: its own subsidy plus the fees
/// of its transactions which the merging block accepted, paid to the miner
/// script committed in the merged block's coinbase payload
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRewardData {
    pub subsidy: u64,
    pub total_fees: u64,
    pub script_public_key: ScriptPublicKey,
}

impl BlockRewardData {
    pub fn new(subsidy: u64, total_fees: u64, script_public_key: ScriptPublicKey) -> Self {
        Self { subsidy, total_fees, script_public_key }
    }
}

/// Per-block rewards keyed by the merged block
pub type MergesetRewards = BlockHashMap<BlockRewardData>;

/// Builds and validates coinbase transactions. The coinbase of a block pays
/// each of its blue merge-set blocks that block's own reward, so merged
/// blocks' miners are compensated by whichever chain block merges them.
#[derive(Clone)]
pub struct CoinbaseManager {
    base_subsidy: u64,
    max_coinbase_payload_len: usize,
}

const PAYLOAD_MIN_LEN: usize = 8 + 8 + 2 + 1;

impl CoinbaseManager {
    pub fn new(base_subsidy: u64, max_coinbase_payload_len: usize) -> Self {
        Self { base_subsidy, max_coinbase_payload_len }
    }

    pub fn calc_block_subsidy(&self, _daa_score: u64) -> u64 {
        // A constant emission schedule; deflationary phases plug in here
        self.base_subsidy
    }

    /// Builds the expected coinbase transaction of a block: one output per
    /// rewarded blue merge-set block (in consensus order), plus a payload
    /// committing the block's own blue score, subsidy and miner data
    pub fn expected_coinbase_transaction(
        &self,
        blue_score: u64,
        miner_data: &MinerData,
        ghostdag_data: &GhostdagData,
        mergeset_rewards: &MergesetRewards,
    ) -> Transaction {
        let subsidy = self.calc_block_subsidy(blue_score);
        let payload =
            Self::serialize_coinbase_payload(&CoinbaseData { blue_score, subsidy, miner_data: miner_data.clone() });

        let mut outputs = Vec::with_capacity(ghostdag_data.mergeset_blues.len());
        for blue in ghostdag_data.mergeset_blues.iter() {
            // Blocks with no reward entry (the genesis) earn nothing; red
            // merge-set blocks are never paid, so fees of transactions
            // accepted out of them are burned
            let Some(reward) = mergeset_rewards.get(blue) else { continue };
            let value = reward.subsidy + reward.total_fees;
            if value > 0 {
                outputs.push(TransactionOutput::new(value, reward.script_public_key.clone()));
            }
        }

        Transaction::new(0, vec![], outputs, 0, SUBNETWORK_ID_COINBASE, 0, payload)
    }

    pub fn serialize_coinbase_payload(data: &CoinbaseData) -> Vec<u8> {
        let script = data.miner_data.script_public_key.script();
        let mut payload = Vec::with_capacity(PAYLOAD_MIN_LEN + script.len() + data.miner_data.extra_data.len());
        payload.extend_from_slice(&data.blue_score.to_le_bytes());
        payload.extend_from_slice(&data.subsidy.to_le_bytes());
        payload.extend_from_slice(&data.miner_data.script_public_key.version().to_le_bytes());
        payload.push(script.len() as u8);
        payload.extend_from_slice(script);
        payload.extend_from_slice(&data.miner_data.extra_data);
        payload
    }

    pub fn deserialize_coinbase_payload(&self, payload: &[u8]) -> BlockProcessResult<CoinbaseData> {
        if payload.len() < PAYLOAD_MIN_LEN || payload.len() > self.max_coinbase_payload_len {
            return Err(RuleError::BadCoinbasePayload);
        }
        let blue_score = u64::from_le_bytes(payload[0..8].try_into().unwrap());
        let subsidy = u64::from_le_bytes(payload[8..16].try_into().unwrap());
        let version = u16::from_le_bytes(payload[16..18].try_into().unwrap());
        let script_len = payload[18] as usize;
        if payload.len() < PAYLOAD_MIN_LEN + script_len {
            return Err(RuleError::BadCoinbasePayload);
        }
        let script = payload[PAYLOAD_MIN_LEN..PAYLOAD_MIN_LEN + script_len].to_vec();
        let extra_data = payload[PAYLOAD_MIN_LEN + script_len..].to_vec();
        Ok(CoinbaseData {
            blue_score,
            subsidy,
            miner_data: MinerData::new(ScriptPublicKey::from_vec(version, script), extra_data),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sedra_hashes::Hash;

    #[test]
    fn test_payload_roundtrip() {
        let manager = CoinbaseManager::new(50_000_000_000, 204);
        let data = CoinbaseData {
            blue_score: 1234,
            subsidy: 50_000_000_000,
            miner_data: MinerData::new(ScriptPublicKey::from_vec(0, vec![0x51]), b"miner/v1".to_vec()),
        };
        let payload = CoinbaseManager::serialize_coinbase_payload(&data);
        let decoded = manager.deserialize_coinbase_payload(&payload).unwrap();
        assert_eq!(decoded, data);

        assert!(manager.deserialize_coinbase_payload(&[]).is_err());
        assert!(manager.deserialize_coinbase_payload(&vec![0u8; 500]).is_err());
    }

    #[test]
    fn test_expected_coinbase_pays_each_merged_miner() {
        let manager = CoinbaseManager::new(100, 204);
        let own_miner = MinerData::new(ScriptPublicKey::from_vec(0, vec![0x51]), vec![]);

        let selected_parent = Hash::from_u64(1);
        let merged_blue = Hash::from_u64(2);
        let merged_red = Hash::from_u64(3);

        let mut ghostdag_data = GhostdagData::new_with_selected_parent(selected_parent, 5);
        ghostdag_data.add_blue(merged_blue, 0, &Default::default());
        ghostdag_data.add_red(merged_red);

        let sp_script = ScriptPublicKey::from_vec(0, vec![0x52]);
        let blue_script = ScriptPublicKey::from_vec(0, vec![0x53]);
        let red_script = ScriptPublicKey::from_vec(0, vec![0x54]);
        let mut rewards = MergesetRewards::new();
        rewards.insert(selected_parent, BlockRewardData::new(100, 25, sp_script.clone()));
        rewards.insert(merged_blue, BlockRewardData::new(100, 0, blue_script.clone()));
        rewards.insert(merged_red, BlockRewardData::new(100, 7, red_script));

        let tx = manager.expected_coinbase_transaction(7, &own_miner, &ghostdag_data, &rewards);
        assert!(tx.is_coinbase());

        // One output per blue merge-set block in consensus order; the red
        // block earns nothing
        assert_eq!(tx.outputs.len(), 2);
        assert_eq!(tx.outputs[0].value, 125);
        assert_eq!(tx.outputs[0].script_public_key, sp_script);
        assert_eq!(tx.outputs[1].value, 100);
        assert_eq!(tx.outputs[1].script_public_key, blue_script);

        let decoded = manager.deserialize_coinbase_payload(&tx.payload).unwrap();
        assert_eq!(decoded.blue_score, 7);
        assert_eq!(decoded.subsidy, 100);
        assert_eq!(decoded.miner_data, own_miner);
    }

    #[test]
    fn test_unrewarded_mergeset_yields_no_outputs() {
        let manager = CoinbaseManager::new(100, 204);
        let miner = MinerData::new(ScriptPublicKey::from_vec(0, vec![0x51]), vec![]);
        // The genesis carries no reward entry, so a block merging only it
        // pays nobody
        let ghostdag_data = GhostdagData::new_with_selected_parent(Hash::from_u64(9), 5);
        let tx = manager.expected_coinbase_transaction(1, &miner, &ghostdag_data, &MergesetRewards::new());
        assert!(tx.outputs.is_empty());
    }
}
