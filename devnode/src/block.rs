//! Blocks, headers and withdrawals.

use bytes::Bytes;
use devnode_common::{
    BlobParams, ChainConfig, Eip, BASE_FEE_MAX_CHANGE_DENOMINATOR, ELASTICITY_MULTIPLIER,
    EMPTY_OMMERS_HASH, EMPTY_TRIE_HASH, INITIAL_BASE_FEE,
};
use ethereum_types::{Address, Bloom, H256, H64, U256};
use keccak_hash::keccak;
use rlp::{Encodable, RlpStream};
use rlp_derive::{RlpDecodable, RlpEncodable};

use crate::tx::SignedTransaction;

/// A beacon chain withdrawal (EIP-4895). The amount is in gwei.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct Withdrawal {
    pub index: u64,
    pub validator_index: u64,
    pub address: Address,
    pub amount: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Header {
    pub parent_hash: H256,
    pub ommers_hash: H256,
    pub coinbase: Address,
    pub state_root: H256,
    pub transactions_root: H256,
    pub receipts_root: H256,
    pub logs_bloom: Bloom,
    pub difficulty: U256,
    pub number: u64,
    pub gas_limit: u64,
    pub gas_used: u64,
    pub timestamp: u64,
    pub extra_data: Bytes,
    /// `prevRandao` after the merge.
    pub mix_hash: H256,
    pub nonce: H64,
    /// London.
    pub base_fee_per_gas: Option<U256>,
    /// Shanghai.
    pub withdrawals_root: Option<H256>,
    /// Cancun.
    pub blob_gas_used: Option<u64>,
    /// Cancun.
    pub excess_blob_gas: Option<u64>,
    /// Cancun.
    pub parent_beacon_block_root: Option<H256>,
}

impl Default for Header {
    fn default() -> Self {
        Self {
            parent_hash: H256::zero(),
            ommers_hash: EMPTY_OMMERS_HASH,
            coinbase: Address::zero(),
            state_root: EMPTY_TRIE_HASH,
            transactions_root: EMPTY_TRIE_HASH,
            receipts_root: EMPTY_TRIE_HASH,
            logs_bloom: Bloom::zero(),
            difficulty: U256::zero(),
            number: 0,
            gas_limit: 0,
            gas_used: 0,
            timestamp: 0,
            extra_data: Bytes::new(),
            mix_hash: H256::zero(),
            nonce: H64::zero(),
            base_fee_per_gas: None,
            withdrawals_root: None,
            blob_gas_used: None,
            excess_blob_gas: None,
            parent_beacon_block_root: None,
        }
    }
}

impl Encodable for Header {
    fn rlp_append(&self, s: &mut RlpStream) {
        let optional = [
            self.base_fee_per_gas.is_some(),
            self.withdrawals_root.is_some(),
            self.blob_gas_used.is_some(),
            self.excess_blob_gas.is_some(),
            self.parent_beacon_block_root.is_some(),
        ];
        s.begin_list(15 + optional.iter().filter(|present| **present).count());

        s.append(&self.parent_hash);
        s.append(&self.ommers_hash);
        s.append(&self.coinbase);
        s.append(&self.state_root);
        s.append(&self.transactions_root);
        s.append(&self.receipts_root);
        s.append(&self.logs_bloom);
        s.append(&self.difficulty);
        s.append(&self.number);
        s.append(&self.gas_limit);
        s.append(&self.gas_used);
        s.append(&self.timestamp);
        s.append(&self.extra_data);
        s.append(&self.mix_hash);
        s.append(&self.nonce);

        if let Some(base_fee) = &self.base_fee_per_gas {
            s.append(base_fee);
        }
        if let Some(root) = &self.withdrawals_root {
            s.append(root);
        }
        if let Some(used) = &self.blob_gas_used {
            s.append(used);
        }
        if let Some(excess) = &self.excess_blob_gas {
            s.append(excess);
        }
        if let Some(root) = &self.parent_beacon_block_root {
            s.append(root);
        }
    }
}

impl Header {
    /// Genesis header for `config`, with every fork field the configured
    /// hardfork requires.
    pub fn genesis(
        config: &ChainConfig,
        gas_limit: u64,
        timestamp: u64,
        state_root: H256,
    ) -> Self {
        Self {
            state_root,
            gas_limit,
            timestamp,
            base_fee_per_gas: config
                .is_activated_at(Eip::Eip1559, 0)
                .then(|| INITIAL_BASE_FEE.into()),
            withdrawals_root: config
                .is_activated_at(Eip::Eip4895, 0)
                .then_some(EMPTY_TRIE_HASH),
            blob_gas_used: config.is_activated_at(Eip::Eip4844, 0).then_some(0),
            excess_blob_gas: config.is_activated_at(Eip::Eip4844, 0).then_some(0),
            parent_beacon_block_root: config
                .is_activated_at(Eip::Eip4788, 0)
                .then(H256::zero),
            ..Default::default()
        }
    }

    pub fn hash(&self) -> H256 {
        keccak(rlp::encode(self))
    }

    /// Base fee of a child block under EIP-1559, or `None` if this block has
    /// no base fee.
    pub fn next_base_fee(&self) -> Option<U256> {
        let base_fee = self.base_fee_per_gas?;
        let target = self.gas_limit / ELASTICITY_MULTIPLIER;
        if target == 0 || self.gas_used == target {
            return Some(base_fee);
        }

        let denominator = U256::from(target) * BASE_FEE_MAX_CHANGE_DENOMINATOR;
        Some(match self.gas_used > target {
            true => {
                let delta = base_fee * (self.gas_used - target) / denominator;
                base_fee + delta.max(U256::one())
            }
            false => {
                let delta = base_fee * (target - self.gas_used) / denominator;
                base_fee.saturating_sub(delta)
            }
        })
    }

    /// Excess blob gas of a child block. Parents without blob fields count as
    /// zero.
    pub fn next_excess_blob_gas(&self, params: &BlobParams) -> u64 {
        params.next_excess_blob_gas(
            self.excess_blob_gas.unwrap_or_default(),
            self.blob_gas_used.unwrap_or_default(),
        )
    }

    /// Blob gas price of this block, if it carries blob fields.
    pub fn blob_base_fee(&self, params: &BlobParams) -> Option<U256> {
        self.excess_blob_gas
            .map(|excess| params.blob_base_fee(excess))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Block {
    pub header: Header,
    /// Transactions in their minimal form.
    pub transactions: Vec<SignedTransaction>,
    pub withdrawals: Option<Vec<Withdrawal>>,
}

impl Block {
    pub fn hash(&self) -> H256 {
        self.header.hash()
    }

    pub fn number(&self) -> u64 {
        self.header.number
    }
}

#[cfg(test)]
mod tests {
    use devnode_common::Hardfork;

    use super::*;

    fn header(gas_limit: u64, gas_used: u64, base_fee: u64) -> Header {
        Header {
            gas_limit,
            gas_used,
            base_fee_per_gas: Some(base_fee.into()),
            ..Default::default()
        }
    }

    #[test]
    fn base_fee_follows_gas_usage() {
        let base = INITIAL_BASE_FEE;
        assert_eq!(
            header(30_000_000, 15_000_000, base).next_base_fee(),
            Some(base.into())
        );
        assert_eq!(
            header(30_000_000, 30_000_000, base).next_base_fee(),
            Some((base + base / 8).into())
        );
        assert_eq!(
            header(30_000_000, 0, base).next_base_fee(),
            Some((base - base / 8).into())
        );
        // Increases by at least one wei.
        assert_eq!(
            header(30_000_000, 15_000_001, 1).next_base_fee(),
            Some(2.into())
        );
        assert_eq!(Header::default().next_base_fee(), None);
    }

    #[test]
    fn optional_fields_extend_the_header_list() {
        let pre_london = Header::default();
        let cancun = Header::genesis(&ChainConfig::default(), 30_000_000, 0, EMPTY_TRIE_HASH);

        assert_eq!(rlp::Rlp::new(&rlp::encode(&pre_london)).item_count(), Ok(15));
        assert_eq!(rlp::Rlp::new(&rlp::encode(&cancun)).item_count(), Ok(20));
        assert_ne!(pre_london.hash(), cancun.hash());
    }

    #[test]
    fn genesis_fields_follow_hardfork() {
        let berlin = ChainConfig {
            hardfork: Hardfork::Berlin,
            ..Default::default()
        };
        let genesis = Header::genesis(&berlin, 30_000_000, 0, EMPTY_TRIE_HASH);
        assert_eq!(genesis.base_fee_per_gas, None);
        assert_eq!(genesis.excess_blob_gas, None);

        let cancun = Header::genesis(&ChainConfig::default(), 30_000_000, 0, EMPTY_TRIE_HASH);
        assert_eq!(cancun.base_fee_per_gas, Some(INITIAL_BASE_FEE.into()));
        assert_eq!(cancun.withdrawals_root, Some(EMPTY_TRIE_HASH));
        assert_eq!(cancun.blob_base_fee(&BlobParams::CANCUN), Some(U256::one()));
    }
}
