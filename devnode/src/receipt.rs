//! Transaction receipts and logs.

use bytes::Bytes;
use ethereum_types::{Address, Bloom, BloomInput, H256, U256};
use rlp::{DecoderError, Rlp, RlpStream};
use rlp_derive::{RlpDecodable, RlpEncodable};
use serde::Serialize;

use crate::tx::TxType;

/// A log emitted during execution.
#[derive(Clone, Debug, Default, PartialEq, Eq, RlpEncodable, RlpDecodable, Serialize)]
pub struct Log {
    pub address: Address,
    pub topics: Vec<H256>,
    #[serde(serialize_with = "crate::hex::serialize")]
    pub data: Bytes,
}

/// The fork dependent part of a receipt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReceiptOutcome {
    /// Intermediate state root, before Byzantium.
    StateRoot(H256),
    /// Execution status (EIP-658).
    Status(bool),
    /// Status of a blob transaction together with its blob fee accounting.
    /// Only the status survives storage.
    Blob {
        status: bool,
        blob_gas_used: u64,
        blob_gas_price: U256,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxReceipt {
    pub outcome: ReceiptOutcome,
    /// Gas used in the block up to and including this transaction.
    pub cumulative_block_gas_used: u64,
    pub logs_bloom: Bloom,
    pub logs: Vec<Log>,
}

impl TxReceipt {
    /// Status of post-Byzantium receipts.
    pub fn status(&self) -> Option<bool> {
        match self.outcome {
            ReceiptOutcome::StateRoot(_) => None,
            ReceiptOutcome::Status(status) | ReceiptOutcome::Blob { status, .. } => Some(status),
        }
    }

    /// Encoding committed to by the receipts trie:
    /// `[type ||] rlp([status | root, cumulative gas, bloom, logs])`.
    pub fn encode_consensus(&self, tx_type: TxType) -> Vec<u8> {
        let mut s = RlpStream::new_list(4);
        self.append_outcome(&mut s);
        s.append(&self.cumulative_block_gas_used);
        s.append(&self.logs_bloom);
        s.append_list::<Log, Log>(&self.logs);

        let payload = s.out();
        match tx_type {
            TxType::Legacy => payload.to_vec(),
            ty => {
                let mut out = Vec::with_capacity(payload.len() + 1);
                out.push(ty as u8);
                out.extend_from_slice(&payload);
                out
            }
        }
    }

    /// Appends the storage form `[status | root, cumulative gas, logs]`. The
    /// bloom is recomputed on demand instead of being stored.
    pub(crate) fn append_storage(&self, s: &mut RlpStream) {
        s.begin_list(3);
        self.append_outcome(s);
        s.append(&self.cumulative_block_gas_used);
        s.append_list::<Log, Log>(&self.logs);
    }

    /// Decodes the storage form. A 32 byte first field is a pre-Byzantium
    /// state root. The bloom is left empty.
    pub(crate) fn decode_storage(rlp: &Rlp) -> Result<Self, DecoderError> {
        if rlp.item_count()? != 3 {
            return Err(DecoderError::RlpIncorrectListLen);
        }

        let first = rlp.at(0)?;
        let outcome = match first.data()?.len() {
            32 => ReceiptOutcome::StateRoot(first.as_val()?),
            _ => ReceiptOutcome::Status(first.as_val::<u8>()? == 1),
        };

        Ok(Self {
            outcome,
            cumulative_block_gas_used: rlp.val_at(1)?,
            logs_bloom: Bloom::zero(),
            logs: rlp.list_at(2)?,
        })
    }

    /// Recomputes the bloom from the logs.
    pub fn with_logs_bloom(mut self) -> Self {
        self.logs_bloom = logs_bloom(&self.logs);
        self
    }

    fn append_outcome(&self, s: &mut RlpStream) {
        match &self.outcome {
            ReceiptOutcome::StateRoot(root) => s.append(root),
            ReceiptOutcome::Status(status) | ReceiptOutcome::Blob { status, .. } => {
                s.append(&u8::from(*status))
            }
        };
    }
}

/// Bloom filter over the addresses and topics of `logs`.
pub fn logs_bloom<'a>(logs: impl IntoIterator<Item = &'a Log>) -> Bloom {
    let mut bloom = Bloom::zero();
    for log in logs {
        bloom.accrue(BloomInput::Raw(log.address.as_bytes()));
        for topic in &log.topics {
            bloom.accrue(BloomInput::Raw(topic.as_bytes()));
        }
    }
    bloom
}
