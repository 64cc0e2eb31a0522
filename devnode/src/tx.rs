//! Transactions and their EIP-2718 encodings.
//!
//! A [`Transaction`] is the unsigned payload of one of the four supported
//! envelope types. Signing it, decoding it from the wire, or attaching a
//! signature that recovers successfully yields a [`SignedTransaction`], which
//! always knows its hash and sender.

use std::ops::Deref;

use bytes::Bytes;
use devnode_common::BLOB_GAS_PER_BLOB;
use ethereum_types::{Address, H256, U256};
pub use k256::ecdsa::SigningKey;
use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, VerifyingKey};
use keccak_hash::keccak;
use rlp::{DecoderError, Rlp, RlpStream};
use rlp_derive::{RlpDecodable, RlpEncodable};
use thiserror::Error;

/// Half of the secp256k1 curve order. Signatures with a larger `s` are
/// malleable and rejected (EIP-2).
const SECP256K1N_HALF: U256 = U256([
    0xDFE9_2F46_681B_20A0,
    0x5D57_6E73_57A4_501D,
    0xFFFF_FFFF_FFFF_FFFF,
    0x7FFF_FFFF_FFFF_FFFF,
]);

/// Errors raised while decoding, signing or recovering transactions.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TxError {
    #[error("unsupported transaction type {0:#04x}")]
    UnsupportedType(u8),
    #[error("empty transaction payload")]
    Empty,
    #[error("malformed transaction rlp: {0}")]
    Rlp(#[from] DecoderError),
    #[error("trailing bytes after transaction payload")]
    TrailingBytes,
    #[error("invalid transaction signature")]
    InvalidSignature,
    #[error("blob sidecar carries {got} blobs, transaction commits to {expected}")]
    SidecarMismatch { expected: usize, got: usize },
}

/// EIP-2718 transaction type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum TxType {
    Legacy = 0,
    AccessList = 1,
    FeeMarket = 2,
    Blob = 3,
}

impl TryFrom<u8> for TxType {
    type Error = TxError;

    fn try_from(ty: u8) -> Result<Self, Self::Error> {
        match ty {
            0 => Ok(TxType::Legacy),
            1 => Ok(TxType::AccessList),
            2 => Ok(TxType::FeeMarket),
            3 => Ok(TxType::Blob),
            other => Err(TxError::UnsupportedType(other)),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct AccessListItem {
    pub address: Address,
    pub storage_keys: Vec<H256>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LegacyTx {
    /// Set for EIP-155 replay protected transactions.
    pub chain_id: Option<u64>,
    pub nonce: u64,
    pub gas_price: U256,
    pub gas_limit: u64,
    pub to: Option<Address>,
    pub value: U256,
    pub data: Bytes,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AccessListTx {
    pub chain_id: u64,
    pub nonce: u64,
    pub gas_price: U256,
    pub gas_limit: u64,
    pub to: Option<Address>,
    pub value: U256,
    pub data: Bytes,
    pub access_list: Vec<AccessListItem>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FeeMarketTx {
    pub chain_id: u64,
    pub nonce: u64,
    pub max_priority_fee_per_gas: U256,
    pub max_fee_per_gas: U256,
    pub gas_limit: u64,
    pub to: Option<Address>,
    pub value: U256,
    pub data: Bytes,
    pub access_list: Vec<AccessListItem>,
}

/// Blobs and their KZG commitments and proofs, as gossiped alongside a blob
/// transaction. Never part of the transaction hash.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlobSidecar {
    pub blobs: Vec<Bytes>,
    pub commitments: Vec<Bytes>,
    pub proofs: Vec<Bytes>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlobTx {
    pub chain_id: u64,
    pub nonce: u64,
    pub max_priority_fee_per_gas: U256,
    pub max_fee_per_gas: U256,
    pub gas_limit: u64,
    /// Blob transactions cannot create contracts.
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
    pub access_list: Vec<AccessListItem>,
    pub max_fee_per_blob_gas: U256,
    pub blob_versioned_hashes: Vec<H256>,
    pub sidecar: Option<BlobSidecar>,
}

/// Tip and fee cap of a transaction. Both equal the gas price for legacy and
/// access list transactions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GasPrice {
    pub tip: U256,
    pub max_fee: U256,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Transaction {
    Legacy(LegacyTx),
    AccessList(AccessListTx),
    FeeMarket(FeeMarketTx),
    Blob(BlobTx),
}

macro_rules! common_field {
    ($tx:expr, $inner:ident => $e:expr) => {
        match $tx {
            Transaction::Legacy($inner) => $e,
            Transaction::AccessList($inner) => $e,
            Transaction::FeeMarket($inner) => $e,
            Transaction::Blob($inner) => $e,
        }
    };
}

impl Transaction {
    pub fn tx_type(&self) -> TxType {
        match self {
            Transaction::Legacy(_) => TxType::Legacy,
            Transaction::AccessList(_) => TxType::AccessList,
            Transaction::FeeMarket(_) => TxType::FeeMarket,
            Transaction::Blob(_) => TxType::Blob,
        }
    }

    pub fn chain_id(&self) -> Option<u64> {
        match self {
            Transaction::Legacy(tx) => tx.chain_id,
            Transaction::AccessList(tx) => Some(tx.chain_id),
            Transaction::FeeMarket(tx) => Some(tx.chain_id),
            Transaction::Blob(tx) => Some(tx.chain_id),
        }
    }

    pub fn nonce(&self) -> u64 {
        common_field!(self, tx => tx.nonce)
    }

    pub fn gas_limit(&self) -> u64 {
        common_field!(self, tx => tx.gas_limit)
    }

    pub fn value(&self) -> U256 {
        common_field!(self, tx => tx.value)
    }

    pub fn data(&self) -> &Bytes {
        common_field!(self, tx => &tx.data)
    }

    /// Recipient, or `None` for contract creation.
    pub fn to(&self) -> Option<Address> {
        match self {
            Transaction::Legacy(tx) => tx.to,
            Transaction::AccessList(tx) => tx.to,
            Transaction::FeeMarket(tx) => tx.to,
            Transaction::Blob(tx) => Some(tx.to),
        }
    }

    pub fn access_list(&self) -> &[AccessListItem] {
        match self {
            Transaction::Legacy(_) => &[],
            Transaction::AccessList(tx) => &tx.access_list,
            Transaction::FeeMarket(tx) => &tx.access_list,
            Transaction::Blob(tx) => &tx.access_list,
        }
    }

    pub fn gas_price(&self) -> GasPrice {
        match self {
            Transaction::Legacy(LegacyTx { gas_price, .. })
            | Transaction::AccessList(AccessListTx { gas_price, .. }) => GasPrice {
                tip: *gas_price,
                max_fee: *gas_price,
            },
            Transaction::FeeMarket(FeeMarketTx {
                max_priority_fee_per_gas,
                max_fee_per_gas,
                ..
            })
            | Transaction::Blob(BlobTx {
                max_priority_fee_per_gas,
                max_fee_per_gas,
                ..
            }) => GasPrice {
                tip: *max_priority_fee_per_gas,
                max_fee: *max_fee_per_gas,
            },
        }
    }

    /// Priority fee per gas the block producer receives at `base_fee`,
    /// saturating at zero. A missing base fee counts as zero.
    pub fn effective_tip(&self, base_fee: Option<U256>) -> U256 {
        let base = base_fee.unwrap_or_default();
        let GasPrice { tip, max_fee } = self.gas_price();
        match self {
            Transaction::Legacy(_) | Transaction::AccessList(_) => max_fee.saturating_sub(base),
            Transaction::FeeMarket(_) | Transaction::Blob(_) => {
                tip.min(max_fee.saturating_sub(base))
            }
        }
    }

    /// Price per gas the sender pays at `base_fee`.
    pub fn effective_gas_price(&self, base_fee: Option<U256>) -> U256 {
        let GasPrice { tip, max_fee } = self.gas_price();
        match (self, base_fee) {
            (Transaction::FeeMarket(_) | Transaction::Blob(_), Some(base)) => {
                max_fee.min(base.saturating_add(tip))
            }
            _ => max_fee,
        }
    }

    pub fn max_fee_per_blob_gas(&self) -> Option<U256> {
        match self {
            Transaction::Blob(tx) => Some(tx.max_fee_per_blob_gas),
            _ => None,
        }
    }

    pub fn blob_versioned_hashes(&self) -> &[H256] {
        match self {
            Transaction::Blob(tx) => &tx.blob_versioned_hashes,
            _ => &[],
        }
    }

    /// Blob gas consumed by this transaction, derived from its versioned
    /// hashes.
    pub fn blob_gas(&self) -> u64 {
        self.blob_versioned_hashes().len() as u64 * BLOB_GAS_PER_BLOB
    }

    /// Hash signed by the sender.
    pub fn signing_hash(&self) -> H256 {
        match self {
            Transaction::Legacy(tx) => {
                let mut s = RlpStream::new_list(if tx.chain_id.is_some() { 9 } else { 6 });
                self.rlp_append_fields(&mut s);
                if let Some(chain_id) = tx.chain_id {
                    s.append(&chain_id);
                    s.append(&0u8);
                    s.append(&0u8);
                }
                keccak(s.out())
            }
            _ => {
                let mut s = RlpStream::new_list(self.field_count());
                self.rlp_append_fields(&mut s);
                keccak(with_type_prefix(self.tx_type(), &s.out()))
            }
        }
    }

    /// Signs the transaction with `key`, producing a low-s signature.
    pub fn sign(self, key: &SigningKey) -> Result<SignedTransaction, TxError> {
        let hash = self.signing_hash();
        let (signature, recovery_id) = key
            .sign_prehash_recoverable(hash.as_bytes())
            .map_err(|_| TxError::InvalidSignature)?;
        let (signature, recovery_id) = match signature.normalize_s() {
            Some(normalized) => (
                normalized,
                RecoveryId::from_byte(recovery_id.to_byte() ^ 1)
                    .ok_or(TxError::InvalidSignature)?,
            ),
            None => (signature, recovery_id),
        };

        let bytes = signature.to_bytes();
        let y_parity = recovery_id.to_byte() as u64;
        let v = match &self {
            Transaction::Legacy(LegacyTx {
                chain_id: Some(chain_id),
                ..
            }) => 35 + 2 * chain_id + y_parity,
            Transaction::Legacy(_) => 27 + y_parity,
            _ => y_parity,
        };
        let signature = Signature {
            v,
            r: U256::from_big_endian(&bytes[..32]),
            s: U256::from_big_endian(&bytes[32..]),
        };

        SignedTransaction::from_parts(self, signature)
    }

    fn field_count(&self) -> usize {
        match self {
            Transaction::Legacy(_) => 6,
            Transaction::AccessList(_) => 8,
            Transaction::FeeMarket(_) => 9,
            Transaction::Blob(_) => 11,
        }
    }

    fn rlp_append_fields(&self, s: &mut RlpStream) {
        match self {
            Transaction::Legacy(tx) => {
                s.append(&tx.nonce);
                s.append(&tx.gas_price);
                s.append(&tx.gas_limit);
                append_to(s, tx.to);
                s.append(&tx.value);
                s.append(&tx.data);
            }
            Transaction::AccessList(tx) => {
                s.append(&tx.chain_id);
                s.append(&tx.nonce);
                s.append(&tx.gas_price);
                s.append(&tx.gas_limit);
                append_to(s, tx.to);
                s.append(&tx.value);
                s.append(&tx.data);
                s.append_list::<AccessListItem, AccessListItem>(&tx.access_list);
            }
            Transaction::FeeMarket(tx) => {
                s.append(&tx.chain_id);
                s.append(&tx.nonce);
                s.append(&tx.max_priority_fee_per_gas);
                s.append(&tx.max_fee_per_gas);
                s.append(&tx.gas_limit);
                append_to(s, tx.to);
                s.append(&tx.value);
                s.append(&tx.data);
                s.append_list::<AccessListItem, AccessListItem>(&tx.access_list);
            }
            Transaction::Blob(tx) => {
                s.append(&tx.chain_id);
                s.append(&tx.nonce);
                s.append(&tx.max_priority_fee_per_gas);
                s.append(&tx.max_fee_per_gas);
                s.append(&tx.gas_limit);
                s.append(&tx.to);
                s.append(&tx.value);
                s.append(&tx.data);
                s.append_list::<AccessListItem, AccessListItem>(&tx.access_list);
                s.append(&tx.max_fee_per_blob_gas);
                s.append_list::<H256, H256>(&tx.blob_versioned_hashes);
            }
        }
    }

    /// Decodes the unsigned fields of a typed transaction, which start at
    /// index 0 of `rlp`.
    fn decode_typed_fields(ty: TxType, rlp: &Rlp) -> Result<Self, DecoderError> {
        Ok(match ty {
            TxType::Legacy => Transaction::Legacy(LegacyTx {
                chain_id: None,
                nonce: rlp.val_at(0)?,
                gas_price: rlp.val_at(1)?,
                gas_limit: rlp.val_at(2)?,
                to: decode_to(&rlp.at(3)?)?,
                value: rlp.val_at(4)?,
                data: decode_data(rlp, 5)?,
            }),
            TxType::AccessList => Transaction::AccessList(AccessListTx {
                chain_id: rlp.val_at(0)?,
                nonce: rlp.val_at(1)?,
                gas_price: rlp.val_at(2)?,
                gas_limit: rlp.val_at(3)?,
                to: decode_to(&rlp.at(4)?)?,
                value: rlp.val_at(5)?,
                data: decode_data(rlp, 6)?,
                access_list: rlp.list_at(7)?,
            }),
            TxType::FeeMarket => Transaction::FeeMarket(FeeMarketTx {
                chain_id: rlp.val_at(0)?,
                nonce: rlp.val_at(1)?,
                max_priority_fee_per_gas: rlp.val_at(2)?,
                max_fee_per_gas: rlp.val_at(3)?,
                gas_limit: rlp.val_at(4)?,
                to: decode_to(&rlp.at(5)?)?,
                value: rlp.val_at(6)?,
                data: decode_data(rlp, 7)?,
                access_list: rlp.list_at(8)?,
            }),
            TxType::Blob => Transaction::Blob(BlobTx {
                chain_id: rlp.val_at(0)?,
                nonce: rlp.val_at(1)?,
                max_priority_fee_per_gas: rlp.val_at(2)?,
                max_fee_per_gas: rlp.val_at(3)?,
                gas_limit: rlp.val_at(4)?,
                to: rlp.val_at(5)?,
                value: rlp.val_at(6)?,
                data: decode_data(rlp, 7)?,
                access_list: rlp.list_at(8)?,
                max_fee_per_blob_gas: rlp.val_at(9)?,
                blob_versioned_hashes: rlp.list_at(10)?,
                sidecar: None,
            }),
        })
    }

    /// Maps a signature to its recovery id, checking `v` against the
    /// transaction's replay protection.
    fn y_parity(&self, signature: &Signature) -> Result<u8, TxError> {
        let parity = match self {
            Transaction::Legacy(tx) => match (tx.chain_id, signature.v) {
                (None, v @ (27 | 28)) => v - 27,
                (Some(chain_id), v) if v >= 35 && (v - 35) / 2 == chain_id => (v - 35) % 2,
                _ => return Err(TxError::InvalidSignature),
            },
            _ if signature.v <= 1 => signature.v,
            _ => return Err(TxError::InvalidSignature),
        };
        Ok(parity as u8)
    }
}

/// An ECDSA signature in the form carried by transactions. `v` is the full
/// legacy value (27/28 or EIP-155) for legacy transactions and the y parity
/// for typed ones.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Signature {
    pub v: u64,
    pub r: U256,
    pub s: U256,
}

/// A transaction with a valid signature, its hash and its recovered sender.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedTransaction {
    tx: Transaction,
    signature: Signature,
    hash: H256,
    sender: Address,
}

impl Deref for SignedTransaction {
    type Target = Transaction;

    fn deref(&self) -> &Self::Target {
        &self.tx
    }
}

impl SignedTransaction {
    /// Attaches `signature` to `tx`, failing if no sender can be recovered.
    pub fn from_parts(tx: Transaction, signature: Signature) -> Result<Self, TxError> {
        if let Transaction::Blob(BlobTx {
            blob_versioned_hashes,
            sidecar: Some(sidecar),
            ..
        }) = &tx
        {
            check_sidecar(blob_versioned_hashes, sidecar)?;
        }

        let y_parity = tx.y_parity(&signature)?;
        let sender = recover_signer(tx.signing_hash(), y_parity, &signature)?;
        let mut signed = Self {
            tx,
            signature,
            hash: H256::zero(),
            sender,
        };
        signed.hash = keccak(signed.encode());
        Ok(signed)
    }

    /// Decodes a transaction from its EIP-2718 wire form. Blob transactions
    /// may be in either the minimal or the network (sidecar) form.
    pub fn decode(bytes: &[u8]) -> Result<Self, TxError> {
        let first = *bytes.first().ok_or(TxError::Empty)?;
        if first >= 0xc0 {
            return Self::decode_legacy(bytes);
        }

        let ty = match TxType::try_from(first)? {
            TxType::Legacy => return Err(TxError::UnsupportedType(first)),
            ty => ty,
        };
        let payload = &bytes[1..];
        let rlp = Rlp::new(payload);
        ensure_consumed(&rlp, payload.len())?;

        if ty == TxType::Blob && rlp.item_count()? == 4 && rlp.at(0)?.is_list() {
            let mut signed = Self::decode_typed_body(ty, &rlp.at(0)?)?;
            let sidecar = BlobSidecar {
                blobs: decode_bytes_list(&rlp.at(1)?)?,
                commitments: decode_bytes_list(&rlp.at(2)?)?,
                proofs: decode_bytes_list(&rlp.at(3)?)?,
            };
            if let Transaction::Blob(blob) = &mut signed.tx {
                check_sidecar(&blob.blob_versioned_hashes, &sidecar)?;
                blob.sidecar = Some(sidecar);
            }
            return Ok(signed);
        }

        Self::decode_typed_body(ty, &rlp)
    }

    fn decode_legacy(bytes: &[u8]) -> Result<Self, TxError> {
        let rlp = Rlp::new(bytes);
        ensure_consumed(&rlp, bytes.len())?;
        if rlp.item_count()? != 9 {
            return Err(DecoderError::RlpIncorrectListLen.into());
        }

        let signature = decode_signature(&rlp, 6)?;
        let mut tx = Transaction::decode_typed_fields(TxType::Legacy, &rlp)?;
        if let Transaction::Legacy(legacy) = &mut tx {
            legacy.chain_id = (signature.v >= 35).then(|| (signature.v - 35) / 2);
        }
        Self::from_parts(tx, signature)
    }

    fn decode_typed_body(ty: TxType, rlp: &Rlp) -> Result<Self, TxError> {
        let fields = match ty {
            TxType::AccessList => 8,
            TxType::FeeMarket => 9,
            TxType::Blob => 11,
            TxType::Legacy => return Err(TxError::UnsupportedType(0)),
        };
        if rlp.item_count()? != fields + 3 {
            return Err(DecoderError::RlpIncorrectListLen.into());
        }

        let tx = Transaction::decode_typed_fields(ty, rlp)?;
        let signature = decode_signature(rlp, fields)?;
        Self::from_parts(tx, signature)
    }

    pub fn hash(&self) -> H256 {
        self.hash
    }

    pub fn sender(&self) -> Address {
        self.sender
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn transaction(&self) -> &Transaction {
        &self.tx
    }

    /// Whether this is a blob transaction still carrying its sidecar.
    pub fn has_sidecar(&self) -> bool {
        matches!(
            &self.tx,
            Transaction::Blob(BlobTx {
                sidecar: Some(_),
                ..
            })
        )
    }

    /// Canonical encoding, as included in blocks and hashed.
    pub fn encode(&self) -> Bytes {
        let mut s = RlpStream::new();
        self.rlp_append_signed(&mut s);
        let payload = s.out();
        match self.tx.tx_type() {
            TxType::Legacy => payload.freeze(),
            ty => Bytes::from(with_type_prefix(ty, &payload)),
        }
    }

    /// Encoding used for gossip: blob transactions carry their sidecar.
    pub fn encode_network(&self) -> Bytes {
        let Transaction::Blob(BlobTx {
            sidecar: Some(sidecar),
            ..
        }) = &self.tx
        else {
            return self.encode();
        };

        let mut s = RlpStream::new_list(4);
        self.rlp_append_signed(&mut s);
        for items in [&sidecar.blobs, &sidecar.commitments, &sidecar.proofs] {
            s.begin_list(items.len());
            for item in items {
                s.append(item);
            }
        }
        Bytes::from(with_type_prefix(TxType::Blob, &s.out()))
    }

    /// Drops the blob sidecar, if any. The hash is unaffected.
    pub fn into_minimal(mut self) -> Self {
        if let Transaction::Blob(blob) = &mut self.tx {
            blob.sidecar = None;
        }
        self
    }

    fn rlp_append_signed(&self, s: &mut RlpStream) {
        s.begin_list(self.tx.field_count() + 3);
        self.tx.rlp_append_fields(s);
        s.append(&self.signature.v);
        s.append(&self.signature.r);
        s.append(&self.signature.s);
    }
}

/// Address controlled by `key`.
pub fn public_key_to_address(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    let hash = keccak(&point.as_bytes()[1..]);
    Address::from_slice(&hash.as_bytes()[12..])
}

fn recover_signer(prehash: H256, y_parity: u8, signature: &Signature) -> Result<Address, TxError> {
    if signature.s > SECP256K1N_HALF {
        return Err(TxError::InvalidSignature);
    }

    let mut bytes = [0u8; 64];
    signature.r.to_big_endian(&mut bytes[..32]);
    signature.s.to_big_endian(&mut bytes[32..]);
    let ecdsa = EcdsaSignature::from_slice(&bytes).map_err(|_| TxError::InvalidSignature)?;
    let recovery_id = RecoveryId::from_byte(y_parity).ok_or(TxError::InvalidSignature)?;
    let key = VerifyingKey::recover_from_prehash(prehash.as_bytes(), &ecdsa, recovery_id)
        .map_err(|_| TxError::InvalidSignature)?;

    Ok(public_key_to_address(&key))
}

fn check_sidecar(hashes: &[H256], sidecar: &BlobSidecar) -> Result<(), TxError> {
    for got in [
        sidecar.blobs.len(),
        sidecar.commitments.len(),
        sidecar.proofs.len(),
    ] {
        if got != hashes.len() {
            return Err(TxError::SidecarMismatch {
                expected: hashes.len(),
                got,
            });
        }
    }
    Ok(())
}

fn with_type_prefix(ty: TxType, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 1);
    out.push(ty as u8);
    out.extend_from_slice(payload);
    out
}

fn append_to(s: &mut RlpStream, to: Option<Address>) {
    match to {
        Some(address) => s.append(&address),
        None => s.append_empty_data(),
    };
}

fn decode_to(rlp: &Rlp) -> Result<Option<Address>, DecoderError> {
    match rlp.is_empty() {
        true => Ok(None),
        false => rlp.as_val().map(Some),
    }
}

fn decode_data(rlp: &Rlp, idx: usize) -> Result<Bytes, DecoderError> {
    rlp.val_at::<Vec<u8>>(idx).map(Bytes::from)
}

fn decode_bytes_list(rlp: &Rlp) -> Result<Vec<Bytes>, DecoderError> {
    rlp.iter()
        .map(|item| item.as_val::<Vec<u8>>().map(Bytes::from))
        .collect()
}

fn decode_signature(rlp: &Rlp, idx: usize) -> Result<Signature, DecoderError> {
    Ok(Signature {
        v: rlp.val_at(idx)?,
        r: rlp.val_at(idx + 1)?,
        s: rlp.val_at(idx + 2)?,
    })
}

fn ensure_consumed(rlp: &Rlp, len: usize) -> Result<(), TxError> {
    if !rlp.is_list() {
        return Err(DecoderError::RlpExpectedToBeList.into());
    }
    match rlp.payload_info()?.total() == len {
        true => Ok(()),
        false => Err(TxError::TrailingBytes),
    }
}
