//! Core of a local Ethereum development node: a transaction pool, a block
//! builder and a receipts and log index, tied together by [`node::Node`].

pub mod block;
pub mod builder;
pub mod chain;
pub mod clock;
pub mod config;
pub mod db;
pub mod executor;
pub mod miner;
pub mod node;
pub mod receipt;
pub mod receipts;
pub mod state;
pub mod tracing;
pub mod tx;
pub mod txpool;

pub use devnode_common as common;

/// Like `#[serde(with = "::hex")]`, but emits a leading `0x`.
mod hex {
    use serde::Serializer;

    pub fn serialize<S: Serializer, T>(data: T, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: hex::ToHex,
    {
        let s = data.encode_hex::<String>();
        serializer.serialize_str(&format!("0x{}", s))
    }
}
