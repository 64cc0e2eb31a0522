use ethereum_types::{Address, H160, H256, U256};
use hex_literal::hex;

mod fees;
mod hardfork;

pub use fees::{fake_exponential, BlobParams};
pub use hardfork::{ChainConfig, ConsensusType, Eip, Hardfork, ParseChainParamError};

/// The hash value of an account empty EVM code.
/// 0xc5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470
pub const EMPTY_CODE_HASH: H256 = H256([
    197, 210, 70, 1, 134, 247, 35, 60, 146, 126, 125, 178, 220, 199, 3, 192, 229, 0, 182, 83, 202,
    130, 39, 59, 123, 250, 216, 4, 93, 133, 164, 112,
]);

/// The hash of an empty Merkle Patricia trie.
/// 0x56e81f171bcc55a6ff8345e692c0f86e5b48e01b996cadc001622fb5e363b421
pub const EMPTY_TRIE_HASH: H256 = H256([
    86, 232, 31, 23, 27, 204, 85, 166, 255, 131, 69, 230, 146, 192, 248, 110, 91, 72, 224, 27, 153,
    108, 173, 192, 1, 98, 47, 181, 227, 99, 180, 33,
]);

/// The hash of an empty list of ommers, `keccak(rlp([]))`.
pub const EMPTY_OMMERS_HASH: H256 = H256(hex!(
    "1dcc4de8dec75d7aab85b567b6ccd41ad312451b948a7413f0a142fd40d49347"
));

/// Base fee of the first block on which EIP-1559 is active, in wei.
pub const INITIAL_BASE_FEE: u64 = 1_000_000_000;

/// Gas limit elasticity of EIP-1559 blocks.
pub const ELASTICITY_MULTIPLIER: u64 = 2;

/// Bounds the amount the base fee can change between blocks.
pub const BASE_FEE_MAX_CHANGE_DENOMINATOR: u64 = 8;

/// Blob gas consumed by a single blob.
pub const BLOB_GAS_PER_BLOB: u64 = 1 << 17;

/// Floor of the blob base fee, in wei.
pub const MIN_BLOB_BASE_FEE: u64 = 1;

/// EIP-4788 beacon roots contract.
pub const BEACON_ROOTS_ADDRESS: Address = H160(hex!("000F3df6D732807Ef1319fB7B8bB8522d0Beac02"));

/// EIP-2935 block hash history contract.
pub const HISTORY_STORAGE_ADDRESS: Address =
    H160(hex!("0000F90827F1C53a10cb7A02335B175320002935"));

/// Length of the ring buffers kept by the beacon roots and history contracts.
pub const HISTORY_BUFFER_LENGTH: u64 = 8191;

/// Converts an amount in `ETH` to `wei` units.
pub fn eth_to_wei(eth: U256) -> U256 {
    // 1 ether = 10^18 wei.
    eth * U256::from(10).pow(18.into())
}

/// Converts an amount in `gwei` to `wei` units.
/// This also works for converting `ETH` to `gwei`.
pub fn gwei_to_wei(gwei: U256) -> U256 {
    // 1 ether = 10^9 gwei = 10^18 wei.
    gwei * U256::from(10).pow(9.into())
}
