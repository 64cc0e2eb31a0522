//! EIP-4844 blob fee parameters.

use ethereum_types::U256;

use crate::{BLOB_GAS_PER_BLOB, MIN_BLOB_BASE_FEE};

/// Per-fork blob schedule.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlobParams {
    pub target_blobs_per_block: u64,
    pub max_blobs_per_block: u64,
    pub update_fraction: u64,
}

impl BlobParams {
    pub const CANCUN: Self = Self {
        target_blobs_per_block: 3,
        max_blobs_per_block: 6,
        update_fraction: 3_338_477,
    };

    /// EIP-7691 schedule.
    pub const PRAGUE: Self = Self {
        target_blobs_per_block: 6,
        max_blobs_per_block: 9,
        update_fraction: 5_007_716,
    };

    pub const fn max_blob_gas_per_block(&self) -> u64 {
        self.max_blobs_per_block * BLOB_GAS_PER_BLOB
    }

    pub const fn target_blob_gas_per_block(&self) -> u64 {
        self.target_blobs_per_block * BLOB_GAS_PER_BLOB
    }

    /// Excess blob gas of a child block.
    pub fn next_excess_blob_gas(&self, parent_excess: u64, parent_used: u64) -> u64 {
        (parent_excess + parent_used).saturating_sub(self.target_blob_gas_per_block())
    }

    /// Price of one unit of blob gas for a block with the given excess.
    pub fn blob_base_fee(&self, excess_blob_gas: u64) -> U256 {
        fake_exponential(
            MIN_BLOB_BASE_FEE.into(),
            excess_blob_gas.into(),
            self.update_fraction.into(),
        )
    }
}

/// Approximates `factor * e ** (numerator / denominator)` with a Taylor
/// expansion, as defined by EIP-4844.
pub fn fake_exponential(factor: U256, numerator: U256, denominator: U256) -> U256 {
    if denominator.is_zero() {
        return U256::zero();
    }

    let mut i = U256::one();
    let mut output = U256::zero();
    let mut accum = factor.saturating_mul(denominator);
    while !accum.is_zero() {
        output = output.saturating_add(accum);
        accum = accum.saturating_mul(numerator) / denominator.saturating_mul(i);
        i += U256::one();
    }
    output / denominator
}
