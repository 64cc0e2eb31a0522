//! Storage written before the first transaction of a block by the beacon
//! roots (EIP-4788) and block hash history (EIP-2935) system contracts.

use devnode_common::{BEACON_ROOTS_ADDRESS, HISTORY_BUFFER_LENGTH, HISTORY_STORAGE_ADDRESS};
use ethereum_types::{H256, U256};

use crate::state::{StateError, StateManager};

fn slot(index: u64) -> H256 {
    H256::from_low_u64_be(index)
}

/// Records `root` in the beacon roots ring buffer, keyed by `timestamp`.
pub(super) fn accumulate_parent_beacon_block_root(
    state: &mut dyn StateManager,
    root: H256,
    timestamp: u64,
) -> Result<(), StateError> {
    let index = timestamp % HISTORY_BUFFER_LENGTH;
    let mut timestamp_value = [0u8; 32];
    U256::from(timestamp).to_big_endian(&mut timestamp_value);

    state.put_storage(BEACON_ROOTS_ADDRESS, slot(index), H256(timestamp_value))?;
    state.put_storage(
        BEACON_ROOTS_ADDRESS,
        slot(index + HISTORY_BUFFER_LENGTH),
        root,
    )
}

/// Records the hash of the parent of block `number` in the history ring
/// buffer.
pub(super) fn accumulate_parent_block_hash(
    state: &mut dyn StateManager,
    number: u64,
    parent_hash: H256,
) -> Result<(), StateError> {
    let Some(parent_number) = number.checked_sub(1) else {
        return Ok(());
    };
    state.put_storage(
        HISTORY_STORAGE_ADDRESS,
        slot(parent_number % HISTORY_BUFFER_LENGTH),
        parent_hash,
    )
}
