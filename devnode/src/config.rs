//! Node configuration. Every struct deserializes from partial JSON, missing
//! fields taking their defaults.

use std::{collections::BTreeMap, time::Duration};

use devnode_common::ChainConfig;
use ethereum_types::{Address, U256};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum number of pooled transactions.
    pub max_size: usize,
    pub max_per_sender: usize,
    /// Maximum calldata size, in bytes.
    pub max_data_size: usize,
    /// Capacity of the set of recently included transaction hashes.
    pub handled_capacity: usize,
    /// Age after which pooled transactions are dropped by `cleanup`.
    #[serde(with = "duration_secs")]
    pub pooled_storage_time: Duration,
    /// Age after which handled hashes are forgotten by `cleanup`.
    #[serde(with = "duration_secs")]
    pub handled_cleanup_time: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 5000,
            max_per_sender: 100,
            max_data_size: 128 * 1024,
            handled_capacity: 5000,
            pooled_storage_time: Duration::from_secs(20 * 60),
            handled_cleanup_time: Duration::from_secs(60 * 60),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiptsConfig {
    /// Maximum number of logs returned by one `get_logs` query.
    pub logs_limit: usize,
    /// Maximum serialized size of one `get_logs` response, in bytes.
    pub logs_size_limit: usize,
}

impl Default for ReceiptsConfig {
    fn default() -> Self {
        Self {
            logs_limit: 10_000,
            logs_size_limit: 150 * 1024 * 1024,
        }
    }
}

/// When the node produces blocks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type")]
pub enum MiningMode {
    /// Only on explicit `mine` calls.
    #[default]
    Manual,
    /// After every accepted transaction.
    Auto,
    /// On a fixed period.
    Interval { block_time_ms: u64 },
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MiningConfig {
    pub mode: MiningMode,
    pub coinbase: Address,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenesisConfig {
    pub gas_limit: u64,
    pub timestamp: u64,
    /// Prefunded balances, in wei.
    pub alloc: BTreeMap<Address, U256>,
}

impl Default for GenesisConfig {
    fn default() -> Self {
        Self {
            gas_limit: 30_000_000,
            timestamp: 0,
            alloc: BTreeMap::new(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub chain: ChainConfig,
    pub genesis: GenesisConfig,
    pub pool: PoolConfig,
    pub receipts: ReceiptsConfig,
    pub mining: MiningConfig,
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}
