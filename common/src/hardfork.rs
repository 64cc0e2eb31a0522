//! Hardfork ordering and EIP activation rules.

use std::{fmt, str::FromStr};

use ethereum_types::U256;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{eth_to_wei, fees::BlobParams};

/// Error returned when parsing a [`Hardfork`] or [`ConsensusType`] from a
/// string.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("unknown {kind}: {value}")]
pub struct ParseChainParamError {
    kind: &'static str,
    value: String,
}

/// Mainnet hardforks relevant to transaction and block validity, in
/// activation order.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Hardfork {
    Frontier,
    Homestead,
    Byzantium,
    Constantinople,
    Istanbul,
    Berlin,
    London,
    /// The merge.
    Paris,
    Shanghai,
    #[default]
    Cancun,
    Prague,
}

impl Hardfork {
    const ALL: [Hardfork; 11] = [
        Hardfork::Frontier,
        Hardfork::Homestead,
        Hardfork::Byzantium,
        Hardfork::Constantinople,
        Hardfork::Istanbul,
        Hardfork::Berlin,
        Hardfork::London,
        Hardfork::Paris,
        Hardfork::Shanghai,
        Hardfork::Cancun,
        Hardfork::Prague,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Hardfork::Frontier => "frontier",
            Hardfork::Homestead => "homestead",
            Hardfork::Byzantium => "byzantium",
            Hardfork::Constantinople => "constantinople",
            Hardfork::Istanbul => "istanbul",
            Hardfork::Berlin => "berlin",
            Hardfork::London => "london",
            Hardfork::Paris => "paris",
            Hardfork::Shanghai => "shanghai",
            Hardfork::Cancun => "cancun",
            Hardfork::Prague => "prague",
        }
    }
}

impl fmt::Display for Hardfork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Hardfork {
    type Err = ParseChainParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        match lower.as_str() {
            "merge" => Ok(Hardfork::Paris),
            _ => Self::ALL
                .into_iter()
                .find(|fork| fork.name() == lower)
                .ok_or_else(|| ParseChainParamError {
                    kind: "hardfork",
                    value: s.to_owned(),
                }),
        }
    }
}

/// EIPs whose activation changes how the node validates or assembles
/// transactions and blocks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Eip {
    /// Replay protected legacy signatures.
    Eip155,
    /// Status code in receipts instead of an intermediate state root.
    Eip658,
    /// Optional access lists.
    Eip2930,
    /// Fee market.
    Eip1559,
    /// Beacon chain withdrawals.
    Eip4895,
    /// Beacon block root in the EVM.
    Eip4788,
    /// Shard blob transactions.
    Eip4844,
    /// Historical block hashes in state.
    Eip2935,
}

impl Eip {
    /// The hardfork that activates this EIP.
    pub const fn activated_by(self) -> Hardfork {
        match self {
            Eip::Eip155 => Hardfork::Homestead,
            Eip::Eip658 => Hardfork::Byzantium,
            Eip::Eip2930 => Hardfork::Berlin,
            Eip::Eip1559 => Hardfork::London,
            Eip::Eip4895 => Hardfork::Shanghai,
            Eip::Eip4788 | Eip::Eip4844 => Hardfork::Cancun,
            Eip::Eip2935 => Hardfork::Prague,
        }
    }
}

/// How blocks are sealed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsensusType {
    /// Blocks carry a miner reward and an optional PoW seal.
    #[serde(alias = "pow")]
    ProofOfWork,
    #[default]
    #[serde(alias = "pos")]
    ProofOfStake,
}

impl FromStr for ConsensusType {
    type Err = ParseChainParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pow" | "proofofwork" => Ok(ConsensusType::ProofOfWork),
            "pos" | "proofofstake" => Ok(ConsensusType::ProofOfStake),
            _ => Err(ParseChainParamError {
                kind: "consensus type",
                value: s.to_owned(),
            }),
        }
    }
}

/// Static parameters of the chain the node runs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    pub chain_id: u64,
    /// Latest active hardfork. Every earlier hardfork is active as well.
    pub hardfork: Hardfork,
    pub consensus: ConsensusType,
    /// Block number at which London and every later fork take effect.
    pub london_block: u64,
    /// Reward credited to the coinbase of proof-of-work blocks, in wei.
    pub miner_reward: U256,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            chain_id: 900,
            hardfork: Hardfork::default(),
            consensus: ConsensusType::default(),
            london_block: 0,
            miner_reward: eth_to_wei(2.into()),
        }
    }
}

impl ChainConfig {
    /// Whether `eip` is part of the configured hardfork.
    pub fn is_activated(&self, eip: Eip) -> bool {
        self.hardfork >= eip.activated_by()
    }

    /// Whether `eip` applies to the block at `number`.
    pub fn is_activated_at(&self, eip: Eip, number: u64) -> bool {
        self.is_activated(eip)
            && (eip.activated_by() < Hardfork::London || number >= self.london_block)
    }

    /// The block number of the London transition, if London is configured.
    pub fn london_activation(&self) -> Option<u64> {
        self.is_activated(Eip::Eip1559).then_some(self.london_block)
    }

    pub fn blob_params(&self) -> BlobParams {
        if self.hardfork >= Hardfork::Prague {
            BlobParams::PRAGUE
        } else {
            BlobParams::CANCUN
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hardforks_are_ordered() {
        assert!(Hardfork::London < Hardfork::Cancun);
        assert!(Hardfork::Prague > Hardfork::Cancun);
        assert_eq!(Hardfork::default(), Hardfork::Cancun);
    }

    #[test]
    fn parses_hardfork_names() {
        assert_eq!("London".parse::<Hardfork>(), Ok(Hardfork::London));
        assert_eq!("merge".parse::<Hardfork>(), Ok(Hardfork::Paris));
        assert!("osaka".parse::<Hardfork>().is_err());
    }

    #[test]
    fn eip_activation_follows_london_block() {
        let config = ChainConfig {
            hardfork: Hardfork::Cancun,
            london_block: 10,
            ..Default::default()
        };

        assert!(config.is_activated_at(Eip::Eip2930, 0));
        assert!(!config.is_activated_at(Eip::Eip1559, 9));
        assert!(config.is_activated_at(Eip::Eip1559, 10));
        assert!(!config.is_activated_at(Eip::Eip4844, 3));
        assert!(!config.is_activated(Eip::Eip2935));
        assert_eq!(config.london_activation(), Some(10));
    }

    #[test]
    fn pre_london_has_no_activation_block() {
        let config = ChainConfig {
            hardfork: Hardfork::Berlin,
            ..Default::default()
        };
        assert_eq!(config.london_activation(), None);
    }

    #[test]
    fn chain_config_defaults_from_empty_json() {
        let config: ChainConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, ChainConfig::default());

        let config: ChainConfig =
            serde_json::from_str(r#"{"hardfork":"prague","consensus":"pow"}"#).unwrap();
        assert_eq!(config.hardfork, Hardfork::Prague);
        assert_eq!(config.consensus, ConsensusType::ProofOfWork);
    }
}
