use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint};
use devnode::{
    common::{ConsensusType, Hardfork},
    config::NodeConfig,
};
use ethereum_types::{Address, U256};

const CHAIN_HELP_HEADING: &str = "Chain options";

/// Local Ethereum development node
#[derive(Parser)]
#[command(version, propagate_version = true)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Command,

    #[clap(flatten)]
    pub(crate) node: CliNodeConfig,
}

/// Overrides applied on top of the optional JSON config file.
#[derive(Args, Debug)]
pub(crate) struct CliNodeConfig {
    /// JSON node configuration file.
    #[arg(short = 'c', long, env = "DEVNODE_CONFIG", value_hint = ValueHint::FilePath)]
    pub(crate) config: Option<PathBuf>,
    #[arg(long, env = "DEVNODE_CHAIN_ID", help_heading = CHAIN_HELP_HEADING)]
    pub(crate) chain_id: Option<u64>,
    /// Latest active hardfork, e.g. `london` or `cancun`.
    #[arg(long, env = "DEVNODE_HARDFORK", help_heading = CHAIN_HELP_HEADING)]
    pub(crate) hardfork: Option<Hardfork>,
    /// `pow` or `pos`.
    #[arg(long, env = "DEVNODE_CONSENSUS", help_heading = CHAIN_HELP_HEADING)]
    pub(crate) consensus: Option<ConsensusType>,
    /// Block number at which London activates.
    #[arg(long, env = "DEVNODE_LONDON_BLOCK", help_heading = CHAIN_HELP_HEADING)]
    pub(crate) london_block: Option<u64>,
    /// Gas limit of the genesis block.
    #[arg(long, env = "DEVNODE_GAS_LIMIT", help_heading = CHAIN_HELP_HEADING)]
    pub(crate) gas_limit: Option<u64>,
    /// Recipient of block fees and rewards.
    #[arg(long, env = "DEVNODE_COINBASE", value_parser = parse_address)]
    pub(crate) coinbase: Option<Address>,
    /// Genesis balance as `ADDRESS=ETH`. Repeatable.
    #[arg(long = "alloc", value_parser = parse_alloc)]
    pub(crate) alloc: Vec<(Address, U256)>,
}

impl CliNodeConfig {
    pub(crate) fn into_node_config(self) -> anyhow::Result<NodeConfig> {
        let mut config: NodeConfig = match &self.config {
            Some(path) => serde_json::from_slice(&std::fs::read(path)?)?,
            None => NodeConfig::default(),
        };

        if let Some(chain_id) = self.chain_id {
            config.chain.chain_id = chain_id;
        }
        if let Some(hardfork) = self.hardfork {
            config.chain.hardfork = hardfork;
        }
        if let Some(consensus) = self.consensus {
            config.chain.consensus = consensus;
        }
        if let Some(london_block) = self.london_block {
            config.chain.london_block = london_block;
        }
        if let Some(gas_limit) = self.gas_limit {
            config.genesis.gas_limit = gas_limit;
        }
        if let Some(coinbase) = self.coinbase {
            config.mining.coinbase = coinbase;
        }
        config.genesis.alloc.extend(self.alloc);
        Ok(config)
    }
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Admits raw transactions, mines blocks and prints them.
    Mine {
        /// Number of blocks to mine.
        #[arg(short = 'n', long, default_value_t = 1)]
        blocks: u64,
        /// Seconds between block timestamps. Defaults to the wall clock.
        #[arg(short = 'i', long)]
        interval: Option<u64>,
        /// File with one hex encoded signed transaction per line.
        #[arg(short = 't', long, value_hint = ValueHint::FilePath)]
        transactions: Option<PathBuf>,
        /// Admit transactions regardless of the sender balance.
        #[arg(long)]
        skip_balance: bool,
    },
    /// Mines on a fixed block time for a while, then prints the head.
    Run {
        #[arg(long, env = "DEVNODE_BLOCK_TIME_MS", default_value_t = 2_000)]
        block_time_ms: u64,
        #[arg(long, default_value_t = 10)]
        duration_secs: u64,
    },
    /// Prints the effective node configuration.
    Config,
}

fn parse_address(s: &str) -> Result<Address, String> {
    let bytes = hex::decode(s.strip_prefix("0x").unwrap_or(s)).map_err(|e| e.to_string())?;
    if bytes.len() != Address::len_bytes() {
        return Err(format!("expected 20 bytes, got {}", bytes.len()));
    }
    Ok(Address::from_slice(&bytes))
}

fn parse_alloc(s: &str) -> Result<(Address, U256), String> {
    let (address, eth) = s
        .split_once('=')
        .ok_or_else(|| format!("expected ADDRESS=ETH, got `{s}`"))?;
    let eth = U256::from_dec_str(eth).map_err(|e| format!("{e:?}"))?;
    Ok((parse_address(address)?, devnode::common::eth_to_wei(eth)))
}
