use std::{path::Path, sync::Arc, time::Duration};

use anyhow::{Context as _, Result};
use clap::Parser;
use devnode::{
    builder::BuiltBlock,
    clock::SystemClock,
    config::{MiningMode, NodeConfig},
    miner::{IntervalMiner, PoolCleaner},
    node::{AdmissionOptions, MineOptions, Node},
};
use ethereum_types::{H256, U256};
use serde::Serialize;
use tracing::info;

use self::cli::Command;

mod cli;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BlockSummary {
    number: u64,
    hash: H256,
    timestamp: u64,
    gas_used: u64,
    base_fee_per_gas: Option<U256>,
    transactions: Vec<H256>,
    miner_value: U256,
}

impl From<&BuiltBlock> for BlockSummary {
    fn from(built: &BuiltBlock) -> Self {
        let header = &built.block.header;
        Self {
            number: header.number,
            hash: built.block.hash(),
            timestamp: header.timestamp,
            gas_used: header.gas_used,
            base_fee_per_gas: header.base_fee_per_gas,
            transactions: built.block.transactions.iter().map(|tx| tx.hash()).collect(),
            miner_value: built.miner_value,
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    serde_json::to_writer_pretty(std::io::stdout().lock(), value)?;
    println!();
    Ok(())
}

fn admit_file(node: &Node, path: &Path, options: AdmissionOptions) -> Result<()> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("reading transactions from {}", path.display()))?;
    for (line, raw) in contents.lines().enumerate() {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }
        let bytes = hex::decode(raw.strip_prefix("0x").unwrap_or(raw))
            .with_context(|| format!("line {}", line + 1))?;
        let (hash, outcome) = node
            .add_raw_transaction(&bytes, options)
            .with_context(|| format!("line {}", line + 1))?;
        info!(?hash, ?outcome, "admitted transaction");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    devnode::tracing::init();

    let args = cli::Cli::parse();
    let mut config: NodeConfig = args.node.into_node_config()?;

    match args.command {
        Command::Config => print_json(&config)?,
        Command::Mine {
            blocks,
            interval,
            transactions,
            skip_balance,
        } => {
            // Blocks are mined explicitly below.
            config.mining.mode = MiningMode::Manual;
            let node = Node::in_memory(config, Arc::new(SystemClock))?;
            if let Some(path) = transactions {
                admit_file(&node, &path, AdmissionOptions { skip_balance })?;
            }

            let built = node.mine(MineOptions {
                block_count: blocks,
                interval,
            })?;
            let summaries: Vec<BlockSummary> = built.iter().map(BlockSummary::from).collect();
            print_json(&summaries)?;
        }
        Command::Run {
            block_time_ms,
            duration_secs,
        } => {
            config.mining.mode = MiningMode::Interval { block_time_ms };
            let node = Arc::new(Node::in_memory(config, Arc::new(SystemClock))?);
            let cleaner = PoolCleaner::spawn(node.clone(), node.config().pool.pooled_storage_time);
            let miner = IntervalMiner::spawn(node.clone(), Duration::from_millis(block_time_ms));

            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(duration_secs)) => {}
                _ = tokio::signal::ctrl_c() => info!("interrupted"),
            }
            miner.stop().await;
            cleaner.stop().await;

            let head = node.head()?;
            print_json(&serde_json::json!({
                "number": head.number(),
                "hash": head.hash(),
                "timestamp": head.header.timestamp,
            }))?;
        }
    }

    Ok(())
}
