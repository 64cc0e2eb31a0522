//! Background tasks driven by a fixed period: interval mining and pool
//! cleanup.

use std::{future::Future, ops::ControlFlow, sync::Arc, time::Duration};

use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};

use crate::node::{MineOptions, Node, NodeError};

/// A task calling `on_tick` once per period until stopped. Ticks stay
/// aligned to the start time; a tick missed while `on_tick` runs is skipped.
#[derive(Debug)]
struct Ticker {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Ticker {
    fn spawn<F, Fut>(task: &'static str, period: Duration, mut on_tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ControlFlow<()>> + Send + 'static,
    {
        let (shutdown, mut stopped) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(task, ?period, "periodic task started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = stopped.changed() => break,
                }
                if on_tick().await.is_break() {
                    break;
                }
            }
            info!(task, "periodic task stopped");
        });

        Self { shutdown, handle }
    }

    async fn stop(self) {
        // The task may already be gone.
        let _ = self.shutdown.send(true);
        if let Err(err) = self.handle.await {
            error!(%err, "periodic task ended abnormally");
        }
    }
}

/// Mines one block every `block_time` until stopped.
#[derive(Debug)]
pub struct IntervalMiner(Ticker);

impl IntervalMiner {
    /// Starts mining on the current tokio runtime. The first block is mined
    /// one `block_time` from now.
    pub fn spawn(node: Arc<Node>, block_time: Duration) -> Self {
        Self(Ticker::spawn("interval mining", block_time, move || {
            let node = node.clone();
            async move {
                match tokio::task::spawn_blocking(move || node.mine(MineOptions::default())).await {
                    Ok(Ok(_)) => ControlFlow::Continue(()),
                    Ok(Err(NodeError::MiningInProgress)) => {
                        debug!("skipping tick, another mining run is in progress");
                        ControlFlow::Continue(())
                    }
                    Ok(Err(err)) => {
                        warn!(%err, "interval mining failed");
                        ControlFlow::Continue(())
                    }
                    Err(err) => {
                        error!(%err, "mining task panicked");
                        ControlFlow::Break(())
                    }
                }
            }
        }))
    }

    /// Stops mining and waits for a block in progress to finish.
    pub async fn stop(self) {
        self.0.stop().await
    }
}

/// Drops stale pooled transactions and forgets old handled hashes every
/// `period` until stopped.
#[derive(Debug)]
pub struct PoolCleaner(Ticker);

impl PoolCleaner {
    pub fn spawn(node: Arc<Node>, period: Duration) -> Self {
        Self(Ticker::spawn("pool cleanup", period, move || {
            node.cleanup_pool();
            std::future::ready(ControlFlow::Continue(()))
        }))
    }

    pub async fn stop(self) {
        self.0.stop().await
    }
}
