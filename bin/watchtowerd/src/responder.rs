//! A minimal responder: broadcasts each penalty once and follows it until it is buried.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use bitcoin::{Transaction, Txid};
use chain_monitor::{
    BlockEvent, ChainMonitor, ChainSource, ChainSourceError, ConsumerHandle, Subscription,
};
use futures::StreamExt;
use tokio::{sync::Mutex, task::JoinHandle};
use tracing::{debug, error, info, warn};
use watchtower_primitives::{
    appointment::AppointmentId, locator::Locator, types::BitcoinBlockHeight,
};
use watchtower_watcher::{Responder, ValidBreach};

/// Anything that can relay a transaction to the network.
#[async_trait]
pub(crate) trait Broadcaster: Send + Sync {
    /// Relays `tx` and returns its txid.
    async fn send_raw_transaction(&self, tx: &Transaction) -> Result<Txid, ChainSourceError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TrackedPenalty {
    locator: Locator,
    txid: Txid,
    confirmed_at: Option<BitcoinBlockHeight>,
}

impl TrackedPenalty {
    fn is_buried(&self, tip: BitcoinBlockHeight, bury_depth: u64) -> bool {
        self.confirmed_at
            .is_some_and(|height| tip.saturating_sub(height).saturating_add(1) >= bury_depth)
    }
}

type Tracked = Arc<Mutex<HashMap<AppointmentId, TrackedPenalty>>>;

/// Broadcasts penalties and watches for their confirmation.
///
/// It attaches to the chain monitor on its own. A penalty is forgotten once it is `bury_depth`
/// blocks deep, and the responder sleeps whenever it tracks nothing.
#[derive(Clone)]
pub(crate) struct BroadcastResponder {
    broadcaster: Arc<dyn Broadcaster>,
    tracked: Tracked,
    asleep: Arc<AtomicBool>,
    task: Arc<JoinHandle<()>>,
}

impl std::fmt::Debug for BroadcastResponder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastResponder")
            .field("asleep", &self.asleep.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl BroadcastResponder {
    /// Creates a sleeping responder attached to `monitor`.
    pub(crate) async fn start(
        broadcaster: Arc<dyn Broadcaster>,
        chain: Arc<dyn ChainSource>,
        monitor: &ChainMonitor,
        bury_depth: u64,
    ) -> Self {
        let asleep = Arc::new(AtomicBool::new(true));
        let tracked = Arc::new(Mutex::new(HashMap::new()));

        let (handle, blocks) = ConsumerHandle::new(asleep.clone());
        let consumer = monitor.attach(Arc::new(handle)).await;
        debug!(%consumer, "responder attached to chain monitor");

        let task = tokio::spawn(follow_confirmations(
            chain,
            tracked.clone(),
            asleep.clone(),
            blocks,
            bury_depth,
        ));

        Self {
            broadcaster,
            tracked,
            asleep,
            task: Arc::new(task),
        }
    }

    /// Stops following confirmations.
    pub(crate) fn shutdown(&self) {
        self.task.abort();
    }

    #[cfg(test)]
    async fn confirmation_height(&self, id: &AppointmentId) -> Option<BitcoinBlockHeight> {
        self.tracked
            .lock()
            .await
            .get(id)
            .and_then(|penalty| penalty.confirmed_at)
    }

    #[cfg(test)]
    async fn num_tracked(&self) -> usize {
        self.tracked.lock().await.len()
    }
}

#[async_trait]
impl Responder for BroadcastResponder {
    async fn handle_breach(&self, breach: ValidBreach) {
        let ValidBreach {
            appointment_id,
            locator,
            dispute_txid,
            penalty_tx,
        } = breach;
        let txid = penalty_tx.compute_txid();

        match self.broadcaster.send_raw_transaction(&penalty_tx).await {
            Ok(_) => info!(
                %appointment_id,
                %locator,
                %dispute_txid,
                %txid,
                "penalty broadcast"
            ),
            // tracked either way
            Err(err) => warn!(
                %appointment_id,
                %locator,
                %txid,
                %err,
                "could not broadcast penalty"
            ),
        }

        let mut tracked = self.tracked.lock().await;
        tracked.insert(
            appointment_id,
            TrackedPenalty {
                locator,
                txid,
                confirmed_at: None,
            },
        );
        self.asleep.store(false, Ordering::SeqCst);
    }

    async fn has_responded(&self, locator: &Locator) -> bool {
        self.tracked
            .lock()
            .await
            .values()
            .any(|penalty| penalty.locator == *locator)
    }
}

async fn follow_confirmations(
    chain: Arc<dyn ChainSource>,
    tracked: Tracked,
    asleep: Arc<AtomicBool>,
    mut blocks: Subscription<BlockEvent>,
    bury_depth: u64,
) {
    while let Some(block) = blocks.next().await {
        let txids = match chain.confirmed_txids(&block.hash).await {
            Ok(txids) => txids,
            Err(err) => {
                error!(height = %block.height, %err, "could not fetch block, skipping");
                continue;
            }
        };

        let mut tracked = tracked.lock().await;
        for (id, penalty) in tracked.iter_mut() {
            // a block at or below the confirmation height replaces the confirming one
            if penalty.confirmed_at.is_some_and(|height| height >= block.height) {
                warn!(%id, txid = %penalty.txid, "penalty confirmation reorganized away");
                penalty.confirmed_at = None;
            }

            if penalty.confirmed_at.is_none() && txids.contains(&penalty.txid) {
                info!(
                    %id,
                    locator = %penalty.locator,
                    txid = %penalty.txid,
                    height = %block.height,
                    "penalty confirmed"
                );
                penalty.confirmed_at = Some(block.height);
            }
        }

        tracked.retain(|id, penalty| {
            let buried = penalty.is_buried(block.height, bury_depth);
            if buried {
                info!(%id, txid = %penalty.txid, "penalty buried, no longer tracked");
            }

            !buried
        });

        if tracked.is_empty() {
            debug!("every penalty buried, responder going to sleep");
            asleep.store(true, Ordering::SeqCst);
        }
    }
}
