//! This module contains the top level [`ChainMonitor`] implementation.
//!
//! Once the monitor is started, consumers [`attach`](ChainMonitor::attach) themselves and receive
//! every new best-height block, in height order, for as long as they are awake. When a delivered
//! block is reorganized away, the blocks replacing it are delivered again from the fork point on.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use tokio::{
    sync::Mutex,
    task::{self, JoinHandle},
    time::{self, Instant, MissedTickBehavior},
};
use tracing::{debug, info, trace, warn};
use watchtower_primitives::types::BitcoinBlockHeight;

use crate::{
    config::ChainMonitorConfig,
    consumer::{BlockConsumer, ConsumerId},
    event::BlockEvent,
    source::{ChainSource, ChainSourceError},
};

type Consumers = Arc<Mutex<Vec<(ConsumerId, Arc<dyn BlockConsumer>)>>>;

/// Polls a [`ChainSource`] and fans new blocks out to the attached consumers.
///
/// After construction, this object must be kept around for the monitoring process to continue.
/// Dropping the last clone aborts the polling task.
#[derive(Debug, Clone)]
pub struct ChainMonitor {
    consumers: Consumers,
    next_consumer_id: Arc<AtomicU64>,
    last_delivered: Arc<Mutex<Option<BlockEvent>>>,
    thread_handle: Arc<JoinHandle<()>>,
}

impl Drop for ChainMonitor {
    fn drop(&mut self) {
        if Arc::strong_count(&self.thread_handle) == 1 {
            self.thread_handle.abort();
        }
    }
}

impl ChainMonitor {
    /// Primary constructor for [`ChainMonitor`]. Must be called from within a tokio runtime.
    ///
    /// With a `start_height` the first poll delivers every block from that height up to the tip,
    /// which lets a restarted tower catch up on blocks it missed. Without one, only blocks mined
    /// after the first poll are delivered.
    pub fn start(
        cfg: &ChainMonitorConfig,
        source: Arc<dyn ChainSource>,
        start_height: Option<BitcoinBlockHeight>,
    ) -> Self {
        trace!(?cfg, ?start_height, "starting chain monitor");

        let consumers: Consumers = Arc::new(Mutex::new(Vec::new()));
        let consumers_thread = consumers.clone();
        let last_delivered = Arc::new(Mutex::new(None));
        let last_delivered_thread = last_delivered.clone();
        let polling_interval = cfg.polling_interval;
        let bury_depth = cfg.bury_depth;

        let thread_handle = Arc::new(task::spawn(async move {
            // the first poll waits a full period so consumers can attach before anything is
            // delivered
            let mut interval =
                time::interval_at(Instant::now() + polling_interval, polling_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            let mut cursor = PollCursor::new(start_height, bury_depth);

            // This loop has no break condition. It is only aborted when the last ChainMonitor is
            // dropped.
            loop {
                interval.tick().await;

                let res = poll_once(
                    source.as_ref(),
                    &consumers_thread,
                    &last_delivered_thread,
                    &mut cursor,
                )
                .await;

                if let Err(err) = res {
                    warn!(
                        %err,
                        next_height = ?cursor.next_height,
                        "could not poll chain source, retrying later"
                    );
                }
            }
        }));

        info!(?polling_interval, "chain monitor started");

        ChainMonitor {
            consumers,
            next_consumer_id: Arc::new(AtomicU64::new(0)),
            last_delivered,
            thread_handle,
        }
    }

    /// Attaches a consumer. It receives blocks from the next fan-out on, whenever it is awake.
    pub async fn attach(&self, consumer: Arc<dyn BlockConsumer>) -> ConsumerId {
        let id = ConsumerId(self.next_consumer_id.fetch_add(1, Ordering::SeqCst));
        trace!(%id, ?consumer, "attaching consumer");

        self.consumers.lock().await.push((id, consumer));

        id
    }

    /// Detaches a consumer. Unknown ids are ignored.
    pub async fn detach(&self, id: ConsumerId) {
        trace!(%id, "detaching consumer");

        self.consumers
            .lock()
            .await
            .retain(|(consumer_id, _)| *consumer_id != id);
    }

    /// Returns the number of attached consumers, awake or not.
    pub async fn num_consumers(&self) -> usize {
        self.consumers.lock().await.len()
    }

    /// Returns the last block that was fanned out, if any.
    pub async fn last_delivered(&self) -> Option<BlockEvent> {
        *self.last_delivered.lock().await
    }
}

/// Where the polling task stands: the next height to deliver and the most recently delivered
/// blocks, newest last.
#[derive(Debug)]
struct PollCursor {
    next_height: Option<BitcoinBlockHeight>,
    recent: VecDeque<BlockEvent>,
    bury_depth: usize,
}

impl PollCursor {
    fn new(next_height: Option<BitcoinBlockHeight>, bury_depth: usize) -> Self {
        Self {
            next_height,
            recent: VecDeque::with_capacity(bury_depth.saturating_add(1)),
            bury_depth,
        }
    }

    fn record(&mut self, event: BlockEvent) {
        self.recent.push_back(event);
        while self.recent.len() > self.bury_depth.max(1) {
            self.recent.pop_front();
        }

        self.next_height = Some(event.height.saturating_add(1));
    }
}

/// Whether `block` is still the best-chain block at its height.
async fn is_on_best_chain(
    source: &dyn ChainSource,
    block: &BlockEvent,
) -> Result<bool, ChainSourceError> {
    match source.block_hash(block.height).await {
        Ok(hash) => Ok(hash == block.hash),
        Err(ChainSourceError::UnknownHeight(_)) => Ok(false),
        Err(err) => Err(err),
    }
}

/// Forgets the remembered blocks that left the best chain and rewinds the cursor to the lowest
/// of them, so that their replacements get delivered.
async fn rewind_to_fork_point(
    source: &dyn ChainSource,
    cursor: &mut PollCursor,
) -> Result<(), ChainSourceError> {
    while let Some(block) = cursor.recent.back().copied() {
        if is_on_best_chain(source, &block).await? {
            return Ok(());
        }

        warn!(
            height = %block.height,
            hash = %block.hash,
            "delivered block left the best chain, chain reorganized"
        );

        cursor.recent.pop_back();
        cursor.next_height = Some(block.height);
    }

    Ok(())
}

/// Delivers every block between the cursor and the current tip, re-delivering the replacements
/// of blocks that were reorganized away.
///
/// On error, the cursor points at the first block that was not delivered so the next poll
/// resumes exactly there.
async fn poll_once(
    source: &dyn ChainSource,
    consumers: &Consumers,
    last_delivered: &Mutex<Option<BlockEvent>>,
    cursor: &mut PollCursor,
) -> Result<(), ChainSourceError> {
    let tip = source.current_height().await?;

    if cursor.next_height.is_none() {
        debug!(%tip, "anchoring chain monitor at the current tip");
        cursor.next_height = Some(tip.saturating_add(1));

        return Ok(());
    }

    rewind_to_fork_point(source, cursor).await?;

    let Some(from) = cursor.next_height else {
        return Ok(());
    };

    for height in from..=tip {
        let hash = source.block_hash(height).await?;
        let header = source.block_header(&hash).await?;

        let event = BlockEvent {
            height,
            hash,
            prev_hash: header.prev_blockhash,
        };

        if let Some(previous) = cursor.recent.back() {
            if previous.hash != event.prev_hash {
                warn!(
                    %height,
                    %hash,
                    expected_parent = %previous.hash,
                    actual_parent = %event.prev_hash,
                    "block does not extend the last delivered block"
                );
            }
        }

        fan_out(consumers, event).await;

        *last_delivered.lock().await = Some(event);
        cursor.record(event);
    }

    Ok(())
}

async fn fan_out(consumers: &Consumers, event: BlockEvent) {
    info!(height = %event.height, hash = %event.hash, "new block");

    let consumers = consumers.lock().await;
    for (id, consumer) in consumers.iter() {
        if consumer.is_awake() {
            trace!(%id, height = %event.height, "delivering block");
            consumer.deliver(event);
        } else {
            trace!(%id, height = %event.height, "skipping asleep consumer");
        }
    }
}
