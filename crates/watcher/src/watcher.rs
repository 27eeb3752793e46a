//! This module implements the top level [`Watcher`].
//!
//! The watcher owns the registry of live appointments. While it holds at least one appointment it
//! is attached to the [`ChainMonitor`] and runs a detection loop that, for every new block,
//! matches the confirmed txids against the locator index, validates the candidates and hands the
//! valid breaches to the [`Responder`]. Once the registry drains it detaches and goes to sleep
//! until the next appointment arrives.

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use bitcoin::Txid;
use chain_monitor::{
    BlockEvent, ChainMonitor, ChainSource, ChainSourceError, ConsumerHandle, ConsumerId,
    Subscription,
};
use futures::StreamExt;
use secp256k1::{ecdsa::Signature, PublicKey};
use tokio::{
    sync::Mutex,
    task::{self, JoinHandle},
    time::sleep,
};
use tracing::{debug, error, info, trace, warn};
use watchtower_crypto::{Decrypter, Signer};
use watchtower_db::watcher::WatcherDb;
use watchtower_primitives::{
    appointment::{Appointment, AppointmentId, AppointmentStatus},
    locator::Locator,
    types::BitcoinBlockHeight,
};

use crate::{
    breach::{evaluate_candidates, BreachOutcome, ValidBreach},
    config::WatcherConfig,
    errors::WatcherResult,
    registry::{Registry, RegistryEntry},
    responder::Responder,
};

/// Answer to an [`Watcher::add_appointment`] request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddAppointmentOutcome {
    /// The appointment is being watched. `signature` covers its canonical serialization and is
    /// the client's receipt.
    Accepted {
        id: AppointmentId,
        signature: Signature,
    },

    /// The tower is full.
    Rejected,
}

#[derive(Debug, Default)]
struct WatcherState {
    registry: Registry,

    /// Attachment to the monitor, present exactly while the watcher is awake.
    consumer: Option<ConsumerId>,

    /// The detection loop, present exactly while the watcher is awake.
    task: Option<JoinHandle<()>>,
}

struct WatcherInner {
    config: WatcherConfig,
    db: Arc<dyn WatcherDb>,
    chain: Arc<dyn ChainSource>,
    monitor: ChainMonitor,
    responder: Arc<dyn Responder>,
    signer: Arc<dyn Signer>,
    decrypter: Arc<dyn Decrypter>,

    /// Read by the monitor at fan-out time, only written while holding `state`.
    asleep: Arc<AtomicBool>,

    state: Mutex<WatcherState>,
}

impl fmt::Debug for WatcherInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatcherInner")
            .field("config", &self.config)
            .field("monitor", &self.monitor)
            .field("asleep", &self.asleep)
            .finish_non_exhaustive()
    }
}

/// Keeps the appointments and watches the chain for their dispute transactions.
///
/// Cloning is cheap and every clone drives the same registry.
#[derive(Debug, Clone)]
pub struct Watcher {
    inner: Arc<WatcherInner>,
}

impl Watcher {
    /// Creates a sleeping watcher with an empty registry.
    ///
    /// Call [`Watcher::restore`] to pick up the appointments persisted by a previous run.
    pub fn new(
        config: WatcherConfig,
        db: Arc<dyn WatcherDb>,
        chain: Arc<dyn ChainSource>,
        monitor: ChainMonitor,
        responder: Arc<dyn Responder>,
        signer: Arc<dyn Signer>,
        decrypter: Arc<dyn Decrypter>,
    ) -> Self {
        Self {
            inner: Arc::new(WatcherInner {
                config,
                db,
                chain,
                monitor,
                responder,
                signer,
                decrypter,
                asleep: Arc::new(AtomicBool::new(true)),
                state: Mutex::new(WatcherState::default()),
            }),
        }
    }

    /// Registers an appointment on behalf of a client.
    ///
    /// The appointment is persisted before it becomes visible to the detection loop. If the
    /// watcher is asleep it wakes up as part of the same critical section, so concurrent
    /// requests never start more than one detection loop.
    pub async fn add_appointment(
        &self,
        appointment: Appointment,
    ) -> WatcherResult<AddAppointmentOutcome> {
        let mut state = self.inner.state.lock().await;

        if state.registry.len() >= self.inner.config.max_appointments() {
            debug!(
                locator = %appointment.locator,
                max_appointments = %self.inner.config.max_appointments(),
                "tower is full, rejecting appointment"
            );

            return Ok(AddAppointmentOutcome::Rejected);
        }

        let id = AppointmentId::new_random();
        let locator = appointment.locator;

        self.inner.db.store_appointment(id, &appointment).await?;
        if let Err(err) = self.inner.db.store_locator_index_entry(locator, id).await {
            if let Err(rollback_err) = self.inner.db.delete_appointment(id).await {
                error!(%id, %rollback_err, "could not roll back partially stored appointment");
            }

            return Err(err.into());
        }

        state.registry.insert(
            id,
            RegistryEntry {
                locator,
                end_time: appointment.end_time,
            },
        );

        let signature = self.inner.signer.sign(&appointment.to_canonical_bytes());

        info!(
            %id,
            %locator,
            start_time = %appointment.start_time,
            end_time = %appointment.end_time,
            "accepted appointment"
        );

        if state.consumer.is_none() {
            self.wake(&mut state).await;
        }

        Ok(AddAppointmentOutcome::Accepted { id, signature })
    }

    /// Rebuilds the registry from persistence and wakes up if anything was found.
    ///
    /// Returns the number of live appointments afterwards.
    pub async fn restore(&self) -> WatcherResult<usize> {
        let appointments = self.inner.db.load_all_appointments().await?;

        let mut state = self.inner.state.lock().await;
        for (id, appointment) in appointments {
            trace!(%id, locator = %appointment.locator, "restoring appointment");

            state.registry.insert(
                id,
                RegistryEntry {
                    locator: appointment.locator,
                    end_time: appointment.end_time,
                },
            );
        }

        let restored = state.registry.len();
        info!(%restored, "restored appointments from persistence");

        if restored > 0 && state.consumer.is_none() {
            self.wake(&mut state).await;
        }

        Ok(restored)
    }

    /// Returns, for every txid whose locator is registered, the candidates grouped by locator.
    ///
    /// Distinct txids sharing a locator are all kept: only decryption can tell which one (if any)
    /// is the real dispute.
    pub async fn get_breaches(&self, txids: &[Txid]) -> BTreeMap<Locator, Vec<Txid>> {
        let state = self.inner.state.lock().await;

        let mut breaches: BTreeMap<Locator, Vec<Txid>> = BTreeMap::new();
        for txid in txids {
            let locator = Locator::from_txid(txid);

            if state.registry.contains_locator(&locator) {
                trace!(%txid, %locator, "txid matches a registered locator");
                breaches.entry(locator).or_default().push(*txid);
            }
        }

        breaches
    }

    /// Decrypts and decodes the penalty of every appointment under every breaching locator.
    ///
    /// Each appointment is evaluated on its own: a failure never prevents its siblings from being
    /// evaluated. Appointments that cannot be loaded from persistence are logged and left out.
    pub async fn filter_valid_breaches(
        &self,
        breaches: &BTreeMap<Locator, Vec<Txid>>,
    ) -> HashMap<AppointmentId, BreachOutcome> {
        let candidates = {
            let state = self.inner.state.lock().await;

            breaches
                .iter()
                .flat_map(|(locator, txids)| {
                    state
                        .registry
                        .ids_for(locator)
                        .into_iter()
                        .map(move |id| (id, txids))
                })
                .collect::<Vec<_>>()
        };

        let mut outcomes = HashMap::with_capacity(candidates.len());
        for (id, txids) in candidates {
            let appointment = match self.inner.db.load_appointment(id).await {
                Ok(Some(appointment)) => appointment,
                Ok(None) => {
                    warn!(%id, "registered appointment is missing from persistence");
                    continue;
                }
                Err(err) => {
                    error!(%id, %err, "could not load appointment");
                    continue;
                }
            };

            if let Some(outcome) =
                evaluate_candidates(self.inner.decrypter.as_ref(), &appointment, txids)
            {
                outcomes.insert(id, outcome);
            }
        }

        outcomes
    }

    /// Where the appointments under `locator` are in their lifecycle.
    pub async fn appointment_status(&self, locator: &Locator) -> AppointmentStatus {
        if self
            .inner
            .state
            .lock()
            .await
            .registry
            .contains_locator(locator)
        {
            return AppointmentStatus::BeingWatched;
        }

        if self.inner.responder.has_responded(locator).await {
            return AppointmentStatus::DisputeResponded;
        }

        AppointmentStatus::NotFound
    }

    /// Loads the live appointments registered under `locator`.
    pub async fn get_appointments(
        &self,
        locator: &Locator,
    ) -> WatcherResult<Vec<(AppointmentId, Appointment)>> {
        let ids = self.inner.state.lock().await.registry.ids_for(locator);

        let mut appointments = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(appointment) = self.inner.db.load_appointment(id).await? {
                appointments.push((id, appointment));
            }
        }

        Ok(appointments)
    }

    pub async fn num_appointments(&self) -> usize {
        self.inner.state.lock().await.registry.len()
    }

    pub async fn is_asleep(&self) -> bool {
        self.inner.state.lock().await.consumer.is_none()
    }

    /// Public key matching the signatures handed out on acceptance.
    pub fn public_key(&self) -> PublicKey {
        self.inner.signer.public_key()
    }

    /// Stops the detection loop and detaches from the monitor. Appointments stay registered and
    /// persisted; the next accepted appointment wakes the watcher up again.
    pub async fn shutdown(&self) {
        let mut state = self.inner.state.lock().await;

        self.inner.asleep.store(true, Ordering::SeqCst);
        if let Some(task) = state.task.take() {
            task.abort();
        }
        if let Some(consumer) = state.consumer.take() {
            self.inner.monitor.detach(consumer).await;
        }

        info!("watcher shut down");
    }

    /// Attaches to the monitor and starts the detection loop. Must be called with the state lock
    /// held and while asleep.
    async fn wake(&self, state: &mut WatcherState) {
        let (handle, blocks) = ConsumerHandle::new(self.inner.asleep.clone());

        self.inner.asleep.store(false, Ordering::SeqCst);
        let consumer = self.inner.monitor.attach(Arc::new(handle)).await;

        let watcher = self.clone();
        state.consumer = Some(consumer);
        state.task = Some(task::spawn(async move { watcher.do_watch(blocks).await }));

        info!(%consumer, "watcher woke up");
    }

    /// The detection loop. Runs until the registry drains.
    async fn do_watch(self, mut blocks: Subscription<BlockEvent>) {
        while let Some(block) = blocks.next().await {
            self.process_block(&block).await;

            if self.try_sleep(&blocks).await {
                self.drain(&mut blocks).await;

                return;
            }
        }
    }

    /// Processes the blocks fanned out between the emptiness check and the detach. The registry
    /// was empty then, so this only sweeps and records the height.
    async fn drain(&self, blocks: &mut Subscription<BlockEvent>) {
        while let Some(block) = blocks.try_next() {
            debug!(height = %block.height, "processing block queued while going to sleep");
            self.process_block(&block).await;
        }
    }

    async fn process_block(&self, block: &BlockEvent) {
        debug!(height = %block.height, hash = %block.hash, "processing block");

        let txids = self.confirmed_txids(block).await;
        let breaches = self.get_breaches(&txids).await;

        if !breaches.is_empty() {
            let outcomes = self.filter_valid_breaches(&breaches).await;

            for (id, outcome) in outcomes {
                match outcome {
                    BreachOutcome::Valid {
                        dispute_txid,
                        penalty_tx,
                    } => {
                        let locator = Locator::from_txid(&dispute_txid);
                        info!(
                            %id,
                            %locator,
                            %dispute_txid,
                            height = %block.height,
                            "breach detected"
                        );

                        self.inner
                            .responder
                            .handle_breach(ValidBreach {
                                appointment_id: id,
                                locator,
                                dispute_txid,
                                penalty_tx,
                            })
                            .await;

                        if let Err(err) = self.remove_appointment(id, locator).await {
                            error!(%id, %err, "could not remove responded appointment");
                        }
                    }
                    // kept until expiry
                    BreachOutcome::Invalid {
                        dispute_txid,
                        reason,
                    } => {
                        warn!(
                            %id,
                            %dispute_txid,
                            %reason,
                            "locator matched but breach is invalid"
                        );
                    }
                }
            }
        }

        self.sweep_expired(block.height).await;

        if let Err(err) = self
            .inner
            .db
            .set_last_known_block_height(block.height)
            .await
        {
            error!(height = %block.height, %err, "could not persist last known block height");
        }
    }

    /// Fetches the block's txids, retrying until the chain source answers.
    async fn confirmed_txids(&self, block: &BlockEvent) -> Vec<Txid> {
        loop {
            match self.inner.chain.confirmed_txids(&block.hash).await {
                Ok(txids) => return txids,
                Err(ChainSourceError::UnknownBlock(hash)) => {
                    warn!(height = %block.height, %hash, "block was reorganized away, skipping");

                    return Vec::new();
                }
                Err(err) => {
                    warn!(
                        height = %block.height,
                        %err,
                        "could not fetch block contents, retrying"
                    );

                    sleep(self.inner.config.chain_retry_interval()).await;
                }
            }
        }
    }

    async fn sweep_expired(&self, height: BitcoinBlockHeight) {
        let expired = self
            .inner
            .state
            .lock()
            .await
            .registry
            .expired(|end_time| self.inner.config.is_expired(end_time, height));

        for (id, entry) in expired {
            info!(
                %id,
                locator = %entry.locator,
                end_time = %entry.end_time,
                %height,
                "appointment expired"
            );

            if let Err(err) = self.remove_appointment(id, entry.locator).await {
                error!(%id, %err, "could not remove expired appointment");
            }
        }
    }

    /// Removes an appointment from persistence first and from memory only once that succeeded.
    async fn remove_appointment(&self, id: AppointmentId, locator: Locator) -> WatcherResult<()> {
        self.inner.db.delete_locator_index_entry(locator, id).await?;
        self.inner.db.delete_appointment(id).await?;

        self.inner.state.lock().await.registry.remove(&id);

        Ok(())
    }

    /// Goes to sleep if there is nothing left to watch and no block waiting to be processed.
    ///
    /// Returns whether the detection loop must exit.
    async fn try_sleep(&self, blocks: &Subscription<BlockEvent>) -> bool {
        let mut state = self.inner.state.lock().await;

        if !state.registry.is_empty() {
            return false;
        }

        // the monitor may still be fanning out a block it saw us awake for; it lands in `blocks`
        // and is drained once detached
        self.inner.asleep.store(true, Ordering::SeqCst);
        if !blocks.is_empty() {
            self.inner.asleep.store(false, Ordering::SeqCst);

            return false;
        }

        if let Some(consumer) = state.consumer.take() {
            self.inner.monitor.detach(consumer).await;
        }
        state.task = None;

        info!("no appointments left, watcher going to sleep");

        true
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::BTreeSet, future::Future, time::Duration};

    use async_trait::async_trait;
    use chain_monitor::{mock::MockChain, ChainMonitorConfig};
    use tokio::time::timeout;
    use watchtower_crypto::{verify_signature, BlobCipher, TowerSigner};
    use watchtower_db::{
        errors::{DbError, DbResult},
        inmemory::{errors::InMemoryError, WatcherInMemory},
    };
    use watchtower_test_utils::prelude::*;

    use super::*;
    use crate::{breach::InvalidBreach, errors::WatcherError};

    const POLL: Duration = Duration::from_millis(10);
    const WAIT: Duration = Duration::from_secs(10);

    #[derive(Debug, Default)]
    struct RecordingResponder {
        breaches: Mutex<Vec<ValidBreach>>,
    }

    impl RecordingResponder {
        async fn breaches(&self) -> Vec<ValidBreach> {
            self.breaches.lock().await.clone()
        }
    }

    #[async_trait]
    impl Responder for RecordingResponder {
        async fn handle_breach(&self, breach: ValidBreach) {
            self.breaches.lock().await.push(breach);
        }

        async fn has_responded(&self, locator: &Locator) -> bool {
            self.breaches
                .lock()
                .await
                .iter()
                .any(|breach| breach.locator == *locator)
        }
    }

    /// Delegates to memory but can be told to fail index writes.
    #[derive(Debug, Default)]
    struct FlakyDb {
        inner: WatcherInMemory,
        fail_index_writes: AtomicBool,
    }

    #[async_trait]
    impl WatcherDb for FlakyDb {
        async fn store_appointment(
            &self,
            id: AppointmentId,
            appointment: &Appointment,
        ) -> DbResult<()> {
            self.inner.store_appointment(id, appointment).await
        }

        async fn delete_appointment(&self, id: AppointmentId) -> DbResult<()> {
            self.inner.delete_appointment(id).await
        }

        async fn load_appointment(&self, id: AppointmentId) -> DbResult<Option<Appointment>> {
            self.inner.load_appointment(id).await
        }

        async fn load_all_appointments(&self) -> DbResult<Vec<(AppointmentId, Appointment)>> {
            self.inner.load_all_appointments().await
        }

        async fn store_locator_index_entry(
            &self,
            locator: Locator,
            id: AppointmentId,
        ) -> DbResult<()> {
            if self.fail_index_writes.load(Ordering::SeqCst) {
                return Err(DbError::InMemory(InMemoryError::NotFound));
            }

            self.inner.store_locator_index_entry(locator, id).await
        }

        async fn delete_locator_index_entry(
            &self,
            locator: Locator,
            id: AppointmentId,
        ) -> DbResult<()> {
            self.inner.delete_locator_index_entry(locator, id).await
        }

        async fn load_locator_index_entry(
            &self,
            locator: Locator,
        ) -> DbResult<Vec<AppointmentId>> {
            self.inner.load_locator_index_entry(locator).await
        }

        async fn get_last_known_block_height(&self) -> DbResult<Option<BitcoinBlockHeight>> {
            self.inner.get_last_known_block_height().await
        }

        async fn set_last_known_block_height(&self, height: BitcoinBlockHeight) -> DbResult<()> {
            self.inner.set_last_known_block_height(height).await
        }
    }

    struct Setup {
        watcher: Watcher,
        chain: MockChain,
        monitor: ChainMonitor,
        db: Arc<dyn WatcherDb>,
        responder: Arc<RecordingResponder>,
    }

    fn config() -> WatcherConfig {
        WatcherConfig::default().with_chain_retry_interval(POLL)
    }

    fn setup_with(
        config: WatcherConfig,
        db: Arc<dyn WatcherDb>,
        chain: MockChain,
        start_height: BitcoinBlockHeight,
    ) -> Setup {
        let monitor = ChainMonitor::start(
            &ChainMonitorConfig::default().with_polling_interval(POLL),
            Arc::new(chain.clone()),
            Some(start_height),
        );
        let responder = Arc::new(RecordingResponder::default());

        let watcher = Watcher::new(
            config,
            db.clone(),
            Arc::new(chain.clone()),
            monitor.clone(),
            responder.clone(),
            Arc::new(TowerSigner::new(generate_secret_key())),
            Arc::new(BlobCipher),
        );

        Setup {
            watcher,
            chain,
            monitor,
            db,
            responder,
        }
    }

    fn setup(config: WatcherConfig) -> Setup {
        setup_with(
            config,
            Arc::new(WatcherInMemory::default()),
            MockChain::new(),
            1,
        )
    }

    async fn eventually<F, Fut>(what: &str, mut check: F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        let waited = timeout(WAIT, async {
            while !check().await {
                sleep(POLL).await;
            }
        })
        .await;

        assert!(waited.is_ok(), "timed out waiting until {what}");
    }

    async fn accept(watcher: &Watcher, appointment: Appointment) -> AppointmentId {
        match watcher
            .add_appointment(appointment)
            .await
            .expect("must be able to add appointment")
        {
            AddAppointmentOutcome::Accepted { id, .. } => id,
            AddAppointmentOutcome::Rejected => panic!("appointment must be accepted"),
        }
    }

    #[tokio::test]
    async fn test_capacity() {
        let s = setup(config().with_max_appointments(3));

        for _ in 0..3 {
            let appointment = generate_appointment();
            let outcome = s
                .watcher
                .add_appointment(appointment.clone())
                .await
                .expect("must be able to add appointment");

            let AddAppointmentOutcome::Accepted { signature, .. } = outcome else {
                panic!("appointment within capacity must be accepted");
            };
            assert!(
                verify_signature(
                    &appointment.to_canonical_bytes(),
                    &signature,
                    &s.watcher.public_key()
                ),
                "receipt must verify against the tower key"
            );
        }

        let overflow = generate_appointment();
        assert_eq!(
            s.watcher
                .add_appointment(overflow.clone())
                .await
                .expect("a full tower is not an error"),
            AddAppointmentOutcome::Rejected
        );
        assert_eq!(s.watcher.num_appointments().await, 3);
        assert_eq!(
            s.watcher.appointment_status(&overflow.locator).await,
            AppointmentStatus::NotFound
        );
        assert!(
            s.db
                .load_all_appointments()
                .await
                .is_ok_and(|v| v.len() == 3),
            "rejected appointment must not be persisted"
        );
    }

    #[tokio::test]
    async fn test_duplicate_locators_coexist() {
        let s = setup(config());
        let dispute_txid = generate_txid();

        let first = generate_appointment_for(&dispute_txid, &generate_penalty_tx(), 0, 100);
        let second = generate_appointment_for(&dispute_txid, &generate_penalty_tx(), 0, 200);
        let locator = first.locator;

        let first_id = accept(&s.watcher, first).await;
        let second_id = accept(&s.watcher, second).await;
        assert_ne!(first_id, second_id);

        let stored = s
            .watcher
            .get_appointments(&locator)
            .await
            .expect("must be able to load appointments");
        let stored_ids: BTreeSet<_> = stored.iter().map(|(id, _)| *id).collect();

        assert_eq!(stored_ids, BTreeSet::from([first_id, second_id]));
        assert!(
            s.db
                .load_locator_index_entry(locator)
                .await
                .is_ok_and(|v| v.len() == 2),
            "both ids must be indexed in persistence"
        );
        assert_eq!(
            s.watcher.appointment_status(&locator).await,
            AppointmentStatus::BeingWatched
        );
    }

    #[tokio::test]
    async fn test_breach_detection_precision() {
        let s = setup(config().with_max_appointments(200));

        let txids: Vec<Txid> = (0..200).map(|_| generate_txid()).collect();
        let (watched, unwatched) = txids.split_at(100);

        for txid in watched {
            accept(
                &s.watcher,
                generate_appointment_for(txid, &generate_penalty_tx(), 0, 1_000),
            )
            .await;
        }

        let breaches = s.watcher.get_breaches(&txids).await;

        let expected: BTreeMap<Locator, Vec<Txid>> = watched
            .iter()
            .map(|txid| (Locator::from_txid(txid), vec![*txid]))
            .collect();
        assert_eq!(breaches, expected);

        assert!(s.watcher.get_breaches(unwatched).await.is_empty());
        assert!(s.watcher.get_breaches(&[]).await.is_empty());
    }

    #[tokio::test]
    async fn test_breach_validation() {
        let s = setup(config());

        let genuine_txid = generate_txid();
        let genuine_penalty = generate_penalty_tx();
        let genuine = generate_appointment_for(&genuine_txid, &genuine_penalty, 0, 100);

        // locator matches but the blob is keyed to some other transaction
        let colliding_txid = generate_txid();
        let colliding = Appointment {
            locator: Locator::from_txid(&colliding_txid),
            ..generate_appointment_for(&generate_txid(), &generate_penalty_tx(), 0, 100)
        };

        let garbage_txid = generate_txid();
        let garbage = generate_undecodable_appointment_for(&garbage_txid, 0, 100);

        let genuine_id = accept(&s.watcher, genuine).await;
        let colliding_id = accept(&s.watcher, colliding).await;
        let garbage_id = accept(&s.watcher, garbage).await;

        let breaches = s
            .watcher
            .get_breaches(&[genuine_txid, colliding_txid, garbage_txid, generate_txid()])
            .await;
        assert_eq!(breaches.len(), 3);

        let mut outcomes = s.watcher.filter_valid_breaches(&breaches).await;
        assert_eq!(outcomes.len(), 3);

        assert!(matches!(
            outcomes.remove(&genuine_id),
            Some(BreachOutcome::Valid { dispute_txid, penalty_tx })
                if dispute_txid == genuine_txid && penalty_tx == genuine_penalty
        ));
        assert!(matches!(
            outcomes.remove(&colliding_id),
            Some(BreachOutcome::Invalid {
                reason: InvalidBreach::Decryption(_),
                ..
            })
        ));
        assert!(matches!(
            outcomes.remove(&garbage_id),
            Some(BreachOutcome::Invalid {
                reason: InvalidBreach::MalformedPenalty(_),
                ..
            })
        ));

        assert_eq!(
            s.watcher.num_appointments().await,
            3,
            "validation alone must not remove anything"
        );
    }

    #[tokio::test]
    async fn test_timeout_then_sleep() {
        let s = setup(config().with_expiry_delta(2));
        assert!(s.watcher.is_asleep().await);
        assert_eq!(s.monitor.num_consumers().await, 0);

        let appointment = generate_appointment_for(&generate_txid(), &generate_penalty_tx(), 0, 1);
        let locator = appointment.locator;
        accept(&s.watcher, appointment).await;

        assert!(!s.watcher.is_asleep().await);
        assert_eq!(s.monitor.num_consumers().await, 1);

        s.chain.mine_empty_blocks(3).await;
        let db = &s.db;
        eventually("height 3 is processed", || async move {
            db.get_last_known_block_height()
                .await
                .is_ok_and(|v| v == Some(3))
        })
        .await;
        assert_eq!(
            s.watcher.appointment_status(&locator).await,
            AppointmentStatus::BeingWatched,
            "end_time + expiry_delta is still within the grace period"
        );

        s.chain.mine_block(vec![]).await;
        let watcher = &s.watcher;
        eventually("the watcher sleeps", || async move {
            watcher.is_asleep().await
        })
        .await;

        assert_eq!(s.watcher.num_appointments().await, 0);
        assert_eq!(s.monitor.num_consumers().await, 0);
        assert_eq!(
            s.watcher.appointment_status(&locator).await,
            AppointmentStatus::NotFound
        );
        assert!(
            s.db
                .load_all_appointments()
                .await
                .is_ok_and(|v| v.is_empty()),
            "expired appointment must be deleted"
        );
        assert!(
            s.db
                .load_locator_index_entry(locator)
                .await
                .is_ok_and(|v| v.is_empty()),
            "expired index entry must be deleted"
        );
        assert!(s.responder.breaches().await.is_empty());
    }

    #[tokio::test]
    async fn test_breach_removal() {
        let s = setup(config().with_expiry_delta(2));

        let disputes: Vec<Txid> = (0..5).map(|_| generate_txid()).collect();
        let penalties: Vec<_> = (0..5).map(|_| generate_penalty_tx()).collect();
        for (txid, penalty) in disputes.iter().zip(&penalties) {
            accept(&s.watcher, generate_appointment_for(txid, penalty, 0, 3)).await;
        }

        s.chain
            .mine_block(vec![generate_txid(), disputes[0], disputes[1]])
            .await;

        let responder = &s.responder;
        eventually("two breaches are handed over", || async move {
            responder.breaches().await.len() == 2
        })
        .await;

        let breaches = s.responder.breaches().await;
        let responded: BTreeSet<_> = breaches.iter().map(|b| b.dispute_txid).collect();
        assert_eq!(responded, BTreeSet::from([disputes[0], disputes[1]]));
        for breach in &breaches {
            let index = disputes
                .iter()
                .position(|txid| *txid == breach.dispute_txid)
                .expect("breach must match a dispute");
            assert_eq!(breach.penalty_tx, penalties[index]);
        }

        let watcher = &s.watcher;
        eventually("responded appointments are removed", || async move {
            watcher.num_appointments().await == 3
        })
        .await;
        assert_eq!(
            s.watcher
                .appointment_status(&Locator::from_txid(&disputes[0]))
                .await,
            AppointmentStatus::DisputeResponded
        );
        assert_eq!(
            s.watcher
                .appointment_status(&Locator::from_txid(&disputes[2]))
                .await,
            AppointmentStatus::BeingWatched
        );

        // 3 + 2 < 6
        s.chain.mine_empty_blocks(5).await;
        eventually("the rest times out", || async move {
            watcher.is_asleep().await
        })
        .await;

        assert_eq!(s.watcher.num_appointments().await, 0);
        assert_eq!(s.responder.breaches().await.len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_breach_is_kept_until_expiry() {
        let s = setup(config().with_expiry_delta(1));

        let dispute_txid = generate_txid();
        let appointment = generate_undecodable_appointment_for(&dispute_txid, 0, 2);
        accept(&s.watcher, appointment).await;

        s.chain.mine_block(vec![dispute_txid]).await;
        let db = &s.db;
        eventually("the dispute block is processed", || async move {
            db.get_last_known_block_height()
                .await
                .is_ok_and(|v| v == Some(1))
        })
        .await;

        assert_eq!(s.watcher.num_appointments().await, 1);
        assert!(s.responder.breaches().await.is_empty());

        s.chain.mine_empty_blocks(3).await;
        let watcher = &s.watcher;
        eventually("the invalid appointment expires", || async move {
            watcher.is_asleep().await
        })
        .await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_adds_wake_exactly_once() {
        let s = setup(config());
        assert!(s.watcher.is_asleep().await);

        let adds = (0..20)
            .map(|_| {
                let watcher = s.watcher.clone();
                tokio::spawn(async move { watcher.add_appointment(generate_appointment()).await })
            })
            .collect::<Vec<_>>();

        for add in adds {
            let outcome = add
                .await
                .expect("task must not panic")
                .expect("must be able to add appointment");
            assert!(matches!(outcome, AddAppointmentOutcome::Accepted { .. }));
        }

        assert!(!s.watcher.is_asleep().await);
        assert_eq!(s.watcher.num_appointments().await, 20);
        assert_eq!(
            s.monitor.num_consumers().await,
            1,
            "exactly one consumer must be attached"
        );
    }

    #[tokio::test]
    async fn test_wakes_again_after_sleeping() {
        let s = setup(config().with_expiry_delta(0));

        accept(&s.watcher, Appointment { end_time: 1, ..generate_appointment() }).await;
        s.chain.mine_empty_blocks(2).await;

        let watcher = &s.watcher;
        eventually("the watcher sleeps", || async move {
            watcher.is_asleep().await
        })
        .await;

        let dispute_txid = generate_txid();
        let penalty_tx = generate_penalty_tx();
        accept(
            &s.watcher,
            generate_appointment_for(&dispute_txid, &penalty_tx, 2, 100),
        )
        .await;
        assert_eq!(s.monitor.num_consumers().await, 1);

        s.chain.mine_block(vec![dispute_txid]).await;

        let responder = &s.responder;
        eventually("the breach is handed over", || async move {
            responder.breaches().await.len() == 1
        })
        .await;
        assert_eq!(s.responder.breaches().await[0].penalty_tx, penalty_tx);
    }

    #[tokio::test]
    async fn test_dispute_in_reorged_in_block_is_detected() {
        let s = setup(config());

        let dispute_txid = generate_txid();
        let penalty_tx = generate_penalty_tx();
        accept(
            &s.watcher,
            generate_appointment_for(&dispute_txid, &penalty_tx, 0, 100),
        )
        .await;

        s.chain.mine_empty_blocks(1).await;
        let db = &s.db;
        eventually("the first block is processed", || async move {
            db.get_last_known_block_height()
                .await
                .is_ok_and(|height| height == Some(1))
        })
        .await;

        let replacement = s.chain.replace_tip(vec![dispute_txid]).await;
        assert_eq!(replacement.height, 1);

        let responder = &s.responder;
        eventually("the breach in the replacement is handed over", || async move {
            responder.breaches().await.len() == 1
        })
        .await;

        let breaches = s.responder.breaches().await;
        assert_eq!(breaches[0].dispute_txid, dispute_txid);
        assert_eq!(breaches[0].penalty_tx, penalty_tx);

        s.chain.mine_empty_blocks(1).await;
        eventually("the next block is processed", || async move {
            db.get_last_known_block_height()
                .await
                .is_ok_and(|height| height == Some(2))
        })
        .await;
        assert_eq!(s.responder.breaches().await.len(), 1);
    }

    #[tokio::test]
    async fn test_blocks_queued_while_going_to_sleep_are_drained() {
        use chain_monitor::BlockConsumer;

        let s = setup(config());
        let (handle, mut blocks) = ConsumerHandle::new(Arc::new(AtomicBool::new(false)));

        let first = s.chain.mine_empty_blocks(1).await.expect("one block was mined");
        let second = s.chain.mine_empty_blocks(1).await.expect("one block was mined");
        handle.deliver(first);
        handle.deliver(second);

        s.watcher.drain(&mut blocks).await;

        assert!(blocks.try_next().is_none(), "every queued block must be taken");
        assert!(
            s.db
                .get_last_known_block_height()
                .await
                .is_ok_and(|height| height == Some(second.height)),
            "the last drained block must be recorded"
        );
    }

    #[tokio::test]
    async fn test_persistence_failure_rolls_back() {
        let db = Arc::new(FlakyDb::default());
        let s = setup_with(config(), db.clone(), MockChain::new(), 1);

        db.fail_index_writes.store(true, Ordering::SeqCst);
        let appointment = generate_appointment();

        assert!(matches!(
            s.watcher.add_appointment(appointment.clone()).await,
            Err(WatcherError::Db(_))
        ));
        assert_eq!(s.watcher.num_appointments().await, 0);
        assert!(s.watcher.is_asleep().await);
        assert_eq!(s.monitor.num_consumers().await, 0);
        assert!(
            db.load_all_appointments()
                .await
                .is_ok_and(|v| v.is_empty()),
            "stored appointment must be rolled back"
        );

        db.fail_index_writes.store(false, Ordering::SeqCst);
        accept(&s.watcher, appointment).await;
        assert_eq!(s.watcher.num_appointments().await, 1);
    }

    #[tokio::test]
    async fn test_restore_and_catch_up() {
        let db: Arc<dyn WatcherDb> = Arc::new(WatcherInMemory::default());
        let chain = MockChain::new();

        let dispute_txid = generate_txid();
        let penalty_tx = generate_penalty_tx();
        let caught = generate_appointment_for(&dispute_txid, &penalty_tx, 0, 100);
        let pending = generate_appointment_for(&generate_txid(), &generate_penalty_tx(), 0, 100);

        for appointment in [&caught, &pending] {
            let id = AppointmentId::new_random();
            db.store_appointment(id, appointment)
                .await
                .expect("must be able to store appointment");
            db.store_locator_index_entry(appointment.locator, id)
                .await
                .expect("must be able to store index entry");
        }
        db.set_last_known_block_height(0)
            .await
            .expect("must be able to set height");

        // the dispute confirms while the tower is down
        chain.mine_block(vec![dispute_txid]).await;
        chain.mine_empty_blocks(2).await;

        let start_height = db
            .get_last_known_block_height()
            .await
            .expect("must be able to get height")
            .map_or(1, |height| height + 1);
        let s = setup_with(config(), db, chain, start_height);

        assert_eq!(
            s.watcher.restore().await.expect("must be able to restore"),
            2
        );
        assert!(!s.watcher.is_asleep().await);

        let responder = &s.responder;
        eventually("the missed breach is caught", || async move {
            responder.breaches().await.len() == 1
        })
        .await;
        assert_eq!(s.responder.breaches().await[0].dispute_txid, dispute_txid);

        let db = &s.db;
        eventually("the backlog is processed", || async move {
            db.get_last_known_block_height()
                .await
                .is_ok_and(|v| v == Some(3))
        })
        .await;
        assert_eq!(
            s.watcher.appointment_status(&pending.locator).await,
            AppointmentStatus::BeingWatched
        );
    }

    #[tokio::test]
    async fn test_shutdown_detaches() {
        let s = setup(config());
        accept(&s.watcher, generate_appointment()).await;
        assert_eq!(s.monitor.num_consumers().await, 1);

        s.watcher.shutdown().await;

        assert!(s.watcher.is_asleep().await);
        assert_eq!(s.monitor.num_consumers().await, 0);
        assert_eq!(
            s.watcher.num_appointments().await,
            1,
            "shutting down must not forget appointments"
        );
    }
}
