use bytes::Bytes;
use chrono::{DateTime, Utc};
use stake_types::{
    api::{
        BetDetail, BetFilter, CreateBetRequest, ExploreSort, Participation, PendingStake,
        UpdateBetRequest, UserStats,
    },
    Bet, BetId, ProofType, StakeInstance,
};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::blob::{proof_object_key, BlobStore};
use crate::clock::Clock;
use crate::directory::Directory;
use crate::layer::{new_id, Layer};
use crate::lifecycle::{Lifecycle, TransitionResult};
use crate::locks::KeyedLocks;
use crate::metrics::{LifecycleMetrics, LifecycleSnapshot};
use crate::query::{
    query_bet_detail, query_bets, query_explore, query_feed, query_participations,
    query_pending_stakes, query_stats, with_effective_status,
};
use crate::settlement::ProofFile;
use crate::state::{load_bets, State};
use crate::{Error, Event, Result};

/// Lifecycle authority over one entity store.
///
/// Writers of the same bet are serialized by a per-bet lock. Each operation
/// then reads, checks and stages its writes in a [`Layer`] while holding the
/// store lock, and applies the change set before releasing it.
pub struct Engine<S: State> {
    state: Mutex<S>,
    locks: KeyedLocks,
    directory: Arc<dyn Directory>,
    clock: Arc<dyn Clock>,
    metrics: LifecycleMetrics,
}

impl<S: State + Send> Engine<S> {
    pub fn new(state: S, directory: Arc<dyn Directory>, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(state),
            locks: KeyedLocks::default(),
            directory,
            clock,
            metrics: LifecycleMetrics::default(),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn directory(&self) -> &dyn Directory {
        self.directory.as_ref()
    }

    pub fn metrics(&self) -> LifecycleSnapshot {
        self.metrics.snapshot()
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, S>> {
        self.state
            .lock()
            .map_err(|_| Error::Storage(anyhow::anyhow!("entity store lock poisoned")))
    }

    /// Run `f` against a read-only view of the store.
    pub fn read<T>(&self, f: impl FnOnce(&S, DateTime<Utc>) -> Result<T>) -> Result<T> {
        let now = self.clock.now();
        let state = self.lock_state()?;
        f(&*state, now)
    }

    fn transact<T>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&mut Layer<'_, S>) -> Result<T>,
    ) -> Result<T> {
        let now = self.clock.now();
        let mut state = self.lock_state()?;
        let mut layer = Layer::new(&*state, self.directory.as_ref(), now);
        let output = match f(&mut layer) {
            Ok(output) => output,
            Err(err) => {
                self.metrics.record_error(&err);
                warn!(operation, kind = err.kind(), error = %err, "operation rejected");
                return Err(err);
            }
        };
        let (changes, events) = layer.commit();
        if !changes.is_empty() {
            if let Err(err) = state.apply(changes) {
                let err = Error::Storage(err.context(format!("committing {operation}")));
                self.metrics.record_error(&err);
                warn!(operation, error = %err, "commit failed");
                return Err(err);
            }
        }
        drop(state);
        self.publish(&events);
        Ok(output)
    }

    fn publish(&self, events: &[Event]) {
        for event in events {
            self.metrics.record_event(event);
            match event {
                Event::BetCreated { bet_id, host } => {
                    info!(bet_id = %bet_id, actor = %host, status = "OPEN", "bet created")
                }
                Event::BetUpdated { bet_id } => info!(bet_id = %bet_id, "bet updated"),
                Event::PickRecorded {
                    bet_id,
                    user,
                    option_id,
                } => info!(
                    bet_id = %bet_id,
                    actor = %user,
                    option_id = %option_id,
                    "pick recorded"
                ),
                Event::BetLocked { bet_id, automatic } => info!(
                    bet_id = %bet_id,
                    automatic = *automatic,
                    status = "LOCKED",
                    "bet locked"
                ),
                Event::BetResolved {
                    bet_id,
                    winning_option_id,
                    winners,
                    losers,
                } => info!(
                    bet_id = %bet_id,
                    winning_option_id = %winning_option_id,
                    winners = winners.len(),
                    losers = losers.len(),
                    status = "RESOLVED",
                    "bet resolved"
                ),
                Event::StakeCreated {
                    bet_id,
                    stake_id,
                    user,
                    status,
                } => info!(
                    bet_id = %bet_id,
                    stake_id = %stake_id,
                    actor = %user,
                    status = ?status,
                    "stake created"
                ),
                Event::ProofSubmitted {
                    bet_id,
                    stake_id,
                    user,
                    proof_type,
                } => info!(
                    bet_id = %bet_id,
                    stake_id = %stake_id,
                    actor = %user,
                    proof_type = %proof_type,
                    "proof submitted"
                ),
            }
        }
    }

    pub fn create_bet(&self, host: &str, request: &CreateBetRequest) -> Result<Bet> {
        self.transact("create_bet", |layer| layer.create_bet(host, request))
    }

    pub async fn update_bet(
        &self,
        actor: &str,
        bet_id: &str,
        patch: &UpdateBetRequest,
    ) -> Result<Bet> {
        let _guard = self.locks.lock(bet_id).await;
        self.transact("update_bet", |layer| layer.update_bet(actor, bet_id, patch))
    }

    /// Record or change the actor's pick and return the updated bet.
    pub async fn record_pick(
        &self,
        actor: &str,
        bet_id: &str,
        option_id: &str,
    ) -> Result<BetDetail> {
        let _guard = self.locks.lock(bet_id).await;
        self.transact("record_pick", |layer| {
            layer.record_pick(actor, bet_id, option_id)?;
            let now = layer.now();
            query_bet_detail(&*layer, self.directory.as_ref(), actor, bet_id, now)
        })
    }

    pub async fn lock_bet(&self, actor: &str, bet_id: &str) -> Result<Bet> {
        let _guard = self.locks.lock(bet_id).await;
        self.transact("lock_bet", |layer| layer.lock_bet(actor, bet_id))
    }

    /// Resolve the bet; stakes for losers are created in the same commit.
    pub async fn resolve(
        &self,
        actor: &str,
        bet_id: &str,
        winning_option_id: &str,
    ) -> Result<BetDetail> {
        let _guard = self.locks.lock(bet_id).await;
        self.transact("resolve", |layer| {
            layer.resolve(actor, bet_id, winning_option_id)?;
            let now = layer.now();
            query_bet_detail(&*layer, self.directory.as_ref(), actor, bet_id, now)
        })
    }

    /// Store the proof binary, then complete the stake.
    ///
    /// The bet lock is held from the first check until the commit, so no other
    /// writer of this bet can interleave with the storage write. The stake is
    /// only committed once `blobs` has acknowledged the object; if the commit
    /// is then refused, the stored object is removed again.
    #[allow(clippy::too_many_arguments)]
    pub async fn submit_proof<B: BlobStore>(
        &self,
        blobs: &B,
        actor: &str,
        bet_id: &str,
        stake_id: &str,
        proof_type: ProofType,
        file: ProofFile,
        body: Bytes,
    ) -> Result<StakeInstance> {
        let _guard = self.locks.lock(bet_id).await;
        self.transact("check_proof", |layer| {
            layer.check_proof(actor, bet_id, stake_id, proof_type, &file)
        })?;

        let proof_id = new_id();
        let object_key = proof_object_key(bet_id, stake_id, &proof_id, &file);
        let proof_url = match blobs.put(&object_key, &file.content_type, body).await {
            Ok(url) => url,
            Err(err) => {
                let err = Error::Storage(err.context("storing proof"));
                self.metrics.record_error(&err);
                warn!(
                    bet_id,
                    stake_id,
                    error = %err,
                    "proof storage failed; stake left pending"
                );
                return Err(err);
            }
        };

        let committed = self.transact("submit_proof", |layer| {
            layer.submit_proof(
                actor,
                bet_id,
                stake_id,
                proof_type,
                &file,
                proof_id,
                proof_url,
            )
        });
        if committed.is_err() {
            if let Err(err) = blobs.remove(&object_key).await {
                warn!(
                    bet_id,
                    stake_id,
                    object_key = %object_key,
                    error = ?err,
                    "failed to remove orphaned proof"
                );
            }
        }
        committed
    }

    /// Persist the deadline lock for every expired open bet. Returns the ids
    /// that were locked.
    pub async fn sweep_expired(&self) -> Result<Vec<BetId>> {
        let candidates = self.read(|state, now| {
            Ok(load_bets(state)?
                .into_iter()
                .filter(|bet| {
                    Lifecycle::check_transition(bet.status, bet.deadline, now)
                        != TransitionResult::NoTransition
                })
                .map(|bet| bet.id)
                .collect::<Vec<_>>())
        })?;

        let mut locked = Vec::new();
        for bet_id in candidates {
            let _guard = self.locks.lock(&bet_id).await;
            if let Some(bet) = self.transact("sweep", |layer| layer.sweep_bet(&bet_id))? {
                locked.push(bet.id);
            }
        }
        if !locked.is_empty() {
            debug!(count = locked.len(), "sweep locked expired bets");
        }
        Ok(locked)
    }

    pub fn fetch_bet(&self, actor: &str, bet_id: &str) -> Result<BetDetail> {
        self.read(|state, now| query_bet_detail(state, self.directory(), actor, bet_id, now))
    }

    pub fn list_bets(&self, actor: &str, filter: &BetFilter) -> Result<Vec<Bet>> {
        self.read(|state, now| query_bets(state, self.directory(), actor, filter, now))
    }

    /// Bets of a circle; the actor must be a member.
    pub fn circle_bets(&self, actor: &str, circle_id: &str) -> Result<Vec<Bet>> {
        let circle = self
            .directory
            .circle(circle_id)
            .ok_or_else(|| Error::not_found("circle", circle_id))?;
        if !circle.has_member(actor) {
            return Err(Error::Authorization(format!(
                "{actor} is not a member of circle {circle_id}"
            )));
        }
        self.list_bets(
            actor,
            &BetFilter {
                status: None,
                circle_id: Some(circle_id.to_string()),
            },
        )
    }

    pub fn feed(&self, actor: &str) -> Result<Vec<Bet>> {
        self.read(|state, now| query_feed(state, self.directory(), actor, now))
    }

    pub fn explore(&self, actor: &str, sort: ExploreSort) -> Result<Vec<Bet>> {
        self.read(|state, now| query_explore(state, self.directory(), actor, sort, now))
    }

    pub fn pending_stakes(&self, actor: &str) -> Result<Vec<PendingStake>> {
        self.read(|state, now| query_pending_stakes(state, actor, now))
    }

    pub fn participations(&self, actor: &str) -> Result<Vec<Participation>> {
        self.read(|state, now| query_participations(state, actor, now))
    }

    pub fn stats(&self, actor: &str) -> Result<UserStats> {
        self.read(|state, _| query_stats(state, actor))
    }

    /// Bet as stored, with the deadline rule applied and no visibility check.
    pub fn bet(&self, bet_id: &str) -> Result<Bet> {
        self.read(|state, now| {
            crate::state::load_bet(state, bet_id)?
                .map(|bet| with_effective_status(bet, now))
                .ok_or_else(|| Error::not_found("bet", bet_id))
        })
    }
}
