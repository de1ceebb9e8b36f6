use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::{Error, Event};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LifecycleSnapshot {
    pub bets_created: u64,
    pub bets_updated: u64,
    pub picks_recorded: u64,
    pub bets_locked: u64,
    pub bets_auto_locked: u64,
    pub bets_resolved: u64,
    pub stakes_created: u64,
    pub proofs_submitted: u64,
    pub rejected_validation: u64,
    pub rejected_authorization: u64,
    pub rejected_invalid_state: u64,
    pub rejected_not_found: u64,
    pub storage_failures: u64,
}

/// Counters of committed events and rejected operations.
#[derive(Default)]
pub struct LifecycleMetrics {
    bets_created: AtomicU64,
    bets_updated: AtomicU64,
    picks_recorded: AtomicU64,
    bets_locked: AtomicU64,
    bets_auto_locked: AtomicU64,
    bets_resolved: AtomicU64,
    stakes_created: AtomicU64,
    proofs_submitted: AtomicU64,
    rejected_validation: AtomicU64,
    rejected_authorization: AtomicU64,
    rejected_invalid_state: AtomicU64,
    rejected_not_found: AtomicU64,
    storage_failures: AtomicU64,
}

impl LifecycleMetrics {
    pub fn record_event(&self, event: &Event) {
        let counter = match event {
            Event::BetCreated { .. } => &self.bets_created,
            Event::BetUpdated { .. } => &self.bets_updated,
            Event::PickRecorded { .. } => &self.picks_recorded,
            Event::BetLocked {
                automatic: true, ..
            } => &self.bets_auto_locked,
            Event::BetLocked { .. } => &self.bets_locked,
            Event::BetResolved { .. } => &self.bets_resolved,
            Event::StakeCreated { .. } => &self.stakes_created,
            Event::ProofSubmitted { .. } => &self.proofs_submitted,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self, error: &Error) {
        let counter = match error {
            Error::Validation { .. } => &self.rejected_validation,
            Error::Authorization(_) => &self.rejected_authorization,
            Error::InvalidState(_) => &self.rejected_invalid_state,
            Error::NotFound { .. } => &self.rejected_not_found,
            Error::Storage(_) => &self.storage_failures,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> LifecycleSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        LifecycleSnapshot {
            bets_created: load(&self.bets_created),
            bets_updated: load(&self.bets_updated),
            picks_recorded: load(&self.picks_recorded),
            bets_locked: load(&self.bets_locked),
            bets_auto_locked: load(&self.bets_auto_locked),
            bets_resolved: load(&self.bets_resolved),
            stakes_created: load(&self.stakes_created),
            proofs_submitted: load(&self.proofs_submitted),
            rejected_validation: load(&self.rejected_validation),
            rejected_authorization: load(&self.rejected_authorization),
            rejected_invalid_state: load(&self.rejected_invalid_state),
            rejected_not_found: load(&self.rejected_not_found),
            storage_failures: load(&self.storage_failures),
        }
    }
}
