//! Bet lifecycle state machine.
//!
//! This module holds the transition rules for a bet separately from storage
//! and actor checks. All functions are pure: the caller supplies the stored
//! status, the deadline and the current instant.
//!
//! ## States
//!
//! 1. **Open** - picks accepted, host may edit, lock or resolve
//! 2. **Locked** - picks closed, host may resolve
//! 3. **Resolved** - terminal, outcome recorded
//!
//! ## Deadline rule
//!
//! A bet whose deadline has passed is treated as locked even if the stored
//! status still reads open. The background sweep persists that transition,
//! but every read and every mutation applies the same rule through
//! [`Lifecycle::effective_status`], so a bet behaves identically whether or
//! not the sweep has reached it yet.

use chrono::{DateTime, Utc};
use stake_types::{Bet, BetStatus};

/// Result of a deadline check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransitionResult {
    /// Stored status is already current.
    NoTransition,
    /// Stored status must be advanced to the given one.
    TransitionTo(BetStatus),
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Lifecycle;

impl Lifecycle {
    /// Status after applying the deadline rule to the stored one.
    pub fn effective_status(
        stored: BetStatus,
        deadline: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> BetStatus {
        match stored {
            BetStatus::Open if now >= deadline => BetStatus::Locked,
            other => other,
        }
    }

    pub fn effective_status_of(bet: &Bet, now: DateTime<Utc>) -> BetStatus {
        Self::effective_status(bet.status, bet.deadline, now)
    }

    /// Whether moving from `from` to `to` is a legal forward step.
    pub fn can_transition(from: BetStatus, to: BetStatus) -> bool {
        to.rank() > from.rank()
    }

    /// Check whether the stored status lags behind the deadline rule.
    pub fn check_transition(
        stored: BetStatus,
        deadline: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> TransitionResult {
        let effective = Self::effective_status(stored, deadline, now);
        if effective == stored {
            TransitionResult::NoTransition
        } else {
            TransitionResult::TransitionTo(effective)
        }
    }

    /// Picks are accepted only while open and strictly before the deadline.
    pub fn is_pick_open(stored: BetStatus, deadline: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        matches!(stored, BetStatus::Open) && now < deadline
    }

    /// An explicit host lock is only meaningful while the bet is effectively open.
    pub fn can_lock(stored: BetStatus, deadline: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        Self::can_transition(
            Self::effective_status(stored, deadline, now),
            BetStatus::Locked,
        )
    }

    /// Resolution is allowed from open or locked, whatever the deadline.
    pub fn can_resolve(stored: BetStatus) -> bool {
        Self::can_transition(stored, BetStatus::Resolved)
    }

    /// Title, description and deadline may be edited only while effectively open.
    pub fn can_edit(stored: BetStatus, deadline: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        Self::is_pick_open(stored, deadline, now)
    }

    /// Whether the bet is still in play (open or locked).
    pub fn is_active(status: BetStatus) -> bool {
        !status.is_terminal()
    }
}
