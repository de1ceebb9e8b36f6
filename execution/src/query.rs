//! Read models over the entity store.
//!
//! Every query sees bets with their effective status (see
//! [`crate::lifecycle`]) so an expired bet reads as locked whether or not the
//! sweep has persisted it yet.
//!
//! ## Query Types
//!
//! - [`query_bet_detail`]: one bet with participants and their stakes
//! - [`query_feed`]: bets the actor hosts, joined, or can see through a circle
//! - [`query_explore`]: friends-public bets from the actor's network
//! - [`query_pending_stakes`]: stakes the actor still owes proof for
//! - [`query_participations`] and [`query_stats`]: the actor's history

use chrono::{DateTime, Utc};
use stake_types::{
    api::{
        BetDetail, BetFilter, ExploreSort, ParticipantView, Participation, ParticipationOutcome,
        PendingStake, UserStats,
    },
    Bet, Privacy,
};
use std::cmp::Ordering;
use std::collections::HashMap;

use crate::directory::{can_view, Directory};
use crate::lifecycle::Lifecycle;
use crate::state::{
    load_all_stakes, load_bet, load_bets, load_participant, load_participants, load_stakes_of,
    State,
};
use crate::{Error, Result};

/// Replace the stored status with the effective one.
pub fn with_effective_status(mut bet: Bet, now: DateTime<Utc>) -> Bet {
    bet.status = Lifecycle::effective_status_of(&bet, now);
    bet
}

pub fn is_visible<S: State + ?Sized>(
    state: &S,
    directory: &dyn Directory,
    actor: &str,
    bet: &Bet,
) -> Result<bool> {
    if can_view(directory, actor, bet) {
        return Ok(true);
    }
    Ok(load_participant(state, &bet.id, actor)?.is_some())
}

pub fn query_bet_detail<S: State + ?Sized>(
    state: &S,
    directory: &dyn Directory,
    actor: &str,
    bet_id: &str,
    now: DateTime<Utc>,
) -> Result<BetDetail> {
    let bet = load_bet(state, bet_id)?.ok_or_else(|| Error::not_found("bet", bet_id))?;
    if !is_visible(state, directory, actor, &bet)? {
        return Err(Error::Authorization(format!(
            "bet {bet_id} is not visible to {actor}"
        )));
    }
    let mut stakes: HashMap<String, _> = load_stakes_of(state, bet_id)?
        .into_iter()
        .map(|stake| (stake.participant_id.clone(), stake))
        .collect();
    let participants = load_participants(state, bet_id)?
        .into_iter()
        .map(|participant| ParticipantView {
            stake_instance: stakes.remove(&participant.id),
            participant,
        })
        .collect();
    Ok(BetDetail {
        bet: with_effective_status(bet, now),
        participants,
    })
}

/// Visible bets, newest first, filtered by effective status and circle.
pub fn query_bets<S: State + ?Sized>(
    state: &S,
    directory: &dyn Directory,
    actor: &str,
    filter: &BetFilter,
    now: DateTime<Utc>,
) -> Result<Vec<Bet>> {
    let mut bets = Vec::new();
    for bet in load_bets(state)? {
        if let Some(circle) = &filter.circle_id {
            if bet.circle_id.as_ref() != Some(circle) {
                continue;
            }
        }
        if !is_visible(state, directory, actor, &bet)? {
            continue;
        }
        let bet = with_effective_status(bet, now);
        if filter.status.is_some_and(|status| status != bet.status) {
            continue;
        }
        bets.push(bet);
    }
    bets.sort_by(newest_first);
    Ok(bets)
}

/// Bets the actor hosts, has picked on, or that belong to one of the actor's
/// circles. Active bets come first, then by deadline.
pub fn query_feed<S: State + ?Sized>(
    state: &S,
    directory: &dyn Directory,
    actor: &str,
    now: DateTime<Utc>,
) -> Result<Vec<Bet>> {
    let circles = directory.circles_of(actor);
    let mut bets = Vec::new();
    for bet in load_bets(state)? {
        let in_circle = bet
            .circle_id
            .as_ref()
            .is_some_and(|circle| circles.contains(circle));
        if bet.is_host(actor) || in_circle || load_participant(state, &bet.id, actor)?.is_some()
        {
            bets.push(with_effective_status(bet, now));
        }
    }
    bets.sort_by(active_then_deadline);
    Ok(bets)
}

/// Friends-public bets hosted by the actor's friends or followed users. Never
/// the actor's own, never circle-private, never global.
pub fn query_explore<S: State + ?Sized>(
    state: &S,
    directory: &dyn Directory,
    actor: &str,
    sort: ExploreSort,
    now: DateTime<Utc>,
) -> Result<Vec<Bet>> {
    let network = directory.network_of(actor);
    let mut bets: Vec<Bet> = load_bets(state)?
        .into_iter()
        .filter(|bet| {
            bet.privacy == Privacy::FriendsPublic
                && !bet.is_host(actor)
                && network.contains(&bet.created_by)
        })
        .map(|bet| with_effective_status(bet, now))
        .collect();
    match sort {
        ExploreSort::Newest => bets.sort_by(newest_first),
        ExploreSort::Deadline => {
            bets.sort_by(|a, b| a.deadline.cmp(&b.deadline).then_with(|| a.id.cmp(&b.id)))
        }
        ExploreSort::Active => bets.sort_by(active_then_deadline),
    }
    Ok(bets)
}

/// The actor's pending stakes joined with their participant and bet, oldest first.
pub fn query_pending_stakes<S: State + ?Sized>(
    state: &S,
    actor: &str,
    now: DateTime<Utc>,
) -> Result<Vec<PendingStake>> {
    let mut pending = Vec::new();
    for stake in load_all_stakes(state)? {
        if stake.user_id != actor || !stake.is_pending() {
            continue;
        }
        let bet = load_bet(state, &stake.bet_id)?.ok_or_else(|| {
            Error::Storage(anyhow::anyhow!(
                "stake {} references missing bet {}",
                stake.id,
                stake.bet_id
            ))
        })?;
        let participant = load_participant(state, &stake.bet_id, actor)?.ok_or_else(|| {
            Error::Storage(anyhow::anyhow!(
                "stake {} references missing participant {}",
                stake.id,
                stake.participant_id
            ))
        })?;
        pending.push(PendingStake {
            stake,
            participant,
            bet: with_effective_status(bet, now),
        });
    }
    pending.sort_by(|a, b| {
        a.stake
            .created_at
            .cmp(&b.stake.created_at)
            .then_with(|| a.stake.id.cmp(&b.stake.id))
    });
    Ok(pending)
}

/// Every bet the actor has picked on, with the outcome of the pick.
pub fn query_participations<S: State + ?Sized>(
    state: &S,
    actor: &str,
    now: DateTime<Utc>,
) -> Result<Vec<Participation>> {
    let mut participations = Vec::new();
    for bet in load_bets(state)? {
        let Some(participant) = load_participant(state, &bet.id, actor)? else {
            continue;
        };
        let outcome = match bet.winning_option_id() {
            Some(winning) if winning == participant.selected_option_id => {
                ParticipationOutcome::Won
            }
            Some(_) => ParticipationOutcome::Lost,
            None => ParticipationOutcome::Pending,
        };
        let stake_instance = load_stakes_of(state, &bet.id)?
            .into_iter()
            .find(|stake| stake.participant_id == participant.id);
        participations.push(Participation {
            bet: with_effective_status(bet, now),
            participant,
            outcome,
            stake_instance,
        });
    }
    participations.sort_by(|a, b| newest_first(&a.bet, &b.bet));
    Ok(participations)
}

pub fn query_stats<S: State + ?Sized>(state: &S, actor: &str) -> Result<UserStats> {
    let mut stats = UserStats::default();
    for bet in load_bets(state)? {
        if bet.is_host(actor) {
            stats.total_bets_created += 1;
        }
        let Some(participant) = load_participant(state, &bet.id, actor)? else {
            continue;
        };
        stats.total_bets_participated += 1;
        match bet.winning_option_id() {
            Some(winning) if winning == participant.selected_option_id => stats.wins += 1,
            Some(_) => stats.losses += 1,
            None => {}
        }
    }
    let settled = stats.wins + stats.losses;
    stats.win_rate = if settled > 0 {
        stats.wins as f64 / settled as f64
    } else {
        0.0
    };
    Ok(stats)
}

fn newest_first(a: &Bet, b: &Bet) -> Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| a.id.cmp(&b.id))
}

fn active_then_deadline(a: &Bet, b: &Bet) -> Ordering {
    Lifecycle::is_active(b.status)
        .cmp(&Lifecycle::is_active(a.status))
        .then_with(|| a.deadline.cmp(&b.deadline))
        .then_with(|| a.id.cmp(&b.id))
}
