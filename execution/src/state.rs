use anyhow::Result;
use stake_types::{Bet, BetId, BetParticipant, StakeId, StakeInstance, UserId};
use std::collections::BTreeMap;

/// Address of a record in the entity store.
///
/// Participants are addressed by (bet, user), so a second record for the same
/// user on the same bet can only ever overwrite the first.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Key {
    Bet(BetId),
    Participant { bet: BetId, user: UserId },
    Stake { bet: BetId, stake: StakeId },
}

impl Key {
    pub fn bet_id(&self) -> &str {
        match self {
            Key::Bet(bet) => bet,
            Key::Participant { bet, .. } | Key::Stake { bet, .. } => bet,
        }
    }

    /// Split into the (kind, scope, id) triple persistent backends index on.
    pub fn columns(&self) -> (&'static str, &str, &str) {
        match self {
            Key::Bet(bet) => (KIND_BET, "", bet),
            Key::Participant { bet, user } => (KIND_PARTICIPANT, bet, user),
            Key::Stake { bet, stake } => (KIND_STAKE, bet, stake),
        }
    }

    pub fn from_columns(kind: &str, scope: &str, id: &str) -> Option<Self> {
        match kind {
            KIND_BET => Some(Key::Bet(id.to_string())),
            KIND_PARTICIPANT => Some(Key::Participant {
                bet: scope.to_string(),
                user: id.to_string(),
            }),
            KIND_STAKE => Some(Key::Stake {
                bet: scope.to_string(),
                stake: id.to_string(),
            }),
            _ => None,
        }
    }
}

pub const KIND_BET: &str = "bet";
pub const KIND_PARTICIPANT: &str = "participant";
pub const KIND_STAKE: &str = "stake";

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Bet(Bet),
    Participant(BetParticipant),
    Stake(StakeInstance),
}

/// Range of keys returned by [`State::scan`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Prefix {
    Bets,
    ParticipantsOf(BetId),
    StakesOf(BetId),
    Stakes,
}

impl Prefix {
    pub fn matches(&self, key: &Key) -> bool {
        match (self, key) {
            (Prefix::Bets, Key::Bet(_)) => true,
            (Prefix::ParticipantsOf(bet), Key::Participant { bet: other, .. }) => bet == other,
            (Prefix::StakesOf(bet), Key::Stake { bet: other, .. }) => bet == other,
            (Prefix::Stakes, Key::Stake { .. }) => true,
            _ => false,
        }
    }

    /// The (kind, scope) pair persistent backends filter on.
    pub fn columns(&self) -> (&'static str, Option<&str>) {
        match self {
            Prefix::Bets => (KIND_BET, None),
            Prefix::ParticipantsOf(bet) => (KIND_PARTICIPANT, Some(bet)),
            Prefix::StakesOf(bet) => (KIND_STAKE, Some(bet)),
            Prefix::Stakes => (KIND_STAKE, None),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Status {
    Update(Value),
    Delete,
}

/// Key/value entity store.
///
/// Calls are short and never block on I/O outside the backend itself; callers
/// serialize access, so implementations need no interior locking.
pub trait State {
    fn get(&self, key: &Key) -> Result<Option<Value>>;
    fn insert(&mut self, key: Key, value: Value) -> Result<()>;
    fn delete(&mut self, key: &Key) -> Result<()>;

    /// All records under `prefix`, ordered by key.
    fn scan(&self, prefix: &Prefix) -> Result<Vec<(Key, Value)>>;

    /// Apply a change set. Backends that can should make this all-or-nothing.
    fn apply(&mut self, changes: Vec<(Key, Status)>) -> Result<()> {
        for (key, status) in changes {
            match status {
                Status::Update(value) => self.insert(key, value)?,
                Status::Delete => self.delete(&key)?,
            }
        }
        Ok(())
    }
}

/// In-memory store backing the fixture data source and tests.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Memory {
    state: BTreeMap<Key, Value>,
}

impl Memory {
    pub fn len(&self) -> usize {
        self.state.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }
}

impl State for Memory {
    fn get(&self, key: &Key) -> Result<Option<Value>> {
        Ok(self.state.get(key).cloned())
    }

    fn insert(&mut self, key: Key, value: Value) -> Result<()> {
        self.state.insert(key, value);
        Ok(())
    }

    fn delete(&mut self, key: &Key) -> Result<()> {
        self.state.remove(key);
        Ok(())
    }

    fn scan(&self, prefix: &Prefix) -> Result<Vec<(Key, Value)>> {
        Ok(self
            .state
            .iter()
            .filter(|(key, _)| prefix.matches(key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }
}

pub fn load_bet<S: State + ?Sized>(state: &S, id: &str) -> Result<Option<Bet>> {
    Ok(match state.get(&Key::Bet(id.to_string()))? {
        Some(Value::Bet(bet)) => Some(bet),
        _ => None,
    })
}

pub fn load_participant<S: State + ?Sized>(
    state: &S,
    bet: &str,
    user: &str,
) -> Result<Option<BetParticipant>> {
    let key = Key::Participant {
        bet: bet.to_string(),
        user: user.to_string(),
    };
    Ok(match state.get(&key)? {
        Some(Value::Participant(participant)) => Some(participant),
        _ => None,
    })
}

pub fn load_stake<S: State + ?Sized>(
    state: &S,
    bet: &str,
    stake: &str,
) -> Result<Option<StakeInstance>> {
    let key = Key::Stake {
        bet: bet.to_string(),
        stake: stake.to_string(),
    };
    Ok(match state.get(&key)? {
        Some(Value::Stake(stake)) => Some(stake),
        _ => None,
    })
}

pub fn load_bets<S: State + ?Sized>(state: &S) -> Result<Vec<Bet>> {
    Ok(state
        .scan(&Prefix::Bets)?
        .into_iter()
        .filter_map(|(_, value)| match value {
            Value::Bet(bet) => Some(bet),
            _ => None,
        })
        .collect())
}

/// Participants of a bet in pick order (oldest first).
pub fn load_participants<S: State + ?Sized>(state: &S, bet: &str) -> Result<Vec<BetParticipant>> {
    let mut participants: Vec<BetParticipant> = state
        .scan(&Prefix::ParticipantsOf(bet.to_string()))?
        .into_iter()
        .filter_map(|(_, value)| match value {
            Value::Participant(participant) => Some(participant),
            _ => None,
        })
        .collect();
    participants.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
    Ok(participants)
}

pub fn load_stakes_of<S: State + ?Sized>(state: &S, bet: &str) -> Result<Vec<StakeInstance>> {
    Ok(collect_stakes(state.scan(&Prefix::StakesOf(bet.to_string()))?))
}

pub fn load_all_stakes<S: State + ?Sized>(state: &S) -> Result<Vec<StakeInstance>> {
    Ok(collect_stakes(state.scan(&Prefix::Stakes)?))
}

fn collect_stakes(entries: Vec<(Key, Value)>) -> Vec<StakeInstance> {
    entries
        .into_iter()
        .filter_map(|(_, value)| match value {
            Value::Stake(stake) => Some(stake),
            _ => None,
        })
        .collect()
}
