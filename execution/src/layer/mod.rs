use anyhow::Result as StateResult;
use chrono::{DateTime, Utc};
use stake_types::{Bet, BetParticipant};
use std::collections::BTreeMap;
use tracing::debug;
use uuid::Uuid;

use crate::directory::{can_view, Directory};
use crate::state::{load_bet, load_participant, load_participants, Key, Prefix, State, Status, Value};
use crate::{Error, Event, Result};

mod handlers;

/// Write overlay for one operation.
///
/// Handlers read through the overlay and stage their writes in it; nothing
/// reaches the underlying store until [`Layer::commit`] hands the whole change
/// set back to the caller. Dropping a layer discards everything it staged.
pub struct Layer<'a, S: State> {
    state: &'a S,
    directory: &'a dyn Directory,
    now: DateTime<Utc>,

    pending: BTreeMap<Key, Status>,
    events: Vec<Event>,
}

impl<'a, S: State> Layer<'a, S> {
    pub fn new(state: &'a S, directory: &'a dyn Directory, now: DateTime<Utc>) -> Self {
        Self {
            state,
            directory,
            now,
            pending: BTreeMap::new(),
            events: Vec::new(),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn directory(&self) -> &dyn Directory {
        self.directory
    }

    fn stage(&mut self, key: Key, value: Value) {
        self.pending.insert(key, Status::Update(value));
    }

    fn emit(&mut self, event: Event) {
        debug!(event = event.name(), bet_id = event.bet_id(), "staged event");
        self.events.push(event);
    }

    fn require_bet(&self, bet_id: &str) -> Result<Bet> {
        load_bet(self, bet_id)?.ok_or_else(|| Error::not_found("bet", bet_id))
    }

    fn require_host(&self, actor: &str, bet: &Bet, action: &str) -> Result<()> {
        if bet.is_host(actor) {
            return Ok(());
        }
        Err(Error::Authorization(format!(
            "only the host of bet {} may {action} it",
            bet.id
        )))
    }

    /// Visible through the directory rules, or already a participant.
    fn is_visible(&self, actor: &str, bet: &Bet) -> Result<bool> {
        if can_view(self.directory, actor, bet) {
            return Ok(true);
        }
        Ok(load_participant(self, &bet.id, actor)?.is_some())
    }

    fn require_visible(&self, actor: &str, bet: &Bet) -> Result<()> {
        if self.is_visible(actor, bet)? {
            return Ok(());
        }
        Err(Error::Authorization(format!(
            "bet {} is not visible to {actor}",
            bet.id
        )))
    }

    fn participants(&self, bet_id: &str) -> Result<Vec<BetParticipant>> {
        Ok(load_participants(self, bet_id)?)
    }

    /// Staged changes and the events they produced.
    pub fn commit(self) -> (Vec<(Key, Status)>, Vec<Event>) {
        (self.pending.into_iter().collect(), self.events)
    }
}

impl<'a, S: State> State for Layer<'a, S> {
    fn get(&self, key: &Key) -> StateResult<Option<Value>> {
        Ok(match self.pending.get(key) {
            Some(Status::Update(value)) => Some(value.clone()),
            Some(Status::Delete) => None,
            None => self.state.get(key)?,
        })
    }

    fn insert(&mut self, key: Key, value: Value) -> StateResult<()> {
        self.pending.insert(key, Status::Update(value));
        Ok(())
    }

    fn delete(&mut self, key: &Key) -> StateResult<()> {
        self.pending.insert(key.clone(), Status::Delete);
        Ok(())
    }

    fn scan(&self, prefix: &Prefix) -> StateResult<Vec<(Key, Value)>> {
        let mut merged: BTreeMap<Key, Value> = self.state.scan(prefix)?.into_iter().collect();
        for (key, status) in self.pending.iter().filter(|(key, _)| prefix.matches(key)) {
            match status {
                Status::Update(value) => {
                    merged.insert(key.clone(), value.clone());
                }
                Status::Delete => {
                    merged.remove(key);
                }
            }
        }
        Ok(merged.into_iter().collect())
    }
}

pub(crate) fn new_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{sample_bet, test_directory};
    use crate::state::{load_bets, Memory};

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_900_000_000, 0).unwrap()
    }

    #[test]
    fn test_overlay_reads_its_own_writes() {
        let mut memory = Memory::default();
        let stored = sample_bet("bet-a", "host");
        memory
            .insert(Key::Bet(stored.id.clone()), Value::Bet(stored.clone()))
            .unwrap();
        let directory = test_directory();

        let mut layer = Layer::new(&memory, &directory, now());
        let staged = sample_bet("bet-b", "host");
        layer
            .insert(Key::Bet(staged.id.clone()), Value::Bet(staged.clone()))
            .unwrap();
        layer.delete(&Key::Bet(stored.id.clone())).unwrap();

        assert_eq!(load_bet(&layer, "bet-b").unwrap(), Some(staged));
        assert_eq!(load_bet(&layer, "bet-a").unwrap(), None);
        let ids: Vec<String> = load_bets(&layer).unwrap().into_iter().map(|b| b.id).collect();
        assert_eq!(ids, vec!["bet-b"]);

        // Underlying store untouched until the change set is applied
        assert_eq!(load_bet(&memory, "bet-a").unwrap(), Some(stored));
        let (changes, events) = layer.commit();
        assert_eq!(changes.len(), 2);
        assert!(events.is_empty());
    }

    #[test]
    fn test_dropped_layer_leaves_store_untouched() {
        let memory = Memory::default();
        let directory = test_directory();
        let before = memory.clone();
        {
            let mut layer = Layer::new(&memory, &directory, now());
            let bet = sample_bet("bet-a", "host");
            layer.insert(Key::Bet(bet.id.clone()), Value::Bet(bet)).unwrap();
        }
        assert_eq!(memory, before);
    }
}
