//! Fixtures and collaborator doubles for tests.

use anyhow::{anyhow, Result};
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use stake_types::{
    api::{CreateBetRequest, OptionInput},
    Bet, BetOption, BetParticipant, BetStatus, Circle, Follow, Friendship, Privacy,
    ProofRequirement, User,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::blob::BlobStore;
use crate::clock::ManualClock;
use crate::directory::StaticDirectory;
use crate::engine::Engine;
use crate::state::Memory;

/// Instant all fixtures are anchored to.
pub fn fixed_now() -> DateTime<Utc> {
    DateTime::from_timestamp(1_900_000_000, 0).unwrap_or_default()
}

pub fn user(id: &str) -> User {
    User {
        id: id.to_string(),
        username: id.to_string(),
        display_name: id.to_string(),
        bio: None,
        avatar: None,
        created_at: None,
        updated_at: None,
    }
}

/// Directory used across tests.
///
/// `host` is friends with `alice`, `bob` and `carol`; `follower` follows
/// `host`; `circle-1` holds `host`, `alice` and `bob`; `stranger` knows nobody.
pub fn test_directory() -> StaticDirectory {
    StaticDirectory::new(
        ["host", "alice", "bob", "carol", "follower", "stranger"].map(user),
        [Circle {
            id: "circle-1".to_string(),
            name: "Roommates".to_string(),
            description: None,
            created_by: "host".to_string(),
            members: vec!["host".to_string(), "alice".to_string(), "bob".to_string()],
        }],
        ["alice", "bob", "carol"].map(|friend| Friendship {
            user_id: "host".to_string(),
            friend_id: friend.to_string(),
        }),
        [Follow {
            follower_id: "follower".to_string(),
            following_id: "host".to_string(),
        }],
    )
}

/// Open Heads/Tails bet (`opt-1`/`opt-2`) with a deadline one hour after [`fixed_now`].
pub fn sample_bet(id: &str, host: &str) -> Bet {
    let now = fixed_now();
    Bet {
        id: id.to_string(),
        title: "Heads or tails?".to_string(),
        description: None,
        created_by: host.to_string(),
        circle_id: None,
        options: vec![
            BetOption {
                id: "opt-1".to_string(),
                label: "Heads".to_string(),
            },
            BetOption {
                id: "opt-2".to_string(),
                label: "Tails".to_string(),
            },
        ],
        deadline: now + Duration::hours(1),
        status: BetStatus::Open,
        privacy: Privacy::FriendsPublic,
        proof_requirement: ProofRequirement::None,
        stake_amount: None,
        resolution_details: None,
        resolved_at: None,
        created_at: now,
        updated_at: now,
    }
}

pub fn sample_participant(bet: &str, user: &str, option: &str) -> BetParticipant {
    BetParticipant {
        id: format!("participant-{bet}-{user}"),
        bet_id: bet.to_string(),
        user_id: user.to_string(),
        selected_option_id: option.to_string(),
        created_at: fixed_now(),
        updated_at: fixed_now(),
    }
}

/// Creation request for a bet with the given labels, due one hour after `now`.
pub fn create_request(labels: &[&str], now: DateTime<Utc>) -> CreateBetRequest {
    CreateBetRequest {
        circle_id: None,
        title: "Heads or tails?".to_string(),
        description: Some("Best of one".to_string()),
        options: labels.iter().map(|label| OptionInput::from(*label)).collect(),
        deadline: (now + Duration::hours(1)).to_rfc3339(),
        proof_requirement: ProofRequirement::None,
        privacy: Privacy::FriendsPublic,
        stake_amount: None,
    }
}

/// Engine over an empty in-memory store, [`test_directory`] and a manual clock
/// set to [`fixed_now`].
pub fn create_engine() -> (Engine<Memory>, ManualClock) {
    let clock = ManualClock::new(fixed_now());
    let engine = Engine::new(
        Memory::default(),
        Arc::new(test_directory()),
        Arc::new(clock.clone()),
    );
    (engine, clock)
}

/// Blob store keeping objects in memory.
#[derive(Clone, Default)]
pub struct MemoryBlobStore {
    objects: Arc<Mutex<HashMap<String, (String, Bytes)>>>,
}

impl MemoryBlobStore {
    pub fn get(&self, key: &str) -> Option<(String, Bytes)> {
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, content_type: &str, body: Bytes) -> Result<String> {
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), (content_type.to_string(), body));
        Ok(format!("memory://{key}"))
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}

/// Blob store whose writes always fail.
#[derive(Clone, Copy, Default)]
pub struct FailingBlobStore;

impl BlobStore for FailingBlobStore {
    async fn put(&self, key: &str, _content_type: &str, _body: Bytes) -> Result<String> {
        Err(anyhow!("object store unavailable while writing {key}"))
    }

    async fn remove(&self, _key: &str) -> Result<()> {
        Ok(())
    }
}
