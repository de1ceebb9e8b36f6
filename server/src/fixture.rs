//! JSON snapshots of the directory and, for the fixture data source, the
//! entity store.

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use stake_execution::validation::validate_options;
use stake_execution::{Key, Memory, State, StaticDirectory, Value};
use stake_types::{
    api::OptionInput, Bet, BetParticipant, BetStatus, Circle, Follow, Friendship, StakeInstance,
    User,
};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fixture {
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub circles: Vec<Circle>,
    #[serde(default)]
    pub friendships: Vec<Friendship>,
    #[serde(default)]
    pub follows: Vec<Follow>,
    #[serde(default)]
    pub bets: Vec<Bet>,
    #[serde(default)]
    pub participants: Vec<BetParticipant>,
    #[serde(default)]
    pub stakes: Vec<StakeInstance>,
}

impl Fixture {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read fixture {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("load fixture {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let fixture: Self = serde_json::from_str(raw).context("decode fixture JSON")?;
        fixture.check()?;
        Ok(fixture)
    }

    pub fn has_entities(&self) -> bool {
        !(self.bets.is_empty() && self.participants.is_empty() && self.stakes.is_empty())
    }

    /// Reject references to users, circles, bets, options and participants
    /// that the fixture does not define, and records no operation could have
    /// produced.
    pub fn check(&self) -> Result<()> {
        let users: BTreeSet<&str> = self.users.iter().map(|user| user.id.as_str()).collect();
        let require_user = |id: &str, context: &str| -> Result<()> {
            if !users.contains(id) {
                bail!("{context} references unknown user {id}");
            }
            Ok(())
        };

        let mut circles = BTreeSet::new();
        for circle in &self.circles {
            if !circles.insert(circle.id.as_str()) {
                bail!("duplicate circle {}", circle.id);
            }
            require_user(&circle.created_by, &format!("circle {}", circle.id))?;
            for member in &circle.members {
                require_user(member, &format!("circle {}", circle.id))?;
            }
        }
        for friendship in &self.friendships {
            require_user(&friendship.user_id, "friendship")?;
            require_user(&friendship.friend_id, "friendship")?;
        }
        for follow in &self.follows {
            require_user(&follow.follower_id, "follow")?;
            require_user(&follow.following_id, "follow")?;
        }

        let mut bets: HashMap<&str, &Bet> = HashMap::new();
        for bet in &self.bets {
            if bets.insert(bet.id.as_str(), bet).is_some() {
                bail!("duplicate bet {}", bet.id);
            }
            require_user(&bet.created_by, &format!("bet {}", bet.id))?;
            if let Some(circle) = &bet.circle_id {
                if !circles.contains(circle.as_str()) {
                    bail!("bet {} references unknown circle {circle}", bet.id);
                }
            }
            check_bet(bet)?;
        }

        let mut participants = HashMap::new();
        for participant in &self.participants {
            let context = format!("participant {}", participant.id);
            require_user(&participant.user_id, &context)?;
            let Some(bet) = bets.get(participant.bet_id.as_str()) else {
                bail!("{context} references unknown bet {}", participant.bet_id);
            };
            if bet.option(&participant.selected_option_id).is_none() {
                bail!(
                    "{context} picked unknown option {}",
                    participant.selected_option_id
                );
            }
            let key = (participant.bet_id.as_str(), participant.user_id.as_str());
            if participants.insert(key, participant.id.as_str()).is_some() {
                bail!(
                    "user {} has more than one pick on bet {}",
                    participant.user_id,
                    participant.bet_id
                );
            }
        }

        let mut stake_ids = BTreeSet::new();
        let mut owed = BTreeSet::new();
        for stake in &self.stakes {
            let context = format!("stake {}", stake.id);
            if !stake_ids.insert((stake.bet_id.as_str(), stake.id.as_str())) {
                bail!("duplicate {context} on bet {}", stake.bet_id);
            }
            let Some(bet) = bets.get(stake.bet_id.as_str()) else {
                bail!("{context} references unknown bet {}", stake.bet_id);
            };
            match participants.get(&(stake.bet_id.as_str(), stake.user_id.as_str())) {
                Some(id) if *id == stake.participant_id => {}
                _ => bail!(
                    "{context} references unknown participant {}",
                    stake.participant_id
                ),
            }
            let Some(details) = &bet.resolution_details else {
                bail!("{context} is on bet {} which is not resolved", bet.id);
            };
            if details.winner_ids.iter().any(|winner| *winner == stake.user_id) {
                bail!("{context} is owed by winner {}", stake.user_id);
            }
            if !owed.insert((stake.bet_id.as_str(), stake.participant_id.as_str())) {
                bail!(
                    "participant {} owes more than one stake on bet {}",
                    stake.participant_id,
                    stake.bet_id
                );
            }
        }
        Ok(())
    }

    pub fn directory(&self) -> StaticDirectory {
        StaticDirectory::new(
            self.users.clone(),
            self.circles.clone(),
            self.friendships.clone(),
            self.follows.clone(),
        )
    }

    /// Write the fixture's bets, participants and stakes into `state`.
    pub fn seed<S: State>(&self, state: &mut S) -> Result<()> {
        for bet in &self.bets {
            state.insert(Key::Bet(bet.id.clone()), Value::Bet(bet.clone()))?;
        }
        for participant in &self.participants {
            state.insert(
                Key::Participant {
                    bet: participant.bet_id.clone(),
                    user: participant.user_id.clone(),
                },
                Value::Participant(participant.clone()),
            )?;
        }
        for stake in &self.stakes {
            state.insert(
                Key::Stake {
                    bet: stake.bet_id.clone(),
                    stake: stake.id.clone(),
                },
                Value::Stake(stake.clone()),
            )?;
        }
        Ok(())
    }

    pub fn memory(&self) -> Result<Memory> {
        let mut memory = Memory::default();
        self.seed(&mut memory)?;
        Ok(memory)
    }
}

/// Options, ids and resolution fields of a stored bet.
fn check_bet(bet: &Bet) -> Result<()> {
    let inputs: Vec<OptionInput> = bet
        .options
        .iter()
        .map(|option| OptionInput::from(option.label.as_str()))
        .collect();
    validate_options(&inputs).map_err(|err| anyhow!("bet {}: {err}", bet.id))?;
    let mut ids = BTreeSet::new();
    for option in &bet.options {
        if !ids.insert(option.id.as_str()) {
            bail!("bet {} has duplicate option id {}", bet.id, option.id);
        }
    }

    let resolved = bet.status == BetStatus::Resolved;
    match (&bet.resolution_details, bet.resolved_at) {
        (Some(details), Some(_)) if resolved => {
            if bet.option(&details.winning_option_id).is_none() {
                bail!(
                    "bet {} resolved to unknown option {}",
                    bet.id,
                    details.winning_option_id
                );
            }
        }
        (None, None) if !resolved => {}
        _ if resolved => bail!("bet {} is RESOLVED without resolution details", bet.id),
        _ => bail!("bet {} has resolution details but is {}", bet.id, bet.status),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stake_execution::Directory;

    fn base() -> serde_json::Value {
        json!({
            "users": [
                {"id": "host", "username": "host", "displayName": "Host"},
                {"id": "alice", "username": "alice", "displayName": "Alice"}
            ],
            "circles": [
                {"id": "c1", "name": "Flat", "createdBy": "host", "members": ["host", "alice"]}
            ],
            "friendships": [{"userId": "host", "friendId": "alice"}],
            "bets": [{
                "id": "bet-1",
                "title": "Heads or tails?",
                "createdBy": "host",
                "circleId": "c1",
                "options": [{"id": "o1", "label": "Heads"}, {"id": "o2", "label": "Tails"}],
                "deadline": "2030-01-01T00:00:00Z",
                "status": "OPEN",
                "privacy": "CIRCLE_PRIVATE",
                "proofRequirement": "NONE",
                "createdAt": "2029-12-01T00:00:00Z",
                "updatedAt": "2029-12-01T00:00:00Z"
            }],
            "participants": [{
                "id": "p1",
                "betId": "bet-1",
                "userId": "alice",
                "selectedOptionId": "o1",
                "createdAt": "2029-12-02T00:00:00Z",
                "updatedAt": "2029-12-02T00:00:00Z"
            }]
        })
    }

    #[test]
    fn test_loads_directory_and_entities() {
        let fixture = Fixture::parse(&base().to_string()).unwrap();
        assert!(fixture.has_entities());
        let directory = fixture.directory();
        assert!(directory.are_friends("alice", "host"));
        assert!(directory.is_member("c1", "alice"));

        let memory = fixture.memory().unwrap();
        assert_eq!(memory.len(), 2);
    }

    #[test]
    fn test_directory_only_fixture() {
        let fixture = Fixture::parse(r#"{"users": []}"#).unwrap();
        assert!(!fixture.has_entities());
        assert!(fixture.memory().unwrap().is_empty());
    }

    #[test]
    fn test_rejects_dangling_references() {
        let mut unknown_host = base();
        unknown_host["bets"][0]["createdBy"] = json!("ghost");
        let err = Fixture::parse(&unknown_host.to_string()).unwrap_err();
        assert!(err.to_string().contains("unknown user ghost"), "{err:#}");

        let mut unknown_option = base();
        unknown_option["participants"][0]["selectedOptionId"] = json!("o9");
        let err = Fixture::parse(&unknown_option.to_string()).unwrap_err();
        assert!(err.to_string().contains("unknown option o9"), "{err:#}");

        let mut unknown_circle = base();
        unknown_circle["bets"][0]["circleId"] = json!("c9");
        assert!(Fixture::parse(&unknown_circle.to_string()).is_err());

        let mut orphan_stake = base();
        orphan_stake["stakes"] = json!([{
            "id": "s1",
            "betId": "bet-1",
            "participantId": "p9",
            "userId": "alice",
            "amount": 10.0,
            "proofRequirement": "NONE",
            "status": "completed",
            "createdAt": "2030-01-02T00:00:00Z"
        }]);
        let err = Fixture::parse(&orphan_stake.to_string()).unwrap_err();
        assert!(err.to_string().contains("unknown participant p9"), "{err:#}");
    }

    #[test]
    fn test_rejects_duplicate_picks() {
        let mut duplicate = base();
        let mut second = duplicate["participants"][0].clone();
        second["id"] = json!("p2");
        second["selectedOptionId"] = json!("o2");
        duplicate["participants"]
            .as_array_mut()
            .unwrap()
            .push(second);
        let err = Fixture::parse(&duplicate.to_string()).unwrap_err();
        assert!(err.to_string().contains("more than one pick"), "{err:#}");
    }

    fn resolved() -> serde_json::Value {
        let mut fixture = base();
        fixture["bets"][0]["status"] = json!("RESOLVED");
        fixture["bets"][0]["stakeAmount"] = json!(10.0);
        fixture["bets"][0]["resolutionDetails"] =
            json!({"winningOptionId": "o2", "winnerIds": []});
        fixture["bets"][0]["resolvedAt"] = json!("2030-01-02T00:00:00Z");
        fixture["stakes"] = json!([stake("s1")]);
        fixture
    }

    fn stake(id: &str) -> serde_json::Value {
        json!({
            "id": id,
            "betId": "bet-1",
            "participantId": "p1",
            "userId": "alice",
            "amount": 10.0,
            "proofRequirement": "NONE",
            "status": "pending",
            "createdAt": "2030-01-02T00:00:00Z"
        })
    }

    fn rejection(fixture: serde_json::Value) -> String {
        format!("{:#}", Fixture::parse(&fixture.to_string()).unwrap_err())
    }

    #[test]
    fn test_accepts_resolved_bet_with_loser_stake() {
        let fixture = Fixture::parse(&resolved().to_string()).unwrap();
        assert_eq!(fixture.memory().unwrap().len(), 3);
    }

    #[test]
    fn test_rejects_invalid_options() {
        let mut same_label = base();
        same_label["bets"][0]["options"][1]["label"] = json!("heads");
        assert!(rejection(same_label).contains("duplicate option label"));

        let mut same_id = base();
        same_id["bets"][0]["options"][1]["id"] = json!("o1");
        assert!(rejection(same_id).contains("duplicate option id o1"));

        let mut single = base();
        single["bets"][0]["options"] = json!([{"id": "o1", "label": "Heads"}]);
        assert!(rejection(single).contains("at least"));
    }

    #[test]
    fn test_rejects_resolution_fields_out_of_step_with_status() {
        let mut missing = resolved();
        missing["bets"][0]
            .as_object_mut()
            .unwrap()
            .remove("resolutionDetails");
        assert!(rejection(missing).contains("without resolution details"));

        let mut premature = base();
        premature["bets"][0]["resolutionDetails"] =
            json!({"winningOptionId": "o1", "winnerIds": ["alice"]});
        premature["bets"][0]["resolvedAt"] = json!("2030-01-02T00:00:00Z");
        assert!(rejection(premature).contains("but is OPEN"));

        let mut unknown_winner = resolved();
        unknown_winner["bets"][0]["resolutionDetails"]["winningOptionId"] = json!("o9");
        assert!(rejection(unknown_winner).contains("unknown option o9"));
    }

    #[test]
    fn test_rejects_stakes_no_resolution_could_create() {
        let mut open_bet = base();
        open_bet["stakes"] = json!([stake("s1")]);
        assert!(rejection(open_bet).contains("not resolved"));

        let mut winner = resolved();
        winner["bets"][0]["resolutionDetails"] =
            json!({"winningOptionId": "o1", "winnerIds": ["alice"]});
        assert!(rejection(winner).contains("owed by winner alice"));

        let mut twice = resolved();
        twice["stakes"] = json!([stake("s1"), stake("s2")]);
        assert!(rejection(twice).contains("more than one stake"));

        let mut same_id = resolved();
        same_id["stakes"] = json!([stake("s1"), stake("s1")]);
        assert!(rejection(same_id).contains("duplicate stake s1"));
    }
}
