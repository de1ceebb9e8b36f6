//! Resolution partitioning and stake derivation.

use chrono::{DateTime, Utc};
use stake_types::{
    Bet, BetParticipant, ProofRequirement, ProofType, ProofUpload, StakeInstance, StakeStatus,
};

/// Participants split by whether they picked the winning option.
///
/// Users who never picked have no participant record and so appear in
/// neither set.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Partition {
    pub winners: Vec<BetParticipant>,
    pub losers: Vec<BetParticipant>,
}

impl Partition {
    pub fn winner_ids(&self) -> Vec<String> {
        self.winners.iter().map(|p| p.user_id.clone()).collect()
    }

    pub fn loser_ids(&self) -> Vec<String> {
        self.losers.iter().map(|p| p.user_id.clone()).collect()
    }
}

pub fn partition(participants: &[BetParticipant], winning_option_id: &str) -> Partition {
    let (winners, losers): (Vec<_>, Vec<_>) = participants
        .iter()
        .cloned()
        .partition(|participant| participant.selected_option_id == winning_option_id);
    Partition { winners, losers }
}

/// Stakes start completed when no proof is required.
pub fn initial_stake_status(requirement: ProofRequirement) -> StakeStatus {
    match requirement {
        ProofRequirement::None => StakeStatus::Completed,
        ProofRequirement::Photo | ProofRequirement::Video => StakeStatus::Pending,
    }
}

/// One stake per loser, or none at all when the bet carries no stake amount.
pub fn derive_stakes(
    bet: &Bet,
    losers: &[BetParticipant],
    now: DateTime<Utc>,
    mut next_id: impl FnMut() -> String,
) -> Vec<StakeInstance> {
    let Some(amount) = bet.stake_amount else {
        return Vec::new();
    };
    let status = initial_stake_status(bet.proof_requirement);
    losers
        .iter()
        .map(|loser| StakeInstance {
            id: next_id(),
            bet_id: bet.id.clone(),
            participant_id: loser.id.clone(),
            user_id: loser.user_id.clone(),
            amount,
            proof_requirement: bet.proof_requirement,
            status,
            proof_upload: None,
            created_at: now,
            completed_at: (status == StakeStatus::Completed).then_some(now),
        })
        .collect()
}

/// Metadata of a file offered as proof.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProofFile {
    pub file_name: Option<String>,
    pub content_type: String,
    pub size: u64,
}

/// Complete a pending stake with its proof. The caller has already checked
/// ownership, status and proof type.
pub fn complete_stake(
    stake: &StakeInstance,
    proof_id: String,
    proof_type: ProofType,
    proof_url: String,
    file: &ProofFile,
    now: DateTime<Utc>,
) -> StakeInstance {
    let mut completed = stake.clone();
    completed.status = StakeStatus::Completed;
    completed.completed_at = Some(now);
    completed.proof_upload = Some(ProofUpload {
        id: proof_id,
        stake_instance_id: stake.id.clone(),
        proof_type,
        proof_url,
        content_type: file.content_type.clone(),
        size: file.size,
        uploaded_at: now,
    });
    completed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{sample_bet, sample_participant};
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_900_000_000, 0).unwrap()
    }

    fn counter() -> impl FnMut() -> String {
        let mut next = 0;
        move || {
            next += 1;
            format!("stake-{next}")
        }
    }

    #[test]
    fn test_partition_heads_tails() {
        let participants = vec![
            sample_participant("bet-1", "alice", "heads"),
            sample_participant("bet-1", "bob", "tails"),
            sample_participant("bet-1", "carol", "heads"),
        ];
        let split = partition(&participants, "heads");
        assert_eq!(split.winner_ids(), vec!["alice", "carol"]);
        assert_eq!(split.loser_ids(), vec!["bob"]);
    }

    #[test]
    fn test_stake_status_follows_requirement() {
        assert_eq!(initial_stake_status(ProofRequirement::None), StakeStatus::Completed);
        assert_eq!(initial_stake_status(ProofRequirement::Photo), StakeStatus::Pending);
        assert_eq!(initial_stake_status(ProofRequirement::Video), StakeStatus::Pending);
    }

    #[test]
    fn test_derive_stakes() {
        let mut bet = sample_bet("bet-1", "host");
        bet.stake_amount = Some(10.0);
        bet.proof_requirement = ProofRequirement::Photo;
        let losers = vec![
            sample_participant("bet-1", "bob", "tails"),
            sample_participant("bet-1", "dave", "tails"),
        ];

        let stakes = derive_stakes(&bet, &losers, now(), counter());
        assert_eq!(stakes.len(), 2);
        assert_eq!(stakes[0].id, "stake-1");
        assert_eq!(stakes[1].user_id, "dave");
        assert!(stakes.iter().all(|s| s.status == StakeStatus::Pending));
        assert!(stakes.iter().all(|s| s.amount == 10.0 && s.completed_at.is_none()));

        bet.proof_requirement = ProofRequirement::None;
        let stakes = derive_stakes(&bet, &losers, now(), counter());
        assert!(stakes
            .iter()
            .all(|s| s.status == StakeStatus::Completed && s.completed_at == Some(now())));

        bet.stake_amount = None;
        assert!(derive_stakes(&bet, &losers, now(), counter()).is_empty());
    }

    #[test]
    fn test_complete_stake_attaches_proof() {
        let mut bet = sample_bet("bet-1", "host");
        bet.stake_amount = Some(5.0);
        bet.proof_requirement = ProofRequirement::Video;
        let loser = sample_participant("bet-1", "bob", "tails");
        let stake = derive_stakes(&bet, &[loser], now(), counter()).remove(0);

        let file = ProofFile {
            file_name: Some("proof.mp4".to_string()),
            content_type: "video/mp4".to_string(),
            size: 2048,
        };
        let completed = complete_stake(
            &stake,
            "proof-1".to_string(),
            ProofType::Video,
            "/proofs/proof-1.mp4".to_string(),
            &file,
            now(),
        );
        assert_eq!(completed.status, StakeStatus::Completed);
        let upload = completed.proof_upload.unwrap();
        assert_eq!(upload.stake_instance_id, stake.id);
        assert_eq!(upload.size, 2048);
        assert_eq!(upload.proof_type, ProofType::Video);
    }

    proptest! {
        #[test]
        fn prop_partition_covers_participants_exactly(
            picks in prop::collection::vec(0usize..4, 0..40),
            winning in 0usize..4,
        ) {
            let participants: Vec<BetParticipant> = picks
                .iter()
                .enumerate()
                .map(|(i, pick)| {
                    sample_participant("bet-1", &format!("user-{i}"), &format!("opt-{pick}"))
                })
                .collect();
            let winning_option = format!("opt-{winning}");
            let split = partition(&participants, &winning_option);

            let all: BTreeSet<String> = participants.iter().map(|p| p.user_id.clone()).collect();
            let winners: BTreeSet<String> = split.winner_ids().into_iter().collect();
            let losers: BTreeSet<String> = split.loser_ids().into_iter().collect();

            prop_assert!(winners.is_subset(&all));
            prop_assert!(winners.is_disjoint(&losers));
            prop_assert_eq!(winners.union(&losers).cloned().collect::<BTreeSet<_>>(), all);
            prop_assert!(split.winners.iter().all(|p| p.selected_option_id == winning_option));
        }

        #[test]
        fn prop_one_stake_per_loser_none_for_winners(
            picks in prop::collection::vec(0usize..3, 0..30),
            winning in 0usize..3,
            amount in 0.01f64..1_000_000.0,
        ) {
            let mut bet = sample_bet("bet-1", "host");
            bet.stake_amount = Some(amount);
            bet.proof_requirement = ProofRequirement::Photo;
            let participants: Vec<BetParticipant> = picks
                .iter()
                .enumerate()
                .map(|(i, pick)| {
                    sample_participant("bet-1", &format!("user-{i}"), &format!("opt-{pick}"))
                })
                .collect();
            let split = partition(&participants, &format!("opt-{winning}"));
            let stakes = derive_stakes(&bet, &split.losers, now(), counter());

            prop_assert_eq!(stakes.len(), split.losers.len());
            let owners: BTreeSet<String> = stakes.iter().map(|s| s.user_id.clone()).collect();
            prop_assert_eq!(owners.len(), stakes.len());
            for winner in split.winner_ids() {
                prop_assert!(!owners.contains(&winner));
            }
        }
    }
}
