use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{BetId, CircleId, OptionId, ParticipantId, UserId};

/// Lifecycle status of a bet.
///
/// Statuses are ordered: a bet only ever moves to a status with a higher
/// [`BetStatus::rank`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BetStatus {
    Open,
    Locked,
    Resolved,
}

impl BetStatus {
    pub fn rank(self) -> u8 {
        match self {
            BetStatus::Open => 0,
            BetStatus::Locked => 1,
            BetStatus::Resolved => 2,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, BetStatus::Resolved)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BetStatus::Open => "OPEN",
            BetStatus::Locked => "LOCKED",
            BetStatus::Resolved => "RESOLVED",
        }
    }
}

impl std::fmt::Display for BetStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BetStatus {
    type Err = &'static str;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_uppercase().as_str() {
            "OPEN" => Ok(Self::Open),
            "LOCKED" => Ok(Self::Locked),
            "RESOLVED" => Ok(Self::Resolved),
            _ => Err("valid values: OPEN, LOCKED, RESOLVED"),
        }
    }
}

/// Who may see a bet.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Privacy {
    /// Visible to the host's friends and followers (and circle members).
    #[default]
    FriendsPublic,
    /// Visible to members of the bet's circle only.
    CirclePrivate,
}

/// Evidence a losing participant must provide to complete a stake.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProofRequirement {
    #[default]
    None,
    Photo,
    Video,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BetOption {
    pub id: OptionId,
    pub label: String,
}

/// Outcome recorded on a bet when it is resolved.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionDetails {
    pub winning_option_id: OptionId,
    pub winner_ids: Vec<UserId>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bet {
    pub id: BetId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// The host. Sole authority over lifecycle transitions.
    pub created_by: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub circle_id: Option<CircleId>,
    pub options: Vec<BetOption>,
    pub deadline: DateTime<Utc>,
    pub status: BetStatus,
    #[serde(default)]
    pub privacy: Privacy,
    #[serde(default)]
    pub proof_requirement: ProofRequirement,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stake_amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution_details: Option<ResolutionDetails>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Bet {
    pub fn option(&self, option_id: &str) -> Option<&BetOption> {
        self.options.iter().find(|option| option.id == option_id)
    }

    pub fn is_host(&self, user: &str) -> bool {
        self.created_by == user
    }

    pub fn winning_option_id(&self) -> Option<&str> {
        self.resolution_details
            .as_ref()
            .map(|details| details.winning_option_id.as_str())
    }
}

/// A user's pick on a bet. At most one per (bet, user).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BetParticipant {
    pub id: ParticipantId,
    pub bet_id: BetId,
    pub user_id: UserId,
    pub selected_option_id: OptionId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_rank_is_forward_ordered() {
        assert!(BetStatus::Open.rank() < BetStatus::Locked.rank());
        assert!(BetStatus::Locked.rank() < BetStatus::Resolved.rank());
        assert!(BetStatus::Resolved.is_terminal());
        assert!(!BetStatus::Locked.is_terminal());
    }

    #[test]
    fn test_status_wire_format() {
        assert_eq!(serde_json::to_string(&BetStatus::Open).unwrap(), "\"OPEN\"");
        assert_eq!(
            serde_json::to_string(&Privacy::FriendsPublic).unwrap(),
            "\"FRIENDS_PUBLIC\""
        );
        assert_eq!(
            serde_json::from_str::<ProofRequirement>("\"PHOTO\"").unwrap(),
            ProofRequirement::Photo
        );
        assert_eq!("locked".parse::<BetStatus>(), Ok(BetStatus::Locked));
        assert!("closed".parse::<BetStatus>().is_err());
    }

    #[test]
    fn test_bet_json_uses_camel_case_and_omits_empty_fields() {
        let now = Utc::now();
        let bet = Bet {
            id: "bet-1".to_string(),
            title: "Coin flip".to_string(),
            description: None,
            created_by: "user-1".to_string(),
            circle_id: None,
            options: vec![
                BetOption { id: "opt-1".to_string(), label: "Heads".to_string() },
                BetOption { id: "opt-2".to_string(), label: "Tails".to_string() },
            ],
            deadline: now,
            status: BetStatus::Open,
            privacy: Privacy::FriendsPublic,
            proof_requirement: ProofRequirement::None,
            stake_amount: Some(10.0),
            resolution_details: None,
            resolved_at: None,
            created_at: now,
            updated_at: now,
        };
        let json = serde_json::to_value(&bet).unwrap();
        assert_eq!(json["createdBy"], "user-1");
        assert_eq!(json["proofRequirement"], "NONE");
        assert_eq!(json["stakeAmount"], 10.0);
        assert!(json.get("resolutionDetails").is_none());
        assert!(json.get("circleId").is_none());

        let decoded: Bet = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, bet);
        assert_eq!(decoded.option("opt-2").map(|o| o.label.as_str()), Some("Tails"));
        assert!(decoded.is_host("user-1"));
    }
}
