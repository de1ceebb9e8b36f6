//! Request and response bodies of the HTTP contract.

use serde::{Deserialize, Serialize};

use crate::{
    Bet, BetParticipant, BetStatus, CircleId, OptionId, Privacy, ProofRequirement, StakeInstance,
};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionInput {
    pub label: String,
}

impl From<&str> for OptionInput {
    fn from(label: &str) -> Self {
        Self {
            label: label.to_string(),
        }
    }
}

/// Body of `POST /bets`.
///
/// The deadline is kept as the raw string so an unparseable value is reported
/// as a validation failure on `deadline` rather than a decode error.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBetRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub circle_id: Option<CircleId>,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub options: Vec<OptionInput>,
    pub deadline: String,
    #[serde(default)]
    pub proof_requirement: ProofRequirement,
    #[serde(default)]
    pub privacy: Privacy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stake_amount: Option<f64>,
}

/// Body of `PATCH /bets/{id}`. Absent fields are left untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBetRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<String>,
}

impl UpdateBetRequest {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.deadline.is_none()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PickRequest {
    pub option_id: OptionId,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveRequest {
    pub winning_option_id: OptionId,
}

/// A participant together with the stake it owes, if any.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantView {
    #[serde(flatten)]
    pub participant: BetParticipant,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stake_instance: Option<StakeInstance>,
}

/// Response of `GET /bets/{id}`: the bet with its participants populated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BetDetail {
    #[serde(flatten)]
    pub bet: Bet,
    pub participants: Vec<ParticipantView>,
}

impl BetDetail {
    pub fn participant(&self, user: &str) -> Option<&ParticipantView> {
        self.participants
            .iter()
            .find(|view| view.participant.user_id == user)
    }
}

/// Entry of `GET /stakes/pending`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingStake {
    pub stake: StakeInstance,
    pub participant: BetParticipant,
    pub bet: Bet,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipationOutcome {
    Pending,
    Won,
    Lost,
}

/// Entry of `GET /bets/mine`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participation {
    pub bet: Bet,
    pub participant: BetParticipant,
    pub outcome: ParticipationOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stake_instance: Option<StakeInstance>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub total_bets_created: u64,
    pub total_bets_participated: u64,
    pub wins: u64,
    pub losses: u64,
    pub win_rate: f64,
}

/// Ordering of `GET /bets/explore`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExploreSort {
    #[default]
    Newest,
    Deadline,
    Active,
}

impl std::str::FromStr for ExploreSort {
    type Err = &'static str;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "newest" => Ok(Self::Newest),
            "deadline" => Ok(Self::Deadline),
            "active" => Ok(Self::Active),
            _ => Err("valid values: newest, deadline, active"),
        }
    }
}

/// Query of `GET /bets`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BetFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<BetStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub circle_id: Option<CircleId>,
}

/// Error body returned with every non-2xx response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub status: u16,
    pub kind: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}
