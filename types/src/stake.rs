use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

use crate::{BetId, ParticipantId, ProofRequirement, StakeId, UserId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StakeStatus {
    Pending,
    Completed,
}

/// Media kind of a submitted proof.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProofType {
    Photo,
    Video,
}

#[derive(Debug, ThisError, PartialEq, Eq)]
#[error("invalid proof type: {0} (expected PHOTO or VIDEO)")]
pub struct ParseProofTypeError(pub String);

impl ProofType {
    pub fn as_str(self) -> &'static str {
        match self {
            ProofType::Photo => "PHOTO",
            ProofType::Video => "VIDEO",
        }
    }

    /// Whether a file with the given MIME type can serve as this kind of proof.
    pub fn accepts_content_type(self, content_type: &str) -> bool {
        let content_type = content_type.trim().to_ascii_lowercase();
        match self {
            ProofType::Photo => content_type.starts_with("image/"),
            ProofType::Video => content_type.starts_with("video/"),
        }
    }
}

impl std::fmt::Display for ProofType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProofType {
    type Err = ParseProofTypeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "PHOTO" => Ok(Self::Photo),
            "VIDEO" => Ok(Self::Video),
            _ => Err(ParseProofTypeError(value.to_string())),
        }
    }
}

impl ProofRequirement {
    /// The proof type that satisfies this requirement, if any is needed.
    pub fn proof_type(self) -> Option<ProofType> {
        match self {
            ProofRequirement::None => None,
            ProofRequirement::Photo => Some(ProofType::Photo),
            ProofRequirement::Video => Some(ProofType::Video),
        }
    }
}

/// Stored evidence for a stake. Never modified once written.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofUpload {
    pub id: String,
    pub stake_instance_id: StakeId,
    pub proof_type: ProofType,
    pub proof_url: String,
    pub content_type: String,
    pub size: u64,
    pub uploaded_at: DateTime<Utc>,
}

/// Settlement obligation owed by a losing participant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StakeInstance {
    pub id: StakeId,
    pub bet_id: BetId,
    pub participant_id: ParticipantId,
    pub user_id: UserId,
    pub amount: f64,
    pub proof_requirement: ProofRequirement,
    pub status: StakeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof_upload: Option<ProofUpload>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl StakeInstance {
    pub fn is_pending(&self) -> bool {
        self.status == StakeStatus::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proof_type_parsing() {
        assert_eq!("PHOTO".parse::<ProofType>(), Ok(ProofType::Photo));
        assert_eq!(" video ".parse::<ProofType>(), Ok(ProofType::Video));
        let err = "audio".parse::<ProofType>().unwrap_err();
        assert!(err.to_string().contains("audio"));
    }

    #[test]
    fn test_proof_type_content_types() {
        assert!(ProofType::Photo.accepts_content_type("image/jpeg"));
        assert!(ProofType::Photo.accepts_content_type("IMAGE/PNG"));
        assert!(!ProofType::Photo.accepts_content_type("video/mp4"));
        assert!(ProofType::Video.accepts_content_type("video/quicktime"));
        assert!(!ProofType::Video.accepts_content_type("application/octet-stream"));
    }

    #[test]
    fn test_requirement_maps_to_proof_type() {
        assert_eq!(ProofRequirement::None.proof_type(), None);
        assert_eq!(ProofRequirement::Photo.proof_type(), Some(ProofType::Photo));
        assert_eq!(ProofRequirement::Video.proof_type(), Some(ProofType::Video));
    }

    #[test]
    fn test_stake_status_wire_format() {
        assert_eq!(serde_json::to_string(&StakeStatus::Pending).unwrap(), "\"pending\"");
        assert_eq!(
            serde_json::from_str::<StakeStatus>("\"completed\"").unwrap(),
            StakeStatus::Completed
        );
    }
}
