pub mod api;
pub mod bet;
pub mod identity;
pub mod limits;
pub mod stake;

pub use bet::{Bet, BetOption, BetParticipant, BetStatus, Privacy, ProofRequirement, ResolutionDetails};
pub use identity::{Circle, Follow, Friendship, User};
pub use stake::{ParseProofTypeError, ProofType, ProofUpload, StakeInstance, StakeStatus};

/// Identifier of a user, supplied by the identity collaborator.
pub type UserId = String;
/// Identifier of a circle.
pub type CircleId = String;
/// Identifier of a bet.
pub type BetId = String;
/// Identifier of a bet option.
pub type OptionId = String;
/// Identifier of a bet participant record.
pub type ParticipantId = String;
/// Identifier of a stake instance.
pub type StakeId = String;
