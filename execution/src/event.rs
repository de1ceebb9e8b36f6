use stake_types::{BetId, OptionId, ProofType, StakeId, StakeStatus, UserId};

/// Fact recorded by a committed operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    BetCreated {
        bet_id: BetId,
        host: UserId,
    },
    BetUpdated {
        bet_id: BetId,
    },
    PickRecorded {
        bet_id: BetId,
        user: UserId,
        option_id: OptionId,
    },
    /// `automatic` is set when the deadline sweep persisted the lock.
    BetLocked {
        bet_id: BetId,
        automatic: bool,
    },
    BetResolved {
        bet_id: BetId,
        winning_option_id: OptionId,
        winners: Vec<UserId>,
        losers: Vec<UserId>,
    },
    StakeCreated {
        bet_id: BetId,
        stake_id: StakeId,
        user: UserId,
        status: StakeStatus,
    },
    ProofSubmitted {
        bet_id: BetId,
        stake_id: StakeId,
        user: UserId,
        proof_type: ProofType,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::BetCreated { .. } => "bet_created",
            Event::BetUpdated { .. } => "bet_updated",
            Event::PickRecorded { .. } => "pick_recorded",
            Event::BetLocked { .. } => "bet_locked",
            Event::BetResolved { .. } => "bet_resolved",
            Event::StakeCreated { .. } => "stake_created",
            Event::ProofSubmitted { .. } => "proof_submitted",
        }
    }

    pub fn bet_id(&self) -> &str {
        match self {
            Event::BetCreated { bet_id, .. }
            | Event::BetUpdated { bet_id }
            | Event::PickRecorded { bet_id, .. }
            | Event::BetLocked { bet_id, .. }
            | Event::BetResolved { bet_id, .. }
            | Event::StakeCreated { bet_id, .. }
            | Event::ProofSubmitted { bet_id, .. } => bet_id,
        }
    }
}
