use super::*;
use crate::lifecycle::{Lifecycle, TransitionResult};
use crate::settlement::partition;
use crate::validation::{validate_create, validate_update};
use stake_types::{
    api::{CreateBetRequest, UpdateBetRequest},
    BetOption, BetStatus, ResolutionDetails,
};

impl<'a, S: State> Layer<'a, S> {
    pub fn create_bet(&mut self, host: &str, request: &CreateBetRequest) -> Result<Bet> {
        let valid = validate_create(request, self.now)?;
        if let Some(circle_id) = &request.circle_id {
            let circle = self
                .directory
                .circle(circle_id)
                .ok_or_else(|| Error::not_found("circle", circle_id))?;
            if !circle.has_member(host) {
                return Err(Error::Authorization(format!(
                    "{host} is not a member of circle {circle_id}"
                )));
            }
        }

        let bet = Bet {
            id: new_id(),
            title: valid.title,
            description: valid.description,
            created_by: host.to_string(),
            circle_id: request.circle_id.clone(),
            options: valid
                .option_labels
                .into_iter()
                .map(|label| BetOption { id: new_id(), label })
                .collect(),
            deadline: valid.deadline,
            status: BetStatus::Open,
            privacy: request.privacy,
            proof_requirement: request.proof_requirement,
            stake_amount: valid.stake_amount,
            resolution_details: None,
            resolved_at: None,
            created_at: self.now,
            updated_at: self.now,
        };
        self.stage(Key::Bet(bet.id.clone()), Value::Bet(bet.clone()));
        self.emit(Event::BetCreated {
            bet_id: bet.id.clone(),
            host: host.to_string(),
        });
        Ok(bet)
    }

    pub fn update_bet(&mut self, actor: &str, bet_id: &str, patch: &UpdateBetRequest) -> Result<Bet> {
        let mut bet = self.require_bet(bet_id)?;
        self.require_host(actor, &bet, "edit")?;
        if !Lifecycle::can_edit(bet.status, bet.deadline, self.now) {
            return Err(Error::InvalidState(format!(
                "bet {bet_id} is {} and can no longer be edited",
                Lifecycle::effective_status_of(&bet, self.now)
            )));
        }
        let valid = validate_update(patch, self.now)?;

        if let Some(title) = valid.title {
            bet.title = title;
        }
        if let Some(description) = valid.description {
            bet.description = description;
        }
        if let Some(deadline) = valid.deadline {
            bet.deadline = deadline;
        }
        bet.updated_at = self.now;
        self.stage(Key::Bet(bet.id.clone()), Value::Bet(bet.clone()));
        self.emit(Event::BetUpdated {
            bet_id: bet.id.clone(),
        });
        Ok(bet)
    }

    /// Insert or replace the actor's pick. The open/deadline check runs against
    /// the state this layer reads, inside the same critical section as the write.
    pub fn record_pick(
        &mut self,
        actor: &str,
        bet_id: &str,
        option_id: &str,
    ) -> Result<BetParticipant> {
        let bet = self.require_bet(bet_id)?;
        self.require_visible(actor, &bet)?;
        if !Lifecycle::is_pick_open(bet.status, bet.deadline, self.now) {
            return Err(Error::InvalidState(format!(
                "bet {bet_id} is {} and no longer accepts picks",
                Lifecycle::effective_status_of(&bet, self.now)
            )));
        }
        if bet.option(option_id).is_none() {
            return Err(Error::not_found("option", option_id));
        }

        let participant = match load_participant(self, bet_id, actor)? {
            Some(mut existing) => {
                existing.selected_option_id = option_id.to_string();
                existing.updated_at = self.now;
                existing
            }
            None => BetParticipant {
                id: new_id(),
                bet_id: bet_id.to_string(),
                user_id: actor.to_string(),
                selected_option_id: option_id.to_string(),
                created_at: self.now,
                updated_at: self.now,
            },
        };
        self.stage(
            Key::Participant {
                bet: bet_id.to_string(),
                user: actor.to_string(),
            },
            Value::Participant(participant.clone()),
        );
        self.emit(Event::PickRecorded {
            bet_id: bet_id.to_string(),
            user: actor.to_string(),
            option_id: option_id.to_string(),
        });
        Ok(participant)
    }

    pub fn lock_bet(&mut self, actor: &str, bet_id: &str) -> Result<Bet> {
        let mut bet = self.require_bet(bet_id)?;
        self.require_host(actor, &bet, "lock")?;
        if !Lifecycle::can_lock(bet.status, bet.deadline, self.now) {
            return Err(Error::InvalidState(format!(
                "bet {bet_id} is already {}",
                Lifecycle::effective_status_of(&bet, self.now)
            )));
        }
        bet.status = BetStatus::Locked;
        bet.updated_at = self.now;
        self.stage(Key::Bet(bet.id.clone()), Value::Bet(bet.clone()));
        self.emit(Event::BetLocked {
            bet_id: bet.id.clone(),
            automatic: false,
        });
        Ok(bet)
    }

    /// Persist the deadline lock if the stored status lags behind it.
    pub fn sweep_bet(&mut self, bet_id: &str) -> Result<Option<Bet>> {
        let mut bet = self.require_bet(bet_id)?;
        let TransitionResult::TransitionTo(next) =
            Lifecycle::check_transition(bet.status, bet.deadline, self.now)
        else {
            return Ok(None);
        };
        bet.status = next;
        bet.updated_at = self.now;
        self.stage(Key::Bet(bet.id.clone()), Value::Bet(bet.clone()));
        self.emit(Event::BetLocked {
            bet_id: bet.id.clone(),
            automatic: true,
        });
        Ok(Some(bet))
    }

    /// Resolve the bet and settle its stakes in the same change set.
    ///
    /// Checks run in the order existence, authorization, state, option, and
    /// all of them precede the first staged write.
    pub fn resolve(&mut self, actor: &str, bet_id: &str, winning_option_id: &str) -> Result<Bet> {
        let mut bet = self.require_bet(bet_id)?;
        self.require_host(actor, &bet, "resolve")?;
        if !Lifecycle::can_resolve(bet.status) {
            return Err(Error::InvalidState(format!("bet {bet_id} is already resolved")));
        }
        if bet.option(winning_option_id).is_none() {
            return Err(Error::not_found("option", winning_option_id));
        }

        let participants = self.participants(bet_id)?;
        let split = partition(&participants, winning_option_id);
        bet.status = BetStatus::Resolved;
        bet.resolution_details = Some(ResolutionDetails {
            winning_option_id: winning_option_id.to_string(),
            winner_ids: split.winner_ids(),
        });
        bet.resolved_at = Some(self.now);
        bet.updated_at = self.now;
        self.stage(Key::Bet(bet.id.clone()), Value::Bet(bet.clone()));
        self.emit(Event::BetResolved {
            bet_id: bet.id.clone(),
            winning_option_id: winning_option_id.to_string(),
            winners: split.winner_ids(),
            losers: split.loser_ids(),
        });
        self.settle(&bet, &split)?;
        Ok(bet)
    }
}
