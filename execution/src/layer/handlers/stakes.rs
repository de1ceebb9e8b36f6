use super::*;
use crate::settlement::{complete_stake, derive_stakes, Partition, ProofFile};
use crate::state::{load_stake, load_stakes_of};
use std::collections::HashSet;
use stake_types::{ProofType, StakeInstance, StakeStatus};

impl<'a, S: State> Layer<'a, S> {
    /// Materialize the stakes owed by the losers of a just-resolved bet.
    pub(in crate::layer) fn settle(
        &mut self,
        bet: &Bet,
        split: &Partition,
    ) -> Result<Vec<StakeInstance>> {
        let owed: HashSet<String> = load_stakes_of(self, &bet.id)?
            .into_iter()
            .map(|stake| stake.participant_id)
            .collect();
        let stakes = derive_stakes(bet, &split.losers, self.now, new_id);
        for stake in &stakes {
            if owed.contains(&stake.participant_id) {
                return Err(Error::Storage(anyhow::anyhow!(
                    "participant {} already owes a stake on bet {}",
                    stake.participant_id,
                    bet.id
                )));
            }
            let key = Key::Stake {
                bet: bet.id.clone(),
                stake: stake.id.clone(),
            };
            self.stage(key, Value::Stake(stake.clone()));
            self.emit(Event::StakeCreated {
                bet_id: bet.id.clone(),
                stake_id: stake.id.clone(),
                user: stake.user_id.clone(),
                status: stake.status,
            });
        }
        Ok(stakes)
    }

    /// Check that `actor` may complete the stake with the given file, without
    /// staging anything.
    pub fn check_proof(
        &self,
        actor: &str,
        bet_id: &str,
        stake_id: &str,
        proof_type: ProofType,
        file: &ProofFile,
    ) -> Result<StakeInstance> {
        self.require_bet(bet_id)?;
        let stake =
            load_stake(self, bet_id, stake_id)?.ok_or_else(|| Error::not_found("stake", stake_id))?;
        if stake.user_id != actor {
            return Err(Error::Authorization(format!(
                "stake {stake_id} belongs to another user"
            )));
        }
        if stake.status == StakeStatus::Completed {
            return Err(Error::InvalidState(format!(
                "stake {stake_id} is already completed"
            )));
        }
        match stake.proof_requirement.proof_type() {
            Some(required) if required == proof_type => {}
            Some(required) => {
                return Err(Error::validation(
                    "proofType",
                    format!("stake requires {required} proof, got {proof_type}"),
                ))
            }
            None => {
                return Err(Error::validation(
                    "proofType",
                    "stake does not require proof",
                ))
            }
        }
        if file.size == 0 {
            return Err(Error::validation("file", "file is empty"));
        }
        if !proof_type.accepts_content_type(&file.content_type) {
            return Err(Error::validation(
                "file",
                format!(
                    "content type {} is not valid for {proof_type} proof",
                    file.content_type
                ),
            ));
        }
        Ok(stake)
    }

    /// Complete the stake with a proof whose binary is already stored.
    #[allow(clippy::too_many_arguments)]
    pub fn submit_proof(
        &mut self,
        actor: &str,
        bet_id: &str,
        stake_id: &str,
        proof_type: ProofType,
        file: &ProofFile,
        proof_id: String,
        proof_url: String,
    ) -> Result<StakeInstance> {
        let stake = self.check_proof(actor, bet_id, stake_id, proof_type, file)?;
        let completed = complete_stake(&stake, proof_id, proof_type, proof_url, file, self.now);
        self.stage(
            Key::Stake {
                bet: bet_id.to_string(),
                stake: stake_id.to_string(),
            },
            Value::Stake(completed.clone()),
        );
        self.emit(Event::ProofSubmitted {
            bet_id: bet_id.to_string(),
            stake_id: stake_id.to_string(),
            user: actor.to_string(),
            proof_type,
        });
        Ok(completed)
    }
}
