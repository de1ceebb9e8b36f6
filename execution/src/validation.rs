//! Input bounds for creating and editing bets.
//!
//! Fields are checked in a fixed order (title, description, options,
//! deadline, stake amount) and the first failure is reported.

use chrono::{DateTime, Utc};
use stake_types::{
    api::{CreateBetRequest, OptionInput, UpdateBetRequest},
    limits::{
        DESCRIPTION_MAX_LEN, MAX_OPTIONS, MAX_STAKE_AMOUNT, MIN_OPTIONS, TITLE_MAX_LEN,
        TITLE_MIN_LEN,
    },
    Privacy,
};
use std::collections::HashSet;

use crate::{Error, Result};

/// Creation input after every bound has been checked.
#[derive(Clone, Debug, PartialEq)]
pub struct ValidBet {
    pub title: String,
    pub description: Option<String>,
    pub option_labels: Vec<String>,
    pub deadline: DateTime<Utc>,
    pub stake_amount: Option<f64>,
}

/// Edit input after every present field has been checked.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ValidPatch {
    pub title: Option<String>,
    /// `Some(None)` clears the description.
    pub description: Option<Option<String>>,
    pub deadline: Option<DateTime<Utc>>,
}

pub fn validate_create(request: &CreateBetRequest, now: DateTime<Utc>) -> Result<ValidBet> {
    let title = validate_title(&request.title)?;
    let description = validate_description(request.description.as_deref())?;
    let option_labels = validate_options(&request.options)?;
    let deadline = validate_deadline(&request.deadline, now)?;
    let stake_amount = validate_stake_amount(request.stake_amount)?;
    if request.privacy == Privacy::CirclePrivate && request.circle_id.is_none() {
        return Err(Error::validation(
            "circleId",
            "circle-private bets must belong to a circle",
        ));
    }
    Ok(ValidBet {
        title,
        description,
        option_labels,
        deadline,
        stake_amount,
    })
}

pub fn validate_update(patch: &UpdateBetRequest, now: DateTime<Utc>) -> Result<ValidPatch> {
    if patch.is_empty() {
        return Err(Error::validation("body", "no editable fields supplied"));
    }
    let title = patch.title.as_deref().map(validate_title).transpose()?;
    let description = patch
        .description
        .as_deref()
        .map(|description| validate_description(Some(description)))
        .transpose()?;
    let deadline = patch
        .deadline
        .as_deref()
        .map(|deadline| validate_deadline(deadline, now))
        .transpose()?;
    Ok(ValidPatch {
        title,
        description,
        deadline,
    })
}

pub fn validate_title(title: &str) -> Result<String> {
    let title = title.trim();
    let len = title.chars().count();
    if len < TITLE_MIN_LEN {
        return Err(Error::validation(
            "title",
            format!("must be at least {TITLE_MIN_LEN} characters"),
        ));
    }
    if len > TITLE_MAX_LEN {
        return Err(Error::validation(
            "title",
            format!("must be at most {TITLE_MAX_LEN} characters"),
        ));
    }
    Ok(title.to_string())
}

/// Blank descriptions are treated as absent.
pub fn validate_description(description: Option<&str>) -> Result<Option<String>> {
    let Some(description) = description.map(str::trim).filter(|d| !d.is_empty()) else {
        return Ok(None);
    };
    if description.chars().count() > DESCRIPTION_MAX_LEN {
        return Err(Error::validation(
            "description",
            format!("must be at most {DESCRIPTION_MAX_LEN} characters"),
        ));
    }
    Ok(Some(description.to_string()))
}

pub fn validate_options(options: &[OptionInput]) -> Result<Vec<String>> {
    if options.len() < MIN_OPTIONS {
        return Err(Error::validation(
            "options",
            format!("at least {MIN_OPTIONS} options are required"),
        ));
    }
    if options.len() > MAX_OPTIONS {
        return Err(Error::validation(
            "options",
            format!("at most {MAX_OPTIONS} options are allowed"),
        ));
    }
    let mut seen = HashSet::with_capacity(options.len());
    let mut labels = Vec::with_capacity(options.len());
    for (index, option) in options.iter().enumerate() {
        let label = option.label.trim();
        if label.is_empty() {
            return Err(Error::validation(
                "options",
                format!("option {} has an empty label", index + 1),
            ));
        }
        if !seen.insert(label.to_lowercase()) {
            return Err(Error::validation(
                "options",
                format!("duplicate option label: {label}"),
            ));
        }
        labels.push(label.to_string());
    }
    Ok(labels)
}

pub fn validate_deadline(deadline: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let deadline = DateTime::parse_from_rfc3339(deadline.trim())
        .map_err(|err| Error::validation("deadline", format!("not an RFC 3339 instant: {err}")))?
        .with_timezone(&Utc);
    if deadline <= now {
        return Err(Error::validation("deadline", "must be in the future"));
    }
    Ok(deadline)
}

pub fn validate_stake_amount(amount: Option<f64>) -> Result<Option<f64>> {
    let Some(amount) = amount else {
        return Ok(None);
    };
    if !amount.is_finite() || amount <= 0.0 {
        return Err(Error::validation("stakeAmount", "must be a positive amount"));
    }
    if amount > MAX_STAKE_AMOUNT {
        return Err(Error::validation(
            "stakeAmount",
            format!("must be at most {MAX_STAKE_AMOUNT}"),
        ));
    }
    Ok(Some(amount))
}
