//! End-to-end lifecycle scenarios against the engine.

use chrono::Duration;
use stake_types::{
    api::{OptionInput, UpdateBetRequest},
    BetStatus, ProofRequirement,
};

use crate::mocks::{create_engine, create_request, fixed_now};
use crate::state::{load_bet, load_stakes_of};
use crate::{Error, State};

#[tokio::test]
async fn test_ten_options_round_trip_in_order() {
    let (engine, _clock) = create_engine();
    let labels: Vec<String> = (1..=10).map(|i| format!("Outcome {i}")).collect();
    let mut request = create_request(&["a", "b"], fixed_now());
    request.options = labels.iter().map(|label| OptionInput::from(label.as_str())).collect();

    let created = engine.create_bet("host", &request).unwrap();
    let fetched = engine.fetch_bet("host", &created.id).unwrap();

    let read_back: Vec<&str> = fetched.bet.options.iter().map(|o| o.label.as_str()).collect();
    assert_eq!(read_back, labels.iter().map(String::as_str).collect::<Vec<_>>());
    assert_eq!(fetched.bet.options, created.options);
    assert_eq!(fetched.bet.status, BetStatus::Open);
    assert!(fetched.participants.is_empty());
}

#[tokio::test]
async fn test_pick_after_deadline_rejected_while_stored_open() {
    let (engine, clock) = create_engine();
    let bet = engine
        .create_bet("host", &create_request(&["Heads", "Tails"], fixed_now()))
        .unwrap();
    let heads = bet.options[0].id.clone();

    clock.advance(Duration::hours(1));

    // Nothing has swept the bet yet
    let stored = engine.read(|state, _| Ok(load_bet(state, &bet.id)?)).unwrap().unwrap();
    assert_eq!(stored.status, BetStatus::Open);

    let err = engine.record_pick("alice", &bet.id, &heads).await.unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)), "{err:?}");

    // Reads apply the deadline rule
    assert_eq!(engine.fetch_bet("alice", &bet.id).unwrap().bet.status, BetStatus::Locked);
    assert!(engine.fetch_bet("alice", &bet.id).unwrap().participants.is_empty());
}

#[tokio::test]
async fn test_pick_one_microsecond_before_deadline_is_accepted() {
    let (engine, clock) = create_engine();
    let bet = engine
        .create_bet("host", &create_request(&["Heads", "Tails"], fixed_now()))
        .unwrap();
    clock.set(bet.deadline - Duration::microseconds(1));
    assert!(engine.record_pick("alice", &bet.id, &bet.options[0].id).await.is_ok());

    clock.set(bet.deadline);
    let err = engine
        .record_pick("alice", &bet.id, &bet.options[1].id)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));
    let detail = engine.fetch_bet("alice", &bet.id).unwrap();
    assert_eq!(detail.participants[0].participant.selected_option_id, bet.options[0].id);
}

#[tokio::test]
async fn test_pick_upserts_single_participant() {
    let (engine, clock) = create_engine();
    let bet = engine
        .create_bet("host", &create_request(&["Heads", "Tails"], fixed_now()))
        .unwrap();

    let first = engine.record_pick("alice", &bet.id, &bet.options[0].id).await.unwrap();
    clock.advance(Duration::minutes(5));
    let second = engine.record_pick("alice", &bet.id, &bet.options[1].id).await.unwrap();

    assert_eq!(second.participants.len(), 1);
    let before = &first.participants[0].participant;
    let after = &second.participants[0].participant;
    assert_eq!(before.id, after.id);
    assert_eq!(before.created_at, after.created_at);
    assert_eq!(after.selected_option_id, bet.options[1].id);
    assert_eq!(after.updated_at, fixed_now() + Duration::minutes(5));
}

#[tokio::test]
async fn test_pick_rejections() {
    let (engine, _clock) = create_engine();
    let bet = engine
        .create_bet("host", &create_request(&["Heads", "Tails"], fixed_now()))
        .unwrap();

    assert!(matches!(
        engine.record_pick("alice", "missing", "opt").await,
        Err(Error::NotFound { entity: "bet", .. })
    ));
    assert!(matches!(
        engine.record_pick("stranger", &bet.id, &bet.options[0].id).await,
        Err(Error::Authorization(_))
    ));
    assert!(matches!(
        engine.record_pick("alice", &bet.id, "not-an-option").await,
        Err(Error::NotFound { entity: "option", .. })
    ));

    engine.lock_bet("host", &bet.id).await.unwrap();
    assert!(matches!(
        engine.record_pick("alice", &bet.id, &bet.options[0].id).await,
        Err(Error::InvalidState(_))
    ));
}

#[tokio::test]
async fn test_non_host_resolve_is_rejected_and_bet_stays_open() {
    let (engine, _clock) = create_engine();
    let bet = engine
        .create_bet("host", &create_request(&["Heads", "Tails"], fixed_now()))
        .unwrap();
    engine.record_pick("alice", &bet.id, &bet.options[0].id).await.unwrap();

    let before = engine.read(|state, _| Ok(state.clone())).unwrap();
    let err = engine
        .resolve("alice", &bet.id, &bet.options[0].id)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Authorization(_)), "{err:?}");

    let after = engine.read(|state, _| Ok(state.clone())).unwrap();
    assert_eq!(before, after);
    assert_eq!(engine.fetch_bet("host", &bet.id).unwrap().bet.status, BetStatus::Open);
}

#[tokio::test]
async fn test_resolve_check_order() {
    let (engine, _clock) = create_engine();
    let bet = engine
        .create_bet("host", &create_request(&["Heads", "Tails"], fixed_now()))
        .unwrap();

    // Existence before everything
    assert!(matches!(
        engine.resolve("alice", "missing", "x").await,
        Err(Error::NotFound { entity: "bet", .. })
    ));
    // Authorization before option
    assert!(matches!(
        engine.resolve("alice", &bet.id, "x").await,
        Err(Error::Authorization(_))
    ));
    // Unknown winning option
    assert!(matches!(
        engine.resolve("host", &bet.id, "x").await,
        Err(Error::NotFound { entity: "option", .. })
    ));
    // State before option once resolved
    engine.resolve("host", &bet.id, &bet.options[0].id).await.unwrap();
    assert!(matches!(
        engine.resolve("host", &bet.id, "x").await,
        Err(Error::InvalidState(_))
    ));
}

#[tokio::test]
async fn test_second_resolve_fails_and_state_is_identical() {
    let (engine, clock) = create_engine();
    let mut request = create_request(&["Heads", "Tails"], fixed_now());
    request.stake_amount = Some(10.0);
    request.proof_requirement = ProofRequirement::Photo;
    let bet = engine.create_bet("host", &request).unwrap();
    engine.record_pick("alice", &bet.id, &bet.options[0].id).await.unwrap();
    engine.record_pick("bob", &bet.id, &bet.options[1].id).await.unwrap();

    engine.resolve("host", &bet.id, &bet.options[0].id).await.unwrap();
    let after_first = engine.read(|state, _| Ok(state.clone())).unwrap();

    clock.advance(Duration::minutes(1));
    let err = engine
        .resolve("host", &bet.id, &bet.options[1].id)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));

    let after_second = engine.read(|state, _| Ok(state.clone())).unwrap();
    assert_eq!(after_first, after_second);
    assert_eq!(load_stakes_of(&after_second, &bet.id).unwrap().len(), 1);
}

#[tokio::test]
async fn test_host_lock_then_resolve() {
    let (engine, _clock) = create_engine();
    let bet = engine
        .create_bet("host", &create_request(&["Heads", "Tails"], fixed_now()))
        .unwrap();

    assert!(matches!(
        engine.lock_bet("alice", &bet.id).await,
        Err(Error::Authorization(_))
    ));
    let locked = engine.lock_bet("host", &bet.id).await.unwrap();
    assert_eq!(locked.status, BetStatus::Locked);
    assert!(matches!(
        engine.lock_bet("host", &bet.id).await,
        Err(Error::InvalidState(_))
    ));

    let resolved = engine.resolve("host", &bet.id, &bet.options[1].id).await.unwrap();
    assert_eq!(resolved.bet.status, BetStatus::Resolved);
    assert_eq!(resolved.bet.resolved_at, Some(fixed_now()));
    assert!(matches!(
        engine.lock_bet("host", &bet.id).await,
        Err(Error::InvalidState(_))
    ));
}

#[tokio::test]
async fn test_resolve_directly_from_open_with_no_picks() {
    let (engine, _clock) = create_engine();
    let mut request = create_request(&["Heads", "Tails"], fixed_now());
    request.stake_amount = Some(25.0);
    let bet = engine.create_bet("host", &request).unwrap();

    let resolved = engine.resolve("host", &bet.id, &bet.options[0].id).await.unwrap();
    let details = resolved.bet.resolution_details.unwrap();
    assert!(details.winner_ids.is_empty());
    assert!(resolved.participants.is_empty());
    assert!(engine.pending_stakes("alice").unwrap().is_empty());
}

#[tokio::test]
async fn test_sweep_persists_deadline_lock() {
    let (engine, clock) = create_engine();
    let soon = engine
        .create_bet("host", &create_request(&["Heads", "Tails"], fixed_now()))
        .unwrap();
    let mut later_request = create_request(&["Heads", "Tails"], fixed_now());
    later_request.deadline = (fixed_now() + Duration::days(1)).to_rfc3339();
    let later = engine.create_bet("host", &later_request).unwrap();

    assert!(engine.sweep_expired().await.unwrap().is_empty());

    clock.advance(Duration::hours(2));
    assert_eq!(engine.sweep_expired().await.unwrap(), vec![soon.id.clone()]);
    let stored = engine.read(|state, _| Ok(load_bet(state, &soon.id)?)).unwrap().unwrap();
    assert_eq!(stored.status, BetStatus::Locked);
    assert_eq!(engine.bet(&later.id).unwrap().status, BetStatus::Open);

    // Idempotent
    assert!(engine.sweep_expired().await.unwrap().is_empty());
    let metrics = engine.metrics();
    assert_eq!(metrics.bets_auto_locked, 1);
    assert_eq!(metrics.bets_created, 2);
}

#[tokio::test]
async fn test_create_bet_in_circle_requires_membership() {
    let (engine, _clock) = create_engine();
    let mut request = create_request(&["Heads", "Tails"], fixed_now());

    request.circle_id = Some("no-such-circle".to_string());
    assert!(matches!(
        engine.create_bet("host", &request),
        Err(Error::NotFound { entity: "circle", .. })
    ));

    request.circle_id = Some("circle-1".to_string());
    assert!(matches!(
        engine.create_bet("carol", &request),
        Err(Error::Authorization(_))
    ));
    let bet = engine.create_bet("alice", &request).unwrap();
    assert_eq!(bet.circle_id.as_deref(), Some("circle-1"));
    assert_eq!(engine.circle_bets("bob", "circle-1").unwrap().len(), 1);
    assert!(matches!(
        engine.circle_bets("carol", "circle-1"),
        Err(Error::Authorization(_))
    ));
}

#[tokio::test]
async fn test_failed_create_leaves_store_empty() {
    let (engine, _clock) = create_engine();
    let mut request = create_request(&["Heads", "heads"], fixed_now());
    let err = engine.create_bet("host", &request).unwrap_err();
    assert_eq!(err.field(), Some("options"));

    request.options = vec!["Heads".into(), "Tails".into()];
    request.deadline = fixed_now().to_rfc3339();
    assert_eq!(engine.create_bet("host", &request).unwrap_err().field(), Some("deadline"));

    assert!(engine.read(|state, _| Ok(state.is_empty())).unwrap());
    assert_eq!(engine.metrics().rejected_validation, 2);
}

#[tokio::test]
async fn test_update_bet_only_while_open() {
    let (engine, clock) = create_engine();
    let bet = engine
        .create_bet("host", &create_request(&["Heads", "Tails"], fixed_now()))
        .unwrap();
    let patch = UpdateBetRequest {
        title: Some("Heads or tails, final answer".to_string()),
        description: None,
        deadline: Some((fixed_now() + Duration::hours(3)).to_rfc3339()),
    };

    assert!(matches!(
        engine.update_bet("alice", &bet.id, &patch).await,
        Err(Error::Authorization(_))
    ));
    let updated = engine.update_bet("host", &bet.id, &patch).await.unwrap();
    assert_eq!(updated.title, "Heads or tails, final answer");
    assert_eq!(updated.deadline, fixed_now() + Duration::hours(3));
    assert_eq!(updated.description.as_deref(), Some("Best of one"));

    clock.advance(Duration::hours(4));
    assert!(matches!(
        engine.update_bet("host", &bet.id, &patch).await,
        Err(Error::InvalidState(_))
    ));
}

#[test]
fn test_store_is_untouched_by_reads() {
    let (engine, _clock) = create_engine();
    engine
        .create_bet("host", &create_request(&["Heads", "Tails"], fixed_now()))
        .unwrap();
    let before = engine.read(|state, _| Ok(state.clone())).unwrap();
    engine.feed("host").unwrap();
    engine.explore("alice", Default::default()).unwrap();
    engine.stats("host").unwrap();
    let after = engine.read(|state, _| Ok(state.clone())).unwrap();
    assert_eq!(before, after);
    assert_eq!(after.len(), 1);
    assert!(after.get(&crate::Key::Bet("nope".to_string())).unwrap().is_none());
}
