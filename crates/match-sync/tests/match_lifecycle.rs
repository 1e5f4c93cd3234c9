//! Integration tests for the match state machine using TestMatch.
//!
//! These tests verify:
//! - Creating and joining matches
//! - Move validation and side-to-move parity
//! - Stale writes after a takeback restores the move count
//! - Clock accounting and flag-fall
//! - Checkmate and resignation

use std::time::Duration;

use match_sync::config::MatchConfig;
use match_sync::error::{MatchError, Rejection};
use match_sync::rules::{replay, ShakmatyRules};
use match_sync::testing::TestMatch;
use match_sync::types::{
    parse_coordinates, Color, MatchRecord, MatchStatus, Outcome, ParticipantId, ResultReason,
    TimeControl,
};

fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}

// =============================================================================
// Create / join
// =============================================================================

#[tokio::test]
async fn test_create_match() {
    let game = TestMatch::pending(TimeControl::FIFTEEN_PLUS_TEN).await;
    let record = game.record().await;

    assert_eq!(record.status, MatchStatus::Waiting);
    assert_eq!(record.participant_a, game.white);
    assert!(record.participant_b.is_none());
    assert_eq!(record.white_remaining, secs(900));
    assert_eq!(record.black_remaining, secs(900));
    assert!(record.move_history.is_empty());
    assert!(record.last_move_at.is_none());
}

#[tokio::test]
async fn test_create_rejects_empty_time_control() {
    let game = TestMatch::pending(TimeControl::FIVE_MINUTES).await;
    let err = game
        .controller
        .create_match(ParticipantId::new(), TimeControl::new(0, 5))
        .await
        .unwrap_err();
    assert_eq!(err.rejection(), Some(&Rejection::InvalidTimeControl));
}

#[tokio::test]
async fn test_join_starts_the_match() {
    let game = TestMatch::pending(TimeControl::FIVE_MINUTES).await;
    let joined = game.controller.join_match(game.id, game.black).await.unwrap();

    assert_eq!(joined.status, MatchStatus::Active);
    assert_eq!(joined.participant_b, Some(game.black));
    assert_eq!(joined.last_move_at, Some(game.controller.now()));
    assert_eq!(joined.color_of(game.black), Some(Color::Black));
}

#[tokio::test]
async fn test_initiator_cannot_join() {
    let game = TestMatch::pending(TimeControl::FIVE_MINUTES).await;
    let err = game
        .controller
        .join_match(game.id, game.white)
        .await
        .unwrap_err();
    assert!(err.is_precondition_failed());
}

#[tokio::test]
async fn test_join_of_active_match_fails() {
    let game = TestMatch::start(TimeControl::FIVE_MINUTES).await;
    let err = game
        .controller
        .join_match(game.id, ParticipantId::new())
        .await
        .unwrap_err();
    assert!(err.is_precondition_failed());
    assert_eq!(game.record().await.participant_b, Some(game.black));
}

#[tokio::test]
async fn test_join_unknown_match() {
    let game = TestMatch::pending(TimeControl::FIVE_MINUTES).await;
    let err = game
        .controller
        .join_match(match_sync::types::MatchId::new(), game.black)
        .await
        .unwrap_err();
    assert!(matches!(err, MatchError::NotFound { .. }));
}

// =============================================================================
// Moves
// =============================================================================

#[tokio::test]
async fn test_side_to_move_follows_history_parity() {
    let game = TestMatch::start(TimeControl::FIVE_MINUTES).await;
    let moves = ["e2e4", "e7e5", "g1f3", "b8c6", "f1c4"];

    for (n, uci) in moves.iter().enumerate() {
        let record = game.play(uci).await.unwrap();
        let plies = n + 1;
        let expected = if plies % 2 == 0 {
            Color::White
        } else {
            Color::Black
        };
        assert_eq!(record.move_count(), plies);
        assert_eq!(record.side_to_move(), expected);
        // FEN turn field agrees with the history
        let turn = record.position.split(' ').nth(1).unwrap();
        assert_eq!(turn, if expected == Color::White { "w" } else { "b" });
    }

    let record = game.record().await;
    let notation: Vec<_> = record.move_history.iter().map(|m| m.notation.as_str()).collect();
    assert_eq!(notation, ["e4", "e5", "Nf3", "Nc6", "Bc4"]);
    assert_eq!(record.move_history[1].color, Color::Black);
}

#[tokio::test]
async fn test_move_before_join_is_rejected() {
    let game = TestMatch::pending(TimeControl::FIVE_MINUTES).await;
    let before = game.record().await;
    let (from, to) = parse_coordinates("e2e4").unwrap();

    let err = game
        .controller
        .apply_move(&before, game.white, from, to)
        .await
        .unwrap_err();
    assert_eq!(
        err.rejection(),
        Some(&Rejection::NotActive {
            status: MatchStatus::Waiting
        })
    );
    assert_eq!(game.record().await, before);
}

#[tokio::test]
async fn test_move_out_of_turn_is_rejected() {
    let game = TestMatch::start(TimeControl::FIVE_MINUTES).await;
    let before = game.record().await;
    let (from, to) = parse_coordinates("e7e5").unwrap();

    let err = game
        .controller
        .apply_move(&before, game.black, from, to)
        .await
        .unwrap_err();
    assert_eq!(
        err.rejection(),
        Some(&Rejection::NotYourTurn {
            expected: Color::White
        })
    );
    assert_eq!(game.record().await, before);
}

#[tokio::test]
async fn test_illegal_move_is_rejected() {
    let game = TestMatch::start(TimeControl::FIVE_MINUTES).await;
    let before = game.record().await;
    let (from, to) = parse_coordinates("e2e5").unwrap();

    let err = game
        .controller
        .apply_move(&before, game.white, from, to)
        .await
        .unwrap_err();
    assert!(matches!(err.rejection(), Some(Rejection::IllegalMove { .. })));
    assert_eq!(game.record().await, before);
}

#[tokio::test]
async fn test_outsider_move_is_rejected() {
    let game = TestMatch::start(TimeControl::FIVE_MINUTES).await;
    let before = game.record().await;
    let (from, to) = parse_coordinates("e2e4").unwrap();

    let err = game
        .controller
        .apply_move(&before, ParticipantId::new(), from, to)
        .await
        .unwrap_err();
    assert_eq!(err.rejection(), Some(&Rejection::NotInMatch));
    assert_eq!(game.record().await, before);
}

#[tokio::test]
async fn test_stale_snapshot_move_fails_precondition() {
    let game = TestMatch::start(TimeControl::FIVE_MINUTES).await;
    let stale = game.record().await;
    game.play("e2e4").await.unwrap();

    // same move against the old snapshot
    let (from, to) = parse_coordinates("d2d4").unwrap();
    let err = game
        .controller
        .apply_move(&stale, game.white, from, to)
        .await
        .unwrap_err();
    assert!(err.is_precondition_failed());
    assert_eq!(game.record().await.move_count(), 1);
}

/// Take back the last move: `proposer` asks, the other side accepts.
async fn take_back(game: &TestMatch, proposer: ParticipantId) -> MatchRecord {
    let responder = if proposer == game.white {
        game.black
    } else {
        game.white
    };
    let requested = game
        .controller
        .request_takeback(&game.record().await, proposer)
        .await
        .unwrap();
    game.controller
        .respond_takeback(&requested, responder, true)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_stale_move_after_takeback_and_new_move_fails() {
    let game = TestMatch::start(TimeControl::FIVE_MINUTES).await;
    let stale = game.play_all(&["e2e4", "e7e5", "g1f3"]).await.unwrap();

    take_back(&game, game.white).await;
    let current = game.play("b1c3").await.unwrap();
    // back to three moves, on a different board
    assert_eq!(current.move_count(), stale.move_count());

    let (from, to) = parse_coordinates("g8f6").unwrap();
    let err = game
        .controller
        .apply_move(&stale, game.black, from, to)
        .await
        .unwrap_err();
    assert!(err.is_precondition_failed());

    let record = game.record().await;
    assert_eq!(record, current);
    let notation: Vec<_> = record.move_history.iter().map(|m| m.notation.as_str()).collect();
    assert_eq!(notation, ["e4", "e5", "Nc3"]);
    assert_eq!(
        replay(&ShakmatyRules, &record.move_history).unwrap(),
        record.position
    );
}

#[tokio::test]
async fn test_stale_timeout_claim_after_takeback_fails() {
    let game = TestMatch::start(TimeControl::new(20, 0)).await;
    game.play_all(&["e2e4", "e7e5"]).await.unwrap();
    game.advance(1);
    let stale = game.play("g1f3").await.unwrap();

    game.advance(2);
    take_back(&game, game.white).await;
    game.advance(1);
    let current = game.play("g1f3").await.unwrap();
    // same board and count, but Black's clock restarted
    assert_eq!(current.position, stale.position);
    assert_eq!(current.move_count(), stale.move_count());

    game.advance(18);
    assert_eq!(game.controller.clock_view(&stale).flagged(), Some(Color::Black));
    let err = game.controller.claim_timeout(&stale).await.unwrap_err();
    assert!(err.is_precondition_failed());
    assert_eq!(game.record().await, current);

    let err = game.controller.claim_timeout(&current).await.unwrap_err();
    assert_eq!(err.rejection(), Some(&Rejection::ClockNotExpired));
}

#[tokio::test]
async fn test_checkmate_completes_match() {
    let game = TestMatch::start(TimeControl::FIVE_MINUTES).await;
    let record = game
        .play_all(&["f2f3", "e7e5", "g2g4", "d8h4"])
        .await
        .unwrap();

    assert_eq!(record.status, MatchStatus::Completed);
    let result = record.result.unwrap();
    assert_eq!(result.outcome, Outcome::BlackWins);
    assert_eq!(result.reason, ResultReason::Checkmate);
    assert_eq!(result.to_string(), "Black wins by checkmate");

    let err = game.play("e2e4").await.unwrap_err();
    assert!(matches!(err.rejection(), Some(Rejection::NotActive { .. })));
}

#[tokio::test]
async fn test_resign() {
    let game = TestMatch::start(TimeControl::FIVE_MINUTES).await;
    game.play("e2e4").await.unwrap();
    let snapshot = game.record().await;

    let record = game.controller.resign(&snapshot, game.white).await.unwrap();
    assert_eq!(record.status, MatchStatus::Completed);
    assert_eq!(record.result.unwrap().to_string(), "Black wins by resignation");

    // completed matches cannot be resigned again
    let err = game.controller.resign(&record, game.black).await.unwrap_err();
    assert!(matches!(err.rejection(), Some(Rejection::NotActive { .. })));
}

// =============================================================================
// Clocks
// =============================================================================

#[tokio::test]
async fn test_clock_runs_for_side_to_move_only() {
    let game = TestMatch::start(TimeControl::FIVE_MINUTES).await;
    let record = game.play("e2e4").await.unwrap();
    assert_eq!(record.white_remaining, secs(300));

    game.advance(10);
    let view = game.controller.clock_view(&record);
    assert_eq!(view.active, Some(Color::Black));
    assert_eq!(view.black, secs(290));
    assert_eq!(view.white, secs(300));
}

#[tokio::test]
async fn test_move_charges_the_mover() {
    let game = TestMatch::start(TimeControl::FIVE_MINUTES).await;
    game.advance(3);
    let record = game.play("e2e4").await.unwrap();
    assert_eq!(record.white_remaining, secs(297));
    assert_eq!(record.move_history[0].spent, secs(3));

    game.advance(7);
    let record = game.play("e7e5").await.unwrap();
    assert_eq!(record.black_remaining, secs(293));
    assert_eq!(record.white_remaining, secs(297));
}

#[tokio::test]
async fn test_increment_is_not_credited_by_default() {
    let game = TestMatch::start(TimeControl::FIFTEEN_PLUS_TEN).await;
    game.advance(4);
    let record = game.play("e2e4").await.unwrap();
    assert_eq!(record.white_remaining, secs(896));
}

#[tokio::test]
async fn test_increment_credited_when_enabled() {
    let config = MatchConfig {
        credit_increment: true,
        ..Default::default()
    };
    let game = TestMatch::start_with_config(TimeControl::FIFTEEN_PLUS_TEN, config).await;
    game.advance(4);
    let record = game.play("e2e4").await.unwrap();
    assert_eq!(record.white_remaining, secs(906));
}

#[tokio::test]
async fn test_clocks_never_go_negative() {
    let game = TestMatch::start(TimeControl::new(2, 0)).await;
    game.advance(60);

    let view = game.controller.clock_view(&game.record().await);
    assert_eq!(view.white, Duration::ZERO);

    let record = game.play("e2e4").await.unwrap();
    assert_eq!(record.white_remaining, Duration::ZERO);
    assert_eq!(record.move_history[0].spent, secs(60));
}

#[tokio::test]
async fn test_claim_timeout_before_flag_is_rejected() {
    let game = TestMatch::start(TimeControl::FIVE_MINUTES).await;
    game.advance(10);
    let snapshot = game.record().await;
    let err = game.controller.claim_timeout(&snapshot).await.unwrap_err();
    assert_eq!(err.rejection(), Some(&Rejection::ClockNotExpired));
    assert_eq!(game.record().await, snapshot);
}

#[tokio::test]
async fn test_claim_timeout_after_flag() {
    let game = TestMatch::start(TimeControl::new(5, 0)).await;
    game.play("e2e4").await.unwrap();
    game.advance(6);
    let snapshot = game.record().await;

    let record = game.controller.claim_timeout(&snapshot).await.unwrap();
    assert_eq!(record.status, MatchStatus::Completed);
    assert_eq!(record.black_remaining, Duration::ZERO);
    assert_eq!(record.white_remaining, secs(5));
    assert_eq!(record.result.unwrap().to_string(), "White wins on time");
}

#[tokio::test]
async fn test_concurrent_timeout_claims_land_once() {
    let game = TestMatch::start(TimeControl::new(5, 0)).await;
    game.advance(6);
    let snapshot = game.record().await;

    let (first, second) = tokio::join!(
        game.controller.claim_timeout(&snapshot),
        game.controller.claim_timeout(&snapshot),
    );
    assert!(first.is_ok() != second.is_ok());
    let err = first.err().or(second.err()).unwrap();
    assert!(err.is_precondition_failed());
    assert_eq!(game.record().await.revision, snapshot.revision + 1);
}

#[tokio::test]
async fn test_store_outage_is_reported() {
    let game = TestMatch::start(TimeControl::FIVE_MINUTES).await;
    let snapshot = game.record().await;
    game.store.set_unavailable(true);

    let (from, to) = parse_coordinates("e2e4").unwrap();
    let err = game
        .controller
        .apply_move(&snapshot, game.white, from, to)
        .await
        .unwrap_err();
    assert!(err.is_retryable());

    game.store.set_unavailable(false);
    assert_eq!(game.record().await, snapshot);
}
