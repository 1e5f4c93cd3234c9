//! In-memory match harness for unit and integration testing.
//!
//! Wires a [`MatchController`] to a [`MemoryMatchStore`], the standard
//! rules and a [`ManualClock`], so clock scenarios are deterministic.

use std::sync::Arc;
use std::time::Duration;

use crate::config::MatchConfig;
use crate::controller::MatchController;
use crate::error::MatchError;
use crate::rules::ShakmatyRules;
use crate::session::MatchSession;
use crate::store::{MatchStore, MemoryMatchStore};
use crate::time::{ManualClock, TimeSource};
use crate::types::{parse_coordinates, Color, MatchId, MatchRecord, ParticipantId, TimeControl};

/// A two-participant match on in-memory infrastructure.
///
/// # Example
///
/// ```ignore
/// let game = TestMatch::start(TimeControl::FIVE_MINUTES).await;
/// game.play("e2e4").await.unwrap();
/// game.advance(10);
/// ```
pub struct TestMatch {
    pub store: Arc<MemoryMatchStore>,
    pub clock: Arc<ManualClock>,
    pub controller: MatchController,
    pub id: MatchId,
    /// Initiator.
    pub white: ParticipantId,
    pub black: ParticipantId,
}

impl TestMatch {
    /// A waiting match created by `white`. `black` has not joined.
    pub async fn pending(time_control: TimeControl) -> Self {
        Self::pending_with_config(time_control, MatchConfig::default()).await
    }

    pub async fn pending_with_config(time_control: TimeControl, config: MatchConfig) -> Self {
        let store = Arc::new(MemoryMatchStore::new());
        let clock = Arc::new(ManualClock::default());
        let controller = MatchController::new(
            Arc::clone(&store) as Arc<dyn MatchStore>,
            Arc::new(ShakmatyRules),
            Arc::clone(&clock) as Arc<dyn TimeSource>,
            config,
        )
        .expect("TestMatch config should be valid");
        let white = ParticipantId::new();
        let id = controller
            .create_match(white, time_control)
            .await
            .expect("TestMatch create should succeed");
        Self {
            store,
            clock,
            controller,
            id,
            white,
            black: ParticipantId::new(),
        }
    }

    /// An active match: created by `white`, joined by `black`.
    pub async fn start(time_control: TimeControl) -> Self {
        Self::start_with_config(time_control, MatchConfig::default()).await
    }

    pub async fn start_with_config(time_control: TimeControl, config: MatchConfig) -> Self {
        let game = Self::pending_with_config(time_control, config).await;
        game.controller
            .join_match(game.id, game.black)
            .await
            .expect("TestMatch join should succeed");
        game
    }

    /// The current stored record.
    pub async fn record(&self) -> MatchRecord {
        self.controller
            .fetch(self.id)
            .await
            .expect("TestMatch record should exist")
    }

    /// Play a coordinate move (`"e2e4"`) for whichever side is to move.
    pub async fn play(&self, uci: &str) -> Result<MatchRecord, MatchError> {
        let snapshot = self.record().await;
        let (from, to) = parse_coordinates(uci).expect("TestMatch move should be coordinates");
        let mover = if snapshot.side_to_move() == Color::White {
            self.white
        } else {
            self.black
        };
        self.controller.apply_move(&snapshot, mover, from, to).await
    }

    /// Play a sequence of moves, stopping at the first failure.
    pub async fn play_all(&self, moves: &[&str]) -> Result<MatchRecord, MatchError> {
        let mut record = self.record().await;
        for uci in moves {
            record = self.play(uci).await?;
        }
        Ok(record)
    }

    /// Advance the manual clock by `secs` seconds.
    pub fn advance(&self, secs: u64) {
        self.clock.advance(Duration::from_secs(secs));
    }

    pub fn advance_millis(&self, millis: u64) {
        self.clock.advance(Duration::from_millis(millis));
    }

    /// Open a session for `participant`.
    pub async fn session(&self, participant: ParticipantId) -> MatchSession {
        MatchSession::open(self.controller.clone(), self.id, participant)
            .await
            .expect("TestMatch session should open")
    }
}
