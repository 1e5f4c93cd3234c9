//! The match state machine.
//!
//! Every mutating operation validates against the snapshot the caller acts
//! on, then sends a field-scoped patch guarded by preconditions. Nothing is
//! locked across the round trip: a stale caller fails with
//! [`MatchError::PreconditionFailed`] and resynchronizes from the next
//! snapshot.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::instrument;

use crate::clock::{ClockEngine, ClockView};
use crate::config::MatchConfig;
use crate::error::{MatchError, Rejection};
use crate::negotiation;
use crate::rules::{RulesEngine, Terminal};
use crate::store::{HistoryEdit, MatchPatch, MatchStore, Precondition, Transition};
use crate::subscription::SubscriptionGuard;
use crate::time::TimeSource;
use crate::types::{
    Color, LegalMove, MatchId, MatchRecord, MatchResult, MatchStatus, MoveEntry,
    NegotiationKind, ParticipantId, ResultReason, Square, TimeControl,
};

/// Turns participant actions into guarded store updates.
#[derive(Clone)]
pub struct MatchController {
    store: Arc<dyn MatchStore>,
    rules: Arc<dyn RulesEngine>,
    time: Arc<dyn TimeSource>,
    config: Arc<MatchConfig>,
    clock: ClockEngine,
}

impl MatchController {
    /// Create a controller. Fails if `config` is invalid.
    pub fn new(
        store: Arc<dyn MatchStore>,
        rules: Arc<dyn RulesEngine>,
        time: Arc<dyn TimeSource>,
        config: MatchConfig,
    ) -> Result<Self, MatchError> {
        config.validate()?;
        let clock = ClockEngine::new(config.credit_increment);
        Ok(Self {
            store,
            rules,
            time,
            config: Arc::new(config),
            clock,
        })
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    pub fn clock(&self) -> ClockEngine {
        self.clock
    }

    pub fn store(&self) -> &Arc<dyn MatchStore> {
        &self.store
    }

    /// Current wall-clock instant from the injected time source.
    pub fn now(&self) -> DateTime<Utc> {
        self.time.now()
    }

    /// Live clocks for `snapshot` right now.
    pub fn clock_view(&self, snapshot: &MatchRecord) -> ClockView {
        self.clock.derive(snapshot, self.now())
    }

    /// Active, on exactly the board `snapshot` shows.
    fn guard_board(snapshot: &MatchRecord) -> Vec<Precondition> {
        let mut preconditions = vec![Precondition::StatusIs(MatchStatus::Active)];
        preconditions.extend(Precondition::same_board(snapshot));
        preconditions
    }

    async fn commit(&self, id: MatchId, transition: Transition) -> Result<MatchRecord, MatchError> {
        let record = self
            .store
            .conditional_update(id, &transition.patch, &transition.preconditions)
            .await?;
        if let Some(result) = transition.patch.result {
            tracing::info!(match_id = %id, %result, "match completed");
        }
        Ok(record)
    }

    /// Create a waiting match. The initiator plays White.
    #[instrument(skip(self))]
    pub async fn create_match(
        &self,
        initiator: ParticipantId,
        time_control: TimeControl,
    ) -> Result<MatchId, MatchError> {
        if time_control.initial_seconds == 0 {
            return Err(Rejection::InvalidTimeControl.into());
        }
        let record = MatchRecord::new(
            MatchId::new(),
            initiator,
            time_control,
            self.rules.initial_position(),
            self.now(),
        );
        let id = self.store.create(record).await?;
        tracing::info!(match_id = %id, %time_control, "match created");
        Ok(id)
    }

    pub async fn fetch(&self, id: MatchId) -> Result<MatchRecord, MatchError> {
        self.store.fetch(id).await
    }

    /// Take the second seat. Starts the clocks.
    #[instrument(skip(self))]
    pub async fn join_match(
        &self,
        id: MatchId,
        participant: ParticipantId,
    ) -> Result<MatchRecord, MatchError> {
        let snapshot = self.store.fetch(id).await?;
        if snapshot.status != MatchStatus::Waiting {
            return Err(MatchError::precondition(format!("match is {}", snapshot.status)));
        }
        if participant == snapshot.participant_a {
            return Err(MatchError::precondition("initiator cannot join their own match"));
        }

        let patch = MatchPatch {
            participant_b: Some(participant),
            status: Some(MatchStatus::Active),
            last_move_at: Some(self.now()),
            ..Default::default()
        };
        let record = self
            .commit(
                id,
                Transition::new(
                    patch,
                    vec![
                        Precondition::StatusIs(MatchStatus::Waiting),
                        Precondition::ParticipantBUnset,
                    ],
                ),
            )
            .await?;
        tracing::info!(match_id = %id, %participant, "match started");
        Ok(record)
    }

    /// Play `from -> to` for `mover`.
    ///
    /// Rejected without writing anything unless the match is active, the
    /// mover is the side to move and the rules engine accepts the move.
    #[instrument(skip(self, snapshot), fields(match_id = %snapshot.id, revision = snapshot.revision))]
    pub async fn apply_move(
        &self,
        snapshot: &MatchRecord,
        mover: ParticipantId,
        from: Square,
        to: Square,
    ) -> Result<MatchRecord, MatchError> {
        if !snapshot.is_active() {
            return Err(Rejection::NotActive {
                status: snapshot.status,
            }
            .into());
        }
        let color = snapshot.color_of(mover).ok_or(Rejection::NotInMatch)?;
        let expected = snapshot.side_to_move();
        if color != expected {
            return Err(Rejection::NotYourTurn { expected }.into());
        }

        let applied = self.rules.apply_move(&snapshot.position, from, to)?;
        if applied.turn != color.opposite() {
            return Err(Rejection::IllegalMove {
                reason: format!("position has {} to move after a {color} move", applied.turn),
            }
            .into());
        }

        let now = self.now();
        let clock = self.clock.confirm_move(snapshot, color, now);
        let mut patch = MatchPatch {
            position: Some(applied.position),
            history: Some(HistoryEdit::Append(MoveEntry {
                from,
                to,
                notation: applied.notation,
                color,
                spent: clock.spent,
                played_at: now,
            })),
            last_move_at: Some(now),
            ..Default::default()
        }
        .clear_negotiations();
        match color {
            Color::White => patch.white_remaining = Some(clock.remaining),
            Color::Black => patch.black_remaining = Some(clock.remaining),
        }
        if let Some(terminal) = applied.terminal {
            patch = patch.complete(match terminal {
                Terminal::Checkmate => MatchResult::win(color, ResultReason::Checkmate),
                Terminal::Stalemate => MatchResult::drawn(ResultReason::Stalemate),
                Terminal::Draw => MatchResult::drawn(ResultReason::Draw),
            });
        }

        let record = self
            .commit(
                snapshot.id,
                Transition::new(
                    patch,
                    Self::guard_board(snapshot),
                ),
            )
            .await?;
        tracing::debug!(
            move_count = record.move_count(),
            spent_ms = clock.spent.as_millis() as u64,
            "move confirmed"
        );
        Ok(record)
    }

    /// Concede. The opponent wins by resignation.
    #[instrument(skip(self, snapshot), fields(match_id = %snapshot.id))]
    pub async fn resign(
        &self,
        snapshot: &MatchRecord,
        participant: ParticipantId,
    ) -> Result<MatchRecord, MatchError> {
        if !snapshot.is_active() {
            return Err(Rejection::NotActive {
                status: snapshot.status,
            }
            .into());
        }
        let color = snapshot.color_of(participant).ok_or(Rejection::NotInMatch)?;
        let patch = MatchPatch::default()
            .clear_negotiations()
            .complete(MatchResult::win(color.opposite(), ResultReason::Resignation));
        self.commit(
            snapshot.id,
            Transition::new(patch, vec![Precondition::StatusIs(MatchStatus::Active)]),
        )
        .await
    }

    /// End the match on time if the side to move has run out.
    ///
    /// Guarded by the observed board and clock start, so when both clients
    /// detect the flag only one claim lands.
    #[instrument(skip(self, snapshot), fields(match_id = %snapshot.id, revision = snapshot.revision))]
    pub async fn claim_timeout(&self, snapshot: &MatchRecord) -> Result<MatchRecord, MatchError> {
        if !snapshot.is_active() {
            return Err(Rejection::NotActive {
                status: snapshot.status,
            }
            .into());
        }
        let view = self.clock_view(snapshot);
        let flagged = view.flagged().ok_or(Rejection::ClockNotExpired)?;

        let mut patch = MatchPatch::default()
            .clear_negotiations()
            .complete(MatchResult::win(flagged.opposite(), ResultReason::Timeout));
        match flagged {
            Color::White => patch.white_remaining = Some(std::time::Duration::ZERO),
            Color::Black => patch.black_remaining = Some(std::time::Duration::ZERO),
        }
        self.commit(
            snapshot.id,
            Transition::new(
                patch,
                Self::guard_board(snapshot),
            ),
        )
        .await
    }

    /// Open a draw offer or takeback request.
    #[instrument(skip(self, snapshot), fields(match_id = %snapshot.id))]
    pub async fn propose(
        &self,
        snapshot: &MatchRecord,
        kind: NegotiationKind,
        proposer: ParticipantId,
    ) -> Result<MatchRecord, MatchError> {
        let transition = negotiation::propose(snapshot, kind, proposer)?;
        let record = self.commit(snapshot.id, transition).await?;
        tracing::debug!(%kind, "negotiation opened");
        Ok(record)
    }

    /// Accept or decline the opponent's pending negotiation of `kind`.
    #[instrument(skip(self, snapshot), fields(match_id = %snapshot.id))]
    pub async fn respond(
        &self,
        snapshot: &MatchRecord,
        kind: NegotiationKind,
        responder: ParticipantId,
        accept: bool,
    ) -> Result<MatchRecord, MatchError> {
        let transition =
            negotiation::respond(snapshot, kind, responder, accept, self.rules.as_ref(), self.now())?;
        let record = self.commit(snapshot.id, transition).await?;
        tracing::debug!(%kind, accept, "negotiation resolved");
        Ok(record)
    }

    /// Withdraw the caller's pending negotiation of `kind`.
    #[instrument(skip(self, snapshot), fields(match_id = %snapshot.id))]
    pub async fn cancel(
        &self,
        snapshot: &MatchRecord,
        kind: NegotiationKind,
        proposer: ParticipantId,
    ) -> Result<MatchRecord, MatchError> {
        let transition = negotiation::cancel(snapshot, kind, proposer)?;
        self.commit(snapshot.id, transition).await
    }

    pub async fn offer_draw(
        &self,
        snapshot: &MatchRecord,
        participant: ParticipantId,
    ) -> Result<MatchRecord, MatchError> {
        self.propose(snapshot, NegotiationKind::Draw, participant).await
    }

    pub async fn respond_draw(
        &self,
        snapshot: &MatchRecord,
        participant: ParticipantId,
        accept: bool,
    ) -> Result<MatchRecord, MatchError> {
        self.respond(snapshot, NegotiationKind::Draw, participant, accept)
            .await
    }

    pub async fn cancel_draw(
        &self,
        snapshot: &MatchRecord,
        participant: ParticipantId,
    ) -> Result<MatchRecord, MatchError> {
        self.cancel(snapshot, NegotiationKind::Draw, participant).await
    }

    pub async fn request_takeback(
        &self,
        snapshot: &MatchRecord,
        participant: ParticipantId,
    ) -> Result<MatchRecord, MatchError> {
        self.propose(snapshot, NegotiationKind::Takeback, participant)
            .await
    }

    pub async fn respond_takeback(
        &self,
        snapshot: &MatchRecord,
        participant: ParticipantId,
        accept: bool,
    ) -> Result<MatchRecord, MatchError> {
        self.respond(snapshot, NegotiationKind::Takeback, participant, accept)
            .await
    }

    pub async fn cancel_takeback(
        &self,
        snapshot: &MatchRecord,
        participant: ParticipantId,
    ) -> Result<MatchRecord, MatchError> {
        self.cancel(snapshot, NegotiationKind::Takeback, participant)
            .await
    }

    /// Legal moves in the snapshot's position.
    pub fn legal_moves(&self, snapshot: &MatchRecord) -> Result<Vec<LegalMove>, MatchError> {
        Ok(self.rules.legal_moves(&snapshot.position)?)
    }

    /// Deliver every newer snapshot of `id` to `callback`, current one first.
    ///
    /// Delivery stops when the returned guard is dropped or unsubscribed.
    pub async fn subscribe<F>(&self, id: MatchId, callback: F) -> Result<SubscriptionGuard, MatchError>
    where
        F: FnMut(MatchRecord) + Send + 'static,
    {
        let stream = self.store.subscribe(id).await?;
        Ok(SubscriptionGuard::spawn(id, stream, callback))
    }
}

impl std::fmt::Debug for MatchController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchController")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
