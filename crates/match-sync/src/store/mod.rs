//! The match document store contract.
//!
//! A store keeps one [`MatchRecord`] per match, pushes every committed
//! snapshot to its subscribers and applies field-scoped patches only when
//! all of the caller's preconditions still hold.

pub mod memory;

pub use memory::MemoryMatchStore;

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;

use crate::error::MatchError;
use crate::types::{
    MatchId, MatchRecord, MatchResult, MatchStatus, MoveEntry, NegotiationKind, NegotiationState,
    ParticipantId,
};

/// Stream of committed snapshots for one match.
pub type SnapshotStream = Pin<Box<dyn Stream<Item = MatchRecord> + Send>>;

/// Edit to the move history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryEdit {
    Append(MoveEntry),
    /// Keep only the first `n` entries.
    TruncateTo(usize),
}

/// A field-scoped update. Unset fields are left untouched.
///
/// Negotiation fields are doubly optional: `Some(None)` clears the field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchPatch {
    pub participant_b: Option<ParticipantId>,
    pub status: Option<MatchStatus>,
    pub position: Option<String>,
    pub history: Option<HistoryEdit>,
    pub white_remaining: Option<Duration>,
    pub black_remaining: Option<Duration>,
    pub last_move_at: Option<DateTime<Utc>>,
    pub draw_offer: Option<Option<NegotiationState>>,
    pub takeback_request: Option<Option<NegotiationState>>,
    pub result: Option<MatchResult>,
}

impl MatchPatch {
    /// Set (or clear) the negotiation field for `kind`.
    #[must_use]
    pub fn with_negotiation(mut self, kind: NegotiationKind, state: Option<NegotiationState>) -> Self {
        match kind {
            NegotiationKind::Draw => self.draw_offer = Some(state),
            NegotiationKind::Takeback => self.takeback_request = Some(state),
        }
        self
    }

    /// Clear both negotiation fields.
    #[must_use]
    pub fn clear_negotiations(mut self) -> Self {
        self.draw_offer = Some(None);
        self.takeback_request = Some(None);
        self
    }

    /// Mark the match completed with `result`.
    #[must_use]
    pub fn complete(mut self, result: MatchResult) -> Self {
        self.status = Some(MatchStatus::Completed);
        self.result = Some(result);
        self
    }

    /// Apply this patch to `record`.
    pub fn apply_to(&self, record: &mut MatchRecord) {
        if let Some(participant) = self.participant_b {
            record.participant_b = Some(participant);
        }
        if let Some(status) = self.status {
            record.status = status;
        }
        if let Some(position) = &self.position {
            record.position.clone_from(position);
        }
        match &self.history {
            Some(HistoryEdit::Append(entry)) => record.move_history.push(entry.clone()),
            Some(HistoryEdit::TruncateTo(len)) => record.move_history.truncate(*len),
            None => {}
        }
        if let Some(remaining) = self.white_remaining {
            record.white_remaining = remaining;
        }
        if let Some(remaining) = self.black_remaining {
            record.black_remaining = remaining;
        }
        if let Some(at) = self.last_move_at {
            record.last_move_at = Some(at);
        }
        if let Some(state) = self.draw_offer {
            record.draw_offer = state;
        }
        if let Some(state) = self.takeback_request {
            record.takeback_request = state;
        }
        if let Some(result) = self.result {
            record.result = Some(result);
        }
    }
}

/// A condition the stored record must satisfy for a patch to land.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Precondition {
    StatusIs(MatchStatus),
    MoveCountIs(usize),
    /// The board is exactly this FEN.
    PositionIs(String),
    /// The running clock started at this instant.
    LastMoveAtIs(Option<DateTime<Utc>>),
    /// Neither a draw offer nor a takeback request is pending.
    NoPendingNegotiation,
    /// A negotiation of `kind` by `proposer` is pending.
    PendingNegotiation {
        kind: NegotiationKind,
        proposer: ParticipantId,
    },
    ParticipantBUnset,
}

impl Precondition {
    /// Pin the board, history length and clock start of `snapshot`.
    ///
    /// A takeback followed by a new move restores the move count, so the
    /// count alone does not identify the board a write was computed from.
    #[must_use]
    pub fn same_board(snapshot: &MatchRecord) -> [Self; 3] {
        [
            Self::MoveCountIs(snapshot.move_count()),
            Self::PositionIs(snapshot.position.clone()),
            Self::LastMoveAtIs(snapshot.last_move_at),
        ]
    }

    #[must_use]
    pub fn holds(&self, record: &MatchRecord) -> bool {
        match self {
            Self::StatusIs(status) => record.status == *status,
            Self::MoveCountIs(count) => record.move_count() == *count,
            Self::PositionIs(position) => record.position == *position,
            Self::LastMoveAtIs(at) => record.last_move_at == *at,
            Self::NoPendingNegotiation => record.pending_negotiation().is_none(),
            Self::PendingNegotiation { kind, proposer } => record
                .pending(*kind)
                .is_some_and(|state| state.proposer == *proposer),
            Self::ParticipantBUnset => record.participant_b.is_none(),
        }
    }
}

impl std::fmt::Display for Precondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StatusIs(status) => write!(f, "status is {status}"),
            Self::MoveCountIs(count) => write!(f, "move count is {count}"),
            Self::PositionIs(position) => write!(f, "position is {position}"),
            Self::LastMoveAtIs(Some(at)) => write!(f, "clock started at {at}"),
            Self::LastMoveAtIs(None) => write!(f, "clock not started"),
            Self::NoPendingNegotiation => write!(f, "no negotiation pending"),
            Self::PendingNegotiation { kind, proposer } => {
                write!(f, "{kind} pending by {proposer}")
            }
            Self::ParticipantBUnset => write!(f, "second seat is open"),
        }
    }
}

/// A patch together with the preconditions guarding it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transition {
    pub patch: MatchPatch,
    pub preconditions: Vec<Precondition>,
}

impl Transition {
    #[must_use]
    pub fn new(patch: MatchPatch, preconditions: Vec<Precondition>) -> Self {
        Self {
            patch,
            preconditions,
        }
    }
}

/// Persistence and fan-out for match records.
#[async_trait]
pub trait MatchStore: Send + Sync {
    /// Persist a new record. Returns its id.
    async fn create(&self, record: MatchRecord) -> Result<MatchId, MatchError>;

    /// Read the current record.
    async fn fetch(&self, id: MatchId) -> Result<MatchRecord, MatchError>;

    /// Stream of snapshots: the current record first, then every commit.
    ///
    /// Dropping the stream releases the subscription.
    async fn subscribe(&self, id: MatchId) -> Result<SnapshotStream, MatchError>;

    /// Atomically check `preconditions` and apply `patch`.
    ///
    /// Fails with [`MatchError::PreconditionFailed`] and writes nothing if
    /// any precondition does not hold or the patch would move the status
    /// backwards.
    async fn conditional_update(
        &self,
        id: MatchId,
        patch: &MatchPatch,
        preconditions: &[Precondition],
    ) -> Result<MatchRecord, MatchError>;
}
