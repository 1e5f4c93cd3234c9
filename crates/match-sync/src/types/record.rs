//! The match record and the values stored inside it.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::chess::{Color, Square};
use super::ids::{MatchId, ParticipantId};

/// Lifecycle status of a match. Only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    /// Created, waiting for a second participant.
    Waiting,
    /// Both participants present, clocks running.
    Active,
    /// Finished; the record is immutable from here on.
    Completed,
}

impl MatchStatus {
    /// Returns true if `next` is the single legal successor of this status.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Waiting, Self::Active) | (Self::Active, Self::Completed)
        )
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl std::fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Waiting => write!(f, "waiting"),
            Self::Active => write!(f, "active"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

/// Time control settings, fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeControl {
    /// Starting time per side, in seconds.
    pub initial_seconds: u32,
    /// Seconds added after each move, when crediting is enabled.
    pub increment_seconds: u32,
}

impl TimeControl {
    /// 5 minutes, no increment.
    pub const FIVE_MINUTES: Self = Self::new(300, 0);
    /// 10 minutes, no increment.
    pub const TEN_MINUTES: Self = Self::new(600, 0);
    /// 15 minutes + 10 second increment.
    pub const FIFTEEN_PLUS_TEN: Self = Self::new(900, 10);
    /// 30 minutes, no increment.
    pub const THIRTY_MINUTES: Self = Self::new(1800, 0);

    /// The presets offered when creating a match.
    pub const PRESETS: [Self; 4] = [
        Self::FIVE_MINUTES,
        Self::TEN_MINUTES,
        Self::FIFTEEN_PLUS_TEN,
        Self::THIRTY_MINUTES,
    ];

    #[must_use]
    pub const fn new(initial_seconds: u32, increment_seconds: u32) -> Self {
        Self {
            initial_seconds,
            increment_seconds,
        }
    }

    #[must_use]
    pub const fn initial_time(&self) -> Duration {
        Duration::from_secs(self.initial_seconds as u64)
    }

    #[must_use]
    pub const fn increment(&self) -> Duration {
        Duration::from_secs(self.increment_seconds as u64)
    }

    /// Parse time control from a string like "15+10" (minutes + seconds).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let (minutes, increment) = s.split_once('+')?;
        let minutes: u32 = minutes.trim().parse().ok()?;
        let increment: u32 = increment.trim().parse().ok()?;
        Some(Self::new(minutes.checked_mul(60)?, increment))
    }
}

impl std::fmt::Display for TimeControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}+{}",
            self.initial_seconds / 60,
            self.increment_seconds
        )
    }
}

/// One confirmed half-move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveEntry {
    /// Square the piece moved from.
    pub from: Square,
    /// Square the piece moved to.
    pub to: Square,
    /// Notation reported by the rules engine (SAN for chess).
    pub notation: String,
    /// Side that made the move.
    pub color: Color,
    /// Clock time the mover spent on this move.
    pub spent: Duration,
    /// When the move was committed.
    pub played_at: DateTime<Utc>,
}

impl MoveEntry {
    /// Coordinate form, e.g. `"e2e4"`.
    #[must_use]
    pub fn coordinates(&self) -> String {
        format!("{}{}", self.from, self.to)
    }
}

/// The two things participants can negotiate over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NegotiationKind {
    /// Offer to end the match drawn.
    Draw,
    /// Request to undo the last move.
    Takeback,
}

impl NegotiationKind {
    pub const ALL: [Self; 2] = [Self::Draw, Self::Takeback];
}

impl std::fmt::Display for NegotiationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Draw => write!(f, "draw offer"),
            Self::Takeback => write!(f, "takeback request"),
        }
    }
}

/// An open proposal stored on the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NegotiationState {
    /// Participant who opened the proposal.
    pub proposer: ParticipantId,
    /// Always true while stored; resolved proposals are removed.
    pub pending: bool,
}

impl NegotiationState {
    #[must_use]
    pub const fn pending(proposer: ParticipantId) -> Self {
        Self {
            proposer,
            pending: true,
        }
    }
}

/// Who won, if anyone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// White won.
    WhiteWins,
    /// Black won.
    BlackWins,
    /// Neither side won.
    Drawn,
}

impl Outcome {
    #[must_use]
    pub const fn win_for(color: Color) -> Self {
        match color {
            Color::White => Self::WhiteWins,
            Color::Black => Self::BlackWins,
        }
    }

    #[must_use]
    pub const fn winner(self) -> Option<Color> {
        match self {
            Self::WhiteWins => Some(Color::White),
            Self::BlackWins => Some(Color::Black),
            Self::Drawn => None,
        }
    }
}

/// Why a match ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultReason {
    /// The mover delivered mate.
    Checkmate,
    /// A participant conceded.
    Resignation,
    /// The side to move ran out of time.
    Timeout,
    /// A draw offer was accepted.
    DrawAgreement,
    /// The side to move has no legal move and is not in check.
    Stalemate,
    /// Any other drawn terminal position reported by the rules engine.
    Draw,
}

impl std::fmt::Display for ResultReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Checkmate => write!(f, "checkmate"),
            Self::Resignation => write!(f, "resignation"),
            Self::Timeout => write!(f, "timeout"),
            Self::DrawAgreement => write!(f, "draw by agreement"),
            Self::Stalemate => write!(f, "stalemate"),
            Self::Draw => write!(f, "draw"),
        }
    }
}

/// Final result of a completed match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    /// Who won.
    pub outcome: Outcome,
    /// How the match ended.
    pub reason: ResultReason,
}

impl MatchResult {
    #[must_use]
    pub const fn win(winner: Color, reason: ResultReason) -> Self {
        Self {
            outcome: Outcome::win_for(winner),
            reason,
        }
    }

    #[must_use]
    pub const fn drawn(reason: ResultReason) -> Self {
        Self {
            outcome: Outcome::Drawn,
            reason,
        }
    }
}

impl std::fmt::Display for MatchResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.outcome.winner(), self.reason) {
            (Some(color), ResultReason::Timeout) => write!(f, "{} wins on time", color.title()),
            (Some(color), reason) => write!(f, "{} wins by {reason}", color.title()),
            (None, ResultReason::Draw) => write!(f, "Game drawn"),
            (None, ResultReason::DrawAgreement) => write!(f, "Game drawn by agreement"),
            (None, reason) => write!(f, "Game drawn by {reason}"),
        }
    }
}

/// The authoritative state of one match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    /// Unique match identifier.
    pub id: MatchId,
    /// Initiator; plays White.
    pub participant_a: ParticipantId,
    /// Joiner; plays Black. Unset while waiting.
    pub participant_b: Option<ParticipantId>,
    /// Current lifecycle status.
    pub status: MatchStatus,
    /// Serialized board, owned by the rules engine.
    pub position: String,
    /// Confirmed moves in order. Its length decides the side to move.
    pub move_history: Vec<MoveEntry>,
    pub time_control: TimeControl,
    /// White's stored time, as of `last_move_at`.
    pub white_remaining: Duration,
    /// Black's stored time, as of `last_move_at`.
    pub black_remaining: Duration,
    /// Instant of the last confirmed move, join or accepted takeback.
    pub last_move_at: Option<DateTime<Utc>>,
    /// Pending draw offer, if any.
    pub draw_offer: Option<NegotiationState>,
    /// Pending takeback request, if any.
    pub takeback_request: Option<NegotiationState>,
    /// Set once the match is completed.
    pub result: Option<MatchResult>,
    /// When the match was created.
    pub created_at: DateTime<Utc>,
    /// Commit counter assigned by the store.
    #[serde(default)]
    pub revision: u64,
}

impl MatchRecord {
    /// Build a fresh waiting record.
    #[must_use]
    pub fn new(
        id: MatchId,
        initiator: ParticipantId,
        time_control: TimeControl,
        initial_position: String,
        now: DateTime<Utc>,
    ) -> Self {
        let initial = time_control.initial_time();
        Self {
            id,
            participant_a: initiator,
            participant_b: None,
            status: MatchStatus::Waiting,
            position: initial_position,
            move_history: Vec::new(),
            time_control,
            white_remaining: initial,
            black_remaining: initial,
            last_move_at: None,
            draw_offer: None,
            takeback_request: None,
            result: None,
            created_at: now,
            revision: 0,
        }
    }

    /// Side to move, derived from history parity.
    #[must_use]
    pub fn side_to_move(&self) -> Color {
        Color::to_move_after(self.move_history.len())
    }

    #[must_use]
    pub fn move_count(&self) -> usize {
        self.move_history.len()
    }

    /// Color played by `participant`, if they are in this match.
    #[must_use]
    pub fn color_of(&self, participant: ParticipantId) -> Option<Color> {
        if participant == self.participant_a {
            Some(Color::White)
        } else if Some(participant) == self.participant_b {
            Some(Color::Black)
        } else {
            None
        }
    }

    #[must_use]
    pub fn participant_for(&self, color: Color) -> Option<ParticipantId> {
        match color {
            Color::White => Some(self.participant_a),
            Color::Black => self.participant_b,
        }
    }

    /// Stored (not live) remaining time for `color`.
    #[must_use]
    pub const fn remaining(&self, color: Color) -> Duration {
        match color {
            Color::White => self.white_remaining,
            Color::Black => self.black_remaining,
        }
    }

    #[must_use]
    pub const fn negotiation(&self, kind: NegotiationKind) -> Option<NegotiationState> {
        match kind {
            NegotiationKind::Draw => self.draw_offer,
            NegotiationKind::Takeback => self.takeback_request,
        }
    }

    /// The pending proposal of `kind`, if any.
    #[must_use]
    pub fn pending(&self, kind: NegotiationKind) -> Option<NegotiationState> {
        self.negotiation(kind).filter(|state| state.pending)
    }

    /// Whichever negotiation is currently pending.
    #[must_use]
    pub fn pending_negotiation(&self) -> Option<(NegotiationKind, NegotiationState)> {
        NegotiationKind::ALL
            .into_iter()
            .find_map(|kind| self.pending(kind).map(|state| (kind, state)))
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == MatchStatus::Active
    }
}
