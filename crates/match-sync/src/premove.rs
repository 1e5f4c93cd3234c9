//! Client-local buffer for a move made while it is not the holder's turn.

use crate::error::Rejection;
use crate::types::{MatchRecord, MatchStatus, ParticipantId, Square};

/// An intended move waiting for the holder's turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Premove {
    pub from: Square,
    pub to: Square,
}

/// Holds at most one premove. Never persisted.
#[derive(Debug, Clone)]
pub struct PremoveQueue {
    holder: ParticipantId,
    slot: Option<Premove>,
    /// History length of the record the slot was queued against.
    queued_at: usize,
    /// Whether the last observed snapshot had the holder to move.
    holder_to_move: bool,
}

impl PremoveQueue {
    #[must_use]
    pub const fn new(holder: ParticipantId) -> Self {
        Self {
            holder,
            slot: None,
            queued_at: 0,
            holder_to_move: false,
        }
    }

    /// Queue `from -> to` against `record`, replacing any queued move.
    ///
    /// Only allowed while the match is active and the opponent is to move.
    pub fn queue(&mut self, record: &MatchRecord, from: Square, to: Square) -> Result<(), Rejection> {
        if record.status != MatchStatus::Active {
            return Err(Rejection::NotActive {
                status: record.status,
            });
        }
        let color = record.color_of(self.holder).ok_or(Rejection::NotInMatch)?;
        if record.side_to_move() == color {
            return Err(Rejection::AlreadyYourTurn);
        }
        self.slot = Some(Premove { from, to });
        self.queued_at = record.move_count();
        self.holder_to_move = false;
        Ok(())
    }

    /// Feed a new snapshot.
    ///
    /// Returns the queued move, removing it, when this snapshot hands the
    /// turn to the holder. Clears the queue once the match is not active or
    /// when the history is shorter than the one the move was queued against.
    pub fn observe(&mut self, record: &MatchRecord) -> Option<Premove> {
        if record.status != MatchStatus::Active {
            self.slot = None;
            self.holder_to_move = false;
            return None;
        }
        if record.move_count() < self.queued_at {
            // taken back: the move was meant for a position that is gone
            self.slot = None;
        }
        let to_move = record.color_of(self.holder) == Some(record.side_to_move());
        let flipped = to_move && !self.holder_to_move;
        self.holder_to_move = to_move;
        if flipped {
            self.slot.take()
        } else {
            None
        }
    }

    #[must_use]
    pub const fn peek(&self) -> Option<Premove> {
        self.slot
    }

    pub fn clear(&mut self) {
        self.slot = None;
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.slot.is_none()
    }
}
