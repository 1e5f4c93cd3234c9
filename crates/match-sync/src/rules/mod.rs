//! The rules engine contract.
//!
//! Move legality, notation and terminal detection belong to the rules
//! engine; the match engine only stores the positions it returns. A
//! shakmaty-backed implementation lives in [`standard`].

pub mod standard;

pub use standard::ShakmatyRules;

use thiserror::Error;

use crate::types::{Color, LegalMove, MoveEntry, Square};

/// Errors reported by a rules engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RulesError {
    /// The stored position could not be parsed.
    #[error("invalid position: {0}")]
    InvalidPosition(String),

    /// Move is not legal in the current position.
    #[error("illegal move: {0}")]
    IllegalMove(String),

    /// The position is already terminal.
    #[error("game is already over")]
    GameOver,
}

/// Terminal condition reached by a move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminal {
    /// The side that just moved delivered mate.
    Checkmate,
    Stalemate,
    /// Any other drawn position (e.g. insufficient material).
    Draw,
}

/// Result of applying a move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMove {
    pub position: String,
    pub notation: String,
    /// Side to move in the new position.
    pub turn: Color,
    pub terminal: Option<Terminal>,
}

/// A board rules engine.
pub trait RulesEngine: Send + Sync {
    /// Serialized starting position.
    fn initial_position(&self) -> String;

    /// Validate and apply `from -> to` against `position`.
    fn apply_move(&self, position: &str, from: Square, to: Square)
        -> Result<AppliedMove, RulesError>;

    /// All legal moves in `position`.
    fn legal_moves(&self, position: &str) -> Result<Vec<LegalMove>, RulesError>;
}

/// Rebuild a position by replaying `history` from the initial position.
pub fn replay(rules: &dyn RulesEngine, history: &[MoveEntry]) -> Result<String, RulesError> {
    history.iter().try_fold(rules.initial_position(), |position, entry| {
        rules
            .apply_move(&position, entry.from, entry.to)
            .map(|applied| applied.position)
    })
}
