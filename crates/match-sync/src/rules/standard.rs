//! Standard chess rules backed by shakmaty.
//!
//! Positions are FEN strings. Moves arrive as a pair of squares; a pawn
//! reaching the last rank is promoted to a queen.

use shakmaty::{
    fen::Fen, san::San, uci::UciMove, CastlingMode, Chess, EnPassantMode, Move, Position,
};

use super::{AppliedMove, RulesEngine, RulesError, Terminal};
use crate::types::{parse_coordinates, Color, LegalMove, Square};

/// Standard chess.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShakmatyRules;

impl ShakmatyRules {
    /// Standard starting FEN.
    pub const STARTING_FEN: &'static str =
        "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

    fn parse(position: &str) -> Result<Chess, RulesError> {
        let fen: Fen = position
            .parse()
            .map_err(|e| RulesError::InvalidPosition(format!("{e}")))?;
        fen.into_position(CastlingMode::Standard)
            .map_err(|e| RulesError::InvalidPosition(format!("{e}")))
    }

    fn to_fen(position: &Chess) -> String {
        Fen::from_position(position.clone(), EnPassantMode::Legal).to_string()
    }

    /// Resolve a square pair to a legal move, promoting to a queen when the
    /// bare coordinates are not enough.
    fn resolve(position: &Chess, from: Square, to: Square) -> Result<Move, RulesError> {
        let coordinates = format!("{from}{to}");
        Self::legal_uci(position, &coordinates)
            .or_else(|| Self::legal_uci(position, &format!("{coordinates}q")))
            .ok_or(RulesError::IllegalMove(coordinates))
    }

    fn legal_uci(position: &Chess, uci: &str) -> Option<Move> {
        let uci: UciMove = uci.parse().ok()?;
        let m = uci.to_move(position).ok()?;
        position.is_legal(&m).then_some(m)
    }

    fn terminal(position: &Chess) -> Option<Terminal> {
        if position.is_checkmate() {
            Some(Terminal::Checkmate)
        } else if position.is_stalemate() {
            Some(Terminal::Stalemate)
        } else if position.is_insufficient_material() {
            Some(Terminal::Draw)
        } else {
            None
        }
    }

    fn describe(position: &Chess, m: &Move) -> LegalMove {
        let san = San::from_move(position, m);
        let uci = UciMove::from_move(m, CastlingMode::Standard).to_string();

        let mut after = position.clone();
        after.play_unchecked(m);

        // castling is reported as the king's two squares, not king and rook
        let (from, to) = parse_coordinates(&uci)
            .unwrap_or_else(|_| (m.from().unwrap_or_else(|| m.to()).into(), m.to().into()));

        LegalMove {
            uci,
            san: san.to_string(),
            from,
            to,
            promotion: m.promotion().and_then(|role| role.try_into().ok()),
            is_capture: m.is_capture(),
            is_check: after.is_check(),
        }
    }
}

impl RulesEngine for ShakmatyRules {
    fn initial_position(&self) -> String {
        Self::STARTING_FEN.to_string()
    }

    fn apply_move(
        &self,
        position: &str,
        from: Square,
        to: Square,
    ) -> Result<AppliedMove, RulesError> {
        let current = Self::parse(position)?;
        if Self::terminal(&current).is_some() {
            return Err(RulesError::GameOver);
        }

        let m = Self::resolve(&current, from, to)?;
        // SAN depends on the position before the move
        let notation = San::from_move(&current, &m).to_string();
        let next = current
            .play(&m)
            .map_err(|_| RulesError::IllegalMove(format!("{from}{to}")))?;

        Ok(AppliedMove {
            position: Self::to_fen(&next),
            notation,
            turn: Color::from(next.turn()),
            terminal: Self::terminal(&next),
        })
    }

    fn legal_moves(&self, position: &str) -> Result<Vec<LegalMove>, RulesError> {
        let current = Self::parse(position)?;
        Ok(current
            .legal_moves()
            .iter()
            .map(|m| Self::describe(&current, m))
            .collect())
    }
}
