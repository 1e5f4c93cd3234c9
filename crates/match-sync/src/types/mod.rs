//! Type definitions for match synchronization.
//!
//! ## Modules
//!
//! - `chess` - Board vocabulary mirrored from shakmaty (Color, Square, LegalMove)
//! - `ids` - MatchId and ParticipantId
//! - `record` - The match record and the values it stores

pub mod chess;
pub mod ids;
pub mod record;

pub use chess::{parse_coordinates, Color, LegalMove, Promotion, Square};
pub use ids::{MatchId, ParticipantId};
pub use record::{
    MatchRecord, MatchResult, MatchStatus, MoveEntry, NegotiationKind, NegotiationState, Outcome,
    ResultReason, TimeControl,
};
