//! Board vocabulary shared between the engine and the rules engine.
//!
//! These are serializable mirrors of the shakmaty types so match records can
//! be persisted without leaking the rules engine's representation.

use serde::{Deserialize, Serialize};

/// Side of the board. The match initiator always plays White.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    /// White pieces; moves first.
    White,
    /// Black pieces.
    Black,
}

impl Color {
    /// Get the opposite color.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::White => Self::Black,
            Self::Black => Self::White,
        }
    }

    /// Side to move after `plies` half-moves from the initial position.
    #[must_use]
    pub const fn to_move_after(plies: usize) -> Self {
        if plies % 2 == 0 {
            Self::White
        } else {
            Self::Black
        }
    }

    /// Capitalized name used in result sentences.
    #[must_use]
    pub const fn title(self) -> &'static str {
        match self {
            Self::White => "White",
            Self::Black => "Black",
        }
    }
}

impl From<shakmaty::Color> for Color {
    fn from(c: shakmaty::Color) -> Self {
        match c {
            shakmaty::Color::White => Self::White,
            shakmaty::Color::Black => Self::Black,
        }
    }
}

impl From<Color> for shakmaty::Color {
    fn from(c: Color) -> Self {
        match c {
            Color::White => Self::White,
            Color::Black => Self::Black,
        }
    }
}

impl std::fmt::Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::White => write!(f, "white"),
            Self::Black => write!(f, "black"),
        }
    }
}

/// Piece a pawn may promote to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Promotion {
    Knight,
    Bishop,
    Rook,
    /// The piece chosen when only squares are given.
    Queen,
}

impl TryFrom<shakmaty::Role> for Promotion {
    /// Pawns and kings are never promotion targets.
    type Error = shakmaty::Role;

    fn try_from(r: shakmaty::Role) -> Result<Self, Self::Error> {
        match r {
            shakmaty::Role::Knight => Ok(Self::Knight),
            shakmaty::Role::Bishop => Ok(Self::Bishop),
            shakmaty::Role::Rook => Ok(Self::Rook),
            shakmaty::Role::Queen => Ok(Self::Queen),
            other => Err(other),
        }
    }
}

/// A square on the board (a1-h8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Square(u8);

impl Square {
    /// Create a square from file (0-7) and rank (0-7).
    #[must_use]
    pub const fn new(file: u8, rank: u8) -> Option<Self> {
        if file < 8 && rank < 8 {
            Some(Self(rank * 8 + file))
        } else {
            None
        }
    }

    #[must_use]
    pub const fn file(self) -> u8 {
        self.0 % 8
    }

    #[must_use]
    pub const fn rank(self) -> u8 {
        self.0 / 8
    }
}

impl From<shakmaty::Square> for Square {
    fn from(s: shakmaty::Square) -> Self {
        Self(s as u8)
    }
}

impl From<Square> for shakmaty::Square {
    fn from(s: Square) -> Self {
        // in range by construction
        Self::new(u32::from(s.0))
    }
}

impl std::fmt::Display for Square {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let file = (b'a' + self.file()) as char;
        let rank = (b'1' + self.rank()) as char;
        write!(f, "{file}{rank}")
    }
}

impl std::str::FromStr for Square {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        let (Some(file), Some(rank), None) = (chars.next(), chars.next(), chars.next()) else {
            return Err("square must be 2 characters");
        };
        if !('a'..='h').contains(&file) {
            return Err("file must be a-h");
        }
        if !('1'..='8').contains(&rank) {
            return Err("rank must be 1-8");
        }
        Self::new(file as u8 - b'a', rank as u8 - b'1').ok_or("invalid square")
    }
}

impl TryFrom<String> for Square {
    type Error = &'static str;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Square> for String {
    fn from(s: Square) -> Self {
        s.to_string()
    }
}

/// Split a coordinate move like `"e2e4"` into its two squares.
///
/// A trailing promotion letter is ignored; promotions always go to a queen.
pub fn parse_coordinates(s: &str) -> Result<(Square, Square), &'static str> {
    if !(4..=5).contains(&s.len()) || !s.is_ascii() {
        return Err("move must be 4-5 ASCII characters");
    }
    Ok((s[0..2].parse()?, s[2..4].parse()?))
}

/// Legal move information for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegalMove {
    /// UCI notation (e.g., "e2e4").
    pub uci: String,
    /// SAN notation (e.g., "e4").
    pub san: String,
    /// Origin square. For castling, the king's square.
    pub from: Square,
    /// Destination square. For castling, where the king lands.
    pub to: Square,
    /// Piece the pawn becomes, if this is a promotion.
    pub promotion: Option<Promotion>,
    /// Whether the move captures a piece.
    pub is_capture: bool,
    /// Whether the move gives check.
    pub is_check: bool,
}
