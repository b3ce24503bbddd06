//! Piece and side types that appear in published analysis.
//! Converted from cozy-chess at the crate boundary.

use serde::{Deserialize, Serialize};

/// A piece kind, used for promotions and SAN letters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PieceKind {
    Pawn,
    Knight,
    Bishop,
    Rook,
    Queen,
    King,
}

/// The side to move, or the side an evaluation is reported for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlayerSide {
    White,
    Black,
}

impl PieceKind {
    /// SAN letter (`N`, `Q`, ...). Pawns use `P` even though SAN omits it.
    pub fn san_letter(self) -> char {
        match self {
            Self::Pawn => 'P',
            Self::Knight => 'N',
            Self::Bishop => 'B',
            Self::Rook => 'R',
            Self::Queen => 'Q',
            Self::King => 'K',
        }
    }

    /// Promotion suffix on the UCI wire (`q` in `e7e8q`).
    pub fn uci_suffix(self) -> char {
        self.san_letter().to_ascii_lowercase()
    }
}

impl PlayerSide {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::White => "white",
            Self::Black => "black",
        }
    }

    pub fn opponent(self) -> Self {
        match self {
            Self::White => Self::Black,
            Self::Black => Self::White,
        }
    }
}

impl From<cozy_chess::Piece> for PieceKind {
    fn from(p: cozy_chess::Piece) -> Self {
        match p {
            cozy_chess::Piece::Pawn => Self::Pawn,
            cozy_chess::Piece::Knight => Self::Knight,
            cozy_chess::Piece::Bishop => Self::Bishop,
            cozy_chess::Piece::Rook => Self::Rook,
            cozy_chess::Piece::Queen => Self::Queen,
            cozy_chess::Piece::King => Self::King,
        }
    }
}

impl From<cozy_chess::Color> for PlayerSide {
    fn from(c: cozy_chess::Color) -> Self {
        match c {
            cozy_chess::Color::White => Self::White,
            cozy_chess::Color::Black => Self::Black,
        }
    }
}

impl std::fmt::Display for PlayerSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_promotion_letters() {
        let queen = PieceKind::from(cozy_chess::Piece::Queen);
        assert_eq!(queen.san_letter(), 'Q');
        assert_eq!(queen.uci_suffix(), 'q');
        assert_eq!(PieceKind::from(cozy_chess::Piece::Knight).uci_suffix(), 'n');
    }

    #[test]
    fn test_side_from_cozy() {
        assert_eq!(PlayerSide::from(cozy_chess::Color::Black), PlayerSide::Black);
        assert_eq!(PlayerSide::White.opponent(), PlayerSide::Black);
        assert_eq!(PlayerSide::Black.to_string(), "black");
    }
}
