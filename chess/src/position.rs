use cozy_chess::{Board, GameStatus, Move};

use crate::fen::{format_fen, parse_fen, FenError};
use crate::san::format_san;
use crate::uci::{convert_uci_castling_to_cozy, parse_uci_move, MoveParseError};
use crate::PlayerSide;

/// An immutable chess position. Applying a move yields a new position.
#[derive(Debug, Clone)]
pub struct Position {
    board: Board,
}

impl Position {
    /// The standard starting position.
    pub fn startpos() -> Self {
        Self {
            board: Board::default(),
        }
    }

    /// Create a position from a FEN string (or `startpos`).
    pub fn from_fen(fen: &str) -> Result<Self, GameError> {
        Ok(Self {
            board: parse_fen(fen)?,
        })
    }

    /// Create a position by replaying coordinate moves on top of a FEN.
    pub fn from_fen_and_moves<S: AsRef<str>>(fen: &str, moves: &[S]) -> Result<Self, GameError> {
        moves.iter().try_fold(Self::from_fen(fen)?, |position, mv| {
            position.apply_move(mv.as_ref()).map(|(next, _)| next)
        })
    }

    /// Apply one coordinate move, returning the successor position and the
    /// move's SAN.
    pub fn apply_move(&self, uci: &str) -> Result<(Position, String), GameError> {
        let parsed = parse_uci_move(uci)?;
        let legal = self.legal_moves();
        let mv = convert_uci_castling_to_cozy(&self.board, parsed, &legal);
        if !legal.contains(&mv) {
            return Err(GameError::IllegalMove(uci.to_string()));
        }

        let san = format_san(&self.board, mv);
        let mut board = self.board.clone();
        board.play_unchecked(mv);
        Ok((Self { board }, san))
    }

    pub fn side_to_move(&self) -> PlayerSide {
        PlayerSide::from(self.board.side_to_move())
    }

    /// Get all legal moves for the position, in cozy-chess form.
    pub fn legal_moves(&self) -> Vec<Move> {
        let mut moves = Vec::new();
        self.board.generate_moves(|mvs| {
            moves.extend(mvs);
            false
        });
        moves
    }

    pub fn status(&self) -> GameStatus {
        self.board.status()
    }

    pub fn to_fen(&self) -> String {
        format_fen(&self.board)
    }

    pub fn board(&self) -> &Board {
        &self.board
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::startpos()
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum GameError {
    #[error("Illegal move: {0}")]
    IllegalMove(String),
    #[error("Move parse error: {0}")]
    MoveParse(#[from] MoveParseError),
    #[error("FEN parse error: {0}")]
    FenError(#[from] FenError),
}
