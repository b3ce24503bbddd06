//! Rules layer: FEN positions, coordinate-move application and SAN.

pub mod fen;
pub mod position;
pub mod san;
pub mod types;
pub mod uci;

pub use fen::{FenError, START_FEN};
pub use position::{GameError, Position};
pub use san::format_san;
pub use types::{PieceKind, PlayerSide};
pub use uci::{
    convert_uci_castling_to_cozy, format_square, format_uci_move, parse_uci_move, MoveParseError,
};
